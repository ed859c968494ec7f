//! Framing: UTF-8 text lines terminated by `\n`. No length limit.

const LINE_END: u8 = b'\n';

/// Encode a line: text bytes + `\n`. Embedded newlines are not escaped.
pub fn encode_line(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 1);
    out.extend_from_slice(text.as_bytes());
    out.push(LINE_END);
    out
}

/// Decode one line from the front of `bytes`. Returns the text (terminator and a trailing `\r`
/// stripped) and the number of bytes consumed.
/// Call with partial buffer; returns `NeedMore` if no terminator yet.
pub fn decode_line(bytes: &[u8]) -> Result<(String, usize), LineDecodeError> {
    let end = bytes
        .iter()
        .position(|b| *b == LINE_END)
        .ok_or(LineDecodeError::NeedMore)?;
    let text = line_text(&bytes[..end])?;
    Ok((text, end + 1))
}

fn line_text(raw: &[u8]) -> Result<String, LineDecodeError> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let text = std::str::from_utf8(raw).map_err(LineDecodeError::Utf8)?;
    Ok(text.to_string())
}

/// Error decoding a line (need more bytes, or invalid UTF-8).
#[derive(Debug, thiserror::Error)]
pub enum LineDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("line is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Accumulates stream bytes and yields complete lines in arrival order.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete line, or `Ok(None)` when no terminator is buffered yet.
    pub fn next_line(&mut self) -> Result<Option<String>, LineDecodeError> {
        match decode_line(&self.buf) {
            Ok((line, n)) => {
                self.buf.drain(..n);
                Ok(Some(line))
            }
            Err(LineDecodeError::NeedMore) => Ok(None),
            Err(e) => {
                // Drop the bad line so the caller is not handed it again.
                if let Some(end) = self.buf.iter().position(|b| *b == LINE_END) {
                    self.buf.drain(..=end);
                }
                Err(e)
            }
        }
    }

    /// At end of stream: an unterminated tail counts as a final line.
    pub fn finish(&mut self) -> Result<Option<String>, LineDecodeError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let tail = std::mem::take(&mut self.buf);
        line_text(&tail).map(Some)
    }
}
