//! Async line reader/writer over the two halves of a link.

use std::io;

use chat_core::wire::{encode_line, LineBuffer};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 4096;

/// Reads `\n`-terminated UTF-8 lines. `Ok(None)` is end of stream (peer closed), distinct from `Err`.
pub struct LineReader<R> {
    inner: R,
    buf: LineBuffer,
    chunk: Box<[u8]>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: LineBuffer::new(),
            chunk: vec![0u8; READ_CHUNK].into_boxed_slice(),
            eof: false,
        }
    }

    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(line) = self.buf.next_line().map_err(invalid_data)? {
                return Ok(Some(line));
            }
            if self.eof {
                return self.buf.finish().map_err(invalid_data);
            }
            let n = self.inner.read(&mut self.chunk).await?;
            if n == 0 {
                self.eof = true;
            } else {
                self.buf.extend(&self.chunk[..n]);
            }
        }
    }
}

fn invalid_data(e: chat_core::LineDecodeError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Writes whole lines: one buffer per line, then flush, so the peer never sees half a line from us.
pub struct LineWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_line(&mut self, text: &str) -> io::Result<()> {
        let bytes = encode_line(text);
        self.inner.write_all(&bytes).await?;
        self.inner.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_cross_a_pipe_in_order() {
        let (a, b) = tokio::io::duplex(16);
        let mut writer = LineWriter::new(a);
        let mut reader = LineReader::new(b);
        let send = tokio::spawn(async move {
            for i in 0..20 {
                writer.write_line(&format!("alice: message number {i}")).await.unwrap();
            }
        });
        for i in 0..20 {
            let line = reader.read_line().await.unwrap().unwrap();
            assert_eq!(line, format!("alice: message number {i}"));
        }
        send.await.unwrap();
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn closed_stream_is_end_not_error() {
        let (a, b) = tokio::io::duplex(64);
        drop(a);
        let mut reader = LineReader::new(b);
        assert_eq!(reader.read_line().await.unwrap(), None);
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unterminated_tail_is_delivered_at_close() {
        let (mut a, b) = tokio::io::duplex(64);
        a.write_all(b"bob: hi\nbob: bye").await.unwrap();
        drop(a);
        let mut reader = LineReader::new(b);
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("bob: hi"));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("bob: bye"));
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_utf8_is_read_error() {
        let (mut a, b) = tokio::io::duplex(64);
        a.write_all(&[0xff, b'\n']).await.unwrap();
        let mut reader = LineReader::new(b);
        let err = reader.read_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
