//! LineChat wire protocol: reserved lines, service port, chat line format.

use crate::identity::LocalIdentity;

/// Default TCP port the listener binds. Keeps our connections apart from unrelated traffic.
pub const SERVICE_PORT: u16 = 47_100;

/// Control line signalling an orderly close. Never shown as chat content.
pub const DISCONNECT_SENTINEL: &str = "_DISCONNECT_";

/// One chat message. Formatted once by the sender; receivers display the line verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage<'a> {
    pub sender: &'a str,
    pub text: &'a str,
}

impl<'a> ChatMessage<'a> {
    pub fn new(sender: &'a LocalIdentity, text: &'a str) -> Self {
        Self {
            sender: sender.as_str(),
            text,
        }
    }

    /// Wire/display form: `"{sender}: {text}"`.
    pub fn to_line(&self) -> String {
        format!("{}: {}", self.sender, self.text)
    }
}

/// A line received on an active link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming<'a> {
    /// Peer closed the session in an orderly way.
    Disconnect,
    /// Already-formatted chat line.
    Chat(&'a str),
}

/// Classify a received line. Only an exact match is the sentinel.
pub fn classify(line: &str) -> Incoming<'_> {
    if line == DISCONNECT_SENTINEL {
        Incoming::Disconnect
    } else {
        Incoming::Chat(line)
    }
}
