//! Handshake rules: one name line from each side, acceptor reads first, initiator writes first.

use crate::identity::PeerIdentity;

/// Which side of the raw connection we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Received the connection: read peer name, ask for approval, then send ours.
    Acceptor,
    /// Opened the connection: send our name, then read theirs.
    Initiator,
}

/// Validate the peer's name line. `None` means the peer closed before sending one.
pub fn parse_peer_name(line: Option<&str>) -> Result<PeerIdentity, HandshakeError> {
    let line = line.ok_or(HandshakeError::PeerClosed)?;
    if line.trim().is_empty() {
        return Err(HandshakeError::EmptyName);
    }
    Ok(PeerIdentity::from_line(line))
}

/// Handshake did not produce a usable peer name.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("peer closed the connection before sending its name")]
    PeerClosed,
    #[error("peer sent an empty name")]
    EmptyName,
    #[error("handshake I/O error: {0}")]
    Io(#[from] std::io::Error),
}
