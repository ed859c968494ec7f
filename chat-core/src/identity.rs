//! Display-name identities and link tags.

use std::fmt;

/// This side's display name. Chosen once per session; sent in the handshake and as message prefix.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct LocalIdentity(String);

impl LocalIdentity {
    /// Trim and validate a display name. Empty names and names containing a line break are rejected
    /// (a line break would split the handshake line).
    pub fn new(name: &str) -> Result<Self, IdentityError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IdentityError::Empty);
        }
        if name.contains(['\n', '\r']) {
            return Err(IdentityError::LineBreak);
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote display name learned during the handshake. Only meaningful while a link is up.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    /// Name as received. The handshake has already rejected empty lines.
    pub(crate) fn from_line(name: &str) -> Self {
        PeerIdentity(name.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tag for one connection attempt, minted when the session leaves Idle.
/// Every later transition names its link so stale tasks cannot tear down a newer link.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct LinkId(uuid::Uuid);

impl LinkId {
    pub fn generate() -> Self {
        LinkId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell links apart in logs.
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

/// Invalid local display name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("display name is empty")]
    Empty,
    #[error("display name contains a line break")]
    LineBreak,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_identity_is_trimmed() {
        let id = LocalIdentity::new("  alice \t").unwrap();
        assert_eq!(id.as_str(), "alice");
        assert_eq!(id.to_string(), "alice");
    }

    #[test]
    fn local_identity_rejects_blank() {
        assert_eq!(LocalIdentity::new(""), Err(IdentityError::Empty));
        assert_eq!(LocalIdentity::new("   "), Err(IdentityError::Empty));
    }

    #[test]
    fn local_identity_rejects_inner_newline() {
        assert_eq!(LocalIdentity::new("al\nice"), Err(IdentityError::LineBreak));
        assert_eq!(LocalIdentity::new("al\rice"), Err(IdentityError::LineBreak));
    }

    #[test]
    fn link_ids_are_distinct() {
        let a = LinkId::generate();
        let b = LinkId::generate();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 8);
    }
}
