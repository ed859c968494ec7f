//! Connection state machine. Host-driven: the host owns the streams and reports events;
//! the session decides which transitions are legal and remembers who we are talking to.
//!
//! Idle -> AwaitingApproval -> Active -> Idle (inbound)
//! Idle -> Connecting -> Active -> Idle (outbound)

use std::fmt;

use crate::handshake::Role;
use crate::identity::{LinkId, LocalIdentity, PeerIdentity};

/// Where the single connection slot currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    /// Inbound handshake waiting on the approval gate.
    AwaitingApproval,
    /// Outbound connect + handshake in flight.
    Connecting,
    Active,
}

impl ConnectionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ConnectionState::Idle)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Active)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::AwaitingApproval => write!(f, "awaiting_approval"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Active => write!(f, "active"),
        }
    }
}

/// Single-connection session. At most one link is non-Idle at a time.
#[derive(Debug)]
pub struct Session {
    local: LocalIdentity,
    state: ConnectionState,
    link: Option<LinkId>,
    peer: Option<PeerIdentity>,
}

impl Session {
    pub fn new(local: LocalIdentity) -> Self {
        Self {
            local,
            state: ConnectionState::Idle,
            link: None,
            peer: None,
        }
    }

    pub fn local(&self) -> &LocalIdentity {
        &self.local
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Peer name; only set while Active.
    pub fn peer(&self) -> Option<&PeerIdentity> {
        self.peer.as_ref()
    }

    /// Link currently holding the slot (any non-Idle state).
    pub fn current_link(&self) -> Option<LinkId> {
        self.link
    }

    /// Link that is Active, if any.
    pub fn active_link(&self) -> Option<LinkId> {
        match self.state {
            ConnectionState::Active => self.link,
            _ => None,
        }
    }

    /// Leave Idle for a new attempt. Fails fast when the slot is taken; the holder is untouched.
    pub fn begin(&mut self, role: Role) -> Result<LinkId, SessionError> {
        if !self.state.is_idle() {
            return Err(SessionError::Busy(self.state));
        }
        let link = LinkId::generate();
        self.state = match role {
            Role::Acceptor => ConnectionState::AwaitingApproval,
            Role::Initiator => ConnectionState::Connecting,
        };
        self.link = Some(link);
        Ok(link)
    }

    /// Handshake finished for `link`: become Active with `peer`.
    pub fn activate(&mut self, link: LinkId, peer: PeerIdentity) -> Result<(), SessionError> {
        self.check_link(link)?;
        match self.state {
            ConnectionState::AwaitingApproval | ConnectionState::Connecting => {
                self.state = ConnectionState::Active;
                self.peer = Some(peer);
                Ok(())
            }
            other => Err(SessionError::InvalidTransition(other)),
        }
    }

    /// Give up a pending attempt (rejected, handshake or connect failure). Returns true if it was
    /// pending and the session is now Idle.
    pub fn abort(&mut self, link: LinkId) -> bool {
        if self.link != Some(link) {
            return false;
        }
        match self.state {
            ConnectionState::AwaitingApproval | ConnectionState::Connecting => {
                self.reset();
                true
            }
            _ => false,
        }
    }

    /// Tear down the Active `link`. Returns the peer it was connected to, or `None` if `link` is
    /// not the active link (already released, or stale).
    pub fn release(&mut self, link: LinkId) -> Option<PeerIdentity> {
        if self.active_link() != Some(link) {
            return None;
        }
        let peer = self.peer.take();
        self.reset();
        peer
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Idle;
        self.link = None;
        self.peer = None;
    }

    fn check_link(&self, link: LinkId) -> Result<(), SessionError> {
        if self.link == Some(link) {
            Ok(())
        } else {
            Err(SessionError::StaleLink)
        }
    }
}

/// Transition refused by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("already connected or busy ({0})")]
    Busy(ConnectionState),
    #[error("link is no longer current")]
    StaleLink,
    #[error("invalid transition from {0}")]
    InvalidTransition(ConnectionState),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::parse_peer_name;
    use rand::Rng;

    fn session() -> Session {
        Session::new(LocalIdentity::new("A-name").unwrap())
    }

    fn peer(name: &str) -> PeerIdentity {
        parse_peer_name(Some(name)).unwrap()
    }

    #[test]
    fn inbound_path_reaches_active_and_back() {
        let mut s = session();
        let link = s.begin(Role::Acceptor).unwrap();
        assert_eq!(s.state(), ConnectionState::AwaitingApproval);
        assert_eq!(s.active_link(), None);
        s.activate(link, peer("B-name")).unwrap();
        assert_eq!(s.state(), ConnectionState::Active);
        assert_eq!(s.peer().unwrap().as_str(), "B-name");
        assert_eq!(s.release(link).unwrap().as_str(), "B-name");
        assert_eq!(s.state(), ConnectionState::Idle);
        assert!(s.peer().is_none());
        assert!(s.current_link().is_none());
    }

    #[test]
    fn outbound_path_uses_connecting() {
        let mut s = session();
        let link = s.begin(Role::Initiator).unwrap();
        assert_eq!(s.state(), ConnectionState::Connecting);
        s.activate(link, peer("B-name")).unwrap();
        assert_eq!(s.active_link(), Some(link));
    }

    #[test]
    fn second_attempt_is_busy_and_leaves_holder_alone() {
        let mut s = session();
        let link = s.begin(Role::Initiator).unwrap();
        s.activate(link, peer("B")).unwrap();
        assert_eq!(
            s.begin(Role::Acceptor),
            Err(SessionError::Busy(ConnectionState::Active))
        );
        assert_eq!(
            s.begin(Role::Initiator),
            Err(SessionError::Busy(ConnectionState::Active))
        );
        assert_eq!(s.active_link(), Some(link));
        assert_eq!(s.peer().unwrap().as_str(), "B");
    }

    #[test]
    fn pending_attempt_also_blocks() {
        let mut s = session();
        let _link = s.begin(Role::Acceptor).unwrap();
        assert_eq!(
            s.begin(Role::Initiator),
            Err(SessionError::Busy(ConnectionState::AwaitingApproval))
        );
    }

    #[test]
    fn abort_returns_to_idle() {
        let mut s = session();
        let link = s.begin(Role::Acceptor).unwrap();
        assert!(s.abort(link));
        assert!(s.state().is_idle());
        assert!(!s.abort(link));
        assert!(s.begin(Role::Initiator).is_ok());
    }

    #[test]
    fn abort_does_not_touch_active_link() {
        let mut s = session();
        let link = s.begin(Role::Initiator).unwrap();
        s.activate(link, peer("B")).unwrap();
        assert!(!s.abort(link));
        assert!(s.state().is_active());
    }

    #[test]
    fn release_happens_once() {
        let mut s = session();
        let link = s.begin(Role::Initiator).unwrap();
        s.activate(link, peer("B")).unwrap();
        assert!(s.release(link).is_some());
        assert!(s.release(link).is_none());
    }

    #[test]
    fn stale_link_cannot_touch_newer_link() {
        let mut s = session();
        let old = s.begin(Role::Initiator).unwrap();
        s.activate(old, peer("B")).unwrap();
        s.release(old);
        let new = s.begin(Role::Acceptor).unwrap();
        assert_eq!(s.activate(old, peer("X")), Err(SessionError::StaleLink));
        assert!(!s.abort(old));
        s.activate(new, peer("C")).unwrap();
        assert!(s.release(old).is_none());
        assert_eq!(s.peer().unwrap().as_str(), "C");
    }

    #[test]
    fn activate_twice_is_invalid() {
        let mut s = session();
        let link = s.begin(Role::Initiator).unwrap();
        s.activate(link, peer("B")).unwrap();
        assert_eq!(
            s.activate(link, peer("B")),
            Err(SessionError::InvalidTransition(ConnectionState::Active))
        );
    }

    /// Random interleavings of inbound/outbound attempts, completions, aborts and releases never
    /// produce more than one holder of the slot.
    #[test]
    fn random_interleavings_keep_single_link() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let mut s = session();
            // Links handed out to "tasks" that may still act on them.
            let mut issued: Vec<LinkId> = Vec::new();
            for _ in 0..50 {
                match rng.gen_range(0..5) {
                    0 | 1 => {
                        let role = if rng.gen_bool(0.5) {
                            Role::Acceptor
                        } else {
                            Role::Initiator
                        };
                        let was_idle = s.state().is_idle();
                        match s.begin(role) {
                            Ok(link) => {
                                assert!(was_idle);
                                issued.push(link);
                            }
                            Err(SessionError::Busy(_)) => assert!(!was_idle),
                            Err(e) => panic!("unexpected {e}"),
                        }
                    }
                    2 if !issued.is_empty() => {
                        let link = issued[rng.gen_range(0..issued.len())];
                        let _ = s.activate(link, peer("P"));
                    }
                    3 if !issued.is_empty() => {
                        let link = issued[rng.gen_range(0..issued.len())];
                        s.abort(link);
                    }
                    4 if !issued.is_empty() => {
                        let link = issued[rng.gen_range(0..issued.len())];
                        s.release(link);
                    }
                    _ => {}
                }
                // Slot holder is the most recently issued link, or nobody.
                match s.current_link() {
                    Some(link) => {
                        assert_eq!(Some(&link), issued.last());
                        assert!(!s.state().is_idle());
                    }
                    None => assert!(s.state().is_idle()),
                }
                assert_eq!(s.peer().is_some(), s.state().is_active());
            }
        }
    }
}
