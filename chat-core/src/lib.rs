//! LineChat peer connection protocol.
//! Host-driven: no I/O; the host owns streams and tasks and asks the session which transitions are legal.

pub mod discovery;
pub mod handshake;
pub mod identity;
pub mod protocol;
pub mod session;
pub mod wire;

pub use discovery::{find_by_name, DiscoveredDevice};
pub use handshake::{parse_peer_name, HandshakeError, Role};
pub use identity::{IdentityError, LinkId, LocalIdentity, PeerIdentity};
pub use protocol::{classify, ChatMessage, Incoming, DISCONNECT_SENTINEL, SERVICE_PORT};
pub use session::{ConnectionState, Session, SessionError};
pub use wire::{decode_line, encode_line, LineBuffer, LineDecodeError};
