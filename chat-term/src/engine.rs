//! Peer connection engine: listener loop, outbound connect, messaging loop, disconnect.
//!
//! All transitions go through one mutex around the [`Session`] and the live link, so an inbound
//! arrival racing an outbound attempt can never leave two links Active. Every task that may act
//! on a link later (handshake, receive loop) carries its [`LinkId`]; the session ignores stale ids.
//! Network writes never run under that mutex: the link's writer has its own lock, and releasing the
//! link cancels any write still waiting on the peer.

use std::io;
use std::sync::Arc;

use chat_core::{
    classify, ChatMessage, ConnectionState, DiscoveredDevice, HandshakeError, Incoming, LinkId,
    LocalIdentity, PeerIdentity, Role, Session, SessionError, DISCONNECT_SENTINEL,
};
use tokio::io::{split, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tokio::task::{AbortHandle, JoinHandle};

use crate::codec::{LineReader, LineWriter};
use crate::discovery::{Discovery, Scanner};
use crate::handshake::{self, Acceptance};
use crate::presenter::Presenter;
use crate::transport::{Listener, Transport};

type LinkReader<S> = LineReader<ReadHalf<S>>;
type LinkWriter<S> = LineWriter<WriteHalf<S>>;
type SharedWriter<S> = Arc<Mutex<LinkWriter<S>>>;

/// Live link: our write half plus the receive task that owns the read half.
/// Dropping both closes the connection.
struct ActiveLink<S> {
    id: LinkId,
    writer: SharedWriter<S>,
    receiver: AbortHandle,
    /// Never sent on; dropping it wakes every pending write on this link.
    alive: watch::Sender<()>,
}

struct State<S> {
    session: Session,
    link: Option<ActiveLink<S>>,
}

/// Why a link is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    /// Local disconnect, sentinel already attempted.
    Local,
    /// Peer sent the sentinel.
    PeerClosed,
    /// End of stream or read error.
    Lost,
    /// Write failed on send.
    SendFailed,
}

impl Teardown {
    fn notice(self) -> &'static str {
        match self {
            Teardown::Local => "Disconnected from peer",
            Teardown::PeerClosed => "Peer disconnected.",
            Teardown::Lost => "Connection lost.",
            Teardown::SendFailed => "Send failed. Connection may be lost.",
        }
    }

    /// Receive-side teardowns run on the receive task itself; it just returns.
    fn stops_receiver(self) -> bool {
        matches!(self, Teardown::Local | Teardown::SendFailed)
    }
}

struct Shared<T: Transport, P, S> {
    local: LocalIdentity,
    transport: T,
    presenter: P,
    discovery: Discovery<S>,
    state: Mutex<State<T::Stream>>,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle; all clones drive the same single-connection engine.
pub struct ChatEngine<T: Transport, P, S> {
    shared: Arc<Shared<T, P, S>>,
}

impl<T: Transport, P, S> Clone for ChatEngine<T, P, S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, P, S> ChatEngine<T, P, S>
where
    T: Transport,
    P: Presenter,
    S: Scanner,
{
    pub fn new(local: LocalIdentity, transport: T, presenter: P, scanner: S) -> Self {
        let session = Session::new(local.clone());
        Self {
            shared: Arc::new(Shared {
                local,
                transport,
                presenter,
                discovery: Discovery::new(scanner),
                state: Mutex::new(State {
                    session,
                    link: None,
                }),
                listener: std::sync::Mutex::new(None),
            }),
        }
    }

    pub fn local(&self) -> &LocalIdentity {
        &self.shared.local
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.state.lock().await.session.state()
    }

    /// Peer name while Active.
    pub async fn peer(&self) -> Option<PeerIdentity> {
        self.shared.state.lock().await.session.peer().cloned()
    }

    fn status(&self, line: &str) {
        self.shared.presenter.on_status(line);
    }

    /// Start the background listener loop. No-op if already running.
    pub fn start(&self) {
        let mut slot = match self.shared.listener.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            return;
        }
        let engine = self.clone();
        *slot = Some(tokio::spawn(async move { engine.listen_loop().await }));
    }

    /// Stop accepting and close the link (with sentinel) if one is up.
    pub async fn shutdown(&self) {
        let listener = match self.shared.listener.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = listener {
            task.abort();
        }
        if self.state().await.is_active() {
            let _ = self.disconnect().await;
        }
    }

    async fn listen_loop(self) {
        let mut listener = match self.shared.transport.listen().await {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen; inbound connections disabled");
                self.status(&format!("Listener error: {e}"));
                return;
            }
        };
        self.status("Listening for incoming connections...");
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let begun = self.shared.state.lock().await.session.begin(Role::Acceptor);
                    match begun {
                        Ok(link) => {
                            tracing::debug!(addr = %addr, link = %link, "Accepted inbound connection");
                            let engine = self.clone();
                            tokio::spawn(async move { engine.accept_inbound(link, stream).await });
                        }
                        Err(e) => {
                            tracing::debug!(addr = %addr, reason = %e, "Rejecting inbound connection");
                            drop(stream);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed; listener stopped");
                    self.status(&format!("Listener error: {e}"));
                    break;
                }
            }
        }
    }

    /// Acceptor handshake for one inbound connection, on its own task.
    async fn accept_inbound(self, link: LinkId, stream: T::Stream) {
        let (r, w) = split(stream);
        let mut reader = LineReader::new(r);
        let mut writer = LineWriter::new(w);
        let presenter = &self.shared.presenter;
        let outcome = handshake::accept(&mut reader, &mut writer, &self.shared.local, |peer| {
            async move { presenter.request_approval(&peer).await }
        })
        .await;
        match outcome {
            Ok(Acceptance::Approved(peer)) => {
                if let Err(e) = self.install(link, peer, reader, writer).await {
                    tracing::warn!(link = %link, error = %e, "Inbound link could not be activated");
                }
            }
            Ok(Acceptance::Rejected(peer)) => {
                drop((reader, writer));
                self.shared.state.lock().await.session.abort(link);
                tracing::info!(link = %link, peer = %peer, "Inbound connection rejected");
                self.status(&format!("Rejected connection from {peer}"));
            }
            Err(e) => {
                drop((reader, writer));
                self.shared.state.lock().await.session.abort(link);
                tracing::info!(link = %link, error = %e, "Inbound handshake failed");
                self.status(&format!("Incoming connection failed: {e}"));
            }
        }
    }

    /// Outbound attempt to `address`. Fails fast unless Idle.
    pub async fn connect(&self, address: &str) -> Result<PeerIdentity, EngineError> {
        self.connect_labeled(address, address).await
    }

    /// Outbound attempt to a scanned device.
    pub async fn connect_device(&self, device: &DiscoveredDevice) -> Result<PeerIdentity, EngineError> {
        self.connect_labeled(&device.address, &device.name).await
    }

    /// Run `connect` on its own task so the caller is never blocked by network I/O.
    pub fn spawn_connect(&self, address: String) -> JoinHandle<Result<PeerIdentity, EngineError>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.connect(&address).await })
    }

    /// Fresh scan, connect to the first device whose name matches.
    pub async fn connect_by_name(&self, name: &str) -> Result<PeerIdentity, EngineError> {
        if !self.state().await.is_idle() {
            self.status("Already connected to a peer.");
            return Err(EngineError::AlreadyConnected);
        }
        let found = match self.shared.discovery.find_by_name(name).await {
            Ok(found) => found,
            Err(e) => {
                self.status(&format!("Scan failed: {e}"));
                return Err(EngineError::Scan(e));
            }
        };
        match found {
            Some(device) => self.connect_device(&device).await,
            None => {
                self.status(&format!("No device found with name {name}"));
                Err(EngineError::DeviceNotFound(name.to_string()))
            }
        }
    }

    /// One scan through the discovery adapter, with progress notices.
    pub async fn scan(&self) -> Result<Vec<DiscoveredDevice>, EngineError> {
        self.status("Scanning for devices...");
        match self.shared.discovery.scan().await {
            Ok(devices) if devices.is_empty() => {
                self.status("No devices found.");
                Ok(devices)
            }
            Ok(devices) => {
                self.status("Scan complete.");
                Ok(devices)
            }
            Err(e) => {
                self.status(&format!("Scan failed: {e}"));
                Err(EngineError::Scan(e))
            }
        }
    }

    async fn connect_labeled(&self, address: &str, label: &str) -> Result<PeerIdentity, EngineError> {
        let begun = self.shared.state.lock().await.session.begin(Role::Initiator);
        let link = match begun {
            Ok(link) => link,
            Err(e) => {
                tracing::debug!(addr = %address, reason = %e, "Outbound attempt refused");
                self.status("Already connected to a peer.");
                return Err(EngineError::AlreadyConnected);
            }
        };
        self.status(&format!("Connecting to {label}..."));
        match self.dial(link, address).await {
            Ok(peer) => Ok(peer),
            Err(e) => {
                self.shared.state.lock().await.session.abort(link);
                tracing::info!(link = %link, addr = %address, error = %e, "Outbound connection failed");
                self.status(&format!("Connection failed: {e}"));
                Err(e)
            }
        }
    }

    async fn dial(&self, link: LinkId, address: &str) -> Result<PeerIdentity, EngineError> {
        let stream = self.shared.transport.connect(address).await?;
        let (r, w) = split(stream);
        let mut reader = LineReader::new(r);
        let mut writer = LineWriter::new(w);
        let peer = handshake::initiate(&mut reader, &mut writer, &self.shared.local).await?;
        self.install(link, peer, reader, writer).await
    }

    /// Handshake done: go Active, start the receive loop, keep the writer.
    async fn install(
        &self,
        link: LinkId,
        peer: PeerIdentity,
        reader: LinkReader<T::Stream>,
        writer: LinkWriter<T::Stream>,
    ) -> Result<PeerIdentity, EngineError> {
        let mut state = self.shared.state.lock().await;
        state.session.activate(link, peer.clone())?;
        tracing::info!(link = %link, peer = %peer, "Link active");
        self.status(&format!("Connected to {peer}"));
        let engine = self.clone();
        let task = tokio::spawn(async move { engine.receive_loop(link, reader).await });
        state.link = Some(ActiveLink {
            id: link,
            writer: Arc::new(Mutex::new(writer)),
            receiver: task.abort_handle(),
            alive: watch::channel(()).0,
        });
        Ok(peer)
    }

    async fn receive_loop(self, link: LinkId, mut reader: LinkReader<T::Stream>) {
        loop {
            match reader.read_line().await {
                Ok(Some(line)) => match classify(&line) {
                    Incoming::Disconnect => {
                        self.close(link, Teardown::PeerClosed).await;
                        return;
                    }
                    Incoming::Chat(text) => self.shared.presenter.on_message(text),
                },
                Ok(None) => {
                    tracing::debug!(link = %link, "Peer closed the stream");
                    self.close(link, Teardown::Lost).await;
                    return;
                }
                Err(e) => {
                    tracing::warn!(link = %link, error = %e, "Read failed");
                    self.close(link, Teardown::Lost).await;
                    return;
                }
            }
        }
    }

    /// Send `"{local}: {text}"` to the peer. Returns the line as sent, for local echo.
    pub async fn send(&self, text: &str) -> Result<String, EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        let snapshot = {
            let state = self.shared.state.lock().await;
            let current = state.session.active_link();
            let found = match (current, state.link.as_ref()) {
                (Some(link), Some(active)) if active.id == link => {
                    Some((link, active.writer.clone(), active.alive.subscribe()))
                }
                _ => None,
            };
            found
        };
        let Some((link, writer, mut alive)) = snapshot else {
            self.status("Not connected.");
            return Err(EngineError::NotConnected);
        };
        let line = ChatMessage::new(&self.shared.local, text).to_line();
        let written = tokio::select! {
            written = async { writer.lock().await.write_line(&line).await } => written,
            _ = alive.changed() => {
                tracing::debug!(link = %link, "Link released while a send was pending");
                return Err(EngineError::NotConnected);
            }
        };
        match written {
            Ok(()) => Ok(line),
            Err(e) => {
                tracing::warn!(link = %link, error = %e, "Send failed");
                self.close(link, Teardown::SendFailed).await;
                Err(EngineError::SendFailed(e))
            }
        }
    }

    /// Local disconnect: best-effort sentinel, then release. Only one concurrent caller wins.
    /// Never waits on the peer.
    pub async fn disconnect(&self) -> Result<(), EngineError> {
        let mut state = self.shared.state.lock().await;
        let Some(link) = state.session.active_link() else {
            drop(state);
            self.status("No active connection to disconnect.");
            return Err(EngineError::NotConnected);
        };
        if let Some(active) = state.link.as_ref().filter(|a| a.id == link) {
            if let Err(e) = farewell(&active.writer).await {
                tracing::debug!(link = %link, error = %e, "Sentinel not delivered");
            }
        }
        self.release(&mut state, link, Teardown::Local);
        Ok(())
    }

    async fn close(&self, link: LinkId, why: Teardown) {
        let mut state = self.shared.state.lock().await;
        self.release(&mut state, link, why);
    }

    /// Active -> Idle for `link` under the state lock. No-op (false) for a stale or released link.
    fn release(&self, state: &mut State<T::Stream>, link: LinkId, why: Teardown) -> bool {
        let Some(peer) = state.session.release(link) else {
            return false;
        };
        if let Some(active) = state.link.take() {
            if why.stops_receiver() {
                active.receiver.abort();
            }
        }
        tracing::info!(link = %link, peer = %peer, reason = ?why, "Link closed");
        self.status(why.notice());
        true
    }
}

/// Write the sentinel only if that completes without waiting: skipped when a send holds the
/// writer or the peer has stopped reading.
async fn farewell<W: AsyncWrite + Unpin>(writer: &Mutex<LineWriter<W>>) -> io::Result<()> {
    let mut writer = writer
        .try_lock()
        .map_err(|_| io::Error::from(io::ErrorKind::WouldBlock))?;
    tokio::select! {
        biased;
        written = writer.write_line(DISCONNECT_SENTINEL) => written,
        _ = std::future::ready(()) => Err(io::Error::from(io::ErrorKind::WouldBlock)),
    }
}

/// Engine-level failure or policy rejection. Every one has already been reported as a status.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("already connected to a peer")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("message is empty")]
    EmptyMessage,
    #[error("no device found with name {0}")]
    DeviceNotFound(String),
    #[error("{0}")]
    Transport(#[from] io::Error),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("send failed: {0}")]
    SendFailed(io::Error),
    #[error("scan failed: {0}")]
    Scan(io::Error),
}

impl EngineError {
    /// Policy outcome rather than a failure; nothing was acquired, nothing to clean up.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EngineError::AlreadyConnected
                | EngineError::NotConnected
                | EngineError::EmptyMessage
                | EngineError::DeviceNotFound(_)
        )
    }
}
