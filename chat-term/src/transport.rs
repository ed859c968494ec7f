//! Stream transport the engine runs on: listen/accept for inbound, connect for outbound.
//! TCP in production; in-memory duplex pipes in tests.

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

/// Connection-oriented, reliable, ordered byte-stream transport.
pub trait Transport: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;
    type Listener: Listener<Stream = Self::Stream>;

    /// Start accepting inbound connections.
    fn listen(&self) -> impl Future<Output = io::Result<Self::Listener>> + Send;

    /// Open a fresh connection to `address`.
    fn connect(&self, address: &str) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

pub trait Listener: Send + 'static {
    type Stream;

    /// Wait for the next inbound connection. Returns the stream and a printable remote address.
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, String)>> + Send;
}

/// TCP transport: listens on `bind`, dials `host:port` (port defaults to `default_port`).
#[derive(Debug, Clone)]
pub struct TcpTransport {
    bind: SocketAddr,
    default_port: u16,
}

impl TcpTransport {
    pub fn new(bind: SocketAddr, default_port: u16) -> Self {
        Self { bind, default_port }
    }

    fn dial_target(&self, address: &str) -> String {
        let address = address.trim();
        if let Ok(ip) = address.parse::<IpAddr>() {
            return SocketAddr::new(ip, self.default_port).to_string();
        }
        if address.parse::<SocketAddr>().is_ok() || address.rsplit_once(':').is_some() {
            address.to_string()
        } else {
            format!("{}:{}", address, self.default_port)
        }
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;
    type Listener = TcpAcceptor;

    async fn listen(&self) -> io::Result<TcpAcceptor> {
        let acceptor = TcpAcceptor {
            listener: TcpListener::bind(self.bind).await?,
        };
        tracing::info!(addr = %acceptor.local_addr()?, "Listening for inbound connections");
        Ok(acceptor)
    }

    async fn connect(&self, address: &str) -> io::Result<TcpStream> {
        let target = self.dial_target(address);
        let stream = TcpStream::connect(&target).await?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(addr = %target, error = %e, "Failed to set TCP_NODELAY");
        }
        Ok(stream)
    }
}

pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    /// Bound address, with the real port when bound to port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Listener for TcpAcceptor {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, String)> {
        let (stream, addr) = self.listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(addr = %addr, error = %e, "Failed to set TCP_NODELAY");
        }
        Ok((stream, addr.to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dial_target_adds_default_port() {
        let t = TcpTransport::new("127.0.0.1:0".parse().unwrap(), 47_100);
        assert_eq!(t.dial_target("10.0.0.7"), "10.0.0.7:47100");
        assert_eq!(t.dial_target("10.0.0.7:9000"), "10.0.0.7:9000");
        assert_eq!(t.dial_target(" peer.local "), "peer.local:47100");
        assert_eq!(t.dial_target("[::1]:9000"), "[::1]:9000");
    }

    #[test]
    fn bare_ipv6_literal_gets_default_port() {
        let t = TcpTransport::new("127.0.0.1:0".parse().unwrap(), 47_100);
        assert_eq!(t.dial_target("fe80::1"), "[fe80::1]:47100");
        assert_eq!(t.dial_target("::1"), "[::1]:47100");
    }

    #[tokio::test]
    async fn tcp_listen_connect_accept() {
        let t = TcpTransport::new("127.0.0.1:0".parse().unwrap(), 47_100);
        let mut acceptor = t.listen().await.unwrap();
        let addr = acceptor.local_addr().unwrap();
        let dial = tokio::spawn(async move { t.connect(&addr.to_string()).await });
        let (_stream, remote) = acceptor.accept().await.unwrap();
        assert!(remote.starts_with("127.0.0.1:"));
        assert!(dial.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn memory_write_fault_leaves_reads_open() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let net = memory::MemoryNetwork::new();
        let mut listener = net.transport("a").listen().await.unwrap();
        let mut ours = net.transport("b").connect("a").await.unwrap();
        let (mut theirs, from) = listener.accept().await.unwrap();
        assert_eq!(from, "b");

        net.break_writes("a");
        let err = theirs.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);

        ours.write_all(b"y").await.unwrap();
        let mut byte = [0u8; 1];
        theirs.read_exact(&mut byte).await.unwrap();
        assert_eq!(&byte, b"y");
    }
}
