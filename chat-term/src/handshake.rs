//! Name exchange run right after a raw connection is up, before the link is usable.

use std::future::Future;

use chat_core::{parse_peer_name, HandshakeError, LocalIdentity, PeerIdentity};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{LineReader, LineWriter};

/// Outcome of the acceptor role.
#[derive(Debug)]
pub enum Acceptance {
    Approved(PeerIdentity),
    /// Gate said no. Caller closes the connection; nothing more is sent.
    Rejected(PeerIdentity),
}

/// Acceptor: read the candidate's name, ask `approve`, and only if approved send ours.
pub async fn accept<R, W, F, Fut>(
    reader: &mut LineReader<R>,
    writer: &mut LineWriter<W>,
    local: &LocalIdentity,
    approve: F,
) -> Result<Acceptance, HandshakeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnOnce(PeerIdentity) -> Fut,
    Fut: Future<Output = bool>,
{
    let candidate = read_peer_name(reader).await?;
    if !approve(candidate.clone()).await {
        return Ok(Acceptance::Rejected(candidate));
    }
    writer.write_line(local.as_str()).await?;
    Ok(Acceptance::Approved(candidate))
}

/// Initiator: send our name first, then read the peer's.
pub async fn initiate<R, W>(
    reader: &mut LineReader<R>,
    writer: &mut LineWriter<W>,
    local: &LocalIdentity,
) -> Result<PeerIdentity, HandshakeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_line(local.as_str()).await?;
    read_peer_name(reader).await
}

async fn read_peer_name<R: AsyncRead + Unpin>(
    reader: &mut LineReader<R>,
) -> Result<PeerIdentity, HandshakeError> {
    let line = reader.read_line().await?;
    parse_peer_name(line.as_deref())
}
