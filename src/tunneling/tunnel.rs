use std::{fmt, net::SocketAddr};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TunnelError;

use super::session::{BoxedStream, Dialer, RemoteTarget};

const RELAY_BUFFER_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// local client -> remote channel
    Upstream,
    /// remote channel -> local client
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => f.write_str("local -> remote"),
            Direction::Downstream => f.write_str("remote -> local"),
        }
    }
}

/// How a relay direction stopped.
#[derive(Debug)]
pub(crate) enum RelayEnd {
    Eof,
    Cancelled,
    Failed(TunnelError),
}

/// Bytes moved by a finished tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct TunnelSummary {
    pub upstream: u64,
    pub downstream: u64,
}

pub(crate) struct Tunnel;

impl Tunnel {
    /// Opens the remote channel for an accepted local connection. A failure only
    /// concerns this connection, the caller drops `local`.
    pub async fn establish<D>(
        dialer: &D,
        local: TcpStream,
        peer: SocketAddr,
        target: &RemoteTarget,
    ) -> Result<LiveTunnel, TunnelError>
    where
        D: Dialer + ?Sized,
    {
        let remote = dialer.open_channel(target, peer).await?;
        info!(
            "Tunnel established: local [{}] <-> remote [{}]",
            peer, target
        );
        Ok(LiveTunnel::new(peer, target.clone(), local, remote))
    }
}

/// One local connection paired with its remote channel.
pub(crate) struct LiveTunnel {
    peer: SocketAddr,
    target: RemoteTarget,
    local: TcpStream,
    remote: BoxedStream,
    cancel: CancellationToken,
}

impl LiveTunnel {
    pub fn new(
        peer: SocketAddr,
        target: RemoteTarget,
        local: TcpStream,
        remote: BoxedStream,
    ) -> Self {
        LiveTunnel {
            peer,
            target,
            local,
            remote,
            cancel: CancellationToken::new(),
        }
    }

    /// Relays both directions until one of them stops, then closes both ends.
    /// Returns once both relay tasks are joined and both handles are closed.
    pub async fn run(self) -> TunnelSummary {
        let LiveTunnel {
            peer,
            target,
            local,
            remote,
            cancel,
        } = self;

        let (local_read, local_write) = local.into_split();
        let (remote_read, remote_write) = tokio::io::split(remote);

        let upstream = tokio::spawn(relay(
            local_read,
            remote_write,
            cancel.clone(),
            Direction::Upstream,
        ));
        let downstream = tokio::spawn(relay(
            remote_read,
            local_write,
            cancel.clone(),
            Direction::Downstream,
        ));
        let (upstream, downstream) = futures::future::join(upstream, downstream).await;

        let mut summary = TunnelSummary::default();
        let mut handles = TunnelHandles::default();
        match upstream {
            Ok(outcome) => {
                summary.upstream = outcome.transferred;
                handles.local_read = Some(outcome.reader);
                handles.remote_write = Some(outcome.writer);
            }
            Err(e) => warn!("{} relay for {} panicked: {}", Direction::Upstream, peer, e),
        }
        match downstream {
            Ok(outcome) => {
                summary.downstream = outcome.transferred;
                handles.remote_read = Some(outcome.reader);
                handles.local_write = Some(outcome.writer);
            }
            Err(e) => warn!("{} relay for {} panicked: {}", Direction::Downstream, peer, e),
        }
        handles.close().await;

        info!(
            "Tunnel closed for: {} -> {} ({} bytes up, {} bytes down)",
            peer, target, summary.upstream, summary.downstream
        );
        summary
    }
}

struct RelayOutcome<R, W> {
    reader: R,
    writer: W,
    transferred: u64,
}

/// Copies `reader` into `writer` until end of stream, an I/O error, or the
/// other direction finishing. Whichever way it stops, it cancels the other.
async fn relay<R, W>(
    mut reader: R,
    mut writer: W,
    cancel: CancellationToken,
    direction: Direction,
) -> RelayOutcome<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut transferred = 0u64;

    let end = loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break RelayEnd::Cancelled,
            res = reader.read(&mut buf) => res,
        };
        let n = match read {
            Ok(0) => break RelayEnd::Eof,
            Ok(n) => n,
            Err(e) => break RelayEnd::Failed(relay_error(e)),
        };
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => break RelayEnd::Cancelled,
            res = write_chunk(&mut writer, &buf[..n]) => res,
        };
        if let Err(e) = written {
            break RelayEnd::Failed(relay_error(e));
        }
        transferred += n as u64;
    };
    cancel.cancel();

    match end {
        RelayEnd::Failed(e) => warn!("{} relay stopped: {}", direction, e),
        RelayEnd::Eof => debug!("{} relay reached end of stream", direction),
        RelayEnd::Cancelled => debug!("{} relay cancelled", direction),
    }

    RelayOutcome {
        reader,
        writer,
        transferred,
    }
}

async fn write_chunk<W: AsyncWrite + Unpin>(writer: &mut W, chunk: &[u8]) -> std::io::Result<()> {
    writer.write_all(chunk).await?;
    writer.flush().await
}

fn relay_error(e: std::io::Error) -> TunnelError {
    let str = e.to_string();
    TunnelError::RelayIo(e, str)
}

/// Both ends of a tunnel after the relays gave them back.
#[derive(Default)]
pub(crate) struct TunnelHandles {
    local_read: Option<OwnedReadHalf>,
    local_write: Option<OwnedWriteHalf>,
    remote_read: Option<ReadHalf<BoxedStream>>,
    remote_write: Option<WriteHalf<BoxedStream>>,
}

impl TunnelHandles {
    /// Shuts down and drops whatever is still open. Returns `false` when there
    /// was nothing left to close.
    pub async fn close(&mut self) -> bool {
        let mut closed = false;
        if let Some(mut writer) = self.remote_write.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("remote shutdown: {}", e);
            }
            closed = true;
        }
        if let Some(mut writer) = self.local_write.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("local shutdown: {}", e);
            }
            closed = true;
        }
        closed |= self.local_read.take().is_some();
        closed |= self.remote_read.take().is_some();
        closed
    }
}
