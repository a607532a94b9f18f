//! Syslog message receivers (UDP, TCP, and Unix datagram socket).
//!
//! Exactly one transport is bound per process. Every decoded message becomes
//! a [`StructuredRecord`](minisyslog_common::StructuredRecord) pushed onto
//! the dispatch channel; undecodable input is logged and dropped.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::BytesMut;
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket, UnixDatagram};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::config::{ListenerConfig, ListenerProtocol};
use crate::dispatch::{self, RecordSender};
use crate::framing::{FrameError, SyslogFrameCodec};
use crate::parser;

/// A bound listening endpoint.
#[derive(Debug)]
pub struct Listener {
    binding: Binding,
    max_message_size: usize,
    max_connections: usize,
    idle_timeout: Option<Duration>,
}

#[derive(Debug)]
enum Binding {
    Udp(UdpSocket),
    Tcp(TcpListener),
    Dgram { socket: UnixDatagram, path: PathBuf },
}

impl Listener {
    /// Bind the transport selected by `config`.
    ///
    /// Failure here is fatal for the process; nothing is retried.
    pub async fn bind(config: &ListenerConfig) -> Result<Self> {
        let address = config.bind_address();

        let binding = match config.protocol {
            ListenerProtocol::Udp => {
                let socket = UdpSocket::bind(&address)
                    .await
                    .with_context(|| format!("Failed to bind UDP socket to {}", address))?;
                Binding::Udp(socket)
            }
            ListenerProtocol::Tcp => {
                let listener = TcpListener::bind(&address)
                    .await
                    .with_context(|| format!("Failed to bind TCP socket to {}", address))?;
                Binding::Tcp(listener)
            }
            ListenerProtocol::Dgram => {
                let path = PathBuf::from(&address);
                let socket = bind_unix_datagram(&path, config)?;
                Binding::Dgram { socket, path }
            }
        };

        let listener = Self {
            binding,
            max_message_size: config.max_message_size,
            max_connections: config.max_connections,
            idle_timeout: config.connection_timeout_secs.map(Duration::from_secs),
        };

        tracing::info!(
            protocol = %listener.protocol(),
            address = %listener.describe_address(),
            "syslog listener started"
        );

        Ok(listener)
    }

    /// Transport of this listener.
    pub fn protocol(&self) -> ListenerProtocol {
        match self.binding {
            Binding::Udp(_) => ListenerProtocol::Udp,
            Binding::Tcp(_) => ListenerProtocol::Tcp,
            Binding::Dgram { .. } => ListenerProtocol::Dgram,
        }
    }

    /// Bound socket address, for the network transports.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.binding {
            Binding::Udp(socket) => socket.local_addr().ok(),
            Binding::Tcp(listener) => listener.local_addr().ok(),
            Binding::Dgram { .. } => None,
        }
    }

    /// Socket file, for the Unix datagram transport.
    pub fn socket_path(&self) -> Option<&Path> {
        match &self.binding {
            Binding::Dgram { path, .. } => Some(path),
            _ => None,
        }
    }

    fn describe_address(&self) -> String {
        match (self.local_addr(), self.socket_path()) {
            (Some(addr), _) => addr.to_string(),
            (None, Some(path)) => path.display().to_string(),
            (None, None) => String::from("-"),
        }
    }

    /// Run the listener on its own task.
    pub fn spawn(self, tx: RecordSender, shutdown: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(tx, shutdown))
    }

    /// Receive messages until `shutdown` fires or the render loop goes away.
    ///
    /// For TCP this also waits for every connection task to finish, so when
    /// it returns no sender clone created by this listener is left alive.
    pub async fn run(self, tx: RecordSender, shutdown: CancellationToken) -> Result<()> {
        let Self {
            binding,
            max_message_size,
            max_connections,
            idle_timeout,
        } = self;

        match binding {
            Binding::Udp(socket) => run_udp(socket, max_message_size, tx, shutdown).await,
            Binding::Tcp(listener) => {
                let limits = TcpLimits {
                    max_message_size,
                    max_connections,
                    idle_timeout,
                };
                run_tcp(listener, limits, tx, shutdown).await
            }
            Binding::Dgram { socket, path } => {
                let result = run_unix_datagram(&socket, max_message_size, tx, shutdown).await;
                drop(socket);
                remove_socket_file(&path);
                result
            }
        }
    }
}

/// Decode one message and hand it to the render loop.
///
/// Returns `false` once the render loop is gone.
fn deliver(tx: &RecordSender, data: &[u8], client: Option<String>) -> bool {
    match parser::decode(data, client) {
        Some(record) => dispatch::dispatch(tx, record),
        None => {
            tracing::debug!(
                "Failed to decode syslog message: {:?}",
                String::from_utf8_lossy(data)
            );
            true
        }
    }
}

async fn run_udp(
    socket: UdpSocket,
    max_message_size: usize,
    tx: RecordSender,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut buf = vec![0u8; max_message_size];

    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        match received {
            Ok((len, addr)) => {
                if !deliver(&tx, &buf[..len], Some(addr.to_string())) {
                    tracing::warn!("Dispatch channel closed");
                    break;
                }
            }
            Err(e) => {
                tracing::error!("UDP receive error: {}", e);
            }
        }
    }

    tracing::debug!("UDP listener stopped");
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct TcpLimits {
    max_message_size: usize,
    max_connections: usize,
    idle_timeout: Option<Duration>,
}

async fn run_tcp(
    listener: TcpListener,
    limits: TcpLimits,
    tx: RecordSender,
    shutdown: CancellationToken,
) -> Result<()> {
    let semaphore = Arc::new(Semaphore::new(limits.max_connections));
    let mut connections = JoinSet::new();

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => match semaphore.clone().try_acquire_owned() {
                Ok(permit) => {
                    let tx = tx.clone();
                    let shutdown = shutdown.clone();
                    connections.spawn(async move {
                        let _permit = permit;
                        if let Err(e) =
                            handle_tcp_connection(stream, addr, tx, limits, shutdown).await
                        {
                            tracing::debug!("TCP connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(_) => {
                    tracing::warn!("Max connections reached, rejecting {}", addr);
                    drop(stream);
                }
            },
            Err(e) => {
                tracing::error!("TCP accept error: {}", e);
            }
        }
    }

    drop(listener);
    drop(tx);
    while connections.join_next().await.is_some() {}

    tracing::debug!("TCP listener stopped");
    Ok(())
}

enum Frame {
    Message(BytesMut),
    Closed,
    Idle,
}

async fn next_frame(
    frames: &mut FramedRead<TcpStream, SyslogFrameCodec>,
    idle_timeout: Option<Duration>,
) -> Result<Frame, FrameError> {
    let next = match idle_timeout {
        Some(limit) => match timeout(limit, frames.next()).await {
            Ok(next) => next,
            Err(_) => return Ok(Frame::Idle),
        },
        None => frames.next().await,
    };

    match next {
        Some(frame) => frame.map(Frame::Message),
        None => Ok(Frame::Closed),
    }
}

/// Handle a single TCP connection.
async fn handle_tcp_connection(
    stream: TcpStream,
    addr: SocketAddr,
    tx: RecordSender,
    limits: TcpLimits,
    shutdown: CancellationToken,
) -> Result<(), FrameError> {
    tracing::debug!("TCP connection from {}", addr);

    let client = addr.to_string();
    let mut frames = FramedRead::new(stream, SyslogFrameCodec::new(limits.max_message_size));

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = next_frame(&mut frames, limits.idle_timeout) => frame?,
        };

        match frame {
            Frame::Message(data) => {
                if !deliver(&tx, &data, Some(client.clone())) {
                    break;
                }
            }
            Frame::Closed => break,
            Frame::Idle => {
                tracing::debug!("TCP connection timeout from {}", addr);
                break;
            }
        }
    }

    tracing::debug!("TCP connection closed from {}", addr);
    Ok(())
}

fn bind_unix_datagram(path: &Path, config: &ListenerConfig) -> Result<UnixDatagram> {
    if config.remove_existing_socket && path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove existing socket at {}", path.display()))?;
    }

    let socket = UnixDatagram::bind(path)
        .with_context(|| format!("Failed to bind Unix socket to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(config.socket_mode);
        std::fs::set_permissions(path, permissions)
            .with_context(|| format!("Failed to set permissions on socket {}", path.display()))?;
    }

    Ok(socket)
}

async fn run_unix_datagram(
    socket: &UnixDatagram,
    max_message_size: usize,
    tx: RecordSender,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut buf = vec![0u8; max_message_size];

    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        match received {
            Ok((len, peer)) => {
                let client = peer.as_pathname().map(|p| p.display().to_string());
                if !deliver(&tx, &buf[..len], client) {
                    tracing::warn!("Dispatch channel closed");
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Unix receive error: {}", e);
            }
        }
    }

    tracing::debug!("Unix listener stopped");
    Ok(())
}

fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed socket {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove socket {}: {}", path.display(), e),
    }
}
