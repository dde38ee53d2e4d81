//! # Connection Supervisor
//!
//! Owns the transport to the RTU-over-TCP converter. The supervisor connects,
//! runs one session per established connection, and reconnects after a
//! fixed wait when the session is lost. While a session runs it is the only
//! reader of the stream, so frames reach [`LinkEvents::on_frame`] in arrival
//! order.
//!
//! ## State machine
//!
//! ```text
//! Disconnected ──attempt──▶ Connecting ──ok──▶ Connected
//!       ▲                       │                  │
//!       └──────── fail ─────────┘◀──── EOF/error ──┘
//! ```
//!
//! The transport is abstracted behind [`Connector`] so tests can supply an
//! in-memory stream.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::GatewayConfig;
use crate::constants::READ_CHUNK_SIZE;
use crate::frame::{Frame, FrameAssembler};
use crate::logging::log_packet;
use crate::stats::StatsCounters;

/// Supervisor connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Connection state shared between the supervisor and the scheduling loops
#[derive(Debug, Default)]
pub struct LinkState {
    state: Mutex<ConnectionState>,
}

impl LinkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn get(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the state, returning the previous one
    pub fn set(&self, next: ConnectionState) -> ConnectionState {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *state, next)
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionState::Connected
    }
}

/// Transport factory used by the supervisor
pub trait Connector: Send + Sync + 'static {
    /// Byte stream produced by one successful connect
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a new stream to `host:port`
    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// TCP transport with `TCP_NODELAY` set
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = io::Result<Self::Stream>> + Send {
        let addr = format!("{}:{}", host, port);
        async move {
            debug!("TCP connecting: {}", addr);
            let stream = TcpStream::connect(&addr).await?;
            if let Err(e) = stream.set_nodelay(true) {
                debug!("TCP_NODELAY: {}", e);
            }
            Ok(stream)
        }
    }
}

/// Receiver of supervisor events
pub trait LinkEvents: Send + Sync + 'static {
    /// Connectivity changed
    fn on_connectivity(&self, connected: bool);

    /// A CRC-valid frame arrived
    fn on_frame(&self, frame: Frame);
}

/// Supervisor settings taken from [`GatewayConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    pub host: String,
    pub port: u16,
    pub reconnect_interval: Duration,
    pub connect_timeout: Duration,
    pub max_buffered_bytes: usize,
    pub packet_logging: bool,
}

impl LinkSettings {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&GatewayConfig> for LinkSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            reconnect_interval: config.reconnect_interval,
            connect_timeout: config.connect_timeout,
            max_buffered_bytes: config.max_buffered_bytes,
            packet_logging: config.packet_logging,
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Peer closed or an I/O error occurred
    Lost,
    /// Shutdown was requested
    Cancelled,
}

/// Connect/reconnect loop for one gateway run
pub struct ConnectionSupervisor<C: Connector> {
    connector: Arc<C>,
    settings: LinkSettings,
    link: Arc<LinkState>,
    stats: Arc<StatsCounters>,
}

impl<C: Connector> ConnectionSupervisor<C> {
    pub fn new(
        connector: Arc<C>,
        settings: LinkSettings,
        link: Arc<LinkState>,
        stats: Arc<StatsCounters>,
    ) -> Self {
        Self {
            connector,
            settings,
            link,
            stats,
        }
    }

    /// Run until `cancel` fires
    ///
    /// `outbound` carries commands from the transmit loop. Commands left in
    /// it from a previous session are discarded on reconnect.
    pub async fn run<E: LinkEvents>(
        self,
        events: Arc<E>,
        mut outbound: mpsc::Receiver<Command>,
        cancel: CancellationToken,
    ) {
        let endpoint = self.settings.endpoint();
        let mut online = false;

        while !cancel.is_cancelled() {
            self.link.set(ConnectionState::Connecting);
            self.stats.record_connect_attempt();

            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = timeout(
                    self.settings.connect_timeout,
                    self.connector.connect(&self.settings.host, self.settings.port),
                ) => result,
            };

            match attempt {
                Ok(Ok(stream)) => {
                    let mut stale = 0usize;
                    while outbound.try_recv().is_ok() {
                        stale += 1;
                    }
                    if stale > 0 {
                        debug!("Discarded {} commands queued for a previous session", stale);
                    }

                    self.link.set(ConnectionState::Connected);
                    self.stats.record_connected();
                    info!("Connected to {}", endpoint);
                    publish(events.as_ref(), &mut online, true);

                    let end = self
                        .run_session(stream, events.as_ref(), &mut outbound, &cancel)
                        .await;

                    self.link.set(ConnectionState::Disconnected);
                    publish(events.as_ref(), &mut online, false);
                    match end {
                        SessionEnd::Cancelled => {
                            info!("Disconnected from {}", endpoint);
                            break;
                        }
                        SessionEnd::Lost => {
                            self.stats.record_disconnect();
                            warn!(
                                "Connection to {} lost, retrying in {:?}",
                                endpoint, self.settings.reconnect_interval
                            );
                        }
                    }
                }
                Ok(Err(e)) => {
                    self.link.set(ConnectionState::Disconnected);
                    publish(events.as_ref(), &mut online, false);
                    warn!(
                        "Connect to {} failed: {}, retrying in {:?}",
                        endpoint, e, self.settings.reconnect_interval
                    );
                }
                Err(_) => {
                    self.link.set(ConnectionState::Disconnected);
                    publish(events.as_ref(), &mut online, false);
                    warn!(
                        "Connect to {} timed out after {:?}, retrying in {:?}",
                        endpoint, self.settings.connect_timeout, self.settings.reconnect_interval
                    );
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(self.settings.reconnect_interval) => {}
            }
        }

        self.link.set(ConnectionState::Disconnected);
        publish(events.as_ref(), &mut online, false);
        debug!("Connection supervisor for {} stopped", endpoint);
    }

    async fn run_session<E: LinkEvents>(
        &self,
        stream: C::Stream,
        events: &E,
        outbound: &mut mpsc::Receiver<Command>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut assembler = FrameAssembler::with_max_buffered(self.settings.max_buffered_bytes);
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let packet_logging = self.settings.packet_logging;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if let Err(e) = writer.shutdown().await {
                        debug!("Shutdown: {}", e);
                    }
                    return SessionEnd::Cancelled;
                }
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        warn!("Connection closed by peer");
                        return SessionEnd::Lost;
                    }
                    Ok(n) => {
                        let chunk = &buf[..n];
                        self.stats.record_bytes_received(n);
                        log_packet("RX", chunk, packet_logging);

                        let before = assembler.stats();
                        let frames = assembler.push(chunk);
                        self.stats.record_assembler(before, assembler.stats());
                        for frame in frames {
                            events.on_frame(frame);
                        }
                    }
                    Err(e) => {
                        warn!("Read error: {}", e);
                        return SessionEnd::Lost;
                    }
                },
                command = outbound.recv() => match command {
                    Some(command) => {
                        log_packet("TX", command.as_bytes(), packet_logging);
                        if let Err(e) = writer.write_all(command.as_bytes()).await {
                            warn!("Write error: {}", e);
                            return SessionEnd::Lost;
                        }
                        self.stats.record_bytes_sent(command.len());
                    }
                    None => {
                        // Transmit side is gone: the run is ending
                        if let Err(e) = writer.shutdown().await {
                            debug!("Shutdown: {}", e);
                        }
                        return SessionEnd::Cancelled;
                    }
                },
            }
        }
    }
}

/// Notify `events` when connectivity differs from the last published value
fn publish<E: LinkEvents>(events: &E, online: &mut bool, connected: bool) {
    if *online != connected {
        *online = connected;
        events.on_connectivity(connected);
    }
}
