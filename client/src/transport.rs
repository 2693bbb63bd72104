//! Socket transport between the client and the engine.
//!
//! [`Transport`] is the seam the runtime sends through and receives from.
//! [`TcpTransport`] connects to the engine over loopback TCP and runs one
//! writer task and one reader task, mirroring how envelopes flow: callers
//! enqueue outbound envelopes without blocking, and the reader forwards
//! inbound envelopes in arrival order to a single consumer.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use enginelink_types::Envelope;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::codec::{EnvelopeReader, EnvelopeWriter, UndecodableFrame};

const CONNECT_INITIAL_BACKOFF: Duration = Duration::from_millis(50);

const CONNECT_MAX_BACKOFF: Duration = Duration::from_secs(1);

pub trait Transport: Send + Sync + 'static {
    /// Connect to the engine on `port` and begin delivering inbound
    /// envelopes to `inbound`, in the order they arrive.
    fn start_service(
        &self,
        port: u16,
        inbound: mpsc::Sender<Envelope>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Enqueue an envelope for delivery. Never blocks.
    fn send(&self, envelope: Envelope) -> Result<()>;

    /// Close the connection. Must be safe to call more than once.
    fn shutdown(&self) -> impl Future<Output = ()> + Send;
}

enum WriterCommand {
    Send(Envelope),
    Shutdown,
}

struct Connection {
    writer_tx: mpsc::UnboundedSender<WriterCommand>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

/// Exponential backoff for the initial connect; the engine may still be
/// binding its listener when the client starts dialing.
fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(CONNECT_MAX_BACKOFF)
}

async fn connect_with_retry(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let deadline = Instant::now() + timeout;
    let mut backoff = CONNECT_INITIAL_BACKOFF;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                tracing::debug!(%addr, attempt, "Connected to engine");
                return Ok(stream);
            }
            Err(e) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(e).with_context(|| {
                        format!("connecting to {addr} ({attempt} attempts)")
                    });
                }
                tracing::trace!(%addr, attempt, "Engine not accepting yet: {e}");
                tokio::time::sleep(backoff.min(deadline - now)).await;
                backoff = next_backoff(backoff);
            }
        }
    }
}

/// Loopback TCP transport carrying `Content-Length` framed JSON envelopes.
pub struct TcpTransport {
    host: IpAddr,
    connect_timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl TcpTransport {
    #[must_use]
    pub fn new(host: IpAddr, connect_timeout: Duration) -> Self {
        Self {
            host,
            connect_timeout,
            connection: Mutex::new(None),
        }
    }

    fn connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_tasks(stream: TcpStream, inbound: mpsc::Sender<Envelope>) -> Connection {
        let peer = stream
            .peer_addr()
            .map_or_else(|_| "engine".to_string(), |a| a.to_string());
        let (read_half, write_half) = stream.into_split();

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<WriterCommand>();
        let writer_handle = tokio::spawn(async move {
            let mut writer = EnvelopeWriter::new(write_half);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(envelope) => {
                        if let Err(e) = writer.write_envelope(&envelope).await {
                            tracing::warn!("Engine write error: {e:#}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let reader_handle = tokio::spawn(async move {
            let mut reader = EnvelopeReader::new(read_half);
            loop {
                match reader.read_envelope().await {
                    Ok(Some(envelope)) => {
                        if inbound.send(envelope).await.is_err() {
                            tracing::debug!("Inbound consumer gone; stopping reader for {peer}");
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Engine at {peer} closed the connection");
                        break;
                    }
                    Err(e) if e.is::<UndecodableFrame>() => {
                        tracing::warn!("Skipping frame from {peer}: {e:#}");
                    }
                    Err(e) => {
                        tracing::warn!("Engine read error from {peer}: {e:#}");
                        break;
                    }
                }
            }
        });

        Connection {
            writer_tx,
            reader_handle,
            writer_handle,
        }
    }
}

impl Transport for TcpTransport {
    async fn start_service(&self, port: u16, inbound: mpsc::Sender<Envelope>) -> Result<()> {
        if self.connection().is_some() {
            bail!("transport already started");
        }

        let addr = SocketAddr::new(self.host, port);
        let stream = connect_with_retry(addr, self.connect_timeout).await?;
        stream.set_nodelay(true).context("setting TCP_NODELAY")?;

        let connection = Self::spawn_tasks(stream, inbound);
        *self.connection() = Some(connection);
        tracing::info!(%addr, "Transport connected");
        Ok(())
    }

    fn send(&self, envelope: Envelope) -> Result<()> {
        let guard = self.connection();
        let connection = guard.as_ref().context("transport not started")?;
        connection
            .writer_tx
            .send(WriterCommand::Send(envelope))
            .map_err(|_| anyhow!("writer channel closed"))
    }

    async fn shutdown(&self) {
        let connection = self.connection().take();
        let Some(connection) = connection else {
            return;
        };

        let _ = connection.writer_tx.send(WriterCommand::Shutdown);
        connection.reader_handle.abort();
        if connection.writer_handle.await.is_err() {
            tracing::debug!("Transport writer task ended abnormally");
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(connection) = self.connection().take() {
            connection.reader_handle.abort();
            connection.writer_handle.abort();
        }
    }
}
