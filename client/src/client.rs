//! `EngineClient` facade: the API thin callers build on.
//!
//! `start()` provisions and launches the engine, connects the transport and
//! blocks until the engine signals readiness (or fails, or the startup
//! window closes). After that every send-family method registers its
//! callback, if any, and hands the envelope to the transport. Replies are
//! matched by the router task.

use std::net::{IpAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use enginelink_types::{CorrelationId, Envelope, Payload};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::correlation::{CorrelationTable, IdAllocator};
use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, EventBus};
use crate::gate::{Readiness, ReadinessGate};
use crate::provisioner::{EngineProvisioner, ProcessProvisioner};
use crate::router;
use crate::transport::{TcpTransport, Transport};
use crate::types::ClientConfig;

/// Channel capacity between the transport reader and the router.
const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// State shared between the client and its router task.
pub(crate) struct Core<T> {
    pub(crate) transport: T,
    pub(crate) table: CorrelationTable,
    pub(crate) gate: ReadinessGate,
    pub(crate) events: EventBus,
    pub(crate) ids: IdAllocator,
    disposed: AtomicBool,
}

impl<T: Transport> Core<T> {
    pub(crate) fn new(transport: T) -> Self {
        Self {
            transport,
            table: CorrelationTable::new(),
            gate: ReadinessGate::new(),
            events: EventBus::new(),
            ids: IdAllocator::new(),
            disposed: AtomicBool::new(false),
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn transmit(&self, envelope: Envelope) -> Result<()> {
        self.transport
            .send(envelope.clone())
            .map_err(ClientError::Transport)?;
        self.events.publish(ClientEvent::MessageSent(envelope));
        Ok(())
    }
}

/// Ask the OS for a free loopback port. The listener is released before the
/// engine binds, so another process could in principle take the port first.
fn pick_free_port(host: IpAddr) -> Result<u16> {
    let listener = TcpListener::bind((host, 0)).map_err(ClientError::PortSelection)?;
    let port = listener
        .local_addr()
        .map_err(ClientError::PortSelection)?
        .port();
    Ok(port)
}

/// Client for one locally spawned engine instance.
///
/// All methods take `&self`; wrap the client in an `Arc` to share it across
/// tasks. Callbacks run on the router task and may call back into the
/// client.
pub struct EngineClient<P = ProcessProvisioner, T = TcpTransport> {
    core: Arc<Core<T>>,
    provisioner: P,
    config: ClientConfig,
    router: Mutex<Option<JoinHandle<()>>>,
}

impl EngineClient {
    /// A client that runs the configured engine executable and talks to it
    /// over loopback TCP.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let provisioner = ProcessProvisioner::new(config.engine.clone());
        let transport = TcpTransport::new(config.host, config.connect_timeout());
        Self::with_collaborators(config, provisioner, transport)
    }
}

impl<P: EngineProvisioner, T: Transport> EngineClient<P, T> {
    #[must_use]
    pub fn with_collaborators(config: ClientConfig, provisioner: P, transport: T) -> Self {
        Self {
            core: Arc::new(Core::new(transport)),
            provisioner,
            config,
            router: Mutex::new(None),
        }
    }

    /// Provision, launch and connect to the engine, then wait for it to
    /// signal readiness.
    ///
    /// Provisioning and transport failures return immediately. Otherwise this
    /// resolves when the engine reports its worker thread started (`Ok`),
    /// rejects the session (`AuthenticationFailure`), or stays silent for
    /// the startup window (`StartupTimeout`). Calling `start` twice is not
    /// supported.
    pub async fn start(&self) -> Result<()> {
        if self.core.is_disposed() {
            return Err(ClientError::Disposed);
        }

        tracing::info!("Provisioning engine");
        self.provisioner
            .initialize(self.core.events.sink())
            .await
            .map_err(ClientError::Provisioning)?;

        let port = match self.config.port {
            Some(port) => port,
            None => pick_free_port(self.config.host)?,
        };

        tracing::info!(port, "Starting engine service");
        self.provisioner
            .start_service(port)
            .await
            .map_err(ClientError::Provisioning)?;

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let router = tokio::spawn(router::run(self.core.clone(), inbound_rx));
        if let Some(previous) = self.router_slot().replace(router) {
            previous.abort();
        }

        self.core
            .transport
            .start_service(port, inbound_tx)
            .await
            .map_err(ClientError::Transport)?;

        let timeout = self.config.startup_timeout();
        let outcome = self.core.gate.wait(timeout).await;
        if self.core.is_disposed() {
            return Err(ClientError::Disposed);
        }

        match outcome {
            Readiness::Ready => {
                tracing::info!(port, "Engine ready");
                Ok(())
            }
            Readiness::Failed(reason) => Err(ClientError::AuthenticationFailure(reason)),
            Readiness::Disposed => Err(ClientError::Disposed),
            Readiness::TimedOut | Readiness::Pending => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Engine did not signal readiness"
                );
                Err(ClientError::StartupTimeout(timeout))
            }
        }
    }

    fn router_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.router.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.core.is_disposed() {
            return Err(ClientError::Disposed);
        }
        if !self.core.gate.is_ready() {
            return Err(ClientError::ClientNotStarted);
        }
        Ok(())
    }

    /// Send a correlated envelope already registered under `id`. Undo the
    /// registration if the transport refuses it.
    fn transmit_registered(
        &self,
        kind: String,
        id: CorrelationId,
        data: Option<Payload>,
    ) -> Result<CorrelationId> {
        if let Err(e) = self.core.transmit(Envelope::correlated(kind, id, data)) {
            self.core.table.cancel(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Fire-and-forget. The returned id is informational; nothing waits for
    /// a reply.
    pub fn send(&self, kind: impl Into<String>, data: Option<Payload>) -> Result<CorrelationId> {
        self.ensure_ready()?;
        let id = self.core.ids.next_id();
        self.core
            .transmit(Envelope::fire_and_forget(kind, id, data))?;
        Ok(id)
    }

    /// Send and invoke `callback` once with the reply payload.
    pub fn send_with_reply<F>(
        &self,
        kind: impl Into<String>,
        data: Option<Payload>,
        callback: F,
    ) -> Result<CorrelationId>
    where
        F: FnOnce(Option<Payload>) + Send + 'static,
    {
        self.ensure_ready()?;
        let id = self
            .core
            .table
            .register_fresh_with_payload(&self.core.ids, Box::new(callback))
            .map_err(|_| ClientError::Disposed)?;
        self.transmit_registered(kind.into(), id, data)
    }

    /// Send and invoke `callback` once when the reply arrives.
    pub fn send_with_ack<F>(
        &self,
        kind: impl Into<String>,
        data: Option<Payload>,
        callback: F,
    ) -> Result<CorrelationId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_ready()?;
        let id = self
            .core
            .table
            .register_fresh_no_payload(&self.core.ids, Box::new(callback))
            .map_err(|_| ClientError::Disposed)?;
        self.transmit_registered(kind.into(), id, data)
    }

    /// Send and wait for the reply payload.
    ///
    /// There is no per-request timeout: this waits until the engine replies
    /// or the client is disposed.
    pub async fn request(
        &self,
        kind: impl Into<String>,
        data: Option<Payload>,
    ) -> Result<Option<Payload>> {
        let (tx, rx) = oneshot::channel();
        self.send_with_reply(kind, data, move |payload| {
            let _ = tx.send(payload);
        })?;
        rx.await.map_err(|_| ClientError::Disposed)
    }

    /// Send and wait until the engine acknowledges.
    pub async fn request_ack(&self, kind: impl Into<String>, data: Option<Payload>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send_with_ack(kind, data, move || {
            let _ = tx.send(());
        })?;
        rx.await.map_err(|_| ClientError::Disposed)
    }

    /// Observe inbound envelopes, sent envelopes and provisioning progress.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.core.events.subscribe()
    }

    #[must_use]
    pub fn readiness(&self) -> Readiness {
        self.core.gate.state()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.core.is_disposed() && self.core.gate.is_ready()
    }

    /// Number of correlated requests still waiting for a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.core.table.len()
    }

    /// Release the transport and the engine. Pending requests are dropped
    /// without their callbacks firing; awaiting callers get `Disposed`.
    /// Later calls on this client fail with `Disposed`.
    pub async fn dispose(&self) {
        if self.core.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.core.gate.close();
        let dropped = self.core.table.close();
        if dropped > 0 {
            tracing::debug!(dropped, "Dropped pending requests on dispose");
        }

        self.core.transport.shutdown().await;
        self.provisioner.shutdown().await;

        let router = self.router_slot().take();
        if let Some(router) = router {
            router.abort();
        }
        tracing::info!("Engine client disposed");
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Core<T> {
        &self.core
    }

    #[cfg(test)]
    pub(crate) fn provisioner(&self) -> &P {
        &self.provisioner
    }
}

impl<P, T> Drop for EngineClient<P, T> {
    fn drop(&mut self) {
        if let Some(router) = self
            .router
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            router.abort();
        }
    }
}
