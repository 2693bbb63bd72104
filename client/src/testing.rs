//! In-memory collaborators for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use enginelink_types::Envelope;
use tokio::sync::mpsc;

use crate::events::{EventSink, ProvisioningEvent};
use crate::provisioner::EngineProvisioner;
use crate::transport::Transport;

/// Records outbound envelopes and exposes the inbound channel so tests can
/// play the engine's side.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<Envelope>>,
    inbound: Mutex<Option<mpsc::Sender<Envelope>>>,
    started_port: Mutex<Option<u16>>,
    pub fail_start: AtomicBool,
    pub fail_sends: AtomicBool,
    pub shutdowns: AtomicUsize,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn started_port(&self) -> Option<u16> {
        *self.started_port.lock().unwrap()
    }

    /// Deliver an envelope as if the engine had sent it.
    pub async fn inject(&self, envelope: Envelope) {
        let tx = self
            .inbound
            .lock()
            .unwrap()
            .clone()
            .expect("transport not started");
        tx.send(envelope).await.expect("router gone");
    }
}

impl Transport for RecordingTransport {
    async fn start_service(&self, port: u16, inbound: mpsc::Sender<Envelope>) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        *self.started_port.lock().unwrap() = Some(port);
        *self.inbound.lock().unwrap() = Some(inbound);
        Ok(())
    }

    fn send(&self, envelope: Envelope) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            bail!("writer channel closed");
        }
        self.sent.lock().unwrap().push(envelope);
        Ok(())
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.inbound.lock().unwrap().take();
    }
}

/// Provisioner that records calls and emits the full provisioning sequence.
#[derive(Default)]
pub(crate) struct StubProvisioner {
    pub fail_initialize: AtomicBool,
    started_port: Mutex<Option<u16>>,
    pub shutdowns: AtomicUsize,
}

impl StubProvisioner {
    pub fn started_port(&self) -> Option<u16> {
        *self.started_port.lock().unwrap()
    }
}

impl EngineProvisioner for StubProvisioner {
    async fn initialize(&self, events: &EventSink) -> Result<()> {
        if self.fail_initialize.load(Ordering::SeqCst) {
            bail!("download failed");
        }
        events.provisioning(ProvisioningEvent::DownloadStarted);
        events.provisioning(ProvisioningEvent::DownloadEnded);
        events.provisioning(ProvisioningEvent::ExtractStarted);
        events.provisioning(ProvisioningEvent::ExtractEnded);
        Ok(())
    }

    async fn start_service(&self, port: u16) -> Result<()> {
        *self.started_port.lock().unwrap() = Some(port);
        Ok(())
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
