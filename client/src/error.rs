//! Errors surfaced to callers of [`EngineClient`](crate::EngineClient).

use std::time::Duration;

use enginelink_types::CorrelationId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// A send was attempted before the engine signalled readiness.
    #[error("client not started: the engine has not signalled readiness")]
    ClientNotStarted,

    /// The client has been disposed; no further operations are valid.
    #[error("client has been disposed")]
    Disposed,

    /// The engine rejected the session during the startup handshake.
    #[error("engine authentication failed: {0}")]
    AuthenticationFailure(String),

    /// The engine did not signal readiness within the startup window.
    #[error("engine did not become ready within {}s", .0.as_secs())]
    StartupTimeout(Duration),

    #[error("engine provisioning failed: {0:#}")]
    Provisioning(anyhow::Error),

    #[error("transport failed: {0:#}")]
    Transport(anyhow::Error),

    #[error("could not select a port for the engine: {0}")]
    PortSelection(#[source] std::io::Error),
}

/// Why a correlated callback could not be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// The id is still pending in either map.
    #[error("correlation id {0} is already pending")]
    Duplicate(CorrelationId),

    /// The table was closed by disposal.
    #[error("correlation table is closed")]
    Closed,
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
