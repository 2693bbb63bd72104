//! Client runtime for a locally spawned automation engine.
//!
//! Turns the engine's bidirectional envelope stream into correlated
//! request/response calls: a bounded startup handshake gates all sends,
//! each correlated send is matched to exactly one reply, and everything the
//! engine says is also published to observers.

pub mod codec;
pub mod events;
pub mod provisioner;
pub mod transport;
pub mod types;

pub(crate) mod client;
pub(crate) mod correlation;
pub(crate) mod gate;
pub(crate) mod router;

mod error;

#[cfg(test)]
mod testing;

pub use client::EngineClient;
pub use correlation::{AckCallback, CorrelationTable, IdAllocator, ReplyCallback};
pub use error::{ClientError, RegisterError, Result};
pub use events::{ClientEvent, EventBus, EventSink, ProvisioningEvent};
pub use gate::{Readiness, ReadinessGate};
pub use provisioner::{EngineProvisioner, ProcessProvisioner};
pub use transport::{TcpTransport, Transport};
pub use types::{ClientConfig, EngineConfig};

pub use enginelink_types::{CorrelationId, Envelope, Payload, kinds};
