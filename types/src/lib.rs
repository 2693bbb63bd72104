//! Core message types for enginelink.
//!
//! Pure domain types with no IO and no async. Both the client runtime and
//! the command-line front end build on these.

mod envelope;
mod ids;
pub mod kinds;

pub use envelope::{Envelope, Payload};
pub use ids::{CorrelationId, CorrelationIdOutOfRange};
