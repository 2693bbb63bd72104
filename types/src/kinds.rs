//! Message kinds with protocol meaning during startup.
//!
//! Everything else is application-defined and only routed by id.

/// The engine asks the client to acknowledge its initial resources.
pub const INITIALIZE: &str = "initialize";

/// The fixed acknowledgment sent in response to [`INITIALIZE`].
pub const INITIALIZED: &str = "initialized";

/// The engine's worker thread is running; the client may send work.
pub const THREAD_START: &str = "thread_start";

/// The engine rejected the session (authentication or licensing).
pub const AUTHENTICATION_FAILED: &str = "authentication_failed";

/// Generic application message.
pub const MESSAGE: &str = "message";
