//! Dispatch router, the single consumer of inbound envelopes.
//!
//! For every envelope, in order: publish it to observers, then apply the
//! first matching rule:
//!
//! | Kind                    | Effect                                   |
//! |-------------------------|------------------------------------------|
//! | `authentication_failed` | fail the readiness gate                  |
//! | `thread_start`          | mark the readiness gate ready            |
//! | `initialize`            | reply with the fixed `initialized` ack   |
//! | anything else           | resolve a pending request if it is a reply |
//!
//! Handshake kinds are never treated as replies, even when their id is
//! pending.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use enginelink_types::{CorrelationId, Envelope, kinds};
use tokio::sync::mpsc;

use crate::client::Core;
use crate::events::ClientEvent;
use crate::transport::Transport;

const DEFAULT_FAILURE_TEXT: &str = "engine rejected the session";

/// What the router did with an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Route {
    GateFailed { won: bool },
    GateReady { won: bool },
    Acknowledged,
    Resolved(CorrelationId),
    Unmatched,
}

fn failure_text(envelope: &Envelope) -> String {
    envelope
        .data_str("message")
        .or_else(|| envelope.data_str("reason"))
        .unwrap_or(DEFAULT_FAILURE_TEXT)
        .to_string()
}

pub(crate) fn initialize_ack() -> Envelope {
    Envelope::fire_and_forget(kinds::INITIALIZED, CorrelationId::NONE, None)
}

pub(crate) fn dispatch<T: Transport>(core: &Core<T>, envelope: Envelope) -> Route {
    core.events
        .publish(ClientEvent::MessageReceived(envelope.clone()));

    match envelope.kind() {
        kinds::AUTHENTICATION_FAILED => {
            let reason = failure_text(&envelope);
            let won = core.gate.fail(reason.clone());
            if won {
                tracing::warn!(%reason, "Engine rejected the session");
            } else {
                tracing::debug!(%reason, "Ignoring late authentication failure");
            }
            Route::GateFailed { won }
        }
        kinds::THREAD_START => {
            let won = core.gate.mark_ready();
            if won {
                tracing::info!("Engine worker thread started");
            }
            Route::GateReady { won }
        }
        kinds::INITIALIZE => {
            let ack = initialize_ack();
            match core.transport.send(ack.clone()) {
                Ok(()) => {
                    tracing::debug!("Acknowledged engine initialize");
                    core.events.publish(ClientEvent::MessageSent(ack));
                }
                Err(e) => tracing::warn!("Failed to acknowledge engine initialize: {e:#}"),
            }
            Route::Acknowledged
        }
        _ if envelope.expects_reply() => {
            let id = envelope.id();
            let kind = envelope.kind().to_string();
            let payload = envelope.into_data();
            match catch_unwind(AssertUnwindSafe(|| core.table.resolve(id, payload))) {
                Ok(true) => {
                    tracing::debug!(%id, %kind, "Resolved pending request");
                    Route::Resolved(id)
                }
                Ok(false) => {
                    tracing::trace!(%id, %kind, "No pending request for reply");
                    Route::Unmatched
                }
                Err(_) => {
                    tracing::warn!(%id, %kind, "Reply callback panicked");
                    Route::Resolved(id)
                }
            }
        }
        other => {
            tracing::trace!(kind = other, "Ignoring uncorrelated message");
            Route::Unmatched
        }
    }
}

/// Drain `inbound` until the transport drops its sender.
pub(crate) async fn run<T: Transport>(core: Arc<Core<T>>, mut inbound: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = inbound.recv().await {
        dispatch(&core, envelope);
    }
    tracing::debug!("Inbound channel closed; router stopping");
}
