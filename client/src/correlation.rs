//! Correlation table: pending callbacks keyed by request id.
//!
//! Two statically typed maps share one lock: callbacks that receive the
//! reply payload and callbacks that only learn that a reply arrived. An id
//! lives in at most one of them. Callbacks run after the lock is released,
//! so a callback may register new requests. Once closed, the table refuses
//! every registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use enginelink_types::{CorrelationId, Payload};

use crate::error::RegisterError;

/// Receives the reply payload (absent if the reply carried none).
pub type ReplyCallback = Box<dyn FnOnce(Option<Payload>) + Send + 'static>;

/// Fired when a reply arrives; the payload is discarded.
pub type AckCallback = Box<dyn FnOnce() + Send + 'static>;

/// Hands out ids in `1..=CorrelationId::MAX`, wrapping and skipping `0`.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    #[cfg(test)]
    fn starting_at(raw: u32) -> Self {
        Self {
            next: AtomicU32::new(raw),
        }
    }

    pub fn next_id(&self) -> CorrelationId {
        loop {
            let raw = self.next.fetch_add(1, Ordering::Relaxed) & CorrelationId::MAX;
            if raw == 0 {
                continue;
            }
            if let Ok(id) = CorrelationId::new(raw) {
                return id;
            }
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Tables {
    with_payload: HashMap<CorrelationId, ReplyCallback>,
    no_payload: HashMap<CorrelationId, AckCallback>,
    closed: bool,
}

impl Tables {
    fn contains(&self, id: CorrelationId) -> bool {
        self.with_payload.contains_key(&id) || self.no_payload.contains_key(&id)
    }

    fn check_open(&self) -> Result<(), RegisterError> {
        if self.closed {
            Err(RegisterError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_vacant(&self, id: CorrelationId) -> Result<(), RegisterError> {
        self.check_open()?;
        if self.contains(id) {
            return Err(RegisterError::Duplicate(id));
        }
        Ok(())
    }

    fn drain(&mut self) -> usize {
        let with_payload = std::mem::take(&mut self.with_payload);
        let no_payload = std::mem::take(&mut self.no_payload);
        with_payload.len() + no_payload.len()
    }
}

enum Resolved {
    WithPayload(ReplyCallback),
    NoPayload(AckCallback),
}

#[derive(Default)]
pub struct CorrelationTable {
    tables: Mutex<Tables>,
}

impl CorrelationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panicking callback never runs under this lock, so poisoning only
        // means a panic in map bookkeeping; the maps themselves stay valid.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register_with_payload(
        &self,
        id: CorrelationId,
        callback: ReplyCallback,
    ) -> Result<(), RegisterError> {
        let mut tables = self.lock();
        tables.check_vacant(id)?;
        tables.with_payload.insert(id, callback);
        Ok(())
    }

    pub fn register_no_payload(
        &self,
        id: CorrelationId,
        callback: AckCallback,
    ) -> Result<(), RegisterError> {
        let mut tables = self.lock();
        tables.check_vacant(id)?;
        tables.no_payload.insert(id, callback);
        Ok(())
    }

    /// Register under the next id from `ids` that is not currently pending.
    /// Allocation and insertion happen under one lock.
    pub fn register_fresh_with_payload(
        &self,
        ids: &IdAllocator,
        callback: ReplyCallback,
    ) -> Result<CorrelationId, RegisterError> {
        let mut tables = self.lock();
        tables.check_open()?;
        let id = Self::fresh_id(&tables, ids);
        tables.with_payload.insert(id, callback);
        Ok(id)
    }

    /// Like [`Self::register_fresh_with_payload`], for acknowledgment-only callbacks.
    pub fn register_fresh_no_payload(
        &self,
        ids: &IdAllocator,
        callback: AckCallback,
    ) -> Result<CorrelationId, RegisterError> {
        let mut tables = self.lock();
        tables.check_open()?;
        let id = Self::fresh_id(&tables, ids);
        tables.no_payload.insert(id, callback);
        Ok(id)
    }

    fn fresh_id(tables: &Tables, ids: &IdAllocator) -> CorrelationId {
        loop {
            let id = ids.next_id();
            if !tables.contains(id) {
                return id;
            }
        }
    }

    /// Complete the request registered under `id`.
    ///
    /// Returns `false` if nothing was pending for `id`; such messages are
    /// not replies and are ignored.
    pub fn resolve(&self, id: CorrelationId, payload: Option<Payload>) -> bool {
        let resolved = {
            let mut tables = self.lock();
            if let Some(callback) = tables.with_payload.remove(&id) {
                Some(Resolved::WithPayload(callback))
            } else {
                tables.no_payload.remove(&id).map(Resolved::NoPayload)
            }
        };

        match resolved {
            Some(Resolved::WithPayload(callback)) => {
                callback(payload);
                true
            }
            Some(Resolved::NoPayload(callback)) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Drop a pending entry without invoking it.
    pub fn cancel(&self, id: CorrelationId) -> bool {
        let mut tables = self.lock();
        tables.with_payload.remove(&id).is_some() || tables.no_payload.remove(&id).is_some()
    }

    /// Drop every pending entry without invoking it. Dropping a callback
    /// may wake an awaiting caller.
    pub fn clear(&self) -> usize {
        self.lock().drain()
    }

    /// Drop every pending entry and refuse all later registrations.
    ///
    /// Sealing and draining share one lock acquisition, so a registration
    /// racing with this call either lands before it and is dropped, or
    /// fails with [`RegisterError::Closed`].
    pub fn close(&self) -> usize {
        let mut tables = self.lock();
        tables.closed = true;
        tables.drain()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    #[must_use]
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.lock().contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let tables = self.lock();
        tables.with_payload.len() + tables.no_payload.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
