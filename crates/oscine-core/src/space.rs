//! Address space: pattern registrations and message dispatch
//!
//! Handlers are snapshotted out from under the lock and invoked in an
//! unlocked region, so a handler may itself register or unregister without
//! deadlocking. A handler registered during a dispatch is not observed by
//! that dispatch; one unregistered during a dispatch may still fire from
//! the snapshot.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::error::{Error, Result};
use crate::message::{Message, Packet};
use crate::pattern;

/// A message callback
///
/// Handlers run synchronously on the dispatching thread and must not block.
pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Opaque handle returned by [`AddressSpace::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Entry {
    id: u64,
    pattern: String,
    handler: Handler,
}

#[derive(Default)]
struct Table {
    /// Patterns without meta characters, keyed by the full pattern string
    exact: HashMap<String, Vec<Entry>>,
    /// Patterns with meta characters, scanned linearly on dispatch
    wildcard: Vec<Entry>,
}

/// A thread-safe registry mapping address patterns to handlers
pub struct AddressSpace {
    table: Mutex<Table>,
    next_id: AtomicU64,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for an address pattern.
    ///
    /// The pattern is classified once: patterns without meta characters go
    /// into an exact index with O(1) lookup, the rest into the wildcard
    /// list.
    pub fn register<F>(&self, pattern: &str, handler: F) -> Result<HandlerId>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        if !pattern.starts_with('/') {
            return Err(Error::InvalidAddress);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            id,
            pattern: pattern.to_string(),
            handler: Arc::new(handler),
        };

        let mut table = self.table.lock();
        if pattern::is_pattern(pattern) {
            table.wildcard.push(entry);
        } else {
            table.exact.entry(pattern.to_string()).or_default().push(entry);
        }

        Ok(HandlerId(id))
    }

    /// Remove a registration. Idempotent: removing twice is a no-op.
    ///
    /// Returns whether a registration was removed.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut table = self.table.lock();

        if let Some(pos) = table.wildcard.iter().position(|e| e.id == id.0) {
            table.wildcard.remove(pos);
            return true;
        }

        let mut removed = false;
        let mut emptied: Option<String> = None;
        for (pattern, entries) in table.exact.iter_mut() {
            if let Some(pos) = entries.iter().position(|e| e.id == id.0) {
                entries.remove(pos);
                removed = true;
                if entries.is_empty() {
                    emptied = Some(pattern.clone());
                }
                break;
            }
        }
        if let Some(pattern) = emptied {
            table.exact.remove(&pattern);
        }
        removed
    }

    /// Dispatch a packet, recursing into bundles.
    ///
    /// Returns the number of handler invocations performed.
    pub fn dispatch(&self, packet: &Packet) -> usize {
        match packet {
            Packet::Message(message) => self.dispatch_message(message),
            Packet::Bundle(bundle) => bundle
                .content
                .iter()
                .map(|element| self.dispatch(element))
                .sum(),
        }
    }

    /// Dispatch a single message to every matching handler.
    pub fn dispatch_message(&self, message: &Message) -> usize {
        // Single critical section: clone the exact bucket and the wildcard
        // list, then invoke outside the lock
        let (exact, wildcard) = {
            let table = self.table.lock();
            let exact: Vec<Handler> = table
                .exact
                .get(&message.address)
                .map(|entries| entries.iter().map(|e| e.handler.clone()).collect())
                .unwrap_or_default();
            let wildcard: Vec<(String, Handler)> = table
                .wildcard
                .iter()
                .map(|e| (e.pattern.clone(), e.handler.clone()))
                .collect();
            (exact, wildcard)
        };

        let mut invoked = 0;
        for handler in &exact {
            invoke(handler, message);
            invoked += 1;
        }
        for (pattern, handler) in &wildcard {
            if pattern::matches(pattern, &message.address) {
                invoke(handler, message);
                invoked += 1;
            }
        }
        invoked
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        let table = self.table.lock();
        table.exact.values().map(Vec::len).sum::<usize>() + table.wildcard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Invoke one handler, isolating panics so later handlers still run
fn invoke(handler: &Handler, message: &Message) {
    if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
        error!(address = %message.address, "message handler panicked");
    }
}
