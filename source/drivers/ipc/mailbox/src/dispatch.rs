// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Callback dispatch table: one binding per event id.
//!
//! Two built-in protocol bindings (ping, telemetry) are installed at
//! bus construction; everything else starts as the default logging
//! no-op. `bind` refuses to replace a non-default binding so a second
//! registrant fails loudly instead of silently stealing the event.
//! Dispatch clones the binding out of the table, so handlers run
//! without the table lock and may call `bind`/`unbind` themselves.

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::region::Delivery;
use crate::BindError;

/// Externally bound event callback. Invoked from scan context, so it
/// must not block; rebinding from inside the callback is allowed.
pub type ExternalHandler = Arc<dyn Fn(Delivery) + Send + Sync>;

/// One dispatch-table entry.
#[derive(Clone)]
pub enum Binding {
    /// Logging no-op; also the answer for never-bound events.
    Default,
    /// Built-in liveness protocol on the ping event.
    Ping,
    /// Built-in ring-buffer feed on the telemetry event.
    Telemetry,
    /// Application callback.
    External(ExternalHandler),
}

impl Binding {
    pub fn is_default(&self) -> bool {
        matches!(self, Binding::Default)
    }
}

pub struct DispatchTable {
    bindings: Mutex<Vec<Binding>>,
}

impl DispatchTable {
    pub fn new(num_events: usize) -> Self {
        let mut bindings = Vec::with_capacity(num_events);
        bindings.resize_with(num_events, || Binding::Default);
        Self { bindings: Mutex::new(bindings) }
    }

    /// Installs a built-in protocol binding at construction time;
    /// bypasses the already-bound check.
    pub fn install_builtin(&self, event: u32, binding: Binding) {
        let mut bindings = self.bindings.lock();
        if let Some(slot) = bindings.get_mut(event as usize) {
            *slot = binding;
        }
    }

    /// Binds an application callback. Fails unless the current
    /// binding is the default.
    pub fn bind(&self, event: u32, handler: ExternalHandler) -> Result<(), BindError> {
        let mut bindings = self.bindings.lock();
        let slot = bindings
            .get_mut(event as usize)
            .ok_or(BindError::InvalidEvent(event))?;
        if !slot.is_default() {
            return Err(BindError::AlreadyBound(event));
        }
        *slot = Binding::External(handler);
        Ok(())
    }

    /// Restores the default binding. Always succeeds; out-of-range
    /// ids are ignored.
    pub fn unbind(&self, event: u32) {
        let mut bindings = self.bindings.lock();
        if let Some(slot) = bindings.get_mut(event as usize) {
            if !slot.is_default() {
                debug!("event {event}: handler unbound, default restored");
            }
            *slot = Binding::Default;
        }
    }

    /// Clones the current binding for `event` out of the table. The
    /// lock is released before the caller invokes the handler.
    pub fn snapshot(&self, event: u32) -> Binding {
        self.bindings
            .lock()
            .get(event as usize)
            .cloned()
            .unwrap_or(Binding::Default)
    }
}
