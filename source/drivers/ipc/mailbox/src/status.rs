// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bus statistics and the coarse "new data available" poll flag.
//!
//! All counters saturate instead of wrapping so a long-lived bus never
//! reports a misleadingly small value. The status lock is held for
//! O(1) work only and is safe to take from scan context; only
//! `wait_for_event` blocks, and only on the process-context path.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::region::Delivery;

/// Read-only snapshot of every counter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusStats {
    /// Per-event send counts, indexed by event id.
    pub sent: Vec<u32>,
    /// Per-event deliver counts, indexed by event id.
    pub delivered: Vec<u32>,
    /// Total doorbell interrupts scanned.
    pub interrupts: u32,
    /// Handshake recoveries triggered by occupied transmit slots.
    pub recoveries: u32,
    /// Malformed receive slots and bad ping payloads discarded.
    pub protocol_errors: u32,
    /// Times the wedge latch fired (0 or 1 per bus lifetime).
    pub wedges: u32,
    /// Ping replies received from the peer.
    pub ping_replies: u32,
}

struct StatusInner {
    sent: Box<[u32]>,
    delivered: Box<[u32]>,
    interrupts: u32,
    recoveries: u32,
    protocol_errors: u32,
    wedges: u32,
    ping_replies: u32,
    data_ready: bool,
    last_delivered: Option<Delivery>,
}

pub struct StatusBlock {
    inner: Mutex<StatusInner>,
    waiters: Condvar,
}

fn bump(counter: &mut u32) {
    *counter = counter.saturating_add(1);
}

impl StatusBlock {
    pub fn new(num_events: usize) -> Self {
        Self {
            inner: Mutex::new(StatusInner {
                sent: vec![0; num_events].into_boxed_slice(),
                delivered: vec![0; num_events].into_boxed_slice(),
                interrupts: 0,
                recoveries: 0,
                protocol_errors: 0,
                wedges: 0,
                ping_replies: 0,
                data_ready: false,
                last_delivered: None,
            }),
            waiters: Condvar::new(),
        }
    }

    pub fn note_sent(&self, event: u32) {
        let mut inner = self.inner.lock();
        if let Some(counter) = inner.sent.get_mut(event as usize) {
            bump(counter);
        }
    }

    /// Records a delivery, raises the poll flag, and wakes waiters.
    pub fn note_delivered(&self, delivery: Delivery) {
        let mut inner = self.inner.lock();
        if let Some(counter) = inner.delivered.get_mut(delivery.event as usize) {
            bump(counter);
        }
        inner.last_delivered = Some(delivery);
        inner.data_ready = true;
        self.waiters.notify_all();
    }

    pub fn note_interrupt(&self) {
        bump(&mut self.inner.lock().interrupts);
    }

    pub fn note_recovery(&self) {
        bump(&mut self.inner.lock().recoveries);
    }

    pub fn note_protocol_error(&self) {
        bump(&mut self.inner.lock().protocol_errors);
    }

    pub fn note_wedge(&self) {
        bump(&mut self.inner.lock().wedges);
    }

    pub fn note_ping_reply(&self) {
        bump(&mut self.inner.lock().ping_replies);
    }

    /// Atomically reads and clears the poll flag.
    pub fn take_flag(&self) -> bool {
        let mut inner = self.inner.lock();
        core::mem::take(&mut inner.data_ready)
    }

    /// Blocks until the poll flag is raised or `timeout` elapses.
    /// Returns the flag state on exit; the flag is left set for
    /// `take_flag` to consume.
    pub fn wait_for_event(&self, timeout: Duration) -> bool {
        // A timeout too large to land on the clock means wait forever.
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.inner.lock();
        while !inner.data_ready {
            match deadline {
                Some(deadline) => {
                    if self.waiters.wait_until(&mut inner, deadline).timed_out() {
                        return inner.data_ready;
                    }
                }
                None => self.waiters.wait(&mut inner),
            }
        }
        true
    }

    pub fn last_delivered(&self) -> Option<Delivery> {
        self.inner.lock().last_delivered
    }

    pub fn snapshot(&self) -> BusStats {
        let inner = self.inner.lock();
        BusStats {
            sent: inner.sent.to_vec(),
            delivered: inner.delivered.to_vec(),
            interrupts: inner.interrupts,
            recoveries: inner.recoveries,
            protocol_errors: inner.protocol_errors,
            wedges: inner.wedges,
            ping_replies: inner.ping_replies,
        }
    }
}
