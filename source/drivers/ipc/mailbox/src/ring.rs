// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity telemetry ring fed by the ACQ event.
//!
//! Single producer (the scanner) and single consumer (the external
//! pop path). Overflow drops the oldest unread message and counts it;
//! data loss is visible in the stats, never silent.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TelemetryMsg {
    pub event: u32,
    pub data1: u32,
    pub data2: u32,
}

pub struct TelemetryRing {
    slots: Box<[TelemetryMsg]>,
    write_index: usize,
    read_index: usize,
    len: usize,
    overflows: u32,
}

impl TelemetryRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let empty = TelemetryMsg { event: 0, data1: 0, data2: 0 };
        Self {
            slots: vec![empty; capacity].into_boxed_slice(),
            write_index: 0,
            read_index: 0,
            len: 0,
            overflows: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Saturating count of messages lost to overflow.
    pub fn overflows(&self) -> u32 {
        self.overflows
    }

    /// Current (write, read) indices for the stats dump.
    pub fn indices(&self) -> (usize, usize) {
        (self.write_index, self.read_index)
    }

    /// Appends a message; on a full ring the oldest unread message is
    /// overwritten and the overflow counter bumped.
    pub fn push(&mut self, msg: TelemetryMsg) {
        let capacity = self.slots.len();
        if self.len == capacity {
            self.read_index = (self.read_index + 1) % capacity;
            self.overflows = self.overflows.saturating_add(1);
        } else {
            self.len += 1;
        }
        self.slots[self.write_index] = msg;
        self.write_index = (self.write_index + 1) % capacity;
    }

    /// Removes the oldest unread message.
    pub fn pop(&mut self) -> Option<TelemetryMsg> {
        if self.len == 0 {
            return None;
        }
        let msg = self.slots[self.read_index];
        self.read_index = (self.read_index + 1) % self.slots.len();
        self.len -= 1;
        Some(msg)
    }
}
