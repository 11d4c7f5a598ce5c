// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Host harness for the mailbox end-to-end tests: a shared word
//! buffer plays both the doorbell register bank and the shared
//! region, and helper functions play the co-processor side.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ipc_mailbox::SLOT_BYTES;
use mbx_hal::{Bus, Delay};

/// Word-addressable shared window; clones alias the same storage so a
/// test can poke the peer side while the bus owns its copy.
#[derive(Clone)]
pub struct SharedMem {
    words: Arc<Mutex<Vec<u32>>>,
}

impl SharedMem {
    pub fn zeroed(len_bytes: usize) -> Self {
        Self { words: Arc::new(Mutex::new(vec![0; len_bytes / 4])) }
    }

    pub fn peek(&self, addr: usize) -> u32 {
        self.words.lock().unwrap()[addr / 4]
    }

    pub fn poke(&self, addr: usize, value: u32) {
        self.words.lock().unwrap()[addr / 4] = value;
    }
}

impl Bus for SharedMem {
    fn read(&self, addr: usize) -> u32 {
        self.peek(addr)
    }

    fn write(&self, addr: usize, value: u32) {
        self.poke(addr, value);
    }
}

/// Real sleeps; the e2e suite exercises wall-clock timeout behavior.
pub struct SleepDelay;

impl Delay for SleepDelay {
    fn sleep_ms(&self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// Peer writes an event into the local receive table and marks it
/// pending.
pub fn peer_post(mem: &SharedMem, region_len: usize, event: u32, data1: u32, data2: u32) {
    let rx_base = (region_len / 2) & !3;
    let slot = rx_base + event as usize * SLOT_BYTES;
    mem.poke(slot, event);
    mem.poke(slot + 4, data1);
    mem.poke(slot + 8, data2);
    mem.poke(slot + 12, 1);
}

/// Peer consumes the local transmit slot (ack-clears pending).
pub fn peer_ack(mem: &SharedMem, event: u32) {
    mem.poke(event as usize * SLOT_BYTES + 12, 0);
}

/// Snapshot of the local transmit slot as (event, data1, data2,
/// pending).
pub fn tx_slot(mem: &SharedMem, event: u32) -> (u32, u32, u32, u32) {
    let base = event as usize * SLOT_BYTES;
    (
        mem.peek(base),
        mem.peek(base + 4),
        mem.peek(base + 8),
        mem.peek(base + 12),
    )
}
