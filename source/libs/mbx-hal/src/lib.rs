// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]

/// Word-granular register/memory access shared by the mailbox driver.
///
/// `addr` is a byte offset into the backing window (doorbell register
/// bank or shared-memory region). Implementations are expected to
/// perform volatile accesses on real hardware; every read returns an
/// owned value, never a reference into the window.
pub trait Bus {
    fn read(&self, addr: usize) -> u32;
    fn write(&self, addr: usize, value: u32);
}

/// Millisecond-scale sleep used for handshake settling delays and
/// slot-occupancy polling. Injected so host tests run without
/// wall-clock waits.
pub trait Delay {
    fn sleep_ms(&self, ms: u32);
}
