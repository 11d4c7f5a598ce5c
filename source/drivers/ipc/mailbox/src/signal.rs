// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Doorbell register bank: peer wake line, status clears, interrupt
//! enable.
//!
//! The status registers sit behind a clock-gated bridge with a known
//! erratum: the first read after an idle period can return a stale
//! value. Every status write is therefore preceded by three reads and
//! only the last value is trusted.

use mbx_hal::Bus;

/// Wake-line bit; set to interrupt the peer.
pub const REG_PEER_WAKE: usize = 0x00;
/// Wake status; erratum-prone, cleared with the settled-read
/// discipline.
pub const REG_WAKE_STATUS: usize = 0x04;
/// Incoming doorbell pending bit; cleared by the scanner prologue.
pub const REG_IRQ_STATUS: usize = 0x08;
/// Incoming doorbell enable; cleared when the bus wedges.
pub const REG_IRQ_ENABLE: usize = 0x0c;

/// Wake-line bit value.
pub const WAKE_BIT: u32 = 1;
/// Doorbell enable bit value.
pub const IRQ_ENABLE_BIT: u32 = 1;

/// Reads before a status write; see the module header.
const SETTLED_READS: usize = 3;

/// Thin wrapper over the doorbell registers. All operations are short
/// register sequences; callers hold the transfer lock around them.
pub struct PeerSignal<B: Bus> {
    regs: B,
}

impl<B: Bus> PeerSignal<B> {
    pub fn new(regs: B) -> Self {
        Self { regs }
    }

    fn read_settled(&self, reg: usize) -> u32 {
        let mut value = 0;
        for _ in 0..SETTLED_READS {
            value = self.regs.read(reg);
        }
        value
    }

    /// Rings the peer's doorbell.
    pub fn notify_peer(&self) {
        let _ = self.read_settled(REG_WAKE_STATUS);
        self.regs.write(REG_PEER_WAKE, WAKE_BIT);
    }

    /// Clears the incoming doorbell pending bit.
    pub fn clear_peer_irq(&self) {
        let _ = self.read_settled(REG_IRQ_STATUS);
        self.regs.write(REG_IRQ_STATUS, 0);
    }

    /// Clears a stale wake-status bit.
    pub fn clear_wake_status(&self) {
        let _ = self.read_settled(REG_WAKE_STATUS);
        self.regs.write(REG_WAKE_STATUS, 0);
    }

    /// Drops the wake line (first half of handshake recovery).
    pub fn wake_clear(&self) {
        self.regs.write(REG_PEER_WAKE, 0);
    }

    /// Re-asserts the wake line (second half of handshake recovery).
    pub fn wake_assert(&self) {
        self.regs.write(REG_PEER_WAKE, WAKE_BIT);
    }

    pub fn irq_enable(&self, on: bool) {
        self.regs.write(REG_IRQ_ENABLE, if on { IRQ_ENABLE_BIT } else { 0 });
    }

    pub fn irq_enabled(&self) -> bool {
        self.regs.read(REG_IRQ_ENABLE) & IRQ_ENABLE_BIT != 0
    }
}
