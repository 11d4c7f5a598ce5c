// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared-region map: one transmit and one receive slot table.
//!
//! The local side owns the transmit half (first half of the range);
//! the peer owns the receive half. Both processors write into the
//! same bytes, so receive-table reads may be torn: every accessor
//! returns an owned copy and `RawSlot::decode` validates it before
//! the scanner acts on it.

use mbx_hal::Bus;

use crate::RegionError;

/// Words per event slot: event id, data1, data2, pending.
pub const SLOT_WORDS: usize = 4;
/// Bytes per event slot.
pub const SLOT_BYTES: usize = SLOT_WORDS * 4;

const WORD_EVENT: usize = 0;
const WORD_DATA1: usize = 1;
const WORD_DATA2: usize = 2;
const WORD_PENDING: usize = 3;

/// Kind of memory backing the shared region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryKind {
    /// Ordinary RAM; the transmit half is zeroed at registration.
    Normal,
    /// Device/co-processor memory; left untouched at registration.
    Device,
}

/// One validated, owned event delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub event: u32,
    pub data1: u32,
    pub data2: u32,
}

/// Owned snapshot of a receive slot. May be torn if the peer was
/// mid-write; always passes through [`RawSlot::decode`] before use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawSlot {
    pub event: u32,
    pub data1: u32,
    pub data2: u32,
    pub pending: u32,
}

/// Validation failures on a receive slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotFault {
    /// Pending word was neither 0 nor 1.
    BadPending(u32),
    /// Event-id word disagrees with the slot's table index.
    EventMismatch { expect: u32, got: u32 },
}

impl RawSlot {
    /// Validates the snapshot for the slot at table index `expect`.
    ///
    /// `Ok(None)` means the slot is idle; `Ok(Some(_))` is a pending
    /// delivery; `Err(_)` is a protocol fault the caller discards and
    /// counts.
    pub fn decode(self, expect: u32) -> Result<Option<Delivery>, SlotFault> {
        match self.pending {
            0 => Ok(None),
            1 => {
                if self.event != expect {
                    return Err(SlotFault::EventMismatch { expect, got: self.event });
                }
                Ok(Some(Delivery {
                    event: self.event,
                    data1: self.data1,
                    data2: self.data2,
                }))
            }
            other => Err(SlotFault::BadPending(other)),
        }
    }
}

/// Typed, bounds-checked view over the raw shared byte range.
pub struct RegionMap<B: Bus> {
    mem: B,
    num_events: usize,
    rx_base: usize,
}

impl<B: Bus> RegionMap<B> {
    /// Splits `len` bytes into two equal halves (transmit first) and
    /// validates that each half holds a full slot table.
    pub fn new(mem: B, len: usize, num_events: usize, kind: MemoryKind) -> Result<Self, RegionError> {
        let need = 2 * num_events * SLOT_BYTES;
        if len < need {
            return Err(RegionError::TooSmall { got: len, need });
        }
        // Keep the receive table word aligned even for odd lengths.
        let rx_base = (len / 2) & !3;
        let map = Self { mem, num_events, rx_base };
        if kind == MemoryKind::Normal {
            map.zero_tx_table();
        }
        Ok(map)
    }

    fn tx_word(&self, event: u32, word: usize) -> usize {
        event as usize * SLOT_BYTES + word * 4
    }

    fn rx_word(&self, event: u32, word: usize) -> usize {
        self.rx_base + event as usize * SLOT_BYTES + word * 4
    }

    fn zero_tx_table(&self) {
        for word in 0..self.num_events * SLOT_WORDS {
            self.mem.write(word * 4, 0);
        }
    }

    /// Whether the transmit slot still carries an unconsumed event.
    /// Any nonzero pending word counts as occupied.
    pub fn tx_pending(&self, event: u32) -> bool {
        self.mem.read(self.tx_word(event, WORD_PENDING)) != 0
    }

    /// Writes an event into the transmit slot. The pending word is
    /// written last so the peer never observes it set against stale
    /// data words.
    pub fn write_tx(&self, event: u32, data1: u32, data2: u32) {
        self.mem.write(self.tx_word(event, WORD_EVENT), event);
        self.mem.write(self.tx_word(event, WORD_DATA1), data1);
        self.mem.write(self.tx_word(event, WORD_DATA2), data2);
        self.mem.write(self.tx_word(event, WORD_PENDING), 1);
    }

    /// Owned snapshot of a transmit slot (command surface, tests).
    pub fn tx_slot(&self, event: u32) -> RawSlot {
        RawSlot {
            event: self.mem.read(self.tx_word(event, WORD_EVENT)),
            data1: self.mem.read(self.tx_word(event, WORD_DATA1)),
            data2: self.mem.read(self.tx_word(event, WORD_DATA2)),
            pending: self.mem.read(self.tx_word(event, WORD_PENDING)),
        }
    }

    /// Owned snapshot of a receive slot.
    pub fn rx_slot(&self, event: u32) -> RawSlot {
        RawSlot {
            event: self.mem.read(self.rx_word(event, WORD_EVENT)),
            data1: self.mem.read(self.rx_word(event, WORD_DATA1)),
            data2: self.mem.read(self.rx_word(event, WORD_DATA2)),
            pending: self.mem.read(self.rx_word(event, WORD_PENDING)),
        }
    }

    /// Snapshot of the receive slot's data words (non-consuming).
    pub fn read_rx_data(&self, event: u32) -> (u32, u32) {
        (
            self.mem.read(self.rx_word(event, WORD_DATA1)),
            self.mem.read(self.rx_word(event, WORD_DATA2)),
        )
    }

    /// Acknowledges a delivery; only the consuming side clears.
    pub fn clear_rx_pending(&self, event: u32) {
        self.mem.write(self.rx_word(event, WORD_PENDING), 0);
    }

    /// Zeroes both slot tables. Test-only escape hatch used by the
    /// command surface.
    pub fn clear_all(&self) {
        for event in 0..self.num_events as u32 {
            for word in 0..SLOT_WORDS {
                self.mem.write(self.tx_word(event, word), 0);
                self.mem.write(self.rx_word(event, word), 0);
            }
        }
    }
}
