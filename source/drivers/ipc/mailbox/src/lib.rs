// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Shared-memory doorbell mailbox between the application
//! processor and a companion co-processor (GNSS/modem class)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable (bring-up)
//! TEST_COVERAGE: per-module unit tests + `tests/mailbox_e2e` host suite
//!
//! PUBLIC API:
//!   - `Mailbox`: bus handle (register region, send/read events, bind
//!     callbacks, scan on doorbell interrupt, poll notification)
//!   - `Command`/`CommandReply`: in-process control-plane dispatcher
//!   - `Config`: tunables (poll interval, wedge threshold, ring size)
//!
//! DEPENDENCIES:
//!   - mbx-hal::{Bus, Delay}: register/memory access and sleeps
//!   - mbx-sync::SpinLock: transfer lock shared with interrupt context
//!   - parking_lot: process-context locks and poll-flag condvar
//!
//! The two processors share a byte range split into a transmit and a
//! receive slot table (one fixed-size slot per event id) plus a small
//! doorbell register bank. Neither side has cross-processor atomics;
//! the only discipline is the per-slot pending/ack protocol, so every
//! receive-table read is treated as untrusted input and validated
//! before use.

#![forbid(unsafe_code)]

use thiserror::Error;

mod bus;
mod command;
mod dispatch;
mod region;
mod ring;
mod scanner;
mod signal;
mod status;


pub use bus::Mailbox;
pub use command::{Command, CommandError, CommandReply};
pub use dispatch::ExternalHandler;
pub use region::{Delivery, MemoryKind, SLOT_BYTES};
pub use ring::TelemetryMsg;
pub use signal::{REG_IRQ_ENABLE, REG_IRQ_STATUS, REG_PEER_WAKE, REG_WAKE_STATUS};
pub use status::BusStats;

/// Well-known event identifiers and protocol values.
///
/// Ids are dense in `[0, Config::num_events)` and stable for the
/// lifetime of the bus; no id is reused for two purposes.
pub mod events {
    /// Peer liveness check. Requests are answered from process
    /// context via the deferred-work queue, never from scan context.
    pub const PING: u32 = 0;
    /// High-rate acquisition telemetry; deliveries on this event feed
    /// the telemetry ring buffer.
    pub const ACQ: u32 = 1;
    /// Peer announces that its view of the shared region is ready.
    pub const SHMEM_READY: u32 = 2;

    /// `data1` of a ping request.
    pub const PING_REQUEST: u32 = 1;
    /// `data1` of a ping reply.
    pub const PING_REPLY: u32 = 2;
}

/// Bus tunables.
///
/// The wedge threshold and poll interval mirror values tuned on
/// silicon; neither is architecturally meaningful, so both are
/// configuration rather than constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Number of event slots in each table.
    pub num_events: usize,
    /// Interval between transmit-slot occupancy checks in `send`.
    pub poll_interval_ms: u32,
    /// Settling delay between wake-line toggles during handshake
    /// recovery.
    pub settle_delay_ms: u32,
    /// Consecutive empty scans before the interrupt source is
    /// disabled.
    pub wedge_threshold: u32,
    /// Telemetry ring capacity in messages.
    pub ring_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_events: 8,
            poll_interval_ms: 20,
            settle_delay_ms: 1,
            wedge_threshold: 10,
            ring_capacity: 16,
        }
    }
}

/// Shared-region registration failures. Fatal until re-registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum RegionError {
    /// The supplied range cannot hold both slot tables.
    #[error("shared region too small: {got} bytes, need at least {need}")]
    TooSmall { got: usize, need: usize },
}

/// `send` failures. `Busy` and `Timeout` are recoverable; the caller
/// retries or gives up. The transmit slot is left untouched either
/// way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SendError {
    /// No shared region has been registered yet.
    #[error("shared region not mapped")]
    NotMapped,
    /// Event id outside `[0, num_events)`.
    #[error("event id {0} out of range")]
    InvalidEvent(u32),
    /// Fail-fast send found the transmit slot still occupied.
    #[error("transmit slot still occupied by an unconsumed event")]
    Busy,
    /// The peer did not drain the transmit slot within the window.
    #[error("peer did not consume transmit slot before timeout")]
    Timeout,
}

/// `read` failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ReadError {
    /// No shared region has been registered yet.
    #[error("shared region not mapped")]
    NotMapped,
    /// Event id outside `[0, num_events)`.
    #[error("event id {0} out of range")]
    InvalidEvent(u32),
}

/// `bind` failures. Caller logic errors, never fatal to the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum BindError {
    /// The event already has a non-default handler.
    #[error("event {0} already has a non-default handler")]
    AlreadyBound(u32),
    /// Event id outside `[0, num_events)`.
    #[error("event id {0} out of range")]
    InvalidEvent(u32),
}
