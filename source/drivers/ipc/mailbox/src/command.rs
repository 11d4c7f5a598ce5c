// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-process control-plane dispatcher and the statistics dump.
//!
//! The user-level request surface (ioctl-style on target hardware)
//! reduces to these operations. `SimulateInterrupt`
//! and `ClearAllSlots` exist for test rigs only; production callers
//! have no reason to fake a doorbell.

use core::fmt::Write as _;

use mbx_hal::{Bus, Delay};
use thiserror::Error;

use crate::bus::Mailbox;
use crate::dispatch::ExternalHandler;
use crate::region::Delivery;
use crate::ring::TelemetryMsg;
use crate::{BindError, ReadError, SendError};

/// One control-plane request.
pub enum Command {
    SendEvent { event: u32, data1: u32, data2: u32, timeout_ms: u32 },
    ReadEvent { event: u32 },
    Bind { event: u32, handler: ExternalHandler },
    Unbind { event: u32 },
    LastDelivered,
    /// Test-only: run one scan pass as if the doorbell fired.
    SimulateInterrupt,
    /// Test-only: zero both slot tables.
    ClearAllSlots,
    PopTelemetry,
}

impl core::fmt::Debug for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Command::SendEvent { .. } => "SendEvent",
            Command::ReadEvent { .. } => "ReadEvent",
            Command::Bind { .. } => "Bind",
            Command::Unbind { .. } => "Unbind",
            Command::LastDelivered => "LastDelivered",
            Command::SimulateInterrupt => "SimulateInterrupt",
            Command::ClearAllSlots => "ClearAllSlots",
            Command::PopTelemetry => "PopTelemetry",
        };
        f.write_str(name)
    }
}

/// Successful dispatch results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandReply {
    Done,
    Data { data1: u32, data2: u32 },
    LastEvent(Option<Delivery>),
    Delivered(usize),
    Telemetry(Option<TelemetryMsg>),
}

/// Dispatch failures; wraps the component error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Bind(#[from] BindError),
}

impl<B: Bus, D: Delay> Mailbox<B, D> {
    /// Executes one control-plane command against the bus.
    pub fn dispatch(&self, command: Command) -> Result<CommandReply, CommandError> {
        match command {
            Command::SendEvent { event, data1, data2, timeout_ms } => {
                self.send(event, data1, data2, timeout_ms)?;
                Ok(CommandReply::Done)
            }
            Command::ReadEvent { event } => {
                let (data1, data2) = self.read(event)?;
                Ok(CommandReply::Data { data1, data2 })
            }
            Command::Bind { event, handler } => {
                self.bind(event, handler)?;
                Ok(CommandReply::Done)
            }
            Command::Unbind { event } => {
                self.unbind(event);
                Ok(CommandReply::Done)
            }
            Command::LastDelivered => Ok(CommandReply::LastEvent(self.last_delivered())),
            Command::SimulateInterrupt => Ok(CommandReply::Delivered(self.scan())),
            Command::ClearAllSlots => {
                let region = self.region.read();
                let region = region.as_ref().ok_or(ReadError::NotMapped)?;
                region.clear_all();
                Ok(CommandReply::Done)
            }
            Command::PopTelemetry => Ok(CommandReply::Telemetry(self.pop_telemetry())),
        }
    }

    /// Human-readable dump of every counter and the ring state.
    /// Read-only; safe to call at any time.
    pub fn stats_report(&self) -> String {
        let stats = self.stats();
        let (write_index, read_index, len, capacity, overflows) = {
            let ring = self.ring.lock();
            let (w, r) = ring.indices();
            (w, r, ring.len(), ring.capacity(), ring.overflows())
        };

        let mut out = String::new();
        let _ = writeln!(out, "mailbox statistics");
        for (event, (sent, delivered)) in
            stats.sent.iter().zip(stats.delivered.iter()).enumerate()
        {
            let _ = writeln!(out, "  event {event}: sent {sent} delivered {delivered}");
        }
        let _ = writeln!(out, "  interrupts: {}", stats.interrupts);
        let _ = writeln!(out, "  recoveries: {}", stats.recoveries);
        let _ = writeln!(out, "  protocol errors: {}", stats.protocol_errors);
        let _ = writeln!(out, "  ping replies: {}", stats.ping_replies);
        let _ = writeln!(
            out,
            "  telemetry ring: write {write_index} read {read_index} len {len}/{capacity} overflows {overflows}"
        );
        let _ = writeln!(
            out,
            "  doorbell: enabled {} wedged {} (wedge count {})",
            self.signal.irq_enabled(),
            self.is_wedged(),
            stats.wedges
        );
        out
    }
}
