// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Interrupt-context event scanner.
//!
//! `scan` is the top half of the doorbell interrupt: it never blocks,
//! never sleeps, and never returns an error. Protocol faults are
//! discarded and counted; a desynchronized peer (repeated interrupts
//! with nothing pending) escalates to disabling the interrupt source.
//! Work that would block, like the ping reply, is queued for
//! [`Mailbox::process_deferred`] to run from process context.

use std::sync::atomic::Ordering;

use log::{debug, error, warn};
use mbx_hal::{Bus, Delay};

use crate::bus::Mailbox;
use crate::dispatch::Binding;
use crate::region::Delivery;
use crate::ring::TelemetryMsg;
use crate::{events, Config};

/// Bottom-half work queued by the scanner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Deferred {
    /// Answer a peer ping with `PING_REPLY`.
    PingReply,
}

impl<B: Bus, D: Delay> Mailbox<B, D> {
    /// Doorbell interrupt handler: acknowledge the hardware, sweep the
    /// receive table, dispatch bound callbacks. Returns the number of
    /// slots delivered this pass.
    pub fn scan(&self) -> usize {
        self.status.note_interrupt();
        // Interrupt context never spins on the transfer lock. A
        // contended prologue leaves the status bits set; the holder
        // is a short register sequence and the next scan clears them.
        match self.transfer.try_lock() {
            Some(_transfer) => {
                self.signal.clear_peer_irq();
                self.signal.clear_wake_status();
            }
            None => debug!("scan: transfer lock contended, status clear deferred"),
        }
        if self.wedged.load(Ordering::Relaxed) {
            return 0;
        }

        // Recursive read never queues behind a waiting writer, so a
        // concurrent registration cannot stall the sweep.
        let region = self.region.read_recursive();
        let Some(region) = region.as_ref() else {
            self.note_zero_scan();
            return 0;
        };

        let mut delivered = 0;
        for index in 0..self.cfg.num_events as u32 {
            let raw = region.rx_slot(index);
            match raw.decode(index) {
                Ok(None) => {}
                Ok(Some(delivery)) => {
                    // Callbacks may snapshot the slot via `read`
                    // before the pending flag is cleared.
                    self.dispatch_delivery(delivery);
                    region.clear_rx_pending(index);
                    self.status.note_delivered(delivery);
                    delivered += 1;
                }
                Err(fault) => {
                    warn!("receive slot {index} malformed ({fault:?}); discarding");
                    region.clear_rx_pending(index);
                    self.status.note_protocol_error();
                }
            }
        }

        if delivered == 0 {
            self.note_zero_scan();
        } else {
            self.zero_scans.store(0, Ordering::Relaxed);
        }
        delivered
    }

    /// An interrupt that found no work. At the configured threshold
    /// the peer is considered stuck and the interrupt source is
    /// disabled for the rest of this bus's life.
    fn note_zero_scan(&self) {
        let Config { wedge_threshold, .. } = self.cfg;
        let streak = self.zero_scans.fetch_add(1, Ordering::Relaxed) + 1;
        if streak >= wedge_threshold && !self.wedged.swap(true, Ordering::Relaxed) {
            {
                let _transfer = self.transfer.lock();
                self.signal.irq_enable(false);
            }
            self.status.note_wedge();
            error!(
                "doorbell wedged: {streak} consecutive empty interrupts; \
                 interrupt source disabled until reinitialization"
            );
        }
    }

    fn dispatch_delivery(&self, delivery: Delivery) {
        // Cloned out of the table; the handler runs unlocked and may
        // rebind.
        match self.dispatch.snapshot(delivery.event) {
            Binding::Default => {
                debug!(
                    "event {} delivered with no bound handler (data1={:#x} data2={:#x})",
                    delivery.event, delivery.data1, delivery.data2
                );
            }
            Binding::Ping => self.handle_ping(delivery),
            Binding::Telemetry => {
                self.ring.lock().push(TelemetryMsg {
                    event: delivery.event,
                    data1: delivery.data1,
                    data2: delivery.data2,
                });
            }
            Binding::External(handler) => handler(delivery),
        }
    }

    /// Built-in liveness protocol. Replies are deferred; a send from
    /// scan context could sleep on an occupied slot.
    fn handle_ping(&self, delivery: Delivery) {
        match delivery.data1 {
            events::PING_REQUEST => {
                self.deferred.lock().push_back(Deferred::PingReply);
            }
            events::PING_REPLY => {
                self.status.note_ping_reply();
            }
            other => {
                warn!("ping: unexpected data1 {other:#x}; dropping");
                self.status.note_protocol_error();
            }
        }
    }
}
