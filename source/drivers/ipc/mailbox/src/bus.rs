// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The bus handle: region registration, the event slot protocol, and
//! handshake recovery.
//!
//! One `Mailbox` is constructed at startup and passed by reference to
//! every collaborator; there is no process-wide singleton. The
//! transfer lock serializes the short register sequences shared
//! between `send`, recovery, and the scan prologue; it is never held
//! across a sleep.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32};
use std::time::Duration;

use log::{debug, info, warn};
use mbx_hal::{Bus, Delay};
use mbx_sync::SpinLock;
use parking_lot::{Mutex, RwLock};

use crate::dispatch::{Binding, DispatchTable, ExternalHandler};
use crate::region::{Delivery, MemoryKind, RegionMap};
use crate::ring::{TelemetryMsg, TelemetryRing};
use crate::scanner::Deferred;
use crate::signal::PeerSignal;
use crate::status::{BusStats, StatusBlock};
use crate::{events, BindError, Config, ReadError, RegionError, SendError};

pub struct Mailbox<B: Bus, D: Delay> {
    pub(crate) cfg: Config,
    pub(crate) signal: PeerSignal<B>,
    pub(crate) delay: D,
    /// Transfer lock: register read/modify/write sequences only.
    pub(crate) transfer: SpinLock<()>,
    pub(crate) region: RwLock<Option<RegionMap<B>>>,
    pub(crate) dispatch: DispatchTable,
    pub(crate) ring: Mutex<TelemetryRing>,
    pub(crate) status: StatusBlock,
    pub(crate) deferred: Mutex<VecDeque<Deferred>>,
    /// Consecutive empty scans; owned by the scanner.
    pub(crate) zero_scans: AtomicU32,
    pub(crate) wedged: AtomicBool,
}

impl<B: Bus, D: Delay> Mailbox<B, D> {
    /// Builds a bus over the doorbell register bank, installs the
    /// built-in ping and telemetry bindings, and arms the doorbell
    /// interrupt. The shared region arrives later via [`register`].
    ///
    /// [`register`]: Mailbox::register
    pub fn new(regs: B, delay: D, cfg: Config) -> Self {
        let signal = PeerSignal::new(regs);
        signal.irq_enable(true);
        let dispatch = DispatchTable::new(cfg.num_events);
        dispatch.install_builtin(events::PING, Binding::Ping);
        dispatch.install_builtin(events::ACQ, Binding::Telemetry);
        Self {
            signal,
            delay,
            transfer: SpinLock::new(()),
            region: RwLock::new(None),
            dispatch,
            ring: Mutex::new(TelemetryRing::new(cfg.ring_capacity)),
            status: StatusBlock::new(cfg.num_events),
            deferred: Mutex::new(VecDeque::new()),
            zero_scans: AtomicU32::new(0),
            wedged: AtomicBool::new(false),
            cfg,
        }
    }

    /// Registers the shared byte range. Needs room for both slot
    /// tables; `MemoryKind::Normal` regions get the transmit half
    /// zeroed. Idempotent: re-registering an already-mapped bus logs
    /// and succeeds without remapping.
    pub fn register(&self, mem: B, len: usize, kind: MemoryKind) -> Result<(), RegionError> {
        // Fast path without queueing a writer: a queued writer stalls
        // every later reader on this task-fair lock.
        if self.region.read().is_some() {
            info!("shared region already mapped; ignoring re-registration");
            return Ok(());
        }
        let mut slot = self.region.write();
        if slot.is_some() {
            info!("shared region already mapped; ignoring re-registration");
            return Ok(());
        }
        let map = RegionMap::new(mem, len, self.cfg.num_events, kind)?;
        info!("shared region mapped: {len} bytes, {} events", self.cfg.num_events);
        *slot = Some(map);
        Ok(())
    }

    pub fn is_mapped(&self) -> bool {
        self.region.read().is_some()
    }

    /// Sends one event to the peer.
    ///
    /// Polls the transmit slot every `poll_interval_ms` until it
    /// frees or `timeout_ms` of accumulated waiting elapses. With
    /// `timeout_ms == 0` this is the fail-fast mode: an occupied slot
    /// returns `Busy` immediately. Either way an occupied slot
    /// triggers exactly one handshake recovery, and the slot itself
    /// is left untouched for the caller to retry against.
    pub fn send(&self, event: u32, data1: u32, data2: u32, timeout_ms: u32) -> Result<(), SendError> {
        if event as usize >= self.cfg.num_events {
            return Err(SendError::InvalidEvent(event));
        }
        let mut waited: u32 = 0;
        loop {
            // The region guard is scoped to one attempt and released
            // before sleeping, so a queued writer (re-registration)
            // never stalls the scanner for the rest of the window.
            {
                let region = self.region.read();
                let region = region.as_ref().ok_or(SendError::NotMapped)?;
                let _transfer = self.transfer.lock();
                if !region.tx_pending(event) {
                    region.write_tx(event, data1, data2);
                    self.signal.notify_peer();
                    drop(_transfer);
                    self.status.note_sent(event);
                    return Ok(());
                }
            }
            if timeout_ms == 0 {
                self.recover_handshake();
                return Err(SendError::Busy);
            }
            if waited >= timeout_ms {
                warn!("send: event {event} slot occupied for {waited} ms, giving up");
                self.recover_handshake();
                return Err(SendError::Timeout);
            }
            self.delay.sleep_ms(self.cfg.poll_interval_ms);
            waited = waited.saturating_add(self.cfg.poll_interval_ms);
        }
    }

    /// Snapshot of the receive slot's data words. Non-consuming;
    /// clearing is the scanner's job. Safe to call from a bound
    /// callback during a scan.
    pub fn read(&self, event: u32) -> Result<(u32, u32), ReadError> {
        if event as usize >= self.cfg.num_events {
            return Err(ReadError::InvalidEvent(event));
        }
        // Recursive read: callbacks run while the scanner holds this
        // lock for reading.
        let region = self.region.read_recursive();
        let region = region.as_ref().ok_or(ReadError::NotMapped)?;
        Ok(region.read_rx_data(event))
    }

    /// Binds an application callback; see [`DispatchTable::bind`].
    pub fn bind(&self, event: u32, handler: ExternalHandler) -> Result<(), BindError> {
        if event as usize >= self.cfg.num_events {
            return Err(BindError::InvalidEvent(event));
        }
        self.dispatch.bind(event, handler)
    }

    /// Restores the default handler for `event`. Always succeeds.
    pub fn unbind(&self, event: u32) {
        self.dispatch.unbind(event);
    }

    /// Wake-line toggle used when the peer has not consumed a
    /// previous send. The settling delays are slept outside the
    /// transfer lock to bound scan latency.
    pub(crate) fn recover_handshake(&self) {
        debug!("handshake recovery: toggling peer wake line");
        {
            let _transfer = self.transfer.lock();
            self.signal.wake_clear();
        }
        self.delay.sleep_ms(self.cfg.settle_delay_ms);
        {
            let _transfer = self.transfer.lock();
            self.signal.wake_assert();
        }
        self.delay.sleep_ms(self.cfg.settle_delay_ms);
        self.status.note_recovery();
    }

    /// Drains the deferred-work queue from process context. Returns
    /// the number of items processed. Ping replies that find the
    /// transmit slot busy are dropped after the built-in recovery;
    /// the peer re-pings.
    pub fn process_deferred(&self) -> usize {
        let mut drained = 0;
        loop {
            let item = self.deferred.lock().pop_front();
            let Some(item) = item else { break };
            drained += 1;
            match item {
                Deferred::PingReply => {
                    if let Err(err) = self.send(events::PING, events::PING_REPLY, 0, 0) {
                        warn!("deferred ping reply dropped: {err}");
                    }
                }
            }
        }
        drained
    }

    /// Blocks until any event is delivered or `timeout` elapses.
    /// Process context only. The flag stays set for [`take_flag`].
    ///
    /// [`take_flag`]: Mailbox::take_flag
    pub fn wait_for_event(&self, timeout: Duration) -> bool {
        self.status.wait_for_event(timeout)
    }

    /// Atomically reads and clears the "new data available" flag.
    pub fn take_flag(&self) -> bool {
        self.status.take_flag()
    }

    /// The most recent delivery observed by the scanner.
    pub fn last_delivered(&self) -> Option<Delivery> {
        self.status.last_delivered()
    }

    /// Removes the oldest unread telemetry message.
    pub fn pop_telemetry(&self) -> Option<TelemetryMsg> {
        self.ring.lock().pop()
    }

    /// Counter snapshot; read-only and side-effect-free.
    pub fn stats(&self) -> BusStats {
        self.status.snapshot()
    }

    /// Whether the wedge latch has fired. Cleared only by building a
    /// new bus.
    pub fn is_wedged(&self) -> bool {
        self.wedged.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Suspend hook: keeps the peer doorbell armed as a wake source.
    /// A wedged bus stays disabled. Returns whether the doorbell is
    /// armed.
    pub fn suspend(&self) -> bool {
        if self.is_wedged() {
            warn!("suspend: bus is wedged, doorbell stays disabled");
            return false;
        }
        let _transfer = self.transfer.lock();
        self.signal.irq_enable(true);
        info!("suspend: peer doorbell armed as wake source");
        true
    }

    /// Resume hook: scanner and slot state survive suspend, so there
    /// is nothing to rebuild.
    pub fn resume(&self) {
        debug!("resume: mailbox state preserved");
    }
}
