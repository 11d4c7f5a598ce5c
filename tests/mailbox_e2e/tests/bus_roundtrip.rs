// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end mailbox scenarios: send → doorbell → scan → dispatch →
//! telemetry/poll, driven through the public surface only.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ipc_mailbox::{
    events, Command, CommandReply, Config, Delivery, Mailbox, MemoryKind, SendError,
    TelemetryMsg, SLOT_BYTES,
};
use mailbox_e2e::{peer_ack, peer_post, tx_slot, SharedMem, SleepDelay};

const NUM_EVENTS: usize = 8;
const REGION_LEN: usize = 2 * NUM_EVENTS * SLOT_BYTES;

fn fast_cfg() -> Config {
    Config { poll_interval_ms: 2, settle_delay_ms: 1, ..Config::default() }
}

fn bring_up() -> (Mailbox<SharedMem, SleepDelay>, SharedMem, SharedMem) {
    let regs = SharedMem::zeroed(0x10);
    let reg_handle = regs.clone();
    let mailbox = Mailbox::new(regs, SleepDelay, fast_cfg());
    let mem = SharedMem::zeroed(REGION_LEN);
    let mem_handle = mem.clone();
    mailbox.register(mem, REGION_LEN, MemoryKind::Normal).unwrap();
    (mailbox, mem_handle, reg_handle)
}

#[test]
fn ping_send_ack_then_busy_with_one_recovery() {
    let (mailbox, mem, _regs) = bring_up();

    mailbox.send(events::PING, 1, 0, 100).unwrap();
    assert_eq!(tx_slot(&mem, events::PING), (events::PING, 1, 0, 1));

    peer_ack(&mem, events::PING);
    mailbox.send(events::PING, 1, 0, 100).unwrap();

    // Second send before the peer drains the first: fail-fast Busy
    // plus exactly one handshake recovery.
    assert_eq!(mailbox.send(events::PING, 1, 0, 0), Err(SendError::Busy));
    let stats = mailbox.stats();
    assert_eq!(stats.recoveries, 1);
    assert_eq!(stats.sent[events::PING as usize], 2);
}

#[test]
fn send_blocks_no_longer_than_timeout() {
    let (mailbox, _mem, _regs) = bring_up();
    mailbox.send(2, 1, 1, 0).unwrap();

    let start = Instant::now();
    assert_eq!(mailbox.send(2, 2, 2, 40), Err(SendError::Timeout));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(40), "gave up early: {elapsed:?}");
    // Window plus one poll interval and the two settling delays.
    assert!(elapsed < Duration::from_millis(200), "overslept: {elapsed:?}");
}

#[test]
fn scan_is_not_stalled_by_a_sleeping_send() {
    let (mailbox, _mem, _regs) = bring_up();
    let mailbox = Arc::new(mailbox);
    mailbox.send(2, 1, 1, 0).unwrap();

    // One thread polls the occupied slot for its whole window while
    // another re-registers the region; the scanner must still get
    // through immediately.
    let sender = Arc::clone(&mailbox);
    let send = thread::spawn(move || sender.send(2, 9, 9, 400));
    let registrar = Arc::clone(&mailbox);
    let register = thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        registrar.register(SharedMem::zeroed(REGION_LEN), REGION_LEN, MemoryKind::Normal)
    });
    thread::sleep(Duration::from_millis(40));

    let start = Instant::now();
    mailbox.scan();
    let latency = start.elapsed();
    assert!(latency < Duration::from_millis(50), "scan stalled for {latency:?}");

    assert_eq!(send.join().unwrap(), Err(SendError::Timeout));
    register.join().unwrap().unwrap();
}

#[test]
fn delivery_wakes_poll_waiter_on_another_thread() {
    let (mailbox, mem, _regs) = bring_up();
    let mailbox = Arc::new(mailbox);

    let waiter = Arc::clone(&mailbox);
    let handle = thread::spawn(move || waiter.wait_for_event(Duration::from_secs(5)));
    thread::sleep(Duration::from_millis(20));

    peer_post(&mem, REGION_LEN, 5, 0x51, 0x52);
    assert_eq!(mailbox.scan(), 1);

    assert!(handle.join().unwrap());
    assert!(mailbox.take_flag());
    assert!(!mailbox.take_flag());
    assert_eq!(
        mailbox.last_delivered(),
        Some(Delivery { event: 5, data1: 0x51, data2: 0x52 })
    );
}

#[test]
fn ping_round_trip_defers_reply_to_process_context() {
    let (mailbox, mem, _regs) = bring_up();

    peer_post(&mem, REGION_LEN, events::PING, events::PING_REQUEST, 0);
    assert_eq!(mailbox.scan(), 1);
    // Nothing sent from scan context.
    assert_eq!(tx_slot(&mem, events::PING).3, 0);

    assert_eq!(mailbox.process_deferred(), 1);
    assert_eq!(
        tx_slot(&mem, events::PING),
        (events::PING, events::PING_REPLY, 0, 1)
    );

    // Peer answers our own ping; the reply is only recorded.
    peer_post(&mem, REGION_LEN, events::PING, events::PING_REPLY, 0);
    mailbox.scan();
    assert_eq!(mailbox.stats().ping_replies, 1);
}

#[test]
fn telemetry_overflow_keeps_newest_and_counts_once() {
    let (mailbox, mem, _regs) = bring_up();
    let capacity = fast_cfg().ring_capacity as u32;

    for n in 0..capacity + 1 {
        peer_post(&mem, REGION_LEN, events::ACQ, n, n);
        assert_eq!(mailbox.scan(), 1);
    }

    let report = mailbox.stats_report();
    assert!(report.contains("overflows 1"), "report: {report}");

    for n in 1..capacity + 1 {
        assert_eq!(
            mailbox.pop_telemetry(),
            Some(TelemetryMsg { event: events::ACQ, data1: n, data2: n })
        );
    }
    assert_eq!(mailbox.pop_telemetry(), None);
}

#[test]
fn interrupt_storm_wedges_and_disables_doorbell() {
    let (mailbox, _mem, regs) = bring_up();
    assert_eq!(regs.peek(ipc_mailbox::REG_IRQ_ENABLE), 1);

    for _ in 0..10 {
        mailbox.dispatch(Command::SimulateInterrupt).unwrap();
    }
    assert!(mailbox.is_wedged());
    assert_eq!(regs.peek(ipc_mailbox::REG_IRQ_ENABLE), 0);

    // Sends still work; only the interrupt path is dead.
    mailbox.send(3, 1, 1, 0).unwrap();
    assert_eq!(mailbox.stats().wedges, 1);

    // A suspend on a wedged bus refuses to re-arm.
    assert!(!mailbox.suspend());
    assert_eq!(regs.peek(ipc_mailbox::REG_IRQ_ENABLE), 0);
}

#[test]
fn suspend_resume_preserves_slot_state() {
    let (mailbox, mem, regs) = bring_up();
    mailbox.send(4, 0xd1, 0xd2, 0).unwrap();

    assert!(mailbox.suspend());
    assert_eq!(regs.peek(ipc_mailbox::REG_IRQ_ENABLE), 1);
    mailbox.resume();

    // Transmit slot and scanner state survived.
    assert_eq!(tx_slot(&mem, 4), (4, 0xd1, 0xd2, 1));
    peer_post(&mem, REGION_LEN, 6, 9, 9);
    assert_eq!(mailbox.scan(), 1);
}

#[test]
fn command_surface_covers_the_control_plane() {
    let (mailbox, mem, _regs) = bring_up();

    let hits = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&hits);
    mailbox
        .dispatch(Command::Bind {
            event: 7,
            handler: Arc::new(move |delivery| {
                assert_eq!(delivery.event, 7);
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        })
        .unwrap();

    peer_post(&mem, REGION_LEN, 7, 1, 2);
    assert_eq!(
        mailbox.dispatch(Command::SimulateInterrupt).unwrap(),
        CommandReply::Delivered(1)
    );
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(
        mailbox.dispatch(Command::ReadEvent { event: 7 }).unwrap(),
        CommandReply::Data { data1: 1, data2: 2 }
    );

    mailbox.dispatch(Command::Unbind { event: 7 }).unwrap();
    mailbox.dispatch(Command::ClearAllSlots).unwrap();
    assert_eq!(
        mailbox.dispatch(Command::ReadEvent { event: 7 }).unwrap(),
        CommandReply::Data { data1: 0, data2: 0 }
    );
}

#[test]
fn register_rejects_undersized_region() {
    let regs = SharedMem::zeroed(0x10);
    let mailbox = Mailbox::new(regs, SleepDelay, fast_cfg());
    let mem = SharedMem::zeroed(REGION_LEN);
    let err = mailbox
        .register(mem, REGION_LEN - 4, MemoryKind::Normal)
        .unwrap_err();
    assert_eq!(format!("{err}"), format!("shared region too small: {} bytes, need at least {}", REGION_LEN - 4, REGION_LEN));
    assert!(!mailbox.is_mapped());
}
