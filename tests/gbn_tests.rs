//! Integration tests for the Go-Back-N sliding-window engine.
//!
//! Window bookkeeping and timer behaviour are checked against a recording
//! channel on a paused clock.  The end-to-end tests connect two engines
//! through an in-process loopback pair, optionally behind the fault
//! simulator.

mod common;

use std::sync::Arc;
use std::time::Duration;

use arq_transport::packet::PacketKind;
use arq_transport::state::ConnectionState;
use arq_transport::{
    open, ArqConfig, ArqError, FaultConfig, GoBackN, LoopbackChannel, LossyChannel, Protocol,
    SendError, Transport,
};

use common::{ack, corrupt, data, inbox, summary, wait_until, RecordingChannel};

const TIMEOUT: Duration = Duration::from_millis(100);

fn config(window_size: u16) -> ArqConfig {
    ArqConfig {
        timeout: TIMEOUT,
        window_size,
        ..ArqConfig::default()
    }
}

fn engine(window_size: u16) -> (GoBackN, Arc<RecordingChannel>) {
    let channel = RecordingChannel::new();
    let gbn = GoBackN::open(config(window_size), channel.clone(), |_| {}).expect("open");
    (gbn, channel)
}

fn send_all(gbn: &GoBackN, messages: &[&str]) {
    for m in messages {
        gbn.send(m.as_bytes()).expect("send");
    }
}

// ---------------------------------------------------------------------------
// Window bound
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn window_bounds_outstanding_packets() {
    let (gbn, channel) = engine(3);

    send_all(&gbn, &["a", "b", "c"]);
    assert_eq!(gbn.send(b"d"), Err(SendError::WindowFull));
    assert_eq!(gbn.in_flight(), 3);
    assert_eq!(gbn.next_sequence_number(), 3);
    assert_eq!(
        summary(&channel.take_sent()),
        vec![(PacketKind::Data, 0), (PacketKind::Data, 1), (PacketKind::Data, 2)]
    );

    // One ACK frees exactly one slot.
    channel.inject(&ack(0));
    gbn.send(b"d").expect("slot freed");
    assert_eq!(gbn.send(b"e"), Err(SendError::WindowFull));
}

// ---------------------------------------------------------------------------
// Timeout and cumulative ACKs
// ---------------------------------------------------------------------------

/// Leave the engine with `base == 5` and packets 5, 6, 7 in flight.
fn advance_to_base_five(gbn: &GoBackN, channel: &RecordingChannel) {
    send_all(gbn, &["0", "1", "2", "3"]);
    channel.inject(&ack(3));
    send_all(gbn, &["4"]);
    channel.inject(&ack(4));
    send_all(gbn, &["5", "6", "7"]);
    channel.take_sent();
    assert_eq!(gbn.base(), 5);
    assert_eq!(gbn.next_sequence_number(), 8);
}

#[tokio::test(start_paused = true)]
async fn timeout_resends_exactly_the_window() {
    let (gbn, channel) = engine(4);
    advance_to_base_five(&gbn, &channel);

    tokio::time::sleep(TIMEOUT + TIMEOUT / 2).await;
    let resent = channel.take_sent();
    assert_eq!(
        summary(&resent),
        vec![(PacketKind::Data, 5), (PacketKind::Data, 6), (PacketKind::Data, 7)]
    );
    assert_eq!(resent[0].payload, b"5");

    // The timer keeps running while the window is unanswered.
    tokio::time::sleep(TIMEOUT).await;
    assert_eq!(channel.take_sent().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn cumulative_ack_drains_window_and_stops_timer() {
    let (gbn, channel) = engine(4);
    advance_to_base_five(&gbn, &channel);

    channel.inject(&ack(7));
    assert_eq!(gbn.base(), 8);
    assert_eq!(gbn.in_flight(), 0);
    assert!(gbn.is_idle());

    tokio::time::sleep(TIMEOUT * 5).await;
    assert!(channel.take_sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn partial_ack_restarts_timer() {
    let (gbn, channel) = engine(4);
    send_all(&gbn, &["a", "b", "c"]);
    channel.take_sent();

    tokio::time::sleep(Duration::from_millis(60)).await;
    channel.inject(&ack(0));
    assert_eq!(gbn.base(), 1);

    // Original deadline (t=100ms) has passed without a resend.
    tokio::time::sleep(Duration::from_millis(90)).await;
    assert!(channel.take_sent().is_empty());

    // The restarted deadline (t=160ms) resends the remainder.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        summary(&channel.take_sent()),
        vec![(PacketKind::Data, 1), (PacketKind::Data, 2)]
    );
}

#[tokio::test(start_paused = true)]
async fn duplicate_ack_restarts_timer() {
    let (gbn, channel) = engine(4);
    send_all(&gbn, &["a", "b", "c"]);
    channel.inject(&ack(0));
    channel.take_sent();

    tokio::time::sleep(Duration::from_millis(60)).await;
    channel.inject(&ack(0));
    assert_eq!(gbn.base(), 1);
    assert_eq!(gbn.in_flight(), 2);

    // Deadline moved from t=100ms to t=160ms.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(channel.take_sent().is_empty());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(
        summary(&channel.take_sent()),
        vec![(PacketKind::Data, 1), (PacketKind::Data, 2)]
    );
}

#[tokio::test(start_paused = true)]
async fn stale_and_corrupt_acks_ignored() {
    let (gbn, channel) = engine(4);
    advance_to_base_five(&gbn, &channel);

    tokio::time::sleep(TIMEOUT / 2).await;
    channel.inject(&ack(3));
    channel.inject(&ack(9));
    channel.inject(&corrupt(ack(7)));
    assert_eq!(gbn.base(), 5);
    assert_eq!(gbn.in_flight(), 3);

    // Ignored ACKs do not push the deadline back.
    tokio::time::sleep(TIMEOUT * 3 / 4).await;
    assert_eq!(channel.take_sent().len(), 3);
}

// ---------------------------------------------------------------------------
// Receiver half
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn gap_reacks_last_in_order_packet() {
    let channel = RecordingChannel::new();
    let (got, deliver) = inbox();
    let gbn = GoBackN::open(config(4), channel.clone(), deliver).expect("open");

    channel.inject(&data(0, b"x"));
    channel.inject(&data(1, b"y"));
    channel.inject(&data(2, b"z"));
    channel.take_sent();
    assert_eq!(gbn.expected_sequence_number(), 3);

    channel.inject(&data(5, b"later"));
    channel.inject(&corrupt(data(3, b"broken")));
    assert_eq!(
        summary(&channel.take_sent()),
        vec![(PacketKind::Ack, 2), (PacketKind::Ack, 2)]
    );
    assert_eq!(got.lock().unwrap().len(), 3);
    assert_eq!(gbn.expected_sequence_number(), 3);
}

#[tokio::test(start_paused = true)]
async fn unknown_kind_ignored() {
    let (gbn, channel) = engine(4);
    let mut datagram = data(0, b"?");
    datagram[1] = 7;
    channel.inject(&datagram);
    assert!(channel.take_sent().is_empty());
    assert_eq!(gbn.expected_sequence_number(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_is_idempotent_and_final() {
    let (gbn, channel) = engine(4);
    send_all(&gbn, &["a"]);
    channel.take_sent();

    gbn.shutdown();
    gbn.shutdown();
    assert_eq!(gbn.state(), ConnectionState::Shutdown);
    assert!(channel.is_closed());
    assert_eq!(gbn.send(b"b"), Err(SendError::Closed));

    tokio::time::sleep(TIMEOUT * 3).await;
    assert!(channel.take_sent().is_empty());
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn loopback_transfer_in_order() {
    let (a, b) = LoopbackChannel::pair(8080, 8081);
    let cfg = ArqConfig {
        timeout: Duration::from_millis(50),
        window_size: 4,
        ..ArqConfig::default()
    };
    let sender = GoBackN::open(cfg.clone(), Arc::new(a), |_| {}).expect("open sender");
    let (got, deliver) = inbox();
    let _receiver = GoBackN::open(cfg, Arc::new(b), deliver).expect("open receiver");

    let messages = ["A", "B", "C", "D", "E"];
    send_all(&sender, &messages[..4]);
    // No ACK can arrive before this task yields.
    assert_eq!(sender.send(b"E"), Err(SendError::WindowFull));
    while sender.send(b"E").is_err() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert!(wait_until(Duration::from_secs(5), || sender.is_idle()).await);
    assert!(wait_until(Duration::from_secs(1), || got.lock().unwrap().len() == 5).await);
    let expected: Vec<Vec<u8>> = messages.iter().map(|m| m.as_bytes().to_vec()).collect();
    assert_eq!(*got.lock().unwrap(), expected);
}

#[tokio::test(start_paused = true)]
async fn lossy_transfer_delivers_everything_once() {
    const COUNT: usize = 50;
    let (a, b) = LoopbackChannel::pair(8080, 8081);
    let faults = |seed| FaultConfig {
        loss_rate: 0.1,
        bit_error_rate: 0.1,
        duplicate_rate: 0.05,
        seed: Some(seed),
    };
    let a = LossyChannel::new(Arc::new(a), faults(7)).unwrap();
    let b = LossyChannel::new(Arc::new(b), faults(8)).unwrap();

    let cfg = ArqConfig {
        timeout: Duration::from_millis(20),
        window_size: 8,
        ..ArqConfig::default()
    };
    let sender = open(Protocol::GoBackN, cfg.clone(), Arc::new(a), |_| {}).expect("open sender");
    let (got, deliver) = inbox();
    let _receiver = open(Protocol::GoBackN, cfg, Arc::new(b), deliver).expect("open receiver");

    for i in 0..COUNT {
        let msg = format!("MSG:{i}");
        while sender.send(msg.as_bytes()).is_err() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
    assert!(wait_until(Duration::from_secs(60), || sender.is_idle()).await);
    assert!(wait_until(Duration::from_secs(1), || got.lock().unwrap().len() == COUNT).await);

    let expected: Vec<Vec<u8>> = (0..COUNT).map(|i| format!("MSG:{i}").into_bytes()).collect();
    assert_eq!(*got.lock().unwrap(), expected);
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

#[tokio::test]
async fn open_builds_requested_engine() {
    for protocol in [Protocol::StopAndWait, Protocol::GoBackN] {
        let transport = open(protocol, config(4), RecordingChannel::new(), |_| {}).expect("open");
        assert_eq!(transport.protocol(), protocol);
        assert!(transport.is_idle());
    }
}

#[tokio::test]
async fn invalid_window_rejected() {
    for window_size in [0, 0x8000] {
        let err = GoBackN::open(config(window_size), RecordingChannel::new(), |_| {})
            .err()
            .expect("window must be rejected");
        assert!(matches!(err, ArqError::Config(_)), "{err}");
    }
}

#[test]
fn open_outside_runtime_fails() {
    let err = open(Protocol::GoBackN, config(4), RecordingChannel::new(), |_| {})
        .err()
        .expect("no runtime");
    assert!(matches!(err, ArqError::NoRuntime));
}

// ---------------------------------------------------------------------------
// Concurrent event sources
// ---------------------------------------------------------------------------

/// Sender, delivery tasks and timer tasks all run on different worker
/// threads; a 1 ms timeout keeps expiries racing ACKs throughout.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lossy_transfer_on_worker_threads() {
    const COUNT: usize = 300;
    let (a, b) = LoopbackChannel::pair(8080, 8081);
    let faults = |seed| FaultConfig {
        loss_rate: 0.1,
        bit_error_rate: 0.1,
        duplicate_rate: 0.05,
        seed: Some(seed),
    };
    let a = LossyChannel::new(Arc::new(a), faults(31)).unwrap();
    let b = LossyChannel::new(Arc::new(b), faults(32)).unwrap();

    let cfg = ArqConfig {
        timeout: Duration::from_millis(1),
        window_size: 8,
        ..ArqConfig::default()
    };
    let sender = GoBackN::open(cfg.clone(), Arc::new(a), |_| {}).expect("open sender");
    let (got, deliver) = inbox();
    let receiver = GoBackN::open(cfg, Arc::new(b), deliver).expect("open receiver");

    for i in 0..COUNT {
        let msg = format!("MSG:{i}");
        while sender.send(msg.as_bytes()).is_err() {
            tokio::task::yield_now().await;
        }
    }
    assert!(wait_until(Duration::from_secs(30), || sender.is_idle()).await);
    assert!(wait_until(Duration::from_secs(5), || got.lock().unwrap().len() >= COUNT).await);

    let expected: Vec<Vec<u8>> = (0..COUNT).map(|i| format!("MSG:{i}").into_bytes()).collect();
    assert_eq!(*got.lock().unwrap(), expected);
    assert_eq!(sender.base(), COUNT as u16);
    assert_eq!(receiver.expected_sequence_number(), COUNT as u16);
}
