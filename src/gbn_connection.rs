//! Go-Back-N engine: sliding-window sender and in-order receiver in one
//! instance.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  send(msg) ─────────────────┐
//!  Channel                           │      GoBackN
//!      │  on_arrival(datagram) ──────┼──▶ Mutex<GbnState>
//!  RetransmitTimer                   │      ├── GbnSender   (base, next, window log)
//!      │  on_timeout(tick) ──────────┘      └── Receiver    (expected seq)
//!      ▼
//!  Channel::send (DATA, ACK, whole-window resend)
//! ```
//!
//! # Timer discipline
//!
//! - Armed when the first packet enters an empty window.
//! - Restarted whenever a cumulative ACK moves `base` or repeats `base - 1`
//!   while packets remain.
//! - Stopped when the window drains or on shutdown.
//! - On expiry every packet in `[base, next)` is resent and the timer keeps
//!   running, so an unanswered window is replayed every `timeout`.

use std::num::NonZeroU16;
use std::sync::{Arc, Mutex, Weak};

use tokio::runtime::Handle;

use crate::channel::{ArrivalHandler, Channel};
use crate::config::{ArqConfig, ConfigError};
use crate::connection::{lock, ArqError, Delivery, Protocol, SendError, Transport};
use crate::gbn_sender::{AckOutcome, GbnSender};
use crate::packet::{encode, Packet, PacketKind};
use crate::receiver::{Receiver, Verdict};
use crate::state::ConnectionState;
use crate::timer::{RetransmitTimer, Tick};

#[derive(Debug)]
struct GbnState {
    lifecycle: ConnectionState,
    sender: GbnSender,
    receiver: Receiver,
}

struct Shared {
    config: ArqConfig,
    channel: Arc<dyn Channel>,
    deliver: Delivery,
    timer: RetransmitTimer,
    state: Mutex<GbnState>,
}

/// A Go-Back-N protocol instance bound to one channel.
///
/// Dropping the handle shuts the instance down.
pub struct GoBackN {
    shared: Arc<Shared>,
}

impl GoBackN {
    /// Bind to `channel` and start accepting arrivals.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open<F>(config: ArqConfig, channel: Arc<dyn Channel>, deliver: F) -> Result<Self, ArqError>
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        config.validate()?;
        let window_size =
            NonZeroU16::new(config.window_size).ok_or(ConfigError::WindowSize(0))?;
        let runtime = Handle::try_current().map_err(|_| ArqError::NoRuntime)?;

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let weak = weak.clone();
            Shared {
                timer: RetransmitTimer::new(runtime, config.timeout, move |tick| {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_timeout(tick);
                    }
                }),
                state: Mutex::new(GbnState {
                    lifecycle: ConnectionState::Open,
                    sender: GbnSender::new(window_size),
                    receiver: Receiver::new(),
                }),
                config,
                channel,
                deliver: Box::new(deliver),
            }
        });

        let handler: Arc<dyn ArrivalHandler> = shared.clone();
        shared.channel.attach(Arc::downgrade(&handler))?;
        log::debug!(
            "[gbn] open local={} remote={} window={}",
            shared.channel.local_port(),
            shared.channel.remote_port(),
            shared.config.window_size
        );
        Ok(Self { shared })
    }

    /// Oldest unacknowledged sequence number.
    pub fn base(&self) -> u16 {
        lock(&self.shared.state).sender.base
    }

    /// Sequence number the next `send` will use.
    pub fn next_sequence_number(&self) -> u16 {
        lock(&self.shared.state).sender.next_seq
    }

    /// Sequence number the receive half will accept next.
    pub fn expected_sequence_number(&self) -> u16 {
        lock(&self.shared.state).receiver.expected
    }

    /// Packets sent but not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        lock(&self.shared.state).sender.in_flight()
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.shared.state).lifecycle
    }
}

impl Transport for GoBackN {
    fn protocol(&self) -> Protocol {
        Protocol::GoBackN
    }

    fn send(&self, message: &[u8]) -> Result<(), SendError> {
        self.shared.send(message)
    }

    fn is_idle(&self) -> bool {
        !lock(&self.shared.state).sender.has_unacked()
    }

    fn shutdown(&self) {
        self.shared.shutdown();
    }
}

impl Drop for GoBackN {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl Shared {
    fn send(&self, message: &[u8]) -> Result<(), SendError> {
        let max = self.config.max_payload;
        if message.len() > max {
            return Err(SendError::PayloadTooLarge { len: message.len(), max });
        }

        let mut state = lock(&self.state);
        if !state.lifecycle.is_open() {
            return Err(SendError::Closed);
        }
        if !state.sender.can_send() {
            return Err(SendError::WindowFull);
        }

        let seq = state.sender.next_seq;
        let (datagram, first) = state.sender.record_sent(message);
        self.channel.send(datagram);
        // Arm the retransmit timer when the first packet enters.
        if first {
            self.timer.start();
        }
        log::debug!(
            "[gbn] → DATA seq={seq} len={} in_flight={}",
            message.len(),
            state.sender.in_flight()
        );
        Ok(())
    }

    /// Go-Back-N: retransmit every unacked packet from `base`.
    fn on_timeout(&self, tick: Tick) {
        let mut state = lock(&self.state);
        if !state.lifecycle.is_open() || !self.timer.is_live(tick) {
            return;
        }
        for entry in state.sender.window_entries() {
            self.channel.send(&entry.datagram);
        }
        state.sender.on_retransmit();
        log::debug!(
            "[gbn] timeout — retransmitted {} packet(s) from base={}",
            state.sender.in_flight(),
            state.sender.base
        );
    }

    fn shutdown(&self) {
        let mut state = lock(&self.state);
        if !state.lifecycle.is_open() {
            return;
        }
        state.lifecycle = ConnectionState::Shutdown;
        self.timer.stop();
        self.channel.close();
        log::debug!("[gbn] shutdown");
    }

    fn send_ack(&self, seq: u16) {
        self.channel.send(&encode(PacketKind::Ack, seq, &[]));
    }
}

impl ArrivalHandler for Shared {
    fn on_arrival(&self, datagram: &[u8]) {
        let pkt = match Packet::decode(datagram) {
            Ok(pkt) => pkt,
            Err(e) => {
                log::debug!("[gbn] ← dropped: {e}");
                return;
            }
        };
        let intact = pkt.is_intact();

        let mut state = lock(&self.state);
        if !state.lifecycle.is_open() {
            return;
        }

        match pkt.kind {
            PacketKind::Data => {
                let verdict = state.receiver.on_data(pkt.seq, intact);
                if let Verdict::Deliver { .. } = verdict {
                    (self.deliver)(pkt.payload);
                }
                self.send_ack(verdict.ack());
                log::debug!(
                    "[gbn] ← DATA seq={} intact={intact} {verdict:?}",
                    pkt.seq
                );
            }
            PacketKind::Ack if intact => match state.sender.on_ack(pkt.seq) {
                AckOutcome::Advanced { acked, drained } => {
                    if drained {
                        // Window drained; disarm the timer.
                        self.timer.stop();
                    } else {
                        // Fresh deadline for the new oldest packet.
                        self.timer.start();
                    }
                    log::debug!("[gbn] ← ACK seq={} slid={acked}", pkt.seq);
                }
                AckOutcome::Duplicate => {
                    // Nothing slid, but the window is still open: fresh deadline.
                    self.timer.start();
                    log::trace!("[gbn] ← duplicate ACK seq={}", pkt.seq);
                }
                AckOutcome::Ignored => log::trace!("[gbn] ← stale ACK seq={}", pkt.seq),
            },
            PacketKind::Ack => log::trace!("[gbn] ← corrupt ACK dropped"),
            PacketKind::Unknown(kind) => log::trace!("[gbn] ← unknown kind {kind} dropped"),
        }
    }
}
