//! Stop-and-Wait engine: one packet in flight, sender and receiver halves in
//! one instance.
//!
//! # Event sources
//!
//! ```text
//!  Application ── send() ─────────┐
//!  Channel ────── on_arrival() ───┼──▶ Mutex<SwState> ──▶ Channel::send
//!  Timer ──────── on_timeout() ───┘    ├── Sender   (seq, outstanding packet)
//!                                      └── Receiver (expected seq)
//! ```
//!
//! All three entry points take the same instance lock for their whole
//! duration, so counters, the outstanding packet and timer start/stop
//! decisions are updated atomically with respect to each other.

use std::sync::{Arc, Mutex, Weak};

use tokio::runtime::Handle;

use crate::channel::{ArrivalHandler, Channel};
use crate::config::ArqConfig;
use crate::connection::{lock, ArqError, Delivery, Protocol, SendError, Transport};
use crate::packet::{encode, Packet, PacketKind};
use crate::receiver::{Receiver, Verdict};
use crate::sender::Sender;
use crate::state::ConnectionState;
use crate::timer::{RetransmitTimer, Tick};

#[derive(Debug)]
struct SwState {
    lifecycle: ConnectionState,
    sender: Sender,
    receiver: Receiver,
}

struct Shared {
    config: ArqConfig,
    channel: Arc<dyn Channel>,
    deliver: Delivery,
    timer: RetransmitTimer,
    state: Mutex<SwState>,
}

/// A Stop-and-Wait protocol instance bound to one channel.
///
/// Dropping the handle shuts the instance down.
pub struct StopAndWait {
    shared: Arc<Shared>,
}

impl StopAndWait {
    /// Bind to `channel` and start accepting arrivals.
    ///
    /// `config.window_size` is ignored; the window is always one packet.
    /// Must be called from within a tokio runtime.
    pub fn open<F>(config: ArqConfig, channel: Arc<dyn Channel>, deliver: F) -> Result<Self, ArqError>
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ArqError::NoRuntime)?;

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let weak = weak.clone();
            Shared {
                timer: RetransmitTimer::new(runtime, config.timeout, move |tick| {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_timeout(tick);
                    }
                }),
                config,
                channel,
                deliver: Box::new(deliver),
                state: Mutex::new(SwState {
                    lifecycle: ConnectionState::Open,
                    sender: Sender::new(),
                    receiver: Receiver::new(),
                }),
            }
        });

        let handler: Arc<dyn ArrivalHandler> = shared.clone();
        shared.channel.attach(Arc::downgrade(&handler))?;
        log::debug!(
            "[sw] open local={} remote={}",
            shared.channel.local_port(),
            shared.channel.remote_port()
        );
        Ok(Self { shared })
    }

    /// Sequence number the next `send` will use.
    pub fn next_sequence_number(&self) -> u16 {
        lock(&self.shared.state).sender.next_seq
    }

    /// Last sequence number the peer acknowledged (`0xFFFF` before any).
    pub fn last_acked(&self) -> u16 {
        lock(&self.shared.state).sender.last_acked
    }

    /// Sequence number the receive half will accept next.
    pub fn expected_sequence_number(&self) -> u16 {
        lock(&self.shared.state).receiver.expected
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.shared.state).lifecycle
    }
}

impl Transport for StopAndWait {
    fn protocol(&self) -> Protocol {
        Protocol::StopAndWait
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

impl Drop for StopAndWait {
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
        let datagram = state.sender.record_sent(message);
        self.channel.send(datagram);
        self.timer.start();
        log::debug!("[sw] → DATA seq={seq} len={}", message.len());
        Ok(())
    }

    fn on_timeout(&self, tick: Tick) {
        let mut state = lock(&self.state);
        if !state.lifecycle.is_open() || !self.timer.is_live(tick) {
            return;
        }
        if let Some(datagram) = state.sender.on_retransmit() {
            self.channel.send(datagram);
            log::debug!(
                "[sw] timeout — resent seq={} (tx #{})",
                state.sender.last_acked.wrapping_add(1),
                state.sender.retransmit_count()
            );
        }
    }

    fn shutdown(&self) {
        let mut state = lock(&self.state);
        if !state.lifecycle.is_open() {
            return;
        }
        state.lifecycle = ConnectionState::Shutdown;
        self.timer.stop();
        self.channel.close();
        log::debug!("[sw] shutdown");
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
                log::debug!("[sw] ← dropped: {e}");
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
                    "[sw] ← DATA seq={} intact={intact} {verdict:?}",
                    pkt.seq
                );
            }
            PacketKind::Ack if intact => {
                if state.sender.on_ack(pkt.seq) {
                    self.timer.stop();
                    log::debug!("[sw] ← ACK seq={}", pkt.seq);
                } else {
                    log::trace!("[sw] ← stray ACK seq={}", pkt.seq);
                }
            }
            PacketKind::Ack => log::trace!("[sw] ← corrupt ACK dropped"),
            PacketKind::Unknown(kind) => log::trace!("[sw] ← unknown kind {kind} dropped"),
        }
    }
}
