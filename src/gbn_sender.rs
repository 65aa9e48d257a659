//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] maintains a sliding window of up to `N` in-flight packets.
//! Unlike stop-and-wait, multiple packets may be outstanding simultaneously.
//!
//! # Protocol contract
//!
//! - At most `window_size` packets may be in flight at once.
//! - ACKs are **cumulative**: an ACK for `k` means the receiver has accepted
//!   every packet up to and including sequence number `k`.
//! - On timeout, the caller retransmits **all** unacked packets from `base`
//!   onwards (go back to N).
//! - Sequence numbers are `u16` and wrap around; the window never spans more
//!   than half the sequence space, so wrapped differences are unambiguous.
//!
//! This module only manages state; all channel I/O is the caller's
//! responsibility.

use std::collections::VecDeque;
use std::num::NonZeroU16;

use crate::packet::{encode, PacketKind};

/// A single in-flight packet occupying one slot in the retransmit window.
#[derive(Debug, Clone)]
pub struct GbnEntry {
    pub seq: u16,
    /// The framed datagram (ready to hand to the channel).
    pub datagram: Vec<u8>,
    /// Total number of times this packet has been transmitted.
    pub tx_count: u32,
}

/// Result of feeding a cumulative ACK to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Stale or beyond anything sent; state unchanged.
    Ignored,
    /// Repeats the last cumulative ACK (`base - 1`) while packets are still
    /// in flight.  Nothing leaves the window but the deadline is refreshed.
    Duplicate,
    /// `acked` packets left the window; `drained` when none remain.
    Advanced { acked: usize, drained: bool },
}

/// Go-Back-N send-side state for one transport.
///
/// # Sequence-number layout
///
/// ```text
///    base            next_seq
///      │                  │
///  ────┼──────────────────┼──────────────────▶ seq space
///      │ <── in flight ──▶│ <── sendable ───▶
/// ```
#[derive(Debug)]
pub struct GbnSender {
    /// Sequence number of the **oldest** unacked packet (left window edge).
    pub base: u16,

    /// Sequence number to use for the **next** new packet.
    pub next_seq: u16,

    /// Maximum number of packets that may be in flight simultaneously (N).
    window_size: u16,

    /// In-flight packets ordered by sequence number (front = `base`).
    window: VecDeque<GbnEntry>,
}

impl GbnSender {
    /// Create a new [`GbnSender`] starting at sequence number 0.
    ///
    /// `window_size` is the GBN window size N.
    pub fn new(window_size: NonZeroU16) -> Self {
        let window_size = window_size.get();
        Self {
            base: 0,
            next_seq: 0,
            window_size,
            window: VecDeque::with_capacity(usize::from(window_size)),
        }
    }

    pub fn window_size(&self) -> u16 {
        self.window_size
    }

    /// `true` when there is room for at least one more in-flight packet.
    pub fn can_send(&self) -> bool {
        self.in_flight() < usize::from(self.window_size)
    }

    /// Number of packets currently awaiting acknowledgement
    /// (`next_seq - base`).
    pub fn in_flight(&self) -> usize {
        self.window.len()
    }

    /// `true` when at least one packet is awaiting acknowledgement.
    pub fn has_unacked(&self) -> bool {
        !self.window.is_empty()
    }

    /// Frame `payload` as the next DATA packet, log it in the window and
    /// advance `next_seq`.
    ///
    /// Returns the datagram to transmit and whether it is the first
    /// outstanding packet (the caller arms its timer then).  Check
    /// [`GbnSender::can_send`] first.
    pub fn record_sent(&mut self, payload: &[u8]) -> (&[u8], bool) {
        debug_assert!(
            self.can_send(),
            "record_sent called on a full GBN window ({} / {})",
            self.window.len(),
            self.window_size
        );
        let first = self.base == self.next_seq;
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.window.push_back(GbnEntry {
            seq,
            datagram: encode(PacketKind::Data, seq, payload),
            tx_count: 1,
        });
        let newest = self.window.back().map(|e| e.datagram.as_slice());
        (newest.unwrap_or_default(), first)
    }

    /// Process a cumulative ACK for sequence number `seq`.
    ///
    /// Slides the window when `seq + 1` lies in `(base, next_seq]`.  A
    /// repeat of `base - 1` is reported as [`AckOutcome::Duplicate`] while
    /// packets are in flight.  Anything else is stale or beyond what was
    /// ever sent and would break `base <= next_seq <= base + N`.
    pub fn on_ack(&mut self, seq: u16) -> AckOutcome {
        let new_base = seq.wrapping_add(1);
        let advance = usize::from(new_base.wrapping_sub(self.base));
        if advance == 0 && self.has_unacked() {
            return AckOutcome::Duplicate;
        }
        if advance == 0 || advance > self.window.len() {
            return AckOutcome::Ignored;
        }

        self.window.drain(..advance);
        self.base = new_base;
        AckOutcome::Advanced {
            acked: advance,
            drained: self.window.is_empty(),
        }
    }

    /// Iterate over all in-flight packets from oldest to newest.
    ///
    /// Used by the engine to retransmit all unacked packets on timeout (the
    /// "go back N" step).
    pub fn window_entries(&self) -> impl Iterator<Item = &GbnEntry> {
        self.window.iter()
    }

    /// Increment the transmission count for every in-flight packet.
    ///
    /// Call this immediately after retransmitting the entire window.
    pub fn on_retransmit(&mut self) {
        for entry in self.window.iter_mut() {
            entry.tx_count += 1;
        }
    }
}
