//! Outbound state for stop-and-wait reliability.
//!
//! [`Sender`] tracks sequence numbers and the single in-flight packet.
//! It does **not** touch the channel; [`crate::sw_connection::StopAndWait`]
//! calls these methods and owns the actual transmission.
//!
//! # Stop-and-Wait contract
//! - At most **one** packet is in flight at any moment (`unacked`).
//! - A new packet may only be sent once `next_seq == last_acked + 1`.
//! - On ACK of the in-flight sequence: advance `last_acked`; clear `unacked`.
//! - On timeout: increment `tx_count`; resend the same bytes unchanged.

use crate::packet::{encode, PacketKind};

/// A packet that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitEntry {
    pub seq: u16,
    /// The framed datagram, ready to hand to the channel again.
    pub datagram: Vec<u8>,
    /// How many times this packet has been transmitted (1 = first send).
    pub tx_count: u32,
}

/// Stop-and-wait send-side state.
#[derive(Debug)]
pub struct Sender {
    /// Sequence number of the **next** packet to send.
    pub next_seq: u16,

    /// Last sequence number the peer acknowledged; `0xFFFF` before the
    /// first ACK.
    pub last_acked: u16,

    /// The in-flight packet, or `None` when the sender is idle.
    pub unacked: Option<RetransmitEntry>,
}

impl Default for Sender {
    fn default() -> Self {
        Self::new()
    }
}

impl Sender {
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            last_acked: u16::MAX,
            unacked: None,
        }
    }

    /// `true` when no packet is outstanding.
    pub fn can_send(&self) -> bool {
        self.next_seq == self.last_acked.wrapping_add(1)
    }

    /// Frame `payload` with the next sequence number, remember it as the
    /// in-flight packet and advance `next_seq`.
    ///
    /// Returns the datagram to transmit.  Check [`Sender::can_send`] first.
    pub fn record_sent(&mut self, payload: &[u8]) -> &[u8] {
        debug_assert!(
            self.can_send(),
            "record_sent called while seq {} is still in flight",
            self.last_acked.wrapping_add(1)
        );
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        let entry = self.unacked.insert(RetransmitEntry {
            seq,
            datagram: encode(PacketKind::Data, seq, payload),
            tx_count: 1,
        });
        &entry.datagram
    }

    /// Process an inbound ACK number.
    ///
    /// Returns `true` if it acknowledges the in-flight packet; `false` for a
    /// duplicate or unexpected ACK, which leaves the state untouched.
    pub fn on_ack(&mut self, seq: u16) -> bool {
        match self.unacked {
            Some(ref entry) if entry.seq == seq => {
                self.last_acked = seq;
                self.unacked = None;
                true
            }
            _ => false,
        }
    }

    /// Bump the transmit count of the in-flight packet and return the bytes
    /// to resend, or `None` when idle.
    pub fn on_retransmit(&mut self) -> Option<&[u8]> {
        let entry = self.unacked.as_mut()?;
        entry.tx_count += 1;
        Some(&entry.datagram)
    }

    /// Number of times the in-flight packet has been sent, or `0` if idle.
    pub fn retransmit_count(&self) -> u32 {
        self.unacked.as_ref().map_or(0, |e| e.tx_count)
    }

    /// `true` when a packet is waiting for an ACK.
    pub fn has_unacked(&self) -> bool {
        self.unacked.is_some()
    }
}
