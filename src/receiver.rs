//! Inbound in-order acceptance, shared by both engines.
//!
//! [`Receiver`] implements the receive half of Stop-and-Wait and Go-Back-N,
//! which behave identically:
//!
//! - Only an **intact, in-order** DATA packet (seq == `expected`) is
//!   accepted; its payload goes to the application and it is ACKed.
//! - Anything else (damaged, duplicate, or ahead of `expected`) is
//!   discarded and answered with an ACK for `expected - 1`, the last packet
//!   accepted.  Nothing is buffered out of order.
//!
//! This module only manages state; delivery and ACK transmission are the
//! caller's responsibility.

/// What to do with an arriving DATA packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Hand the payload to the application, then ACK `ack`.
    Deliver { ack: u16 },
    /// Drop the payload and re-assert the last in-order ACK.
    Discard { ack: u16 },
}

impl Verdict {
    pub fn ack(self) -> u16 {
        match self {
            Verdict::Deliver { ack } | Verdict::Discard { ack } => ack,
        }
    }
}

/// Receive-side state for one transport.
#[derive(Debug, Default)]
pub struct Receiver {
    /// Next in-order sequence number that will be accepted.
    pub expected: u16,
}

impl Receiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Judge a DATA packet carrying `seq`; `intact` is the checksum verdict.
    ///
    /// `expected` advances only on [`Verdict::Deliver`].
    pub fn on_data(&mut self, seq: u16, intact: bool) -> Verdict {
        if intact && seq == self.expected {
            self.expected = self.expected.wrapping_add(1);
            Verdict::Deliver { ack: seq }
        } else {
            Verdict::Discard { ack: self.last_accepted() }
        }
    }

    /// Sequence number of the last packet accepted; `0xFFFF` before any.
    pub fn last_accepted(&self) -> u16 {
        self.expected.wrapping_sub(1)
    }
}
