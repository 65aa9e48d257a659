//! Wire-format definitions for ARQ packets.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (kind, sequence number, checksum).
//! - Framing a payload into a byte buffer ready for transmission.
//! - Parsing a raw byte slice back into a [`Packet`].
//! - Computing the 16-bit one's-complement checksum that guards the frame.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! All header fields are **big-endian** `u16`s.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             Kind              |        Sequence Number        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Checksum            |          Payload ...          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 6 bytes.  There is no length field;
//! the payload runs to the end of the datagram.
//!
//! # Checksum strength
//!
//! The checksum is a weak integrity check matched to a bit-error channel.
//! Every single-bit flip is caught, but multi-bit errors that cancel out in
//! one's-complement arithmetic (e.g. swapping two aligned payload words) are
//! not.

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 6;

// Byte offsets of each field within the serialised header.
const OFF_KIND: usize = 0;
const OFF_SEQ: usize = 2;
const OFF_CHECKSUM: usize = 4;

/// Discriminates data packets from acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Data,
    Ack,
    /// Any other wire value (usually the product of a corrupted header).
    Unknown(u16),
}

impl PacketKind {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => PacketKind::Data,
            2 => PacketKind::Ack,
            other => PacketKind::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            PacketKind::Data => 1,
            PacketKind::Ack => 2,
            PacketKind::Unknown(v) => v,
        }
    }
}

/// A parsed datagram: header fields plus payload bytes.
///
/// `checksum` is the value carried on the wire, which may disagree with the
/// other fields if the datagram was damaged in transit; see
/// [`Packet::is_intact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub seq: u16,
    pub checksum: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Never inspects the checksum; a damaged frame still decodes so the
    /// caller can decide how to react to it.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::Truncated { len: buf.len() });
        }

        let field = |off: usize| u16::from_be_bytes([buf[off], buf[off + 1]]);

        Ok(Packet {
            kind: PacketKind::from_u16(field(OFF_KIND)),
            seq: field(OFF_SEQ),
            checksum: field(OFF_CHECKSUM),
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }

    /// `true` when the carried checksum matches one recomputed over the
    /// decoded kind, sequence number and payload.
    pub fn is_intact(&self) -> bool {
        checksum(self.kind, self.seq, &self.payload) == self.checksum
    }
}

/// Frame `payload` behind a header carrying `kind`, `seq` and the checksum.
///
/// No length limit is enforced here; the caller must respect the channel's
/// maximum datagram size.
pub fn encode(kind: PacketKind, seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_LEN + payload.len()];

    buf[OFF_KIND..OFF_KIND + 2].copy_from_slice(&kind.to_u16().to_be_bytes());
    buf[OFF_SEQ..OFF_SEQ + 2].copy_from_slice(&seq.to_be_bytes());
    buf[OFF_CHECKSUM..OFF_CHECKSUM + 2]
        .copy_from_slice(&checksum(kind, seq, payload).to_be_bytes());
    buf[HEADER_LEN..].copy_from_slice(payload);

    buf
}

/// One's-complement checksum over the header words and the payload.
///
/// The running sum starts as `kind + seq`.  Payload bytes are folded in
/// pairs, first byte in the low half of the word; an odd trailing byte is
/// added as a standalone 8-bit value.  The result is the complement of the
/// accumulated sum.
pub fn checksum(kind: PacketKind, seq: u16, payload: &[u8]) -> u16 {
    let mut sum = ones_complement_add(kind.to_u16(), seq);

    let mut words = payload.chunks_exact(2);
    for pair in &mut words {
        sum = ones_complement_add(sum, u16::from_le_bytes([pair[0], pair[1]]));
    }
    if let [last] = words.remainder() {
        sum = ones_complement_add(sum, u16::from(*last));
    }

    !sum
}

/// 16-bit addition with end-around carry.
#[inline]
fn ones_complement_add(a: u16, b: u16) -> u16 {
    let (sum, carry) = a.overflowing_add(b);
    sum + u16::from(carry)
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("datagram of {len} bytes is shorter than the {HEADER_LEN}-byte header")]
    Truncated { len: usize },
}
