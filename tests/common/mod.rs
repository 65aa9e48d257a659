//! Shared helpers for the engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use arq_transport::channel::{ArrivalHandler, Channel, ChannelError};
use arq_transport::packet::{encode, Packet, PacketKind};

/// A channel that records every outgoing datagram and lets the test inject
/// arrivals directly into the attached engine.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<Vec<u8>>>,
    handler: Mutex<Option<Weak<dyn ArrivalHandler>>>,
    closed: Mutex<bool>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver `datagram` to the engine as if it had arrived from the peer.
    pub fn inject(&self, datagram: &[u8]) {
        let handler = self
            .handler
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
            .expect("no engine attached");
        handler.on_arrival(datagram);
    }

    /// Drain and decode everything sent since the last call.
    pub fn take_sent(&self) -> Vec<Packet> {
        std::mem::take(&mut *self.sent.lock().unwrap())
            .iter()
            .map(|d| Packet::decode(d).expect("engine sent a truncated datagram"))
            .collect()
    }

    /// Drain everything sent since the last call, undecoded.
    pub fn take_raw(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

impl Channel for RecordingChannel {
    fn local_port(&self) -> u16 {
        9000
    }

    fn remote_port(&self) -> u16 {
        9001
    }

    fn attach(&self, handler: Weak<dyn ArrivalHandler>) -> Result<(), ChannelError> {
        *self.handler.lock().unwrap() = Some(handler);
        Ok(())
    }

    fn send(&self, datagram: &[u8]) {
        self.sent.lock().unwrap().push(datagram.to_vec());
    }

    fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }
}

pub fn data(seq: u16, payload: &[u8]) -> Vec<u8> {
    encode(PacketKind::Data, seq, payload)
}

pub fn ack(seq: u16) -> Vec<u8> {
    encode(PacketKind::Ack, seq, &[])
}

/// Flip the low bit of the checksum field.
pub fn corrupt(mut datagram: Vec<u8>) -> Vec<u8> {
    datagram[5] ^= 0x01;
    datagram
}

/// `(kind, seq)` of each packet, for compact assertions.
pub fn summary(packets: &[Packet]) -> Vec<(PacketKind, u16)> {
    packets.iter().map(|p| (p.kind, p.seq)).collect()
}

/// Shared inbox plus a delivery callback that appends to it.
pub fn inbox() -> (Arc<Mutex<Vec<Vec<u8>>>>, impl Fn(Vec<u8>) + Send + Sync + 'static) {
    let inbox = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&inbox);
    (inbox, move |msg: Vec<u8>| sink.lock().unwrap().push(msg))
}

/// Poll `cond` every millisecond until it holds or `limit` elapses.
pub async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(limit, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .is_ok()
}
