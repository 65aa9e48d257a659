//! The unreliable channel underneath the protocol engines.
//!
//! A [`Channel`] moves opaque datagrams between one local and one remote
//! endpoint on a best-effort basis: datagrams may be dropped, damaged or
//! reordered and the channel says nothing about it.  Engines attach
//! themselves as the channel's [`ArrivalHandler`] and are called back with
//! every datagram that arrives.
//!
//! Implementations in this crate:
//! - [`LoopbackChannel`] — lossless in-process pair, used by tests.
//! - [`crate::socket::UdpChannel`] — real UDP sockets on a port pair.
//! - [`crate::simulator::LossyChannel`] — fault-injecting wrapper around
//!   either of the above.

use std::sync::{Mutex, PoisonError, Weak};

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Receives datagrams from a [`Channel`].
pub trait ArrivalHandler: Send + Sync {
    /// Called once per arriving datagram, from the channel's delivery task.
    fn on_arrival(&self, datagram: &[u8]);
}

/// Best-effort datagram transport between a fixed port pair.
pub trait Channel: Send + Sync {
    fn local_port(&self) -> u16;

    fn remote_port(&self) -> u16;

    /// Start delivering arrivals to `handler`.
    ///
    /// The handler is held weakly; delivery stops once it has been dropped.
    fn attach(&self, handler: Weak<dyn ArrivalHandler>) -> Result<(), ChannelError>;

    /// Hand `datagram` over for transmission.  Never blocks and never
    /// reports loss.
    fn send(&self, datagram: &[u8]);

    /// Stop delivery and release the underlying binding.  Idempotent.
    fn close(&self);
}

/// Errors that can arise while setting up a channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no tokio runtime is available to drive the channel")]
    NoRuntime,
    #[error("channel already has an arrival handler")]
    AlreadyAttached,
    #[error("channel is closed")]
    Closed,
}

/// Forward every datagram from `inbox` to `handler` until either side goes away.
pub(crate) async fn deliver_loop(
    mut inbox: mpsc::UnboundedReceiver<Vec<u8>>,
    handler: Weak<dyn ArrivalHandler>,
) {
    while let Some(datagram) = inbox.recv().await {
        match handler.upgrade() {
            Some(handler) => handler.on_arrival(&datagram),
            None => break,
        }
    }
}

#[derive(Debug)]
enum Inbox {
    Idle(mpsc::UnboundedReceiver<Vec<u8>>),
    Delivering(JoinHandle<()>),
    Closed,
}

/// One end of an in-process, lossless datagram pipe.
///
/// Datagrams are queued and delivered from a tokio task, so a handler that
/// sends a reply never re-enters the engine that sent the original.
#[derive(Debug)]
pub struct LoopbackChannel {
    local_port: u16,
    remote_port: u16,
    peer: mpsc::UnboundedSender<Vec<u8>>,
    inbox: Mutex<Inbox>,
}

impl LoopbackChannel {
    /// Create two connected ends; `a` sends to `b` and vice versa.
    pub fn pair(port_a: u16, port_b: u16) -> (Self, Self) {
        let (to_b, inbox_b) = mpsc::unbounded_channel();
        let (to_a, inbox_a) = mpsc::unbounded_channel();
        let a = Self {
            local_port: port_a,
            remote_port: port_b,
            peer: to_b,
            inbox: Mutex::new(Inbox::Idle(inbox_a)),
        };
        let b = Self {
            local_port: port_b,
            remote_port: port_a,
            peer: to_a,
            inbox: Mutex::new(Inbox::Idle(inbox_b)),
        };
        (a, b)
    }
}

impl Channel for LoopbackChannel {
    fn local_port(&self) -> u16 {
        self.local_port
    }

    fn remote_port(&self) -> u16 {
        self.remote_port
    }

    fn attach(&self, handler: Weak<dyn ArrivalHandler>) -> Result<(), ChannelError> {
        let runtime = Handle::try_current().map_err(|_| ChannelError::NoRuntime)?;
        let mut inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *inbox, Inbox::Closed) {
            Inbox::Idle(rx) => {
                *inbox = Inbox::Delivering(runtime.spawn(deliver_loop(rx, handler)));
                Ok(())
            }
            Inbox::Delivering(task) => {
                *inbox = Inbox::Delivering(task);
                Err(ChannelError::AlreadyAttached)
            }
            Inbox::Closed => Err(ChannelError::Closed),
        }
    }

    fn send(&self, datagram: &[u8]) {
        // The peer end may already be closed; that is just another loss.
        let _ = self.peer.send(datagram.to_vec());
    }

    fn close(&self) {
        let mut inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        if let Inbox::Delivering(task) = std::mem::replace(&mut *inbox, Inbox::Closed) {
            task.abort();
        }
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        self.close();
    }
}
