//! UDP-backed [`Channel`].
//!
//! [`UdpChannel`] is a thin wrapper around `tokio::net::UdpSocket` bound to
//! the local port and connected to the remote one, so only datagrams from
//! the configured peer are delivered.  All protocol logic lives elsewhere;
//! this module owns only byte I/O.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::channel::{ArrivalHandler, Channel, ChannelError};

/// Maximum UDP payload size (theoretical limit; in practice kept much smaller).
const MAX_DATAGRAM: usize = 65_535;

#[derive(Debug)]
enum RecvTask {
    Idle,
    Running(JoinHandle<()>),
    Closed,
}

/// A best-effort datagram channel over a connected UDP socket.
#[derive(Debug)]
pub struct UdpChannel {
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    socket: Arc<UdpSocket>,
    recv_task: Mutex<RecvTask>,
}

impl UdpChannel {
    /// Bind `local` and connect the socket to `remote`.
    ///
    /// Passing port `0` for `local` lets the OS choose an ephemeral port;
    /// [`Channel::local_port`] then reports the assigned one.
    pub async fn bind(local: SocketAddr, remote: SocketAddr) -> Result<Self, ChannelError> {
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        let local_addr = socket.local_addr()?;
        log::debug!("[udp] bound {local_addr} → {remote}");
        Ok(Self {
            local_addr,
            remote_addr: remote,
            socket: Arc::new(socket),
            recv_task: Mutex::new(RecvTask::Idle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

async fn recv_loop(socket: Arc<UdpSocket>, handler: Weak<dyn ArrivalHandler>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        match socket.recv(&mut buf).await {
            Ok(n) => match handler.upgrade() {
                Some(handler) => handler.on_arrival(&buf[..n]),
                None => break,
            },
            // ICMP port-unreachable from a peer that is not up yet.
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => continue,
            Err(e) => {
                log::warn!("[udp] receive failed: {e}");
                break;
            }
        }
    }
}

impl Channel for UdpChannel {
    fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    fn remote_port(&self) -> u16 {
        self.remote_addr.port()
    }

    fn attach(&self, handler: Weak<dyn ArrivalHandler>) -> Result<(), ChannelError> {
        let runtime = Handle::try_current().map_err(|_| ChannelError::NoRuntime)?;
        let mut task = self.recv_task.lock().unwrap_or_else(PoisonError::into_inner);
        match *task {
            RecvTask::Idle => {
                let socket = Arc::clone(&self.socket);
                *task = RecvTask::Running(runtime.spawn(recv_loop(socket, handler)));
                Ok(())
            }
            RecvTask::Running(_) => Err(ChannelError::AlreadyAttached),
            RecvTask::Closed => Err(ChannelError::Closed),
        }
    }

    fn send(&self, datagram: &[u8]) {
        if let Err(e) = self.socket.try_send(datagram) {
            log::debug!("[udp] dropped {} byte datagram: {e}", datagram.len());
        }
    }

    fn close(&self) {
        let mut task = self.recv_task.lock().unwrap_or_else(PoisonError::into_inner);
        if let RecvTask::Running(handle) = std::mem::replace(&mut *task, RecvTask::Closed) {
            handle.abort();
        }
    }
}

impl Drop for UdpChannel {
    fn drop(&mut self) {
        self.close();
    }
}
