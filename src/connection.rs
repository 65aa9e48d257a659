//! Common surface of the two ARQ engines.
//!
//! [`Transport`] is what an application holds: `send` a message, query
//! whether everything sent has been acknowledged, `shutdown`.  Engines are
//! picked by name through [`Protocol`] and built with [`open`]:
//!
//! ```ignore
//! let protocol: Protocol = "go-back-n".parse()?;
//! let transport = arq_transport::open(protocol, ArqConfig::default(), channel, |msg| {
//!     println!("{msg:?}");
//! })?;
//! while let Err(SendError::WindowFull) = transport.send(b"hello") {
//!     tokio::time::sleep(Duration::from_millis(1)).await;
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::channel::{Channel, ChannelError};
use crate::config::{ArqConfig, ConfigError};
use crate::gbn_connection::GoBackN;
use crate::sw_connection::StopAndWait;

/// Application callback receiving each in-order payload exactly once.
///
/// Runs on the channel's delivery task with the engine lock held, so it
/// must not call back into the same transport.
pub type Delivery = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// A reliable, ordered message transport over an unreliable [`Channel`].
pub trait Transport: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Transmit `message` as one packet.
    ///
    /// Never blocks: when the window has no free slot this fails with
    /// [`SendError::WindowFull`] and the caller retries later.
    fn send(&self, message: &[u8]) -> Result<(), SendError>;

    /// `true` when every packet sent so far has been acknowledged.
    fn is_idle(&self) -> bool;

    /// Stop the retransmission timer and release the channel.  Idempotent.
    fn shutdown(&self);
}

/// The interchangeable window disciplines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    StopAndWait,
    GoBackN,
}

impl Protocol {
    pub fn name(self) -> &'static str {
        match self {
            Protocol::StopAndWait => "stop-and-wait",
            Protocol::GoBackN => "go-back-n",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stop-and-wait" | "sw" => Ok(Protocol::StopAndWait),
            "go-back-n" | "gbn" => Ok(Protocol::GoBackN),
            _ => Err(format!(
                "unknown protocol '{s}' (expected stop-and-wait or go-back-n)"
            )),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Open a transport of the given kind on `channel`.
pub fn open<F>(
    protocol: Protocol,
    config: ArqConfig,
    channel: Arc<dyn Channel>,
    deliver: F,
) -> Result<Box<dyn Transport>, ArqError>
where
    F: Fn(Vec<u8>) + Send + Sync + 'static,
{
    let transport: Box<dyn Transport> = match protocol {
        Protocol::StopAndWait => Box::new(StopAndWait::open(config, channel, deliver)?),
        Protocol::GoBackN => Box::new(GoBackN::open(config, channel, deliver)?),
    };
    Ok(transport)
}

/// Errors that prevent a transport from opening.
#[derive(Debug, Error)]
pub enum ArqError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("no tokio runtime is available to drive the retransmission timer")]
    NoRuntime,
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Why a `send` did not transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// Every window slot is in flight; retry after an ACK arrives.
    #[error("send window is full")]
    WindowFull,
    #[error("payload of {len} bytes exceeds the {max}-byte maximum")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("transport has been shut down")]
    Closed,
}

/// Lock engine state, recovering from poisoning.  Critical sections never
/// leave the state half-updated, so a panicking delivery callback does not
/// invalidate it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
