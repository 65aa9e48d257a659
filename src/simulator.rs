//! Fault-injecting channel for testing.
//!
//! Real networks drop and damage packets.  To exercise the reliability
//! mechanisms without depending on actual network conditions, this module
//! provides a [`LossyChannel`] that wraps any [`Channel`] and intercepts
//! sends, applying a configurable fault model:
//!
//! | Fault        | Description                                           |
//! |--------------|-------------------------------------------------------|
//! | Packet loss  | Drop a datagram with probability `loss_rate`.         |
//! | Bit error    | Flip one random bit with probability `bit_error_rate`.|
//! | Duplication  | Deliver a datagram twice with `duplicate_rate`.       |
//!
//! With `seed` set, the sequence of faults is fully reproducible.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::channel::{ArrivalHandler, Channel, ChannelError};

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a surviving datagram has one bit flipped.
    pub bit_error_rate: f64,
    /// Probability that a surviving datagram is sent twice.
    pub duplicate_rate: f64,
    /// Fixed RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for FaultConfig {
    fn default() -> Self {
        // No faults by default.
        Self {
            loss_rate: 0.0,
            bit_error_rate: 0.0,
            duplicate_rate: 0.0,
            seed: None,
        }
    }
}

impl FaultConfig {
    pub fn validate(&self) -> Result<(), FaultConfigError> {
        for (name, p) in [
            ("loss_rate", self.loss_rate),
            ("bit_error_rate", self.bit_error_rate),
            ("duplicate_rate", self.duplicate_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(FaultConfigError { name, value: p });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{name} = {value} is not a probability")]
pub struct FaultConfigError {
    pub name: &'static str,
    pub value: f64,
}

/// A fault-injecting wrapper around another channel.
///
/// Faults are applied on the sending side; arrivals are passed through.
pub struct LossyChannel {
    inner: Arc<dyn Channel>,
    faults: FaultConfig,
    rng: Mutex<StdRng>,
}

impl LossyChannel {
    pub fn new(inner: Arc<dyn Channel>, faults: FaultConfig) -> Result<Self, FaultConfigError> {
        faults.validate()?;
        let rng = match faults.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            inner,
            faults,
            rng: Mutex::new(rng),
        })
    }

    pub fn faults(&self) -> &FaultConfig {
        &self.faults
    }
}

impl Channel for LossyChannel {
    fn local_port(&self) -> u16 {
        self.inner.local_port()
    }

    fn remote_port(&self) -> u16 {
        self.inner.remote_port()
    }

    fn attach(&self, handler: Weak<dyn ArrivalHandler>) -> Result<(), ChannelError> {
        self.inner.attach(handler)
    }

    fn send(&self, datagram: &[u8]) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);

        if rng.random_bool(self.faults.loss_rate) {
            log::trace!("[sim] dropped {} byte datagram", datagram.len());
            return;
        }

        let mut out = datagram.to_vec();
        if !out.is_empty() && rng.random_bool(self.faults.bit_error_rate) {
            let bit = rng.random_range(0..out.len() * 8);
            out[bit / 8] ^= 1 << (bit % 8);
            log::trace!("[sim] flipped bit {bit}");
        }
        let duplicate = rng.random_bool(self.faults.duplicate_rate);
        drop(rng);

        self.inner.send(&out);
        if duplicate {
            log::trace!("[sim] duplicated datagram");
            self.inner.send(&out);
        }
    }

    fn close(&self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for LossyChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LossyChannel")
            .field("local_port", &self.local_port())
            .field("remote_port", &self.remote_port())
            .field("faults", &self.faults)
            .finish()
    }
}
