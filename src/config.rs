//! Protocol parameters fixed when a transport is opened.

use std::time::Duration;

use thiserror::Error;

/// Largest Go-Back-N window for which wrapped 16-bit sequence numbers stay
/// unambiguous (half the sequence space, minus one).
pub const MAX_WINDOW_SIZE: u16 = 0x7FFF;

/// Adjustable protocol parameters.
///
/// Consumed once at construction; engines never mutate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArqConfig {
    /// Retransmission timeout; also the interval between repeated resends.
    pub timeout: Duration,
    /// Go-Back-N window in packets.  Stop-and-Wait always uses 1.
    pub window_size: u16,
    /// Largest payload accepted by `send`, in bytes.
    pub max_payload: usize,
}

impl Default for ArqConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(3),
            window_size: 20,
            max_payload: 500,
        }
    }
}

impl ArqConfig {
    /// Check every field is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.window_size == 0 || self.window_size > MAX_WINDOW_SIZE {
            return Err(ConfigError::WindowSize(self.window_size));
        }
        if self.max_payload == 0 {
            return Err(ConfigError::ZeroPayload);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("retransmission timeout must be non-zero")]
    ZeroTimeout,
    #[error("window size {0} is outside 1..={MAX_WINDOW_SIZE}")]
    WindowSize(u16),
    #[error("maximum payload size must be non-zero")]
    ZeroPayload,
}
