//! Transport lifecycle states.
//!
//! A transport is opened bound to its channel and stays [`Open`] until
//! `shutdown`, after which it ignores arrivals and timer expiries and
//! refuses further sends.  There is no reopening.
//!
//! [`Open`]: ConnectionState::Open

/// Lifecycle of one protocol instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Bound to a channel; all three event sources are live.
    #[default]
    Open,
    /// Timer cancelled and channel released.
    Shutdown,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Open => f.write_str("open"),
            ConnectionState::Shutdown => f.write_str("shutdown"),
        }
    }
}
