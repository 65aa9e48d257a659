//! `arq-transport` — ordered, exactly-once message delivery over a channel
//! that drops and corrupts datagrams.
//!
//! # Architecture
//!
//! ```text
//!  ┌─────────────┐  send(msg)    ┌──────────────────────────────┐
//!  │ Application │──────────────▶│  StopAndWait  /  GoBackN     │
//!  └─────▲───────┘               │  (one lock per instance)     │
//!        │ deliver(payload)      │  ├── sender half             │
//!        └───────────────────────│  ├── receiver half           │
//!                                │  └── RetransmitTimer ◀─ tick │
//!                                └───────┬──────────────▲───────┘
//!                          DATA / ACK    │              │ on_arrival
//!                                ┌───────▼──────────────┴───────┐
//!                                │  Channel (UDP, loopback,     │
//!                                │  optionally LossyChannel)    │
//!                                └──────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]          — wire format and one's-complement checksum
//! - [`timer`]           — repeating retransmission alarm
//! - [`config`]          — protocol parameters fixed at open
//! - [`channel`]         — unreliable channel contract + loopback pair
//! - [`socket`]          — UDP channel on a port pair
//! - [`simulator`]       — seeded loss / bit-error / duplication injection
//! - [`sender`]          — stop-and-wait outbound state
//! - [`gbn_sender`]      — Go-Back-N outbound window state
//! - [`receiver`]        — in-order inbound state (both engines)
//! - [`state`]           — transport lifecycle
//! - [`connection`]      — `Transport` trait, engine factory, errors
//! - [`sw_connection`]   — Stop-and-Wait engine
//! - [`gbn_connection`]  — Go-Back-N engine

pub mod channel;
pub mod config;
pub mod connection;
pub mod gbn_connection;
pub mod gbn_sender;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod sw_connection;
pub mod timer;

pub use channel::{ArrivalHandler, Channel, ChannelError, LoopbackChannel};
pub use config::ArqConfig;
pub use connection::{open, ArqError, Protocol, SendError, Transport};
pub use gbn_connection::GoBackN;
pub use simulator::{FaultConfig, LossyChannel};
pub use socket::UdpChannel;
pub use sw_connection::StopAndWait;
