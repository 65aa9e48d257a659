//! Entry point for `arq`.
//!
//! Parses CLI arguments and dispatches into either **send** or **recv** mode.
//! All actual protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, signal handling, argument parsing).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use arq_transport::{
    open, ArqConfig, Channel, FaultConfig, LossyChannel, Protocol, SendError, Transport,
    UdpChannel,
};

/// Port the sender binds by default.
const SENDER_PORT: u16 = 8080;
/// Port the receiver binds by default.
const RECEIVER_PORT: u16 = 8081;

/// How long `send` mode waits for the final window to be acknowledged.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
/// Back-off between retries while the send window is full.
const RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Reliable message transfer over lossy UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send numbered test messages to a receiver.
    Send {
        #[command(flatten)]
        link: LinkArgs,
        /// Number of `MSG:<n>` messages to send.
        #[arg(short, long, default_value_t = 20)]
        count: u32,
    },
    /// Print every message delivered by the protocol until Ctrl-C.
    Recv {
        #[command(flatten)]
        link: LinkArgs,
    },
}

#[derive(Args)]
struct LinkArgs {
    /// Engine: stop-and-wait (sw) or go-back-n (gbn).
    #[arg(short, long)]
    protocol: Protocol,
    /// Local UDP port (default: 8080 for send, 8081 for recv).
    #[arg(long)]
    local_port: Option<u16>,
    /// Peer UDP port (default: 8081 for send, 8080 for recv).
    #[arg(long)]
    remote_port: Option<u16>,
    /// Peer host address.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    host: IpAddr,
    /// Retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 3)]
    timeout_ms: u64,
    /// Go-Back-N window size in packets.
    #[arg(long, default_value_t = 20)]
    window: u16,
    /// Largest message accepted, in bytes.
    #[arg(long, default_value_t = 500)]
    max_payload: usize,
    /// Probability an outgoing datagram is dropped.
    #[arg(long, default_value_t = 0.1)]
    loss: f64,
    /// Probability an outgoing datagram has a bit flipped.
    #[arg(long, default_value_t = 0.1)]
    bit_error: f64,
    /// Probability an outgoing datagram is sent twice.
    #[arg(long, default_value_t = 0.0)]
    duplicate: f64,
    /// Seed for the fault simulator (random when omitted).
    #[arg(long)]
    seed: Option<u64>,
}

impl LinkArgs {
    fn config(&self) -> ArqConfig {
        ArqConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            window_size: self.window,
            max_payload: self.max_payload,
        }
    }

    /// Bind the UDP channel and wrap it in the fault simulator.
    async fn channel(&self, default_local: u16, default_remote: u16) -> Result<Arc<dyn Channel>> {
        let local = SocketAddr::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            self.local_port.unwrap_or(default_local),
        );
        let remote = SocketAddr::new(self.host, self.remote_port.unwrap_or(default_remote));
        let udp = UdpChannel::bind(local, remote)
            .await
            .with_context(|| format!("binding {local}"))?;

        let faults = FaultConfig {
            loss_rate: self.loss,
            bit_error_rate: self.bit_error,
            duplicate_rate: self.duplicate,
            seed: self.seed,
        };
        Ok(Arc::new(LossyChannel::new(Arc::new(udp), faults)?))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Send { link, count } => {
            log::info!("Sending {count} message(s) with {}", link.protocol);
            let channel = link.channel(SENDER_PORT, RECEIVER_PORT).await?;
            let transport = open(link.protocol, link.config(), channel, |_| {})?;
            let result = send_messages(transport.as_ref(), count).await;
            transport.shutdown();
            result
        }
        Mode::Recv { link } => {
            log::info!("Receiving with {}", link.protocol);
            let channel = link.channel(RECEIVER_PORT, SENDER_PORT).await?;
            let transport = open(link.protocol, link.config(), channel, |msg| {
                println!("{:?}", String::from_utf8_lossy(&msg));
            })?;
            tokio::signal::ctrl_c().await?;
            transport.shutdown();
            Ok(())
        }
    }
}

async fn send_messages(transport: &dyn Transport, count: u32) -> Result<()> {
    for i in 0..count {
        let msg = format!("MSG:{i}");
        println!("{msg}");
        // Window full is the expected back-pressure signal; keep polling.
        loop {
            match transport.send(msg.as_bytes()) {
                Ok(()) => break,
                Err(SendError::WindowFull) => tokio::time::sleep(RETRY_INTERVAL).await,
                Err(e) => return Err(e.into()),
            }
        }
    }

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while !transport.is_idle() {
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    })
    .await;
    if drained.is_err() {
        bail!("peer did not acknowledge every message within {DRAIN_TIMEOUT:?}");
    }
    Ok(())
}
