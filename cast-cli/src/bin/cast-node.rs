//! Castsync Node - synchronized playback receiver
//!
//! Runs the node RPC server a master claims, streams into, and starts.

use cast::{NodeServer, PlaybackSession, TcpRemoteLink};
use cast_buffer::BufferConfig;
use cast_cli::{Config, LogPlayer};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "cast-node")]
#[command(about = "Castsync playback receiver node", long_about = None)]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:4004")]
    listen: SocketAddr,

    /// Stream buffer capacity in bytes
    #[arg(long, default_value = "20971520")]
    capacity: usize,

    /// Refill block size in bytes
    #[arg(long, default_value = "204800")]
    block_size: usize,

    /// Optional TOML config file; flags are ignored when set
    #[arg(short, long)]
    config: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    let (listen, capacity, block_size) = match &args.config {
        Some(path) => {
            let config = Config::from_file(path)?;
            let node = config
                .node
                .ok_or_else(|| anyhow::anyhow!("config file has no [node] section"))?;
            (node.listen, node.capacity, node.block_size)
        }
        None => (args.listen, args.capacity, args.block_size),
    };

    tracing::info!("Castsync node starting...");

    let mut cfg = BufferConfig::with_capacity(capacity);
    cfg.block_size = block_size;

    // A node can itself master a group later; give it a real link.
    let session = Arc::new(PlaybackSession::new(
        cfg,
        Arc::new(LogPlayer::new()),
        Arc::new(TcpRemoteLink::default()),
    ));

    let server = NodeServer::bind(listen, session)?;
    tracing::info!("Listening on: {}", server.local_addr()?);
    server.run();

    Ok(())
}
