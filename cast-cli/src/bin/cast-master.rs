//! Castsync Master - synchronized playback sender
//!
//! Registers receiver nodes, probes their latency, streams a file to all
//! of them, and schedules the latency-compensated synchronized start.

use cast::{PlaybackSession, TcpRemoteLink};
use cast_buffer::BufferConfig;
use cast_cli::{Config, LogPlayer};
use cast_sync::SlaveSpec;
use clap::Parser;
use std::fs::File;
use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cast-master")]
#[command(about = "Castsync synchronized playback master", long_about = None)]
struct Args {
    /// Input file to stream
    #[arg(short, long)]
    input: Option<String>,

    /// Receiver to register, as name=host:port (repeatable)
    #[arg(short, long)]
    slave: Vec<String>,

    /// Size of each forwarded chunk in bytes
    #[arg(long, default_value = "204800")]
    chunk_size: usize,

    /// Bytes to stream before scheduling the synchronized start
    #[arg(long, default_value = "1048576")]
    prebuffer: usize,

    /// Optional TOML config file; flags are ignored when set
    #[arg(short, long)]
    config: Option<String>,
}

fn parse_slave(raw: &str) -> anyhow::Result<SlaveSpec> {
    let (name, addr) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected name=host:port, got '{raw}'"))?;
    Ok(SlaveSpec {
        name: name.to_string(),
        addr: addr.parse()?,
    })
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    let (input, specs, chunk_size, prebuffer) = match &args.config {
        Some(path) => {
            let config = Config::from_file(path)?;
            let master = config
                .master
                .ok_or_else(|| anyhow::anyhow!("config file has no [master] section"))?;
            let specs = master
                .slaves
                .iter()
                .map(|s| SlaveSpec {
                    name: s.name.clone(),
                    addr: s.address,
                })
                .collect::<Vec<_>>();
            (master.input, specs, master.chunk_size, master.prebuffer)
        }
        None => {
            let input = args
                .input
                .ok_or_else(|| anyhow::anyhow!("--input is required without a config file"))?;
            let specs = args
                .slave
                .iter()
                .map(|s| parse_slave(s))
                .collect::<anyhow::Result<Vec<_>>>()?;
            (input, specs, args.chunk_size, args.prebuffer)
        }
    };

    if specs.is_empty() {
        anyhow::bail!("no receivers given; use --slave name=host:port");
    }

    tracing::info!("Castsync master starting...");
    tracing::info!("Input file: {}", input);

    let session = Arc::new(PlaybackSession::new(
        BufferConfig::with_capacity(20 * 1024 * 1024),
        Arc::new(LogPlayer::new()),
        Arc::new(TcpRemoteLink::default()),
    ));

    session.add_slaves(&specs)?;
    tracing::info!("Registered {} receiver(s)", specs.len());

    let mut file = File::open(&input)?;
    let file_size = file.metadata()?.len();
    session.buffer().set_file_size(file_size);

    // Stream the prebuffer so every node has data before the start.
    let mut chunk = vec![0u8; chunk_size];
    let mut sent: u64 = 0;
    while sent < prebuffer as u64 && sent < file_size {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        sent += n as u64;
        session.forward_chunk(&chunk[..n], sent >= file_size);
    }
    tracing::info!(sent, "prebuffer streamed");

    let report = session.start_playback();
    for dispatched in &report.dispatched {
        tracing::info!(
            slave = %dispatched.name,
            delay_us = dispatched.delay.as_micros() as u64,
            "start dispatched"
        );
    }
    if !report.failed.is_empty() {
        tracing::warn!(failed = ?report.failed, "some receivers missed the start");
    }

    // Drain the local buffer in playback's stead so streaming never
    // stalls on our own ring filling up.
    let drain_session = session.clone();
    let drain = thread::spawn(move || {
        let mut scratch = vec![0u8; 64 * 1024];
        loop {
            let n = drain_session.buffer().read(&mut scratch);
            if n == 0 {
                if drain_session.buffer().is_eof() {
                    break;
                }
                thread::sleep(Duration::from_millis(20));
            }
        }
    });

    // Stream the remainder.
    while sent < file_size {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        sent += n as u64;
        let written = session.forward_chunk(&chunk[..n], sent >= file_size);
        if written < n {
            // Receivers got the full chunk; only the local stand-in
            // playback ring was full. Give the drain a beat.
            thread::sleep(Duration::from_millis(20));
        }
    }
    // Empty or short files never carry a last-chunk flag.
    if !session.buffer().is_eof() {
        session.buffer().set_eof(true);
    }
    tracing::info!(sent, "stream complete");

    if drain.join().is_err() {
        tracing::warn!("drain thread panicked");
    }
    session.end_session();

    Ok(())
}
