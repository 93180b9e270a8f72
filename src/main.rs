//! warpgrid - a spatially-partitioned agent simulation node.
//!
//! One node owns a rectangle of a toroidal global grid. The first node
//! starts out owning the whole grid and offers the right half to the first
//! joiner; both then advance turns optimistically, exchanging agents that
//! cross the partition boundary and rolling back on stragglers.

mod config;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tracing::info;

use warpgrid_core::{GlobalCoord, GridDims, Partition};
use warpgrid_engine::{offer_help, request_help, TurnEngine, TurnPacer};
use warpgrid_net::InboundQueue;
use warpgrid_world::{DemoCodec, LocalGrid, Rabbit, TextObserver};

use config::{CliOptions, SimConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with INFO level by default (can be overridden via RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting warpgrid v{}", env!("CARGO_PKG_VERSION"));

    let cli = CliOptions::parse(env::args().skip(1))?;
    let config = SimConfig::load(cli);

    match config.join.clone() {
        Some(addr) => run_client(&config, &addr).await,
        None => run_server(&config).await,
    }
}

fn pacer_for(config: &SimConfig) -> TurnPacer {
    if config.turn_interval_ms == 0 {
        TurnPacer::immediate()
    } else {
        TurnPacer::every(Duration::from_millis(config.turn_interval_ms))
    }
}

fn configure<C: warpgrid_core::AgentCodec>(
    engine: TurnEngine<C>,
    config: &SimConfig,
) -> TurnEngine<C> {
    let engine = engine
        .with_observer(Box::new(TextObserver))
        .with_pacer(pacer_for(config));
    if config.retention > 0 {
        engine.with_retention(config.retention)
    } else {
        engine
    }
}

/// First node: own the whole grid, wait for a joiner, offer it the right
/// half, then run the turn loop.
async fn run_server(config: &SimConfig) -> Result<()> {
    let dims = GridDims::new(config.global_width, config.global_height);
    let grid = LocalGrid::new(Partition::new(0, 0, dims.width, dims.height), dims);
    let mut engine = configure(TurnEngine::new(grid, DemoCodec, config.seed), config);

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(addr = %config.listen, "waiting for a joining node");
    let (socket, remote) = listener
        .accept()
        .await
        .context("accepting the joining node")?;
    info!(%remote, "node joined");
    let (read_half, write_half) = socket.into_split();

    let inbound = engine.inbound();
    let helped = offer_help(
        engine.grid_mut(),
        &DemoCodec,
        0.5,
        0,
        Box::new(read_half),
        Box::new(write_half),
        inbound,
    )
    .await
    .context("help-offer handshake failed")?;
    engine.add_peer(helped.link);

    for row in 0..config.agents {
        engine
            .grid_mut()
            .place_agent(
                GlobalCoord::new(0, row),
                Box::new(Rabbit::wanderer(config.restlessness)),
            )
            .context("placing initial agents")?;
    }
    info!(agents = config.agents, "initial population placed");

    engine.run(config.turns).await
}

/// Joining node: connect, request a region, then run the turn loop.
async fn run_client(config: &SimConfig, addr: &str) -> Result<()> {
    let socket = TcpStream::connect(addr)
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    info!(%addr, "connected; requesting a region");
    let (read_half, write_half) = socket.into_split();

    let inbound = Arc::new(InboundQueue::new());
    let (grid, helped) = request_help(
        &DemoCodec,
        0,
        Box::new(read_half),
        Box::new(write_half),
        Arc::clone(&inbound),
    )
    .await
    .context("help-request handshake failed")?;

    let mut engine = configure(
        TurnEngine::new(grid, DemoCodec, config.seed).with_inbound(inbound),
        config,
    );
    engine.add_peer(helped.link);

    engine.run(config.turns).await
}
