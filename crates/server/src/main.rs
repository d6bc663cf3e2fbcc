//! # riptide-server — cluster node
//!
//! The thin wrapper the teacher's `cli` already is for a single-node
//! engine, scaled up to a cluster node: load configuration, open the
//! engine, build the hash ring and router, start the consensus node, and
//! serve the §6.1 HTTP surface. Graceful shutdown on SIGINT/SIGTERM stops
//! the consensus driving thread and the HTTP listener before exiting 0;
//! a fatal initialization error exits non-zero.

mod adapters;
mod http;

use adapters::{EngineApplySink, EngineLocalKv};
use anyhow::{Context, Result};
use config::Config;
use engine::{Engine, EngineConfig};
use raft::{ConsensusNode, HttpTransport, Transport};
use ring::HashRing;
use router::{HttpRemoteClient, Router};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tiny_http::Server;

/// Shared handles every HTTP worker thread needs to answer a request.
pub struct AppState {
    pub engine: Arc<Engine>,
    pub router: Arc<Router>,
    pub raft: Arc<ConsensusNode>,
    /// Maps a raft peer id to the public address clients should be
    /// redirected to — distinct from the raft transport's internal peer
    /// addresses, since nothing requires the two to coincide.
    pub id_to_public_addr: HashMap<String, String>,
}

const HTTP_WORKER_THREADS: usize = 4;
/// How often the background compaction check wakes up.
const COMPACTION_POLL_INTERVAL: Duration = Duration::from_millis(500);

fn init_logging(logger: &config::LoggerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&logger.level).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if logger.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn build_engine_config(document: &config::ConfigDocument) -> EngineConfig {
    EngineConfig {
        flush_threshold: document.memtable.flush_threshold,
        flush_chan_buff_size: document.memtable.flush_chan_buff_size,
        size_multiplier: document.persistence.sstable.size_multiplier,
        bloom_fp_rate: document.persistence.bloom_filter.fp_rate,
        wal_sync: true,
        cache_capacity: document.persistence.cache.capacity,
    }
}

fn run() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| std::env::var("RIPTIDE_CONFIG_PATH").unwrap_or_else(|_| "riptide.toml".to_string()));
    let config = Config::load(&config_path).with_context(|| format!("loading configuration from {config_path}"))?;
    init_logging(&config.document.logger);

    tracing::info!(advertise_address = %config.advertise_address, "server: starting");

    let data_root = std::path::Path::new(&config.document.persistence.path);
    let wal_path = data_root.join("wal.log");
    let engine = Arc::new(Engine::new(&wal_path, data_root, build_engine_config(&config.document)).context("opening storage engine")?);

    let ring = HashRing::build(config.virtual_nodes, config.peer_map.iter().map(|p| p.address.clone()));
    let router = Arc::new(Router::new(
        config.advertise_address.clone(),
        ring,
        config.replication_factor,
        Arc::new(EngineLocalKv(Arc::clone(&engine))) as Arc<dyn router::LocalKv>,
        Arc::new(HttpRemoteClient::default()) as Arc<dyn router::RemoteClient>,
    ));

    let raft_config = &config.document.raft;
    let local_raft_id = if raft_config.id.is_empty() { config.advertise_address.clone() } else { raft_config.id.clone() };
    let peer_ids: Vec<String> = raft_config.peers.iter().map(|p| p.id.clone()).filter(|id| id != &local_raft_id).collect();

    let transport = HttpTransport::default();
    for peer in &raft_config.peers {
        if peer.id != local_raft_id {
            transport.add_peer(peer.id.clone(), peer.address.clone());
        }
    }

    let raft_node = Arc::new(ConsensusNode::new(
        local_raft_id.clone(),
        peer_ids,
        Arc::new(transport),
        Arc::new(EngineApplySink(Arc::clone(&engine))),
        raft_config.election_tick,
        raft_config.heartbeat_tick,
        raft_config.pre_vote,
        raft_config.check_quorum,
    ));

    let filter_router = Arc::clone(&router);
    raft_node.set_apply_filter(move |key| filter_router.is_local_replica(key));

    let id_to_public_addr: HashMap<String, String> = config.peer_map.iter().map(|p| (p.id.clone(), p.address.clone())).collect();

    let running = Arc::new(AtomicBool::new(true));
    let driver_running = Arc::clone(&running);
    let driver_node = Arc::clone(&raft_node);
    let driver_handle = std::thread::spawn(move || driver_node.run(&driver_running));

    let state = Arc::new(AppState { engine, router, raft: raft_node, id_to_public_addr });

    let bind_addr = format!("0.0.0.0:{}", config.document.server.port);
    let server = Arc::new(Server::http(bind_addr.as_str()).map_err(|e| anyhow::anyhow!("failed to bind {bind_addr}: {e}"))?);
    tracing::info!(addr = %bind_addr, "server: listening");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        let server = Arc::clone(&server);
        ctrlc::set_handler(move || {
            tracing::info!("server: shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
            server.unblock();
        })
        .context("installing signal handler")?;
    }

    // L0 table count triggering automatic compaction, polled in the
    // background rather than checked inline on the flush path so a burst of
    // flushes doesn't serialize behind a compaction on the flusher thread.
    let compact_threshold = config.document.persistence.sstable.compact_threshold;
    let compaction_handle = {
        let engine = Arc::clone(&state.engine);
        let shutdown = Arc::clone(&shutdown);
        std::thread::spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                std::thread::sleep(COMPACTION_POLL_INTERVAL);
                if engine.sstable_count_at(0) > compact_threshold {
                    if let Err(e) = engine.compact() {
                        tracing::error!(error = %e, "server: automatic compaction failed");
                    }
                }
            }
        })
    };

    let mut workers = Vec::with_capacity(HTTP_WORKER_THREADS);
    for _ in 0..HTTP_WORKER_THREADS {
        let server = Arc::clone(&server);
        let state = Arc::clone(&state);
        let shutdown = Arc::clone(&shutdown);
        workers.push(std::thread::spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                match server.recv_timeout(Duration::from_millis(500)) {
                    Ok(Some(request)) => http::dispatch(&state, request),
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "server: error receiving request"),
                }
            }
        }));
    }

    for worker in workers {
        let _ = worker.join();
    }

    running.store(false, Ordering::SeqCst);
    let _ = driver_handle.join();
    let _ = compaction_handle.join();

    tracing::info!("server: shut down cleanly");
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("fatal: {e:#}");
        std::process::exit(1);
    }
}
