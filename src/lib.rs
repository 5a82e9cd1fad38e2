// src/lib.rs

pub mod bridge;
pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod paths;
pub mod rescan;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::bridge::message::CLIENT_LOG;
use crate::bridge::NotificationBridge;
use crate::cache::{CacheStore, FileSnapshotStore};
use crate::cli::CliArgs;
use crate::config::loader::load_or_default;
use crate::config::model::ConfigFile;
use crate::engine::{BuildGate, CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, RuntimeTiming};
use crate::exec::CommandBackend;
use crate::fs::{FileSystem, RealFileSystem};
use crate::paths::PathNormalizer;
use crate::rescan::{RegexScanner, RescanTiming, Rescanner};
use crate::watch::WatchPatterns;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - cache / bridge / gate / core runtime
/// - build backend and rescanner
/// - (optional) file watcher and bridge socket
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_or_default(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let root = project_root(&config_path, &cfg);
    info!(root = ?root, "project root");

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    // Cache, restored from the previous run unless --reset.
    let normalizer =
        PathNormalizer::new(root.clone()).with_strip_prefixes(cfg.project.strip_prefixes.clone());
    let snapshots = FileSnapshotStore::new(root.join(&cfg.project.state_file), Arc::clone(&fs));
    let mut cache = CacheStore::new(normalizer.clone(), Box::new(snapshots));
    cache.init(args.reset);

    let mut bridge =
        NotificationBridge::new(normalizer).with_pending_limit(cfg.bridge.pending_limit);
    bridge.on(
        CLIENT_LOG,
        Box::new(|payload: &serde_json::Map<String, serde_json::Value>| {
            let line = payload
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| serde_json::Value::Object(payload.clone()).to_string());
            info!(target: "buildrelay::client", "{line}");
        }),
    );

    let gate = BuildGate::new();

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(256);

    let backend = CommandBackend::new(cfg.build.cmd.clone(), rt_tx.clone());

    let patterns = WatchPatterns::new(&cfg.watch.include, &cfg.watch.exclude)?;

    // Optional file watcher (disabled in --once mode).
    let _watcher_handle = if !args.once {
        Some(crate::watch::spawn_watcher(
            root.clone(),
            patterns.clone(),
            Arc::clone(&fs),
            rt_tx.clone(),
        )?)
    } else {
        None
    };

    // Optional client bridge (disabled in --once mode).
    let _bridge_server = if cfg.bridge.enabled && !args.once {
        Some(
            crate::bridge::socket::serve_bridge(&cfg.bridge.host, cfg.bridge.port, rt_tx.clone())
                .await?,
        )
    } else {
        None
    };

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    // Report every existing file as added.
    {
        let tx = rt_tx.clone();
        let fs = Arc::clone(&fs);
        let root = root.clone();
        tokio::spawn(async move {
            if let Err(err) = crate::watch::seed_initial_files(&root, &patterns, fs, &tx).await {
                tracing::error!(error = %err, "initial scan failed");
            }
        });
    }

    {
        let first_build = gate.after_first_build();
        tokio::spawn(async move {
            if first_build.await {
                info!("initial build finished; watching for changes");
            }
        });
    }

    let scanner = Arc::new(RegexScanner::new()?);
    let rescanner = Rescanner::new(
        scanner,
        Arc::clone(&fs),
        rt_tx.clone(),
        RescanTiming {
            debounce: cfg.timing.rescan_debounce(),
            scan_timeout: cfg.timing.scan_timeout(),
        },
    );

    let options = RuntimeOptions {
        exit_after_first_build: args.once,
    };

    // Construct the pure core runtime (single source of truth for semantics).
    let core = CoreRuntime::new(cache, bridge, gate, options);

    // Construct the async IO shell around the core.
    let runtime = Runtime::new(
        core,
        rt_rx,
        rt_tx,
        rescanner,
        backend,
        RuntimeTiming {
            settle: cfg.timing.settle(),
        },
    );
    let core = runtime.run().await?;

    if let Some(error) = core.cache().last_error() {
        info!(file = %error.file, message = %error.message, "last recorded compile error");
    }
    Ok(())
}

/// Figure out the project root.
///
/// `[project].root` is taken relative to the directory holding the config
/// file. A bare filename like "Buildrelay.toml" (parent = "") falls back to
/// the current working directory.
fn project_root(config_path: &Path, cfg: &ConfigFile) -> PathBuf {
    let base = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let root = base.join(&cfg.project.root);
    root.canonicalize().unwrap_or(root)
}

/// Simple dry-run output: print the effective configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("buildrelay dry-run");
    println!("  project.root = {:?}", cfg.project.root);
    if !cfg.project.strip_prefixes.is_empty() {
        println!("  project.strip_prefixes = {:?}", cfg.project.strip_prefixes);
    }
    println!("  project.state_file = {:?}", cfg.project.state_file);
    println!();

    println!("watch:");
    println!("  include: {:?}", cfg.watch.include);
    if !cfg.watch.exclude.is_empty() {
        println!("  exclude: {:?}", cfg.watch.exclude);
    }

    println!("build:");
    match &cfg.build.cmd {
        Some(cmd) => println!("  cmd: {cmd}"),
        None => println!("  cmd: (none; builds succeed immediately)"),
    }

    println!("timing:");
    println!("  rescan_debounce_ms: {}", cfg.timing.rescan_debounce_ms);
    println!("  settle_ms: {}", cfg.timing.settle_ms);
    println!("  scan_timeout_ms: {}", cfg.timing.scan_timeout_ms);

    println!("bridge:");
    if cfg.bridge.enabled {
        println!("  listen: {}:{}", cfg.bridge.host, cfg.bridge.port);
        println!("  pending_limit: {}", cfg.bridge.pending_limit);
    } else {
        println!("  disabled");
    }

    debug!("dry-run complete (no execution)");
}
