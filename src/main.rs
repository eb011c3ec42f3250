use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use seqmem::config::Config;
use seqmem::{clock, Engine, Recorder};

/// Telemetry capture daemon with frame-store persistence.
#[derive(Parser)]
#[command(name = "seqmem", about)]
struct Cli {
    /// Path to the YAML configuration file. Defaults plus SEQ_* environment
    /// variables are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Record this many synthetic events per second.
    #[arg(long, default_value_t = 0)]
    demo_rate: u32,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Version) = &cli.command {
        println!("seqmem {}", version::full());
        return Ok(());
    }

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    let cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            let mut cfg = Config::default();
            cfg.health.enabled = true;
            cfg.apply_env();
            cfg.validate()?;
            cfg
        }
    };

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting seqmem",
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(run(cfg, cli.demo_rate))
}

async fn run(cfg: Config, demo_rate: u32) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(());
    });

    let engine = Engine::init(cfg).await?;

    let demo_cancel = CancellationToken::new();
    let demo = (demo_rate > 0).then(|| {
        tokio::spawn(run_demo(
            engine.recorder(),
            demo_rate,
            demo_cancel.clone(),
        ))
    });

    // A dropped sender also means shut down.
    let _ = shutdown_rx.await;

    demo_cancel.cancel();
    if let Some(demo) = demo {
        // Only returns after cancellation; nothing to report.
        let _ = demo.await;
    }

    engine.shutdown().await?;

    tracing::info!("seqmem stopped");

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler");
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received SIGINT, shutting down");
            }
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("received SIGINT, shutting down");
    }
}

/// Emits synthetic request events so a fresh install has data to show.
async fn run_demo(recorder: Recorder, rate: u32, cancel: CancellationToken) {
    const NAMES: [&str; 4] = ["http.request", "db.query", "cache.get", "queue.publish"];
    const SUBJECTS: [&str; 3] = ["users", "orders", "sessions"];

    let period = Duration::from_secs(1) / rate.max(1);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let started = Instant::now();
    let mut seq: u64 = 0;

    tracing::info!(rate, "demo event generator started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let i = seq as usize;
                let name = NAMES[i % NAMES.len()];
                let subject = (i % 5 != 0).then(|| SUBJECTS[i % SUBJECTS.len()]);
                let duration_us = 50 + (seq * 7919) % 5000;
                let ok = seq % 17 != 0;

                recorder.record(name, clock::now_ms(), duration_us, ok, subject);
                seq += 1;

                if seq % (u64::from(rate.max(1)) * 60) == 0 {
                    tracing::debug!(
                        events = seq,
                        elapsed_s = started.elapsed().as_secs(),
                        "demo events recorded",
                    );
                }
            }
        }
    }
}
