//! vigild - frame production daemon
//!
//! This daemon:
//! 1. Loads the JSON configuration (sources, filters, snapshot targets)
//! 2. Builds the pipeline and starts every component
//! 3. Arms per-source watchdogs where configured
//! 4. Logs a health line per source every five seconds
//! 5. Shuts the pipeline down cleanly on SIGINT/SIGTERM

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use vigil_kernel::config::VigilConfig;
use vigil_kernel::Startable;

#[derive(Parser, Debug)]
#[command(name = "vigild", version, about = "frame production daemon")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, env = "VIGIL_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let cfg = VigilConfig::load(args.config.as_deref())?;
    let pipeline = cfg.build()?;

    // On-demand sources are run up by their consumers (targets, chroma key
    // filters); the daemon itself only holds a user on the rest.
    for sc in &cfg.sources {
        if sc.on_demand {
            continue;
        }
        if let Some(source) = pipeline.source(&sc.id) {
            source.start();
        }
    }
    for sc in &cfg.sources {
        if let Some(interval) = sc.watchdog {
            if let Some(source) = pipeline.source(&sc.id) {
                source.start_watchdog(interval);
            }
        }
    }
    for target in &pipeline.targets {
        target.start();
    }

    log::info!(
        "vigild {} running with {} source(s), {} target(s)",
        env!("CARGO_PKG_VERSION"),
        pipeline.sources.len(),
        pipeline.targets.len()
    );

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .context("install signal handler")?;

    let mut last_health = Instant::now();
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));

        if last_health.elapsed() >= Duration::from_secs(5) {
            for source in &pipeline.sources {
                let comp = source.component();
                let fps = comp
                    .get_fps()
                    .map(|f| format!("{f:.1}"))
                    .unwrap_or_else(|| "-".to_string());
                let error = comp
                    .get_last_error()
                    .map(|e| format!(" error={:?}", e.message))
                    .unwrap_or_default();
                log::info!(
                    "[{}] running={} fps={} bw={}B/s cpu={:.0}%{}",
                    source.id(),
                    comp.is_running(),
                    fps,
                    comp.get_bw(),
                    comp.get_cpu_usage() * 100.0,
                    error
                );
            }
            last_health = Instant::now();
        }
    }

    log::info!("shutting down");
    for source in &pipeline.sources {
        source.announce_stop();
    }
    for target in &pipeline.targets {
        target.announce_stop();
    }
    for target in &pipeline.targets {
        target.stop();
    }
    for sc in &cfg.sources {
        if let Some(source) = pipeline.source(&sc.id) {
            source.stop_watchdog();
            if !sc.on_demand {
                source.stop();
            }
        }
    }

    Ok(())
}
