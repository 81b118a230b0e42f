//! vigil-snapshot - one-shot frame grab
//!
//! Builds a single source from the configuration, waits for one frame and
//! writes it out as JPEG. Exits nonzero when no frame arrives in time, so
//! the tool doubles as a health probe for scripts and cron jobs.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use vigil_kernel::config::VigilConfig;
use vigil_kernel::{Encoding, FrameTransform, ResizeView, RotateView, Startable};

#[derive(Parser, Debug)]
#[command(name = "vigil-snapshot", version, about = "one-shot frame grab")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Source id to grab from. Defaults to the first configured source.
    #[arg(short, long)]
    source: Option<String>,

    /// Output file, or "-" for stdout.
    #[arg(short, long, default_value = "snapshot.jpg")]
    output: PathBuf,

    /// How long to wait for a frame.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Accept a synthesized failure card instead of exiting nonzero.
    #[arg(long)]
    allow_failure_frame: bool,

    /// Scale the frame to WIDTHxHEIGHT before writing.
    #[arg(long, value_name = "WxH")]
    resize: Option<String>,

    /// Rotate the frame clockwise before writing.
    #[arg(long, value_parser = ["90", "180", "270"])]
    rotate: Option<String>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, env = "VIGIL_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let cfg = VigilConfig::load(args.config.as_deref())?;
    let pipeline = cfg.build()?;

    let source = match &args.source {
        Some(id) => pipeline
            .source(id)
            .with_context(|| format!("no source {id:?} in configuration"))?,
        None => pipeline
            .sources
            .first()
            .context("configuration has no sources")?,
    };

    source.start();
    let frame = source.acquire_within(
        args.allow_failure_frame,
        0,
        Duration::from_millis(args.timeout_ms),
    );
    source.stop();

    let Some(frame) = frame else {
        bail!(
            "no frame from [{}] within {} ms",
            source.id(),
            args.timeout_ms
        );
    };

    let mut views: Vec<Box<dyn FrameTransform>> = Vec::new();
    if let Some(spec) = &args.resize {
        let (w, h) = spec
            .split_once('x')
            .with_context(|| format!("--resize takes WIDTHxHEIGHT, got {spec:?}"))?;
        views.push(Box::new(ResizeView::new(
            w.parse().context("resize width")?,
            h.parse().context("resize height")?,
            false,
        )));
    }
    if let Some(deg) = &args.rotate {
        let turns = match deg.as_str() {
            "90" => 1,
            "180" => 2,
            _ => 3,
        };
        views.push(Box::new(RotateView::new(turns)));
    }
    let frame = views.iter().fold(frame, |f, v| v.transform(&f));

    let jpeg = frame.data(Encoding::Jpeg);
    if jpeg.is_empty() {
        bail!("jpeg encoding produced no data");
    }

    if args.output.as_os_str() == "-" {
        std::io::stdout()
            .write_all(&jpeg)
            .context("write jpeg to stdout")?;
    } else {
        std::fs::write(&args.output, &jpeg)
            .with_context(|| format!("write {}", args.output.display()))?;
        log::info!(
            "wrote {}x{} frame ({} bytes) to {}",
            frame.width(),
            frame.height(),
            jpeg.len(),
            args.output.display()
        );
    }

    Ok(())
}
