//! RTSP capture backend.
//!
//! Runs a GStreamer pipeline (rtspsrc into decodebin into videoconvert)
//! and pulls RGB samples from an appsink. The pipeline is torn down and
//! rebuilt from scratch after any bus error, EOS or prolonged stall.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use gstreamer::prelude::*;

use crate::component::WorkerContext;
use crate::now_us;
use crate::source::SourceInner;

/// Delay before rebuilding a failed pipeline.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Each pull waits this long before rechecking stop/pause and the bus.
const PULL_TIMEOUT_MS: u64 = 500;

/// Consecutive empty pulls before the stream counts as stalled.
const MAX_EMPTY_PULLS: u32 = 10;

pub(crate) fn run(ctx: WorkerContext, inner: Arc<SourceInner>, url: String) {
    if let Err(e) = gstreamer::init() {
        ctx.set_error(&format!("gstreamer unavailable: {e}"), true);
        log::error!("[{}] gstreamer init failed: {e}", ctx.id());
        return;
    }

    while !ctx.stopping() {
        ctx.pause_checkpoint();
        if ctx.stopping() {
            break;
        }

        match stream(&ctx, &inner, &url) {
            Ok(()) => ctx.clear_error(),
            Err(e) => {
                ctx.set_error(&format!("{e:#}"), false);
                log::warn!("[{}] {e:#}", ctx.id());
                ctx.sleep(RECONNECT_DELAY);
            }
        }
    }
}

/// One pipeline lifetime. Returns cleanly on stop or pause; the pipeline
/// always ends up in the Null state.
fn stream(ctx: &WorkerContext, inner: &SourceInner, url: &str) -> Result<()> {
    let (pipeline, appsink) = build_pipeline(url)?;

    pipeline
        .set_state(gstreamer::State::Playing)
        .context("start rtsp pipeline")?;
    log::info!("[{}] rtsp pipeline playing for {url}", ctx.id());

    let result = pump(ctx, inner, &pipeline, &appsink);
    let _ = pipeline.set_state(gstreamer::State::Null);
    result
}

fn build_pipeline(url: &str) -> Result<(gstreamer::Pipeline, gstreamer_app::AppSink)> {
    let description = format!(
        "rtspsrc location={url} latency=200 ! decodebin ! videoconvert ! \
         video/x-raw,format=RGB ! appsink name=sink sync=false max-buffers=1 drop=true"
    );

    let pipeline = gstreamer::parse::launch(&description)
        .context("build rtsp pipeline")?
        .downcast::<gstreamer::Pipeline>()
        .map_err(|_| anyhow!("rtsp pipeline is not a Pipeline"))?;

    let appsink = pipeline
        .by_name("sink")
        .context("appsink element missing from pipeline")?
        .downcast::<gstreamer_app::AppSink>()
        .map_err(|_| anyhow!("appsink element has unexpected type"))?;

    let caps = gstreamer::Caps::builder("video/x-raw")
        .field("format", "RGB")
        .build();
    appsink.set_caps(Some(&caps));
    appsink.set_max_buffers(1);
    appsink.set_drop(true);
    appsink.set_sync(false);

    Ok((pipeline, appsink))
}

fn pump(
    ctx: &WorkerContext,
    inner: &SourceInner,
    pipeline: &gstreamer::Pipeline,
    appsink: &gstreamer_app::AppSink,
) -> Result<()> {
    let mut empty_pulls: u32 = 0;

    while !ctx.stopping() && !ctx.is_paused() {
        check_bus(pipeline)?;

        let sample = appsink.try_pull_sample(gstreamer::ClockTime::from_mseconds(PULL_TIMEOUT_MS));
        let Some(sample) = sample else {
            empty_pulls += 1;
            if empty_pulls >= MAX_EMPTY_PULLS {
                bail!("rtsp stream stalled");
            }
            continue;
        };
        empty_pulls = 0;

        let (rgb, w, h) = sample_to_rgb(&sample)?;
        ctx.stats().track_bw(rgb.len());
        inner.publish_scaled(now_us(), w, h, rgb);
        ctx.stats().track_cpu_usage();
    }
    Ok(())
}

fn check_bus(pipeline: &gstreamer::Pipeline) -> Result<()> {
    let Some(bus) = pipeline.bus() else {
        return Ok(());
    };

    while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
        use gstreamer::MessageView;
        match message.view() {
            MessageView::Error(err) => bail!(
                "gstreamer error from {:?}: {}",
                err.src().map(|s| s.path_string()),
                err.error()
            ),
            MessageView::Eos(..) => bail!("rtsp stream ended"),
            _ => {}
        }
    }
    Ok(())
}

/// Extract tightly packed RGB pixels from a sample, collapsing row padding
/// when the stride is wider than the image.
fn sample_to_rgb(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("rtsp sample missing buffer")?;
    let caps = sample.caps().context("rtsp sample missing caps")?;
    let info = gstreamer_video::VideoInfo::from_caps(caps).context("parse rtsp caps")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = width as usize * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map rtsp buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(data.get(start..end).context("rtsp buffer row out of bounds")?);
    }
    Ok((pixels, width, height))
}
