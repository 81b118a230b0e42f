//! HTTP JPEG backend.
//!
//! Polls a still-image URL, or follows it as a multipart MJPEG stream when
//! the server answers with one. Compressed bytes go straight into the slot
//! whenever possible; decoding happens only to learn dimensions or to
//! honor a resize target.

use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use crate::component::WorkerContext;
use crate::frame::Encoding;
use crate::now_us;
use crate::source::SourceInner;

/// Images larger than this are considered corrupt.
const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// Reconnect backoff: base, per-failure increment, ceiling.
const BACKOFF_BASE: Duration = Duration::from_millis(101);
const BACKOFF_STEP: Duration = Duration::from_millis(51);
const BACKOFF_MAX: Duration = Duration::from_secs(2);

pub(crate) fn run(ctx: WorkerContext, inner: Arc<SourceInner>, url: String, interval_us: Option<u64>) {
    let interval = interval_us.map(Duration::from_micros).unwrap_or(Duration::ZERO);
    let mut failures: u32 = 0;

    log::info!("[{}] fetching frames from {url}", ctx.id());

    while !ctx.stopping() {
        ctx.pause_checkpoint();
        if ctx.stopping() {
            break;
        }

        match fetch(&ctx, &inner, &url, interval) {
            Ok(()) => {
                failures = 0;
                ctx.clear_error();
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                ctx.set_error(&format!("{e:#}"), false);
                log::warn!("[{}] {e:#}", ctx.id());
                ctx.sleep(backoff(failures));
            }
        }
    }
}

/// One connection attempt. A multipart response is followed until the
/// stream ends or a stop/pause is requested; a still response yields
/// exactly one image.
fn fetch(ctx: &WorkerContext, inner: &SourceInner, url: &str, interval: Duration) -> Result<()> {
    let started = Instant::now();
    let response = ureq::get(url).call().with_context(|| format!("fetch {url}"))?;
    let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();

    if content_type.contains("multipart") {
        return stream_mjpeg(ctx, inner, response.into_reader(), interval);
    }

    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64 + 1)
        .read_to_end(&mut bytes)
        .context("read jpeg body")?;
    if bytes.is_empty() {
        bail!("empty jpeg body");
    }
    if bytes.len() > MAX_JPEG_BYTES {
        bail!("jpeg body exceeds {MAX_JPEG_BYTES} bytes");
    }

    handle_jpeg(ctx, inner, bytes)?;
    ctx.stats().track_cpu_usage();
    ctx.sleep(interval.saturating_sub(started.elapsed()));
    Ok(())
}

fn stream_mjpeg(
    ctx: &WorkerContext,
    inner: &SourceInner,
    mut reader: impl Read,
    interval: Duration,
) -> Result<()> {
    let mut buffer: Vec<u8> = Vec::with_capacity(64 * 1024);
    let mut chunk = vec![0u8; 8192];
    let mut last_published: Option<Instant> = None;

    loop {
        // disconnect on stop or pause; the worker loop reconnects later
        if ctx.stopping() || ctx.is_paused() {
            return Ok(());
        }

        if let Some((start, end)) = find_jpeg_bounds(&buffer) {
            let jpeg = buffer[start..end].to_vec();
            buffer.drain(..end);

            // decimate to the configured rate by skipping early frames
            if last_published.map_or(true, |t| t.elapsed() >= interval) {
                handle_jpeg(ctx, inner, jpeg)?;
                last_published = Some(Instant::now());
                ctx.stats().track_cpu_usage();
            }
            continue;
        }

        let read = reader.read(&mut chunk).context("read mjpeg chunk")?;
        if read == 0 {
            bail!("mjpeg stream ended");
        }
        buffer.extend_from_slice(&chunk[..read]);

        // keep the tail so a marker split across chunks still matches
        if buffer.len() > MAX_JPEG_BYTES * 2 {
            let drain_len = buffer.len() - 2;
            buffer.drain(..drain_len);
        }
    }
}

/// Publish one JPEG image.
fn handle_jpeg(ctx: &WorkerContext, inner: &SourceInner, bytes: Vec<u8>) -> Result<()> {
    ctx.stats().track_bw(bytes.len());

    if inner.resize_configured() {
        let (rgb, w, h) = decode_jpeg(&bytes)?;
        inner.publish_scaled(now_us(), w, h, rgb);
        return Ok(());
    }

    if inner.dimensions().is_none() {
        let (_, w, h) = decode_jpeg(&bytes)?;
        inner.set_size(w, h);
    }
    inner.publish(now_us(), Encoding::Jpeg, bytes);
    Ok(())
}

fn decode_jpeg(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let img = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
        .context("decode jpeg")?
        .into_rgb8();
    let (w, h) = (img.width(), img.height());
    Ok((img.into_raw(), w, h))
}

/// Locate one complete JPEG (SOI through EOI) in the buffer.
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let rel = buffer[start + 2..].windows(2).position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + rel + 2))
}

fn backoff(failures: u32) -> Duration {
    (BACKOFF_BASE + BACKOFF_STEP * failures.saturating_sub(1)).min(BACKOFF_MAX)
}
