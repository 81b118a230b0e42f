//! V4L2 capture backend.
//!
//! Opens the device, negotiates YUYV (preferred) or MJPG, and pulls frames
//! from a memory-mapped buffer stream. The device handle lives on the
//! worker's stack and is reopened from scratch after any error, so a
//! camera that was unplugged comes back on its own.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;

use crate::component::WorkerContext;
use crate::frame::Encoding;
use crate::now_us;
use crate::pixel;
use crate::source::SourceInner;

/// Delay before reopening a device that failed.
const REOPEN_DELAY: Duration = Duration::from_secs(1);

const BUFFER_COUNT: u32 = 4;

pub(crate) fn run(ctx: WorkerContext, inner: Arc<SourceInner>, device: String) {
    while !ctx.stopping() {
        ctx.pause_checkpoint();
        if ctx.stopping() {
            break;
        }

        match capture(&ctx, &inner, &device) {
            Ok(()) => ctx.clear_error(),
            Err(e) => {
                ctx.set_error(&format!("{e:#}"), false);
                log::warn!("[{}] {e:#}", ctx.id());
                ctx.sleep(REOPEN_DELAY);
            }
        }
    }
}

/// One open-negotiate-stream cycle. Returns cleanly on stop or pause,
/// with an error on any device problem.
fn capture(ctx: &WorkerContext, inner: &SourceInner, path: &str) -> Result<()> {
    let device =
        v4l::Device::with_path(path).with_context(|| format!("open v4l2 device {path}"))?;
    let (format, encoding) = negotiate(&device, inner)?;
    let (w, h) = (format.width, format.height);

    let mut stream = v4l::prelude::MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
        .context("map capture buffers")?;

    log::info!("[{}] capturing {w}x{h} {encoding} from {path}", ctx.id());
    ctx.clear_error();

    while !ctx.stopping() && !ctx.is_paused() {
        let (buf, _meta) = stream.next().context("capture v4l2 frame")?;
        ctx.stats().track_bw(buf.len());
        let ts = now_us();

        if inner.resize_configured() {
            let rgb = match encoding {
                Encoding::Yuyv422 => pixel::yuyv_to_rgb(buf, w, h)?,
                _ => decode_jpeg(buf)?,
            };
            inner.publish_scaled(ts, w, h, rgb);
        } else {
            inner.set_size(w, h);
            inner.publish(ts, encoding, buf.to_vec());
        }

        ctx.stats().track_cpu_usage();
    }
    Ok(())
}

/// Ask for YUYV first, MJPG second, at the configured dimensions when any
/// are set. Drivers are free to answer with a different size; whatever
/// they grant wins.
fn negotiate(device: &v4l::Device, inner: &SourceInner) -> Result<(v4l::Format, Encoding)> {
    let mut format = device.format().context("read device format")?;
    if let Some((w, h)) = inner.dimensions() {
        format.width = w;
        format.height = h;
    }

    for (fourcc, encoding) in [(b"YUYV", Encoding::Yuyv422), (b"MJPG", Encoding::Jpeg)] {
        let wanted = v4l::FourCC::new(fourcc);
        format.fourcc = wanted;
        match device.set_format(&format) {
            Ok(actual) if actual.fourcc == wanted => return Ok((actual, encoding)),
            Ok(_) => continue,
            Err(e) => {
                log::debug!("cannot set {wanted}: {e}");
                continue;
            }
        }
    }
    bail!("device offers neither YUYV nor MJPG")
}

fn decode_jpeg(bytes: &[u8]) -> Result<Vec<u8>> {
    Ok(image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
        .context("decode mjpg frame")?
        .into_rgb8()
        .into_raw())
}
