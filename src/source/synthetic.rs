//! Synthetic test pattern backend.
//!
//! Generates a drifting gradient with a bright column sweeping left to
//! right, so motion is visible at a glance. Useful for pipelines without
//! hardware and for exercising consumers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::component::WorkerContext;
use crate::now_us;
use crate::source::SourceInner;

/// Dimensions when the settings leave them open.
const FALLBACK_DIMS: (u32, u32) = (320, 240);

/// Frame interval when unthrottled; a generated pattern has no hardware to
/// pace it.
const FALLBACK_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) fn run(ctx: WorkerContext, inner: Arc<SourceInner>, interval_us: Option<u64>) {
    let (w, h) = inner.dimensions().unwrap_or(FALLBACK_DIMS);
    let interval = interval_us.map(Duration::from_micros).unwrap_or(FALLBACK_INTERVAL);

    log::info!("[{}] generating {w}x{h} test pattern every {interval:?}", ctx.id());

    let mut n: u32 = 0;
    while !ctx.stopping() {
        ctx.pause_checkpoint();
        if ctx.stopping() {
            break;
        }

        let started = Instant::now();
        inner.publish_scaled(now_us(), w, h, pattern(w, h, n));
        n = n.wrapping_add(1);

        ctx.stats().track_cpu_usage();
        ctx.sleep(interval.saturating_sub(started.elapsed()));
    }
}

/// Diagonal gradient drifting one pixel per frame, plus a full-height white
/// column at `n % w`.
fn pattern(w: u32, h: u32, n: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(w as usize * h as usize * 3);
    let sweep = n % w.max(1);

    for y in 0..h {
        for x in 0..w {
            if x == sweep {
                rgb.extend_from_slice(&[255, 255, 255]);
            } else {
                let r = (x.wrapping_add(n) % 256) as u8;
                let g = (y.wrapping_add(n) % 256) as u8;
                let b = ((x + y) % 256) as u8;
                rgb.extend_from_slice(&[r, g, b]);
            }
        }
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_has_expected_size() {
        assert_eq!(pattern(320, 240, 0).len(), 320 * 240 * 3);
    }

    #[test]
    fn pattern_moves_between_frames() {
        assert_ne!(pattern(64, 48, 0), pattern(64, 48, 1));
    }

    #[test]
    fn sweep_column_is_white_on_every_row() {
        let rgb = pattern(8, 4, 3);
        for y in 0..4usize {
            let px = (y * 8 + 3) * 3;
            assert_eq!(&rgb[px..px + 3], &[255, 255, 255]);
        }
    }
}
