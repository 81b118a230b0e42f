//! Green-screen replacement backed by a second source.

use std::sync::Arc;

use super::Filter;
use crate::color::rgb_to_hls;
use crate::component::Startable;
use crate::frame::Encoding;
use crate::source::Source;

/// Replaces green pixels with the current frame of a background source.
/// The background source is a started user for as long as the filter lives.
pub struct ChromaKey {
    background: Arc<Source>,
    hue_min: f64,
    hue_max: f64,
    min_lightness: f64,
}

impl ChromaKey {
    pub fn new(background: Arc<Source>) -> Self {
        Self::with_key(background, 90.0, 150.0, 0.2)
    }

    pub fn with_key(background: Arc<Source>, hue_min: f64, hue_max: f64, min_lightness: f64) -> Self {
        background.start();
        Self {
            background,
            hue_min,
            hue_max,
            min_lightness,
        }
    }
}

impl Drop for ChromaKey {
    fn drop(&mut self) {
        self.background.stop();
    }
}

impl Filter for ChromaKey {
    fn apply(&self, _src: Option<&Source>, _ts: u64, w: u32, h: u32, _prev: Option<&[u8]>, work: &mut [u8]) {
        let Some(bg) = self.background.acquire(true, 0) else {
            return;
        };

        let bg = if (bg.width(), bg.height()) != (w, h) {
            match bg.resized(w, h, false) {
                Ok(f) => f,
                Err(e) => {
                    log::debug!("chroma key background unusable: {e:#}");
                    return;
                }
            }
        } else {
            bg
        };

        let bg_rgb = bg.data(Encoding::Rgb24);
        if bg_rgb.len() != work.len() {
            return;
        }

        key_pixels(work, &bg_rgb, self.hue_min, self.hue_max, self.min_lightness);
    }
}

fn key_pixels(work: &mut [u8], bg: &[u8], hue_min: f64, hue_max: f64, min_lightness: f64) {
    for (px, bg_px) in work.chunks_exact_mut(3).zip(bg.chunks_exact(3)) {
        let (hue, lightness, _) = rgb_to_hls(px[0], px[1], px[2]);
        if hue >= hue_min && hue < hue_max && lightness >= min_lightness {
            px.copy_from_slice(bg_px);
        }
    }
}
