//! Motion highlighting against the previously delivered frame.

use super::Filter;
use crate::draw::{draw_horizontal, draw_vertical, Rgb};
use crate::source::Source;

const BLOCK: u32 = 16;
const MARK: Rgb = Rgb::new(255, 0, 0);

/// Outlines 16x16 blocks whose mean per-byte difference from the previous
/// frame exceeds the threshold. Does nothing for the first frame.
pub struct MotionMarker {
    threshold: u8,
}

impl MotionMarker {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }
}

impl Default for MotionMarker {
    fn default() -> Self {
        Self::new(12)
    }
}

impl Filter for MotionMarker {
    fn apply(&self, _src: Option<&Source>, _ts: u64, w: u32, h: u32, prev: Option<&[u8]>, work: &mut [u8]) {
        let Some(prev) = prev else { return };
        if prev.len() != work.len() || work.len() != (w as usize) * (h as usize) * 3 {
            return;
        }

        let mut changed = Vec::new();

        let mut by = 0;
        while by < h {
            let mut bx = 0;
            let bh = BLOCK.min(h - by);
            while bx < w {
                let bw = BLOCK.min(w - bx);

                let mut sum: u64 = 0;
                for y in by..by + bh {
                    let row = (y * w + bx) as usize * 3;
                    let n = bw as usize * 3;
                    for (a, b) in work[row..row + n].iter().zip(&prev[row..row + n]) {
                        sum += (*a as i16 - *b as i16).unsigned_abs() as u64;
                    }
                }

                let mean = sum / (bw as u64 * bh as u64 * 3);
                if mean > self.threshold as u64 {
                    changed.push((bx, by, bw, bh));
                }

                bx += BLOCK;
            }
            by += BLOCK;
        }

        for (bx, by, bw, bh) in changed {
            draw_horizontal(work, w, h, bx, by, bw, MARK);
            draw_horizontal(work, w, h, bx, by + bh - 1, bw, MARK);
            draw_vertical(work, w, h, bx, by, bh, MARK);
            draw_vertical(work, w, h, bx + bw - 1, by, bh, MARK);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(buf: &[u8], w: u32, x: u32, y: u32) -> (u8, u8, u8) {
        let o = ((y * w + x) * 3) as usize;
        (buf[o], buf[o + 1], buf[o + 2])
    }

    #[test]
    fn first_frame_is_untouched() {
        let marker = MotionMarker::default();
        let mut work = vec![0u8; 32 * 32 * 3];
        marker.apply(None, 0, 32, 32, None, &mut work);
        assert!(work.iter().all(|v| *v == 0));
    }

    #[test]
    fn changed_block_is_outlined() {
        let marker = MotionMarker::default();
        let prev = vec![0u8; 32 * 32 * 3];
        let mut work = vec![0u8; 32 * 32 * 3];

        // light up the block at (16, 16)
        for y in 16..32 {
            for x in 16..32u32 {
                let o = ((y * 32 + x) * 3) as usize;
                work[o] = 250;
                work[o + 1] = 250;
                work[o + 2] = 250;
            }
        }

        marker.apply(None, 0, 32, 32, Some(&prev), &mut work);

        assert_eq!(pixel(&work, 32, 16, 16), (255, 0, 0));
        assert_eq!(pixel(&work, 32, 31, 31), (255, 0, 0));
        // quiet block stays black
        assert_eq!(pixel(&work, 32, 0, 0), (0, 0, 0));
        // block interior keeps its pixels
        assert_eq!(pixel(&work, 32, 20, 20), (250, 250, 250));
    }

    #[test]
    fn identical_frames_mark_nothing() {
        let marker = MotionMarker::default();
        let prev = vec![77u8; 32 * 16 * 3];
        let mut work = prev.clone();
        marker.apply(None, 0, 32, 16, Some(&prev), &mut work);
        assert_eq!(work, prev);
    }
}
