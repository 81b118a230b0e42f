//! Temporal averaging over a sliding window of frames.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::Filter;
use crate::source::Source;

/// Replaces each frame with the per-byte mean of the last `depth` frames.
/// Frames pass through unchanged until the window has filled. A dimension
/// change clears the window.
pub struct Average {
    depth: usize,
    history: Mutex<VecDeque<Vec<u8>>>,
}

impl Average {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            history: Mutex::new(VecDeque::new()),
        }
    }
}

impl Filter for Average {
    fn apply(&self, _src: Option<&Source>, _ts: u64, _w: u32, _h: u32, _prev: Option<&[u8]>, work: &mut [u8]) {
        let mut history = match self.history.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        if history.front().is_some_and(|f| f.len() != work.len()) {
            history.clear();
        }

        history.push_back(work.to_vec());
        if history.len() > self.depth {
            history.pop_front();
        }
        if history.len() < self.depth {
            return;
        }

        let n = history.len() as u32;
        for (i, out) in work.iter_mut().enumerate() {
            let sum: u32 = history.iter().map(|f| f[i] as u32).sum();
            *out = (sum / n) as u8;
        }
    }
}
