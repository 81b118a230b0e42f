//! Frame transformation filters.
//!
//! Filters rework RGB24 pixel data between acquisition and delivery:
//! - text overlay (timestamps, source labels)
//! - mirroring (horizontal, vertical)
//! - grayscale reduction
//! - temporal averaging
//! - motion highlighting against the previous frame
//! - chroma keying against a second source
//!
//! A filter either works in place on one buffer or reads an input buffer
//! and writes a separate output. [`apply_filters`] runs a chain with at
//! most one scratch allocation no matter how many filters take the
//! input/output form.

mod average;
mod chromakey;
mod grayscale;
mod marker;
mod mirror;
mod text;

pub use average::Average;
pub use chromakey::ChromaKey;
pub use grayscale::{Grayscale, GrayscaleMode};
pub use marker::MotionMarker;
pub use mirror::{MirrorH, MirrorV};
pub use text::{AddText, TextPosition};

pub(crate) use text::format_time;

use crate::source::Source;

/// A pixel transformation step.
///
/// Implement either [`Filter::apply`] (in place) or [`Filter::apply_io`]
/// (separate input and output) and report which one via
/// [`Filter::uses_in_out`].
pub trait Filter: Send + Sync {
    /// True when the filter needs distinct input and output buffers.
    fn uses_in_out(&self) -> bool {
        false
    }

    /// In-place form. `prev` is the previous delivered frame for this
    /// reader, when one exists.
    fn apply(&self, _src: Option<&Source>, _ts: u64, _w: u32, _h: u32, _prev: Option<&[u8]>, _work: &mut [u8]) {}

    /// Input/output form. The default copies input through unchanged.
    fn apply_io(
        &self,
        _src: Option<&Source>,
        _ts: u64,
        _w: u32,
        _h: u32,
        _prev: Option<&[u8]>,
        input: &[u8],
        output: &mut [u8],
    ) {
        output.copy_from_slice(input);
    }
}

/// Run a filter chain over `work`.
///
/// In-place filters run directly on the live buffer. Input/output filters
/// bounce between `work` and a single lazily allocated scratch buffer; the
/// result is copied back into `work` when it ends up in the scratch side.
pub fn apply_filters(
    src: Option<&Source>,
    filters: &[Box<dyn Filter>],
    prev: Option<&[u8]>,
    work: &mut [u8],
    ts: u64,
    w: u32,
    h: u32,
) {
    let mut scratch: Option<Vec<u8>> = None;
    let mut live_in_scratch = false;

    for f in filters {
        if f.uses_in_out() {
            let temp = scratch.get_or_insert_with(|| vec![0u8; work.len()]);
            if live_in_scratch {
                f.apply_io(src, ts, w, h, prev, temp, work);
            } else {
                f.apply_io(src, ts, w, h, prev, work, temp);
            }
            live_in_scratch = !live_in_scratch;
        } else {
            let live: &mut [u8] = match scratch.as_deref_mut() {
                Some(s) if live_in_scratch => s,
                _ => work,
            };
            f.apply(src, ts, w, h, prev, live);
        }
    }

    if live_in_scratch {
        if let Some(s) = scratch {
            work.copy_from_slice(&s);
        }
    }
}
