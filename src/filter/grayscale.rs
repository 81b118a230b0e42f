//! Grayscale reduction with a choice of luminance weightings.

use super::Filter;
use crate::source::Source;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrayscaleMode {
    /// Plain channel average.
    Fast,
    /// CIE 1931 luminance weights.
    Cie1931,
    /// PAL/NTSC luma weights.
    PalNtsc,
    /// Midpoint of the brightest and darkest channel.
    Lightness,
}

impl std::str::FromStr for GrayscaleMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "fast" => GrayscaleMode::Fast,
            "cie1931" | "cie" => GrayscaleMode::Cie1931,
            "pal" | "ntsc" => GrayscaleMode::PalNtsc,
            "lightness" => GrayscaleMode::Lightness,
            other => anyhow::bail!("unknown grayscale mode {other:?}"),
        })
    }
}

pub struct Grayscale {
    mode: GrayscaleMode,
}

impl Grayscale {
    pub fn new(mode: GrayscaleMode) -> Self {
        Self { mode }
    }

    fn level(&self, r: u8, g: u8, b: u8) -> u8 {
        let (r, g, b) = (r as u32, g as u32, b as u32);
        match self.mode {
            GrayscaleMode::Fast => ((r + g + b) / 3) as u8,
            GrayscaleMode::Cie1931 => ((r * 2126 + g * 7152 + b * 722) / 10000) as u8,
            GrayscaleMode::PalNtsc => ((r * 299 + g * 587 + b * 114) / 1000) as u8,
            GrayscaleMode::Lightness => {
                let min = r.min(g).min(b);
                let max = r.max(g).max(b);
                ((min + max) / 2) as u8
            }
        }
    }
}

impl Filter for Grayscale {
    fn uses_in_out(&self) -> bool {
        true
    }

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
        for (o, i) in output.chunks_exact_mut(3).zip(input.chunks_exact(3)) {
            let v = self.level(i[0], i[1], i[2]);
            o[0] = v;
            o[1] = v;
            o[2] = v;
        }
    }
}
