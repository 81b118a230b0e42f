//! Multi-encoding frame container.
//!
//! A [`Frame`] is one captured picture that can be held in several encodings
//! at once. Responsibilities:
//! - store the encodings a producer supplied,
//! - transcode lazily on request and cache the result,
//! - survive broken input: a failed decode yields a mid-gray picture
//!   instead of an error, with a single warning per frame,
//! - hand out deep copies only, so readers never share mutable pixels.
//!
//! RGB24 is the canonical interchange encoding. Every conversion first
//! obtains RGB24 and derives the target from it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, ExtendedColorType, ImageFormat, RgbImage};

use crate::component::FrameTransform;
use crate::pixel;
use crate::scale;

/// Pixel formats a frame can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Encoding {
    Rgb24,
    Bgr24,
    Yuyv422,
    Jpeg,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::Rgb24 => "RGB24",
            Encoding::Bgr24 => "BGR24",
            Encoding::Yuyv422 => "YUYV422",
            Encoding::Jpeg => "JPEG",
        };
        f.write_str(name)
    }
}

impl Encoding {
    /// Exact byte length of a raw plane, `None` for compressed encodings.
    fn raw_len(self, w: u32, h: u32) -> Option<Result<usize>> {
        match self {
            Encoding::Rgb24 | Encoding::Bgr24 => Some(pixel::rgb_len(w, h)),
            Encoding::Yuyv422 => Some(pixel::yuyv_len(w, h)),
            Encoding::Jpeg => None,
        }
    }
}

pub struct Frame {
    ts: u64,
    width: u32,
    height: u32,
    jpeg_quality: u8,
    planes: Mutex<BTreeMap<Encoding, Vec<u8>>>,
    decode_warned: AtomicBool,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("ts", &self.ts)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encodings", &self.encodings())
            .finish()
    }
}

impl Frame {
    pub fn new(ts: u64, width: u32, height: u32, jpeg_quality: u8, encoding: Encoding, data: Vec<u8>) -> Frame {
        if let Some(Ok(expected)) = encoding.raw_len(width, height) {
            if data.len() != expected {
                log::warn!(
                    "{} plane is {} bytes, {}x{} needs {}",
                    encoding,
                    data.len(),
                    width,
                    height,
                    expected
                );
            }
        }

        let mut planes = BTreeMap::new();
        planes.insert(encoding, data);

        Frame {
            ts,
            width,
            height,
            jpeg_quality,
            planes: Mutex::new(planes),
            decode_warned: AtomicBool::new(false),
        }
    }

    pub fn ts(&self) -> u64 {
        self.ts
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Encodings currently materialized, cached conversions included.
    pub fn encodings(&self) -> Vec<Encoding> {
        self.lock_planes().keys().copied().collect()
    }

    pub fn has(&self, encoding: Encoding) -> bool {
        self.lock_planes().contains_key(&encoding)
    }

    /// Attach an already-encoded plane. A plane that is present stays as it
    /// is; feeding the same encoding twice is a caller bug.
    pub fn put_data(&self, encoding: Encoding, data: Vec<u8>) {
        let mut planes = self.lock_planes();
        if planes.contains_key(&encoding) {
            debug_assert!(false, "{encoding} plane added twice");
            log::warn!("ignoring duplicate {encoding} plane");
            return;
        }
        planes.insert(encoding, data);
    }

    /// Bytes of the frame in `encoding`, converting and caching on first
    /// request. Never fails: when no stored plane can be decoded the result
    /// is a mid-gray picture and a warning is logged once per frame.
    pub fn data(&self, encoding: Encoding) -> Vec<u8> {
        let mut planes = self.lock_planes();
        if let Some(d) = planes.get(&encoding) {
            return d.clone();
        }

        let rgb = self.canonical_rgb(&mut planes);
        if encoding == Encoding::Rgb24 {
            return rgb;
        }

        let converted = match self.from_rgb(encoding, &rgb) {
            Ok(d) => d,
            Err(e) => {
                self.note_decode_failure(&format!("{encoding} conversion failed: {e:#}"));
                self.fallback_plane(encoding)
            }
        };
        planes.insert(encoding, converted.clone());
        converted
    }

    /// Deep copy. With `only` set, the copy carries exactly that encoding
    /// (converted first if needed); otherwise all materialized planes.
    pub fn duplicate(&self, only: Option<Encoding>) -> Frame {
        let planes = match only {
            Some(e) => {
                let mut m = BTreeMap::new();
                m.insert(e, self.data(e));
                m
            }
            None => self.lock_planes().clone(),
        };

        Frame {
            ts: self.ts,
            width: self.width,
            height: self.height,
            jpeg_quality: self.jpeg_quality,
            planes: Mutex::new(planes),
            decode_warned: AtomicBool::new(self.decode_warned.load(Ordering::Relaxed)),
        }
    }

    /// Drop every cached plane except `encoding`, converting first so the
    /// frame never ends up empty.
    pub fn keep_only(&self, encoding: Encoding) {
        let data = self.data(encoding);
        let mut planes = self.lock_planes();
        planes.clear();
        planes.insert(encoding, data);
    }

    /// New frame scaled to `tw` x `th`, RGB24 only.
    pub fn resized(&self, tw: u32, th: u32, keep_aspect: bool) -> Result<Frame> {
        let rgb = self.data(Encoding::Rgb24);
        let scaled = if keep_aspect {
            scale::resize_rgb_keep_aspect(&rgb, self.width, self.height, tw, th)
        } else {
            scale::resize_rgb(&rgb, self.width, self.height, tw, th)
        }
        .with_context(|| format!("cannot scale {}x{} to {tw}x{th}", self.width, self.height))?;

        Ok(Frame::new(self.ts, tw, th, self.jpeg_quality, Encoding::Rgb24, scaled))
    }

    /// New frame rotated by `quarter_turns` * 90 degrees clockwise.
    pub fn rotated(&self, quarter_turns: u32) -> Frame {
        let turns = quarter_turns % 4;
        if turns == 0 {
            return self.duplicate(Some(Encoding::Rgb24));
        }

        let rgb = self.data(Encoding::Rgb24);
        let Some(img) = RgbImage::from_raw(self.width, self.height, rgb) else {
            log::error!("rotation skipped, pixel buffer does not match {}x{}", self.width, self.height);
            return self.duplicate(Some(Encoding::Rgb24));
        };

        let (rotated, w, h) = match turns {
            1 => (imageops::rotate90(&img), self.height, self.width),
            2 => (imageops::rotate180(&img), self.width, self.height),
            _ => (imageops::rotate270(&img), self.height, self.width),
        };

        Frame::new(self.ts, w, h, self.jpeg_quality, Encoding::Rgb24, rotated.into_raw())
    }

    // ------------------------------------------------------------------
    // conversion internals
    // ------------------------------------------------------------------

    /// RGB24 plane, decoding from whatever is stored and caching the result.
    fn canonical_rgb(&self, planes: &mut MutexGuard<'_, BTreeMap<Encoding, Vec<u8>>>) -> Vec<u8> {
        if let Some(d) = planes.get(&Encoding::Rgb24) {
            return d.clone();
        }

        let decoded = self
            .decode_to_rgb(planes)
            .unwrap_or_else(|e| {
                self.note_decode_failure(&format!("{e:#}"));
                pixel::gray_field(self.width, self.height)
            });
        planes.insert(Encoding::Rgb24, decoded.clone());
        decoded
    }

    fn decode_to_rgb(&self, planes: &MutexGuard<'_, BTreeMap<Encoding, Vec<u8>>>) -> Result<Vec<u8>> {
        if let Some(bgr) = planes.get(&Encoding::Bgr24) {
            return pixel::swap_rb(bgr, self.width, self.height);
        }
        if let Some(yuyv) = planes.get(&Encoding::Yuyv422) {
            return pixel::yuyv_to_rgb(yuyv, self.width, self.height);
        }
        if let Some(jpeg) = planes.get(&Encoding::Jpeg) {
            return self.decode_jpeg(jpeg);
        }
        Err(anyhow!("frame holds no decodable plane"))
    }

    fn decode_jpeg(&self, jpeg: &[u8]) -> Result<Vec<u8>> {
        let img = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
            .context("jpeg decode failed")?
            .into_rgb8();

        if img.dimensions() != (self.width, self.height) {
            log::debug!(
                "jpeg decoded as {}x{}, frame declared {}x{}",
                img.width(),
                img.height(),
                self.width,
                self.height
            );
            return scale::resize_rgb(img.as_raw(), img.width(), img.height(), self.width, self.height);
        }
        Ok(img.into_raw())
    }

    fn from_rgb(&self, target: Encoding, rgb: &[u8]) -> Result<Vec<u8>> {
        match target {
            Encoding::Rgb24 => Ok(rgb.to_vec()),
            Encoding::Bgr24 => pixel::swap_rb(rgb, self.width, self.height),
            Encoding::Yuyv422 => pixel::rgb_to_yuyv(rgb, self.width, self.height),
            Encoding::Jpeg => {
                let mut out = Vec::new();
                let mut enc = JpegEncoder::new_with_quality(&mut out, self.jpeg_quality);
                enc.encode(rgb, self.width, self.height, ExtendedColorType::Rgb8)
                    .context("jpeg encode failed")?;
                Ok(out)
            }
        }
    }

    /// Substitute plane for a failed conversion: mid-gray pixels, or a
    /// mid-gray picture compressed to JPEG.
    fn fallback_plane(&self, encoding: Encoding) -> Vec<u8> {
        match encoding {
            Encoding::Rgb24 | Encoding::Bgr24 => pixel::gray_field(self.width, self.height),
            Encoding::Yuyv422 => {
                // byte-identical to rgb_to_yuyv applied to the gray field
                let mut out = vec![0x80; (self.width as usize) * (self.height as usize) * 2];
                for y in out.iter_mut().step_by(2) {
                    *y = 126;
                }
                out
            }
            Encoding::Jpeg => {
                let gray = pixel::gray_field(self.width, self.height);
                let mut out = Vec::new();
                let mut enc = JpegEncoder::new_with_quality(&mut out, self.jpeg_quality);
                if let Err(e) = enc.encode(&gray, self.width, self.height, ExtendedColorType::Rgb8) {
                    log::error!("substitute jpeg encode failed: {e}");
                    out.clear();
                }
                out
            }
        }
    }

    fn note_decode_failure(&self, what: &str) {
        if !self.decode_warned.swap(true, Ordering::Relaxed) {
            log::warn!("substituting gray frame: {what}");
        } else {
            log::debug!("substituting gray frame: {what}");
        }
    }

    fn lock_planes(&self) -> MutexGuard<'_, BTreeMap<Encoding, Vec<u8>>> {
        match self.planes.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ----------------------------------------------------------------------------
// frame-to-frame views
// ----------------------------------------------------------------------------

/// Scales every frame to a fixed output size. A frame that cannot be
/// scaled passes through as a plain copy.
pub struct ResizeView {
    width: u32,
    height: u32,
    keep_aspect: bool,
}

impl ResizeView {
    pub fn new(width: u32, height: u32, keep_aspect: bool) -> Self {
        Self {
            width,
            height,
            keep_aspect,
        }
    }
}

impl FrameTransform for ResizeView {
    fn transform(&self, frame: &Frame) -> Frame {
        match frame.resized(self.width, self.height, self.keep_aspect) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("resize view: {e:#}");
                frame.duplicate(None)
            }
        }
    }
}

/// Rotates every frame clockwise by a fixed number of quarter turns.
pub struct RotateView {
    quarter_turns: u32,
}

impl RotateView {
    pub fn new(quarter_turns: u32) -> Self {
        Self { quarter_turns }
    }
}

impl FrameTransform for RotateView {
    fn transform(&self, frame: &Frame) -> Frame {
        frame.rotated(self.quarter_turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_frame(w: u32, h: u32) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for i in 0..(w * h) {
            data.extend_from_slice(&[(i % 251) as u8, 10, 200]);
        }
        Frame::new(1000, w, h, 85, Encoding::Rgb24, data)
    }

    #[test]
    fn jpeg_conversion_is_cached() {
        let f = rgb_frame(16, 8);
        assert!(!f.has(Encoding::Jpeg));

        let first = f.data(Encoding::Jpeg);
        assert!(!first.is_empty());
        assert!(f.has(Encoding::Jpeg));

        let second = f.data(Encoding::Jpeg);
        assert_eq!(first, second);
    }

    #[test]
    fn bgr_swaps_channels() {
        let f = Frame::new(1, 1, 1, 85, Encoding::Rgb24, vec![1, 2, 3]);
        assert_eq!(f.data(Encoding::Bgr24), vec![3, 2, 1]);
    }

    #[test]
    fn bgr_source_decodes_to_rgb() {
        let f = Frame::new(1, 2, 1, 85, Encoding::Bgr24, vec![3, 2, 1, 30, 20, 10]);
        assert_eq!(f.data(Encoding::Rgb24), vec![1, 2, 3, 10, 20, 30]);
    }

    #[test]
    fn jpeg_round_trip_stays_close() {
        let f = rgb_frame(32, 16);
        let jpeg = f.data(Encoding::Jpeg);

        let back = Frame::new(2000, 32, 16, 85, Encoding::Jpeg, jpeg);
        let rgb = back.data(Encoding::Rgb24);
        assert_eq!(rgb.len(), 32 * 16 * 3);

        let orig = f.data(Encoding::Rgb24);
        let worst = orig
            .iter()
            .zip(rgb.iter())
            .map(|(a, b)| (*a as i16 - *b as i16).abs())
            .max()
            .unwrap();
        // chroma subsampling smears the sharp ramp wrap-around; drift near
        // 50 per channel is normal at quality 85
        assert!(worst <= 64, "jpeg drifted by {worst}");
    }

    #[test]
    fn broken_jpeg_yields_gray() {
        let f = Frame::new(1000, 4, 2, 85, Encoding::Jpeg, vec![0xde, 0xad, 0xbe, 0xef]);
        let rgb = f.data(Encoding::Rgb24);
        assert_eq!(rgb, vec![0x80; 4 * 2 * 3]);
        // the substitute is cached like any decoded plane
        assert!(f.has(Encoding::Rgb24));
    }

    #[test]
    fn empty_yuyv_request_defaults_gray() {
        let f = Frame::new(1000, 4, 2, 85, Encoding::Jpeg, vec![]);
        let yuyv = f.data(Encoding::Yuyv422);
        assert_eq!(yuyv.len(), 4 * 2 * 2);
        // mid-gray packed 4:2:2: luma 126, neutral chroma
        for quad in yuyv.chunks_exact(4) {
            assert_eq!(quad, [126, 128, 126, 128]);
        }
    }

    #[test]
    fn odd_width_yuyv_substitute_matches_gray() {
        // width 3 cannot be packed 4:2:2, so the conversion itself fails
        // and the substitute plane is served directly; it must carry the
        // same bytes as the converted gray field
        let f = Frame::new(1000, 3, 2, 85, Encoding::Jpeg, vec![]);
        let yuyv = f.data(Encoding::Yuyv422);
        assert_eq!(yuyv.len(), 3 * 2 * 2);
        for pair in yuyv.chunks_exact(2) {
            assert_eq!(pair, [126, 128]);
        }
    }

    #[test]
    fn duplicate_is_independent() {
        let f = rgb_frame(8, 8);
        let d = f.duplicate(None);
        assert_eq!(d.ts(), f.ts());
        assert_eq!(d.data(Encoding::Rgb24), f.data(Encoding::Rgb24));

        d.put_data(Encoding::Jpeg, vec![1, 2, 3]);
        assert!(d.has(Encoding::Jpeg));
        assert!(!f.has(Encoding::Jpeg));
    }

    #[test]
    fn duplicate_single_encoding_converts_first() {
        let f = rgb_frame(8, 4);
        let d = f.duplicate(Some(Encoding::Yuyv422));
        assert_eq!(d.encodings(), vec![Encoding::Yuyv422]);
        assert_eq!(d.data(Encoding::Yuyv422).len(), 8 * 4 * 2);
    }

    #[test]
    fn keep_only_retains_one_plane() {
        let f = rgb_frame(8, 4);
        f.data(Encoding::Jpeg);
        f.data(Encoding::Bgr24);
        assert_eq!(f.encodings().len(), 3);

        f.keep_only(Encoding::Jpeg);
        assert_eq!(f.encodings(), vec![Encoding::Jpeg]);

        // rgb is rebuilt from the kept jpeg
        assert_eq!(f.data(Encoding::Rgb24).len(), 8 * 4 * 3);
    }

    #[test]
    fn duplicate_plane_is_ignored() {
        let f = Frame::new(1, 1, 1, 85, Encoding::Rgb24, vec![1, 2, 3]);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            f.put_data(Encoding::Rgb24, vec![9, 9, 9]);
        }));
        // debug builds assert, release builds keep the original plane
        if result.is_ok() {
            assert_eq!(f.data(Encoding::Rgb24), vec![1, 2, 3]);
        }
    }

    #[test]
    fn resized_has_target_dimensions() {
        let f = rgb_frame(16, 8);
        let r = f.resized(8, 4, false).unwrap();
        assert_eq!((r.width(), r.height()), (8, 4));
        assert_eq!(r.ts(), 1000);
        assert_eq!(r.data(Encoding::Rgb24).len(), 8 * 4 * 3);
    }

    #[test]
    fn rotated_quarter_turn_swaps_dimensions() {
        let f = Frame::new(
            5,
            2,
            1,
            85,
            Encoding::Rgb24,
            vec![255, 0, 0, 0, 255, 0],
        );
        let r = f.rotated(1);
        assert_eq!((r.width(), r.height()), (1, 2));

        // clockwise: the left pixel of the row ends up on top
        let rgb = r.data(Encoding::Rgb24);
        assert_eq!(&rgb[0..3], &[255, 0, 0]);
        assert_eq!(&rgb[3..6], &[0, 255, 0]);
    }

    #[test]
    fn rotation_zero_is_plain_copy() {
        let f = rgb_frame(4, 2);
        let r = f.rotated(4);
        assert_eq!((r.width(), r.height()), (4, 2));
        assert_eq!(r.data(Encoding::Rgb24), f.data(Encoding::Rgb24));
    }

    #[test]
    fn resize_view_scales_through_the_transform_seam() {
        let view: Box<dyn FrameTransform> = Box::new(ResizeView::new(8, 4, false));
        let out = view.transform(&rgb_frame(16, 8));
        assert_eq!((out.width(), out.height()), (8, 4));
        assert_eq!(out.ts(), 1000);
    }

    #[test]
    fn rotate_view_turns_through_the_transform_seam() {
        let view: Box<dyn FrameTransform> = Box::new(RotateView::new(1));
        let out = view.transform(&rgb_frame(16, 8));
        assert_eq!((out.width(), out.height()), (8, 16));
    }
}
