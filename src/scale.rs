//! RGB24 resizing helpers built on the `image` crate.

use anyhow::{anyhow, Result};
use image::{imageops, imageops::FilterType, RgbImage};

use crate::pixel::rgb_len;

/// Resize an RGB24 buffer to `tw` x `th`, stretching as needed.
pub fn resize_rgb(data: &[u8], w: u32, h: u32, tw: u32, th: u32) -> Result<Vec<u8>> {
    let expected = rgb_len(w, h)?;
    if data.len() != expected {
        return Err(anyhow!(
            "frame is {} bytes, {}x{} needs {}",
            data.len(),
            w,
            h,
            expected
        ));
    }
    rgb_len(tw, th)?;

    if (w, h) == (tw, th) {
        return Ok(data.to_vec());
    }

    let img = RgbImage::from_raw(w, h, data.to_vec())
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", w, h))?;
    let resized = imageops::resize(&img, tw, th, FilterType::Triangle);
    Ok(resized.into_raw())
}

/// Resize preserving aspect ratio, centering the result on a black field of
/// `tw` x `th`.
pub fn resize_rgb_keep_aspect(data: &[u8], w: u32, h: u32, tw: u32, th: u32) -> Result<Vec<u8>> {
    if w == 0 || h == 0 || tw == 0 || th == 0 {
        return Err(anyhow!("dimensions must be non-zero"));
    }

    // largest inner rectangle with the source ratio
    let (iw, ih) = if (tw as u64) * (h as u64) <= (th as u64) * (w as u64) {
        (tw, ((tw as u64 * h as u64) / w as u64).max(1) as u32)
    } else {
        (((th as u64 * w as u64) / h as u64).max(1) as u32, th)
    };

    let inner = resize_rgb(data, w, h, iw, ih)?;
    if (iw, ih) == (tw, th) {
        return Ok(inner);
    }

    let mut field = vec![0u8; rgb_len(tw, th)?];
    let ox = (tw - iw) / 2;
    let oy = (th - ih) / 2;

    for y in 0..ih {
        let src = (y * iw) as usize * 3;
        let dst = ((y + oy) * tw + ox) as usize * 3;
        let n = iw as usize * 3;
        field[dst..dst + n].copy_from_slice(&inner[src..src + n]);
    }

    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, v: u8) -> Vec<u8> {
        vec![v; (w * h * 3) as usize]
    }

    #[test]
    fn resize_changes_dimensions() {
        let out = resize_rgb(&solid(4, 4, 200), 4, 4, 8, 2).unwrap();
        assert_eq!(out.len(), 8 * 2 * 3);
        assert!(out.iter().all(|v| *v == 200));
    }

    #[test]
    fn resize_same_size_is_copy() {
        let src = solid(3, 3, 7);
        let out = resize_rgb(&src, 3, 3, 3, 3).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn resize_rejects_short_buffer() {
        assert!(resize_rgb(&[0u8; 5], 4, 4, 2, 2).is_err());
    }

    #[test]
    fn keep_aspect_letterboxes_wide_target() {
        // square source into a 8x4 target: 4x4 inset centered at x=2
        let out = resize_rgb_keep_aspect(&solid(4, 4, 255), 4, 4, 8, 4).unwrap();
        assert_eq!(out.len(), 8 * 4 * 3);

        let px = |x: u32, y: u32| out[((y * 8 + x) * 3) as usize];
        assert_eq!(px(0, 0), 0);
        assert_eq!(px(7, 3), 0);
        assert_eq!(px(3, 1), 255);
        assert_eq!(px(4, 2), 255);
    }

    #[test]
    fn keep_aspect_pillarboxes_tall_target() {
        let out = resize_rgb_keep_aspect(&solid(4, 2, 255), 4, 2, 4, 8).unwrap();
        let px = |x: u32, y: u32| out[((y * 4 + x) * 3) as usize];
        assert_eq!(px(0, 0), 0);
        assert_eq!(px(1, 4), 255);
    }
}
