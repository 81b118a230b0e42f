//! Pixel-shuffle conversions between the packed encodings.
//!
//! RGB24 is the canonical intermediate: BGR24 and YUYV422 convert to and
//! from it here with integer arithmetic; JPEG goes through the codec in
//! `frame`. All entry points validate buffer lengths against the declared
//! dimensions before touching bytes.

use anyhow::{anyhow, Result};

/// `w * h * 3`, overflow-checked.
pub fn rgb_len(width: u32, height: u32) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(3))
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

/// `w * h * 2`, overflow-checked. YUYV422 stores two pixels in four bytes.
pub fn yuyv_len(width: u32, height: u32) -> Result<usize> {
    if width % 2 != 0 {
        return Err(anyhow!("YUYV422 requires an even width, got {}", width));
    }
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(2))
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

/// Swap the R and B channels. Works both directions.
pub fn swap_rb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = rgb_len(width, height)?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut out = pixels.to_vec();
    for px in out.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
    Ok(out)
}

/// Packed YUYV422 (Y0 U Y1 V) to RGB24 using the integer BT.601 constants.
pub fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = yuyv_len(width, height)?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "YUYV frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = Vec::with_capacity(rgb_len(width, height)?);

    for quad in pixels.chunks_exact(4) {
        let y0 = i32::from(quad[0]);
        let u = i32::from(quad[1]);
        let y1 = i32::from(quad[2]);
        let v = i32::from(quad[3]);

        let d = u - 128;
        let e = v - 128;

        for y in [y0, y1] {
            let c = y - 16;
            rgb.push(((298 * c + 409 * e + 128) >> 8).clamp(0, 255) as u8);
            rgb.push(((298 * c - 100 * d - 208 * e + 128) >> 8).clamp(0, 255) as u8);
            rgb.push(((298 * c + 516 * d + 128) >> 8).clamp(0, 255) as u8);
        }
    }

    Ok(rgb)
}

/// RGB24 to packed YUYV422. Chroma is averaged over each horizontal pixel
/// pair, the usual 4:2:2 subsampling.
pub fn rgb_to_yuyv(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = rgb_len(width, height)?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "RGB frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }
    if width % 2 != 0 {
        return Err(anyhow!("YUYV422 requires an even width, got {}", width));
    }

    let mut out = Vec::with_capacity(yuyv_len(width, height)?);

    for pair in pixels.chunks_exact(6) {
        let (r0, g0, b0) = (i32::from(pair[0]), i32::from(pair[1]), i32::from(pair[2]));
        let (r1, g1, b1) = (i32::from(pair[3]), i32::from(pair[4]), i32::from(pair[5]));

        let y0 = ((66 * r0 + 129 * g0 + 25 * b0 + 128) >> 8) + 16;
        let y1 = ((66 * r1 + 129 * g1 + 25 * b1 + 128) >> 8) + 16;

        let ra = (r0 + r1) / 2;
        let ga = (g0 + g1) / 2;
        let ba = (b0 + b1) / 2;
        let u = ((-38 * ra - 74 * ga + 112 * ba + 128) >> 8) + 128;
        let v = ((112 * ra - 94 * ga - 18 * ba + 128) >> 8) + 128;

        out.push(y0.clamp(0, 255) as u8);
        out.push(u.clamp(0, 255) as u8);
        out.push(y1.clamp(0, 255) as u8);
        out.push(v.clamp(0, 255) as u8);
    }

    Ok(out)
}

/// A flat mid-gray RGB24 field, the substitute content when a codec fails.
pub fn gray_field(width: u32, height: u32) -> Vec<u8> {
    let len = rgb_len(width, height).unwrap_or(0);
    vec![0x80; len]
}
