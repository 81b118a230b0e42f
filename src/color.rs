//! RGB/HLS conversions.
//!
//! Used by the software picture controls, the chroma-key filter and the
//! failure test card. Note the asymmetry, kept from the formulas these
//! were ported against: `rgb_to_hls` reports hue in degrees (0..360),
//! `hls_to_rgb` takes hue as a fraction (0..1).

/// RGB bytes to (hue in degrees, lightness 0..1, saturation 0..1).
pub fn rgb_to_hls(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = f64::from(r) / 255.0;
    let g = f64::from(g) / 255.0;
    let b = f64::from(b) / 255.0;

    let cmin = r.min(g).min(b);
    let cmax = r.max(g).max(b);
    let delta = cmax - cmin;

    let mut h = if delta == 0.0 {
        0.0
    } else if cmax == r {
        ((g - b) / delta) % 6.0
    } else if cmax == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };

    h *= 60.0;
    if h < 0.0 {
        h += 360.0;
    }

    let l = (cmax + cmin) / 2.0;
    let s = if delta == 0.0 {
        0.0
    } else {
        delta / (1.0 - (2.0 * l - 1.0).abs())
    };

    (h, l, s)
}

/// (hue 0..1, lightness 0..1, saturation 0..1) to RGB fractions 0..1.
pub fn hls_to_rgb(h: f64, l: f64, s: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (l, l, l);
    }

    let m2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let m1 = 2.0 * l - m2;

    (
        hue_to_rgb(m1, m2, h + 1.0 / 3.0),
        hue_to_rgb(m1, m2, h),
        hue_to_rgb(m1, m2, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(m1: f64, m2: f64, h: f64) -> f64 {
    let mut h = h;
    while h < 0.0 {
        h += 1.0;
    }
    while h > 1.0 {
        h -= 1.0;
    }

    if 6.0 * h < 1.0 {
        m1 + (m2 - m1) * h * 6.0
    } else if 2.0 * h < 1.0 {
        m2
    } else if 3.0 * h < 2.0 {
        m1 + (m2 - m1) * (2.0 / 3.0 - h) * 6.0
    } else {
        m1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn primaries_have_expected_hues() {
        let (h, l, s) = rgb_to_hls(255, 0, 0);
        assert!(close(h, 0.0));
        assert!(close(l, 0.5));
        assert!(close(s, 1.0));

        let (h, _, _) = rgb_to_hls(0, 255, 0);
        assert!(close(h, 120.0));

        let (h, _, _) = rgb_to_hls(0, 0, 255);
        assert!(close(h, 240.0));
    }

    #[test]
    fn gray_has_no_hue_or_saturation() {
        let (h, l, s) = rgb_to_hls(128, 128, 128);
        assert!(close(h, 0.0));
        assert!(close(s, 0.0));
        assert!((l - 0.502).abs() < 0.01);
    }

    #[test]
    fn hls_to_rgb_reproduces_primaries() {
        // hue here is a fraction: green sits at 1/3
        let (r, g, b) = hls_to_rgb(1.0 / 3.0, 0.5, 1.0);
        assert!(close(r, 0.0));
        assert!(close(g, 1.0));
        assert!(close(b, 0.0));
    }

    #[test]
    fn round_trip_through_both_units() {
        for (r, g, b) in [(200u8, 40u8, 90u8), (10, 200, 150), (66, 66, 200)] {
            let (h, l, s) = rgb_to_hls(r, g, b);
            let (r2, g2, b2) = hls_to_rgb(h / 360.0, l, s);
            assert!((f64::from(r) / 255.0 - r2).abs() < 0.01);
            assert!((f64::from(g) / 255.0 - g2).abs() < 0.01);
            assert!((f64::from(b) / 255.0 - b2).abs() < 0.01);
        }
    }

    #[test]
    fn green_screen_hues_land_in_key_range() {
        // the chroma-key filter keys on hue in [90, 150)
        let (h, l, _) = rgb_to_hls(30, 220, 60);
        assert!((90.0..150.0).contains(&h));
        assert!(l >= 0.2);
    }
}
