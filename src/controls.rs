//! Picture controls: brightness, contrast, saturation.
//!
//! Controls sit between acquisition and delivery. A hardware backend can map
//! them onto device registers; [`SoftwareControls`] reworks the pixels
//! instead and is what every backend without native controls gets.
//!
//! Values range over `0..=65535` with 32767 as the neutral midpoint, so a
//! freshly constructed control set changes nothing.

use std::sync::atomic::{AtomicI32, Ordering};

use anyhow::{bail, Result};

use crate::color::{hls_to_rgb, rgb_to_hls};

pub const CONTROL_MIN: i32 = 0;
pub const CONTROL_NEUTRAL: i32 = 32767;
pub const CONTROL_MAX: i32 = 65535;

pub trait Controls: Send + Sync {
    fn has_brightness(&self) -> bool {
        false
    }
    fn get_brightness(&self) -> i32 {
        CONTROL_NEUTRAL
    }
    fn set_brightness(&self, _v: i32) -> Result<()> {
        bail!("brightness is not adjustable on this source")
    }

    fn has_contrast(&self) -> bool {
        false
    }
    fn get_contrast(&self) -> i32 {
        CONTROL_NEUTRAL
    }
    fn set_contrast(&self, _v: i32) -> Result<()> {
        bail!("contrast is not adjustable on this source")
    }

    fn has_saturation(&self) -> bool {
        false
    }
    fn get_saturation(&self) -> i32 {
        CONTROL_NEUTRAL
    }
    fn set_saturation(&self, _v: i32) -> Result<()> {
        bail!("saturation is not adjustable on this source")
    }

    fn reset(&self) -> Result<()> {
        Ok(())
    }

    /// Whether delivery must run [`Controls::apply`] on outgoing pixels.
    /// Hardware-backed controls return false, the device already did the
    /// work.
    fn requires_apply(&self) -> bool {
        false
    }

    /// Rework an RGB24 buffer in place.
    fn apply(&self, _rgb: &mut [u8]) {}
}

// ----------------------------------------------------------------------------
// software implementation
// ----------------------------------------------------------------------------

pub struct SoftwareControls {
    brightness: AtomicI32,
    contrast: AtomicI32,
    saturation: AtomicI32,
}

impl Default for SoftwareControls {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareControls {
    pub fn new() -> Self {
        Self {
            brightness: AtomicI32::new(CONTROL_NEUTRAL),
            contrast: AtomicI32::new(CONTROL_NEUTRAL),
            saturation: AtomicI32::new(CONTROL_NEUTRAL),
        }
    }

    fn check_range(v: i32) -> Result<()> {
        if !(CONTROL_MIN..=CONTROL_MAX).contains(&v) {
            bail!("control value {v} outside {CONTROL_MIN}..={CONTROL_MAX}");
        }
        Ok(())
    }
}

impl Controls for SoftwareControls {
    fn has_brightness(&self) -> bool {
        true
    }
    fn get_brightness(&self) -> i32 {
        self.brightness.load(Ordering::Relaxed)
    }
    fn set_brightness(&self, v: i32) -> Result<()> {
        Self::check_range(v)?;
        self.brightness.store(v, Ordering::Relaxed);
        Ok(())
    }

    fn has_contrast(&self) -> bool {
        true
    }
    fn get_contrast(&self) -> i32 {
        self.contrast.load(Ordering::Relaxed)
    }
    fn set_contrast(&self, v: i32) -> Result<()> {
        Self::check_range(v)?;
        self.contrast.store(v, Ordering::Relaxed);
        Ok(())
    }

    fn has_saturation(&self) -> bool {
        true
    }
    fn get_saturation(&self) -> i32 {
        self.saturation.load(Ordering::Relaxed)
    }
    fn set_saturation(&self, v: i32) -> Result<()> {
        Self::check_range(v)?;
        self.saturation.store(v, Ordering::Relaxed);
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        self.brightness.store(CONTROL_NEUTRAL, Ordering::Relaxed);
        self.contrast.store(CONTROL_NEUTRAL, Ordering::Relaxed);
        self.saturation.store(CONTROL_NEUTRAL, Ordering::Relaxed);
        Ok(())
    }

    fn requires_apply(&self) -> bool {
        self.get_brightness() != CONTROL_NEUTRAL
            || self.get_contrast() != CONTROL_NEUTRAL
            || self.get_saturation() != CONTROL_NEUTRAL
    }

    fn apply(&self, rgb: &mut [u8]) {
        if !self.requires_apply() {
            return;
        }

        let bright = self.get_brightness() as f64 / CONTROL_NEUTRAL as f64;
        let sat = self.get_saturation() as f64 / CONTROL_NEUTRAL as f64;
        let contrast = self.get_contrast() as f64 / CONTROL_NEUTRAL as f64;

        for px in rgb.chunks_exact_mut(3) {
            let (h, l, s) = rgb_to_hls(px[0], px[1], px[2]);

            let l = (l * bright).min(1.0);
            let s = (s * sat).min(1.0);

            let (r, g, b) = hls_to_rgb(h / 360.0, l, s);

            px[0] = channel((r - 0.5) * contrast + 0.5);
            px[1] = channel((g - 0.5) * contrast + 0.5);
            px[2] = channel((b - 0.5) * contrast + 0.5);
        }
    }
}

fn channel(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0) as u8
}
