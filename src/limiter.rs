//! Adaptive brightness limiter
//!
//! Bounds the current a strip can draw. Frames with only a handful of lit
//! pixels are shown at full brightness, fully lit frames are capped at
//! `min_scale` (about 40% by default) and the scale falls linearly between
//! the two.
//!
//! A scale of 255 leaves the frame untouched, so limiting twice at 255 is a
//! no-op. Every other scale truncates and repeated application keeps dimming.

use crate::ddp::BYTES_PER_PIXEL;

/// Default lit pixel count up to which frames are not dimmed
pub const DEFAULT_THRESHOLD: u16 = 4;
pub const DEFAULT_MAX_SCALE: u8 = 255;
/// About 40%
pub const DEFAULT_MIN_SCALE: u8 = 102;

/// Configuration for the brightness limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Lit pixel count up to which `max_scale` is used
    pub threshold: u16,
    /// Scale for sparse frames (0-255 = 0.0-1.0)
    pub max_scale: u8,
    /// Scale once every pixel of the strip is lit
    pub min_scale: u8,
}

impl LimiterConfig {
    pub const DEFAULT: Self = Self {
        threshold: DEFAULT_THRESHOLD,
        max_scale: DEFAULT_MAX_SCALE,
        min_scale: DEFAULT_MIN_SCALE,
    };
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Scales RGB payloads by a factor derived from how many pixels are lit
#[derive(Debug, Clone, Copy)]
pub struct BrightnessLimiter {
    threshold: usize,
    max_scale: u8,
    min_scale: u8,
}

impl BrightnessLimiter {
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            threshold: usize::from(config.threshold),
            max_scale: config.max_scale,
            min_scale: config.min_scale,
        }
    }

    /// Count pixels with any non-zero channel
    pub fn count_lit(pixels: &[u8]) -> usize {
        pixels
            .chunks_exact(BYTES_PER_PIXEL)
            .filter(|pixel| pixel[0] | pixel[1] | pixel[2] != 0)
            .count()
    }

    /// Scale for `lit` lit pixels on a strip of `total_leds`
    #[allow(clippy::cast_possible_truncation)]
    pub fn scale_for(&self, lit: usize, total_leds: usize) -> u8 {
        if lit <= self.threshold {
            return self.max_scale;
        }
        if lit >= total_leds {
            return self.min_scale;
        }

        // threshold < lit < total_leds, so range > diff > 0
        let range = total_leds - self.threshold;
        let diff = lit - self.threshold;
        let scale_diff = usize::from(self.max_scale.saturating_sub(self.min_scale));

        (usize::from(self.max_scale) - diff * scale_diff / range) as u8
    }

    /// Dim the RGB triplets in `pixels` in place and return the scale used.
    ///
    /// `total_leds` is the pixel count of the strip the data is written to.
    /// A trailing partial triplet is neither counted nor scaled.
    pub fn limit(&self, pixels: &mut [u8], total_leds: usize) -> u8 {
        let lit = Self::count_lit(pixels);
        let scale = self.scale_for(lit, total_leds);
        if scale == u8::MAX {
            return scale;
        }

        let whole = pixels.len() / BYTES_PER_PIXEL * BYTES_PER_PIXEL;
        for channel in &mut pixels[..whole] {
            *channel = scale_channel(*channel, scale);
        }

        scale
    }
}

impl Default for BrightnessLimiter {
    fn default() -> Self {
        Self::new(&LimiterConfig::DEFAULT)
    }
}

/// `value * scale / 256`
#[inline]
#[allow(clippy::cast_lossless, clippy::cast_possible_truncation)]
const fn scale_channel(value: u8, scale: u8) -> u8 {
    ((value as u16 * scale as u16) >> 8) as u8
}
