//! [`LedOutput`] adapter for `smart-leds` drivers.

use smart_leds::SmartLedsWrite;

use crate::{LedOutput, Rgb};

/// Buffers up to `N` pixels and writes them to a `smart-leds` driver on flush
pub struct StripOutput<D, const N: usize> {
    driver: D,
    pixels: [Rgb; N],
    len: usize,
    write_errors: u32,
}

impl<D, const N: usize> StripOutput<D, N> {
    /// Create a strip of `len` pixels (at most `N`)
    pub fn new(driver: D, len: usize) -> Self {
        Self {
            driver,
            pixels: [Rgb::default(); N],
            len: len.min(N),
            write_errors: 0,
        }
    }

    /// Pixels as they will be written on the next flush
    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels[..self.len]
    }

    /// Number of failed driver writes
    pub const fn write_errors(&self) -> u32 {
        self.write_errors
    }

    pub const fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}

impl<D, const N: usize> LedOutput for StripOutput<D, N>
where
    D: SmartLedsWrite,
    Rgb: Into<D::Color>,
{
    fn pixel_count(&self) -> usize {
        self.len
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(pixel) = self.pixels[..self.len].get_mut(index) {
            *pixel = color;
        }
    }

    fn flush(&mut self) {
        let frame = self.pixels[..self.len].iter().copied();
        if self.driver.write(frame).is_err() {
            self.write_errors = self.write_errors.wrapping_add(1);
        }
    }
}
