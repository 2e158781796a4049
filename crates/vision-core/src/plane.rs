//! Grayscale conversion and floating-point image planes.
//!
//! Detection works on `image::GrayImage`; flow works on [`Plane`], a
//! row-major `f32` buffer normalized to `[0, 1]` that supports
//! sub-pixel sampling.

use barpath_common::error::{BarpathError, BarpathResult};
use barpath_motion_model::{FrameDimensions, RgbaFrame};
use image::{GrayImage, RgbaImage};

/// Convert a validated RGBA frame to 8-bit luma.
pub fn to_gray(frame: &RgbaFrame) -> BarpathResult<GrayImage> {
    let rgba = RgbaImage::from_raw(frame.width(), frame.height(), frame.as_bytes().to_vec())
        .ok_or_else(|| BarpathError::invalid_frame("buffer does not match frame dimensions"))?;
    Ok(image::imageops::grayscale(&rgba))
}

pub fn gray_dimensions(gray: &GrayImage) -> FrameDimensions {
    let (width, height) = gray.dimensions();
    FrameDimensions::new(width, height)
}

/// A single-channel `f32` image.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self::new(width, height, vec![value; width * height])
    }

    /// Normalize 8-bit luma to `[0, 1]`.
    pub fn from_gray(gray: &GrayImage) -> Self {
        let (w, h) = gray.dimensions();
        let data = gray.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
        Self::new(w as usize, h as usize, data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at integer coordinates, clamped to the border.
    #[inline]
    pub fn at(&self, x: isize, y: isize) -> f32 {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.width + cx]
    }

    /// Bilinear sample at sub-pixel coordinates, clamped to the border.
    #[inline]
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let x = x.clamp(0.0, (self.width - 1) as f32);
        let y = y.clamp(0.0, (self.height - 1) as f32);
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (xi, yi) = (x0 as isize, y0 as isize);

        let top = self.at(xi, yi) * (1.0 - fx) + self.at(xi + 1, yi) * fx;
        let bottom = self.at(xi, yi + 1) * (1.0 - fx) + self.at(xi + 1, yi + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Central-difference gradients `(Ix, Iy)`.
    pub fn gradients(&self) -> (Plane, Plane) {
        let mut gx = Vec::with_capacity(self.data.len());
        let mut gy = Vec::with_capacity(self.data.len());
        for y in 0..self.height as isize {
            for x in 0..self.width as isize {
                gx.push((self.at(x + 1, y) - self.at(x - 1, y)) * 0.5);
                gy.push((self.at(x, y + 1) - self.at(x, y - 1)) * 0.5);
            }
        }
        (
            Plane::new(self.width, self.height, gx),
            Plane::new(self.width, self.height, gy),
        )
    }

    /// Blur with a 5-tap binomial kernel and drop every other row and column.
    pub fn pyr_down(&self) -> Plane {
        const KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

        let mut horizontal = Vec::with_capacity(self.data.len());
        for y in 0..self.height as isize {
            for x in 0..self.width as isize {
                let v: f32 = KERNEL
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * self.at(x + k as isize - 2, y))
                    .sum();
                horizontal.push(v);
            }
        }
        let horizontal = Plane::new(self.width, self.height, horizontal);

        let out_w = self.width.div_ceil(2);
        let out_h = self.height.div_ceil(2);
        let mut out = Vec::with_capacity(out_w * out_h);
        for oy in 0..out_h {
            for ox in 0..out_w {
                let (x, y) = ((ox * 2) as isize, (oy * 2) as isize);
                let v: f32 = KERNEL
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * horizontal.at(x, y + k as isize - 2))
                    .sum();
                out.push(v);
            }
        }
        Plane::new(out_w, out_h, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize) -> Plane {
        let data = (0..height)
            .flat_map(|_| (0..width).map(|x| x as f32))
            .collect();
        Plane::new(width, height, data)
    }

    #[test]
    fn test_bilinear_sample_on_ramp() {
        let plane = ramp(8, 4);
        assert!((plane.sample(2.5, 1.0) - 2.5).abs() < 1e-6);
        assert!((plane.sample(-3.0, 0.0) - 0.0).abs() < 1e-6);
        assert!((plane.sample(100.0, 2.0) - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_gradients_on_ramp() {
        let (gx, gy) = ramp(8, 4).gradients();
        assert!((gx.at(3, 2) - 1.0).abs() < 1e-6);
        assert!(gy.at(3, 2).abs() < 1e-6);
    }

    #[test]
    fn test_pyr_down_halves_dimensions() {
        let plane = Plane::filled(11, 6, 0.5);
        let down = plane.pyr_down();
        assert_eq!((down.width(), down.height()), (6, 3));
        assert!((down.at(2, 1) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_to_gray_uniform() {
        let frame = RgbaFrame::solid(4, 3, [200, 200, 200, 255]).unwrap();
        let gray = to_gray(&frame).unwrap();
        assert_eq!(gray.dimensions(), (4, 3));
        assert!(gray.pixels().all(|p| p.0[0] == 200));
    }
}
