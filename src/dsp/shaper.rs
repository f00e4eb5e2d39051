//! Waveshaper distortion.

use std::f64::consts::PI;

/// Number of points in a generated distortion curve.
pub const CURVE_LENGTH: usize = 44_100;

/// Build the classic soft-clipping distortion curve. Larger `amount`
/// gives a steeper transfer function.
pub fn distortion_curve(amount: f64) -> Vec<f32> {
    let k = amount;
    let deg = PI / 180.0;
    (0..CURVE_LENGTH)
        .map(|i| {
            let x = (i as f64 * 2.0) / CURVE_LENGTH as f64 - 1.0;
            (((3.0 + k) * x * 20.0 * deg) / (PI + k * x.abs())) as f32
        })
        .collect()
}

/// A memoryless transfer-curve lookup.
#[derive(Debug, Clone)]
pub struct Waveshaper {
    curve: Vec<f32>,
}

impl Waveshaper {
    pub fn new(curve: Vec<f32>) -> Self {
        Waveshaper { curve }
    }

    /// Shaper using [`distortion_curve`].
    pub fn distortion(amount: f64) -> Self {
        Self::new(distortion_curve(amount))
    }

    /// Map one sample through the curve. Input in [-1, 1] spans the whole
    /// curve; values outside clamp to the end points.
    pub fn shape(&self, input: f64) -> f64 {
        let n = self.curve.len();
        match n {
            0 => input,
            1 => self.curve[0] as f64,
            _ => {
                let v = (n - 1) as f64 / 2.0 * (input + 1.0);
                if v <= 0.0 {
                    self.curve[0] as f64
                } else if v >= (n - 1) as f64 {
                    self.curve[n - 1] as f64
                } else {
                    let k = v as usize;
                    let f = v - k as f64;
                    let a = self.curve[k] as f64;
                    let b = self.curve[k + 1] as f64;
                    a + (b - a) * f
                }
            }
        }
    }

    pub fn process_slice(&self, data: &mut [f32]) {
        for s in data.iter_mut() {
            *s = self.shape(*s as f64) as f32;
        }
    }
}
