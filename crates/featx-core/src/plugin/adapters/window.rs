//! Analysis window shapes

use std::f32::consts::PI;

use crate::transform::WindowType;

/// Precomputed (periodic) window of a fixed size
#[derive(Debug, Clone)]
pub struct Window {
    kind: WindowType,
    coefficients: Vec<f32>,
}

impl Window {
    pub fn new(kind: WindowType, size: usize) -> Self {
        let n = size as f32;
        let cosine_sum = |a: &[f32], i: usize| -> f32 {
            let x = 2.0 * PI * i as f32 / n;
            a.iter()
                .enumerate()
                .map(|(k, c)| {
                    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                    sign * c * (k as f32 * x).cos()
                })
                .sum()
        };
        let coefficients = (0..size)
            .map(|i| match kind {
                WindowType::Rectangular => 1.0,
                WindowType::Triangular => {
                    let half = n / 2.0;
                    1.0 - ((i as f32 - half) / half).abs()
                }
                WindowType::Hamming => cosine_sum(&[0.54, 0.46], i),
                WindowType::Hann => cosine_sum(&[0.5, 0.5], i),
                WindowType::Blackman => cosine_sum(&[0.42, 0.5, 0.08], i),
                WindowType::Nuttall => {
                    cosine_sum(&[0.3635819, 0.4891775, 0.1365995, 0.0106411], i)
                }
                WindowType::BlackmanHarris => {
                    cosine_sum(&[0.35875, 0.48829, 0.14128, 0.01168], i)
                }
            })
            .collect();
        Self { kind, coefficients }
    }

    pub fn kind(&self) -> WindowType {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.coefficients.len()
    }

    /// Multiply `block` in place by the window
    pub fn cut(&self, block: &mut [f32]) {
        for (s, w) in block.iter_mut().zip(&self.coefficients) {
            *s *= w;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_shape() {
        let w = Window::new(WindowType::Hann, 8);
        let mut block = vec![1.0f32; 8];
        w.cut(&mut block);
        assert!(block[0].abs() < 1e-6);
        assert!((block[4] - 1.0).abs() < 1e-6);
        assert!((block[2] - block[6]).abs() < 1e-6);
    }

    #[test]
    fn test_rectangular_is_identity() {
        let w = Window::new(WindowType::Rectangular, 4);
        let mut block = vec![0.25, -0.5, 0.75, 1.0];
        w.cut(&mut block);
        assert_eq!(block, vec![0.25, -0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_triangular_peak() {
        let w = Window::new(WindowType::Triangular, 4);
        let mut block = vec![1.0f32; 4];
        w.cut(&mut block);
        assert_eq!(block, vec![0.0, 0.5, 1.0, 0.5]);
    }
}
