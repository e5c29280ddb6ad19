use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::TransformError;

/// Analysis window applied before the FFT.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WindowFunction {
    /// No tapering; leaks energy between bins.
    #[default]
    Rectangular,
    Hann,
}

/// Forward FFT of fixed size, planned once and shared between worker threads.
pub struct SpectralTransformer {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
    taper: Option<Vec<f32>>,
}

impl SpectralTransformer {
    pub fn new(size: usize, window: WindowFunction) -> Result<Self, TransformError> {
        if size < 2 || size % 2 != 0 {
            return Err(TransformError::UnsupportedSize(size));
        }
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);
        let taper = match window {
            WindowFunction::Rectangular => None,
            WindowFunction::Hann => Some(hann_window(size)),
        };
        Ok(Self { fft, size, taper })
    }

    /// Zero-pad or truncate `samples` to the transform size and run the
    /// unnormalized forward FFT. Only `[0, size/2)` is meaningful for real input.
    pub fn transform(&self, samples: &[f32]) -> Vec<Complex<f32>> {
        let mut buffer = self.load(samples);
        self.fft.process(&mut buffer);
        buffer
    }

    fn load(&self, samples: &[f32]) -> Vec<Complex<f32>> {
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.size];
        let n = samples.len().min(self.size);
        for (i, (slot, &s)) in buffer.iter_mut().zip(&samples[..n]).enumerate() {
            let w = self.taper.as_ref().map_or(1.0, |t| t[i]);
            *slot = Complex::new(s * w, 0.0);
        }
        buffer
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_odd_and_tiny_sizes() {
        assert_eq!(
            SpectralTransformer::new(0, WindowFunction::Rectangular).err(),
            Some(TransformError::UnsupportedSize(0))
        );
        assert!(SpectralTransformer::new(1, WindowFunction::Rectangular).is_err());
        assert!(SpectralTransformer::new(1023, WindowFunction::Rectangular).is_err());
        assert!(SpectralTransformer::new(1024, WindowFunction::Rectangular).is_ok());
    }

    #[test]
    fn short_input_is_zero_padded() {
        let t = SpectralTransformer::new(16, WindowFunction::Rectangular).unwrap();
        let buffer = t.load(&[1.0, -0.5, 0.25]);
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer[1], Complex::new(-0.5, 0.0));
        assert!(buffer[3..].iter().all(|c| c.re == 0.0 && c.im == 0.0));
    }

    #[test]
    fn long_input_is_truncated() {
        let t = SpectralTransformer::new(8, WindowFunction::Rectangular).unwrap();
        let samples: Vec<f32> = (0..20).map(|i| i as f32).collect();
        let buffer = t.load(&samples);
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer[7].re, 7.0);
    }

    #[test]
    fn dc_input_lands_in_bin_zero_unnormalized() {
        let t = SpectralTransformer::new(64, WindowFunction::Rectangular).unwrap();
        let spectrum = t.transform(&[1.0; 64]);
        assert!((spectrum[0].norm() - 64.0).abs() < 1e-3);
        assert!(spectrum[1..32].iter().all(|c| c.norm() < 1e-3));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let size = 256;
        let t = SpectralTransformer::new(size, WindowFunction::Rectangular).unwrap();
        let samples: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f32::consts::PI * 8.0 * i as f32 / size as f32).sin())
            .collect();
        let spectrum = t.transform(&samples);
        let peak = spectrum[..size / 2]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().partial_cmp(&b.1.norm()).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 8);
        assert!((spectrum[8].norm() - size as f32 / 2.0).abs() < 1e-2);
    }

    #[test]
    fn hann_tapers_edges() {
        let t = SpectralTransformer::new(32, WindowFunction::Hann).unwrap();
        let buffer = t.load(&[1.0; 32]);
        assert!(buffer[0].re.abs() < 1e-6);
        assert!(buffer[31].re.abs() < 1e-6);
        assert!(buffer[16].re > 0.9);
    }
}
