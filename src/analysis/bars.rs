use rustfft::num_complex::Complex;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::render::canvas::Rgba;

/// Bottom of the displayed decibel range; 0 dB is the top.
pub const DB_FLOOR: f64 = -100.0;
/// Added to the scaled magnitude so silence stays finite in dB.
pub const EPSILON: f64 = 1e-9;
/// Visual gain applied to the normalized height before clamping to the canvas.
pub const HEIGHT_BOOST: f64 = 1.2;
pub const BAR_BLUE: u8 = 50;

/// How each bar draws its value from the spectrum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BinSelection {
    /// Read the single bin at `bar * stride`.
    #[default]
    Sample,
    /// Mean magnitude over `[bar * stride, (bar + 1) * stride)`.
    Average,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bar {
    pub bin_index: usize,
    /// Height in [0, 1] before the visual boost.
    pub normalized: f64,
    /// Height in pixels, within [0, canvas height].
    pub pixel_height: u32,
    pub color: Rgba,
}

/// `20 * log10(magnitude / fft_size + EPSILON)`.
pub fn magnitude_to_db(magnitude: f64, fft_size: usize) -> f64 {
    20.0 * (magnitude / fft_size as f64 + EPSILON).log10()
}

/// Map [DB_FLOOR, 0] dB onto [0, 1], saturating outside.
pub fn normalize_db(db: f64) -> f64 {
    if db.is_nan() {
        return 0.0;
    }
    ((db - DB_FLOOR) / -DB_FLOOR).clamp(0.0, 1.0)
}

pub fn pixel_height(normalized: f64, canvas_height: u32) -> u32 {
    let h = (normalized * canvas_height as f64 * HEIGHT_BOOST).round();
    h.clamp(0.0, canvas_height as f64) as u32
}

/// Green when quiet, red when loud. Depends on `normalized` only.
pub fn bar_color(normalized: f64) -> Rgba {
    let red = (normalized.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba::opaque(red, 255 - red, BAR_BLUE)
}

/// Converts one transformed spectrum into a fixed number of bars.
#[derive(Clone, Debug)]
pub struct BarMapper {
    fft_size: usize,
    bar_count: usize,
    stride: usize,
    canvas_height: u32,
    selection: BinSelection,
}

impl BarMapper {
    pub fn new(
        fft_size: usize,
        bar_count: usize,
        canvas_height: u32,
        selection: BinSelection,
    ) -> Result<Self, ConfigError> {
        if bar_count == 0 {
            return Err(ConfigError::BarCount);
        }
        let half = fft_size / 2;
        if bar_count > half {
            return Err(ConfigError::TooManyBars { bars: bar_count, half });
        }
        Ok(Self {
            fft_size,
            bar_count,
            stride: half / bar_count,
            canvas_height,
            selection,
        })
    }

    pub fn bin_index(&self, bar: usize) -> usize {
        bar * self.stride
    }

    pub fn map(&self, spectrum: &[Complex<f32>]) -> Vec<Bar> {
        (0..self.bar_count)
            .map(|i| {
                let bin_index = self.bin_index(i);
                let magnitude = match self.selection {
                    BinSelection::Sample => spectrum[bin_index].norm() as f64,
                    BinSelection::Average => {
                        let bins = &spectrum[bin_index..bin_index + self.stride];
                        bins.iter().map(|c| c.norm() as f64).sum::<f64>() / bins.len() as f64
                    }
                };
                self.bar(bin_index, magnitude)
            })
            .collect()
    }

    fn bar(&self, bin_index: usize, magnitude: f64) -> Bar {
        let normalized = normalize_db(magnitude_to_db(magnitude, self.fft_size));
        Bar {
            bin_index,
            normalized,
            pixel_height: pixel_height(normalized, self.canvas_height),
            color: bar_color(normalized),
        }
    }
}
