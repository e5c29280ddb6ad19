use super::stream::AudioStream;
use crate::error::{ConfigError, StreamError};

/// Samples consumed per video frame: `round(sample_rate / fps)`.
pub fn samples_per_frame(sample_rate: u32, fps: u32) -> Result<usize, ConfigError> {
    if fps == 0 {
        return Err(ConfigError::FrameRate);
    }
    let n = (sample_rate as f64 / fps as f64).round() as usize;
    if n == 0 {
        return Err(ConfigError::EmptyWindow { sample_rate, fps });
    }
    Ok(n)
}

/// Number of frames the audio should produce: `ceil(duration * fps)`.
pub fn expected_frames(duration_secs: f64, fps: u32) -> usize {
    (duration_secs.max(0.0) * fps as f64).ceil() as usize
}

/// One frame's worth of samples. `read` counts the samples that came from the
/// stream; everything after it is silence.
#[derive(Clone, Debug)]
pub struct FrameWindow {
    pub samples: Vec<f32>,
    pub read: usize,
}

impl FrameWindow {
    pub fn is_empty(&self) -> bool {
        self.read == 0
    }

    /// The samples actually read from the stream.
    pub fn filled(&self) -> &[f32] {
        &self.samples[..self.read]
    }
}

/// Pulls consecutive fixed-size windows off an audio stream.
pub struct WindowExtractor {
    samples_per_frame: usize,
}

impl WindowExtractor {
    pub fn new(samples_per_frame: usize) -> Self {
        Self { samples_per_frame }
    }

    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    /// Fill the next window. Keeps reading until the window is full or the
    /// stream reports end of data, so a short window only happens at the tail.
    pub fn extract(&self, stream: &mut dyn AudioStream) -> Result<FrameWindow, StreamError> {
        let mut samples = vec![0.0f32; self.samples_per_frame];
        let mut read = 0;
        while read < samples.len() {
            let n = stream.read(&mut samples[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Ok(FrameWindow { samples, read })
    }
}
