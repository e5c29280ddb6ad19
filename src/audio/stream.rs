use crate::error::StreamError;

/// A sequential source of mono samples. The cursor only moves forward.
pub trait AudioStream {
    fn sample_rate(&self) -> u32;

    /// Total duration in seconds, if the container reports it.
    fn duration_secs(&self) -> Option<f64>;

    /// Read up to `buf.len()` samples. May return fewer than requested;
    /// `Ok(0)` means the stream is exhausted.
    fn read(&mut self, buf: &mut [f32]) -> Result<usize, StreamError>;
}

/// In-memory stream, optionally capping how many samples a single read returns.
#[cfg(test)]
pub struct MemoryStream {
    samples: Vec<f32>,
    sample_rate: u32,
    pos: usize,
    max_read: usize,
    duration: Option<f64>,
}

#[cfg(test)]
impl MemoryStream {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        let samples_len = samples.len();
        Self {
            samples,
            sample_rate,
            pos: 0,
            max_read: usize::MAX,
            duration: Some(samples_len as f64 / sample_rate as f64),
        }
    }

    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = max_read;
        self
    }

    /// Override the reported duration, e.g. to claim more audio than there is.
    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }
}

#[cfg(test)]
impl AudioStream for MemoryStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn duration_secs(&self) -> Option<f64> {
        self.duration
    }

    fn read(&mut self, buf: &mut [f32]) -> Result<usize, StreamError> {
        let n = buf
            .len()
            .min(self.max_read)
            .min(self.samples.len() - self.pos);
        buf[..n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
