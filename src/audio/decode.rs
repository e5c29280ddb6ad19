use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::stream::AudioStream;
use crate::error::StreamError;

/// Decodes an audio file packet by packet as samples are requested,
/// downmixing every packet to mono.
pub struct SymphoniaStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    duration: Option<f64>,
    pending: Vec<f32>,
    pending_pos: usize,
    finished: bool,
}

impl SymphoniaStream {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .context("Failed to probe audio format")?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .context("No audio tracks found")?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;
        let duration = track
            .codec_params
            .n_frames
            .map(|n| n as f64 / sample_rate as f64);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .context("Failed to create audio decoder")?;

        let channels = track.codec_params.channels.map_or(1, |c| c.count());
        match duration {
            Some(secs) => log::info!("Opened audio: {}Hz, {:.1}s, {} channel(s)", sample_rate, secs, channels),
            None => log::warn!("Opened audio: {}Hz, {} channel(s), unknown length", sample_rate, channels),
        }

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            duration,
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
        })
    }

    /// Decode the next packet of our track into `pending`. Returns false at end of stream.
    fn decode_next(&mut self) -> Result<bool, StreamError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    return Err(StreamError::Unsupported(
                        "stream changed parameters mid-decode".into(),
                    ));
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(msg)) => {
                    log::warn!("Skipping undecodable packet: {}", msg);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count().max(1);
            let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pending_pos = 0;

            // Downmix to mono
            let samples = sample_buf.samples();
            if channels == 1 {
                self.pending.extend_from_slice(samples);
            } else {
                self.pending.extend(
                    samples
                        .chunks(channels)
                        .map(|frame| frame.iter().sum::<f32>() / channels as f32),
                );
            }

            if !self.pending.is_empty() {
                return Ok(true);
            }
        }
    }
}

impl AudioStream for SymphoniaStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn duration_secs(&self) -> Option<f64> {
        self.duration
    }

    fn read(&mut self, buf: &mut [f32]) -> Result<usize, StreamError> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.pending_pos < self.pending.len() {
                let n = (buf.len() - filled).min(self.pending.len() - self.pending_pos);
                buf[filled..filled + n]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
                self.pending_pos += n;
                filled += n;
                continue;
            }
            if self.finished {
                break;
            }
            if !self.decode_next()? {
                self.finished = true;
                log::debug!("Audio stream exhausted");
            }
        }
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8000;
    const FRAMES: usize = 5000;

    fn left(i: usize) -> i16 {
        (i % 1000) as i16 * 8
    }

    fn right(i: usize) -> i16 {
        -((i % 700) as i16) * 16
    }

    /// 16-bit stereo PCM WAV with distinct channels.
    fn write_stereo_wav(path: &Path) {
        let data_len = (FRAMES * 4) as u32;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&RATE.to_le_bytes());
        bytes.extend_from_slice(&(RATE * 4).to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..FRAMES {
            bytes.extend_from_slice(&left(i).to_le_bytes());
            bytes.extend_from_slice(&right(i).to_le_bytes());
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn reads_straddle_packets_and_downmix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_stereo_wav(&path);

        let mut stream = SymphoniaStream::open(&path).unwrap();
        assert_eq!(stream.sample_rate(), RATE);
        let duration = stream.duration_secs().unwrap();
        assert!((duration - FRAMES as f64 / RATE as f64).abs() < 1e-9);

        // 733 lines up with neither packet nor window boundaries.
        let mut samples = Vec::new();
        let mut buf = [0.0f32; 733];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            samples.extend_from_slice(&buf[..n]);
        }
        assert_eq!(samples.len(), FRAMES);

        for (i, &s) in samples.iter().enumerate() {
            let expected = (left(i) as f32 + right(i) as f32) / 2.0 / 32768.0;
            assert!((s - expected).abs() < 1e-5, "sample {}: {} vs {}", i, s, expected);
        }

        // Exhausted streams stay exhausted.
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SymphoniaStream::open(&dir.path().join("absent.wav")).is_err());
    }
}
