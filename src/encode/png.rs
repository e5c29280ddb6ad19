use image::{ImageBuffer, Rgba as Pixel};
use std::path::{Path, PathBuf};

use super::ffmpeg::{mux_image_sequence, EncodeSettings};
use super::sink::{index_width, FrameOrder, FrameSink};
use crate::error::SinkError;
use crate::render::canvas::Frame;

/// Where a finished image sequence goes.
#[derive(Clone, Debug)]
pub struct MuxTarget {
    pub audio: PathBuf,
    pub output: PathBuf,
    pub fps: u32,
    pub settings: EncodeSettings,
}

/// Writes each frame as `frameNNNNN.png` into a directory, then optionally
/// muxes the sequence with ffmpeg.
pub struct PngSequence {
    dir: PathBuf,
    digits: usize,
    order: FrameOrder,
    created_dir: bool,
    keep_frames: bool,
    mux: Option<MuxTarget>,
}

impl PngSequence {
    pub fn new(
        dir: &Path,
        total_frames: usize,
        keep_frames: bool,
        mux: Option<MuxTarget>,
    ) -> Result<Self, SinkError> {
        let created_dir = !dir.exists();
        std::fs::create_dir_all(dir)?;
        log::info!("Writing frames to {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            digits: index_width(total_frames),
            order: FrameOrder::default(),
            created_dir,
            keep_frames,
            mux,
        })
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("frame{:0width$}.png", index, width = self.digits))
    }

    /// printf-style input pattern matching `frame_path`.
    pub fn pattern(&self) -> PathBuf {
        self.dir.join(format!("frame%0{}d.png", self.digits))
    }

    fn cleanup(&self) {
        let result = if self.created_dir {
            std::fs::remove_dir_all(&self.dir)
        } else {
            (0..self.order.written())
                .try_for_each(|i| std::fs::remove_file(self.frame_path(i)))
        };
        if let Err(e) = result {
            log::warn!("Failed to clean up frames in {}: {}", self.dir.display(), e);
        }
    }
}

impl FrameSink for PngSequence {
    fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        self.order.accept(frame.index())?;
        let image: ImageBuffer<Pixel<u8>, &[u8]> =
            ImageBuffer::from_raw(frame.width(), frame.height(), frame.as_bytes()).ok_or_else(
                || SinkError::Encoder(format!("frame {} has a short pixel buffer", frame.index())),
            )?;
        image.save(self.frame_path(frame.index()))?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), SinkError> {
        log::info!("Wrote {} frames", self.order.written());
        if let Some(ref mux) = self.mux {
            let result = mux_image_sequence(&self.pattern(), &mux.audio, mux.fps, &mux.output, &mux.settings);
            if let Err(e) = result {
                log::warn!("Leaving frames in {} after failed merge", self.dir.display());
                return Err(e);
            }
            log::info!("Final video saved as {}", mux.output.display());
        }
        if !self.keep_frames {
            self.cleanup();
        }
        Ok(())
    }

    fn abort(self: Box<Self>) {
        self.cleanup();
    }
}
