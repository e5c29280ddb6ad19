use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::analysis::bars::{BarMapper, BinSelection};
use crate::analysis::spectrum::{SpectralTransformer, WindowFunction};
use crate::audio::stream::AudioStream;
use crate::audio::window::{expected_frames, samples_per_frame, FrameWindow, WindowExtractor};
use crate::encode::sink::FrameSink;
use crate::error::{ConfigError, PipelineError};
use crate::render::canvas::{Frame, Rasterizer};

/// Everything fixed for the duration of a render.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fft_size: usize,
    pub fps: u32,
    pub bar_count: usize,
    pub window: WindowFunction,
    pub bin_selection: BinSelection,
    /// Frames read ahead and rendered in parallel. 1 renders strictly one at a time.
    pub batch_size: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fft_size: 1024,
            fps: 30,
            bar_count: 64,
            window: WindowFunction::Rectangular,
            bin_selection: BinSelection::Sample,
            batch_size: rayon::current_num_threads(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_rendered: usize,
    /// `ceil(duration * fps)`, when the stream knows its duration.
    pub total_frames: Option<usize>,
    /// The stream ran dry before `total_frames` was reached.
    pub ended_early: bool,
}

/// Sequences window extraction, transform, bar mapping and rasterization over
/// a whole stream, handing frames to a sink in index order.
pub struct Pipeline {
    settings: RenderSettings,
    transformer: SpectralTransformer,
    mapper: BarMapper,
    rasterizer: Rasterizer,
}

impl Pipeline {
    pub fn new(settings: RenderSettings) -> Result<Self, PipelineError> {
        let frame_bytes = (settings.width as usize)
            .checked_mul(settings.height as usize)
            .and_then(|n| n.checked_mul(4))
            .filter(|&n| n <= isize::MAX as usize);
        if settings.width == 0 || settings.height == 0 || frame_bytes.is_none() {
            return Err(ConfigError::Dimensions {
                width: settings.width,
                height: settings.height,
            }
            .into());
        }
        if settings.fps == 0 {
            return Err(ConfigError::FrameRate.into());
        }
        if settings.batch_size == 0 {
            return Err(ConfigError::BatchSize.into());
        }
        let transformer = SpectralTransformer::new(settings.fft_size, settings.window)?;
        let mapper = BarMapper::new(
            settings.fft_size,
            settings.bar_count,
            settings.height,
            settings.bin_selection,
        )?;
        let rasterizer = Rasterizer::new(settings.width, settings.height);
        Ok(Self {
            settings,
            transformer,
            mapper,
            rasterizer,
        })
    }

    /// Transform, map and rasterize one window. Pure: same input, same pixels.
    pub fn render_window(&self, index: usize, window: &FrameWindow) -> Frame {
        let spectrum = self.transformer.transform(window.filled());
        let bars = self.mapper.map(&spectrum);
        if log::log_enabled!(log::Level::Trace) {
            if let Some(peak) = bars.iter().max_by(|a, b| a.normalized.total_cmp(&b.normalized)) {
                log::trace!(
                    "Frame {}: loudest bar at bin {} ({:.2})",
                    index, peak.bin_index, peak.normalized
                );
            }
        }
        self.rasterizer.rasterize(index, &bars)
    }

    /// Render the whole stream into `sink`. On success the sink is finished;
    /// on any error or cancellation it is aborted so no partial sequence survives.
    pub fn run(
        &self,
        stream: &mut dyn AudioStream,
        mut sink: Box<dyn FrameSink>,
        progress: &mut dyn FnMut(usize, Option<usize>),
        cancel: &AtomicBool,
    ) -> Result<RunSummary, PipelineError> {
        match self.emit_all(stream, sink.as_mut(), progress, cancel) {
            Ok(summary) => {
                sink.finish().map_err(|source| PipelineError::Finalize {
                    frames: summary.frames_rendered,
                    source,
                })?;
                Ok(summary)
            }
            Err(e) => {
                log::error!("Aborting render: {}", e);
                sink.abort();
                Err(e)
            }
        }
    }

    fn emit_all(
        &self,
        stream: &mut dyn AudioStream,
        sink: &mut dyn FrameSink,
        progress: &mut dyn FnMut(usize, Option<usize>),
        cancel: &AtomicBool,
    ) -> Result<RunSummary, PipelineError> {
        let extractor = WindowExtractor::new(samples_per_frame(stream.sample_rate(), self.settings.fps)?);
        let total = stream
            .duration_secs()
            .map(|secs| expected_frames(secs, self.settings.fps));
        let limit = total.unwrap_or(usize::MAX);

        match total {
            Some(n) => log::info!(
                "Rendering {} frames ({} samples per frame)",
                n,
                extractor.samples_per_frame()
            ),
            None => log::info!(
                "Rendering until end of audio ({} samples per frame)",
                extractor.samples_per_frame()
            ),
        }

        let mut next = 0;
        let mut exhausted = false;
        while next < limit && !exhausted {
            if cancel.load(Ordering::SeqCst) {
                return Err(PipelineError::Cancelled { frame: next });
            }

            // Reads stay sequential; only the pure stages fan out.
            let batch_end = limit.min(next.saturating_add(self.settings.batch_size));
            let mut windows = Vec::new();
            for frame in next..batch_end {
                let window = extractor
                    .extract(stream)
                    .map_err(|source| PipelineError::StreamRead { frame, source })?;
                if window.is_empty() {
                    exhausted = true;
                    break;
                }
                windows.push(window);
            }

            let frames: Vec<Frame> = windows
                .par_iter()
                .enumerate()
                .map(|(k, window)| self.render_window(next + k, window))
                .collect();

            for frame in &frames {
                sink.write(frame).map_err(|source| PipelineError::SinkWrite {
                    frame: frame.index(),
                    source,
                })?;
                progress(frame.index() + 1, total);
            }
            log::debug!("Emitted frames {}..{}", next, next + frames.len());
            next += frames.len();
        }

        let ended_early = total.is_some_and(|t| next < t);
        if ended_early {
            log::warn!(
                "Audio ended after {} of {} expected frames",
                next,
                limit
            );
        }

        Ok(RunSummary {
            frames_rendered: next,
            total_frames: total,
            ended_early,
        })
    }
}
