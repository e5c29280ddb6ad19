mod analysis;
mod audio;
mod cli;
mod config;
mod encode;
mod error;
mod pipeline;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use audio::decode::SymphoniaStream;
use audio::stream::AudioStream;
use audio::window::expected_frames;
use cli::{Cli, SinkKind};
use encode::ffmpeg::{EncodeSettings, FfmpegEncoder};
use encode::png::{MuxTarget, PngSequence};
use encode::sink::FrameSink;
use pipeline::{Pipeline, RenderSettings};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();
    apply_config(&mut cli);

    let input = cli.input.clone();
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    log::info!("barscope - spectrum bar video renderer");
    log::info!("Input: {}", input.display());
    log::info!("Output: {}", cli.output.display());
    log::info!(
        "Resolution: {}x{} @ {}fps, {} bars, FFT {}",
        cli.width, cli.height, cli.fps, cli.bars, cli.fft_size
    );

    let settings = RenderSettings {
        width: cli.width,
        height: cli.height,
        fft_size: cli.fft_size,
        fps: cli.fps,
        bar_count: cli.bars,
        window: cli.window,
        bin_selection: cli.bin_selection,
        batch_size: cli.batch_size.unwrap_or_else(rayon::current_num_threads),
    };
    // Validate before touching the audio or spawning ffmpeg.
    let pipeline = Pipeline::new(settings).context("Invalid render settings")?;

    let mut stream = SymphoniaStream::open(&input)?;
    let total_frames = stream
        .duration_secs()
        .map(|secs| expected_frames(secs, cli.fps));

    let encode_settings = EncodeSettings {
        codec: cli.codec.clone(),
        pix_fmt: cli.pix_fmt.clone(),
        crf: cli.crf,
        bitrate: cli.bitrate.clone(),
        audio_codec: cli.audio_codec.clone(),
    };
    let sink = open_sink(&cli, &encode_settings, total_frames.unwrap_or(0))?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            log::warn!("Interrupted, stopping after the current batch");
            cancel.store(true, Ordering::SeqCst);
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let pb = match total_frames {
        Some(n) => ProgressBar::new(n as u64),
        None => ProgressBar::no_length(),
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let result = pipeline.run(
        &mut stream,
        sink,
        &mut |done, _total| pb.set_position(done as u64),
        &cancel,
    );

    match result {
        Ok(summary) => {
            pb.finish_with_message("Rendering complete");
            if let (true, Some(expected)) = (summary.ended_early, summary.total_frames) {
                log::warn!(
                    "Rendered {} of {} frames; audio was shorter than its reported length",
                    summary.frames_rendered,
                    expected
                );
            }
            log::info!("Done! {} frames, output: {}", summary.frames_rendered, cli.output.display());
            Ok(())
        }
        Err(e) => {
            pb.abandon();
            Err(e).context("Render failed")
        }
    }
}

/// Merge an explicit or discovered config file into the CLI. File values
/// apply only where the CLI is still at its default.
fn apply_config(cli: &mut Cli) {
    let Some(path) = cli.config.clone().or_else(config::find_config) else {
        return;
    };
    let cfg = match config::load_config(&path) {
        Ok(cfg) => cfg,
        Err(err) => {
            log::warn!("Ignoring config {}: {:#}", path.display(), err);
            return;
        }
    };
    log::info!("Loaded config from {}", path.display());

    if cli.width == 1280 { cli.width = cfg.output.width; }
    if cli.height == 720 { cli.height = cfg.output.height; }
    if cli.fps == 30 { cli.fps = cfg.output.fps; }
    if cli.fft_size == 1024 { cli.fft_size = cfg.analysis.fft_size; }
    if cli.bars == 64 { cli.bars = cfg.analysis.bars; }
    if cli.window == Default::default() { cli.window = cfg.analysis.window; }
    if cli.bin_selection == Default::default() { cli.bin_selection = cfg.analysis.bin_selection; }
    if cli.batch_size.is_none() { cli.batch_size = cfg.analysis.batch_size; }
    if cli.frames_dir.is_none() { cli.frames_dir = cfg.output.frames_dir; }
    if !cli.keep_frames { cli.keep_frames = cfg.output.keep_frames; }
    if cli.crf == 18 { cli.crf = cfg.encode.crf; }
    if cli.bitrate.is_none() { cli.bitrate = cfg.encode.bitrate; }
    if cli.codec == "libx264" { cli.codec = cfg.encode.codec; }
    if cli.pix_fmt == "yuv420p" { cli.pix_fmt = cfg.encode.pix_fmt; }
    if cli.audio_codec == "flac" { cli.audio_codec = cfg.encode.audio_codec; }
}

fn open_sink(cli: &Cli, encode: &EncodeSettings, total_frames: usize) -> Result<Box<dyn FrameSink>> {
    match cli.sink {
        SinkKind::Ffmpeg => {
            log::info!("Starting FFmpeg encoder...");
            let encoder = FfmpegEncoder::new(
                &cli.output,
                &cli.input,
                cli.width,
                cli.height,
                cli.fps,
                encode,
            )?;
            Ok(Box::new(encoder))
        }
        SinkKind::Png => {
            let dir = cli.frames_dir.clone().unwrap_or_else(|| {
                let mut dir = cli.output.clone().into_os_string();
                dir.push(".frames");
                dir.into()
            });
            let mux = (!cli.no_mux).then(|| MuxTarget {
                audio: cli.input.clone(),
                output: cli.output.clone(),
                fps: cli.fps,
                settings: encode.clone(),
            });
            // Frames are the deliverable when nothing merges them.
            let keep = cli.keep_frames || mux.is_none();
            Ok(Box::new(PngSequence::new(&dir, total_frames, keep, mux)?))
        }
    }
}
