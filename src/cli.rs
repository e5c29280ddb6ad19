use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::analysis::bars::BinSelection;
use crate::analysis::spectrum::WindowFunction;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    /// Pipe raw frames straight into ffmpeg
    Ffmpeg,
    /// Write a PNG per frame, then merge with ffmpeg
    Png,
}

#[derive(Parser, Debug)]
#[command(name = "barscope", about = "Render an audio file as a spectrum-bar video")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Output video file
    #[arg(short, long, default_value = "VisualizerWithAudio.mp4")]
    pub output: PathBuf,

    /// Config file (TOML, or JSON with a .json extension)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Video width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// FFT length in samples (even)
    #[arg(long, default_value_t = 1024)]
    pub fft_size: usize,

    /// Number of spectrum bars (at most fft-size / 2)
    #[arg(long, default_value_t = 64)]
    pub bars: usize,

    /// Analysis window applied before the FFT
    #[arg(long, value_enum, default_value_t = WindowFunction::Rectangular)]
    pub window: WindowFunction,

    /// How each bar reads the spectrum
    #[arg(long, value_enum, default_value_t = BinSelection::Sample)]
    pub bin_selection: BinSelection,

    /// Frames rendered in parallel per batch (defaults to the thread count)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Where frames go
    #[arg(long, value_enum, default_value_t = SinkKind::Ffmpeg)]
    pub sink: SinkKind,

    /// Directory for PNG frames (png sink only)
    #[arg(long)]
    pub frames_dir: Option<PathBuf>,

    /// Keep PNG frames after merging
    #[arg(long)]
    pub keep_frames: bool,

    /// Write PNG frames only, skip the ffmpeg merge
    #[arg(long)]
    pub no_mux: bool,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// FFmpeg audio codec
    #[arg(long, default_value = "flac")]
    pub audio_codec: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_render() {
        let cli = Cli::parse_from(["barscope", "song.flac"]);
        assert_eq!(cli.input, PathBuf::from("song.flac"));
        assert_eq!((cli.width, cli.height, cli.fps), (1280, 720, 30));
        assert_eq!((cli.fft_size, cli.bars), (1024, 64));
        assert_eq!(cli.window, WindowFunction::Rectangular);
        assert_eq!(cli.bin_selection, BinSelection::Sample);
        assert_eq!(cli.sink, SinkKind::Ffmpeg);
    }

    #[test]
    fn parses_options() {
        let cli = Cli::parse_from([
            "barscope", "in.wav", "-o", "out.mkv", "--bars", "32", "--window", "hann",
            "--bin-selection", "average", "--sink", "png", "--keep-frames",
        ]);
        assert_eq!(cli.output, PathBuf::from("out.mkv"));
        assert_eq!(cli.bars, 32);
        assert_eq!(cli.window, WindowFunction::Hann);
        assert_eq!(cli.bin_selection, BinSelection::Average);
        assert_eq!(cli.sink, SinkKind::Png);
        assert!(cli.keep_frames);
    }
}
