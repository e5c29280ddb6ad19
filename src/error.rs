use thiserror::Error;

/// Invalid render settings, detected before the first frame is processed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("canvas dimensions {width}x{height} must be positive and fit in memory")]
    Dimensions { width: u32, height: u32 },
    #[error("frame rate must be positive")]
    FrameRate,
    #[error("bar count must be positive")]
    BarCount,
    #[error("bar count {bars} exceeds half the FFT size ({half})")]
    TooManyBars { bars: usize, half: usize },
    #[error("sample rate {sample_rate}Hz at {fps}fps yields zero samples per frame")]
    EmptyWindow { sample_rate: u32, fps: u32 },
    #[error("batch size must be positive")]
    BatchSize,
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("audio I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("audio decode error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),
    #[error("{0}")]
    Unsupported(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("unsupported FFT size {0}: must be even and at least 2")]
    UnsupportedSize(usize),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("frame sink I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode frame image: {0}")]
    Image(#[from] image::ImageError),
    #[error("frame {got} delivered out of order (expected {expected})")]
    OutOfOrder { expected: usize, got: usize },
    #[error("encoder failed: {0}")]
    Encoder(String),
}

/// Fatal pipeline failure. Every variant that can occur mid-run carries the
/// index of the frame being processed.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("transform setup failed: {0}")]
    Transform(#[from] TransformError),
    #[error("failed to read audio for frame {frame}: {source}")]
    StreamRead {
        frame: usize,
        #[source]
        source: StreamError,
    },
    #[error("frame sink rejected frame {frame}: {source}")]
    SinkWrite {
        frame: usize,
        #[source]
        source: SinkError,
    },
    #[error("failed to finalize output after {frames} frames: {source}")]
    Finalize {
        frames: usize,
        #[source]
        source: SinkError,
    },
    #[error("cancelled before frame {frame}")]
    Cancelled { frame: usize },
}
