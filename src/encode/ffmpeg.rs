use serde::Deserialize;
use std::ffi::{OsStr, OsString};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;

use super::sink::{FrameOrder, FrameSink};
use crate::error::SinkError;
use crate::render::canvas::Frame;

/// Codec options handed to ffmpeg.
#[derive(Clone, Debug, Deserialize)]
pub struct EncodeSettings {
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    #[serde(default = "default_crf")]
    pub crf: u32,
    /// When set, uses `-b:v` instead of `-crf`.
    #[serde(default)]
    pub bitrate: Option<String>,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
            crf: default_crf(),
            bitrate: None,
            audio_codec: default_audio_codec(),
        }
    }
}

fn default_codec() -> String { "libx264".into() }
fn default_pix_fmt() -> String { "yuv420p".into() }
fn default_crf() -> u32 { 18 }
fn default_audio_codec() -> String { "flac".into() }

impl EncodeSettings {
    fn video_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-c:v".into(), self.codec.clone().into(),
            "-pix_fmt".into(), self.pix_fmt.clone().into(),
        ];
        if let Some(ref br) = self.bitrate {
            args.extend(["-b:v".into(), br.into()]);
        } else {
            args.extend(["-crf".into(), self.crf.to_string().into()]);
            args.extend(["-preset".into(), "medium".into()]);
        }
        args
    }

    fn audio_args(&self) -> Vec<OsString> {
        vec!["-c:a".into(), self.audio_codec.clone().into()]
    }
}

/// Streams raw RGBA frames into an ffmpeg child that muxes them with the source audio.
pub struct FfmpegEncoder {
    child: Child,
    /// Collects the child's stderr so a chatty encoder never blocks on a full pipe.
    stderr: Option<JoinHandle<Vec<u8>>>,
    output: PathBuf,
    frame_bytes: usize,
    order: FrameOrder,
}

impl FfmpegEncoder {
    pub fn new(
        output_path: &Path,
        input_audio: &Path,
        width: u32,
        height: u32,
        fps: u32,
        settings: &EncodeSettings,
    ) -> Result<Self, SinkError> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-nostats".into(),
            "-f".into(), "rawvideo".into(),
            "-pixel_format".into(), "rgba".into(),
            "-video_size".into(), format!("{}x{}", width, height).into(),
            "-framerate".into(), fps.to_string().into(),
            "-i".into(), "pipe:0".into(),
            "-i".into(), input_audio.into(),
        ];
        args.extend(settings.video_args());
        args.extend(settings.audio_args());
        args.extend(["-shortest".into(), output_path.into()]);

        let encoder = Self::spawn(
            OsStr::new("ffmpeg"),
            &args,
            output_path,
            width as usize * height as usize * 4,
        )?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            width, height, fps, settings.codec
        );
        Ok(encoder)
    }

    fn spawn(
        program: &OsStr,
        args: &[OsString],
        output_path: &Path,
        frame_bytes: usize,
    ) -> Result<Self, SinkError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                SinkError::Encoder(format!(
                    "failed to spawn {} (is it installed?): {}",
                    program.to_string_lossy(),
                    e
                ))
            })?;

        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                if let Err(e) = pipe.read_to_end(&mut buf) {
                    log::debug!("Stopped reading ffmpeg stderr: {}", e);
                }
                buf
            })
        });

        Ok(Self {
            child,
            stderr,
            output: output_path.to_path_buf(),
            frame_bytes,
            order: FrameOrder::default(),
        })
    }

    fn remove_output(output: &Path) {
        if output.exists() {
            match std::fs::remove_file(output) {
                Ok(()) => log::info!("Removed partial output {}", output.display()),
                Err(e) => log::warn!("Failed to remove partial output {}: {}", output.display(), e),
            }
        }
    }
}

fn collect_stderr(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

impl FrameSink for FfmpegEncoder {
    fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let bytes = frame.as_bytes();
        if bytes.len() != self.frame_bytes {
            return Err(SinkError::Encoder(format!(
                "frame {} is {} bytes, expected {}",
                frame.index(),
                bytes.len(),
                self.frame_bytes
            )));
        }
        self.order.accept(frame.index())?;
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| SinkError::Encoder("ffmpeg stdin not available".into()))?;
        stdin.write_all(bytes)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), SinkError> {
        let Self { mut child, stderr, output, order, .. } = *self;
        // Close stdin to signal EOF
        drop(child.stdin.take());

        let status = child.wait()?;
        let stderr = collect_stderr(stderr);
        if !status.success() {
            Self::remove_output(&output);
            return Err(SinkError::Encoder(format!("ffmpeg exited with error:\n{}", stderr)));
        }

        log::info!("FFmpeg encoding complete: {} frames", order.written());
        Ok(())
    }

    fn abort(mut self: Box<Self>) {
        drop(self.child.stdin.take());
        if let Err(e) = self.child.kill() {
            log::debug!("ffmpeg already exited: {}", e);
        }
        let _ = self.child.wait();
        collect_stderr(self.stderr.take());
        Self::remove_output(&self.output);
    }
}

/// Encode a numbered image sequence plus the source audio into `output_path`.
pub fn mux_image_sequence(
    pattern: &Path,
    input_audio: &Path,
    fps: u32,
    output_path: &Path,
    settings: &EncodeSettings,
) -> Result<(), SinkError> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-nostats".into(),
        "-framerate".into(), fps.to_string().into(),
        "-i".into(), pattern.into(),
        "-i".into(), input_audio.into(),
    ];
    args.extend(settings.video_args());
    args.extend(settings.audio_args());
    args.push(output_path.into());

    log::info!("Merging frames with audio into {}", output_path.display());
    let output = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| SinkError::Encoder(format!("failed to spawn ffmpeg (is it installed?): {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SinkError::Encoder(format!("ffmpeg exited with error:\n{}", stderr)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter().map(|a| a.into_string().unwrap()).collect()
    }

    #[test]
    fn crf_mode_by_default() {
        let args = strings(EncodeSettings::default().video_args());
        assert_eq!(args, ["-c:v", "libx264", "-pix_fmt", "yuv420p", "-crf", "18", "-preset", "medium"]);
    }

    #[test]
    fn bitrate_replaces_crf() {
        let settings = EncodeSettings {
            bitrate: Some("5M".into()),
            ..Default::default()
        };
        let args = strings(settings.video_args());
        assert!(args.windows(2).any(|w| w == ["-b:v", "5M"]));
        assert!(!args.iter().any(|a| a == "-crf"));
    }

    #[cfg(unix)]
    fn stand_in(script: &str, output: &Path, frame_bytes: usize) -> FfmpegEncoder {
        let args: Vec<OsString> = vec!["-c".into(), script.into()];
        FfmpegEncoder::spawn(OsStr::new("sh"), &args, output, frame_bytes).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn chatty_encoder_does_not_stall_writes() {
        use crate::render::canvas::Rasterizer;
        use std::sync::mpsc;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        // Far more than a pipe buffer of progress output before touching stdin.
        let script = "i=0; while [ $i -lt 3000 ]; do \
            echo \"frame=$i fps=30.0 q=28.0 size=1024kB time=00:00:01.00 bitrate=800kbits/s speed=1.0x\" >&2; \
            i=$((i+1)); done; cat > /dev/null";
        let mut encoder = stand_in(script, &output, 64 * 32 * 4);

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let rasterizer = Rasterizer::new(64, 32);
            for i in 0..100 {
                encoder.write(&rasterizer.rasterize(i, &[])).unwrap();
            }
            let result = Box::new(encoder).finish();
            let _ = tx.send(result.is_ok());
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(30)), Ok(true));
    }

    #[cfg(unix)]
    #[test]
    fn failed_encode_removes_output_and_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        std::fs::write(&output, b"partial").unwrap();

        let encoder = stand_in("cat > /dev/null; echo 'Unknown encoder' >&2; exit 1", &output, 4);
        let err = Box::new(encoder).finish().unwrap_err();

        assert!(matches!(&err, SinkError::Encoder(msg) if msg.contains("Unknown encoder")));
        assert!(!output.exists());
    }

    #[cfg(unix)]
    #[test]
    fn abort_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        std::fs::write(&output, b"partial").unwrap();

        Box::new(stand_in("cat > /dev/null", &output, 4)).abort();
        assert!(!output.exists());
    }
}
