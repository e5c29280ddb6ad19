use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::analysis::bars::BinSelection;
use crate::analysis::spectrum::WindowFunction;
use crate::encode::ffmpeg::EncodeSettings;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub encode: EncodeSettings,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub frames_dir: Option<PathBuf>,
    #[serde(default)]
    pub keep_frames: bool,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_bars")]
    pub bars: usize,
    #[serde(default)]
    pub window: WindowFunction,
    #[serde(default)]
    pub bin_selection: BinSelection,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            frames_dir: None,
            keep_frames: false,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            bars: default_bars(),
            window: WindowFunction::default(),
            bin_selection: BinSelection::default(),
            batch_size: None,
        }
    }
}

fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_fps() -> u32 { 30 }
fn default_fft_size() -> usize { 1024 }
fn default_bars() -> usize { 64 }

/// `barscope.toml` in the working directory, then the per-user config locations.
pub fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("barscope.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("barscope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("barscope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

/// Load a TOML config, or JSON when the file ends in `.json`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    parse_config(&content, is_json).with_context(|| format!("Failed to parse config: {}", path.display()))
}

fn parse_config(content: &str, is_json: bool) -> Result<Config> {
    if is_json {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(toml::from_str(content)?)
    }
}
