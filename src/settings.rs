//! Application preferences
//!
//! Loaded once at startup from `<config_dir>/tv-converter/settings.json`.
//! The file is optional and never written by the application.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::converter::{ContainerFormat, QualityLevel, RunnerOptions, VideoCodec};

/// Environment variable overriding the FFmpeg binary.
pub const FFMPEG_ENV_VAR: &str = "TV_CONVERTER_FFMPEG";
/// Environment variable overriding the output directory.
pub const OUTPUT_DIR_ENV_VAR: &str = "TV_CONVERTER_OUTPUT_DIR";

/// Converter preferences.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConverterSettings {
    /// Where converted files go (default: current directory)
    pub output_dir: Option<PathBuf>,
    /// Default container for new queue items
    pub format: ContainerFormat,
    /// Default video codec for new queue items
    pub codec: VideoCodec,
    /// Default quality for new queue items
    pub quality: QualityLevel,
    /// Explicit FFmpeg binary; otherwise looked up on PATH
    pub ffmpeg_path: Option<PathBuf>,
    /// Grace period for FFmpeg to quit after a cancel
    pub cancel_grace_ms: u64,
    /// Delay between progress polls
    pub poll_interval_ms: u64,
    /// Scan sub-folders when adding a folder
    pub recursive_scan: bool,
    /// Drop successfully converted items when a batch ends
    pub clear_finished_on_batch_end: bool,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            output_dir: None,
            format: ContainerFormat::Mp4,
            codec: VideoCodec::H264,
            quality: QualityLevel::Medium,
            ffmpeg_path: None,
            cancel_grace_ms: 3000,
            poll_interval_ms: 100,
            recursive_scan: true,
            clear_finished_on_batch_end: false,
        }
    }
}

impl ConverterSettings {
    /// Default location of the settings file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tv-converter").join("settings.json"))
    }

    /// Load settings from the default location, falling back to defaults.
    ///
    /// Environment overrides are applied on top.
    pub fn load() -> Self {
        let mut settings = match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                log::warn!("Ignoring settings file: {:#}", e);
                Self::default()
            }),
            _ => Self::default(),
        };
        settings.apply_env();
        settings
    }

    /// Load settings from a JSON file.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let settings: Self = serde_json::from_str(&json)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        log::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var_os(FFMPEG_ENV_VAR).map(PathBuf::from),
            std::env::var_os(OUTPUT_DIR_ENV_VAR).map(PathBuf::from),
        );
    }

    fn apply_overrides(&mut self, ffmpeg: Option<PathBuf>, output_dir: Option<PathBuf>) {
        if let Some(path) = ffmpeg.filter(|p| !p.as_os_str().is_empty()) {
            self.ffmpeg_path = Some(path);
        }
        if let Some(dir) = output_dir.filter(|p| !p.as_os_str().is_empty()) {
            self.output_dir = Some(dir);
        }
    }

    /// Output directory, defaulting to the current directory.
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            cancel_grace: Duration::from_millis(self.cancel_grace_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(10)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ConverterSettings::default();
        assert_eq!(settings.format, ContainerFormat::Mp4);
        assert_eq!(settings.codec, VideoCodec::H264);
        assert_eq!(settings.quality, QualityLevel::Medium);
        assert!(settings.recursive_scan);
        assert_eq!(settings.runner_options().cancel_grace, Duration::from_secs(3));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "codec": "h265", "quality": "high", "cancel_grace_ms": 500 }"#).unwrap();

        let settings = ConverterSettings::load_from(&path).unwrap();
        assert_eq!(settings.codec, VideoCodec::H265);
        assert_eq!(settings.quality, QualityLevel::High);
        assert_eq!(settings.format, ContainerFormat::Mp4);
        assert_eq!(settings.runner_options().cancel_grace, Duration::from_millis(500));
    }

    #[test]
    fn test_full_file_is_read_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let json = r#"{
            "output_dir": "/srv/tv",
            "format": "avi",
            "codec": "mpeg4",
            "quality": "low",
            "ffmpeg_path": "/usr/local/bin/ffmpeg",
            "cancel_grace_ms": 1000,
            "poll_interval_ms": 50,
            "recursive_scan": false,
            "clear_finished_on_batch_end": true
        }"#;
        fs::write(&path, json).unwrap();

        let settings = ConverterSettings::load_from(&path).unwrap();
        assert_eq!(settings.output_dir, Some(PathBuf::from("/srv/tv")));
        assert_eq!(settings.format, ContainerFormat::Avi);
        assert_eq!(settings.codec, VideoCodec::Mpeg4);
        assert_eq!(settings.quality, QualityLevel::Low);
        assert!(!settings.recursive_scan);
        assert!(settings.clear_finished_on_batch_end);
        assert_eq!(fs::read_to_string(&path).unwrap(), json);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        let err = ConverterSettings::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to parse"));
    }

    #[test]
    fn test_overrides() {
        let mut settings = ConverterSettings::default();
        settings.apply_overrides(Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")), Some(PathBuf::new()));
        assert_eq!(settings.ffmpeg_path, Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")));
        assert_eq!(settings.output_dir, None);
    }
}
