//! Target containers, codecs and quality levels.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Output container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    #[default]
    Mp4,
    Avi,
    Mkv,
}

impl ContainerFormat {
    /// File extension of the output file.
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Avi => "avi",
            ContainerFormat::Mkv => "mkv",
        }
    }

    /// FFmpeg muxer name passed to `-f`.
    pub fn muxer(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Avi => "avi",
            ContainerFormat::Mkv => "matroska",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "MP4",
            ContainerFormat::Avi => "AVI",
            ContainerFormat::Mkv => "MKV",
        }
    }

    pub fn all() -> &'static [ContainerFormat] {
        &[ContainerFormat::Mp4, ContainerFormat::Avi, ContainerFormat::Mkv]
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Output video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
    Mpeg4,
}

impl VideoCodec {
    /// FFmpeg encoder name passed to `-c:v`.
    pub fn encoder(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::H265 => "libx265",
            VideoCodec::Mpeg4 => "mpeg4",
        }
    }

    /// Short tag appended to output file names.
    pub fn tag(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "h265",
            VideoCodec::Mpeg4 => "mpeg4",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "H.264",
            VideoCodec::H265 => "H.265",
            VideoCodec::Mpeg4 => "MPEG-4",
        }
    }

    pub fn all() -> &'static [VideoCodec] {
        &[VideoCodec::H264, VideoCodec::H265, VideoCodec::Mpeg4]
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Quality levels offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    /// Smallest files, visible artifacts
    Low,
    /// Balanced size and quality (default)
    #[default]
    Medium,
    /// Near-transparent quality, large files
    High,
}

impl QualityLevel {
    pub fn display_name(&self) -> &'static str {
        match self {
            QualityLevel::Low => "Low",
            QualityLevel::Medium => "Medium",
            QualityLevel::High => "High",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            QualityLevel::Low => "Smallest files, visible compression",
            QualityLevel::Medium => "Good balance of size and quality",
            QualityLevel::High => "Best quality, larger files",
        }
    }

    pub fn all() -> &'static [QualityLevel] {
        &[QualityLevel::Low, QualityLevel::Medium, QualityLevel::High]
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Supported input file extensions.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &[
        "mp4", "avi", "mov", "mkv", "flv", "wmv", "webm", "m4v", "mpg", "mpeg", "3gp",
    ]
}

/// Check if a file extension is supported for conversion.
pub fn is_supported_extension(ext: &str) -> bool {
    let ext_lower = ext.to_lowercase();
    supported_input_extensions().iter().any(|e| *e == ext_lower)
}

/// Check if a path looks like a video file by its extension.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(is_supported_extension)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_extension("mp4"));
        assert!(is_supported_extension("MKV"));
        assert!(is_supported_extension("3gp"));
        assert!(!is_supported_extension("txt"));
    }

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file(Path::new("/videos/Holiday.MOV")));
        assert!(!is_video_file(Path::new("/videos/notes")));
        assert!(!is_video_file(Path::new("/videos/cover.jpg")));
    }

    #[test]
    fn test_muxer_names() {
        assert_eq!(ContainerFormat::Mkv.muxer(), "matroska");
        assert_eq!(ContainerFormat::Mkv.extension(), "mkv");
        assert_eq!(VideoCodec::H265.encoder(), "libx265");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&(ContainerFormat::Avi, VideoCodec::Mpeg4, QualityLevel::High)).unwrap();
        assert_eq!(json, r#"["avi","mpeg4","high"]"#);
    }
}
