//! Maps a target format, codec and quality level to FFmpeg arguments.

use super::error::{ConverterError, Result};
use super::formats::{ContainerFormat, QualityLevel, VideoCodec};

/// The container/codec pairs that play back on common TV sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TargetProfile {
    #[default]
    Mp4H264,
    Mp4H265,
    AviMpeg4,
    MkvH264,
}

impl TargetProfile {
    pub fn format(&self) -> ContainerFormat {
        match self {
            TargetProfile::Mp4H264 | TargetProfile::Mp4H265 => ContainerFormat::Mp4,
            TargetProfile::AviMpeg4 => ContainerFormat::Avi,
            TargetProfile::MkvH264 => ContainerFormat::Mkv,
        }
    }

    pub fn codec(&self) -> VideoCodec {
        match self {
            TargetProfile::Mp4H264 | TargetProfile::MkvH264 => VideoCodec::H264,
            TargetProfile::Mp4H265 => VideoCodec::H265,
            TargetProfile::AviMpeg4 => VideoCodec::Mpeg4,
        }
    }

    /// Look up the profile for a container/codec pair.
    pub fn from_pair(format: ContainerFormat, codec: VideoCodec) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|p| p.format() == format && p.codec() == codec)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TargetProfile::Mp4H264 => "MP4 (H.264)",
            TargetProfile::Mp4H265 => "MP4 (H.265)",
            TargetProfile::AviMpeg4 => "AVI (MPEG-4)",
            TargetProfile::MkvH264 => "MKV (H.264)",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TargetProfile::Mp4H264 => "Plays on almost every TV and media player",
            TargetProfile::Mp4H265 => "Half the size of H.264, needs a recent TV",
            TargetProfile::AviMpeg4 => "For older DivX/Xvid certified players",
            TargetProfile::MkvH264 => "Keeps extra audio tracks, for smart TVs",
        }
    }

    pub fn all() -> &'static [TargetProfile] {
        &[
            TargetProfile::Mp4H264,
            TargetProfile::Mp4H265,
            TargetProfile::AviMpeg4,
            TargetProfile::MkvH264,
        ]
    }
}

/// Check whether a container/codec pair has a preset.
pub fn is_supported(format: ContainerFormat, codec: VideoCodec) -> bool {
    TargetProfile::from_pair(format, codec).is_some()
}

/// Resolve the encoder arguments for a target.
///
/// The list excludes the input and output paths, which the runner adds.
pub fn resolve(
    format: ContainerFormat,
    codec: VideoCodec,
    quality: QualityLevel,
) -> Result<Vec<String>> {
    if !is_supported(format, codec) {
        return Err(ConverterError::UnsupportedPreset { format, codec });
    }

    let mut args: Vec<String> = Vec::new();
    let mut push = |items: &[&str]| args.extend(items.iter().map(|s| s.to_string()));

    push(&["-map", "0:v:0", "-map", "0:a:0?", "-sn"]);

    match codec {
        VideoCodec::H264 => {
            push(&["-c:v", codec.encoder(), "-preset", "slow"]);
            push(&["-crf", x264_crf(quality)]);
            push(&["-profile:v", "high", "-level:v", "4.1"]);
        }
        VideoCodec::H265 => {
            push(&["-c:v", codec.encoder(), "-preset", "medium"]);
            push(&["-crf", x265_crf(quality)]);
            if format == ContainerFormat::Mp4 {
                // Apple and most TV decoders only accept the hvc1 sample entry.
                push(&["-tag:v", "hvc1"]);
            }
        }
        VideoCodec::Mpeg4 => {
            push(&["-c:v", codec.encoder(), "-q:v", mpeg4_qscale(quality)]);
            push(&["-vtag", "XVID"]);
        }
    }
    push(&["-pix_fmt", "yuv420p"]);

    let audio_encoder = match format {
        ContainerFormat::Avi => "libmp3lame",
        ContainerFormat::Mp4 | ContainerFormat::Mkv => "aac",
    };
    push(&["-c:a", audio_encoder, "-b:a", audio_bitrate(quality)]);

    push(&["-f", format.muxer()]);
    if format == ContainerFormat::Mp4 {
        push(&["-movflags", "+faststart"]);
    }

    Ok(args)
}

fn x264_crf(quality: QualityLevel) -> &'static str {
    match quality {
        QualityLevel::Low => "28",
        QualityLevel::Medium => "23",
        QualityLevel::High => "18",
    }
}

fn x265_crf(quality: QualityLevel) -> &'static str {
    match quality {
        QualityLevel::Low => "30",
        QualityLevel::Medium => "26",
        QualityLevel::High => "22",
    }
}

fn mpeg4_qscale(quality: QualityLevel) -> &'static str {
    match quality {
        QualityLevel::Low => "8",
        QualityLevel::Medium => "5",
        QualityLevel::High => "3",
    }
}

fn audio_bitrate(quality: QualityLevel) -> &'static str {
    match quality {
        QualityLevel::Low => "128k",
        QualityLevel::Medium => "192k",
        QualityLevel::High => "256k",
    }
}
