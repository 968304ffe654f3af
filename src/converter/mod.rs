//! TV Video Converter Module
//!
//! Queues video files and converts them to TV-friendly formats using the
//! FFmpeg CLI.

pub mod error;
pub mod ffmpeg;
pub mod formats;
pub mod job;
pub mod preset;
pub mod progress;
pub mod queue;
pub mod runner;

pub use error::ConverterError;
pub use ffmpeg::{FfmpegTool, MediaInfo, TranscodeProcess};
pub use formats::{ContainerFormat, QualityLevel, VideoCodec};
pub use job::{JobId, JobStatus, QueueItem};
pub use preset::TargetProfile;
pub use queue::{lock_queue, FileQueue, QueueStats, SharedQueue};
pub use runner::{JobRunner, RunnerEvent, RunnerOptions};
