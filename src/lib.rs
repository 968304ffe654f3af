//! TV Converter Library
//!
//! Batch conversion of video files into TV-compatible formats with FFmpeg.

pub mod app;
pub mod converter;
pub mod settings;
pub mod ui;

// Re-export commonly used types
pub use app::TvConverterApp;
pub use converter::{
    ConverterError, FfmpegTool, FileQueue, JobId, JobRunner, JobStatus, QueueItem, RunnerEvent,
    TargetProfile,
};
pub use settings::ConverterSettings;
