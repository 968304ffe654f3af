//! Error type shared by the queue, preset mapper and job runner.

use std::path::PathBuf;

use thiserror::Error;

use super::formats::{ContainerFormat, VideoCodec};
use super::job::JobId;

/// Errors that can occur while queueing or converting files.
#[derive(Error, Debug)]
pub enum ConverterError {
    #[error("Cannot add {}: {reason}", .path.display())]
    InvalidInput { path: PathBuf, reason: String },
    #[error("Unsupported preset: {format} with {codec}")]
    UnsupportedPreset {
        format: ContainerFormat,
        codec: VideoCodec,
    },
    #[error("{tool} not found on PATH. Please install FFmpeg.")]
    ExternalToolMissing { tool: String },
    #[error("FFmpeg failed ({status}): {stderr}")]
    ExternalProcess { status: String, stderr: String },
    #[error("Failed to spawn FFmpeg process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Failed to start converter worker: {0}")]
    WorkerStart(#[source] std::io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No queue item with id {0}")]
    UnknownItem(JobId),
    #[error("Queue item {0} is currently converting")]
    ItemBusy(JobId),
}

impl ConverterError {
    pub(crate) fn invalid_input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ConverterError::InvalidInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error should stop the application rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConverterError::ExternalToolMissing { .. } | ConverterError::WorkerStart(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ConverterError>;
