//! Queue item definition and its status transitions.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::ffmpeg::MediaInfo;
use super::formats::{ContainerFormat, QualityLevel, VideoCodec};

/// Unique identifier for a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl JobId {
    /// Allocate the next process-wide unique id.
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        JobId(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Status of a queue item.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Waiting in queue
    Pending,
    /// FFmpeg is running for this item
    Running {
        started_at: Instant,
        /// Processing speed (e.g., "2.5x")
        speed: Option<String>,
    },
    /// Converted successfully
    Done { elapsed: Duration, output_size: u64 },
    /// FFmpeg failed or could not be started
    Failed { error: String },
    /// Cancelled by the user
    Cancelled,
}

impl JobStatus {
    /// Check if the item is finished (done, failed, or cancelled).
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobStatus::Done { .. } | JobStatus::Failed { .. } | JobStatus::Cancelled
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, JobStatus::Running { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, JobStatus::Pending)
    }

    /// Short label for the queue table.
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Running { .. } => "Running",
            JobStatus::Done { .. } => "Done",
            JobStatus::Failed { .. } => "Failed",
            JobStatus::Cancelled => "Cancelled",
        }
    }
}

/// A video file waiting for, undergoing, or finished with conversion.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: JobId,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub target_format: ContainerFormat,
    pub target_codec: VideoCodec,
    pub quality_level: QualityLevel,
    pub status: JobStatus,
    /// Conversion progress (0.0 - 100.0), never decreases while running
    pub progress_percent: f32,
    /// Source metadata from ffprobe (if available)
    pub media_info: Option<MediaInfo>,
}

impl QueueItem {
    pub fn new(
        source_path: PathBuf,
        output_path: PathBuf,
        target_format: ContainerFormat,
        target_codec: VideoCodec,
        quality_level: QualityLevel,
    ) -> Self {
        Self {
            id: JobId::new(),
            source_path,
            output_path,
            target_format,
            target_codec,
            quality_level,
            status: JobStatus::Pending,
            progress_percent: 0.0,
            media_info: None,
        }
    }

    /// Get the source file name.
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Get the resolution string (e.g., "1920x1080").
    pub fn resolution_string(&self) -> String {
        self.media_info
            .as_ref()
            .filter(|info| info.width > 0 && info.height > 0)
            .map(|info| format!("{}x{}", info.width, info.height))
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Get the duration string (e.g., "2:34").
    pub fn duration_string(&self) -> String {
        self.media_info
            .as_ref()
            .and_then(|info| info.duration_seconds)
            .map(|d| {
                let secs = d as u64;
                format!("{}:{:02}", secs / 60, secs % 60)
            })
            .unwrap_or_else(|| "--:--".to_string())
    }

    /// Re-target a pending item.
    pub(crate) fn retarget(
        &mut self,
        output_path: PathBuf,
        format: ContainerFormat,
        codec: VideoCodec,
        quality: QualityLevel,
    ) {
        self.target_format = format;
        self.target_codec = codec;
        self.quality_level = quality;
        self.output_path = output_path;
    }

    /// Mark the item as running.
    pub fn start(&mut self) {
        self.status = JobStatus::Running {
            started_at: Instant::now(),
            speed: None,
        };
        self.progress_percent = 0.0;
    }

    /// Record progress. Ignored unless running; never moves backwards.
    pub fn update_progress(&mut self, percent: f32, speed: Option<String>) -> bool {
        let JobStatus::Running { speed: current_speed, .. } = &mut self.status else {
            return false;
        };
        if speed.is_some() {
            *current_speed = speed;
        }
        let percent = percent.clamp(0.0, 100.0);
        if percent > self.progress_percent {
            self.progress_percent = percent;
            true
        } else {
            false
        }
    }

    /// Mark the item as done.
    pub fn complete(&mut self, output_size: u64) {
        if let JobStatus::Running { started_at, .. } = &self.status {
            self.status = JobStatus::Done {
                elapsed: started_at.elapsed(),
                output_size,
            };
            self.progress_percent = 100.0;
        }
    }

    /// Mark the item as failed.
    pub fn fail(&mut self, error: String) {
        self.status = JobStatus::Failed { error };
    }

    /// Mark the item as cancelled.
    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
    }
}

/// Output path for a source file: `<output_dir>/<stem>_<codec-tag>.<ext>`.
pub fn output_path_for(
    source: &Path,
    output_dir: &Path,
    format: ContainerFormat,
    codec: VideoCodec,
) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());

    output_dir.join(format!("{}_{}.{}", stem, codec.tag(), format.extension()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> QueueItem {
        let source = PathBuf::from("/videos/holiday.mov");
        let output = output_path_for(&source, Path::new("/out"), ContainerFormat::Mp4, VideoCodec::H264);
        QueueItem::new(
            source,
            output,
            ContainerFormat::Mp4,
            VideoCodec::H264,
            QualityLevel::Medium,
        )
    }

    #[test]
    fn test_output_path() {
        assert_eq!(item().output_path, PathBuf::from("/out/holiday_h264.mp4"));
        assert_eq!(
            output_path_for(
                Path::new("/videos/clip.avi"),
                Path::new("/tv"),
                ContainerFormat::Avi,
                VideoCodec::Mpeg4
            ),
            PathBuf::from("/tv/clip_mpeg4.avi")
        );
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(item().id, item().id);
    }

    #[test]
    fn test_progress_only_while_running() {
        let mut job = item();
        assert!(!job.update_progress(50.0, None));
        assert_eq!(job.progress_percent, 0.0);

        job.start();
        assert!(job.update_progress(40.0, Some("1.5x".into())));
        assert!(!job.update_progress(30.0, None));
        assert_eq!(job.progress_percent, 40.0);
        assert!(matches!(
            &job.status,
            JobStatus::Running { speed: Some(s), .. } if s == "1.5x"
        ));

        job.cancel();
        assert!(!job.update_progress(90.0, None));
        assert_eq!(job.progress_percent, 40.0);
    }

    #[test]
    fn test_complete_sets_full_progress() {
        let mut job = item();
        job.start();
        job.complete(1024);
        assert_eq!(job.progress_percent, 100.0);
        assert!(matches!(job.status, JobStatus::Done { output_size: 1024, .. }));
        assert!(job.status.is_finished());
    }

    #[test]
    fn test_complete_requires_running() {
        let mut job = item();
        job.complete(10);
        assert!(job.status.is_pending());
    }
}
