//! Ordered file queue shared between the GUI and the job runner.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use walkdir::WalkDir;

use super::error::{ConverterError, Result};
use super::ffmpeg::MediaInfo;
use super::formats::{is_video_file, ContainerFormat, QualityLevel, VideoCodec};
use super::job::{output_path_for, JobId, JobStatus, QueueItem};
use super::preset;

/// Queue shared between the GUI thread and the worker thread.
pub type SharedQueue = Arc<Mutex<FileQueue>>;

/// Lock the shared queue, recovering the data if a holder panicked.
pub fn lock_queue(queue: &SharedQueue) -> MutexGuard<'_, FileQueue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Item data the worker needs to run a conversion.
#[derive(Debug, Clone)]
pub struct ClaimedItem {
    pub id: JobId,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub format: ContainerFormat,
    pub codec: VideoCodec,
    pub quality: QualityLevel,
    pub duration_seconds: Option<f64>,
}

/// Item counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

/// Ordered list of files to convert plus the target used for new entries.
#[derive(Debug)]
pub struct FileQueue {
    items: Vec<QueueItem>,
    output_dir: PathBuf,
    format: ContainerFormat,
    codec: VideoCodec,
    quality: QualityLevel,
}

impl FileQueue {
    /// Create an empty queue writing to `output_dir`.
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            items: Vec::new(),
            output_dir,
            format: ContainerFormat::default(),
            codec: VideoCodec::default(),
            quality: QualityLevel::default(),
        }
    }

    /// Wrap the queue for sharing with a runner.
    pub fn into_shared(self) -> SharedQueue {
        Arc::new(Mutex::new(self))
    }

    /// Add a file with the current default target.
    pub fn add(&mut self, path: impl AsRef<Path>) -> Result<JobId> {
        let path = path.as_ref();
        Self::validate_source(path)?;

        if self.items.iter().any(|i| i.source_path == path) {
            return Err(ConverterError::invalid_input(path, "already queued"));
        }
        if self.items.iter().any(|i| i.output_path == path) {
            return Err(ConverterError::invalid_input(
                path,
                "is the output of another queued file",
            ));
        }

        let output_path = self.unique_output_path(None, path, self.format, self.codec);
        let item = QueueItem::new(
            path.to_path_buf(),
            output_path,
            self.format,
            self.codec,
            self.quality,
        );
        let id = item.id;
        log::info!("Queued {:?} as {} ({} {})", path, id, item.target_format, item.target_codec);
        self.items.push(item);
        Ok(id)
    }

    /// Add every video file in a folder.
    ///
    /// Returns the ids of added items and the errors for rejected files.
    pub fn add_folder(
        &mut self,
        dir: impl AsRef<Path>,
        recursive: bool,
    ) -> (Vec<JobId>, Vec<ConverterError>) {
        let dir = dir.as_ref();
        let mut added = Vec::new();
        let mut rejected = Vec::new();

        if !dir.is_dir() {
            rejected.push(ConverterError::invalid_input(dir, "not a directory"));
            return (added, rejected);
        }

        let walker = WalkDir::new(dir)
            .max_depth(if recursive { usize::MAX } else { 1 })
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry in {:?}: {}", dir, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_video_file(entry.path()) {
                continue;
            }
            if self.contains_source(entry.path()) {
                continue;
            }
            match self.add(entry.path()) {
                Ok(id) => added.push(id),
                Err(e) => rejected.push(e),
            }
        }

        log::info!("Added {} file(s) from {:?}", added.len(), dir);
        (added, rejected)
    }

    fn validate_source(path: &Path) -> Result<()> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            ConverterError::invalid_input(path, format!("cannot read file ({})", e))
        })?;
        if !metadata.is_file() {
            return Err(ConverterError::invalid_input(path, "not a regular file"));
        }
        File::open(path).map_err(|e| {
            ConverterError::invalid_input(path, format!("cannot open file ({})", e))
        })?;
        if !is_video_file(path) {
            return Err(ConverterError::invalid_input(path, "not a supported video file"));
        }
        Ok(())
    }

    pub fn contains_source(&self, path: &Path) -> bool {
        self.items.iter().any(|i| i.source_path == path)
    }

    /// Remove an item that is not currently converting.
    pub fn remove(&mut self, id: JobId) -> Result<QueueItem> {
        let index = self.index_of(id)?;
        if self.items[index].status.is_running() {
            return Err(ConverterError::ItemBusy(id));
        }
        Ok(self.items.remove(index))
    }

    /// Snapshot of all items in insertion order.
    pub fn list(&self) -> Vec<QueueItem> {
        self.items.clone()
    }

    pub fn get(&self, id: JobId) -> Option<&QueueItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    fn index_of(&self, id: JobId) -> Result<usize> {
        self.items
            .iter()
            .position(|i| i.id == id)
            .ok_or(ConverterError::UnknownItem(id))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Change the target used for new items.
    pub fn set_defaults(
        &mut self,
        format: ContainerFormat,
        codec: VideoCodec,
        quality: QualityLevel,
    ) -> Result<()> {
        if !preset::is_supported(format, codec) {
            return Err(ConverterError::UnsupportedPreset { format, codec });
        }
        self.format = format;
        self.codec = codec;
        self.quality = quality;
        Ok(())
    }

    pub fn defaults(&self) -> (ContainerFormat, VideoCodec, QualityLevel) {
        (self.format, self.codec, self.quality)
    }

    /// Re-target a pending item.
    pub fn set_target(
        &mut self,
        id: JobId,
        format: ContainerFormat,
        codec: VideoCodec,
        quality: QualityLevel,
    ) -> Result<()> {
        if !preset::is_supported(format, codec) {
            return Err(ConverterError::UnsupportedPreset { format, codec });
        }
        let item = self.get(id).ok_or(ConverterError::UnknownItem(id))?;
        if !item.status.is_pending() {
            return Err(ConverterError::ItemBusy(id));
        }
        let output_path = self.unique_output_path(Some(id), &item.source_path, format, codec);
        if let Some(item) = self.get_mut(id) {
            item.retarget(output_path, format, codec, quality);
        }
        Ok(())
    }

    /// Apply the default target to every pending item.
    pub fn apply_defaults_to_pending(&mut self) -> usize {
        let (format, codec, quality) = self.defaults();
        let pending = self.pending_ids();
        for id in &pending {
            self.retarget_item(*id, format, codec, quality);
        }
        pending.len()
    }

    /// Set the output directory and update pending output paths.
    pub fn set_output_dir(&mut self, dir: PathBuf) {
        log::info!("Output directory set to {:?}", dir);
        self.output_dir = dir;
        for id in self.pending_ids() {
            if let Some(item) = self.get(id) {
                let (format, codec, quality) =
                    (item.target_format, item.target_codec, item.quality_level);
                self.retarget_item(id, format, codec, quality);
            }
        }
    }

    fn pending_ids(&self) -> Vec<JobId> {
        self.items
            .iter()
            .filter(|i| i.status.is_pending())
            .map(|i| i.id)
            .collect()
    }

    fn retarget_item(
        &mut self,
        id: JobId,
        format: ContainerFormat,
        codec: VideoCodec,
        quality: QualityLevel,
    ) {
        let Some(source) = self.get(id).map(|i| i.source_path.clone()) else {
            return;
        };
        let output_path = self.unique_output_path(Some(id), &source, format, codec);
        if let Some(item) = self.get_mut(id) {
            item.retarget(output_path, format, codec, quality);
        }
    }

    /// Output path for `source` that no other item reads from or writes to.
    ///
    /// Clashes get a numeric suffix: `ep1_h264.mp4`, `ep1_h264_2.mp4`, ...
    fn unique_output_path(
        &self,
        id: Option<JobId>,
        source: &Path,
        format: ContainerFormat,
        codec: VideoCodec,
    ) -> PathBuf {
        let base = output_path_for(source, &self.output_dir, format, codec);
        let taken = |candidate: &Path| {
            candidate == source
                || self
                    .items
                    .iter()
                    .filter(|i| Some(i.id) != id)
                    .any(|i| i.output_path == candidate || i.source_path == candidate)
        };
        if !taken(&base) {
            return base;
        }

        let stem = base
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut n = 2;
        loop {
            let candidate = base.with_file_name(format!("{}_{}.{}", stem, n, format.extension()));
            if !taken(&candidate) {
                log::debug!("Output {:?} is taken, using {:?}", base, candidate);
                return candidate;
            }
            n += 1;
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn set_media_info(&mut self, id: JobId, info: MediaInfo) {
        if let Some(item) = self.get_mut(id) {
            item.media_info = Some(info);
        }
    }

    /// Move the first pending item to running.
    pub fn claim_next(&mut self) -> Option<ClaimedItem> {
        let id = self.items.iter().find(|i| i.status.is_pending())?.id;
        self.claim(id)
    }

    /// Move a specific pending item to running.
    pub fn claim(&mut self, id: JobId) -> Option<ClaimedItem> {
        let item = self.get_mut(id)?;
        if !item.status.is_pending() {
            return None;
        }
        item.start();
        Some(ClaimedItem {
            id: item.id,
            source_path: item.source_path.clone(),
            output_path: item.output_path.clone(),
            format: item.target_format,
            codec: item.target_codec,
            quality: item.quality_level,
            duration_seconds: item.media_info.as_ref().and_then(|m| m.duration_seconds),
        })
    }

    /// Cancel an item that has not started yet.
    pub fn cancel_pending(&mut self, id: JobId) -> bool {
        match self.get_mut(id) {
            Some(item) if item.status.is_pending() => {
                item.cancel();
                true
            }
            _ => false,
        }
    }

    /// Remove done, failed and cancelled items.
    pub fn clear_finished(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|i| !i.status.is_finished());
        before - self.items.len()
    }

    /// Remove only items that converted successfully.
    pub fn clear_done(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|i| !matches!(i.status, JobStatus::Done { .. }));
        before - self.items.len()
    }

    /// Remove every item that is not converting.
    pub fn clear_idle(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|i| i.status.is_running());
        before - self.items.len()
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.items.len(),
            ..Default::default()
        };
        for item in &self.items {
            match item.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running { .. } => stats.running += 1,
                JobStatus::Done { .. } => stats.done += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Overall progress (0.0 - 1.0): finished items count fully, the
    /// running item by its percentage.
    pub fn overall_progress(&self) -> f32 {
        if self.items.is_empty() {
            return 0.0;
        }
        let sum: f32 = self
            .items
            .iter()
            .map(|i| match i.status {
                JobStatus::Pending => 0.0,
                JobStatus::Running { .. } => i.progress_percent / 100.0,
                _ => 1.0,
            })
            .sum();
        sum / self.items.len() as f32
    }
}
