//! Background worker that runs FFmpeg for queued items, one at a time.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::error::{ConverterError, Result};
use super::ffmpeg::{FfmpegTool, TranscodeProcess};
use super::job::JobId;
use super::preset;
use super::progress::ProgressTracker;
use super::queue::{lock_queue, ClaimedItem, SharedQueue};

/// Commands sent to the worker thread.
#[derive(Debug)]
enum WorkerCommand {
    /// Convert pending items in order until none are left
    RunBatch,
    /// Convert a single pending item
    RunItem(JobId),
    /// Cancel the running item with this id
    Cancel(JobId),
    /// Cancel the running item and stop the batch
    StopBatch,
    /// Stop the worker thread
    Shutdown,
}

/// Events from the worker thread.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    BatchStarted,
    ItemStarted(JobId),
    Progress(JobId, f32),
    /// Item converted; carries the output file size
    ItemDone(JobId, u64),
    ItemFailed(JobId, String),
    ItemCancelled(JobId),
    /// Worker is idle again
    BatchFinished,
}

/// Timing knobs for the worker.
#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    /// How long FFmpeg gets to quit after a cancel before it is killed
    pub cancel_grace: Duration,
    /// Delay between process polls
    pub poll_interval: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            cancel_grace: Duration::from_secs(3),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Why a conversion loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    StopBatch,
    Shutdown,
}

/// Drives conversions on a dedicated worker thread.
pub struct JobRunner {
    tool: FfmpegTool,
    queue: SharedQueue,
    command_tx: Sender<WorkerCommand>,
    event_rx: Receiver<RunnerEvent>,
    worker_handle: Option<JoinHandle<()>>,
    is_running: bool,
    /// Background probe threads still running
    probing: Arc<AtomicUsize>,
}

impl JobRunner {
    /// Create a runner and spawn its worker thread.
    pub fn new(tool: FfmpegTool, queue: SharedQueue, options: RunnerOptions) -> Result<Self> {
        let (command_tx, command_rx) = unbounded::<WorkerCommand>();
        let (event_tx, event_rx) = unbounded::<RunnerEvent>();

        let worker = Worker {
            tool: tool.clone(),
            queue: Arc::clone(&queue),
            command_rx,
            event_tx,
            options,
        };
        let worker_handle = thread::Builder::new()
            .name("converter-worker".to_string())
            .spawn(move || worker.run())
            .map_err(ConverterError::WorkerStart)?;

        Ok(Self {
            tool,
            queue,
            command_tx,
            event_rx,
            worker_handle: Some(worker_handle),
            is_running: false,
            probing: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn queue(&self) -> &SharedQueue {
        &self.queue
    }

    /// Whether a batch or single conversion is in progress.
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Start converting all pending items in order.
    pub fn start_batch(&mut self) {
        self.is_running = self.command_tx.send(WorkerCommand::RunBatch).is_ok();
    }

    /// Start converting one pending item.
    pub fn start(&mut self, id: JobId) {
        self.is_running = self.command_tx.send(WorkerCommand::RunItem(id)).is_ok();
    }

    /// Read source metadata for the given items on a background thread.
    pub fn probe_media(&self, ids: Vec<JobId>) {
        if ids.is_empty() || self.tool.ffprobe_path().is_none() {
            return;
        }

        let tool = self.tool.clone();
        let queue = Arc::clone(&self.queue);
        let probing = Arc::clone(&self.probing);
        self.probing.fetch_add(1, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name("media-probe".to_string())
            .spawn(move || {
                for id in ids {
                    // The lock is not held while FFprobe runs.
                    let source = lock_queue(&queue).get(id).map(|i| i.source_path.clone());
                    let Some(source) = source else { continue };
                    if let Some(info) = tool.probe(&source) {
                        lock_queue(&queue).set_media_info(id, info);
                    }
                }
                probing.fetch_sub(1, Ordering::SeqCst);
            });
        if let Err(e) = spawned {
            self.probing.fetch_sub(1, Ordering::SeqCst);
            log::warn!("Failed to start media probe: {}", e);
        }
    }

    /// Whether background probes are still filling in metadata.
    pub fn is_probing(&self) -> bool {
        self.probing.load(Ordering::SeqCst) > 0
    }

    /// Cancel an item. Pending items are cancelled immediately.
    pub fn cancel(&mut self, id: JobId) -> Result<()> {
        let mut queue = lock_queue(&self.queue);
        let item = queue.get(id).ok_or(ConverterError::UnknownItem(id))?;
        if item.status.is_running() {
            drop(queue);
            let _ = self.command_tx.send(WorkerCommand::Cancel(id));
        } else if queue.cancel_pending(id) {
            log::info!("Cancelled pending item {}", id);
        }
        Ok(())
    }

    /// Cancel the running item and stop the batch.
    pub fn stop(&mut self) {
        let _ = self.command_tx.send(WorkerCommand::StopBatch);
    }

    /// Poll for worker events (non-blocking).
    pub fn poll_events(&mut self) -> Vec<RunnerEvent> {
        let events: Vec<RunnerEvent> = self.event_rx.try_iter().collect();
        for event in &events {
            match event {
                RunnerEvent::BatchStarted => self.is_running = true,
                RunnerEvent::BatchFinished => self.is_running = false,
                _ => {}
            }
        }
        events
    }

    /// Block until an event arrives or the timeout passes.
    pub fn wait_event(&mut self, timeout: Duration) -> Option<RunnerEvent> {
        let event = self.event_rx.recv_timeout(timeout).ok()?;
        match event {
            RunnerEvent::BatchStarted => self.is_running = true,
            RunnerEvent::BatchFinished => self.is_running = false,
            _ => {}
        }
        Some(event)
    }
}

impl Drop for JobRunner {
    fn drop(&mut self) {
        let _ = self.command_tx.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

/// State owned by the worker thread.
struct Worker {
    tool: FfmpegTool,
    queue: SharedQueue,
    command_rx: Receiver<WorkerCommand>,
    event_tx: Sender<RunnerEvent>,
    options: RunnerOptions,
}

impl Worker {
    /// Worker thread main loop.
    fn run(self) {
        loop {
            let flow = match self.command_rx.recv() {
                Ok(WorkerCommand::RunBatch) => self.run_batch(None),
                Ok(WorkerCommand::RunItem(id)) => self.run_batch(Some(id)),
                // Nothing is running, so there is nothing to cancel or stop.
                Ok(WorkerCommand::Cancel(_)) | Ok(WorkerCommand::StopBatch) => Flow::Continue,
                Ok(WorkerCommand::Shutdown) | Err(_) => Flow::Shutdown,
            };
            if flow == Flow::Shutdown {
                log::debug!("Converter worker shutting down");
                return;
            }
        }
    }

    fn emit(&self, event: RunnerEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Process pending items (or a single one) sequentially.
    fn run_batch(&self, only: Option<JobId>) -> Flow {
        self.emit(RunnerEvent::BatchStarted);
        let mut flow = Flow::Continue;

        loop {
            let claimed = {
                let mut queue = lock_queue(&self.queue);
                match only {
                    Some(id) => queue.claim(id),
                    None => queue.claim_next(),
                }
            };
            let Some(item) = claimed else { break };

            flow = self.run_item(item);
            if flow != Flow::Continue || only.is_some() {
                break;
            }
        }

        self.emit(RunnerEvent::BatchFinished);
        flow
    }

    /// Convert one claimed item, returning whether to keep going.
    fn run_item(&self, item: ClaimedItem) -> Flow {
        let id = item.id;
        self.emit(RunnerEvent::ItemStarted(id));
        log::info!("[{}] Converting {:?} -> {:?}", id, item.source_path, item.output_path);

        let args = match preset::resolve(item.format, item.codec, item.quality) {
            Ok(args) => args,
            Err(e) => return self.fail(id, e),
        };

        if let Some(parent) = item.output_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return self.fail(id, ConverterError::Io(e));
            }
        }

        let duration = item
            .duration_seconds
            .or_else(|| self.tool.probe(&item.source_path).and_then(|m| m.duration_seconds));

        let mut process = match self.tool.spawn(&item.source_path, &item.output_path, &args) {
            Ok(process) => process,
            Err(e) => return self.fail(id, e),
        };
        log::debug!("[{}] FFmpeg started with pid {}", id, process.id());

        let mut tracker = ProgressTracker::new(duration);

        loop {
            let mut cancel = None;
            for command in self.command_rx.try_iter() {
                match command {
                    WorkerCommand::Cancel(target) if target == id => {
                        cancel.get_or_insert(Flow::Continue);
                    }
                    WorkerCommand::Cancel(other) => {
                        lock_queue(&self.queue).cancel_pending(other);
                    }
                    WorkerCommand::StopBatch => cancel = Some(Flow::StopBatch),
                    WorkerCommand::Shutdown => {
                        cancel = Some(Flow::Shutdown);
                        break;
                    }
                    WorkerCommand::RunBatch | WorkerCommand::RunItem(_) => {
                        log::debug!("[{}] Ignoring start request while converting", id);
                    }
                }
            }
            if let Some(flow) = cancel {
                return self.cancel(id, &mut process, &item.output_path, flow);
            }

            self.apply_progress(id, &process, &mut tracker);

            match process.try_wait() {
                Ok(Some(status)) => {
                    process.join_readers();
                    self.apply_progress(id, &process, &mut tracker);
                    return match process.outcome(status) {
                        Ok(()) => self.complete(id, &item.output_path),
                        Err(e) => {
                            remove_partial_output(&item.output_path);
                            self.fail(id, e)
                        }
                    };
                }
                Ok(None) => thread::sleep(self.options.poll_interval),
                Err(e) => {
                    drop(process);
                    remove_partial_output(&item.output_path);
                    return self.fail(id, ConverterError::Io(e));
                }
            }
        }
    }

    /// Push newly parsed progress into the queue item.
    fn apply_progress(&self, id: JobId, process: &TranscodeProcess, tracker: &mut ProgressTracker) {
        let snapshots = process.drain_progress();
        if snapshots.is_empty() {
            return;
        }
        tracker.offer_duration(process.reported_duration());

        let mut latest = None;
        let mut speed = None;
        for snapshot in &snapshots {
            if let Some(percent) = tracker.observe(snapshot) {
                latest = Some(percent);
            }
            if snapshot.speed.is_some() {
                speed = snapshot.speed.clone();
            }
        }

        let updated = {
            let mut queue = lock_queue(&self.queue);
            match queue.get_mut(id) {
                Some(item) => item.update_progress(tracker.percent(), speed),
                None => false,
            }
        };
        if let (true, Some(percent)) = (updated, latest) {
            self.emit(RunnerEvent::Progress(id, percent));
        }
    }

    fn complete(&self, id: JobId, output: &Path) -> Flow {
        let output_size = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        if let Some(item) = lock_queue(&self.queue).get_mut(id) {
            item.complete(output_size);
        }
        log::info!("[{}] Conversion finished ({} bytes)", id, output_size);
        self.emit(RunnerEvent::ItemDone(id, output_size));
        Flow::Continue
    }

    fn fail(&self, id: JobId, error: ConverterError) -> Flow {
        let message = error.to_string();
        log::error!("[{}] Conversion failed: {}", id, message);
        if let Some(item) = lock_queue(&self.queue).get_mut(id) {
            item.fail(message.clone());
        }
        self.emit(RunnerEvent::ItemFailed(id, message));
        Flow::Continue
    }

    fn cancel(&self, id: JobId, process: &mut TranscodeProcess, output: &Path, flow: Flow) -> Flow {
        // Mark first so that late progress is never applied.
        if let Some(item) = lock_queue(&self.queue).get_mut(id) {
            item.cancel();
        }
        log::info!("[{}] Cancelling conversion", id);
        if let Err(e) = process.cancel(self.options.cancel_grace) {
            log::warn!("[{}] Error while stopping FFmpeg: {}", id, e);
        }
        remove_partial_output(output);
        self.emit(RunnerEvent::ItemCancelled(id));
        flow
    }
}

fn remove_partial_output(path: &Path) {
    if path.exists() {
        match std::fs::remove_file(path) {
            Ok(()) => log::debug!("Removed partial output {:?}", path),
            Err(e) => log::warn!("Could not remove partial output {:?}: {}", path, e),
        }
    }
}
