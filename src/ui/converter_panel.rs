//! Converter panel UI.

use std::path::{Path, PathBuf};

use egui::{Color32, RichText, Vec2};

use crate::converter::formats::supported_input_extensions;
use crate::converter::{
    lock_queue, ConverterError, FfmpegTool, FileQueue, JobId, JobRunner, JobStatus, QualityLevel,
    QueueItem, RunnerEvent, TargetProfile,
};
use crate::settings::ConverterSettings;

/// Maximum number of notices kept on screen.
const MAX_NOTICES: usize = 6;

/// Main converter panel: queue table, target selection and batch controls.
pub struct ConverterPanel {
    runner: JobRunner,
    settings: ConverterSettings,
    /// Target for newly added files
    selected_profile: TargetProfile,
    selected_quality: QualityLevel,
    /// Messages for rejected files and failed items
    notices: Vec<String>,
}

impl ConverterPanel {
    /// Create the panel and its job runner.
    pub fn new(tool: FfmpegTool, settings: ConverterSettings) -> Result<Self, ConverterError> {
        let mut queue = FileQueue::new(settings.resolved_output_dir());
        let selected_profile = TargetProfile::from_pair(settings.format, settings.codec)
            .unwrap_or_else(|| {
                log::warn!(
                    "Configured target {} with {} is not supported, using {}",
                    settings.format,
                    settings.codec,
                    TargetProfile::default().display_name()
                );
                TargetProfile::default()
            });
        let selected_quality = settings.quality;
        if let Err(e) = queue.set_defaults(
            selected_profile.format(),
            selected_profile.codec(),
            selected_quality,
        ) {
            log::error!("Failed to apply default target: {}", e);
        }

        let runner = JobRunner::new(tool, queue.into_shared(), settings.runner_options())?;

        Ok(Self {
            runner,
            settings,
            selected_profile,
            selected_quality,
            notices: Vec::new(),
        })
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    /// Add files and folders; metadata is probed in the background.
    pub fn add_files(&mut self, paths: Vec<PathBuf>) {
        let mut added = Vec::new();
        for path in paths {
            if path.is_dir() {
                added.extend(self.queue_folder(&path));
                continue;
            }
            let result = lock_queue(self.runner.queue()).add(&path);
            match result {
                Ok(id) => added.push(id),
                Err(e) => self.notice(e),
            }
        }
        self.runner.probe_media(added);
    }

    /// Add all video files from a folder.
    pub fn add_folder(&mut self, dir: PathBuf) {
        let added = self.queue_folder(&dir);
        self.runner.probe_media(added);
    }

    fn queue_folder(&mut self, dir: &Path) -> Vec<JobId> {
        let (added, rejected) =
            lock_queue(self.runner.queue()).add_folder(dir, self.settings.recursive_scan);
        for e in rejected {
            self.notice(e);
        }
        added
    }

    fn notice(&mut self, error: impl std::fmt::Display) {
        let message = error.to_string();
        log::warn!("{}", message);
        if self.notices.len() == MAX_NOTICES {
            self.notices.remove(0);
        }
        self.notices.push(message);
    }

    /// Apply worker events to panel state.
    pub fn handle_events(&mut self) {
        for event in self.runner.poll_events() {
            match event {
                RunnerEvent::ItemFailed(id, error) => {
                    self.notice(format!("Conversion {} failed: {}", id, first_line(&error)));
                }
                RunnerEvent::BatchFinished if self.settings.clear_finished_on_batch_end => {
                    let removed = lock_queue(self.runner.queue()).clear_done();
                    log::info!("Removed {} converted item(s) from the queue", removed);
                }
                _ => {}
            }
        }
    }

    /// Show the panel contents.
    pub fn show(&mut self, ui: &mut egui::Ui) {
        self.handle_events();

        self.show_toolbar(ui);
        ui.separator();

        self.show_settings(ui);
        ui.separator();

        self.show_controls(ui);
        ui.separator();

        self.show_notices(ui);
        self.show_file_list(ui);

        if self.runner.is_running() || self.runner.is_probing() {
            ui.ctx().request_repaint_after(std::time::Duration::from_millis(100));
        }
    }

    /// Show toolbar with add/clear buttons.
    fn show_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("➕ Add Files").clicked() {
                self.open_file_dialog();
            }

            if ui.button("📂 Add Folder").clicked() {
                self.open_input_folder_dialog();
            }

            if ui.button("📁 Set Output Folder").clicked() {
                self.open_output_folder_dialog();
            }

            ui.separator();

            if ui.button("🗑 Clear All").clicked() {
                lock_queue(self.runner.queue()).clear_idle();
            }

            if ui.button("Clear Finished").clicked() {
                lock_queue(self.runner.queue()).clear_finished();
            }
        });

        // Show output directory
        ui.horizontal(|ui| {
            ui.label("Output:");
            let path_str = lock_queue(self.runner.queue()).output_dir().display().to_string();
            ui.label(RichText::new(truncate_start(&path_str, 60)).monospace().small());
        });
    }

    /// Show target and quality selection.
    fn show_settings(&mut self, ui: &mut egui::Ui) {
        let previous = (self.selected_profile, self.selected_quality);

        ui.horizontal(|ui| {
            ui.label("Format:");
            egui::ComboBox::from_id_source("target_profile")
                .selected_text(self.selected_profile.display_name())
                .show_ui(ui, |ui| {
                    for profile in TargetProfile::all() {
                        ui.selectable_value(
                            &mut self.selected_profile,
                            *profile,
                            profile.display_name(),
                        );
                    }
                });
            ui.label(
                RichText::new(self.selected_profile.description())
                    .italics()
                    .color(Color32::GRAY),
            );
        });

        ui.horizontal(|ui| {
            ui.label("Quality:");
            for quality in QualityLevel::all() {
                ui.radio_value(&mut self.selected_quality, *quality, quality.display_name())
                    .on_hover_text(quality.description());
            }

            ui.separator();

            if ui
                .button("Apply to pending")
                .on_hover_text("Use this format and quality for every pending file")
                .clicked()
            {
                let count = lock_queue(self.runner.queue()).apply_defaults_to_pending();
                log::info!("Re-targeted {} pending item(s)", count);
            }
        });

        if previous != (self.selected_profile, self.selected_quality) {
            let result = lock_queue(self.runner.queue()).set_defaults(
                self.selected_profile.format(),
                self.selected_profile.codec(),
                self.selected_quality,
            );
            if let Err(e) = result {
                self.notice(e);
            }
        }
    }

    /// Show overall progress and control buttons.
    fn show_controls(&mut self, ui: &mut egui::Ui) {
        let (stats, overall, active) = {
            let queue = lock_queue(self.runner.queue());
            let active = queue
                .list()
                .into_iter()
                .find(|item| item.status.is_running());
            (queue.stats(), queue.overall_progress(), active)
        };
        let is_running = self.runner.is_running();

        ui.horizontal(|ui| {
            ui.label(format!("Progress: {}/{} files done", stats.done, stats.total));
            if stats.pending > 0 {
                ui.label(RichText::new(format!("({} pending)", stats.pending)).color(Color32::GRAY));
            }
            if stats.failed > 0 {
                ui.label(RichText::new(format!("{} failed", stats.failed)).color(Color32::RED));
            }
        });

        if let Some(item) = &active {
            ui.horizontal(|ui| {
                ui.label("Converting:");
                ui.label(RichText::new(item.file_name()).strong());
                if let JobStatus::Running { started_at, .. } = &item.status {
                    if let Some(eta) = eta_seconds(started_at.elapsed().as_secs_f64(), item.progress_percent) {
                        ui.label(format!("ETA: {}", format_clock(eta)));
                    }
                }
            });
        }

        ui.add(
            egui::ProgressBar::new(overall)
                .show_percentage()
                .animate(is_running),
        );

        ui.add_space(4.0);

        ui.horizontal(|ui| {
            let can_start = !is_running && stats.pending > 0;
            if ui
                .add_enabled(can_start, egui::Button::new("▶ Start Conversion"))
                .clicked()
            {
                self.runner.start_batch();
            }

            if ui
                .add_enabled(is_running, egui::Button::new("⏹ Stop"))
                .clicked()
            {
                self.runner.stop();
            }
        });
    }

    fn show_notices(&mut self, ui: &mut egui::Ui) {
        if self.notices.is_empty() {
            return;
        }
        let mut dismiss = false;
        ui.horizontal(|ui| {
            ui.label(RichText::new("⚠").color(Color32::YELLOW));
            ui.vertical(|ui| {
                for notice in &self.notices {
                    ui.label(RichText::new(notice).color(Color32::YELLOW).small());
                }
            });
            if ui.small_button("Dismiss").clicked() {
                dismiss = true;
            }
        });
        if dismiss {
            self.notices.clear();
        }
        ui.separator();
    }

    /// Show the file list.
    fn show_file_list(&mut self, ui: &mut egui::Ui) {
        let items = lock_queue(self.runner.queue()).list();
        let mut actions = Vec::new();

        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                if items.is_empty() {
                    ui.centered_and_justified(|ui| {
                        ui.label(
                            RichText::new("Drop video files or folders here, or click Add Files")
                                .italics()
                                .color(Color32::GRAY),
                        );
                    });
                    return;
                }

                egui::Grid::new("queue_grid")
                    .num_columns(5)
                    .striped(true)
                    .spacing([16.0, 6.0])
                    .show(ui, |ui| {
                        ui.label(RichText::new("File").strong());
                        ui.label(RichText::new("Source").strong());
                        ui.label(RichText::new("Target").strong());
                        ui.label(RichText::new("Status").strong());
                        ui.label("");
                        ui.end_row();

                        for item in &items {
                            if let Some(action) = Self::show_item_row(ui, item) {
                                actions.push(action);
                            }
                            ui.end_row();
                        }
                    });
            });

        for action in actions {
            self.apply_row_action(action);
        }

        self.handle_dropped_files(ui);
    }

    /// Show a single queue row; returns the button the user pressed.
    fn show_item_row(ui: &mut egui::Ui, item: &QueueItem) -> Option<RowAction> {
        let mut action = None;

        ui.label(truncate_end(&item.file_name(), 35))
            .on_hover_text(item.source_path.display().to_string());

        ui.label(
            RichText::new(format!("{}  {}", item.resolution_string(), item.duration_string()))
                .monospace()
                .small(),
        );

        let target = TargetProfile::from_pair(item.target_format, item.target_codec)
            .map(|p| p.display_name())
            .unwrap_or("?");
        ui.label(RichText::new(format!("{} · {}", target, item.quality_level)).small());

        match &item.status {
            JobStatus::Running { speed, .. } => {
                ui.horizontal(|ui| {
                    let bar = egui::ProgressBar::new(item.progress_percent / 100.0).show_percentage();
                    ui.add_sized(Vec2::new(140.0, 14.0), bar);
                    if let Some(speed) = speed {
                        ui.label(RichText::new(speed).small());
                    }
                });
            }
            JobStatus::Failed { error } => {
                ui.label(RichText::new("Failed ✗").color(Color32::RED))
                    .on_hover_text(error.as_str());
            }
            JobStatus::Done { elapsed, output_size } => {
                ui.label(RichText::new("Done ✓").color(Color32::GREEN)).on_hover_text(format!(
                    "{} in {:.1}s",
                    format_size(*output_size),
                    elapsed.as_secs_f64()
                ));
            }
            JobStatus::Pending => {
                ui.label(RichText::new(item.status.label()).color(Color32::GRAY));
            }
            JobStatus::Cancelled => {
                ui.label(RichText::new(item.status.label()).color(Color32::YELLOW));
            }
        }

        ui.horizontal(|ui| {
            if item.status.is_running() || item.status.is_pending() {
                if ui.small_button("⏹").on_hover_text("Cancel").clicked() {
                    action = Some(RowAction::Cancel(item.id));
                }
            }
            if item.status.is_pending() && ui.small_button("▶").on_hover_text("Convert now").clicked() {
                action = Some(RowAction::Start(item.id));
            }
            if !item.status.is_running() && ui.small_button("✕").on_hover_text("Remove").clicked() {
                action = Some(RowAction::Remove(item.id));
            }
        });

        action
    }

    fn apply_row_action(&mut self, action: RowAction) {
        let result: Result<(), ConverterError> = match action {
            RowAction::Cancel(id) => self.runner.cancel(id),
            RowAction::Start(id) => {
                self.runner.start(id);
                Ok(())
            }
            RowAction::Remove(id) => lock_queue(self.runner.queue()).remove(id).map(|_| ()),
        };
        if let Err(e) = result {
            self.notice(e);
        }
    }

    /// Handle dropped files and folders.
    fn handle_dropped_files(&mut self, ui: &mut egui::Ui) {
        let dropped: Vec<PathBuf> = ui.ctx().input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|f| f.path.clone())
                .collect()
        });

        if !dropped.is_empty() {
            self.add_files(dropped);
        }

        // Visual feedback for drag
        let is_dragging = ui.ctx().input(|i| !i.raw.hovered_files.is_empty());
        if is_dragging {
            let rect = ui.max_rect();
            ui.painter().rect_stroke(
                rect,
                4.0,
                egui::Stroke::new(2.0, Color32::from_rgb(100, 200, 255)),
            );
        }
    }

    /// Open file dialog to add files.
    fn open_file_dialog(&mut self) {
        if let Some(paths) = rfd::FileDialog::new()
            .add_filter("Video Files", supported_input_extensions())
            .add_filter("All Files", &["*"])
            .pick_files()
        {
            self.add_files(paths);
        }
    }

    /// Open folder dialog to add a folder of videos.
    fn open_input_folder_dialog(&mut self) {
        if let Some(dir) = rfd::FileDialog::new()
            .set_title("Select input folder")
            .pick_folder()
        {
            self.add_folder(dir);
        }
    }

    /// Open folder dialog to set output directory.
    fn open_output_folder_dialog(&mut self) {
        if let Some(dir) = rfd::FileDialog::new()
            .set_title("Select output folder")
            .pick_folder()
        {
            lock_queue(self.runner.queue()).set_output_dir(dir);
        }
    }
}

/// Buttons in a queue row.
#[derive(Debug, Clone, Copy)]
enum RowAction {
    Cancel(JobId),
    Start(JobId),
    Remove(JobId),
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text)
}

fn truncate_end(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn truncate_start(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().skip(count - max_chars.saturating_sub(3)).collect();
    format!("...{}", kept)
}

/// Remaining seconds given elapsed time and percent complete.
fn eta_seconds(elapsed: f64, percent: f32) -> Option<f64> {
    if percent <= 0.0 || percent >= 100.0 {
        return None;
    }
    let total = elapsed / (percent as f64 / 100.0);
    Some((total - elapsed).max(0.0))
}

fn format_clock(seconds: f64) -> String {
    let secs = seconds.round() as u64;
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn format_size(bytes: u64) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    if bytes as f64 >= 1024.0 * MB {
        format!("{:.2} GB", bytes as f64 / (1024.0 * MB))
    } else {
        format!("{:.1} MB", bytes as f64 / MB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_is_char_safe() {
        assert_eq!(truncate_end("short.mp4", 35), "short.mp4");
        assert_eq!(truncate_end("ünïcödé_fïlé_nåmé.mkv", 10), "ünïcödé...");
        assert_eq!(truncate_start("/home/user/Videos/out", 10), "...eos/out");
        assert_eq!(truncate_start("0123456789", 10), "0123456789");
        assert_eq!(truncate_start("0123456789A", 10), "...456789A");
        assert_eq!(truncate_end("0123456789", 10), "0123456789");
        assert_eq!(truncate_end("0123456789A", 10), "0123456...");
    }

    #[test]
    fn test_eta() {
        assert_eq!(eta_seconds(10.0, 0.0), None);
        assert_eq!(eta_seconds(10.0, 50.0), Some(10.0));
        assert_eq!(format_clock(125.4), "2:05");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
