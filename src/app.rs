//! Main application state and UI
//!
//! Locates FFmpeg on startup and hosts the converter panel. When FFmpeg
//! cannot be found, or the converter cannot start, the window only shows the
//! error and a quit button.

use std::ffi::OsString;

use eframe::egui::{self, Color32, RichText};

use crate::converter::{ConverterError, FfmpegTool};
use crate::settings::ConverterSettings;
use crate::ui::ConverterPanel;

/// Main application state
pub struct TvConverterApp {
    panel: Option<ConverterPanel>,
    startup_error: Option<ConverterError>,
}

impl TvConverterApp {
    /// Create a new application instance
    pub fn new(_cc: &eframe::CreationContext<'_>, settings: ConverterSettings) -> Self {
        log::info!("Initializing TV Converter...");
        Self::startup(settings, std::env::var_os("PATH"))
    }

    /// Locate FFmpeg in `search_path` and build the converter panel.
    pub fn startup(settings: ConverterSettings, search_path: Option<OsString>) -> Self {
        let panel = FfmpegTool::locate_in(settings.ffmpeg_path.as_deref(), search_path)
            .and_then(|tool| ConverterPanel::new(tool, settings));
        match panel {
            Ok(panel) => Self {
                panel: Some(panel),
                startup_error: None,
            },
            Err(e) => Self::failed(e),
        }
    }

    fn failed(error: ConverterError) -> Self {
        log::error!("Cannot start converter: {}", error);
        Self {
            panel: None,
            startup_error: Some(error),
        }
    }

    /// Error that prevented the converter from starting.
    pub fn startup_error(&self) -> Option<&ConverterError> {
        self.startup_error.as_ref()
    }

    /// Whether FFmpeg was found and conversions can run.
    pub fn is_ready(&self) -> bool {
        self.panel.is_some()
    }

    fn show_fatal(ctx: &egui::Context, error: &ConverterError) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() / 3.0);
                let (title, hint) = match error {
                    ConverterError::ExternalToolMissing { .. } => (
                        "⚠ FFmpeg is required",
                        "Install FFmpeg and make sure it is on your PATH, then restart.",
                    ),
                    _ => ("⚠ Converter could not start", "Restart the application to try again."),
                };
                ui.label(RichText::new(title).heading().color(Color32::RED));
                ui.add_space(8.0);
                ui.label(error.to_string());
                ui.label(RichText::new(hint).color(Color32::GRAY));
                ui.add_space(16.0);
                if ui.button("Quit").clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });
        });
    }
}

impl eframe::App for TvConverterApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let Some(panel) = self.panel.as_mut() else {
            if let Some(error) = &self.startup_error {
                Self::show_fatal(ctx, error);
            }
            return;
        };

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let label = if panel.runner().is_running() {
                    "Converting..."
                } else {
                    "Ready"
                };
                ui.label(RichText::new(label).small());
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("TV Video Converter");
            ui.add_space(4.0);
            panel.show(ui);
        });
    }
}
