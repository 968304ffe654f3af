//! TV Converter - converts videos to TV-friendly formats
//!
//! Main entry point for the application.

use tv_converter::{ConverterSettings, TvConverterApp};

fn main() -> eframe::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("Starting TV Converter v{}", env!("CARGO_PKG_VERSION"));

    let settings = ConverterSettings::load();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 640.0])
            .with_min_inner_size([640.0, 420.0])
            .with_title("TV Converter")
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "TV Converter",
        native_options,
        Box::new(|cc| Box::new(TvConverterApp::new(cc, settings))),
    )
}
