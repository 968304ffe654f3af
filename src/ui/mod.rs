//! UI components for the converter window.

pub mod converter_panel;

pub use converter_panel::ConverterPanel;
