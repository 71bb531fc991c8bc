pub mod config;
pub mod corrections;
pub mod decode;
pub mod error;
pub mod format;
pub mod lyrics;
pub mod models;
pub mod spectrum;
pub mod store;
pub mod tui;
pub mod waveform;
