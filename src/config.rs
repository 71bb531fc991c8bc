//! Editor settings.
//!
//! Stored as YAML in the user's config directory.
//! Default location: ~/.config/kaiedit/settings.yaml

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::spectrum::{AnalyzerConfig, DEFAULT_BLOCK_SIZE};
use crate::waveform::DEFAULT_SAMPLE_COUNT;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Run vocal analysis when songs are created or reprocessed
    pub analyze_vocals: bool,
    pub waveform: WaveformSettings,
    pub analyzer: AnalyzerSettings,
    pub audio: AudioSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformSettings {
    /// Envelope buckets per song, independent of display width
    pub sample_count: usize,
}

impl Default for WaveformSettings {
    fn default() -> Self {
        Self {
            sample_count: DEFAULT_SAMPLE_COUNT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    pub fft_size: usize,
    pub analysis_interval: u32,
    /// Frames per callback when feeding decoded audio
    pub block_size: usize,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        let analyzer = AnalyzerConfig::default();
        Self {
            fft_size: analyzer.fft_size,
            analysis_interval: analyzer.analysis_interval,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl AnalyzerSettings {
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            fft_size: self.fft_size,
            analysis_interval: self.analysis_interval,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Preferred output device name; `None` follows the system default
    pub output_device: Option<String>,
}

/// Returns: ~/.config/kaiedit/settings.yaml
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("kaiedit")
        .join("settings.yaml")
}

/// Load settings from a YAML file.
///
/// A missing file gives the defaults. An unreadable or invalid file logs a
/// warning and also gives the defaults.
pub fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        log::debug!("load_settings: {} not found, using defaults", path.display());
        return Settings::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Settings>(&contents) {
            Ok(settings) => {
                log::debug!(
                    "load_settings: analyze_vocals={}, sample_count={}, fft_size={}",
                    settings.analyze_vocals,
                    settings.waveform.sample_count,
                    settings.analyzer.fft_size
                );
                settings
            }
            Err(e) => {
                log::warn!("load_settings: failed to parse {}: {}, using defaults", path.display(), e);
                Settings::default()
            }
        },
        Err(e) => {
            log::warn!("load_settings: failed to read {}: {}, using defaults", path.display(), e);
            Settings::default()
        }
    }
}

/// Save settings as YAML, creating parent directories as needed.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory: {}", parent.display()))?;
    }

    let yaml = serde_yaml::to_string(settings).context("Failed to serialize settings to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write settings file: {}", path.display()))?;

    log::info!("save_settings: saved {}", path.display());
    Ok(())
}
