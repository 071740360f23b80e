//! CLI argument definitions for the Beacon application.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use beacon_core::types::{Coordinates, Locale};
use beacon_core::{BeaconConfig, BeaconError};

/// Beacon: a text and voice emergency assistant in your terminal.
#[derive(Parser, Debug)]
#[command(name = "beacon", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Directory holding the conversation database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Conversation language, e.g. `en`, `es`, `pt-BR`.
    #[arg(long = "locale")]
    pub locale: Option<String>,

    /// Local profile whose conversation is loaded and extended.
    #[arg(short = 'p', long = "profile")]
    pub profile: Option<String>,

    /// Base URL of the OpenAI-compatible dialogue backend.
    #[arg(long = "backend-url")]
    pub backend_url: Option<String>,

    /// Model name sent to the backend.
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Fixed latitude reported when sharing location.
    #[arg(long = "lat", allow_negative_numbers = true, requires = "lon")]
    pub lat: Option<f64>,

    /// Fixed longitude reported when sharing location.
    #[arg(long = "lon", allow_negative_numbers = true, requires = "lat")]
    pub lon: Option<f64>,

    /// Keep the conversation in memory only.
    #[arg(long = "in-memory")]
    pub in_memory: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > BEACON_CONFIG env var > ~/.beacon/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("BEACON_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Fold command-line overrides into the loaded configuration.
    pub fn apply_overrides(&self, config: &mut BeaconConfig) -> Result<(), BeaconError> {
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(ref profile) = self.profile {
            if profile.trim().is_empty() {
                return Err(BeaconError::Config("profile must not be empty".to_string()));
            }
            config.general.profile = profile.clone();
        }
        if let Some(ref url) = self.backend_url {
            config.backend.base_url = url.clone();
        }
        if let Some(ref model) = self.model {
            config.backend.model = model.clone();
        }
        if let (Some(lat), Some(lon)) = (self.lat, self.lon) {
            Coordinates::new(lat, lon)?;
            config.location.enabled = true;
            config.location.latitude = Some(lat);
            config.location.longitude = Some(lon);
        }
        config.validate()
    }

    /// Priority: --locale flag > config default locale.
    pub fn resolve_locale(&self, config: &BeaconConfig) -> Result<Locale, BeaconError> {
        match self.locale {
            Some(ref code) => Locale::new(code.as_str()),
            None => Locale::new(config.assistant.default_locale.as_str()),
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".beacon").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".beacon").join("config.toml");
    }
    PathBuf::from("config.toml")
}

/// Expand a leading `~` to the home directory.
pub fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}
