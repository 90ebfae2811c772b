//! Configuration for the migration pipeline
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (project-migration.toml)
//! - Environment variables (PROJECT_MIGRATION__*)
//!
//! ## Example config file (project-migration.toml):
//! ```toml
//! [migration]
//! development_version = "999.999.999"
//! force_latest_on_development = true
//!
//! [defaults]
//! legacy_engine_id = "074fc39e-678b-4c13-8916-ffca8d505d1d"
//! track_name = "無名トラック"
//! output_sampling_rate = 44100
//! tpqn = 480
//! bpm = 120.0
//! beats = 4
//! beat_type = 4
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::version::ProjectVersion;

/// Main configuration for project migration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigrationConfig {
    /// Pipeline behaviour
    #[serde(default)]
    pub migration: PipelineConfig,

    /// Values written into documents by migration steps
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// Pipeline behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// `appVersion` written by development builds
    #[serde(default = "default_development_version")]
    pub development_version: String,

    /// Run the newest step for documents carrying `development_version`
    #[serde(default = "default_true")]
    pub force_latest_on_development: bool,
}

/// Values written into documents by migration steps
///
/// These are pinned to what the application used when each step was
/// introduced, not to whatever the application uses today.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Engine assumed for files written before multi-engine support
    #[serde(default = "default_legacy_engine_id")]
    pub legacy_engine_id: String,

    /// Name given to tracks that predate track names
    #[serde(default = "default_track_name")]
    pub track_name: String,

    /// Sampling rate assigned to queries that predate the field
    #[serde(default = "default_output_sampling_rate")]
    pub output_sampling_rate: u32,

    /// Ticks per quarter note of a synthesised song section
    #[serde(default = "default_tpqn")]
    pub tpqn: u32,

    #[serde(default = "default_bpm")]
    pub bpm: f64,

    #[serde(default = "default_beats")]
    pub beats: u32,

    #[serde(default = "default_beat_type")]
    pub beat_type: u32,
}

// Default value functions
fn default_development_version() -> String {
    "999.999.999".to_string()
}

fn default_true() -> bool {
    true
}

fn default_legacy_engine_id() -> String {
    "074fc39e-678b-4c13-8916-ffca8d505d1d".to_string()
}

fn default_track_name() -> String {
    "無名トラック".to_string()
}

fn default_output_sampling_rate() -> u32 {
    44100
}

fn default_tpqn() -> u32 {
    480
}

fn default_bpm() -> f64 {
    120.0
}

fn default_beats() -> u32 {
    4
}

fn default_beat_type() -> u32 {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            development_version: default_development_version(),
            force_latest_on_development: true,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            legacy_engine_id: default_legacy_engine_id(),
            track_name: default_track_name(),
            output_sampling_rate: default_output_sampling_rate(),
            tpqn: default_tpqn(),
            bpm: default_bpm(),
            beats: default_beats(),
            beat_type: default_beat_type(),
        }
    }
}

impl MigrationConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "project-migration.toml",
            ".project-migration.toml",
            "config/project-migration.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "project-migration") {
            let xdg_config = config_dir.config_dir().join("project-migration.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // PROJECT_MIGRATION__DEFAULTS__TPQN=960
        builder = builder.add_source(
            Environment::with_prefix("PROJECT_MIGRATION")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Whether a document's `appVersion` forces the newest step
    pub fn forces_latest(&self, version: &ProjectVersion) -> bool {
        self.migration.force_latest_on_development && version.is_sentinel(&self.migration.development_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(raw: &str) -> ProjectVersion {
        ProjectVersion::parse(raw).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = MigrationConfig::default();
        assert!(config.migration.force_latest_on_development);
        assert_eq!(config.defaults.tpqn, 480);
        assert!(config.forces_latest(&version("999.999.999")));
        assert!(!config.forces_latest(&version("1.1.0")));
    }

    #[test]
    fn test_serialize_config() {
        let config = MigrationConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[migration]"));
        assert!(toml_str.contains("[defaults]"));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[migration]\nforce_latest_on_development = false\n\n[defaults]\ntrack_name = \"Track 1\"\n",
        )
        .unwrap();

        let config = MigrationConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert!(!config.migration.force_latest_on_development);
        assert_eq!(config.defaults.track_name, "Track 1");
        assert_eq!(config.defaults.output_sampling_rate, 44100);
        assert!(!config.forces_latest(&version("999.999.999")));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = MigrationConfig::default();
        config.defaults.tpqn = 960;
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = MigrationConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(loaded.defaults.tpqn, 960);
    }
}
