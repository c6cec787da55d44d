//! Configuration loading for aisdb.
//!
//! Layered sources, later wins:
//! - built-in defaults
//! - `~/.aisdb/config.yaml` (or an explicit path)
//! - `AISDB__SECTION__KEY` environment variables

use std::path::{Path, PathBuf};

use config::{Environment, File};
use serde::Deserialize;

use crate::assembler::AssemblerConfig;
use crate::pathways::PathwayParams;
use crate::processor::ProcessingOptions;
use crate::types::{AisError, Result};

/// Full configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub zones: ZonesConfig,
    pub decoder: DecoderConfig,
    pub assembler: AssemblerSettings,
    pub processing: ProcessingOptions,
    pub pathways: PathwayParams,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: "data/ais.db".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Result messages a client may have unacknowledged; 0 disables.
    pub ack_window: usize,
    /// Outbound frames buffered per session.
    pub outbound_buffer: usize,
    pub ack_timeout_secs: u64,
    /// Cap on a query's time span; `None` removes it.
    pub max_query_days: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 9924,
            ack_window: 0,
            outbound_buffer: 64,
            ack_timeout_secs: 60,
            max_query_days: Some(31),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ZonesConfig {
    /// Directory of `.txt` zone polygons.
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Sentences a partial multi-sentence message may wait for the rest.
    pub fragment_window: u64,
    pub fragment_capacity: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            fragment_window: 16,
            fragment_capacity: 64,
        }
    }
}

/// Noise handling applied to assembled tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Denoise {
    /// Drop points implying impossible speed.
    #[default]
    Teleport,
    /// Separate interleaved vessels sharing one MMSI.
    Pathways,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssemblerSettings {
    pub max_speed_knots: Option<f64>,
    pub denoise: Denoise,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        AssemblerSettings {
            max_speed_knots: AssemblerConfig::default().max_speed_knots,
            denoise: Denoise::Teleport,
        }
    }
}

impl AssemblerSettings {
    /// Assembler parameters for the selected mode. Teleport rejection is
    /// off unless the mode asks for it.
    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig {
            max_speed_knots: match self.denoise {
                Denoise::Teleport => self.max_speed_knots,
                Denoise::Pathways | Denoise::None => None,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Rows fetched from storage between cancellation checks.
    pub batch_size: usize,
    /// Skip MMSIs outside the ship range (base stations, AtoN, SART).
    pub valid_mmsi_only: bool,
    pub heatmap_step_secs: i64,
    pub heatmap_split_secs: i64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            batch_size: 10_000,
            valid_mmsi_only: false,
            heatmap_step_secs: 3600,
            heatmap_split_secs: 12 * 3600,
        }
    }
}

impl QueryConfig {
    /// Processing options for heatmap queries: shorter split gap, fixed
    /// resampling, no simplification.
    pub fn heatmap_options(&self, base: &ProcessingOptions) -> ProcessingOptions {
        let max_time_gap_secs = self.heatmap_split_secs;
        ProcessingOptions {
            max_time_gap_secs,
            merge_time_gap_secs: base.merge_time_gap_secs.min(max_time_gap_secs - 1),
            interpolate_secs: Some(self.heatmap_step_secs),
            simplify: false,
            ..base.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Get the config directory path (`~/.aisdb/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".aisdb")
}

/// Get the default config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

impl Config {
    /// Load and validate configuration.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// As [`Config::load`], reading `AISDB__*` overrides from `env` instead
    /// of the process environment when given.
    pub fn load_with_env(path: Option<&Path>, env: Option<config::Map<String, String>>) -> Result<Self> {
        let file = path.map(Path::to_path_buf).unwrap_or_else(config_file);
        let settings = config::Config::builder()
            .add_source(File::from(file).required(path.is_some()))
            .add_source(
                Environment::with_prefix("AISDB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.processing.validate()?;
        let invalid = |msg: &str| Err(AisError::InvalidConfig(msg.to_string()));
        if self.database.path.is_empty() {
            return invalid("database.path cannot be empty");
        }
        if self.server.outbound_buffer == 0 {
            return invalid("server.outbound_buffer must be greater than zero");
        }
        if self.decoder.fragment_window == 0 || self.decoder.fragment_capacity == 0 {
            return invalid("decoder fragment window and capacity must be greater than zero");
        }
        if self.query.batch_size == 0 {
            return invalid("query.batch_size must be greater than zero");
        }
        if self.query.heatmap_step_secs <= 0 || self.query.heatmap_split_secs <= 1 {
            return invalid("query heatmap step and split must be positive");
        }
        if self.pathways.distance_threshold_m <= 0.0 || self.pathways.speed_threshold_knots <= 0.0 {
            return invalid("pathway thresholds must be positive");
        }
        self.query
            .heatmap_options(&self.processing)
            .validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 9924);
        assert_eq!(config.database.path, "data/ais.db");
        assert_eq!(config.server.max_query_days, Some(31));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "server:\n  port: 8000\n  ack_window: 4\nassembler:\n  denoise: pathways\nzones:\n  dir: /srv/zones\n",
        )
        .unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.ack_window, 4);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.assembler.denoise, Denoise::Pathways);
        assert_eq!(config.zones.dir.as_deref(), Some("/srv/zones"));
    }

    #[test]
    fn test_load_rejects_inverted_hysteresis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "processing:\n  merge_time_gap_secs: 200000\n").unwrap();
        assert!(matches!(Config::load(Some(&path)), Err(AisError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    #[test]
    fn test_env_override() {
        // Injected map: the process environment is shared across parallel tests.
        let mut env = config::Map::new();
        env.insert("AISDB__QUERY__HEATMAP_STEP_SECS".to_string(), "900".to_string());
        env.insert("AISDB__SERVER__PORT".to_string(), "9100".to_string());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "query:\n  valid_mmsi_only: true\nserver:\n  port: 8000\n").unwrap();
        let config = Config::load_with_env(Some(&path), Some(env)).unwrap();
        assert_eq!(config.query.heatmap_step_secs, 900);
        assert_eq!(config.server.port, 9100);
        assert!(config.query.valid_mmsi_only);
    }

    #[test]
    fn test_empty_env_map_ignores_process_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  port: 8000\n").unwrap();
        let config = Config::load_with_env(Some(&path), Some(config::Map::new())).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.query.heatmap_step_secs, QueryConfig::default().heatmap_step_secs);
    }

    #[test]
    fn test_denoise_modes() {
        let mut settings = AssemblerSettings::default();
        assert_eq!(settings.assembler_config().max_speed_knots, Some(50.0));
        settings.denoise = Denoise::Pathways;
        assert_eq!(settings.assembler_config().max_speed_knots, None);
    }

    #[test]
    fn test_heatmap_options() {
        let query = QueryConfig::default();
        let opts = query.heatmap_options(&ProcessingOptions::default());
        assert_eq!(opts.max_time_gap_secs, 12 * 3600);
        assert_eq!(opts.interpolate_secs, Some(3600));
        assert!(!opts.simplify);
        assert!(opts.validate().is_ok());
    }
}
