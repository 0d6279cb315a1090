use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config as cfg;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

/// How content moves between two artifacts of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SameKindPolicy {
    /// Target is replaced with the source content.
    LastWriterWins,
    /// Target is left untouched.
    Passthrough,
}

impl Default for SameKindPolicy {
    fn default() -> Self {
        Self::LastWriterWins
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncConfig {
    /// Upper bound for a single content read or write.
    #[serde(default = "SyncConfig::default_edge_timeout_ms")]
    pub edge_timeout_ms: u64,
    /// Interval used before the first cycle has measured graph health.
    #[serde(default = "SyncConfig::default_initial_interval_secs")]
    pub initial_interval_secs: u64,
    #[serde(default = "SyncConfig::default_poor_health_threshold")]
    pub poor_health_threshold: f64,
    #[serde(default = "SyncConfig::default_moderate_health_threshold")]
    pub moderate_health_threshold: f64,
    #[serde(default = "SyncConfig::default_poor_interval_secs")]
    pub poor_interval_secs: u64,
    #[serde(default = "SyncConfig::default_moderate_interval_secs")]
    pub moderate_interval_secs: u64,
    #[serde(default = "SyncConfig::default_healthy_interval_secs")]
    pub healthy_interval_secs: u64,
    #[serde(default)]
    pub same_kind_policy: SameKindPolicy,
}

impl SyncConfig {
    fn default_edge_timeout_ms() -> u64 {
        10_000
    }

    fn default_initial_interval_secs() -> u64 {
        30 * 60
    }

    fn default_poor_health_threshold() -> f64 {
        0.5
    }

    fn default_moderate_health_threshold() -> f64 {
        0.8
    }

    fn default_poor_interval_secs() -> u64 {
        5 * 60
    }

    fn default_moderate_interval_secs() -> u64 {
        15 * 60
    }

    fn default_healthy_interval_secs() -> u64 {
        30 * 60
    }

    pub fn edge_timeout(&self) -> Duration {
        Duration::from_millis(self.edge_timeout_ms)
    }

    pub fn initial_interval(&self) -> Duration {
        Duration::from_secs(self.initial_interval_secs)
    }

    /// Next cycle interval for a given mean network health.
    pub fn interval_for_health(&self, mean_health: f64) -> Duration {
        let secs = if mean_health < self.poor_health_threshold {
            self.poor_interval_secs
        } else if mean_health < self.moderate_health_threshold {
            self.moderate_interval_secs
        } else {
            self.healthy_interval_secs
        };
        Duration::from_secs(secs)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.edge_timeout_ms > 0, "sync.edge_timeout_ms must be > 0");
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.poor_health_threshold)
                && (0.0..=1.0).contains(&self.moderate_health_threshold),
            "sync health thresholds must be within 0..=1"
        );
        anyhow::ensure!(
            self.poor_health_threshold <= self.moderate_health_threshold,
            "sync.poor_health_threshold must not exceed sync.moderate_health_threshold"
        );
        anyhow::ensure!(
            self.poor_interval_secs > 0
                && self.moderate_interval_secs > 0
                && self.healthy_interval_secs > 0
                && self.initial_interval_secs > 0,
            "sync intervals must be > 0"
        );
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            edge_timeout_ms: Self::default_edge_timeout_ms(),
            initial_interval_secs: Self::default_initial_interval_secs(),
            poor_health_threshold: Self::default_poor_health_threshold(),
            moderate_health_threshold: Self::default_moderate_health_threshold(),
            poor_interval_secs: Self::default_poor_interval_secs(),
            moderate_interval_secs: Self::default_moderate_interval_secs(),
            healthy_interval_secs: Self::default_healthy_interval_secs(),
            same_kind_policy: SameKindPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Settings {
    #[serde(default = "Settings::default_env")]
    pub env: String,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: Self::default_env(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    fn default_env() -> String {
        env::var("APP_ENV")
            .ok()
            .or_else(|| env::var("RUST_ENV").ok())
            .unwrap_or_else(|| "development".to_string())
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.logging.level.trim().is_empty(),
            "logging.level cannot be empty"
        );
        self.sync.validate()
    }
}

#[derive(Debug)]
pub struct ConfigManager {
    settings: Settings,
    config_dir: PathBuf,
    env: String,
}

impl ConfigManager {
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn load(config_dir: Option<PathBuf>, env_override: Option<String>) -> Result<Self> {
        let env_name = env_override.unwrap_or_else(Settings::default_env);
        let config_dir = config_dir.unwrap_or_else(Self::default_config_dir);
        let settings = Self::load_from_sources(&config_dir, &env_name)?;
        settings.validate()?;
        Ok(Self {
            settings,
            config_dir,
            env: env_name,
        })
    }

    /// Get the default configuration directory.
    ///
    /// Priority order:
    /// 1. ~/.mycelium/ (user-level config)
    /// 2. ./config/ (project-level config)
    /// 3. Current directory (fallback)
    pub fn default_config_dir() -> PathBuf {
        if let Some(home_dir) = dirs::home_dir() {
            let user_dir = home_dir.join(".mycelium");
            if user_dir.exists() {
                info!("Using config directory: {:?}", user_dir);
                return user_dir;
            }
        }

        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let project_config = cwd.join("config");
        if project_config.exists() {
            info!("Using config directory: {:?}", project_config);
            return project_config;
        }

        info!("Using config directory: {:?}", cwd);
        cwd
    }

    pub fn load_from_sources(config_dir: &Path, env_name: &str) -> Result<Settings> {
        let settings: Settings = cfg::Config::builder()
            .add_source(cfg::File::from(config_dir.join("default.toml")).required(false))
            .add_source(cfg::File::from(config_dir.join("default.yaml")).required(false))
            .add_source(cfg::File::from(config_dir.join("default.json")).required(false))
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.toml", env_name))).required(false),
            )
            .add_source(cfg::File::from(config_dir.join("local.toml")).required(false))
            .add_source(cfg::Environment::with_prefix("MYCELIUM").separator("__"))
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn interval_follows_health_bands() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.interval_for_health(0.2), Duration::from_secs(300));
        assert_eq!(cfg.interval_for_health(0.5), Duration::from_secs(900));
        assert_eq!(cfg.interval_for_health(0.73), Duration::from_secs(900));
        assert_eq!(cfg.interval_for_health(0.8), Duration::from_secs(1800));
        assert_eq!(cfg.interval_for_health(1.0), Duration::from_secs(1800));
    }

    #[test]
    fn files_layer_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[sync]\nedge_timeout_ms = 250\nsame_kind_policy = \"passthrough\"\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("staging.toml"),
            "[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let settings = ConfigManager::load_from_sources(dir.path(), "staging").unwrap();
        assert_eq!(settings.sync.edge_timeout_ms, 250);
        assert_eq!(settings.sync.same_kind_policy, SameKindPolicy::Passthrough);
        assert_eq!(settings.sync.healthy_interval_secs, 1800);
        assert_eq!(settings.logging.level, "debug");
        settings.validate().unwrap();
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let mut cfg = SyncConfig::default();
        cfg.poor_health_threshold = 0.9;
        assert!(cfg.validate().is_err());
    }
}
