use std::path::Path;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::{CollabError, Result};

/// Engine tuning, loaded from YAML and overridden by CLI flags/env.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Quiet period that closes a batch
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Heartbeat silence after which a collaborator is dropped
    #[serde(default = "default_presence_timeout_secs")]
    pub presence_timeout_secs: u64,

    /// How often the driver sweeps stale presence
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Undo history bound, 0 for unbounded
    #[serde(default = "default_max_undo_depth")]
    pub max_undo_depth: usize,

    /// Characters kept in batch previews
    #[serde(default = "default_preview_length")]
    pub preview_length: usize,
}

const MAX_BATCH_DELAY_MS: u64 = 60 * 60 * 1000;
const MAX_PRESENCE_TIMEOUT_SECS: u64 = 24 * 60 * 60;
const MAX_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

fn default_batch_delay_ms() -> u64 {
    1500
}

fn default_presence_timeout_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    5
}

fn default_max_undo_depth() -> usize {
    100
}

fn default_preview_length() -> usize {
    50
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_delay_ms: default_batch_delay_ms(),
            presence_timeout_secs: default_presence_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_undo_depth: default_max_undo_depth(),
            preview_length: default_preview_length(),
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Config file (if any) with CLI/env overrides applied on top.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(ms) = cli.batch_delay_ms {
            config.batch_delay_ms = ms;
        }
        if let Some(secs) = cli.presence_timeout_secs {
            config.presence_timeout_secs = secs;
        }
        if let Some(depth) = cli.max_undo_depth {
            config.max_undo_depth = depth;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject durations too large to add to a timestamp.
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("batch_delay_ms", self.batch_delay_ms, MAX_BATCH_DELAY_MS),
            ("presence_timeout_secs", self.presence_timeout_secs, MAX_PRESENCE_TIMEOUT_SECS),
            ("sweep_interval_secs", self.sweep_interval_secs, MAX_SWEEP_INTERVAL_SECS),
        ];
        for (name, value, max) in limits {
            if value > max {
                return Err(CollabError::InvalidConfig(format!(
                    "{name} is {value}, must be at most {max}"
                )));
            }
        }
        Ok(())
    }

    pub fn with_batch_delay_ms(mut self, ms: u64) -> Self {
        self.batch_delay_ms = ms;
        self
    }

    pub fn batch_delay(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.batch_delay_ms.min(MAX_BATCH_DELAY_MS) as i64)
    }

    pub fn presence_timeout(&self) -> TimeDelta {
        TimeDelta::seconds(self.presence_timeout_secs.min(MAX_PRESENCE_TIMEOUT_SECS) as i64)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.clamp(1, MAX_SWEEP_INTERVAL_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: EngineConfig = serde_yaml::from_str("batch_delay_ms: 1000\n").unwrap();
        assert_eq!(config.batch_delay_ms, 1000);
        assert_eq!(config.presence_timeout_secs, 30);
        assert_eq!(config.max_undo_depth, 100);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_delay_ms: 2000\npreview_length: 10").unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cli = Cli::parse_from([
            "reportdesk-collab",
            "--config",
            path.as_str(),
            "--batch-delay-ms",
            "750",
            "config",
        ]);
        let config = EngineConfig::from_cli(&cli).unwrap();

        assert_eq!(config.batch_delay_ms, 750);
        assert_eq!(config.preview_length, 10);
        assert_eq!(config.batch_delay(), TimeDelta::milliseconds(750));
    }

    #[test]
    fn test_huge_presence_timeout_is_rejected() {
        let cli = Cli::parse_from([
            "reportdesk-collab",
            "--presence-timeout-secs",
            "10000000000000000",
            "config",
        ]);
        let err = EngineConfig::from_cli(&cli).unwrap_err();
        assert!(matches!(err, CollabError::InvalidConfig(_)));
        assert!(err.to_string().contains("presence_timeout_secs"));
    }

    #[test]
    fn test_huge_yaml_delay_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_delay_ms: 18446744073709551615").unwrap();
        let err = EngineConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, CollabError::InvalidConfig(_)));
    }

    #[test]
    fn test_unvalidated_durations_saturate() {
        let config = EngineConfig {
            batch_delay_ms: u64::MAX,
            presence_timeout_secs: 10_000_000_000_000_000,
            sweep_interval_secs: u64::MAX,
            ..EngineConfig::default()
        };
        assert_eq!(config.batch_delay(), TimeDelta::hours(1));
        assert_eq!(config.presence_timeout(), TimeDelta::days(1));
        assert_eq!(config.sweep_interval().as_secs(), 24 * 60 * 60);
    }
}
