//! DialClaw configuration system.
//!
//! TOML file with serde defaults for every field, so an empty file (or
//! no file at all) yields a runnable configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DialClawError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialClawConfig {
    /// Path to the SQLite database.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub cadence: CadenceConfig,
    #[serde(default)]
    pub voice_api: VoiceApiConfig,
}

impl Default for DialClawConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cadence: CadenceConfig::default(),
            voice_api: VoiceApiConfig::default(),
        }
    }
}

fn default_db_path() -> String {
    "~/.dialclaw/dialclaw.db".into()
}

/// Cadence engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Reference time zone for all day and window math, campaign-wide.
    /// Never falls back to system-local time.
    #[serde(default = "default_timezone")]
    pub timezone: chrono_tz::Tz,
    /// Minutes between trigger scans. Must land in 1..=60 — much finer
    /// than a cadence day, coarse enough to stay cheap.
    #[serde(default = "default_tick_minutes")]
    pub tick_minutes: u64,
    /// Pacing delay between successive lead contacts in one pass.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    /// Fixed wait before the single rate-limit retry.
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
    /// Queue job retry ceiling (1 automatic retry by default).
    #[serde(default = "default_job_max_attempts")]
    pub job_max_attempts: u32,
    /// Exponential backoff floor for failed queue jobs.
    #[serde(default = "default_job_backoff_secs")]
    pub job_backoff_secs: u64,
    /// How many finished/failed job records the queue retains.
    #[serde(default = "default_job_retention")]
    pub job_retention: usize,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            tick_minutes: default_tick_minutes(),
            pacing_ms: default_pacing_ms(),
            rate_limit_backoff_secs: default_rate_limit_backoff_secs(),
            job_max_attempts: default_job_max_attempts(),
            job_backoff_secs: default_job_backoff_secs(),
            job_retention: default_job_retention(),
        }
    }
}

fn default_timezone() -> chrono_tz::Tz {
    chrono_tz::America::New_York
}
fn default_tick_minutes() -> u64 {
    25
}
fn default_pacing_ms() -> u64 {
    1000
}
fn default_rate_limit_backoff_secs() -> u64 {
    30
}
fn default_job_max_attempts() -> u32 {
    2
}
fn default_job_backoff_secs() -> u64 {
    5
}
fn default_job_retention() -> usize {
    100
}

/// Voice provider endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceApiConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Assistant used when a lead doesn't carry one.
    #[serde(default)]
    pub default_assistant_id: String,
}

impl DialClawConfig {
    /// Load from a TOML file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DialClawError::Config(format!("read {}: {e}", path.display())))?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|e| DialClawError::Config(format!("parse {}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Sanity-check tuning values.
    pub fn validate(&self) -> Result<()> {
        if !(1..=60).contains(&self.cadence.tick_minutes) {
            return Err(DialClawError::Config(format!(
                "cadence.tick_minutes must be 1..=60, got {}",
                self.cadence.tick_minutes
            )));
        }
        if self.cadence.job_max_attempts == 0 {
            return Err(DialClawError::Config(
                "cadence.job_max_attempts must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = DialClawConfig::default();
        assert_eq!(cfg.cadence.tick_minutes, 25);
        assert_eq!(cfg.cadence.timezone, chrono_tz::America::New_York);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let cfg: DialClawConfig = toml::from_str(
            r#"
            [cadence]
            timezone = "Europe/Berlin"
            tick_minutes = 10
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cadence.timezone, chrono_tz::Europe::Berlin);
        assert_eq!(cfg.cadence.tick_minutes, 10);
        // Untouched fields keep their defaults
        assert_eq!(cfg.cadence.pacing_ms, 1000);
    }

    #[test]
    fn test_validate_rejects_bad_tick() {
        let mut cfg = DialClawConfig::default();
        cfg.cadence.tick_minutes = 0;
        assert!(cfg.validate().is_err());
        cfg.cadence.tick_minutes = 90;
        assert!(cfg.validate().is_err());
    }
}
