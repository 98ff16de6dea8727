// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Construction-time configuration for the protocol engine.
//!
//! Values come from [`ShrmConfig::default`], an optional TOML document and
//! finally `SHRM_*` environment overrides. The result is resolved once when
//! [`crate::Shrm::init`] runs; nothing re-reads it afterwards.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// How `write_msg` answers while the modem is resetting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetWritePolicy {
    /// Drop the datagram and report success so the caller does not resend.
    #[default]
    DropAndReportSuccess,
    /// Return [`crate::ShrmError::ModemInReset`].
    Reject,
}

/// Protocol engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShrmConfig {
    /// Recover with a silent modem reset instead of a full system reset.
    pub silent_reset: bool,
    pub mod_stuck_timeout_ms: u64,
    pub fifo_full_timeout_ms: u64,
    /// Delay between a read notification and the quiescence check.
    pub idle_check_delay_ms: u64,
    /// Delay between a sleep acknowledgement and the quiescence check.
    pub sleep_coalesce_delay_ms: u64,
    /// Ring size in 32-bit words.
    pub common_fifo_words: u32,
    pub audio_fifo_words: u32,
    pub work_queue_depth: usize,
    /// SCHED_FIFO priority of the wake and channel-write workers; 0 keeps the default policy.
    pub realtime_priority: i32,
    pub reset_write_policy: ResetWritePolicy,
}

impl Default for ShrmConfig {
    fn default() -> Self {
        Self {
            silent_reset: true,
            mod_stuck_timeout_ms: 6_000,
            fifo_full_timeout_ms: 1_000,
            idle_check_delay_ms: 25,
            sleep_coalesce_delay_ms: 10,
            common_fifo_words: 0x8000,
            audio_fifo_words: 0x800,
            work_queue_depth: 64,
            realtime_priority: 50,
            reset_write_policy: ResetWritePolicy::DropAndReportSuccess,
        }
    }
}

impl ShrmConfig {
    /// Parse a TOML document, filling absent keys with defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: ShrmConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a TOML file and apply environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)?.with_env_overrides()
    }

    /// Apply `SHRM_SILENT_RESET`, `SHRM_MOD_STUCK_TIMEOUT_MS` and
    /// `SHRM_FIFO_FULL_TIMEOUT_MS` when present.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(raw) = std::env::var("SHRM_SILENT_RESET") {
            self.silent_reset = parse_bool("SHRM_SILENT_RESET", &raw)?;
        }
        if let Ok(raw) = std::env::var("SHRM_MOD_STUCK_TIMEOUT_MS") {
            self.mod_stuck_timeout_ms = parse_ms("SHRM_MOD_STUCK_TIMEOUT_MS", &raw)?;
        }
        if let Ok(raw) = std::env::var("SHRM_FIFO_FULL_TIMEOUT_MS") {
            self.fifo_full_timeout_ms = parse_ms("SHRM_FIFO_FULL_TIMEOUT_MS", &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Smallest ring that still holds a header word plus one payload word.
        const MIN_FIFO_WORDS: u32 = 4;
        if self.common_fifo_words < MIN_FIFO_WORDS {
            return Err(invalid("common_fifo_words", "ring too small"));
        }
        if self.audio_fifo_words < MIN_FIFO_WORDS {
            return Err(invalid("audio_fifo_words", "ring too small"));
        }
        if self.work_queue_depth == 0 {
            return Err(invalid("work_queue_depth", "must be non-zero"));
        }
        for (key, value) in [
            ("mod_stuck_timeout_ms", self.mod_stuck_timeout_ms),
            ("fifo_full_timeout_ms", self.fifo_full_timeout_ms),
            ("idle_check_delay_ms", self.idle_check_delay_ms),
            ("sleep_coalesce_delay_ms", self.sleep_coalesce_delay_ms),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be non-zero"));
            }
        }
        Ok(())
    }

    pub fn mod_stuck_timeout(&self) -> Duration {
        Duration::from_millis(self.mod_stuck_timeout_ms)
    }

    pub fn fifo_full_timeout(&self) -> Duration {
        Duration::from_millis(self.fifo_full_timeout_ms)
    }

    pub fn idle_check_delay(&self) -> Duration {
        Duration::from_millis(self.idle_check_delay_ms)
    }

    pub fn sleep_coalesce_delay(&self) -> Duration {
        Duration::from_millis(self.sleep_coalesce_delay_ms)
    }
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(invalid(key, &format!("expected boolean, got {other:?}"))),
    }
}

fn parse_ms(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|e| invalid(key, &format!("{e}")))
}
