//! Typed view of the effective config.
//!
//! Every field has a default, so an empty document (or no config files at
//! all) yields a fully working local setup. Unknown keys are tolerated;
//! validation only rejects values the engine cannot run with, using
//! deterministic `CONFIG_*` codes so operators can grep for them.

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub queue: QueueSection,
    pub reset: ResetSection,
    pub cleanup: CleanupSection,
    pub daemon: DaemonSection,
    pub audit: AuditSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    /// IANA zone that defines the queue day and the midnight boundary.
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetSection {
    /// When false the midnight timer never starts; manual triggers still work.
    pub enabled: bool,
    /// Pause before the single recovery attempt after a scheduled failure.
    pub recovery_delay_secs: u64,
    /// Hard deadline for one rollover attempt.
    pub execute_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupSection {
    pub interval_hours: u64,
    pub retention_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    pub log_path: String,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            timezone: "Asia/Manila".to_string(),
        }
    }
}

impl Default for ResetSection {
    fn default() -> Self {
        Self {
            enabled: true,
            recovery_delay_secs: 300,
            execute_timeout_secs: 120,
        }
    }
}

impl Default for CleanupSection {
    fn default() -> Self {
        Self {
            interval_hours: 168,
            retention_days: 365,
        }
    }
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
        }
    }
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            log_path: "data/activity.jsonl".to_string(),
        }
    }
}

impl AppConfig {
    /// Reject values the engine cannot run with. Called by
    /// [`app_config_from_value`]; safe to call again after mutation.
    pub fn validate(&self) -> Result<()> {
        self.timezone()?;
        self.bind_addr()?;
        if self.reset.execute_timeout_secs == 0 {
            bail!("CONFIG_INVALID_TIMEOUT: reset.execute_timeout_secs must be >= 1");
        }
        if self.cleanup.interval_hours == 0 {
            bail!("CONFIG_INVALID_INTERVAL: cleanup.interval_hours must be >= 1");
        }
        if self.cleanup.retention_days < 1 {
            bail!(
                "CONFIG_INVALID_RETENTION: cleanup.retention_days must be >= 1, got {}",
                self.cleanup.retention_days
            );
        }
        if self.audit.log_path.trim().is_empty() {
            bail!("CONFIG_INVALID_AUDIT_PATH: audit.log_path must not be empty");
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        match self.queue.timezone.parse::<Tz>() {
            Ok(tz) => Ok(tz),
            Err(_) => bail!(
                "CONFIG_INVALID_TIMEZONE: queue.timezone {:?} is not an IANA zone name",
                self.queue.timezone
            ),
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        match self.daemon.bind_addr.parse::<SocketAddr>() {
            Ok(addr) => Ok(addr),
            Err(_) => bail!(
                "CONFIG_INVALID_BIND_ADDR: daemon.bind_addr {:?} is not host:port",
                self.daemon.bind_addr
            ),
        }
    }

    pub fn recovery_delay(&self) -> Duration {
        Duration::from_secs(self.reset.recovery_delay_secs)
    }

    pub fn execute_timeout(&self) -> Duration {
        Duration::from_secs(self.reset.execute_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup.interval_hours * 3600)
    }
}

/// Deserialize the merged config document into the typed view and validate.
pub fn app_config_from_value(config_json: &Value) -> Result<AppConfig> {
    let cfg: AppConfig =
        serde_json::from_value(config_json.clone()).context("config shape invalid")?;
    cfg.validate()?;
    Ok(cfg)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
