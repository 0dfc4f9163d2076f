use crate::error::{OutreachError, Result};
use crate::io::atomic_write;
use crate::pacing::{DelayRangeMs, PacingConfig};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// OutreachConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachConfig {
    #[serde(default = "default_daily_lead_cap")]
    pub daily_lead_cap: u32,

    /// Primary delivery-acknowledgment window for each probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// The single extended retry window after the primary one elapses.
    #[serde(default = "default_probe_retry_extension_ms")]
    pub probe_retry_extension_ms: u64,

    #[serde(default = "default_inter_message_delay_ms")]
    pub inter_message_delay_ms: DelayRangeMs,

    #[serde(default = "default_session_ttl_ms")]
    pub session_ttl_ms: u64,

    /// Fixed-offset campaign timezone, e.g. `"-03:00"`.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Whether an already-engaged address consumes daily cap. Deliberately
    /// explicit: both readings are defensible, so it is configuration.
    #[serde(default = "default_count_already_engaged")]
    pub count_already_engaged: bool,

    /// The two low-content probe texts. They occupy sequence slots 0 and 1;
    /// the composer's remaining slots are sent after verification.
    #[serde(default = "default_probe_messages")]
    pub probe_messages: [String; 2],

    #[serde(default)]
    pub pacing: PacingConfig,
}

fn default_daily_lead_cap() -> u32 {
    30
}
fn default_probe_timeout_ms() -> u64 {
    5_000
}
fn default_probe_retry_extension_ms() -> u64 {
    10_000
}
fn default_inter_message_delay_ms() -> DelayRangeMs {
    DelayRangeMs::new(4_000, 12_000)
}
fn default_session_ttl_ms() -> u64 {
    30 * 60_000
}
fn default_timezone() -> String {
    "-03:00".to_string()
}
fn default_count_already_engaged() -> bool {
    true
}
fn default_probe_messages() -> [String; 2] {
    ["Hola!".to_string(), "¿Qué tal?".to_string()]
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            daily_lead_cap: default_daily_lead_cap(),
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_retry_extension_ms: default_probe_retry_extension_ms(),
            inter_message_delay_ms: default_inter_message_delay_ms(),
            session_ttl_ms: default_session_ttl_ms(),
            timezone: default_timezone(),
            count_already_engaged: default_count_already_engaged(),
            probe_messages: default_probe_messages(),
            pacing: PacingConfig::default(),
        }
    }
}

impl OutreachConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: OutreachConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        atomic_write(path, data.as_bytes())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn probe_retry_extension(&self) -> Duration {
        Duration::from_millis(self.probe_retry_extension_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_millis(self.session_ttl_ms)
    }

    /// Parse the configured timezone into a fixed offset.
    pub fn timezone_offset(&self) -> Result<FixedOffset> {
        parse_fixed_offset(&self.timezone)
            .ok_or_else(|| OutreachError::InvalidTimezone(self.timezone.clone()))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.daily_lead_cap == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "daily_lead_cap is 0: no lead will ever be contacted".to_string(),
            });
        }

        if self.probe_timeout_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "probe_timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.inter_message_delay_ms.min > self.inter_message_delay_ms.max {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "inter_message_delay_ms min {} exceeds max {}",
                    self.inter_message_delay_ms.min, self.inter_message_delay_ms.max
                ),
            });
        }

        if self.session_ttl_ms < self.probe_timeout_ms + self.probe_retry_extension_ms {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "session_ttl_ms is shorter than the combined probe wait budget"
                    .to_string(),
            });
        }

        if self.timezone_offset().is_err() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "timezone '{}' is not a fixed offset like '-03:00'",
                    self.timezone
                ),
            });
        }

        if self.probe_messages.iter().any(|m| m.trim().is_empty()) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "probe_messages must not be empty strings".to_string(),
            });
        }

        warnings
    }
}

fn parse_fixed_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => (1, s),
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = OutreachConfig::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: OutreachConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.daily_lead_cap, 30);
        assert_eq!(parsed.probe_timeout_ms, 5_000);
        assert_eq!(parsed.probe_retry_extension_ms, 10_000);
        assert!(parsed.count_already_engaged);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "daily_lead_cap: 5\ntimezone: \"+01:00\"\n";
        let cfg: OutreachConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.daily_lead_cap, 5);
        assert_eq!(cfg.timezone, "+01:00");
        assert_eq!(cfg.session_ttl_ms, 30 * 60_000);
        assert_eq!(cfg.inter_message_delay_ms, DelayRangeMs::new(4_000, 12_000));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("outreach.yaml");
        let mut cfg = OutreachConfig::default();
        cfg.daily_lead_cap = 12;
        cfg.save(&path).unwrap();

        let loaded = OutreachConfig::load(&path).unwrap();
        assert_eq!(loaded.daily_lead_cap, 12);
    }

    #[test]
    fn timezone_parses_both_signs() {
        let mut cfg = OutreachConfig::default();
        assert_eq!(
            cfg.timezone_offset().unwrap(),
            FixedOffset::west_opt(3 * 3600).unwrap()
        );
        cfg.timezone = "+05:30".to_string();
        assert_eq!(
            cfg.timezone_offset().unwrap(),
            FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
        );
    }

    #[test]
    fn bad_timezone_is_an_error() {
        let mut cfg = OutreachConfig::default();
        cfg.timezone = "America/Argentina/Buenos_Aires".to_string();
        assert!(matches!(
            cfg.timezone_offset(),
            Err(OutreachError::InvalidTimezone(_))
        ));
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("timezone")));
    }

    #[test]
    fn validate_default_config_clean() {
        assert!(OutreachConfig::default().validate().is_empty());
    }

    #[test]
    fn validate_flags_degenerate_settings() {
        let mut cfg = OutreachConfig::default();
        cfg.daily_lead_cap = 0;
        cfg.probe_timeout_ms = 0;
        cfg.inter_message_delay_ms = DelayRangeMs::new(9_000, 2_000);
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("daily_lead_cap")));
        assert!(warnings.iter().any(|w| w.message.contains("probe_timeout_ms")));
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("inter_message_delay_ms")));
    }

    #[test]
    fn validate_short_ttl_warns() {
        let mut cfg = OutreachConfig::default();
        cfg.session_ttl_ms = 1_000;
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.message.contains("session_ttl_ms")));
    }

    #[test]
    fn validate_empty_probe_message_errors() {
        let mut cfg = OutreachConfig::default();
        cfg.probe_messages[1] = "  ".to_string();
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.message.contains("probe_messages")));
    }
}
