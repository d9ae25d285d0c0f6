// crates/core/src/config.rs
//! Ledger configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! namespace = "job_history"
//! page_size = 25
//!
//! [defaults]
//! history_len = 200
//!
//! [classes.ReportJob]
//! exclude_from_linear = true
//! purge_age_secs = 3600
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default rows per history page for listing screens.
pub const PAGE_SIZE: u64 = 25;
/// Default per-class history length.
pub const DEFAULT_HISTORY_LEN: u64 = 200;
/// A running job older than this is considered stuck.
pub const DEFAULT_PURGE_AGE_SECS: u64 = 24 * 60 * 60;
/// How long a kill request waits in a cutting block before it expires.
pub const DEFAULT_KILL_EXPIRY_SECS: u64 = 60;
pub const DEFAULT_NAMESPACE: &str = "job_history";
/// Smallest history length the sweep and trim can work with.
pub const MIN_HISTORY_LEN: u64 = 2;

/// Effective history settings for one job class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassSettings {
    /// Running-set size that triggers a sweep; also the finished-set cap.
    pub history_len: u64,
    /// Skip the linear set for this class.
    pub exclude_from_linear: bool,
    pub purge_age_secs: u64,
    /// Size the running set is brought down to by a sweep.
    /// Defaults to `history_len - 1`.
    pub sweep_target: Option<u64>,
}

impl Default for ClassSettings {
    fn default() -> Self {
        Self {
            history_len: DEFAULT_HISTORY_LEN,
            exclude_from_linear: false,
            purge_age_secs: DEFAULT_PURGE_AGE_SECS,
            sweep_target: None,
        }
    }
}

impl ClassSettings {
    pub fn purge_age(&self) -> chrono::Duration {
        i64::try_from(self.purge_age_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Running jobs started before this are stale. `None` when the purge
    /// age reaches past the earliest representable time.
    pub fn stale_before(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.purge_age())
    }

    /// Running-set size a sweep must get below. Always `< history_len`.
    pub fn sweep_target_len(&self) -> u64 {
        let ceiling = self.history_len.saturating_sub(1);
        self.sweep_target.map_or(ceiling, |t| t.min(ceiling))
    }

    fn apply(&mut self, overrides: &ClassOverrides) {
        if let Some(v) = overrides.history_len {
            self.history_len = v;
        }
        if let Some(v) = overrides.exclude_from_linear {
            self.exclude_from_linear = v;
        }
        if let Some(v) = overrides.purge_age_secs {
            self.purge_age_secs = v;
        }
        if overrides.sweep_target.is_some() {
            self.sweep_target = overrides.sweep_target;
        }
    }

    fn clamp(&mut self) {
        self.history_len = self.history_len.max(MIN_HISTORY_LEN);
        self.purge_age_secs = self.purge_age_secs.max(1);
    }

    fn validate(&self, scope: &str) -> Result<(), ConfigError> {
        if self.history_len < MIN_HISTORY_LEN {
            return Err(ConfigError::invalid(
                format!("{scope}.history_len"),
                "must be at least 2",
            ));
        }
        if self.purge_age_secs == 0 {
            return Err(ConfigError::invalid(
                format!("{scope}.purge_age_secs"),
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Per-class overrides layered on top of [`HistorySettings::defaults`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassOverrides {
    pub history_len: Option<u64>,
    pub exclude_from_linear: Option<bool>,
    pub purge_age_secs: Option<u64>,
    pub sweep_target: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Store namespace; `None` or empty writes bare keys.
    pub namespace: Option<String>,
    pub page_size: u64,
    pub kill_expiry_secs: u64,
    pub defaults: ClassSettings,
    pub classes: HashMap<String, ClassOverrides>,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            namespace: Some(DEFAULT_NAMESPACE.to_string()),
            page_size: PAGE_SIZE,
            kill_expiry_secs: DEFAULT_KILL_EXPIRY_SECS,
            defaults: ClassSettings::default(),
            classes: HashMap::new(),
        }
    }
}

impl HistorySettings {
    /// Read and validate settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let settings: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::invalid("page_size", "must be positive"));
        }
        self.defaults.validate("defaults")?;
        for name in self.classes.keys() {
            self.merged(name).validate(&format!("classes.{name}"))?;
        }
        Ok(())
    }

    fn merged(&self, class_name: &str) -> ClassSettings {
        let mut settings = self.defaults.clone();
        if let Some(overrides) = self.classes.get(class_name) {
            settings.apply(overrides);
        }
        settings
    }

    /// Effective settings for `class_name`: defaults plus any overrides.
    ///
    /// Settings built in code skip [`HistorySettings::validate`], so values
    /// below the working minimum are raised here.
    pub fn for_class(&self, class_name: &str) -> ClassSettings {
        let mut settings = self.merged(class_name);
        settings.clamp();
        settings
    }

    pub fn kill_expiry(&self) -> Duration {
        Duration::from_secs(self.kill_expiry_secs)
    }

    /// Builder-style override used by embedders and tests.
    pub fn with_class(mut self, class_name: impl Into<String>, overrides: ClassOverrides) -> Self {
        self.classes.insert(class_name.into(), overrides);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = HistorySettings::default();
        assert_eq!(settings.page_size, 25);
        assert_eq!(settings.namespace.as_deref(), Some("job_history"));
        let class = settings.for_class("Anything");
        assert_eq!(class.history_len, 200);
        assert_eq!(class.sweep_target_len(), 199);
        assert!(!class.exclude_from_linear);
        settings.validate().unwrap();
    }

    #[test]
    fn test_parse_with_overrides() {
        let raw = r#"
            namespace = "jobs"
            page_size = 50

            [defaults]
            history_len = 10

            [classes.ReportJob]
            exclude_from_linear = true
            sweep_target = 4
        "#;
        let settings: HistorySettings = toml::from_str(raw).unwrap();
        settings.validate().unwrap();

        let report = settings.for_class("ReportJob");
        assert_eq!(report.history_len, 10);
        assert!(report.exclude_from_linear);
        assert_eq!(report.sweep_target_len(), 4);

        let other = settings.for_class("MailJob");
        assert!(!other.exclude_from_linear);
        assert_eq!(other.sweep_target_len(), 9);
    }

    #[test]
    fn test_sweep_target_clamped_below_history_len() {
        let class = ClassSettings {
            history_len: 5,
            sweep_target: Some(50),
            ..ClassSettings::default()
        };
        assert_eq!(class.sweep_target_len(), 4);
    }

    #[test]
    fn test_rejects_tiny_history_len() {
        let settings = HistorySettings::default().with_class(
            "ReportJob",
            ClassOverrides {
                history_len: Some(1),
                ..ClassOverrides::default()
            },
        );
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("classes.ReportJob.history_len"));
    }

    #[test]
    fn test_code_built_settings_are_clamped() {
        let settings = HistorySettings {
            defaults: ClassSettings {
                history_len: 0,
                purge_age_secs: 0,
                ..ClassSettings::default()
            },
            ..HistorySettings::default()
        };
        assert!(settings.validate().is_err());

        let class = settings.for_class("ReportJob");
        assert_eq!(class.history_len, MIN_HISTORY_LEN);
        assert_eq!(class.purge_age_secs, 1);
        assert_eq!(class.sweep_target_len(), 1);
    }

    #[test]
    fn test_stale_before_saturates() {
        let now = DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let day = ClassSettings::default();
        assert_eq!(
            day.stale_before(now),
            Some(now - chrono::Duration::hours(24))
        );

        for purge_age_secs in [10_000_000_000_000, u64::MAX] {
            let huge = ClassSettings {
                purge_age_secs,
                ..ClassSettings::default()
            };
            assert_eq!(huge.stale_before(now), None);
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobtrail.toml");
        std::fs::write(&path, "page_size = 10\n").unwrap();
        let settings = HistorySettings::load(&path).unwrap();
        assert_eq!(settings.page_size, 10);

        std::fs::write(&path, "page_size = \"ten\"\n").unwrap();
        assert!(matches!(
            HistorySettings::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
