use std::path::PathBuf;
use std::time::Duration;

use chrono::{Days, NaiveDate};

use crate::limits::*;

/// Engine settings. `from_env` reads `ROOMBOOK_*` variables over the defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub dispatch_timeout: Duration,
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    /// Compaction forgets days older than this many days before today.
    pub retention_days: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            dispatch_timeout: Duration::from_millis(DEFAULT_DISPATCH_TIMEOUT_MS),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            compact_interval: Duration::from_secs(DEFAULT_COMPACT_INTERVAL_SECS),
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("ROOMBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            dispatch_timeout: env_parse("ROOMBOOK_DISPATCH_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.dispatch_timeout),
            compact_threshold: env_parse("ROOMBOOK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            compact_interval: env_parse("ROOMBOOK_COMPACT_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
            retention_days: env_parse("ROOMBOOK_RETENTION_DAYS").unwrap_or(defaults.retention_days),
        }
    }

    /// Config rooted at `data_dir` with every other setting at its default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn reservations_path(&self) -> PathBuf {
        self.data_dir.join("reservations.journal")
    }

    pub fn notifications_path(&self) -> PathBuf {
        self.data_dir.join("notifications.journal")
    }

    /// First date compaction keeps, counted back from `today`.
    pub fn retention_cutoff(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(self.retention_days))
            .unwrap_or(NaiveDate::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_paths_live_under_data_dir() {
        let config = EngineConfig::with_data_dir("/var/lib/roombook");
        assert_eq!(
            config.reservations_path(),
            PathBuf::from("/var/lib/roombook/reservations.journal")
        );
        assert_eq!(
            config.notifications_path(),
            PathBuf::from("/var/lib/roombook/notifications.journal")
        );
        assert_eq!(config.dispatch_timeout, Duration::from_millis(DEFAULT_DISPATCH_TIMEOUT_MS));
    }

    #[test]
    fn retention_cutoff_counts_back_from_today() {
        let mut config = EngineConfig::default();
        let today = NaiveDate::from_ymd_opt(2031, 3, 1).unwrap();

        config.retention_days = 1;
        assert_eq!(config.retention_cutoff(today), NaiveDate::from_ymd_opt(2031, 2, 28).unwrap());
        config.retention_days = 0;
        assert_eq!(config.retention_cutoff(today), today);
        config.retention_days = u64::MAX;
        assert_eq!(config.retention_cutoff(today), NaiveDate::MIN);
    }
}
