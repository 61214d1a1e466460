use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{DEFAULT_DURATION_MINUTES, DEFAULT_REMINDER_MINUTES};
use crate::storage::{StoreError, TaskStore};
use crate::time_grid::{GridError, TimeGrid};

pub const PLANNER_SETTING_KEY: &str = "planner";
pub const DARK_MODE_SETTING_KEY: &str = "darkMode";
pub const DATA_DIR_ENV: &str = "DAYTRACK_DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "daytrack-data";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlannerConfig {
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,
    #[serde(default = "default_end_hour")]
    pub end_hour: u32,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    #[serde(default = "default_reminder_minutes")]
    pub default_reminder_minutes: u32,
    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: u32,
    #[serde(default = "default_due_soon_poll_secs")]
    pub due_soon_poll_secs: u64,
    #[serde(default = "default_alert_dismiss_secs")]
    pub alert_dismiss_secs: u64,
    #[serde(default = "default_store_reload_secs")]
    pub store_reload_secs: u64,
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            interval_minutes: default_interval_minutes(),
            default_reminder_minutes: default_reminder_minutes(),
            default_duration_minutes: default_duration_minutes(),
            due_soon_poll_secs: default_due_soon_poll_secs(),
            alert_dismiss_secs: default_alert_dismiss_secs(),
            store_reload_secs: default_store_reload_secs(),
            sound_enabled: true,
        }
    }
}

impl PlannerConfig {
    pub fn grid(&self) -> Result<TimeGrid, GridError> {
        TimeGrid::new(self.start_hour, self.end_hour, self.interval_minutes)
    }

    pub fn due_soon_poll(&self) -> Duration {
        Duration::from_secs(self.due_soon_poll_secs.max(1))
    }

    pub fn alert_dismiss_after(&self) -> Duration {
        Duration::from_secs(self.alert_dismiss_secs)
    }

    pub fn store_reload(&self) -> Duration {
        Duration::from_secs(self.store_reload_secs.max(1))
    }

    /// Reads the `planner` setting. A missing or malformed value falls back
    /// to defaults; only store failures are errors.
    pub fn load(store: &dyn TaskStore) -> Result<Self, StoreError> {
        let Some(value) = store.get_setting(PLANNER_SETTING_KEY)? else {
            return Ok(Self::default());
        };
        match serde_json::from_value(value) {
            Ok(config) => Ok(config),
            Err(err) => {
                log::warn!("config: ignoring malformed planner setting: {err}");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, store: &dyn TaskStore) -> Result<(), StoreError> {
        store.set_setting(PLANNER_SETTING_KEY, serde_json::to_value(self)?)
    }
}

/// Data directory from `DAYTRACK_DATA_DIR`, else `./daytrack-data`.
pub fn data_dir_from_env() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

fn default_start_hour() -> u32 {
    6
}

fn default_end_hour() -> u32 {
    22
}

fn default_interval_minutes() -> u32 {
    30
}

fn default_reminder_minutes() -> u32 {
    DEFAULT_REMINDER_MINUTES
}

fn default_duration_minutes() -> u32 {
    DEFAULT_DURATION_MINUTES
}

fn default_due_soon_poll_secs() -> u64 {
    30
}

fn default_alert_dismiss_secs() -> u64 {
    30
}

fn default_store_reload_secs() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonStore;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn defaults_describe_the_standard_day() {
        let config = PlannerConfig::default();
        let grid = config.grid().unwrap();
        assert_eq!(grid.len(), 32);
        assert_eq!(grid.slots()[0].value, "06:00");
        assert_eq!(config.default_reminder_minutes, 5);
        assert_eq!(config.default_duration_minutes, 30);
        assert_eq!(config.due_soon_poll(), Duration::from_secs(30));
        assert_eq!(config.alert_dismiss_after(), Duration::from_secs(30));
        assert!(config.sound_enabled);
    }

    #[test]
    fn partial_setting_fills_missing_fields() {
        let config: PlannerConfig =
            serde_json::from_value(json!({ "intervalMinutes": 15, "soundEnabled": false }))
                .unwrap();
        assert_eq!(config.interval_minutes, 15);
        assert!(!config.sound_enabled);
        assert_eq!(config.start_hour, 6);
        assert_eq!(config.grid().unwrap().len(), 64);
    }

    #[test]
    fn load_and_save_through_the_store() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        assert_eq!(PlannerConfig::load(&store).unwrap(), PlannerConfig::default());

        let config = PlannerConfig {
            start_hour: 7,
            end_hour: 21,
            ..PlannerConfig::default()
        };
        config.save(&store).unwrap();
        assert_eq!(PlannerConfig::load(&store).unwrap(), config);
    }

    #[test]
    fn malformed_setting_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        store
            .set_setting(PLANNER_SETTING_KEY, json!({ "startHour": "six" }))
            .unwrap();
        assert_eq!(PlannerConfig::load(&store).unwrap(), PlannerConfig::default());
    }

    #[test]
    fn invalid_interval_surfaces_as_grid_error() {
        let config = PlannerConfig {
            interval_minutes: 0,
            ..PlannerConfig::default()
        };
        assert!(matches!(config.grid(), Err(GridError::InvalidInterval(0))));
    }
}
