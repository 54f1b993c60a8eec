use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_JSON: &str = "app.json";
pub const EVENTS_JSON: &str = "events.json";
const DEFAULT_COUNTDOWN_MINUTES: u64 = 45;
const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub time_zone: Tz,
    pub calendar_sync_enabled: bool,
    pub default_countdown: chrono::Duration,
    pub tick_interval: Duration,
    pub events_file: PathBuf,
}

impl AppConfig {
    pub fn with_defaults(config_dir: &Path) -> Self {
        Self {
            time_zone: Tz::UTC,
            calendar_sync_enabled: true,
            default_countdown: chrono::Duration::minutes(DEFAULT_COUNTDOWN_MINUTES as i64),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            events_file: config_dir.join(EVENTS_JSON),
        }
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "timezone": "UTC",
                "calendarSyncEnabled": true,
                "defaultCountdownMinutes": DEFAULT_COUNTDOWN_MINUTES,
                "tickIntervalMs": DEFAULT_TICK_INTERVAL_MS,
                "eventsFile": EVENTS_JSON
            }),
        ),
        (
            EVENTS_JSON,
            serde_json::json!({
                "items": []
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let app = read_config(&path)?;
    let defaults = AppConfig::with_defaults(config_dir);

    let time_zone = match read_trimmed_str(&app, "timezone") {
        Some(name) => name.parse::<Tz>().map_err(|error| {
            InfraError::InvalidConfig(format!("invalid timezone '{name}' in {}: {error}", path.display()))
        })?,
        None => defaults.time_zone,
    };

    let calendar_sync_enabled = match app.get("calendarSyncEnabled") {
        None | Some(serde_json::Value::Null) => defaults.calendar_sync_enabled,
        Some(value) => value.as_bool().ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "calendarSyncEnabled must be a boolean in {}",
                path.display()
            ))
        })?,
    };

    let default_countdown = match read_u64(&app, "defaultCountdownMinutes", &path)? {
        Some(minutes) => i64::try_from(minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .ok_or_else(|| {
                InfraError::InvalidConfig(format!(
                    "defaultCountdownMinutes {minutes} is out of range in {}",
                    path.display()
                ))
            })?,
        None => defaults.default_countdown,
    };

    let tick_interval = match read_u64(&app, "tickIntervalMs", &path)? {
        Some(0) => {
            return Err(InfraError::InvalidConfig(format!(
                "tickIntervalMs must be > 0 in {}",
                path.display()
            )));
        }
        Some(millis) => Duration::from_millis(millis),
        None => defaults.tick_interval,
    };

    let events_file = read_trimmed_str(&app, "eventsFile")
        .map(|value| config_dir.join(value))
        .unwrap_or(defaults.events_file);

    Ok(AppConfig {
        time_zone,
        calendar_sync_enabled,
        default_countdown,
        tick_interval,
        events_file,
    })
}

fn read_trimmed_str<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn read_u64(value: &serde_json::Value, key: &str, path: &Path) -> Result<Option<u64>, InfraError> {
    match value.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(raw) => raw.as_u64().map(Some).ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "{key} must be a non-negative integer in {}",
                path.display()
            ))
        }),
    }
}
