use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const UNTITLED_ACT_NAME: &str = "Untitled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActId(Uuid);

impl ActId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One scheduled interval. Replaced rather than mutated; the end time is
/// always derived from `start_time + duration`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Act {
    id: ActId,
    name: String,
    duration_seconds: i64,
    start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment_image: Option<Vec<u8>>,
}

impl Act {
    pub fn new(
        name: impl Into<String>,
        duration: Duration,
        start_time: DateTime<Utc>,
    ) -> Result<Self, String> {
        let name = name.into();
        validate_non_empty(&name, "act.name")?;
        if duration < Duration::zero() {
            return Err("act.duration must be >= 0".to_string());
        }

        Ok(Self {
            id: ActId::new(),
            name: name.trim().to_string(),
            duration_seconds: duration.num_seconds(),
            start_time,
            attachment_image: None,
        })
    }

    pub fn with_attachment(mut self, image: Vec<u8>) -> Self {
        self.attachment_image = Some(image);
        self
    }

    pub fn id(&self) -> ActId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_seconds)
    }

    pub fn duration_seconds(&self) -> i64 {
        self.duration_seconds
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + self.duration()
    }

    pub fn attachment_image(&self) -> Option<&[u8]> {
        self.attachment_image.as_deref()
    }

    /// Closed-interval containment, zero-width acts included.
    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start_time && instant <= self.end_time()
    }

    /// Whether this act can be the current act at `instant`. Zero-width acts never are.
    pub fn is_active_at(&self, instant: DateTime<Utc>) -> bool {
        self.duration_seconds > 0 && self.covers(instant)
    }

    /// Same act moved to a new start; identity and attachment are kept.
    pub fn rescheduled(&self, start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            ..self.clone()
        }
    }

    /// A fresh act cloned from this one, starting at `now`.
    pub fn promoted(&self, now: DateTime<Utc>) -> Self {
        Self {
            id: ActId::new(),
            start_time: now,
            ..self.clone()
        }
    }
}

/// Input of the add-act form. Nothing reaches the schedule until `into_act` succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActDraft {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_image: Option<Vec<u8>>,
}

impl ActDraft {
    pub fn new(name: impl Into<String>, start_time: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            start_time,
            duration_seconds: duration.num_seconds(),
            attachment_image: None,
        }
    }

    pub fn ending_at(
        name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self::new(name, start_time, end_time - start_time)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.name, "act.name")?;
        if self.duration_seconds <= 0 {
            return Err("act.duration must be > 0".to_string());
        }
        Ok(())
    }

    pub fn into_act(self) -> Result<Act, String> {
        self.validate()?;
        let act = Act::new(
            self.name,
            Duration::seconds(self.duration_seconds),
            self.start_time,
        )?;
        Ok(match self.attachment_image {
            Some(image) => act.with_attachment(image),
            None => act,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunningState {
    #[default]
    Stopped,
    Running,
    Exhausted,
}

impl RunningState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Exhausted => "exhausted",
        }
    }

    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    CalendarSynced,
    Manual,
}

/// An event as handed over by a calendar bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub is_all_day: bool,
}

/// One local calendar day, midnight to midnight, expressed in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn containing(instant: DateTime<Utc>, time_zone: &Tz) -> Self {
        let date = instant.with_timezone(time_zone).date_naive();
        let next = date.succ_opt().unwrap_or(date);
        Self {
            date,
            start: local_midnight(time_zone, date),
            end: local_midnight(time_zone, next),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// `MM:SS`, minutes are not wrapped into hours.
pub fn format_clock(remaining: Duration) -> String {
    let total = remaining.num_seconds().max(0);
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// `1h 5m` or `45m`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

fn local_midnight(time_zone: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    // Some zones skip midnight on DST changes; the first valid instant of the day is 01:00 then.
    time_zone
        .from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            time_zone
                .from_local_datetime(&(midnight + Duration::hours(1)))
                .earliest()
        })
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
