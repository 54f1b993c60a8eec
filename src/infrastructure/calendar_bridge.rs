use crate::domain::models::{CalendarEvent, DayWindow};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{decode_feed, CalendarFeed};
use async_trait::async_trait;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

/// Source of "today's" events. Access may have to be requested first, and the
/// request may suspend while the user decides.
#[async_trait]
pub trait CalendarBridge: Send + Sync {
    fn has_access(&self) -> bool;

    async fn request_access(&self) -> Result<bool, InfraError>;

    /// Events overlapping `window`, in any order.
    async fn fetch_events(&self, window: DayWindow) -> Result<Vec<CalendarEvent>, InfraError>;
}

fn overlaps(event: &CalendarEvent, window: &DayWindow) -> bool {
    (event.start_time < window.end && event.end_time > window.start)
        || (event.start_time == event.end_time && window.contains(event.start_time))
}

#[derive(Debug)]
struct InMemoryCalendar {
    has_access: bool,
    grant_on_request: bool,
    events: Vec<CalendarEvent>,
}

/// Calendar held in process memory.
#[derive(Debug)]
pub struct InMemoryCalendarBridge {
    calendar: Mutex<InMemoryCalendar>,
}

impl InMemoryCalendarBridge {
    pub fn granted(events: Vec<CalendarEvent>) -> Self {
        Self {
            calendar: Mutex::new(InMemoryCalendar {
                has_access: true,
                grant_on_request: true,
                events,
            }),
        }
    }

    pub fn denied() -> Self {
        Self {
            calendar: Mutex::new(InMemoryCalendar {
                has_access: false,
                grant_on_request: false,
                events: Vec::new(),
            }),
        }
    }

    pub fn set_events(&self, events: Vec<CalendarEvent>) -> Result<(), InfraError> {
        let mut calendar = self.lock()?;
        calendar.events = events;
        Ok(())
    }

    pub fn set_grant_on_request(&self, grant: bool) -> Result<(), InfraError> {
        let mut calendar = self.lock()?;
        calendar.grant_on_request = grant;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryCalendar>, InfraError> {
        self.calendar
            .lock()
            .map_err(|error| InfraError::CalendarFetch(format!("calendar lock poisoned: {error}")))
    }
}

#[async_trait]
impl CalendarBridge for InMemoryCalendarBridge {
    fn has_access(&self) -> bool {
        self.lock().map(|calendar| calendar.has_access).unwrap_or(false)
    }

    async fn request_access(&self) -> Result<bool, InfraError> {
        let mut calendar = self.lock()?;
        if calendar.grant_on_request {
            calendar.has_access = true;
        }
        Ok(calendar.has_access)
    }

    async fn fetch_events(&self, window: DayWindow) -> Result<Vec<CalendarEvent>, InfraError> {
        let calendar = self.lock()?;
        if !calendar.has_access {
            return Err(InfraError::CalendarAccessDenied);
        }
        Ok(calendar
            .events
            .iter()
            .filter(|event| overlaps(event, &window))
            .cloned()
            .collect())
    }
}

/// Calendar exported as a JSON feed (`{"items": [...]}`). Access means the file
/// exists and can be read.
#[derive(Debug, Clone)]
pub struct JsonFileCalendarBridge {
    path: PathBuf,
}

impl JsonFileCalendarBridge {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_feed(&self) -> Result<CalendarFeed, InfraError> {
        let raw = fs::read_to_string(&self.path)
            .map_err(|error| InfraError::CalendarFetch(format!("{}: {error}", self.path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|error| InfraError::CalendarFetch(format!("{}: {error}", self.path.display())))
    }
}

#[async_trait]
impl CalendarBridge for JsonFileCalendarBridge {
    fn has_access(&self) -> bool {
        self.path.is_file()
    }

    async fn request_access(&self) -> Result<bool, InfraError> {
        Ok(self.has_access())
    }

    async fn fetch_events(&self, window: DayWindow) -> Result<Vec<CalendarEvent>, InfraError> {
        let feed = self.read_feed()?;
        let events = decode_feed(&feed)?;
        debug!(
            "read {} event(s) from {} for {}",
            events.len(),
            self.path.display(),
            window.date
        );
        Ok(events
            .into_iter()
            .filter(|event| overlaps(event, &window))
            .collect())
    }
}

/// Polls the modification time of `path` and calls `on_change` whenever it moves.
pub fn watch_file_changes<F>(path: PathBuf, poll_interval: Duration, on_change: F) -> JoinHandle<()>
where
    F: Fn() -> bool + Send + 'static,
{
    tokio::spawn(async move {
        let mut last_seen = modified_at(&path);
        let mut interval = tokio::time::interval(poll_interval);
        loop {
            interval.tick().await;
            let current = modified_at(&path);
            if current != last_seen {
                last_seen = current;
                if !on_change() {
                    warn!("calendar watcher for {} stopped", path.display());
                    return;
                }
            }
        }
    })
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|metadata| metadata.modified()).ok()
}
