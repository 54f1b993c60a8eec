use crate::application::schedule_store::ScheduleStore;
use crate::domain::models::{CalendarEvent, DayWindow, SyncMode};
use crate::infrastructure::calendar_bridge::CalendarBridge;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::events_to_acts;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{sleep, Duration as TokioDuration};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Manual,
    Synced,
    SyncedNoAccess,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Synced => "calendar synced",
            Self::SyncedNoAccess => "calendar synced (no access)",
        }
    }
}

/// Identifies one issued fetch. Only the most recently issued ticket may
/// write to the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub window: DayWindow,
    pub request_access: bool,
}

#[derive(Debug)]
pub enum FetchOutcome {
    Events(Vec<CalendarEvent>),
    AccessDenied,
    Failed(InfraError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    Applied { acts: usize },
    AccessDenied,
    Failed,
    Stale,
}

/// Access check plus fetch, detached from the controller so it can run on
/// its own task while ticks continue.
pub struct FetchJob<B: CalendarBridge> {
    bridge: Arc<B>,
    retry_policy: RetryPolicy,
    ticket: FetchTicket,
}

impl<B: CalendarBridge> FetchJob<B> {
    pub fn ticket(&self) -> FetchTicket {
        self.ticket
    }

    pub async fn run(self) -> FetchOutcome {
        let granted = if self.bridge.has_access() {
            true
        } else if self.ticket.request_access {
            match self.bridge.request_access().await {
                Ok(granted) => granted,
                Err(error) => {
                    warn!("calendar access request failed: {error}");
                    false
                }
            }
        } else {
            false
        };
        if !granted {
            return FetchOutcome::AccessDenied;
        }

        match self.fetch_with_retry().await {
            Ok(events) => FetchOutcome::Events(events),
            Err(InfraError::CalendarAccessDenied) => FetchOutcome::AccessDenied,
            Err(error) => FetchOutcome::Failed(error),
        }
    }

    async fn fetch_with_retry(&self) -> Result<Vec<CalendarEvent>, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match self.bridge.fetch_events(self.ticket.window).await {
                Ok(events) => return Ok(events),
                Err(error) if should_retry(&error) && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(attempt as u32));
                    debug!("calendar fetch attempt {} failed: {error}", attempt + 1);
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn should_retry(error: &InfraError) -> bool {
    match error {
        InfraError::CalendarFetch(message) => {
            let message = message.to_ascii_lowercase();
            message.contains("timeout")
                || message.contains("timed out")
                || message.contains("temporarily unavailable")
                || message.contains("interrupted")
        }
        InfraError::Io(_) => true,
        _ => false,
    }
}

/// Decides whether the schedule follows the calendar or manual edits.
pub struct SyncController<B: CalendarBridge> {
    bridge: Arc<B>,
    mode: SyncMode,
    has_calendar_access: bool,
    generation: u64,
    time_zone: Tz,
    retry_policy: RetryPolicy,
}

impl<B: CalendarBridge> SyncController<B> {
    pub fn new(bridge: Arc<B>, time_zone: Tz) -> Self {
        let has_calendar_access = bridge.has_access();
        Self {
            bridge,
            mode: SyncMode::Manual,
            has_calendar_access,
            generation: 0,
            time_zone,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn has_calendar_access(&self) -> bool {
        self.has_calendar_access
    }

    pub fn status(&self) -> SyncStatus {
        match (self.mode, self.has_calendar_access) {
            (SyncMode::Manual, _) => SyncStatus::Manual,
            (SyncMode::CalendarSynced, true) => SyncStatus::Synced,
            (SyncMode::CalendarSynced, false) => SyncStatus::SyncedNoAccess,
        }
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    /// Switches to calendar mode and issues an access check plus fetch.
    pub fn begin_enable(&mut self, now: DateTime<Utc>) -> FetchTicket {
        self.mode = SyncMode::CalendarSynced;
        self.issue(now, true)
    }

    /// Issues a re-fetch for a calendar change notification. Ignored in manual mode.
    pub fn begin_refresh(&mut self, now: DateTime<Utc>) -> Option<FetchTicket> {
        if self.mode == SyncMode::Manual {
            debug!("calendar change ignored in manual mode");
            return None;
        }
        Some(self.issue(now, false))
    }

    pub fn job(&self, ticket: FetchTicket) -> FetchJob<B> {
        FetchJob {
            bridge: Arc::clone(&self.bridge),
            retry_policy: self.retry_policy.clone(),
            ticket,
        }
    }

    /// Switches to manual mode and clears the schedule. In-flight fetches are invalidated.
    pub fn disable_sync(&mut self, store: &mut ScheduleStore) {
        self.mode = SyncMode::Manual;
        self.generation = self.generation.wrapping_add(1);
        store.replace_all(Vec::new());
        info!("calendar sync disabled, schedule cleared");
    }

    pub fn apply(
        &mut self,
        ticket: FetchTicket,
        outcome: FetchOutcome,
        store: &mut ScheduleStore,
    ) -> ApplyResult {
        if ticket.generation != self.generation || self.mode == SyncMode::Manual {
            debug!(
                "discarding calendar result generation={} current={}",
                ticket.generation, self.generation
            );
            return ApplyResult::Stale;
        }

        match outcome {
            FetchOutcome::Events(events) => {
                self.has_calendar_access = true;
                let acts = events_to_acts(events);
                let count = acts.len();
                store.replace_all(acts);
                info!("schedule replaced from calendar, {count} act(s) on {}", ticket.window.date);
                ApplyResult::Applied { acts: count }
            }
            FetchOutcome::AccessDenied => {
                self.has_calendar_access = false;
                store.replace_all(Vec::new());
                warn!("calendar access denied, schedule left empty");
                ApplyResult::AccessDenied
            }
            FetchOutcome::Failed(error) => {
                error!("calendar fetch failed, keeping last schedule: {error}");
                ApplyResult::Failed
            }
        }
    }

    /// `begin_enable` + fetch + `apply` in one call.
    pub async fn enable_sync(&mut self, store: &mut ScheduleStore, now: DateTime<Utc>) -> ApplyResult {
        let ticket = self.begin_enable(now);
        let outcome = self.job(ticket).run().await;
        self.apply(ticket, outcome, store)
    }

    /// `begin_refresh` + fetch + `apply` in one call.
    pub async fn on_calendar_changed(
        &mut self,
        store: &mut ScheduleStore,
        now: DateTime<Utc>,
    ) -> Option<ApplyResult> {
        let ticket = self.begin_refresh(now)?;
        let outcome = self.job(ticket).run().await;
        Some(self.apply(ticket, outcome, store))
    }

    fn issue(&mut self, now: DateTime<Utc>, request_access: bool) -> FetchTicket {
        self.generation = self.generation.wrapping_add(1);
        FetchTicket {
            generation: self.generation,
            window: DayWindow::containing(now, &self.time_zone),
            request_access,
        }
    }
}
