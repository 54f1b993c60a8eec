use crate::domain::models::{format_clock, Act, RunningState};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::Serialize;

pub const ALERT_THRESHOLD_SECONDS: i64 = 60;
pub const LOW_TIME_THRESHOLD_SECONDS: i64 = 300;
const MANUAL_TICK_SECONDS: i64 = 1;

/// Read-side view of a schedule at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection<'a> {
    pub current_act: Option<&'a Act>,
    pub next_act: Option<&'a Act>,
    pub remaining: Duration,
    pub progress: f64,
}

/// First act, in start order, whose closed interval holds `now`.
pub fn current_act(acts: &[Act], now: DateTime<Utc>) -> Option<&Act> {
    acts.iter().find(|act| act.is_active_at(now))
}

/// First act starting strictly after `now`.
pub fn next_act(acts: &[Act], now: DateTime<Utc>) -> Option<&Act> {
    acts.iter().find(|act| act.start_time() > now)
}

pub fn remaining(act: &Act, now: DateTime<Utc>) -> Duration {
    (act.end_time() - now).max(Duration::zero())
}

pub fn progress(act: &Act, now: DateTime<Utc>) -> f64 {
    let total = act.duration().num_milliseconds();
    if total <= 0 {
        return 0.0;
    }
    let elapsed = (now - act.start_time()).num_milliseconds();
    (elapsed as f64 / total as f64).clamp(0.0, 1.0)
}

pub fn project(acts: &[Act], now: DateTime<Utc>) -> Projection<'_> {
    let current = current_act(acts, now);
    Projection {
        current_act: current,
        next_act: next_act(acts, now),
        remaining: current.map_or(Duration::zero(), |act| remaining(act, now)),
        progress: current.map_or(0.0, |act| progress(act, now)),
    }
}

/// What the presentation layer receives once per tick.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimerSnapshot {
    pub at: DateTime<Utc>,
    pub current_act: Option<Act>,
    pub next_act: Option<Act>,
    pub remaining_ms: i64,
    pub progress: f64,
    pub should_alert: bool,
    pub is_low_time: bool,
    pub running_state: RunningState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until_next_ms: Option<i64>,
    pub clock: String,
}

impl TimerSnapshot {
    pub fn remaining(&self) -> Duration {
        Duration::milliseconds(self.remaining_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountdownSource {
    Manual,
    Schedule,
}

/// Countdown state carried between ticks.
///
/// While an act is current the countdown is recomputed from wall-clock time and
/// forced to run. Otherwise the manual counter applies, losing one second per
/// tick while running and never dropping below zero.
#[derive(Debug, Clone)]
pub struct TimerReconciler {
    state: RunningState,
    source: CountdownSource,
    initial: Duration,
    remaining: Duration,
}

impl TimerReconciler {
    pub fn new(initial: Duration) -> Self {
        let initial = initial.max(Duration::zero());
        Self {
            state: RunningState::Stopped,
            source: CountdownSource::Manual,
            initial,
            remaining: initial,
        }
    }

    pub fn running_state(&self) -> RunningState {
        self.state
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn is_schedule_driven(&self) -> bool {
        self.source == CountdownSource::Schedule
    }

    pub fn start(&mut self) {
        if self.state == RunningState::Exhausted || self.remaining <= Duration::zero() {
            self.remaining = self.initial;
        }
        self.state = if self.remaining > Duration::zero() {
            RunningState::Running
        } else {
            RunningState::Exhausted
        };
        if self.source == CountdownSource::Schedule && self.state != RunningState::Running {
            self.source = CountdownSource::Manual;
        }
    }

    pub fn stop(&mut self) {
        if self.state == RunningState::Running {
            self.state = RunningState::Stopped;
        }
    }

    pub fn reset(&mut self) {
        self.remaining = self.initial;
        self.state = RunningState::Stopped;
        self.source = CountdownSource::Manual;
    }

    pub fn set_countdown(&mut self, duration: Duration) {
        self.initial = duration.max(Duration::zero());
        self.reset();
    }

    /// Loads a freshly started act without waiting for the next tick.
    pub fn begin_act(&mut self, act: &Act, now: DateTime<Utc>) {
        self.source = CountdownSource::Schedule;
        self.initial = act.duration();
        self.remaining = remaining(act, now);
        self.state = if self.remaining > Duration::zero() {
            RunningState::Running
        } else {
            RunningState::Exhausted
        };
    }

    pub fn tick(&mut self, acts: &[Act], now: DateTime<Utc>) -> TimerSnapshot {
        let projection = project(acts, now);

        match projection.current_act {
            Some(act) => self.begin_act(act, now),
            None if self.source == CountdownSource::Schedule => {
                if self.state == RunningState::Running {
                    debug!("scheduled act ended before zero, countdown stopped");
                    self.state = RunningState::Stopped;
                }
                self.source = CountdownSource::Manual;
            }
            None => {
                if self.state == RunningState::Running {
                    self.remaining = (self.remaining - Duration::seconds(MANUAL_TICK_SECONDS))
                        .max(Duration::zero());
                    if self.remaining <= Duration::zero() {
                        self.state = RunningState::Exhausted;
                    }
                }
            }
        }

        self.snapshot(&projection, now)
    }

    fn snapshot(&self, projection: &Projection<'_>, now: DateTime<Utc>) -> TimerSnapshot {
        let remaining = match projection.current_act {
            Some(_) => projection.remaining,
            None => self.remaining,
        };

        TimerSnapshot {
            at: now,
            current_act: projection.current_act.cloned(),
            next_act: projection.next_act.cloned(),
            remaining_ms: remaining.num_milliseconds(),
            progress: projection.progress,
            should_alert: should_alert(remaining, self.state),
            is_low_time: is_low_time(remaining),
            running_state: self.state,
            until_next_ms: projection
                .next_act
                .map(|act| (act.start_time() - now).num_milliseconds()),
            clock: format_clock(remaining),
        }
    }
}

pub fn should_alert(remaining: Duration, state: RunningState) -> bool {
    state.is_running()
        && remaining > Duration::zero()
        && remaining <= Duration::seconds(ALERT_THRESHOLD_SECONDS)
}

pub fn is_low_time(remaining: Duration) -> bool {
    remaining < Duration::seconds(LOW_TIME_THRESHOLD_SECONDS)
}
