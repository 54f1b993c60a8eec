use crate::application::calendar_sync::SyncStatus;
use crate::application::reconciler::TimerSnapshot;
use crate::application::runtime::Command;
use crate::domain::models::{Act, ActDraft, ActId, format_duration};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

pub const HELP: &str = "commands: start | stop | reset | set <minutes> | sync on | sync off | \
add <name> <HH:MM> <minutes> | remove <n> | move <from> <to> | now <n> | list | quit";

/// One line typed at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Command(Command),
    List,
    Help,
}

/// Parses a console line. Act positions are 1-based and refer to `schedule`
/// as last published; `HH:MM` is read as a wall-clock time today in `time_zone`.
pub fn parse_line(
    line: &str,
    schedule: &[Act],
    time_zone: Tz,
    now: DateTime<Utc>,
) -> Result<Option<ConsoleInput>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = words.split_first() else {
        return Ok(None);
    };

    let input = match (verb.to_ascii_lowercase().as_str(), args) {
        ("start", []) => ConsoleInput::Command(Command::StartCountdown),
        ("stop", []) => ConsoleInput::Command(Command::StopCountdown),
        ("reset", []) => ConsoleInput::Command(Command::ResetCountdown),
        ("set", [minutes]) => {
            ConsoleInput::Command(Command::SetCountdown(parse_minutes(minutes)?))
        }
        ("sync", ["on"]) => ConsoleInput::Command(Command::EnableSync),
        ("sync", ["off"]) => ConsoleInput::Command(Command::DisableSync),
        ("add", [name @ .., start, minutes]) if !name.is_empty() => {
            let start_time = local_time_today(start, time_zone, now)?;
            let duration = parse_minutes(minutes)?;
            ConsoleInput::Command(Command::AddAct(ActDraft::new(name.join(" "), start_time, duration)))
        }
        ("remove", [position]) => {
            ConsoleInput::Command(Command::RemoveAct(act_at(schedule, position)?))
        }
        ("now", [position]) => ConsoleInput::Command(Command::StartNow(act_at(schedule, position)?)),
        ("move", [from, to]) => ConsoleInput::Command(Command::Reorder {
            from_index: parse_position(from)?,
            to_index: parse_position(to)?,
        }),
        ("list", []) => ConsoleInput::List,
        ("help" | "?", []) => ConsoleInput::Help,
        ("quit" | "exit", []) => ConsoleInput::Command(Command::Shutdown),
        _ => return Err(format!("unrecognized command '{}'", line.trim())),
    };
    Ok(Some(input))
}

fn parse_minutes(raw: &str) -> Result<Duration, String> {
    raw.parse::<i64>()
        .ok()
        .filter(|minutes| *minutes >= 0)
        .and_then(Duration::try_minutes)
        .ok_or_else(|| format!("'{raw}' is not a number of minutes"))
}

fn parse_position(raw: &str) -> Result<usize, String> {
    raw.parse::<usize>()
        .ok()
        .and_then(|position| position.checked_sub(1))
        .ok_or_else(|| format!("'{raw}' is not a schedule position"))
}

fn act_at(schedule: &[Act], raw: &str) -> Result<ActId, String> {
    let index = parse_position(raw)?;
    schedule
        .get(index)
        .map(Act::id)
        .ok_or_else(|| format!("no act at position {raw}"))
}

fn local_time_today(raw: &str, time_zone: Tz, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let time = NaiveTime::parse_from_str(raw, "%H:%M").map_err(|_| format!("'{raw}' is not HH:MM"))?;
    let date = now.with_timezone(&time_zone).date_naive();
    time_zone
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| format!("{raw} does not exist on {date} in {time_zone}"))
}

pub fn describe(snapshot: &TimerSnapshot, status: SyncStatus, time_zone: Tz) -> String {
    let mut line = format!("[{}] {}", snapshot.running_state.as_str(), snapshot.clock);
    if let Some(act) = &snapshot.current_act {
        line.push_str(&format!(
            " {} (ends {})",
            act.name(),
            act.end_time().with_timezone(&time_zone).format("%H:%M")
        ));
    }
    if snapshot.should_alert {
        line.push_str(" !");
    }
    if let (Some(next), Some(until_ms)) = (&snapshot.next_act, snapshot.until_next_ms) {
        line.push_str(&format!(
            " | next: {} in {}",
            next.name(),
            format_duration(Duration::milliseconds(until_ms))
        ));
    }
    line.push_str(&format!(" | {}", status.as_str()));
    line
}

pub fn describe_schedule(schedule: &[Act], time_zone: Tz) -> String {
    if schedule.is_empty() {
        return "schedule is empty".to_string();
    }
    schedule
        .iter()
        .enumerate()
        .map(|(index, act)| {
            format!(
                "{:>2}. {} {} ({})",
                index + 1,
                act.start_time().with_timezone(&time_zone).format("%H:%M"),
                act.name(),
                format_duration(act.duration())
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
