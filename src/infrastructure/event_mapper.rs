use crate::domain::models::{Act, CalendarEvent, UNTITLED_ACT_NAME};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, Utc};
use log::warn;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventDateTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Event record as stored in a calendar export.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CalendarEventRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub start: CalendarEventDateTime,
    pub end: CalendarEventDateTime,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarFeed {
    #[serde(default)]
    pub items: Vec<CalendarEventRecord>,
}

/// Decodes one record. Cancelled events decode to `None`; a record with a bare
/// `date` on both ends is an all-day event.
pub fn decode_event(record: &CalendarEventRecord) -> Result<Option<CalendarEvent>, InfraError> {
    let is_cancelled = record
        .status
        .as_deref()
        .map(|status| status.eq_ignore_ascii_case("cancelled"))
        .unwrap_or(false);
    if is_cancelled {
        return Ok(None);
    }

    let is_all_day = record.start.date_time.is_none() && record.start.date.is_some();
    let start_time = parse_event_time(&record.start, "start")?;
    let end_time = parse_event_time(&record.end, "end")?;

    Ok(Some(CalendarEvent {
        id: record
            .id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
        title: record.summary.clone(),
        start_time,
        end_time,
        is_all_day,
    }))
}

pub fn decode_feed(feed: &CalendarFeed) -> Result<Vec<CalendarEvent>, InfraError> {
    let mut events = Vec::with_capacity(feed.items.len());
    for record in &feed.items {
        if let Some(event) = decode_event(record)? {
            events.push(event);
        }
    }
    Ok(events)
}

/// One act per timed event, sorted by start. All-day events are dropped, and so
/// are events ending before they start.
pub fn events_to_acts(events: Vec<CalendarEvent>) -> Vec<Act> {
    let mut acts: Vec<Act> = events
        .into_iter()
        .filter(|event| !event.is_all_day)
        .filter_map(|event| {
            let name = event
                .title
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(UNTITLED_ACT_NAME);
            match Act::new(name, event.end_time - event.start_time, event.start_time) {
                Ok(act) => Some(act),
                Err(error) => {
                    warn!(
                        "dropping calendar event id={:?}: {error}",
                        event.id.as_deref().unwrap_or("-")
                    );
                    None
                }
            }
        })
        .collect();
    acts.sort_by_key(Act::start_time);
    acts
}

fn parse_event_time(
    value: &CalendarEventDateTime,
    field_name: &str,
) -> Result<DateTime<Utc>, InfraError> {
    if let Some(date_time) = value.date_time.as_deref() {
        return DateTime::parse_from_rfc3339(date_time)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|error| {
                InfraError::InvalidEvent(format!(
                    "invalid {field_name}.dateTime '{date_time}': {error}"
                ))
            });
    }

    let Some(date) = value.date.as_deref() else {
        return Err(InfraError::InvalidEvent(format!(
            "{field_name} needs dateTime or date"
        )));
    };
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|parsed| parsed.and_time(chrono::NaiveTime::MIN).and_utc())
        .map_err(|error| {
            InfraError::InvalidEvent(format!("invalid {field_name}.date '{date}': {error}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn timed(value: &str) -> CalendarEventDateTime {
        CalendarEventDateTime {
            date_time: Some(value.to_string()),
            date: None,
        }
    }

    fn sample_record() -> CalendarEventRecord {
        CalendarEventRecord {
            id: Some("evt-1".to_string()),
            summary: Some("Soundcheck".to_string()),
            status: Some("confirmed".to_string()),
            start: timed("2026-02-16T09:00:00+09:00"),
            end: timed("2026-02-16T09:45:00+09:00"),
        }
    }

    fn event(title: Option<&str>, start: &str, end: &str, is_all_day: bool) -> CalendarEvent {
        CalendarEvent {
            id: None,
            title: title.map(ToOwned::to_owned),
            start_time: fixed_time(start),
            end_time: fixed_time(end),
            is_all_day,
        }
    }

    #[test]
    fn decode_timed_event_normalizes_to_utc() {
        let decoded = decode_event(&sample_record())
            .expect("decode should succeed")
            .expect("active event");

        assert_eq!(decoded.id.as_deref(), Some("evt-1"));
        assert_eq!(decoded.title.as_deref(), Some("Soundcheck"));
        assert_eq!(decoded.start_time, fixed_time("2026-02-16T00:00:00Z"));
        assert_eq!(decoded.end_time, fixed_time("2026-02-16T00:45:00Z"));
        assert!(!decoded.is_all_day);
    }

    #[test]
    fn decode_marks_date_only_events_as_all_day() {
        let record = CalendarEventRecord {
            start: CalendarEventDateTime {
                date_time: None,
                date: Some("2026-02-16".to_string()),
            },
            end: CalendarEventDateTime {
                date_time: None,
                date: Some("2026-02-17".to_string()),
            },
            ..sample_record()
        };

        let decoded = decode_event(&record).expect("decode").expect("active event");
        assert!(decoded.is_all_day);
    }

    #[test]
    fn decode_skips_cancelled_events() {
        let record = CalendarEventRecord {
            status: Some("Cancelled".to_string()),
            ..sample_record()
        };
        assert!(decode_event(&record).expect("decode").is_none());
    }

    #[test]
    fn decode_returns_error_when_datetime_is_invalid() {
        let mut record = sample_record();
        record.start = timed("invalid-timestamp");
        assert!(matches!(decode_event(&record), Err(InfraError::InvalidEvent(_))));

        record.start = CalendarEventDateTime::default();
        assert!(decode_event(&record).is_err());
    }

    #[test]
    fn feed_parses_from_json() {
        let raw = r#"{
            "items": [
                {"id": "a", "summary": "Intro", "start": {"dateTime": "2026-02-16T10:00:00Z"}, "end": {"dateTime": "2026-02-16T10:30:00Z"}},
                {"id": "b", "status": "cancelled", "start": {"dateTime": "2026-02-16T11:00:00Z"}, "end": {"dateTime": "2026-02-16T11:30:00Z"}}
            ]
        }"#;
        let feed: CalendarFeed = serde_json::from_str(raw).expect("parse feed");
        let events = decode_feed(&feed).expect("decode feed");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title.as_deref(), Some("Intro"));
    }

    #[test]
    fn events_to_acts_filters_all_day_and_sorts() {
        let acts = events_to_acts(vec![
            event(Some("Late"), "2026-02-16T15:00:00Z", "2026-02-16T16:00:00Z", false),
            event(Some("Holiday"), "2026-02-16T00:00:00Z", "2026-02-17T00:00:00Z", true),
            event(Some("Early"), "2026-02-16T09:00:00Z", "2026-02-16T09:20:00Z", false),
        ]);

        let names: Vec<&str> = acts.iter().map(Act::name).collect();
        assert_eq!(names, vec!["Early", "Late"]);
        assert_eq!(acts[0].duration(), Duration::minutes(20));
        assert!(acts.iter().all(|act| act.attachment_image().is_none()));
    }

    #[test]
    fn events_to_acts_names_untitled_and_drops_inverted_events() {
        let acts = events_to_acts(vec![
            event(Some("  "), "2026-02-16T09:00:00Z", "2026-02-16T09:30:00Z", false),
            event(None, "2026-02-16T10:00:00Z", "2026-02-16T10:30:00Z", false),
            event(Some("Broken"), "2026-02-16T12:00:00Z", "2026-02-16T11:00:00Z", false),
        ]);

        assert_eq!(acts.len(), 2);
        assert!(acts.iter().all(|act| act.name() == UNTITLED_ACT_NAME));
    }
}
