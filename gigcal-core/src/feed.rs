//! Calendar feed parsing using the icalendar crate's parser.
//!
//! One feed document in, a finite sequence of `RawEvent` out. Re-parsing
//! the same text is deterministic and side-effect free. Only VEVENT
//! blocks are yielded; blocks missing a start time are dropped and
//! counted, never fatal.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{
    parser::{read_calendar, unfold, Component, Property},
    CalendarDateTime, DatePerhapsTime,
};

use crate::error::{IngestError, IngestResult};
use crate::event::RawEvent;

/// Assumed length of a timed event when the feed omits DTEND.
pub const DEFAULT_DURATION_HOURS: i64 = 2;

/// Result of parsing one feed document.
#[derive(Debug)]
pub struct ParsedFeed {
    pub events: Vec<RawEvent>,
    /// VEVENT blocks dropped for missing/unreadable required fields.
    pub dropped: usize,
}

/// Parse a feed document into raw events.
///
/// `tz` is the deployment timezone, used to resolve floating times and
/// bare dates, and as the reference for the all-day midnight heuristic.
pub fn parse_feed(text: &str, tz: Tz) -> IngestResult<ParsedFeed> {
    let unfolded = unfold(text);
    let calendar =
        read_calendar(&unfolded).map_err(|e| IngestError::FeedParse(e.to_string()))?;

    let mut events = Vec::new();
    let mut dropped = 0;

    for vevent in calendar.components.iter().filter(|c| c.name == "VEVENT") {
        match parse_vevent(vevent, tz) {
            Some(event) => events.push(event),
            None => dropped += 1,
        }
    }

    Ok(ParsedFeed { events, dropped })
}

/// Parse a single VEVENT block. Returns None when the block is missing
/// a usable DTSTART, which the caller counts as a dropped event.
fn parse_vevent(vevent: &Component, tz: Tz) -> Option<RawEvent> {
    let start_prop = vevent.find_prop("DTSTART")?;
    let start = DatePerhapsTime::try_from(start_prop).ok()?;

    let title = vevent
        .find_prop("SUMMARY")
        .map(|p| unescape_text(p.val.as_ref()))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "(No title)".to_string());

    let description = vevent
        .find_prop("DESCRIPTION")
        .map(|p| unescape_text(p.val.as_ref()));
    let location = vevent
        .find_prop("LOCATION")
        .map(|p| unescape_text(p.val.as_ref()))
        .filter(|s| !s.trim().is_empty());
    let organizer = vevent.find_prop("ORGANIZER").map(parse_organizer);
    let source_uid = vevent
        .find_prop("UID")
        .map(|p| p.val.to_string())
        .filter(|s| !s.trim().is_empty());

    let (start_at, start_is_date, tz_hint) = resolve_time(start, tz);

    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(|dpt| resolve_time(dpt, tz));

    let end_at = match end {
        // A feed publishing DTEND before DTSTART is treated like a
        // missing end time.
        Some((end_at, _, _)) if end_at >= start_at => end_at,
        _ if start_is_date => start_at + Duration::days(1),
        _ => start_at + Duration::hours(DEFAULT_DURATION_HOURS),
    };

    let all_day = start_is_date || is_all_day_heuristic(start_at, end_at, tz);

    Some(RawEvent {
        title,
        start_at,
        end_at,
        all_day,
        location,
        description,
        organizer,
        source_uid,
        tz_hint,
    })
}

/// Resolve an ICS date-or-datetime to an absolute instant.
///
/// Returns the instant, whether the value was a bare date, and the TZID
/// the feed declared (if any). Floating times and bare dates are
/// interpreted in the deployment timezone; an unknown TZID falls back to
/// the deployment timezone as well.
fn resolve_time(dpt: DatePerhapsTime, tz: Tz) -> (DateTime<Utc>, bool, Option<String>) {
    match dpt {
        DatePerhapsTime::Date(d) => (local_to_utc(d.and_time(NaiveTime::MIN), tz), true, None),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => (dt, false, None),
            CalendarDateTime::Floating(naive) => (local_to_utc(naive, tz), false, None),
            CalendarDateTime::WithTimezone { date_time, tzid } => {
                let zone: Tz = tzid.parse().unwrap_or(tz);
                (local_to_utc(date_time, zone), false, Some(tzid))
            }
        },
    }
}

/// Convert a wall-clock time in `tz` to UTC, tolerating DST folds/gaps.
fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        // Inside a DST gap: shift forward an hour, which is where the
        // wall clock actually lands.
        LocalResult::None => match tz.from_local_datetime(&(naive + Duration::hours(1))) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
            LocalResult::None => Utc.from_utc_datetime(&naive),
        },
    }
}

/// Fallback all-day detection for feeds that publish timed DTSTART
/// values for whole-day events: local midnight start and a duration
/// that is an exact multiple of 24 hours, at least one day long.
fn is_all_day_heuristic(start_at: DateTime<Utc>, end_at: DateTime<Utc>, tz: Tz) -> bool {
    let local_start = start_at.with_timezone(&tz);
    if local_start.time() != NaiveTime::MIN {
        return false;
    }
    let secs = (end_at - start_at).num_seconds();
    secs >= 86_400 && secs % 86_400 == 0
}

/// ORGANIZER is either a `CN` display-name parameter or a mailto: value.
fn parse_organizer(prop: &Property) -> String {
    prop.params
        .iter()
        .find(|p| p.key == "CN")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()))
        .unwrap_or_else(|| {
            prop.val
                .as_ref()
                .strip_prefix("mailto:")
                .unwrap_or(prop.val.as_ref())
                .to_string()
        })
}

/// Decode RFC 5545 text escapes (`\n`, `\,`, `\;`, `\\`).
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(',') => out.push(','),
            Some(';') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const TZ: Tz = chrono_tz::America::Chicago;

    fn wrap(vevents: &str) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\n{}END:VCALENDAR\r\n",
            vevents
        )
    }

    #[test]
    fn test_parses_basic_timed_event() {
        let ics = wrap(
            "BEGIN:VEVENT\r\n\
             UID:abc-123\r\n\
             SUMMARY:Jazz Night\r\n\
             DTSTART:20250601T190000Z\r\n\
             DTEND:20250601T220000Z\r\n\
             LOCATION:First Avenue\\, Minneapolis\r\n\
             DESCRIPTION:Doors at 7.\r\n\
             END:VEVENT\r\n",
        );

        let parsed = parse_feed(&ics, TZ).expect("should parse");
        assert_eq!(parsed.dropped, 0);
        assert_eq!(parsed.events.len(), 1);

        let ev = &parsed.events[0];
        assert_eq!(ev.title, "Jazz Night");
        assert_eq!(ev.source_uid.as_deref(), Some("abc-123"));
        assert_eq!(ev.location.as_deref(), Some("First Avenue, Minneapolis"));
        assert!(!ev.all_day);
        assert_eq!((ev.end_at - ev.start_at).num_hours(), 3);
    }

    #[test]
    fn test_drops_block_missing_dtstart() {
        let ics = wrap(
            "BEGIN:VEVENT\r\nUID:no-start\r\nSUMMARY:Broken\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:ok\r\nSUMMARY:Fine\r\nDTSTART:20250601T190000Z\r\nEND:VEVENT\r\n",
        );

        let parsed = parse_feed(&ics, TZ).expect("should parse");
        assert_eq!(parsed.dropped, 1);
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.events[0].title, "Fine");
    }

    #[test]
    fn test_missing_dtend_gets_default_duration() {
        let ics = wrap(
            "BEGIN:VEVENT\r\nUID:x\r\nSUMMARY:Show\r\nDTSTART:20250601T190000Z\r\nEND:VEVENT\r\n",
        );

        let parsed = parse_feed(&ics, TZ).expect("should parse");
        let ev = &parsed.events[0];
        assert_eq!(
            (ev.end_at - ev.start_at).num_hours(),
            DEFAULT_DURATION_HOURS
        );
    }

    #[test]
    fn test_bare_date_is_all_day() {
        let ics = wrap(
            "BEGIN:VEVENT\r\nUID:x\r\nSUMMARY:Street Fair\r\n\
             DTSTART;VALUE=DATE:20250601\r\nEND:VEVENT\r\n",
        );

        let parsed = parse_feed(&ics, TZ).expect("should parse");
        let ev = &parsed.events[0];
        assert!(ev.all_day);
        assert_eq!((ev.end_at - ev.start_at).num_days(), 1);
        // Resolved at local midnight
        assert_eq!(ev.start_at.with_timezone(&TZ).hour(), 0);
    }

    #[test]
    fn test_midnight_48h_heuristic_is_all_day() {
        // Local midnight in Chicago (CDT, UTC-5) is 05:00Z in June.
        let ics = wrap(
            "BEGIN:VEVENT\r\nUID:x\r\nSUMMARY:Weekender\r\n\
             DTSTART:20250601T050000Z\r\nDTEND:20250603T050000Z\r\nEND:VEVENT\r\n",
        );

        let parsed = parse_feed(&ics, TZ).expect("should parse");
        assert!(parsed.events[0].all_day);
    }

    #[test]
    fn test_evening_event_is_not_all_day_regardless_of_duration() {
        let ics = wrap(
            "BEGIN:VEVENT\r\nUID:x\r\nSUMMARY:Long Party\r\n\
             DTSTART:20250602T000000Z\r\nDTEND:20250604T000000Z\r\nEND:VEVENT\r\n",
        );

        // Midnight UTC is 19:00 the previous day in Chicago.
        let parsed = parse_feed(&ics, TZ).expect("should parse");
        assert!(!parsed.events[0].all_day);
    }

    #[test]
    fn test_tzid_start_resolves_through_named_zone() {
        let ics = wrap(
            "BEGIN:VEVENT\r\nUID:x\r\nSUMMARY:Reading\r\n\
             DTSTART;TZID=America/New_York:20250601T190000\r\nEND:VEVENT\r\n",
        );

        let parsed = parse_feed(&ics, TZ).expect("should parse");
        let ev = &parsed.events[0];
        assert_eq!(ev.tz_hint.as_deref(), Some("America/New_York"));
        // 19:00 EDT == 23:00Z
        assert_eq!(ev.start_at.hour(), 23);
    }

    #[test]
    fn test_inverted_dtend_treated_as_missing() {
        let ics = wrap(
            "BEGIN:VEVENT\r\nUID:x\r\nSUMMARY:Oops\r\n\
             DTSTART:20250601T190000Z\r\nDTEND:20250601T180000Z\r\nEND:VEVENT\r\n",
        );

        let parsed = parse_feed(&ics, TZ).expect("should parse");
        let ev = &parsed.events[0];
        assert!(ev.end_at >= ev.start_at);
        assert_eq!(
            (ev.end_at - ev.start_at).num_hours(),
            DEFAULT_DURATION_HOURS
        );
    }

    #[test]
    fn test_reparse_is_deterministic() {
        let ics = wrap(
            "BEGIN:VEVENT\r\nUID:x\r\nSUMMARY:Show\r\nDTSTART:20250601T190000Z\r\nEND:VEVENT\r\n",
        );

        let a = parse_feed(&ics, TZ).expect("should parse");
        let b = parse_feed(&ics, TZ).expect("should parse");
        assert_eq!(a.events.len(), b.events.len());
        assert_eq!(a.events[0].start_at, b.events[0].start_at);
        assert_eq!(a.events[0].title, b.events[0].title);
    }

    #[test]
    fn test_unescape_text() {
        assert_eq!(unescape_text("a\\nb"), "a\nb");
        assert_eq!(unescape_text("x\\, y\\; z"), "x, y; z");
        assert_eq!(unescape_text("back\\\\slash"), "back\\slash");
        assert_eq!(unescape_text("plain"), "plain");
    }
}
