//! Canonicalization: identity keys, content hash, record assembly.
//!
//! This stage is pure given its inputs. The orchestrator passes `now`
//! explicitly so tests can pin time.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sha2::{Digest, Sha256};

use crate::event::{CanonicalEvent, Category, EventStatus, ParsedFields, RawEvent};

/// Placeholder venue segment for events with no location at all.
const NO_VENUE: &str = "unknown-venue";

/// Deployment-wide normalization context.
#[derive(Debug, Clone)]
pub struct CanonicalCtx {
    /// Display timezone; also the calendar used for the canonical key's
    /// date component.
    pub tz: Tz,
    /// Every ingested event belongs to the deployment's target city.
    pub city: String,
}

/// Assemble the final record and compute its identity keys.
pub fn canonicalize(
    raw: &RawEvent,
    fields: &ParsedFields,
    clean_description: &str,
    category: Category,
    ctx: &CanonicalCtx,
    now: DateTime<Utc>,
) -> CanonicalEvent {
    let (venue, address) = split_location(raw.location.as_deref());
    let organizer = fields
        .organizer_override
        .clone()
        .or_else(|| raw.organizer.clone());

    let canonical_key =
        canonical_key(&raw.title, raw.start_at, raw.all_day, venue.as_deref(), ctx.tz);
    let content_hash = content_hash(clean_description, organizer.as_deref(), fields);

    CanonicalEvent {
        source_uid: raw.source_uid.clone(),
        canonical_key,
        content_hash,
        title: raw.title.clone(),
        description: clean_description.to_string(),
        category,
        start_at: raw.start_at,
        end_at: raw.end_at,
        timezone: ctx.tz.name().to_string(),
        all_day: raw.all_day,
        venue,
        address,
        city: ctx.city.clone(),
        organizer,
        tickets_url: fields.tickets_url.clone(),
        source_url: fields.source_url.clone(),
        image_url: fields.image_url.clone(),
        price_from: fields.price_from,
        tags: fields.tags.clone(),
        featured: fields.featured,
        status: EventStatus::Upcoming,
        created_at: now,
        updated_at: now,
    }
}

/// Normalized fingerprint: title | local date (+time when timed) | venue.
///
/// Stable across re-fetches and across feeds that describe the same
/// occurrence without a shared UID.
pub fn canonical_key(
    title: &str,
    start_at: DateTime<Utc>,
    all_day: bool,
    venue: Option<&str>,
    tz: Tz,
) -> String {
    let local = start_at.with_timezone(&tz);
    let when = if all_day {
        local.format("%Y-%m-%d").to_string()
    } else {
        local.format("%Y-%m-%d-%H%M").to_string()
    };
    format!(
        "{}|{}|{}",
        normalize(title),
        when,
        venue.map(normalize).unwrap_or_else(|| NO_VENUE.to_string())
    )
}

/// Hash over the fields that constitute "content that changed":
/// description, organizer, tickets URL, image URL, tags. Identity and
/// timing fields are deliberately excluded so a re-published, re-fetched
/// feed with identical content hashes identically.
pub fn content_hash(description: &str, organizer: Option<&str>, fields: &ParsedFields) -> String {
    let tags: Vec<&str> = fields.tags.iter().map(String::as_str).collect();
    let mut hasher = Sha256::new();
    for part in [
        description,
        organizer.unwrap_or(""),
        fields.tickets_url.as_deref().unwrap_or(""),
        fields.image_url.as_deref().unwrap_or(""),
        &tags.join(","),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}

/// Lowercase, reduce to alphanumeric runs joined by single dashes, trim.
fn normalize(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// LOCATION free text is conventionally "Venue, street address". The
/// venue is the segment before the first comma; the full text is kept
/// as the address.
fn split_location(location: Option<&str>) -> (Option<String>, Option<String>) {
    match location {
        Some(loc) if !loc.trim().is_empty() => {
            let venue = loc
                .split(',')
                .next()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            (venue, Some(loc.trim().to_string()))
        }
        _ => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    const TZ: Tz = chrono_tz::America::Chicago;

    fn raw(title: &str, uid: Option<&str>) -> RawEvent {
        RawEvent {
            title: title.to_string(),
            start_at: Utc.with_ymd_and_hms(2025, 6, 1, 19, 0, 0).unwrap(),
            end_at: Utc.with_ymd_and_hms(2025, 6, 1, 22, 0, 0).unwrap(),
            all_day: false,
            location: Some("First Avenue, 701 N 1st Ave, Minneapolis".to_string()),
            description: None,
            organizer: Some("The Venue".to_string()),
            source_uid: uid.map(String::from),
            tz_hint: None,
        }
    }

    fn ctx() -> CanonicalCtx {
        CanonicalCtx {
            tz: TZ,
            city: "Minneapolis".to_string(),
        }
    }

    #[test]
    fn test_canonical_key_normalization() {
        let key = canonical_key(
            "  Jazz Night!  (Late Show) ",
            Utc.with_ymd_and_hms(2025, 6, 1, 19, 0, 0).unwrap(),
            false,
            Some("First Avenue"),
            TZ,
        );
        // 19:00Z is 14:00 local in June (CDT)
        assert_eq!(key, "jazz-night-late-show|2025-06-01-1400|first-avenue");
    }

    #[test]
    fn test_canonical_key_all_day_uses_date_only() {
        let key = canonical_key(
            "Street Fair",
            Utc.with_ymd_and_hms(2025, 6, 1, 5, 0, 0).unwrap(),
            true,
            None,
            TZ,
        );
        assert_eq!(key, "street-fair|2025-06-01|unknown-venue");
    }

    #[test]
    fn test_content_hash_ignores_timing() {
        let fields = ParsedFields::default();
        let a = content_hash("desc", Some("org"), &fields);
        let b = content_hash("desc", Some("org"), &fields);
        assert_eq!(a, b);

        let c = content_hash("desc changed", Some("org"), &fields);
        assert_ne!(a, c);
    }

    #[test]
    fn test_content_hash_field_boundaries_are_unambiguous() {
        let fields = ParsedFields::default();
        // "ab" + "" must not hash like "a" + "b"
        let a = content_hash("ab", Some(""), &fields);
        let b = content_hash("a", Some("b"), &fields);
        assert_ne!(a, b);
    }

    #[test]
    fn test_content_hash_tag_order_is_stable() {
        let mut one = ParsedFields::default();
        one.tags = BTreeSet::from(["live".to_string(), "concert".to_string()]);
        let mut two = ParsedFields::default();
        two.tags = BTreeSet::from(["concert".to_string(), "live".to_string()]);

        assert_eq!(
            content_hash("d", None, &one),
            content_hash("d", None, &two)
        );
    }

    #[test]
    fn test_canonicalize_assembles_record() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let mut fields = ParsedFields::default();
        fields.organizer_override = Some("Promoter LLC".to_string());
        fields.tickets_url = Some("https://example.com/t".to_string());

        let event = canonicalize(
            &raw("Jazz Night", Some("uid-1")),
            &fields,
            "Doors at 7.",
            Category::Concert,
            &ctx(),
            now,
        );

        assert_eq!(event.source_uid.as_deref(), Some("uid-1"));
        assert_eq!(event.venue.as_deref(), Some("First Avenue"));
        assert_eq!(
            event.address.as_deref(),
            Some("First Avenue, 701 N 1st Ave, Minneapolis")
        );
        // Directive organizer overrides the feed's ORGANIZER
        assert_eq!(event.organizer.as_deref(), Some("Promoter LLC"));
        assert_eq!(event.city, "Minneapolis");
        assert_eq!(event.timezone, "America/Chicago");
        assert_eq!(event.status, EventStatus::Upcoming);
        assert_eq!(event.created_at, now);
        assert!(event.end_at >= event.start_at);
        assert!(!event.canonical_key.is_empty());
    }

    #[test]
    fn test_same_inputs_same_keys() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let fields = ParsedFields::default();
        let a = canonicalize(&raw("Jazz Night", None), &fields, "d", Category::Concert, &ctx(), now);
        let later = Utc.with_ymd_and_hms(2025, 5, 2, 9, 30, 0).unwrap();
        let b = canonicalize(&raw("Jazz Night", None), &fields, "d", Category::Concert, &ctx(), later);

        // Re-fetching at a different moment changes nothing identity-wise.
        assert_eq!(a.canonical_key, b.canonical_key);
        assert_eq!(a.content_hash, b.content_hash);
    }
}
