//! Description field extraction.
//!
//! Feed descriptions carry a mini directive language that publishers use
//! to smuggle structured data past their calendar software:
//!
//! ```text
//! Join us!
//! Tickets: https://example.com/t
//! Tags: concert, live
//! ```
//!
//! This module recovers those directives, collects every URL in the text
//! for fallback inference, and returns a cleaned display description with
//! the directive lines removed. It never fails: malformed or unknown
//! directives are simply left in place as ordinary text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::event::ParsedFields;

static BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p>|</div>|</li>").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("valid regex"));
static DIRECTIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(tickets|source|image|tags|organizer|pricefrom|featured)\s*:\s*(.+?)\s*$")
        .expect("valid regex")
});

/// Ordered domain fragments that identify ticket vendors. First match
/// wins when inferring a tickets URL without a directive.
const TICKET_VENDOR_DOMAINS: &[&str] = &[
    "eventbrite.",
    "ticketmaster.",
    "dice.fm",
    "seetickets.",
    "ticketweb.",
    "axs.com",
    "etix.com",
    "universe.com",
    "ticketleap.",
    "brownpapertickets.",
    "showclix.",
];

/// Ordered domain fragments that identify image hosts, consulted after
/// the file-extension check.
const IMAGE_HOST_DOMAINS: &[&str] = &[
    "imgur.com",
    "cloudinary.com",
    "staticflickr.com",
    "squarespace-cdn.com",
    "images.unsplash.com",
];

static IMAGE_EXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(jpe?g|png|gif|webp)(\?[^\s]*)?$").expect("valid regex"));

const FEATURED_TOKENS: &[&str] = &["yes", "true", "1", "y"];

/// Extract structured fields from a raw description.
///
/// Returns the parsed fields and the cleaned display description
/// (markup stripped, directive lines removed, blank runs collapsed).
pub fn extract_fields(description: &str) -> (ParsedFields, String) {
    let text = clean_markup(description);

    let mut fields = ParsedFields::default();
    let mut kept_lines: Vec<&str> = Vec::new();

    // URLs are collected from the whole cleaned text, directive lines
    // included, so fallback inference still sees directive values.
    fields.urls = URL_RE
        .find_iter(&text)
        .map(|m| trim_url(m.as_str()).to_string())
        .collect();

    for line in text.lines() {
        match DIRECTIVE_RE.captures(line) {
            Some(caps) => {
                let key = caps[1].to_lowercase();
                let value = caps[2].trim();
                apply_directive(&mut fields, &key, value);
            }
            None => kept_lines.push(line),
        }
    }

    apply_fallbacks(&mut fields);

    (fields, collapse_blank_lines(&kept_lines))
}

fn apply_directive(fields: &mut ParsedFields, key: &str, value: &str) {
    match key {
        "tickets" => fields.tickets_url = first_url(value),
        "source" => fields.source_url = first_url(value),
        "image" => fields.image_url = first_url(value),
        "tags" => {
            fields.tags.extend(
                value
                    .split(',')
                    .map(|t| t.trim().to_lowercase())
                    .filter(|t| !t.is_empty()),
            );
        }
        "organizer" => {
            if !value.is_empty() {
                fields.organizer_override = Some(value.to_string());
            }
        }
        "pricefrom" => {
            // Tolerate a leading currency symbol and thousands commas.
            let cleaned: String = value
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            if let Ok(price) = cleaned.parse::<f64>() {
                fields.price_from = Some(price);
            }
        }
        "featured" => {
            fields.featured = FEATURED_TOKENS.contains(&value.to_lowercase().as_str());
        }
        _ => {}
    }
}

/// Fallback inference for tickets and image URLs when no directive
/// supplied them, evaluated top-to-bottom over the collected URLs.
fn apply_fallbacks(fields: &mut ParsedFields) {
    if fields.tickets_url.is_none() {
        let vendor_url = fields.urls.iter().find(|url| {
            let lower = url.to_lowercase();
            TICKET_VENDOR_DOMAINS.iter().any(|d| lower.contains(d))
        });
        fields.tickets_url = vendor_url.or_else(|| fields.urls.first()).cloned();
    }

    if fields.image_url.is_none() {
        let by_ext = fields.urls.iter().find(|url| IMAGE_EXT_RE.is_match(url));
        let by_host = || {
            fields.urls.iter().find(|url| {
                let lower = url.to_lowercase();
                IMAGE_HOST_DOMAINS.iter().any(|d| lower.contains(d))
            })
        };
        fields.image_url = by_ext.or_else(by_host).cloned();
    }
}

/// Normalize markup to line breaks, strip remaining tags, decode common
/// entities, and collapse runs of spaces/tabs within lines.
fn clean_markup(text: &str) -> String {
    let text = BREAK_RE.replace_all(text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);

    text.lines()
        .map(|line| {
            line.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode the handful of entities that show up in calendar descriptions.
/// `&amp;` goes last so `&amp;lt;` does not double-decode.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn first_url(value: &str) -> Option<String> {
    URL_RE
        .find(value)
        .map(|m| trim_url(m.as_str()).to_string())
}

/// Strip trailing punctuation that sentence context glues onto URLs.
fn trim_url(url: &str) -> &str {
    url.trim_end_matches(|c| matches!(c, '.' | ',' | ';' | ':' | ')' | ']' | '!' | '?'))
}

fn collapse_blank_lines(lines: &[&str]) -> String {
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut last_blank = false;
    for line in lines {
        let blank = line.trim().is_empty();
        if blank && last_blank {
            continue;
        }
        out.push(line);
        last_blank = blank;
    }
    out.join("\n").trim().to_string()
}
