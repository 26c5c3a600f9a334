use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

pub const MISSING: &str = "—";

/// Trimmed value, or the fallback when the field is absent or blank.
pub fn fmt_or<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
    match value {
        Some(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                fallback
            } else {
                trimmed
            }
        }
        None => fallback,
    }
}

/// Strips terminal control characters so backend text cannot corrupt the
/// display. Newlines and tabs are kept; tabs render as spaces downstream.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|ch| !ch.is_control() || *ch == '\n' || *ch == '\t')
        .collect()
}

/// First `max` characters of `input`, ellipsized when anything was cut.
pub fn truncate_chars(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max).collect();
    out.push_str("...");
    out
}

const SHORT_MONTHS: [&str; 12] = [
    "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sep", "oct", "nov", "dic",
];

/// "12 ago. 2025" style label. Missing input yields "Sin fecha", an
/// unparseable one "Fecha inválida".
pub fn format_short_date(value: Option<&str>) -> String {
    let Some(raw) = value else {
        return "Sin fecha".to_string();
    };
    if raw.trim().is_empty() {
        return "Sin fecha".to_string();
    }
    match parse_datetime(raw) {
        Some(date) => format!(
            "{} {}. {}",
            date.day(),
            SHORT_MONTHS[date.month0() as usize],
            date.year()
        ),
        None => "Fecha inválida".to_string(),
    }
}

/// "HH:MM[:SS]" wall-clock strings become "H:MM AM/PM"; anything without a
/// colon passes through untouched. Missing input yields "Sin hora".
pub fn format_12_hour(value: Option<&str>) -> String {
    let Some(raw) = value else {
        return "Sin hora".to_string();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "Sin hora".to_string();
    }
    let Some((hours, rest)) = trimmed.split_once(':') else {
        return trimmed.to_string();
    };
    let Ok(hour24) = hours.trim().parse::<u32>() else {
        return trimmed.to_string();
    };
    let minutes = rest.split(':').next().unwrap_or(rest);
    let hour12 = match hour24 {
        0 => 12,
        h if h > 12 => h - 12,
        h => h,
    };
    let ampm = if hour24 >= 12 { "PM" } else { "AM" };
    format!("{hour12}:{minutes} {ampm}")
}

static EXTENSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^/.]+$").expect("extension regex"));
static PROGRAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^0-9]*[A-Za-z][^0-9]*?)\s*[0-9]").expect("program regex"));
static PROGRAM_FALLBACK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9]*\s*[A-Za-z]*)").expect("fallback regex"));

/// Display program name derived from a recording filename: drop the
/// extension, then take the leading run of non-digit text up to the first
/// digit (recordings are named "<program> <timestamp>").
pub fn extract_program_name(filename: Option<&str>) -> String {
    let Some(raw) = filename else {
        return "Sin programa".to_string();
    };
    if raw.trim().is_empty() {
        return "Sin programa".to_string();
    }
    let stem = EXTENSION_RE.replace(raw, "");

    if let Some(caps) = PROGRAM_RE.captures(&stem) {
        return caps[1].trim().to_string();
    }
    if let Some(caps) = PROGRAM_FALLBACK_RE.captures(&stem) {
        return caps[1].trim().to_string();
    }
    stem.to_string()
}

pub fn capitalize_first(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => {
            first.to_uppercase().collect::<String>() + chars.as_str().to_lowercase().as_str()
        }
        None => String::new(),
    }
}

pub fn is_valid_url(input: &str) -> bool {
    match Url::parse(input) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Parses the handful of timestamp shapes the alert table carries: RFC 3339
/// with or without offset, and plain "date time" / date strings.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if let Ok(with_offset) = DateTime::<FixedOffset>::parse_from_rfc3339(trimmed) {
        return Some(with_offset.naive_utc());
    }
    for pattern in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, pattern) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
