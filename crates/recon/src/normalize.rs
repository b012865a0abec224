//! Field normalizers: identifiers, timestamps, amounts, categorical flags.
//!
//! Every parser here is lenient. A value that cannot be read becomes `None`
//! and flows downstream as "no value"; nothing in this module returns an
//! error except zone lookup, which is configuration.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Serialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

/// A source or report timezone: an IANA zone or a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl Zone {
    pub fn utc() -> Self {
        Self::Named(Tz::UTC)
    }

    /// Accepts IANA names (`Asia/Dhaka`, `Etc/GMT-2`) and fixed offsets
    /// (`UTC`, `UTC+2`, `GMT-05:30`, `+06:00`, `Z`).
    pub fn parse(input: &str) -> Result<Self, ReconError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(ReconError::UnknownTimezone(input.to_string()));
        }
        if let Some(offset) = parse_fixed_offset(s) {
            return Ok(Self::Fixed(offset));
        }
        s.parse::<Tz>()
            .map(Self::Named)
            .map_err(|_| ReconError::UnknownTimezone(input.to_string()))
    }

    /// Interpret a wall-clock time in this zone.
    ///
    /// Ambiguous local times (DST fall-back) take the earliest instant;
    /// non-existent ones (spring-forward gap) yield `None`.
    pub fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Self::Named(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::Fixed(off) => off
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    pub fn offset_at(&self, instant: &DateTime<Utc>) -> FixedOffset {
        match self {
            Self::Named(tz) => tz.offset_from_utc_datetime(&instant.naive_utc()).fix(),
            Self::Fixed(off) => *off,
        }
    }

    /// The instant as seen on a wall clock in this zone.
    pub fn to_local(&self, instant: &DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset_at(instant))
    }

    /// RFC 3339 rendering in this zone, e.g. `2024-01-01T06:00:00+06:00`.
    pub fn render(&self, instant: &DateTime<Utc>) -> String {
        self.to_local(instant).to_rfc3339()
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(tz) => write!(f, "{}", tz.name()),
            Self::Fixed(off) => write!(f, "UTC{off}"),
        }
    }
}

impl Serialize for Zone {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

fn parse_fixed_offset(s: &str) -> Option<FixedOffset> {
    let upper = s.to_ascii_uppercase();
    if matches!(upper.as_str(), "Z" | "UTC" | "GMT") {
        return FixedOffset::east_opt(0);
    }
    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(upper.as_str());

    let (sign, body) = if let Some(b) = rest.strip_prefix('+') {
        (1, b)
    } else if let Some(b) = rest.strip_prefix('-') {
        (-1, b)
    } else {
        return None;
    };

    let (hours, minutes) = if let Some((h, m)) = body.split_once(':') {
        (h, m)
    } else if body.len() == 4 {
        body.split_at(2)
    } else {
        (body, "0")
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M %:z",
    "%Y-%m-%d %H:%M%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Parse one timestamp cell to an absolute instant.
///
/// Values with explicit zone information are converted directly; naive
/// values are read as wall-clock time in `source`.
pub fn parse_instant(raw: &str, source: &Zone) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Some(naive_part) = strip_utc_marker(s) {
        return parse_naive(naive_part).map(|n| Utc.from_utc_datetime(&n));
    }
    parse_naive(s).and_then(|n| source.localize(n))
}

/// Parse a column of timestamp cells. Returns the instants and the number of
/// non-empty cells that could not be read.
pub fn parse_instants<'a>(
    values: impl Iterator<Item = &'a str>,
    source: &Zone,
) -> (Vec<Option<DateTime<Utc>>>, usize) {
    let mut failed = 0;
    let parsed = values
        .map(|v| {
            let ts = parse_instant(v, source);
            if ts.is_none() && !v.trim().is_empty() {
                failed += 1;
            }
            ts
        })
        .collect();
    (parsed, failed)
}

fn strip_utc_marker(s: &str) -> Option<&str> {
    for marker in [" UTC", " GMT", "UTC", "Z", "z"] {
        if let Some(head) = s.strip_suffix(marker) {
            if head.ends_with(|c: char| c.is_ascii_digit()) {
                return Some(head.trim_end());
            }
        }
    }
    None
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Amounts + identifiers
// ---------------------------------------------------------------------------

/// Numeric coercion. `1,250.00`, `$12`, `"-3.5"` and `(12.50)` all read;
/// anything else (including NaN/inf) is `None`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let mut s = raw.trim().trim_matches('"').trim();
    let parenthesized = s.len() >= 2 && s.starts_with('(') && s.ends_with(')');
    if parenthesized {
        s = &s[1..s.len() - 1];
    }
    let cleaned: String = s
        .chars()
        .filter(|c| *c != ',' && *c != '$' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if parenthesized { -value } else { value })
}

pub fn normalize_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("invalid email regex")
    })
}

/// All email addresses mentioned in a free-text field, normalized, in order.
pub fn extract_emails(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in email_re().find_iter(text) {
        let email = normalize_email(m.as_str());
        if !out.contains(&email) {
            out.push(email);
        }
    }
    out
}

/// First capture group of `pattern` in `text`, normalized as an identifier.
/// Empty when the pattern does not match.
pub fn extract_key(text: &str, pattern: &Regex) -> String {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| normalize_id(m.as_str()))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Categorical fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PayoutType {
    #[serde(rename = "CFD")]
    Cfd,
    Futures,
}

impl fmt::Display for PayoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cfd => write!(f, "CFD"),
            Self::Futures => write!(f, "Futures"),
        }
    }
}

/// `Futures` when the plan mentions futures, otherwise `CFD`.
pub fn payout_type(plan: &str) -> PayoutType {
    if plan.to_lowercase().contains("futures") {
        PayoutType::Futures
    } else {
        PayoutType::Cfd
    }
}

pub fn is_automation(status: &str) -> bool {
    status.to_lowercase().contains("automation")
}
