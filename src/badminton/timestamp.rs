//! Timestamp parsing for model output.
//!
//! The model is asked for strings and answers in several styles:
//! plain seconds (`"12.5"`), `MM:SS` or `HH:MM:SS`, each with optional
//! fractional seconds and an optional trailing `s`.

use regex::Regex;
use std::sync::OnceLock;

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(?:(\d+):)?(\d+):)?(\d+(?:\.\d+)?)s?$").expect("timestamp regex is valid")
    })
}

/// Parse a timestamp into seconds. Returns `None` for anything unrecognised.
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let caps = timestamp_regex().captures(value.trim())?;

    let hours: f64 = caps.get(1).map_or(Ok(0.0), |m| m.as_str().parse()).ok()?;
    let minutes: f64 = caps.get(2).map_or(Ok(0.0), |m| m.as_str().parse()).ok()?;
    let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;

    // Clock components must stay within their ranges once a larger unit is present
    if caps.get(2).is_some() && seconds >= 60.0 {
        return None;
    }
    if caps.get(1).is_some() && minutes >= 60.0 {
        return None;
    }

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Format seconds as `MM:SS.ss` for logs and reports
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let minutes = (seconds / 60.0).floor();
    format!("{:02}:{:05.2}", minutes as u64, seconds - minutes * 60.0)
}
