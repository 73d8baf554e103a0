//! Transfer rate and ETA arithmetic.
//!
//! rsync prints rates such as `231.89MB/s` or `0.00kB/s` with decimal
//! (1000-based) units. These helpers turn them into bytes per second and back,
//! and derive a `H:MM:SS` time remaining from totals.

use crate::{Result, SyncError};
use regex::Regex;
use std::sync::OnceLock;

/// Unit prefixes in increasing powers of 1000. The empty prefix is plain bytes.
const UNITS: [&str; 9] = ["", "k", "M", "G", "T", "P", "E", "Z", "Y"];

/// Placeholder shown when the time remaining cannot be computed.
pub const UNKNOWN_ETA: &str = "-:--:--";

fn rate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^([0-9]+(?:\.[0-9]*)?)([KMGTPEZY]?)B/s$").expect("valid rate pattern")
    })
}

/// Parse a rate string such as `263.33MB/s` into bytes per second.
pub fn parse_rate(rate: &str) -> Result<f64> {
    let caps = rate_pattern()
        .captures(rate.trim())
        .ok_or_else(|| SyncError::MalformedRate(rate.to_string()))?;

    let value: f64 = caps[1]
        .parse()
        .map_err(|_| SyncError::MalformedRate(rate.to_string()))?;

    let unit = caps[2].to_ascii_lowercase();
    let power = UNITS
        .iter()
        .position(|u| u.to_ascii_lowercase() == unit)
        .unwrap_or(0);

    Ok(value * 1000f64.powi(power as i32))
}

/// Format bytes per second the way rsync does, e.g. `100.00kB/s`.
pub fn format_rate(bytes_per_second: f64) -> String {
    let mut value = if bytes_per_second.is_finite() {
        bytes_per_second.max(0.0)
    } else {
        0.0
    };
    let mut power = 0;

    while value >= 1000.0 && power < UNITS.len() - 1 {
        value /= 1000.0;
        power += 1;
    }

    format!("{:.2}{}B/s", value, UNITS[power])
}

/// Time remaining to move `total - completed` bytes at `rate` bytes per second.
///
/// Returns [`UNKNOWN_ETA`] when the rate is zero, negative or not a number.
pub fn eta(total: u64, completed: u64, rate: f64) -> String {
    if !rate.is_finite() || rate <= 0.0 {
        return UNKNOWN_ETA.to_string();
    }

    let remaining = total.saturating_sub(completed) as f64;
    format_duration((remaining / rate).ceil() as u64)
}

/// Format seconds as `H:MM:SS`.
pub fn format_duration(seconds: u64) -> String {
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
