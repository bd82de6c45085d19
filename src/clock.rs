//! Fixed-point time arithmetic.
//!
//! Every onset, duration, record duration and view time in the crate is a
//! signed 64-bit count of ticks, where one second is [`TICKS_PER_SECOND`]
//! ticks. Keeping time in integers makes record boundaries, warm-up windows
//! and epoch alignment bit-reproducible regardless of scroll position.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

/// Number of ticks in one second
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Number of decimal digits a tick resolves below one second
const TICK_DIGITS: u32 = 7;

/// First year representable in an EDF header date
pub const FIRST_YEAR: i32 = 1985;

/// Last year representable in an EDF header date
pub const LAST_YEAR: i32 = 2084;

/// Convert seconds to ticks, rounding to the nearest tick
pub fn seconds_to_ticks(seconds: f64) -> i64 {
    (seconds * TICKS_PER_SECOND as f64).round() as i64
}

/// Convert ticks to seconds
pub fn ticks_to_seconds(ticks: i64) -> f64 {
    ticks as f64 / TICKS_PER_SECOND as f64
}

/// Duration of `seconds` rounded up to the next whole tick.
///
/// Used for warm-up requirements, which must never fall short.
pub fn ceil_ticks(seconds: f64) -> i64 {
    (seconds * TICKS_PER_SECOND as f64).ceil() as i64
}

/// Duration of one period of `frequency_hz`, rounded up to the next tick
pub fn ticks_for_period(frequency_hz: f64) -> i64 {
    (TICKS_PER_SECOND as f64 / frequency_hz).ceil() as i64
}

/// Duration of `samples` sample periods at `sample_rate` Hz, rounded up
pub fn ticks_for_samples(samples: usize, sample_rate: f64) -> i64 {
    (samples as f64 * TICKS_PER_SECOND as f64 / sample_rate).ceil() as i64
}

/// Floor division that rounds towards negative infinity.
///
/// Record indices of negative view times must never wrap towards zero.
pub fn floor_div(ticks: i64, unit: i64) -> i64 {
    ticks.div_euclid(unit)
}

/// Remainder matching [`floor_div`], always in `0..unit`
pub fn floor_rem(ticks: i64, unit: i64) -> i64 {
    ticks.rem_euclid(unit)
}

/// The Unix epoch as a naive date-time
fn unix_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Start of the representable calendar range, 1985-01-01 00:00:00
pub fn clamp_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(FIRST_YEAR, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Clamp a date-time into the 1985–2084 range.
///
/// Values outside the range collapse to [`clamp_epoch`], not to the nearest
/// bound.
pub fn clamp_to_range(datetime: NaiveDateTime) -> NaiveDateTime {
    if !(FIRST_YEAR..=LAST_YEAR).contains(&datetime.year()) {
        clamp_epoch()
    } else {
        datetime
    }
}

/// Convert a date-time to ticks since 1970-01-01 00:00:00.
///
/// Exact: whole seconds and nanoseconds are converted separately, the
/// sub-tick part of the nanoseconds is truncated.
pub fn datetime_to_ticks(datetime: NaiveDateTime) -> i64 {
    let delta = datetime - unix_epoch();
    let seconds = delta.num_seconds();
    let nanos = (delta - chrono::Duration::seconds(seconds))
        .num_nanoseconds()
        .unwrap_or(0);
    seconds * TICKS_PER_SECOND + nanos / 100
}

/// Convert ticks since 1970-01-01 00:00:00 back to a date-time
pub fn ticks_to_datetime(ticks: i64) -> NaiveDateTime {
    let seconds = floor_div(ticks, TICKS_PER_SECOND);
    let sub = floor_rem(ticks, TICKS_PER_SECOND);
    unix_epoch() + chrono::Duration::seconds(seconds) + chrono::Duration::nanoseconds(sub * 100)
}

/// Parse the start date and time fields of an EDF header.
///
/// `date` is `dd.mm.yy`, `time` is `hh.mm.ss`. Two-digit years 85–99 belong
/// to the 1900s, 00–84 to the 2000s. Anything unparsable or out of range
/// yields 1985-01-01 00:00:00.
pub fn parse_header_datetime(date: &str, time: &str) -> NaiveDateTime {
    let parse_triplet = |s: &str| -> Option<(u32, u32, u32)> {
        let mut parts = s.trim().split(['.', ':']);
        let a = parts.next()?.trim().parse().ok()?;
        let b = parts.next()?.trim().parse().ok()?;
        let c = parts.next()?.trim().parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some((a, b, c))
    };

    let parsed = parse_triplet(date).and_then(|(day, month, yy)| {
        if yy > 99 {
            return None;
        }
        let year = (if yy >= 85 { 1900 + yy } else { 2000 + yy }) as i32;
        let (h, m, s) = parse_triplet(time)?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let time = NaiveTime::from_hms_opt(h, m, s)?;
        Some(NaiveDateTime::new(date, time))
    });

    match parsed {
        Some(dt) => clamp_to_range(dt),
        None => {
            tracing::warn!("Unparsable header start '{} {}', using 1985-01-01", date, time);
            clamp_epoch()
        }
    }
}

/// Parse a decimal number of seconds into ticks without rounding drift.
///
/// Returns `None` for negative values, malformed text, or more fractional
/// digits than a tick can represent (trailing zeros excepted).
pub fn parse_seconds_exact(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() || text.starts_with('-') {
        return None;
    }
    let text = text.strip_prefix('+').unwrap_or(text);
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let frac_trimmed = frac_part.trim_end_matches('0');
    if frac_trimmed.len() > TICK_DIGITS as usize {
        return None;
    }

    let whole: i64 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    let mut frac: i64 = if frac_trimmed.is_empty() { 0 } else { frac_trimmed.parse().ok()? };
    frac *= 10_i64.pow(TICK_DIGITS - frac_trimmed.len() as u32);

    whole.checked_mul(TICKS_PER_SECOND)?.checked_add(frac)
}

/// Render a signed tick offset as `[-]hh:mm:ss.fffffff`
pub fn format_offset(ticks: i64) -> String {
    let sign = if ticks < 0 { "-" } else { "" };
    let abs = ticks.unsigned_abs();
    let tps = TICKS_PER_SECOND as u64;
    let seconds = abs / tps;
    let frac = abs % tps;
    format!(
        "{}{:02}:{:02}:{:02}.{:07}",
        sign,
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60,
        frac
    )
}

/// Inclusive record range covering a wall-clock window.
///
/// `window_start` and `window_end` are offsets from the recording start,
/// widened by `pre_padding` and `post_padding`. The start is clamped to
/// record 0 and the end to the last record; `None` if the widened window
/// lies entirely outside the recording.
pub fn record_range_for_window(
    window_start: i64,
    window_end: i64,
    pre_padding: i64,
    post_padding: i64,
    record_duration: i64,
    total_records: u64,
) -> Option<(u64, u64)> {
    if record_duration <= 0 || total_records == 0 || window_end < window_start {
        return None;
    }
    let start = window_start.saturating_sub(pre_padding);
    let end = window_end.saturating_add(post_padding);
    let recording_end = record_duration.saturating_mul(total_records as i64);
    if end < 0 || start >= recording_end {
        return None;
    }

    let first = floor_div(start.max(0), record_duration) as u64;
    let last = (floor_div(end.max(0), record_duration) as u64).min(total_records - 1);
    Some((first, last))
}
