//! Active-hours evaluation — is an agent allowed to run right now, and if
//! not, when next?
//!
//! The config timezone resolves as: `""`/`"local"` → system local, `"user"`
//! → the owner's timezone (falling back to local), `"utc"` → UTC, anything
//! else → IANA lookup via chrono-tz. An unknown name is an error rather
//! than a silent fallback so a typo can't quietly run heartbeats at 3am.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::{Result, SchedulerError};
use crate::types::ActiveHoursConfig;

/// Minutes in a full day; `end = "24:00"` parses to this.
const END_OF_DAY_MINUTES: u32 = 24 * 60;

enum ResolvedTz {
    Local,
    Utc,
    Named(Tz),
}

fn resolve_timezone(timezone: &str, user_tz: &str) -> Result<ResolvedTz> {
    let tz = timezone.trim();
    if tz.is_empty() || tz.eq_ignore_ascii_case("local") {
        return Ok(ResolvedTz::Local);
    }
    if tz.eq_ignore_ascii_case("user") {
        let user = user_tz.trim();
        if user.is_empty() || user.eq_ignore_ascii_case("user") {
            return Ok(ResolvedTz::Local);
        }
        return resolve_timezone(user, "");
    }
    if tz.eq_ignore_ascii_case("utc") {
        return Ok(ResolvedTz::Utc);
    }
    tz.parse::<Tz>()
        .map(ResolvedTz::Named)
        .map_err(|_| SchedulerError::InvalidTimezone(tz.to_string()))
}

/// Parse "HH:MM" into minutes since midnight. `allow_2400` admits the exact
/// string "24:00" (end-of-day) and nothing past it.
pub fn parse_hhmm(s: &str, allow_2400: bool) -> Result<u32> {
    if allow_2400 && s == "24:00" {
        return Ok(END_OF_DAY_MINUTES);
    }
    let bad = || SchedulerError::InvalidTimeFormat(s.to_string());
    let (h, m) = s.split_once(':').ok_or_else(bad)?;
    if h.len() != 2 || m.len() != 2 {
        return Err(bad());
    }
    let hour: u32 = h.parse().map_err(|_| bad())?;
    let minute: u32 = m.parse().map_err(|_| bad())?;
    if hour > 23 || minute > 59 {
        return Err(bad());
    }
    Ok(hour * 60 + minute)
}

/// (local calendar date, weekday with 0 = Sunday, minutes since midnight).
fn local_parts(tz: &ResolvedTz, t: DateTime<Utc>) -> (NaiveDate, u8, u32) {
    fn parts<Z: TimeZone>(local: DateTime<Z>) -> (NaiveDate, u8, u32) {
        (
            local.date_naive(),
            local.weekday().num_days_from_sunday() as u8,
            local.hour() * 60 + local.minute(),
        )
    }
    match tz {
        ResolvedTz::Local => parts(t.with_timezone(&chrono::Local)),
        ResolvedTz::Utc => parts(t),
        ResolvedTz::Named(z) => parts(t.with_timezone(z)),
    }
}

/// The UTC instant of `minutes` past midnight on `date` in `tz`. `None` for
/// local times skipped by a DST gap.
fn instant_on(tz: &ResolvedTz, date: NaiveDate, minutes: u32) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)?;
    let naive = date.and_time(time);
    match tz {
        ResolvedTz::Local => chrono::Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|d| d.with_timezone(&Utc)),
        ResolvedTz::Utc => Some(Utc.from_utc_datetime(&naive)),
        ResolvedTz::Named(z) => z
            .from_local_datetime(&naive)
            .earliest()
            .map(|d| d.with_timezone(&Utc)),
    }
}

fn day_allowed(days: &[u8], date: NaiveDate) -> bool {
    days.is_empty() || days.contains(&(date.weekday().num_days_from_sunday() as u8))
}

/// Is `t` inside the configured window? A disabled config is always active.
///
/// Normal windows (`start ≤ end`) are the half-open range `[start, end)`.
/// Overnight windows (`start > end`) cover `[start, 24:00) ∪ [00:00, end)`.
pub fn is_active_at(config: &ActiveHoursConfig, t: DateTime<Utc>, user_tz: &str) -> Result<bool> {
    if !config.enabled {
        return Ok(true);
    }
    let tz = resolve_timezone(&config.timezone, user_tz)?;
    let (_, weekday, cur) = local_parts(&tz, t);
    if !config.days.is_empty() && !config.days.contains(&weekday) {
        return Ok(false);
    }
    let start = parse_hhmm(&config.start, false)?;
    let end = parse_hhmm(&config.end, true)?;
    Ok(if start <= end {
        start <= cur && cur < end
    } else {
        cur >= start || cur < end
    })
}

/// Earliest instant ≥ `t` at which the window is active.
///
/// Probes up to 8 days (today plus a full week) and falls back to `t`
/// unchanged if no allowed day is found — possible only for degenerate
/// configs such as an empty window on every allowed day.
pub fn next_active_time(
    config: &ActiveHoursConfig,
    t: DateTime<Utc>,
    user_tz: &str,
) -> Result<DateTime<Utc>> {
    if !config.enabled {
        return Ok(t);
    }
    let tz = resolve_timezone(&config.timezone, user_tz)?;
    let start = parse_hhmm(&config.start, false)?;
    parse_hhmm(&config.end, true)?;
    let (today, _, _) = local_parts(&tz, t);

    for offset in 0..8i64 {
        if offset == 0 {
            if is_active_at(config, t, user_tz)? {
                return Ok(t);
            }
            if day_allowed(&config.days, today) {
                if let Some(start_today) = instant_on(&tz, today, start) {
                    if start_today > t {
                        return Ok(start_today);
                    }
                }
            }
            continue;
        }
        let date = today + Duration::days(offset);
        if !day_allowed(&config.days, date) {
            continue;
        }
        if let Some(candidate) = instant_on(&tz, date, start) {
            return Ok(candidate);
        }
    }
    Ok(t)
}
