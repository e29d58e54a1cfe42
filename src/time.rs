//! Time helpers: file windows, MCS Date/UTC columns and Mars calendar.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

/// Width of one MCS file window, in hours.
pub const FILE_HOURS: u32 = 4;

/// Format of the combined `Date` and `UTC` columns, e.g. `01-Jan-2016 00:00:01.5`.
pub const DATE_UTC_FMT: &str = "%d-%b-%Y %H:%M:%S%.f";

/// Days in a Mars year.
pub const DAYS_PER_MARS_YEAR: f64 = 686.9713;

/// Floor `date` to the start of its `hours`-wide slot within the day.
pub fn floor_to_hours(date: NaiveDateTime, hours: u32) -> NaiveDateTime {
    let hour = (date.hour() / hours) * hours;
    date.date().and_hms_opt(hour, 0, 0).unwrap_or(date)
}

/// Combine MCS `Date` and `UTC` column values. Quotes and padding are ignored;
/// unparseable values give `None`.
pub fn parse_date_utc(date: &str, utc: &str) -> Option<NaiveDateTime> {
    let date = date.trim().trim_matches('"').trim();
    let utc = utc.trim().trim_matches('"').trim();
    if date.is_empty() || utc.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(&format!("{date} {utc}"), DATE_UTC_FMT).ok()
}

/// Render a date-time the way MCS files write their `Date` and `UTC` columns.
pub fn format_date_utc(datetime: NaiveDateTime) -> (String, String) {
    (
        datetime.format("%d-%b-%Y").to_string(),
        datetime.format("%H:%M:%S%.3f").to_string(),
    )
}

/// Local true solar time in hours `[0, 24)` from a longitude and the
/// sub-solar longitude (degrees east).
pub fn ltst(lon: f64, subsolar_lon: f64) -> f64 {
    let mut delta = lon - subsolar_lon;
    if delta < -180.0 {
        delta += 360.0;
    }
    if delta >= 180.0 {
        delta -= 360.0;
    }
    (delta + 180.0) * 24.0 / 360.0
}

// ---------------------------------------------------------------------------
// Mars calendar (Allison & McEwen 2000)
// ---------------------------------------------------------------------------

/// Start of Mars Year 1 (Ls = 0), 1955-04-11 10:56 UTC.
fn mars_year_one() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1955, 4, 11)
        .and_then(|d| d.and_hms_opt(10, 56, 0))
        .unwrap_or_default()
}

fn j2000() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap_or_default()
}

/// TT - UTC, close enough for the MCS era.
const TT_MINUS_UTC_SECONDS: f64 = 69.184;

fn days_between(a: NaiveDateTime, b: NaiveDateTime) -> f64 {
    (b - a).num_milliseconds() as f64 / 86_400_000.0
}

/// Areocentric solar longitude in degrees `[0, 360)`.
pub fn solar_longitude(date: NaiveDateTime) -> f64 {
    const PBS: [(f64, f64, f64); 7] = [
        (0.0071, 2.2353, 49.409),
        (0.0057, 2.7543, 168.173),
        (0.0039, 1.1177, 191.837),
        (0.0037, 15.7866, 21.736),
        (0.0021, 2.1354, 15.704),
        (0.0020, 2.4694, 95.528),
        (0.0018, 32.8493, 49.095),
    ];
    let dt = days_between(j2000(), date) + TT_MINUS_UTC_SECONDS / 86_400.0;

    let m = (19.3871 + 0.524_020_73 * dt).to_radians();
    let alpha_fms = 270.3871 + 0.524_038_496 * dt;
    let pbs: f64 = PBS
        .iter()
        .map(|&(a, tau, phi)| a * ((0.985_626 * dt / tau + phi).to_radians()).cos())
        .sum();
    let nu_minus_m = (10.691 + 3.0e-7 * dt) * m.sin()
        + 0.623 * (2.0 * m).sin()
        + 0.050 * (3.0 * m).sin()
        + 0.005 * (4.0 * m).sin()
        + 0.0005 * (5.0 * m).sin()
        + pbs;

    (alpha_fms + nu_minus_m).rem_euclid(360.0)
}

/// Clancy Mars Year of `date`.
pub fn mars_year(date: NaiveDateTime) -> i64 {
    let years = days_between(mars_year_one(), date) / DAYS_PER_MARS_YEAR;
    let mut n = years.floor() as i64;
    let frac = years - years.floor();
    let ls = solar_longitude(date);
    // The mean year drifts against the true Ls = 0 crossing by a few days.
    if frac < 0.25 && ls > 270.0 {
        n -= 1;
    } else if frac > 0.75 && ls < 90.0 {
        n += 1;
    }
    n + 1
}

/// `date` moved by `days`, or `None` past the representable range.
fn shift_days(date: NaiveDateTime, days: f64) -> Option<NaiveDateTime> {
    let ms = days * 86_400_000.0;
    if !ms.is_finite() || ms.abs() >= i64::MAX as f64 {
        return None;
    }
    date.checked_add_signed(Duration::try_milliseconds(ms as i64)?)
}

/// UTC date at which Mars Year `my` reaches solar longitude `ls`.
/// Iterates until within `ls_thresh` degrees; `None` if it fails to converge
/// or the date is out of range.
pub fn mars_year_ls_to_utc(my: i64, ls: f64, ls_thresh: f64) -> Option<NaiveDateTime> {
    let days_per_degree = DAYS_PER_MARS_YEAR / 360.0;
    let guess_days = ((my - 1) as f64 + ls / 360.0) * DAYS_PER_MARS_YEAR;
    let mut date = shift_days(mars_year_one(), guess_days)?;

    for _ in 0..1000 {
        let diff = (ls - solar_longitude(date) + 540.0).rem_euclid(360.0) - 180.0;
        if diff.abs() < ls_thresh {
            return Some(date);
        }
        date = shift_days(date, diff * days_per_degree)?;
    }
    None
}
