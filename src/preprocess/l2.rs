//! Half-orbit selection and latitude × altitude cross sections of L2
//! retrievals.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDateTime};

use crate::data::model::{RecordSet, Value};
use crate::data::reader::DT_COLUMN;
use crate::data::schema::PROFILE_ID_COLUMN;
use crate::error::Result;

/// 1 for daytime profiles, 0 for night.
pub const DAY_COLUMN: &str = "day";

const ORBIT_COLUMN: &str = "Orb_num";
const LTST_COLUMN: &str = "LTST";

/// Night profiles of the following orbit kept after the orbit's last view.
const NEXT_ORBIT_SLACK_MINUTES: i64 = 30;

/// DDR2 quantities offered for cross sections.
pub const SECTION_QUANTITIES: [&str; 5] = ["T", "Dust", "H2Oice", "CO2ice", "H2Ovap"];

/// Daytime is 06:00 to 18:00 local true solar time. DDR1 stores LTST as a
/// fraction of a sol.
pub fn is_daytime(ltst_fraction: f64) -> bool {
    let hours = ltst_fraction * 24.0;
    (6.0..18.0).contains(&hours)
}

/// Add the [`DAY_COLUMN`] flag to DDR1 rows. Rows without LTST get null.
pub fn add_day_column(ddr1: &RecordSet) -> Result<RecordSet> {
    let ltst = ddr1.require_column(LTST_COLUMN)?;
    let mut out = ddr1.clone();
    out.add_derived_column(DAY_COLUMN, |row| match row[ltst].as_f64() {
        Some(v) => Value::Int(is_daytime(v) as i64),
        None => Value::Null,
    })?;
    Ok(out)
}

fn is_day(v: &Value) -> Option<bool> {
    v.as_f64().map(|d| d != 0.0)
}

/// Profiles making up the half orbit of `orbit` seen in DDR1 rows carrying
/// `dt` and [`DAY_COLUMN`]:
///
/// - the orbit's daytime profiles,
/// - its night profiles after the last daytime one,
/// - night profiles of the next orbit until half an hour after the orbit's
///   last profile.
pub fn half_orbit_profiles(ddr1: &RecordSet, orbit: i64) -> Result<BTreeSet<String>> {
    let id = ddr1.require_column(PROFILE_ID_COLUMN)?;
    let orb = ddr1.require_column(ORBIT_COLUMN)?;
    let dt = ddr1.require_column(DT_COLUMN)?;
    let day = ddr1.require_column(DAY_COLUMN)?;

    let rows: Vec<(i64, NaiveDateTime, bool, &str)> = ddr1
        .rows()
        .iter()
        .filter_map(|r| {
            let o = r[orb].as_f64()? as i64;
            Some((o, r[dt].as_datetime()?, is_day(&r[day])?, r[id].as_str()?))
        })
        .collect();

    let last_day = rows
        .iter()
        .filter(|(o, _, d, _)| *o == orbit && *d)
        .map(|(_, t, _, _)| *t)
        .max();
    let next_orbit_until = rows
        .iter()
        .filter(|(o, ..)| *o == orbit)
        .map(|(_, t, _, _)| *t)
        .max()
        .and_then(|t| t.checked_add_signed(Duration::minutes(NEXT_ORBIT_SLACK_MINUTES)));

    let selected: BTreeSet<String> = rows
        .iter()
        .filter(|&&(o, t, d, _)| {
            let this_day = o == orbit && d;
            let this_night = o == orbit && !d && last_day.is_some_and(|last| t > last);
            let next_night =
                o == orbit + 1 && !d && next_orbit_until.is_some_and(|until| t < until);
            this_day || this_night || next_night
        })
        .map(|(_, _, _, p)| p.to_string())
        .collect();
    log::debug!("Half orbit {orbit}: {} profiles", selected.len());
    Ok(selected)
}

/// Rows flagged day and rows flagged night. Rows without the flag go to
/// neither.
pub fn split_day_night(records: &RecordSet) -> Result<(RecordSet, RecordSet)> {
    let day = records.require_column(DAY_COLUMN)?;
    Ok((
        records.filter(|r| is_day(&r[day]) == Some(true)),
        records.filter(|r| is_day(&r[day]) == Some(false)),
    ))
}

/// One retrieval level of a cross section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionPoint {
    pub lat: f64,
    pub alt: f64,
    pub value: f64,
}

/// Latitude, altitude and `quantity` of every DDR2 row with all three
/// present, sorted by value so the largest draw on top.
pub fn cross_section(records: &RecordSet, quantity: &str) -> Result<Vec<SectionPoint>> {
    let lat = records.require_column("Lat")?;
    let alt = records.require_column("Alt")?;
    let q = records.require_column(quantity)?;
    let mut points: Vec<SectionPoint> = records
        .rows()
        .iter()
        .filter_map(|r| {
            Some(SectionPoint {
                lat: r[lat].as_f64()?,
                alt: r[alt].as_f64()?,
                value: r[q].as_f64()?,
            })
        })
        .collect();
    points.sort_by(|a, b| a.value.total_cmp(&b.value));
    Ok(points)
}
