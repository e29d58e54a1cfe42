//! Pairs limb views with the nearest on-planet view taken around the same time.

use chrono::{Duration, NaiveDateTime};

use crate::data::model::{RecordSet, Value};
use crate::data::reader::DT_COLUMN;
use crate::error::Result;
use crate::geom::haversine_dist;

pub const CLOSEST_OP_DISTANCE_COLUMN: &str = "closest_op_hdist";
pub const CLOSEST_OP_TIME_COLUMN: &str = "closest_op_time";
pub const CLOSEST_OP_LAT_COLUMN: &str = "closest_op_lat";
pub const CLOSEST_OP_LON_COLUMN: &str = "closest_op_lon";

/// Default search window either side of a limb view, seconds.
pub const DEFAULT_WINDOW_SECONDS: i64 = 20 * 60;

/// One on-planet view: time and scene location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnPlanetView {
    pub time: NaiveDateTime,
    pub lat: f64,
    pub lon: f64,
}

/// The on-planet view found for a limb view, with its great-circle distance
/// in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestView {
    pub view: OnPlanetView,
    pub distance_deg: f64,
}

/// Finds the on-planet view closest (by great-circle distance) to each limb
/// view among those within `window` of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnPlanetFinder {
    pub window: Duration,
}

impl Default for OnPlanetFinder {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECONDS)
    }
}

fn scene_views(records: &RecordSet) -> Result<Vec<OnPlanetView>> {
    let dt = records.require_column(DT_COLUMN)?;
    let lat = records.require_column("Scene_lat")?;
    let lon = records.require_column("Scene_lon")?;
    let mut views: Vec<OnPlanetView> = records
        .rows()
        .iter()
        .filter_map(|row| {
            Some(OnPlanetView {
                time: row[dt].as_datetime()?,
                lat: row[lat].as_f64()?,
                lon: row[lon].as_f64()?,
            })
        })
        .collect();
    views.sort_by_key(|v| v.time);
    Ok(views)
}

impl OnPlanetFinder {
    pub fn new(window_seconds: i64) -> Self {
        Self {
            window: Duration::seconds(window_seconds),
        }
    }

    /// Closest of `views` (sorted by time) to a limb scene at `time`, `lat`,
    /// `lon`. Ties go to the earlier view.
    pub fn closest(
        &self,
        views: &[OnPlanetView],
        time: NaiveDateTime,
        lat: f64,
        lon: f64,
    ) -> Option<ClosestView> {
        let earliest = time.checked_sub_signed(self.window).unwrap_or(NaiveDateTime::MIN);
        let latest = time.checked_add_signed(self.window).unwrap_or(NaiveDateTime::MAX);
        let from = views.partition_point(|v| v.time < earliest);
        let to = views.partition_point(|v| v.time <= latest);
        views[from..to.max(from)]
            .iter()
            .map(|v| ClosestView {
                view: *v,
                distance_deg: haversine_dist(lat, lon, v.lat, v.lon, None).to_degrees(),
            })
            .min_by(|a, b| a.distance_deg.total_cmp(&b.distance_deg))
    }

    /// Add the distance, time and location of the closest on-planet view to
    /// every limb row. Rows with nothing in range get nulls.
    pub fn add_closest_columns(&self, limb: &RecordSet, on_planet: &RecordSet) -> Result<RecordSet> {
        let views = scene_views(on_planet)?;
        let dt = limb.require_column(DT_COLUMN)?;
        let lat = limb.require_column("Scene_lat")?;
        let lon = limb.require_column("Scene_lon")?;

        let found: Vec<Option<ClosestView>> = limb
            .rows()
            .iter()
            .map(|row| match (row[dt].as_datetime(), row[lat].as_f64(), row[lon].as_f64()) {
                (Some(t), Some(la), Some(lo)) => self.closest(&views, t, la, lo),
                _ => None,
            })
            .collect();

        let column = |f: fn(&ClosestView) -> Value| -> Vec<Value> {
            found.iter().map(|c| c.as_ref().map_or(Value::Null, f)).collect()
        };
        let mut out = limb.clone();
        out.add_column(CLOSEST_OP_DISTANCE_COLUMN, column(|c| Value::Float(c.distance_deg)))?;
        out.add_column(CLOSEST_OP_TIME_COLUMN, column(|c| Value::DateTime(c.view.time)))?;
        out.add_column(CLOSEST_OP_LAT_COLUMN, column(|c| Value::Float(c.view.lat)))?;
        out.add_column(CLOSEST_OP_LON_COLUMN, column(|c| Value::Float(c.view.lon)))?;

        let paired = found.iter().filter(|c| c.is_some()).count();
        log::debug!("Paired {paired} of {} limb views with on-planet views", limb.len());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2016, 1, 1)
            .unwrap()
            .and_hms_opt(0, mi, 0)
            .unwrap()
    }

    fn scenes(rows: &[(u32, f64, f64)]) -> RecordSet {
        RecordSet::from_rows(
            vec![DT_COLUMN.into(), "Scene_lat".into(), "Scene_lon".into()],
            rows.iter()
                .map(|&(mi, la, lo)| vec![Value::DateTime(at(mi)), Value::Float(la), Value::Float(lo)])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn nearest_view_inside_the_window_wins() {
        let on_planet = scenes(&[(5, 10.0, 0.0), (8, 1.0, 1.0), (30, 0.0, 0.0)]);
        let limb = scenes(&[(10, 0.0, 0.0), (59, 0.0, 0.0)]);

        let out = OnPlanetFinder::new(600).add_closest_columns(&limb, &on_planet).unwrap();
        // The view at 00:30 sits on top of the first limb view but is 20 min away.
        assert_eq!(out.get(0, CLOSEST_OP_TIME_COLUMN), Some(&Value::DateTime(at(8))));
        assert_eq!(out.get(0, CLOSEST_OP_LAT_COLUMN), Some(&Value::Float(1.0)));
        let d = out.get(0, CLOSEST_OP_DISTANCE_COLUMN).and_then(Value::as_f64).unwrap();
        assert!((d - 1.414).abs() < 0.01, "{d}");

        assert_eq!(out.get(1, CLOSEST_OP_DISTANCE_COLUMN), Some(&Value::Null));
        assert_eq!(out.get(1, CLOSEST_OP_TIME_COLUMN), Some(&Value::Null));
    }

    #[test]
    fn default_window_is_twenty_minutes() {
        let on_planet = scenes(&[(30, 0.0, 0.0)]);
        let views = scene_views(&on_planet).unwrap();
        let finder = OnPlanetFinder::default();
        assert!(finder.closest(&views, at(10), 0.0, 0.0).is_some());
        assert!(finder.closest(&views, at(9), 0.0, 0.0).is_none());
    }

    #[test]
    fn empty_on_planet_set_gives_nulls() {
        let limb = scenes(&[(10, 0.0, 0.0)]);
        let out = OnPlanetFinder::default()
            .add_closest_columns(&limb, &scenes(&[]))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.get(0, CLOSEST_OP_LON_COLUMN), Some(&Value::Null));
    }
}
