use std::collections::BTreeSet;

use super::pipeline::{
    add_datetime_column, add_direction_column, add_first_limb_columns, add_ltst_column,
    add_scattering_angle_column, add_sequence_column, average_limb_sequences,
    remove_first_three_limb, select_direction, select_range, Direction, FIRST_LIMB_SEC_BETWEEN,
};
use crate::data::filter::select_values;
use crate::data::model::{RecordSet, Value};
use crate::error::Result;

/// Reduces L1B records to one viewing geometry.
pub trait L1BPreprocessor {
    /// Short name used on the command line.
    fn name(&self) -> &'static str;

    /// Rows matching the geometry. Filters only; applying twice changes nothing.
    fn process(&self, records: &RecordSet) -> Result<RecordSet>;

    /// The full pipeline, including derived and averaged columns.
    fn preprocess(&self, records: &RecordSet) -> Result<RecordSet>;
}

/// Quality flags shared by the preprocessors.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagSelection {
    pub gqual: Vec<i64>,
    pub rolling: Vec<i64>,
    pub moving: Vec<i64>,
}

impl Default for FlagSelection {
    fn default() -> Self {
        Self {
            gqual: vec![0, 5, 6],
            rolling: vec![0],
            moving: vec![0],
        }
    }
}

impl FlagSelection {
    fn apply(&self, records: &RecordSet) -> Result<RecordSet> {
        let as_set = |v: &[i64]| -> BTreeSet<Value> { v.iter().map(|&i| Value::Int(i)).collect() };
        let rs = select_values(records, "Gqual", &as_set(&self.gqual))?;
        let rs = select_values(&rs, "Rolling", &as_set(&self.rolling))?;
        select_values(&rs, "Moving", &as_set(&self.moving))
    }
}

fn select_in_track(records: &RecordSet) -> Result<RecordSet> {
    let rs = add_direction_column(records)?;
    let mut rs = select_direction(&rs, &[Direction::In])?;
    rs.drop_column(super::pipeline::DIRECTION_COLUMN);
    Ok(rs)
}

// ---------------------------------------------------------------------------
// Standard in-track limb
// ---------------------------------------------------------------------------

/// Standard in-track limb views.
#[derive(Debug, Clone, PartialEq)]
pub struct L1BStandardInTrack {
    /// `(min, max]` of `Scene_alt`, km.
    pub limb_scene_alt_range: (f64, f64),
    /// Gap that starts a new limb sequence, seconds.
    pub first_limb_sec_between: f64,
    /// `(min, max]` of `Limb_ang`, degrees.
    pub limb_angle_range: (f64, f64),
    pub flags: FlagSelection,
}

impl Default for L1BStandardInTrack {
    fn default() -> Self {
        Self {
            limb_scene_alt_range: (20.0, 70.0),
            first_limb_sec_between: FIRST_LIMB_SEC_BETWEEN,
            limb_angle_range: (-9.0, 9.0),
            flags: FlagSelection::default(),
        }
    }
}

impl L1BPreprocessor for L1BStandardInTrack {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn process(&self, records: &RecordSet) -> Result<RecordSet> {
        let (lo, hi) = self.limb_scene_alt_range;
        let rs = select_range(records, "Scene_alt", lo, hi)?;
        let (lo, hi) = self.limb_angle_range;
        let rs = select_range(&rs, "Limb_ang", lo, hi)?;
        let rs = self.flags.apply(&rs)?;
        select_in_track(&rs)
    }

    /// Limb views grouped into sequences, first three views of each dropped,
    /// the rest averaged to one row per sequence.
    fn preprocess(&self, records: &RecordSet) -> Result<RecordSet> {
        let rs = add_datetime_column(records)?;
        let (lo, hi) = self.limb_scene_alt_range;
        let rs = select_range(&rs, "Scene_alt", lo, hi)?;
        let rs = add_first_limb_columns(&rs, self.first_limb_sec_between)?;
        let rs = add_sequence_column(&rs)?;
        let rs = remove_first_three_limb(&rs)?;
        let (lo, hi) = self.limb_angle_range;
        let rs = select_range(&rs, "Limb_ang", lo, hi)?;
        let rs = self.flags.apply(&rs)?;
        let rs = add_direction_column(&rs)?;
        let rs = select_direction(&rs, &[Direction::In])?;
        let rs = add_ltst_column(&rs)?;
        let rs = add_scattering_angle_column(&rs)?;
        let averaged = average_limb_sequences(&rs)?;
        log::debug!(
            "Standard in-track: {} rows → {} sequences",
            records.len(),
            averaged.len()
        );
        Ok(averaged)
    }
}

// ---------------------------------------------------------------------------
// On-planet in-track
// ---------------------------------------------------------------------------

/// In-track views of the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct L1BOnPlanetInTrack {
    pub scene_alt_range: (f64, f64),
    pub elevation_angle_range: (f64, f64),
    pub limb_angle_range: (f64, f64),
    pub flags: FlagSelection,
}

impl Default for L1BOnPlanetInTrack {
    fn default() -> Self {
        Self {
            scene_alt_range: (-0.01, 0.01),
            elevation_angle_range: (114.0, 180.0),
            limb_angle_range: (-9.0, 9.0),
            flags: FlagSelection::default(),
        }
    }
}

impl L1BPreprocessor for L1BOnPlanetInTrack {
    fn name(&self) -> &'static str {
        "onplanet"
    }

    fn process(&self, records: &RecordSet) -> Result<RecordSet> {
        let (lo, hi) = self.scene_alt_range;
        let rs = select_range(records, "Scene_alt", lo, hi)?;
        let (lo, hi) = self.elevation_angle_range;
        let rs = select_range(&rs, "Last_el_cmd", lo, hi)?;
        let (lo, hi) = self.limb_angle_range;
        let rs = select_range(&rs, "Limb_ang", lo, hi)?;
        let rs = self.flags.apply(&rs)?;
        select_in_track(&rs)
    }

    /// Matching views with `dt`, `direction` and `LTST` columns; no averaging.
    fn preprocess(&self, records: &RecordSet) -> Result<RecordSet> {
        let rs = add_datetime_column(records)?;
        let rs = self.process(&rs)?;
        let rs = add_direction_column(&rs)?;
        add_ltst_column(&rs)
    }
}

/// Look up a preprocessor by its command-line name.
pub fn preprocessor_by_name(name: &str) -> Option<Box<dyn L1BPreprocessor>> {
    match name {
        "standard" => Some(Box::new(L1BStandardInTrack::default())),
        "onplanet" => Some(Box::new(L1BOnPlanetInTrack::default())),
        _ => None,
    }
}
