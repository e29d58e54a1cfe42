use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveTime, Timelike, Utc};

use mcs_tools::data::filter::{filtered_indices, init_filter_state, FilterState};
use mcs_tools::data::loader::{merge_ddrs, restrict_to_profiles};
use mcs_tools::data::schema::CHANNELS;
use mcs_tools::data::source::{FileStamp, SourceRef};
use mcs_tools::preprocess::l2::{split_day_night, SECTION_QUANTITIES};
use mcs_tools::preprocess::{
    add_day_column, cross_section, half_orbit_profiles, radiance_grid, L1BPreprocessor,
    L1BStandardInTrack, RadianceGrid, SectionPoint,
};
use mcs_tools::time::FILE_HOURS;
use mcs_tools::{Config, Ddr, L1BLoader, L1BReader, L2Loader, ReadOptions, RecordSet, Value};

use crate::color::{ColorMap, ColorScale};

/// Number of file windows in a day.
pub const WINDOWS_PER_DAY: usize = (24 / FILE_HOURS) as usize;

/// Hours of DDR1 shown in the profile view.
pub const PROFILE_HOURS: i64 = 8;

pub const ORBIT_COLUMN: &str = "Orb_num";

const DEFAULT_CHANNEL: &str = "A3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Time × detector radiance mesh of one L1B window.
    Radiance,
    /// DDR1 profile locations coloured by orbit, with an optional
    /// latitude × altitude section of one half orbit.
    Profiles,
}

/// Colour bar limits, either tracking the data or set by hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorLimits {
    pub auto: bool,
    pub min: f64,
    pub max: f64,
}

impl Default for ColorLimits {
    fn default() -> Self {
        Self {
            auto: true,
            min: 0.0,
            max: 100.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
pub struct AppState {
    pub config: Config,
    pub view: ViewMode,

    /// Selected day and 4-hour window within it.
    pub date: NaiveDate,
    pub window: usize,

    pub channel: String,
    pub clim: ColorLimits,

    /// Preprocessed L1B radiances of the loaded window.
    pub radiances: Option<RecordSet>,
    /// Grid of the selected channel (cached).
    pub grid: Option<RadianceGrid>,
    /// What was loaded, for the header.
    pub source_label: Option<String>,

    /// DDR1 rows of the profile view.
    pub profiles: Option<RecordSet>,
    /// Orbit selection of the profile view.
    pub filters: FilterState,
    /// Indices of profiles passing the current filters (cached).
    pub visible_indices: Vec<usize>,
    pub color_map: Option<ColorMap>,

    /// Orbit whose half-orbit section is shown.
    pub section_orbit: Option<i64>,
    /// DDR2 quantity drawn in the section.
    pub section_quantity: String,
    /// Show the day side of the section (night otherwise).
    pub section_daytime: bool,
    /// DDR2 rows of the half orbit merged with their DDR1 rows.
    pub section: Option<RecordSet>,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl AppState {
    pub fn new(config: Config, stamp: Option<FileStamp>) -> Self {
        let stamp = stamp.unwrap_or_else(|| FileStamp::containing(Utc::now().naive_utc()));
        let mut state = Self {
            config,
            view: ViewMode::Radiance,
            date: stamp.datetime().date(),
            window: 0,
            channel: DEFAULT_CHANNEL.to_string(),
            clim: ColorLimits::default(),
            radiances: None,
            grid: None,
            source_label: None,
            profiles: None,
            filters: FilterState::default(),
            visible_indices: Vec::new(),
            color_map: None,
            section_orbit: None,
            section_quantity: SECTION_QUANTITIES[0].to_string(),
            section_daytime: true,
            section: None,
            status_message: None,
        };
        state.set_stamp(stamp);
        state
    }

    // ---- Window selection ----

    /// File stamp of the selected window.
    pub fn stamp(&self) -> FileStamp {
        let hours = (self.window.min(WINDOWS_PER_DAY - 1) as u32 * FILE_HOURS) as i64;
        FileStamp::containing(self.date.and_time(NaiveTime::MIN) + Duration::hours(hours))
    }

    pub fn set_stamp(&mut self, stamp: FileStamp) {
        self.date = stamp.datetime().date();
        self.window = (stamp.datetime().hour() / FILE_HOURS) as usize;
    }

    /// Step to the next (`forward`) or previous window and load it.
    pub fn step_window(&mut self, forward: bool) {
        let stamp = if forward {
            self.stamp().next()
        } else {
            self.stamp().prev()
        };
        self.set_stamp(stamp);
        self.load_selected();
    }

    /// Load whatever the current view shows for the selected window.
    pub fn load_selected(&mut self) {
        match self.view {
            ViewMode::Radiance => self.load_window(),
            ViewMode::Profiles => self.load_profiles(),
        }
    }

    // ---- Radiances ----

    pub fn load_window(&mut self) {
        if let Err(e) = self.try_load_window() {
            self.report_error(e);
        }
    }

    fn try_load_window(&mut self) -> Result<()> {
        let stamp = self.stamp();
        let loader = L1BLoader::from_config(&self.config)?;
        let raw = loader
            .load_from_filestr(&stamp.gds())
            .with_context(|| format!("loading L1B window {stamp}"))?;
        log::info!("Loaded {} L1B rows for {stamp}", raw.len());
        self.set_radiances(&raw, format!("{stamp} L1B"))
    }

    /// Read one local L1B file directly.
    pub fn open_file(&mut self, path: &Path) {
        let result = L1BReader::new(ReadOptions::with_datetime())
            .read(&SourceRef::from(path))
            .with_context(|| format!("reading {}", path.display()))
            .and_then(|raw| {
                let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
                self.set_radiances(&raw, name.unwrap_or_default())
            });
        match result {
            Ok(()) => {
                if let Ok(stamp) = FileStamp::from_source(&SourceRef::from(path)) {
                    self.set_stamp(stamp);
                }
                self.view = ViewMode::Radiance;
            }
            Err(e) => self.report_error(e),
        }
    }

    /// Reduce raw L1B rows to averaged in-track limb sequences and show them.
    pub fn set_radiances(&mut self, raw: &RecordSet, label: String) -> Result<()> {
        let processed = L1BStandardInTrack::default()
            .preprocess(raw)
            .context("preprocessing radiances")?;
        if processed.is_empty() {
            self.status_message = Some(format!("{label}: no standard in-track limb views"));
        } else {
            self.status_message = None;
        }
        self.radiances = Some(processed);
        self.source_label = Some(label);
        self.rebuild_grid();
        Ok(())
    }

    pub fn set_channel(&mut self, channel: &str) {
        if CHANNELS.contains(&channel) {
            self.channel = channel.to_string();
            self.rebuild_grid();
        }
    }

    /// Recompute the grid after a data or channel change.
    pub fn rebuild_grid(&mut self) {
        self.grid = self
            .radiances
            .as_ref()
            .and_then(|rs| radiance_grid(rs, &self.channel).ok());
        self.update_auto_limits();
    }

    pub fn set_auto_limits(&mut self, auto: bool) {
        self.clim.auto = auto;
        self.update_auto_limits();
    }

    fn update_auto_limits(&mut self) {
        if !self.clim.auto {
            return;
        }
        if let Some((lo, hi)) = self.grid.as_ref().and_then(RadianceGrid::value_range) {
            self.clim.min = lo;
            self.clim.max = hi;
        }
    }

    pub fn color_scale(&self) -> ColorScale {
        ColorScale::new(self.clim.min, self.clim.max)
    }

    // ---- Profiles ----

    pub fn load_profiles(&mut self) {
        if let Err(e) = self.try_load_profiles() {
            self.report_error(e);
        }
    }

    fn try_load_profiles(&mut self) -> Result<()> {
        let start = self.stamp().datetime();
        let end = start + Duration::hours(PROFILE_HOURS);
        let loader = L2Loader::from_config(&self.config)?;
        let outcome = loader
            .load_date_range(start, end, Ddr::Ddr1, None)
            .context("loading DDR1 profiles")?;
        for missing in &outcome.unresolved {
            log::warn!("{}: {}", missing.source, missing.reason);
        }
        self.set_profiles(outcome.records)
    }

    /// Ingest DDR1 rows, initialise the orbit filter and colours.
    pub fn set_profiles(&mut self, records: RecordSet) -> Result<()> {
        let records = add_day_column(&records).context("flagging day and night profiles")?;
        self.section = None;
        self.section_orbit = None;
        self.filters = init_filter_state(&records, &[ORBIT_COLUMN])?;
        self.visible_indices = (0..records.len()).collect();
        self.color_map = self
            .filters
            .get(ORBIT_COLUMN)
            .map(ColorMap::new);
        self.status_message = records
            .is_empty()
            .then(|| "no profiles in the selected hours".to_string());
        self.profiles = Some(records);
        Ok(())
    }

    /// Orbits present in the loaded profiles.
    pub fn orbits(&self) -> Vec<i64> {
        self.profiles
            .as_ref()
            .and_then(|rs| rs.unique_values(ORBIT_COLUMN).ok())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_f64().map(|o| o as i64))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Load the DDR2 retrievals of one half orbit of the loaded profiles.
    pub fn load_section(&mut self, orbit: i64) {
        self.section_orbit = Some(orbit);
        match self.try_load_section(orbit) {
            Ok(section) => {
                self.status_message = section
                    .is_empty()
                    .then(|| format!("no retrievals for orbit {orbit}"));
                self.section = Some(section);
            }
            Err(e) => {
                self.section = None;
                self.report_error(e);
            }
        }
    }

    fn try_load_section(&self, orbit: i64) -> Result<RecordSet> {
        let ddr1 = self.profiles.as_ref().context("no profiles loaded")?;
        let ids = half_orbit_profiles(ddr1, orbit)?;
        let subset = restrict_to_profiles(ddr1, &ids)?;
        let loader = L2Loader::from_config(&self.config)?;
        let outcome = loader
            .load_profiles(Ddr::Ddr2, &ids)
            .with_context(|| format!("loading DDR2 for orbit {orbit}"))?;
        for missing in &outcome.unresolved {
            log::warn!("{}: {}", missing.source, missing.reason);
        }
        log::info!("Orbit {orbit}: {} profiles, {} DDR2 rows", ids.len(), outcome.records.len());
        Ok(merge_ddrs(&outcome.records, &subset)?)
    }

    /// Points of the selected side and quantity of the loaded section.
    pub fn section_points(&self) -> Vec<SectionPoint> {
        let Some(section) = &self.section else {
            return Vec::new();
        };
        let points = split_day_night(section).and_then(|(day, night)| {
            let side = if self.section_daytime { day } else { night };
            cross_section(&side, &self.section_quantity)
        });
        match points {
            Ok(points) => points,
            Err(e) => {
                log::warn!("cross section: {e}");
                Vec::new()
            }
        }
    }

    /// Recompute `visible_indices` after filter change.
    pub fn refilter(&mut self) {
        if let Some(rs) = &self.profiles {
            self.visible_indices = filtered_indices(rs, &self.filters);
        }
    }

    /// Toggle a single value in a column's filter.
    pub fn toggle_filter_value(&mut self, column: &str, value: &Value) {
        let selected = self.filters.entry(column.to_string()).or_default();
        if !selected.remove(value) {
            selected.insert(value.clone());
        }
        self.refilter();
    }

    /// Select all values in a column.
    pub fn select_all(&mut self, column: &str) {
        if let Some(all_vals) = self.profiles.as_ref().and_then(|rs| rs.unique_values(column).ok()) {
            self.filters.insert(column.to_string(), all_vals);
            self.refilter();
        }
    }

    /// Deselect all values in a column.
    pub fn select_none(&mut self, column: &str) {
        self.filters.insert(column.to_string(), BTreeSet::new());
        self.refilter();
    }

    fn report_error(&mut self, e: anyhow::Error) {
        log::error!("{e:#}");
        self.status_message = Some(format!("Error: {e:#}"));
    }
}
