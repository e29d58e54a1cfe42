//! Synthetic MCS files laid out exactly like the archive's, for demos and tests.
//!
//! Radiances and retrievals are smooth analytic shapes plus a little noise
//! from a deterministic PRNG, so the same seed always writes the same bytes.

use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};

use super::schema::{l1b_columns, Ddr, L2Layout, Level, CHANNELS};
use super::source::{FileStamp, FilenameBuilder, SourceRef};
use crate::config::Config;
use crate::error::{McsError, Result};
use crate::time::{format_date_utc, mars_year, solar_longitude, FILE_HOURS};

/// Seconds between the start of consecutive limb sequences.
pub const SEQUENCE_PERIOD_S: i64 = 60;

/// Seconds between views within a sequence.
pub const VIEW_SPACING_S: i64 = 2;

const MARS_RADIUS_KM: f64 = 3396.0;
const ORBIT_PERIOD_S: f64 = 7060.0;

pub fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Minimal deterministic PRNG (xoshiro256**)
pub struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    pub fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        mean + std_dev * z
    }
}

fn stamp_seed(seed: u64, stamp: FileStamp) -> u64 {
    seed ^ stamp.datetime().and_utc().timestamp() as u64
}

/// Ground track of the synthetic orbit: latitude and east longitude.
fn ground_track(t: NaiveDateTime) -> (f64, f64) {
    let secs = t.and_utc().timestamp() as f64;
    let phase = 2.0 * PI * secs / ORBIT_PERIOD_S;
    let lat = 80.0 * phase.sin();
    let lon = ((secs / ORBIT_PERIOD_S) * -27.0 + 180.0).rem_euclid(360.0) - 180.0;
    (lat, lon)
}

fn sub_solar_lon(t: NaiveDateTime) -> f64 {
    // One Mars sol is ~88775 s.
    let secs = t.and_utc().timestamp() as f64;
    (180.0 - 360.0 * (secs / 88_775.0).fract()).rem_euclid(360.0) - 180.0
}

// ---------------------------------------------------------------------------
// L1B
// ---------------------------------------------------------------------------

/// Shape of a synthetic L1B file.
#[derive(Debug, Clone)]
pub struct SyntheticL1B {
    /// Number of limb sequences in the file.
    pub sequences: usize,
    /// Limb views per sequence.
    pub limb_views: usize,
    /// On-planet views following each sequence.
    pub nadir_views: usize,
    /// Every n-th sequence looks cross-track (right). 0 disables.
    pub cross_track_every: usize,
    /// Stop after this many rows.
    pub max_rows: Option<usize>,
    pub seed: u64,
}

impl Default for SyntheticL1B {
    fn default() -> Self {
        Self {
            sequences: 24,
            limb_views: 8,
            nadir_views: 2,
            cross_track_every: 4,
            max_rows: None,
            seed: 42,
        }
    }
}

impl SyntheticL1B {
    /// Exactly `rows` in-track limb views.
    pub fn small(rows: usize) -> Self {
        Self {
            sequences: rows.div_ceil(8).max(1),
            limb_views: 8,
            nadir_views: 0,
            cross_track_every: 0,
            max_rows: Some(rows),
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct View {
    time: NaiveDateTime,
    scene_alt: f64,
    elevation: f64,
    azimuth: f64,
}

fn l1b_views(stamp: FileStamp, shape: &SyntheticL1B) -> Vec<View> {
    let start = stamp.datetime() + Duration::seconds(30);
    let mut views = Vec::new();
    for seq in 0..shape.sequences {
        let seq_start = start + Duration::seconds(seq as i64 * SEQUENCE_PERIOD_S);
        let cross = shape.cross_track_every > 0 && seq % shape.cross_track_every == shape.cross_track_every - 1;
        let azimuth = if cross { 270.0 } else { 180.0 };
        for k in 0..shape.limb_views {
            views.push(View {
                time: seq_start + Duration::seconds(k as i64 * VIEW_SPACING_S),
                scene_alt: 40.0 + k as f64 * 0.5,
                elevation: 90.0,
                azimuth,
            });
        }
        let nadir_start = seq_start + Duration::seconds(shape.limb_views as i64 * VIEW_SPACING_S + 4);
        for k in 0..shape.nadir_views {
            views.push(View {
                time: nadir_start + Duration::seconds(k as i64 * VIEW_SPACING_S),
                scene_alt: 0.0,
                elevation: 150.0,
                azimuth: 180.0,
            });
        }
    }
    let window_end = stamp.window_end();
    views.retain(|v| v.time < window_end);
    if let Some(max) = shape.max_rows {
        views.truncate(max);
    }
    views
}

fn l1b_cell(col: &str, view: &View, rng: &mut SimpleRng) -> String {
    let (date, utc) = format_date_utc(view.time);
    let (lat, lon) = ground_track(view.time);
    let solar_lon = sub_solar_lon(view.time);
    match col {
        "1" => "1".to_string(),
        "Date" => date,
        "UTC" => utc,
        "SCLK" => format!("{:.3}", view.time.and_utc().timestamp() as f64 - 946_728_000.0),
        "PKT_count" => "1".to_string(),
        "Last_az_cmd" => format!("{:.1}", view.azimuth),
        "Last_el_cmd" => format!("{:.1}", view.elevation),
        "Solar_lat" => "-12.5".to_string(),
        "Solar_lon" => format!("{solar_lon:.3}"),
        "Solar_zen" => format!("{:.3}", 60.0 + 20.0 * (lat / 80.0)),
        "SC_lat" => format!("{lat:.3}"),
        "SC_lon" => format!("{lon:.3}"),
        "SC_rad" => "3700.0".to_string(),
        "Scene_lat" | "Vert_lat" => format!("{:.3}", lat + 3.0),
        "Scene_lon" | "Vert_lon" => format!("{lon:.3}"),
        "Scene_rad" => format!("{:.3}", MARS_RADIUS_KM + view.scene_alt),
        "Scene_alt" => format!("{:.3}", view.scene_alt),
        "Limb_ang" => format!("{:.3}", rng.gauss(0.0, 1.0)),
        c if c.ends_with("temp") || c.ends_with("temp_cyc") => {
            format!("{:.2}", 290.0 + rng.gauss(0.0, 0.2))
        }
        "-15V" => "-15.0".to_string(),
        "+15V" => "15.0".to_string(),
        "+5V" => "5.0".to_string(),
        c if c.starts_with("Rad_") => {
            let channel = &c[4..6];
            let detector: f64 = c[7..].parse().unwrap_or(1.0);
            let ch = CHANNELS.iter().position(|x| *x == channel).unwrap_or(0) as f64;
            let signal = if view.scene_alt > 1.0 {
                gaussian(detector, 6.0 + ch * 0.3, 5.0, 40.0 + 5.0 * ch)
            } else {
                60.0 + 3.0 * ch
            };
            format!("{:.4}", signal + rng.gauss(0.0, 0.05))
        }
        // Flags, indices and command bookkeeping.
        _ => "0".to_string(),
    }
}

/// Text of one L1B file for `stamp`.
pub fn l1b_text(stamp: FileStamp, shape: &SyntheticL1B) -> String {
    let mut rng = SimpleRng::new(stamp_seed(shape.seed, stamp));
    let columns = l1b_columns();
    let l_s = solar_longitude(stamp.datetime());

    let mut out = String::new();
    out.push_str("# MCS Level 1B calibrated radiances (synthetic)\n");
    out.push_str(&format!("# File: {}.L1B\n", stamp.gds()));
    out.push_str(&format!("# Solar_dist = {:.1} (km)\n", 2.279e8 + 1.0e7 * (l_s.to_radians() - 4.4).cos()));
    out.push_str(&format!("# L_sub_s = {l_s:.4}\n"));
    out.push_str(&columns.join(","));
    out.push('\n');

    for view in l1b_views(stamp, shape) {
        let row: Vec<String> = columns
            .iter()
            .map(|c| l1b_cell(c, &view, &mut rng))
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// L2
// ---------------------------------------------------------------------------

/// Shape of a synthetic L2 file.
#[derive(Debug, Clone)]
pub struct SyntheticL2 {
    /// Retrieved profiles in the file.
    pub profiles: usize,
    pub seed: u64,
}

impl Default for SyntheticL2 {
    fn default() -> Self {
        Self {
            profiles: 12,
            seed: 42,
        }
    }
}

impl SyntheticL2 {
    pub fn small(profiles: usize) -> Self {
        Self { profiles, seed: 7 }
    }
}

#[derive(Debug, Clone, Copy)]
struct Profile {
    time: NaiveDateTime,
    lat: f64,
    lon: f64,
}

fn l2_profiles(stamp: FileStamp, shape: &SyntheticL2) -> Vec<Profile> {
    let span = (FILE_HOURS as i64 * 3600 - 600) as f64;
    let n = shape.profiles.max(1) as f64;
    (0..shape.profiles)
        .map(|i| {
            let time = stamp.datetime()
                + Duration::seconds(300 + (span * i as f64 / n) as i64);
            // Latitudes sweep pole to pole across the file.
            let lat = if shape.profiles > 1 {
                -75.0 + 150.0 * i as f64 / (shape.profiles - 1) as f64
            } else {
                0.0
            };
            let (_, lon) = ground_track(time);
            Profile { time, lat, lon }
        })
        .collect()
}

fn quoted(s: &str) -> String {
    format!("\"{s}\"")
}

fn ddr1_cell(col: &str, p: &Profile) -> String {
    let (date, utc) = format_date_utc(p.time);
    let secs = p.time.and_utc().timestamp() as f64;
    match col {
        "1" => "1".to_string(),
        "Date" => quoted(&date),
        "UTC" => quoted(&utc),
        c if c.starts_with("Ref_Date_") => quoted(&date),
        c if c.starts_with("Ref_UTC_") => quoted(&utc),
        "SCLK" => format!("{:.3}", secs - 946_728_000.0),
        c if c.starts_with("Ref_SCLK_") => format!("{:.3}", secs - 946_728_000.0),
        "L_s" => format!("{:.4}", solar_longitude(p.time)),
        "Solar_dist" => "227936640.0".to_string(),
        "Orb_num" => format!("{}", (secs / ORBIT_PERIOD_S) as i64 - 60_000),
        "Solar_lat" => "-12.5".to_string(),
        "Solar_lon" => format!("{:.3}", sub_solar_lon(p.time)),
        // DDR1 carries local time as a fraction of a sol.
        "LTST" => format!("{:.5}", crate::time::ltst(p.lon, sub_solar_lon(p.time)) / 24.0),
        "Profile_lat" | "Surf_lat" => format!("{:.3}", p.lat),
        "Profile_lon" | "Surf_lon" => format!("{:.3}", p.lon),
        "Profile_rad" => format!("{:.3}", MARS_RADIUS_KM + 40.0),
        "Profile_alt" => "40.0".to_string(),
        "Are_rad" | "Surf_rad" => format!("{MARS_RADIUS_KM:.1}"),
        "T_surf" => format!("{:.2}", 230.0 - 0.6 * p.lat.abs()),
        "T_near_surf" => format!("{:.2}", 220.0 - 0.5 * p.lat.abs()),
        "p_surf" => "610.0".to_string(),
        c if c.contains("qual") => "0".to_string(),
        c if c.ends_with("_err") => "1.0".to_string(),
        _ => "0.100".to_string(),
    }
}

fn ddr2_cell(col: &str, level: usize, p: &Profile, rng: &mut SimpleRng) -> String {
    let alt = level as f64;
    match col {
        "1" => "2".to_string(),
        "Pres" => format!("{:.5e}", 610.0 * (-alt / 10.8).exp()),
        "T" => {
            if level > 90 {
                "-9999".to_string()
            } else {
                format!("{:.2}", 215.0 - 0.8 * alt + 10.0 * (p.lat / 40.0).cos() + rng.gauss(0.0, 0.3))
            }
        }
        "Dust" | "H2Oice" | "CO2ice" => format!("{:.3e}", 1e-4 * (-alt / 20.0).exp()),
        "H2Ovap" => format!("{:.3e}", 1e-5 * (-alt / 15.0).exp()),
        "Alt" => format!("{alt:.1}"),
        "Lat" => format!("{:.3}", p.lat),
        "Lon" => format!("{:.3}", p.lon),
        _ => "0.5".to_string(),
    }
}

fn ddr3_cell(col: &str, level: usize, rng: &mut SimpleRng) -> String {
    match col {
        "1" => "3".to_string(),
        c if c.ends_with("_calc") => format!("{:.4}", gaussian(level as f64, 8.0, 5.0, 50.0)),
        _ => format!("{:.4}", gaussian(level as f64, 8.0, 5.0, 50.0) + rng.gauss(0.0, 0.1)),
    }
}

fn ddr4_cell(col: &str, rng: &mut SimpleRng) -> String {
    match col {
        "1" => "4".to_string(),
        _ => format!("{:.4}", rng.gauss(0.0, 0.05)),
    }
}

/// Text of one L2 file for `stamp`, holding the records of `layout`.
pub fn l2_text(stamp: FileStamp, layout: L2Layout, shape: &SyntheticL2) -> String {
    let mut rng = SimpleRng::new(stamp_seed(shape.seed, stamp));
    let mut out = String::new();
    out.push_str("# MCS Level 2 derived data records (synthetic)\n");
    out.push_str(&format!("# File: {}.L2, Mars Year {}\n", stamp.gds(), mars_year(stamp.datetime())));

    for ddr in layout.records() {
        let names: Vec<String> = ddr.columns().iter().map(|c| quoted(c)).collect();
        out.push_str(&names.join(", "));
        out.push('\n');
    }

    for profile in l2_profiles(stamp, shape) {
        for ddr in layout.records() {
            for level in 0..ddr.lines_per_profile() {
                let cells: Vec<String> = ddr
                    .columns()
                    .iter()
                    .map(|c| match ddr {
                        Ddr::Ddr1 => ddr1_cell(c, &profile),
                        Ddr::Ddr2 => ddr2_cell(c, level, &profile, &mut rng),
                        Ddr::Ddr3 => ddr3_cell(c, level, &mut rng),
                        Ddr::Ddr4 => ddr4_cell(c, &mut rng),
                    })
                    .collect();
                out.push_str(&cells.join(", "));
                out.push('\n');
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Archive writer
// ---------------------------------------------------------------------------

/// Shapes of the files written into a synthetic archive.
#[derive(Debug, Clone, Default)]
pub struct SyntheticArchive {
    pub l1b: SyntheticL1B,
    pub l2: SyntheticL2,
}

impl SyntheticArchive {
    /// Write the file for `stamp` where `builder` expects it.
    pub fn write_file(&self, builder: &FilenameBuilder, stamp: FileStamp) -> Result<PathBuf> {
        let path = match builder.source_for(stamp) {
            SourceRef::Local(path) => path,
            SourceRef::Remote(url) => {
                return Err(McsError::Config(format!(
                    "cannot write synthetic files to remote archive ({url})"
                )))
            }
        };
        let text = match builder.level() {
            Level::L1B => l1b_text(stamp, &self.l1b),
            Level::L2 => l2_text(stamp, L2Layout::Full, &self.l2),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, text)?;
        log::debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Write L1B and L2 files for every stamp under `root`, using the default
    /// sub-directory names.
    pub fn write(&self, root: &Path, stamps: &[FileStamp]) -> Result<Vec<PathBuf>> {
        let config = Config::default();
        let mut written = Vec::new();
        for level in [Level::L1B, Level::L2] {
            let builder = FilenameBuilder::directory(level, root, config.subdir(level));
            for &stamp in stamps {
                written.push(self.write_file(&builder, stamp)?);
            }
        }
        log::info!("Wrote {} synthetic files under {}", written.len(), root.display());
        Ok(written)
    }
}
