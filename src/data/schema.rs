//! Column layouts of the MCS file products.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::McsError;

/// Number of detectors per channel.
pub const N_DETECTORS: u8 = 21;

/// Radiance channel names.
pub const CHANNELS: [&str; 9] = ["A1", "A2", "A3", "A4", "A5", "A6", "B1", "B2", "B3"];

/// Values that stand for "no data" in every product.
pub const NAN_VALUES: [&str; 2] = ["-9999", ""];

/// Comment marker at the start of header lines.
pub const COMMENT_CHAR: char = '#';

// ---------------------------------------------------------------------------
// Product levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    L1B,
    L2,
}

impl Level {
    /// Suffix of files in a local archive directory.
    pub fn file_suffix(self) -> &'static str {
        match self {
            Level::L1B => "L1B",
            Level::L2 => "L2",
        }
    }

    /// Record type used in PDS file names.
    pub fn pds_record(self) -> &'static str {
        match self {
            Level::L1B => "RDR",
            Level::L2 => "DDR",
        }
    }

    /// Leading digit of the PDS volume (`MROM_<n>xxx`).
    pub fn pds_volume_digit(self) -> char {
        match self {
            Level::L1B => '1',
            Level::L2 => '2',
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_suffix())
    }
}

impl FromStr for Level {
    type Err = McsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "L1B" | "RDR" => Ok(Level::L1B),
            "L2" | "L22D" | "L2_2D" | "DDR" => Ok(Level::L2),
            other => Err(McsError::Config(format!(
                "level {other} not recognized, expected L1B or L2"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Column kinds
// ---------------------------------------------------------------------------

/// How the text of a column is turned into a [`Value`](super::model::Value).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Int,
    Float,
    /// Integer, float or text, whichever parses.
    Auto,
}

// ---------------------------------------------------------------------------
// L1B
// ---------------------------------------------------------------------------

const L1B_LEADING_COLUMNS: [&str; 71] = [
    "1",
    "Date",
    "UTC",
    "SCLK",
    "PKT_count",
    "Last_az_cmd",
    "Last_el_cmd",
    "Gqual",
    "Solar_lat",
    "Solar_lon",
    "Solar_zen",
    "SC_lat",
    "SC_lon",
    "SC_rad",
    "Scene_lat",
    "Scene_lon",
    "Scene_rad",
    "Scene_alt",
    "Vert_lat",
    "Vert_lon",
    "Limb_ang",
    "Safing",
    "Safed",
    "Freezing",
    "Frozen",
    "Rolling",
    "Dumping",
    "Moving",
    "Temp_Fault",
    "Mode",
    "OST_index",
    "EST_index",
    "ROT_index",
    "EOCT_index",
    "SST_index",
    "FPA_temp",
    "FPB_temp",
    "Baffle_A_temp",
    "Baffle_B_temp",
    "BB_1_temp",
    "OBA_1_temp",
    "Error_Time",
    "Error_ID",
    "Error_Detail",
    "Error_count",
    "Commands_received",
    "Commands_executed",
    "Commands_rejected",
    "Last_command_rec",
    "Cmd",
    "Req_ID",
    "Last_time_command",
    "Last_EQX_prediction",
    "Hybrid_temp",
    "FPA_temp_cyc",
    "FPB_temp_cyc",
    "Baffle_A_temp_cyc",
    "Baffle_B_temp_cyc",
    "OBA_1_temp_cyc",
    "OBA_2_temp",
    "BB_1_temp_cyc",
    "BB_2_temp",
    "Solar_target_temp",
    "Yoke_temp",
    "El_actuator_temp",
    "Az_actuator_temp",
    "-15V",
    "+15V",
    "Solar_base_temp",
    "+5V",
    "Rqual",
];

const L1B_INT_COLUMNS: [&str; 17] = [
    "1",
    "Gqual",
    "Safing",
    "Safed",
    "Freezing",
    "Frozen",
    "Rolling",
    "Dumping",
    "Moving",
    "Temp_Fault",
    "Mode",
    "OST_index",
    "EST_index",
    "ROT_index",
    "EOCT_index",
    "SST_index",
    "Rqual",
];

const L1B_AUTO_COLUMNS: [&str; 13] = [
    "PKT_count",
    "Error_Time",
    "Error_ID",
    "Error_Detail",
    "Error_count",
    "Commands_received",
    "Commands_executed",
    "Commands_rejected",
    "Last_command_rec",
    "Cmd",
    "Req_ID",
    "Last_time_command",
    "Last_EQX_prediction",
];

/// Header values scraped from L1B comment lines and appended as columns.
pub const L1B_HEADER_COLUMNS: [&str; 2] = ["Solar_dist", "L_sub_s"];

/// Name of the radiance column for one channel / detector.
pub fn rad_column_name(channel: &str, detector: u8) -> String {
    format!("Rad_{channel}_{detector:02}")
}

/// Radiance columns of one channel, detector 1 first.
pub fn rad_column_names(channel: &str) -> Vec<String> {
    (1..=N_DETECTORS)
        .map(|d| rad_column_name(channel, d))
        .collect()
}

/// Every radiance column, channel by channel.
pub fn l1b_rad_columns() -> Vec<String> {
    CHANNELS.iter().flat_map(|c| rad_column_names(c)).collect()
}

/// Detector numbers of a channel ordered by increasing altitude.
/// The A array is mounted upside down relative to B.
pub fn detectors_by_altitude(channel: &str) -> Vec<u8> {
    if channel.starts_with('A') {
        (1..=N_DETECTORS).rev().collect()
    } else {
        (1..=N_DETECTORS).collect()
    }
}

/// The 260 columns of an L1B data row.
pub fn l1b_columns() -> Vec<String> {
    let mut cols: Vec<String> = L1B_LEADING_COLUMNS.iter().map(|c| c.to_string()).collect();
    cols.extend(l1b_rad_columns());
    cols
}

pub fn l1b_column_kind(name: &str) -> ColumnKind {
    if name == "Date" || name == "UTC" {
        ColumnKind::Text
    } else if L1B_INT_COLUMNS.contains(&name) {
        ColumnKind::Int
    } else if L1B_AUTO_COLUMNS.contains(&name) {
        ColumnKind::Auto
    } else {
        ColumnKind::Float
    }
}

// ---------------------------------------------------------------------------
// L2
// ---------------------------------------------------------------------------

/// L2 derived data record sub-products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Ddr {
    Ddr1,
    Ddr2,
    Ddr3,
    Ddr4,
}

const DDR1_COLUMNS: [&str; 77] = [
    "1",
    "Date",
    "UTC",
    "SCLK",
    "L_s",
    "Solar_dist",
    "Orb_num",
    "Gqual",
    "Solar_lat",
    "Solar_lon",
    "Solar_zen",
    "LTST",
    "Profile_lat",
    "Profile_lon",
    "Profile_rad",
    "Profile_alt",
    "Limb_ang",
    "Are_rad",
    "Surf_lat",
    "Surf_lon",
    "Surf_rad",
    "T_surf",
    "T_surf_err",
    "T_near_surf",
    "T_near_surf_err",
    "Dust_column",
    "Dust_column_err",
    "H2Ovap_column",
    "H2Ovap_column_err",
    "H2Oice_column",
    "H2Oice_column_err",
    "CO2ice_column",
    "CO2ice_column_err",
    "p_surf",
    "p_surf_err",
    "p_ret_alt",
    "p_ret",
    "p_ret_err",
    "Rqual",
    "P_qual",
    "T_qual",
    "Dust_qual",
    "H2Ovap_qual",
    "H2Oice_qual",
    "CO2ice_qual",
    "surf_qual",
    "Obs_qual",
    "Ref_SCLK_0",
    "Ref_SCLK_1",
    "Ref_SCLK_2",
    "Ref_SCLK_3",
    "Ref_SCLK_4",
    "Ref_SCLK_5",
    "Ref_SCLK_6",
    "Ref_SCLK_7",
    "Ref_SCLK_8",
    "Ref_SCLK_9",
    "Ref_Date_0",
    "Ref_UTC_0",
    "Ref_Date_1",
    "Ref_UTC_1",
    "Ref_Date_2",
    "Ref_UTC_2",
    "Ref_Date_3",
    "Ref_UTC_3",
    "Ref_Date_4",
    "Ref_UTC_4",
    "Ref_Date_5",
    "Ref_UTC_5",
    "Ref_Date_6",
    "Ref_UTC_6",
    "Ref_Date_7",
    "Ref_UTC_7",
    "Ref_Date_8",
    "Ref_UTC_8",
    "Ref_Date_9",
    "Ref_UTC_9",
];

const DDR2_COLUMNS: [&str; 15] = [
    "1", "Pres", "T", "T_err", "Dust", "Dust_err", "H2Ovap", "H2Ovap_err", "H2Oice",
    "H2Oice_err", "CO2ice", "CO2ice_err", "Alt", "Lat", "Lon",
];

const DDR3_COLUMNS: [&str; 19] = [
    "1",
    "Rad_A1",
    "Rad_A1_calc",
    "Rad_A2",
    "Rad_A2_calc",
    "Rad_A3",
    "Rad_A3_calc",
    "Rad_A4",
    "Rad_A4_calc",
    "Rad_A5",
    "Rad_A5_calc",
    "Rad_A6",
    "Rad_A6_calc",
    "Rad_B1",
    "Rad_B1_calc",
    "Rad_B2",
    "Rad_B2_calc",
    "Rad_B3",
    "Rad_B3_calc",
];

const DDR4_COLUMNS: [&str; 7] = [
    "1",
    "T_resid",
    "p_resid",
    "Dust_resid",
    "H2Ovap_resid",
    "H2Oice_resid",
    "CO2ice_resid",
];

impl Ddr {
    pub const ALL: [Ddr; 4] = [Ddr::Ddr1, Ddr::Ddr2, Ddr::Ddr3, Ddr::Ddr4];

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Ddr::Ddr1 => &DDR1_COLUMNS,
            Ddr::Ddr2 => &DDR2_COLUMNS,
            Ddr::Ddr3 => &DDR3_COLUMNS,
            Ddr::Ddr4 => &DDR4_COLUMNS,
        }
    }

    /// Lines each profile contributes to this record.
    pub fn lines_per_profile(self) -> usize {
        match self {
            Ddr::Ddr1 => 1,
            Ddr::Ddr2 => 105,
            Ddr::Ddr3 => 22,
            Ddr::Ddr4 => 102,
        }
    }

    pub fn column_kind(self, name: &str) -> ColumnKind {
        if name == "1" {
            return ColumnKind::Int;
        }
        match self {
            Ddr::Ddr1 => {
                if name == "Date"
                    || name == "UTC"
                    || name.starts_with("Ref_Date_")
                    || name.starts_with("Ref_UTC_")
                {
                    ColumnKind::Text
                } else if name == "Orb_num" || name == "Gqual" || name.contains("qual") {
                    ColumnKind::Int
                } else {
                    ColumnKind::Float
                }
            }
            _ => ColumnKind::Float,
        }
    }
}

impl fmt::Display for Ddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = match self {
            Ddr::Ddr1 => 1,
            Ddr::Ddr2 => 2,
            Ddr::Ddr3 => 3,
            Ddr::Ddr4 => 4,
        };
        write!(f, "DDR{n}")
    }
}

impl FromStr for Ddr {
    type Err = McsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DDR1" | "1" => Ok(Ddr::Ddr1),
            "DDR2" | "2" => Ok(Ddr::Ddr2),
            "DDR3" | "3" => Ok(Ddr::Ddr3),
            "DDR4" | "4" => Ok(Ddr::Ddr4),
            other => Err(McsError::Config(format!(
                "data record {other} not recognized, expected DDR1-DDR4"
            ))),
        }
    }
}

/// Which data records an L2 file carries.
///
/// Files in the PDS archive only hold DDR1 and DDR2; files produced for
/// the team archive also carry the DDR3 radiances and DDR4 residuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L2Layout {
    Full,
    Pds,
}

impl L2Layout {
    pub fn records(self) -> &'static [Ddr] {
        match self {
            L2Layout::Full => &Ddr::ALL,
            L2Layout::Pds => &Ddr::ALL[..2],
        }
    }

    /// Total lines of one profile block.
    pub fn lines_per_profile(self) -> usize {
        self.records().iter().map(|d| d.lines_per_profile()).sum()
    }

    pub fn contains(self, ddr: Ddr) -> bool {
        self.records().contains(&ddr)
    }
}

/// Key joining records of one retrieval across DDR sub-products.
pub const PROFILE_ID_COLUMN: &str = "Profile_identifier";

/// Row index within a DDR2 profile.
pub const LEVEL_COLUMN: &str = "level";
