use std::collections::BTreeSet;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use mcs_tools::data::filter::FilterConfig;
use mcs_tools::data::loader::{merge_ddrs, profile_ids, UnresolvedReason};
use mcs_tools::data::source::{FileStamp, FilenameBuilder, SourceRef};
use mcs_tools::data::synthetic::SyntheticArchive;
use mcs_tools::{Config, Ddr, L1BLoader, L1BReader, L2Loader, Level, McsError, ReadOptions, RecordSet, Value};

fn at(h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2016, 1, 1)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap()
}

fn stamps(names: &[&str]) -> Vec<FileStamp> {
    names.iter().map(|s| FileStamp::parse(s).unwrap()).collect()
}

/// A temporary archive holding L1B and L2 files for `names`.
fn archive(names: &[&str]) -> (TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    SyntheticArchive::default()
        .write(dir.path(), &stamps(names))
        .unwrap();
    let config = Config::default().with_overrides(false, Some(dir.path().to_path_buf()));
    (dir, config)
}

fn read_l1b(root: &Path, name: &str) -> RecordSet {
    let builder = FilenameBuilder::directory(Level::L1B, root, "level_1b");
    let source = builder.source_for(FileStamp::parse(name).unwrap());
    L1BReader::new(ReadOptions::with_datetime()).read(&source).unwrap()
}

fn times(rs: &RecordSet) -> Vec<NaiveDateTime> {
    rs.column("dt")
        .unwrap()
        .into_iter()
        .map(|v| v.as_datetime().unwrap())
        .collect()
}

#[test]
fn csv_export_keeps_key_columns() {
    let (dir, _config) = archive(&["160101000000"]);
    let rs = read_l1b(dir.path(), "160101000000");
    let keys = rs
        .select_columns(&["Date", "UTC", "Scene_alt", "Last_az_cmd", "Solar_dist", "dt"])
        .unwrap();

    let out = dir.path().join("keys.csv");
    mcs_tools::data::export::write_file(&keys, &out).unwrap();

    let mut reader = csv::Reader::from_path(&out).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
    assert_eq!(header, ["Date", "UTC", "Scene_alt", "Last_az_cmd", "Solar_dist", "dt"]);

    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), rs.len());
    let first = &rows[0];
    assert_eq!(&first[0], "01-Jan-2016");
    assert_eq!(&first[1], "00:00:30.000");
    assert_eq!(first[2].parse::<f64>().unwrap(), 40.0);
    assert_eq!(first[3].parse::<f64>().unwrap(), 180.0);
    assert!(first[4].parse::<f64>().unwrap() > 2.0e8);
    assert_eq!(&first[5], "2016-01-01T00:00:30.000");
}

#[test]
fn date_range_matches_the_window_file() {
    let (dir, config) = archive(&["160101000000", "160101040000", "160101080000"]);
    let loader = L1BLoader::from_config(&config).unwrap();

    let outcome = loader.load_date_range(at(4, 0), at(7, 59)).unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.records, read_l1b(dir.path(), "160101040000"));
}

#[test]
fn date_range_across_files_is_sorted_and_bounded() {
    let (_dir, config) = archive(&["160101000000", "160101040000", "160101080000"]);
    let loader = L1BLoader::from_config(&config).unwrap();

    let (start, end) = (at(0, 10), at(4, 10));
    let rs = loader.load_date_range(start, end).unwrap().into_records();
    let t = times(&rs);
    assert!(!t.is_empty());
    assert!(t.windows(2).all(|w| w[0] <= w[1]));
    assert!(t.iter().all(|&x| start <= x && x <= end));
    assert!(t.iter().any(|&x| x < at(4, 0)));
    assert!(t.iter().any(|&x| x >= at(4, 0)));
}

#[test]
fn uncovered_range_is_empty_not_an_error() {
    let (_dir, config) = archive(&["160101000000"]);
    let loader = L1BLoader::from_config(&config).unwrap();

    // Inside a file, but between its observations.
    let quiet = loader.load_date_range(at(3, 0), at(3, 30)).unwrap();
    assert!(quiet.records.is_empty());
    assert!(quiet.is_complete());

    // Long after the archive ends.
    let late = NaiveDate::from_ymd_opt(2030, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let past = loader.load_date_range(late, late).unwrap();
    assert!(past.records.is_empty());
    assert_eq!(past.records.columns(), loader.columns().as_slice());
    assert_eq!(past.unresolved.len(), 1);
}

#[test]
fn reversed_range_is_rejected() {
    let (_dir, config) = archive(&["160101000000"]);
    let loader = L1BLoader::from_config(&config).unwrap();
    let err = loader.load_date_range(at(8, 0), at(4, 0)).unwrap_err();
    assert!(matches!(err, McsError::InvalidRange { .. }));
}

#[test]
fn profiles_filtered_on_ddr1_select_ddr2() {
    let (_dir, config) = archive(&["160101000000", "160101040000"]);
    let loader = L2Loader::from_config(&config).unwrap();

    let ddr1 = loader
        .load_date_range(at(0, 0), at(7, 59), Ddr::Ddr1, None)
        .unwrap()
        .into_records();
    let equatorial = FilterConfig::from_json(r#"{ "Profile_lat": { "between": [-10, 10] } }"#)
        .unwrap()
        .apply(&ddr1)
        .unwrap();
    let ids = profile_ids(&equatorial).unwrap();
    assert_eq!(ids.len(), 4);

    let ddr2 = loader.load_profiles(Ddr::Ddr2, &ids).unwrap();
    assert!(ddr2.is_complete());
    assert_eq!(profile_ids(&ddr2.records).unwrap(), ids);
    assert_eq!(ddr2.records.len(), ids.len() * Ddr::Ddr2.lines_per_profile());

    let merged = merge_ddrs(&ddr2.records, &equatorial).unwrap();
    assert_eq!(merged.len(), ddr2.records.len());
    assert!(merged.has_column("Profile_lat"));
}

#[test]
fn malformed_profile_id_is_rejected() {
    let (_dir, config) = archive(&["160101000000"]);
    let loader = L2Loader::from_config(&config).unwrap();
    let ids: BTreeSet<String> = ["not-a-profile".to_string()].into_iter().collect();
    let err = loader.load_profiles(Ddr::Ddr1, &ids).unwrap_err();
    assert!(matches!(err, McsError::InvalidStamp(_)));
}

#[test]
fn four_hour_stamp_loads_exactly_its_file() {
    let (dir, config) = archive(&["160101000000", "160101040000"]);
    let loader = L1BLoader::from_config(&config).unwrap();
    let expected = read_l1b(dir.path(), "160101000000");

    assert_eq!(loader.load_from_filestr("1601010000").unwrap(), expected);
    assert_eq!(loader.load_from_filestr("16010100").unwrap(), expected);

    let (stamp, source) = loader.filenames().source_from_filestr("1601010000").unwrap();
    assert_eq!(stamp.gds(), "160101000000");
    assert_eq!(source.file_name(), "160101000000.L1B");

    let l2 = L2Loader::from_config(&config).unwrap();
    let picked = l2
        .load_from_filebase_profiles("1601010000", &[0, 2], Ddr::Ddr1)
        .unwrap();
    let ids: Vec<&Value> = picked.column("Profile_identifier").unwrap();
    assert_eq!(
        ids,
        [
            &Value::Text("160101000000_0".into()),
            &Value::Text("160101000000_2".into())
        ]
    );
}

#[test]
fn missing_window_is_reported_and_rest_loads() {
    let (_dir, config) = archive(&["160101000000", "160101080000"]);
    let loader = L1BLoader::from_config(&config).unwrap();

    let outcome = loader.load_date_range(at(0, 0), at(11, 59)).unwrap();
    assert!(!outcome.is_complete());
    assert_eq!(outcome.unresolved.len(), 1);
    let gap = &outcome.unresolved[0];
    assert_eq!(gap.stamp, Some(FileStamp::parse("160101040000").unwrap()));
    assert_eq!(gap.reason, UnresolvedReason::Missing);

    let t = times(&outcome.records);
    assert!(t.iter().any(|&x| x < at(4, 0)));
    assert!(t.iter().any(|&x| x >= at(8, 0)));
}

#[test]
fn files_around_date_include_neighbours() {
    let (_dir, config) = archive(&["160101000000", "160101040000", "160101080000"]);
    let loader = L2Loader::from_config(&config).unwrap();
    let outcome = loader.load_files_around_date(at(5, 0), 1, Ddr::Ddr1).unwrap();
    assert!(outcome.is_complete());
    let files: BTreeSet<String> = profile_ids(&outcome.records)
        .unwrap()
        .into_iter()
        .map(|id| id[..12].to_string())
        .collect();
    assert_eq!(files.len(), 3);
}

#[test]
fn pds_urls_follow_archive_layout() {
    let stamp = FileStamp::parse("120801160000").unwrap();
    let config = Config::default().with_overrides(true, None);

    let l1b = FilenameBuilder::from_config(Level::L1B, &config).unwrap();
    assert_eq!(
        l1b.source_for(stamp),
        SourceRef::Remote(
            "https://atmos.nmsu.edu/PDS/data/MROM_1072/DATA/2012/201208/20120801/2012080116_RDR.TAB"
                .to_string()
        )
    );
    let l2 = FilenameBuilder::from_config(Level::L2, &config).unwrap();
    assert_eq!(
        l2.source_for(stamp).to_string(),
        "https://atmos.nmsu.edu/PDS/data/MROM_2072/DATA/2012/201208/20120801/2012080116_DDR.TAB"
    );

    // PDS L2 files carry DDR1 and DDR2 only.
    let loader = L2Loader::from_config(&config).unwrap();
    let err = loader.load_from_filestr("1208011600", Ddr::Ddr3).unwrap_err();
    assert!(matches!(err, McsError::Config(_)));
}

#[test]
fn local_mode_needs_a_data_directory() {
    let err = L1BLoader::from_config(&Config::default()).unwrap_err();
    assert!(matches!(err, McsError::Config(_)));
}

#[test]
fn single_files_are_typed_by_name() {
    use mcs_tools::data::reader::{read_file, Product};

    let (dir, _config) = archive(&["160101000000"]);
    let l1b_path = dir.path().join("level_1b/1601/160101000000.L1B");
    let l1b = read_file(
        &SourceRef::from(l1b_path.as_path()),
        Product::L1B,
        ReadOptions::with_datetime(),
    )
    .unwrap();
    assert_eq!(l1b, read_l1b(dir.path(), "160101000000"));

    let l2_source = SourceRef::from(dir.path().join("level_2_2d/1601/160101000000.L2").as_path());
    let ddr2 = read_file(&l2_source, Product::L2(Ddr::Ddr2), ReadOptions::default()).unwrap();
    assert!(ddr2.has_column("level"));
    assert!(!ddr2.has_column("dt"));

    let missing = SourceRef::from(dir.path().join("level_1b/1601/160101040000.L1B").as_path());
    let err = read_file(&missing, Product::L1B, ReadOptions::default()).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn ls_range_cuts_ddr1_only() {
    use mcs_tools::time::{mars_year, solar_longitude};

    let day: Vec<String> = (0..6).map(|w| format!("160101{:02}0000", w * 4)).collect();
    let names: Vec<&str> = day.iter().map(String::as_str).collect();
    let (_dir, config) = archive(&names);
    let loader = L2Loader::from_config(&config).unwrap();

    let my = mars_year(at(12, 0));
    let (start_ls, end_ls) = (solar_longitude(at(6, 0)), solar_longitude(at(18, 0)));
    assert!(start_ls < end_ls);

    let ddr1 = loader.load_ls_range(my, start_ls, end_ls, Ddr::Ddr1).unwrap();
    // The two-day padding reaches files the archive does not have.
    assert!(!ddr1.unresolved.is_empty());
    assert!(ddr1
        .unresolved
        .iter()
        .all(|u| u.reason == UnresolvedReason::Missing));
    let ls: Vec<f64> = ddr1
        .records
        .column("L_s")
        .unwrap()
        .into_iter()
        .map(|v| v.as_f64().unwrap())
        .collect();
    assert!(!ls.is_empty());
    assert!(ls.iter().all(|&l| start_ls <= l && l < end_ls), "{ls:?}");

    let ddr2 = loader.load_ls_range(my, start_ls, end_ls, Ddr::Ddr2).unwrap();
    let ddr2_ids = profile_ids(&ddr2.records).unwrap();
    let ddr1_ids = profile_ids(&ddr1.records).unwrap();
    assert!(ddr1_ids.is_subset(&ddr2_ids));
    assert!(ddr2_ids.len() > ddr1_ids.len());
    assert!(ddr2_ids.contains("160101000000_0"));
    assert_eq!(ddr2.records.len(), ddr2_ids.len() * Ddr::Ddr2.lines_per_profile());
}

#[test]
fn corrupt_file_is_unreadable_and_rest_loads() {
    let (dir, config) = archive(&["160101000000", "160101040000", "160101080000"]);
    let corrupt = dir.path().join("level_1b/1601/160101040000.L1B");
    std::fs::write(&corrupt, "a,b,c\n1,2,3\n").unwrap();
    let loader = L1BLoader::from_config(&config).unwrap();

    let outcome = loader.load_date_range(at(0, 0), at(11, 59)).unwrap();
    assert_eq!(outcome.unresolved.len(), 1);
    let bad = &outcome.unresolved[0];
    assert_eq!(bad.stamp, Some(FileStamp::parse("160101040000").unwrap()));
    assert!(
        matches!(&bad.reason, UnresolvedReason::Unreadable(msg) if msg.contains("number of columns")),
        "{:?}",
        bad.reason
    );

    let t = times(&outcome.records);
    assert!(t.iter().any(|&x| x < at(4, 0)));
    assert!(t.iter().any(|&x| x >= at(8, 0)));
    assert!(t.iter().all(|&x| x < at(4, 0) || x >= at(8, 0)));
}

#[test]
fn known_bad_file_is_ignored() {
    let (_dir, config) = archive(&["150826000000", "150826040000", "150826080000"]);
    let loader = L1BLoader::from_config(&config).unwrap();
    let at = |h: u32, mi: u32| {
        NaiveDate::from_ymd_opt(2015, 8, 26)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    };

    let outcome = loader.load_date_range(at(0, 0), at(11, 59)).unwrap();
    assert_eq!(outcome.unresolved.len(), 1);
    let skipped = &outcome.unresolved[0];
    assert_eq!(skipped.stamp, Some(FileStamp::parse("150826040000").unwrap()));
    assert_eq!(skipped.reason, UnresolvedReason::Ignored);
    assert!(skipped.source.to_string().ends_with("150826040000.L1B"));

    let t = times(&outcome.records);
    assert!(t.iter().any(|&x| x < at(4, 0)));
    assert!(t.iter().any(|&x| x >= at(8, 0)));
    assert!(t.iter().all(|&x| x < at(4, 0) || x >= at(8, 0)));

    // The ignore list names L1B files only.
    let l2 = L2Loader::from_config(&config)
        .unwrap()
        .load_date_range(at(0, 0), at(11, 59), Ddr::Ddr1, None)
        .unwrap();
    assert!(l2.is_complete());
}
