use chrono::NaiveDate;
use pretty_assertions::assert_eq;

use mcs_tools::data::export;
use mcs_tools::data::source::FileStamp;
use mcs_tools::data::synthetic::SyntheticArchive;
use mcs_tools::preprocess::{preprocessor_by_name, radiance_grid, L1BPreprocessor};
use mcs_tools::{Config, L1BLoader, L1BOnPlanetInTrack, L1BStandardInTrack, RecordSet};

fn loaded_day() -> (tempfile::TempDir, RecordSet) {
    let dir = tempfile::tempdir().unwrap();
    let stamps: Vec<FileStamp> = ["160101000000", "160101040000"]
        .iter()
        .map(|s| FileStamp::parse(s).unwrap())
        .collect();
    SyntheticArchive::default().write(dir.path(), &stamps).unwrap();

    let config = Config::default().with_overrides(false, Some(dir.path().to_path_buf()));
    let day = NaiveDate::from_ymd_opt(2016, 1, 1).unwrap();
    let records = L1BLoader::from_config(&config)
        .unwrap()
        .load_date_range(
            day.and_hms_opt(0, 0, 0).unwrap(),
            day.and_hms_opt(7, 59, 59).unwrap(),
        )
        .unwrap()
        .into_records();
    (dir, records)
}

#[test]
fn standard_process_is_idempotent() {
    let (_dir, records) = loaded_day();
    let p = L1BStandardInTrack::default();
    let once = p.process(&records).unwrap();
    assert!(!once.is_empty());
    assert_eq!(p.process(&once).unwrap(), once);
}

#[test]
fn on_planet_process_is_idempotent() {
    let (_dir, records) = loaded_day();
    let p = L1BOnPlanetInTrack::default();
    let once = p.process(&records).unwrap();
    assert!(!once.is_empty());
    assert_eq!(p.process(&once).unwrap(), once);
}

#[test]
fn standard_pipeline_feeds_the_radiance_grid() {
    let (_dir, records) = loaded_day();
    let averaged = preprocessor_by_name("standard")
        .unwrap()
        .preprocess(&records)
        .unwrap();
    // 24 sequences per file, every fourth one cross-track.
    assert_eq!(averaged.len(), 2 * 18);

    let grid = radiance_grid(&averaged, "A3").unwrap();
    assert_eq!(grid.times.len(), averaged.len());
    assert_eq!(grid.detectors.len(), 21);
    assert!(grid.times.windows(2).all(|w| w[0] < w[1]));
    let (lo, hi) = grid.value_range().unwrap();
    assert!(lo < hi);
}

#[test]
fn averaged_sequences_export_to_parquet() {
    let (dir, records) = loaded_day();
    let averaged = L1BStandardInTrack::default().preprocess(&records).unwrap();

    let out = dir.path().join("averaged.parquet");
    export::write_file(&averaged, &out).unwrap();
    assert!(std::fs::metadata(&out).unwrap().len() > 0);

    let table = export::preview(&averaged, 3).unwrap();
    assert!(table.contains("Rad_A3_01"));
    assert!(export::write_file(&averaged, &dir.path().join("x.txt")).is_err());
}
