use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};

use nsb_reduce::cloud::SCORE_FLOOR;
use nsb_reduce::config::ReduceConfig;
use nsb_reduce::pipeline::{reduce_file, Reduction, ReductionOutput};
use nsb_reduce::sensors::SensorKind;
use nsb_reduce::sites::{Site, SiteRegistry};

// ---- Test Harness ----

// Synthetic site in the Santa Catalina mountains: 5-minute SQM-LE cadence,
// cloud-fit window 19.
fn test_site() -> Site {
    Site {
        longitude: -110.7,
        latitude: 32.4,
        elevation_m: 2790.0,
        sensor: SensorKind::SqmLe,
        header_line_count: 2,
        dark_limit: 22.0,
        bright_limit: 16.0,
        label: "MtLemmon".to_string(),
    }
}

/// Write an SQM-LE raw file covering `hours` from `start`, 5-minute
/// cadence, with per-sample brightness from `mag_at`.
fn write_raw_file(
    dir: &Path,
    start: DateTime<Utc>,
    hours: i64,
    mag_at: impl Fn(DateTime<Utc>) -> f64,
) -> std::path::PathBuf {
    let path = dir.join("MtLemmon_synthetic.dat");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "# synthetic fixture").unwrap();
    writeln!(f, "# SQM-LE").unwrap();
    let n = hours * 12;
    for i in 0..n {
        let utc = start + Duration::minutes(5 * i);
        let local = utc - Duration::hours(7);
        writeln!(
            f,
            "{};{};10.5;12.40;{:.3};{};",
            utc.format("%Y-%m-%dT%H:%M:%S%.3f"),
            local.format("%Y-%m-%dT%H:%M:%S%.3f"),
            mag_at(utc),
            i + 1
        )
        .unwrap();
    }
    path
}

fn run(path: &Path) -> Reduction {
    let site = test_site();
    let params = ReduceConfig::default().for_site(&site.label).unwrap();
    reduce_file(path, &site, &params).unwrap()
}

fn expect_complete(reduction: Reduction) -> ReductionOutput {
    match reduction {
        Reduction::Complete(out) => out,
        Reduction::NoUsableData { stage } => {
            panic!("expected a complete reduction, got NoUsableData at {stage}")
        }
    }
}

// ---- Scenarios ----

#[test]
fn constant_brightness_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let path = write_raw_file(dir.path(), start, 24, |_| 21.0);

    let out = expect_complete(run(&path));

    // One contiguous dark block survives the sun filter: one night.
    assert_eq!(out.nights.len(), 1);
    let night = out.nights[0];
    assert!(night.len() >= 57, "night has {} samples", night.len());
    assert_eq!(out.records.len(), night.len());

    // The twilight sub-window brackets the -18 crossings.
    assert!(!night.twilight_is_degenerate());
    assert!(night.twilight_start > night.start);
    assert!(night.twilight_end > night.twilight_start);
    assert!(out.records[night.twilight_start].sunalt <= -18.0);
    assert!(out.records[night.twilight_start - 1].sunalt > -18.0);

    // Every sample passed the sun filter and is in ascending UTC order.
    for pair in out.records.windows(2) {
        assert!(pair[0].utc < pair[1].utc);
    }
    for r in &out.records {
        assert!(r.sunalt <= -3.0);
        assert!(r.moonalt.is_finite());
        assert!((0.0..24.0).contains(&r.lst));
        // A flat brightness series fits exactly: every score sits on the
        // floor, including the near-edge quadratic fits.
        assert_eq!(r.chisquared, SCORE_FLOOR);
        assert!((r.sqm - 21.0).abs() < 1e-9);
    }

    assert_eq!(out.summary.nights_retained, 1);
    assert_eq!(out.summary.samples_written, out.records.len());
    assert_eq!(out.summary.cloudy_samples, 0);
}

#[test]
fn cloud_excursion_raises_scores_locally() {
    let dir = tempfile::tempdir().unwrap();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let burst_start = Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 0).unwrap();
    let burst_end = Utc.with_ymd_and_hms(2024, 1, 1, 7, 30, 0).unwrap();

    // A 30-minute, 1-magnitude brightening mid-night.
    let path = write_raw_file(dir.path(), start, 24, |utc| {
        if utc >= burst_start && utc < burst_end {
            20.0
        } else {
            21.0
        }
    });

    let out = expect_complete(run(&path));
    assert_eq!(out.nights.len(), 1);

    // Two window-widths of 5-minute samples on either side of the burst.
    let margin = Duration::minutes(5 * 2 * 19);
    let burst_max = out
        .records
        .iter()
        .filter(|r| r.utc >= burst_start && r.utc < burst_end)
        .map(|r| r.chisquared)
        .fold(f64::MIN, f64::max);
    assert!(
        burst_max > 0.009,
        "burst samples should exceed the cloud threshold, max = {burst_max}"
    );

    for r in &out.records {
        if r.utc < burst_start - margin || r.utc >= burst_end + margin {
            assert!(
                r.chisquared < 0.009,
                "sample at {} far from the burst scored {}",
                r.utc,
                r.chisquared
            );
        }
        assert!(r.chisquared >= SCORE_FLOOR);
        assert!(r.chisquared.is_finite());
    }

    assert!(out.summary.cloudy_samples > 0);
}

#[test]
fn short_night_is_rejected_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    // Five samples in evening twilight: far fewer than 3 * 19.
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 1, 30, 0).unwrap();
    let path = write_raw_file(dir.path(), start, 0, |_| 21.0);
    // write_raw_file with hours=0 writes nothing; append 5 rows manually.
    let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    for i in 0..5 {
        let utc = start + Duration::minutes(5 * i);
        let local = utc - Duration::hours(7);
        writeln!(
            f,
            "{};{};10.5;12.40;21.000;{};",
            utc.format("%Y-%m-%dT%H:%M:%S%.3f"),
            local.format("%Y-%m-%dT%H:%M:%S%.3f"),
            i + 1
        )
        .unwrap();
    }

    match run(&path) {
        Reduction::NoUsableData { stage } => assert_eq!(stage, "night-filter"),
        Reduction::Complete(_) => panic!("short night must be rejected"),
    }
}

#[test]
fn reduction_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let path = write_raw_file(dir.path(), start, 24, |utc| {
        // Mild smooth variation so values are not all identical.
        21.0 + 0.001 * (utc.timestamp() % 7) as f64
    });

    let a = expect_complete(run(&path));
    let b = expect_complete(run(&path));

    let wide_a = dir.path().join("a.csv");
    let wide_b = dir.path().join("b.csv");
    nsb_reduce::output::write_wide_csv(&wide_a, &a.records, a.with_skytemp).unwrap();
    nsb_reduce::output::write_wide_csv(&wide_b, &b.records, b.with_skytemp).unwrap();
    assert_eq!(
        std::fs::read(&wide_a).unwrap(),
        std::fs::read(&wide_b).unwrap()
    );

    let narrow_a = dir.path().join("inf-a.csv");
    let narrow_b = dir.path().join("inf-b.csv");
    nsb_reduce::output::write_narrow_csv(&narrow_a, &a.records, "MtLemmon").unwrap();
    nsb_reduce::output::write_narrow_csv(&narrow_b, &b.records, "MtLemmon").unwrap();
    assert_eq!(
        std::fs::read(&narrow_a).unwrap(),
        std::fs::read(&narrow_b).unwrap()
    );
}

#[test]
fn registry_resolution_feeds_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let registry_path = dir.path().join("sites.csv");
    std::fs::write(
        &registry_path,
        "longitude,latitude,elevation_m,sensor_type,header_line_count,dark_limit,bright_limit,label\n\
         -110.7,32.4,2790,SQM,2,22.0,16.0,MtLemmon\n\
         -111.6,35.2,2210,TESS,3,22.0,16.0,Flagstaff\n",
    )
    .unwrap();

    let registry = SiteRegistry::from_path(&registry_path).unwrap();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let raw_path = write_raw_file(dir.path(), start, 24, |_| 21.0);

    let (site, score) = registry.resolve(raw_path.to_str().unwrap()).unwrap();
    assert_eq!(site.label, "MtLemmon");
    assert!(score > 0.9);

    let params = ReduceConfig::default().for_site(&site.label).unwrap();
    let out = expect_complete(reduce_file(&raw_path, site, &params).unwrap());
    assert!(!out.with_skytemp);
    assert!(out.summary.samples_written > 0);
}

#[test]
fn night_partition_tiles_all_retained_samples() {
    let dir = tempfile::tempdir().unwrap();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    // Two full days: two retained nights.
    let path = write_raw_file(dir.path(), start, 48, |_| 21.0);

    let out = expect_complete(run(&path));
    assert!(out.nights.len() >= 2);
    let covered: usize = out.nights.iter().map(|n| n.len()).sum();
    assert_eq!(covered, out.records.len());
    for pair in out.nights.windows(2) {
        assert_eq!(pair[0].end + 1, pair[1].start);
    }
}
