//! Pipeline orchestrator: parse → sun filter → night segmentation →
//! astronomical annotation → cloud detection → output assembly.
//!
//! Batch, single-threaded, run-to-completion; one site's one raw file per
//! invocation. Geometry is computed in one batched call per quantity —
//! never per sample.

use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::astronomy::{self, SiteLocation};
use crate::cloud::{self, SCORE_FLOOR};
use crate::config::SiteParams;
use crate::error::Result;
use crate::ingest;
use crate::models::{radiance_nw_cm2_sr, AnnotatedSample};
use crate::nights::{self, Night};
use crate::output::OutputRecord;
use crate::sites::Site;

/// Outcome of one reduction run.
///
/// An empty result after filtering is an expected condition (a freshly
/// deployed sensor, a daytime-only file), distinguished from the error
/// path so operators can tell "nothing to reduce" from "broken input".
#[derive(Debug)]
pub enum Reduction {
    Complete(ReductionOutput),
    NoUsableData { stage: &'static str },
}

#[derive(Debug)]
pub struct ReductionOutput {
    pub records: Vec<OutputRecord>,
    pub nights: Vec<Night>,
    pub with_skytemp: bool,
    pub summary: Summary,
}

/// Per-stage counts for the operator-facing run report. Silent
/// data-quality regressions at a site show up here first.
#[derive(Debug, Clone)]
pub struct Summary {
    pub site_label: String,
    pub rows_parsed: usize,
    pub after_sun_filter: usize,
    pub nights_found: usize,
    pub nights_retained: usize,
    pub window_size: usize,
    pub samples_written: usize,
    /// Samples whose cloud score exceeds the configured threshold.
    pub cloudy_samples: usize,
    /// Samples with the Milky Way within the exclusion band of the zenith.
    pub milky_way_overhead: usize,
    /// Samples with the moon below the configured altitude limit.
    pub moonless_samples: usize,
}

/// True when a sample survives the daytime filter. Retention is boundary
/// inclusive: a sample with the sun exactly at the cutoff stays.
pub fn sun_retained(sun_alt_deg: f64, cutoff_deg: f64) -> bool {
    sun_alt_deg <= cutoff_deg
}

/// Run the full reduction for one site's raw file.
pub fn reduce_file(path: &Path, site: &Site, params: &SiteParams) -> Result<Reduction> {
    let loc = SiteLocation::new(site.longitude, site.latitude, site.elevation_m);
    let desc = site.sensor.descriptor();
    let window = params.window_size.unwrap_or_else(|| desc.default_window());

    let stage = Instant::now();
    let raw = ingest::read_raw_file(path, site, params)?;
    let rows_parsed = raw.len();
    if raw.is_empty() {
        return Ok(Reduction::NoUsableData { stage: "parse" });
    }

    // Solar altitude for the full batch, then the daytime filter.
    let times: Vec<DateTime<Utc>> = raw.iter().map(|s| s.utc).collect();
    let sun_alt = astronomy::sun_altitudes(&loc, &times);
    let mut samples: Vec<AnnotatedSample> = raw
        .into_iter()
        .zip(sun_alt)
        .filter(|&(_, alt)| sun_retained(alt, params.sun_cutoff_deg))
        .map(|(raw, alt)| AnnotatedSample::new(raw, alt))
        .collect();
    let after_sun_filter = samples.len();
    info!(
        rows_parsed,
        retained = after_sun_filter,
        cutoff = params.sun_cutoff_deg,
        elapsed = ?stage.elapsed(),
        "sun filter"
    );
    if samples.is_empty() {
        return Ok(Reduction::NoUsableData { stage: "sun-filter" });
    }

    // Coarse nights, then drop those too short for a reliable cloud fit.
    let stage = Instant::now();
    let times: Vec<DateTime<Utc>> = samples.iter().map(|s| s.raw.utc).collect();
    let bounds = nights::segment(&times, params.night_gap_hours)?;
    let nights_found = bounds.len();
    let keep = nights::indices_of_long_nights(&bounds, 3 * window);
    if keep.is_empty() {
        info!(
            nights_found,
            nights_retained = 0,
            min_samples = 3 * window,
            "every night is too short for cloud detection"
        );
        return Ok(Reduction::NoUsableData {
            stage: "night-filter",
        });
    }
    samples = take_indices(samples, &keep);

    // Re-segment the survivors. Dropping whole nights only widens gaps,
    // but re-running pass 1 keeps the partition invariant checked.
    let times: Vec<DateTime<Utc>> = samples.iter().map(|s| s.raw.utc).collect();
    let bounds = nights::segment(&times, params.night_gap_hours)?;
    let sun_alt: Vec<f64> = samples.iter().map(|s| s.sun_alt_deg).collect();
    let night_spans = nights::locate_twilight(&sun_alt, &bounds, params.dark_sun_alt_deg);
    for (id, night) in night_spans.iter().enumerate() {
        for s in &mut samples[night.start..=night.end] {
            s.night_id = Some(id);
        }
    }
    if let Some((id, sparsest)) = night_spans
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| n.twilight_end - n.twilight_start)
    {
        info!(
            night = id,
            dark_samples = sparsest.twilight_end - sparsest.twilight_start,
            degenerate = sparsest.twilight_is_degenerate(),
            "sparsest dark window"
        );
    }
    info!(
        nights_found,
        nights_retained = night_spans.len(),
        elapsed = ?stage.elapsed(),
        "night segmentation"
    );

    // Remaining geometry, batched per quantity.
    let stage = Instant::now();
    let moon = astronomy::moon_altitudes(&loc, &times);
    let lst = astronomy::apparent_sidereal_hours(&loc, &times);
    let mw = astronomy::zenith_galactic_latitudes(&loc, &times);
    for (i, s) in samples.iter_mut().enumerate() {
        s.moon_alt_deg = moon[i];
        s.lst_hours = lst[i];
        s.zenith_gal_lat_deg = mw[i];
    }
    info!(elapsed = ?stage.elapsed(), "astronomical annotation");

    // Cloud detection, night by night.
    let stage = Instant::now();
    let jd: Vec<f64> = samples
        .iter()
        .map(|s| astronomy::julian_day(s.raw.utc))
        .collect();
    let mag: Vec<f64> = samples.iter().map(|s| s.raw.mag).collect();
    let mut scores = vec![SCORE_FLOOR; samples.len()];
    for night in &night_spans {
        cloud::score_night(&jd, &mag, night.start, night.end, window, &mut scores);
    }
    for (s, &score) in samples.iter_mut().zip(&scores) {
        s.cloud_score = Some(score);
    }
    info!(window, elapsed = ?stage.elapsed(), "cloud detection");

    let records: Vec<OutputRecord> = samples
        .iter()
        .map(|s| OutputRecord {
            utc: s.raw.utc,
            sqm: s.raw.mag,
            lum: radiance_nw_cm2_sr(s.raw.mag),
            chisquared: s.cloud_score.unwrap_or(SCORE_FLOOR),
            moonalt: s.moon_alt_deg,
            lst: s.lst_hours,
            sunalt: s.sun_alt_deg,
            skytemp: s.raw.aux.sky_temp_c,
        })
        .collect();

    let summary = Summary {
        site_label: site.label.clone(),
        rows_parsed,
        after_sun_filter,
        nights_found,
        nights_retained: night_spans.len(),
        window_size: window,
        samples_written: records.len(),
        cloudy_samples: scores
            .iter()
            .filter(|&&c| c > params.cloud_chi2_threshold)
            .count(),
        milky_way_overhead: samples
            .iter()
            .filter(|s| s.zenith_gal_lat_deg <= params.mw_exclusion_deg)
            .count(),
        moonless_samples: samples
            .iter()
            .filter(|s| s.moon_alt_deg <= params.moon_limit_deg)
            .count(),
    };

    Ok(Reduction::Complete(ReductionOutput {
        records,
        nights: night_spans,
        with_skytemp: desc.has_sky_temp,
        summary,
    }))
}

/// Keep the samples at `indices` (sorted ascending), preserving order.
fn take_indices(samples: Vec<AnnotatedSample>, indices: &[usize]) -> Vec<AnnotatedSample> {
    samples
        .into_iter()
        .enumerate()
        .filter(|(i, _)| indices.binary_search(i).is_ok())
        .map(|(_, s)| s)
        .collect()
}
