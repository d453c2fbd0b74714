//! Raw record parser: sensor-specific files in, a clean ordered
//! [`RawSample`] stream out.

use std::collections::HashSet;
use std::path::Path;

use calamine::{open_workbook, Data, Reader, Xlsx, XlsxError};
use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::config::{BadReadingPolicy, SiteParams};
use crate::error::{ReduceError, Result};
use crate::models::{AuxChannels, RawSample};
use crate::sensors::{ColumnLayout, SensorDescriptor};
use crate::sites::Site;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    // compact local stamp used by one spreadsheet export
    "%y%m%d%H%M",
];

/// Read one site's raw file into cleaned samples: header skip, delimiter
/// sniff, timestamp normalization, de-duplication, decimation, the
/// bad-reading policy, and the monotonicity check, in that order.
pub fn read_raw_file(path: &Path, site: &Site, params: &SiteParams) -> Result<Vec<RawSample>> {
    let desc = site.sensor.descriptor();
    let mut samples = if desc.spreadsheet {
        read_spreadsheet(path, site, desc, params.timezone)?
    } else {
        read_delimited(path, site, desc, params.timezone)?
    };
    let rows_read = samples.len();

    samples = drop_exact_duplicates(samples);
    let duplicates = rows_read - samples.len();

    if desc.decimation > 1 {
        samples = samples.into_iter().step_by(desc.decimation).collect();
    }

    let faults = apply_bad_reading_policy(
        &mut samples,
        params.bad_readings,
        params.validity_floor_mag,
    );

    if !desc.local_time_only {
        let adjusted = repair_local_clock(&mut samples, params.timezone);
        if adjusted > 0 {
            debug!(adjusted, "rewrote local timestamps with wrong UTC offset");
        }
    }

    check_monotonic(&samples)?;

    info!(
        rows_read,
        duplicates,
        faults,
        retained = samples.len(),
        sensor = %site.sensor,
        "parsed raw file"
    );
    Ok(samples)
}

fn read_delimited(
    path: &Path,
    site: &Site,
    desc: &SensorDescriptor,
    tz: Tz,
) -> Result<Vec<RawSample>> {
    let content = std::fs::read_to_string(path)?;
    let (skip, rest) = split_header(&content, site.header_line_count);
    let delimiter = sniff_delimiter(rest, desc.delimiter);

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(rest.as_bytes());

    let cols = &desc.columns;
    let mut out = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let line = skip + i + 1;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        if record.len() < cols.width {
            return Err(ReduceError::UnexpectedColumns {
                line,
                expected: cols.width,
                found: record.len(),
            });
        }
        out.push(parse_record(&record, cols, line, tz)?);
    }
    Ok(out)
}

fn read_spreadsheet(
    path: &Path,
    site: &Site,
    desc: &SensorDescriptor,
    tz: Tz,
) -> Result<Vec<RawSample>> {
    let mut workbook: Xlsx<std::io::BufReader<std::fs::File>> =
        open_workbook(path).map_err(|e: XlsxError| ReduceError::Spreadsheet(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ReduceError::Spreadsheet("workbook has no sheets".to_string()))?
        .map_err(|e| ReduceError::Spreadsheet(e.to_string()))?;

    let cols = &desc.columns;
    let skip = site.header_line_count.max(1);
    let mut out = Vec::new();
    for (i, row) in range.rows().enumerate().skip(skip) {
        let line = i + 1;
        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        if row.len() < cols.width {
            return Err(ReduceError::UnexpectedColumns {
                line,
                expected: cols.width,
                found: row.len(),
            });
        }

        let local = cell_timestamp(&row[cols.local], line)?;
        let utc = match cols.utc {
            Some(idx) => cell_timestamp(&row[idx], line)?.and_utc(),
            None => localize(local, tz, line)?,
        };
        let opt = |idx: Option<usize>, what: &str| -> Result<Option<f64>> {
            idx.map(|i| cell_f64(&row[i], what, line)).transpose()
        };
        out.push(RawSample {
            utc,
            local,
            mag: cell_f64(&row[cols.mag], "brightness", line)?,
            aux: AuxChannels {
                enclosure_temp_c: opt(cols.enclosure_temp, "temperature")?,
                sky_temp_c: opt(cols.sky_temp, "sky temperature")?,
                voltage: opt(cols.voltage, "voltage")?,
                counts: opt(cols.counts, "counts")?,
                frequency: opt(cols.frequency, "frequency")?,
            },
        });
    }
    Ok(out)
}

fn parse_record(
    record: &csv::StringRecord,
    cols: &ColumnLayout,
    line: usize,
    tz: Tz,
) -> Result<RawSample> {
    let field = |idx: usize| record.get(idx).unwrap_or("");

    let local = parse_timestamp(field(cols.local), line)?;
    let utc = match cols.utc {
        Some(idx) => parse_timestamp(field(idx), line)?.and_utc(),
        None => localize(local, tz, line)?,
    };
    let opt = |idx: Option<usize>, what: &str| -> Result<Option<f64>> {
        idx.map(|i| parse_f64(field(i), what, line)).transpose()
    };

    Ok(RawSample {
        utc,
        local,
        mag: parse_f64(field(cols.mag), "brightness", line)?,
        aux: AuxChannels {
            enclosure_temp_c: opt(cols.enclosure_temp, "temperature")?,
            sky_temp_c: opt(cols.sky_temp, "sky temperature")?,
            voltage: opt(cols.voltage, "voltage")?,
            counts: opt(cols.counts, "counts")?,
            frequency: opt(cols.frequency, "frequency")?,
        },
    })
}

/// Skip leading `#` comment lines; when there are none, fall back to the
/// registry header count (minimum one line, the column-name row).
fn split_header(content: &str, registry_count: usize) -> (usize, &str) {
    let mut n_comments = 0;
    for line in content.lines() {
        if line.starts_with('#') {
            n_comments += 1;
        } else {
            break;
        }
    }
    let skip = if n_comments > 0 {
        n_comments
    } else {
        registry_count.max(1)
    };

    let mut rest = content;
    for _ in 0..skip {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return (skip, ""),
        }
    }
    (skip, rest)
}

/// Comma vs semicolon, decided by the first data line.
fn sniff_delimiter(data: &str, preferred: u8) -> u8 {
    match data.lines().next() {
        Some(line) if line.contains(';') => b';',
        Some(line) if line.contains(',') => b',',
        _ => preferred,
    }
}

fn parse_timestamp(s: &str, line: usize) -> Result<NaiveDateTime> {
    let s = s.trim();
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            // Output is second-precision; fractional seconds are noise.
            return Ok(t.with_nanosecond(0).unwrap_or(t));
        }
    }
    Err(ReduceError::BadTimestamp {
        line,
        value: s.to_string(),
    })
}

fn localize(local: NaiveDateTime, tz: Tz, line: usize) -> Result<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(t) => Ok(t.with_timezone(&Utc)),
        _ => Err(ReduceError::BadTimestamp {
            line,
            value: format!("{local} is ambiguous or nonexistent in {tz}"),
        }),
    }
}

fn parse_f64(s: &str, what: &str, line: usize) -> Result<f64> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| ReduceError::Parse {
            line,
            reason: format!("bad {what} '{s}'"),
        })
}

fn cell_timestamp(cell: &Data, line: usize) -> Result<NaiveDateTime> {
    match cell {
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|t| t.with_nanosecond(0).unwrap_or(t))
            .ok_or_else(|| ReduceError::BadTimestamp {
                line,
                value: cell.to_string(),
            }),
        Data::DateTimeIso(s) => parse_timestamp(s, line),
        Data::String(s) => parse_timestamp(s, line),
        other => Err(ReduceError::BadTimestamp {
            line,
            value: other.to_string(),
        }),
    }
}

fn cell_f64(cell: &Data, what: &str, line: usize) -> Result<f64> {
    match cell {
        Data::Float(f) => Ok(*f),
        Data::Int(i) => Ok(*i as f64),
        Data::String(s) => parse_f64(s, what, line),
        other => Err(ReduceError::Parse {
            line,
            reason: format!("bad {what} '{other}'"),
        }),
    }
}

/// Drop repeated rows, keeping the first occurrence. Upstream archives
/// double-ingest whole blocks; rows are keyed on both timestamps and the
/// reading.
fn drop_exact_duplicates(samples: Vec<RawSample>) -> Vec<RawSample> {
    let mut seen = HashSet::with_capacity(samples.len());
    samples
        .into_iter()
        .filter(|s| {
            seen.insert((
                s.utc.timestamp(),
                s.local.and_utc().timestamp(),
                s.mag.to_bits(),
            ))
        })
        .collect()
}

/// Returns the number of fault readings dropped or rewritten.
fn apply_bad_reading_policy(
    samples: &mut Vec<RawSample>,
    policy: BadReadingPolicy,
    floor: f64,
) -> usize {
    match policy {
        BadReadingPolicy::Drop => {
            let before = samples.len();
            samples.retain(|s| s.mag > floor);
            before - samples.len()
        }
        BadReadingPolicy::Interpolate => {
            let mags: Vec<f64> = samples.iter().map(|s| s.mag).collect();
            let mut fixed = 0;
            for i in 0..samples.len() {
                if mags[i] > floor {
                    continue;
                }
                let prev = (0..i).rev().find(|&j| mags[j] > floor).map(|j| mags[j]);
                let next = (i + 1..mags.len())
                    .find(|&j| mags[j] > floor)
                    .map(|j| mags[j]);
                samples[i].mag = match (prev, next) {
                    (Some(p), Some(n)) => (p + n) / 2.0,
                    (Some(p), None) => p,
                    (None, Some(n)) => n,
                    (None, None) => mags[i],
                };
                fixed += 1;
            }
            fixed
        }
    }
}

/// Some archives carry a local column written with the wrong UTC offset.
/// The UTC column is authoritative; rewrite local stamps that disagree
/// with the site timezone.
fn repair_local_clock(samples: &mut [RawSample], tz: Tz) -> usize {
    let mut adjusted = 0;
    for s in samples.iter_mut() {
        let expected = s.utc.with_timezone(&tz).naive_local();
        if s.local != expected {
            s.local = expected;
            adjusted += 1;
        }
    }
    adjusted
}

/// The UTC sequence must be strictly increasing; anything else means a
/// corrupt or interleaved source file and is never silently resolved.
fn check_monotonic(samples: &[RawSample]) -> Result<()> {
    for i in 1..samples.len() {
        if samples[i].utc <= samples[i - 1].utc {
            return Err(ReduceError::NonMonotonicTime {
                index: i,
                prev: samples[i - 1].utc.to_rfc3339(),
                next: samples[i].utc.to_rfc3339(),
            });
        }
    }
    Ok(())
}
