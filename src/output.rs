//! Serialization of the standardized per-site time series: the wide CSV
//! consumed by the plotting/dashboard side, and the narrow
//! measurement/field/value CSV the time-series database ingests.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Result;

/// Fields exported to the time-series sink, in block order.
const NARROW_FIELDS: [&str; 4] = ["SQM", "lum", "chisquared", "moonalt"];

/// One final row of the standardized output, ascending UTC.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub utc: DateTime<Utc>,
    /// Sky brightness, mag/arcsec^2.
    pub sqm: f64,
    /// Radiance, nW/cm^2/sr.
    pub lum: f64,
    /// Cloud score (local fit residual sum of squares).
    pub chisquared: f64,
    /// Lunar altitude, degrees.
    pub moonalt: f64,
    /// Local apparent sidereal time, hours.
    pub lst: f64,
    /// Solar altitude, degrees.
    pub sunalt: f64,
    /// Sky temperature, Celsius; TESS sensors only.
    pub skytemp: Option<f64>,
}

impl OutputRecord {
    fn utc_string(&self) -> String {
        self.utc.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    fn narrow_value(&self, field: &str) -> String {
        match field {
            "SQM" => format!("{:.3}", self.sqm),
            "lum" => format!("{:.5}", self.lum),
            "chisquared" => format!("{:.5}", self.chisquared),
            "moonalt" => format!("{:.2}", self.moonalt),
            other => unreachable!("unknown narrow field {other}"),
        }
    }
}

/// Write the wide-format CSV: header
/// `UTC,SQM,lum,chisquared,moonalt,LST,sunalt[,Skytemp]`, fixed decimal
/// precisions, one row per retained sample.
pub fn write_wide_csv(path: &Path, records: &[OutputRecord], with_skytemp: bool) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    if with_skytemp {
        writeln!(out, "UTC,SQM,lum,chisquared,moonalt,LST,sunalt,Skytemp")?;
    } else {
        writeln!(out, "UTC,SQM,lum,chisquared,moonalt,LST,sunalt")?;
    }

    for r in records {
        write!(
            out,
            "{},{:.3},{:.5},{:.5},{:.2},{:.5},{:.3}",
            r.utc_string(),
            r.sqm,
            r.lum,
            r.chisquared,
            r.moonalt,
            r.lst,
            r.sunalt
        )?;
        if with_skytemp {
            match r.skytemp {
                Some(t) => writeln!(out, ",{t:.2}")?,
                None => writeln!(out, ",")?,
            }
        } else {
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Write the narrow annotated CSV for the time-series database: the three
/// annotation lines, a single header, then one block of
/// `(_time, _value, _field, _measurement)` rows per exported field.
pub fn write_narrow_csv(path: &Path, records: &[OutputRecord], measurement: &str) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    writeln!(out, "#group,false,false,false,false,true,true")?;
    writeln!(out, "#datatype,string,long,dateTime:RFC3339,double,string,string")?;
    writeln!(out, "#default,,,,,,")?;
    writeln!(out, ",,table,_time,_value,_field,_measurement")?;

    for field in NARROW_FIELDS {
        for r in records {
            writeln!(
                out,
                ",,,{},{},{},{}",
                r.utc_string(),
                r.narrow_value(field),
                field,
                measurement
            )?;
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(minute: u32, sqm: f64) -> OutputRecord {
        OutputRecord {
            utc: Utc.with_ymd_and_hms(2024, 1, 1, 3, minute, 0).unwrap(),
            sqm,
            lum: crate::models::radiance_nw_cm2_sr(sqm),
            chisquared: 1e-5,
            moonalt: -23.456,
            lst: 4.123456,
            sunalt: -19.8767,
            skytemp: Some(-8.127),
        }
    }

    #[test]
    fn wide_csv_formats_fixed_precision() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_wide_csv(&path, &[record(0, 21.0)], false).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "UTC,SQM,lum,chisquared,moonalt,LST,sunalt"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2024-01-01T03:00:00Z,21.000,0.06597,0.00001,-23.46,4.12346,-19.877"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn wide_csv_includes_skytemp_for_tess() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_wide_csv(&path, &[record(0, 21.0)], true).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().ends_with(",Skytemp"));
        assert!(lines.next().unwrap().ends_with(",-8.13"));
    }

    #[test]
    fn narrow_csv_blocks_per_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inf.csv");
        write_narrow_csv(&path, &[record(0, 21.0), record(5, 21.1)], "MtLemmon").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], "#group,false,false,false,false,true,true");
        assert_eq!(
            lines[1],
            "#datatype,string,long,dateTime:RFC3339,double,string,string"
        );
        assert_eq!(lines[2], "#default,,,,,,");
        assert_eq!(lines[3], ",,table,_time,_value,_field,_measurement");
        // 4 annotation/header lines + 4 fields x 2 records.
        assert_eq!(lines.len(), 4 + 8);
        assert_eq!(lines[4], ",,,2024-01-01T03:00:00Z,21.000,SQM,MtLemmon");
        // Blocks are ordered SQM, lum, chisquared, moonalt.
        assert!(lines[6].contains(",lum,"));
        assert!(lines[10].contains(",moonalt,"));
    }

    #[test]
    fn identical_records_serialize_identically() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        let records = vec![record(0, 21.0), record(5, 20.987654)];
        write_wide_csv(&a, &records, true).unwrap();
        write_wide_csv(&b, &records, true).unwrap();
        assert_eq!(
            std::fs::read(&a).unwrap(),
            std::fs::read(&b).unwrap()
        );
    }
}
