use serde::{Deserialize, Serialize};

use crate::error::{ReduceError, Result};

/// Sensor hardware families and their raw file layouts.
///
/// Each registry `sensor_type` tag resolves once, at site resolution, to a
/// [`SensorDescriptor`] carrying the column layout, delimiter, and cadence.
/// Downstream stages branch on the descriptor, never on the tag string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorKind {
    /// SQM-LE data logger: semicolon-delimited, 5-minute cadence.
    SqmLe,
    /// SQM with photodiode counts and frequency columns, 5-minute cadence.
    SqmCounts,
    /// Minimal four-column SQM export, 10-minute cadence.
    SqmBasic,
    /// TESS photometer CSV: 1-minute cadence, decimated to 5 minutes.
    Tess,
    /// TESS readings delivered as a spreadsheet with local-time stamps only.
    TessXlsx,
}

impl SensorKind {
    /// Map a registry `sensor_type` tag to its variant.
    pub fn from_registry(tag: &str) -> Result<Self> {
        match tag.trim() {
            "SQM" | "SQM-LE" => Ok(SensorKind::SqmLe),
            "SQM2" => Ok(SensorKind::SqmCounts),
            "SQM3" => Ok(SensorKind::SqmBasic),
            "TESS" => Ok(SensorKind::Tess),
            "TESS1" | "TESS-XLSX" => Ok(SensorKind::TessXlsx),
            other => Err(ReduceError::UnknownSensor(other.to_string())),
        }
    }

    pub fn descriptor(self) -> &'static SensorDescriptor {
        match self {
            SensorKind::SqmLe => &SQM_LE,
            SensorKind::SqmCounts => &SQM_COUNTS,
            SensorKind::SqmBasic => &SQM_BASIC,
            SensorKind::Tess => &TESS,
            SensorKind::TessXlsx => &TESS_XLSX,
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SensorKind::SqmLe => "SQM-LE",
            SensorKind::SqmCounts => "SQM2",
            SensorKind::SqmBasic => "SQM3",
            SensorKind::Tess => "TESS",
            SensorKind::TessXlsx => "TESS1",
        };
        f.pad(name)
    }
}

/// Zero-based column positions within one raw data row.
#[derive(Debug, Clone, Copy)]
pub struct ColumnLayout {
    /// UTC timestamp column; `None` for local-time-only sensors.
    pub utc: Option<usize>,
    pub local: usize,
    pub mag: usize,
    pub enclosure_temp: Option<usize>,
    pub sky_temp: Option<usize>,
    pub voltage: Option<usize>,
    pub counts: Option<usize>,
    pub frequency: Option<usize>,
    /// Minimum number of columns a data row must carry.
    pub width: usize,
}

/// Everything the parser needs to know about one sensor variant.
#[derive(Debug, Clone, Copy)]
pub struct SensorDescriptor {
    pub kind: SensorKind,
    /// Preferred field delimiter; the parser still sniffs the first data
    /// line, since archives have been re-exported with either.
    pub delimiter: u8,
    pub columns: ColumnLayout,
    /// Native sampling interval of the hardware, minutes.
    pub cadence_minutes: u32,
    /// Keep every Nth row (1 = keep all). Lossy decimation, not averaging.
    pub decimation: usize,
    pub spreadsheet: bool,
    /// True when the file carries only local timestamps that must be
    /// localized with the site timezone.
    pub local_time_only: bool,
    pub has_sky_temp: bool,
}

impl SensorDescriptor {
    /// Sampling interval of the parsed stream after decimation, minutes.
    pub fn effective_cadence_minutes(&self) -> u32 {
        self.cadence_minutes * self.decimation as u32
    }

    /// Cadence-derived default for the cloud-fit window size.
    ///
    /// 19 points at 5-minute cadence puts 45 minutes on either side of a
    /// sample; 11 points covers the same ground at 10-minute cadence.
    pub fn default_window(&self) -> usize {
        match self.effective_cadence_minutes() {
            5 => 19,
            10 => 11,
            _ => 9,
        }
    }
}

static SQM_LE: SensorDescriptor = SensorDescriptor {
    kind: SensorKind::SqmLe,
    delimiter: b';',
    columns: ColumnLayout {
        utc: Some(0),
        local: 1,
        mag: 4,
        enclosure_temp: Some(2),
        sky_temp: None,
        voltage: Some(3),
        counts: None,
        frequency: None,
        width: 6,
    },
    cadence_minutes: 5,
    decimation: 1,
    spreadsheet: false,
    local_time_only: false,
    has_sky_temp: false,
};

static SQM_COUNTS: SensorDescriptor = SensorDescriptor {
    kind: SensorKind::SqmCounts,
    delimiter: b',',
    columns: ColumnLayout {
        utc: Some(0),
        local: 1,
        mag: 5,
        enclosure_temp: Some(2),
        sky_temp: None,
        voltage: None,
        counts: Some(3),
        frequency: Some(4),
        width: 6,
    },
    cadence_minutes: 5,
    decimation: 1,
    spreadsheet: false,
    local_time_only: false,
    has_sky_temp: false,
};

static SQM_BASIC: SensorDescriptor = SensorDescriptor {
    kind: SensorKind::SqmBasic,
    delimiter: b',',
    columns: ColumnLayout {
        utc: Some(0),
        local: 1,
        mag: 2,
        enclosure_temp: Some(3),
        sky_temp: None,
        voltage: None,
        counts: None,
        frequency: None,
        width: 4,
    },
    cadence_minutes: 10,
    decimation: 1,
    spreadsheet: false,
    local_time_only: false,
    has_sky_temp: false,
};

static TESS: SensorDescriptor = SensorDescriptor {
    kind: SensorKind::Tess,
    delimiter: b',',
    columns: ColumnLayout {
        utc: Some(0),
        local: 1,
        mag: 2,
        enclosure_temp: Some(4),
        sky_temp: Some(3),
        voltage: None,
        counts: None,
        frequency: None,
        width: 5,
    },
    cadence_minutes: 1,
    decimation: 5,
    spreadsheet: false,
    local_time_only: false,
    has_sky_temp: true,
};

static TESS_XLSX: SensorDescriptor = SensorDescriptor {
    kind: SensorKind::TessXlsx,
    delimiter: b',',
    columns: ColumnLayout {
        utc: None,
        local: 0,
        mag: 3,
        enclosure_temp: Some(1),
        sky_temp: Some(2),
        voltage: None,
        counts: None,
        frequency: None,
        width: 4,
    },
    cadence_minutes: 1,
    decimation: 5,
    spreadsheet: true,
    local_time_only: true,
    has_sky_temp: true,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_tags_resolve() {
        assert_eq!(SensorKind::from_registry("SQM").unwrap(), SensorKind::SqmLe);
        assert_eq!(
            SensorKind::from_registry(" SQM2 ").unwrap(),
            SensorKind::SqmCounts
        );
        assert_eq!(
            SensorKind::from_registry("SQM3").unwrap(),
            SensorKind::SqmBasic
        );
        assert_eq!(SensorKind::from_registry("TESS").unwrap(), SensorKind::Tess);
        assert_eq!(
            SensorKind::from_registry("TESS1").unwrap(),
            SensorKind::TessXlsx
        );
        assert!(matches!(
            SensorKind::from_registry("SQM9"),
            Err(ReduceError::UnknownSensor(_))
        ));
    }

    #[test]
    fn window_defaults_follow_cadence() {
        assert_eq!(SensorKind::SqmLe.descriptor().default_window(), 19);
        assert_eq!(SensorKind::SqmBasic.descriptor().default_window(), 11);
        // TESS is 1-minute data decimated to 5 minutes.
        assert_eq!(
            SensorKind::Tess.descriptor().effective_cadence_minutes(),
            5
        );
        assert_eq!(SensorKind::Tess.descriptor().default_window(), 19);
    }

    #[test]
    fn layouts_are_self_consistent() {
        for kind in [
            SensorKind::SqmLe,
            SensorKind::SqmCounts,
            SensorKind::SqmBasic,
            SensorKind::Tess,
            SensorKind::TessXlsx,
        ] {
            let d = kind.descriptor();
            let cols = &d.columns;
            let mut used = vec![cols.local, cols.mag];
            used.extend(cols.utc);
            used.extend(cols.enclosure_temp);
            used.extend(cols.sky_temp);
            used.extend(cols.voltage);
            used.extend(cols.counts);
            used.extend(cols.frequency);
            assert!(used.iter().all(|&c| c < cols.width), "{kind}");
            assert_eq!(d.local_time_only, cols.utc.is_none(), "{kind}");
            assert_eq!(d.has_sky_temp, cols.sky_temp.is_some(), "{kind}");
        }
    }
}
