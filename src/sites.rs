use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReduceError, Result};
use crate::sensors::SensorKind;

/// Matches below this Jaro-Winkler score are rejected rather than guessed.
const MIN_MATCH_SCORE: f64 = 0.55;

/// One monitoring site from the registry. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    /// Degrees, east positive.
    pub longitude: f64,
    pub latitude: f64,
    pub elevation_m: f64,
    pub sensor: SensorKind,
    /// Header lines to skip when the raw file carries no `#` comments.
    pub header_line_count: usize,
    /// Faintest plausible reading, mag/arcsec^2.
    pub dark_limit: f64,
    /// Brightest plausible reading, mag/arcsec^2.
    pub bright_limit: f64,
    pub label: String,
}

/// The site table, loaded once per process and read-only thereafter.
#[derive(Debug, Clone)]
pub struct SiteRegistry {
    sites: Vec<Site>,
}

impl SiteRegistry {
    /// Load the registry CSV. Header row
    /// `longitude,latitude,elevation_m,sensor_type,header_line_count,dark_limit,bright_limit,label`;
    /// `#`-prefixed lines are comments.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;

        let mut sites = Vec::new();
        for (i, record) in rdr.records().enumerate() {
            let record = record?;
            // Line 1 is the header; comment lines are not counted.
            let line = i + 2;
            sites.push(parse_site(&record, line)?);
        }
        Ok(Self { sites })
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Site> {
        self.sites.iter()
    }

    pub fn by_label(&self, label: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.label == label)
    }

    /// Resolve the site a raw-file name refers to.
    ///
    /// Operators encode the site label in the file name (stem up to the
    /// last underscore) but misname files often enough that an exact match
    /// is not required; the best fuzzy match wins. Returns the site and
    /// the match score.
    pub fn resolve(&self, filename: &str) -> Result<(&Site, f64)> {
        let key = match_key(filename);
        let key_lower = key.to_lowercase();

        let mut best: Option<(&Site, f64)> = None;
        for site in &self.sites {
            let score = strsim::jaro_winkler(&key_lower, &site.label.to_lowercase());
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((site, score));
            }
        }

        match best {
            Some((site, score)) if score >= MIN_MATCH_SCORE => Ok((site, score)),
            Some((site, score)) => Err(ReduceError::SiteNotFound {
                name: key,
                best: site.label.clone(),
                score,
            }),
            None => Err(ReduceError::SiteNotFound {
                name: key,
                best: String::new(),
                score: 0.0,
            }),
        }
    }
}

fn parse_site(record: &csv::StringRecord, line: usize) -> Result<Site> {
    if record.len() < 8 {
        return Err(ReduceError::MalformedRegistry {
            line,
            reason: format!("expected 8 columns, found {}", record.len()),
        });
    }

    let field = |idx: usize| record.get(idx).unwrap_or("");
    let num = |idx: usize, name: &str| -> Result<f64> {
        field(idx)
            .parse::<f64>()
            .map_err(|_| ReduceError::MalformedRegistry {
                line,
                reason: format!("bad {name} '{}'", field(idx)),
            })
    };

    let label = field(7).to_string();
    if label.is_empty() {
        return Err(ReduceError::MalformedRegistry {
            line,
            reason: "empty site label".to_string(),
        });
    }

    Ok(Site {
        longitude: num(0, "longitude")?,
        latitude: num(1, "latitude")?,
        elevation_m: num(2, "elevation_m")?,
        sensor: SensorKind::from_registry(field(3))?,
        header_line_count: field(4).parse::<usize>().map_err(|_| {
            ReduceError::MalformedRegistry {
                line,
                reason: format!("bad header_line_count '{}'", field(4)),
            }
        })?,
        dark_limit: num(5, "dark_limit")?,
        bright_limit: num(6, "bright_limit")?,
        label,
    })
}

/// Portion of a file name that carries the site label: the stem, truncated
/// at the last underscore (the rest is a date or sequence suffix).
fn match_key(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    match stem.rfind('_') {
        Some(pos) if pos > 0 => stem[..pos].to_string(),
        _ => stem.to_string(),
    }
}
