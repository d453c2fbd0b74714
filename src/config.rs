use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// What to do with readings at or below the validity floor.
///
/// Sensor faults show up as zeros or near-zero magnitudes. Earlier
/// reductions averaged them with their neighbors; current practice drops
/// them outright. Both behaviors survive here as explicit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadReadingPolicy {
    Drop,
    Interpolate,
}

/// Tunable reduction policy.
///
/// Every scientific threshold the reduction scripts historically
/// hard-coded (with drifting values between revisions) lives here instead,
/// with per-site overrides keyed by registry label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReduceConfig {
    /// Solar-altitude retention cutoff, degrees. Samples are retained when
    /// `sun_alt <= cutoff` (boundary inclusive).
    pub sun_cutoff_deg: f64,
    /// Astronomical-darkness threshold for twilight location, degrees.
    pub dark_sun_alt_deg: f64,
    /// Timestamp gap that separates one observing night from the next, hours.
    pub night_gap_hours: f64,
    /// Cloud scores above this count as cloud-contaminated in the run summary.
    pub cloud_chi2_threshold: f64,
    /// Zenith |galactic latitude| at or below this flags likely Milky-Way
    /// contamination in the run summary.
    pub mw_exclusion_deg: f64,
    /// Lunar altitude below this counts as moonless in the run summary.
    pub moon_limit_deg: f64,
    /// Readings at or below this magnitude are sensor faults.
    pub validity_floor_mag: f64,
    pub bad_readings: BadReadingPolicy,
    /// IANA timezone for sensors that log local time only.
    pub timezone: String,
    /// Cloud-fit window size (odd). Unset means the sensor's
    /// cadence-derived default.
    pub window_size: Option<usize>,
    /// Per-site overrides keyed by registry label.
    pub sites: BTreeMap<String, SiteOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteOverrides {
    pub sun_cutoff_deg: Option<f64>,
    pub dark_sun_alt_deg: Option<f64>,
    pub night_gap_hours: Option<f64>,
    pub cloud_chi2_threshold: Option<f64>,
    pub mw_exclusion_deg: Option<f64>,
    pub moon_limit_deg: Option<f64>,
    pub validity_floor_mag: Option<f64>,
    pub bad_readings: Option<BadReadingPolicy>,
    pub timezone: Option<String>,
    pub window_size: Option<usize>,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            sun_cutoff_deg: -3.0,
            dark_sun_alt_deg: -18.0,
            night_gap_hours: 6.0,
            cloud_chi2_threshold: 0.009,
            mw_exclusion_deg: 50.0,
            moon_limit_deg: -10.0,
            validity_floor_mag: 1.0,
            bad_readings: BadReadingPolicy::Drop,
            timezone: "America/Phoenix".to_string(),
            window_size: None,
            sites: BTreeMap::new(),
        }
    }
}

/// Fully resolved parameters for one site's run.
#[derive(Debug, Clone)]
pub struct SiteParams {
    pub sun_cutoff_deg: f64,
    pub dark_sun_alt_deg: f64,
    pub night_gap_hours: f64,
    pub cloud_chi2_threshold: f64,
    pub mw_exclusion_deg: f64,
    pub moon_limit_deg: f64,
    pub validity_floor_mag: f64,
    pub bad_readings: BadReadingPolicy,
    pub timezone: chrono_tz::Tz,
    pub window_size: Option<usize>,
}

impl ReduceConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let config: ReduceConfig = toml_edit::de::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string = toml_edit::ser::to_string_pretty(self)
            .context("Failed to serialize configuration to TOML")?;
        std::fs::write(&path, toml_string)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Resolve the effective parameters for one site, applying overrides.
    pub fn for_site(&self, label: &str) -> Result<SiteParams> {
        let o = self.sites.get(label).cloned().unwrap_or_default();
        let tz_name = o.timezone.as_deref().unwrap_or(&self.timezone);
        let timezone = tz_name
            .parse::<chrono_tz::Tz>()
            .map_err(|_| anyhow::anyhow!("Unknown IANA timezone: {tz_name}"))?;
        Ok(SiteParams {
            sun_cutoff_deg: o.sun_cutoff_deg.unwrap_or(self.sun_cutoff_deg),
            dark_sun_alt_deg: o.dark_sun_alt_deg.unwrap_or(self.dark_sun_alt_deg),
            night_gap_hours: o.night_gap_hours.unwrap_or(self.night_gap_hours),
            cloud_chi2_threshold: o.cloud_chi2_threshold.unwrap_or(self.cloud_chi2_threshold),
            mw_exclusion_deg: o.mw_exclusion_deg.unwrap_or(self.mw_exclusion_deg),
            moon_limit_deg: o.moon_limit_deg.unwrap_or(self.moon_limit_deg),
            validity_floor_mag: o.validity_floor_mag.unwrap_or(self.validity_floor_mag),
            bad_readings: o.bad_readings.unwrap_or(self.bad_readings),
            timezone,
            window_size: o.window_size.or(self.window_size),
        })
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.night_gap_hours <= 0.0 {
            anyhow::bail!("night_gap_hours must be positive, got {}", self.night_gap_hours);
        }
        if self.cloud_chi2_threshold <= 0.0 {
            anyhow::bail!(
                "cloud_chi2_threshold must be positive, got {}",
                self.cloud_chi2_threshold
            );
        }
        if !(0.0..=90.0).contains(&self.mw_exclusion_deg) {
            anyhow::bail!(
                "mw_exclusion_deg must be within [0, 90], got {}",
                self.mw_exclusion_deg
            );
        }
        check_window(self.window_size)?;
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| anyhow::anyhow!("Unknown IANA timezone: {}", self.timezone))?;

        for (label, o) in &self.sites {
            check_window(o.window_size).with_context(|| format!("site '{label}'"))?;
            if let Some(tz) = &o.timezone {
                tz.parse::<chrono_tz::Tz>()
                    .map_err(|_| anyhow::anyhow!("site '{label}': unknown IANA timezone: {tz}"))?;
            }
            if let Some(gap) = o.night_gap_hours {
                if gap <= 0.0 {
                    anyhow::bail!("site '{label}': night_gap_hours must be positive");
                }
            }
        }
        Ok(())
    }
}

fn check_window(window: Option<usize>) -> Result<()> {
    if let Some(w) = window {
        if w < 3 || w % 2 == 0 {
            anyhow::bail!("window_size must be an odd number >= 3, got {w}");
        }
    }
    Ok(())
}
