use chrono::{DateTime, NaiveDateTime, Utc};

/// Reference sky brightness for the radiance conversion, mag/arcsec^2
/// (Bará et al. 2019).
pub const MAG_REF: f64 = 21.15;

/// Radiance at [`MAG_REF`], nW/cm^2/sr.
pub const RADIANCE_AT_MAG_REF: f64 = 0.05746;

/// Convert a sky brightness in mag/arcsec^2 to radiance in nW/cm^2/sr.
pub fn radiance_nw_cm2_sr(mag: f64) -> f64 {
    RADIANCE_AT_MAG_REF * 10f64.powf((MAG_REF - mag) / 2.5)
}

/// Auxiliary channels carried alongside the brightness reading. Which ones
/// are present depends on the sensor variant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AuxChannels {
    pub enclosure_temp_c: Option<f64>,
    pub sky_temp_c: Option<f64>,
    pub voltage: Option<f64>,
    pub counts: Option<f64>,
    pub frequency: Option<f64>,
}

/// One cleaned sensor reading, as produced by the raw record parser.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub utc: DateTime<Utc>,
    pub local: NaiveDateTime,
    /// Sky brightness, mag/arcsec^2.
    pub mag: f64,
    pub aux: AuxChannels,
}

/// A sample augmented with derived astronomical context.
///
/// `night_id` and `cloud_score` stay unset until night segmentation and
/// cloud detection have run.
#[derive(Debug, Clone)]
pub struct AnnotatedSample {
    pub raw: RawSample,
    pub sun_alt_deg: f64,
    pub moon_alt_deg: f64,
    pub lst_hours: f64,
    /// Absolute galactic latitude of the zenith, degrees.
    pub zenith_gal_lat_deg: f64,
    pub night_id: Option<usize>,
    pub cloud_score: Option<f64>,
}

impl AnnotatedSample {
    /// Wrap a raw sample once its solar altitude is known; the remaining
    /// annotations land later in the pipeline.
    pub fn new(raw: RawSample, sun_alt_deg: f64) -> Self {
        Self {
            raw,
            sun_alt_deg,
            moon_alt_deg: f64::NAN,
            lst_hours: f64::NAN,
            zenith_gal_lat_deg: f64::NAN,
            night_id: None,
            cloud_score: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radiance_at_reference_magnitude() {
        assert!((radiance_nw_cm2_sr(MAG_REF) - RADIANCE_AT_MAG_REF).abs() < 1e-12);
    }

    #[test]
    fn radiance_brightens_as_mag_drops() {
        // One magnitude brighter is a factor 10^0.4 in radiance.
        let ratio = radiance_nw_cm2_sr(20.15) / radiance_nw_cm2_sr(21.15);
        assert!((ratio - 10f64.powf(0.4)).abs() < 1e-9);
    }
}
