//! Solar, lunar, and sidereal geometry for a fixed ground site.
//!
//! A thin vectorized layer over the `astro` ephemeris crate (Meeus
//! algorithms). Every entry point takes the full time vector and returns a
//! parallel vector: reduction batches run to 10^5 samples and per-sample
//! invocation is too slow to be allowed.
//!
//! All functions are pure over `(location, times)`.

use std::f64::consts::TAU;

use chrono::{DateTime, Utc};

/// Geodetic site location. Longitude east-positive, degrees.
#[derive(Debug, Clone, Copy)]
pub struct SiteLocation {
    pub longitude_deg: f64,
    pub latitude_deg: f64,
    pub elevation_m: f64,
}

impl SiteLocation {
    pub fn new(longitude_deg: f64, latitude_deg: f64, elevation_m: f64) -> Self {
        Self {
            longitude_deg,
            latitude_deg,
            elevation_m,
        }
    }
}

const EARTH_EQ_RADIUS_KM: f64 = 6378.14;

// North galactic pole in ICRS (J2000), degrees.
const GAL_POLE_RA_DEG: f64 = 192.85948;
const GAL_POLE_DEC_DEG: f64 = 27.12825;

/// Julian day of a UTC instant.
pub fn julian_day(utc: DateTime<Utc>) -> f64 {
    let secs = utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) * 1e-9;
    secs / 86_400.0 + 2_440_587.5
}

fn wrap_two_pi(x: f64) -> f64 {
    x.rem_euclid(TAU)
}

/// Greenwich apparent sidereal time, radians.
fn apparent_gst_rad(jd: f64) -> f64 {
    let mean = astro::time::mn_sidr(jd);
    let (nut_long, nut_oblq) = astro::nutation::nutation(jd);
    let true_oblq = astro::ecliptic::mn_oblq_IAU(jd) + nut_oblq;
    wrap_two_pi(mean + nut_long * true_oblq.cos())
}

/// Equatorial coordinates (of date) from a geocentric ecliptic position.
fn eq_from_ecl(ecl_long: f64, ecl_lat: f64, jd: f64) -> (f64, f64) {
    let oblq = astro::ecliptic::mn_oblq_IAU(jd);
    let asc = astro::coords::asc_frm_ecl(ecl_long, ecl_lat, oblq);
    let dec = astro::coords::dec_frm_ecl(ecl_long, ecl_lat, oblq);
    (asc, dec)
}

/// Altitude above the horizon, degrees, from equatorial coordinates.
fn altitude_deg(gst_rad: f64, loc: &SiteLocation, asc: f64, dec: f64) -> f64 {
    let lst = gst_rad + loc.longitude_deg.to_radians();
    let hour_angle = lst - asc;
    let lat = loc.latitude_deg.to_radians();
    (lat.sin() * dec.sin() + lat.cos() * dec.cos() * hour_angle.cos())
        .asin()
        .to_degrees()
}

/// Galactic latitude, degrees, of an ICRS direction given in degrees.
fn galactic_latitude_deg(ra_deg: f64, dec_deg: f64) -> f64 {
    let ra = ra_deg.to_radians();
    let dec = dec_deg.to_radians();
    let pole_ra = GAL_POLE_RA_DEG.to_radians();
    let pole_dec = GAL_POLE_DEC_DEG.to_radians();
    (dec.sin() * pole_dec.sin() + dec.cos() * pole_dec.cos() * (ra - pole_ra).cos())
        .asin()
        .to_degrees()
}

/// Solar altitude for each instant, degrees.
pub fn sun_altitudes(loc: &SiteLocation, times: &[DateTime<Utc>]) -> Vec<f64> {
    times
        .iter()
        .map(|&t| {
            let jd = julian_day(t);
            let (ecl, _dist) = astro::sun::geocent_ecl_pos(jd);
            let (asc, dec) = eq_from_ecl(ecl.long, ecl.lat, jd);
            altitude_deg(apparent_gst_rad(jd), loc, asc, dec)
        })
        .collect()
}

/// Lunar altitude for each instant, degrees, corrected for the horizontal
/// parallax of the geocentric position (the Moon is close enough that the
/// topocentric correction reaches a degree).
pub fn moon_altitudes(loc: &SiteLocation, times: &[DateTime<Utc>]) -> Vec<f64> {
    times
        .iter()
        .map(|&t| {
            let jd = julian_day(t);
            let (ecl, dist_km) = astro::lunar::geocent_ecl_pos(jd);
            let (asc, dec) = eq_from_ecl(ecl.long, ecl.lat, jd);
            let geocentric = altitude_deg(apparent_gst_rad(jd), loc, asc, dec).to_radians();
            let parallax = (EARTH_EQ_RADIUS_KM / dist_km).asin();
            (geocentric - parallax * geocentric.cos()).to_degrees()
        })
        .collect()
}

/// Local apparent sidereal time for each instant, hours in `[0, 24)`.
pub fn apparent_sidereal_hours(loc: &SiteLocation, times: &[DateTime<Utc>]) -> Vec<f64> {
    times
        .iter()
        .map(|&t| {
            let gst = apparent_gst_rad(julian_day(t));
            let lst = wrap_two_pi(gst + loc.longitude_deg.to_radians());
            lst * 24.0 / TAU
        })
        .collect()
}

/// Absolute galactic latitude of the zenith for each instant, degrees.
///
/// The zenith direction is (RA = local sidereal time, Dec = site latitude);
/// low values mean the Milky Way is overhead.
pub fn zenith_galactic_latitudes(loc: &SiteLocation, times: &[DateTime<Utc>]) -> Vec<f64> {
    apparent_sidereal_hours(loc, times)
        .into_iter()
        .map(|lst_hours| galactic_latitude_deg(lst_hours * 15.0, loc.latitude_deg).abs())
        .collect()
}
