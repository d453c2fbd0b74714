//! Night segmentation: partition an ordered sample sequence into observing
//! nights and locate each night's astronomically dark sub-window.

use chrono::{DateTime, Utc};

use crate::error::{ReduceError, Result};

/// A contiguous run of samples bounded by timestamp gaps, with its
/// astronomical-twilight sub-window. Indices are into the filtered sample
/// sequence; `start..=end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Night {
    pub start: usize,
    pub end: usize,
    pub twilight_start: usize,
    pub twilight_end: usize,
}

#[allow(clippy::len_without_is_empty)] // a night holds at least one sample
impl Night {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// True when no twilight crossing was found and the sub-window
    /// collapsed to the degenerate `(end-1, end)` placeholder. Callers
    /// computing per-night dark durations must skip these.
    pub fn twilight_is_degenerate(&self) -> bool {
        self.twilight_start == self.end.saturating_sub(1) && self.twilight_end == self.end
    }
}

/// Pass 1: partition by time gaps. A delta above `gap_hours` starts a new
/// night. The bounds tile the whole sequence; a coverage mismatch is an
/// internal bug and fails hard.
pub fn segment(times: &[DateTime<Utc>], gap_hours: f64) -> Result<Vec<(usize, usize)>> {
    if times.is_empty() {
        return Ok(Vec::new());
    }

    let gap_seconds = gap_hours * 3600.0;
    let mut starts = vec![0usize];
    for i in 1..times.len() {
        let delta = (times[i] - times[i - 1]).num_seconds() as f64;
        if delta > gap_seconds {
            starts.push(i);
        }
    }

    let mut bounds = Vec::with_capacity(starts.len());
    for (k, &s) in starts.iter().enumerate() {
        let e = if k + 1 < starts.len() {
            starts[k + 1] - 1
        } else {
            times.len() - 1
        };
        bounds.push((s, e));
    }

    check_partition(&bounds, times.len())?;
    Ok(bounds)
}

/// Verify that night bounds exactly tile `total` samples.
pub fn check_partition(bounds: &[(usize, usize)], total: usize) -> Result<()> {
    let covered: usize = bounds.iter().map(|&(s, e)| e - s + 1).sum();
    if covered != total {
        return Err(ReduceError::NightPartition {
            expected: total,
            found: covered,
        });
    }
    Ok(())
}

/// Indices of samples belonging to nights of at least `min_len` samples.
/// Shorter nights carry too little data for the cloud fit and are dropped
/// whole.
pub fn indices_of_long_nights(bounds: &[(usize, usize)], min_len: usize) -> Vec<usize> {
    let mut keep = Vec::new();
    for &(s, e) in bounds {
        if e - s + 1 >= min_len {
            keep.extend(s..=e);
        }
    }
    keep
}

/// Pass 2: locate the astronomical-twilight sub-window of each night.
///
/// Scans forward from the night's first sample for the first crossing of
/// `dark_deg` in the direction set by whether the night begins dark, then
/// for the matching exit crossing. A night with no entry crossing gets the
/// degenerate `(end-1, end)` window; a missing exit crossing means the
/// dark interval runs to the end of the data.
pub fn locate_twilight(
    sun_alt: &[f64],
    bounds: &[(usize, usize)],
    dark_deg: f64,
) -> Vec<Night> {
    bounds
        .iter()
        .map(|&(s, e)| {
            let entry = if sun_alt[s] < dark_deg {
                // Begins dark: the crossing of interest is the sun rising
                // back above the threshold.
                (s..=e).find(|&j| sun_alt[j] > dark_deg)
            } else {
                (s..=e).find(|&j| sun_alt[j] <= dark_deg)
            };

            let (twilight_start, twilight_end) = match entry {
                None => (e.saturating_sub(1).max(s), e),
                Some(t1) => {
                    let exit = if sun_alt[s] < dark_deg {
                        (t1..=e).find(|&j| sun_alt[j] <= dark_deg)
                    } else {
                        (t1..=e).find(|&j| sun_alt[j] > dark_deg)
                    };
                    (t1, exit.unwrap_or(e))
                }
            };

            Night {
                start: s,
                end: e,
                twilight_start,
                twilight_end,
            }
        })
        .collect()
}
