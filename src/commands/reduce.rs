use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::ReduceConfig;
use crate::output;
use crate::pipeline::{self, Reduction};
use crate::sites::SiteRegistry;

/// Run the full reduction for one raw file and write both output CSVs.
///
/// The "no usable data" outcome exits cleanly with nothing written; it is
/// expected for new deployments with only a few hours of data.
pub fn reduce_file(
    registry: &SiteRegistry,
    input: &str,
    config: Option<&str>,
    output_dir: &str,
    influx_dir: Option<&str>,
    site_label: Option<&str>,
) -> Result<()> {
    let config = match config {
        Some(path) => ReduceConfig::from_file(path)?,
        None => ReduceConfig::default(),
    };
    config.validate().context("Configuration validation failed")?;

    let (site, score) = match site_label {
        Some(label) => {
            let site = registry
                .by_label(label)
                .ok_or_else(|| anyhow::anyhow!("no site labelled '{label}' in registry"))?;
            (site, 1.0)
        }
        None => registry.resolve(input)?,
    };
    info!(site = %site.label, score, sensor = %site.sensor, "resolved site");

    let params = config.for_site(&site.label)?;
    match pipeline::reduce_file(Path::new(input), site, &params)? {
        Reduction::NoUsableData { stage } => {
            warn!(stage, "no usable data after filtering; nothing written");
            Ok(())
        }
        Reduction::Complete(out) => {
            let stem = Path::new(input)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output");
            let wide = Path::new(output_dir).join(format!("{stem}.csv"));
            output::write_wide_csv(&wide, &out.records, out.with_skytemp)?;
            let narrow =
                Path::new(influx_dir.unwrap_or(output_dir)).join(format!("INF-{stem}.csv"));
            output::write_narrow_csv(&narrow, &out.records, &site.label)?;

            let s = &out.summary;
            info!(
                site = %s.site_label,
                rows_parsed = s.rows_parsed,
                after_sun_filter = s.after_sun_filter,
                nights_found = s.nights_found,
                nights_retained = s.nights_retained,
                window = s.window_size,
                samples_written = s.samples_written,
                cloudy = s.cloudy_samples,
                milky_way_overhead = s.milky_way_overhead,
                moonless = s.moonless_samples,
                "reduction complete"
            );
            info!(wide = %wide.display(), narrow = %narrow.display(), "wrote output files");
            Ok(())
        }
    }
}
