use anyhow::Result;

use crate::sites::SiteRegistry;

/// Print the loaded registry, one site per line.
pub fn list_sites(registry: &SiteRegistry) {
    println!(
        "{:<20} {:>10} {:>9} {:>7}  {:<7} {:>5}",
        "label", "longitude", "latitude", "elev_m", "sensor", "skip"
    );
    for site in registry.iter() {
        println!(
            "{:<20} {:>10.4} {:>9.4} {:>7.0}  {:<7} {:>5}",
            site.label,
            site.longitude,
            site.latitude,
            site.elevation_m,
            site.sensor,
            site.header_line_count
        );
    }
}

/// Show the registry site a file name fuzzy-matches to. Lets operators
/// check a naming scheme without running a reduction.
pub fn resolve(registry: &SiteRegistry, filename: &str) -> Result<()> {
    let (site, score) = registry.resolve(filename)?;
    println!(
        "{filename} -> {} (score {score:.2}, sensor {})",
        site.label, site.sensor
    );
    Ok(())
}
