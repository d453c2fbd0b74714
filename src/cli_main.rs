use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::{list_sites, reduce_file, resolve};
use crate::sites::SiteRegistry;

pub fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = SiteRegistry::from_path(&cli.sites)
        .with_context(|| format!("Failed to load site registry: {}", cli.sites))?;

    match cli.command {
        Commands::Reduce {
            input,
            config,
            output_dir,
            influx_dir,
            site,
        } => reduce_file(
            &registry,
            &input,
            config.as_deref(),
            &output_dir,
            influx_dir.as_deref(),
            site.as_deref(),
        ),
        Commands::ListSites => {
            list_sites(&registry);
            Ok(())
        }
        Commands::Resolve { filename } => resolve(&registry, &filename),
    }
}
