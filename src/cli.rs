use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "nsb-reduce",
    version,
    about = "Night-sky-brightness reduction for SQM and TESS photometer logs"
)]
pub struct Cli {
    /// Site registry CSV.
    #[arg(long, global = true, default_value = "sites.csv")]
    pub sites: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reduce one raw sensor file to the standardized CSV outputs.
    Reduce {
        /// Path to the raw SQM/TESS file.
        input: String,

        /// TOML parameter file overriding the built-in defaults.
        #[arg(long)]
        config: Option<String>,

        /// Directory for the wide-format CSV.
        #[arg(long, default_value = ".")]
        output_dir: String,

        /// Directory for the time-series-DB CSV (defaults to --output-dir).
        #[arg(long)]
        influx_dir: Option<String>,

        /// Registry label to use, bypassing filename matching.
        #[arg(long)]
        site: Option<String>,
    },

    /// Print the loaded site registry.
    ListSites,

    /// Show which site a file name resolves to, with the match score.
    Resolve {
        /// File name to match against the registry.
        filename: String,
    },
}
