use thiserror::Error;

/// Error taxonomy for the reduction pipeline.
///
/// Registry and parse errors are fatal for the run: there is no meaningful
/// partial output for a corrupt input file. `NightPartition` signals an
/// internal consistency bug, not bad input. An empty result after filtering
/// is *not* an error; see `pipeline::Reduction::NoUsableData`.
#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("no site in registry matches '{name}' (best candidate '{best}' scored {score:.2})")]
    SiteNotFound {
        name: String,
        best: String,
        score: f64,
    },

    #[error("malformed registry row at line {line}: {reason}")]
    MalformedRegistry { line: usize, reason: String },

    #[error("unknown sensor type '{0}' in registry")]
    UnknownSensor(String),

    #[error("parse error at data line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("bad timestamp at data line {line}: '{value}'")]
    BadTimestamp { line: usize, value: String },

    #[error("data line {line}: expected at least {expected} columns, found {found}")]
    UnexpectedColumns {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("UTC sequence not strictly increasing at sample {index}: {prev} then {next}")]
    NonMonotonicTime {
        index: usize,
        prev: String,
        next: String,
    },

    #[error("night partition mismatch: nights cover {found} samples, expected {expected}")]
    NightPartition { expected: usize, found: usize },

    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, ReduceError>;
