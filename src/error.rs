use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to retrieve {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Server returned HTTP {status} {status_text} for {url}")]
    Status { url: String, status: u16, status_text: String },

    #[error("Failed to write {file}: {source}")]
    Io { file: String, #[source] source: std::io::Error },
}

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Malformed {kind} row: expected at least {expected} fields, found {found}")]
    MalformedRow { kind: &'static str, expected: usize, found: usize },

    #[error("No full name known for abbreviation '{0}'")]
    MissingKey(String),

    #[error("Cumulative value '{value}' at date column {column} is not an integer")]
    Parse { value: String, column: usize, #[source] source: std::num::ParseIntError },

    #[error("New count at date column {column} overflows: {current} - {previous}")]
    Overflow { column: usize, current: i64, previous: i64 },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },

    #[error("Failed to parse configuration TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Pipeline '{0}' is not known to our sources configuration.")]
    UnknownPipeline(String),

    #[error("Pipeline '{0}' is extended but has no lookup file configured.")]
    MissingLookup(String),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open {path}: {source}")]
    Open { path: String, #[source] source: csv::Error },
}

pub type Result<T> = std::result::Result<T, Error>;
