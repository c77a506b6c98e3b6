use std::fmt;

use thiserror::Error;

/// Boxed error returned by record producers at the I/O boundary.
pub type ProducerError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, ReconError>;

/// Lifecycle state of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Unopened,
    Open,
    Closed,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unopened => write!(f, "unopened"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (missing key fields, bad field list, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// Reading a config file failed.
    #[error("IO error: {0}")]
    Io(String),
    /// A lifecycle call was made from a state that does not allow it.
    #[error("data source '{source_name}': cannot {operation} while {state}")]
    InvalidState {
        source_name: String,
        operation: &'static str,
        state: SourceState,
    },
    /// `next` was called with nothing buffered.
    #[error("data source '{source_name}': no more elements")]
    Exhausted { source_name: String },
    /// Aggregate sources are always sorted.
    #[error("data source '{source_name}' is always sorted")]
    AlwaysSorted { source_name: String },
    #[error("could not open data source '{source_name}'")]
    Open {
        source_name: String,
        #[source]
        cause: ProducerError,
    },
    #[error("could not close data source '{source_name}'")]
    Close {
        source_name: String,
        #[source]
        cause: ProducerError,
    },
    /// The producer failed while fetching the record at `ordinal`.
    #[error("data source '{source_name}': failed to fetch record #{ordinal}")]
    Fetch {
        source_name: String,
        ordinal: usize,
        #[source]
        cause: ProducerError,
    },
}
