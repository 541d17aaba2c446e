use thiserror::Error;

/// Errors surfaced by the occupancy engine.
///
/// Configuration errors are raised before any frame is processed. Data errors
/// are per-operation: a single run aborts, a batch skips the offending job.
/// Missing keypoint values are never errors.
#[derive(Debug, Error)]
pub enum RoiError {
    /// Invalid policy, frame range, canvas size or other caller input.
    #[error("configuration error: {0}")]
    Config(String),

    /// The tracking table has no column for the requested body part.
    #[error("missing column: no x/y/likelihood columns for body part '{body_part}'")]
    MissingColumn { body_part: String },

    /// Tracking file extension is not one of the known formats.
    #[error("unsupported tracking file type: {path}")]
    UnsupportedFormat { path: String },

    /// Known format that this build cannot read (HDF5 without the
    /// `tracking-hdf5` feature).
    #[error("{format} tracking tables are not readable in this build ({path})")]
    FormatUnavailable { format: &'static str, path: String },

    /// Malformed tracking table.
    #[error("invalid tracking table: {0}")]
    InvalidTable(String),

    /// Malformed region document.
    #[error("invalid regions: {0}")]
    InvalidRegions(String),

    /// Video could not be opened or probed.
    #[error("could not open video {path}: {reason}")]
    VideoOpen { path: String, reason: String },

    #[error("could not read frame {index} of {path}: {reason}")]
    VideoFrame {
        path: String,
        index: usize,
        reason: String,
    },

    /// The caller abandoned the run.
    #[error("run cancelled")]
    Cancelled,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("job store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "tracking-hdf5")]
    #[error("hdf5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl RoiError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

pub type Result<T, E = RoiError> = std::result::Result<T, E>;
