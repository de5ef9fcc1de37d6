use std::{fmt::Display, path::PathBuf};

/// Crate-wide error type for `geodataset`.
///
/// Configuration errors (bad template, unknown placeholder, regex failure)
/// are constructed eagerly at compile/construction time; usage errors
/// (empty search result, missing handler) are constructed at call time;
/// data errors are attached to the offending path where known.
#[derive(Debug, thiserror::Error)]
pub enum GeoDatasetError {
    UnknownPlaceholder { name: String, placeholder: String },
    UnfilledPlaceholder { name: String, placeholder: Option<String> },
    PlaceholderRegexError { name: String, msg: String },
    NoFilesError { dataset: String, start: Option<String>, end: Option<String> },
    NoHandlerError { msg: String },
    InhomogeneousFilesError { msg: String },
    InvalidUnit { spec: String },
    InvalidTimeRange { msg: String },
    CacheError { path: PathBuf, msg: String },
    CycleDetected { dataset: String },
    CopyDestinationMismatch { msg: String },
    Worker(Box<GeoDatasetError>),
    Io(std::io::Error),
    Json(serde_json::Error),
    Toml(Box<toml::de::Error>),
    MultipleErrors(Vec<GeoDatasetError>),
    InternalError(String),
}

impl GeoDatasetError {
    pub fn unknown_placeholder(name: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self::UnknownPlaceholder { name: name.into(), placeholder: placeholder.into() }
    }

    pub fn unfilled_placeholder(name: impl Into<String>, placeholder: Option<String>) -> Self {
        Self::UnfilledPlaceholder { name: name.into(), placeholder }
    }

    pub fn no_files(dataset: impl Into<String>, start: Option<String>, end: Option<String>) -> Self {
        Self::NoFilesError { dataset: dataset.into(), start, end }
    }
}

impl Display for GeoDatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoDatasetError::UnknownPlaceholder { name, placeholder } => {
                write!(f, "template '{name}' references unknown placeholder '{placeholder}'")
            }
            GeoDatasetError::UnfilledPlaceholder { name, placeholder } => {
                if let Some(p) = placeholder {
                    write!(f, "rendering '{name}' left placeholder '{p}' unfilled")
                } else {
                    write!(f, "rendering '{name}' left special characters unfilled")
                }
            }
            GeoDatasetError::PlaceholderRegexError { name, msg } => {
                write!(f, "bad regex for placeholder '{name}': {msg}")
            }
            GeoDatasetError::NoFilesError { dataset, start, end } => match (start, end) {
                (Some(s), Some(e)) => write!(f, "no files found for dataset '{dataset}' in [{s}, {e})"),
                _ => write!(f, "no files found for dataset '{dataset}'"),
            },
            GeoDatasetError::NoHandlerError { msg } => write!(f, "no handler available: {msg}"),
            GeoDatasetError::InhomogeneousFilesError { msg } => write!(f, "inhomogeneous files: {msg}"),
            GeoDatasetError::InvalidUnit { spec } => write!(f, "invalid time unit spec '{spec}'"),
            GeoDatasetError::InvalidTimeRange { msg } => write!(f, "invalid time range: {msg}"),
            GeoDatasetError::CacheError { path, msg } => {
                write!(f, "info cache error at {}: {msg}", path.display())
            }
            GeoDatasetError::CycleDetected { dataset } => {
                write!(f, "cyclic dataset link detected while resolving '{dataset}'")
            }
            GeoDatasetError::CopyDestinationMismatch { msg } => write!(f, "copy destination mismatch: {msg}"),
            GeoDatasetError::Worker(e) => write!(f, "worker error: {e}"),
            GeoDatasetError::Io(e) => write!(f, "I/O error: {e}"),
            GeoDatasetError::Json(e) => write!(f, "JSON error: {e}"),
            GeoDatasetError::Toml(e) => write!(f, "TOML error: {e}"),
            GeoDatasetError::MultipleErrors(errs) => {
                write!(f, "{} errors occurred:", errs.len())?;
                for e in errs {
                    write!(f, "\n  - {e}")?;
                }
                Ok(())
            }
            GeoDatasetError::InternalError(s) => write!(f, "internal error: {s}"),
        }
    }
}

impl From<std::io::Error> for GeoDatasetError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for GeoDatasetError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<toml::de::Error> for GeoDatasetError {
    fn from(value: toml::de::Error) -> Self {
        Self::Toml(Box::new(value))
    }
}
