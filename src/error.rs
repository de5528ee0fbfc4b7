use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for texpand operations.
///
/// Only structural failures surface through this type; anything that goes
/// wrong *inside* a single directive line (missing file, failed command,
/// denied action, AI trouble) is converted to an inline diagnostic marker
/// by the resolver and never reaches the caller as an error.
#[derive(Error, Debug)]
pub enum TexpandError {
    /// IO error when reading or writing documents
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Input document not found
    #[error("Input file not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    /// Regex compilation error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TexpandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TexpandError::InputNotFound {
            path: PathBuf::from("/test/doc.md.texp"),
        };
        assert_eq!(format!("{err}"), "Input file not found: /test/doc.md.texp");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "test");
        let err: TexpandError = io_err.into();
        assert!(matches!(err, TexpandError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: TexpandError = json_err.into();
        assert!(matches!(err, TexpandError::Json(_)));
    }
}
