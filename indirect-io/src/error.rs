//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Malformed grouping map, with the offending line.
    #[error("grouping map line {line}: {message}")]
    Grouping { line: usize, message: String },

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] indirect_core::Error),
}

impl From<Error> for indirect_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => Self::Io(e),
            Error::CoreError(e) => e,
            other => Self::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_into_core() {
        let core: indirect_core::Error = Error::InvalidFormat("bad".to_string()).into();
        assert!(matches!(core, indirect_core::Error::Backend(ref m) if m.contains("bad")));

        let inner = indirect_core::Error::Data("npt".to_string());
        let core: indirect_core::Error = Error::CoreError(inner).into();
        assert!(matches!(core, indirect_core::Error::Data(_)));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let core: indirect_core::Error = Error::Io(io).into();
        assert!(matches!(core, indirect_core::Error::Io(_)));
    }
}
