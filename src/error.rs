use std::path::PathBuf;

/// Result type used throughout the crate.
pub type Result<T, E = DepnnError> = std::result::Result<T, E>;

/// Errors raised while building, loading or running a model.
///
/// An unknown symbol is never an error: lookups resolve it to a zero vector.
#[derive(Debug, thiserror::Error)]
pub enum DepnnError {
    /// Invalid dimension or shape supplied at construction time.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed line in a text file (embeddings, word vectors, records).
    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Malformed binary or structured input, e.g. a coefficient blob of the
    /// wrong length.
    #[error("format error: {0}")]
    Format(String),

    /// Underlying file could not be opened, read or written.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DepnnError {
    pub fn config(msg: impl Into<String>) -> Self {
        DepnnError::Config(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        DepnnError::Format(msg.into())
    }

    pub fn parse(path: impl Into<PathBuf>, line: usize, msg: impl Into<String>) -> Self {
        DepnnError::Parse {
            path: path.into(),
            line,
            message: msg.into(),
        }
    }

    /// Classify a failed line read: undecodable text is malformed input,
    /// anything else is I/O.
    pub fn line_read(err: std::io::Error, path: impl Into<PathBuf>, line: usize) -> Self {
        if err.kind() == std::io::ErrorKind::InvalidData {
            DepnnError::parse(path, line, "invalid UTF-8")
        } else {
            DepnnError::Io(err)
        }
    }

    /// True for both flavours of malformed input.
    pub fn is_format(&self) -> bool {
        matches!(self, DepnnError::Parse { .. } | DepnnError::Format(_))
    }
}
