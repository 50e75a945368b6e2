/// Errors from backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The path does not exist.
    #[error("path not found: {0}")]
    NotFound(String),

    /// Exclusive creation found the path already present.
    #[error("path already exists: {0}")]
    AlreadyExists(String),

    /// The path is malformed or would escape the backend root.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A file was found where a directory was required, or vice versa.
    #[error("{path}: {reason}")]
    WrongKind { path: String, reason: String },

    /// I/O error from the underlying medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The medium is unreachable or refused the operation.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// `true` if this error means "nothing at that path".
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Map an I/O error for `path`, turning the two existence kinds into
    /// their dedicated variants.
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
