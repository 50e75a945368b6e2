use catalog_backend::BackendError;
use catalog_crypto::HasherError;
use catalog_types::{ProblemDetails, ProblemKind, TypeError};
use serde_json::{json, Value};

/// Errors from catalog operations.
///
/// Every variant maps onto exactly one [`ProblemKind`] through
/// [`CatalogError::kind`]; callers branch on the kind, not the message.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// A write transaction for the key is in flight (or was left behind).
    #[error("resource locked: {0}")]
    ResourceLocked(String),

    /// The key already has a committed version; committed objects are
    /// immutable until rolled back.
    #[error("object already committed: {0}")]
    AlreadyCommitted(String),

    /// Computed size or hash disagrees with the caller's expectation.
    #[error("file integrity error: {0}")]
    FileIntegrity(String),

    /// The requested key or path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend root does not hold an initialized catalog.
    #[error("not a catalog: {0}")]
    NotCatalog(String),

    /// `init` found an existing token marker.
    #[error("catalog already initialized")]
    AlreadyInitialized,

    /// Read mode other than `rb` or `r`.
    #[error("unsupported read mode: {0}")]
    UnsupportedMode(String),

    /// The supplied token does not match the stored one.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Missing or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Hasher(#[from] HasherError),

    #[error(transparent)]
    InvalidKey(#[from] TypeError),

    /// Caller metadata carries a hint of the wrong type.
    #[error("invalid user metadata: {0}")]
    InvalidUserMeta(String),

    /// A metadata record does not have the committed shape.
    #[error("invalid metadata record: {0}")]
    InvalidRecord(String),

    #[error("invalid block size: {0}")]
    InvalidBlockSize(u64),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored JSON document could not be decoded.
    #[error("JSON decode error in {path}: {reason}")]
    JsonDecode { path: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rollback failed after an earlier failure; both are kept.
    #[error("{original}; rollback also failed: {rollback}")]
    RollbackFailed {
        original: Box<CatalogError>,
        rollback: Box<CatalogError>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    /// The stable failure category.
    pub fn kind(&self) -> ProblemKind {
        match self {
            Self::ResourceLocked(_) | Self::AlreadyCommitted(_) => ProblemKind::ResourceLocked,
            Self::FileIntegrity(_) => ProblemKind::FileIntegrityError,
            Self::NotFound(_) => ProblemKind::NotFound,
            Self::NotCatalog(_) => ProblemKind::NotCatalog,
            Self::Forbidden(_) => ProblemKind::Forbidden,
            Self::Unauthorized(_) => ProblemKind::Unauthorized,
            Self::InvalidKey(_)
            | Self::InvalidUserMeta(_)
            | Self::InvalidRecord(_)
            | Self::InvalidBlockSize(_) => ProblemKind::UnprocessableEntity,
            Self::Serialization(_) => ProblemKind::SerializeError,
            Self::JsonDecode { .. } => ProblemKind::JsonDecodeError,
            Self::Backend(e) if e.is_not_found() => ProblemKind::NotFound,
            Self::AlreadyInitialized
            | Self::UnsupportedMode(_)
            | Self::Hasher(_)
            | Self::Config(_)
            | Self::Backend(_)
            | Self::Io(_)
            | Self::RollbackFailed { .. }
            | Self::Internal(_) => ProblemKind::InternalServerError,
        }
    }

    /// Render as RFC 7807 problem details.
    ///
    /// Aggregated rollback failures list both causes under
    /// `extensions.errors`, original first. Like `detail`, an entry's
    /// `message` is only present for statuses below 500.
    pub fn to_problem(&self) -> ProblemDetails {
        let problem = ProblemDetails::new(self.kind()).with_detail(self.to_string());
        let problem = match self {
            Self::ResourceLocked(key) | Self::AlreadyCommitted(key) | Self::NotFound(key) => {
                problem.with_instance(key.clone())
            }
            _ => problem,
        };
        match self {
            Self::RollbackFailed { original, rollback } => problem.with_extension(
                "errors",
                Value::Array(vec![original.summary(), rollback.summary()]),
            ),
            _ => problem,
        }
    }

    fn summary(&self) -> Value {
        let kind = self.kind();
        let mut entry = json!({
            "type": kind.type_uri(),
            "title": kind.title(),
            "status": kind.status(),
        });
        if !kind.is_server_error() {
            entry["message"] = Value::String(self.to_string());
        }
        entry
    }

    /// Merge a failed rollback into the error that triggered it.
    pub fn with_rollback_failure(self, rollback: CatalogError) -> Self {
        Self::RollbackFailed {
            original: Box::new(self),
            rollback: Box::new(rollback),
        }
    }
}

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_not_found_maps_to_not_found() {
        let err = CatalogError::from(BackendError::NotFound("completed/data/x".into()));
        assert_eq!(err.kind(), ProblemKind::NotFound);
        let err = CatalogError::from(BackendError::Unavailable("disk gone".into()));
        assert_eq!(err.kind(), ProblemKind::InternalServerError);
    }

    #[test]
    fn locked_problem_carries_instance_and_detail() {
        let p = CatalogError::ResourceLocked("a.bin".into()).to_problem();
        assert_eq!(p.status, 409);
        assert_eq!(p.title, "Resource Locked.");
        assert_eq!(p.instance.as_deref(), Some("a.bin"));
        assert!(p.detail.unwrap().contains("a.bin"));
    }

    #[test]
    fn server_errors_hide_detail() {
        let p = CatalogError::FileIntegrity("Size mismatch.".into()).to_problem();
        assert_eq!(p.status, 500);
        assert!(p.detail.is_none());
    }

    #[test]
    fn rollback_failure_aggregates_both_causes() {
        let err = CatalogError::FileIntegrity("Hash mismatch.".into())
            .with_rollback_failure(CatalogError::Backend(BackendError::Unavailable("x".into())));
        assert_eq!(err.kind(), ProblemKind::InternalServerError);
        let p = err.to_problem();
        let errors = p.extensions.unwrap()["errors"].as_array().unwrap().clone();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0]["type"], ProblemKind::FileIntegrityError.type_uri());
        assert_eq!(errors[1]["status"], 500);
    }

    #[test]
    fn aggregated_server_causes_hide_messages() {
        let err = CatalogError::FileIntegrity("Hash mismatch.".into())
            .with_rollback_failure(CatalogError::Backend(BackendError::Unavailable("/srv/disk0 gone".into())));
        let p = err.to_problem();
        assert!(p.detail.is_none());
        let errors = p.extensions.unwrap()["errors"].as_array().unwrap().clone();
        for entry in &errors {
            assert_eq!(entry["status"], 500);
            assert!(entry.get("message").is_none(), "{entry}");
        }
        assert!(!serde_json::to_string(&errors).unwrap().contains("/srv/disk0"));
    }

    #[test]
    fn aggregated_client_causes_keep_messages() {
        let err = CatalogError::ResourceLocked("k".into())
            .with_rollback_failure(CatalogError::Internal("x".into()));
        let p = err.to_problem();
        let errors = p.extensions.unwrap()["errors"].as_array().unwrap().clone();
        assert_eq!(errors[0]["message"], "resource locked: k");
        assert!(errors[1].get("message").is_none());
    }

    #[test]
    fn already_committed_is_a_conflict() {
        let p = CatalogError::AlreadyCommitted("a.bin".into()).to_problem();
        assert_eq!(p.status, 409);
        assert_eq!(p.instance.as_deref(), Some("a.bin"));
    }

    #[test]
    fn invalid_key_is_unprocessable() {
        let err: CatalogError = catalog_types::ObjectKey::new("../x").unwrap_err().into();
        assert_eq!(err.kind(), ProblemKind::UnprocessableEntity);
        assert_eq!(err.to_problem().status, 422);
    }

    #[test]
    fn unsupported_algorithm_is_internal() {
        let err: CatalogError = catalog_crypto::HashAlgorithm::from_name("crc32").unwrap_err().into();
        assert_eq!(err.kind(), ProblemKind::InternalServerError);
    }
}
