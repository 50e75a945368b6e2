//! Problem details (RFC 7807) error taxonomy.
//!
//! Every catalog failure is classified into exactly one [`ProblemKind`]. The
//! kind fixes the `(type, title, status)` triple; callers branch on the kind,
//! never on free text.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable failure category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    Unauthorized,
    Forbidden,
    NotFound,
    ResourceLocked,
    UnprocessableEntity,
    SerializeError,
    JsonDecodeError,
    NotCatalog,
    FileIntegrityError,
    InternalServerError,
}

impl ProblemKind {
    /// All kinds, in status order.
    pub const ALL: [ProblemKind; 10] = [
        Self::Unauthorized,
        Self::Forbidden,
        Self::NotFound,
        Self::ResourceLocked,
        Self::UnprocessableEntity,
        Self::SerializeError,
        Self::JsonDecodeError,
        Self::NotCatalog,
        Self::FileIntegrityError,
        Self::InternalServerError,
    ];

    /// HTTP-style status code.
    pub fn status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::ResourceLocked => 409,
            Self::UnprocessableEntity | Self::SerializeError => 422,
            Self::JsonDecodeError
            | Self::NotCatalog
            | Self::FileIntegrityError
            | Self::InternalServerError => 500,
        }
    }

    /// Fixed human-readable title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized.",
            Self::Forbidden => "Resource forbidden.",
            Self::NotFound => "Resource Not Found.",
            Self::ResourceLocked => "Resource Locked.",
            Self::UnprocessableEntity => "UnprocessableEntity.",
            Self::SerializeError => "Serialize Error.",
            Self::JsonDecodeError => "Json decode error.",
            Self::NotCatalog => "Not Catalog Error.",
            Self::FileIntegrityError => "File Integrity Error.",
            Self::InternalServerError => "Internal Server Error.",
        }
    }

    /// Short identifier used in the type URI.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "resource-forbidden",
            Self::NotFound => "resource-notfound",
            Self::ResourceLocked => "resource-locked",
            Self::UnprocessableEntity => "unprocessable-entity",
            Self::SerializeError => "serialize-error",
            Self::JsonDecodeError => "json-decode-error",
            Self::NotCatalog => "not-catalog",
            Self::FileIntegrityError => "file-integrity-error",
            Self::InternalServerError => "internal-server-error",
        }
    }

    /// Stable type URI, e.g. `urn:catalog:problem:resource-locked`.
    pub fn type_uri(&self) -> String {
        format!("urn:catalog:problem:{}", self.slug())
    }

    /// `true` for server-side faults (status >= 500).
    pub fn is_server_error(&self) -> bool {
        self.status() >= 500
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Structured error payload.
///
/// `detail` is dropped on construction when the kind is a server error so
/// internal detail never leaks to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub status: u16,
    pub title: String,
    #[serde(rename = "type")]
    pub type_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl ProblemDetails {
    /// Problem with the kind's fixed triple and no optional members.
    pub fn new(kind: ProblemKind) -> Self {
        Self {
            status: kind.status(),
            title: kind.title().to_string(),
            type_uri: kind.type_uri(),
            detail: None,
            instance: None,
            extensions: None,
        }
    }

    /// Attach a detail message. Ignored for server errors.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        if self.status < 500 {
            self.detail = Some(detail.into());
        }
        self
    }

    /// Attach the URI/path of the specific occurrence.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Add one extension member.
    pub fn with_extension(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extensions
            .get_or_insert_with(Map::new)
            .insert(name.into(), value);
        self
    }

    /// Recover the kind from the type URI, if it is one of ours.
    pub fn kind(&self) -> Option<ProblemKind> {
        ProblemKind::ALL
            .into_iter()
            .find(|k| k.type_uri() == self.type_uri)
    }
}
