//! Object key validation.
//!
//! Valid keys:
//! - Must be non-empty
//! - Are `/`-separated; every component must be non-empty
//! - Must not contain `.` or `..` components
//! - Must not start or end with `/`
//! - Must not contain `\`, NUL or other control characters

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of one stored object, unique within a catalog.
///
/// The key is opaque to the store but always safe to append to a backend
/// path prefix: it can never escape the area it is joined onto.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Validate and wrap a key.
    ///
    /// # Examples
    ///
    /// ```
    /// use catalog_types::ObjectKey;
    ///
    /// assert!(ObjectKey::new("test.bin").is_ok());
    /// assert!(ObjectKey::new("images/2024/cat.png").is_ok());
    /// assert!(ObjectKey::new("").is_err());
    /// assert!(ObjectKey::new("../escape").is_err());
    /// ```
    pub fn new(key: impl Into<String>) -> Result<Self, TypeError> {
        let key = key.into();
        validate(&key)?;
        Ok(Self(key))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Components between slashes.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

fn validate(key: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key must not be empty"));
    }
    if key.starts_with('/') || key.ends_with('/') {
        return Err(invalid("must not start or end with '/'"));
    }
    if key.contains('\\') {
        return Err(invalid("must not contain '\\'"));
    }
    if let Some(ch) = key.chars().find(|c| c.is_control()) {
        return Err(invalid(&format!("contains control character: {ch:?}")));
    }
    for component in key.split('/') {
        match component {
            "" => return Err(invalid("must not contain empty components ('//')")),
            "." | ".." => return Err(invalid("must not contain '.' or '..' components")),
            _ => {}
        }
    }
    Ok(())
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({:?})", self.0)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ObjectKey {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::str::FromStr for ObjectKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.0
    }
}
