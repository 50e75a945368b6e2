//! Foundation types for the catalog store.
//!
//! Every other catalog crate depends on `catalog-types`. It carries the
//! vocabulary shared between the backend layer, the transactional engine and
//! any front end that surfaces catalog failures to clients.
//!
//! # Key Types
//!
//! - [`ObjectKey`] -- Validated, path-safe identifier of one stored object
//! - [`ProblemKind`] -- Stable failure category (type URI, title, status)
//! - [`ProblemDetails`] -- RFC 7807 style error payload

pub mod error;
pub mod key;
pub mod problem;

pub use error::TypeError;
pub use key::ObjectKey;
pub use problem::{ProblemDetails, ProblemKind};
