//! Core types for stepchain.
//!
//! This crate contains pure types with no IO and no async. The sequencer,
//! the resource loader, and the admin bootstrap all speak in these terms.

mod report;

pub use report::{ErrorLog, ReportSink, TracingReporter};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Resource identifiers
// ============================================================================

/// Opaque identifier of an external resource (a script URL or path).
///
/// Guaranteed non-empty after trimming; resolution against a base location
/// is the loader's concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("resource identifier must not be empty")]
pub struct EmptyResourceIdError;

impl ResourceId {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyResourceIdError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Err(EmptyResourceIdError)
        } else if trimmed.len() == value.len() {
            Ok(Self(value))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for ResourceId {
    type Error = EmptyResourceIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ResourceId {
    type Error = EmptyResourceIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(value: ResourceId) -> Self {
        value.0
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Load failures
// ============================================================================

/// Why a resource could not be made available to later steps.
///
/// Every variant is fatal for the chain that requested the load. The type is
/// `Clone` because one load result is shared by every task that asked for the
/// same identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("cannot resolve {id}: {reason}")]
    Resolve { id: ResourceId, reason: String },

    #[error("unsupported scheme '{scheme}' for {id}")]
    UnsupportedScheme { id: ResourceId, scheme: String },

    #[error("fetching {id} failed: {reason}")]
    Fetch { id: ResourceId, reason: String },

    #[error("fetching {id} returned HTTP {status}")]
    Status { id: ResourceId, status: u16 },

    #[error("{id} is not valid UTF-8")]
    Decode { id: ResourceId },

    #[error("executing {id} failed: {reason}")]
    Execute { id: ResourceId, reason: String },

    #[error("no resource loader is configured for {id}")]
    NoLoader { id: ResourceId },
}

impl LoadError {
    /// The resource this failure belongs to.
    #[must_use]
    pub fn id(&self) -> &ResourceId {
        match self {
            Self::Resolve { id, .. }
            | Self::UnsupportedScheme { id, .. }
            | Self::Fetch { id, .. }
            | Self::Status { id, .. }
            | Self::Decode { id }
            | Self::Execute { id, .. }
            | Self::NoLoader { id } => id,
        }
    }
}
