//! Script hosts: what "executing" a fetched script means.
//!
//! A host runs once per loaded resource and makes its effects visible to
//! later steps by publishing into the chain's [`Context`].

use stepchain_sequencer::Context;
use stepchain_types::ResourceId;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ScriptError {
    pub reason: String,
}

impl ScriptError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Executes a fetched script.
pub trait ScriptHost: Send + Sync {
    fn execute(&self, script: LoadedScript, context: &Context) -> Result<(), ScriptError>;
}

/// A fetched, decoded script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedScript {
    pub id: ResourceId,
    pub url: Url,
    pub source: String,
}

impl LoadedScript {
    /// Context key a [`PublishingHost`] stores this script under.
    #[must_use]
    pub fn key(id: &ResourceId) -> String {
        format!("script:{id}")
    }
}

/// Publishes each script into the context under [`LoadedScript::key`].
///
/// Scripts with no content are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishingHost;

impl ScriptHost for PublishingHost {
    fn execute(&self, script: LoadedScript, context: &Context) -> Result<(), ScriptError> {
        if script.source.trim().is_empty() {
            return Err(ScriptError::new("script is empty"));
        }
        let key = LoadedScript::key(&script.id);
        if context.publish(key, script) {
            tracing::debug!("Replaced an earlier script artifact");
        }
        Ok(())
    }
}
