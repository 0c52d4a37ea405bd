//! Resource loader: ordered batches of external scripts.
//!
//! Built on the step sequencer. A batch is a step whose tasks are resource
//! loads, so batches keep the sequencer's guarantees: resources inside one
//! batch load concurrently, and a batch starts only after every resource of
//! the previous batch has been fetched and executed.
//!
//! ```ignore
//! use stepchain_loader::{ResourceLoader, load};
//!
//! let loader = ResourceLoader::with_timeout(base, Duration::from_secs(30))?;
//! let env = ChainEnv::new(reporter).with_loader(Arc::new(loader));
//! load([jquery, underscore])
//!     .then_load([backbone])
//!     .then_run([Task::new("ready", |_env, done| done.complete())])
//!     .execute(&env)
//!     .await;
//! ```
//!
//! # Failure
//!
//! A resource that cannot be fetched, decoded, or executed is fatal for the
//! chain: the failure is reported and the batch never completes.

mod fetch;
mod host;
mod loader;

pub use fetch::{FetchError, FetchFut, Fetcher, FileFetcher, HttpFetcher, SchemeFetcher};
pub use host::{LoadedScript, PublishingHost, ScriptError, ScriptHost};
pub use loader::ResourceLoader;

use stepchain_sequencer::ChainBuilder;
use stepchain_types::ResourceId;

/// Begin a chain whose first step loads `ids` concurrently.
///
/// Continue with [`ChainBuilder::then_load`] for later batches and
/// [`ChainBuilder::then_run`] for the step that runs once everything is loaded.
pub fn load(ids: impl IntoIterator<Item = ResourceId>) -> ChainBuilder {
    ChainBuilder::new().then_load(ids)
}
