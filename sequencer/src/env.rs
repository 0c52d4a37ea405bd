//! Execution environment handed to every task of a chain.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use stepchain_types::{LoadError, ReportSink, ResourceId};

use crate::context::Context;

/// Resource load future type alias.
pub type LoadFut<'a> = Pin<Box<dyn Future<Output = Result<(), LoadError>> + Send + 'a>>;

/// Seam between the sequencer and whatever makes resources available.
///
/// `load` resolves once the resource is usable by later steps, or fails.
/// A failure is fatal for the chain that requested it.
pub trait ResourceLoad: Send + Sync {
    fn load<'a>(&'a self, id: &'a ResourceId, context: &'a Context) -> LoadFut<'a>;
}

/// Loader used when a chain was built without one. Every load fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLoader;

impl ResourceLoad for NoLoader {
    fn load<'a>(&'a self, id: &'a ResourceId, _context: &'a Context) -> LoadFut<'a> {
        let err = LoadError::NoLoader { id: id.clone() };
        Box::pin(async move { Err(err) })
    }
}

/// Shared environment of one chain run: artifacts, the report channel, and
/// the resource loader.
#[derive(Clone)]
pub struct ChainEnv {
    context: Context,
    reporter: Arc<dyn ReportSink>,
    loader: Arc<dyn ResourceLoad>,
}

impl ChainEnv {
    /// Environment with an empty context and no resource loader.
    pub fn new(reporter: Arc<dyn ReportSink>) -> Self {
        Self {
            context: Context::new(),
            reporter,
            loader: Arc::new(NoLoader),
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn ResourceLoad>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub fn loader(&self) -> &dyn ResourceLoad {
        self.loader.as_ref()
    }

    /// Surface a failure to the operator. Does not affect the chain.
    pub fn report(&self, message: &str) {
        self.reporter.report(message);
    }
}

impl fmt::Debug for ChainEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEnv")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
