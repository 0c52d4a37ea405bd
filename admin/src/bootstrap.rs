//! The admin page bootstrap as a step chain.
//!
//! ```text
//! run(setup_ui) ──▶ then_run(devices, pxe_configs) ──▶ then_run(finish)
//!    │
//!    └─ load(batch 1) ──▶ then_load(batch 2) ──▶ then_load(batch 3)
//! ```

use std::sync::Arc;

use stepchain_config::BootConfig;
use stepchain_loader::load;
use stepchain_sequencer::{ChainBuilder, ChainEnv, Done, Task, run};
use stepchain_types::ResourceId;
use thiserror::Error;

use crate::model::{DeviceList, Model, ModelKind, ModelRegistry, PxeConfigList};
use crate::source::{HttpModelSource, ModelSource};
use crate::state::AdminSession;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Config(#[from] stepchain_config::ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Fetch one model, build it through `registry`, and publish it under
/// [`ModelKind::key`].
///
/// Any failure is reported and the task abandons its completion, so the
/// chain stalls before the page is finished.
pub fn load_and_fetch(
    kind: ModelKind,
    source: Arc<dyn ModelSource>,
    registry: Arc<ModelRegistry>,
) -> Task {
    Task::from_async(kind.key(), move |env: ChainEnv, done: Done| async move {
        let built = match source.fetch(kind).await {
            Ok(raw) => registry.construct(kind, raw),
            Err(e) => Err(e),
        };
        match built {
            Ok(model) => {
                tracing::info!(model = %kind, items = model.len(), "Fetched model");
                publish(&env, model);
                done.complete();
            }
            Err(e) => {
                env.report(&format!(
                    "AJAX Error while fetching {}: {}",
                    kind.key(),
                    e.status_text()
                ));
                done.abandon();
            }
        }
    })
}

fn publish(env: &ChainEnv, model: Model) {
    let key = model.kind().key();
    match model {
        Model::Devices(list) => env.context().publish(key, list),
        Model::PxeConfigs(list) => env.context().publish(key, list),
    };
}

/// Load the page's script batches in order, as one task.
pub fn setup_ui(batches: Vec<Vec<ResourceId>>) -> Task {
    let mut batches = batches.into_iter();
    let chain = match batches.next() {
        Some(first) => batches.fold(load(first), |chain, batch| chain.then_load(batch)),
        None => ChainBuilder::new(),
    };
    Task::chain("setup_ui", chain)
}

/// Terminal step: assemble the session from the fetched models.
fn finish() -> Task {
    Task::new("finish", |env, done| {
        let context = env.context();
        let devices = context.get::<DeviceList>(ModelKind::Devices.key());
        let pxe_configs = context.get::<PxeConfigList>(ModelKind::PxeConfigs.key());
        let (Some(devices), Some(pxe_configs)) = (devices, pxe_configs) else {
            env.report("Models missing after fetch");
            done.abandon();
            return;
        };

        tracing::info!(
            devices = devices.devices.len(),
            pxe_configs = pxe_configs.names.len(),
            "Admin page ready"
        );
        context.publish(AdminSession::KEY, AdminSession::new(devices, pxe_configs));
        done.complete();
    })
}

/// Everything needed to declare the bootstrap chain.
pub struct AdminApp {
    batches: Vec<Vec<ResourceId>>,
    source: Arc<dyn ModelSource>,
    registry: Arc<ModelRegistry>,
}

impl AdminApp {
    pub fn new(batches: Vec<Vec<ResourceId>>, source: Arc<dyn ModelSource>) -> Self {
        Self {
            batches,
            source,
            registry: Arc::new(ModelRegistry::standard()),
        }
    }

    /// App fetching models over HTTP from the configured server.
    pub fn from_config(config: &BootConfig) -> Result<Self, AdminError> {
        let source = HttpModelSource::new(
            config.base_url()?,
            config.models.clone(),
            config.loader.timeout(),
        )?;
        Ok(Self::new(config.loader.batches.clone(), Arc::new(source)))
    }

    #[must_use]
    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Declare the bootstrap chain. Nothing runs until it is executed.
    #[must_use]
    pub fn run_ui(&self) -> ChainBuilder {
        let fetches = ModelKind::ALL
            .map(|kind| load_and_fetch(kind, self.source.clone(), self.registry.clone()));
        run(setup_ui(self.batches.clone()))
            .then_run(fetches)
            .then_run([finish()])
    }
}

impl std::fmt::Debug for AdminApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminApp")
            .field("batches", &self.batches)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
