//! Admin page bootstrap for the device pool, driven by the step sequencer.
//!
//! [`AdminApp::run_ui`] declares the chain: load the page's scripts in
//! ordered batches, fetch the device and PXE config models together, then
//! assemble an [`AdminSession`] and publish it under [`AdminSession::KEY`].
//! A failed load or fetch is reported and stalls the chain.

mod bootstrap;
mod model;
mod source;
mod state;

pub use bootstrap::{AdminApp, AdminError, load_and_fetch, setup_ui};
pub use model::{
    Device, DeviceList, Model, ModelError, ModelFactory, ModelKind, ModelRegistry, PxeConfigList,
};
pub use source::{HttpModelSource, ModelFut, ModelSource};
pub use state::{AdminSession, Job, JobAction, JobQueue, SelectedPxeConfig};
