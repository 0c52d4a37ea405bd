//! Client-side state created once bootstrap has finished.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::model::{DeviceList, PxeConfigList};

/// PXE config chosen for the next power-cycle, if any.
#[derive(Debug, Default)]
pub struct SelectedPxeConfig {
    name: Mutex<Option<String>>,
}

impl SelectedPxeConfig {
    pub fn select(&self, name: Option<String>) {
        *self.name.lock().unwrap_or_else(PoisonError::into_inner) = name;
    }

    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAction {
    PowerCycle { pxe_config: Option<String> },
    PowerOff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub device: String,
    pub action: JobAction,
}

/// FIFO of device jobs waiting for the job runner.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl JobQueue {
    pub fn push(&self, job: Job) {
        self.lock().push_back(job);
    }

    #[must_use]
    pub fn pop(&self) -> Option<Job> {
        self.lock().pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything the page needs after bootstrap: fetched models plus fresh
/// client-side state.
#[derive(Debug)]
pub struct AdminSession {
    pub devices: Arc<DeviceList>,
    pub pxe_configs: Arc<PxeConfigList>,
    pub selected_pxe_config: SelectedPxeConfig,
    pub job_queue: JobQueue,
}

impl AdminSession {
    /// Context key the session is published under.
    pub const KEY: &'static str = "session";

    #[must_use]
    pub fn new(devices: Arc<DeviceList>, pxe_configs: Arc<PxeConfigList>) -> Self {
        Self {
            devices,
            pxe_configs,
            selected_pxe_config: SelectedPxeConfig::default(),
            job_queue: JobQueue::default(),
        }
    }
}
