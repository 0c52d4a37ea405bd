//! Step sequencer: ordered chains of join-barrier steps.
//!
//! A chain is declared up front with [`run`], [`ChainBuilder::then_run`] and
//! [`ChainBuilder::then_load`], then executed once against a [`ChainEnv`].
//!
//! ```text
//! run(setup) ──▶ then_run(fetch_a, fetch_b) ──▶ then_load(x, y) ──▶ then_run(finish)
//!   step 1            step 2 (join)               step 3 (join)         step 4
//! ```
//!
//! # Guarantees
//!
//! - Steps run strictly in declaration order.
//! - Every task of a step is invoked when the step begins; the step completes
//!   after its last task signals, whatever the completion order.
//! - A step without tasks completes immediately.
//! - A task that drops its [`Done`] without completing it stalls the chain;
//!   no later step ever runs. A panicking task is reported and stalls it too.
//!
//! The sequencer has no error channel of its own. Tasks report failures via
//! [`ChainEnv::report`] and choose between completing anyway (fail-open) or
//! dropping their [`Done`] (fail-stop).

mod chain;
mod context;
mod env;
mod task;

pub use chain::{Chain, ChainBuilder, ChainOutcome, Step};
pub use context::Context;
pub use env::{ChainEnv, LoadFut, NoLoader, ResourceLoad};
pub use task::{Done, Task, TaskFut};

/// Begin a chain whose first step is the single `task`.
///
/// Nothing runs until the chain is executed.
#[must_use]
pub fn run(task: Task) -> ChainBuilder {
    ChainBuilder::new().then_run([task])
}
