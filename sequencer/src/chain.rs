//! Chain declaration and execution.

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use stepchain_types::ResourceId;

use crate::env::ChainEnv;
use crate::task::{Pending, Task};

/// A join-barrier group of tasks.
#[derive(Debug, Default)]
pub struct Step {
    tasks: Vec<Task>,
}

enum StepOutcome {
    Complete,
    Stalled { abandoned: Vec<String> },
}

impl Step {
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            tasks: tasks.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(Task::label)
    }

    /// Invoke every task, then wait until all of them have ended.
    ///
    /// With no tasks the join is vacuous and the step completes at once.
    async fn join(self, env: &ChainEnv) -> StepOutcome {
        let mut pending: FuturesUnordered<Pending> =
            self.tasks.into_iter().map(|task| task.start(env)).collect();
        let mut outstanding = pending.len();
        let mut abandoned = Vec::new();

        while let Some(finished) = pending.next().await {
            outstanding -= 1;
            if finished.completed {
                tracing::debug!(task = %finished.label, outstanding, "Task completed");
            } else {
                tracing::debug!(task = %finished.label, outstanding, "Task did not complete");
                abandoned.push(finished.label);
            }
        }

        if abandoned.is_empty() {
            StepOutcome::Complete
        } else {
            StepOutcome::Stalled { abandoned }
        }
    }
}

/// How a chain run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Every step completed.
    Completed { steps: usize },
    /// `step` (0-indexed) never completed because the listed tasks did not
    /// signal. No later step ran.
    Stalled { step: usize, abandoned: Vec<String> },
}

impl ChainOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Immutable, fully declared chain. Executed once.
#[derive(Debug, Default)]
pub struct Chain {
    steps: Vec<Step>,
}

impl Chain {
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run the steps in order against `env`.
    ///
    /// Resolves when the last step completes or when a step ends with a task
    /// that dropped its completion. A task that holds its `Done` forever
    /// keeps this future pending forever; there is no timeout.
    pub async fn execute(self, env: &ChainEnv) -> ChainOutcome {
        let total = self.steps.len();
        for (index, step) in self.steps.into_iter().enumerate() {
            tracing::debug!(
                step = index + 1,
                of = total,
                tasks = step.len(),
                "Starting step"
            );
            if let StepOutcome::Stalled { abandoned } = step.join(env).await {
                tracing::warn!(
                    step = index + 1,
                    of = total,
                    abandoned = ?abandoned,
                    "Chain stalled"
                );
                return ChainOutcome::Stalled {
                    step: index,
                    abandoned,
                };
            }
        }
        tracing::debug!(steps = total, "Chain completed");
        ChainOutcome::Completed { steps: total }
    }
}

/// Declares a chain step by step. See [`crate::run`].
#[derive(Debug, Default)]
pub struct ChainBuilder {
    steps: Vec<Step>,
}

impl ChainBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step made of `tasks`, run after every earlier step completes.
    pub fn then_run(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        self.steps.push(Step::new(tasks));
        self
    }

    /// Append a step that loads every resource in `ids` concurrently.
    pub fn then_load(self, ids: impl IntoIterator<Item = ResourceId>) -> Self {
        self.then_run(ids.into_iter().map(Task::load))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn build(self) -> Chain {
        Chain { steps: self.steps }
    }

    /// Build and execute in one go.
    pub async fn execute(self, env: &ChainEnv) -> ChainOutcome {
        self.build().execute(env).await
    }
}
