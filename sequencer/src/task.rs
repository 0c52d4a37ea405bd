//! Tasks and their single-use completion handle.

use std::any::Any;
use std::fmt;
use std::future::{self, Future};
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;

use futures_util::FutureExt;
use futures_util::future::{Either, select};
use stepchain_types::ResourceId;
use tokio::sync::oneshot;

use crate::chain::ChainBuilder;
use crate::env::ChainEnv;

/// Task work future type alias.
pub type TaskFut = Pin<Box<dyn Future<Output = ()> + Send>>;

type Work = Box<dyn FnOnce(ChainEnv, Done) -> TaskFut + Send>;

/// Single-use completion signal for one task.
///
/// [`Done::complete`] consumes the handle, so a task cannot signal twice:
///
/// ```compile_fail
/// use stepchain_sequencer::{Task, run};
///
/// let _ = run(Task::new("twice", |_env, done| {
///     done.complete();
///     done.complete();
/// }));
/// ```
///
/// Dropping the handle without completing it is the fail-stop signal: the
/// owning step never completes and the chain stalls.
#[must_use = "dropping a Done without completing it stalls the chain"]
pub struct Done {
    label: String,
    tx: oneshot::Sender<()>,
}

impl Done {
    fn channel(label: &str) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let done = Self {
            label: label.to_string(),
            tx,
        };
        (done, rx)
    }

    /// Signal that the task finished (successfully or fail-open).
    pub fn complete(self) {
        if self.tx.send(()).is_err() {
            // Receiver is gone only if the executor itself was dropped.
            tracing::trace!(task = %self.label, "Completion signalled after chain was dropped");
        }
    }

    /// Give up without completing; equivalent to dropping the handle, but logged.
    pub fn abandon(self) {
        tracing::debug!(task = %self.label, "Task abandoned its completion");
    }

    /// Label of the task this handle belongs to.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done").field("label", &self.label).finish()
    }
}

enum TaskKind {
    Run(Work),
    Load(ResourceId),
}

/// One unit of work inside a step.
pub struct Task {
    label: String,
    kind: TaskKind,
}

/// How a started task ended, as seen by its step.
pub(crate) struct Finished {
    pub(crate) label: String,
    pub(crate) completed: bool,
}

pub(crate) type Pending = Pin<Box<dyn Future<Output = Finished> + Send>>;

impl Task {
    /// Callback task: `f` is invoked when the step begins and must eventually
    /// complete `done`, possibly from work it spawns.
    pub fn new<F>(label: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(ChainEnv, Done) + Send + 'static,
    {
        let work: Work = Box::new(move |env, done| {
            f(env, done);
            Box::pin(future::ready(()))
        });
        Self {
            label: label.into(),
            kind: TaskKind::Run(work),
        }
    }

    /// Task whose work is a future polled by the step alongside its siblings.
    ///
    /// The task is finished once `done` resolves; the future may keep running
    /// past that point.
    pub fn from_async<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(ChainEnv, Done) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let work: Work = Box::new(move |env, done| Box::pin(f(env, done)));
        Self {
            label: label.into(),
            kind: TaskKind::Run(work),
        }
    }

    /// Load `id` through the environment's loader; done once it is usable.
    #[must_use]
    pub fn load(id: ResourceId) -> Self {
        Self {
            label: id.to_string(),
            kind: TaskKind::Load(id),
        }
    }

    /// Run a nested chain in the same environment.
    ///
    /// Completes only if the nested chain completes; a stall inside it stalls
    /// the outer chain too.
    pub fn chain(label: impl Into<String>, chain: ChainBuilder) -> Self {
        Self::from_async(label, move |env, done| async move {
            let outcome = chain.execute(&env).await;
            if outcome.is_completed() {
                done.complete();
            } else {
                done.abandon();
            }
        })
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn is_load(&self) -> bool {
        matches!(self.kind, TaskKind::Load(_))
    }

    /// Invoke the task now and return the future that resolves when it ends.
    ///
    /// A run task ends as soon as its `Done` resolves. Work still pending in
    /// its future at that point keeps running on a detached tokio task. A
    /// panic in the task is reported and treated like a dropped `Done`.
    pub(crate) fn start(self, env: &ChainEnv) -> Pending {
        let label = self.label;
        match self.kind {
            TaskKind::Run(work) => {
                let (done, rx) = Done::channel(&label);
                let body = match panic::catch_unwind(AssertUnwindSafe(|| work(env.clone(), done)))
                {
                    Ok(body) => body,
                    Err(payload) => {
                        report_panic(env, &label, payload.as_ref());
                        return Box::pin(future::ready(Finished {
                            label,
                            completed: false,
                        }));
                    }
                };
                let env = env.clone();
                Box::pin(async move {
                    let body = AssertUnwindSafe(body).catch_unwind();
                    let completed = match select(body, rx).await {
                        Either::Left((Ok(()), rx)) => rx.await.is_ok(),
                        Either::Left((Err(payload), _)) => {
                            report_panic(&env, &label, payload.as_ref());
                            false
                        }
                        Either::Right((signal, body)) => {
                            let detached = label.clone();
                            tokio::spawn(async move {
                                if body.await.is_err() {
                                    tracing::warn!(task = %detached, "Detached task work panicked");
                                }
                            });
                            signal.is_ok()
                        }
                    };
                    Finished { label, completed }
                })
            }
            TaskKind::Load(id) => {
                let env = env.clone();
                Box::pin(async move {
                    let load = AssertUnwindSafe(env.loader().load(&id, env.context()));
                    let completed = match load.catch_unwind().await {
                        Ok(Ok(())) => true,
                        Ok(Err(err)) => {
                            env.report(&format!("Failed to load {id}: {err}"));
                            false
                        }
                        Err(payload) => {
                            report_panic(&env, &label, payload.as_ref());
                            false
                        }
                    };
                    Finished { label, completed }
                })
            }
        }
    }
}

fn report_panic(env: &ChainEnv, label: &str, payload: &(dyn Any + Send)) {
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload");
    env.report(&format!("Task {label} panicked: {message}"));
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            TaskKind::Run(_) => "run",
            TaskKind::Load(_) => "load",
        };
        f.debug_struct("Task")
            .field("label", &self.label)
            .field("kind", &kind)
            .finish()
    }
}
