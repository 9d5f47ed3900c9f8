use std::any::Any;
use std::collections::HashMap;
use std::future::Future;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::{Id, JoinError, JoinSet};

use crate::error::TaskError;
use crate::signal::shutdown_signal;

/// What a supervised task returns.
pub type TaskResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type TaskFactory = Box<dyn FnOnce(watch::Receiver<bool>) -> BoxFuture<'static, TaskResult> + Send>;

struct NamedTask {
    name: String,
    factory: TaskFactory,
}

/// Process exit status derived from a supervisor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
}

impl ExitStatus {
    /// Exit code suitable for `std::process::exit`.
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
        }
    }
}

/// Outcome of [`TaskSupervisor::run`].
#[derive(Debug)]
pub struct RunReport {
    pub status: ExitStatus,
    /// Every abnormal task exit, in the order it was observed.
    pub failures: Vec<TaskError>,
}

/// Runs a set of named peer tasks until all of them have exited.
///
/// Each task receives a shutdown receiver. The first of these events flips
/// it to `true` for every task:
///
/// - a task returns an error or panics;
/// - SIGINT/SIGTERM arrives, unless signal handling is disabled;
/// - the caller's parent receiver turns `true`.
///
/// A task returning `Ok(())` on its own just leaves the set; its peers keep
/// running. The run fails if any task failed or panicked, before or during
/// the drain.
pub struct TaskSupervisor {
    tasks: Vec<NamedTask>,
    handle_signals: bool,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSupervisor {
    /// Creates a supervisor that also listens for OS shutdown signals.
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            handle_signals: true,
        }
    }

    /// Creates a supervisor that ignores OS signals.
    pub fn without_signal_handling() -> Self {
        Self {
            tasks: Vec::new(),
            handle_signals: false,
        }
    }

    /// Registers a task. It is spawned when [`run`](Self::run) is called.
    pub fn add<F, Fut>(&mut self, name: impl Into<String>, task: F) -> &mut Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.tasks.push(NamedTask {
            name: name.into(),
            factory: Box::new(move |shutdown| task(shutdown).boxed()),
        });
        self
    }

    /// Spawns all tasks and waits until every one of them has exited.
    pub async fn run(self, mut parent: watch::Receiver<bool>) -> RunReport {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut running = JoinSet::new();
        let mut names: HashMap<Id, String> = HashMap::new();
        for NamedTask { name, factory } in self.tasks {
            tracing::debug!(task = %name, "spawning task");
            let handle = running.spawn(factory(shutdown_rx.clone()));
            names.insert(handle.id(), name);
        }
        drop(shutdown_rx);

        let mut signal = if self.handle_signals {
            shutdown_signal().boxed()
        } else {
            std::future::pending().boxed()
        };
        let mut signal_armed = true;
        let mut parent_open = true;
        let mut cancelling = false;
        let mut failures = Vec::new();

        let mut cancel = |reason: &str| {
            if !cancelling {
                cancelling = true;
                tracing::info!(reason, "cancelling all tasks");
                shutdown_tx.send_replace(true);
            }
        };

        if *parent.borrow_and_update() {
            cancel("parent cancelled");
        }

        loop {
            tokio::select! {
                joined = running.join_next_with_id() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    if let Some(failure) = task_outcome(joined, &mut names) {
                        tracing::error!(task = failure.task(), error = %failure, "task failed");
                        failures.push(failure);
                        cancel("task failed");
                    }
                }
                () = &mut signal, if signal_armed => {
                    signal_armed = false;
                    cancel("shutdown signal");
                }
                changed = parent.changed(), if parent_open => {
                    match changed {
                        Ok(()) if *parent.borrow_and_update() => cancel("parent cancelled"),
                        Ok(()) => {}
                        Err(_) => parent_open = false,
                    }
                }
            }
        }

        let status = if failures.is_empty() {
            ExitStatus::Success
        } else {
            ExitStatus::Failure
        };
        tracing::info!(?status, failures = failures.len(), "all tasks exited");

        RunReport { status, failures }
    }
}

/// Maps a joined task to its failure, if any.
fn task_outcome(
    joined: Result<(Id, TaskResult), JoinError>,
    names: &mut HashMap<Id, String>,
) -> Option<TaskError> {
    let id = match &joined {
        Ok((id, _)) => *id,
        Err(e) => e.id(),
    };
    let task = names
        .remove(&id)
        .unwrap_or_else(|| format!("task-{id}"));

    match joined {
        Ok((_, Ok(()))) => {
            tracing::info!(%task, "task finished");
            None
        }
        Ok((_, Err(source))) => Some(TaskError::Failed { task, source }),
        Err(e) if e.is_panic() => Some(TaskError::Panicked {
            task,
            message: panic_message(e.into_panic()),
        }),
        Err(_) => Some(TaskError::Aborted { task }),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
