// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Fixed-size worker pool driving graph passes.
//!
//! Workers are async loops on a dedicated multi-thread tokio runtime. Each
//! loop pops the highest-priority job from a shared [`PriorityWorkQueue`] and
//! runs it to completion on its thread, so at most `workers` jobs execute at
//! once. Job bodies are synchronous and CPU-bound.
//!
//! Every job reports its outcome exactly once: to the [`TaskHandle`] waiter if
//! the handle is still alive, otherwise to the manager's [`ErrorSink`].

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::consts::DEFAULT_THREAD_NAME;
use crate::errors::TaskError;
use crate::observability::messages::scheduler::{
    UnobservedTaskFailure, WorkerPoolStarted, WorkerPoolStopped,
};
use crate::observability::messages::StructuredLog;
use crate::scheduler::{lock, PriorityWorkQueue};

type Work = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;
type Outcome = Result<(), TaskError>;

struct Job {
    id: u64,
    priority: usize,
    work: Work,
    reply: oneshot::Sender<Outcome>,
}

/// Process-wide destination for failures nobody waited on.
///
/// Every report is logged at `error!` and retained until drained.
#[derive(Debug, Default)]
pub struct ErrorSink {
    errors: Mutex<Vec<(usize, TaskError)>>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, priority: usize, error: TaskError) {
        UnobservedTaskFailure {
            task_id: error.task_id().unwrap_or_default(),
            priority,
            error: &error,
        }
        .log();
        lock(&self.errors).push((priority, error));
    }

    /// Take every retained failure, oldest first.
    pub fn drain(&self) -> Vec<TaskError> {
        std::mem::take(&mut *lock(&self.errors))
            .into_iter()
            .map(|(_, error)| error)
            .collect()
    }

    /// Priorities of the retained failures, oldest first.
    pub fn priorities(&self) -> Vec<usize> {
        lock(&self.errors).iter().map(|(priority, _)| *priority).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.errors).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Completion handle for one submitted job.
///
/// Dropping the handle without waiting hands the outcome to the error sink
/// if the job fails.
#[derive(Debug)]
pub struct TaskHandle {
    id: u64,
    priority: usize,
    rx: Option<oneshot::Receiver<Outcome>>,
    sink: Arc<ErrorSink>,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn priority(&self) -> usize {
        self.priority
    }

    /// Block until the job has run and return its outcome.
    ///
    /// Must be called from a thread outside the worker pool.
    pub fn wait(mut self) -> Result<(), TaskError> {
        if Handle::try_current().is_ok() {
            return Err(TaskError::WaitFromWorker { task_id: self.id });
        }
        match self.rx.take() {
            Some(rx) => rx
                .blocking_recv()
                .unwrap_or(Err(TaskError::Abandoned { task_id: self.id })),
            None => Err(TaskError::Abandoned { task_id: self.id }),
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if let Ok(Err(error)) = rx.try_recv() {
                self.sink.report(self.priority, error);
            }
        }
    }
}

struct Shared {
    queue: Mutex<Queue>,
    notify: Notify,
    cancel: CancellationToken,
    sink: Arc<ErrorSink>,
    next_id: AtomicU64,
    by_priority: Mutex<BTreeMap<usize, u64>>,
}

struct Queue {
    jobs: PriorityWorkQueue<Job>,
    closed: bool,
}

/// Priority-aware worker pool shared by every node of a network.
pub struct TaskManager {
    shared: Arc<Shared>,
    runtime: Mutex<Option<Runtime>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl TaskManager {
    /// Start a pool of `workers` threads with a fresh error sink.
    pub fn new(workers: usize) -> Result<Self, TaskError> {
        Self::with_sink(workers, Arc::new(ErrorSink::new()))
    }

    pub fn with_sink(workers: usize, sink: Arc<ErrorSink>) -> Result<Self, TaskError> {
        Self::build(workers, DEFAULT_THREAD_NAME, sink)
    }

    pub fn build(workers: usize, thread_name: &str, sink: Arc<ErrorSink>) -> Result<Self, TaskError> {
        let worker_count = workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_count)
            .thread_name(thread_name)
            .build()?;

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: PriorityWorkQueue::new(),
                closed: false,
            }),
            notify: Notify::new(),
            cancel: CancellationToken::new(),
            sink,
            next_id: AtomicU64::new(0),
            by_priority: Mutex::new(BTreeMap::new()),
        });

        let handles = (0..worker_count)
            .map(|_| runtime.spawn(worker_loop(Arc::clone(&shared))))
            .collect();

        WorkerPoolStarted {
            workers: worker_count,
            thread_name,
        }
        .log();

        Ok(Self {
            shared,
            runtime: Mutex::new(Some(runtime)),
            workers: Mutex::new(handles),
            worker_count,
        })
    }

    /// Enqueue `work` at `priority`. Never blocks on the work itself.
    pub fn submit<F>(&self, priority: usize, work: F) -> TaskHandle
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        let handle = TaskHandle {
            id,
            priority,
            rx: Some(rx),
            sink: Arc::clone(&self.shared.sink),
        };

        {
            let mut queue = lock(&self.shared.queue);
            if queue.closed {
                let _ = reply.send(Err(TaskError::ShutDown { task_id: id }));
                return handle;
            }
            queue.jobs.push(
                priority,
                Job {
                    id,
                    priority,
                    work: Box::new(work),
                    reply,
                },
            );
        }
        *lock(&self.shared.by_priority).entry(priority).or_insert(0) += 1;
        self.shared.notify.notify_one();
        handle
    }

    /// Block until `handle`'s job completes.
    pub fn wait(&self, handle: TaskHandle) -> Result<(), TaskError> {
        handle.wait()
    }

    /// Total accepted submissions.
    pub fn submitted(&self) -> u64 {
        lock(&self.shared.by_priority).values().sum()
    }

    /// Accepted submissions per priority level.
    pub fn submitted_by_priority(&self) -> BTreeMap<usize, u64> {
        lock(&self.shared.by_priority).clone()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Jobs queued but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        lock(&self.shared.queue).jobs.len()
    }

    pub fn sink(&self) -> &Arc<ErrorSink> {
        &self.shared.sink
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.shared.queue).closed
    }

    /// Stop accepting work, run everything already queued, then join the
    /// workers. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut queue = lock(&self.shared.queue);
            if queue.closed {
                return;
            }
            queue.closed = true;
        }
        self.shared.cancel.cancel();
        self.shared.notify.notify_waiters();

        let handles = std::mem::take(&mut *lock(&self.workers));
        if let Some(runtime) = lock(&self.runtime).take() {
            if Handle::try_current().is_ok() {
                // Last reference dropped from inside a job; cannot block here.
                runtime.shutdown_background();
            } else {
                runtime.block_on(async {
                    for handle in handles {
                        let _ = handle.await;
                    }
                });
            }
        }

        WorkerPoolStopped {
            workers: self.worker_count,
            submitted: self.submitted(),
        }
        .log();
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("workers", &self.worker_count)
            .field("submitted", &self.submitted())
            .finish()
    }
}

async fn worker_loop(shared: Arc<Shared>) {
    loop {
        let next = lock(&shared.queue).jobs.pop();
        match next {
            Some(task) => run_job(&shared, task.payload),
            None => {
                if shared.cancel.is_cancelled() {
                    break;
                }
                let notified = shared.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if !lock(&shared.queue).jobs.is_empty() {
                    continue;
                }
                tokio::select! {
                    _ = &mut notified => {}
                    _ = shared.cancel.cancelled() => {}
                }
            }
        }
    }
}

fn run_job(shared: &Shared, job: Job) {
    let Job {
        id,
        priority,
        work,
        reply,
    } = job;

    // Hand this worker's scheduler core to another thread while the job
    // blocks, so woken loops are never parked behind it.
    let result = tokio::task::block_in_place(|| catch_unwind(AssertUnwindSafe(work)));
    let outcome = match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(TaskError::Failed { task_id: id, source }),
        Err(payload) => Err(TaskError::Panicked {
            task_id: id,
            message: panic_message(payload.as_ref()),
        }),
    };

    if let Err(Err(error)) = reply.send(outcome) {
        shared.sink.report(priority, error);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
