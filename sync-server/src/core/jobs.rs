//! 后台任务队列
//!
//! 统一管理同步任务的排队、启动和跟踪。Jobs are dispatched fire-and-forget
//! onto the tokio runtime; each runs as one sequential task and reports
//! monotonically increasing progress through a watch channel. Chained jobs
//! are enqueued through the context, never called inline, so a downstream
//! failure cannot unwind upstream state.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Terminal result of a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    /// Precondition already satisfied; the job stopped itself
    Cancelled,
    Failed,
}

/// Observable job state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Done,
    Cancelled,
    Failed,
}

impl From<JobOutcome> for JobState {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Done => JobState::Done,
            JobOutcome::Cancelled => JobState::Cancelled,
            JobOutcome::Failed => JobState::Failed,
        }
    }
}

/// A unit of background work
#[async_trait]
pub trait Job: Send + 'static {
    fn name(&self) -> &'static str;
    async fn run(self: Box<Self>, ctx: &JobContext) -> JobOutcome;
}

/// Execution context handed to a running job
pub struct JobContext {
    id: Uuid,
    name: &'static str,
    progress: watch::Sender<u8>,
    cancel: CancellationToken,
    queue: JobQueue,
}

impl JobContext {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Report progress. Clamped to 100 and never allowed to decrease.
    pub fn set_progress(&self, percent: u8) {
        let percent = percent.min(100);
        self.progress.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
    }

    pub fn progress(&self) -> u8 {
        *self.progress.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Queue handle for chaining follow-up jobs
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }
}

struct JobEntry {
    name: &'static str,
    state: watch::Receiver<JobState>,
    progress: watch::Receiver<u8>,
}

struct QueueInner {
    jobs: DashMap<Uuid, JobEntry>,
    shutdown: CancellationToken,
}

/// Fire-and-forget job dispatcher with traceable handles.
///
/// Overlapping runs of the same job type are not mutually excluded here;
/// callers that can race must serialize their triggers.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                jobs: DashMap::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Token cancelling every queued job cooperatively
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.jobs.is_empty()
    }

    /// Look up a handle by job id
    pub fn handle(&self, id: Uuid) -> Option<JobHandle> {
        self.inner.jobs.get(&id).map(|entry| JobHandle {
            id,
            name: entry.name,
            state: entry.state.clone(),
            progress: entry.progress.clone(),
        })
    }

    /// Start a job immediately and return its handle.
    ///
    /// Panics inside the job are caught and reported as [`JobState::Failed`].
    pub fn enqueue(&self, job: Box<dyn Job>) -> JobHandle {
        let id = Uuid::new_v4();
        let name = job.name();
        let (progress_tx, progress_rx) = watch::channel(0u8);
        let (state_tx, state_rx) = watch::channel(JobState::Running);

        self.inner.jobs.insert(
            id,
            JobEntry {
                name,
                state: state_rx.clone(),
                progress: progress_rx.clone(),
            },
        );

        let ctx = JobContext {
            id,
            name,
            progress: progress_tx,
            cancel: self.inner.shutdown.child_token(),
            queue: self.clone(),
        };

        tokio::spawn(async move {
            tracing::info!(job = %name, id = %id, "Job started");
            let result = AssertUnwindSafe(job.run(&ctx)).catch_unwind().await;
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(panic_info) => {
                    let panic_msg: String = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    tracing::error!(
                        job = %name,
                        id = %id,
                        panic = %panic_msg,
                        "Job panicked! This is a bug that should be reported."
                    );
                    JobOutcome::Failed
                }
            };
            if outcome == JobOutcome::Done {
                ctx.set_progress(100);
            }
            tracing::info!(job = %name, id = %id, outcome = ?outcome, "Job finished");
            let _ = state_tx.send(outcome.into());
        });

        JobHandle {
            id,
            name,
            state: state_rx,
            progress: progress_rx,
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to an enqueued job
#[derive(Clone)]
pub struct JobHandle {
    pub id: Uuid,
    pub name: &'static str,
    state: watch::Receiver<JobState>,
    progress: watch::Receiver<u8>,
}

impl JobHandle {
    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    pub fn progress(&self) -> u8 {
        *self.progress.borrow()
    }

    /// Watch channel mirroring the job's progress reports
    pub fn watch_progress(&self) -> watch::Receiver<u8> {
        self.progress.clone()
    }

    /// Await the job's terminal state
    pub async fn wait(&mut self) -> JobOutcome {
        loop {
            let state = *self.state.borrow_and_update();
            match state {
                JobState::Done => return JobOutcome::Done,
                JobState::Cancelled => return JobOutcome::Cancelled,
                JobState::Failed => return JobOutcome::Failed,
                JobState::Running => {
                    if self.state.changed().await.is_err() {
                        return JobOutcome::Failed;
                    }
                }
            }
        }
    }
}
