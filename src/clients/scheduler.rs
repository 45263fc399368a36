//! Scheduler stage: registered periodic jobs on tokio tasks.
//!
//! Job bodies are supplied by the application; this stage only runs
//! them on their intervals, instruments each tick, and tears the tasks
//! down on shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::CoreError;
use crate::instrument::timed;
use crate::lifecycle::{ManagedService, Stage};

type JobFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync>;

/// A named unit of periodic work.
#[derive(Clone)]
pub struct ScheduledJob {
    name: String,
    every: Duration,
    run: JobFn,
}

impl std::fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("name", &self.name)
            .field("every", &self.every)
            .finish_non_exhaustive()
    }
}

impl ScheduledJob {
    /// Registers `run` to execute every `every`.
    pub fn new<F, Fut>(name: impl Into<String>, every: Duration, run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            every,
            run: Arc::new(move || Box::pin(run())),
        }
    }
}

/// Runs the registered jobs while the stage is up.
pub struct SchedulerService {
    jobs: Vec<ScheduledJob>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl std::fmt::Debug for SchedulerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerService")
            .field("jobs", &self.jobs.len())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl SchedulerService {
    /// Builds a stopped scheduler over the given jobs.
    #[must_use]
    pub fn new(jobs: Vec<ScheduledJob>) -> Self {
        Self {
            jobs,
            handles: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ManagedService for SchedulerService {
    fn stage(&self) -> Stage {
        Stage::Scheduler
    }

    async fn start(&self) -> Result<(), CoreError> {
        let mut handles = self.handles.lock().await;
        for job in &self.jobs {
            let task_job = job.clone();
            handles.push(tokio::spawn(async move {
                let job = task_job;
                let mut interval = tokio::time::interval(job.every);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The immediate first tick; jobs run one interval in.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if let Err(error) = timed(&job.name, (job.run)()).await {
                        tracing::error!(job = %job.name, error = %error, "scheduled job failed");
                    }
                }
            }));
            tracing::info!(job = %job.name, every_secs = job.every.as_secs(), "job scheduled");
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.handles.lock().await.drain(..) {
            handle.abort();
        }
        Ok(())
    }

    async fn ping(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
