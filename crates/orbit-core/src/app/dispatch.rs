//! Dispatch - 並列ジョブの実行と join
//!
//! ジョブは最初にすべて spawn され、Semaphore で同時実行数を制限します。
//! join は投入順に行うため、失敗に気づくのはその順番が来たときです
//! （後ろのジョブが先に失敗しても、前の遅いジョブの後で報告される）。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::OrbitError;

type BoxJob<T> = Pin<Box<dyn Future<Output = Result<T, OrbitError>> + Send + 'static>>;

/// A named unit of work.
pub struct Job<T> {
    name: String,
    fut: BoxJob<T>,
}

impl<T> Job<T> {
    pub fn new<F>(name: impl Into<String>, fut: F) -> Self
    where
        F: Future<Output = Result<T, OrbitError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            fut: Box::pin(fut),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// What `run_all` does after the first failure it joins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Keep joining the rest, then return the first failure.
    #[default]
    DrainThenFail,
    /// Return at once; jobs not yet joined keep running detached.
    FailFast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    limit: usize,
    policy: JoinPolicy,
}

impl WorkerPool {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            policy: JoinPolicy::default(),
        }
    }

    /// One worker per job.
    pub fn sized_to(jobs: usize) -> Self {
        Self::new(jobs)
    }

    pub fn with_policy(mut self, policy: JoinPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Results come back in submission order.
    pub async fn run_all<T: Send + 'static>(&self, jobs: Vec<Job<T>>) -> Result<Vec<T>, OrbitError> {
        let permits = Arc::new(Semaphore::new(self.limit));
        let mut handles: Vec<(String, JoinHandle<Result<T, OrbitError>>)> =
            Vec::with_capacity(jobs.len());

        for job in jobs {
            let permits = Arc::clone(&permits);
            let Job { name, fut } = job;
            let handle = tokio::spawn(async move {
                // close() はしないので Err にはならない
                let _permit = permits.acquire_owned().await.ok();
                fut.await
            });
            handles.push((name, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        let mut first_failure: Option<OrbitError> = None;
        for (name, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|e| Err(OrbitError::from(e)));
            match outcome {
                Ok(value) => {
                    debug!(job = %name, "job finished");
                    results.push(value);
                }
                Err(err) => {
                    warn!(job = %name, error = %err, "job failed");
                    if self.policy == JoinPolicy::FailFast {
                        return Err(err);
                    }
                    first_failure.get_or_insert(err);
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }
}
