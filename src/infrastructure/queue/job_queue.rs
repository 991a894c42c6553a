//! In-process, dependency-aware job queue.
//!
//! Jobs are dispatched FIFO once every job they depend on has succeeded.
//! A fixed number of worker slots bounds how many job bodies run at once.
//! If a job fails, every job that depends on it (transitively) is marked
//! failed without ever running.
//!
//! Status transitions only move forward:
//! `Pending -> Running -> {Succeeded, Failed}`, or `Pending -> Failed` when a
//! dependency failed.

use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex, Notify, mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("unknown dependency {0}")]
    UnknownDependency(JobId),
}

/// Executes job bodies. Implementations must tolerate being re-run on a job
/// that previously failed partway.
#[async_trait]
pub trait JobRunner<P>: Send + Sync {
    async fn run(&self, job_id: JobId, payload: &P) -> anyhow::Result<()>;
}

/// A job as submitted to [`JobQueue::enqueue_spec`].
#[derive(Debug, Clone)]
pub struct JobSpec<P> {
    pub payload: P,
    pub depends_on: Vec<JobId>,
    /// Total executions allowed before the job is marked failed. Always >= 1.
    pub max_attempts: u32,
}

impl<P> JobSpec<P> {
    pub fn new(payload: P) -> Self {
        Self {
            payload,
            depends_on: Vec::new(),
            max_attempts: 1,
        }
    }

    pub fn after(mut self, dependency: JobId) -> Self {
        self.depends_on.push(dependency);
        self
    }

    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Point-in-time view of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot<P> {
    pub id: JobId,
    pub payload: P,
    pub depends_on: Vec<JobId>,
    pub status: JobStatus,
    pub attempts: u32,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub enqueued_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
}

struct JobEntry<P> {
    payload: P,
    depends_on: Vec<JobId>,
    max_attempts: u32,
    status: JobStatus,
    attempts: u32,
    error: Option<String>,
    enqueued_at: OffsetDateTime,
    finished_at: Option<OffsetDateTime>,
    finished: Option<Instant>,
}

struct Dispatched<P> {
    id: JobId,
    payload: P,
    max_attempts: u32,
}

struct Completion {
    id: JobId,
    attempts: u32,
    outcome: Result<(), String>,
}

struct QueueState<P> {
    jobs: HashMap<JobId, JobEntry<P>>,
    /// Pending job ids in enqueue order.
    pending: VecDeque<JobId>,
    dependents: HashMap<JobId, Vec<JobId>>,
    idle_workers: usize,
}

impl<P: Clone> QueueState<P> {
    fn dependencies_met(&self, entry: &JobEntry<P>) -> bool {
        // Only succeeded jobs are ever expired, so a missing entry counts as met.
        entry.depends_on.iter().all(|dep| {
            self.jobs
                .get(dep)
                .is_none_or(|d| d.status == JobStatus::Succeeded)
        })
    }

    /// Moves ready jobs to Running, oldest first, while worker slots are free.
    fn take_ready(&mut self) -> Vec<Dispatched<P>> {
        let mut dispatched = Vec::new();
        let mut still_pending = VecDeque::with_capacity(self.pending.len());

        while let Some(id) = self.pending.pop_front() {
            let ready = match self.jobs.get(&id) {
                Some(entry) if entry.status == JobStatus::Pending => {
                    self.dependencies_met(entry)
                }
                _ => continue,
            };

            if !ready || self.idle_workers == 0 {
                still_pending.push_back(id);
                continue;
            }

            if let Some(entry) = self.jobs.get_mut(&id) {
                entry.status = JobStatus::Running;
                self.idle_workers -= 1;
                dispatched.push(Dispatched {
                    id,
                    payload: entry.payload.clone(),
                    max_attempts: entry.max_attempts,
                });
            }
        }

        self.pending = still_pending;
        dispatched
    }

    fn complete(&mut self, completion: Completion) {
        self.idle_workers += 1;

        let Some(entry) = self.jobs.get_mut(&completion.id) else {
            return;
        };
        entry.attempts = completion.attempts;
        entry.finished_at = Some(OffsetDateTime::now_utc());
        entry.finished = Some(Instant::now());

        match completion.outcome {
            Ok(()) => {
                entry.status = JobStatus::Succeeded;
                info!(job_id = %completion.id, attempts = completion.attempts, "Job succeeded");
            }
            Err(message) => {
                error!(job_id = %completion.id, attempts = completion.attempts, "Job failed: {}", message);
                entry.status = JobStatus::Failed;
                entry.error = Some(message);
                self.fail_dependents(completion.id);
            }
        }
    }

    fn fail_dependents(&mut self, failed: JobId) {
        let mut stack = vec![failed];

        while let Some(cause) = stack.pop() {
            let Some(children) = self.dependents.get(&cause) else {
                continue;
            };
            for child in children.clone() {
                let Some(entry) = self.jobs.get_mut(&child) else {
                    continue;
                };
                if entry.status != JobStatus::Pending {
                    continue;
                }
                warn!(job_id = %child, dependency = %cause, "Dependency failed, job will not run");
                entry.status = JobStatus::Failed;
                entry.error = Some(format!("dependency {cause} failed"));
                entry.finished_at = Some(OffsetDateTime::now_utc());
                entry.finished = Some(Instant::now());
                stack.push(child);
            }
        }
    }
}

pub struct JobQueue<P> {
    state: Mutex<QueueState<P>>,
    wake: Notify,
    changes: watch::Sender<u64>,
    worker_count: usize,
}

impl<P> JobQueue<P>
where
    P: Clone + Debug + Send + Sync + 'static,
{
    /// Starts the dispatch loop and `worker_count` worker slots on the
    /// current tokio runtime.
    pub fn start(worker_count: usize, runner: Arc<dyn JobRunner<P>>) -> Arc<Self> {
        let worker_count = worker_count.max(1);
        let (changes, _) = watch::channel(0);

        let queue = Arc::new(Self {
            state: Mutex::new(QueueState {
                jobs: HashMap::new(),
                pending: VecDeque::new(),
                dependents: HashMap::new(),
                idle_workers: worker_count,
            }),
            wake: Notify::new(),
            changes,
            worker_count,
        });

        let (ready_tx, ready_rx) = async_channel::unbounded::<Dispatched<P>>();
        let (done_tx, done_rx) = mpsc::unbounded_channel::<Completion>();

        for slot in 0..worker_count {
            tokio::spawn(worker_loop(
                slot,
                ready_rx.clone(),
                done_tx.clone(),
                runner.clone(),
            ));
        }
        tokio::spawn(dispatch_loop(queue.clone(), ready_tx, done_rx));

        info!("Job queue started with {} worker slots", worker_count);
        queue
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Enqueues `payload` to run once every job in `depends_on` succeeded.
    pub async fn enqueue(&self, payload: P, depends_on: &[JobId]) -> Result<JobId, QueueError> {
        let mut spec = JobSpec::new(payload);
        spec.depends_on.extend_from_slice(depends_on);
        self.enqueue_spec(spec).await
    }

    pub async fn enqueue_spec(&self, spec: JobSpec<P>) -> Result<JobId, QueueError> {
        let id = Uuid::new_v4();
        let mut state = self.state.lock().await;

        if let Some(unknown) = spec
            .depends_on
            .iter()
            .find(|dep| !state.jobs.contains_key(*dep))
        {
            return Err(QueueError::UnknownDependency(*unknown));
        }

        let failed_dependency = spec
            .depends_on
            .iter()
            .find(|dep| {
                state
                    .jobs
                    .get(*dep)
                    .is_some_and(|d| d.status == JobStatus::Failed)
            })
            .copied();

        let now = OffsetDateTime::now_utc();
        let mut entry = JobEntry {
            payload: spec.payload,
            depends_on: spec.depends_on,
            max_attempts: spec.max_attempts.max(1),
            status: JobStatus::Pending,
            attempts: 0,
            error: None,
            enqueued_at: now,
            finished_at: None,
            finished: None,
        };

        for dep in &entry.depends_on {
            state.dependents.entry(*dep).or_default().push(id);
        }

        if let Some(dep) = failed_dependency {
            warn!(job_id = %id, dependency = %dep, "Enqueued behind a failed job, marking failed");
            entry.status = JobStatus::Failed;
            entry.error = Some(format!("dependency {dep} failed"));
            entry.finished_at = Some(now);
            entry.finished = Some(Instant::now());
        } else {
            state.pending.push_back(id);
        }

        debug!(job_id = %id, payload = ?entry.payload, depends_on = ?entry.depends_on, "Job enqueued");
        state.jobs.insert(id, entry);
        drop(state);

        self.wake.notify_one();
        self.changes.send_modify(|v| *v += 1);
        Ok(id)
    }

    pub async fn status(&self, id: JobId) -> Option<JobStatus> {
        self.state.lock().await.jobs.get(&id).map(|j| j.status)
    }

    pub async fn snapshot(&self, id: JobId) -> Option<JobSnapshot<P>> {
        let state = self.state.lock().await;
        state.jobs.get(&id).map(|j| JobSnapshot {
            id,
            payload: j.payload.clone(),
            depends_on: j.depends_on.clone(),
            status: j.status,
            attempts: j.attempts,
            error: j.error.clone(),
            enqueued_at: j.enqueued_at,
            finished_at: j.finished_at,
        })
    }

    /// Resolves once the job reaches a terminal status. `None` for unknown ids.
    pub async fn wait_for(&self, id: JobId) -> Option<JobStatus> {
        let mut changes = self.changes.subscribe();
        loop {
            match self.status(id).await {
                Some(status) if !status.is_terminal() => {}
                other => return other,
            }
            if changes.changed().await.is_err() {
                return self.status(id).await;
            }
        }
    }

    /// Resolves once no job is pending or running.
    pub async fn wait_idle(&self) {
        let mut changes = self.changes.subscribe();
        loop {
            let busy = {
                let state = self.state.lock().await;
                state.jobs.values().any(|j| !j.status.is_terminal())
            };
            if !busy || changes.changed().await.is_err() {
                return;
            }
        }
    }

    /// Forgets succeeded jobs that finished more than `retention` ago and that
    /// no unfinished job still depends on. Returns how many were dropped.
    pub async fn expire_finished(&self, retention: Duration) -> usize {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let expired: Vec<JobId> = state
            .jobs
            .iter()
            .filter(|(_, j)| j.status == JobStatus::Succeeded)
            .filter(|(_, j)| {
                j.finished
                    .is_some_and(|at| now.saturating_duration_since(at) >= retention)
            })
            .filter(|(id, _)| {
                state.dependents.get(*id).is_none_or(|children| {
                    children.iter().all(|c| {
                        state.jobs.get(c).is_none_or(|cj| cj.status.is_terminal())
                    })
                })
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            state.jobs.remove(id);
            state.dependents.remove(id);
        }
        expired.len()
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|v| *v += 1);
    }
}

async fn dispatch_loop<P>(
    queue: Arc<JobQueue<P>>,
    ready_tx: async_channel::Sender<Dispatched<P>>,
    mut done_rx: mpsc::UnboundedReceiver<Completion>,
) where
    P: Clone + Debug + Send + Sync + 'static,
{
    loop {
        let mut completions = Vec::new();
        tokio::select! {
            _ = queue.wake.notified() => {}
            done = done_rx.recv() => match done {
                Some(done) => completions.push(done),
                None => break,
            },
        }
        while let Ok(done) = done_rx.try_recv() {
            completions.push(done);
        }

        let batch = {
            let mut state = queue.state.lock().await;
            for done in completions {
                state.complete(done);
            }
            state.take_ready()
        };

        for job in &batch {
            info!(job_id = %job.id, payload = ?job.payload, "Dispatching job");
        }
        queue.notify_changed();

        for job in batch {
            if ready_tx.send(job).await.is_err() {
                return;
            }
        }
    }
}

async fn worker_loop<P>(
    slot: usize,
    ready_rx: async_channel::Receiver<Dispatched<P>>,
    done_tx: mpsc::UnboundedSender<Completion>,
    runner: Arc<dyn JobRunner<P>>,
) where
    P: Clone + Debug + Send + Sync + 'static,
{
    while let Ok(job) = ready_rx.recv().await {
        debug!(job_id = %job.id, slot, "Worker picked up job");

        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            let result = AssertUnwindSafe(runner.run(job.id, &job.payload))
                .catch_unwind()
                .await;

            let message = match result {
                Ok(Ok(())) => break Ok(()),
                Ok(Err(e)) => format!("{e:#}"),
                Err(_) => "job body panicked".to_string(),
            };

            if attempts >= job.max_attempts {
                break Err(message);
            }
            warn!(job_id = %job.id, attempts, "Job attempt failed, retrying: {}", message);
        };

        if done_tx
            .send(Completion {
                id: job.id,
                attempts,
                outcome,
            })
            .is_err()
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Debug, Clone)]
    enum TestJob {
        Ok(&'static str),
        Fail(&'static str),
        Flaky(&'static str, u32),
        Panic,
        Slow(&'static str, u64),
    }

    #[derive(Default)]
    struct Recorder {
        ran: AsyncMutex<Vec<&'static str>>,
        flaky_calls: AtomicU32,
    }

    #[async_trait]
    impl JobRunner<TestJob> for Recorder {
        async fn run(&self, _job_id: JobId, payload: &TestJob) -> anyhow::Result<()> {
            match payload {
                TestJob::Ok(name) => {
                    self.ran.lock().await.push(name);
                    Ok(())
                }
                TestJob::Fail(name) => {
                    self.ran.lock().await.push(name);
                    anyhow::bail!("{name} exploded")
                }
                TestJob::Flaky(name, fail_times) => {
                    let call = self.flaky_calls.fetch_add(1, Ordering::SeqCst);
                    if call < *fail_times {
                        anyhow::bail!("transient");
                    }
                    self.ran.lock().await.push(name);
                    Ok(())
                }
                TestJob::Panic => panic!("boom"),
                TestJob::Slow(name, ms) => {
                    tokio::time::sleep(Duration::from_millis(*ms)).await;
                    self.ran.lock().await.push(name);
                    Ok(())
                }
            }
        }
    }

    fn queue(workers: usize) -> (Arc<JobQueue<TestJob>>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (JobQueue::start(workers, recorder.clone()), recorder)
    }

    #[tokio::test]
    async fn dependent_runs_after_its_dependency() {
        let (queue, recorder) = queue(4);

        let first = queue.enqueue(TestJob::Slow("transcode", 30), &[]).await.unwrap();
        let second = queue.enqueue(TestJob::Ok("cleanup"), &[first]).await.unwrap();

        assert_eq!(queue.wait_for(second).await, Some(JobStatus::Succeeded));
        assert_eq!(queue.status(first).await, Some(JobStatus::Succeeded));
        assert_eq!(*recorder.ran.lock().await, vec!["transcode", "cleanup"]);
    }

    #[tokio::test]
    async fn failure_cascades_without_running_dependents() {
        let (queue, recorder) = queue(2);

        let root = queue.enqueue(TestJob::Fail("transcode"), &[]).await.unwrap();
        let child = queue.enqueue(TestJob::Ok("cleanup"), &[root]).await.unwrap();
        let grandchild = queue.enqueue(TestJob::Ok("notify"), &[child]).await.unwrap();

        assert_eq!(queue.wait_for(grandchild).await, Some(JobStatus::Failed));
        assert_eq!(queue.status(child).await, Some(JobStatus::Failed));
        assert_eq!(*recorder.ran.lock().await, vec!["transcode"]);

        let snapshot = queue.snapshot(child).await.unwrap();
        assert_eq!(snapshot.attempts, 0);
        assert!(snapshot.error.unwrap().contains(&root.to_string()));
    }

    #[tokio::test]
    async fn enqueue_behind_failed_job_fails_immediately() {
        let (queue, recorder) = queue(1);

        let root = queue.enqueue(TestJob::Fail("transcode"), &[]).await.unwrap();
        queue.wait_for(root).await;
        let late = queue.enqueue(TestJob::Ok("cleanup"), &[root]).await.unwrap();

        assert_eq!(queue.status(late).await, Some(JobStatus::Failed));
        queue.wait_idle().await;
        assert_eq!(*recorder.ran.lock().await, vec!["transcode"]);
    }

    #[tokio::test]
    async fn unknown_dependency_is_rejected() {
        let (queue, _) = queue(1);
        let ghost = Uuid::new_v4();

        let err = queue.enqueue(TestJob::Ok("x"), &[ghost]).await.unwrap_err();
        assert!(matches!(err, QueueError::UnknownDependency(id) if id == ghost));
    }

    #[tokio::test]
    async fn ready_jobs_dispatch_in_fifo_order_on_one_worker() {
        let (queue, recorder) = queue(1);

        let blocker = queue.enqueue(TestJob::Slow("a", 20), &[]).await.unwrap();
        queue.enqueue(TestJob::Ok("b"), &[]).await.unwrap();
        queue.enqueue(TestJob::Ok("c"), &[blocker]).await.unwrap();
        queue.enqueue(TestJob::Ok("d"), &[]).await.unwrap();
        queue.wait_idle().await;

        assert_eq!(*recorder.ran.lock().await, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn worker_slots_bound_concurrency() {
        let (queue, _) = queue(2);

        let ids: Vec<_> = futures_util::future::join_all(
            (0..4).map(|_| queue.enqueue(TestJob::Slow("s", 50), &[])),
        )
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

        tokio::time::sleep(Duration::from_millis(15)).await;
        let mut running = 0;
        for id in &ids {
            if queue.status(*id).await == Some(JobStatus::Running) {
                running += 1;
            }
        }
        assert_eq!(running, 2);

        queue.wait_idle().await;
        for id in ids {
            assert_eq!(queue.status(id).await, Some(JobStatus::Succeeded));
        }
    }

    #[tokio::test]
    async fn panicking_job_fails_and_queue_keeps_going() {
        let (queue, recorder) = queue(1);

        let bad = queue.enqueue(TestJob::Panic, &[]).await.unwrap();
        let good = queue.enqueue(TestJob::Ok("after"), &[]).await.unwrap();

        assert_eq!(queue.wait_for(bad).await, Some(JobStatus::Failed));
        assert_eq!(queue.wait_for(good).await, Some(JobStatus::Succeeded));
        assert_eq!(*recorder.ran.lock().await, vec!["after"]);
    }

    #[tokio::test]
    async fn bounded_retry_recovers_transient_failures() {
        let (queue, recorder) = queue(1);

        let id = queue
            .enqueue_spec(JobSpec::new(TestJob::Flaky("flaky", 2)).with_attempts(3))
            .await
            .unwrap();

        assert_eq!(queue.wait_for(id).await, Some(JobStatus::Succeeded));
        assert_eq!(queue.snapshot(id).await.unwrap().attempts, 3);
        assert_eq!(*recorder.ran.lock().await, vec!["flaky"]);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let (queue, _) = queue(1);

        let id = queue
            .enqueue_spec(JobSpec::new(TestJob::Fail("never")).with_attempts(2))
            .await
            .unwrap();

        assert_eq!(queue.wait_for(id).await, Some(JobStatus::Failed));
        assert_eq!(queue.snapshot(id).await.unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn expiry_only_drops_old_succeeded_jobs() {
        let (queue, _) = queue(1);

        let ok = queue.enqueue(TestJob::Ok("ok"), &[]).await.unwrap();
        let failed = queue.enqueue(TestJob::Fail("bad"), &[]).await.unwrap();
        queue.wait_idle().await;

        assert_eq!(queue.expire_finished(Duration::from_secs(3600)).await, 0);
        assert_eq!(queue.expire_finished(Duration::ZERO).await, 1);
        assert_eq!(queue.status(ok).await, None);
        assert_eq!(queue.status(failed).await, Some(JobStatus::Failed));
    }

    #[tokio::test]
    async fn wait_for_unknown_job_returns_none() {
        let (queue, _) = queue(1);
        assert_eq!(queue.wait_for(Uuid::new_v4()).await, None);
    }
}
