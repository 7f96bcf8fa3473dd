use super::context::JobContext;
use super::handle::{SchedulerCommand, SharedJobState};
use super::job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Manages background job scheduling and execution.
///
/// Each registered job moves Idle -> Triggered -> Running -> Idle; a cron
/// fire that lands while the job is still Running is skipped with an info
/// log, never treated as an error.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Parsed cron schedules for jobs that are cron-driven.
    cron_schedules: HashMap<String, Schedule>,

    /// Next cron fire time per scheduled job.
    next_fires: HashMap<String, DateTime<Utc>>,

    /// Currently running jobs with their task handles.
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Cancellation tokens for each running job.
    job_cancel_tokens: HashMap<String, CancellationToken>,

    /// Receiver for commands from SchedulerHandle.
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    /// Shared context provided to jobs during execution.
    job_context: JobContext,
}

impl JobScheduler {
    fn new(
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            shared_state,
            cron_schedules: HashMap::new(),
            next_fires: HashMap::new(),
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            command_receiver,
            shutdown_token,
            job_context,
        }
    }

    /// Register a job with the scheduler.
    ///
    /// An empty cron expression disables scheduling (the job stays
    /// triggerable manually); an unparseable one is logged and likewise
    /// leaves the job manual-only.
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        match job.schedule() {
            JobSchedule::Cron(expression) if expression.trim().is_empty() => {
                info!("Job {} has no cron expression, scheduling disabled", job_id);
            }
            JobSchedule::Cron(expression) => match Schedule::from_str(expression.trim()) {
                Ok(schedule) => {
                    if let Some(next) = schedule.after(&Utc::now()).next() {
                        debug!("Job {} first fires at {}", job_id, next);
                        self.next_fires.insert(job_id.clone(), next);
                    }
                    self.cron_schedules.insert(job_id.clone(), schedule);
                }
                Err(e) => {
                    warn!(
                        "Job {} has an invalid cron expression '{}': {}; scheduling disabled",
                        job_id, expression, e
                    );
                }
            },
            JobSchedule::Manual => {
                debug!("Job {} is manual-only", job_id);
            }
        }
        info!("Registering job: {} - {}", job_id, job.description());
        let mut state = self.shared_state.write().await;
        state.jobs.insert(job_id, job);
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop.
    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);

        loop {
            self.cleanup_completed_jobs().await;

            let sleep_duration = self.time_until_next_fire();
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    /// Manually trigger a job by ID.
    async fn trigger_job(&mut self, job_id: &str) -> Result<(), JobError> {
        let state = self.shared_state.read().await;
        if !state.jobs.contains_key(job_id) {
            return Err(JobError::NotFound);
        }
        if state.running_jobs.contains(job_id) {
            return Err(JobError::AlreadyRunning);
        }
        drop(state);

        self.spawn_job(job_id, "manual").await;
        Ok(())
    }

    /// Time until the earliest pending cron fire, capped by the default
    /// check interval.
    fn time_until_next_fire(&self) -> Duration {
        let now = Utc::now();
        self.next_fires
            .values()
            .map(|next| (*next - now).to_std().unwrap_or(Duration::ZERO))
            .min()
            .unwrap_or(Duration::from_secs(60))
            .min(Duration::from_secs(60))
    }

    /// Run every job whose cron fire time has passed. A job still running
    /// from its previous fire is skipped, and its next fire advances past
    /// the missed one.
    async fn run_due_jobs(&mut self) {
        let now = Utc::now();
        let due: Vec<String> = self
            .next_fires
            .iter()
            .filter(|(_, next)| **next <= now)
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in due {
            if let Some(schedule) = self.cron_schedules.get(&job_id) {
                match schedule.after(&now).next() {
                    Some(next) => {
                        self.next_fires.insert(job_id.clone(), next);
                    }
                    None => {
                        self.next_fires.remove(&job_id);
                    }
                }
            }

            let already_running = {
                let state = self.shared_state.read().await;
                state.running_jobs.contains(&job_id)
            };
            if already_running {
                info!(
                    "Skipping scheduled trigger for job {}: previous run still in progress",
                    job_id
                );
                continue;
            }
            self.spawn_job(&job_id, "schedule").await;
        }
    }

    /// Spawn a job execution task.
    async fn spawn_job(&mut self, job_id: &str, triggered_by: &str) {
        let job = {
            let state = self.shared_state.read().await;
            match state.jobs.get(job_id) {
                Some(job) => Arc::clone(job),
                None => {
                    error!("Attempted to spawn unknown job: {}", job_id);
                    return;
                }
            }
        };

        info!("Starting job: {} (triggered_by: {})", job_id, triggered_by);

        {
            let mut state = self.shared_state.write().await;
            state.running_jobs.insert(job_id.to_string());
        }

        let cancel_token = self.job_context.cancellation_token.child_token();
        self.job_cancel_tokens
            .insert(job_id.to_string(), cancel_token.clone());

        let mut ctx = self.job_context.clone();
        ctx.cancellation_token = cancel_token;

        let job_id_owned = job_id.to_string();
        let shared_state = Arc::clone(&self.shared_state);

        // Jobs are synchronous; run them off the scheduler's runtime thread.
        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            let result = tokio::task::spawn_blocking(move || job.execute(&ctx)).await;
            let elapsed = start_time.elapsed();

            match result {
                Ok(Ok(())) => {
                    info!(
                        "Job {} completed successfully in {:?}",
                        job_id_owned, elapsed
                    );
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id_owned, elapsed);
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e);
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e);
                }
            }

            let mut state = shared_state.write().await;
            state.running_jobs.remove(&job_id_owned);
        });

        self.running_handles.insert(job_id.to_string(), handle);
    }

    /// Clean up handles for completed jobs.
    async fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<String> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in completed {
            if let Some(handle) = self.running_handles.remove(&job_id) {
                let _ = handle.await;
            }
            self.job_cancel_tokens.remove(&job_id);
        }
    }

    /// Gracefully shut down the scheduler.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        {
            let state = self.shared_state.read().await;
            for job_id in &state.running_jobs {
                if let Some(job) = state.jobs.get(job_id) {
                    if job.shutdown_behavior() == ShutdownBehavior::Cancellable {
                        if let Some(token) = self.job_cancel_tokens.get(job_id) {
                            debug!("Cancelling job: {}", job_id);
                            token.cancel();
                        }
                    }
                }
            }
        }

        let mut wait_jobs = Vec::new();
        for (job_id, handle) in self.running_handles.drain() {
            let behavior = {
                let state = self.shared_state.read().await;
                state
                    .jobs
                    .get(&job_id)
                    .map(|j| j.shutdown_behavior())
                    .unwrap_or(ShutdownBehavior::Cancellable)
            };
            wait_jobs.push((job_id, handle, behavior));
        }

        for (job_id, handle, behavior) in wait_jobs {
            if behavior == ShutdownBehavior::WaitForCompletion {
                info!("Waiting for job {} to complete...", job_id);
            }
            let _ = tokio::time::timeout(Duration::from_secs(30), handle).await;
        }

        self.job_cancel_tokens.clear();
        info!("Scheduler shutdown complete");
    }
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    shutdown_token: CancellationToken,
    job_context: JobContext,
) -> (JobScheduler, super::handle::SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::default()));

    let scheduler = JobScheduler::new(
        command_rx,
        shutdown_token,
        job_context,
        Arc::clone(&shared_state),
    );

    let handle = super::handle::SchedulerHandle::new(command_tx, shared_state);

    (scheduler, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::SqliteCatalogStore;
    use crate::magic::LoftyTagReader;
    use crate::pipeline::ScanOrchestrator;
    use crate::search_engine::EnrichmentService;
    use crate::settings::PipelineConfig;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct TestJob {
        id: &'static str,
        cron: String,
        execution_count: Arc<AtomicUsize>,
        should_fail: Arc<AtomicBool>,
        block_for_ms: u64,
    }

    impl BackgroundJob for TestJob {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            "Test Job"
        }

        fn description(&self) -> &'static str {
            "A test job for unit tests"
        }

        fn schedule(&self) -> JobSchedule {
            JobSchedule::Cron(self.cron.clone())
        }

        fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
            self.execution_count.fetch_add(1, Ordering::SeqCst);
            if self.block_for_ms > 0 {
                std::thread::sleep(Duration::from_millis(self.block_for_ms));
            }
            if self.should_fail.load(Ordering::SeqCst) {
                Err(JobError::ExecutionFailed("Test failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn test_job(id: &'static str, cron: &str) -> (Arc<TestJob>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let job = Arc::new(TestJob {
            id,
            cron: cron.to_string(),
            execution_count: count.clone(),
            should_fail: Arc::new(AtomicBool::new(false)),
            block_for_ms: 0,
        });
        (job, count)
    }

    fn test_context(temp: &TempDir, shutdown: &CancellationToken) -> JobContext {
        let store = Arc::new(SqliteCatalogStore::new(temp.path().join("catalog.db"), 1).unwrap());
        let config = PipelineConfig::defaults();
        let orchestrator = Arc::new(
            ScanOrchestrator::new(store.clone(), Arc::new(LoftyTagReader), config.clone())
                .unwrap(),
        );
        let enrichment = Arc::new(EnrichmentService::new(
            store.clone(),
            vec![],
            config.search_engine.default_page_size,
            config.search_engine.maximum_allowed_page_size,
            config.search_engine.artist_refresh_in_days,
        ));
        JobContext::new(
            shutdown.child_token(),
            store,
            orchestrator,
            enrichment,
            None,
            config,
        )
    }

    fn test_scheduler() -> (JobScheduler, super::super::SchedulerHandle, CancellationToken, TempDir) {
        let temp = TempDir::new().unwrap();
        let shutdown = CancellationToken::new();
        let ctx = test_context(&temp, &shutdown);
        let (scheduler, handle) = create_scheduler(shutdown.clone(), ctx);
        (scheduler, handle, shutdown, temp)
    }

    #[tokio::test]
    async fn register_and_list_jobs() {
        let (mut scheduler, handle, _shutdown, _temp) = test_scheduler();
        let (job, _) = test_job("test_job", "0 0 3 * * ? *");
        scheduler.register_job(job).await;

        assert_eq!(scheduler.job_count().await, 1);
        assert!(handle.job_exists("test_job").await);
        assert!(!handle.job_exists("nope").await);
        let jobs = handle.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "test_job");
        assert!(!jobs[0].is_running);
    }

    #[tokio::test]
    async fn empty_cron_expression_disables_scheduling() {
        let (mut scheduler, _handle, _shutdown, _temp) = test_scheduler();
        let (job, _) = test_job("disabled_job", "");
        scheduler.register_job(job).await;

        // Registered but never scheduled.
        assert_eq!(scheduler.job_count().await, 1);
        assert!(scheduler.next_fires.is_empty());
    }

    #[tokio::test]
    async fn invalid_cron_expression_is_not_fatal() {
        let (mut scheduler, _handle, _shutdown, _temp) = test_scheduler();
        let (job, _) = test_job("bad_cron_job", "not a cron expression");
        scheduler.register_job(job).await;

        assert_eq!(scheduler.job_count().await, 1);
        assert!(scheduler.next_fires.is_empty());
    }

    #[tokio::test]
    async fn quartz_style_defaults_parse() {
        let (mut scheduler, _handle, _shutdown, _temp) = test_scheduler();
        let config = PipelineConfig::defaults();
        let crons = [
            config.jobs.artist_housekeeping_cron.clone(),
            config.jobs.library_process_cron.clone(),
            config.jobs.library_insert_cron.clone(),
            config.jobs.musicbrainz_update_database_cron.clone(),
            config.jobs.artist_search_engine_housekeeping_cron.clone(),
        ];
        for (i, cron) in crons.iter().enumerate() {
            let (job, _) = test_job(["a", "b", "c", "d", "e"][i], cron);
            scheduler.register_job(job).await;
        }
        // Every seeded expression parsed and got a next fire time.
        assert_eq!(scheduler.next_fires.len(), 5);
    }

    #[tokio::test]
    async fn manual_trigger_executes_job() {
        let (mut scheduler, handle, shutdown, _temp) = test_scheduler();
        let (job, count) = test_job("manual_job", "");
        scheduler.register_job(job).await;

        let sched_task = tokio::spawn(async move { scheduler.run().await });
        handle.trigger_job("manual_job").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_task).await;
    }

    #[tokio::test]
    async fn trigger_of_unknown_job_is_not_found() {
        let (scheduler, handle, shutdown, _temp) = test_scheduler();
        let sched_task = tokio::spawn(async move {
            let mut scheduler = scheduler;
            scheduler.run().await
        });

        let err = handle.trigger_job("missing").await.unwrap_err();
        assert!(matches!(err, JobError::NotFound));

        shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_task).await;
    }

    #[tokio::test]
    async fn running_job_refuses_second_trigger() {
        let (mut scheduler, handle, shutdown, _temp) = test_scheduler();
        let count = Arc::new(AtomicUsize::new(0));
        let job = Arc::new(TestJob {
            id: "slow_job",
            cron: String::new(),
            execution_count: count.clone(),
            should_fail: Arc::new(AtomicBool::new(false)),
            block_for_ms: 500,
        });
        scheduler.register_job(job).await;

        let sched_task = tokio::spawn(async move { scheduler.run().await });
        handle.trigger_job("slow_job").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Second trigger while the first is still running.
        let err = handle.trigger_job("slow_job").await.unwrap_err();
        assert!(matches!(err, JobError::AlreadyRunning));
        assert!(handle.is_job_running("slow_job").await);

        shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_task).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cron_fire_executes_job() {
        let (mut scheduler, _handle, shutdown, _temp) = test_scheduler();
        // Fires every second.
        let (job, count) = test_job("every_second", "* * * * * ? *");
        scheduler.register_job(job).await;

        let sched_task = tokio::spawn(async move { scheduler.run().await });
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert!(
            count.load(Ordering::SeqCst) >= 1,
            "cron job should have fired at least once"
        );

        shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_task).await;
    }

    #[tokio::test]
    async fn overlapping_cron_fire_is_skipped() {
        let (mut scheduler, _handle, shutdown, _temp) = test_scheduler();
        let count = Arc::new(AtomicUsize::new(0));
        // Fires every second but each run takes ~3 seconds.
        let job = Arc::new(TestJob {
            id: "overlapping_job",
            cron: "* * * * * ? *".to_string(),
            execution_count: count.clone(),
            should_fail: Arc::new(AtomicBool::new(false)),
            block_for_ms: 3000,
        });
        scheduler.register_job(job).await;

        let sched_task = tokio::spawn(async move { scheduler.run().await });
        tokio::time::sleep(Duration::from_millis(2500)).await;

        // The second and third fires landed while the first run was still
        // going; they were skipped, not queued.
        assert_eq!(count.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), sched_task).await;
    }
}
