use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use shared::{
    domain::{DetectionModule, JobId, JobState},
    protocol::{RemoteStatus, StatusResponse, ViolationRecord},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

pub mod api;

pub use api::{AnalysisApi, HttpAnalysisApi, VideoUpload};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why a submission was not accepted.
///
/// A rejected submission leaves the session untouched except for
/// [`SubmitError::Upload`], which also drives the session to
/// [`JobState::Error`] so state readers observe the failure.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("an analysis job is already in progress")]
    JobInProgress,
    #[error("video payload is empty")]
    EmptyUpload,
    #[error("failed to submit analysis job: {0}")]
    Upload(String),
    #[error("submission was superseded by a reset before the upload finished")]
    Superseded,
}

/// Notification that shared session state changed. Best-effort: receivers
/// that lag are dropped by the broadcast channel, so treat events as a
/// wake-up signal and re-read [`AnalysisClient::current_state`] for truth.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(JobState),
    ReportUpdated { total: usize },
}

/// Point-in-time view of the session, safe to take at any moment including
/// mid-poll.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub state: JobState,
    pub job_id: Option<JobId>,
    pub report: Vec<ViolationRecord>,
    pub result_media: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// The authoritative lifecycle state for the active job. All transitions go
/// through these methods; callers validate the guard conditions under the
/// session lock before invoking the mutating ones.
#[derive(Debug)]
struct JobStateMachine {
    state: JobState,
    job_id: Option<JobId>,
    result_media: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
}

impl JobStateMachine {
    fn new() -> Self {
        Self {
            state: JobState::Idle,
            job_id: None,
            result_media: None,
            submitted_at: None,
        }
    }

    fn state(&self) -> JobState {
        self.state
    }

    fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    fn result_media(&self) -> Option<&String> {
        self.result_media.as_ref()
    }

    fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    /// True while `job_id` is the job this session is actively polling.
    fn is_active(&self, job_id: &JobId) -> bool {
        self.state == JobState::Processing && self.job_id.as_ref() == Some(job_id)
    }

    fn begin_processing(&mut self, job_id: JobId) {
        if self.state != JobState::Idle {
            warn!(state = ?self.state, "ignoring begin_processing outside idle");
            return;
        }
        info!(job_id = %job_id, "job accepted, entering processing");
        self.state = JobState::Processing;
        self.job_id = Some(job_id);
        self.result_media = None;
        self.submitted_at = Some(Utc::now());
    }

    /// Submission failure short-circuits to `Error` without ever entering
    /// `Processing`; no job id is established.
    fn fail_submission(&mut self) {
        if self.state != JobState::Idle {
            warn!(state = ?self.state, "ignoring fail_submission outside idle");
            return;
        }
        self.state = JobState::Error;
    }

    fn complete(&mut self, job_id: &JobId, result_media: Option<String>) {
        if !self.is_active(job_id) {
            warn!(job_id = %job_id, state = ?self.state, "ignoring complete for inactive job");
            return;
        }
        info!(job_id = %job_id, "job completed");
        self.state = JobState::Completed;
        self.result_media = result_media;
    }

    fn fail_remote(&mut self, job_id: &JobId) {
        if !self.is_active(job_id) {
            warn!(job_id = %job_id, state = ?self.state, "ignoring remote failure for inactive job");
            return;
        }
        info!(job_id = %job_id, "job failed on the service");
        self.state = JobState::Error;
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// The most recently fetched violation report. Each successful fetch replaces
/// the previous snapshot in full; the service contract is cumulative, so the
/// store never merges or diffs.
#[derive(Debug, Default)]
struct ReportStore {
    records: Vec<ViolationRecord>,
}

impl ReportStore {
    fn replace(&mut self, records: Vec<ViolationRecord>) {
        self.records = records;
    }

    fn clear(&mut self) {
        self.records.clear();
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn snapshot(&self) -> Vec<ViolationRecord> {
        self.records.clone()
    }
}

struct SessionInner {
    /// Bumped on every submission and reset. An async completion captured
    /// under an older generation must not touch session state.
    generation: u64,
    upload_in_flight: bool,
    machine: JobStateMachine,
    report: ReportStore,
}

struct PollHandle {
    job_id: JobId,
    task: JoinHandle<()>,
}

/// Job-lifecycle controller for the traffic-violation analysis service.
///
/// Owns the active job, its state machine, the report snapshot, and the
/// polling task. One job at a time: submission is rejected while a job is
/// processing, and a full [`reset`](Self::reset) is the only way back to
/// idle from a terminal state.
pub struct AnalysisClient {
    api: Arc<dyn AnalysisApi>,
    poll_interval: Duration,
    inner: Mutex<SessionInner>,
    poll_task: Mutex<Option<PollHandle>>,
    events: broadcast::Sender<SessionEvent>,
}

impl AnalysisClient {
    pub fn new(server_url: &str) -> anyhow::Result<Arc<Self>> {
        Ok(Self::new_with_api(Arc::new(HttpAnalysisApi::new(
            server_url,
        )?)))
    }

    pub fn new_with_api(api: Arc<dyn AnalysisApi>) -> Arc<Self> {
        Self::new_with_api_and_interval(api, DEFAULT_POLL_INTERVAL)
    }

    pub fn new_with_api_and_interval(
        api: Arc<dyn AnalysisApi>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            api,
            poll_interval,
            inner: Mutex::new(SessionInner {
                generation: 0,
                upload_in_flight: false,
                machine: JobStateMachine::new(),
                report: ReportStore::default(),
            }),
            poll_task: Mutex::new(None),
            events,
        })
    }

    /// Submits a video for analysis with the selected detection module.
    ///
    /// Accepted from `Idle`, `Completed`, or `Error`; a fresh submission
    /// from a terminal state implicitly discards the finished job first. On
    /// success the session enters `Processing` and polling starts; on upload
    /// failure it enters `Error` and no polling ever starts.
    pub async fn submit(
        self: &Arc<Self>,
        upload: VideoUpload,
        module: DetectionModule,
    ) -> Result<JobId, SubmitError> {
        if upload.bytes.is_empty() {
            return Err(SubmitError::EmptyUpload);
        }

        let generation = {
            let mut inner = self.inner.lock().await;
            if !inner.machine.state().accepts_submission() || inner.upload_in_flight {
                return Err(SubmitError::JobInProgress);
            }
            inner.machine.reset();
            inner.report.clear();
            inner.upload_in_flight = true;
            inner.generation += 1;
            inner.generation
        };
        self.stop_polling().await;

        info!(
            module = %module,
            filename = %upload.filename,
            size_bytes = upload.bytes.len(),
            "submitting analysis job"
        );
        let result = self.api.submit_job(upload, module).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            debug!("discarding submit outcome for a superseded session");
            return Err(SubmitError::Superseded);
        }
        inner.upload_in_flight = false;
        match result {
            Ok(job_id) => {
                inner.machine.begin_processing(job_id.clone());
                drop(inner);
                self.start_polling(job_id.clone()).await;
                let _ = self
                    .events
                    .send(SessionEvent::StateChanged(JobState::Processing));
                Ok(job_id)
            }
            Err(err) => {
                warn!("analysis job submission failed: {err:#}");
                inner.machine.fail_submission();
                drop(inner);
                let _ = self.events.send(SessionEvent::StateChanged(JobState::Error));
                Err(SubmitError::Upload(err.to_string()))
            }
        }
    }

    /// Pure read of the derived session state.
    pub async fn current_state(&self) -> StateSnapshot {
        let inner = self.inner.lock().await;
        StateSnapshot {
            state: inner.machine.state(),
            job_id: inner.machine.job_id().cloned(),
            report: inner.report.snapshot(),
            result_media: inner.machine.result_media().cloned(),
            submitted_at: inner.machine.submitted_at(),
        }
    }

    /// Cancels polling, discards the job and its report, and returns the
    /// session to `Idle`. Idempotent.
    pub async fn reset(&self) {
        self.stop_polling().await;
        let changed = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.upload_in_flight = false;
            let changed = inner.machine.state() != JobState::Idle || !inner.report.is_empty();
            inner.machine.reset();
            inner.report.clear();
            changed
        };
        if changed {
            info!("analysis session reset");
            let _ = self.events.send(SessionEvent::StateChanged(JobState::Idle));
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn start_polling(self: &Arc<Self>, job_id: JobId) {
        let mut guard = self.poll_task.lock().await;
        // Never two timers: the previous cycle is cancelled before the new
        // one is spawned.
        if let Some(previous) = guard.take() {
            previous.task.abort();
        }
        let task = self.spawn_poll_task(job_id.clone());
        *guard = Some(PollHandle { job_id, task });
    }

    async fn stop_polling(&self) {
        let previous = self.poll_task.lock().await.take();
        if let Some(handle) = previous {
            debug!(job_id = %handle.job_id, "stopping poll task");
            handle.task.abort();
        }
    }

    fn spawn_poll_task(self: &Arc<Self>, job_id: JobId) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(client.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick completes immediately; consume it so
            // polling starts one full period after submission.
            ticker.tick().await;
            loop {
                ticker.tick().await;

                if !client.is_job_active(&job_id).await {
                    break;
                }

                match client.api.fetch_report(&job_id).await {
                    Ok(records) => client.apply_report(&job_id, records).await,
                    Err(err) => {
                        warn!(job_id = %job_id, "report fetch failed, retrying next tick: {err:#}");
                    }
                }

                match client.api.fetch_status(&job_id).await {
                    Ok(status) => {
                        if client.apply_status(&job_id, status).await {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(job_id = %job_id, "status fetch failed, retrying next tick: {err:#}");
                    }
                }
            }
        })
    }

    async fn is_job_active(&self, job_id: &JobId) -> bool {
        self.inner.lock().await.machine.is_active(job_id)
    }

    /// Replaces the report snapshot, unless the response belongs to a job
    /// that is no longer the active one.
    async fn apply_report(&self, job_id: &JobId, records: Vec<ViolationRecord>) {
        let total = {
            let mut inner = self.inner.lock().await;
            if !inner.machine.is_active(job_id) {
                debug!(job_id = %job_id, "discarding report for a superseded job");
                return;
            }
            inner.report.replace(records);
            inner.report.len()
        };
        debug!(job_id = %job_id, total, "report snapshot replaced");
        let _ = self.events.send(SessionEvent::ReportUpdated { total });
    }

    /// Applies a status response. Returns true when the polling loop for
    /// `job_id` must end, either because the job reached a terminal state or
    /// because it has been superseded.
    async fn apply_status(&self, job_id: &JobId, status: StatusResponse) -> bool {
        let transition = {
            let mut inner = self.inner.lock().await;
            if !inner.machine.is_active(job_id) {
                debug!(job_id = %job_id, "discarding status for a superseded job");
                return true;
            }
            match status.status {
                RemoteStatus::Processing => None,
                RemoteStatus::Completed => {
                    let media = status
                        .video_url
                        .map(|reference| self.api.resolve_media_url(&reference));
                    inner.machine.complete(job_id, media);
                    Some(JobState::Completed)
                }
                RemoteStatus::Error => {
                    inner.machine.fail_remote(job_id);
                    Some(JobState::Error)
                }
            }
        };
        match transition {
            Some(state) => {
                let _ = self.events.send(SessionEvent::StateChanged(state));
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
