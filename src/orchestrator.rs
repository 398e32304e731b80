use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::artifact::{ArtifactRef, ArtifactTransfer};
use crate::error::OrchestratorError;
use crate::family::{JobFamily, SourceFramework};
use crate::params::JobParams;
use crate::polling::{BlockingPoller, DeferredPoll, PollStep, Scheduler, TokioScheduler};
use crate::quota::QuotaGuard;
use crate::remote::{JobOptionCatalog, JobStatusReport, RemoteJobApi, RemoteStatus};
use crate::state_machine::{Phase, PollOutcome, Task};
use crate::store::TaskRecordStore;

/// Called with the task after every checkpoint.
pub type PhaseObserver = Arc<dyn Fn(&Task) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Downloaded artifacts land under `output_dir/<task_id>/`.
    pub output_dir: PathBuf,
    /// Interval between deferred polls.
    pub poll_interval: Duration,
    /// Record a remote USER_CANCEL as STOPPED instead of ERROR.
    pub user_cancel_as_stopped: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            poll_interval: Duration::from_secs(30),
            user_cancel_as_stopped: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub account_id: String,
    pub input_model_path: PathBuf,
    pub params: JobParams,
}

#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub timeout: Option<Duration>,
    /// Cancelling this token stops the wait and records STOPPED.
    pub interrupt: CancellationToken,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            timeout: None,
            interrupt: CancellationToken::new(),
        }
    }
}

/// Drives tasks of one job family from upload to a terminal status.
#[derive(Clone)]
pub struct TaskOrchestrator {
    family: JobFamily,
    remote: Arc<dyn RemoteJobApi>,
    artifacts: Arc<dyn ArtifactTransfer>,
    quota: QuotaGuard,
    store: Arc<dyn TaskRecordStore>,
    scheduler: Arc<dyn Scheduler>,
    settings: OrchestratorSettings,
    observer: Option<PhaseObserver>,
}

impl TaskOrchestrator {
    pub fn new(
        remote: Arc<dyn RemoteJobApi>,
        artifacts: Arc<dyn ArtifactTransfer>,
        quota: QuotaGuard,
        store: Arc<dyn TaskRecordStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            family: remote.family(),
            remote,
            artifacts,
            quota,
            store,
            scheduler: Arc::new(TokioScheduler),
            settings,
            observer: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_observer(mut self, observer: PhaseObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn family(&self) -> JobFamily {
        self.family
    }

    pub(crate) fn scheduler(&self) -> Arc<dyn Scheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Starts the remote job and returns the task id. Polling continues on
    /// the scheduler.
    pub async fn submit(&self, request: SubmitRequest) -> Result<String, OrchestratorError> {
        let mut task = self.prepare(&request).await?;
        let task_id = task.task_id.clone();

        match self.launch(&mut task, &request.account_id).await {
            Ok(()) => {
                let interval = self.settings.poll_interval;
                let poll = DeferredPoll::new(self.clone(), task_id.clone(), interval, task.poll_seq);
                self.scheduler.schedule(interval, poll);
            }
            Err(err) => self.settle_failure(&mut task, err).await?,
        }
        Ok(task_id)
    }

    /// Runs the task to a terminal status and returns the final record.
    ///
    /// Pipeline failures are recorded on the task rather than returned. Only
    /// invalid requests and store failures surface as `Err`.
    pub async fn submit_and_wait(&self, request: SubmitRequest, options: WaitOptions) -> Result<Task, OrchestratorError> {
        let mut task = self.prepare(&request).await?;
        let poller = BlockingPoller::new(options.poll_interval);

        let result = {
            let drive = async {
                self.launch(&mut task, &request.account_id).await?;
                poller.drive(self, &mut task).await
            };
            tokio::select! {
                r = drive => r,
                _ = options.interrupt.cancelled() => Err(OrchestratorError::Interrupted),
                Some(limit) = deadline(options.timeout) => Err(OrchestratorError::DeadlineExpired(limit)),
            }
        };

        if let Err(err) = result {
            self.settle_failure(&mut task, err).await?;
        }
        Ok(task)
    }

    pub async fn get(&self, task_id: &str) -> Result<Option<Task>, OrchestratorError> {
        Ok(self.store.get_by_task_id(task_id).await?)
    }

    /// Reads the remote status once and applies it to a live task.
    ///
    /// A failed status read is returned without touching the record.
    pub async fn refresh(&self, task_id: &str) -> Result<Task, OrchestratorError> {
        let mut task = self.load(task_id).await?;
        if task.is_terminal() {
            return Ok(task);
        }
        let Some(remote_job_id) = task.remote_job_id.clone() else {
            tracing::debug!(task_id, phase = %task.phase, "no remote job yet, nothing to reconcile");
            return Ok(task);
        };

        let report = self.remote.read_status(&remote_job_id).await?;
        if task.phase == Phase::Starting {
            self.enter(&mut task, Phase::Polling).await?;
        }
        if let Err(err) = self.apply_report(&mut task, report).await {
            self.settle_failure(&mut task, err).await?;
        }
        Ok(task)
    }

    /// Asks the service to cancel the remote job. The local record is left
    /// for the next poll to reconcile.
    pub async fn cancel(&self, task_id: &str) -> Result<JobStatusReport, OrchestratorError> {
        let task = self.load(task_id).await?;
        let Some(remote_job_id) = task.remote_job_id.as_deref() else {
            return Err(OrchestratorError::Validation(format!(
                "task {task_id} has no remote job to cancel"
            )));
        };
        let report = self.remote.cancel(remote_job_id).await?;
        tracing::info!(task_id, remote_job_id, remote_status = %report.status, "remote cancel requested");
        Ok(report)
    }

    pub async fn options(&self, framework: &str) -> Result<JobOptionCatalog, OrchestratorError> {
        Ok(self.remote.options(framework).await?)
    }

    /// One status read that settles the task on failure.
    pub(crate) async fn poll_step(&self, task: &mut Task) -> Result<PollStep, OrchestratorError> {
        match self.poll_once(task).await {
            Ok(step) => Ok(step),
            Err(err) => {
                self.settle_failure(task, err).await?;
                Ok(PollStep::Terminal)
            }
        }
    }

    /// Takes ownership of the deferred poll chain for this record by bumping
    /// its generation. Polls carrying an older generation are stale.
    pub(crate) async fn claim_poll(&self, task: &mut Task) -> Result<u64, OrchestratorError> {
        task.poll_seq += 1;
        self.store.update(task).await?;
        Ok(task.poll_seq)
    }

    /// One status read. Errors are returned unsettled.
    pub(crate) async fn poll_once(&self, task: &mut Task) -> Result<PollStep, OrchestratorError> {
        let Some(remote_job_id) = task.remote_job_id.clone() else {
            return Err(OrchestratorError::Validation(format!(
                "task {} has no remote job to poll",
                task.task_id
            )));
        };
        let report = self.remote.read_status(&remote_job_id).await?;
        self.apply_report(task, report).await
    }

    async fn load(&self, task_id: &str) -> Result<Task, OrchestratorError> {
        let task = self
            .store
            .get_by_task_id(task_id)
            .await?
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))?;
        if task.family != self.family {
            return Err(OrchestratorError::Validation(format!(
                "task {task_id} is a {} task, not {}",
                task.family, self.family
            )));
        }
        Ok(task)
    }

    /// Validates the request and writes the NOT_STARTED record. Nothing is
    /// written and no remote call is made when validation fails.
    async fn prepare(&self, request: &SubmitRequest) -> Result<Task, OrchestratorError> {
        if request.params.family() != self.family {
            return Err(OrchestratorError::Validation(format!(
                "{} parameters given to the {} orchestrator",
                request.params.family(),
                self.family
            )));
        }
        request.params.validate().map_err(OrchestratorError::Validation)?;

        let path = &request.input_model_path;
        let metadata = tokio::fs::metadata(path).await.ok().filter(|m| m.is_file());
        let Some(metadata) = metadata else {
            return Err(OrchestratorError::Validation(format!(
                "input model {} does not exist",
                path.display()
            )));
        };
        source_framework(path)?;

        let task = Task::new(
            request.params.clone(),
            ArtifactRef {
                location: path.display().to_string(),
                size_bytes: Some(metadata.len()),
            },
        );
        self.store.create(&task).await?;
        tracing::info!(task_id = %task.task_id, family = %self.family, phase = %task.phase, "task created");
        self.notify(&task);
        Ok(task)
    }

    /// UPLOADING through POLLING: quota, upload, validate, start.
    async fn launch(&self, task: &mut Task, account_id: &str) -> Result<(), OrchestratorError> {
        self.enter(task, Phase::Uploading).await?;
        self.quota.check(account_id, self.family).await?;

        let source = PathBuf::from(&task.input_artifact.location);
        let framework = source_framework(&source)?;
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| task.input_artifact.file_name().to_string());

        let target = self.remote.get_upload_target(&file_name).await?;
        task.input_model_id = Some(target.ai_model_id.clone());
        let uploaded = self.artifacts.upload(&source, &target.presigned_upload_url).await?;
        task.input_artifact.size_bytes = uploaded.size_bytes.or(task.input_artifact.size_bytes);

        self.enter(task, Phase::Validating).await?;
        let metadata = self.remote.validate(&target.ai_model_id, framework).await?;

        self.enter(task, Phase::Starting).await?;
        let payload = task.params.start_payload(&metadata);
        let started = self.remote.start(&target.ai_model_id, &payload).await?;
        task.bind_remote_job(started.task_id)?;
        self.checkpoint(task).await?;

        self.enter(task, Phase::Polling).await
    }

    async fn apply_report(&self, task: &mut Task, report: JobStatusReport) -> Result<PollStep, OrchestratorError> {
        tracing::debug!(
            task_id = %task.task_id,
            remote_job_id = task.remote_job_id.as_deref().unwrap_or("-"),
            remote_status = %report.status,
            "status read"
        );
        match PollOutcome::from(report.status) {
            PollOutcome::Pending => {
                if task.mark_in_progress() {
                    self.checkpoint(task).await?;
                }
                Ok(PollStep::Pending)
            }
            PollOutcome::Finished => {
                self.finalize(task, report).await?;
                Ok(PollStep::Terminal)
            }
            PollOutcome::Failed | PollOutcome::CancelledRemotely => Err(OrchestratorError::RemoteJobFailure {
                status: report.status,
                log: report.error_log_text(),
            }),
        }
    }

    /// Retrieves the output and settles COMPLETED. A record already in
    /// FINALIZING, left by an interrupted download, resumes here.
    async fn finalize(&self, task: &mut Task, report: JobStatusReport) -> Result<(), OrchestratorError> {
        if task.phase != Phase::Finalizing {
            self.enter(task, Phase::Finalizing).await?;
        }

        if self.family.descriptor().produces_artifact {
            let extension = task.params.output_extension().unwrap_or("zip");
            let remote_job_id = task.remote_job_id.clone().unwrap_or_default();
            let target = self.remote.download_target(&remote_job_id).await?;
            let destination = self
                .settings
                .output_dir
                .join(&task.task_id)
                .join(format!("{}_model.{extension}", self.family.path_segment()));
            let artifact = self
                .artifacts
                .download(&target.presigned_download_url, &destination)
                .await?;
            task.output_artifact = Some(artifact);
            task.output_model_id = Some(report.output_model_id.unwrap_or(remote_job_id));
        }
        task.result = report.result;

        task.settle(Phase::Completed, None)?;
        self.checkpoint(task).await
    }

    async fn settle_failure(&self, task: &mut Task, err: OrchestratorError) -> Result<(), OrchestratorError> {
        if task.is_terminal() {
            tracing::warn!(task_id = %task.task_id, status = %task.status, error = %err, "failure after terminal status");
            self.store.update(task).await?;
            return Ok(());
        }

        let terminal = match &err {
            OrchestratorError::Interrupted => Phase::Stopped,
            OrchestratorError::DeadlineExpired(_) => Phase::Timeout,
            OrchestratorError::RemoteJobFailure {
                status: RemoteStatus::UserCancel,
                ..
            } if self.settings.user_cancel_as_stopped => Phase::Stopped,
            _ => Phase::Error,
        };
        let detail = err.detail(task.phase);
        tracing::warn!(
            task_id = %task.task_id,
            family = %self.family,
            phase = %task.phase,
            remote_job_id = task.remote_job_id.as_deref().unwrap_or("-"),
            kind = %detail.kind,
            error = %err,
            "task failed"
        );
        task.settle(terminal, Some(detail))?;
        self.checkpoint(task).await
    }

    async fn enter(&self, task: &mut Task, phase: Phase) -> Result<(), OrchestratorError> {
        task.advance(phase)?;
        self.checkpoint(task).await
    }

    async fn checkpoint(&self, task: &Task) -> Result<(), OrchestratorError> {
        self.store.update(task).await?;
        tracing::info!(
            task_id = %task.task_id,
            family = %self.family,
            phase = %task.phase,
            status = %task.status,
            remote_job_id = task.remote_job_id.as_deref().unwrap_or("-"),
            "checkpoint"
        );
        self.notify(task);
        Ok(())
    }

    fn notify(&self, task: &Task) {
        if let Some(observer) = &self.observer {
            observer(task);
        }
    }
}

fn source_framework(path: &Path) -> Result<SourceFramework, OrchestratorError> {
    SourceFramework::from_path(path).ok_or_else(|| {
        OrchestratorError::Validation(format!(
            "cannot infer the model framework of {}",
            path.display()
        ))
    })
}

/// Resolves after `timeout`, or never when there is none.
async fn deadline(timeout: Option<Duration>) -> Option<Duration> {
    match timeout {
        Some(limit) => {
            tokio::time::sleep(limit).await;
            Some(limit)
        }
        None => std::future::pending().await,
    }
}
