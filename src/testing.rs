//! Hand-written doubles for the orchestrator's seams.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::artifact::{ArtifactError, ArtifactRef, ArtifactTransfer};
use crate::family::{JobFamily, SourceFramework};
use crate::orchestrator::{OrchestratorSettings, SubmitRequest, TaskOrchestrator};
use crate::params::{ConvertParams, JobParams};
use crate::polling::{DeferredPoll, Scheduler};
use crate::quota::{BalanceSource, PriceTable, QuotaGuard};
use crate::remote::{
    DownloadTarget, JobOptionCatalog, JobStatusReport, ModelMetadata, RemoteError, RemoteJobApi, RemoteStatus,
    StartedJob, UploadTarget,
};
use crate::state_machine::{Phase, Task};
use crate::store::{InMemoryTaskStore, TaskRecordStore};

pub(crate) fn status(status: RemoteStatus) -> JobStatusReport {
    JobStatusReport {
        task_id: Some("rt-1".into()),
        status,
        result: None,
        error_log: None,
        output_model_id: None,
    }
}

/// Scripted remote: each status read takes the next report, the last one repeats.
pub(crate) struct MockRemote {
    family: JobFamily,
    script: Mutex<VecDeque<JobStatusReport>>,
    start_payloads: Mutex<Vec<Value>>,
    /// Cancels the token on the n-th status read.
    pub(crate) cancel_on_read: Option<(u32, CancellationToken)>,
    pub(crate) fail_reads: AtomicBool,
    pub(crate) upload_target_calls: AtomicU32,
    pub(crate) validate_calls: AtomicU32,
    pub(crate) start_calls: AtomicU32,
    pub(crate) read_status_calls: AtomicU32,
    pub(crate) cancel_calls: AtomicU32,
    pub(crate) download_calls: AtomicU32,
}

impl MockRemote {
    pub(crate) fn new(family: JobFamily, script: Vec<JobStatusReport>) -> Self {
        Self {
            family,
            script: Mutex::new(script.into()),
            start_payloads: Mutex::new(Vec::new()),
            cancel_on_read: None,
            fail_reads: AtomicBool::new(false),
            upload_target_calls: AtomicU32::new(0),
            validate_calls: AtomicU32::new(0),
            start_calls: AtomicU32::new(0),
            read_status_calls: AtomicU32::new(0),
            cancel_calls: AtomicU32::new(0),
            download_calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn total_calls(&self) -> u32 {
        [
            &self.upload_target_calls,
            &self.validate_calls,
            &self.start_calls,
            &self.read_status_calls,
            &self.cancel_calls,
            &self.download_calls,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }

    pub(crate) fn last_start_payload(&self) -> Option<Value> {
        self.start_payloads.lock().last().cloned()
    }
}

#[async_trait]
impl RemoteJobApi for MockRemote {
    fn family(&self) -> JobFamily {
        self.family
    }

    async fn get_upload_target(&self, _file_name: &str) -> Result<UploadTarget, RemoteError> {
        self.upload_target_calls.fetch_add(1, Ordering::SeqCst);
        Ok(UploadTarget {
            ai_model_id: "m-1".into(),
            presigned_upload_url: "http://storage/put".into(),
        })
    }

    async fn validate(&self, _ai_model_id: &str, _framework: SourceFramework) -> Result<ModelMetadata, RemoteError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModelMetadata {
            data_type: Some("FP32".into()),
            input_layers: vec![],
            file_size_in_mb: Some(1.0),
        })
    }

    async fn start(&self, _ai_model_id: &str, params: &Value) -> Result<StartedJob, RemoteError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.start_payloads.lock().push(params.clone());
        Ok(StartedJob {
            task_id: "rt-1".into(),
            task_option: None,
        })
    }

    async fn read_status(&self, _remote_job_id: &str) -> Result<JobStatusReport, RemoteError> {
        let n = self.read_status_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = &self.cancel_on_read {
            if *at == n {
                token.cancel();
            }
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RemoteError::GatewayTimeout {
                body: "upstream timed out".into(),
            });
        }
        let mut script = self.script.lock();
        let report = if script.len() > 1 { script.pop_front() } else { script.front().cloned() };
        report.ok_or_else(|| RemoteError::Malformed("empty status script".into()))
    }

    async fn cancel(&self, _remote_job_id: &str) -> Result<JobStatusReport, RemoteError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(status(RemoteStatus::UserCancel))
    }

    async fn download_target(&self, _remote_job_id: &str) -> Result<DownloadTarget, RemoteError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DownloadTarget {
            presigned_download_url: "http://storage/get".into(),
        })
    }

    async fn options(&self, _framework: &str) -> Result<JobOptionCatalog, RemoteError> {
        Ok(JobOptionCatalog {
            family: self.family,
            options: vec![],
        })
    }
}

#[derive(Default)]
pub(crate) struct MockArtifacts {
    pub(crate) uploads: AtomicU32,
    pub(crate) fail_downloads: AtomicBool,
}

#[async_trait]
impl ArtifactTransfer for MockArtifacts {
    async fn upload(&self, source: &Path, presigned_url: &str) -> Result<ArtifactRef, ArtifactError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let size = std::fs::metadata(source)?.len();
        Ok(ArtifactRef {
            location: presigned_url.to_string(),
            size_bytes: Some(size),
        })
    }

    async fn download(&self, _presigned_url: &str, destination: &Path) -> Result<ArtifactRef, ArtifactError> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(ArtifactError::Rejected {
                status: 403,
                message: "signature expired".into(),
            });
        }
        Ok(ArtifactRef {
            location: destination.display().to_string(),
            size_bytes: Some(0),
        })
    }
}

pub(crate) struct FixedBalance {
    balance: i64,
    pub(crate) calls: AtomicU32,
}

#[async_trait]
impl BalanceSource for FixedBalance {
    async fn balance(&self, _account_id: &str) -> Result<i64, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.balance)
    }
}

/// Queues deferred polls until the test runs them.
#[derive(Default)]
pub(crate) struct ManualScheduler {
    queue: Mutex<VecDeque<(Duration, DeferredPoll)>>,
}

impl ManualScheduler {
    pub(crate) fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn take(&self) -> Option<DeferredPoll> {
        self.queue.lock().pop_front().map(|(_, poll)| poll)
    }

    pub(crate) fn delays(&self) -> Vec<Duration> {
        self.queue.lock().iter().map(|(d, _)| *d).collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, poll: DeferredPoll) {
        self.queue.lock().push_back((delay, poll));
    }
}

pub(crate) struct Harness {
    pub(crate) orchestrator: TaskOrchestrator,
    pub(crate) remote: Arc<MockRemote>,
    pub(crate) artifacts: Arc<MockArtifacts>,
    pub(crate) balance: Arc<FixedBalance>,
    pub(crate) store: Arc<InMemoryTaskStore>,
    pub(crate) scheduler: Arc<ManualScheduler>,
    pub(crate) dir: tempfile::TempDir,
    observed: Arc<Mutex<Vec<Phase>>>,
}

impl Harness {
    pub(crate) fn new(remote: MockRemote, balance: i64) -> Self {
        Self::with_settings(remote, balance, |_| {})
    }

    pub(crate) fn with_settings(
        remote: MockRemote,
        balance: i64,
        configure: impl FnOnce(&mut OrchestratorSettings),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.onnx"), b"onnx-bytes").unwrap();

        let remote = Arc::new(remote);
        let artifacts = Arc::new(MockArtifacts::default());
        let balance = Arc::new(FixedBalance {
            balance,
            calls: AtomicU32::new(0),
        });
        let store = Arc::new(InMemoryTaskStore::new());
        let scheduler = Arc::new(ManualScheduler::default());
        let observed = Arc::new(Mutex::new(Vec::new()));

        let mut settings = OrchestratorSettings {
            output_dir: dir.path().join("outputs"),
            poll_interval: Duration::from_millis(5),
            user_cancel_as_stopped: false,
        };
        configure(&mut settings);

        let sink = Arc::clone(&observed);
        let orchestrator = TaskOrchestrator::new(
            remote.clone(),
            artifacts.clone(),
            QuotaGuard::new(balance.clone(), PriceTable::default()),
            store.clone(),
            settings,
        )
        .with_scheduler(scheduler.clone())
        .with_observer(Arc::new(move |task: &Task| sink.lock().push(task.phase)));

        Self {
            orchestrator,
            remote,
            artifacts,
            balance,
            store,
            scheduler,
            dir,
            observed,
        }
    }

    pub(crate) async fn store_task(&self, task_id: &str) -> Task {
        self.store.get_by_task_id(task_id).await.unwrap().unwrap()
    }

    pub(crate) fn observed_phases(&self) -> Vec<Phase> {
        self.observed.lock().clone()
    }
}

pub(crate) fn convert_request(h: &Harness) -> SubmitRequest {
    SubmitRequest {
        account_id: "acc-1".into(),
        input_model_path: h.dir.path().join("model.onnx"),
        params: JobParams::Convert(ConvertParams {
            framework: "tensorflow_lite".into(),
            device_name: "RaspberryPi4B".into(),
            data_type: "FP16".into(),
            software_version: None,
            input_layer: None,
            dataset_path: None,
        }),
    }
}
