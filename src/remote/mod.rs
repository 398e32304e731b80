pub mod auth;
pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::family::{JobFamily, SourceFramework};

pub use auth::{AuthClient, TokenHolder, TokenIssuer, Tokens};
pub use client::{RemoteJobClient, api_http_client};
pub use error::RemoteError;
pub use types::{
    DeviceInfo, DownloadTarget, InputLayer, JobOptionCatalog, JobStatusReport, ModelMetadata, ModelOption,
    OptionQuery, RemoteStatus, SoftwareVersionInfo, StartedJob, UploadTarget,
};

/// Protocol operations of one job family on the optimization service.
///
/// Every call is a synchronous request/response; the implementation refreshes
/// the bearer token before each one.
#[async_trait]
pub trait RemoteJobApi: Send + Sync {
    fn family(&self) -> JobFamily;

    async fn get_upload_target(&self, file_name: &str) -> Result<UploadTarget, RemoteError>;

    async fn validate(&self, ai_model_id: &str, framework: SourceFramework) -> Result<ModelMetadata, RemoteError>;

    /// Starts the job. `params` is the family payload without `input_model_id`.
    async fn start(&self, ai_model_id: &str, params: &Value) -> Result<StartedJob, RemoteError>;

    async fn read_status(&self, remote_job_id: &str) -> Result<JobStatusReport, RemoteError>;

    async fn cancel(&self, remote_job_id: &str) -> Result<JobStatusReport, RemoteError>;

    async fn download_target(&self, remote_job_id: &str) -> Result<DownloadTarget, RemoteError>;

    async fn options(&self, framework: &str) -> Result<JobOptionCatalog, RemoteError>;
}
