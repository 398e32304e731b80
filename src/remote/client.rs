use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::RemoteJobApi;
use super::auth::TokenHolder;
use super::error::RemoteError;
use super::types::{
    DownloadTarget, Envelope, JobOptionCatalog, JobStatusReport, ModelMetadata, ModelOption, StartedJob,
    UploadTarget,
};
use crate::family::{JobFamily, SourceFramework};

/// Builds the HTTP client used for API calls.
pub fn api_http_client() -> Result<Client, RemoteError> {
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()?;
    Ok(client)
}

/// Turns a response into `T`, mapping non-2xx answers to [`RemoteError`].
///
/// A 504 whose body is not JSON comes from the gateway rather than the
/// service and is reported as [`RemoteError::GatewayTimeout`].
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let is_json = serde_json::from_str::<Value>(&body).is_ok();
        if status == StatusCode::GATEWAY_TIMEOUT && !is_json {
            return Err(RemoteError::GatewayTimeout { body });
        }
        return Err(RemoteError::Api {
            status: status.as_u16(),
            message: body,
        });
    }

    serde_json::from_str::<Envelope<T>>(&body)
        .map(Envelope::into_inner)
        .map_err(|e| RemoteError::Malformed(format!("{e}: {body}")))
}

/// HTTP client for one job family of the optimization service.
pub struct RemoteJobClient {
    client: Client,
    base_url: String,
    family: JobFamily,
    tokens: Arc<TokenHolder>,
}

impl RemoteJobClient {
    pub fn new(client: Client, base_url: impl Into<String>, family: JobFamily, tokens: Arc<TokenHolder>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            family,
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}{path}",
            self.base_url.trim_end_matches('/'),
            self.family.path_segment()
        )
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let token = self.tokens.refresh_if_expired().await?;
        let response = request.bearer_auth(token).send().await?;
        read_json(response).await
    }
}

#[async_trait]
impl RemoteJobApi for RemoteJobClient {
    fn family(&self) -> JobFamily {
        self.family
    }

    async fn get_upload_target(&self, file_name: &str) -> Result<UploadTarget, RemoteError> {
        let request = self
            .client
            .post(self.url("/models"))
            .json(&json!({ "object_file_name": file_name }));
        self.send(request).await
    }

    async fn validate(&self, ai_model_id: &str, framework: SourceFramework) -> Result<ModelMetadata, RemoteError> {
        let request = self
            .client
            .post(self.url(&format!("/models/{ai_model_id}/validate")))
            .json(&json!({ "framework": framework }));
        self.send(request).await
    }

    async fn start(&self, ai_model_id: &str, params: &Value) -> Result<StartedJob, RemoteError> {
        let mut body = params.clone();
        match &mut body {
            Value::Object(map) => {
                map.insert("input_model_id".into(), Value::String(ai_model_id.to_string()));
            }
            _ => return Err(RemoteError::Malformed("start parameters must be a JSON object".into())),
        }
        let request = self.client.post(self.url("/tasks")).json(&body);
        self.send(request).await
    }

    async fn read_status(&self, remote_job_id: &str) -> Result<JobStatusReport, RemoteError> {
        let request = self.client.get(self.url(&format!("/tasks/{remote_job_id}")));
        self.send(request).await
    }

    async fn cancel(&self, remote_job_id: &str) -> Result<JobStatusReport, RemoteError> {
        let request = self
            .client
            .post(self.url(&format!("/tasks/{remote_job_id}/cancel")))
            .json(&json!({}));
        self.send(request).await
    }

    async fn download_target(&self, remote_job_id: &str) -> Result<DownloadTarget, RemoteError> {
        let request = self.client.get(self.url(&format!("/models/{remote_job_id}")));
        self.send(request).await
    }

    async fn options(&self, framework: &str) -> Result<JobOptionCatalog, RemoteError> {
        let request = self.client.get(self.url(&format!("/options/framework/{framework}")));
        let options: Vec<ModelOption> = self.send(request).await?;
        Ok(JobOptionCatalog {
            family: self.family,
            options,
        })
    }
}
