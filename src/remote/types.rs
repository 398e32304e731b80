//! Wire types for the optimization service's per-family endpoints.
//!
//! Responses arrive either bare or wrapped in a `{"data": ...}` envelope;
//! [`Envelope`] accepts both.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::family::JobFamily;

/// Accepts `{"data": T}` as well as a bare `T`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}

/// Shape of one model input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputLayer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub batch: i64,
    #[serde(default)]
    pub channel: i64,
    #[serde(default)]
    pub dimension: Vec<i64>,
}

/// Response of `POST /{family}/models`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub ai_model_id: String,
    pub presigned_upload_url: String,
}

/// Canonical model metadata returned by the validate call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub input_layers: Vec<InputLayer>,
    #[serde(default)]
    pub file_size_in_mb: Option<f64>,
}

/// Response of `POST /{family}/tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedJob {
    pub task_id: String,
    #[serde(default)]
    pub task_option: Option<Value>,
}

/// Status vocabulary reported by the service.
///
/// Detailed launcher states are folded into the six display states on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    #[serde(alias = "CREATED", alias = "REQUESTED", alias = "WAITING")]
    InQueue,
    #[serde(alias = "DOWNLOADING", alias = "COMPILING", alias = "RUNNING")]
    InProgress,
    #[serde(alias = "CONVERTED", alias = "ENDED")]
    Finished,
    #[serde(alias = "UPLOAD_FAILED", alias = "CANCELLED")]
    Error,
    Timeout,
    UserCancel,
}

impl RemoteStatus {
    pub const ALL: [RemoteStatus; 6] = [
        RemoteStatus::InQueue,
        RemoteStatus::InProgress,
        RemoteStatus::Finished,
        RemoteStatus::Error,
        RemoteStatus::Timeout,
        RemoteStatus::UserCancel,
    ];
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoteStatus::InQueue => "IN_QUEUE",
            RemoteStatus::InProgress => "IN_PROGRESS",
            RemoteStatus::Finished => "FINISHED",
            RemoteStatus::Error => "ERROR",
            RemoteStatus::Timeout => "TIMEOUT",
            RemoteStatus::UserCancel => "USER_CANCEL",
        };
        f.write_str(s)
    }
}

/// Response of the read-status and cancel calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    #[serde(default)]
    pub task_id: Option<String>,
    pub status: RemoteStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error_log: Option<Value>,
    #[serde(default)]
    pub output_model_id: Option<String>,
}

impl JobStatusReport {
    /// The remote error log as text, kept verbatim when it is a string.
    pub fn error_log_text(&self) -> String {
        match &self.error_log {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

/// Response of `GET /{family}/models/{task_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTarget {
    pub presigned_download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareVersionInfo {
    #[serde(default)]
    pub software_version: Option<String>,
    #[serde(default)]
    pub display_software_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_name: String,
    #[serde(default)]
    pub display_device_name: String,
    #[serde(default)]
    pub display_brand_name: String,
    #[serde(default)]
    pub software_versions: Vec<SoftwareVersionInfo>,
    #[serde(default)]
    pub data_types: Vec<String>,
    #[serde(default)]
    pub hardware_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOption {
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub display_framework: String,
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
}

/// A combination to look up in a [`JobOptionCatalog`]. `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct OptionQuery<'a> {
    pub framework: Option<&'a str>,
    pub device_name: Option<&'a str>,
    pub software_version: Option<&'a str>,
    pub precision: Option<&'a str>,
    pub hardware_type: Option<&'a str>,
}

/// Read-only listing of what a family supports. Fetched on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOptionCatalog {
    pub family: JobFamily,
    pub options: Vec<ModelOption>,
}

impl JobOptionCatalog {
    pub fn frameworks(&self) -> Vec<&str> {
        self.options.iter().map(|o| o.framework.as_str()).collect()
    }

    /// Keeps only the entries for `device_name`, narrowing their software
    /// versions to `software_version` when one is given. Frameworks left
    /// without devices are dropped.
    pub fn for_device(&self, device_name: &str, software_version: Option<&str>) -> JobOptionCatalog {
        let options = self
            .options
            .iter()
            .filter_map(|option| {
                let devices: Vec<DeviceInfo> = option
                    .devices
                    .iter()
                    .filter(|d| d.device_name == device_name)
                    .filter_map(|d| {
                        let Some(version) = software_version else {
                            return Some(d.clone());
                        };
                        let versions: Vec<SoftwareVersionInfo> = d
                            .software_versions
                            .iter()
                            .filter(|v| v.software_version.as_deref() == Some(version))
                            .cloned()
                            .collect();
                        if versions.is_empty() {
                            return None;
                        }
                        Some(DeviceInfo {
                            software_versions: versions,
                            ..d.clone()
                        })
                    })
                    .collect();
                if devices.is_empty() {
                    None
                } else {
                    Some(ModelOption {
                        devices,
                        ..option.clone()
                    })
                }
            })
            .collect();

        JobOptionCatalog {
            family: self.family,
            options,
        }
    }

    /// Whether any listed combination satisfies every field of `query`.
    pub fn supports(&self, query: &OptionQuery<'_>) -> bool {
        fn matches(wanted: Option<&str>, candidates: &[String]) -> bool {
            match wanted {
                None => true,
                Some(w) => candidates.iter().any(|c| c.eq_ignore_ascii_case(w)),
            }
        }

        self.options
            .iter()
            .filter(|o| query.framework.is_none_or(|f| o.framework.eq_ignore_ascii_case(f)))
            .flat_map(|o| o.devices.iter())
            .filter(|d| query.device_name.is_none_or(|n| d.device_name == n))
            .any(|d| {
                let version_ok = query.software_version.is_none_or(|v| {
                    d.software_versions
                        .iter()
                        .any(|sv| sv.software_version.as_deref() == Some(v))
                });
                version_ok
                    && matches(query.precision, &d.data_types)
                    && matches(query.hardware_type, &d.hardware_types)
            })
    }
}
