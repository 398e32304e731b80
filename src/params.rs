//! Family-specific job parameters and their pre-flight validation.
//!
//! Validation runs before any record is written or any network call is made.
//! The start payload is built only after the service has returned canonical
//! model metadata, which fills in whatever the caller left unspecified.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::family::JobFamily;
use crate::remote::{InputLayer, ModelMetadata};

/// Target frameworks a conversion can produce.
pub const TARGET_FRAMEWORKS: &[&str] = &["onnx", "tensorrt", "tensorflow_lite", "openvino", "drpai"];

const CONVERT_PRECISIONS: &[&str] = &["FP32", "FP16", "INT8"];
const QUANTIZATION_MODES: &[&str] = &["plain_quantization", "custom_quantization"];
const SIMILARITY_METRICS: &[&str] = &["SNR"];

/// Parameters of a conversion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertParams {
    pub framework: String,
    pub device_name: String,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    #[serde(default)]
    pub software_version: Option<String>,
    #[serde(default)]
    pub input_layer: Option<InputLayer>,
    #[serde(default)]
    pub dataset_path: Option<String>,
}

/// Parameters of a benchmark job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkParams {
    pub device_name: String,
    #[serde(default)]
    pub software_version: Option<String>,
    #[serde(default)]
    pub hardware_type: Option<String>,
}

/// Parameters of a quantization job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizeParams {
    #[serde(default = "default_quantization_mode")]
    pub quantization_mode: String,
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default = "default_bitwidth")]
    pub weight_precision: String,
    #[serde(default = "default_bitwidth")]
    pub activation_precision: String,
    #[serde(default)]
    pub input_layers: Option<Vec<InputLayer>>,
    #[serde(default)]
    pub dataset_path: Option<String>,
}

fn default_data_type() -> String {
    "FP16".to_string()
}

fn default_quantization_mode() -> String {
    "plain_quantization".to_string()
}

fn default_metric() -> String {
    "SNR".to_string()
}

fn default_bitwidth() -> String {
    "int8".to_string()
}

impl Default for QuantizeParams {
    fn default() -> Self {
        Self {
            quantization_mode: default_quantization_mode(),
            metric: default_metric(),
            threshold: 0.0,
            weight_precision: default_bitwidth(),
            activation_precision: default_bitwidth(),
            input_layers: None,
            dataset_path: None,
        }
    }
}

/// Parameters for one job, tagged by family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobParams {
    Convert(ConvertParams),
    Benchmark(BenchmarkParams),
    Quantize(QuantizeParams),
}

/// Devices whose toolchain is versioned (JetPack) and so need an explicit
/// software version.
pub fn requires_software_version(device_name: &str) -> bool {
    device_name.to_ascii_lowercase().starts_with("jetson")
}

impl JobParams {
    pub fn family(&self) -> JobFamily {
        match self {
            JobParams::Convert(_) => JobFamily::Convert,
            JobParams::Benchmark(_) => JobFamily::Benchmark,
            JobParams::Quantize(_) => JobFamily::Quantize,
        }
    }

    /// Checks the parameters without touching the network.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            JobParams::Convert(p) => {
                if !TARGET_FRAMEWORKS.contains(&p.framework.as_str()) {
                    return Err(format!(
                        "unsupported target framework '{}', expected one of {TARGET_FRAMEWORKS:?}",
                        p.framework
                    ));
                }
                validate_device(&p.device_name, p.software_version.as_deref())?;
                if !CONVERT_PRECISIONS.contains(&p.data_type.as_str()) {
                    return Err(format!(
                        "unsupported data type '{}', expected one of {CONVERT_PRECISIONS:?}",
                        p.data_type
                    ));
                }
                if p.framework == "tensorrt" && p.software_version.is_none() {
                    return Err("tensorrt conversion requires a software version".to_string());
                }
                Ok(())
            }
            JobParams::Benchmark(p) => validate_device(&p.device_name, p.software_version.as_deref()),
            JobParams::Quantize(p) => {
                if !QUANTIZATION_MODES.contains(&p.quantization_mode.as_str()) {
                    return Err(format!("unsupported quantization mode '{}'", p.quantization_mode));
                }
                if !SIMILARITY_METRICS.contains(&p.metric.as_str()) {
                    return Err(format!("unsupported similarity metric '{}'", p.metric));
                }
                if !p.threshold.is_finite() || p.threshold < 0.0 {
                    return Err(format!("threshold must be a non-negative number, got {}", p.threshold));
                }
                validate_bitwidth("weight", &p.weight_precision)?;
                validate_bitwidth("activation", &p.activation_precision)
            }
        }
    }

    /// File extension of the artifact a finished job produces, if any.
    pub fn output_extension(&self) -> Option<&'static str> {
        match self {
            JobParams::Convert(p) => Some(match p.framework.as_str() {
                "onnx" => "onnx",
                "tensorrt" => "trt",
                "tensorflow_lite" => "tflite",
                _ => "zip",
            }),
            JobParams::Benchmark(_) => None,
            JobParams::Quantize(_) => Some("zip"),
        }
    }

    /// Family fields of the start request. The caller's input layer wins over
    /// the one reported by validation; precision for a benchmark always comes
    /// from validation.
    pub fn start_payload(&self, metadata: &ModelMetadata) -> Value {
        let mut body = match self {
            JobParams::Convert(p) => json!({
                "target_framework": p.framework,
                "target_device_name": p.device_name,
                "data_type": p.data_type,
                "software_version": p.software_version,
                "input_layer": p.input_layer.clone().or_else(|| metadata.input_layers.first().cloned()),
                "dataset_path": p.dataset_path,
            }),
            JobParams::Benchmark(p) => json!({
                "target_device_name": p.device_name,
                "software_version": p.software_version,
                "hardware_type": p.hardware_type,
                "data_type": metadata.data_type,
                "input_layer": metadata.input_layers.first(),
            }),
            JobParams::Quantize(p) => json!({
                "quantization_mode": p.quantization_mode,
                "quantization_options": {
                    "metric": p.metric,
                    "threshold": p.threshold,
                    "weight_precision": p.weight_precision,
                    "activation_precision": p.activation_precision,
                },
                "input_layers": p.input_layers.clone().unwrap_or_else(|| metadata.input_layers.clone()),
                "dataset_path": p.dataset_path,
            }),
        };

        if let Value::Object(map) = &mut body {
            strip_nulls(map);
        }
        body
    }
}

fn validate_device(device_name: &str, software_version: Option<&str>) -> Result<(), String> {
    if device_name.trim().is_empty() {
        return Err("device name must not be empty".to_string());
    }
    if requires_software_version(device_name) && software_version.is_none_or(|v| v.trim().is_empty()) {
        return Err(format!("device '{device_name}' requires a software version"));
    }
    Ok(())
}

fn validate_bitwidth(which: &str, value: &str) -> Result<(), String> {
    if value == "float32" {
        return Ok(());
    }
    let bits = value
        .strip_prefix("int")
        .and_then(|n| n.parse::<u8>().ok())
        .ok_or_else(|| format!("invalid {which} precision '{value}'"))?;
    if (1..=31).contains(&bits) {
        Ok(())
    } else {
        Err(format!("{which} precision '{value}' is out of range int1..int31"))
    }
}

fn strip_nulls(map: &mut Map<String, Value>) {
    map.retain(|_, v| !v.is_null());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(device: &str, version: Option<&str>) -> JobParams {
        JobParams::Convert(ConvertParams {
            framework: "tensorflow_lite".into(),
            device_name: device.into(),
            data_type: "FP16".into(),
            software_version: version.map(Into::into),
            input_layer: None,
            dataset_path: None,
        })
    }

    fn metadata() -> ModelMetadata {
        ModelMetadata {
            data_type: Some("FP32".into()),
            input_layers: vec![InputLayer {
                name: "images".into(),
                batch: 1,
                channel: 3,
                dimension: vec![224, 224],
            }],
            file_size_in_mb: Some(12.5),
        }
    }

    #[test]
    fn jetson_without_version_is_rejected() {
        let err = convert("Jetson-Nano", None).validate().unwrap_err();
        assert!(err.contains("requires a software version"));
        assert!(convert("Jetson-Nano", Some("4.6")).validate().is_ok());
        assert!(convert("RaspberryPi4B", None).validate().is_ok());
    }

    #[test]
    fn unknown_framework_is_rejected() {
        let mut params = convert("RaspberryPi4B", None);
        if let JobParams::Convert(p) = &mut params {
            p.framework = "coreml".into();
        }
        assert!(params.validate().unwrap_err().contains("coreml"));
    }

    #[test]
    fn quantize_bitwidths() {
        let mut p = QuantizeParams::default();
        assert!(JobParams::Quantize(p.clone()).validate().is_ok());
        p.weight_precision = "int32".into();
        assert!(JobParams::Quantize(p.clone()).validate().is_err());
        p.weight_precision = "float32".into();
        p.activation_precision = "fp8".into();
        assert!(JobParams::Quantize(p.clone()).validate().is_err());
        p.activation_precision = "int4".into();
        p.threshold = -1.0;
        assert!(JobParams::Quantize(p).validate().is_err());
    }

    #[test]
    fn convert_payload_prefers_caller_input_layer() {
        let caller_layer = InputLayer {
            name: "input".into(),
            batch: 8,
            channel: 3,
            dimension: vec![640, 640],
        };
        let params = JobParams::Convert(ConvertParams {
            input_layer: Some(caller_layer.clone()),
            ..match convert("RaspberryPi4B", None) {
                JobParams::Convert(p) => p,
                _ => unreachable!(),
            }
        });
        let body = params.start_payload(&metadata());
        assert_eq!(body["input_layer"]["batch"], 8);
        assert!(body.get("software_version").is_none());
        assert!(body.get("dataset_path").is_none());
    }

    #[test]
    fn convert_payload_falls_back_to_reported_layer() {
        let body = convert("RaspberryPi4B", None).start_payload(&metadata());
        assert_eq!(body["input_layer"]["name"], "images");
        assert_eq!(body["target_framework"], "tensorflow_lite");
    }

    #[test]
    fn benchmark_payload_uses_reported_precision() {
        let params = JobParams::Benchmark(BenchmarkParams {
            device_name: "RaspberryPi4B".into(),
            software_version: None,
            hardware_type: Some("helium".into()),
        });
        let body = params.start_payload(&metadata());
        assert_eq!(body["data_type"], "FP32");
        assert_eq!(body["hardware_type"], "helium");
    }

    #[test]
    fn params_are_tagged_by_family() {
        let json = serde_json::to_value(JobParams::Quantize(QuantizeParams::default())).unwrap();
        assert_eq!(json["family"], "QUANTIZE");
        let back: JobParams = serde_json::from_value(json).unwrap();
        assert_eq!(back.family(), JobFamily::Quantize);
    }

    #[test]
    fn output_extensions() {
        assert_eq!(convert("RaspberryPi4B", None).output_extension(), Some("tflite"));
        assert_eq!(JobParams::Quantize(QuantizeParams::default()).output_extension(), Some("zip"));
        let bench = JobParams::Benchmark(BenchmarkParams {
            device_name: "x".into(),
            software_version: None,
            hardware_type: None,
        });
        assert_eq!(bench.output_extension(), None);
    }
}
