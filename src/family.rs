//! Job families supported by the optimization service.
//!
//! The three families share one protocol shape and differ only in the values
//! held by their [`FamilyDescriptor`]: the URL segment, whether a finished job
//! yields a downloadable artifact, and the default credit price.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// One of the three fixed kinds of remote optimization job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobFamily {
    Convert,
    Benchmark,
    Quantize,
}

/// Static description of a job family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyDescriptor {
    pub family: JobFamily,
    /// Path segment used in every endpoint of the family (`/{segment}/tasks`).
    pub segment: &'static str,
    /// Whether a finished job has an artifact to download.
    pub produces_artifact: bool,
    /// Credits charged per job when no price table overrides it.
    pub default_price: i64,
}

const CONVERT: FamilyDescriptor = FamilyDescriptor {
    family: JobFamily::Convert,
    segment: "convert",
    produces_artifact: true,
    default_price: 50,
};

const BENCHMARK: FamilyDescriptor = FamilyDescriptor {
    family: JobFamily::Benchmark,
    segment: "benchmark",
    produces_artifact: false,
    default_price: 25,
};

const QUANTIZE: FamilyDescriptor = FamilyDescriptor {
    family: JobFamily::Quantize,
    segment: "quantize",
    produces_artifact: true,
    default_price: 50,
};

impl JobFamily {
    pub const ALL: [JobFamily; 3] = [JobFamily::Convert, JobFamily::Benchmark, JobFamily::Quantize];

    pub fn descriptor(self) -> &'static FamilyDescriptor {
        match self {
            JobFamily::Convert => &CONVERT,
            JobFamily::Benchmark => &BENCHMARK,
            JobFamily::Quantize => &QUANTIZE,
        }
    }

    pub fn path_segment(self) -> &'static str {
        self.descriptor().segment
    }
}

impl fmt::Display for JobFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFamily::Convert => write!(f, "CONVERT"),
            JobFamily::Benchmark => write!(f, "BENCHMARK"),
            JobFamily::Quantize => write!(f, "QUANTIZE"),
        }
    }
}

/// Framework of the model file being uploaded, declared to the validate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFramework {
    Onnx,
    TensorflowKeras,
    #[serde(rename = "saved_model")]
    Tensorflow,
}

impl SourceFramework {
    /// Infers the framework from the model path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "onnx" => Some(SourceFramework::Onnx),
            "h5" | "keras" => Some(SourceFramework::TensorflowKeras),
            "pb" | "zip" => Some(SourceFramework::Tensorflow),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceFramework::Onnx => "onnx",
            SourceFramework::TensorflowKeras => "tensorflow_keras",
            SourceFramework::Tensorflow => "saved_model",
        }
    }
}

impl fmt::Display for SourceFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_match_family() {
        for family in JobFamily::ALL {
            assert_eq!(family.descriptor().family, family);
        }
    }

    #[test]
    fn default_prices() {
        assert_eq!(JobFamily::Convert.descriptor().default_price, 50);
        assert_eq!(JobFamily::Benchmark.descriptor().default_price, 25);
        assert_eq!(JobFamily::Quantize.descriptor().default_price, 50);
    }

    #[test]
    fn only_benchmark_has_no_artifact() {
        assert!(JobFamily::Convert.descriptor().produces_artifact);
        assert!(!JobFamily::Benchmark.descriptor().produces_artifact);
        assert!(JobFamily::Quantize.descriptor().produces_artifact);
    }

    #[test]
    fn family_serializes_screaming() {
        let json = serde_json::to_string(&JobFamily::Quantize).unwrap();
        assert_eq!(json, r#""QUANTIZE""#);
        assert_eq!(JobFamily::Benchmark.path_segment(), "benchmark");
    }

    #[test]
    fn source_framework_from_extension() {
        assert_eq!(SourceFramework::from_path(Path::new("m/model.onnx")), Some(SourceFramework::Onnx));
        assert_eq!(SourceFramework::from_path(Path::new("model.H5")), Some(SourceFramework::TensorflowKeras));
        assert_eq!(SourceFramework::from_path(Path::new("model.pt")), None);
        assert_eq!(SourceFramework::from_path(Path::new("model")), None);
        assert_eq!(SourceFramework::Tensorflow.to_string(), "saved_model");
    }
}
