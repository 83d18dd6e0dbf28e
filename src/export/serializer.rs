//! Model persistence
//!
//! A fitted workflow is stored together with descriptive metadata, either as
//! a checksummed bincode envelope or as pretty-printed JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Result, VelotuneError};
use crate::optimizer::ParameterValue;
use crate::training::{FittedWorkflow, Metric, ModelSpec, ParamSlot};

/// Serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerializationFormat {
    /// Binary format using bincode
    #[default]
    Binary,
    /// JSON format (portable, human-readable)
    Json,
}

impl SerializationFormat {
    /// `Json` for a `.json` extension, `Binary` otherwise
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SerializationFormat::Json,
            _ => SerializationFormat::Binary,
        }
    }
}

/// Descriptive metadata stored next to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub family: String,
    pub engine: String,
    pub outcome: String,
    pub predictors: Vec<String>,
    /// Input columns that must be read as categorical at prediction time
    pub nominal_columns: Vec<String>,
    pub hyperparameters: Vec<(String, ParameterValue)>,
    /// Held-out metrics recorded at fit time
    pub metrics: Vec<(Metric, f64)>,
    pub crate_version: String,
}

impl ModelMetadata {
    /// Metadata describing `workflow`
    pub fn for_workflow(name: impl Into<String>, workflow: &FittedWorkflow) -> Self {
        let spec: &ModelSpec = workflow.spec();
        let hyperparameters = spec
            .params()
            .iter()
            .filter_map(|(n, slot)| match slot {
                ParamSlot::Fixed(v) => Some((n.clone(), *v)),
                ParamSlot::Tune => None,
            })
            .collect();

        Self {
            name: name.into(),
            created_at: Utc::now(),
            family: spec.family().to_string(),
            engine: format!("{:?}", spec.engine()).to_lowercase(),
            outcome: workflow.outcome().to_string(),
            predictors: workflow.prepared().predictors().to_vec(),
            nominal_columns: Vec::new(),
            hyperparameters,
            metrics: Vec::new(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_metrics(mut self, metrics: Vec<(Metric, f64)>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_nominal_columns(mut self, columns: Vec<String>) -> Self {
        self.nominal_columns = columns;
        self
    }
}

/// Metadata plus fitted workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub metadata: ModelMetadata,
    pub workflow: FittedWorkflow,
}

impl ModelArtifact {
    pub fn new(name: impl Into<String>, workflow: FittedWorkflow) -> Self {
        Self {
            metadata: ModelMetadata::for_workflow(name, &workflow),
            workflow,
        }
    }

    pub fn with_metrics(mut self, metrics: Vec<(Metric, f64)>) -> Self {
        self.metadata = self.metadata.with_metrics(metrics);
        self
    }

    pub fn with_nominal_columns(mut self, columns: Vec<String>) -> Self {
        self.metadata = self.metadata.with_nominal_columns(columns);
        self
    }
}

/// Binary envelope around the bincode-encoded artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    magic: [u8; 4],
    format_version: u32,
    payload: Vec<u8>,
    checksum: u64,
}

impl Envelope {
    const MAGIC: [u8; 4] = *b"VTUN";
    const VERSION: u32 = 1;

    fn new(payload: Vec<u8>) -> Self {
        let checksum = fnv1a(&payload);
        Self {
            magic: Self::MAGIC,
            format_version: Self::VERSION,
            payload,
            checksum,
        }
    }

    fn verify(&self) -> Result<()> {
        if self.magic != Self::MAGIC {
            return Err(VelotuneError::SerializationError(
                "not a velotune model file".to_string(),
            ));
        }
        if self.format_version != Self::VERSION {
            return Err(VelotuneError::SerializationError(format!(
                "unsupported model format version {}",
                self.format_version
            )));
        }
        if fnv1a(&self.payload) != self.checksum {
            return Err(VelotuneError::SerializationError(
                "checksum verification failed - file may be corrupted".to_string(),
            ));
        }
        Ok(())
    }
}

fn fnv1a(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 14695981039346656037;
    const FNV_PRIME: u64 = 1099511628211;

    data.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ *byte as u64).wrapping_mul(FNV_PRIME)
    })
}

/// Saves and loads [`ModelArtifact`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelSerializer {
    format: SerializationFormat,
}

impl ModelSerializer {
    pub fn new(format: SerializationFormat) -> Self {
        Self { format }
    }

    /// Pick the format from the file extension
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        Self::new(SerializationFormat::from_path(path))
    }

    pub fn format(&self) -> SerializationFormat {
        self.format
    }

    pub fn to_bytes(&self, artifact: &ModelArtifact) -> Result<Vec<u8>> {
        match self.format {
            SerializationFormat::Binary => {
                let envelope = Envelope::new(bincode::serialize(artifact)?);
                Ok(bincode::serialize(&envelope)?)
            }
            SerializationFormat::Json => Ok(serde_json::to_vec_pretty(artifact)?),
        }
    }

    pub fn from_bytes(&self, bytes: &[u8]) -> Result<ModelArtifact> {
        match self.format {
            SerializationFormat::Binary => {
                let envelope: Envelope = bincode::deserialize(bytes)?;
                envelope.verify()?;
                Ok(bincode::deserialize(&envelope.payload)?)
            }
            SerializationFormat::Json => Ok(serde_json::from_slice(bytes)?),
        }
    }

    /// Save to file
    pub fn save(&self, artifact: &ModelArtifact, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes(artifact)?;

        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;

        tracing::info!(
            path = %path.display(),
            format = ?self.format,
            bytes = bytes.len(),
            "Saved model"
        );
        Ok(())
    }

    /// Load from file
    pub fn load(&self, path: impl AsRef<Path>) -> Result<ModelArtifact> {
        let path = path.as_ref();
        let mut bytes = Vec::new();
        BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;

        let artifact = self.from_bytes(&bytes)?;
        tracing::info!(
            path = %path.display(),
            model = %artifact.metadata.name,
            family = %artifact.metadata.family,
            "Loaded model"
        );
        Ok(artifact)
    }
}
