use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use jsonschema::JSONSchema;
use log::{info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::request::job::JobRequest;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("can't read job manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("job manifest is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("job manifest fails validation: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("can't deserialise job manifest: {0}")]
    Deserialise(#[source] serde_json::Error),
}

pub struct Manifest {
    pub path: PathBuf,
    pub compiled_schema: JSONSchema,
}

impl Manifest {
    pub fn new(path: &Path, compiled_schema: JSONSchema) -> Manifest {
        Manifest { path: path.to_path_buf(), compiled_schema }
    }

    pub fn read(&self) -> Result<JobRequest, ManifestError> {
        let json = self.read_file()?;
        self.parse(&json)
    }

    /// Validate then deserialise manifest text
    pub fn parse(&self, json_string: &str) -> Result<JobRequest, ManifestError> {
        let json: Value = parse_untyped_json(json_string)?;

        match self.validate(&json) {
            Ok(_) => {
                info!("Manifest is valid");
                parse_json(json)
            }
            Err(err) => {
                warn!("Manifest fails validation");
                Err(err)
            }
        }
    }

    fn validate(&self, json: &Value) -> Result<(), ManifestError> {
        info!("Validating manifest against JSON schema");
        self.compiled_schema.validate(json).map_err(|errors| {
            let reasons = errors
                .map(|err| format!("{} (at '{}')", err, err.instance_path))
                .collect();
            ManifestError::Validation(reasons)
        })
    }

    fn read_file(&self) -> Result<String, ManifestError> {
        let path: &Path = self.path.as_path();
        info!("Reading manifest at {}", path.display());
        fs::read_to_string(path).map_err(|source| {
            warn!("Can't read job manifest at path {}: {}", path.display(), source);
            ManifestError::Read { path: path.to_path_buf(), source }
        })
    }
}

fn parse_json(value: Value) -> Result<JobRequest, ManifestError> {
    info!("Deserialising valid JSON into typed job request");
    serde_json::from_value::<JobRequest>(value).map_err(ManifestError::Deserialise)
}

fn parse_untyped_json(json_string: &str) -> Result<Value, ManifestError> {
    serde_json::from_str::<Value>(json_string).map_err(ManifestError::Decode)
}
