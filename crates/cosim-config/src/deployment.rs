//! Co-simulation services deployment on HPC nodes
//!
//! The deployment document carries the `srun` command line used to start the services and
//! per-service settings that refer to allocated nodes, e.g. `{CO_SIM_SLURM_NODE_001}`.
use crate::resolver::ReferenceResolver;
use crate::value::{ConfigValue, Dictionary};
use crate::variables::{VariableError, VariableRegistry};
use std::path::{Path, PathBuf};

pub const SRUN_OPTIONS: &str = "srun_options";
pub const SETTINGS: &str = "settings";

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ServicesDeployment {
    /// `srun` and its options, e.g. `["srun", "--exact", "--nodes=1"]`
    pub srun_options: Vec<String>,
    /// Per-service settings with node references replaced by hostnames
    pub settings: Dictionary,
}

impl ServicesDeployment {
    pub fn from_dictionary(
        source: &Path,
        document: &Dictionary,
        registry: &VariableRegistry,
    ) -> Result<Self, DeploymentError> {
        let missing = |section| DeploymentError::MissingSection {
            file: source.to_path_buf(),
            section,
        };

        let srun_options = document
            .get(SRUN_OPTIONS)
            .and_then(ConfigValue::as_str)
            .ok_or_else(|| missing(SRUN_OPTIONS))?
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let settings = document
            .get(SETTINGS)
            .and_then(ConfigValue::as_dictionary)
            .ok_or_else(|| missing(SETTINGS))?;

        let resolver = ReferenceResolver::new(registry);
        let settings = settings
            .iter()
            .map(|(key, value)| {
                resolver
                    .resolve_value(value)
                    .map(|resolved| (key.clone(), resolved))
                    .map_err(|error| DeploymentError::Variable {
                        file: source.to_path_buf(),
                        key: key.clone(),
                        source: error,
                    })
            })
            .collect::<Result<Dictionary, DeploymentError>>()?;

        Ok(Self {
            srun_options,
            settings,
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DeploymentError {
    #[error("{}: missing <{section}> section", .file.display())]
    MissingSection { file: PathBuf, section: &'static str },
    #[error("{}: settings entry <{key}> could not be resolved", .file.display())]
    Variable {
        file: PathBuf,
        key: String,
        source: VariableError,
    },
}
