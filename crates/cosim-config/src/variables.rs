//! Registry of `CO_SIM_*` run time variables
//!
//! The registry is the single source of truth for variable values during one run. It starts out
//! with the [RECOGNIZED] names (all unset, except [CO_SIM_EMPTY]) and grows only through
//! [VariableRegistry::derive_from_mapping], [VariableRegistry::define] and the cluster run time
//! variables. [VariableRegistry::set] and [VariableRegistry::bulk_import] never create names.
use crate::cluster::{self, ClusterError};
use crate::environment::{Environment, ProcessEnvironment};
use crate::resolver::ReferenceResolver;
use crate::value::{ConfigValue, Dictionary};

pub const CO_SIM_ACTIONS_PATH: &str = "CO_SIM_ACTIONS_PATH";
pub const CO_SIM_EMPTY: &str = "CO_SIM_EMPTY";
pub const CO_SIM_EXECUTION_ENVIRONMENT: &str = "CO_SIM_EXECUTION_ENVIRONMENT";
pub const CO_SIM_LAUNCHER: &str = "CO_SIM_LAUNCHER";
pub const CO_SIM_MODULES_ROOT_PATH: &str = "CO_SIM_MODULES_ROOT_PATH";
pub const CO_SIM_PARAMETERS_PATH: &str = "CO_SIM_PARAMETERS_PATH";
pub const CO_SIM_RESULTS_PATH: &str = "CO_SIM_RESULTS_PATH";
pub const CO_SIM_ROOT_PATH: &str = "CO_SIM_ROOT_PATH";
pub const CO_SIM_ROUTINES_PATH: &str = "CO_SIM_ROUTINES_PATH";
pub const CO_SIM_USE_CASE_ROOT_PATH: &str = "CO_SIM_USE_CASE_ROOT_PATH";
pub const CO_SIM_COMMUNICATION_SETTINGS_PATH: &str = "CO_SIM_COMMUNICATION_SETTINGS_PATH";
pub const CO_SIM_COMMUNICATION_SETTINGS_XML: &str = "CO_SIM_COMMUNICATION_SETTINGS_XML";
pub const CO_SIM_SLURM_NNODES: &str = "CO_SIM_SLURM_NNODES";

/// Names every registry knows about from the start
pub const RECOGNIZED: &[(&str, &str)] = &[
    (CO_SIM_ACTIONS_PATH, "path to the action xml files"),
    (CO_SIM_EMPTY, "empty string, marks an argument to be dropped"),
    (CO_SIM_EXECUTION_ENVIRONMENT, "execution environment <LOCAL|CLUSTER>"),
    (CO_SIM_LAUNCHER, "launcher binary, mpirun or srun"),
    (CO_SIM_MODULES_ROOT_PATH, "location of the co-simulation module repositories"),
    (CO_SIM_PARAMETERS_PATH, "location of the parameter files"),
    (CO_SIM_RESULTS_PATH, "results directory"),
    (CO_SIM_ROOT_PATH, "base path other locations refer to"),
    (CO_SIM_ROUTINES_PATH, "location of the routines source code"),
    (CO_SIM_USE_CASE_ROOT_PATH, "use case root directory"),
    (CO_SIM_COMMUNICATION_SETTINGS_PATH, "location of the communication settings"),
    (CO_SIM_COMMUNICATION_SETTINGS_XML, "communication settings xml file"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub description: String,
    pub value: ConfigValue,
}

/// Execution environment selected by [CO_SIM_EXECUTION_ENVIRONMENT]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionEnvironment {
    Local,
    Cluster,
}

impl ExecutionEnvironment {
    pub fn launcher(&self) -> &'static str {
        match self {
            ExecutionEnvironment::Local => "mpirun",
            ExecutionEnvironment::Cluster => "srun",
        }
    }
}

impl std::str::FromStr for ExecutionEnvironment {
    type Err = VariableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOCAL" => Ok(ExecutionEnvironment::Local),
            "CLUSTER" => Ok(ExecutionEnvironment::Cluster),
            _ => Err(VariableError::InvalidEnvironment(s.to_string())),
        }
    }
}

/// Keys [VariableRegistry::bulk_import] did not accept
#[derive(Debug, Default, PartialEq)]
pub struct ImportReport {
    pub skipped: Vec<String>,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

pub struct VariableRegistry {
    variables: indexmap::IndexMap<String, Variable>,
    environment: Box<dyn Environment>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::with_environment(ProcessEnvironment)
    }

    /// Registry that reads `${...}` placeholders and SLURM variables from `environment`
    pub fn with_environment(environment: impl Environment + 'static) -> Self {
        let mut variables: indexmap::IndexMap<String, Variable> = Default::default();
        for (name, description) in RECOGNIZED {
            let value = if *name == CO_SIM_EMPTY {
                ConfigValue::from("")
            } else {
                ConfigValue::Null
            };

            variables.insert(
                name.to_string(),
                Variable {
                    name: name.to_string(),
                    description: description.to_string(),
                    value,
                },
            );
        }

        Self {
            variables,
            environment: Box::new(environment),
        }
    }

    pub fn environment(&self) -> &dyn Environment {
        self.environment.as_ref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    pub fn get(&self, name: &str) -> Result<&ConfigValue, VariableError> {
        self.lookup(name)
            .ok_or_else(|| VariableError::UnknownVariable(name.to_string()))
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&ConfigValue> {
        self.variables.get(name).map(|variable| &variable.value)
    }

    /// Value of the empty-argument marker, see [CO_SIM_EMPTY]
    pub fn empty_sentinel(&self) -> String {
        self.lookup(CO_SIM_EMPTY)
            .and_then(ConfigValue::to_token)
            .unwrap_or_default()
    }

    /// Assign a value to an already known variable, the value is stored as it is
    pub fn set(&mut self, name: &str, value: impl Into<ConfigValue>) -> Result<(), VariableError> {
        let Some(variable) = self.variables.get_mut(name) else {
            tracing::error!(%name, "variable has not been declared");
            return Err(VariableError::UnknownVariable(name.to_string()));
        };

        variable.value = value.into();
        Ok(())
    }

    /// Register a new variable, or overwrite an existing one
    pub fn define(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        value: impl Into<ConfigValue>,
    ) {
        let name = name.into();
        let variable = Variable {
            name: name.clone(),
            description: description.into(),
            value: value.into(),
        };

        tracing::debug!(name=%variable.name, value=%variable.value, "variable defined");
        self.variables.insert(name, variable);
    }

    /// Assign values to known variables in declaration order
    ///
    /// References in each incoming value are resolved against the registry as it is at that
    /// moment. Unknown keys are reported and skipped.
    pub fn bulk_import(&mut self, mapping: &Dictionary) -> Result<ImportReport, VariableError> {
        let mut report = ImportReport::default();

        for (key, value) in mapping {
            if !self.contains(key) {
                tracing::warn!(%key, "not a recognized co-simulation variable, skipped");
                report.skipped.push(key.clone());
                continue;
            }

            let resolved = ReferenceResolver::new(self).resolve_value(value)?;
            self.set(key, resolved)?;
        }

        Ok(report)
    }

    /// Like [VariableRegistry::bulk_import], but unknown keys become new variables
    pub fn derive_from_mapping(&mut self, mapping: &Dictionary) -> Result<(), VariableError> {
        for (key, value) in mapping {
            let resolved = ReferenceResolver::new(self).resolve_value(value)?;
            match self.variables.get_mut(key) {
                Some(variable) => variable.value = resolved,
                None => self.define(key.clone(), "created on run time", resolved),
            }
        }

        Ok(())
    }

    /// Resolve references in `text` against the current state
    pub fn resolve(&self, text: &str) -> Result<String, VariableError> {
        ReferenceResolver::new(self).resolve(text)
    }

    /// Set [CO_SIM_LAUNCHER] according to [CO_SIM_EXECUTION_ENVIRONMENT]
    ///
    /// On a cluster the SLURM allocation is read from the environment and one
    /// `CO_SIM_SLURM_NODE_###` variable is created per allocated node.
    pub fn create_cluster_runtime_variables(
        &mut self,
    ) -> Result<ExecutionEnvironment, VariableError> {
        let execution_environment = match self.get(CO_SIM_EXECUTION_ENVIRONMENT)? {
            ConfigValue::String(value) => value.parse::<ExecutionEnvironment>()?,
            other => {
                tracing::error!(value=%other, "execution environment must be LOCAL or CLUSTER");
                return Err(VariableError::InvalidEnvironment(other.to_string()));
            }
        };

        self.define(
            CO_SIM_LAUNCHER,
            "launcher created on run time",
            execution_environment.launcher(),
        );

        if execution_environment == ExecutionEnvironment::Cluster {
            self.create_slurm_variables()?;
        }

        Ok(execution_environment)
    }

    fn create_slurm_variables(&mut self) -> Result<(), VariableError> {
        let node_count = self
            .environment
            .var("SLURM_NNODES")
            .ok_or(ClusterError::NodeCountNotSet)?;
        let node_count: usize = node_count
            .trim()
            .parse()
            .map_err(|_| ClusterError::InvalidNodeCount(node_count.clone()))?;
        let node_list = self
            .environment
            .var("SLURM_NODELIST")
            .ok_or(ClusterError::NodeListNotSet)?;

        let nodes = cluster::expand(&node_list, node_count)?;
        tracing::info!(%node_list, node_count, "SLURM allocation found");

        self.define(CO_SIM_SLURM_NNODES, "SLURM_NNODES", node_count as i64);
        for node in nodes {
            let description = format!("SLURM compute node hostname {}", node.variable);
            self.define(node.variable, description, node.hostname);
        }

        Ok(())
    }
}

impl Default for VariableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VariableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableRegistry")
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum VariableError {
    #[error("{0} is not a declared co-simulation variable")]
    UnknownVariable(String),
    #[error("{token} is referenced in {text:?} but has no value")]
    UnresolvedVariable { token: String, text: String },
    #[error("CO_SIM_EXECUTION_ENVIRONMENT is {0:?}, expected <LOCAL|CLUSTER>")]
    InvalidEnvironment(String),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}
