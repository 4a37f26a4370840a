//! Loading an action plan from start to end
//!
//! 1. parse the plan file
//! 2. assign its `variables` ([VariableRegistry::bulk_import])
//! 3. create variables from its optional `parameters` ([VariableRegistry::derive_from_mapping])
//! 4. set up launcher and SLURM node variables
//! 5. compile every action of its `action_plan`
//!
//! Every step depends on the state left behind by the previous one.
use crate::action_plan::{ActionPlan, ActionPlanCompiler, CompileError, CompiledPlan};
use crate::deployment::{DeploymentError, ServicesDeployment};
use crate::environment::{Environment, ProcessEnvironment};
use crate::value::{ConfigValue, Dictionary};
use crate::variables::{ExecutionEnvironment, ImportReport, VariableError, VariableRegistry};
use crate::xml_parser::{ParseError, ParseOptions, StructuredXmlParser};
use std::path::{Path, PathBuf};

pub const VARIABLES: &str = "variables";
pub const PARAMETERS: &str = "parameters";
pub const ACTION_PLAN: &str = "action_plan";

#[derive(Debug)]
pub struct Workflow {
    pub registry: VariableRegistry,
    pub execution_environment: ExecutionEnvironment,
    pub import_report: ImportReport,
    pub plan: ActionPlan,
    pub compiled: CompiledPlan,
    parser: StructuredXmlParser,
}

impl Workflow {
    pub fn load(plan_path: &Path, options: ParseOptions) -> Result<Self, WorkflowError> {
        Self::load_with_environment(plan_path, options, ProcessEnvironment)
    }

    pub fn load_with_environment(
        plan_path: &Path,
        options: ParseOptions,
        environment: impl Environment + 'static,
    ) -> Result<Self, WorkflowError> {
        let parser = StructuredXmlParser::new(options);
        let document = parser.parse(plan_path)?;
        let section = |name: &'static str| {
            document
                .get(name)
                .and_then(ConfigValue::as_dictionary)
                .ok_or_else(|| WorkflowError::MissingSection {
                    file: plan_path.to_path_buf(),
                    section: name,
                })
        };

        let mut registry = VariableRegistry::with_environment(environment);

        let import_report = registry.bulk_import(section(VARIABLES)?)?;
        for key in &import_report.skipped {
            tracing::warn!(file=%plan_path.display(), %key, "variable was not imported");
        }

        if let Some(parameters) = document.get(PARAMETERS).and_then(ConfigValue::as_dictionary) {
            registry.derive_from_mapping(parameters)?;
        }

        let execution_environment = registry.create_cluster_runtime_variables()?;
        tracing::info!(
            ?execution_environment,
            launcher = execution_environment.launcher(),
            "run time variables created"
        );

        let plan = ActionPlan::from_dictionary(plan_path, section(ACTION_PLAN)?)?;
        let compiled = ActionPlanCompiler::new(&registry, parser.clone()).compile(&plan)?;
        tracing::info!(
            file=%plan_path.display(),
            actions = compiled.actions.len(),
            "action plan compiled"
        );

        Ok(Self {
            registry,
            execution_environment,
            import_report,
            plan,
            compiled,
            parser,
        })
    }

    /// Read a services deployment file against this workflow's variables
    pub fn services_deployment(&self, path: &Path) -> Result<ServicesDeployment, WorkflowError> {
        let document: Dictionary = self.parser.parse(path)?;
        Ok(ServicesDeployment::from_dictionary(path, &document, &self.registry)?)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("{}: missing <{section}> section", .file.display())]
    MissingSection { file: PathBuf, section: &'static str },
    #[error(transparent)]
    Variable(#[from] VariableError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::variables::{CO_SIM_LAUNCHER, CO_SIM_RESULTS_PATH};
    use pretty_assertions::assert_eq;

    const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

    fn fixtures_environment(name: &str) -> Option<String> {
        match name {
            "COSIM_FIXTURES" => Some(FIXTURES.to_string()),
            _ => None,
        }
    }

    fn fixture(name: &str) -> PathBuf {
        Path::new(FIXTURES).join(name)
    }

    #[test]
    fn plan_is_loaded_and_compiled() {
        let workflow = Workflow::load_with_environment(
            &fixture("plan.xml"),
            ParseOptions::default(),
            fixtures_environment,
        )
        .unwrap();

        assert_eq!(workflow.execution_environment, ExecutionEnvironment::Local);
        assert_eq!(workflow.import_report.skipped, vec!["CO_SIM_VERSION".to_string()]);
        assert_eq!(
            workflow.registry.get(CO_SIM_LAUNCHER),
            Ok(&ConfigValue::from("mpirun"))
        );
        assert_eq!(
            workflow.registry.get("CO_SIM_VISUALIZATION_PATH"),
            Ok(&ConfigValue::from("/out/visualizer"))
        );

        assert_eq!(workflow.plan.actions.len(), 3);
        assert_eq!(
            workflow.compiled.actions.keys().collect::<Vec<_>>(),
            vec!["action_000", "action_004"]
        );
        assert_eq!(
            workflow.compiled.argument_vectors()["action_004"],
            [
                "mpirun",
                "-n",
                "1",
                "python3",
                "-u",
                "/routines/tvb_simulation.py",
                "--results=/out/tvb",
            ]
            .map(String::from)
            .as_slice()
        );
    }

    #[test]
    fn results_path_from_plan() {
        let workflow = Workflow::load_with_environment(
            &fixture("plan.xml"),
            ParseOptions::default(),
            fixtures_environment,
        )
        .unwrap();

        assert_eq!(
            workflow.registry.get(CO_SIM_RESULTS_PATH),
            Ok(&ConfigValue::from("/out"))
        );
    }

    #[test]
    fn failing_action_aborts_plan() {
        let error = Workflow::load_with_environment(
            &fixture("plan_missing_performer.xml"),
            ParseOptions::default(),
            fixtures_environment,
        )
        .expect_err("must fail");

        match error {
            WorkflowError::Compile(error) => assert_eq!(error.action_id, "action_002"),
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn unset_placeholder_fails_import() {
        let error = Workflow::load_with_environment(
            &fixture("plan.xml"),
            ParseOptions::default(),
            |_: &str| -> Option<String> { None },
        )
        .expect_err("must fail");

        assert!(matches!(
            error,
            WorkflowError::Variable(VariableError::UnresolvedVariable { token, .. })
                if token == "${COSIM_FIXTURES}"
        ));
    }

    #[test]
    fn services_deployment_needs_cluster_nodes() {
        let workflow = Workflow::load_with_environment(
            &fixture("plan.xml"),
            ParseOptions::default(),
            fixtures_environment,
        )
        .unwrap();

        let error = workflow
            .services_deployment(&fixture("services_deployment.xml"))
            .expect_err("local run has no nodes");
        assert!(matches!(error, WorkflowError::Deployment(DeploymentError::Variable { .. })));
    }

    #[test]
    fn plan_without_variables_section() {
        let error = Workflow::load_with_environment(
            &fixture("communication_settings.xml"),
            ParseOptions::default(),
            fixtures_environment,
        )
        .expect_err("must fail");

        assert!(matches!(
            error,
            WorkflowError::MissingSection { section: VARIABLES, .. }
        ));
    }
}
