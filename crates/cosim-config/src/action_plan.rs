//! Action plans and their compilation into argument vectors
//!
//! An action plan lists actions by id. Each executable action points to its own xml description
//! (relative to `CO_SIM_ACTIONS_PATH`) that is laid out like this:
//!
//! ```xml
//! <co_simulation_action>
//!   <parameters datatype="DICTIONARY">
//!     <CO_SIM_SCIENTIFIC_PARAMETERS datatype="STRING">CO_SIM_PARAMETERS_PATH/nest.xml</CO_SIM_SCIENTIFIC_PARAMETERS>
//!   </parameters>
//!   <action datatype="DICTIONARY">
//!     <launcher datatype="DICTIONARY">
//!       <launcher_command datatype="STRING">CO_SIM_LAUNCHER</launcher_command>
//!       <launcher_arguments datatype="DICTIONARY">
//!         <argv_01 datatype="STRING">-n</argv_01>
//!         <argv_02 datatype="INT">4</argv_02>
//!       </launcher_arguments>
//!     </launcher>
//!     <performer datatype="DICTIONARY">...</performer>
//!     <routine datatype="DICTIONARY">...</routine>
//!   </action>
//! </co_simulation_action>
//! ```
//!
//! The argument vector is `launcher_command launcher_arguments... performer_binary
//! performer_arguments... routine_code routine_arguments...` with every token resolved through
//! [ReferenceResolver]. Tokens equal to the `CO_SIM_EMPTY` value are dropped afterwards.
use crate::resolver::ReferenceResolver;
use crate::value::{ConfigValue, Dictionary};
use crate::variables::{VariableError, VariableRegistry, CO_SIM_ACTIONS_PATH};
use crate::xml_parser::{ParseError, StructuredXmlParser};
use std::path::{Path, PathBuf};

pub const ACTION_TYPE: &str = "action_type";
pub const ACTION_XML: &str = "action_xml";
pub const CO_SIM_SCIENTIFIC_PARAMETERS: &str = "CO_SIM_SCIENTIFIC_PARAMETERS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionType {
    /// An executable action (`CO_SIM_ACTION`)
    Action,
    /// Anything else the plan contains, e.g. `CO_SIM_EVENT`
    Other(String),
}

impl From<&str> for ActionType {
    fn from(value: &str) -> Self {
        match value.to_uppercase().as_str() {
            "CO_SIM_ACTION" | "ACTION" => ActionType::Action,
            _ => ActionType::Other(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub id: String,
    pub action_type: ActionType,
    /// File name of the action description, only required for [ActionType::Action]
    pub xml_reference: Option<String>,
}

/// Actions in plan order
#[derive(Debug, Clone, Default)]
pub struct ActionPlan {
    pub source: PathBuf,
    pub actions: Vec<ActionSpec>,
}

impl ActionPlan {
    /// Decode the `action_plan` section of a plan document
    pub fn from_dictionary(source: &Path, entries: &Dictionary) -> Result<Self, CompileError> {
        let mut actions = Vec::with_capacity(entries.len());

        for (id, entry) in entries {
            let error = |kind| CompileError {
                action_id: id.clone(),
                file: source.to_path_buf(),
                kind,
            };

            let action_type = entry
                .get(ACTION_TYPE)
                .and_then(ConfigValue::as_str)
                .ok_or_else(|| {
                    error(CompileErrorKind::MissingTag {
                        section: Section::ActionPlan,
                        tag: ACTION_TYPE,
                    })
                })?;
            let action_type = ActionType::from(action_type);

            let xml_reference = entry
                .get(ACTION_XML)
                .and_then(ConfigValue::as_str)
                .map(str::to_string);
            if action_type == ActionType::Action && xml_reference.is_none() {
                return Err(error(CompileErrorKind::MissingTag {
                    section: Section::ActionPlan,
                    tag: ACTION_XML,
                }));
            }

            actions.push(ActionSpec {
                id: id.clone(),
                action_type,
                xml_reference,
            });
        }

        Ok(Self {
            source: source.to_path_buf(),
            actions,
        })
    }
}

/// Sections of an action description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    ActionPlan,
    Parameters,
    Action,
    Launcher,
    Performer,
    Routine,
}

impl Section {
    pub fn tag(&self) -> &'static str {
        match self {
            Section::ActionPlan => "action_plan",
            Section::Parameters => "parameters",
            Section::Action => "action",
            Section::Launcher => "launcher",
            Section::Performer => "performer",
            Section::Routine => "routine",
        }
    }

    /// Tags of the binary and of the argument collection of an argument vector stage
    fn stage_tags(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Section::Launcher => Some(("launcher_command", "launcher_arguments")),
            Section::Performer => Some(("performer_binary", "performer_arguments")),
            Section::Routine => Some(("routine_code", "routine_arguments")),
            _ => None,
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CompiledAction {
    pub arguments: Vec<String>,
    /// Resolved path of the scientific parameters, if the action declares one
    pub scientific_parameters: Option<String>,
}

/// Compiled actions keyed by action id, in plan order
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct CompiledPlan {
    pub actions: indexmap::IndexMap<String, CompiledAction>,
}

impl CompiledPlan {
    pub fn argument_vectors(&self) -> indexmap::IndexMap<&str, &[String]> {
        self.actions
            .iter()
            .map(|(id, action)| (id.as_str(), action.arguments.as_slice()))
            .collect()
    }

    pub fn scientific_parameters(&self) -> indexmap::IndexMap<&str, Option<&str>> {
        self.actions
            .iter()
            .map(|(id, action)| (id.as_str(), action.scientific_parameters.as_deref()))
            .collect()
    }
}

#[derive(derive_new::new)]
pub struct ActionPlanCompiler<'r> {
    registry: &'r VariableRegistry,
    parser: StructuredXmlParser,
}

impl<'r> ActionPlanCompiler<'r> {
    /// Compile every executable action of `plan`
    ///
    /// The first failing action aborts the whole compilation.
    pub fn compile(&self, plan: &ActionPlan) -> Result<CompiledPlan, CompileError> {
        let mut compiled = CompiledPlan::default();

        for spec in &plan.actions {
            if let ActionType::Other(action_type) = &spec.action_type {
                tracing::debug!(action_id=%spec.id, %action_type, "not executable, skipped");
                continue;
            }

            let action = self.compile_action(spec).inspect_err(|err| {
                tracing::error!(
                    action_id=%err.action_id,
                    file=%err.file.display(),
                    error=%err.kind,
                    "action compilation failed"
                );
            })?;
            compiled.actions.insert(spec.id.clone(), action);
        }

        Ok(compiled)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(action_id = %spec.id))]
    fn compile_action(&self, spec: &ActionSpec) -> Result<CompiledAction, CompileError> {
        let xml_reference = spec.xml_reference.as_deref().unwrap_or_default();
        let error = |file: &Path, kind: CompileErrorKind| CompileError {
            action_id: spec.id.clone(),
            file: file.to_path_buf(),
            kind,
        };

        let file = self
            .action_file(xml_reference)
            .map_err(|e| error(Path::new(xml_reference), e.into()))?;
        let document = self
            .parser
            .parse(&file)
            .map_err(|e| error(&file, e.into()))?;

        self.compile_document(&document)
            .map_err(|kind| error(&file, kind))
    }

    fn action_file(&self, xml_reference: &str) -> Result<PathBuf, VariableError> {
        let actions_path = match self.registry.get(CO_SIM_ACTIONS_PATH)? {
            ConfigValue::Null => {
                return Err(VariableError::UnresolvedVariable {
                    token: CO_SIM_ACTIONS_PATH.to_string(),
                    text: xml_reference.to_string(),
                })
            }
            value => value.to_string(),
        };

        Ok(Path::new(&actions_path).join(self.registry.resolve(xml_reference)?))
    }

    fn compile_document(&self, document: &Dictionary) -> Result<CompiledAction, CompileErrorKind> {
        let resolver = ReferenceResolver::new(self.registry);
        let scientific_parameters = self.scientific_parameters(&resolver, document)?;

        let action = document
            .get(Section::Action.tag())
            .and_then(ConfigValue::as_dictionary)
            .ok_or(CompileErrorKind::MissingSection(Section::Action))?;

        let mut arguments = vec![];
        for section in [Section::Launcher, Section::Performer, Section::Routine] {
            match action.get(section.tag()) {
                Some(stage) => self.append_stage(&resolver, section, stage, &mut arguments)?,
                None if section == Section::Routine => {
                    tracing::error!("no <{section}> section, continuing without routine");
                }
                None => return Err(CompileErrorKind::MissingSection(section)),
            }
        }

        // substitution may produce the sentinel, so this runs last
        let empty = self.registry.empty_sentinel();
        arguments.retain(|argument| *argument != empty);

        Ok(CompiledAction {
            arguments,
            scientific_parameters,
        })
    }

    fn append_stage(
        &self,
        resolver: &ReferenceResolver,
        section: Section,
        stage: &ConfigValue,
        arguments: &mut Vec<String>,
    ) -> Result<(), CompileErrorKind> {
        let Some((binary_tag, arguments_tag)) = section.stage_tags() else {
            return Ok(());
        };
        let missing = |tag| CompileErrorKind::MissingTag { section, tag };

        let binary = stage.get(binary_tag).ok_or(missing(binary_tag))?;
        arguments.push(self.token(resolver, section, binary_tag, binary)?);

        let stage_arguments = stage
            .get(arguments_tag)
            .and_then(ConfigValue::as_dictionary)
            .ok_or(missing(arguments_tag))?;
        // argv_NN keys, in declaration order
        for (key, value) in stage_arguments {
            arguments.push(self.token(resolver, section, key, value)?);
        }

        Ok(())
    }

    fn token(
        &self,
        resolver: &ReferenceResolver,
        section: Section,
        tag: &str,
        value: &ConfigValue,
    ) -> Result<String, CompileErrorKind> {
        let token = value.to_token().ok_or_else(|| CompileErrorKind::InvalidToken {
            section,
            tag: tag.to_string(),
        })?;

        resolver
            .resolve(&token)
            .map_err(|source| CompileErrorKind::Unresolved {
                section,
                tag: tag.to_string(),
                source,
            })
    }

    fn scientific_parameters(
        &self,
        resolver: &ReferenceResolver,
        document: &Dictionary,
    ) -> Result<Option<String>, CompileErrorKind> {
        let path = document
            .get(Section::Parameters.tag())
            .and_then(|parameters| parameters.get(CO_SIM_SCIENTIFIC_PARAMETERS))
            .and_then(ConfigValue::to_token);

        match path {
            Some(path) => resolver.resolve(&path).map(Some).map_err(|source| {
                CompileErrorKind::Unresolved {
                    section: Section::Parameters,
                    tag: CO_SIM_SCIENTIFIC_PARAMETERS.to_string(),
                    source,
                }
            }),
            None => {
                // not every action parametrizes a simulation model
                tracing::info!("no {CO_SIM_SCIENTIFIC_PARAMETERS} defined");
                Ok(None)
            }
        }
    }
}

/// Compilation failure of a single action, aborts the whole plan
#[derive(thiserror::Error, Debug)]
#[error("action {action_id} ({})", .file.display())]
pub struct CompileError {
    pub action_id: String,
    pub file: PathBuf,
    #[source]
    pub kind: CompileErrorKind,
}

#[derive(thiserror::Error, Debug)]
pub enum CompileErrorKind {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("missing <{0}> section")]
    MissingSection(Section),
    #[error("<{section}> has no <{tag}>")]
    MissingTag { section: Section, tag: &'static str },
    #[error("<{section}> <{tag}> is not a single value")]
    InvalidToken { section: Section, tag: String },
    #[error("<{section}> <{tag}> could not be resolved")]
    Unresolved {
        section: Section,
        tag: String,
        source: VariableError,
    },
    #[error(transparent)]
    Variable(#[from] VariableError),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::variables::{CO_SIM_LAUNCHER, CO_SIM_PARAMETERS_PATH, CO_SIM_RESULTS_PATH};
    use pretty_assertions::assert_eq;

    const ACTIONS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/actions");

    fn registry() -> VariableRegistry {
        let mut registry = VariableRegistry::with_environment(|_: &str| -> Option<String> { None });
        registry.set(CO_SIM_ACTIONS_PATH, ACTIONS).unwrap();
        registry.set(CO_SIM_LAUNCHER, "mpirun").unwrap();
        registry.set(CO_SIM_RESULTS_PATH, "/out").unwrap();
        registry.set(CO_SIM_PARAMETERS_PATH, "/params").unwrap();
        registry.set("CO_SIM_ROUTINES_PATH", "/routines").unwrap();
        registry
    }

    fn plan(actions: &[(&str, &str, Option<&str>)]) -> ActionPlan {
        ActionPlan {
            source: PathBuf::from("plan.xml"),
            actions: actions
                .iter()
                .map(|(id, action_type, xml)| ActionSpec {
                    id: id.to_string(),
                    action_type: ActionType::from(*action_type),
                    xml_reference: xml.map(str::to_string),
                })
                .collect(),
        }
    }

    fn compile(
        registry: &VariableRegistry,
        plan: &ActionPlan,
    ) -> Result<CompiledPlan, CompileError> {
        ActionPlanCompiler::new(registry, StructuredXmlParser::default()).compile(plan)
    }

    #[test]
    fn compiles_argument_vectors_in_stage_order() {
        let registry = registry();
        let compiled = compile(
            &registry,
            &plan(&[("action_000", "CO_SIM_ACTION", Some("nest_simulation.xml"))]),
        )
        .unwrap();

        let action = &compiled.actions["action_000"];
        assert_eq!(
            action.arguments,
            vec![
                "mpirun",
                "-n",
                "4",
                "--oversubscribe",
                "python3",
                "/routines/nest_simulation.py",
                "--output",
                "/out/nest",
            ]
        );
        assert_eq!(action.scientific_parameters.as_deref(), Some("/params/nest.xml"));
    }

    #[test]
    fn absent_scientific_parameters_are_not_an_error() {
        let registry = registry();
        let compiled = compile(
            &registry,
            &plan(&[("action_004", "CO_SIM_ACTION", Some("tvb_simulation.xml"))]),
        )
        .unwrap();

        assert_eq!(compiled.scientific_parameters()["action_004"], None);
    }

    #[test]
    fn missing_routine_is_tolerated() {
        let registry = registry();
        let compiled = compile(
            &registry,
            &plan(&[("action_010", "CO_SIM_ACTION", Some("binary_only.xml"))]),
        )
        .unwrap();

        assert_eq!(
            compiled.argument_vectors()["action_010"],
            ["mpirun", "-n", "1", "/opt/bin/monitor"].map(String::from).as_slice()
        );
    }

    #[test]
    fn missing_performer_fails_whole_plan() {
        let registry = registry();
        let error = compile(
            &registry,
            &plan(&[
                ("action_000", "CO_SIM_ACTION", Some("nest_simulation.xml")),
                ("action_002", "CO_SIM_ACTION", Some("missing_performer.xml")),
            ]),
        )
        .expect_err("must fail");

        assert_eq!(error.action_id, "action_002");
        assert!(error.file.ends_with("missing_performer.xml"));
        assert!(matches!(
            error.kind,
            CompileErrorKind::MissingSection(Section::Performer)
        ));
    }

    fn compile_error(xml: &str) -> CompileError {
        compile(
            &registry(),
            &plan(&[("action_006", "CO_SIM_ACTION", Some(xml))]),
        )
        .expect_err("must fail")
    }

    #[test]
    fn missing_launcher_section() {
        let error = compile_error("missing_launcher.xml");

        assert_eq!(error.action_id, "action_006");
        assert!(matches!(
            error.kind,
            CompileErrorKind::MissingSection(Section::Launcher)
        ));
    }

    #[test]
    fn missing_action_section() {
        let error = compile_error("missing_action.xml");

        assert!(error.file.ends_with("missing_action.xml"));
        assert!(matches!(
            error.kind,
            CompileErrorKind::MissingSection(Section::Action)
        ));
    }

    #[test]
    fn stage_without_arguments() {
        let error = compile_error("missing_arguments.xml");

        assert!(matches!(
            error.kind,
            CompileErrorKind::MissingTag {
                section: Section::Launcher,
                tag: "launcher_arguments"
            }
        ));
        assert_eq!(
            error.kind.to_string(),
            "<launcher> has no <launcher_arguments>"
        );
    }

    #[test]
    fn other_action_types_are_skipped() {
        let registry = registry();
        let compiled = compile(
            &registry,
            &plan(&[
                ("action_002", "CO_SIM_EVENT", None),
                ("action_004", "CO_SIM_ACTION", Some("tvb_simulation.xml")),
            ]),
        )
        .unwrap();

        assert_eq!(
            compiled.actions.keys().collect::<Vec<_>>(),
            vec!["action_004"]
        );
    }

    #[test]
    fn unresolved_reference_names_action() {
        let mut registry = registry();
        registry.set(CO_SIM_RESULTS_PATH, ConfigValue::Null).unwrap();
        let error = compile(
            &registry,
            &plan(&[("action_000", "CO_SIM_ACTION", Some("nest_simulation.xml"))]),
        )
        .expect_err("must fail");

        assert_eq!(error.action_id, "action_000");
        let (section, tag, source) = match error.kind {
            CompileErrorKind::Unresolved {
                section,
                tag,
                source,
            } => (section, tag, source),
            other => panic!("expected an unresolved token, got {other:?}"),
        };
        assert_eq!(section, Section::Routine);
        assert_eq!(tag, "argv_02");
        assert!(matches!(
            source,
            VariableError::UnresolvedVariable { ref token, .. } if token == CO_SIM_RESULTS_PATH
        ));
        assert_eq!(
            format!("{}", CompileErrorKind::Unresolved { section, tag, source }),
            "<routine> <argv_02> could not be resolved"
        );
    }

    #[test]
    fn unresolved_scientific_parameters_name_section() {
        let mut registry = registry();
        registry.set(CO_SIM_PARAMETERS_PATH, ConfigValue::Null).unwrap();
        let error = compile(
            &registry,
            &plan(&[("action_000", "CO_SIM_ACTION", Some("nest_simulation.xml"))]),
        )
        .expect_err("must fail");

        assert!(matches!(
            error.kind,
            CompileErrorKind::Unresolved { section: Section::Parameters, ref tag, .. }
                if tag == CO_SIM_SCIENTIFIC_PARAMETERS
        ));
    }

    #[test]
    fn missing_action_file() {
        let registry = registry();
        let error = compile(
            &registry,
            &plan(&[("action_000", "CO_SIM_ACTION", Some("does_not_exist.xml"))]),
        )
        .expect_err("must fail");

        assert!(matches!(error.kind, CompileErrorKind::Parse(ParseError::Io { .. })));
    }

    #[test]
    fn decode_plan_entries() {
        let document = StructuredXmlParser::default()
            .parse_str(
                "plan.xml",
                r#"<action_plan datatype="DICTIONARY">
                    <action_000 datatype="DICTIONARY">
                        <action_type datatype="STRING">CO_SIM_ACTION</action_type>
                        <action_xml datatype="STRING">nest_simulation.xml</action_xml>
                    </action_000>
                    <action_002 datatype="DICTIONARY">
                        <action_type datatype="STRING">CO_SIM_EVENT</action_type>
                    </action_002>
                </action_plan>"#,
            )
            .unwrap();

        let plan = ActionPlan::from_dictionary(
            Path::new("plan.xml"),
            document["action_plan"].as_dictionary().unwrap(),
        )
        .unwrap();

        assert_eq!(
            plan.actions,
            vec![
                ActionSpec {
                    id: "action_000".to_string(),
                    action_type: ActionType::Action,
                    xml_reference: Some("nest_simulation.xml".to_string()),
                },
                ActionSpec {
                    id: "action_002".to_string(),
                    action_type: ActionType::Other("CO_SIM_EVENT".to_string()),
                    xml_reference: None,
                },
            ]
        );
    }

    #[test]
    fn decode_plan_entry_without_xml() {
        let mut entry = Dictionary::new();
        entry.insert(ACTION_TYPE.to_string(), "CO_SIM_ACTION".into());
        let mut entries = Dictionary::new();
        entries.insert("action_000".to_string(), ConfigValue::Dictionary(entry));

        let error = ActionPlan::from_dictionary(Path::new("plan.xml"), &entries)
            .expect_err("must fail");
        assert_eq!(error.action_id, "action_000");
        assert!(matches!(
            error.kind,
            CompileErrorKind::MissingTag { tag: ACTION_XML, .. }
        ));
    }
}
