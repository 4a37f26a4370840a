//! Port ranges used by the co-simulation components to communicate
//!
//! ```xml
//! <co_simulation_communication_settings>
//!   <ORCHESTRATOR datatype="DICTIONARY">
//!     <MIN datatype="INT">59100</MIN>
//!     <MAX datatype="INT">59120</MAX>
//!     <MAX_TRIES datatype="INT">20</MAX_TRIES>
//!   </ORCHESTRATOR>
//! </co_simulation_communication_settings>
//! ```
//!
//! Values declared as `STRING` are accepted as long as they hold an integer.
use crate::value::{ConfigValue, Dictionary};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PortRange {
    pub min: i64,
    pub max: i64,
    pub max_tries: i64,
}

/// Port ranges keyed by component, e.g. `ORCHESTRATOR`
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct CommunicationSettings {
    pub components: indexmap::IndexMap<String, PortRange>,
}

impl CommunicationSettings {
    pub fn from_dictionary(
        source: &Path,
        document: &Dictionary,
    ) -> Result<Self, CommSettingsError> {
        let mut components = indexmap::IndexMap::new();

        for (component, entries) in document {
            let integer = |tag: &'static str| -> Result<i64, CommSettingsError> {
                let value = entries.get(tag).ok_or_else(|| CommSettingsError::MissingTag {
                    file: source.to_path_buf(),
                    component: component.clone(),
                    tag,
                })?;

                match value {
                    ConfigValue::Integer(integer) => Ok(*integer),
                    ConfigValue::String(text) => text.trim().parse().map_err(|_| {
                        CommSettingsError::TypeCoercion {
                            file: source.to_path_buf(),
                            component: component.clone(),
                            tag,
                            value: value.to_string(),
                        }
                    }),
                    other => Err(CommSettingsError::TypeCoercion {
                        file: source.to_path_buf(),
                        component: component.clone(),
                        tag,
                        value: other.to_string(),
                    }),
                }
            };

            let range = PortRange {
                min: integer("MIN")?,
                max: integer("MAX")?,
                max_tries: integer("MAX_TRIES")?,
            };
            tracing::debug!(%component, ?range, "communication settings");
            components.insert(component.clone(), range);
        }

        Ok(Self { components })
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CommSettingsError {
    #[error("{}: <{component}> has no <{tag}>", .file.display())]
    MissingTag {
        file: PathBuf,
        component: String,
        tag: &'static str,
    },
    #[error("{}: <{component}><{tag}> is not an integer: {value:?}", .file.display())]
    TypeCoercion {
        file: PathBuf,
        component: String,
        tag: &'static str,
        value: String,
    },
}
