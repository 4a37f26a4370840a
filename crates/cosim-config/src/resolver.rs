//! Symbolic reference substitution
//!
//! Recognized references:
//! - `${NAME}`: OS environment variable `NAME`
//! - `{CO_SIM_NAME}`: registry variable, braces are consumed
//! - `CO_SIM_NAME`: registry variable
//!
//! Substitution is a single left-to-right pass. Substituted values are not scanned again, so a
//! variable referring to another variable must be assigned after the one it refers to.
use crate::value::ConfigValue;
use crate::variables::{VariableError, VariableRegistry};
use regex::{Captures, Regex};
use std::sync::OnceLock;

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"\$\{(?P<env>[A-Za-z_][A-Za-z0-9_]*)\}",
            r"|\{(?P<braced>CO_SIM_[A-Z0-9_]+)\}",
            r"|(?P<bare>CO_SIM_[A-Z0-9_]+)",
        ))
        .expect("reference pattern must compile")
    })
}

#[derive(derive_new::new)]
pub struct ReferenceResolver<'r> {
    registry: &'r VariableRegistry,
}

impl<'r> ReferenceResolver<'r> {
    /// Replace every reference in `text` by its current value
    pub fn resolve(&self, text: &str) -> Result<String, VariableError> {
        let mut resolved = String::with_capacity(text.len());
        let mut last = 0;

        for captures in reference_pattern().captures_iter(text) {
            let whole = captures.get(0).expect("capture group 0 is always present");
            resolved.push_str(&text[last..whole.start()]);
            resolved.push_str(&self.substitute(&captures, text)?);
            last = whole.end();
        }
        resolved.push_str(&text[last..]);

        if resolved != text {
            tracing::trace!(%text, %resolved, "references substituted");
        }

        Ok(resolved)
    }

    /// Resolve every string inside `value`, other scalars are kept as they are
    pub fn resolve_value(&self, value: &ConfigValue) -> Result<ConfigValue, VariableError> {
        Ok(match value {
            ConfigValue::String(text) => ConfigValue::String(self.resolve(text)?),
            ConfigValue::Dictionary(entries) => ConfigValue::Dictionary(
                entries
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), self.resolve_value(value)?)))
                    .collect::<Result<_, VariableError>>()?,
            ),
            ConfigValue::Model { name, fields } => ConfigValue::Model {
                name: name.clone(),
                fields: fields
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), self.resolve_value(value)?)))
                    .collect::<Result<_, VariableError>>()?,
            },
            other => other.clone(),
        })
    }

    fn substitute(&self, captures: &Captures, text: &str) -> Result<String, VariableError> {
        let unresolved = |token: &str| {
            tracing::error!(%token, %text, "reference could not be resolved");
            VariableError::UnresolvedVariable {
                token: token.to_string(),
                text: text.to_string(),
            }
        };

        if let Some(name) = captures.name("env") {
            return self
                .registry
                .environment()
                .var(name.as_str())
                .ok_or_else(|| unresolved(&captures[0]));
        }

        let name = captures
            .name("braced")
            .or_else(|| captures.name("bare"))
            .expect("one of the alternatives matched")
            .as_str();

        match self.registry.lookup(name) {
            Some(value) if !value.is_null() => Ok(value.to_string()),
            _ => Err(unresolved(name)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> VariableRegistry {
        let mut registry = VariableRegistry::with_environment(|name: &str| match name {
            "CO_SIM_TVB_NEST_PATH" => Some("/opt/tvb-nest".to_string()),
            _ => None,
        });
        registry.set("CO_SIM_RESULTS_PATH", "/out").unwrap();
        registry
    }

    #[test]
    fn registry_reference() {
        let registry = registry();
        let resolver = ReferenceResolver::new(&registry);

        assert_eq!(resolver.resolve("CO_SIM_RESULTS_PATH/sim").unwrap(), "/out/sim");
        assert_eq!(
            resolver.resolve("--output={CO_SIM_RESULTS_PATH}").unwrap(),
            "--output=/out"
        );
    }

    #[test]
    fn environment_reference() {
        let registry = registry();
        let resolver = ReferenceResolver::new(&registry);

        assert_eq!(
            resolver.resolve("${CO_SIM_TVB_NEST_PATH}/actions").unwrap(),
            "/opt/tvb-nest/actions"
        );
        assert_eq!(
            resolver.resolve("${MISSING}/x"),
            Err(VariableError::UnresolvedVariable {
                token: "${MISSING}".to_string(),
                text: "${MISSING}/x".to_string()
            })
        );
    }

    #[test]
    fn text_without_references_is_unchanged() {
        let registry = registry();
        let resolver = ReferenceResolver::new(&registry);

        for text in ["", "python3", "--nodes=1", "/a/b c", "co_sim_lowercase", "{braces}"] {
            assert_eq!(resolver.resolve(text).unwrap(), text);
        }
    }

    #[test]
    fn unknown_and_unset_variables_are_named() {
        let registry = registry();
        let resolver = ReferenceResolver::new(&registry);

        assert_eq!(
            resolver.resolve("CO_SIM_NOT_DECLARED/x"),
            Err(VariableError::UnresolvedVariable {
                token: "CO_SIM_NOT_DECLARED".to_string(),
                text: "CO_SIM_NOT_DECLARED/x".to_string()
            })
        );
        // declared but never assigned
        assert!(matches!(
            resolver.resolve("CO_SIM_ROUTINES_PATH/run.py"),
            Err(VariableError::UnresolvedVariable { token, .. }) if token == "CO_SIM_ROUTINES_PATH"
        ));
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let mut registry = registry();
        registry.set("CO_SIM_ROOT_PATH", "CO_SIM_RESULTS_PATH").unwrap();
        let resolver = ReferenceResolver::new(&registry);

        assert_eq!(resolver.resolve("CO_SIM_ROOT_PATH").unwrap(), "CO_SIM_RESULTS_PATH");
    }

    #[test]
    fn nested_values() {
        let registry = registry();
        let resolver = ReferenceResolver::new(&registry);

        let mut settings = crate::value::Dictionary::new();
        settings.insert("output".to_string(), "CO_SIM_RESULTS_PATH/logs".into());
        settings.insert("ranks".to_string(), 4_i64.into());

        let resolved = resolver
            .resolve_value(&ConfigValue::Dictionary(settings))
            .unwrap();
        assert_eq!(resolved.get("output"), Some(&ConfigValue::from("/out/logs")));
        assert_eq!(resolved.get("ranks"), Some(&ConfigValue::Integer(4)));
    }
}
