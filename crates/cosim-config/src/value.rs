//! value representation
//!
//! Parsed configuration documents contain the following data types
//! - integer (signed, i64)
//! - float (f64)
//! - string (utf-8)
//! - dictionary (order-preserving "map", where the key is the xml tag name)
//! - array (numeric sequence, each element an integer or a float)
//! - model (a named record, the name comes from the `model` attribute)
//! - null (a leaf whose datatype was missing or not recognized, lenient mode only)
//!
//! There are no implicit conversions between types. Values that end up in an argument vector are
//! rendered with [ConfigValue::to_token].
use serde::{ser::SerializeMap, ser::SerializeSeq, Serializer};

/// Order-preserving name to value mapping
pub type Dictionary = indexmap::IndexMap<String, ConfigValue>;

/// All possible value types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConfigValue {
    #[default]
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<ConfigValue>),
    Dictionary(Dictionary),
    Model { name: String, fields: Dictionary },
}

impl ConfigValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Entries of a dictionary or the fields of a model
    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            ConfigValue::Dictionary(dict) => Some(dict),
            ConfigValue::Model { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Lookup a direct child of a dictionary or model
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.as_dictionary().and_then(|dict| dict.get(key))
    }

    /// Render a scalar as a single command line token
    ///
    /// Containers and null have no token representation.
    pub fn to_token(&self) -> Option<String> {
        match self {
            ConfigValue::Integer(i) => Some(i.to_string()),
            ConfigValue::Float(f) => Some(format!("{f:?}")),
            ConfigValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValue::Null => f.write_str("null"),
            ConfigValue::Integer(i) => write!(f, "{i}"),
            // debug formatting keeps `1.0` and `1e-20` readable as floats
            ConfigValue::Float(x) => write!(f, "{x:?}"),
            ConfigValue::String(s) => f.write_str(s),
            ConfigValue::Array(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            ConfigValue::Dictionary(dict) => write_entries(f, dict),
            ConfigValue::Model { name, fields } => {
                write!(f, "{name} ")?;
                write_entries(f, fields)
            }
        }
    }
}

fn write_entries(f: &mut std::fmt::Formatter<'_>, dict: &Dictionary) -> std::fmt::Result {
    f.write_str("{")?;
    for (index, (key, value)) in dict.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{key} = {value}")?;
    }
    f.write_str("}")
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<Dictionary> for ConfigValue {
    fn from(value: Dictionary) -> Self {
        ConfigValue::Dictionary(value)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(value: Vec<T>) -> Self {
        ConfigValue::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ConfigValue>> From<Option<T>> for ConfigValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl serde::ser::Serialize for ConfigValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ConfigValue::Null => serializer.serialize_unit(),
            ConfigValue::Integer(value) => serializer.serialize_i64(*value),
            ConfigValue::Float(value) => serializer.serialize_f64(*value),
            ConfigValue::String(value) => serializer.serialize_str(value),
            ConfigValue::Array(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            ConfigValue::Dictionary(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
            // fields are nested, a field may itself be called `model`
            ConfigValue::Model { name, fields } => {
                let mut ser = serializer.serialize_map(Some(2))?;
                ser.serialize_entry("model", name)?;
                ser.serialize_entry("fields", fields)?;
                ser.end()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tokens() {
        assert_eq!(ConfigValue::from("-n").to_token().as_deref(), Some("-n"));
        assert_eq!(ConfigValue::from(4_i64).to_token().as_deref(), Some("4"));
        assert_eq!(ConfigValue::from(0.5_f64).to_token().as_deref(), Some("0.5"));
        assert_eq!(ConfigValue::from(1.0_f64).to_token().as_deref(), Some("1.0"));
        assert_eq!(ConfigValue::from(1e-20_f64).to_token().as_deref(), Some("1e-20"));
        assert_eq!(ConfigValue::Null.to_token(), None);
        assert_eq!(ConfigValue::Dictionary(Dictionary::new()).to_token(), None);
    }

    #[test]
    fn model_fields_are_addressable() {
        let mut fields = Dictionary::new();
        fields.insert("g".to_string(), 1.5_f64.into());
        let model = ConfigValue::Model {
            name: "wong_wang".to_string(),
            fields,
        };

        assert_eq!(model.get("g").and_then(ConfigValue::as_f64), Some(1.5));
        assert_eq!(model.to_string(), "wong_wang {g = 1.5}");
    }

    #[test]
    fn model_serializes_with_name() {
        let mut fields = Dictionary::new();
        fields.insert("tau".to_string(), 10_i64.into());
        let model = ConfigValue::Model {
            name: "wong_wang".to_string(),
            fields,
        };

        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(json, r#"{"model":"wong_wang","fields":{"tau":10}}"#);
    }

    #[test]
    fn model_field_named_model() {
        let mut fields = Dictionary::new();
        fields.insert("model".to_string(), "y".into());
        let model = ConfigValue::Model {
            name: "x".to_string(),
            fields,
        };

        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(json, r#"{"model":"x","fields":{"model":"y"}}"#);
    }
}
