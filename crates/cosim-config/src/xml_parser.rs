//! XML documents to [Dictionary]
//!
//! Elements are interpreted by their attributes, not by their tag names:
//! - `model="<name>"` opens a [ConfigValue::Model] scope
//! - `datatype="DICTIONARY"` opens a [ConfigValue::Dictionary] scope
//! - `datatype="INT" | "INTEGER" | "FLOAT" | "STRING"` is a scalar leaf
//! - `datatype="ARRAY"` is a numeric sequence leaf, split on `sep` and typed by `dtype`
//! - elements without any of these are transparent: their children attach to the enclosing scope
//!
//! Every value is attached under its tag name to the innermost open model/dictionary, or to the
//! top level mapping when there is none.
use crate::value::{ConfigValue, Dictionary};
use quick_xml::events::{BytesStart, Event};
use std::path::Path;

/// Parser behaviour knobs
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Reject leaves without a recognized `datatype` instead of storing [ConfigValue::Null]
    pub strict: bool,
}

#[derive(derive_new::new, Debug, Clone, Default)]
pub struct StructuredXmlParser {
    options: ParseOptions,
}

impl StructuredXmlParser {
    pub fn parse(&self, path: &Path) -> Result<Dictionary, ParseError> {
        tracing::info!(path=%path.display(), "loading file");

        let contents = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            source_name: path.display().to_string(),
            source,
        })?;

        self.parse_str(&path.display().to_string(), &contents)
    }

    /// Parse an in-memory document, `source_name` is only used for error messages
    pub fn parse_str(&self, source_name: &str, contents: &str) -> Result<Dictionary, ParseError> {
        DocumentBuilder::new(source_name, self.options).build(contents)
    }
}

/// An open element
#[derive(Debug)]
enum Scope {
    Transparent {
        tag: String,
        has_children: bool,
    },
    Model {
        tag: String,
        name: String,
        fields: Dictionary,
    },
    Dictionary {
        tag: String,
        entries: Dictionary,
    },
    Leaf {
        tag: String,
        datatype: String,
        sep: Option<String>,
        dtype: Option<String>,
        text: String,
    },
}

/// Per-document accumulator state
struct DocumentBuilder<'s> {
    source_name: &'s str,
    options: ParseOptions,
    root: Dictionary,
    stack: Vec<Scope>,
}

impl<'s> DocumentBuilder<'s> {
    fn new(source_name: &'s str, options: ParseOptions) -> Self {
        Self {
            source_name,
            options,
            root: Default::default(),
            stack: Default::default(),
        }
    }

    fn build(mut self, contents: &str) -> Result<Dictionary, ParseError> {
        let mut reader = quick_xml::Reader::from_str(contents);
        reader.config_mut().trim_text(true);

        loop {
            match reader.read_event().map_err(|e| self.malformed(e))? {
                Event::Start(start) => self.open(&start)?,
                Event::Empty(start) => {
                    self.open(&start)?;
                    self.close()?;
                }
                Event::End(_) => self.close()?,
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| self.malformed(e))?;
                    self.push_text(&text);
                }
                Event::CData(cdata) => {
                    let text = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                    self.push_text(&text);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(scope) = self.stack.last() {
            return Err(ParseError::Unclosed {
                source_name: self.source_name.to_string(),
                tag: scope.tag().to_string(),
            });
        }

        Ok(self.root)
    }

    fn open(&mut self, start: &BytesStart) -> Result<(), ParseError> {
        let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();

        let mut model = None;
        let mut datatype = None;
        let mut sep = None;
        let mut dtype = None;
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| self.malformed(e.into()))?;
            let value = attribute
                .unescape_value()
                .map_err(|e| self.malformed(e))?
                .into_owned();
            match attribute.key.as_ref() {
                b"model" => model = Some(value),
                b"datatype" => datatype = Some(value.to_uppercase()),
                b"sep" => sep = Some(value),
                b"dtype" => dtype = Some(value.to_uppercase()),
                _ => {}
            }
        }

        if let Some(Scope::Transparent { has_children, .. }) = self.stack.last_mut() {
            *has_children = true;
        }

        let scope = match (model, datatype) {
            (Some(name), _) => {
                tracing::debug!(%tag, model=%name, "model found");
                Scope::Model {
                    tag,
                    name,
                    fields: Default::default(),
                }
            }
            (None, Some(datatype)) if datatype == "DICTIONARY" => Scope::Dictionary {
                tag,
                entries: Default::default(),
            },
            (None, Some(datatype)) => Scope::Leaf {
                tag,
                datatype,
                sep,
                dtype,
                text: String::new(),
            },
            (None, None) => Scope::Transparent {
                tag,
                has_children: false,
            },
        };

        self.stack.push(scope);
        Ok(())
    }

    fn push_text(&mut self, text: &str) {
        if let Some(Scope::Leaf { text: buffer, .. }) = self.stack.last_mut() {
            buffer.push_str(text);
        }
    }

    fn close(&mut self) -> Result<(), ParseError> {
        let Some(scope) = self.stack.pop() else {
            return Err(ParseError::Unbalanced {
                source_name: self.source_name.to_string(),
            });
        };

        match scope {
            Scope::Transparent { tag, has_children } => {
                if !has_children {
                    // an untyped element without children is an undeclared leaf
                    let value = self.undeclared(&tag, None)?;
                    self.attach(tag, value);
                }
            }
            Scope::Model { tag, name, fields } => {
                self.attach(tag, ConfigValue::Model { name, fields });
            }
            Scope::Dictionary { tag, entries } => {
                self.attach(tag, ConfigValue::Dictionary(entries));
            }
            Scope::Leaf {
                tag,
                datatype,
                sep,
                dtype,
                text,
            } => {
                let value = match datatype.as_str() {
                    "INT" | "INTEGER" => self.coerce_integer(&tag, &datatype, &text)?,
                    "FLOAT" => self.coerce_float(&tag, &datatype, &text)?,
                    "STRING" => ConfigValue::String(text),
                    "ARRAY" => self.coerce_array(&tag, sep.as_deref(), dtype.as_deref(), &text)?,
                    _ => self.undeclared(&tag, Some(&datatype))?,
                };
                self.attach(tag, value);
            }
        }

        Ok(())
    }

    /// Attach to the innermost model or dictionary, or to the top level
    fn attach(&mut self, tag: String, value: ConfigValue) {
        let container = self.stack.iter_mut().rev().find_map(|scope| match scope {
            Scope::Model { fields, .. } => Some(fields),
            Scope::Dictionary { entries, .. } => Some(entries),
            _ => None,
        });

        match container {
            Some(container) => container.insert(tag, value),
            None => self.root.insert(tag, value),
        };
    }

    fn undeclared(&self, tag: &str, datatype: Option<&str>) -> Result<ConfigValue, ParseError> {
        if self.options.strict {
            return Err(ParseError::UndeclaredDatatype {
                source_name: self.source_name.to_string(),
                tag: tag.to_string(),
                datatype: datatype.map(str::to_string),
            });
        }

        tracing::warn!(source=%self.source_name, %tag, ?datatype, "unknown datatype, using null");
        Ok(ConfigValue::Null)
    }

    fn coerce_integer(
        &self,
        tag: &str,
        datatype: &str,
        text: &str,
    ) -> Result<ConfigValue, ParseError> {
        text.parse::<i64>()
            .map(ConfigValue::Integer)
            .map_err(|_| self.coercion_error(tag, datatype, text))
    }

    fn coerce_float(
        &self,
        tag: &str,
        datatype: &str,
        text: &str,
    ) -> Result<ConfigValue, ParseError> {
        text.parse::<f64>()
            .map(ConfigValue::Float)
            .map_err(|_| self.coercion_error(tag, datatype, text))
    }

    fn coerce_array(
        &self,
        tag: &str,
        sep: Option<&str>,
        dtype: Option<&str>,
        text: &str,
    ) -> Result<ConfigValue, ParseError> {
        let dtype = dtype.unwrap_or("FLOAT");
        if !matches!(dtype, "INT" | "INTEGER" | "FLOAT") {
            return Err(ParseError::UnknownArrayDtype {
                source_name: self.source_name.to_string(),
                tag: tag.to_string(),
                dtype: dtype.to_string(),
            });
        }

        let items: Vec<&str> = match sep {
            Some("") => {
                return Err(ParseError::EmptySeparator {
                    source_name: self.source_name.to_string(),
                    tag: tag.to_string(),
                })
            }
            Some(sep) => text
                .split(sep)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .collect(),
            None => text.split_whitespace().collect(),
        };

        items
            .into_iter()
            .map(|item| match dtype {
                "FLOAT" => self.coerce_float(tag, dtype, item),
                _ => self.coerce_integer(tag, dtype, item),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ConfigValue::Array)
    }

    fn coercion_error(&self, tag: &str, datatype: &str, text: &str) -> ParseError {
        ParseError::TypeCoercion {
            source_name: self.source_name.to_string(),
            tag: tag.to_string(),
            datatype: datatype.to_string(),
            text: text.to_string(),
        }
    }

    fn malformed(&self, source: quick_xml::Error) -> ParseError {
        ParseError::Malformed {
            source_name: self.source_name.to_string(),
            source,
        }
    }
}

impl Scope {
    fn tag(&self) -> &str {
        match self {
            Scope::Transparent { tag, .. }
            | Scope::Model { tag, .. }
            | Scope::Dictionary { tag, .. }
            | Scope::Leaf { tag, .. } => tag,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("{source_name}: unable to read file")]
    Io {
        source_name: String,
        source: std::io::Error,
    },
    #[error("{source_name}: malformed xml")]
    Malformed {
        source_name: String,
        source: quick_xml::Error,
    },
    #[error("{source_name}: <{tag}> was never closed")]
    Unclosed { source_name: String, tag: String },
    #[error("{source_name}: closing tag without matching opening tag")]
    Unbalanced { source_name: String },
    #[error("{source_name}: <{tag}> datatype {datatype} does not accept {text:?}")]
    TypeCoercion {
        source_name: String,
        tag: String,
        datatype: String,
        text: String,
    },
    #[error("{source_name}: <{tag}> has no recognized datatype (found {datatype:?})")]
    UndeclaredDatatype {
        source_name: String,
        tag: String,
        datatype: Option<String>,
    },
    #[error("{source_name}: <{tag}> array separator must not be empty")]
    EmptySeparator { source_name: String, tag: String },
    #[error("{source_name}: <{tag}> unknown array dtype {dtype}")]
    UnknownArrayDtype {
        source_name: String,
        tag: String,
        dtype: String,
    },
}
