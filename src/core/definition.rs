//! SC-004: Definitions: reusable, parameterized resource templates.
//!
//! A definition declares typed parameters and a body of statements. When
//! invoked as `name(instance, block)`, the block is validated against the
//! parameter schema, defaults are filled in, and `name = instance` is merged
//! last. The result becomes the single `params` binding of the body's scope.

use super::error::EvalError;
use super::parser::Statement;
use super::types::{yaml_type_name, Attributes};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Parameter type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    #[default]
    Any,
    String,
    Int,
    Bool,
    Path,
    Enum,
    List,
    Map,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::String => write!(f, "string"),
            Self::Int => write!(f, "int"),
            Self::Bool => write!(f, "bool"),
            Self::Path => write!(f, "path"),
            Self::Enum => write!(f, "enum"),
            Self::List => write!(f, "list"),
            Self::Map => write!(f, "map"),
        }
    }
}

/// A parameter declaration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamDecl {
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: Option<String>,
    /// `None` makes the parameter required; `default: null` is `Some(Null)`
    #[serde(default, deserialize_with = "present_value")]
    pub default: Option<serde_yaml_ng::Value>,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
    #[serde(default)]
    pub choices: Vec<String>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<serde_yaml_ng::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_yaml_ng::Value::deserialize(deserializer).map(Some)
}

impl ParamDecl {
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Parameter declaration as written: full form, or a bare default value.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParamSpec {
    Full(ParamDecl),
    Default(serde_yaml_ng::Value),
}

impl From<ParamSpec> for ParamDecl {
    fn from(spec: ParamSpec) -> Self {
        match spec {
            ParamSpec::Full(decl) => decl,
            ParamSpec::Default(serde_yaml_ng::Value::Null) => ParamDecl::default(),
            ParamSpec::Default(value) => ParamDecl {
                default: Some(value),
                ..ParamDecl::default()
            },
        }
    }
}

/// A registered definition.
#[derive(Debug, Clone)]
pub struct Definition {
    pub name: String,
    pub params: IndexMap<String, ParamDecl>,
    pub body: Vec<Statement>,
    /// Recipe file the definition was declared in
    pub origin: PathBuf,
    /// Directory `include_recipe` in the body resolves against
    pub base_dir: PathBuf,
}

impl Definition {
    /// Build the attribute set for one use-site.
    ///
    /// Provided values win over defaults; `name` is merged last.
    pub fn instantiate(
        &self,
        instance: &str,
        provided: Option<&Attributes>,
    ) -> Result<Attributes, EvalError> {
        let empty = Attributes::new();
        let provided = provided.unwrap_or(&empty);

        if let Some(unknown) = provided.keys().find(|k| !self.params.contains_key(*k)) {
            return Err(EvalError::schema(
                &self.name,
                format!("unknown parameter '{}'", unknown),
            ));
        }

        let instance_value = serde_yaml_ng::Value::String(instance.to_string());
        let mut attrs = Attributes::new();
        for (param, decl) in &self.params {
            let value = if param == "name" {
                instance_value.clone()
            } else if let Some(v) = provided.get(param) {
                v.clone()
            } else if let Some(ref default) = decl.default {
                // An explicit null default leaves the parameter unset
                if default.is_null() {
                    attrs.insert(param.clone(), serde_yaml_ng::Value::Null);
                    continue;
                }
                default.clone()
            } else {
                return Err(EvalError::schema(
                    &self.name,
                    format!(
                        "missing required parameter '{}' (type: {})",
                        param, decl.param_type
                    ),
                ));
            };
            validate_param(param, &value, decl).map_err(|m| EvalError::schema(&self.name, m))?;
            attrs.insert(param.clone(), value);
        }

        attrs.insert("name".to_string(), instance_value);
        Ok(attrs)
    }
}

/// Validate a single parameter value against its declaration.
fn validate_param(name: &str, value: &serde_yaml_ng::Value, decl: &ParamDecl) -> Result<(), String> {
    use serde_yaml_ng::Value;

    match decl.param_type {
        ParamType::Any => Ok(()),
        ParamType::String => match value {
            Value::String(_) => Ok(()),
            other => Err(format!(
                "parameter '{}' must be a string, got {}",
                name,
                yaml_type_name(other)
            )),
        },
        ParamType::Int => {
            let n = value
                .as_i64()
                .ok_or_else(|| format!("parameter '{}' must be an integer", name))?;
            if let Some(min) = decl.min {
                if n < min {
                    return Err(format!("parameter '{}' must be >= {}", name, min));
                }
            }
            if let Some(max) = decl.max {
                if n > max {
                    return Err(format!("parameter '{}' must be <= {}", name, max));
                }
            }
            Ok(())
        }
        ParamType::Bool => match value {
            Value::Bool(_) => Ok(()),
            _ => Err(format!("parameter '{}' must be a boolean", name)),
        },
        ParamType::Path => match value {
            Value::String(s) if s.starts_with('/') => Ok(()),
            Value::String(_) => Err(format!("parameter '{}' must be an absolute path", name)),
            _ => Err(format!("parameter '{}' must be a path string", name)),
        },
        ParamType::Enum => match value {
            Value::String(s) => {
                if !decl.choices.is_empty() && !decl.choices.contains(s) {
                    return Err(format!(
                        "parameter '{}' must be one of: {}",
                        name,
                        decl.choices.join(", ")
                    ));
                }
                Ok(())
            }
            _ => Err(format!("parameter '{}' must be a string", name)),
        },
        ParamType::List => match value {
            Value::Sequence(_) => Ok(()),
            _ => Err(format!("parameter '{}' must be a list", name)),
        },
        ParamType::Map => match value {
            Value::Mapping(_) => Ok(()),
            _ => Err(format!("parameter '{}' must be a map", name)),
        },
    }
}

/// Definitions visible to one run, in registration order.
#[derive(Debug, Clone, Default)]
pub struct DefinitionRegistry {
    definitions: IndexMap<String, Arc<Definition>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, returning the one it replaced.
    pub fn register(&mut self, definition: Definition) -> Option<Arc<Definition>> {
        self.definitions
            .insert(definition.name.clone(), Arc::new(definition))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Definition>> {
        self.definitions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
