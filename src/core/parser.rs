//! SC-003: Recipe parsing.
//!
//! Compiles recipe source (YAML) into a statement list. A recipe is a sequence
//! of single-key mappings:
//! - `define: { name, params, body }` registers a definition
//! - `include_recipe: <target>` includes another recipe
//! - `<kind>: <name>` or `<kind>: { name, ...block }` declares a resource or
//!   invokes a definition (dispatched at evaluation time)

use super::definition::{ParamDecl, ParamSpec};
use super::error::EvalError;
use super::types::Attributes;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

/// Statement keyword for definitions.
pub const DEFINE: &str = "define";

/// Statement keyword for inclusion.
pub const INCLUDE_RECIPE: &str = "include_recipe";

/// One parsed recipe statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Resource declaration or definition invocation.
    Call {
        target: String,
        name: String,
        block: Option<Attributes>,
    },
    Define(DefineStatement),
    IncludeRecipe { target: String },
}

/// A parsed `define` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DefineStatement {
    pub name: String,
    pub params: IndexMap<String, ParamDecl>,
    pub body: Vec<Statement>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefine {
    name: String,
    #[serde(default)]
    params: IndexMap<String, ParamSpec>,
    #[serde(default)]
    body: Option<serde_yaml_ng::Value>,
}

/// Parse recipe source text. `origin` is used for error messages only.
pub fn parse_recipe(source: &str, origin: &Path) -> Result<Vec<Statement>, EvalError> {
    let doc: serde_yaml_ng::Value = serde_yaml_ng::from_str(source)
        .map_err(|e| EvalError::malformed(origin, format!("YAML parse error: {}", e)))?;
    parse_statements(&doc, origin, "")
}

fn parse_statements(
    doc: &serde_yaml_ng::Value,
    origin: &Path,
    context: &str,
) -> Result<Vec<Statement>, EvalError> {
    let items = match doc {
        serde_yaml_ng::Value::Null => return Ok(Vec::new()),
        serde_yaml_ng::Value::Sequence(items) => items,
        other => {
            return Err(EvalError::malformed(
                origin,
                format!(
                    "{}expected a list of statements, got {}",
                    context,
                    super::types::yaml_type_name(other)
                ),
            ))
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            parse_statement(item, origin).map_err(|message| {
                EvalError::malformed(origin, format!("{}statement {}: {}", context, i + 1, message))
            })
        })
        .collect::<Result<Vec<_>, _>>()
}

fn parse_statement(item: &serde_yaml_ng::Value, origin: &Path) -> Result<Statement, String> {
    let map = match item {
        serde_yaml_ng::Value::Mapping(map) if map.len() == 1 => map,
        serde_yaml_ng::Value::Mapping(map) => {
            return Err(format!(
                "expected exactly one key, found {}",
                map.len()
            ))
        }
        other => {
            return Err(format!(
                "expected a mapping, got {}",
                super::types::yaml_type_name(other)
            ))
        }
    };
    let (key, value) = map.iter().next().ok_or("empty statement")?;
    let key = key.as_str().ok_or("statement key must be a string")?;

    match key {
        DEFINE => parse_define(value, origin).map(Statement::Define),
        INCLUDE_RECIPE => match value {
            serde_yaml_ng::Value::String(target) if !target.is_empty() => {
                Ok(Statement::IncludeRecipe {
                    target: target.clone(),
                })
            }
            _ => Err("include_recipe expects a non-empty path string".to_string()),
        },
        target => parse_call(target, value),
    }
}

fn parse_call(target: &str, value: &serde_yaml_ng::Value) -> Result<Statement, String> {
    let (name, block) = match value {
        serde_yaml_ng::Value::Mapping(map) => {
            let mut block = Attributes::new();
            let mut name = None;
            for (k, v) in map {
                let k = k
                    .as_str()
                    .ok_or_else(|| format!("{}: attribute keys must be strings", target))?;
                if k == "name" {
                    name = Some(scalar_name(v).ok_or_else(|| {
                        format!("{}: name must be a scalar", target)
                    })?);
                } else {
                    block.insert(k.to_string(), v.clone());
                }
            }
            let name = name.ok_or_else(|| format!("{}: missing name", target))?;
            (name, Some(block))
        }
        scalar => (
            scalar_name(scalar)
                .ok_or_else(|| format!("{}: expected a name or a mapping", target))?,
            None,
        ),
    };
    if name.is_empty() {
        return Err(format!("{}: name must not be empty", target));
    }
    Ok(Statement::Call {
        target: target.to_string(),
        name,
        block,
    })
}

fn scalar_name(value: &serde_yaml_ng::Value) -> Option<String> {
    match value {
        serde_yaml_ng::Value::String(s) => Some(s.clone()),
        serde_yaml_ng::Value::Number(n) => Some(n.to_string()),
        serde_yaml_ng::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_define(value: &serde_yaml_ng::Value, origin: &Path) -> Result<DefineStatement, String> {
    let raw: RawDefine = serde_yaml_ng::from_value(value.clone())
        .map_err(|e| format!("invalid define: {}", e))?;
    if !is_identifier(&raw.name) {
        return Err(format!("invalid definition name '{}'", raw.name));
    }
    if raw.name == DEFINE || raw.name == INCLUDE_RECIPE {
        return Err(format!("'{}' is a reserved statement", raw.name));
    }
    let params = raw
        .params
        .into_iter()
        .map(|(k, spec)| (k, ParamDecl::from(spec)))
        .collect();
    let body = match raw.body {
        Some(body) => {
            let context = format!("define '{}': ", raw.name);
            parse_statements(&body, origin, &context).map_err(|e| match e {
                EvalError::MalformedRecipe { message, .. } => message,
                other => other.to_string(),
            })?
        }
        None => Vec::new(),
    };
    Ok(DefineStatement {
        name: raw.name,
        params,
        body,
    })
}

/// Definition names: letters, digits, `_` and `-`, not starting with a digit.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
