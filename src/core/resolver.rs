//! SC-005: Template interpolation and include path resolution.
//!
//! Resolves `{{ var.path }}` placeholders against a [`Scope`], and turns an
//! `include_recipe` target into the absolute path of a recipe file:
//! relative join, then `default.yaml` for directories, then the `.yaml`
//! extension, in that order.

use super::error::EvalError;
use super::types::{yaml_value_to_string, Attributes, Scope};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Conventional recipe file extension.
pub const RECIPE_EXTENSION: &str = ".yaml";

/// File looked up when an include target names a directory.
pub const DEFAULT_RECIPE: &str = "default.yaml";

/// Resolve all `{{ ... }}` placeholders in a string.
pub fn interpolate(template: &str, scope: &Scope, origin: &Path) -> Result<String, EvalError> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..].find("}}").ok_or_else(|| {
            EvalError::malformed(
                origin,
                format!("unclosed template at position {} in '{}'", open, template),
            )
        })?;
        let close = open + close + 2;
        let key = result[open + 2..close - 2].trim();

        let value = scope
            .lookup(key)
            .map(yaml_value_to_string)
            .ok_or_else(|| EvalError::UndefinedVariable {
                name: key.to_string(),
            })?;

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

/// Resolve placeholders in a value, recursing into lists and maps.
///
/// A string consisting of exactly one placeholder keeps the value's type.
pub fn interpolate_value(
    value: &serde_yaml_ng::Value,
    scope: &Scope,
    origin: &Path,
) -> Result<serde_yaml_ng::Value, EvalError> {
    use serde_yaml_ng::Value;

    match value {
        Value::String(s) => {
            if let Some(key) = sole_placeholder(s) {
                return scope
                    .lookup(key)
                    .cloned()
                    .ok_or_else(|| EvalError::UndefinedVariable {
                        name: key.to_string(),
                    });
            }
            Ok(Value::String(interpolate(s, scope, origin)?))
        }
        Value::Sequence(items) => items
            .iter()
            .map(|v| interpolate_value(v, scope, origin))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Value::Mapping(map) => {
            let mut out = serde_yaml_ng::Mapping::new();
            for (k, v) in map {
                out.insert(k.clone(), interpolate_value(v, scope, origin)?);
            }
            Ok(Value::Mapping(out))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve placeholders in every attribute of a block.
pub fn interpolate_block(
    block: &Attributes,
    scope: &Scope,
    origin: &Path,
) -> Result<Attributes, EvalError> {
    let mut out = Attributes::with_capacity(block.len());
    for (k, v) in block {
        out.insert(k.clone(), interpolate_value(v, scope, origin)?);
    }
    Ok(out)
}

fn sole_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

/// Resolve an include target relative to the including recipe's directory.
///
/// Does not check existence; a missing file is the caller's error to raise.
pub fn resolve_include_path(base_dir: &Path, target: &str) -> PathBuf {
    let mut path = normalize(&base_dir.join(target));
    if path.is_dir() {
        path.push(DEFAULT_RECIPE);
    }
    with_recipe_extension(path)
}

/// Append `.yaml` unless the path already ends with it.
pub fn with_recipe_extension(path: PathBuf) -> PathBuf {
    if path.as_os_str().to_string_lossy().ends_with(RECIPE_EXTENSION) {
        return path;
    }
    let mut raw: OsString = path.into_os_string();
    raw.push(RECIPE_EXTENSION);
    PathBuf::from(raw)
}

/// Lexically remove `.` and `..` components, without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}
