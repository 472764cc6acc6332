//! Resource types: the collaborators that turn a declaration into a
//! normalized desired-state item.
//!
//! Each type:
//! 1. Rejects attributes it does not know
//! 2. Fills in defaults (e.g. `command` defaults to the resource name)
//! 3. Checks attribute values
//!
//! None of them ever acts on a host; applying the plan is the executor's job.

pub mod execute;
pub mod file;
pub mod package;
pub mod service;

use crate::core::types::{yaml_type_name, Attributes};
use indexmap::IndexMap;
use std::sync::Arc;

/// A resource type the evaluator can declare.
pub trait ResourceType: Send + Sync {
    /// Statement key this type answers to (`package`, `execute`, ...).
    fn kind(&self) -> &'static str;

    /// Validate and normalize the attributes of one declaration.
    fn normalize(&self, name: &str, block: Attributes) -> Result<Attributes, String>;
}

/// Resource types known to an evaluator, by kind.
#[derive(Clone, Default)]
pub struct ResourceTypes {
    types: IndexMap<&'static str, Arc<dyn ResourceType>>,
}

impl ResourceTypes {
    /// No resource types at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in `execute`, `package`, `file` and `service` types.
    pub fn builtin() -> Self {
        let mut types = Self::empty();
        types.register(execute::Execute);
        types.register(package::Package);
        types.register(file::File);
        types.register(service::Service);
        types
    }

    pub fn register(&mut self, resource_type: impl ResourceType + 'static) {
        self.types
            .insert(resource_type.kind(), Arc::new(resource_type));
    }

    pub fn get(&self, kind: &str) -> Option<&dyn ResourceType> {
        self.types.get(kind).map(|t| t.as_ref())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.types.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.keys().copied()
    }
}

impl std::fmt::Debug for ResourceTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.types.keys()).finish()
    }
}

/// Reject attributes outside `allowed`.
pub(crate) fn check_allowed(block: &Attributes, allowed: &[&str]) -> Result<(), String> {
    match block.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(unknown) => Err(format!(
            "unknown attribute '{}' (allowed: {})",
            unknown,
            allowed.join(", ")
        )),
        None => Ok(()),
    }
}

/// Insert `value` under `key` unless already set.
pub(crate) fn set_default(block: &mut Attributes, key: &str, value: serde_yaml_ng::Value) {
    if !block.contains_key(key) {
        block.insert(key.to_string(), value);
    }
}

/// Require `key`, if present, to be a string.
pub(crate) fn optional_string<'a>(block: &'a Attributes, key: &str) -> Result<Option<&'a str>, String> {
    match block.get(key) {
        None => Ok(None),
        Some(serde_yaml_ng::Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(format!(
            "attribute '{}' must be a string, got {}",
            key,
            yaml_type_name(other)
        )),
    }
}

/// Require `key`, if present, to be one of `choices`.
pub(crate) fn check_choice(block: &Attributes, key: &str, choices: &[&str]) -> Result<(), String> {
    if let Some(value) = optional_string(block, key)? {
        if !choices.contains(&value) {
            return Err(format!(
                "attribute '{}' must be one of: {}",
                key,
                choices.join(", ")
            ));
        }
    }
    Ok(())
}
