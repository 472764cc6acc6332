//! SC-007: Execute resource: a command to run on the target.

use super::{check_allowed, optional_string, set_default, ResourceType};
use crate::core::types::Attributes;

/// `execute` resource type.
pub struct Execute;

const ALLOWED: &[&str] = &["command", "cwd", "user", "environment"];

impl ResourceType for Execute {
    fn kind(&self) -> &'static str {
        "execute"
    }

    fn normalize(&self, name: &str, mut block: Attributes) -> Result<Attributes, String> {
        check_allowed(&block, ALLOWED)?;
        set_default(
            &mut block,
            "command",
            serde_yaml_ng::Value::String(name.to_string()),
        );
        if optional_string(&block, "command")?.is_some_and(|c| c.trim().is_empty()) {
            return Err("command must not be empty".to_string());
        }
        if let Some(cwd) = optional_string(&block, "cwd")? {
            if !cwd.starts_with('/') {
                return Err(format!("cwd must be an absolute path, got '{}'", cwd));
            }
        }
        optional_string(&block, "user")?;
        match block.get("environment") {
            None | Some(serde_yaml_ng::Value::Mapping(_)) => {}
            Some(_) => return Err("environment must be a map".to_string()),
        }
        Ok(block)
    }
}
