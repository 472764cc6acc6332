//! SC-009: File resource: a file with desired content, ownership and mode.

use super::{check_allowed, check_choice, optional_string, set_default, ResourceType};
use crate::core::types::Attributes;

/// `file` resource type.
pub struct File;

const ALLOWED: &[&str] = &["path", "action", "content", "mode", "owner", "group"];
const ACTIONS: &[&str] = &["create", "delete", "edit"];

impl ResourceType for File {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn normalize(&self, name: &str, mut block: Attributes) -> Result<Attributes, String> {
        check_allowed(&block, ALLOWED)?;
        set_default(
            &mut block,
            "path",
            serde_yaml_ng::Value::String(name.to_string()),
        );
        set_default(
            &mut block,
            "action",
            serde_yaml_ng::Value::String("create".to_string()),
        );
        check_choice(&block, "action", ACTIONS)?;

        if let Some(path) = optional_string(&block, "path")? {
            if !path.starts_with('/') {
                return Err(format!("path must be absolute, got '{}'", path));
            }
        }
        if let Some(mode) = optional_string(&block, "mode")? {
            if !is_octal_mode(mode) {
                return Err(format!("mode must be 3-4 octal digits, got '{}'", mode));
            }
        }
        optional_string(&block, "content")?;
        optional_string(&block, "owner")?;
        optional_string(&block, "group")?;
        Ok(block)
    }
}

fn is_octal_mode(mode: &str) -> bool {
    (3..=4).contains(&mode.len()) && mode.chars().all(|c| ('0'..='7').contains(&c))
}
