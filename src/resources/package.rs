//! SC-008: Package resource: a package that should be installed or removed.

use super::{check_allowed, check_choice, optional_string, set_default, ResourceType};
use crate::core::types::Attributes;

/// `package` resource type.
pub struct Package;

const ALLOWED: &[&str] = &["action", "version", "provider", "options"];
const ACTIONS: &[&str] = &["install", "remove"];

impl ResourceType for Package {
    fn kind(&self) -> &'static str {
        "package"
    }

    fn normalize(&self, _name: &str, mut block: Attributes) -> Result<Attributes, String> {
        check_allowed(&block, ALLOWED)?;
        set_default(
            &mut block,
            "action",
            serde_yaml_ng::Value::String("install".to_string()),
        );
        check_choice(&block, "action", ACTIONS)?;

        // `version: 1.10` has already been read as the float 1.1
        if let Some(serde_yaml_ng::Value::Number(_)) = block.get("version") {
            return Err(
                "version must be a string (quote numeric versions like \"1.10\")".to_string(),
            );
        }
        optional_string(&block, "version")?;
        optional_string(&block, "provider")?;
        optional_string(&block, "options")?;
        Ok(block)
    }
}
