//! SC-010: Service resource: actions to take on a system service.

use super::{check_allowed, optional_string, ResourceType};
use crate::core::types::Attributes;
use serde_yaml_ng::Value;

/// `service` resource type.
pub struct Service;

const ALLOWED: &[&str] = &["action", "provider"];
const ACTIONS: &[&str] = &["start", "stop", "restart", "reload", "enable", "disable"];

impl ResourceType for Service {
    fn kind(&self) -> &'static str {
        "service"
    }

    /// `action` is normalized to a list; a single string becomes a one-element list.
    fn normalize(&self, _name: &str, mut block: Attributes) -> Result<Attributes, String> {
        check_allowed(&block, ALLOWED)?;
        let actions = match block.shift_remove("action") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(s)) => vec![s],
            Some(Value::Sequence(items)) => items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s),
                    _ => Err("action list must contain strings".to_string()),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err("action must be a string or a list".to_string()),
        };
        if let Some(bad) = actions.iter().find(|a| !ACTIONS.contains(&a.as_str())) {
            return Err(format!(
                "unknown action '{}' (allowed: {})",
                bad,
                ACTIONS.join(", ")
            ));
        }
        optional_string(&block, "provider")?;

        let mut out = Attributes::new();
        out.insert(
            "action".to_string(),
            Value::Sequence(actions.into_iter().map(Value::String).collect()),
        );
        out.extend(block);
        Ok(out)
    }
}
