//! SC-002: Evaluation errors.
//!
//! Every variant aborts the whole run; nothing is recovered locally.

use std::path::PathBuf;

/// Errors raised while evaluating a recipe tree.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// Resolved include target does not exist.
    #[error("recipe not found ({target})")]
    RecipeNotFound { target: String, resolved: PathBuf },

    /// Missing or invalid parameters for a definition, or an invalid definition.
    #[error("definition '{definition}': {message}")]
    Schema { definition: String, message: String },

    /// Recipe statements are not well-formed.
    #[error("malformed recipe {}: {message}", .path.display())]
    MalformedRecipe { path: PathBuf, message: String },

    /// A recipe includes itself or one of its ancestors.
    #[error("cyclic include: {}", format_chain(.chain))]
    CyclicInclusion { chain: Vec<PathBuf> },

    /// A definition is invoked from within its own expansion.
    #[error("definition '{definition}' expands itself")]
    CyclicExpansion { definition: String },

    /// `{{ var }}` names a variable absent from the scope.
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },

    /// A resource-type collaborator rejected a declaration.
    #[error("{kind}[{name}]: {message}")]
    Resource {
        kind: String,
        name: String,
        message: String,
    },

    #[error("cannot read recipe {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EvalError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::MalformedRecipe {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn schema(definition: &str, message: impl Into<String>) -> Self {
        Self::Schema {
            definition: definition.to_string(),
            message: message.into(),
        }
    }
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
