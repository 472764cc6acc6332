//! Souschef: recipe evaluation for declarative server configuration.
//!
//! Turns recipe files into an ordered tree of resource declarations.
//! Never executes anything: applying the plan belongs to an executor.

pub mod cli;
pub mod core;
pub mod resources;

pub use crate::core::error::EvalError;
pub use crate::core::evaluator::{Evaluator, RecipeContext};
pub use crate::core::types::{Recipe, RecipeTree, ResourceDeclaration, Scope};
