//! Core evaluation logic: types, parsing, resolution, definitions, evaluation.

pub mod definition;
pub mod error;
pub mod evaluator;
pub mod hasher;
pub mod parser;
pub mod resolver;
pub mod types;
