//! SC-001: Core types: variable scopes, the recipe tree, resource declarations.
//!
//! The tree is the evaluator's output artifact: a root [`Recipe`] whose children
//! are resource declarations and nested recipes, in source declaration order.
//! Convergence engines apply resources strictly in this order.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Attribute map of a resource or definition instance (order-preserving).
pub type Attributes = IndexMap<String, serde_yaml_ng::Value>;

/// Reserved scope entry holding the merged parameters of a definition instance.
pub const PARAMS_KEY: &str = "params";

/// Scope entry the CLI binds node attributes to.
pub const NODE_KEY: &str = "node";

// ============================================================================
// Variable scope
// ============================================================================

/// Immutable name → value mapping visible to the statements of one recipe.
///
/// Cloning shares the underlying map, so a clone taken at declaration time is
/// a snapshot: nothing can mutate it afterwards.
#[derive(Debug, Clone, Default)]
pub struct Scope(Arc<Attributes>);

impl Scope {
    pub fn new(vars: Attributes) -> Self {
        Self(Arc::new(vars))
    }

    /// Fresh scope whose only binding is `params`.
    pub fn with_params(params: Attributes) -> Self {
        let mut vars = Attributes::new();
        vars.insert(
            PARAMS_KEY.to_string(),
            serde_yaml_ng::Value::Mapping(
                params
                    .into_iter()
                    .map(|(k, v)| (serde_yaml_ng::Value::String(k), v))
                    .collect(),
            ),
        );
        Self::new(vars)
    }

    pub fn get(&self, name: &str) -> Option<&serde_yaml_ng::Value> {
        self.0.get(name)
    }

    /// Look up a dotted path (`node.nginx.port`, `params.users.0`).
    pub fn lookup(&self, path: &str) -> Option<&serde_yaml_ng::Value> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                serde_yaml_ng::Value::Mapping(map) => map.get(segment)?,
                serde_yaml_ng::Value::Sequence(seq) => seq.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when both handles point at the same binding set.
    pub fn same(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.same(other) || self.0 == other.0
    }
}

// ============================================================================
// Recipe tree
// ============================================================================

/// Where a recipe node came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum RecipeOrigin {
    /// Root of a multi-recipe run.
    Run,
    /// A recipe file, by resolved absolute path.
    File { path: PathBuf },
    /// Expansion of a definition for one instance name.
    Definition { definition: String, instance: String },
}

impl fmt::Display for RecipeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::File { path } => write!(f, "recipe {}", path.display()),
            Self::Definition {
                definition,
                instance,
            } => write!(f, "{}[{}]", definition, instance),
        }
    }
}

/// A recipe node. Children are append-only.
#[derive(Debug, Clone, Serialize)]
pub struct Recipe {
    #[serde(flatten)]
    origin: RecipeOrigin,

    /// BLAKE3 of the recipe source (file recipes only)
    #[serde(skip_serializing_if = "Option::is_none")]
    source_hash: Option<String>,

    #[serde(skip)]
    scope: Scope,

    children: Vec<Node>,
}

impl Recipe {
    pub fn new(origin: RecipeOrigin, scope: Scope) -> Self {
        Self {
            origin,
            source_hash: None,
            scope,
            children: Vec::new(),
        }
    }

    pub fn from_file(path: PathBuf, scope: Scope, source_hash: String) -> Self {
        Self {
            source_hash: Some(source_hash),
            ..Self::new(RecipeOrigin::File { path }, scope)
        }
    }

    pub fn origin(&self) -> &RecipeOrigin {
        &self.origin
    }

    /// Resolved path of a file recipe.
    pub fn path(&self) -> Option<&Path> {
        match &self.origin {
            RecipeOrigin::File { path } => Some(path),
            _ => None,
        }
    }

    pub fn is_from_definition(&self) -> bool {
        matches!(self.origin, RecipeOrigin::Definition { .. })
    }

    pub fn source_hash(&self) -> Option<&str> {
        self.source_hash.as_deref()
    }

    /// Scope this recipe's statements were evaluated with.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub(crate) fn push(&mut self, node: Node) {
        self.children.push(node);
    }

    /// Immediate file-recipe child with this resolved path, if any.
    pub fn included(&self, path: &Path) -> Option<&Recipe> {
        self.children.iter().find_map(|node| match node {
            Node::Recipe(r) if r.path() == Some(path) => Some(r),
            _ => None,
        })
    }

    /// All resource declarations below this node, depth-first in declaration order.
    pub fn resources(&self) -> Vec<&ResourceDeclaration> {
        let mut out = Vec::new();
        collect_resources(self, &mut out);
        out
    }

    /// Number of recipe nodes below this one (not counting itself).
    pub fn recipe_count(&self) -> usize {
        self.children
            .iter()
            .map(|node| match node {
                Node::Recipe(r) => 1 + r.recipe_count(),
                Node::Resource(_) => 0,
            })
            .sum()
    }
}

fn collect_resources<'a>(recipe: &'a Recipe, out: &mut Vec<&'a ResourceDeclaration>) {
    for node in &recipe.children {
        match node {
            Node::Resource(r) => out.push(r),
            Node::Recipe(child) => collect_resources(child, out),
        }
    }
}

/// A child of a recipe.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Resource(ResourceDeclaration),
    Recipe(Recipe),
}

impl Node {
    pub fn as_resource(&self) -> Option<&ResourceDeclaration> {
        match self {
            Self::Resource(r) => Some(r),
            Self::Recipe(_) => None,
        }
    }

    pub fn as_recipe(&self) -> Option<&Recipe> {
        match self {
            Self::Recipe(r) => Some(r),
            Self::Resource(_) => None,
        }
    }
}

/// One desired-state item.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDeclaration {
    /// Resource kind (`package`, `execute`, ...)
    pub kind: String,

    /// Resource name as written (after interpolation)
    pub name: String,

    /// Normalized attributes, defaults applied
    pub attributes: Attributes,

    /// Scope at declaration time
    #[serde(skip)]
    pub scope: Scope,
}

impl fmt::Display for ResourceDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

/// The completed output of a run, handed to the convergence engine.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeTree {
    pub root: Recipe,
}

impl RecipeTree {
    pub fn resources(&self) -> Vec<&ResourceDeclaration> {
        self.root.resources()
    }

    pub fn recipe_count(&self) -> usize {
        self.root.recipe_count()
    }

    /// BLAKE3 digest of the serialized plan.
    pub fn digest(&self) -> String {
        super::hasher::hash_recipe(&self.root)
    }
}

// ============================================================================
// Value helpers
// ============================================================================

/// Convert a value to a string for interpolation.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
    }
}

/// Short type name of a value, for error messages.
pub fn yaml_type_name(val: &serde_yaml_ng::Value) -> &'static str {
    match val {
        serde_yaml_ng::Value::Null => "null",
        serde_yaml_ng::Value::Bool(_) => "bool",
        serde_yaml_ng::Value::Number(_) => "number",
        serde_yaml_ng::Value::String(_) => "string",
        serde_yaml_ng::Value::Sequence(_) => "list",
        serde_yaml_ng::Value::Mapping(_) => "map",
        serde_yaml_ng::Value::Tagged(_) => "tagged",
    }
}

// ============================================================================
// Tests
// ============================================================================
