//! SC-012: Recipe evaluation.
//!
//! Executes recipe statements in source order against a tree node:
//! declare → normalize via the resource type → append
//! define → register in the run's definition registry
//! invoke → instantiate params → evaluate body in a fresh scope → append
//! include_recipe → resolve → dedup/cycle check → evaluate file → append
//!
//! Evaluation is synchronous and depth-first. A child node is attached to its
//! parent only after its own evaluation succeeded, so a failing statement
//! never leaves a partial child behind. Any error aborts the whole run.

use super::definition::{Definition, DefinitionRegistry};
use super::error::EvalError;
use super::hasher;
use super::parser::{self, Statement, DEFINE, INCLUDE_RECIPE};
use super::resolver::{interpolate, interpolate_block, resolve_include_path};
use super::types::{
    Attributes, Node, Recipe, RecipeOrigin, RecipeTree, ResourceDeclaration, Scope,
};
use crate::resources::ResourceTypes;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// State of one evaluation run: resource types, definitions, and the current
/// include and expansion chains.
#[derive(Debug)]
pub struct Evaluator {
    resources: ResourceTypes,
    definitions: DefinitionRegistry,
    include_chain: Vec<PathBuf>,
    expanding: Vec<String>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    /// Evaluator with the built-in resource types and no definitions.
    pub fn new() -> Self {
        Self::with_definitions(DefinitionRegistry::new())
    }

    /// Evaluator that starts from an existing registry, e.g. one taken from a
    /// previous run with [`Evaluator::into_definitions`].
    pub fn with_definitions(definitions: DefinitionRegistry) -> Self {
        Self {
            resources: ResourceTypes::builtin(),
            definitions,
            include_chain: Vec::new(),
            expanding: Vec::new(),
        }
    }

    /// Replace the set of resource types.
    pub fn with_resource_types(mut self, resources: ResourceTypes) -> Self {
        self.resources = resources;
        self
    }

    pub fn resource_types(&self) -> &ResourceTypes {
        &self.resources
    }

    pub fn definitions(&self) -> &DefinitionRegistry {
        &self.definitions
    }

    pub fn into_definitions(self) -> DefinitionRegistry {
        self.definitions
    }

    /// Evaluate one recipe file as the root of a tree.
    ///
    /// The path is resolved like an include target against the working
    /// directory (directory → `default.yaml`, `.yaml` appended).
    pub fn evaluate_file(&mut self, path: &Path, scope: Scope) -> Result<Recipe, EvalError> {
        let cwd = current_dir()?;
        let target = path.to_string_lossy();
        let resolved = resolve_include_path(&cwd, &target);
        if !resolved.exists() {
            return Err(EvalError::RecipeNotFound {
                target: target.into_owned(),
                resolved,
            });
        }
        let source = read_recipe(&resolved)?;
        self.evaluate_source(&resolved, &source, scope)
    }

    /// Evaluate recipe text that lives at `path` (absolute, already resolved).
    pub fn evaluate_source(
        &mut self,
        path: &Path,
        source: &str,
        scope: Scope,
    ) -> Result<Recipe, EvalError> {
        let statements = parser::parse_recipe(source, path)?;
        let mut recipe =
            Recipe::from_file(path.to_path_buf(), scope, hasher::hash_string(source));

        self.include_chain.push(path.to_path_buf());
        let result = RecipeContext::new(self, &mut recipe, path).execute(&statements);
        self.include_chain.pop();

        result.map(|()| recipe)
    }

    /// Evaluate several recipes under one `run` root.
    ///
    /// Each path is included from the working directory, so repeating a path
    /// is a no-op.
    pub fn run(&mut self, paths: &[PathBuf], scope: Scope) -> Result<RecipeTree, EvalError> {
        let cwd = current_dir()?;
        info!(recipes = paths.len(), "evaluating recipes");

        let mut root = Recipe::new(RecipeOrigin::Run, scope);
        {
            let mut ctx = RecipeContext::new(self, &mut root, &cwd);
            for path in paths {
                ctx.include_recipe(&path.to_string_lossy())?;
            }
        }

        let tree = RecipeTree { root };
        info!(
            recipes = tree.recipe_count(),
            resources = tree.resources().len(),
            definitions = self.definitions.len(),
            "evaluation complete"
        );
        Ok(tree)
    }
}

/// Binding between one recipe's statements and its tree node.
///
/// `declare`, `define_template`, `invoke` and `include_recipe` are the only
/// ways statements reach the tree.
pub struct RecipeContext<'a> {
    evaluator: &'a mut Evaluator,
    recipe: &'a mut Recipe,
    scope: Scope,
    /// File whose statements are executing (working directory for `run`)
    source: PathBuf,
    /// Directory include targets resolve against
    base_dir: PathBuf,
}

impl<'a> RecipeContext<'a> {
    /// Context for `recipe`, whose statements come from `source`.
    ///
    /// Includes resolve against the directory of `source`; for a `run` root,
    /// `source` is that directory itself.
    pub fn new(evaluator: &'a mut Evaluator, recipe: &'a mut Recipe, source: &Path) -> Self {
        let base_dir = match recipe.origin() {
            RecipeOrigin::Run => source.to_path_buf(),
            _ => source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("/")),
        };
        Self::with_base_dir(evaluator, recipe, source, base_dir)
    }

    fn with_base_dir(
        evaluator: &'a mut Evaluator,
        recipe: &'a mut Recipe,
        source: &Path,
        base_dir: PathBuf,
    ) -> Self {
        Self {
            scope: recipe.scope().clone(),
            evaluator,
            recipe,
            source: source.to_path_buf(),
            base_dir,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Execute statements in order; stops at the first error.
    pub fn execute(&mut self, statements: &[Statement]) -> Result<(), EvalError> {
        for statement in statements {
            match statement {
                Statement::Call {
                    target,
                    name,
                    block,
                } => self.call(target, name, block.as_ref())?,
                Statement::Define(def) => self.define_template(Definition {
                    name: def.name.clone(),
                    params: def.params.clone(),
                    body: def.body.clone(),
                    origin: self.source.clone(),
                    base_dir: self.base_dir.clone(),
                })?,
                Statement::IncludeRecipe { target } => self.include_recipe(target)?,
            }
        }
        Ok(())
    }

    /// Dispatch `<target>: <name>`: resource types first, then definitions.
    fn call(
        &mut self,
        target: &str,
        name: &str,
        block: Option<&Attributes>,
    ) -> Result<(), EvalError> {
        trace!(statement = %target, resource = %name, source = %self.source.display(), "statement");
        if self.evaluator.resources.contains(target) {
            self.declare(target, name, block)
        } else if self.evaluator.definitions.contains(target) {
            self.invoke(target, name, block)
        } else {
            Err(EvalError::malformed(
                &self.source,
                format!("unknown resource type or definition '{}'", target),
            ))
        }
    }

    /// Append a resource declaration carrying the current scope.
    pub fn declare(
        &mut self,
        kind: &str,
        name: &str,
        block: Option<&Attributes>,
    ) -> Result<(), EvalError> {
        let name = interpolate(name, &self.scope, &self.source)?;
        let block = match block {
            Some(b) => interpolate_block(b, &self.scope, &self.source)?,
            None => Attributes::new(),
        };
        let resource_type = self.evaluator.resources.get(kind).ok_or_else(|| {
            EvalError::malformed(&self.source, format!("unknown resource type '{}'", kind))
        })?;
        let attributes =
            resource_type
                .normalize(&name, block)
                .map_err(|message| EvalError::Resource {
                    kind: kind.to_string(),
                    name: name.clone(),
                    message,
                })?;

        self.recipe.push(Node::Resource(ResourceDeclaration {
            kind: kind.to_string(),
            name,
            attributes,
            scope: self.scope.clone(),
        }));
        Ok(())
    }

    /// Register a definition for the rest of the run.
    pub fn define_template(&mut self, definition: Definition) -> Result<(), EvalError> {
        let name = definition.name.clone();
        if name == DEFINE || name == INCLUDE_RECIPE {
            return Err(EvalError::schema(&name, "name is a reserved statement"));
        }
        if self.evaluator.resources.contains(&name) {
            return Err(EvalError::schema(&name, "name collides with a resource type"));
        }

        if self.evaluator.definitions.register(definition).is_some() {
            warn!(definition = %name, source = %self.source.display(), "definition replaced");
        } else {
            debug!(definition = %name, source = %self.source.display(), "definition registered");
        }
        Ok(())
    }

    /// Expand a registered definition for one instance.
    pub fn invoke(
        &mut self,
        definition: &str,
        instance: &str,
        block: Option<&Attributes>,
    ) -> Result<(), EvalError> {
        let def = self
            .evaluator
            .definitions
            .get(definition)
            .ok_or_else(|| EvalError::schema(definition, "not defined"))?;
        if self.evaluator.expanding.iter().any(|d| d == &def.name) {
            return Err(EvalError::CyclicExpansion {
                definition: def.name.clone(),
            });
        }

        let instance = interpolate(instance, &self.scope, &self.source)?;
        let provided = match block {
            Some(b) => Some(interpolate_block(b, &self.scope, &self.source)?),
            None => None,
        };
        let params = def.instantiate(&instance, provided.as_ref())?;

        debug!(definition = %def.name, instance = %instance, "expanding definition");
        let mut child = Recipe::new(
            RecipeOrigin::Definition {
                definition: def.name.clone(),
                instance,
            },
            Scope::with_params(params),
        );

        self.evaluator.expanding.push(def.name.clone());
        let result = RecipeContext::with_base_dir(
            &mut *self.evaluator,
            &mut child,
            &def.origin,
            def.base_dir.clone(),
        )
        .execute(&def.body);
        self.evaluator.expanding.pop();
        result?;

        self.recipe.push(Node::Recipe(child));
        Ok(())
    }

    /// Include another recipe, evaluated with this context's scope.
    pub fn include_recipe(&mut self, target: &str) -> Result<(), EvalError> {
        let expanded = interpolate(target, &self.scope, &self.source)?;
        let path = resolve_include_path(&self.base_dir, &expanded);

        if !path.exists() {
            return Err(EvalError::RecipeNotFound {
                target: target.to_string(),
                resolved: path,
            });
        }

        if self.recipe.included(&path).is_some() {
            debug!(path = %path.display(), "recipe skipped, already included");
            return Ok(());
        }

        if self.evaluator.include_chain.contains(&path) {
            let mut chain = self.evaluator.include_chain.clone();
            chain.push(path);
            return Err(EvalError::CyclicInclusion { chain });
        }

        debug!(path = %path.display(), from = %self.source.display(), "including recipe");
        let source = read_recipe(&path)?;
        let child = self
            .evaluator
            .evaluate_source(&path, &source, self.scope.clone())?;
        self.recipe.push(Node::Recipe(child));
        Ok(())
    }
}

fn read_recipe(path: &Path) -> Result<String, EvalError> {
    std::fs::read_to_string(path).map_err(|source| EvalError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn current_dir() -> Result<PathBuf, EvalError> {
    std::env::current_dir().map_err(|source| EvalError::Io {
        path: PathBuf::from("."),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PARAMS_KEY;
    use proptest::prelude::*;
    use serde_yaml_ng::Value;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    fn eval(path: &Path) -> Result<Recipe, EvalError> {
        Evaluator::new().evaluate_file(path, Scope::default())
    }

    fn node_scope() -> Scope {
        Scope::new(serde_yaml_ng::from_str("node:\n  role: web\n  port: 8080\n").unwrap())
    }

    fn kinds_and_names(recipe: &Recipe) -> Vec<(String, String)> {
        recipe
            .resources()
            .iter()
            .map(|r| (r.kind.clone(), r.name.clone()))
            .collect()
    }

    #[test]
    fn test_sc012_declaration_order_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.yaml",
            "- package: nginx\n- execute: apt-get update\n- package: curl\n- service: nginx\n",
        );
        let recipe = eval(&main).unwrap();
        assert_eq!(recipe.children().len(), 4);
        assert_eq!(
            kinds_and_names(&recipe),
            vec![
                ("package".into(), "nginx".into()),
                ("execute".into(), "apt-get update".into()),
                ("package".into(), "curl".into()),
                ("service".into(), "nginx".into()),
            ]
        );
        assert_eq!(recipe.path(), Some(main.as_path()));
        assert!(recipe.source_hash().unwrap().starts_with("blake3:"));
    }

    #[test]
    fn test_sc012_include_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.yaml", "- include_recipe: sub\n");
        let sub = write(dir.path(), "sub.yaml", "- package: nginx\n");

        let root = Evaluator::new().evaluate_file(&main, node_scope()).unwrap();
        assert_eq!(root.children().len(), 1);
        let child = root.children()[0].as_recipe().unwrap();
        assert_eq!(child.path(), Some(sub.as_path()));
        assert_eq!(child.children().len(), 1);
        let pkg = child.children()[0].as_resource().unwrap();
        assert_eq!(pkg.kind, "package");
        assert_eq!(pkg.name, "nginx");
        assert!(pkg.scope.same(root.scope()));
        assert!(child.scope().same(root.scope()));
    }

    #[test]
    fn test_sc012_include_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.yaml",
            "- include_recipe: sub\n- include_recipe: sub.yaml\n- include_recipe: ./sub\n",
        );
        write(dir.path(), "sub.yaml", "- package: nginx\n");
        let root = eval(&main).unwrap();
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.resources().len(), 1);
    }

    #[test]
    fn test_sc012_include_missing() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.yaml",
            "- package: before\n- include_recipe: missing\n",
        );
        let err = eval(&main).unwrap_err();
        assert!(matches!(err, EvalError::RecipeNotFound { ref target, .. } if target == "missing"));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_sc012_include_missing_leaves_children_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.yaml");
        let mut evaluator = Evaluator::new();
        let mut recipe = Recipe::from_file(main.clone(), Scope::default(), String::new());
        let mut ctx = RecipeContext::new(&mut evaluator, &mut recipe, &main);
        ctx.declare("package", "nginx", None).unwrap();
        let err = ctx.include_recipe("missing").unwrap_err();
        assert!(matches!(err, EvalError::RecipeNotFound { .. }));
        assert_eq!(kinds_and_names(&recipe), vec![("package".into(), "nginx".into())]);
    }

    #[test]
    fn test_sc012_include_directory_default() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.yaml", "- include_recipe: roles/web\n");
        let default = write(dir.path(), "roles/web/default.yaml", "- package: nginx\n");
        let root = eval(&main).unwrap();
        let child = root.children()[0].as_recipe().unwrap();
        assert_eq!(child.path(), Some(default.as_path()));
    }

    #[test]
    fn test_sc012_nested_include_relative_to_includer() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.yaml", "- include_recipe: roles/web\n");
        write(
            dir.path(),
            "roles/web.yaml",
            "- include_recipe: ../common/base\n- package: nginx\n",
        );
        write(dir.path(), "common/base.yaml", "- package: curl\n");
        let root = eval(&main).unwrap();
        assert_eq!(
            kinds_and_names(&root),
            vec![
                ("package".into(), "curl".into()),
                ("package".into(), "nginx".into())
            ]
        );
    }

    #[test]
    fn test_sc012_same_file_from_two_branches_evaluated_twice() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.yaml", "- include_recipe: a\n- include_recipe: b\n");
        write(dir.path(), "a.yaml", "- include_recipe: common\n");
        write(dir.path(), "b.yaml", "- include_recipe: common\n");
        write(dir.path(), "common.yaml", "- package: curl\n");
        let root = eval(&main).unwrap();
        assert_eq!(root.resources().len(), 2);
        assert_eq!(root.recipe_count(), 4);
    }

    #[test]
    fn test_sc012_self_include_is_cyclic() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.yaml", "- include_recipe: main\n");
        let err = eval(&main).unwrap_err();
        assert!(matches!(err, EvalError::CyclicInclusion { ref chain } if chain.len() == 2));
    }

    #[test]
    fn test_sc012_ancestor_include_is_cyclic() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.yaml", "- include_recipe: a\n");
        write(dir.path(), "a.yaml", "- include_recipe: b\n");
        write(dir.path(), "b.yaml", "- include_recipe: main\n");
        let err = eval(&main).unwrap_err();
        let EvalError::CyclicInclusion { chain } = &err else {
            panic!("expected cycle, got {:?}", err);
        };
        assert_eq!(chain.first(), chain.last());
        assert_eq!(chain.len(), 4);
        assert!(err.to_string().contains("a.yaml -> "));
    }

    #[test]
    fn test_sc012_define_and_invoke() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.yaml",
            r#"
- define:
    name: app
    params:
      version: "1.0"
    body:
      - package: "{{ params.name }}"
- app: foo
"#,
        );
        let root = eval(&main).unwrap();
        assert_eq!(root.children().len(), 1);
        let expanded = root.children()[0].as_recipe().unwrap();
        assert!(expanded.is_from_definition());
        assert_eq!(
            expanded.origin(),
            &RecipeOrigin::Definition {
                definition: "app".into(),
                instance: "foo".into()
            }
        );

        let scope = expanded.scope();
        assert_eq!(scope.names().collect::<Vec<_>>(), vec![PARAMS_KEY]);
        let expected: Value = serde_yaml_ng::from_str("version: \"1.0\"\nname: foo\n").unwrap();
        assert_eq!(scope.get(PARAMS_KEY), Some(&expected));

        let pkg = expanded.children()[0].as_resource().unwrap();
        assert_eq!(pkg.name, "foo");
        assert!(pkg.scope.same(scope));
    }

    #[test]
    fn test_sc012_definition_block_uses_caller_scope() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.yaml",
            r#"
- define:
    name: vhost
    params:
      port:
        type: int
    body:
      - file:
          name: "/etc/nginx/sites-enabled/{{ params.name }}"
          content: "listen {{ params.port }};"
- vhost:
    name: "{{ node.role }}"
    port: "{{ node.port }}"
"#,
        );
        let root = Evaluator::new().evaluate_file(&main, node_scope()).unwrap();
        let file = root.resources()[0];
        assert_eq!(file.name, "/etc/nginx/sites-enabled/web");
        assert_eq!(
            file.attributes["content"],
            Value::String("listen 8080;".into())
        );
    }

    #[test]
    fn test_sc012_definition_body_cannot_see_caller_scope() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.yaml",
            r#"
- define:
    name: leaky
    body:
      - package: "{{ node.role }}"
- leaky: x
"#,
        );
        let err = Evaluator::new()
            .evaluate_file(&main, node_scope())
            .unwrap_err();
        assert!(matches!(err, EvalError::UndefinedVariable { ref name } if name == "node.role"));
    }

    #[test]
    fn test_sc012_schema_error_leaves_no_child() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.yaml");
        let mut evaluator = Evaluator::new();
        let mut recipe = Recipe::from_file(main.clone(), Scope::default(), String::new());
        let mut ctx = RecipeContext::new(&mut evaluator, &mut recipe, &main);
        let statements = parser::parse_recipe(
            "- define:\n    name: svc\n    params:\n      port:\n        type: int\n    body:\n      - package: x\n",
            &main,
        )
        .unwrap();
        ctx.execute(&statements).unwrap();
        let err = ctx.invoke("svc", "a", None).unwrap_err();
        assert!(matches!(err, EvalError::Schema { ref definition, .. } if definition == "svc"));
        assert!(recipe.children().is_empty());
    }

    #[test]
    fn test_sc012_failed_body_leaves_no_child() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.yaml");
        let mut evaluator = Evaluator::new();
        let mut recipe = Recipe::from_file(main.clone(), Scope::default(), String::new());
        let mut ctx = RecipeContext::new(&mut evaluator, &mut recipe, &main);
        let statements = parser::parse_recipe(
            "- define:\n    name: broken\n    body:\n      - package: ok\n      - include_recipe: nowhere\n",
            &main,
        )
        .unwrap();
        ctx.execute(&statements).unwrap();
        assert!(ctx.invoke("broken", "a", None).is_err());
        assert!(recipe.children().is_empty());
    }

    #[test]
    fn test_sc012_definition_with_name_param_invocable() {
        let path = PathBuf::from("/virtual/main.yaml");
        let source = r#"
- define:
    name: site
    params:
      name:
        type: string
    body:
      - package: "{{ params.name }}"
- site: blog
"#;
        let recipe = Evaluator::new()
            .evaluate_source(&path, source, Scope::default())
            .unwrap();
        assert_eq!(kinds_and_names(&recipe), vec![("package".into(), "blog".into())]);
    }

    #[test]
    fn test_sc012_unquoted_package_version_rejected() {
        let path = PathBuf::from("/virtual/main.yaml");
        let err = Evaluator::new()
            .evaluate_source(
                &path,
                "- package:\n    name: nginx\n    version: 1.10\n",
                Scope::default(),
            )
            .unwrap_err();
        assert!(matches!(err, EvalError::Resource { ref kind, .. } if kind == "package"));
        assert!(err.to_string().contains("quote numeric versions"), "{}", err);
    }

    #[test]
    fn test_sc012_definitions_visible_in_included_recipes() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.yaml",
            "- define:\n    name: tool\n    body:\n      - package: \"{{ params.name }}\"\n- include_recipe: sub\n",
        );
        write(dir.path(), "sub.yaml", "- tool: jq\n");
        let root = eval(&main).unwrap();
        assert_eq!(kinds_and_names(&root), vec![("package".into(), "jq".into())]);
    }

    #[test]
    fn test_sc012_include_inside_definition_resolves_from_defining_recipe() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.yaml",
            "- include_recipe: lib/defs\n- site: blog\n",
        );
        write(
            dir.path(),
            "lib/defs.yaml",
            "- define:\n    name: site\n    body:\n      - include_recipe: helpers\n",
        );
        write(dir.path(), "lib/helpers.yaml", "- package: rsync\n");
        let root = eval(&main).unwrap();
        assert_eq!(kinds_and_names(&root), vec![("package".into(), "rsync".into())]);
    }

    #[test]
    fn test_sc012_invoke_before_define_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.yaml",
            "- later: x\n- define:\n    name: later\n",
        );
        let err = eval(&main).unwrap_err();
        assert!(err.to_string().contains("unknown resource type or definition 'later'"));
    }

    #[test]
    fn test_sc012_define_colliding_with_resource_type() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.yaml", "- define:\n    name: package\n");
        let err = eval(&main).unwrap_err();
        assert!(matches!(err, EvalError::Schema { .. }));
        assert!(err.to_string().contains("collides"));
    }

    #[test]
    fn test_sc012_redefinition_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.yaml",
            r#"
- define:
    name: tool
    body:
      - package: old
- define:
    name: tool
    body:
      - package: new
- tool: x
"#,
        );
        let root = eval(&main).unwrap();
        assert_eq!(kinds_and_names(&root), vec![("package".into(), "new".into())]);
    }

    #[test]
    fn test_sc012_recursive_definition_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.yaml",
            "- define:\n    name: loop\n    body:\n      - loop: again\n- loop: start\n",
        );
        let err = eval(&main).unwrap_err();
        assert!(matches!(err, EvalError::CyclicExpansion { ref definition } if definition == "loop"));
    }

    #[test]
    fn test_sc012_nested_definitions_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.yaml",
            r#"
- define:
    name: inner
    body:
      - package: "{{ params.name }}"
- define:
    name: outer
    body:
      - inner: "{{ params.name }}-lib"
      - inner: "{{ params.name }}-bin"
- outer: tool
- outer: tool
"#,
        );
        let root = eval(&main).unwrap();
        let names: Vec<_> = root.resources().iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["tool-lib", "tool-bin", "tool-lib", "tool-bin"]);
        assert_eq!(root.children().len(), 2);
    }

    #[test]
    fn test_sc012_resource_error_names_resource() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.yaml", "- package:\n    name: nginx\n    action: purge\n");
        let err = eval(&main).unwrap_err();
        assert!(matches!(err, EvalError::Resource { .. }));
        assert!(err.to_string().starts_with("package[nginx]:"));
    }

    #[test]
    fn test_sc012_malformed_recipe_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.yaml", "- include_recipe: sub\n");
        write(dir.path(), "sub.yaml", "package: nginx\n");
        let err = eval(&main).unwrap_err();
        let EvalError::MalformedRecipe { path, .. } = err else {
            panic!("expected malformed recipe");
        };
        assert!(path.ends_with("sub.yaml"));
    }

    #[test]
    fn test_sc012_include_target_interpolated() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.yaml", "- include_recipe: \"roles/{{ node.role }}\"\n");
        write(dir.path(), "roles/web.yaml", "- package: nginx\n");
        let root = Evaluator::new().evaluate_file(&main, node_scope()).unwrap();
        assert_eq!(root.resources().len(), 1);
    }

    #[test]
    fn test_sc012_scope_identical_across_statements() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.yaml",
            "- package: a\n- execute: \"echo {{ node.role }}\"\n- package: b\n",
        );
        let scope = node_scope();
        let root = Evaluator::new().evaluate_file(&main, scope.clone()).unwrap();
        for r in root.resources() {
            assert!(r.scope.same(&scope));
            assert_eq!(r.scope.lookup("node.role"), Some(&Value::String("web".into())));
        }
    }

    #[test]
    fn test_sc012_run_dedups_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.yaml", "- package: a\n");
        let b = write(dir.path(), "b.yaml", "- package: b\n");
        let mut evaluator = Evaluator::new();
        let tree = evaluator
            .run(&[a.clone(), b, a], Scope::default())
            .unwrap();
        assert_eq!(tree.root.origin(), &RecipeOrigin::Run);
        assert_eq!(tree.root.children().len(), 2);
        let names: Vec<_> = tree.resources().iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(tree.digest().starts_with("blake3:"));
    }

    #[test]
    fn test_sc012_registry_is_per_evaluator() {
        let dir = tempfile::tempdir().unwrap();
        let defs = write(
            dir.path(),
            "defs.yaml",
            "- define:\n    name: tool\n    body:\n      - package: \"{{ params.name }}\"\n",
        );
        let user = write(dir.path(), "user.yaml", "- tool: jq\n");

        let mut first = Evaluator::new();
        first.evaluate_file(&defs, Scope::default()).unwrap();
        assert!(first.definitions().contains("tool"));

        assert!(Evaluator::new().evaluate_file(&user, Scope::default()).is_err());

        let mut shared = Evaluator::with_definitions(first.into_definitions());
        let root = shared.evaluate_file(&user, Scope::default()).unwrap();
        assert_eq!(root.resources()[0].name, "jq");
    }

    #[test]
    fn test_sc012_custom_resource_types() {
        use crate::resources::{ResourceType, ResourceTypes};

        struct Cron;
        impl ResourceType for Cron {
            fn kind(&self) -> &'static str {
                "cron"
            }
            fn normalize(&self, _name: &str, block: Attributes) -> Result<Attributes, String> {
                Ok(block)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.yaml", "- cron: backup\n- package: x\n");
        let mut types = ResourceTypes::empty();
        types.register(Cron);
        let mut evaluator = Evaluator::new().with_resource_types(types);
        let err = evaluator.evaluate_file(&main, Scope::default()).unwrap_err();
        assert!(err.to_string().contains("'package'"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_sc012_children_match_statements(names in proptest::collection::vec("[a-z]{1,8}", 0..20)) {
            let source: String = names.iter().map(|n| format!("- package: \"{}\"\n", n)).collect();
            let path = PathBuf::from("/virtual/main.yaml");
            let recipe = Evaluator::new()
                .evaluate_source(&path, &source, Scope::default())
                .unwrap();
            let got: Vec<_> = recipe.resources().iter().map(|r| r.name.clone()).collect();
            prop_assert_eq!(got, names);
        }
    }
}
