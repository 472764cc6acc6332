//! SC-013: CLI subcommands (local, validate).
//!
//! `local` loads node attributes, evaluates the given recipes and prints the
//! resulting plan. Nothing is executed; `--dry-run` and `--shell` are carried
//! in [`LocalOptions`] for the executor that consumes the plan.

use crate::core::evaluator::Evaluator;
use crate::core::types::{
    yaml_value_to_string, Attributes, Node, Recipe, RecipeTree, Scope, NODE_KEY,
};
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding `--log-level` with a full filter directive.
pub const LOG_ENV: &str = "SOUSCHEF_LOG";

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate recipes for the local host and print the plan
    Local {
        #[command(flatten)]
        node: NodeArgs,

        /// Show what would be applied without applying it
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Shell the executor should run commands with
        #[arg(long, default_value = "/bin/sh")]
        shell: String,

        /// Log level (overridden by SOUSCHEF_LOG)
        #[arg(long, default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
        log_level: String,

        /// Plan output format
        #[arg(short = 'F', long, value_enum, default_value_t)]
        format: OutputFormat,

        /// Recipe files or directories
        #[arg(required = true)]
        recipes: Vec<PathBuf>,
    },

    /// Evaluate recipes and report errors without printing the plan
    Validate {
        #[command(flatten)]
        node: NodeArgs,

        /// Recipe files or directories
        #[arg(required = true)]
        recipes: Vec<PathBuf>,
    },
}

/// Sources of node attributes.
#[derive(Args, Debug, Clone, Default)]
pub struct NodeArgs {
    /// Node attributes as JSON
    #[arg(short = 'j', long)]
    pub node_json: Option<PathBuf>,

    /// Node attributes as YAML (merged over --node-json)
    #[arg(short = 'y', long)]
    pub node_yaml: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Default, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Yaml,
    Json,
}

/// Options of a local run, as handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalOptions {
    pub node_json: Option<PathBuf>,
    pub node_yaml: Option<PathBuf>,
    pub dry_run: bool,
    pub shell: String,
    pub log_level: String,
    pub format: OutputFormat,
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self {
            node_json: None,
            node_yaml: None,
            dry_run: false,
            shell: "/bin/sh".to_string(),
            log_level: "info".to_string(),
            format: OutputFormat::Text,
        }
    }
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Local {
            node,
            dry_run,
            shell,
            log_level,
            format,
            recipes,
        } => {
            let options = LocalOptions {
                node_json: node.node_json,
                node_yaml: node.node_yaml,
                dry_run,
                shell,
                log_level,
                format,
            };
            init_logging(&options.log_level);
            let out = cmd_local(&options, &recipes)?;
            print!("{}", out);
            Ok(())
        }
        Commands::Validate { node, recipes } => {
            init_logging("warn");
            cmd_validate(&node, &recipes)
        }
    }
}

/// Install the stderr `fmt` subscriber. A second call is a no-op.
pub fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Evaluate recipes and render the plan in the requested format.
pub fn cmd_local(options: &LocalOptions, recipes: &[PathBuf]) -> Result<String, String> {
    debug!(?options, "local run");
    let tree = evaluate(options.node_json.as_deref(), options.node_yaml.as_deref(), recipes)?;

    match options.format {
        OutputFormat::Text => {
            let mut out = render_tree(&tree);
            if options.dry_run {
                out.push_str("Dry run: plan not handed to an executor.\n");
            }
            Ok(out)
        }
        OutputFormat::Yaml => {
            serde_yaml_ng::to_string(&tree).map_err(|e| format!("cannot render plan: {}", e))
        }
        OutputFormat::Json => serde_json::to_string_pretty(&tree)
            .map(|s| s + "\n")
            .map_err(|e| format!("cannot render plan: {}", e)),
    }
}

fn cmd_validate(node: &NodeArgs, recipes: &[PathBuf]) -> Result<(), String> {
    let tree = evaluate(node.node_json.as_deref(), node.node_yaml.as_deref(), recipes)?;
    println!(
        "OK: {} recipe(s), {} resource(s)",
        tree.recipe_count(),
        tree.resources().len()
    );
    Ok(())
}

fn evaluate(
    node_json: Option<&Path>,
    node_yaml: Option<&Path>,
    recipes: &[PathBuf],
) -> Result<RecipeTree, String> {
    let node = load_node_attributes(node_json, node_yaml)?;
    let mut vars = Attributes::new();
    vars.insert(
        NODE_KEY.to_string(),
        serde_yaml_ng::Value::Mapping(
            node.into_iter()
                .map(|(k, v)| (serde_yaml_ng::Value::String(k), v))
                .collect(),
        ),
    );
    Evaluator::new()
        .run(recipes, Scope::new(vars))
        .map_err(|e| e.to_string())
}

/// Load node attributes; YAML keys override JSON keys at the top level.
pub fn load_node_attributes(
    json: Option<&Path>,
    yaml: Option<&Path>,
) -> Result<Attributes, String> {
    let mut attrs = Attributes::new();
    if let Some(path) = json {
        let content = read_file(path)?;
        let parsed: Attributes = serde_json::from_str(&content)
            .map_err(|e| format!("invalid node JSON {}: {}", path.display(), e))?;
        attrs.extend(parsed);
    }
    if let Some(path) = yaml {
        let content = read_file(path)?;
        let parsed: Option<Attributes> = serde_yaml_ng::from_str(&content)
            .map_err(|e| format!("invalid node YAML {}: {}", path.display(), e))?;
        attrs.extend(parsed.unwrap_or_default());
    }
    Ok(attrs)
}

fn read_file(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))
}

/// Render a plan as an indented tree.
pub fn render_tree(tree: &RecipeTree) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Plan: {} recipe(s), {} resource(s)",
        tree.recipe_count(),
        tree.resources().len()
    );
    for node in tree.root.children() {
        render_node(&mut out, node, 1);
    }
    let _ = writeln!(out, "Digest: {}", tree.digest());
    out
}

fn render_node(out: &mut String, node: &Node, depth: usize) {
    let indent = "  ".repeat(depth);
    match node {
        Node::Resource(r) => {
            let attrs: Vec<String> = r
                .attributes
                .iter()
                .map(|(k, v)| format!("{}={}", k, yaml_value_to_string(v)))
                .collect();
            if attrs.is_empty() {
                let _ = writeln!(out, "{}{}", indent, r);
            } else {
                let _ = writeln!(out, "{}{} {}", indent, r, attrs.join(" "));
            }
        }
        Node::Recipe(recipe) => render_recipe(out, recipe, depth),
    }
}

fn render_recipe(out: &mut String, recipe: &Recipe, depth: usize) {
    let _ = writeln!(out, "{}{}", "  ".repeat(depth), recipe.origin());
    for child in recipe.children() {
        render_node(out, child, depth + 1);
    }
}
