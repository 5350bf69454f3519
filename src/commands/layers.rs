//! # Layers Command Implementation
//!
//! This module implements the `layers` subcommand, which resolves the layer
//! collection and shows it without touching any clone.
//!
//! ## Functionality
//!
//! - **Listing**: every layer with its source, plus the collection's identity hash
//! - **Fetch Plan**: the clones a `fetch` would reconcile and the layers each serves
//! - **Tree View**: `--tree` renders clone → layers with `ptree`
//! - **Machine Output**: `--format yaml|json`
//!
//! Ref conflicts between layers sharing a clone are reported here exactly as
//! `fetch` would report them.

use anyhow::{anyhow, Result};
use clap::{Args, ValueEnum};
use ptree::{print_tree, TreeItem};
use serde::Serialize;
use std::path::PathBuf;

use hopper::environment::Environment;
use hopper::fetch::FetchPlan;
use hopper::layers::{Layer, LayerCollection};
use hopper::output::{Marker, OutputConfig};
use hopper::process::SystemRunner;

use super::{EnvArgs, LayerArgs};

/// Show the resolved layer collection and its fetch plan
#[derive(Args, Debug, Clone, Default)]
pub struct LayersArgs {
    #[command(flatten)]
    pub layers: LayerArgs,

    #[command(flatten)]
    pub env: EnvArgs,

    /// Render clones and their layers as a tree.
    #[arg(long, conflicts_with = "format")]
    pub tree: bool,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Output formats for the layer listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable listing
    #[default]
    Text,
    /// YAML document
    Yaml,
    /// JSON document
    Json,
}

#[derive(Debug, Serialize)]
struct CloneSummary {
    clone: String,
    remote: String,
    r#ref: String,
    path: PathBuf,
    layers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CollectionSummary {
    hash: String,
    version: Option<String>,
    layers: Vec<Layer>,
    clones: Vec<CloneSummary>,
    local: Vec<String>,
}

impl CollectionSummary {
    fn new(collection: &LayerCollection, plan: &FetchPlan) -> Self {
        Self {
            hash: collection.hash(),
            version: collection.default_version().map(str::to_string),
            layers: collection.iter().cloned().collect(),
            clones: plan
                .entries()
                .map(|entry| CloneSummary {
                    clone: entry.clone_name.clone(),
                    remote: entry.remote.clone(),
                    r#ref: entry.r#ref.clone(),
                    path: entry.path.clone(),
                    layers: entry.layers.clone(),
                })
                .collect(),
            local: plan.local_layers().to_vec(),
        }
    }
}

/// Execute the `layers` command.
pub fn execute(args: LayersArgs, output: &OutputConfig) -> Result<()> {
    let runner = SystemRunner;
    let file = super::load_layer_file(&args.layers)?;
    let collection = super::load_collection(&args.layers, &file, &runner)?;
    let env = super::environment(&args.env, &file)?;
    let plan = FetchPlan::build(&collection, &env)?;

    if args.tree {
        let root = build_tree(&collection, &plan);
        return print_tree(&root).map_err(|e| anyhow!("Failed to display tree: {}", e));
    }

    match args.format {
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(&CollectionSummary::new(&collection, &plan))?);
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&CollectionSummary::new(&collection, &plan))?
            );
        }
        OutputFormat::Text => print_text(&collection, &plan, &env, output),
    }
    Ok(())
}

fn print_text(collection: &LayerCollection, plan: &FetchPlan, env: &Environment, output: &OutputConfig) {
    println!(
        "{} {} layers (hash {})",
        output.marker(Marker::Layers),
        collection.len(),
        collection.hash()
    );
    for layer in collection {
        let source = layer
            .source
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "<unresolved>".to_string());
        let path = layer
            .source_path(env)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<not found>".to_string());
        println!("  {:<24} {}  -> {}", layer.full_name(), source, path);
    }

    println!();
    println!("{} {} clones", output.marker(Marker::Clones), plan.len());
    for entry in plan.entries() {
        println!(
            "  {} @ {} ({}): {}",
            entry.clone_name,
            entry.r#ref,
            entry.remote,
            entry.layers.join(", ")
        );
    }
}

fn build_tree(collection: &LayerCollection, plan: &FetchPlan) -> TreeNode {
    let mut children: Vec<TreeNode> = plan
        .entries()
        .map(|entry| TreeNode {
            label: format!("{} @ {} ({})", entry.clone_name, entry.r#ref, entry.remote),
            children: entry.layers.iter().map(|name| TreeNode::leaf(name)).collect(),
        })
        .collect();

    if !plan.local_layers().is_empty() {
        children.push(TreeNode {
            label: "local".to_string(),
            children: plan.local_layers().iter().map(|name| TreeNode::leaf(name)).collect(),
        });
    }

    TreeNode {
        label: format!("layers {}", collection.hash()),
        children,
    }
}

/// Tree node structure for ptree visualization
#[derive(Clone)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(label: &str) -> Self {
        Self {
            label: label.to_string(),
            children: vec![],
        }
    }
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(
        &self,
        f: &mut W,
        _style: &ptree::Style,
    ) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> std::borrow::Cow<'_, [Self::Child]> {
        std::borrow::Cow::Borrowed(&self.children)
    }
}
