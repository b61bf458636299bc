//! Command tree assembled from plugin registrations.
//!
//! Plugins register group nodes and leaves by parent label, in any order.
//! [`Registry::build`] links them into a [`CommandTree`], resolving metadata
//! inheritance once: a child keeps what it declares and takes the rest
//! from its parent.

use super::args::{ArgSpec, Invocation};
use super::crud::Crud;
use crate::context::Context;
use anyhow::{Result, bail};
use std::collections::{BTreeMap, BTreeSet};

/// Label of the root node.
pub const ROOT: &str = "";

/// Hand-written leaf handler.
pub type Handler = fn(&mut Context, &Invocation) -> Result<()>;

/// What a leaf does when invoked.
#[derive(Debug, Clone)]
pub enum Action {
    Custom(Handler),
    Crud(Crud),
}

/// Settings inherited down the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// CMP subsystem the commands talk to.
    pub subsystem: Option<String>,
    /// Path prepended to the leaf's path templates.
    pub base_uri: Option<String>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl Metadata {
    pub fn subsystem(subsystem: &str, base_uri: &str) -> Self {
        Self {
            subsystem: Some(subsystem.to_string()),
            base_uri: Some(base_uri.to_string()),
            headers: Vec::new(),
        }
    }

    /// Fill unset fields from `parent`.
    pub fn inherit(&self, parent: &Self) -> Self {
        let mut headers = parent.headers.clone();
        for (name, value) in &self.headers {
            headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }
        Self {
            subsystem: self.subsystem.clone().or_else(|| parent.subsystem.clone()),
            base_uri: self.base_uri.clone().or_else(|| parent.base_uri.clone()),
            headers,
        }
    }
}

/// A group node declaration.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub parent: String,
    pub name: &'static str,
    pub help: &'static str,
    pub meta: Metadata,
}

/// A leaf command declaration.
#[derive(Debug, Clone)]
pub struct LeafSpec {
    pub parent: String,
    pub name: &'static str,
    pub help: &'static str,
    pub description: Option<&'static str>,
    pub example: Option<&'static str>,
    pub args: Vec<ArgSpec>,
    pub meta: Metadata,
    pub action: Action,
    /// Whether the pre-command hook must connect to the CMP.
    pub requires_api: bool,
}

impl LeafSpec {
    pub fn new(parent: &str, name: &'static str, help: &'static str, action: Action) -> Self {
        let requires_api = matches!(action, Action::Crud(_));
        Self {
            parent: parent.to_string(),
            name,
            help,
            description: None,
            example: None,
            args: Vec::new(),
            meta: Metadata::default(),
            action,
            requires_api,
        }
    }

    pub fn custom(parent: &str, name: &'static str, help: &'static str, handler: Handler) -> Self {
        Self::new(parent, name, help, Action::Custom(handler))
    }

    pub fn crud(parent: &str, name: &'static str, help: &'static str, crud: Crud) -> Self {
        let args = crud.args();
        Self {
            args,
            ..Self::new(parent, name, help, Action::Crud(crud))
        }
    }

    pub fn description(mut self, text: &'static str) -> Self {
        self.description = Some(text);
        self
    }

    pub fn example(mut self, text: &'static str) -> Self {
        self.example = Some(text);
        self
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_api(mut self) -> Self {
        self.requires_api = true;
        self
    }
}

/// Collects registrations from plugins.
#[derive(Debug, Default)]
pub struct Registry {
    nodes: Vec<NodeSpec>,
    leaves: Vec<LeafSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group node under `parent` (a dotted label, `""` for root).
    pub fn node(&mut self, parent: &str, name: &'static str, help: &'static str, meta: Metadata) {
        self.nodes.push(NodeSpec {
            parent: parent.to_string(),
            name,
            help,
            meta,
        });
    }

    pub fn leaf(&mut self, leaf: LeafSpec) {
        self.leaves.push(leaf);
    }

    /// Link registrations into a tree.
    pub fn build(self) -> Result<CommandTree> {
        let mut labels = BTreeSet::new();
        labels.insert(ROOT.to_string());
        for node in &self.nodes {
            if !labels.insert(join(&node.parent, node.name)) {
                bail!("command group '{}' registered twice", join(&node.parent, node.name));
            }
        }
        for node in &self.nodes {
            if !labels.contains(&node.parent) {
                bail!(
                    "command group '{}' refers to unknown parent '{}'",
                    node.name,
                    node.parent
                );
            }
        }
        let mut seen_leaves = BTreeSet::new();
        for leaf in &self.leaves {
            if !labels.contains(&leaf.parent) {
                bail!(
                    "command '{}' refers to unknown parent '{}'",
                    leaf.name,
                    leaf.parent
                );
            }
            let label = join(&leaf.parent, leaf.name);
            if labels.contains(&label) || !seen_leaves.insert(label.clone()) {
                bail!("command '{label}' registered twice");
            }
            if let Some(arg) = leaf
                .args
                .iter()
                .find(|a| super::GLOBAL_LONG_NAMES.contains(&a.name))
            {
                bail!("command '{label}' redefines the global option --{}", arg.name);
            }
        }

        let mut by_parent: BTreeMap<String, Vec<NodeSpec>> = BTreeMap::new();
        for node in self.nodes {
            by_parent.entry(node.parent.clone()).or_default().push(node);
        }
        let mut leaves_by_parent: BTreeMap<String, Vec<LeafSpec>> = BTreeMap::new();
        for leaf in self.leaves {
            leaves_by_parent.entry(leaf.parent.clone()).or_default().push(leaf);
        }

        let root = link(
            ROOT,
            "beehive",
            "Operator CLI for the cloud-management platform",
            &Metadata::default(),
            &mut by_parent,
            &mut leaves_by_parent,
        );
        Ok(CommandTree { root })
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn link(
    label: &str,
    name: &str,
    help: &str,
    meta: &Metadata,
    nodes: &mut BTreeMap<String, Vec<NodeSpec>>,
    leaves: &mut BTreeMap<String, Vec<LeafSpec>>,
) -> Group {
    let mut children: Vec<Group> = nodes
        .remove(label)
        .unwrap_or_default()
        .into_iter()
        .map(|node| {
            let child_meta = node.meta.inherit(meta);
            link(
                &join(label, node.name),
                node.name,
                node.help,
                &child_meta,
                nodes,
                leaves,
            )
        })
        .collect();
    children.sort_by(|a, b| a.name.cmp(&b.name));

    let mut leaf_list: Vec<Leaf> = leaves
        .remove(label)
        .unwrap_or_default()
        .into_iter()
        .map(|spec| {
            let resolved = spec.meta.inherit(meta);
            Leaf {
                path: join(label, spec.name).replace('.', " "),
                meta: resolved,
                spec,
            }
        })
        .collect();
    leaf_list.sort_by(|a, b| a.spec.name.cmp(b.spec.name));

    Group {
        name: name.to_string(),
        help: help.to_string(),
        meta: meta.clone(),
        groups: children,
        leaves: leaf_list,
    }
}

/// A leaf with its resolved metadata.
#[derive(Debug, Clone)]
pub struct Leaf {
    /// Space separated path from the root, e.g. `auth users get`.
    pub path: String,
    pub meta: Metadata,
    pub spec: LeafSpec,
}

/// A group node with its children.
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub help: String,
    pub meta: Metadata,
    pub groups: Vec<Group>,
    pub leaves: Vec<Leaf>,
}

/// The linked command tree.
#[derive(Debug, Clone)]
pub struct CommandTree {
    pub root: Group,
}

impl CommandTree {
    /// Find a leaf by its path segments.
    #[cfg(test)]
    pub fn find(&self, path: &[&str]) -> Option<&Leaf> {
        let (leaf_name, groups) = path.split_last()?;
        let mut group = &self.root;
        for name in groups {
            group = group.groups.iter().find(|g| g.name == *name)?;
        }
        group.leaves.iter().find(|l| l.spec.name == *leaf_name)
    }

    /// Every leaf, depth first.
    pub fn leaves(&self) -> Vec<&Leaf> {
        fn walk<'a>(group: &'a Group, out: &mut Vec<&'a Leaf>) {
            out.extend(group.leaves.iter());
            for child in &group.groups {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    /// Names of all named options, for argument normalisation.
    pub fn long_names(&self) -> BTreeSet<String> {
        self.leaves()
            .iter()
            .flat_map(|leaf| leaf.spec.args.iter())
            .filter(|arg| arg.kind == super::args::ArgKind::Named)
            .map(|arg| arg.name.to_string())
            .chain(super::GLOBAL_LONG_NAMES.iter().map(|s| (*s).to_string()))
            .collect()
    }
}
