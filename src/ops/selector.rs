//! Node selection against the CMP's SSH inventory.

use super::runner::Host;
use crate::cli::args::Invocation;
use crate::error::UsageError;
use anyhow::{Context as _, Result, bail};
use cmpkit::client::path_segment;
use cmpkit::value::{lookup, scalar_text};
use cmpkit::{ApiRequest, CmpApi, subsystem};
use serde_json::Value;
use std::path::PathBuf;

const NODES_PATH: &str = "/v1.0/gas/sshnodes";

/// Exactly one of `-node`, `-name` or `-file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// One node by name or id.
    Node(String),
    /// Every node whose name contains the pattern, up to `size`.
    Name { pattern: String, size: usize },
    /// Node names listed in a file, one per line.
    File(PathBuf),
}

impl Selector {
    pub fn from_invocation(inv: &Invocation) -> Result<Self, UsageError> {
        let node = inv.get_str("node");
        let name = inv.get_str("name");
        let file = inv.get_str("file");
        match (node, name, file) {
            (Some(node), None, None) => Ok(Self::Node(node.to_string())),
            (None, Some(pattern), None) => Ok(Self::Name {
                pattern: pattern.to_string(),
                size: usize::try_from(inv.get_int("size").unwrap_or(10)).unwrap_or(0),
            }),
            (None, None, Some(file)) => Ok(Self::File(crate::paths::expand(file))),
            (None, None, None) => Err(UsageError::Other(
                "one of --node, --name or --file is required".into(),
            )),
            _ => Err(UsageError::Other(
                "--node, --name and --file are mutually exclusive".into(),
            )),
        }
    }

    /// Resolve to hosts, in inventory order.
    pub fn resolve(&self, api: &mut dyn CmpApi) -> Result<Vec<Host>> {
        match self {
            Self::Node(node) => Ok(vec![fetch_node(api, node)?]),
            Self::Name { pattern, size } => {
                let query = vec![
                    ("name".to_string(), pattern.clone()),
                    ("size".to_string(), size.to_string()),
                ];
                let response = api.call(&ApiRequest::get(subsystem::SSH, NODES_PATH).with_query(query))?;
                let nodes = response
                    .get("sshnodes")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let hosts: Vec<Host> = nodes
                    .iter()
                    .filter_map(host_of)
                    .filter(|h| h.name.contains(pattern.as_str()))
                    .take(*size)
                    .collect();
                if hosts.is_empty() {
                    bail!("no ssh node matches '{pattern}'");
                }
                Ok(hosts)
            }
            Self::File(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read node list {}", path.display()))?;
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(|node| fetch_node(api, node))
                    .collect()
            }
        }
    }
}

fn fetch_node(api: &mut dyn CmpApi, node: &str) -> Result<Host> {
    let response = api
        .get(subsystem::SSH, &format!("{NODES_PATH}/{}", path_segment(node)))
        .with_context(|| format!("ssh node '{node}' not found"))?;
    response
        .get("sshnode")
        .and_then(host_of)
        .with_context(|| format!("ssh node '{node}' has no address"))
}

fn host_of(node: &Value) -> Option<Host> {
    let name = node.get("name").and_then(Value::as_str)?;
    let address = lookup(node, "ip_address")
        .map(scalar_text)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| name.to_string());
    Some(Host {
        name: name.to_string(),
        address,
    })
}
