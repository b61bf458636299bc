//! Customization specs: YAML documents under `<config>/customize/`.
//!
//! ```yaml
//! auth:
//!   roles:
//!     - name: RoleA
//!       desc: operators
//!   users:
//!     - name: u@dom
//!       password: changeme
//!       roles: [RoleA]
//! ```

use super::kinds::{self, Kind};
use anyhow::{Context as _, Result, bail};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Field asking for existing objects to be converged.
pub const UPDATE_FIELD: &str = "update";

/// Append/remove lists of one association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDecl {
    pub relation: &'static str,
    pub append: Vec<String>,
    pub remove: Vec<String>,
}

/// One declared object.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub kind: &'static Kind,
    pub name: String,
    /// Body fields, `name` included.
    pub fields: Map<String, Value>,
    pub update: bool,
    pub relations: Vec<RelationDecl>,
}

#[derive(Debug, Clone, Default)]
pub struct CustomizeSpec {
    pub name: String,
    pub path: PathBuf,
    pub declarations: Vec<Declaration>,
    /// Entries that were ignored, with the reason.
    pub warnings: Vec<String>,
}

impl CustomizeSpec {
    /// Sections present, in file order.
    pub fn sections(&self) -> Vec<&'static str> {
        let mut sections = Vec::new();
        for decl in &self.declarations {
            if !sections.contains(&decl.kind.section) {
                sections.push(decl.kind.section);
            }
        }
        sections
    }
}

fn is_spec_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml" | "yaml")
    )
}

/// Spec names and files under `dir`, sorted by name.
pub fn list_configs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_spec_file(path) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            found.push((stem.to_string(), path.to_path_buf()));
        }
    }
    found.sort();
    Ok(found)
}

/// Load the spec called `name`.
pub fn load(dir: &Path, name: &str) -> Result<CustomizeSpec> {
    let (_, path) = list_configs(dir)?
        .into_iter()
        .find(|(stem, _)| stem == name)
        .with_context(|| format!("customization '{name}' not found under {}", dir.display()))?;
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut spec = parse(name, &text).with_context(|| format!("Invalid customization {}", path.display()))?;
    spec.path = path;
    Ok(spec)
}

/// Parse a spec document.
pub fn parse(name: &str, text: &str) -> Result<CustomizeSpec> {
    let mut spec = CustomizeSpec {
        name: name.to_string(),
        ..CustomizeSpec::default()
    };
    if text.trim().is_empty() {
        return Ok(spec);
    }
    let doc: Value = serde_yaml::from_str(text)?;
    let Some(sections) = doc.as_object() else {
        if doc.is_null() {
            return Ok(spec);
        }
        bail!("top level must be a mapping of sections");
    };

    for (section, body) in sections {
        let Some(kinds_map) = body.as_object() else {
            spec.warnings.push(format!("section '{section}' is not a mapping"));
            continue;
        };
        for (kind_name, objects) in kinds_map {
            let Some(kind) = kinds::find(section, kind_name) else {
                spec.warnings.push(format!("unknown kind '{section}.{kind_name}'"));
                continue;
            };
            let Some(objects) = objects.as_array() else {
                spec.warnings.push(format!("'{section}.{kind_name}' is not a list"));
                continue;
            };
            for (index, object) in objects.iter().enumerate() {
                match declaration(kind, object) {
                    Some(decl) => spec.declarations.push(decl),
                    None => spec
                        .warnings
                        .push(format!("'{section}.{kind_name}' entry {index} has no name")),
                }
            }
        }
    }
    Ok(spec)
}

fn declaration(kind: &'static Kind, object: &Value) -> Option<Declaration> {
    let map = object.as_object()?;
    let name = map.get("name").and_then(Value::as_str)?.to_string();

    let mut fields = Map::new();
    let mut update = false;
    for (key, value) in map {
        if key == UPDATE_FIELD {
            update = value.as_bool().unwrap_or(false);
        } else if !kind.is_relation(key) {
            fields.insert(key.clone(), value.clone());
        }
    }

    let relations = kind
        .relations
        .iter()
        .copied()
        .filter_map(|relation| {
            let append = names(map.get(relation));
            let remove = names(map.get(&format!("remove_{relation}")));
            (!append.is_empty() || !remove.is_empty()).then_some(RelationDecl {
                relation,
                append,
                remove,
            })
        })
        .collect();

    Some(Declaration {
        kind,
        name,
        fields,
        update,
        relations,
    })
}

/// Names of a relation list: plain strings or objects with a `name`.
pub fn names(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
