//! Declared CMP objects and their associations as convergence resources.

use super::kinds::Kind;
use super::spec::{Declaration, RelationDecl, names};
use anyhow::{Result, bail};
use cmpkit::task::{self, extract_task_id};
use cmpkit::value::scalar_text;
use declarative::{ApplyContext, ApplyResult, Resource, ResourceState};
use serde_json::{Map, Value, json};

/// Read an object; `None` when the CMP answers 404.
fn fetch(ctx: &mut ApplyContext, kind: &Kind, name: &str) -> Result<Option<Value>> {
    match ctx.api.get(kind.subsystem, &kind.item_path(name)) {
        Ok(response) => Ok(Some(
            response.get(kind.body_key).cloned().unwrap_or(response),
        )),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn same_value(remote: Option<&Value>, desired: &Value) -> bool {
    match (remote, desired) {
        (Some(r), Value::Array(_) | Value::Object(_)) => r == desired,
        (Some(r), _) => scalar_text(r) == scalar_text(desired),
        (None, Value::Null) => true,
        (None, _) => false,
    }
}

fn to_yaml(fields: &Map<String, Value>) -> String {
    serde_yaml::to_string(fields).unwrap_or_default()
}

/// A named object created when absent, updated when `update: true`.
#[derive(Debug, Clone)]
pub struct CmpObject {
    pub kind: &'static Kind,
    pub name: String,
    pub fields: Map<String, Value>,
    pub update: bool,
}

impl CmpObject {
    pub fn from_declaration(decl: &Declaration) -> Self {
        Self {
            kind: decl.kind,
            name: decl.name.clone(),
            fields: decl.fields.clone(),
            update: decl.update,
        }
    }

    /// Declared fields that differ from the remote object, compared ones only.
    fn changed_fields(&self, remote: &Value) -> Map<String, Value> {
        self.fields
            .iter()
            .filter(|(key, _)| {
                key.as_str() != "name" && !self.kind.write_only.contains(&key.as_str())
            })
            .filter(|(key, value)| !same_value(remote.get(key.as_str()), value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn create(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let body = json!({ self.kind.body_key: self.fields });
        let response = ctx.api.post(self.kind.subsystem, self.kind.collection, body)?;
        if let Some(task_id) = extract_task_id(&response, None, None) {
            log::debug!("Waiting for task {task_id} creating {} {}", self.kind.label, self.name);
            let outcome = task::wait_remote_task(
                ctx.api,
                self.kind.subsystem,
                &task_id,
                &ctx.wait,
                ctx.clock,
            )?;
            if outcome.is_timeout() {
                bail!("task {task_id} creating {} did not finish in time", self.name);
            }
        }
        Ok(ApplyResult::Created)
    }
}

impl Resource for CmpObject {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        format!("{} {}", self.kind.body_key, self.name)
    }

    fn resource_type(&self) -> &'static str {
        self.kind.label
    }

    fn current_state(&self, ctx: &mut ApplyContext) -> Result<ResourceState> {
        let Some(remote) = fetch(ctx, self.kind, &self.name)? else {
            return Ok(ResourceState::Absent);
        };
        if !self.update {
            return Ok(ResourceState::Present { details: None });
        }
        let changed = self.changed_fields(&remote);
        if changed.is_empty() {
            return Ok(ResourceState::Present { details: None });
        }
        let from: Map<String, Value> = changed
            .keys()
            .map(|key| (key.clone(), remote.get(key.as_str()).cloned().unwrap_or(Value::Null)))
            .collect();
        Ok(ResourceState::Modified {
            from: to_yaml(&from),
            to: to_yaml(&changed),
        })
    }

    fn apply(&self, ctx: &mut ApplyContext, current: &ResourceState) -> Result<ApplyResult> {
        match current {
            ResourceState::Absent => self.create(ctx),
            ResourceState::Modified { .. } => {
                let Some(remote) = fetch(ctx, self.kind, &self.name)? else {
                    return self.create(ctx);
                };
                let changed = self.changed_fields(&remote);
                let body = json!({ self.kind.body_key: changed });
                ctx.api
                    .put(self.kind.subsystem, &self.kind.item_path(&self.name), body)?;
                Ok(ApplyResult::Modified)
            }
            _ => Ok(ApplyResult::NoChange),
        }
    }
}

/// Append/remove membership of one association of an object.
#[derive(Debug, Clone)]
pub struct Binding {
    pub kind: &'static Kind,
    pub owner: String,
    pub relation: RelationDecl,
}

impl Binding {
    pub fn from_declaration(decl: &Declaration) -> Vec<Self> {
        decl.relations
            .iter()
            .map(|relation| Self {
                kind: decl.kind,
                owner: decl.name.clone(),
                relation: relation.clone(),
            })
            .collect()
    }

    fn members(&self, owner: &Value) -> Vec<String> {
        names(owner.get(self.relation.relation))
    }

    /// `(to append, to remove)` given the current members.
    fn pending(&self, members: &[String]) -> (Vec<String>, Vec<String>) {
        let append = self
            .relation
            .append
            .iter()
            .filter(|m| !members.contains(m))
            .cloned()
            .collect();
        let remove = self
            .relation
            .remove
            .iter()
            .filter(|m| members.contains(m))
            .cloned()
            .collect();
        (append, remove)
    }
}

impl Resource for Binding {
    fn id(&self) -> String {
        format!("{}.{}", self.owner, self.relation.relation)
    }

    fn description(&self) -> String {
        format!("{} of {} {}", self.relation.relation, self.kind.body_key, self.owner)
    }

    fn resource_type(&self) -> &'static str {
        self.kind.label
    }

    fn current_state(&self, ctx: &mut ApplyContext) -> Result<ResourceState> {
        let Some(owner) = fetch(ctx, self.kind, &self.owner)? else {
            return Ok(ResourceState::Absent);
        };
        let members = self.members(&owner);
        let (append, remove) = self.pending(&members);
        if append.is_empty() && remove.is_empty() {
            return Ok(ResourceState::Present { details: None });
        }
        let mut desired: Vec<String> = members
            .iter()
            .filter(|m| !remove.contains(m))
            .cloned()
            .collect();
        desired.extend(append);
        Ok(ResourceState::Modified {
            from: members.join("\n") + "\n",
            to: desired.join("\n") + "\n",
        })
    }

    fn apply(&self, ctx: &mut ApplyContext, _current: &ResourceState) -> Result<ApplyResult> {
        let Some(owner) = fetch(ctx, self.kind, &self.owner)? else {
            bail!("{} {} does not exist", self.kind.body_key, self.owner);
        };
        let (append, remove) = self.pending(&self.members(&owner));
        if append.is_empty() && remove.is_empty() {
            return Ok(ApplyResult::NoChange);
        }
        let body = json!({
            self.kind.body_key: {
                self.relation.relation: {"append": append, "remove": remove}
            }
        });
        ctx.api
            .put(self.kind.subsystem, &self.kind.item_path(&self.owner), body)?;
        Ok(ApplyResult::Modified)
    }
}
