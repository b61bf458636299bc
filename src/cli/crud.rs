//! Table-driven CRUD leaves.
//!
//! Most commands are "build a path, call the CMP, render the answer". Each
//! of them is a [`Crud`] record; [`execute`] runs any record.

use super::args::{ArgSpec, ArgType, Invocation};
use super::registry::Metadata;
use crate::context::Context;
use crate::error::UsageError;
use crate::render::{Format, RenderSpec};
use crate::ui;
use anyhow::{Context as _, Result};
use cmpkit::task::extract_task_id;
use cmpkit::value::{lookup, scalar_text};
use cmpkit::client::path_segment;
use cmpkit::{ApiRequest, CmpApi, Method};
use serde_json::{Map, Value};
use std::time::Duration;

/// Name of the flag that skips task waiting.
pub const NO_WAIT: &str = "no-wait";

/// Name of the per-call HTTP timeout option, in seconds.
pub const TIMEOUT: &str = "timeout";

/// Read-only leaf.
#[derive(Debug, Clone)]
pub struct GetSpec {
    /// Collection path; listed with pagination when `-id` is not given.
    pub list_path: Option<&'static str>,
    /// Item path containing `{id}`; shown as details when `-id` is given.
    pub item_path: Option<&'static str>,
    pub list_render: RenderSpec,
    pub item_render: RenderSpec,
    /// Optional filters forwarded as query parameters.
    pub filters: Vec<ArgSpec>,
}

/// Mutating leaf.
#[derive(Debug, Clone)]
pub struct MutateSpec {
    pub method: Method,
    pub path: &'static str,
    /// Key wrapping the body object, e.g. `user` for `{"user": {...}}`.
    pub body_key: Option<&'static str>,
    /// Arguments copied into the body: `(arg, dotted body field)`.
    pub fields: Vec<(ArgSpec, &'static str)>,
    /// Summary template; `{x}` is an argument or a response field.
    pub message: &'static str,
}

#[derive(Debug, Clone)]
pub enum Crud {
    Get(GetSpec),
    Mutate(MutateSpec),
}

impl Crud {
    /// Paginated list of `path`, rows taken from `render.key`.
    pub fn list(path: &'static str, render: RenderSpec) -> Self {
        Self::Get(GetSpec {
            list_path: Some(path),
            item_path: None,
            list_render: render,
            item_render: RenderSpec::default(),
            filters: Vec::new(),
        })
    }

    /// List without `-id`, detail view of one object with it.
    pub fn get(
        list_path: &'static str,
        item_path: &'static str,
        list_render: RenderSpec,
        item_render: RenderSpec,
    ) -> Self {
        Self::Get(GetSpec {
            list_path: Some(list_path),
            item_path: Some(item_path),
            list_render,
            item_render,
            filters: Vec::new(),
        })
    }

    pub fn add(path: &'static str, body_key: &'static str, message: &'static str) -> Self {
        Self::mutate(Method::Post, path, Some(body_key), message)
    }

    pub fn update(path: &'static str, body_key: &'static str, message: &'static str) -> Self {
        Self::mutate(Method::Put, path, Some(body_key), message)
    }

    pub fn delete(path: &'static str, message: &'static str) -> Self {
        Self::mutate(Method::Delete, path, None, message)
    }

    fn mutate(
        method: Method,
        path: &'static str,
        body_key: Option<&'static str>,
        message: &'static str,
    ) -> Self {
        Self::Mutate(MutateSpec {
            method,
            path,
            body_key,
            fields: Vec::new(),
            message,
        })
    }

    /// Add a query filter (get) or a body field named like the argument (mutate).
    pub fn field(self, arg: ArgSpec) -> Self {
        let name = arg.name;
        self.field_as(arg, name)
    }

    /// Add a body field stored under a different (dotted) name.
    pub fn field_as(mut self, arg: ArgSpec, field: &'static str) -> Self {
        match &mut self {
            Self::Get(spec) => spec.filters.push(arg),
            Self::Mutate(spec) => spec.fields.push((arg, field)),
        }
        self
    }

    /// The argument schema implied by the record.
    pub fn args(&self) -> Vec<ArgSpec> {
        match self {
            Self::Get(spec) => {
                let mut args = Vec::new();
                if spec.item_path.is_some() {
                    let id = ArgSpec::named("id", "identifier of the object to show");
                    args.push(if spec.list_path.is_some() { id } else { id.required() });
                }
                args.extend(spec.filters.iter().cloned());
                if spec.list_path.is_some() {
                    args.extend(ArgSpec::pagination());
                }
                args.push(timeout_arg());
                args
            }
            Self::Mutate(spec) => {
                let mut args: Vec<ArgSpec> = spec.fields.iter().map(|(arg, _)| arg.clone()).collect();
                for name in placeholders(spec.path) {
                    if !args.iter().any(|a| a.name == name) {
                        args.push(ArgSpec::named(name, "identifier of the object").required());
                    }
                }
                args.push(ArgSpec::flag(NO_WAIT, "do not wait for the task to finish"));
                args.push(timeout_arg());
                args
            }
        }
    }
}

fn timeout_arg() -> ArgSpec {
    ArgSpec::named(TIMEOUT, "HTTP timeout of the call in seconds").int()
}

/// Run a CRUD record.
pub fn execute(ctx: &mut Context, meta: &Metadata, crud: &Crud, inv: &Invocation) -> Result<()> {
    let subsystem = meta
        .subsystem
        .clone()
        .with_context(|| format!("command '{}' has no subsystem", inv.command))?;
    let base = meta.base_uri.clone().unwrap_or_default();

    match crud {
        Crud::Get(spec) => run_get(ctx, meta, &subsystem, &base, spec, inv),
        Crud::Mutate(spec) => run_mutate(ctx, meta, &subsystem, &base, spec, inv),
    }
}

fn run_get(
    ctx: &mut Context,
    meta: &Metadata,
    subsystem: &str,
    base: &str,
    spec: &GetSpec,
    inv: &Invocation,
) -> Result<()> {
    let item = spec.item_path.filter(|_| inv.get_str("id").is_some());
    let (request, render) = match (item, spec.list_path) {
        (Some(item_path), _) => (
            ApiRequest::get(subsystem, format!("{base}{}", fill_path(item_path, inv)?)),
            &spec.item_render,
        ),
        (None, Some(list_path)) => {
            let mut query = inv.pagination();
            for filter in &spec.filters {
                if let Some(value) = inv.get(filter.name) {
                    if filter.ty == ArgType::Flag && !inv.flag(filter.name) {
                        continue;
                    }
                    query.push((filter.name.replace('-', "_"), value.to_text()));
                }
            }
            (
                ApiRequest::get(subsystem, format!("{base}{}", fill_path(list_path, inv)?))
                    .with_query(query),
                &spec.list_render,
            )
        }
        (None, None) => return Err(UsageError::MissingArgument("id".into()).into()),
    };

    let response = ctx.api()?.call(&prepare(request, meta, inv))?;
    ctx.render(&response, render)
}

fn run_mutate(
    ctx: &mut Context,
    meta: &Metadata,
    subsystem: &str,
    base: &str,
    spec: &MutateSpec,
    inv: &Invocation,
) -> Result<()> {
    let path = format!("{base}{}", fill_path(spec.path, inv)?);
    let mut request = ApiRequest::new(spec.method, subsystem, path);
    if spec.method != Method::Delete || !spec.fields.is_empty() {
        request = request.with_json(build_body(spec, inv));
    }

    let response = ctx.api()?.call(&prepare(request, meta, inv))?;

    if let Some(task_id) = extract_task_id(&response, None, None) {
        if inv.flag(NO_WAIT) {
            log::info!("Not waiting for task {task_id}");
        } else {
            let outcome = ctx.wait_task(subsystem, &task_id)?;
            if outcome.is_timeout() {
                ui::warn(&format!(
                    "task {task_id} still running after {}",
                    ui::format_elapsed(outcome.elapsed)
                ));
                return Ok(());
            }
            log::info!("Task {} {} in {:?}", task_id, outcome.status, outcome.elapsed);
        }
    }

    if ctx.format == Format::Text {
        let line = fill_template(spec.message, inv, &response);
        ctx.emit_line(&line);
        Ok(())
    } else {
        ctx.render(&response, &RenderSpec::default())
    }
}

/// Inherited headers and the `-timeout` override.
fn prepare(mut request: ApiRequest, meta: &Metadata, inv: &Invocation) -> ApiRequest {
    for (name, value) in &meta.headers {
        request = request.with_header(name, value);
    }
    if let Some(secs) = inv.get_int(TIMEOUT).and_then(|s| u64::try_from(s).ok()) {
        request = request.with_timeout(Duration::from_secs(secs));
    }
    request
}

/// Body `{body_key: {field: value}}` from the arguments that were given.
pub fn build_body(spec: &MutateSpec, inv: &Invocation) -> Value {
    let mut object = Map::new();
    for (arg, field) in &spec.fields {
        let Some(value) = inv.get(arg.name) else {
            continue;
        };
        if arg.ty == ArgType::Flag && !inv.flag(arg.name) {
            continue;
        }
        insert_dotted(&mut object, field, value.to_json());
    }
    match spec.body_key {
        Some(key) => {
            let mut outer = Map::new();
            outer.insert(key.to_string(), Value::Object(object));
            Value::Object(outer)
        }
        None => Value::Object(object),
    }
}

fn insert_dotted(object: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            object.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = object
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                insert_dotted(map, rest, value);
            }
        }
    }
}

/// Names of the `{placeholders}` in a template.
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start + 1..].find('}') else {
            break;
        };
        names.push(&rest[start + 1..start + 1 + len]);
        rest = &rest[start + len + 2..];
    }
    names
}

/// Substitute path placeholders from the arguments, one encoded segment each.
pub fn fill_path(template: &str, inv: &Invocation) -> Result<String, UsageError> {
    let mut out = template.to_string();
    for name in placeholders(template) {
        let value = inv
            .get(name)
            .map(super::args::ArgValue::to_text)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| UsageError::MissingArgument(name.to_string()))?;
        out = out.replace(&format!("{{{name}}}"), &path_segment(&value));
    }
    Ok(out)
}

/// Substitute message placeholders from the arguments, then the response.
///
/// A response placeholder matches a dotted path or, failing that, the same
/// key one level down (`{uuid}` finds `{"server": {"uuid": ..}}`).
pub fn fill_template(template: &str, inv: &Invocation, response: &Value) -> String {
    let mut out = template.to_string();
    for name in placeholders(template) {
        let value = inv.get(name).map(super::args::ArgValue::to_text).or_else(|| {
            lookup(response, name)
                .or_else(|| {
                    response
                        .as_object()?
                        .values()
                        .find_map(|child| child.get(name))
                })
                .map(scalar_text)
        });
        if let Some(value) = value {
            out = out.replace(&format!("{{{name}}}"), &value);
        }
    }
    out
}
