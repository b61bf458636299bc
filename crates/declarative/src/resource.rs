//! Resource trait for declarative state management
//!
//! A Resource is one declared CMP object (or association). It can read its
//! remote state and converge it towards the declared one.

use crate::context::ApplyContext;
use crate::types::{ApplyResult, ResourceState};
use anyhow::Result;
use std::fmt;

/// Core trait for declarative resources
///
/// # Example
///
/// ```ignore
/// use declarative::{ApplyContext, ApplyResult, Resource, ResourceState};
///
/// #[derive(Debug)]
/// struct Role { name: String }
///
/// impl Resource for Role {
///     fn id(&self) -> String { self.name.clone() }
///     fn description(&self) -> String { format!("role {}", self.name) }
///     fn resource_type(&self) -> &'static str { "auth.roles" }
///
///     fn current_state(&self, ctx: &mut ApplyContext) -> anyhow::Result<ResourceState> {
///         match ctx.api.get("auth", &format!("/v1.0/nas/roles/{}", self.name)) {
///             Ok(_) => Ok(ResourceState::Present { details: None }),
///             Err(e) if e.is_not_found() => Ok(ResourceState::Absent),
///             Err(e) => Err(e.into()),
///         }
///     }
///
///     fn desired_state(&self) -> ResourceState {
///         ResourceState::Present { details: None }
///     }
///
///     fn apply(&self, ctx: &mut ApplyContext, current: &ResourceState) -> anyhow::Result<ApplyResult> {
///         if current.is_absent() {
///             ctx.api.post("auth", "/v1.0/nas/roles", serde_json::json!({"role": {"name": self.name}}))?;
///             return Ok(ApplyResult::Created);
///         }
///         Ok(ApplyResult::NoChange)
///     }
/// }
/// ```
pub trait Resource: fmt::Debug {
    /// Natural key of the object, unique within its type
    fn id(&self) -> String;

    /// Human-readable description of what this resource does
    fn description(&self) -> String;

    /// Resource type, `<section>.<kind>` (e.g. "auth.roles")
    fn resource_type(&self) -> &'static str;

    /// Read the remote state. Must not mutate anything.
    fn current_state(&self, ctx: &mut ApplyContext) -> Result<ResourceState>;

    /// Get the desired state for this resource
    fn desired_state(&self) -> ResourceState {
        ResourceState::Present { details: None }
    }

    /// Check if the resource needs changes to reach desired state
    fn needs_apply(&self, ctx: &mut ApplyContext) -> Result<bool> {
        let current = self.current_state(ctx)?;
        Ok(current != self.desired_state())
    }

    /// Converge from `current` to the desired state
    ///
    /// Only called when `current` differs from [`Resource::desired_state`].
    fn apply(&self, ctx: &mut ApplyContext, current: &ResourceState) -> Result<ApplyResult>;
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;

/// Extension trait for working with boxed resources
pub trait ResourceExt {
    /// Section the resource belongs to (the part before the first dot)
    fn section(&self) -> &'static str;
}

impl<R: Resource + ?Sized> ResourceExt for R {
    fn section(&self) -> &'static str {
        let kind = self.resource_type();
        kind.split_once('.').map_or(kind, |(section, _)| section)
    }
}
