//! Diff computation for resources

use crate::context::ApplyContext;
use crate::planner::ExecutionPlan;
use crate::resource::Resource;
use crate::types::ResourceState;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A diff between current and desired state of a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// Unique identifier of the resource
    pub resource_id: String,
    /// Type of the resource
    pub resource_type: String,
    /// Human-readable description
    pub description: String,
    /// Current state
    pub current: ResourceState,
    /// Desired state
    pub desired: ResourceState,
}

impl ResourceDiff {
    /// Create a diff from a resource, returning None if no changes needed
    pub fn from_resource(resource: &dyn Resource, ctx: &mut ApplyContext) -> Result<Option<Self>> {
        let current = resource.current_state(ctx)?;
        let desired = resource.desired_state();

        if current == desired {
            return Ok(None);
        }

        Ok(Some(Self {
            resource_id: resource.id(),
            resource_type: resource.resource_type().to_string(),
            description: resource.description(),
            current,
            desired,
        }))
    }

    /// Check if this diff represents an addition
    pub fn is_addition(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (ResourceState::Absent, ResourceState::Present { .. })
        )
    }

    /// Check if this diff represents a modification
    pub fn is_modification(&self) -> bool {
        matches!(self.current, ResourceState::Modified { .. })
    }
}

/// A resource whose state could not be read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffError {
    pub resource_id: String,
    pub resource_type: String,
    pub error: String,
}

/// Outcome of diffing a whole plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffReport {
    /// Resources that need changes, in plan order
    pub diffs: Vec<ResourceDiff>,
    /// Resources whose state could not be read
    pub errors: Vec<DiffError>,
    /// Resources already converged
    pub unchanged: usize,
}

/// Compute diffs for every resource of a plan
///
/// A failure to read one resource is recorded and does not stop the rest.
pub fn compute_diffs(plan: &ExecutionPlan, ctx: &mut ApplyContext) -> DiffReport {
    let mut report = DiffReport::default();
    for resource in plan.resources() {
        match ResourceDiff::from_resource(resource.as_ref(), ctx) {
            Ok(Some(diff)) => report.diffs.push(diff),
            Ok(None) => report.unchanged += 1,
            Err(e) => report.errors.push(DiffError {
                resource_id: resource.id(),
                resource_type: resource.resource_type().to_string(),
                error: format!("{e:#}"),
            }),
        }
    }
    report
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of resources to add
    pub additions: usize,
    /// Number of resources to modify
    pub modifications: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            if diff.is_addition() {
                summary.additions += 1;
            } else {
                summary.modifications += 1;
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}
