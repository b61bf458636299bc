//! # Declarative
//!
//! Convergence engine for declaratively described CMP state.
//!
//! ## Core Concepts
//!
//! - **Resource**: one declared object; reads its remote state and converges it
//! - **ResourceState**: the current or desired state of a resource
//! - **ExecutionPlan**: resources grouped into stages that run in a fixed order
//! - **Executor**: diffs the whole plan, asks for confirmation, applies stage by stage
//!
//! The engine is additive: resources create or update, never delete. Every
//! resource is processed in isolation, so one failure does not stop the run.
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ExecutionPlan, ExecuteOptions, execute_simple};
//!
//! let mut plan = ExecutionPlan::with_stage_order(&["auth", "resource"]);
//! plan.add_resource(Box::new(role));
//! let summary = execute_simple(&plan, &ExecuteOptions::default(), &mut client)?;
//! ```
//!
//! ## Provider Traits
//!
//! - [`ProgressCallback`]: receives progress updates
//! - [`ConfirmCallback`]: handles user confirmations

pub mod context;
pub mod diff;
pub mod executor;
pub mod planner;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use context::{ApplyContext, AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use diff::{DiffError, DiffReport, DiffSummary, ResourceDiff, compute_diffs};
pub use executor::{execute, execute_simple};
pub use planner::{ExecutionPlan, Stage};
pub use resource::{BoxedResource, Resource, ResourceExt};
pub use types::{ApplyResult, ExecuteOptions, ExecuteSummary, ResourceState};
