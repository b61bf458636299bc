//! Apply context and callback traits
//!
//! These traits keep the engine free of any particular terminal UI.

use crate::diff::DiffReport;
use crate::types::ApplyResult;
use anyhow::Result;
use cmpkit::{Clock, CmpApi, WaitOptions};

/// Progress callback for execution operations
pub trait ProgressCallback {
    /// Called once the whole plan has been diffed, before confirmation
    fn on_diff(&mut self, _report: &DiffReport) {}

    /// Called when a stage (customizer section) starts
    fn on_stage_start(&mut self, stage: &str, count: usize);

    /// Called when starting to apply a single resource
    fn on_resource_start(&mut self, id: &str, description: &str);

    /// Called when a resource application completes
    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult);

    /// Called when a stage completes
    fn on_stage_complete(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback {
    /// Ask the user to confirm an action
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_stage_start(&mut self, _stage: &str, _count: usize) {}
    fn on_resource_start(&mut self, _id: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &str, _result: &ApplyResult) {}
    fn on_stage_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Context passed to state detection and apply operations
pub struct ApplyContext<'a> {
    /// Whether this is a dry run (no actual changes)
    pub dry_run: bool,
    /// Whether to output verbose information
    pub verbose: bool,
    /// Connection to the CMP
    pub api: &'a mut dyn CmpApi,
    /// Clock driving task waits
    pub clock: &'a dyn Clock,
    /// Polling parameters for tasks started by an apply
    pub wait: WaitOptions,
}

impl<'a> ApplyContext<'a> {
    /// Create a new apply context
    pub fn new(api: &'a mut dyn CmpApi, clock: &'a dyn Clock, dry_run: bool, verbose: bool) -> Self {
        Self {
            dry_run,
            verbose,
            api,
            clock,
            wait: WaitOptions::default(),
        }
    }

    #[must_use]
    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }
}
