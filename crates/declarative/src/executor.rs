//! Execution engine - applies resources stage by stage

use crate::context::{ApplyContext, AutoConfirm, ConfirmCallback, NoProgress, ProgressCallback};
use crate::diff::compute_diffs;
use crate::planner::ExecutionPlan;
use crate::resource::Resource;
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary};
use anyhow::Result;
use cmpkit::{Clock, CmpApi, SystemClock};

/// Execute a plan against the CMP
///
/// The whole plan is diffed first; nothing is applied when it is already
/// converged, when `opts.dry_run` is set, or when the user declines.
/// Otherwise stages run in order and each resource is re-read right before
/// it is applied, so objects created by an earlier stage are visible to a
/// later one. A failing resource is recorded and the run continues.
/// Tasks started by a resource are polled on `clock`.
pub fn execute<P, C>(
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
    api: &mut dyn CmpApi,
    clock: &dyn Clock,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteSummary>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let mut ctx = ApplyContext::new(api, clock, opts.dry_run, opts.verbose).with_wait(opts.wait);
    let report = compute_diffs(plan, &mut ctx);
    progress.on_diff(&report);
    let total_changes = report.diffs.len();

    let untouched = ExecuteSummary {
        no_change: report.unchanged,
        failed: report.errors.len(),
        ..Default::default()
    };

    if total_changes == 0 {
        return Ok(untouched);
    }

    if opts.dry_run || !confirm.confirm(&format!("Apply {total_changes} change(s)?"))? {
        return Ok(ExecuteSummary {
            skipped: total_changes,
            ..untouched
        });
    }

    let mut summary = ExecuteSummary::default();
    for stage in plan.stages() {
        progress.on_stage_start(&stage.name, stage.resources.len());
        for resource in &stage.resources {
            let id = resource.id();
            progress.on_resource_start(&id, &resource.description());
            let result = apply_resource(resource.as_ref(), &mut ctx);
            progress.on_resource_complete(&id, &result);
            summary.add_result(&result);
        }
        progress.on_stage_complete();
    }

    Ok(summary)
}

/// Apply a single resource
fn apply_resource(resource: &dyn Resource, ctx: &mut ApplyContext) -> ApplyResult {
    let current = match resource.current_state(ctx) {
        Ok(state) => state,
        Err(e) => {
            return ApplyResult::Failed {
                error: format!("{e:#}"),
            };
        }
    };

    if current == resource.desired_state() {
        return ApplyResult::NoChange;
    }

    match resource.apply(ctx, &current) {
        Ok(result) => result,
        Err(e) => ApplyResult::Failed {
            error: format!("{e:#}"),
        },
    }
}

/// Simple execution without callbacks
pub fn execute_simple(
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
    api: &mut dyn CmpApi,
) -> Result<ExecuteSummary> {
    execute(plan, opts, api, &SystemClock::new(), &mut NoProgress, &mut AutoConfirm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AutoDecline;
    use crate::types::ResourceState;
    use cmpkit::{ApiError, ApiRequest, Method};
    use serde_json::{Value, json};
    use std::collections::BTreeMap;

    /// In-memory store keyed by path
    #[derive(Default)]
    struct MemoryApi {
        objects: BTreeMap<String, Value>,
        calls: Vec<(Method, String)>,
    }

    impl CmpApi for MemoryApi {
        fn call(&mut self, request: &ApiRequest) -> cmpkit::Result<Value> {
            self.calls.push((request.method, request.path.clone()));
            match request.method {
                Method::Get => self
                    .objects
                    .get(&request.path)
                    .cloned()
                    .ok_or_else(|| ApiError::from_status(404, "").into()),
                _ => {
                    let cmpkit::RequestBody::Json(body) = &request.body else {
                        return Err(ApiError::from_status(400, "").into());
                    };
                    self.objects.insert(request.path.clone(), body.clone());
                    Ok(json!({}))
                }
            }
        }
    }

    impl MemoryApi {
        fn mutations(&self) -> usize {
            self.calls.iter().filter(|(m, _)| m.is_mutating()).count()
        }
    }

    #[derive(Debug)]
    struct TestResource {
        path: &'static str,
        broken: bool,
    }

    impl Resource for TestResource {
        fn id(&self) -> String {
            self.path.to_string()
        }

        fn description(&self) -> String {
            format!("Test resource {}", self.path)
        }

        fn resource_type(&self) -> &'static str {
            "test.objects"
        }

        fn current_state(&self, ctx: &mut ApplyContext) -> Result<ResourceState> {
            if self.broken {
                anyhow::bail!("cannot read {}", self.path);
            }
            match ctx.api.get("test", self.path) {
                Ok(_) => Ok(ResourceState::Present { details: None }),
                Err(e) if e.is_not_found() => Ok(ResourceState::Absent),
                Err(e) => Err(e.into()),
            }
        }

        fn apply(&self, ctx: &mut ApplyContext, _current: &ResourceState) -> Result<ApplyResult> {
            ctx.api.put("test", self.path, json!({"name": self.path}))?;
            Ok(ApplyResult::Created)
        }
    }

    fn plan(broken: bool) -> ExecutionPlan {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(TestResource {
            path: "/a",
            broken: false,
        }));
        plan.add_resource(Box::new(TestResource { path: "/b", broken }));
        plan.add_resource(Box::new(TestResource {
            path: "/c",
            broken: false,
        }));
        plan
    }

    #[test]
    fn test_execute_empty_plan() {
        let mut api = MemoryApi::default();
        let result = execute_simple(&ExecutionPlan::new(), &ExecuteOptions::default(), &mut api).unwrap();
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_execute_converges_then_is_idempotent() {
        let mut api = MemoryApi::default();
        let first = execute_simple(&plan(false), &ExecuteOptions::default(), &mut api).unwrap();
        assert_eq!(first.created, 3);
        assert_eq!(api.mutations(), 3);

        api.calls.clear();
        let second = execute_simple(&plan(false), &ExecuteOptions::default(), &mut api).unwrap();
        assert_eq!(second.no_change, 3);
        assert_eq!(second.total_changes(), 0);
        assert_eq!(api.mutations(), 0);
    }

    #[test]
    fn test_failures_are_isolated() {
        let mut api = MemoryApi::default();
        let summary = execute_simple(&plan(true), &ExecuteOptions::default(), &mut api).unwrap();
        assert_eq!(summary.created, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_success());
        assert!(api.objects.contains_key("/c"));
    }

    #[test]
    fn test_dry_run_and_decline_do_not_mutate() {
        let mut api = MemoryApi::default();
        let opts = ExecuteOptions {
            dry_run: true,
            ..ExecuteOptions::default()
        };
        let summary = execute_simple(&plan(false), &opts, &mut api).unwrap();
        assert_eq!(summary.skipped, 3);

        let summary = execute(
            &plan(false),
            &ExecuteOptions::default(),
            &mut api,
            &SystemClock::new(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();
        assert_eq!(summary.skipped, 3);
        assert_eq!(api.mutations(), 0);
    }
}
