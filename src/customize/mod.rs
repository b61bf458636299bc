//! Post-install customizer: converge the CMP towards a YAML spec.
//!
//! Each declared object becomes a [`objects::CmpObject`] and each association
//! list a [`objects::Binding`]. Sections run in [`kinds::SECTION_ORDER`];
//! objects of a section are applied before its associations. Nothing absent
//! from the spec is ever deleted.

pub mod display;
pub mod kinds;
pub mod objects;
pub mod spec;

use crate::context::Context;
use crate::paths;
use crate::progress::StageProgress;
use crate::render::{Format, RenderSpec};
use crate::ui;
use anyhow::{Result, bail};
use cmpkit::{Clock, CmpApi, WaitOptions};
use colored::Colorize;
use declarative::{
    ApplyContext, ConfirmCallback, DiffReport, ExecuteOptions, ExecuteSummary, ExecutionPlan,
    ProgressCallback, compute_diffs,
};
use objects::{Binding, CmpObject};
use serde_json::{Value, json};
use spec::CustomizeSpec;

/// Build the execution plan of a spec, restricted to `sections` when given.
pub fn build_plan(spec: &CustomizeSpec, sections: &[String]) -> ExecutionPlan {
    let mut plan = ExecutionPlan::with_stage_order(&kinds::SECTION_ORDER);
    for decl in &spec.declarations {
        plan.add_resource(Box::new(CmpObject::from_declaration(decl)));
    }
    for decl in &spec.declarations {
        for binding in Binding::from_declaration(decl) {
            plan.add_resource(Box::new(binding));
        }
    }
    plan.filter_by_targets(sections)
}

/// Diff a plan without mutating anything.
pub fn diff_plan(
    api: &mut dyn CmpApi,
    clock: &dyn Clock,
    plan: &ExecutionPlan,
    verbose: bool,
) -> DiffReport {
    let mut ctx = ApplyContext::new(api, clock, true, verbose);
    compute_diffs(plan, &mut ctx)
}

/// Prompts before applying unless `-y` was given.
pub struct Confirmation {
    pub assume_yes: bool,
    pub interactive: bool,
}

impl ConfirmCallback for Confirmation {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        if !self.interactive {
            log::warn!("Not a terminal, declining '{prompt}' (use -y to apply)");
            return Ok(false);
        }
        Ok(dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?)
    }
}

/// Keeps the diff for rendering once the run is over.
#[derive(Default)]
struct DiffRecorder {
    report: Option<DiffReport>,
}

impl ProgressCallback for DiffRecorder {
    fn on_diff(&mut self, report: &DiffReport) {
        self.report = Some(report.clone());
    }
    fn on_stage_start(&mut self, stage: &str, count: usize) {
        log::info!("Applying {stage} ({count})");
    }
    fn on_resource_start(&mut self, id: &str, description: &str) {
        log::debug!("Applying {id}: {description}");
    }
    fn on_resource_complete(&mut self, id: &str, result: &declarative::ApplyResult) {
        log::debug!("{id}: {result:?}");
    }
    fn on_stage_complete(&mut self) {}
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub sections: Vec<String>,
    pub dry_run: bool,
    pub assume_yes: bool,
}

fn load_spec(ctx: &Context, name: &str) -> Result<CustomizeSpec> {
    let spec = spec::load(&paths::customize_dir(&ctx.config_root), name)?;
    for warning in &spec.warnings {
        log::warn!("{}: {warning}", spec.name);
    }
    Ok(spec)
}

fn check_sections(sections: &[String]) -> Result<()> {
    for section in sections {
        let head = section.split('.').next().unwrap_or_default();
        if !kinds::SECTION_ORDER.contains(&head) {
            return Err(crate::error::UsageError::InvalidValue {
                name: "sections".into(),
                value: section.clone(),
                reason: format!("expected one of {}", kinds::SECTION_ORDER.join(", ")),
            }
            .into());
        }
    }
    Ok(())
}

/// `platform customize-list`
pub fn list(ctx: &mut Context) -> Result<()> {
    let dir = paths::customize_dir(&ctx.config_root);
    let configs: Vec<Value> = spec::list_configs(&dir)?
        .into_iter()
        .map(|(name, path)| json!({"name": name, "path": path.display().to_string()}))
        .collect();
    if configs.is_empty() && ctx.format == Format::Text {
        ctx.emit_line(&format!("No customizations under {}", dir.display()));
        return Ok(());
    }
    ctx.render(
        &json!({ "customizations": configs }),
        &RenderSpec::table("customizations", &[("name", "name"), ("path", "path")]),
    )
}

/// `platform customize-show <name>`
pub fn show(ctx: &mut Context, name: &str) -> Result<()> {
    let spec = load_spec(ctx, name)?;
    let rows: Vec<Value> = spec
        .declarations
        .iter()
        .map(|decl| {
            let relations: Vec<String> = decl
                .relations
                .iter()
                .map(|r| {
                    let mut parts: Vec<String> = r.append.iter().map(|m| format!("+{m}")).collect();
                    parts.extend(r.remove.iter().map(|m| format!("-{m}")));
                    format!("{}: {}", r.relation, parts.join(" "))
                })
                .collect();
            json!({
                "kind": decl.kind.label,
                "name": decl.name,
                "update": decl.update,
                "relations": relations.join("; "),
            })
        })
        .collect();
    ctx.render(
        &json!({ "name": spec.name, "declarations": rows, "warnings": spec.warnings }),
        &RenderSpec::table(
            "declarations",
            &[
                ("kind", "kind"),
                ("name", "name"),
                ("update", "update"),
                ("relations", "relations"),
            ],
        ),
    )
}

/// `platform customize-diff <name>`
pub fn diff(ctx: &mut Context, name: &str, sections: &[String]) -> Result<()> {
    check_sections(sections)?;
    let spec = load_spec(ctx, name)?;
    let plan = build_plan(&spec, sections);
    let verbose = ctx.verbose > 0;
    let (api, clock) = ctx.api_and_clock()?;
    let report = diff_plan(api, clock, &plan, verbose);
    match ctx.format {
        Format::Text => ctx.emit(&display::format_diff(&report)),
        _ => ctx.render(&serde_json::to_value(&report)?, &RenderSpec::default())?,
    }
    Ok(())
}

/// `platform customize-apply <name>`
pub fn apply(ctx: &mut Context, name: &str, opts: &ApplyOptions) -> Result<ExecuteSummary> {
    check_sections(&opts.sections)?;
    let spec = load_spec(ctx, name)?;
    let plan = build_plan(&spec, &opts.sections);
    if plan.is_empty() {
        ctx.emit_line(&format!("  {} Nothing declared in {}", "ℹ".blue(), spec.name));
        return Ok(ExecuteSummary::default());
    }

    let exec = ExecuteOptions {
        dry_run: opts.dry_run,
        verbose: ctx.verbose > 0,
        // Stage progress owns the terminal
        wait: WaitOptions {
            progress: false,
            ..ctx.wait_options()
        },
    };
    let interactive = ctx.is_interactive();
    let mut confirm = Confirmation {
        assume_yes: opts.assume_yes,
        interactive,
    };
    let text = ctx.format == Format::Text;

    let summary = if text && interactive {
        let mut progress = StageProgress::new();
        let (api, clock) = ctx.api_and_clock()?;
        declarative::execute(&plan, &exec, api, clock, &mut progress, &mut confirm)?
    } else {
        let mut recorder = DiffRecorder::default();
        let (api, clock) = ctx.api_and_clock()?;
        let summary = declarative::execute(&plan, &exec, api, clock, &mut recorder, &mut confirm)?;
        if text {
            if let Some(report) = &recorder.report {
                ctx.emit(&display::format_diff(report));
            }
        }
        summary
    };

    if text {
        let declined = summary.skipped > 0 && summary.total_changes() == 0;
        if declined && opts.dry_run {
            ctx.emit_line(&format!("\n  {} Dry run - no changes made", "ℹ".blue()));
        } else if declined {
            ctx.emit_line(&format!("\n  {} Aborted", "✗".red()));
            if !interactive && !opts.assume_yes {
                ctx.emit_line("  Re-run with -y to apply without a prompt");
            }
        } else if summary.total_changes() > 0 || summary.failed > 0 {
            ctx.emit(&display::format_summary(&summary));
        }
    } else {
        ctx.render(&serde_json::to_value(&summary)?, &RenderSpec::default())?;
    }

    if summary.failed > 0 {
        bail!(
            "{} failed while applying {}",
            ui::plural(summary.failed, "resource"),
            spec.name
        );
    }
    Ok(summary)
}
