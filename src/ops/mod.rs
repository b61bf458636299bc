//! Operation orchestrator: fixed command sequences over SSH on a node
//! selection taken from the CMP inventory.

pub mod operations;
pub mod report;
pub mod runner;
pub mod selector;

use crate::cli::args::Invocation;
use crate::context::Context;
use crate::error::UsageError;
use crate::ui;
use anyhow::{Result, bail};
use runner::SshRunner;
use selector::Selector;

pub const DEFAULT_RESULT_FILE: &str = "node-check.json";

/// Resolve the selection, run the operation named by the leaf and write
/// the result file.
pub fn run(ctx: &mut Context, inv: &Invocation, runner: &dyn SshRunner) -> Result<()> {
    let name = inv.command.rsplit(' ').next().unwrap_or_default();
    let op = operations::find(name)
        .ok_or_else(|| UsageError::Other(format!("unknown operation '{name}'")))?;
    let selector = Selector::from_invocation(inv)?;
    let jobs = usize::try_from(inv.get_int("jobs").unwrap_or(1)).unwrap_or(1).max(1);
    let result_file = crate::paths::expand(inv.get_str("result-file").unwrap_or(DEFAULT_RESULT_FILE));

    let hosts = selector.resolve(ctx.api()?)?;
    log::info!("Running {} on {} with {} job(s)", op.name, ui::plural(hosts.len(), "host"), jobs);

    let show_progress = ctx.is_interactive();
    let reports = report::run_all(runner, &hosts, op, jobs, show_progress)?;
    report::write_results(&result_file, &reports)?;

    for line in report::summary_lines(&reports) {
        ctx.emit_line(&line);
    }
    ctx.emit_line(&format!("  Results written to {}", result_file.display()));

    let failed = reports.iter().filter(|r| r.failed).count();
    if failed > 0 {
        bail!("{} of {} failed {}", failed, ui::plural(reports.len(), "host"), op.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::ArgValue;
    use crate::context::testing::context;
    use crate::error::SshError;
    use crate::render::Format;
    use cmpkit::Method;
    use runner::{CommandOutput, Host};
    use serde_json::{Value, json};

    struct FailOn(&'static str, &'static str);

    impl SshRunner for FailOn {
        fn run(&self, host: &Host, command: &str) -> Result<CommandOutput, SshError> {
            let fails = host.name == self.0 && command == self.1;
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                status: i32::from(fails) * 2,
            })
        }
    }

    #[test]
    fn test_check_disk_rw_by_name() {
        let (mut ctx, mock, dir) = context(Format::Text);
        mock.on(
            Method::Get,
            "/v1.0/gas/sshnodes",
            200,
            json!({"sshnodes": [
                {"name": "dbs-1", "ip_address": "10.0.0.1"},
                {"name": "dbs-2", "ip_address": "10.0.0.2"},
                {"name": "dbs-3", "ip_address": "10.0.0.3"}
            ]}),
        );
        let result_file = dir.path().join("node-check.json");
        let inv = Invocation::new("ssh ops check_disk_rw")
            .with_str("name", "dbs")
            .with("size", ArgValue::Int(10))
            .with_str("result-file", &result_file.to_string_lossy());

        let err = run(&mut ctx, &inv, &FailOn("dbs-2", "df -k")).unwrap_err();
        assert!(err.to_string().contains("1 of 3 hosts failed"));

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&result_file).unwrap()).unwrap();
        let entries = written.as_object().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(written["dbs-1"].as_array().unwrap().len(), 2);
        assert_eq!(written["dbs-2"].as_array().unwrap().len(), 1);
        assert!(ctx.captured().contains("dbs-2 failed on 'df -k' (status 2)"));
    }

    #[test]
    fn test_all_hosts_succeed() {
        let (mut ctx, mock, dir) = context(Format::Text);
        mock.on(
            Method::Get,
            "/v1.0/gas/sshnodes/db1",
            200,
            json!({"sshnode": {"name": "db1", "ip_address": "10.0.0.1"}}),
        );
        let result_file = dir.path().join("out.json");
        let inv = Invocation::new("ssh ops check_uptime")
            .with_str("node", "db1")
            .with_str("result-file", &result_file.to_string_lossy());
        run(&mut ctx, &inv, &FailOn("none", "none")).unwrap();
        assert!(result_file.exists());
    }

    #[test]
    fn test_unknown_operation_is_usage_error() {
        let (mut ctx, _mock, _dir) = context(Format::Text);
        let inv = Invocation::new("ssh ops nope").with_str("node", "db1");
        let err = run(&mut ctx, &inv, &FailOn("", "")).unwrap_err();
        assert_eq!(crate::error::exit_code(&err), 2);
    }
}
