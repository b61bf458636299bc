//! Running operations on hosts and collecting the results.

use super::operations::Operation;
use super::runner::{Host, SshRunner};
use crate::progress;
use anyhow::{Context as _, Result};
use chrono::{SecondsFormat, Utc};
use colored::Colorize;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

/// Status recorded when the SSH channel itself failed.
pub const CHANNEL_FAILURE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub cmd: String,
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
    /// RFC 3339 time the command returned.
    pub finished: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReport {
    pub host: String,
    pub results: Vec<CommandResult>,
    pub failed: bool,
}

/// Run an operation's steps on one host, stopping at the first failure
/// of a step that is not marked `no_result_ok`.
pub fn run_host(runner: &dyn SshRunner, host: &Host, op: &Operation) -> HostReport {
    let mut results = Vec::with_capacity(op.steps.len());
    let mut failed = false;
    for step in op.steps {
        let outcome = runner.run(host, step.cmd);
        let finished = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let result = match outcome {
            Ok(output) => CommandResult {
                cmd: step.cmd.to_string(),
                stdout: output.stdout,
                stderr: output.stderr,
                status: output.status,
                finished,
            },
            Err(e) => CommandResult {
                cmd: step.cmd.to_string(),
                stdout: String::new(),
                stderr: e.to_string(),
                status: CHANNEL_FAILURE,
                finished,
            },
        };
        let stop = result.status == CHANNEL_FAILURE || (result.status != 0 && !step.no_result_ok);
        results.push(result);
        if stop {
            log::info!("{}: '{}' failed, skipping the remaining steps", host.name, step.cmd);
            failed = true;
            break;
        }
    }
    HostReport {
        host: host.name.clone(),
        results,
        failed,
    }
}

/// Run an operation on every host; reports come back in host order.
pub fn run_all(
    runner: &dyn SshRunner,
    hosts: &[Host],
    op: &Operation,
    jobs: usize,
    show_progress: bool,
) -> Result<Vec<HostReport>> {
    let pb = show_progress.then(|| progress::bar(hosts.len() as u64, op.name));
    let run_one = |host: &Host| {
        let report = run_host(runner, host, op);
        if let Some(pb) = &pb {
            let symbol = if report.failed { "✗" } else { "✓" };
            pb.set_message(format!("{symbol} {}", host.name));
            pb.inc(1);
        }
        report
    };

    let reports: Vec<HostReport> = if jobs <= 1 {
        hosts.iter().map(run_one).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .context("Failed to create ssh thread pool")?;
        pool.install(|| hosts.par_iter().map(run_one).collect())
    };

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    Ok(reports)
}

/// `{host: [{cmd, stdout, stderr, status, finished}, ...]}` in host order.
pub fn to_json(reports: &[HostReport]) -> Result<Value> {
    let mut map = Map::new();
    for report in reports {
        map.insert(report.host.clone(), serde_json::to_value(&report.results)?);
    }
    Ok(Value::Object(map))
}

pub fn write_results(path: &Path, reports: &[HostReport]) -> Result<()> {
    let text = serde_json::to_string_pretty(&to_json(reports)?)?;
    std::fs::write(path, text + "\n")
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// One line per host.
pub fn summary_lines(reports: &[HostReport]) -> Vec<String> {
    reports
        .iter()
        .map(|report| {
            if report.failed {
                let last = report.results.last();
                format!(
                    "  {} {} failed on '{}' (status {})",
                    "✗".red().bold(),
                    report.host,
                    last.map(|r| r.cmd.as_str()).unwrap_or_default(),
                    last.map_or(CHANNEL_FAILURE, |r| r.status)
                )
            } else {
                format!(
                    "  {} {} ({} commands)",
                    "✓".green().bold(),
                    report.host,
                    report.results.len()
                )
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SshError;
    use crate::ops::operations::{self, Step};
    use crate::ops::runner::CommandOutput;

    /// Fails `cmd` on `host` with status 1; everything else succeeds.
    struct Scripted {
        failing: Vec<(&'static str, &'static str)>,
        unreachable: Vec<&'static str>,
    }

    impl SshRunner for Scripted {
        fn run(&self, host: &Host, command: &str) -> Result<CommandOutput, SshError> {
            if self.unreachable.contains(&host.name.as_str()) {
                return Err(SshError::Connection {
                    host: host.name.clone(),
                    reason: "timed out".into(),
                });
            }
            let fails = self
                .failing
                .iter()
                .any(|(h, c)| *h == host.name && *c == command);
            Ok(CommandOutput {
                stdout: format!("{} ran {command}", host.name),
                stderr: if fails { "denied".into() } else { String::new() },
                status: i32::from(fails),
            })
        }
    }

    fn hosts(names: &[&str]) -> Vec<Host> {
        names
            .iter()
            .map(|n| Host {
                name: (*n).to_string(),
                address: format!("{n}.local"),
            })
            .collect()
    }

    #[test]
    fn test_failed_host_stops_and_others_continue() {
        let op = operations::find("check_disk_rw").unwrap();
        let runner = Scripted {
            failing: vec![("B", "df -k")],
            unreachable: vec![],
        };
        let reports = run_all(&runner, &hosts(&["A", "B", "C"]), op, 1, false).unwrap();

        let json = to_json(&reports).unwrap();
        assert_eq!(json["A"].as_array().unwrap().len(), 2);
        assert_eq!(json["B"].as_array().unwrap().len(), 1);
        assert_eq!(json["C"].as_array().unwrap().len(), 2);
        assert_eq!(json["B"][0]["status"], 1);
        assert_eq!(json["B"][0]["stderr"], "denied");

        let summary = summary_lines(&reports);
        assert!(summary[1].contains("B failed on 'df -k'"));
        assert!(summary[0].contains("A (2 commands)"));
        assert!(!reports[0].failed && reports[1].failed && !reports[2].failed);
    }

    #[test]
    fn test_parallel_run_keeps_host_order() {
        let op = operations::find("check_disk_rw").unwrap();
        let runner = Scripted {
            failing: vec![],
            unreachable: vec![],
        };
        let names = ["h1", "h2", "h3", "h4", "h5", "h6"];
        let reports = run_all(&runner, &hosts(&names), op, 4, false).unwrap();
        let order: Vec<&str> = reports.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(order, names);
        let keys: Vec<String> = to_json(&reports)
            .unwrap()
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, names);
    }

    #[test]
    fn test_tolerant_step_does_not_stop() {
        const STEPS: &[Step] = &[
            Step {
                cmd: "swapon --show",
                no_result_ok: true,
            },
            Step {
                cmd: "free -m",
                no_result_ok: false,
            },
        ];
        let op = Operation {
            name: "probe",
            help: "",
            steps: STEPS,
        };
        let runner = Scripted {
            failing: vec![("A", "swapon --show")],
            unreachable: vec![],
        };
        let report = run_host(&runner, &hosts(&["A"])[0], &op);
        assert_eq!(report.results.len(), 2);
        assert!(!report.failed);
    }

    #[test]
    fn test_unreachable_host() {
        let op = operations::find("check_uptime").unwrap();
        let runner = Scripted {
            failing: vec![],
            unreachable: vec!["A"],
        };
        let report = run_host(&runner, &hosts(&["A"])[0], op);
        assert!(report.failed);
        assert_eq!(report.results[0].status, CHANNEL_FAILURE);
        assert!(report.results[0].stderr.contains("timed out"));
    }

    #[test]
    fn test_write_results() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("node-check.json");
        let op = operations::find("check_uptime").unwrap();
        let runner = Scripted {
            failing: vec![],
            unreachable: vec![],
        };
        let reports = run_all(&runner, &hosts(&["A"]), op, 1, false).unwrap();
        write_results(&path, &reports).unwrap();
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["A"][0]["cmd"], "uptime");
        assert_eq!(written["A"][0]["stdout"], "A ran uptime");
        let finished = written["A"][0]["finished"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(finished).is_ok());
    }
}
