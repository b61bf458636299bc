//! Polling of asynchronous CMP tasks and instances.
//!
//! Mutating calls answer with a task handle hidden somewhere in the body;
//! [`extract_task_id`] digs it out and [`wait_task`] polls its status until
//! it is terminal. Time goes through the [`Clock`] trait so tests can run
//! the loop on virtual time.

use crate::client::CmpApi;
use crate::error::{Result, TaskError};
use crate::subsystem;
use crate::value::lookup;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::cell::Cell;
use std::time::{Duration, Instant};

/// Keys probed for a task handle, in order.
pub const TASK_ID_KEYS: [&str; 4] = ["jobid", "taskid", "nvl_TaskId", "nvl-activeTask"];

pub const TASK_TERMINAL: [&str; 3] = ["SUCCESS", "FAILURE", "TIMEOUT"];
pub const INSTANCE_TERMINAL: [&str; 3] = ["ACTIVE", "ERROR", "DELETED"];

pub const STATUS_SUCCESS: &str = "SUCCESS";
pub const STATUS_FAILURE: &str = "FAILURE";
pub const STATUS_TIMEOUT: &str = "TIMEOUT";

/// Source of time for polling loops.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual time that only moves when slept on.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Polling parameters.
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub interval: Duration,
    pub max: Duration,
    /// Draw a spinner on stderr.
    pub progress: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max: Duration::from_secs(600),
            progress: false,
        }
    }
}

/// Final status of a wait and the time it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome {
    pub status: String,
    pub elapsed: Duration,
}

impl WaitOutcome {
    pub fn is_timeout(&self) -> bool {
        self.status == STATUS_TIMEOUT
    }
}

/// Find the task handle in a mutation response.
///
/// `path` is an optional dotted path walked first; `keys` overrides
/// [`TASK_ID_KEYS`]. A `nvl-activeTask` one level below the walked node is
/// also recognised. Only UUID-shaped values are returned.
pub fn extract_task_id(response: &Value, path: Option<&str>, keys: Option<&[&str]>) -> Option<String> {
    let node = match path {
        Some(path) => lookup(response, path)?,
        None => response,
    };
    let keys = keys.unwrap_or(&TASK_ID_KEYS);

    keys.iter()
        .find_map(|key| node.get(*key).and_then(as_uuid))
        .or_else(|| {
            node.as_object()?
                .values()
                .find_map(|child| child.get("nvl-activeTask").and_then(as_uuid))
        })
}

fn as_uuid(value: &Value) -> Option<String> {
    let text = value.as_str()?;
    uuid::Uuid::parse_str(text).ok().map(|_| text.to_string())
}

/// Poll a task until `SUCCESS`, `FAILURE` or `TIMEOUT`.
pub fn wait_task<F>(id: &str, get_status: F, options: &WaitOptions, clock: &dyn Clock) -> WaitOutcome
where
    F: FnMut(&str) -> Result<String>,
{
    wait_for(id, &TASK_TERMINAL, get_status, options, clock)
}

/// Poll an instance until `ACTIVE`, `ERROR` or `DELETED`.
pub fn wait_instance<F>(
    id: &str,
    get_status: F,
    options: &WaitOptions,
    clock: &dyn Clock,
) -> WaitOutcome
where
    F: FnMut(&str) -> Result<String>,
{
    wait_for(id, &INSTANCE_TERMINAL, get_status, options, clock)
}

fn wait_for<F>(
    id: &str,
    terminal: &[&str],
    mut get_status: F,
    options: &WaitOptions,
    clock: &dyn Clock,
) -> WaitOutcome
where
    F: FnMut(&str) -> Result<String>,
{
    let start = clock.now();
    let spinner = options.progress.then(|| spinner(id));

    loop {
        match get_status(id) {
            Ok(status) => {
                let status = status.to_uppercase();
                if terminal.contains(&status.as_str()) {
                    if let Some(pb) = &spinner {
                        pb.finish_and_clear();
                    }
                    return WaitOutcome {
                        status,
                        elapsed: clock.now() - start,
                    };
                }
                if let Some(pb) = &spinner {
                    pb.set_message(format!("{id} {status}"));
                }
            }
            Err(e) => log::debug!("Polling {} failed, retrying: {}", id, e),
        }

        let elapsed = clock.now() - start;
        if elapsed >= options.max {
            if let Some(pb) = &spinner {
                pb.finish_and_clear();
            }
            return WaitOutcome {
                status: STATUS_TIMEOUT.to_string(),
                elapsed,
            };
        }

        if let Some(pb) = &spinner {
            pb.tick();
        }
        // Never sleep past the deadline
        clock.sleep(options.interval.min(options.max - elapsed));
    }
}

fn spinner(id: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(format!("waiting for {id}"));
    pb
}

/// Status path of a task in a subsystem's worker API.
pub fn task_status_path(subsystem: &str, id: &str) -> String {
    let prefix = subsystem::api_prefix(subsystem).unwrap_or("/v1.0/nrs");
    format!("{prefix}/worker/tasks/{id}/status")
}

/// Trace path of a task in a subsystem's worker API.
pub fn task_trace_path(subsystem: &str, id: &str) -> String {
    let prefix = subsystem::api_prefix(subsystem).unwrap_or("/v1.0/nrs");
    format!("{prefix}/worker/tasks/{id}/trace")
}

/// Status string of a task status response.
pub fn status_of(response: &Value) -> Option<String> {
    ["status", "task_instance.status"]
        .iter()
        .find_map(|path| lookup(response, path).and_then(Value::as_str))
        .map(str::to_string)
}

/// Human-readable message of a task trace response.
///
/// Prefers the last error-level entry, then the last entry of any level.
pub fn trace_message(response: &Value) -> String {
    let entries = response
        .get("task_trace")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let message_of = |entry: &Value| entry.get("message").and_then(Value::as_str).map(str::to_string);

    entries
        .iter()
        .rev()
        .filter(|e| e.get("level").and_then(Value::as_str) == Some("ERROR"))
        .find_map(message_of)
        .or_else(|| entries.iter().rev().find_map(message_of))
        .unwrap_or_else(|| "no trace available".to_string())
}

/// Wait for a CMP task and turn `FAILURE` into a [`TaskError`] carrying the
/// remote trace. `TIMEOUT` is returned as an outcome, not an error.
pub fn wait_remote_task(
    api: &mut dyn CmpApi,
    subsystem: &str,
    id: &str,
    options: &WaitOptions,
    clock: &dyn Clock,
) -> Result<WaitOutcome> {
    let outcome = wait_task(
        id,
        |id| {
            let response = api.get(subsystem, &task_status_path(subsystem, id))?;
            Ok(status_of(&response).unwrap_or_else(|| "UNKNOWN".to_string()))
        },
        options,
        clock,
    );

    if outcome.status == STATUS_FAILURE {
        let trace = match api.get(subsystem, &task_trace_path(subsystem, id)) {
            Ok(response) => trace_message(&response),
            Err(e) => format!("trace unavailable: {e}"),
        };
        return Err(TaskError::Failure {
            id: id.to_string(),
            trace,
        }
        .into());
    }
    Ok(outcome)
}
