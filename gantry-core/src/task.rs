//! Capability-dispatched task registry
//!
//! Pipeline implementations are compiled into the binaries and addressed by
//! key; the catalog and the wire protocol carry the key plus JSON arguments,
//! never code. The orchestrator validates keys at registration time and the
//! worker dispatches into the same registry at execution time.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;

use crate::args::TaskArgs;

/// Error raised by a task body.
///
/// Captured into the task report; it only surfaces to callers that inspect
/// the execution's resolved value.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TaskError(pub String);

impl TaskError {
    pub fn msg(message: impl Into<String>) -> Self {
        TaskError(message.into())
    }
}

pub type TaskFn = Arc<dyn Fn(&mut TaskContext, TaskArgs) -> Result<Value, TaskError> + Send + Sync>;

/// Context handed to a running task body.
///
/// Output written through the sinks is captured and shipped back in the
/// report; the exec info records where the task ran.
#[derive(Debug, Default)]
pub struct TaskContext {
    stdout: String,
    stderr: String,
    pub info: ExecInfo,
}

impl TaskContext {
    pub fn new() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            info: ExecInfo::capture(),
        }
    }

    /// Appends one line to the captured standard output.
    pub fn out(&mut self, line: impl AsRef<str>) {
        let _ = writeln!(self.stdout, "{}", line.as_ref());
    }

    /// Appends one line to the captured standard error.
    pub fn err(&mut self, line: impl AsRef<str>) {
        let _ = writeln!(self.stderr, "{}", line.as_ref());
    }
}

/// Where a task ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecInfo {
    pub host: String,
    pub pid: u32,
    pub memory_bytes: Option<u64>,
}

impl ExecInfo {
    /// Snapshot of the current process's identity.
    pub fn capture() -> Self {
        let host = std::env::var("SLURMD_NODENAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "localhost".to_string());
        Self {
            host,
            pid: std::process::id(),
            memory_bytes: None,
        }
    }
}

/// Report produced by a worker after running one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub success: bool,
    pub value: Option<Value>,
    pub error: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub exec_info: ExecInfo,
}

impl TaskReport {
    pub fn succeeded(value: Value, ctx: TaskContext) -> Self {
        Self {
            success: true,
            value: Some(value),
            error: None,
            stdout: ctx.stdout,
            stderr: ctx.stderr,
            exec_info: ctx.info,
        }
    }

    pub fn failed(error: impl Into<String>, ctx: TaskContext) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(error.into()),
            stdout: ctx.stdout,
            stderr: ctx.stderr,
            exec_info: ctx.info,
        }
    }
}

/// Registry of compiled-in task implementations, keyed by capability name.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, TaskFn>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard set shipped with every gantry binary.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("echo", builtin::echo);
        registry.register("sum", builtin::sum);
        registry.register("sleep", builtin::sleep);
        registry.register("fail", builtin::fail);
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: Fn(&mut TaskContext, TaskArgs) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        self.tasks.insert(name.into(), Arc::new(task));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Runs the named task and captures its outcome.
    ///
    /// A failure inside the body becomes the report's resolved value; it is
    /// never propagated to the caller of `run`.
    pub fn run(&self, name: &str, args: TaskArgs) -> TaskReport {
        let mut ctx = TaskContext::new();
        match self.tasks.get(name) {
            None => TaskReport::failed(format!("unknown task: {name}"), ctx),
            Some(task) => match task(&mut ctx, args) {
                Ok(value) => TaskReport::succeeded(value, ctx),
                Err(err) => TaskReport::failed(err.to_string(), ctx),
            },
        }
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}

mod builtin {
    use super::*;

    /// Returns its arguments unchanged.
    pub fn echo(ctx: &mut TaskContext, args: TaskArgs) -> Result<Value, TaskError> {
        for arg in &args.args {
            ctx.out(arg.to_string());
        }
        Ok(serde_json::to_value(&args).expect("task args are valid json"))
    }

    /// Sums the numeric positional arguments.
    pub fn sum(ctx: &mut TaskContext, args: TaskArgs) -> Result<Value, TaskError> {
        let mut total = 0.0;
        for arg in &args.args {
            total += arg
                .as_f64()
                .ok_or_else(|| TaskError::msg(format!("not a number: {arg}")))?;
        }
        ctx.out(format!("sum = {total}"));
        Ok(Value::from(total))
    }

    /// Sleeps for `seconds` (kwarg or first positional argument).
    pub fn sleep(ctx: &mut TaskContext, args: TaskArgs) -> Result<Value, TaskError> {
        let seconds = args
            .kwargs
            .get("seconds")
            .or_else(|| args.args.first())
            .and_then(Value::as_f64)
            .unwrap_or(1.0);
        ctx.out(format!("sleeping {seconds}s"));
        std::thread::sleep(std::time::Duration::from_secs_f64(seconds));
        Ok(Value::from(seconds))
    }

    /// Fails with the given message.
    pub fn fail(_ctx: &mut TaskContext, args: TaskArgs) -> Result<Value, TaskError> {
        let message = args
            .args
            .first()
            .and_then(Value::as_str)
            .unwrap_or("requested failure");
        Err(TaskError::msg(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_success_captures_output() {
        let registry = TaskRegistry::with_builtins();
        let report = registry.run("sum", TaskArgs::positional(vec![json!(1), json!(2.5)]));

        assert!(report.success);
        assert_eq!(report.value, Some(json!(3.5)));
        assert!(report.stdout.contains("sum = 3.5"));
        assert!(report.error.is_none());
    }

    #[test]
    fn test_run_failure_is_captured_not_raised() {
        let registry = TaskRegistry::with_builtins();
        let report = registry.run("fail", TaskArgs::positional(vec![json!("boom")]));

        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("boom"));
        assert!(report.value.is_none());
    }

    #[test]
    fn test_run_unknown_task() {
        let registry = TaskRegistry::new();
        let report = registry.run("nope", TaskArgs::new());

        assert!(!report.success);
        assert!(report.error.unwrap().contains("unknown task"));
    }

    #[test]
    fn test_sum_rejects_non_numeric() {
        let registry = TaskRegistry::with_builtins();
        let report = registry.run("sum", TaskArgs::positional(vec![json!("x")]));
        assert!(!report.success);
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = TaskRegistry::new();
        registry.register("double", |_ctx, args| {
            let n = args.args[0].as_i64().unwrap_or(0);
            Ok(Value::from(n * 2))
        });

        assert!(registry.contains("double"));
        let report = registry.run("double", TaskArgs::positional(vec![json!(21)]));
        assert_eq!(report.value, Some(json!(42)));
    }
}
