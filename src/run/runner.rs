//! Target program invocation.
//!
//! The runner contract: launch the target with an ordered argument list and
//! an environment map, buffer its full stdout, then pull the metrics out of
//! the JSON block that follows the last result sentinel line.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Line the target prints before its JSON result block.
pub const RESULT_SENTINEL: &str = "v^v^v^RESULT^v^v^v";

/// Ordered argument tokens; a `None` value is a bare flag.
pub type ArgList = Vec<(String, Option<String>)>;

/// Metric values one invocation produced.
pub type MetricMap = BTreeMap<String, f64>;

/// Anything that can execute the target once and report its metrics.
///
/// Implementations other than [`ProcessRunner`] exist for tests, where a
/// scripted runner replays canned metric maps.
pub trait TargetRunner {
    fn run_target(
        &self,
        args: &ArgList,
        env: &BTreeMap<String, String>,
        verbose: bool,
    ) -> impl Future<Output = Result<MetricMap>>;
}

/// Runs the configured executable as a subprocess.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    executable: PathBuf,
    show_target_output: bool,
}

impl ProcessRunner {
    pub fn new(executable: impl Into<PathBuf>, show_target_output: bool) -> Result<Self> {
        let executable = executable.into();
        if !executable.exists() {
            return Err(EngineError::FileNotFound(executable));
        }
        Ok(ProcessRunner {
            executable,
            show_target_output,
        })
    }
}

impl TargetRunner for ProcessRunner {
    async fn run_target(
        &self,
        args: &ArgList,
        env: &BTreeMap<String, String>,
        verbose: bool,
    ) -> Result<MetricMap> {
        let mut command = Command::new(&self.executable);
        for (key, value) in args {
            command.arg(key);
            if let Some(value) = value {
                command.arg(value);
            }
        }
        command
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if verbose {
            debug!(executable = %self.executable.display(), ?args, "launching target");
        }

        let output = command
            .output()
            .await
            .map_err(|e| EngineError::Runner(format!("failed to launch target: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if self.show_target_output {
            // Target chatter goes to stderr; stdout stays reserved for
            // whatever the CLI itself emits.
            eprint!("{stdout}");
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "target exited unsuccessfully");
            return Err(EngineError::Runner(format!(
                "target exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        extract_metrics(&stdout)
    }
}

/// Pull the metric map out of a target's buffered stdout.
///
/// The payload is everything after the newline that follows the *last*
/// occurrence of the sentinel, parsed as `{"result": {...}}`. Buffering the
/// whole stream first means the target's stdout need not be line-buffered.
pub fn extract_metrics(stdout: &str) -> Result<MetricMap> {
    let sentinel_at = stdout.rfind(RESULT_SENTINEL).ok_or_else(|| {
        EngineError::Runner(format!("target output contains no '{RESULT_SENTINEL}' line"))
    })?;
    let after_sentinel = &stdout[sentinel_at + RESULT_SENTINEL.len()..];
    let payload = match after_sentinel.find('\n') {
        Some(newline) => after_sentinel[newline + 1..].trim(),
        None => "",
    };
    if payload.is_empty() {
        return Err(EngineError::Runner(
            "no JSON payload follows the result sentinel".into(),
        ));
    }

    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| EngineError::Runner(format!("result payload is not valid JSON: {e}")))?;
    let result = value
        .get("result")
        .and_then(serde_json::Value::as_object)
        .ok_or_else(|| {
            EngineError::Runner("result payload lacks a top-level 'result' object".into())
        })?;

    let mut metrics = MetricMap::new();
    for (name, value) in result {
        let number = value.as_f64().ok_or_else(|| {
            EngineError::Runner(format!("metric '{name}' is not numeric: {value}"))
        })?;
        metrics.insert(name.clone(), number);
    }
    Ok(metrics)
}
