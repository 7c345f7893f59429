//! PythonCodeRunner -- runs generated pandas code in a child interpreter.
//!
//! Each call gets a scratch directory holding the input dataset, the code
//! and a fixed harness. The harness loads `df` with pandas, executes the
//! code against a restricted builtins table and writes `df` back as CSV.
//! The child is spawned with `kill_on_drop`, so a timeout here or a
//! dropped future upstream (engine deadline, session cancellation)
//! reclaims the process.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tabula_core::runner::CodeRunner;
use tabula_types::config::RunnerConfig;
use tabula_types::error::AttemptError;

/// Harness executed as `{interpreter} harness.py <input> <output> <code> <builtins>`.
///
/// Exit codes: 0 ok, 3 the code raised, 4 no usable `df` afterwards.
pub const PYTHON_HARNESS: &str = r#"import builtins
import sys

import pandas as pd

src, dst, code_path, allowed = sys.argv[1:5]
safe = {name: getattr(builtins, name) for name in allowed.split(",") if hasattr(builtins, name)}
scope = {"df": pd.read_csv(src), "pd": pd}

with open(code_path, encoding="utf-8") as fh:
    code = fh.read()

try:
    exec(compile(code, "<generated>", "exec"), {"__builtins__": safe}, scope)
except Exception as exc:
    sys.stderr.write(f"{type(exc).__name__}: {exc}\n")
    sys.exit(3)

out = scope.get("df")
if out is None:
    sys.stderr.write("Missing df variable\n")
    sys.exit(4)
if not isinstance(out, pd.DataFrame):
    sys.stderr.write(f"df is a {type(out).__name__}, not a DataFrame\n")
    sys.exit(4)

out.to_csv(dst, index=False)
"#;

const INPUT_FILE: &str = "input.csv";
const OUTPUT_FILE: &str = "output.csv";
const CODE_FILE: &str = "code.py";
const HARNESS_FILE: &str = "harness.py";

/// Subprocess implementation of [`CodeRunner`].
#[derive(Debug, Clone)]
pub struct PythonCodeRunner {
    interpreter: String,
    harness: String,
    timeout: Duration,
    max_output_bytes: u64,
    allowed_builtins: Vec<String>,
}

impl PythonCodeRunner {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            harness: PYTHON_HARNESS.to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_output_bytes: config.max_output_bytes,
            allowed_builtins: config.allowed_builtins.clone(),
        }
    }

    /// Replace the harness script (alternate interpreters, test doubles).
    pub fn with_harness(mut self, harness: impl Into<String>) -> Self {
        self.harness = harness.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    async fn prepare(&self, dir: &Path, code: &str, dataset: &[u8]) -> std::io::Result<()> {
        tokio::fs::write(dir.join(INPUT_FILE), dataset).await?;
        tokio::fs::write(dir.join(CODE_FILE), code).await?;
        tokio::fs::write(dir.join(HARNESS_FILE), &self.harness).await
    }
}

/// Last non-empty stderr line; Python puts the exception there.
fn failure_reason(stderr: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

impl CodeRunner for PythonCodeRunner {
    async fn run(&self, code: &str, dataset: &[u8]) -> Result<Vec<u8>, AttemptError> {
        let scratch = tempfile::tempdir()
            .map_err(|e| AttemptError::Execution(format!("cannot create scratch dir: {e}")))?;
        let dir = scratch.path();
        self.prepare(dir, code, dataset)
            .await
            .map_err(|e| AttemptError::Execution(format!("cannot stage code: {e}")))?;

        let child = tokio::process::Command::new(&self.interpreter)
            .arg(HARNESS_FILE)
            .arg(INPUT_FILE)
            .arg(OUTPUT_FILE)
            .arg(CODE_FILE)
            .arg(self.allowed_builtins.join(","))
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AttemptError::Execution(format!("failed to start '{}': {e}", self.interpreter))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AttemptError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| AttemptError::Execution(format!("failed to wait for interpreter: {e}")))?;

        if !output.status.success() {
            let reason = failure_reason(&output.stderr)
                .unwrap_or_else(|| format!("interpreter exited with {}", output.status));
            tracing::debug!(status = %output.status, reason = %reason, "generated code failed");
            return Err(AttemptError::Execution(reason));
        }

        let out_path = dir.join(OUTPUT_FILE);
        let size = match tokio::fs::metadata(&out_path).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                return Err(AttemptError::Execution(
                    "code produced no dataset".to_string(),
                ));
            }
        };
        if size > self.max_output_bytes {
            return Err(AttemptError::Execution(format!(
                "output dataset is {size} bytes, limit is {}",
                self.max_output_bytes
            )));
        }

        tokio::fs::read(&out_path)
            .await
            .map_err(|e| AttemptError::Execution(format!("cannot read output dataset: {e}")))
    }
}
