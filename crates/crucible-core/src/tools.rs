//! Sandboxed `run_python` tool for agentic generations.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;

const MAX_OUTPUT: usize = 100 * 1024;
const SECRET_MARKERS: [&str; 5] = ["API_KEY", "SECRET", "TOKEN", "PASSWORD", "CREDENTIAL"];

pub const RUN_PYTHON: &str = "run_python";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: f64,
    pub truncated: bool,
}

/// Executes Python code in a subprocess with a scrubbed environment.
///
/// Never errors: timeouts and spawn failures come back as a nonzero
/// `exit_code` with the message in `stderr`, so the tool loop can feed the
/// result straight back to the model.
pub async fn run_python(code: &str, timeout: Duration) -> ToolOutput {
    let start = Instant::now();

    let mut cmd = Command::new("python3");
    cmd.arg("-c")
        .arg(code)
        .current_dir("/tmp")
        .env_clear()
        .kill_on_drop(true);
    for (k, v) in std::env::vars() {
        let upper = k.to_ascii_uppercase();
        if SECRET_MARKERS.iter().any(|m| upper.contains(m)) {
            continue;
        }
        cmd.env(k, v);
    }
    if std::env::var_os("PATH").is_none() {
        cmd.env("PATH", "/usr/bin:/bin");
    }

    let result = tokio::time::timeout(timeout, cmd.output()).await;
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    match result {
        Ok(Ok(out)) => {
            let (stdout, t1) = cap(&out.stdout);
            let (stderr, t2) = cap(&out.stderr);
            ToolOutput {
                stdout,
                stderr,
                exit_code: out.status.code().unwrap_or(-1),
                duration_ms,
                truncated: t1 || t2,
            }
        }
        Ok(Err(e)) => ToolOutput {
            stdout: String::new(),
            stderr: format!("failed to spawn python3: {}", e),
            exit_code: -1,
            duration_ms,
            truncated: false,
        },
        Err(_) => ToolOutput {
            stdout: String::new(),
            stderr: format!("Execution timed out after {}s", timeout.as_secs()),
            exit_code: -1,
            duration_ms,
            truncated: false,
        },
    }
}

fn cap(bytes: &[u8]) -> (String, bool) {
    let s = String::from_utf8_lossy(bytes);
    if s.len() > MAX_OUTPUT {
        let mut end = MAX_OUTPUT;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        (s[..end].to_string(), true)
    } else {
        (s.into_owned(), false)
    }
}
