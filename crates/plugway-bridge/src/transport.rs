//! Async subprocess transport for the bridge helper

use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to launch bridge program {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Bridge {subcommand} exited with {status}: {stderr}")]
    Failed {
        subcommand: String,
        status: String,
        stderr: String,
    },
    #[error("Invalid bridge output: {0}")]
    InvalidOutput(String),
}

/// Invokes the helper program once per request
///
/// Children are killed when the invocation future is dropped, so callers
/// bound the time spent here with `tokio::time::timeout`.
#[derive(Debug, Clone)]
pub struct BridgeTransport {
    program: String,
    args: Vec<String>,
}

impl BridgeTransport {
    /// Create a transport for `program`, with `args` placed before every subcommand
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run a subcommand and return its stdout
    ///
    /// `flags` become `--name value` arguments. `env` is set in the child's
    /// environment only, for values that must not show up in its argv.
    pub async fn invoke(
        &self,
        subcommand: &str,
        flags: &[(&str, String)],
        env: &[(&str, &str)],
    ) -> Result<Vec<u8>, BridgeError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(subcommand)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (flag, value) in flags {
            command.arg(format!("--{}", flag)).arg(value);
        }
        command.envs(env.iter().copied());

        trace!(program = %self.program, subcommand = subcommand, "Invoking bridge");

        let output = command.output().await.map_err(|source| BridgeError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        debug!(
            subcommand = subcommand,
            status = %output.status,
            stdout_len = output.stdout.len(),
            "Bridge returned"
        );

        if !output.status.success() {
            return Err(BridgeError::Failed {
                subcommand: subcommand.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    /// Run a subcommand and parse its stdout as JSON, `None` when it printed nothing
    pub async fn invoke_json(
        &self,
        subcommand: &str,
        flags: &[(&str, String)],
        env: &[(&str, &str)],
    ) -> Result<Option<serde_json::Value>, BridgeError> {
        let stdout = self.invoke(subcommand, flags, env).await?;
        if stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&stdout)
            .map(Some)
            .map_err(|e| BridgeError::InvalidOutput(e.to_string()))
    }
}
