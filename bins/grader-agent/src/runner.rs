//! Script Runner - executes init and grading scripts
//!
//! Scripts are opaque executables. The only contract is the exit status;
//! their stdout/stderr go straight to the agent's own output so they end up
//! in the job log.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::error::RunnerError;

/// How a script finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptExit {
    /// `None` when the process was killed by a signal
    pub code: Option<i32>,
}

impl ScriptExit {
    /// Zero is success; anything else, including a signal, is a failure
    pub fn into_result(self) -> Result<(), RunnerError> {
        match self.code {
            Some(0) => Ok(()),
            Some(code) => Err(RunnerError::NonZeroExit(code)),
            None => Err(RunnerError::Signaled),
        }
    }
}

#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Set the execute bits on `script`
    async fn make_executable(&self, script: &Path) -> Result<(), RunnerError>;

    /// Run `script` to completion. Blocks for as long as the script does.
    async fn run(&self, script: &Path) -> Result<ScriptExit, RunnerError>;
}

/// Runs scripts as child processes with the workspace as working directory
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    workdir: PathBuf,
}

impl ProcessRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl ScriptRunner for ProcessRunner {
    #[cfg(unix)]
    async fn make_executable(&self, script: &Path) -> Result<(), RunnerError> {
        use std::os::unix::fs::PermissionsExt;

        let mut perms = tokio::fs::metadata(script)
            .await
            .map_err(RunnerError::Permissions)?
            .permissions();
        perms.set_mode(perms.mode() | 0o111);
        tokio::fs::set_permissions(script, perms)
            .await
            .map_err(RunnerError::Permissions)
    }

    #[cfg(not(unix))]
    async fn make_executable(&self, script: &Path) -> Result<(), RunnerError> {
        tokio::fs::metadata(script)
            .await
            .map(|_| ())
            .map_err(RunnerError::Permissions)
    }

    async fn run(&self, script: &Path) -> Result<ScriptExit, RunnerError> {
        tracing::info!(script = %script.display(), "Running script");

        let status = Command::new(script)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(RunnerError::Spawn)?;

        let exit = ScriptExit {
            code: status.code(),
        };
        tracing::info!(script = %script.display(), exit_code = ?exit.code, "Script finished");
        Ok(exit)
    }
}
