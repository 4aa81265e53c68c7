//! Pipeline Controller
//!
//! LOAD_ENV -> FETCH -> UNPACK -> INIT -> GRADE, then finalize. The first
//! failing step ends the pipeline; finalize runs exactly once either way.

use grader_common::storage::job_location;
use grader_common::{JobContext, LoadedEnv, PipelineOutcome, RequiredField, WorkspaceLayout};
use std::path::Path;
use tracing::{error, info, warn};

use crate::archive::ArchiveCodec;
use crate::blob::BlobStore;
use crate::error::{PipelineError, Result};
use crate::finalize::{finalize, FinalizeReport};
use crate::notifier::Notifier;
use crate::runner::ScriptRunner;

/// The collaborators one job run is wired to
pub struct Agent<'a> {
    pub store: &'a dyn BlobStore,
    pub codec: &'a dyn ArchiveCodec,
    pub runner: &'a dyn ScriptRunner,
    pub notifier: &'a dyn Notifier,
    pub layout: &'a WorkspaceLayout,
}

impl Agent<'_> {
    /// Run the job described by `env` and finalize it
    pub async fn run(&self, env: &LoadedEnv) -> FinalizeReport {
        let mut outcome = PipelineOutcome::default();

        match self.execute(env).await {
            Ok(()) => {
                info!("Pipeline completed");
                outcome.succeeded = true;
            }
            Err(e) => {
                error!(error = %e, "Pipeline failed");
                outcome.record_issue(e.to_string());
            }
        }

        finalize(self, &env.context, outcome).await
    }

    async fn execute(&self, env: &LoadedEnv) -> Result<()> {
        if env.has_missing() {
            return Err(PipelineError::MissingConfig(env.missing.clone()));
        }

        let ctx = &env.context;
        let job_id = require(&ctx.job_id, RequiredField::JobId)?;
        info!(job_id, "Running job");

        self.fetch(ctx, job_id).await?;
        self.unpack().await?;
        self.run_init_script().await?;
        self.run_grading_script().await
    }

    async fn fetch(&self, ctx: &JobContext, job_id: &str) -> Result<()> {
        let jobs_bucket = require(&ctx.jobs_bucket, RequiredField::JobsBucket)?;
        let location = job_location(jobs_bucket, job_id);
        let dest = self.layout.job_archive();

        info!(from = %location, to = %dest.display(), "Fetching job archive");
        self.store
            .get(&location, &dest)
            .await
            .map_err(|source| PipelineError::Fetch {
                location: location.to_string(),
                source,
            })
    }

    async fn unpack(&self) -> Result<()> {
        let archive = self.layout.job_archive();
        info!(root = %self.layout.root().display(), "Unpacking job archive");
        self.codec
            .unpack(&archive, self.layout.root())
            .await
            .map_err(PipelineError::Unpack)
    }

    /// Run the first init script that exists, if any. Lower priority
    /// candidates are not looked at once one is found.
    async fn run_init_script(&self) -> Result<()> {
        for candidate in self.layout.init_candidates() {
            if !script_exists(&candidate).await {
                continue;
            }

            info!(script = %candidate.display(), "Running init script");
            if let Err(e) = self.runner.make_executable(&candidate).await {
                warn!(script = %candidate.display(), error = %e, "Could not make init script executable");
            }

            return self
                .runner
                .run(&candidate)
                .await
                .and_then(|exit| exit.into_result())
                .map_err(|source| PipelineError::InitScript {
                    path: candidate.clone(),
                    source,
                });
        }

        info!("No init script found");
        Ok(())
    }

    async fn run_grading_script(&self) -> Result<()> {
        let script = self.layout.grading_script();
        if !script_exists(&script).await {
            return Err(PipelineError::GradingScriptMissing(script));
        }

        // A script we cannot chmod is not run at all
        if let Err(source) = self.runner.make_executable(&script).await {
            return Err(PipelineError::GradingScriptNotExecutable {
                path: script,
                source,
            });
        }

        info!(script = %script.display(), "Running grading script");
        let result = self
            .runner
            .run(&script)
            .await
            .and_then(|exit| exit.into_result());
        result.map_err(|source| PipelineError::GradingScript {
            path: script,
            source,
        })
    }
}

fn require(value: &Option<String>, field: RequiredField) -> Result<&str> {
    value
        .as_deref()
        .ok_or_else(|| PipelineError::MissingConfig(vec![field]))
}

async fn script_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}
