//! Finalizer
//!
//! Runs once per job, whether the pipeline succeeded or not. Every sub-step
//! is attempted on its own: a failed upload is logged and recorded, then the
//! next sub-step runs. The only early exit is a missing job id, because then
//! there is nowhere to send anything.

use chrono::Utc;
use grader_common::storage::{results_location, workspace_archive_location};
use grader_common::types::iso8601;
use grader_common::{JobContext, PipelineOutcome, ResultEnvelope, WebhookPayload};
use std::fmt;
use std::io;
use std::path::Path;
use tracing::{debug, error, info};

use crate::collector::collect_results;
use crate::pipeline::Agent;

/// Process exit status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentExit {
    Success,
    Failure,
}

impl AgentExit {
    pub fn code(self) -> i32 {
        match self {
            AgentExit::Success => 0,
            AgentExit::Failure => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeStep {
    CollectResults,
    WriteEnvelope,
    UploadResults,
    PackArchive,
    UploadArchive,
    NotifyWebhook,
}

impl fmt::Display for FinalizeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FinalizeStep::CollectResults => "collect_results",
            FinalizeStep::WriteEnvelope => "write_envelope",
            FinalizeStep::UploadResults => "upload_results",
            FinalizeStep::PackArchive => "pack_archive",
            FinalizeStep::UploadArchive => "upload_archive",
            FinalizeStep::NotifyWebhook => "notify_webhook",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Ok,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: FinalizeStep,
    pub status: StepStatus,
}

/// What finalize did
#[derive(Debug, Clone)]
pub struct FinalizeReport {
    pub exit: AgentExit,
    /// One record per sub-step, in execution order. Empty when finalize could
    /// not start.
    pub steps: Vec<StepRecord>,
    pub envelope: Option<ResultEnvelope>,
    pub outcome: PipelineOutcome,
}

impl FinalizeReport {
    pub fn status(&self, step: FinalizeStep) -> Option<&StepStatus> {
        self.steps
            .iter()
            .find(|r| r.step == step)
            .map(|r| &r.status)
    }
}

/// Records sub-step results and logs them as they happen
#[derive(Default)]
struct StepLog {
    records: Vec<StepRecord>,
}

impl StepLog {
    fn ok(&mut self, step: FinalizeStep) {
        debug!(step = %step, "Finalize step done");
        self.push(step, StepStatus::Ok);
    }

    fn skip(&mut self, step: FinalizeStep, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(step = %step, reason = %reason, "Finalize step skipped");
        self.push(step, StepStatus::Skipped(reason));
    }

    fn fail(&mut self, step: FinalizeStep, reason: impl fmt::Display) {
        let reason = reason.to_string();
        error!(step = %step, "{}", reason);
        self.push(step, StepStatus::Failed(reason));
    }

    fn push(&mut self, step: FinalizeStep, status: StepStatus) {
        self.records.push(StepRecord { step, status });
    }
}

/// Assemble, persist and ship the job's results, then report the exit status.
///
/// The exit status only reflects `outcome.succeeded` (and whether the local
/// envelope could be written). Upload and webhook failures never change it.
pub async fn finalize(
    agent: &Agent<'_>,
    ctx: &JobContext,
    mut outcome: PipelineOutcome,
) -> FinalizeReport {
    let Some(job_id) = ctx.job_id.as_deref() else {
        error!("job_id was not specified, so it's impossible to upload results or an archive");
        return FinalizeReport {
            exit: AgentExit::Failure,
            steps: Vec::new(),
            envelope: None,
            outcome,
        };
    };

    let layout = agent.layout;
    let end_time = Utc::now();
    outcome.end_time = Some(end_time);
    let mut log = StepLog::default();

    // A failed pipeline may have left partial output behind; don't trust it
    if outcome.succeeded {
        outcome.data = collect_results(&layout.grading_results()).await;
        if outcome.data.is_some() {
            log.ok(FinalizeStep::CollectResults);
        } else {
            log.skip(FinalizeStep::CollectResults, "no usable grading results");
        }
    } else {
        log.skip(FinalizeStep::CollectResults, "pipeline did not succeed");
    }

    let envelope = ResultEnvelope::new(outcome.data.clone(), &ctx.start_time, &end_time);
    let envelope_path = layout.result_envelope();
    let envelope_written = match write_envelope(&envelope_path, &envelope).await {
        Ok(()) => {
            log.ok(FinalizeStep::WriteEnvelope);
            true
        }
        Err(e) => {
            log.fail(
                FinalizeStep::WriteEnvelope,
                format!("could not write {}: {}", envelope_path.display(), e),
            );
            false
        }
    };

    let results_uploaded = match ctx.results_bucket.as_deref() {
        None => {
            log.fail(FinalizeStep::UploadResults, "the results bucket was not specified");
            false
        }
        Some(_) if !envelope_written => {
            log.skip(FinalizeStep::UploadResults, "no result envelope to upload");
            false
        }
        Some(bucket) => {
            let dest = results_location(bucket, job_id);
            match agent.store.put(&envelope_path, &dest).await {
                Ok(()) => {
                    info!(to = %dest, "Uploaded results");
                    log.ok(FinalizeStep::UploadResults);
                    true
                }
                Err(e) => {
                    log.fail(
                        FinalizeStep::UploadResults,
                        format!("could not push results to {}: {}", dest, e),
                    );
                    false
                }
            }
        }
    };

    let archive_path = layout.packed_archive();
    let packed = match agent.codec.pack(layout.root(), &archive_path).await {
        Ok(()) => {
            log.ok(FinalizeStep::PackArchive);
            true
        }
        Err(e) => {
            log.fail(FinalizeStep::PackArchive, format!("error packing archive: {}", e));
            false
        }
    };

    let archive_uploaded = match ctx.archives_bucket.as_deref() {
        None => {
            log.fail(FinalizeStep::UploadArchive, "the archives bucket was not specified");
            false
        }
        Some(_) if !packed => {
            log.skip(FinalizeStep::UploadArchive, "no archive to upload");
            false
        }
        Some(bucket) => {
            let dest = workspace_archive_location(bucket, job_id);
            match agent.store.put(&archive_path, &dest).await {
                Ok(()) => {
                    info!(to = %dest, "Uploaded workspace archive");
                    log.ok(FinalizeStep::UploadArchive);
                    true
                }
                Err(e) => {
                    log.fail(
                        FinalizeStep::UploadArchive,
                        format!("could not push archive to {}: {}", dest, e),
                    );
                    false
                }
            }
        }
    };

    match ctx.webhook_url.as_deref() {
        None => log.skip(FinalizeStep::NotifyWebhook, "no webhook configured"),
        Some(url) => {
            let payload = WebhookPayload {
                job_id: job_id.to_string(),
                succeeded: outcome.succeeded,
                start_time: envelope.start_time.clone(),
                end_time: iso8601(&end_time),
                results_uploaded,
                archive_uploaded,
            };
            match agent.notifier.notify(url, &payload).await {
                Ok(()) => log.ok(FinalizeStep::NotifyWebhook),
                Err(e) => log.fail(
                    FinalizeStep::NotifyWebhook,
                    format!("could not notify webhook: {}", e),
                ),
            }
        }
    }

    for record in &log.records {
        if let StepStatus::Failed(reason) = &record.status {
            outcome.record_issue(format!("{}: {}", record.step, reason));
        }
    }

    let exit = if outcome.succeeded && envelope_written {
        AgentExit::Success
    } else {
        AgentExit::Failure
    };

    info!(
        job_id,
        succeeded = outcome.succeeded,
        results_uploaded,
        archive_uploaded,
        issues = outcome.issues.len(),
        exit_code = exit.code(),
        "Finalized job"
    );

    FinalizeReport {
        exit,
        steps: log.records,
        envelope: Some(envelope),
        outcome,
    }
}

async fn write_envelope(path: &Path, envelope: &ResultEnvelope) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec(envelope)?;
    tokio::fs::write(path, body).await
}
