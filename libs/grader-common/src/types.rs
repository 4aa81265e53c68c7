use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ISO-8601 timestamp in UTC
pub fn iso8601(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Run state accumulated by the pipeline and handed to finalize
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    pub succeeded: bool,
    /// Set once, when finalize starts
    pub end_time: Option<DateTime<Utc>>,
    /// Structured output of the grading script, if any was readable
    pub data: Option<Value>,
    /// Non-fatal problems, for the log only
    pub issues: Vec<String>,
}

impl PipelineOutcome {
    pub fn record_issue(&mut self, issue: impl Into<String>) {
        self.issues.push(issue.into());
    }
}

/// Result Envelope
/// Written locally by finalize, then uploaded as `job_<id>.json`
///
/// `data` is always serialized, as `null` when the grading step produced
/// nothing usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub data: Option<Value>,
    pub start_time: String,
    pub end_time: String,
}

impl ResultEnvelope {
    pub fn new(data: Option<Value>, start: &DateTime<Utc>, end: &DateTime<Utc>) -> Self {
        Self {
            data,
            start_time: iso8601(start),
            end_time: iso8601(end),
        }
    }
}

/// Body POSTed to the webhook once the job is done
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub job_id: String,
    pub succeeded: bool,
    pub start_time: String,
    pub end_time: String,
    pub results_uploaded: bool,
    pub archive_uploaded: bool,
}
