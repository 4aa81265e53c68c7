use chrono::{DateTime, Utc};
use std::env;
use std::fmt;
use std::path::PathBuf;
use tracing::{error, warn};

use crate::layout::{DEFAULT_SCRATCH_DIR, DEFAULT_WORKSPACE_ROOT};

pub const JOB_ID_VAR: &str = "JOB_ID";
pub const JOBS_BUCKET_VAR: &str = "S3_JOBS_BUCKET";
pub const RESULTS_BUCKET_VAR: &str = "S3_RESULTS_BUCKET";
pub const ARCHIVES_BUCKET_VAR: &str = "S3_ARCHIVES_BUCKET";
pub const WEBHOOK_URL_VAR: &str = "WEBHOOK_URL";

/// A setting the agent cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredField {
    JobId,
    JobsBucket,
    ResultsBucket,
    ArchivesBucket,
}

impl RequiredField {
    /// Check order used by the loader
    pub const ALL: [RequiredField; 4] = [
        RequiredField::JobId,
        RequiredField::JobsBucket,
        RequiredField::ResultsBucket,
        RequiredField::ArchivesBucket,
    ];

    pub fn var(&self) -> &'static str {
        match self {
            RequiredField::JobId => JOB_ID_VAR,
            RequiredField::JobsBucket => JOBS_BUCKET_VAR,
            RequiredField::ResultsBucket => RESULTS_BUCKET_VAR,
            RequiredField::ArchivesBucket => ARCHIVES_BUCKET_VAR,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            RequiredField::JobId => "job ID",
            RequiredField::JobsBucket => "S3 jobs bucket",
            RequiredField::ResultsBucket => "S3 results bucket",
            RequiredField::ArchivesBucket => "S3 archives bucket",
        }
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.var())
    }
}

/// Everything known about the job being run.
///
/// Built once at startup and never mutated afterwards. Required fields are
/// still `Option` because a misconfigured run must reach finalize with
/// whatever was present.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: Option<String>,
    pub jobs_bucket: Option<String>,
    pub results_bucket: Option<String>,
    pub archives_bucket: Option<String>,
    pub webhook_url: Option<String>,
    pub start_time: DateTime<Utc>,
}

/// Output of the environment loader
#[derive(Debug, Clone)]
pub struct LoadedEnv {
    pub context: JobContext,
    /// Required fields that were absent, in check order
    pub missing: Vec<RequiredField>,
}

impl LoadedEnv {
    pub fn has_missing(&self) -> bool {
        !self.missing.is_empty()
    }
}

impl JobContext {
    /// Read the job settings from the process environment
    pub fn from_env() -> LoadedEnv {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read the job settings through `lookup`.
    ///
    /// Every required field is checked and each absent one is logged, so a
    /// single run reports the whole misconfiguration. Values are only checked
    /// for presence; an empty string counts as set.
    pub fn from_lookup<F>(lookup: F) -> LoadedEnv
    where
        F: Fn(&str) -> Option<String>,
    {
        let start_time = Utc::now();
        let mut missing = Vec::new();

        let mut required = |field: RequiredField| {
            let value = lookup(field.var());
            if value.is_none() {
                error!(
                    variable = field.var(),
                    "the {} was not specified in the {} environment variable",
                    field.description(),
                    field
                );
                missing.push(field);
            }
            value
        };

        let [job_id, jobs_bucket, results_bucket, archives_bucket] =
            RequiredField::ALL.map(&mut required);

        let webhook_url = lookup(WEBHOOK_URL_VAR);
        if webhook_url.is_none() {
            warn!(
                variable = WEBHOOK_URL_VAR,
                "the webhook callback url was not specified in the {} environment variable",
                WEBHOOK_URL_VAR
            );
        }

        LoadedEnv {
            context: JobContext {
                job_id,
                jobs_bucket,
                results_bucket,
                archives_bucket,
                webhook_url,
                start_time,
            },
            missing,
        }
    }
}

/// Agent settings
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    pub workspace_root: PathBuf,
    pub scratch_dir: PathBuf,
    pub aws_cli: String,
    pub json_logs: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            workspace_root: lookup("GRADER_WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE_ROOT)),
            scratch_dir: lookup("GRADER_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_DIR)),
            aws_cli: lookup("GRADER_AWS_CLI").unwrap_or_else(|| "aws".to_string()),
            json_logs: lookup("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
