use grader_common::RequiredField;
use std::path::PathBuf;
use thiserror::Error;

/// Conditions that stop the pipeline and send the run to finalize as failed
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("missing required configuration: {}", join_fields(.0))]
    MissingConfig(Vec<RequiredField>),

    #[error("failed to load the job files from {location}: {source}")]
    Fetch {
        location: String,
        #[source]
        source: BlobError,
    },

    #[error("failed to unpack the job archive: {0}")]
    Unpack(#[source] ArchiveError),

    #[error("error executing init script {path}: {source}")]
    InitScript {
        path: PathBuf,
        #[source]
        source: RunnerError,
    },

    #[error("{0} not found")]
    GradingScriptMissing(PathBuf),

    #[error("could not make {path} executable: {source}")]
    GradingScriptNotExecutable {
        path: PathBuf,
        #[source]
        source: RunnerError,
    },

    #[error("error executing {path}: {source}")]
    GradingScript {
        path: PathBuf,
        #[source]
        source: RunnerError,
    },
}

fn join_fields(fields: &[RequiredField]) -> String {
    fields
        .iter()
        .map(RequiredField::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("copy {from} -> {to} exited with {code:?}")]
    Transfer {
        from: String,
        to: String,
        code: Option<i32>,
    },

    #[error("could not start object storage client: {0}")]
    Spawn(#[from] std::io::Error),
}

impl BlobError {
    pub fn transfer(from: impl ToString, to: impl ToString, code: Option<i32>) -> Self {
        BlobError::Transfer {
            from: from.to_string(),
            to: to.to_string(),
            code,
        }
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("could not set permissions: {0}")]
    Permissions(#[source] std::io::Error),

    #[error("could not run script: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("exited with status {0}")]
    NonZeroExit(i32),

    #[error("terminated by signal")]
    Signaled,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook responded with {0}")]
    Status(reqwest::StatusCode),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
