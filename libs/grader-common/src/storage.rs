use std::fmt;

// Object storage key conventions, shared by fetch and upload so the
// naming never drifts between the two directions.

pub const KEY_PREFIX: &str = "job_";

/// An object in a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Key of a packaged job, and of the archived workspace after the run
pub fn archive_key(job_id: &str) -> String {
    format!("{}{}.tar.gz", KEY_PREFIX, job_id)
}

/// Key of the uploaded result envelope
pub fn results_key(job_id: &str) -> String {
    format!("{}{}.json", KEY_PREFIX, job_id)
}

pub fn job_location(jobs_bucket: &str, job_id: &str) -> ObjectLocation {
    ObjectLocation::new(jobs_bucket, archive_key(job_id))
}

pub fn results_location(results_bucket: &str, job_id: &str) -> ObjectLocation {
    ObjectLocation::new(results_bucket, results_key(job_id))
}

pub fn workspace_archive_location(archives_bucket: &str, job_id: &str) -> ObjectLocation {
    ObjectLocation::new(archives_bucket, archive_key(job_id))
}
