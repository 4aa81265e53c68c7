//! Blob Store - object storage transfers
//!
//! The pipeline only ever copies whole files in and out of a bucket, so the
//! store exposes exactly that: `get` an object to a local path, `put` a
//! local file to an object.

use async_trait::async_trait;
use grader_common::ObjectLocation;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::BlobError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download `from` into the local file `to`
    async fn get(&self, from: &ObjectLocation, to: &Path) -> Result<(), BlobError>;

    /// Upload the local file `from` to `to`
    async fn put(&self, from: &Path, to: &ObjectLocation) -> Result<(), BlobError>;
}

/// Object storage through the AWS command line client (`aws s3 cp`).
///
/// Credentials and endpoint come from the usual AWS environment, which the
/// child process inherits.
#[derive(Debug, Clone)]
pub struct AwsCliStore {
    program: String,
}

impl AwsCliStore {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), BlobError> {
        tracing::debug!(from, to, program = %self.program, "Copying object");

        let status = Command::new(&self.program)
            .args(["s3", "cp", from, to])
            .stdin(Stdio::null())
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(BlobError::transfer(from, to, status.code()))
        }
    }
}

#[async_trait]
impl BlobStore for AwsCliStore {
    async fn get(&self, from: &ObjectLocation, to: &Path) -> Result<(), BlobError> {
        self.copy(&from.to_string(), &to.to_string_lossy()).await
    }

    async fn put(&self, from: &Path, to: &ObjectLocation) -> Result<(), BlobError> {
        self.copy(&from.to_string_lossy(), &to.to_string()).await
    }
}
