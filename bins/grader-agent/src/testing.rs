//! Recording fakes for pipeline and finalize tests

use async_trait::async_trait;
use grader_common::{JobContext, LoadedEnv, ObjectLocation, WebhookPayload};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

use crate::archive::ArchiveCodec;
use crate::blob::BlobStore;
use crate::error::{ArchiveError, BlobError, NotifyError, RunnerError};
use crate::notifier::Notifier;
use crate::runner::{ScriptExit, ScriptRunner};

pub fn loaded_env(pairs: &[(&str, &str)]) -> LoadedEnv {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    JobContext::from_lookup(|name| vars.get(name).cloned())
}

/// A `.tar.gz` job package with `files` at its top level
pub fn job_tarball(files: &[(&str, &str)]) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    let encoder = flate2::write::GzEncoder::new(
        file.reopen().unwrap(),
        flate2::Compression::default(),
    );
    let mut builder = tar::Builder::new(encoder);
    for (path, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, body.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
    file
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobCall {
    Get(String),
    Put(String),
}

#[derive(Default)]
pub struct FakeStore {
    served: Mutex<HashMap<String, PathBuf>>,
    failing_gets: Mutex<HashSet<String>>,
    failing_puts: Mutex<HashSet<String>>,
    calls: Mutex<Vec<BlobCall>>,
    uploads: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeStore {
    /// `get` of `location` copies `source`
    pub fn serve(&self, location: &str, source: &Path) {
        self.served
            .lock()
            .unwrap()
            .insert(location.to_string(), source.to_path_buf());
    }

    pub fn fail_get(&self, location: &str) {
        self.failing_gets.lock().unwrap().insert(location.to_string());
    }

    pub fn fail_put(&self, location: &str) {
        self.failing_puts.lock().unwrap().insert(location.to_string());
    }

    pub fn calls(&self) -> Vec<BlobCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn gets(&self) -> Vec<BlobCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, BlobCall::Get(_)))
            .collect()
    }

    pub fn uploaded(&self, location: &str) -> Option<Vec<u8>> {
        self.uploads.lock().unwrap().get(location).cloned()
    }

    /// Fails the copy `from -> to` when `location` is in `failing`
    fn check(
        failing: &Mutex<HashSet<String>>,
        location: &str,
        from: &str,
        to: &str,
    ) -> Result<(), BlobError> {
        if failing.lock().unwrap().contains(location) {
            Err(BlobError::transfer(from, to, Some(1)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BlobStore for FakeStore {
    async fn get(&self, from: &ObjectLocation, to: &Path) -> Result<(), BlobError> {
        let key = from.to_string();
        self.calls.lock().unwrap().push(BlobCall::Get(key.clone()));
        Self::check(&self.failing_gets, &key, &key, &to.to_string_lossy())?;

        let source = self.served.lock().unwrap().get(&key).cloned();
        if let Some(source) = source {
            fs::copy(source, to)?;
        }
        Ok(())
    }

    async fn put(&self, from: &Path, to: &ObjectLocation) -> Result<(), BlobError> {
        let key = to.to_string();
        self.calls.lock().unwrap().push(BlobCall::Put(key.clone()));
        Self::check(&self.failing_puts, &key, &from.to_string_lossy(), &key)?;

        let body = fs::read(from)?;
        self.uploads.lock().unwrap().insert(key, body);
        Ok(())
    }
}

/// Codec that fakes unpacking by writing files into the target directory
#[derive(Default)]
pub struct FakeCodec {
    files: Vec<(String, String)>,
    fail_unpack: bool,
    fail_pack: bool,
    packs: Mutex<usize>,
}

impl FakeCodec {
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(p, b)| (p.to_string(), b.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn failing_unpack() -> Self {
        Self {
            fail_unpack: true,
            ..Default::default()
        }
    }

    pub fn failing_pack() -> Self {
        Self {
            fail_pack: true,
            ..Default::default()
        }
    }

    pub fn packs(&self) -> usize {
        *self.packs.lock().unwrap()
    }
}

#[async_trait]
impl ArchiveCodec for FakeCodec {
    async fn pack(&self, dir: &Path, dest: &Path) -> Result<(), ArchiveError> {
        *self.packs.lock().unwrap() += 1;
        if self.fail_pack {
            return Err(ArchiveError::io(dir, std::io::Error::other("pack failed")));
        }
        fs::write(dest, b"packed").map_err(|e| ArchiveError::io(dest, e))
    }

    async fn unpack(&self, archive: &Path, dir: &Path) -> Result<(), ArchiveError> {
        if self.fail_unpack {
            return Err(ArchiveError::io(archive, std::io::Error::other("corrupt")));
        }
        for (rel, body) in &self.files {
            let path = dir.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
            }
            fs::write(&path, body).map_err(|e| ArchiveError::io(&path, e))?;
        }
        Ok(())
    }
}

/// Runner that records invocations instead of spawning processes.
/// Scripts exit 0 unless configured otherwise.
#[derive(Default)]
pub struct FakeRunner {
    exits: Mutex<HashMap<PathBuf, i32>>,
    chmod_failures: Mutex<HashSet<PathBuf>>,
    spawn_failures: Mutex<HashSet<PathBuf>>,
    writes: Mutex<HashMap<PathBuf, (PathBuf, String)>>,
    chmods: Mutex<Vec<PathBuf>>,
    runs: Mutex<Vec<PathBuf>>,
}

impl FakeRunner {
    pub fn exit_with(&self, script: PathBuf, code: i32) {
        self.exits.lock().unwrap().insert(script, code);
    }

    pub fn fail_chmod(&self, script: PathBuf) {
        self.chmod_failures.lock().unwrap().insert(script);
    }

    pub fn fail_spawn(&self, script: PathBuf) {
        self.spawn_failures.lock().unwrap().insert(script);
    }

    /// When `script` runs, it writes `body` to `file`
    pub fn write_on_run(&self, script: PathBuf, file: PathBuf, body: &str) {
        self.writes
            .lock()
            .unwrap()
            .insert(script, (file, body.to_string()));
    }

    pub fn runs(&self) -> Vec<PathBuf> {
        self.runs.lock().unwrap().clone()
    }

    pub fn chmods(&self) -> Vec<PathBuf> {
        self.chmods.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptRunner for FakeRunner {
    async fn make_executable(&self, script: &Path) -> Result<(), RunnerError> {
        self.chmods.lock().unwrap().push(script.to_path_buf());
        if self.chmod_failures.lock().unwrap().contains(script) {
            return Err(RunnerError::Permissions(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied,
            )));
        }
        Ok(())
    }

    async fn run(&self, script: &Path) -> Result<ScriptExit, RunnerError> {
        self.runs.lock().unwrap().push(script.to_path_buf());
        if self.spawn_failures.lock().unwrap().contains(script) {
            return Err(RunnerError::Spawn(std::io::Error::from(
                std::io::ErrorKind::NotFound,
            )));
        }

        let write = self.writes.lock().unwrap().get(script).cloned();
        if let Some((file, body)) = write {
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(file, body).unwrap();
        }

        let code = self.exits.lock().unwrap().get(script).copied().unwrap_or(0);
        Ok(ScriptExit { code: Some(code) })
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    fail: bool,
    deliveries: Mutex<Vec<(String, WebhookPayload)>>,
}

impl FakeNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn deliveries(&self) -> Vec<(String, WebhookPayload)> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, url: &str, payload: &WebhookPayload) -> Result<(), NotifyError> {
        self.deliveries
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        if self.fail {
            return Err(NotifyError::Status(reqwest::StatusCode::BAD_GATEWAY));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_failures_are_per_direction() {
        let store = FakeStore::default();
        let loc = ObjectLocation::new("jobs", "job_1.tar.gz");
        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("job.tar.gz");
        fs::write(&local, b"x").unwrap();

        store.fail_get("s3://jobs/job_1.tar.gz");

        assert!(store.get(&loc, &local).await.is_err());
        assert!(store.put(&local, &loc).await.is_ok());
    }

    #[tokio::test]
    async fn test_store_errors_match_copy_direction() {
        let store = FakeStore::default();
        let loc = ObjectLocation::new("results", "job_1.json");
        let local = Path::new("/grade/results.json");

        store.fail_put("s3://results/job_1.json");

        match store.put(local, &loc).await.unwrap_err() {
            BlobError::Transfer { from, to, .. } => {
                assert_eq!(from, "/grade/results.json");
                assert_eq!(to, "s3://results/job_1.json");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
