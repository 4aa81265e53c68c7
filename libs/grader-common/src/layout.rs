use std::path::{Path, PathBuf};

pub const DEFAULT_WORKSPACE_ROOT: &str = "/grade";
pub const DEFAULT_SCRATCH_DIR: &str = "/";

/// Init script locations, most specific first.
///
/// 1. question tests (`tests/`)
/// 2. autograder (`shared/`)
/// 3. environment (workspace root)
///
/// Only the first one found is run. A script that wants the others must call
/// them itself.
pub const INIT_CANDIDATES: [&str; 3] = ["tests/init.sh", "shared/init.sh", "init.sh"];
pub const GRADING_SCRIPT: &str = "run.sh";
/// Written by the grading script
pub const GRADING_RESULTS: &str = "results/results.json";
/// Written by finalize: grading results plus run metadata
pub const RESULT_ENVELOPE: &str = "results.json";
pub const JOB_ARCHIVE: &str = "job.tar.gz";
pub const PACKED_ARCHIVE: &str = "archive.tar.gz";

/// Fixed filesystem layout of a job run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
    scratch: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>, scratch: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scratch: scratch.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Init candidates in priority order
    pub fn init_candidates(&self) -> [PathBuf; 3] {
        INIT_CANDIDATES.map(|rel| self.root.join(rel))
    }

    pub fn grading_script(&self) -> PathBuf {
        self.root.join(GRADING_SCRIPT)
    }

    pub fn grading_results(&self) -> PathBuf {
        self.root.join(GRADING_RESULTS)
    }

    pub fn result_envelope(&self) -> PathBuf {
        self.root.join(RESULT_ENVELOPE)
    }

    /// Where the fetched job archive is stored before unpacking
    pub fn job_archive(&self) -> PathBuf {
        self.scratch.join(JOB_ARCHIVE)
    }

    /// Where the workspace is packed at finalize. Lives outside the
    /// workspace so the archive never contains itself.
    pub fn packed_archive(&self) -> PathBuf {
        self.scratch.join(PACKED_ARCHIVE)
    }
}

impl Default for WorkspaceLayout {
    fn default() -> Self {
        Self::new(DEFAULT_WORKSPACE_ROOT, DEFAULT_SCRATCH_DIR)
    }
}
