//! Archive Codec - gzip compressed tarballs
//!
//! Jobs arrive as `job_<id>.tar.gz` and the whole workspace leaves the same
//! way at finalize.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::error::ArchiveError;

#[async_trait]
pub trait ArchiveCodec: Send + Sync {
    /// Pack everything under `dir` into the archive file `dest`
    async fn pack(&self, dir: &Path, dest: &Path) -> Result<(), ArchiveError>;

    /// Extract the archive file `archive` into `dir`
    async fn unpack(&self, archive: &Path, dir: &Path) -> Result<(), ArchiveError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzCodec;

impl TarGzCodec {
    pub fn new() -> Self {
        TarGzCodec
    }
}

#[async_trait]
impl ArchiveCodec for TarGzCodec {
    async fn pack(&self, dir: &Path, dest: &Path) -> Result<(), ArchiveError> {
        let (dir, dest) = (dir.to_path_buf(), dest.to_path_buf());
        let task_dest = dest.clone();
        tokio::task::spawn_blocking(move || pack_dir(&dir, &task_dest))
            .await
            .map_err(|e| ArchiveError::io(dest, io::Error::other(e)))?
    }

    async fn unpack(&self, archive: &Path, dir: &Path) -> Result<(), ArchiveError> {
        let (archive, dir) = (archive.to_path_buf(), dir.to_path_buf());
        let task_archive = archive.clone();
        tokio::task::spawn_blocking(move || unpack_into(&task_archive, &dir))
            .await
            .map_err(|e| ArchiveError::io(archive, io::Error::other(e)))?
    }
}

fn pack_dir(dir: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = File::create(dest).map_err(|e| ArchiveError::io(dest, e))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    // Entries are stored under the directory's own name, e.g. `grade/run.sh`
    let prefix = dir
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| ArchiveError::io(dir, io::Error::from(e)))?;
        let path = entry.path();

        // Sockets left behind by a grading script cannot be archived
        if is_socket(&entry) {
            warn!(path = %path.display(), "Skipping socket while packing workspace");
            continue;
        }

        let relative = path.strip_prefix(dir).unwrap_or(path);
        let name = prefix.join(relative);
        builder
            .append_path_with_name(path, &name)
            .map_err(|e| ArchiveError::io(path, e))?;
    }

    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| ArchiveError::io(dest, e))?;
    Ok(())
}

#[cfg(unix)]
fn is_socket(entry: &walkdir::DirEntry) -> bool {
    use std::os::unix::fs::FileTypeExt;
    entry.file_type().is_socket()
}

#[cfg(not(unix))]
fn is_socket(_entry: &walkdir::DirEntry) -> bool {
    false
}

fn unpack_into(archive: &Path, dir: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive).map_err(|e| ArchiveError::io(archive, e))?;
    fs::create_dir_all(dir).map_err(|e| ArchiveError::io(dir, e))?;

    let mut tarball = tar::Archive::new(GzDecoder::new(file));
    tarball.set_preserve_permissions(true);
    tarball
        .unpack(dir)
        .map_err(|e| ArchiveError::io(archive, e))
}
