//! Code packaging for delivery into execution units.
//!
//! Code is written to a private temporary directory under the language's
//! entry-point file name. The pooled path ships it as a one-entry tar archive
//! uploaded into a running unit; the sandboxed path bind-mounts the file
//! read-only. Both deliverables own their temporary directory, so the files
//! disappear when the deliverable is dropped, whichever way the request ends.

use crate::errors::ExecutionError;
use crate::language::Language;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};

const FILE_MODE: u32 = 0o644;

/// Tar archive holding a single entry-point file.
#[derive(Debug)]
pub struct PackagedArchive {
    file_name: String,
    bytes: Vec<u8>,
    _dir: TempDir,
}

impl PackagedArchive {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Entry-point file on the host, ready for a read-only bind mount.
#[derive(Debug)]
pub struct PackagedFile {
    file_name: String,
    host_path: PathBuf,
    _dir: TempDir,
}

impl PackagedFile {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn host_path(&self) -> &Path {
        &self.host_path
    }
}

#[derive(Debug, Clone, Default)]
pub struct CodePackager {
    temp_root: Option<PathBuf>,
}

impl CodePackager {
    pub fn new() -> Self {
        Self { temp_root: None }
    }

    /// Place temporary directories under `root` instead of the system temp dir.
    pub fn with_temp_root(mut self, root: PathBuf) -> Self {
        self.temp_root = Some(root);
        self
    }

    pub fn package_archive(
        &self,
        code: &str,
        language: Language,
    ) -> Result<PackagedArchive, ExecutionError> {
        let (dir, file_name, path) = self.write_entry_file(code, language)?;
        let bytes = build_archive(&path, &file_name)
            .map_err(|e| ExecutionError::PackagingFailed(format!("tar archive: {}", e)))?;
        Ok(PackagedArchive {
            file_name,
            bytes,
            _dir: dir,
        })
    }

    pub fn package_bind(&self, code: &str, language: Language) -> Result<PackagedFile, ExecutionError> {
        let (dir, file_name, host_path) = self.write_entry_file(code, language)?;
        Ok(PackagedFile {
            file_name,
            host_path,
            _dir: dir,
        })
    }

    fn write_entry_file(
        &self,
        code: &str,
        language: Language,
    ) -> Result<(TempDir, String, PathBuf), ExecutionError> {
        let mut builder = Builder::new();
        builder.prefix("fnexec-");
        let dir = match &self.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| ExecutionError::PackagingFailed(format!("temp dir: {}", e)))?;

        let file_name = language.entry_file_name();
        let path = dir.path().join(&file_name);
        let mut file = fs::File::create(&path)?;
        file.write_all(code.as_bytes())?;
        file.sync_all()?;

        // Readable by whatever user the interpreter runs as inside the unit.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(FILE_MODE))?;
        }

        Ok((dir, file_name, path))
    }
}

fn build_archive(path: &Path, file_name: &str) -> std::io::Result<Vec<u8>> {
    let data = fs::read(path)?;
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(FILE_MODE);
    header.set_mtime(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    );
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, file_name, data.as_slice())?;
    builder.into_inner()
}
