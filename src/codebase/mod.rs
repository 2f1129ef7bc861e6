//! The experiment's code base: adapter programs plus simulation binaries.
//!
//! The coordinator serves it as `code_base.zip`, which in turn contains
//! `simulation_binaries.zip`. Both are unpacked into `<experiment dir>/code_base`, and every
//! top-level entry is made executable.

use std::fmt;
use std::io::Cursor;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{ErrorCode, Result, WorkerError};
use crate::services::ExperimentManagerClient;

pub const CODE_BASE_DIR: &str = "code_base";
pub const CODE_BASE_ARCHIVE: &str = "code_base.zip";
pub const BINARIES_ARCHIVE: &str = "simulation_binaries.zip";

/// The pluggable programs that make up an execution pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    InputWriter,
    Executor,
    OutputReader,
    ProgressMonitor,
}

impl AdapterKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            AdapterKind::InputWriter => "input_writer",
            AdapterKind::Executor => "executor",
            AdapterKind::OutputReader => "output_reader",
            AdapterKind::ProgressMonitor => "progress_monitor",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBase {
    dir: PathBuf,
}

impl CodeBase {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Code base location inside an experiment directory
    pub fn in_experiment(experiment_dir: &Path) -> Self {
        Self::new(experiment_dir.join(CODE_BASE_DIR))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_installed(&self) -> bool {
        self.dir.is_dir()
    }

    /// Path of an adapter, if the code base ships it
    pub fn adapter(&self, kind: AdapterKind) -> Option<PathBuf> {
        let path = self.dir.join(kind.file_name());
        path.is_file().then_some(path)
    }

    /// Download and unpack the code base unless a previous run already did.
    ///
    /// Returns whether anything was installed.
    pub async fn install(&self, coordinators: &ExperimentManagerClient) -> Result<bool> {
        if self.is_installed() {
            tracing::info!("Reusing code base in {}", self.dir.display());
            return Ok(false);
        }

        tracing::info!("Getting code base ...");
        // Exhausting the coordinators is a transport failure, not a broken bundle
        let archive = coordinators.download_code_base().await?;
        self.install_archive(archive).await?;
        Ok(true)
    }

    /// Unpack a downloaded `code_base.zip`; a failed install leaves no directory behind
    pub async fn install_archive(&self, archive: Vec<u8>) -> Result<()> {
        let result = self.unpack(archive).await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
                tracing::debug!("Nothing to clean up in {}: {}", self.dir.display(), e);
            }
        }
        result
    }

    async fn unpack(&self, archive: Vec<u8>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            self.error(
                ErrorCode::IO_CREATE_DIR,
                "Cannot create code base directory",
                &self.dir,
                e,
            )
        })?;

        let archive_path = self.dir.join(CODE_BASE_ARCHIVE);
        tokio::fs::write(&archive_path, &archive).await.map_err(|e| {
            self.error(ErrorCode::IO_WRITE, "Cannot save code base archive", &archive_path, e)
        })?;

        extract(archive_path, self.dir.clone()).await?;
        extract(self.dir.join(BINARIES_ARCHIVE), self.dir.clone()).await?;
        self.make_executable().await?;

        tracing::info!("Code base installed in {}", self.dir.display());
        Ok(())
    }

    /// `chmod a+x` on every top-level entry
    async fn make_executable(&self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            self.error(ErrorCode::CODEBASE_PERMISSIONS, "Cannot list code base", &self.dir, e)
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            self.error(ErrorCode::CODEBASE_PERMISSIONS, "Cannot list code base", &self.dir, e)
        })? {
            let path = entry.path();
            let chmod = async {
                let mut permissions = tokio::fs::metadata(&path).await?.permissions();
                permissions.set_mode(permissions.mode() | 0o111);
                tokio::fs::set_permissions(&path, permissions).await
            };
            chmod.await.map_err(|e| {
                self.error(
                    ErrorCode::CODEBASE_PERMISSIONS,
                    "Cannot make code base executable",
                    &path,
                    e,
                )
            })?;
        }
        Ok(())
    }

    fn error(&self, code: u16, message: &str, path: &Path, source: std::io::Error) -> WorkerError {
        WorkerError::code_base_with_code(code, message, Some(path.to_path_buf())).with_source(source)
    }
}

/// Unpack a zip archive into `dest` on the blocking pool
async fn extract(archive_path: PathBuf, dest: PathBuf) -> Result<()> {
    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let unpacked = tokio::task::spawn_blocking(move || -> zip::result::ZipResult<()> {
        let content = std::fs::read(&archive_path)?;
        let mut archive = zip::ZipArchive::new(Cursor::new(content))?;
        archive.extract(&dest)
    })
    .await?;

    unpacked.map_err(|e| {
        WorkerError::code_base_with_code(
            ErrorCode::CODEBASE_EXTRACT_FAILED,
            format!("An error occurred while unzipping '{}'", name),
            None,
        )
        .with_source(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Credentials, Dispatcher, EndpointPool, MockTransport};
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn code_base_archive() -> Vec<u8> {
        let binaries = zip_of(&[("simulation", b"#!/bin/sh\necho sim\n")]);
        zip_of(&[
            ("executor", b"#!/bin/sh\n./simulation\n"),
            ("input_writer", b"#!/bin/sh\ncat $1\n"),
            (BINARIES_ARCHIVE, &binaries),
        ])
    }

    #[tokio::test]
    async fn test_install_archive_unpacks_both_levels() {
        let root = TempDir::new().unwrap();
        let code_base = CodeBase::in_experiment(root.path());

        code_base.install_archive(code_base_archive()).await.unwrap();

        assert!(code_base.dir().join(CODE_BASE_ARCHIVE).is_file());
        assert!(code_base.dir().join("simulation").is_file());
        assert!(code_base.adapter(AdapterKind::Executor).is_some());
        assert!(code_base.adapter(AdapterKind::InputWriter).is_some());
        assert!(code_base.adapter(AdapterKind::ProgressMonitor).is_none());

        let mode = std::fs::metadata(code_base.dir().join("executor"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_exit_code_two() {
        let root = TempDir::new().unwrap();
        let code_base = CodeBase::in_experiment(root.path());

        let err = code_base
            .install_archive(b"definitely not a zip".to_vec())
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::CODEBASE_EXTRACT_FAILED);
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains(CODE_BASE_ARCHIVE));
        assert!(!code_base.is_installed());
    }

    #[tokio::test]
    async fn test_missing_binaries_archive_fails() {
        let root = TempDir::new().unwrap();
        let code_base = CodeBase::in_experiment(root.path());

        let err = code_base
            .install_archive(zip_of(&[("executor", b"#!/bin/sh\n")]))
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains(BINARIES_ARCHIVE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_coordinators_exit_with_one() {
        let root = TempDir::new().unwrap();
        let code_base = CodeBase::in_experiment(root.path());
        let transport = MockTransport::new();
        transport.unreachable("em:1");
        let coordinators = ExperimentManagerClient::new(
            Dispatcher::new(Arc::new(transport.clone()), "http", Credentials::default()),
            EndpointPool::single("experiment manager", "em:1"),
            "e",
            Duration::from_secs(2),
        );

        let err = code_base.install(&coordinators).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::TRANSPORT_EXHAUSTED);
        assert_eq!(err.exit_code(), 1);
        assert!(!code_base.is_installed());
        assert!(transport
            .requests()
            .iter()
            .all(|r| r.path == "experiments/e/code_base"));
    }

    #[test]
    fn test_adapter_file_names() {
        assert_eq!(AdapterKind::ProgressMonitor.to_string(), "progress_monitor");
        assert_eq!(AdapterKind::OutputReader.file_name(), "output_reader");
    }
}
