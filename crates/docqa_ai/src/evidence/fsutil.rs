use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use docqa_core::error::{codes, AppError};

/// Write `bytes` to `path` via a sibling temp file: write, fsync, close, rename.
/// Readers see either the previous file or the complete new one.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let tmp = tmp_path(path);
    if let Err(e) = write_and_sync(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(AppError::new(codes::STATE_IO_FAILURE, "Failed to write state file")
            .with_details(format!("path={}; err={}", tmp.display(), e)));
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        AppError::new(codes::STATE_IO_FAILURE, "Failed to finalize state file write")
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })?;
    sync_parent_dir(path);
    Ok(())
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.tmp"))
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

pub(crate) fn read_state_file(path: &Path) -> Result<Vec<u8>, AppError> {
    fs::read(path).map_err(|e| {
        let code = if e.kind() == io::ErrorKind::NotFound {
            codes::CORRUPT_INDEX
        } else {
            codes::STATE_IO_FAILURE
        };
        AppError::new(code, "Failed to read state file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

pub(crate) fn corrupt(message: &str, path: &Path, details: impl std::fmt::Display) -> AppError {
    AppError::new(codes::CORRUPT_INDEX, message)
        .with_details(format!("path={}; {}", path.display(), details))
}
