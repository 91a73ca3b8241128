// ============================================================
// STAGING
// ============================================================
// Temp files written beside their targets, moved into place as one batch

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::error::{AppError, Result};

fn io_err(msg: impl Into<String>) -> AppError {
    AppError::IoError(msg.into())
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|e| io_err(format!("Failed to create dir {}: {e}", path.display())))
}

/// A temp file that replaces `target` on commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub target: PathBuf,
    pub temp: PathBuf,
}

impl StagedFile {
    pub fn new(target: PathBuf) -> Self {
        let temp = target.with_extension(format!("tmp-{}", Uuid::new_v4()));
        Self { target, temp }
    }
}

/// Moves staged files into place together.
///
/// Existing targets are renamed to backups first. If any move fails, the
/// files already moved are put back and the backups restored.
#[derive(Debug, Default)]
pub struct StagingArea {
    files: Vec<StagedFile>,
}

struct Applied {
    target: PathBuf,
    backup: Option<PathBuf>,
}

impl StagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a temp path for `target`; its parent directory is created
    pub fn stage(&mut self, target: PathBuf) -> Result<StagedFile> {
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }
        let staged = StagedFile::new(target);
        self.files.push(staged.clone());
        Ok(staged)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Move every staged file into place, or none of them
    pub fn commit(self) -> Result<Vec<PathBuf>> {
        let mut applied: Vec<Applied> = Vec::with_capacity(self.files.len());

        for staged in &self.files {
            match apply(staged) {
                Ok(done) => applied.push(done),
                Err(e) => {
                    warn!(path = %staged.target.display(), error = %e, "Staged move failed; rolling back");
                    rollback(applied);
                    discard(&self.files);
                    return Err(e);
                }
            }
        }

        let mut targets = Vec::with_capacity(applied.len());
        for done in applied {
            if let Some(backup) = done.backup {
                if let Err(e) = fs::remove_file(&backup) {
                    warn!(path = %backup.display(), error = %e, "Could not remove backup file");
                }
            }
            targets.push(done.target);
        }
        info!(files = targets.len(), "Staged files moved into place");
        Ok(targets)
    }

    /// Delete every temp file without touching the targets
    pub fn abort(self) {
        discard(&self.files);
    }
}

fn apply(staged: &StagedFile) -> Result<Applied> {
    let backup = if staged.target.exists() {
        let backup = staged
            .target
            .with_extension(format!("bak-{}", Uuid::new_v4()));
        fs::rename(&staged.target, &backup).map_err(|e| {
            io_err(format!(
                "Failed to move existing file {} to {}: {e}",
                staged.target.display(),
                backup.display()
            ))
        })?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = fs::rename(&staged.temp, &staged.target) {
        if let Some(backup) = &backup {
            if let Err(restore) = fs::rename(backup, &staged.target) {
                warn!(
                    path = %staged.target.display(),
                    backup = %backup.display(),
                    error = %restore,
                    "Could not restore backup file"
                );
            }
        }
        return Err(io_err(format!(
            "Failed to rename temp file {} to {}: {e}",
            staged.temp.display(),
            staged.target.display()
        )));
    }

    Ok(Applied {
        target: staged.target.clone(),
        backup,
    })
}

fn rollback(applied: Vec<Applied>) {
    for done in applied.into_iter().rev() {
        let restored = match &done.backup {
            Some(backup) => fs::rename(backup, &done.target),
            None => fs::remove_file(&done.target),
        };
        if let Err(e) = restored {
            warn!(path = %done.target.display(), error = %e, "Could not roll back staged file");
        }
    }
}

fn discard(files: &[StagedFile]) {
    for staged in files {
        if staged.temp.exists() {
            if let Err(e) = fs::remove_file(&staged.temp) {
                warn!(path = %staged.temp.display(), error = %e, "Could not remove staged temp file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lookupgen-staging-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_commit_replaces_targets() {
        let dir = temp_dir();
        fs::write(dir.join("a.csv"), "old").unwrap();

        let mut area = StagingArea::new();
        let a = area.stage(dir.join("a.csv")).unwrap();
        let b = area.stage(dir.join("nested").join("b.csv")).unwrap();
        fs::write(&a.temp, "new a").unwrap();
        fs::write(&b.temp, "new b").unwrap();

        let targets = area.commit().unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(fs::read_to_string(dir.join("a.csv")).unwrap(), "new a");
        assert_eq!(fs::read_to_string(dir.join("nested").join("b.csv")).unwrap(), "new b");
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 2);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_failed_move_restores_previous_files() {
        let dir = temp_dir();
        fs::write(dir.join("a.csv"), "old a").unwrap();

        let mut area = StagingArea::new();
        let a = area.stage(dir.join("a.csv")).unwrap();
        fs::write(&a.temp, "new a").unwrap();
        // never written, so its move fails
        let _b = area.stage(dir.join("b.csv")).unwrap();

        assert!(area.commit().is_err());
        assert_eq!(fs::read_to_string(dir.join("a.csv")).unwrap(), "old a");
        assert!(!dir.join("b.csv").exists());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_abort_leaves_targets_alone() {
        let dir = temp_dir();
        let mut area = StagingArea::new();
        let a = area.stage(dir.join("a.csv")).unwrap();
        fs::write(&a.temp, "draft").unwrap();
        area.abort();

        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
        fs::remove_dir_all(&dir).ok();
    }
}
