//! Filesystem side of the pipeline
//!
//! Acts on an [`Outcome`] that has already been decided: backs up and rewrites
//! modified files in place, and moves everything else into its bucket folder.
//! Nothing is ever deleted or overwritten; an occupied destination is reported
//! as a collision and the file is left where it is.
//!
//! Relocation checks the destination and then renames. Another process creating
//! the same name in between is not guarded against.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::classify::{Bucket, Outcome};
use crate::config::{FolderNames, ProcessingConfig};
use crate::error::OrganizeError;

/// What the organizer did (or, in dry-run, would have done) with a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// New content written in place; `backup` holds the original bytes when enabled
    Rewritten { backup: Option<PathBuf> },
    /// Moved into a bucket folder
    Relocated { destination: PathBuf },
    /// The destination (or backup) name was taken; the file was left untouched
    Collision { destination: PathBuf },
    /// A file-scoped failure; the file stays in place
    Aborted { reason: String },
}

impl Disposition {
    pub fn is_warning(&self) -> bool {
        matches!(self, Disposition::Collision { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Disposition::Aborted { .. })
    }
}

/// Moves, backs up and rewrites files under one working directory
#[derive(Debug, Clone)]
pub struct FileOrganizer {
    root: PathBuf,
    folders: FolderNames,
    create_backup: bool,
    dry_run: bool,
}

impl FileOrganizer {
    pub fn new(root: impl Into<PathBuf>, config: &ProcessingConfig) -> Self {
        Self {
            root: root.into(),
            folders: config.folders().clone(),
            create_backup: config.create_backup(),
            dry_run: config.dry_run(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(&self.folders.backup)
    }

    /// Folder a bucket routes to; `None` for files that stay in the working directory
    pub fn bucket_dir(&self, bucket: Bucket) -> Option<PathBuf> {
        match bucket {
            Bucket::WorkingDir => None,
            Bucket::ValueAbsent => Some(self.root.join(&self.folders.value_absent)),
            Bucket::NotChanged => Some(self.root.join(&self.folders.not_changed)),
        }
    }

    /// Apply `outcome` to `path`.
    ///
    /// `original` must be the bytes read from disk; `rewritten` the new content for
    /// modifications. Errors are folded into the returned [`Disposition`] so one
    /// file can never stop the run.
    pub async fn organize(
        &self,
        path: &Path,
        original: &[u8],
        rewritten: Option<&[u8]>,
        outcome: Outcome,
    ) -> Disposition {
        let result = if outcome.is_modification() {
            match rewritten {
                Some(content) => self.rewrite(path, original, content).await,
                None => {
                    return Disposition::Aborted {
                        reason: "no content to write back".to_string(),
                    };
                }
            }
        } else {
            self.relocate(path, outcome.bucket()).await
        };

        match result {
            Ok(disposition) => disposition,
            Err(OrganizeError::DestinationCollision { destination }) => {
                warn!(
                    file = %path.display(),
                    destination = %destination.display(),
                    "Destination already exists, leaving file in place"
                );
                Disposition::Collision { destination }
            }
            Err(e) => {
                error!(file = %path.display(), error = %e, "Aborted file");
                Disposition::Aborted {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn rewrite(
        &self,
        path: &Path,
        original: &[u8],
        content: &[u8],
    ) -> Result<Disposition, OrganizeError> {
        let backup = if self.create_backup {
            Some(self.backup(path, original).await?)
        } else {
            None
        };

        if self.dry_run {
            debug!(file = %path.display(), "Dry run: would rewrite");
            return Ok(Disposition::Rewritten { backup });
        }

        replace_contents(path, content)
            .await
            .map_err(|source| OrganizeError::WriteBack {
                file: path.to_path_buf(),
                source,
            })?;
        info!(file = %path.display(), bytes = content.len(), "Rewrote file");

        Ok(Disposition::Rewritten { backup })
    }

    /// Copy the original bytes into the backup folder without replacing anything there
    async fn backup(&self, path: &Path, original: &[u8]) -> Result<PathBuf, OrganizeError> {
        let dir = self.backup_dir();
        let destination = dir.join(file_name(path)?);
        let failure = |source| OrganizeError::BackupWriteFailure {
            file: path.to_path_buf(),
            source,
        };

        if self.dry_run {
            if exists(&destination).await.map_err(failure)? {
                return Err(OrganizeError::DestinationCollision { destination });
            }
            return Ok(destination);
        }

        fs::create_dir_all(&dir).await.map_err(failure)?;

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&destination)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(OrganizeError::DestinationCollision { destination });
            }
            Err(e) => return Err(failure(e)),
        };
        file.write_all(original).await.map_err(failure)?;
        file.flush().await.map_err(failure)?;

        debug!(backup = %destination.display(), "Backed up original");
        Ok(destination)
    }

    async fn relocate(&self, path: &Path, bucket: Bucket) -> Result<Disposition, OrganizeError> {
        let Some(dir) = self.bucket_dir(bucket) else {
            return Ok(Disposition::Rewritten { backup: None });
        };
        let destination = dir.join(file_name(path)?);
        let failure = |source| OrganizeError::Relocation {
            file: path.to_path_buf(),
            destination: destination.clone(),
            source,
        };

        if exists(&destination).await.map_err(failure)? {
            return Err(OrganizeError::DestinationCollision { destination });
        }

        if self.dry_run {
            debug!(file = %path.display(), destination = %destination.display(), "Dry run: would move");
            return Ok(Disposition::Relocated { destination });
        }

        fs::create_dir_all(&dir).await.map_err(failure)?;
        fs::rename(path, &destination).await.map_err(failure)?;
        debug!(file = %path.display(), destination = %destination.display(), "Moved file");

        Ok(Disposition::Relocated { destination })
    }
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr, OrganizeError> {
    path.file_name().ok_or_else(|| OrganizeError::Relocation {
        file: path.to_path_buf(),
        destination: PathBuf::new(),
        source: std::io::Error::new(ErrorKind::InvalidInput, "path has no file name"),
    })
}

/// Swap in new contents through a sibling temp file, so the original is either
/// untouched or fully replaced. Permissions of the original carry over; a
/// symlink is written through to its target.
async fn replace_contents(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let path = path.to_path_buf();
    let content = content.to_vec();

    tokio::task::spawn_blocking(move || {
        let target = std::fs::canonicalize(&path)?;
        let dir = target.parent().unwrap_or(Path::new("/"));
        let permissions = std::fs::metadata(&target)?.permissions();

        let mut temp = tempfile::Builder::new()
            .prefix(".subst-xml-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        temp.write_all(&content)?;
        temp.as_file().sync_all()?;
        temp.as_file().set_permissions(permissions)?;
        temp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)?
}

/// Existence check that also sees dangling symlinks
async fn exists(path: &Path) -> std::io::Result<bool> {
    match fs::symlink_metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
