// ── Artifact staging ──
//
// Lifecycle of one rendered file:
//   ArtifactDraft      in memory, compared with what is on disk
//   StagedArtifact     written to a temp file next to the target, validated
//   PublishedArtifact  renamed over the target, remembers what it replaced
//
// Nothing touches the target path until `publish`, and an unchanged draft
// never leaves memory. A republished file keeps the mode of the file it
// replaces unless the artifact pins one; new files get `DEFAULT_MODE`.

use std::fs::Permissions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::store::write_atomic;

/// Permission bits of a newly created artifact.
pub const DEFAULT_MODE: u32 = 0o644;

/// Contents and permission bits of a file as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OnDisk {
    contents: String,
    mode: u32,
}

/// Desired contents for a file, alongside what the file holds today.
#[derive(Debug, Clone)]
pub struct ArtifactDraft {
    path: PathBuf,
    contents: String,
    mode: Option<u32>,
    previous: Option<OnDisk>,
}

impl ArtifactDraft {
    pub fn prepare(path: impl Into<PathBuf>, contents: String) -> Result<Self, CoreError> {
        let path = path.into();
        let previous = match std::fs::read_to_string(&path) {
            Ok(text) => {
                let meta = std::fs::metadata(&path).map_err(|e| CoreError::io(&path, e))?;
                Some(OnDisk {
                    contents: text,
                    mode: meta.permissions().mode() & 0o7777,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(CoreError::io(path, e)),
        };
        Ok(Self {
            path,
            contents,
            mode: None,
            previous,
        })
    }

    /// Pin the permission bits regardless of the file being replaced.
    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Permission bits the published file will carry.
    pub fn mode(&self) -> u32 {
        self.mode
            .or_else(|| self.previous.as_ref().map(|p| p.mode))
            .unwrap_or(DEFAULT_MODE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn previous(&self) -> Option<&str> {
        self.previous.as_ref().map(|p| p.contents.as_str())
    }

    /// Line-by-line comparison against the current file. A pinned mode
    /// that differs from the file's is a change too.
    pub fn is_changed(&self) -> bool {
        match &self.previous {
            None => true,
            Some(prev) => {
                !prev.contents.lines().eq(self.contents.lines())
                    || self.mode.is_some_and(|mode| mode != prev.mode)
            }
        }
    }

    /// Write the draft to a temp file in the target's directory.
    pub fn stage(self) -> Result<StagedArtifact, CoreError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| CoreError::io(&dir, e))?;

        let mode = self.mode();
        let mut draft = NamedTempFile::new_in(&dir).map_err(|e| CoreError::io(&dir, e))?;
        draft
            .write_all(self.contents.as_bytes())
            .and_then(|()| draft.as_file().set_permissions(Permissions::from_mode(mode)))
            .and_then(|()| draft.as_file().sync_all())
            .map_err(|e| CoreError::io(draft.path(), e))?;

        debug!(target = %self.path.display(), staged = %draft.path().display(), "artifact staged");
        Ok(StagedArtifact {
            path: self.path,
            draft,
            previous: self.previous,
        })
    }
}

/// A draft on disk that has not replaced its target yet.
///
/// Dropping it removes the temp file.
#[derive(Debug)]
pub struct StagedArtifact {
    path: PathBuf,
    draft: NamedTempFile,
    previous: Option<OnDisk>,
}

impl StagedArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the staged copy, for validators.
    pub fn staged_path(&self) -> &Path {
        self.draft.path()
    }

    /// Atomically replace the target with the staged contents.
    pub fn publish(self) -> Result<PublishedArtifact, CoreError> {
        let Self {
            path,
            draft,
            previous,
        } = self;
        draft
            .persist(&path)
            .map_err(|e| CoreError::io(&path, e.error))?;
        debug!(path = %path.display(), "artifact published");
        Ok(PublishedArtifact { path, previous })
    }
}

/// A published artifact that can still be put back.
#[derive(Debug)]
pub struct PublishedArtifact {
    path: PathBuf,
    previous: Option<OnDisk>,
}

impl PublishedArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restore the contents this artifact replaced, or remove it if it was new.
    pub fn rollback(self) -> Result<(), CoreError> {
        warn!(path = %self.path.display(), "rolling back artifact");
        match self.previous {
            Some(previous) => {
                write_atomic(&self.path, previous.contents.as_bytes())?;
                std::fs::set_permissions(&self.path, Permissions::from_mode(previous.mode))
                    .map_err(|e| CoreError::io(&self.path, e))
            }
            None => match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(CoreError::io(&self.path, e)),
            },
        }
    }
}
