// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Selection pointer management.
//!
//! Kubectl reads exactly one kubeconfig file by default. Kubecfg makes that
//! file a symlink, the __selection pointer__, and switches the active
//! document by re-pointing the symlink at another candidate.
//!
//! # Pointer States
//!
//! - __Absent__: nothing exists at the pointer path, or a symlink whose target
//!   is gone.
//! - __Linked__: the pointer is a symlink to an existing file.
//! - __Conflict__: a regular file occupies the pointer path. This is usually a
//!   kubeconfig the user had before kubecfg came along, so it is never
//!   replaced without the user deciding what to do with it first.
//!
//! # Switching
//!
//! A switch creates the new symlink at a temporary sibling path, and renames
//! it over the pointer path. Rename is a single filesystem operation, so the
//! pointer is never observed as missing in between. Concurrent switches on
//! the same pointer are not coordinated.

use crate::registry::{Candidate, Registry};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Suffix appended to the pointer file name when backing up a conflicting file.
pub const BACKUP_SUFFIX: &str = "_kubecfg-backup";

/// State of the selection pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerState {
    /// Nothing usable exists at the pointer path.
    Absent,

    /// Pointer is a symlink to given resolved target.
    Linked(PathBuf),

    /// A regular file occupies the pointer path.
    Conflict,
}

/// How to deal with a regular file occupying the pointer path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Move the file aside, and link the pointer to the moved copy.
    Backup,

    /// Delete the file.
    Delete,

    /// Leave the file alone.
    Ignore,
}

impl Resolution {
    /// All resolutions in the order they are offered to the user.
    pub const ALL: [Resolution; 3] = [Self::Backup, Self::Delete, Self::Ignore];
}

impl Display for Resolution {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Backup => "Make a backup and create a symlink to it",
            Self::Delete => "Delete it. I want a fresh start",
            Self::Ignore => "Do nothing",
        })
    }
}

/// Selection pointer at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    path: PathBuf,
}

impl Pointer {
    /// Construct new selection pointer.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of selection pointer.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Path a conflicting file is backed up to.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(BACKUP_SUFFIX);
        self.path.with_file_name(name)
    }

    /// Determine current state of selection pointer.
    ///
    /// # Errors
    ///
    /// - Return [`PointerError::Io`] if pointer cannot be inspected.
    pub fn state(&self) -> Result<PointerState> {
        check_pointer(&self.path)
    }

    /// Point selection pointer at named candidate.
    ///
    /// Returns the candidate that is now selected.
    ///
    /// # Errors
    ///
    /// - Return [`PointerError::NotFound`] if no candidate has given name.
    /// - Return [`PointerError::Conflict`] if a regular file occupies the
    ///   pointer path.
    /// - Return [`PointerError::Io`] if symlink operations fail.
    #[instrument(skip(self, registry), level = "debug")]
    pub fn switch<'r>(&self, registry: &'r Registry, name: &str) -> Result<&'r Candidate> {
        let candidate = registry
            .lookup(name)
            .ok_or_else(|| PointerError::NotFound(name.into()))?;

        if self.state()? == PointerState::Conflict {
            return Err(PointerError::Conflict(self.path.clone()));
        }

        replace_with_symlink(candidate.real_path(), &self.path)?;
        info!("switched kubeconfig to {}", candidate.name());

        Ok(candidate)
    }

    /// Resolve a regular file occupying the pointer path.
    ///
    /// Does nothing unless the pointer is in conflict.
    ///
    /// Returns the resulting pointer state.
    ///
    /// # Errors
    ///
    /// - Return [`PointerError::AlreadyExists`] if backup path is taken.
    /// - Return [`PointerError::Io`] if file operations fail.
    #[instrument(skip(self), level = "debug")]
    pub fn resolve_conflict(&self, resolution: Resolution) -> Result<PointerState> {
        let state = self.state()?;
        if state != PointerState::Conflict {
            debug!("pointer is not in conflict: {state:?}");
            return Ok(state);
        }

        match resolution {
            Resolution::Backup => {
                let backup = self.backup_path();
                if fs::symlink_metadata(&backup).is_ok() {
                    return Err(PointerError::AlreadyExists(backup));
                }

                fs::copy(&self.path, &backup).map_err(|err| PointerError::Io {
                    source: err,
                    action: "back up",
                    path: self.path.clone(),
                })?;
                replace_with_symlink(&backup, &self.path)?;
                info!("backed up {:?} to {:?}", self.path.display(), backup.display());
            }
            Resolution::Delete => {
                fs::remove_file(&self.path).map_err(|err| PointerError::Io {
                    source: err,
                    action: "remove",
                    path: self.path.clone(),
                })?;
                info!("removed {:?}", self.path.display());
            }
            Resolution::Ignore => debug!("leave {:?} alone", self.path.display()),
        }

        self.state()
    }
}

/// Determine state of selection pointer at given path.
///
/// # Errors
///
/// - Return [`PointerError::Io`] if path cannot be resolved for any reason
///   other than it not existing.
pub fn check_pointer(path: impl AsRef<Path>) -> Result<PointerState> {
    let path = path.as_ref();
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(PointerState::Absent),
        Err(err) => {
            return Err(PointerError::Io {
                source: err,
                action: "inspect",
                path: path.into(),
            })
        }
    };

    if !metadata.file_type().is_symlink() {
        return Ok(PointerState::Conflict);
    }

    match fs::canonicalize(path) {
        Ok(target) => Ok(PointerState::Linked(target)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(PointerState::Absent),
        Err(err) => Err(PointerError::Io {
            source: err,
            action: "resolve",
            path: path.into(),
        }),
    }
}

fn replace_with_symlink(target: &Path, link: &Path) -> Result<()> {
    let file_name = link
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".into());
    let tmp = link.with_file_name(format!(".{file_name}.kubecfg-{}", std::process::id()));

    // INVARIANT: Clear leftover from an interrupted switch.
    match fs::remove_file(&tmp) {
        Err(err) if err.kind() != ErrorKind::NotFound => {
            return Err(PointerError::Io {
                source: err,
                action: "remove",
                path: tmp,
            })
        }
        _ => {}
    }

    symlink(target, &tmp).map_err(|err| PointerError::Io {
        source: err,
        action: "create symlink",
        path: tmp.clone(),
    })?;

    if let Err(err) = fs::rename(&tmp, link) {
        let _ = fs::remove_file(&tmp);
        return Err(PointerError::Io {
            source: err,
            action: "replace",
            path: link.into(),
        });
    }

    debug!("{:?} now points to {:?}", link.display(), target.display());
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Selection pointer error types.
#[derive(Debug, thiserror::Error)]
pub enum PointerError {
    /// No candidate with given name.
    #[error("no kubeconfig named {0:?}")]
    NotFound(String),

    /// Regular file occupies pointer path.
    #[error("regular file {0:?} exists, resolve it before switching")]
    Conflict(PathBuf),

    /// Backup destination already exists.
    #[error("file {0:?} already exists")]
    AlreadyExists(PathBuf),

    /// Filesystem operation fails.
    #[error("failed to {action} {path:?}")]
    Io {
        #[source]
        source: std::io::Error,
        action: &'static str,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = PointerError> = std::result::Result<T, E>;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{document::EMPTY_DOCUMENT, registry::Location};
    use pretty_assertions::assert_eq;
    use std::os::unix::fs::symlink;

    fn fixture() -> anyhow::Result<(tempfile::TempDir, Registry, Pointer)> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a.yaml"), EMPTY_DOCUMENT)?;
        fs::write(dir.path().join("b.yaml"), EMPTY_DOCUMENT)?;
        let pointer = Pointer::new(dir.path().join("config"));
        let registry = Registry::scan(&[Location::dir(dir.path())], pointer.path())?;

        Ok((dir, registry, pointer))
    }

    #[test]
    fn check_pointer_states() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("a.yaml");
        fs::write(&target, EMPTY_DOCUMENT)?;

        assert_eq!(check_pointer(dir.path().join("absent"))?, PointerState::Absent);

        symlink(&target, dir.path().join("linked"))?;
        assert_eq!(
            check_pointer(dir.path().join("linked"))?,
            PointerState::Linked(fs::canonicalize(&target)?)
        );

        symlink(dir.path().join("gone.yaml"), dir.path().join("dangling"))?;
        assert_eq!(check_pointer(dir.path().join("dangling"))?, PointerState::Absent);

        assert_eq!(check_pointer(&target)?, PointerState::Conflict);

        Ok(())
    }

    #[test]
    fn switch_links_pointer() -> anyhow::Result<()> {
        let (_dir, registry, pointer) = fixture()?;

        let selected = pointer.switch(&registry, "a.yaml")?;
        assert_eq!(selected.name(), "a.yaml");
        assert_eq!(
            pointer.state()?,
            PointerState::Linked(registry.lookup("a.yaml").expect("a").real_path().into())
        );

        pointer.switch(&registry, "b.yaml")?;
        assert_eq!(
            pointer.state()?,
            PointerState::Linked(registry.lookup("b.yaml").expect("b").real_path().into())
        );

        Ok(())
    }

    #[test]
    fn switch_replaces_dangling_symlink() -> anyhow::Result<()> {
        let (dir, registry, pointer) = fixture()?;
        symlink(dir.path().join("gone.yaml"), pointer.path())?;

        pointer.switch(&registry, "a.yaml")?;
        assert!(matches!(pointer.state()?, PointerState::Linked(_)));

        Ok(())
    }

    #[test]
    fn switch_to_unknown_name_keeps_state() -> anyhow::Result<()> {
        let (_dir, registry, pointer) = fixture()?;
        pointer.switch(&registry, "a.yaml")?;
        let before = pointer.state()?;

        let result = pointer.switch(&registry, "nope.yaml");

        assert!(matches!(result, Err(PointerError::NotFound(name)) if name == "nope.yaml"));
        assert_eq!(pointer.state()?, before);

        Ok(())
    }

    #[test]
    fn switch_refuses_conflict() -> anyhow::Result<()> {
        let (_dir, registry, pointer) = fixture()?;
        fs::write(pointer.path(), "precious")?;

        let result = pointer.switch(&registry, "a.yaml");

        assert!(matches!(result, Err(PointerError::Conflict(_))));
        assert_eq!(fs::read_to_string(pointer.path())?, "precious");

        Ok(())
    }

    #[test]
    fn resolve_conflict_with_backup() -> anyhow::Result<()> {
        let (_dir, _registry, pointer) = fixture()?;
        fs::write(pointer.path(), EMPTY_DOCUMENT)?;

        let state = pointer.resolve_conflict(Resolution::Backup)?;

        let backup = pointer.backup_path();
        assert_eq!(backup.file_name().and_then(|name| name.to_str()), Some("config_kubecfg-backup"));
        assert_eq!(state, PointerState::Linked(fs::canonicalize(&backup)?));
        assert_eq!(fs::read_to_string(&backup)?, EMPTY_DOCUMENT);

        Ok(())
    }

    #[test]
    fn resolve_conflict_refuses_existing_backup() -> anyhow::Result<()> {
        let (_dir, _registry, pointer) = fixture()?;
        fs::write(pointer.path(), "precious")?;
        fs::write(pointer.backup_path(), "older backup")?;

        let result = pointer.resolve_conflict(Resolution::Backup);

        assert!(matches!(result, Err(PointerError::AlreadyExists(_))));
        assert_eq!(fs::read_to_string(pointer.path())?, "precious");
        assert_eq!(fs::read_to_string(pointer.backup_path())?, "older backup");

        Ok(())
    }

    #[test]
    fn resolve_conflict_with_delete_and_ignore() -> anyhow::Result<()> {
        let (_dir, _registry, pointer) = fixture()?;
        fs::write(pointer.path(), "precious")?;

        assert_eq!(pointer.resolve_conflict(Resolution::Ignore)?, PointerState::Conflict);
        assert_eq!(pointer.resolve_conflict(Resolution::Delete)?, PointerState::Absent);

        Ok(())
    }
}
