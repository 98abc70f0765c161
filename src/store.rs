// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Kubeconfig store management and manipulation.
//!
//! Kubecfg groups kubeconfig documents together into one place called the
//! __kubeconfig store__. The store is a directory, `$HOME/.kube` by default,
//! plus any number of glob patterns that match documents elsewhere. The
//! store also owns the selection pointer, the symlink kubectl reads as its
//! kubeconfig.
//!
//! # Store Layout
//!
//! The store directory is walked recursively, so documents can be grouped
//! into subdirectories. Each document is known by its file name. The
//! selection pointer lives at `$HOME/.kube/config` by default, right where
//! kubectl expects its kubeconfig to be.
//!
//! # Editing Documents
//!
//! Cleanup operations load a document, mutate it in memory, and write it
//! back in one piece. If any step fails, nothing is written. A document that
//! did not change is not written either.

use crate::{
    chooser::Chooser,
    cleanup::{self, PruneReport},
    config::{ConfigError, Settings},
    document::{Context, Document, DocumentError, EMPTY_DOCUMENT},
    path::DEFAULT_POINTER_NAME,
    pointer::{Pointer, PointerError, PointerState, Resolution},
    registry::{identity, Candidate, Location, Registry, RegistryError},
};

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Component, Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// How far context removal reaches.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Remove the context with its cluster and user, even if shared.
    #[default]
    Cascade,

    /// Remove the context, and its cluster and user only if unshared.
    Exclusive,
}

/// Store of kubeconfig documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    dir: PathBuf,
    pointer: Pointer,
    locations: Vec<Location>,
}

impl Store {
    /// Construct new store over a directory.
    ///
    /// The selection pointer is placed at its default name inside the
    /// directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            pointer: Pointer::new(dir.join(DEFAULT_POINTER_NAME)),
            locations: vec![Location::dir(&dir)],
            dir,
        }
    }

    /// Construct new store from settings.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Config`] if store directory cannot be
    ///   determined.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let dir = settings.kube_dir()?;
        let mut locations = vec![Location::Dir {
            path: dir.clone(),
            max_depth: settings.store.max_depth,
        }];
        locations.extend(settings.store.globs.iter().map(Location::glob));

        Ok(Self {
            pointer: Pointer::new(settings.pointer_path()?),
            locations,
            dir,
        })
    }

    /// Use custom selection pointer path.
    pub fn with_pointer(mut self, path: impl Into<PathBuf>) -> Self {
        self.pointer = Pointer::new(path);
        self
    }

    /// Add glob pattern location.
    pub fn with_glob(mut self, pattern: impl Into<String>) -> Self {
        self.locations.push(Location::glob(pattern));
        self
    }

    /// Store directory.
    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    /// Selection pointer.
    pub fn pointer(&self) -> &Pointer {
        &self.pointer
    }

    /// Discover all candidate documents.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Registry`] if a location cannot be scanned.
    pub fn scan(&self) -> Result<Registry> {
        Ok(Registry::scan(&self.locations, self.pointer.path())?)
    }

    /// Current state of selection pointer.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Pointer`] if pointer cannot be inspected.
    pub fn pointer_state(&self) -> Result<PointerState> {
        Ok(self.pointer.state()?)
    }

    /// Select active document.
    ///
    /// If no name is given, the user picks one through the chooser, with the
    /// currently selected document highlighted. Returns the name of the
    /// selected document.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NothingSelected`] if the user picked nothing.
    /// - Return [`StoreError::Pointer`] if the document does not exist, or
    ///   the pointer cannot be switched.
    /// - Return [`StoreError::Registry`] if a location cannot be scanned.
    /// - Return [`StoreError::Chooser`] if the chooser fails.
    #[instrument(skip(self, chooser), level = "debug")]
    pub fn switch(&self, name: Option<&str>, chooser: &dyn Chooser) -> Result<String> {
        let registry = self.scan()?;
        let name = match name {
            Some(name) => name.to_owned(),
            None => {
                // INVARIANT: Never highlight a name the selected file does not own.
                let highlighted = registry
                    .selected()
                    .filter(|selected| !registry.is_shadowed(selected))
                    .map(Candidate::name);
                chooser
                    .choose(&registry.names(), highlighted)?
                    .ok_or(StoreError::NothingSelected)?
            }
        };

        let candidate = self.pointer.switch(&registry, &name)?;
        Ok(candidate.name().to_owned())
    }

    /// Find candidate by name, or the selected one if no name is given.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::DocumentNotFound`] if no candidate has given
    ///   name.
    /// - Return [`StoreError::NoActiveDocument`] if no name is given and
    ///   nothing is selected.
    /// - Return [`StoreError::Registry`] if a location cannot be scanned.
    pub fn candidate(&self, name: Option<&str>) -> Result<Candidate> {
        let registry = self.scan()?;
        let candidate = match name {
            Some(name) => registry
                .lookup(name)
                .ok_or_else(|| StoreError::DocumentNotFound(name.into()))?,
            None => registry
                .selected()
                .ok_or_else(|| StoreError::NoActiveDocument(self.pointer.path().into()))?,
        };

        Ok(candidate.clone())
    }

    /// Resolve a regular file occupying the selection pointer path.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Pointer`] if resolution fails.
    pub fn resolve_conflict(&self, resolution: Resolution) -> Result<PointerState> {
        Ok(self.pointer.resolve_conflict(resolution)?)
    }

    /// Create new empty document in store directory, and register it.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::InvalidName`] if name is empty or points
    ///   outside the store directory.
    /// - Return [`StoreError::PointerPath`] if name is the selection pointer.
    /// - Return [`StoreError::AlreadyExists`] if a file already exists at
    ///   the target path.
    /// - Return [`StoreError::Io`] if the file cannot be created.
    #[instrument(skip(self, registry), level = "debug")]
    pub fn new_document(&self, registry: &mut Registry, name: &str) -> Result<Candidate> {
        // INVARIANT: New documents stay inside the store directory.
        let escapes = Path::new(name).components().any(|component| {
            matches!(
                component,
                Component::RootDir | Component::Prefix(_) | Component::ParentDir
            )
        });
        if name.trim().is_empty() || escapes {
            return Err(StoreError::InvalidName(name.into()));
        }

        let path = self.dir.join(name);
        let pointer = self.pointer.path();
        if path == pointer || identity(&path).is_some_and(|id| Some(id) == identity(pointer)) {
            return Err(StoreError::PointerPath(path));
        }

        if fs::symlink_metadata(&path).is_ok() {
            return Err(StoreError::AlreadyExists(path));
        }

        if let Some(parent) = path.parent() {
            mkdirp::mkdirp(parent).map_err(|err| StoreError::Io {
                source: err,
                action: "create directory",
                path: parent.into(),
            })?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| match err.kind() {
                ErrorKind::AlreadyExists => StoreError::AlreadyExists(path.clone()),
                _ => StoreError::Io {
                    source: err,
                    action: "create",
                    path: path.clone(),
                },
            })?;
        file.write_all(EMPTY_DOCUMENT.as_bytes())
            .map_err(|err| StoreError::Io {
                source: err,
                action: "write",
                path: path.clone(),
            })?;
        info!("created empty kubeconfig {:?}", path.display());

        let candidate = Candidate::from_file(&path)?;
        registry.insert(candidate.clone());

        Ok(candidate)
    }

    /// Path of the active document.
    ///
    /// This is the selection pointer itself. Writes go through the pointer to
    /// the document it targets. A regular file at the pointer path is a valid
    /// active document too.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NoActiveDocument`] if the pointer is absent.
    pub fn active_document(&self) -> Result<PathBuf> {
        match self.pointer.state()? {
            PointerState::Absent => Err(StoreError::NoActiveDocument(self.pointer.path().into())),
            PointerState::Linked(_) | PointerState::Conflict => Ok(self.pointer.path().into()),
        }
    }

    /// Load document, edit it, and write it back if it changed.
    ///
    /// Nothing is written if the editor fails.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Document`] if document cannot be loaded or
    ///   written.
    /// - Return any error the editor returns.
    pub fn edit_document<T, E>(&self, path: impl AsRef<Path>, editor: E) -> Result<T>
    where
        E: FnOnce(&mut Document) -> Result<T>,
    {
        let path = path.as_ref();
        let mut document = Document::load(path)?;
        let original = document.clone();

        let output = editor(&mut document)?;

        if document != original {
            document.write(path)?;
        } else {
            debug!("document {:?} unchanged, skip write", path.display());
        }

        Ok(output)
    }

    /// Remove context from document.
    ///
    /// Operates on the active document unless a target path is given. If no
    /// context name is given, the user picks one through the chooser, with
    /// the current context highlighted. Returns the removed context.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NothingSelected`] if the user picked nothing.
    /// - Return [`StoreError::ContextNotFound`] if the document has no such
    ///   context.
    /// - Return [`StoreError::NoActiveDocument`] if there is no active
    ///   document to operate on.
    /// - Return [`StoreError::Document`] if document cannot be loaded or
    ///   written.
    #[instrument(skip(self, chooser), level = "debug")]
    pub fn delete_context(
        &self,
        target: Option<&Path>,
        name: Option<&str>,
        removal: Removal,
        chooser: &dyn Chooser,
    ) -> Result<(String, Context)> {
        let path = self.target_document(target)?;
        self.edit_document(&path, |document| {
            let name = match name {
                Some(name) => name.to_owned(),
                None => {
                    let highlighted = Some(document.current_context.as_str())
                        .filter(|current| !current.is_empty());
                    chooser
                        .choose(&document.context_names(), highlighted)?
                        .ok_or(StoreError::NothingSelected)?
                }
            };

            let removed = match removal {
                Removal::Cascade => cleanup::remove_context(document, &name),
                Removal::Exclusive => cleanup::remove_context_exclusive(document, &name),
            };

            match removed {
                Some(context) => {
                    info!("deleted context {name}");
                    Ok((name, context))
                }
                None => Err(StoreError::ContextNotFound(name)),
            }
        })
    }

    /// Remove orphaned clusters and users from document.
    ///
    /// Operates on the active document unless a target path is given.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NoActiveDocument`] if there is no active
    ///   document to operate on.
    /// - Return [`StoreError::Document`] if document cannot be loaded or
    ///   written.
    #[instrument(skip(self), level = "debug")]
    pub fn prune(&self, target: Option<&Path>) -> Result<PruneReport> {
        let path = self.target_document(target)?;
        let report = self.edit_document(&path, |document| Ok(cleanup::prune(document)))?;
        info!("removed {} orphaned clusters", report.clusters.len());
        info!("removed {} orphaned users", report.users.len());

        Ok(report)
    }

    fn target_document(&self, target: Option<&Path>) -> Result<PathBuf> {
        match target {
            Some(path) => Ok(path.into()),
            None => self.active_document(),
        }
    }
}

/// Load settings file.
///
/// A missing settings file yields default settings.
///
/// # Errors
///
/// - Return [`StoreError::Io`] if settings file exists but cannot be read.
/// - Return [`StoreError::Config`] if settings file is malformed.
pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(data) => Ok(data.parse()?),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("no settings at {:?}, using defaults", path.display());
            Ok(Settings::default())
        }
        Err(err) => Err(StoreError::Io {
            source: err,
            action: "read settings",
            path: path.into(),
        }),
    }
}

/// All possible error types for kubeconfig store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Settings are malformed or incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Document discovery fails.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Selection pointer manipulation fails.
    #[error(transparent)]
    Pointer(#[from] PointerError),

    /// Document cannot be loaded or written.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Chooser cannot ask the user.
    #[error(transparent)]
    Chooser(#[from] crate::chooser::ChooserError),

    /// User picked nothing.
    #[error("nothing selected")]
    NothingSelected,

    /// No candidate document has given name.
    #[error("no kubeconfig named {0:?}")]
    DocumentNotFound(String),

    /// Document has no context with given name.
    #[error("no context named {0:?}")]
    ContextNotFound(String),

    /// File already exists at target path.
    #[error("file {0:?} already exists")]
    AlreadyExists(PathBuf),

    /// Document name is unusable.
    #[error("invalid document name {0:?}")]
    InvalidName(String),

    /// Path is reserved for the selection pointer.
    #[error("{0:?} is the selection pointer path")]
    PointerPath(PathBuf),

    /// Selection pointer does not target anything.
    #[error("no active kubeconfig, {0:?} does not exist")]
    NoActiveDocument(PathBuf),

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
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_store_uses_default_pointer() {
        let store = Store::new("/home/blah/.kube");
        assert_eq!(store.dir(), Path::new("/home/blah/.kube"));
        assert_eq!(store.pointer().path(), Path::new("/home/blah/.kube/config"));
    }

    #[test]
    fn store_from_settings() -> anyhow::Result<()> {
        let settings: Settings = r#"
            [store]
            dir = "/srv/kube"
            pointer = "active"
            globs = ["/srv/other/*.yaml"]
            max_depth = 1
        "#
        .parse()?;

        let store = Store::from_settings(&settings)?;

        assert_eq!(store.dir(), Path::new("/srv/kube"));
        assert_eq!(store.pointer().path(), Path::new("/srv/kube/active"));
        assert_eq!(
            store.locations,
            vec![
                Location::Dir {
                    path: "/srv/kube".into(),
                    max_depth: Some(1),
                },
                Location::glob("/srv/other/*.yaml"),
            ]
        );

        Ok(())
    }

    #[test]
    fn load_missing_settings_uses_defaults() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(load_settings(dir.path().join("settings.toml"))?, Settings::default());

        Ok(())
    }

    #[test]
    fn load_malformed_settings_fails() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[store\n")?;

        assert!(matches!(load_settings(&path), Err(StoreError::Config(_))));

        Ok(())
    }

    #[test]
    fn new_document_refuses_existing_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("taken.yaml"), "keep me")?;
        let store = Store::new(dir.path());
        let mut registry = store.scan()?;

        let result = store.new_document(&mut registry, "taken.yaml");

        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
        assert_eq!(fs::read_to_string(dir.path().join("taken.yaml"))?, "keep me");
        assert!(matches!(
            store.new_document(&mut registry, " "),
            Err(StoreError::InvalidName(_))
        ));

        Ok(())
    }

    #[test]
    fn new_document_creates_nested_directories() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::new(dir.path());
        let mut registry = store.scan()?;

        let candidate = store.new_document(&mut registry, "teams/infra.yaml")?;

        assert_eq!(candidate.name(), "infra.yaml");
        assert_eq!(candidate.summary(), "0 contexts");
        assert!(registry.lookup("infra.yaml").is_some());
        assert_eq!(
            fs::read_to_string(dir.path().join("teams").join("infra.yaml"))?,
            EMPTY_DOCUMENT
        );

        Ok(())
    }

    #[test]
    fn new_document_refuses_pointer_path() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::new(dir.path());
        let mut registry = store.scan()?;

        let result = store.new_document(&mut registry, "config");
        assert!(matches!(result, Err(StoreError::PointerPath(_))));
        let result = store.new_document(&mut registry, "./config");
        assert!(matches!(result, Err(StoreError::PointerPath(_))));

        assert_eq!(store.pointer_state()?, PointerState::Absent);
        assert!(registry.is_empty());

        Ok(())
    }

    #[test]
    fn new_document_stays_inside_store() -> anyhow::Result<()> {
        let outside = tempfile::tempdir()?;
        let dir = tempfile::tempdir()?;
        let store = Store::new(dir.path().join("kube"));
        let mut registry = Registry::new();

        let absolute = outside.path().join("escaped.yaml");
        let result = store.new_document(&mut registry, &absolute.to_string_lossy());
        assert!(matches!(result, Err(StoreError::InvalidName(_))));
        assert!(!absolute.exists());

        let result = store.new_document(&mut registry, "../dotdot.yaml");
        assert!(matches!(result, Err(StoreError::InvalidName(_))));
        let result = store.new_document(&mut registry, "teams/../../dotdot.yaml");
        assert!(matches!(result, Err(StoreError::InvalidName(_))));
        assert!(!dir.path().join("dotdot.yaml").exists());

        Ok(())
    }

    #[test]
    fn candidate_by_name_or_selection() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a.yaml"), EMPTY_DOCUMENT)?;
        let store = Store::new(dir.path());

        assert_eq!(store.candidate(Some("a.yaml"))?.name(), "a.yaml");
        assert!(matches!(
            store.candidate(Some("b.yaml")),
            Err(StoreError::DocumentNotFound(name)) if name == "b.yaml"
        ));
        assert!(matches!(
            store.candidate(None),
            Err(StoreError::NoActiveDocument(_))
        ));

        Ok(())
    }

    #[test]
    fn operations_without_active_document_fail() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::new(dir.path());

        assert!(matches!(store.prune(None), Err(StoreError::NoActiveDocument(_))));

        Ok(())
    }
}
