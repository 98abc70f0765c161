// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Candidate document discovery.
//!
//! Kubecfg discovers kubeconfig documents by walking a directory, and by
//! expanding glob patterns. Every regular file that parses as a document
//! becomes a __candidate__ for selection. Files that fail to parse are
//! skipped without complaint, which lets unrelated files live next to
//! kubeconfigs.
//!
//! # Naming
//!
//! Candidates are presented to the user by their base file name. Two files
//! in different locations can share a base name, so the registry keys every
//! candidate by its resolved path, and treats the display name as a
//! projection. When two candidates share a name, the one discovered later
//! takes the name, and the collision is recorded so it can be reported.
//!
//! # Selection
//!
//! The selection pointer is a symlink to one candidate. Each scan resolves
//! the pointer, and marks the candidate whose resolved path matches as
//! selected. The pointer itself is never a candidate.

use crate::document::{Document, DocumentError};

use chrono_humanize::HumanTime;
use ignore::WalkBuilder;
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::{debug, instrument, warn};

/// Place to look for candidate documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Directory walked recursively, optionally up to a maximum depth.
    Dir {
        path: PathBuf,
        max_depth: Option<usize>,
    },

    /// Glob pattern expanded to file paths.
    Glob(String),
}

impl Location {
    /// Directory location without depth limit.
    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self::Dir {
            path: path.into(),
            max_depth: None,
        }
    }

    /// Glob pattern location.
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self::Glob(pattern.into())
    }

    fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = match self {
            Self::Dir { path, max_depth } => walk_dir(path, *max_depth)?,
            Self::Glob(pattern) => expand_glob(pattern)?,
        };

        // INVARIANT: Discovery order is stable across scans.
        files.sort();

        Ok(files)
    }
}

/// Discovered kubeconfig document.
#[derive(Debug, Clone)]
pub struct Candidate {
    path: PathBuf,
    real_path: PathBuf,
    name: String,
    size: u64,
    modified: Option<SystemTime>,
    is_selected: bool,
    document: Document,
}

impl Candidate {
    /// Construct candidate from a document file.
    ///
    /// # Errors
    ///
    /// - Return [`RegistryError::Io`] if file metadata cannot be read.
    /// - Return [`RegistryError::Document`] if file is not a valid document.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = fs::metadata(&path).map_err(|err| RegistryError::Io {
            source: err,
            path: path.clone(),
        })?;
        let real_path = fs::canonicalize(&path).map_err(|err| RegistryError::Io {
            source: err,
            path: path.clone(),
        })?;
        let document = Document::load(&path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Ok(Self {
            path,
            real_path,
            name,
            size: metadata.len(),
            modified: metadata.modified().ok(),
            is_selected: false,
            document,
        })
    }

    /// Path the candidate was discovered at.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Resolved path of candidate.
    pub fn real_path(&self) -> &Path {
        self.real_path.as_path()
    }

    /// Display name, i.e., the base file name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Last modification time, if the platform reports one.
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Short summary of document content.
    pub fn summary(&self) -> String {
        self.document.summary()
    }

    /// Check if selection pointer targets this candidate.
    pub fn is_selected(&self) -> bool {
        self.is_selected
    }

    /// Parsed document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Detailed description of candidate, with its age measured at `now`.
    pub fn details(&self, now: SystemTime) -> Details {
        let age = self.modified.and_then(|modified| {
            let elapsed = now.duration_since(modified).unwrap_or_default();
            chrono::Duration::from_std(elapsed)
                .ok()
                .map(|elapsed| HumanTime::from(-elapsed).to_string())
        });

        Details {
            name: self.name.clone(),
            path: self.path.clone(),
            current_context: self.document.current_context.clone(),
            contexts: self.document.contexts.len(),
            clusters: self.document.clusters.len(),
            users: self.document.users.len(),
            size: self.size,
            age,
        }
    }
}

/// Detailed description of a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Details {
    pub name: String,
    pub path: PathBuf,
    pub current_context: String,
    pub contexts: usize,
    pub clusters: usize,
    pub users: usize,
    pub size: u64,

    /// Time since last modification in words, e.g., "2 hours ago".
    pub age: Option<String>,
}

impl Display for Details {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let current_context = match self.current_context.as_str() {
            "" => "-",
            current => current,
        };

        writeln!(fmt, "name:            {}", self.name)?;
        writeln!(fmt, "path:            {}", self.path.display())?;
        writeln!(fmt, "current context: {current_context}")?;
        writeln!(fmt, "contexts:        {}", self.contexts)?;
        writeln!(fmt, "clusters:        {}", self.clusters)?;
        writeln!(fmt, "users:           {}", self.users)?;
        writeln!(fmt, "last modified:   {}", self.age.as_deref().unwrap_or("-"))?;
        write!(fmt, "size:            {}", byte_count_si(self.size))
    }
}

/// Format byte count with decimal (SI) units, e.g., "1.2 kB".
pub fn byte_count_si(bytes: u64) -> String {
    const UNIT: u64 = 1000;
    const PREFIXES: [char; 6] = ['k', 'M', 'G', 'T', 'P', 'E'];

    if bytes < UNIT {
        return format!("{bytes} B");
    }

    let (mut div, mut exp) = (UNIT, 0);
    let mut rest = bytes / UNIT;
    while rest >= UNIT {
        div *= UNIT;
        exp += 1;
        rest /= UNIT;
    }

    format!("{:.1} {}B", bytes as f64 / div as f64, PREFIXES[exp])
}

/// Two candidates share a display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCollision {
    /// Shared display name.
    pub name: String,

    /// Candidate that owns the display name.
    pub kept: PathBuf,

    /// Candidate that lost the display name.
    pub shadowed: PathBuf,
}

/// Set of candidates discovered in one scan.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    candidates: BTreeMap<PathBuf, Candidate>,
    names: BTreeMap<String, PathBuf>,
    collisions: Vec<NameCollision>,
    selected: Option<PathBuf>,
}

impl Registry {
    /// Construct new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover candidates across all locations.
    ///
    /// Files that cannot be read or parsed are skipped. The candidate whose
    /// resolved path matches the resolved target of the selection pointer is
    /// marked as selected.
    ///
    /// # Errors
    ///
    /// - Return [`RegistryError::Io`] if a directory location cannot be read.
    /// - Return [`RegistryError::Pattern`] if a glob pattern is malformed.
    #[instrument(skip(locations, pointer), level = "debug")]
    pub fn scan(locations: &[Location], pointer: impl AsRef<Path>) -> Result<Self> {
        let pointer = pointer.as_ref();
        let target = fs::canonicalize(pointer).ok();
        let pointer_identity = identity(pointer);
        debug!("selection pointer {:?} resolves to {target:?}", pointer.display());

        let mut registry = Self::new();
        for location in locations {
            for path in location.files()? {
                if pointer_identity.as_deref() == identity(&path).as_deref() {
                    debug!("skip selection pointer: {:?}", path.display());
                    continue;
                }

                let mut candidate = match Candidate::from_file(&path) {
                    Ok(candidate) => candidate,
                    Err(err) => {
                        debug!("skip {:?}: {err}", path.display());
                        continue;
                    }
                };

                if registry.candidates.contains_key(candidate.real_path()) {
                    debug!("skip already discovered: {:?}", path.display());
                    continue;
                }

                if target.as_deref() == Some(candidate.real_path()) {
                    candidate.is_selected = true;
                    registry.selected = Some(candidate.real_path.clone());
                }

                registry.insert(candidate);
            }
        }

        if let Some(selected) = registry.selected().filter(|c| registry.is_shadowed(c)) {
            warn!(
                "selected kubeconfig {:?} is shadowed by another file named {:?}",
                selected.path().display(),
                selected.name()
            );
        }

        debug!("discovered {} candidates", registry.len());
        Ok(registry)
    }

    /// Register candidate.
    ///
    /// The candidate takes over its display name. If another candidate held
    /// that name, the collision is recorded and returned.
    pub fn insert(&mut self, candidate: Candidate) -> Option<NameCollision> {
        let real_path = candidate.real_path.clone();
        let name = candidate.name.clone();
        self.candidates.insert(real_path.clone(), candidate);

        let previous = self.names.insert(name.clone(), real_path.clone())?;
        if previous == real_path {
            return None;
        }

        let collision = NameCollision {
            name,
            kept: real_path,
            shadowed: previous,
        };
        warn!(
            "{:?} shadows {:?} under name {:?}",
            collision.kept.display(),
            collision.shadowed.display(),
            collision.name
        );
        self.collisions.push(collision.clone());

        Some(collision)
    }

    /// Lookup candidate by display name.
    pub fn lookup(&self, name: impl AsRef<str>) -> Option<&Candidate> {
        self.names
            .get(name.as_ref())
            .and_then(|path| self.candidates.get(path))
    }

    /// Display names of all reachable candidates.
    pub fn names(&self) -> Vec<String> {
        self.names.keys().cloned().collect()
    }

    /// Candidates reachable by display name.
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.names
            .values()
            .filter_map(|path| self.candidates.get(path))
    }

    /// Every discovered candidate, shadowed ones included, ordered by name
    /// then path.
    pub fn all(&self) -> Vec<&Candidate> {
        let mut all = self.candidates.values().collect::<Vec<_>>();
        all.sort_by(|a, b| (&a.name, &a.path).cmp(&(&b.name, &b.path)));
        all
    }

    /// Check if another candidate owns the display name of given candidate.
    pub fn is_shadowed(&self, candidate: &Candidate) -> bool {
        self.names
            .get(&candidate.name)
            .is_some_and(|owner| owner != &candidate.real_path)
    }

    /// Currently selected candidate, if any.
    pub fn selected(&self) -> Option<&Candidate> {
        self.selected
            .as_ref()
            .and_then(|path| self.candidates.get(path))
    }

    /// Display names that more than one candidate competed for.
    pub fn collisions(&self) -> &[NameCollision] {
        self.collisions.as_slice()
    }

    /// Number of discovered candidates, shadowed ones included.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Check if no candidates were discovered.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

fn walk_dir(dir: &Path, max_depth: Option<usize>) -> Result<Vec<PathBuf>> {
    fs::metadata(dir).map_err(|err| RegistryError::Io {
        source: err,
        path: dir.into(),
    })?;

    let mut files = Vec::new();
    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .follow_links(false)
        .max_depth(max_depth)
        .build();

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_some_and(|kind| kind.is_file()) => {
                files.push(entry.into_path());
            }
            Ok(_) => {}
            Err(err) => warn!("skip unreadable entry: {err}"),
        }
    }

    Ok(files)
}

fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern).map_err(|err| RegistryError::Pattern {
        source: err,
        pattern: pattern.into(),
    })?;

    let mut files = Vec::new();
    for path in paths {
        match path {
            // INVARIANT: Only regular files, never symlinks or directories.
            Ok(path) => match fs::symlink_metadata(&path) {
                Ok(metadata) if metadata.file_type().is_file() => files.push(path),
                Ok(_) => debug!("skip non-regular file: {:?}", path.display()),
                Err(err) => warn!("skip unreadable entry {:?}: {err}", path.display()),
            },
            Err(err) => warn!("skip unreadable entry: {err}"),
        }
    }

    Ok(files)
}

/// Resolve parent directory, but keep the final component as is.
pub(crate) fn identity(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::canonicalize(parent).ok().map(|parent| parent.join(name))
}

/// Registry error types.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Location or file cannot be accessed.
    #[error("failed to access {path:?}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Glob pattern is malformed.
    #[error("invalid glob pattern {pattern:?}")]
    Pattern {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },

    /// File is not a valid document.
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Friendly result alias :3
type Result<T, E = RegistryError> = std::result::Result<T, E>;
