// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Kubeconfig document model.
//!
//! A __document__ is one kubeconfig file: a set of clusters, a set of users
//! (credentials), and a set of contexts that each reference exactly one
//! cluster and one user by name. The document also names the context kubectl
//! should use by default through its current context.
//!
//! # On-Disk Layout
//!
//! Kubeconfig files store each record set as a YAML list of named entries,
//! e.g., `clusters: [{name: foo, cluster: {...}}]`. Kubecfg keeps each record
//! set as a name-keyed map in memory so that references between contexts and
//! clusters or users can be checked by name. Any field kubecfg does not know
//! about is carried along untouched, so writing a document back never drops
//! exec plugins, extensions, or other settings.
//!
//! Only files whose `kind` is `Config` are treated as documents. Discovery
//! caches and other YAML files that usually live beside kubeconfigs are
//! rejected at parse time.

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    str::FromStr,
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// Body of a freshly created document.
pub const EMPTY_DOCUMENT: &str = r#"apiVersion: v1
clusters: []
contexts: []
current-context: ""
kind: Config
preferences: {}
users: []
"#;

const DOCUMENT_KIND: &str = "Config";

/// Kubeconfig document.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "RawDocument", into = "RawDocument")]
pub struct Document {
    /// API version of the document layout, usually "v1".
    pub api_version: String,

    /// Name of the context kubectl uses by default.
    ///
    /// May be empty, or name a context that no longer exists.
    pub current_context: String,

    /// Cluster records keyed by name.
    pub clusters: BTreeMap<String, Cluster>,

    /// User (credential) records keyed by name.
    pub users: BTreeMap<String, AuthInfo>,

    /// Context records keyed by name.
    pub contexts: BTreeMap<String, Context>,

    /// Client preferences.
    pub preferences: Mapping,

    /// Top-level fields kubecfg does not model.
    pub extra: Mapping,
}

impl Document {
    /// Construct new empty document.
    pub fn new() -> Self {
        Self {
            api_version: "v1".into(),
            current_context: String::new(),
            clusters: BTreeMap::new(),
            users: BTreeMap::new(),
            contexts: BTreeMap::new(),
            preferences: Mapping::new(),
            extra: Mapping::new(),
        }
    }

    /// Load document from file.
    ///
    /// Malformed content is reported, never partially accepted.
    ///
    /// # Errors
    ///
    /// - Return [`DocumentError::Read`] if file cannot be read.
    /// - Return [`DocumentError::Parse`] if file is not a valid document.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("load document: {:?}", path.display());
        let data = fs::read_to_string(path).map_err(|err| DocumentError::Read {
            source: err,
            path: path.into(),
        })?;

        serde_yaml::from_str(&data).map_err(|err| DocumentError::Parse {
            source: err,
            path: path.into(),
        })
    }

    /// Write document to file, replacing its entire content.
    ///
    /// Symlinks are followed such that the file a symlink points to gets
    /// rewritten, while the symlink itself stays in place. This holds for
    /// dangling symlinks too, whose missing target gets created. Content is
    /// written to a temporary sibling file first, and renamed over the target
    /// file after. Permissions of the previous file are kept.
    ///
    /// # Errors
    ///
    /// - Return [`DocumentError::Serialize`] if document cannot be serialized.
    /// - Return [`DocumentError::Write`] if any file operation fails.
    #[instrument(skip(self, path), level = "debug")]
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self).map_err(DocumentError::Serialize)?;

        // INVARIANT: Never replace a symlink with a regular file.
        let target = write_target(path).map_err(|err| write_error(err, path))?;
        debug!("write document: {:?}", target.display());

        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let previous = fs::metadata(&target).ok();

        let mut file = NamedTempFile::new_in(dir).map_err(|err| write_error(err, &target))?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.as_file().sync_all())
            .map_err(|err| write_error(err, &target))?;
        if let Some(metadata) = previous {
            fs::set_permissions(file.path(), metadata.permissions())
                .map_err(|err| write_error(err, &target))?;
        }
        file.persist(&target)
            .map_err(|err| write_error(err.error, &target))?;

        Ok(())
    }

    /// Names of all contexts in sorted order.
    pub fn context_names(&self) -> Vec<String> {
        self.contexts.keys().cloned().collect()
    }

    /// Short summary of document content.
    pub fn summary(&self) -> String {
        format!("{} contexts", self.contexts.len())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for Document {
    type Err = DocumentError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(data).map_err(DocumentError::Deserialize)
    }
}

impl Display for Document {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            serde_yaml::to_string(self)
                .map_err(DocumentError::Serialize)?
                .as_str(),
        )
    }
}

/// Cluster record: endpoint and trust material.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
    #[serde(default)]
    pub server: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub insecure_skip_tls_verify: bool,

    #[serde(flatten)]
    pub extra: Mapping,
}

/// User record: authentication material.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,

    #[serde(flatten)]
    pub extra: Mapping,
}

/// Context record: one cluster paired with one user.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Context {
    /// Name of referenced cluster.
    #[serde(default)]
    pub cluster: String,

    /// Name of referenced user.
    #[serde(default)]
    pub user: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(flatten)]
    pub extra: Mapping,
}

impl Context {
    /// Construct new context referencing a cluster and a user.
    pub fn new(cluster: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            user: user.into(),
            ..Default::default()
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawDocument {
    #[serde(rename = "apiVersion", default)]
    api_version: Option<String>,

    #[serde(default)]
    clusters: Option<Vec<NamedCluster>>,

    #[serde(default)]
    contexts: Option<Vec<NamedContext>>,

    #[serde(rename = "current-context", default)]
    current_context: Option<String>,

    #[serde(default)]
    kind: Option<String>,

    #[serde(default)]
    preferences: Option<Mapping>,

    #[serde(default)]
    users: Option<Vec<NamedAuthInfo>>,

    #[serde(flatten)]
    extra: Mapping,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct NamedAuthInfo {
    name: String,
    user: AuthInfo,
}

impl TryFrom<RawDocument> for Document {
    type Error = UnexpectedKind;

    fn try_from(raw: RawDocument) -> Result<Self, Self::Error> {
        match raw.kind.as_deref() {
            Some(DOCUMENT_KIND) => {}
            other => return Err(UnexpectedKind(other.map(str::to_owned))),
        }

        // INVARIANT: Later entries with the same name replace earlier ones.
        Ok(Self {
            api_version: raw.api_version.unwrap_or_else(|| "v1".into()),
            current_context: raw.current_context.unwrap_or_default(),
            clusters: raw
                .clusters
                .unwrap_or_default()
                .into_iter()
                .map(|entry| (entry.name, entry.cluster))
                .collect(),
            users: raw
                .users
                .unwrap_or_default()
                .into_iter()
                .map(|entry| (entry.name, entry.user))
                .collect(),
            contexts: raw
                .contexts
                .unwrap_or_default()
                .into_iter()
                .map(|entry| (entry.name, entry.context))
                .collect(),
            preferences: raw.preferences.unwrap_or_default(),
            extra: raw.extra,
        })
    }
}

impl From<Document> for RawDocument {
    fn from(document: Document) -> Self {
        Self {
            api_version: Some(document.api_version),
            clusters: Some(
                document
                    .clusters
                    .into_iter()
                    .map(|(name, cluster)| NamedCluster { name, cluster })
                    .collect(),
            ),
            contexts: Some(
                document
                    .contexts
                    .into_iter()
                    .map(|(name, context)| NamedContext { name, context })
                    .collect(),
            ),
            current_context: Some(document.current_context),
            kind: Some(DOCUMENT_KIND.into()),
            preferences: Some(document.preferences),
            users: Some(
                document
                    .users
                    .into_iter()
                    .map(|(name, user)| NamedAuthInfo { name, user })
                    .collect(),
            ),
            extra: document.extra,
        }
    }
}

/// Document kind is not `Config`.
#[derive(Clone, Debug, thiserror::Error)]
#[error("expected document of kind \"Config\", found {0:?}")]
pub struct UnexpectedKind(pub Option<String>);

/// Resolve the file a write to `path` should land in.
///
/// Unlike [`fs::canonicalize`], the last hop of a dangling symlink chain is
/// returned instead of an error.
fn write_target(path: &Path) -> std::io::Result<PathBuf> {
    const MAX_LINK_HOPS: usize = 40;

    match fs::canonicalize(path) {
        Ok(target) => return Ok(target),
        Err(err) if err.kind() != ErrorKind::NotFound => return Err(err),
        Err(_) => {}
    }

    let mut target = path.to_path_buf();
    for _ in 0..MAX_LINK_HOPS {
        match fs::symlink_metadata(&target) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                let link = fs::read_link(&target)?;
                target = match target.parent() {
                    Some(parent) => parent.join(link),
                    None => link,
                };
            }
            _ => return Ok(target),
        }
    }

    Err(std::io::Error::other("too many levels of symbolic links"))
}

fn write_error(err: std::io::Error, path: &Path) -> DocumentError {
    DocumentError::Write {
        source: err,
        path: path.into(),
    }
}

/// Document error types.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Failed to read document file.
    #[error("failed to read document {path:?}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Document file content is not a valid document.
    #[error("failed to parse document {path:?}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },

    /// Failed to write document file.
    #[error("failed to write document {path:?}")]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize document.
    #[error(transparent)]
    Deserialize(serde_yaml::Error),

    /// Failed to serialize document.
    #[error(transparent)]
    Serialize(serde_yaml::Error),
}

impl From<DocumentError> for FmtError {
    fn from(_: DocumentError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = DocumentError> = std::result::Result<T, E>;
