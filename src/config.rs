// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the settings file that kubecfg uses to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.

use crate::path::{default_kube_dir, NoWayHome, DEFAULT_POINTER_NAME};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Settings file layout.
///
/// Every field is optional. A missing settings file, or a missing section,
/// means kubecfg manages `$HOME/.kube` with `$HOME/.kube/config` as the
/// selection pointer, and uses fzf for interactive selection.
///
/// # General Layout
///
/// The settings file is composed of two sections: store and chooser. The
/// store section determines where kubeconfig documents are discovered, and
/// where the selection pointer lives. The chooser section determines how the
/// user is asked to pick one document, or context, out of many.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Document discovery and selection pointer settings.
    #[serde(default)]
    pub store: StoreSettings,

    /// Interactive selection settings.
    #[serde(default)]
    pub chooser: ChooserSettings,
}

impl Settings {
    /// Directory holding kubeconfig documents.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NoWayHome`] if no directory was configured,
    ///   and the home directory cannot be determined.
    pub fn kube_dir(&self) -> Result<PathBuf> {
        match &self.store.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(default_kube_dir()?),
        }
    }

    /// Path of the selection pointer.
    ///
    /// A relative pointer is taken relative to the kubeconfig directory.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NoWayHome`] if the kubeconfig directory cannot
    ///   be determined.
    pub fn pointer_path(&self) -> Result<PathBuf> {
        let pointer = self
            .store
            .pointer
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_POINTER_NAME));

        Ok(self.kube_dir()?.join(pointer))
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every configured path.
        settings.store.dir = settings.store.dir.as_deref().map(expand_path).transpose()?;
        settings.store.pointer = settings
            .store
            .pointer
            .as_deref()
            .map(expand_path)
            .transpose()?;
        settings.store.globs = settings
            .store
            .globs
            .iter()
            .map(|glob| expand(glob))
            .collect::<Result<Vec<_>>>()?;
        settings.chooser.fzf = settings.chooser.fzf.as_deref().map(expand_path).transpose()?;

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Document discovery settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct StoreSettings {
    /// Directory that is recursively walked for kubeconfig documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Selection pointer path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<PathBuf>,

    /// Additional glob patterns matching kubeconfig documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub globs: Vec<String>,

    /// Maximum directory walk depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
}

/// Interactive selection settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChooserSettings {
    /// Which chooser to use.
    pub kind: ChooserKind,

    /// Path to fzf binary. Looked up on `PATH` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fzf: Option<PathBuf>,

    /// Arguments passed to fzf.
    pub fzf_args: Vec<String>,
}

impl Default for ChooserSettings {
    fn default() -> Self {
        Self {
            kind: ChooserKind::default(),
            fzf: None,
            fzf_args: vec!["--ansi".into(), "--height=~10".into()],
        }
    }
}

/// Available choosers.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChooserKind {
    /// External fzf process.
    #[default]
    Fzf,

    /// In-process selection prompt.
    Prompt,
}

fn expand(data: &str) -> Result<String> {
    Ok(shellexpand::full(data)
        .map_err(ConfigError::ShellExpansion)?
        .into_owned())
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    expand(path.to_string_lossy().as_ref()).map(PathBuf::from)
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to determine default kubeconfig directory.
    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
