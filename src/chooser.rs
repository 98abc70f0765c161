// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Interactive selection.
//!
//! Whenever the user has not named the document or context they want,
//! kubecfg asks them to pick one out of a list. The list is handed to a
//! [`Chooser`], which either shells out to fzf, or draws a selection prompt
//! in the current process.

use crate::config::{ChooserKind, ChooserSettings};

use inquire::{InquireError, Select};
use std::{
    ffi::OsString,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{ErrorKind, Write},
    path::PathBuf,
    process::{Command, Stdio},
};
use tracing::{debug, instrument, warn};

/// Pick one name out of many.
pub trait Chooser {
    /// Ask the user to pick one of the given names.
    ///
    /// The highlighted name, if any, is visually distinguished. Returns
    /// `None` if the user picked nothing.
    ///
    /// # Errors
    ///
    /// - Return [`ChooserError`] if the user could not be asked at all.
    fn choose(&self, names: &[String], highlighted: Option<&str>) -> Result<Option<String>>;
}

/// Construct chooser from settings.
///
/// Falls back to [`PromptChooser`] if fzf was requested but cannot be found.
pub fn from_settings(settings: &ChooserSettings) -> Box<dyn Chooser> {
    match settings.kind {
        ChooserKind::Prompt => Box::new(PromptChooser::default()),
        ChooserKind::Fzf => {
            let bin = match &settings.fzf {
                Some(bin) => Ok(bin.clone()),
                None => which::which("fzf"),
            };

            match bin {
                Ok(bin) => Box::new(FzfChooser::new(bin, settings.fzf_args.clone())),
                Err(err) => {
                    warn!("cannot find fzf, falling back to prompt: {err}");
                    Box::new(PromptChooser::default())
                }
            }
        }
    }
}

/// Chooser backed by an external fzf process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FzfChooser {
    bin: PathBuf,
    args: Vec<OsString>,
}

impl FzfChooser {
    /// Construct new fzf chooser.
    pub fn new(
        bin: impl Into<PathBuf>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            bin: bin.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Chooser for FzfChooser {
    #[instrument(skip(self, names), level = "debug")]
    fn choose(&self, names: &[String], highlighted: Option<&str>) -> Result<Option<String>> {
        if names.is_empty() {
            return Ok(None);
        }

        let mut child = Command::new(&self.bin)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| ChooserError::Spawn {
                source: err,
                bin: self.bin.clone(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(render_choices(names, highlighted).as_bytes()) {
                Err(err) if err.kind() != ErrorKind::BrokenPipe => return Err(err.into()),
                _ => {}
            }
        }

        let output = child.wait_with_output()?;
        debug!("fzf exited with {}", output.status);

        // INVARIANT: Only no-match (1) and abort (130) count as no choice.
        match output.status.code() {
            Some(0) => {}
            Some(1 | 130) | None => return Ok(None),
            Some(code) => {
                return Err(ChooserError::Failed {
                    bin: self.bin.clone(),
                    code,
                })
            }
        }

        let stdout = String::from_utf8_lossy(output.stdout.as_slice());
        let chosen = console::strip_ansi_codes(stdout.trim()).trim().to_owned();

        Ok((!chosen.is_empty()).then_some(chosen))
    }
}

/// Chooser backed by an in-process selection prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptChooser {
    message: String,
}

impl PromptChooser {
    /// Construct new prompt chooser with custom message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for PromptChooser {
    fn default() -> Self {
        Self::new("select")
    }
}

impl Chooser for PromptChooser {
    fn choose(&self, names: &[String], highlighted: Option<&str>) -> Result<Option<String>> {
        if names.is_empty() {
            return Ok(None);
        }

        let options = names
            .iter()
            .map(|name| PromptChoice {
                name: name.clone(),
                active: Some(name.as_str()) == highlighted,
            })
            .collect::<Vec<_>>();
        let cursor = options.iter().position(|choice| choice.active).unwrap_or(0);

        match Select::new(&self.message, options)
            .with_starting_cursor(cursor)
            .prompt_skippable()
        {
            Ok(choice) => Ok(choice.map(|choice| choice.name)),
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
            Err(err) => Err(ChooserError::Prompt(err)),
        }
    }
}

#[derive(Debug, Clone)]
struct PromptChoice {
    name: String,
    active: bool,
}

impl Display for PromptChoice {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        if self.active {
            write!(fmt, "{} •", self.name)
        } else {
            fmt.write_str(&self.name)
        }
    }
}

/// Render names one per line, with the highlighted name in green.
pub fn render_choices(names: &[String], highlighted: Option<&str>) -> String {
    names
        .iter()
        .map(|name| {
            if Some(name.as_str()) == highlighted {
                console::style(name).green().force_styling(true).to_string()
            } else {
                name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Chooser error types.
#[derive(Debug, thiserror::Error)]
pub enum ChooserError {
    /// Chooser process cannot be started.
    #[error("failed to run {bin:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        bin: PathBuf,
    },

    /// Chooser process reports an error.
    #[error("{bin:?} failed with exit code {code}")]
    Failed { bin: PathBuf, code: i32 },

    /// Communication with chooser process fails.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Selection prompt fails.
    #[error(transparent)]
    Prompt(#[from] InquireError),
}

/// Friendly result alias :3
type Result<T, E = ChooserError> = std::result::Result<T, E>;
