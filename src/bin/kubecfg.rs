// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use kubecfg::{
    chooser,
    config::ChooserKind,
    path::default_settings_path,
    store::{load_settings, Removal, Store, StoreError},
    PointerState, Resolution,
};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use inquire::Select;
use std::{
    io::{stdin, stdout, IsTerminal},
    path::PathBuf,
    process::exit,
    time::SystemTime,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "kubecfg [options] [<command>]",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Directory to search for kubeconfig documents.
    #[arg(short, long, value_name = "path")]
    pub dir: Option<PathBuf>,

    /// Path to settings file.
    #[arg(short = 'c', long, value_name = "path")]
    pub settings: Option<PathBuf>,

    /// Use built-in selection prompt instead of fzf.
    #[arg(long)]
    pub prompt: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    fn run(self) -> Result<()> {
        let path = match self.settings {
            Some(path) => path,
            None => default_settings_path()?,
        };
        let mut settings = load_settings(path)?;
        if let Some(dir) = self.dir {
            settings.store.dir = Some(dir);
        }
        if self.prompt {
            settings.chooser.kind = ChooserKind::Prompt;
        }

        let store = Store::from_settings(&settings)?;
        let chooser = chooser::from_settings(&settings.chooser);

        match self.command.unwrap_or(Command::Switch(SwitchOptions::default())) {
            Command::Switch(opts) => run_switch(&store, chooser.as_ref(), opts),
            Command::List => run_list(&store),
            Command::Current => run_current(&store),
            Command::Show(opts) => run_show(&store, opts),
            Command::New(opts) => run_new(&store, opts),
            Command::Delete(opts) => run_delete(&store, chooser.as_ref(), opts),
            Command::Prune(opts) => run_prune(&store, opts),
            Command::Resolve(opts) => run_resolve(&store, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Select active kubeconfig document (default).
    #[command(override_usage = "kubecfg switch [<name>]")]
    Switch(SwitchOptions),

    /// List discovered kubeconfig documents.
    List,

    /// Show active kubeconfig document.
    Current,

    /// Show details of a kubeconfig document, the active one by default.
    #[command(override_usage = "kubecfg show [<name>]")]
    Show(ShowOptions),

    /// Create new empty kubeconfig document.
    #[command(override_usage = "kubecfg new <name>")]
    New(NewOptions),

    /// Delete context with its cluster and user.
    #[command(override_usage = "kubecfg delete [options] [<context>]")]
    Delete(DeleteOptions),

    /// Remove clusters and users that no context references.
    #[command(override_usage = "kubecfg prune [options]")]
    Prune(PruneOptions),

    /// Deal with a regular file sitting where the selection symlink belongs.
    #[command(override_usage = "kubecfg resolve <action>")]
    Resolve(ResolveOptions),
}

#[derive(Parser, Clone, Debug, Default)]
#[command(author, about, long_about)]
struct SwitchOptions {
    /// Name of kubeconfig document to select.
    #[arg(value_name = "name")]
    pub name: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ShowOptions {
    /// Name of kubeconfig document to describe.
    #[arg(value_name = "name")]
    pub name: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct NewOptions {
    /// File name of new document, relative to store directory.
    #[arg(required = true, value_name = "name")]
    pub name: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DeleteOptions {
    /// Name of context to delete.
    #[arg(value_name = "context")]
    pub context: Option<String>,

    /// Operate on given document instead of active one.
    #[arg(short, long, value_name = "path")]
    pub file: Option<PathBuf>,

    /// Keep cluster and user if other contexts still use them.
    #[arg(short, long)]
    pub exclusive: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PruneOptions {
    /// Operate on given document instead of active one.
    #[arg(short, long, value_name = "path")]
    pub file: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ResolveOptions {
    /// What to do with the file.
    #[arg(required = true, value_enum, value_name = "action")]
    pub action: ResolveAction,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ResolveAction {
    /// Back file up and link to the backup.
    Backup,

    /// Delete file.
    Delete,

    /// Leave file alone.
    Ignore,
}

impl From<ResolveAction> for Resolution {
    fn from(action: ResolveAction) -> Self {
        match action {
            ResolveAction::Backup => Resolution::Backup,
            ResolveAction::Delete => Resolution::Delete,
            ResolveAction::Ignore => Resolution::Ignore,
        }
    }
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        if let Some(StoreError::NothingSelected) = error.downcast_ref::<StoreError>() {
            info!("nothing selected");
            exit(0);
        }

        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_switch(store: &Store, chooser: &dyn chooser::Chooser, opts: SwitchOptions) -> Result<()> {
    if store.pointer_state()? == PointerState::Conflict {
        if stdin().is_terminal() && stdout().is_terminal() {
            let prompt = format!(
                "{:?} is a regular file, not a kubecfg symlink",
                store.pointer().path().display()
            );
            let resolution = Select::new(&prompt, Resolution::ALL.to_vec())
                .prompt_skippable()?
                .unwrap_or(Resolution::Ignore);
            store.resolve_conflict(resolution)?;
        } else {
            warn!("run `kubecfg resolve` to deal with {:?}", store.pointer().path().display());
        }
    }

    store.switch(opts.name.as_deref(), chooser)?;

    Ok(())
}

fn run_list(store: &Store) -> Result<()> {
    let registry = store.scan()?;
    for collision in registry.collisions() {
        warn!(
            "{:?} is shadowed by {:?}, both named {}",
            collision.shadowed.display(),
            collision.kept.display(),
            collision.name
        );
    }

    if registry.is_empty() {
        info!("no kubeconfig documents found");
        return Ok(());
    }

    for candidate in registry.all() {
        let marker = if candidate.is_selected() { "*" } else { " " };
        let shadowed = if registry.is_shadowed(candidate) {
            " (shadowed)"
        } else {
            ""
        };
        println!(
            "{marker} {}{shadowed}\t{}\t{}",
            candidate.name(),
            candidate.summary(),
            candidate.path().display()
        );
    }

    Ok(())
}

fn run_show(store: &Store, opts: ShowOptions) -> Result<()> {
    let candidate = store.candidate(opts.name.as_deref())?;
    println!("{}", candidate.details(SystemTime::now()));

    Ok(())
}

fn run_current(store: &Store) -> Result<()> {
    match store.pointer_state()? {
        PointerState::Linked(target) => println!("{}", target.display()),
        PointerState::Absent => info!("no kubeconfig selected"),
        PointerState::Conflict => warn!(
            "{:?} is a regular file, run `kubecfg resolve` to manage it",
            store.pointer().path().display()
        ),
    }

    Ok(())
}

fn run_new(store: &Store, opts: NewOptions) -> Result<()> {
    let mut registry = store.scan()?;
    let candidate = store.new_document(&mut registry, &opts.name)?;
    println!("{}", candidate.path().display());

    Ok(())
}

fn run_delete(store: &Store, chooser: &dyn chooser::Chooser, opts: DeleteOptions) -> Result<()> {
    let removal = if opts.exclusive {
        Removal::Exclusive
    } else {
        Removal::Cascade
    };

    let (name, context) = store.delete_context(
        opts.file.as_deref(),
        opts.context.as_deref(),
        removal,
        chooser,
    )?;
    info!(
        "context {name} used cluster {} and user {}",
        context.cluster, context.user
    );

    Ok(())
}

fn run_prune(store: &Store, opts: PruneOptions) -> Result<()> {
    let report = store.prune(opts.file.as_deref())?;
    for name in &report.clusters {
        info!("removed cluster {name}");
    }
    for name in &report.users {
        info!("removed user {name}");
    }

    Ok(())
}

fn run_resolve(store: &Store, opts: ResolveOptions) -> Result<()> {
    match store.resolve_conflict(opts.action.into())? {
        PointerState::Linked(target) => info!("kubeconfig now links to {:?}", target.display()),
        PointerState::Absent => info!("no kubeconfig selected"),
        PointerState::Conflict => info!("left {:?} alone", store.pointer().path().display()),
    }

    Ok(())
}
