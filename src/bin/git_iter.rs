// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use git_iter::{Git2Backend, SessionStore, Walker};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{ffi::OsString, process::exit};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const INTRO: &str = "\
Like `git bisect`, but iterates linearly instead of bisecting.

This can be especially useful for `git iter run` when the commit history is
dirty (a mix of bad and good commits) and you want to find the first bad
commit; dirty history means `git bisect` may not find the earliest bad commit.

Also useful if you just want to walk through the history for whatever reason,
without having to look at revision numbers to check out.

This is simpler than `git bisect` and does not support all of the same
features/options.";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "git-iter",
    bin_name = "git iter",
    about = "Like git-bisect, but iterates linearly instead of bisecting",
    long_about = INTRO,
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self, walker: Walker<Git2Backend>) -> Result<i32> {
        match self.command {
            Command::Start(opts) => {
                walker.start(&opts.first, opts.last.as_deref(), opts.path_filter)?;
                Ok(0)
            }
            Command::First(opts) => {
                walker.set_first(&opts.rev)?;
                Ok(0)
            }
            Command::Last(opts) => {
                walker.set_last(opts.rev.as_deref())?;
                Ok(0)
            }
            Command::Next => {
                walker.next()?;
                Ok(0)
            }
            Command::Prev => {
                walker.prev()?;
                Ok(0)
            }
            Command::Reset(opts) => {
                walker.reset(opts.rev.as_deref())?;
                Ok(0)
            }
            Command::Run(opts) => Ok(walker.run(&opts.command, opts.reverse)?),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Reset iteration state and start a fresh walk.
    #[command(override_usage = "git iter start <first> [<last>] [-- <pathspec>...]")]
    Start(StartOptions),

    /// Mark <rev> as the oldest commit to consider.
    #[command(override_usage = "git iter first <rev>")]
    First(FirstOptions),

    /// Mark <rev> as the newest commit to consider.
    #[command(override_usage = "git iter last [<rev>]")]
    Last(LastOptions),

    /// Check out the next commit in the sequence.
    Next,

    /// Check out the previous commit in the sequence.
    Prev,

    /// Finish iteration and go back to where the walk began.
    #[command(override_usage = "git iter reset [<rev>]")]
    Reset(ResetOptions),

    /// Automatically iterate and run a command at every commit.
    #[command(override_usage = "git iter run [-r] <command> [<args>...]")]
    Run(RunOptions),
}

#[derive(Parser, Clone, Debug)]
struct StartOptions {
    /// Oldest commit of the walk, inclusive.
    #[arg(value_name = "first")]
    pub first: String,

    /// Newest commit of the walk, inclusive; defaults to HEAD.
    #[arg(value_name = "last")]
    pub last: Option<String>,

    /// Restrict the walk to commits touching these paths.
    #[arg(last = true, value_name = "pathspec")]
    pub path_filter: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
struct FirstOptions {
    /// Revision to mark as the oldest commit.
    #[arg(value_name = "rev")]
    pub rev: String,
}

#[derive(Parser, Clone, Debug)]
struct LastOptions {
    /// Revision to mark as the newest commit; defaults to HEAD.
    #[arg(value_name = "rev")]
    pub rev: Option<String>,
}

#[derive(Parser, Clone, Debug)]
struct ResetOptions {
    /// Revision to check out instead of the recorded origin.
    #[arg(value_name = "rev")]
    pub rev: Option<String>,
}

#[derive(Parser, Clone, Debug)]
struct RunOptions {
    /// Iterate from newest to oldest instead.
    #[arg(short, long)]
    pub reverse: bool,

    /// Command to execute at every commit; the first nonzero exit stops
    /// the walk and becomes git-iter's own exit status.
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "command"
    )]
    pub command: Vec<OsString>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    match run() {
        Ok(code) => exit(code),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let backend = Git2Backend::discover_from_cwd()?;
    let store = SessionStore::new(backend.git_dir());

    // Every subcommand mutates the session, so every subcommand holds the
    // lock marker for the whole invocation.
    let _marker = store.lock()?;

    cli.run(Walker::new(backend, store))
}
