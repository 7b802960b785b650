//! continuously - run a command whenever a file tracked by git changes.
//!
//! Usage:
//!   continuously [-q] [--] COMMAND [ARG]...
//!
//! Inside a git working tree, every tracked file, every untracked file the
//! ignore rules let through, and every file named `.k` is watched. A change
//! to any of them runs COMMAND, unless it is still running from last time.
//!
//! On a terminal, Enter runs COMMAND by hand and q, x or Esc quits.

use std::ffi::OsString;

use clap::Parser;
use color_eyre::eyre::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use continuously_core::RunConfig;
use continuously_engine::{EventLoop, Inotify};
use continuously_scan::{GitProject, Scanner};

#[derive(Parser)]
#[command(
    name = "continuously",
    version,
    about = "Run command when files change",
    override_usage = "continuously [OPTION] [--] COMMAND [ARG]..."
)]
struct Cli {
    /// Keep quiet about event and state transitions
    #[arg(short, long)]
    quiet: bool,

    /// Command to run, followed by its arguments
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true
    )]
    command: Vec<OsString>,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // help and version
        Err(e) if !e.use_stderr() => {
            e.print()?;
            return Ok(());
        }
        Err(e) => {
            e.print()?;
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = RunConfig::builder()
        .quiet(cli.quiet)
        .command(cli.command)
        .build()
        .context("Invalid command")?;

    let mut inotify = Inotify::new().context("Failed to set up file notifications")?;
    let project = GitProject::discover(".").context("Not inside a git working tree")?;
    let watches = Scanner::new(&project)
        .scan(&mut inotify)
        .context("Failed to build the watch set")?;

    let mut event_loop =
        EventLoop::start(config, inotify, watches).context("Failed to start the event loop")?;
    let done = event_loop.run().context("Event loop failed")?;

    info!("exiting ({}): 0", done.cause);
    Ok(())
}
