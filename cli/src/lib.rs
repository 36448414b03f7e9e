//! Command-line front end for the bundle sync engine.
//!
//! ## Commands
//!
//! - `bundlesync watch <BUNDLE_ID>` - follow a bundle until interrupted or settled
//! - `bundlesync state <STATE>` - classify a lifecycle state string

pub mod state_cmd;
pub mod watch_cmd;

use clap::Parser;
use clap::Subcommand;

pub use state_cmd::StateArgs;
pub use watch_cmd::WatchArgs;

/// Follow remote bundles while they run
#[derive(Debug, Parser)]
#[command(name = "bundlesync", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a bundle's state and outputs as they change
    Watch(WatchArgs),

    /// Show whether a lifecycle state is transient or terminal
    State(StateArgs),
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Watch(args) => watch_cmd::run_watch(args).await,
            Command::State(args) => {
                state_cmd::run_state(&args)?;
                Ok(())
            }
        }
    }
}
