//! Command dispatch: routes parsed CLI commands to handlers.

pub mod config_cmd;
pub mod probe;
pub mod rate;
pub mod run;

mod util;

use clap::CommandFactory;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    tracing::debug!(command = ?cmd, "dispatching command");
    match cmd {
        Command::Run(args) => run::handle(args, global).await,
        Command::Ping(args) => probe::handle_ping(args, global).await,
        Command::Snmp(args) => probe::handle_snmp(args, global).await,
        Command::Rate(args) => rate::handle(&args, global),
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "netpulse", &mut std::io::stdout());
            Ok(())
        }
    }
}
