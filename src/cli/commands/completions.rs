//! Completions command - shell completion scripts

use crate::cli::args::{Cli, CompletionsArgs};
use clap::CommandFactory;

/// Print the completion script for one shell to stdout
pub fn execute(args: CompletionsArgs) {
    let mut cmd = Cli::command();
    clap_complete::generate(args.shell, &mut cmd, "packrat", &mut std::io::stdout());
}
