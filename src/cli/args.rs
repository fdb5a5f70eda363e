//! Command-line arguments and subcommands of the `querytree` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "querytree",
    version,
    about = "Replay query-builder edit commands against a schema."
)]
pub struct QueryTreeArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply a JSON array of commands to a tree and print the result.
    Replay {
        /// Schema file (JSON, or YAML by extension).
        #[arg(long)]
        schema: PathBuf,
        /// Initial tree in the nested `children1` JSON form.
        #[arg(long)]
        tree: PathBuf,
        /// JSON array of commands.
        #[arg(long)]
        commands: PathBuf,
        /// Seed for generated ids; random when omitted.
        #[arg(long)]
        seed: Option<u64>,
        /// Print the query string diff after every command.
        #[arg(long)]
        trace: bool,
    },
    /// Normalise a tree against a schema and print it.
    Check {
        /// Schema file (JSON, or YAML by extension).
        #[arg(long)]
        schema: PathBuf,
        /// Tree in the nested `children1` JSON form.
        #[arg(long)]
        tree: PathBuf,
        /// Seed for ids given to nodes that lack one.
        #[arg(long)]
        seed: Option<u64>,
    },
}
