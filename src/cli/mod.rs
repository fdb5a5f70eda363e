//! The `querytree` command-line interface.
//!
//! `replay` loads a schema, a tree and a command log and dispatches the
//! commands through a [`Store`]; `check` only normalises the tree.

use std::path::Path as FsPath;
use std::sync::Arc;
use std::{fs, process};

use clap::Parser;

use crate::cli::args::{Command, QueryTreeArgs};
use crate::cli::output::{print_trace, print_tree, render_query, TraceStep};
use crate::diagnostics::QueryError;
use crate::dispatch::{self, Store};
use crate::engine::normalize_tree;
use crate::ids::IdGenerator;
use crate::schema::Schema;
use crate::tree::{NodeSpec, Tree};

pub mod args;
pub mod output;

/// Parses the arguments, runs the subcommand and exits with status 1 on error.
pub fn run() {
    let args = QueryTreeArgs::parse();

    let result = match args.command {
        Command::Replay {
            schema,
            tree,
            commands,
            seed,
            trace,
        } => handle_replay(&schema, &tree, &commands, seed, trace),
        Command::Check { schema, tree, seed } => handle_check(&schema, &tree, seed),
    };

    if let Err(e) = result {
        eprintln!("{:?}", miette::Report::new(e));
        process::exit(1);
    }
}

fn id_generator(seed: Option<u64>) -> IdGenerator {
    match seed {
        Some(seed) => IdGenerator::from_seed(seed),
        None => IdGenerator::from_entropy(),
    }
}

fn load(schema: &FsPath, tree: &FsPath, ids: &mut IdGenerator) -> Result<(Schema, Tree), QueryError> {
    let schema = Schema::from_path(schema)?;
    let spec: NodeSpec = serde_json::from_str(&fs::read_to_string(tree)?)?;
    let tree = normalize_tree(spec, &schema, ids)?;
    Ok((schema, tree))
}

fn handle_replay(
    schema: &FsPath,
    tree: &FsPath,
    commands: &FsPath,
    seed: Option<u64>,
    trace: bool,
) -> Result<(), QueryError> {
    let mut ids = id_generator(seed);
    let (schema, tree) = load(schema, tree, &mut ids)?;
    let commands: Vec<dispatch::Command> = serde_json::from_str(&fs::read_to_string(commands)?)?;
    tracing::info!(count = commands.len(), "replaying commands");

    let initial = render_query(&tree, &schema);
    let mut store = Store::new(Arc::new(schema), tree, ids);
    let mut steps = Vec::with_capacity(commands.len());
    for command in commands {
        let name = command.name();
        store.dispatch(command)?;
        let state = store.state();
        if let Some(record) = &state.last_action {
            tracing::info!(command = name, field = ?record.affected_field, "applied");
        }
        steps.push(TraceStep {
            command: name,
            query: render_query(&state.tree, store.schema()),
        });
    }

    if trace {
        print_trace(&initial, &steps);
    }
    print_tree(store.tree(), store.schema())
}

fn handle_check(schema: &FsPath, tree: &FsPath, seed: Option<u64>) -> Result<(), QueryError> {
    let mut ids = id_generator(seed);
    let (schema, tree) = load(schema, tree, &mut ids)?;
    print_tree(&tree, &schema)
}
