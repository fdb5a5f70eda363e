//! User-facing output of the CLI: query strings, tree JSON and step diffs.

use difference::{Changeset, Difference};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::diagnostics::QueryError;
use crate::format::query_string;
use crate::schema::Schema;
use crate::tree::Tree;

// ============================================================================
// TRACE
// ============================================================================

/// One replayed command and the query string it produced.
pub struct TraceStep {
    pub command: &'static str,
    pub query: String,
}

/// Prints every step's query string as a colored line diff against the
/// previous one.
pub fn print_trace(initial: &str, steps: &[TraceStep]) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let mut last = initial.to_string();

    print_header(&mut stdout, "--- Step 0: initial ---");
    println!("{last}");
    println!();

    for (i, step) in steps.iter().enumerate() {
        print_header(&mut stdout, &format!("--- Step {}: {} ---", i + 1, step.command));
        if step.query == last {
            println!(" (unchanged)");
        } else {
            let changeset = Changeset::new(&last, &step.query, "\n");
            print_diff(&mut stdout, &changeset.diffs);
        }
        last = step.query.clone();
        println!();
    }
}

// ============================================================================
// RESULT
// ============================================================================

/// The query string of `tree`, or a placeholder when nothing is complete.
pub fn render_query(tree: &Tree, schema: &Schema) -> String {
    query_string(tree, schema).unwrap_or_else(|| "(empty)".to_string())
}

pub fn print_tree(tree: &Tree, schema: &Schema) -> Result<(), QueryError> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
    println!("{}", render_query(tree, schema));
    let _ = stdout.reset();
    println!("{}", serde_json::to_string_pretty(&tree.to_spec())?);
    Ok(())
}

// ============================================================================
// PRIVATE HELPERS
// ============================================================================

fn print_header(stdout: &mut StandardStream, text: &str) {
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true));
    println!("{text}");
    let _ = stdout.reset();
}

fn print_diff(stdout: &mut StandardStream, diffs: &[Difference]) {
    for diff in diffs {
        match diff {
            Difference::Same(x) => {
                let _ = stdout.reset();
                println!(" {x}");
            }
            Difference::Add(x) => {
                let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
                println!("+{x}");
            }
            Difference::Rem(x) => {
                let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
                println!("-{x}");
            }
        }
    }
    let _ = stdout.reset();
}
