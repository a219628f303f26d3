//! Command-line surface: argument definitions and subcommand handlers.

mod args;
mod commands;

pub use args::{Cli, Commands};
pub use commands::execute;
