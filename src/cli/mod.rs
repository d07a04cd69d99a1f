//! Command-line surface of `alertctl`
//!
//! Argument definitions live in [`args`]; [`output`] renders command
//! results as tables, JSON or compact lines.

pub mod args;
pub mod output;

pub use args::{Cli, Commands, OutputFormat, RunArgs};
