//! CLI command implementations.

pub mod build;
pub mod demo;
pub mod query;
pub mod route;

use crate::error::CliResult;
use serde::Serialize;

/// Output format of query commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// One line per record.
    Text,
    /// Pretty-printed JSON.
    Json,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
