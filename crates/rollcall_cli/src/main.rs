//! Rollcall CLI
//!
//! Command-line tools for a partitioned enrollment registry.
//!
//! # Commands
//!
//! - `build` - Recreate the partitions and write the sample data
//! - `courses` - List the courses of a student
//! - `roster` - List the students enrolled in a course
//! - `students` - List every student
//! - `batch` - List the courses of several students with one query per partition
//! - `route` - Show which partition a name routes to
//! - `demo` - Run the sample reports

mod commands;
mod error;

use clap::{Parser, Subcommand};
use commands::Format;
use error::CliResult;
use rollcall_core::{ClusterConfig, Registry};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Partitioned enrollment registry tools.
#[derive(Parser)]
#[command(name = "rollcall")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON cluster configuration (defaults to enrollment1.db A-M, enrollment2.db N-Z)
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Directory relative partition files are resolved against
    #[arg(global = true, short, long)]
    dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete and recreate the partitions, then write the sample data
    Build,

    /// List the courses of a student
    Courses {
        /// Student name
        name: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// List the students enrolled in a course
    Roster {
        /// Course code
        code: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// List every student
    Students {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// List the courses of several students
    Batch {
        /// Student names
        #[arg(required = true)]
        names: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show the routing key and partition for a name
    Route {
        /// Name to route
        name: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Run the sample reports against the sample data
    Demo,

    /// Show version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    if let Commands::Version = cli.command {
        println!("Rollcall CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("Rollcall Core v{}", rollcall_core::VERSION);
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => ClusterConfig::from_json_file(path)?,
        None => ClusterConfig::default(),
    };
    if let Some(dir) = &cli.dir {
        config = config.rooted_at(dir);
    }

    if let Commands::Build = cli.command {
        return commands::build::run(&config);
    }

    let registry = Registry::open(&config)?;
    let result = match cli.command {
        Commands::Courses { name, format } => commands::query::courses(&registry, &name, format),
        Commands::Roster { code, format } => commands::query::roster(&registry, &code, format),
        Commands::Students { format } => commands::query::students(&registry, format),
        Commands::Batch { names, format } => commands::query::batch(&registry, &names, format),
        Commands::Route { name, format } => commands::route::run(&registry, &name, format),
        Commands::Demo => commands::demo::run(&registry),
        Commands::Build | Commands::Version => Ok(()),
    };
    finish(result, registry.shutdown().map_err(Into::into))
}

/// Combines a command's outcome with the shutdown that follows it.
///
/// The command's own error takes precedence; a shutdown failure behind it
/// is logged.
fn finish(result: CliResult<()>, shutdown: CliResult<()>) -> CliResult<()> {
    match (result, shutdown) {
        (Err(err), Err(shutdown_err)) => {
            error!(err = %shutdown_err, "shutdown failed");
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
        (Ok(()), shutdown) => shutdown,
    }
}
