//! Build command implementation.

use crate::error::CliResult;
use rollcall_core::{seed, ClusterConfig, Registry};
use rollcall_store::MEMORY_TARGET;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

/// Runs the build command.
///
/// Existing partition files are deleted first so the sample data is never
/// written twice.
pub fn run(config: &ClusterConfig) -> CliResult<()> {
    for partition in &config.partitions {
        if partition.target != MEMORY_TARGET {
            remove_if_exists(Path::new(&partition.target))?;
        }
    }

    let registry = Registry::open(config)?;
    registry.create_schema()?;
    let students = seed(&registry)?;

    println!("Built {} partition(s):", registry.manager().partitions().len());
    for partition in registry.manager().partitions() {
        println!("  {:<20} {}", partition.name(), partition.range());
    }
    println!("Wrote {} student(s):", students.len());
    for student in &students {
        let partition = registry.manager().resolve(&student.name)?;
        let label = student.to_string();
        println!("  {label:<28} -> {}", partition.name());
    }

    registry.shutdown()?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> CliResult<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed existing partition");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            warn!(path = %path.display(), %err, "cannot remove existing partition");
            Err(err.into())
        }
    }
}
