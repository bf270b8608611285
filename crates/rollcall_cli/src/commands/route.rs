//! Route command implementation.

use super::{print_json, Format};
use crate::error::CliResult;
use rollcall_core::Registry;
use serde::Serialize;

/// Where a name is routed.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RouteResult {
    /// The name as given.
    pub input: String,
    /// The normalized routing key.
    pub key: char,
    /// Name of the owning partition.
    pub partition: String,
    /// Key range of the owning partition.
    pub range: String,
}

/// Resolves `name` without touching any store.
pub fn resolve(registry: &Registry, name: &str) -> CliResult<RouteResult> {
    let manager = registry.manager();
    let key = manager.resolve_key_from_string(name)?;
    let partition = manager.resolve(name)?;
    Ok(RouteResult {
        input: name.to_owned(),
        key,
        partition: partition.name().to_owned(),
        range: partition.range().to_string(),
    })
}

/// Runs the route command.
pub fn run(registry: &Registry, name: &str, format: Format) -> CliResult<()> {
    let route = resolve(registry, name)?;
    match format {
        Format::Json => print_json(&route),
        Format::Text => {
            println!(
                "{:?} -> key {:?} -> {} ({})",
                route.input, route.key, route.partition, route.range
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use rollcall_core::{ClusterConfig, CoreError};

    #[test]
    fn routes_by_first_letter() {
        let registry = Registry::open(&ClusterConfig::in_memory()).unwrap();

        let route = resolve(&registry, "  guido van rossum").unwrap();
        assert_eq!(route.key, 'G');
        assert_eq!(route.partition, "enrollment1.db");
        assert_eq!(route.range, "A-M");

        let route = resolve(&registry, "Rob Pike").unwrap();
        assert_eq!(route.partition, "enrollment2.db");
    }

    #[test]
    fn blank_name_is_reported() {
        let registry = Registry::open(&ClusterConfig::in_memory()).unwrap();
        assert!(matches!(
            resolve(&registry, " "),
            Err(CliError::Core(CoreError::EmptyRoutingKey))
        ));
    }
}
