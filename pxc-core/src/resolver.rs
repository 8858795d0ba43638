//! Service dependency resolution.
//!
//! Orders stack services so every service comes after everything in its
//! `depends_on`. Shutdown uses the same order reversed.

use crate::error::{PxcError, Result};
use crate::manifest::ServiceSpec;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Startup order: each service appears after all of its dependencies.
///
/// # Errors
///
/// - [`PxcError::MissingDependency`] if any `depends_on` names an undefined
///   service. This is checked for every service before traversal starts.
/// - [`PxcError::CircularDependency`] at the first cycle found, naming the
///   service where it closed and the path around the cycle.
pub fn order(services: &BTreeMap<String, ServiceSpec>) -> Result<Vec<String>> {
    for (name, service) in services {
        if let Some(missing) = service.depends_on.iter().find(|d| !services.contains_key(*d)) {
            return Err(PxcError::MissingDependency {
                service: name.clone(),
                dependency: missing.clone(),
            });
        }
    }

    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(services.len());
    let mut path: Vec<&str> = Vec::new();
    let mut ordered = Vec::with_capacity(services.len());

    for name in services.keys() {
        visit(name, services, &mut marks, &mut path, &mut ordered)?;
    }
    Ok(ordered)
}

fn visit<'a>(
    name: &'a str,
    services: &'a BTreeMap<String, ServiceSpec>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    ordered: &mut Vec<String>,
) -> Result<()> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|n| *n == name).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            return Err(PxcError::CircularDependency { service: name.to_string(), cycle });
        }
        None => {}
    }

    marks.insert(name, Mark::Visiting);
    path.push(name);

    if let Some(service) = services.get(name) {
        for dependency in &service.depends_on {
            visit(dependency, services, marks, path, ordered)?;
        }
    }

    path.pop();
    marks.insert(name, Mark::Done);
    ordered.push(name.to_string());
    Ok(())
}

/// Shutdown order: dependents before their dependencies.
pub fn shutdown_order(services: &BTreeMap<String, ServiceSpec>) -> Result<Vec<String>> {
    let mut ordered = order(services)?;
    ordered.reverse();
    Ok(ordered)
}
