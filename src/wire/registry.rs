//! Wire path registry: lookup from `"Src->Dst"` names to connections.
//!
//! Flows reference wires by name. The registry resolves those names and
//! lets flow loading check, eagerly and once, that every referenced name was
//! actually registered for the stage that uses it.
//!
//! # Example
//!
//! ```
//! use datapath_flow::component::Layout;
//! use datapath_flow::wire::{create_default_registry, PipelineStage};
//!
//! let registry = create_default_registry();
//! let conn = registry.resolve("PC->InstructionMemory").unwrap();
//! assert_eq!(conn.stage, PipelineStage::Fetch);
//!
//! let report = registry.validate_stage(PipelineStage::Fetch, &["PC->ALUPC", "PC->Typo"]);
//! assert!(!report.valid);
//! assert_eq!(report.invalid, vec!["PC->Typo".to_string()]);
//!
//! let path = registry.compute("PC->ALUPC", &Layout::standard(1.0)).unwrap();
//! assert!(path.len() >= 2);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::component::Layout;
use crate::types::Point;
use crate::wire::library::standard_connections;
use crate::wire::route::Route;
use crate::wire::{PipelineStage, WireConnection, WireError};

/// Result of checking a list of names against one stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageValidation {
    pub valid: bool,
    pub invalid: Vec<String>,
}

/// A registry of wire connections keyed by name.
#[derive(Clone, Debug, Default)]
pub struct WirePathRegistry {
    connections: BTreeMap<String, WireConnection>,
}

impl WirePathRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route under `name` for `stage`.
    ///
    /// Registering an existing name replaces the previous connection.
    pub fn register(&mut self, name: impl Into<String>, stage: PipelineStage, route: Route) {
        self.register_connection(WireConnection::new(name, stage, route));
    }

    /// Registers a prebuilt connection.
    pub fn register_connection(&mut self, connection: WireConnection) {
        if let Some(old) = self.connections.insert(connection.name.clone(), connection) {
            tracing::warn!(wire = %old.name, "wire path registered twice, keeping the latest");
        }
    }

    /// Looks up a connection by name.
    pub fn resolve(&self, name: &str) -> Result<&WireConnection, WireError> {
        self.connections
            .get(name)
            .ok_or_else(|| WireError::UnknownPath(name.to_string()))
    }

    /// Resolves `name` and computes its polyline in `layout`.
    pub fn compute(&self, name: &str, layout: &Layout) -> Result<Vec<Point>, WireError> {
        self.resolve(name)?.compute(layout)
    }

    /// Checks that every name is registered for `stage`.
    pub fn validate_stage<S: AsRef<str>>(&self, stage: PipelineStage, names: &[S]) -> StageValidation {
        let invalid: Vec<String> = names
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| {
                self.connections
                    .get(*name)
                    .map_or(true, |conn| conn.stage != stage)
            })
            .map(str::to_string)
            .collect();

        StageValidation {
            valid: invalid.is_empty(),
            invalid,
        }
    }

    /// Names registered for `stage`, in sorted order.
    pub fn names_for_stage(&self, stage: PipelineStage) -> Vec<&str> {
        self.connections
            .values()
            .filter(|conn| conn.stage == stage)
            .map(|conn| conn.name.as_str())
            .collect()
    }

    /// Every registered name, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.connections.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.connections.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterates over every registered connection, sorted by name.
    pub fn connections(&self) -> impl Iterator<Item = &WireConnection> {
        self.connections.values()
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.connections.remove(name).is_some()
    }
}

/// Creates a registry holding the standard datapath wiring.
pub fn create_default_registry() -> WirePathRegistry {
    let mut registry = WirePathRegistry::new();
    for connection in standard_connections() {
        registry.register_connection(connection);
    }
    registry
}
