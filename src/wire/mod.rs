//! Wire connections between functional units.
//!
//! A [`WireConnection`] is a named, stage-tagged route (`"Src->Dst"`). The
//! [`library`] module holds the hand-authored table for the standard
//! datapath, the [`registry`] module the lookup table used by flows.

pub mod library;
pub mod registry;
pub mod route;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::component::Layout;
use crate::types::{ComponentId, Point};

pub use library::standard_connections;
pub use registry::{create_default_registry, StageValidation, WirePathRegistry};
pub use route::{Coord, Edge, Leg, Port, Route, RouteError, RouteResult};

/// The pipeline phase a wire (or a flow stage) belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineStage {
    #[serde(rename = "IF")]
    Fetch,
    #[serde(rename = "ID")]
    Decode,
    #[serde(rename = "EX")]
    Execute,
    #[serde(rename = "MEM")]
    Memory,
    #[serde(rename = "WB")]
    WriteBack,
    #[serde(rename = "PC_UPDATE")]
    PcUpdate,
    #[serde(rename = "CONTROL_SIGNALS")]
    ControlSignals,
}

impl PipelineStage {
    /// Short tag used in logs and stage names.
    pub fn tag(&self) -> &'static str {
        match self {
            PipelineStage::Fetch => "IF",
            PipelineStage::Decode => "ID",
            PipelineStage::Execute => "EX",
            PipelineStage::Memory => "MEM",
            PipelineStage::WriteBack => "WB",
            PipelineStage::PcUpdate => "PC_UPDATE",
            PipelineStage::ControlSignals => "CONTROL_SIGNALS",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Errors raised by wire lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("unknown wire path: {0}")]
    UnknownPath(String),

    #[error("cannot route {name}: {source}")]
    Route {
        name: String,
        #[source]
        source: RouteError,
    },
}

/// A registered connection between two components.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireConnection {
    pub name: String,
    pub stage: PipelineStage,
    pub route: Route,
}

impl WireConnection {
    /// Creates a connection.
    pub fn new(name: impl Into<String>, stage: PipelineStage, route: Route) -> Self {
        Self {
            name: name.into(),
            stage,
            route,
        }
    }

    /// Creates a connection named after its endpoints (`"Src->Dst"`).
    pub fn between(stage: PipelineStage, route: Route) -> Self {
        let name = connection_name(&route.from.component, &route.to.component);
        Self::new(name, stage, route)
    }

    pub fn source(&self) -> &ComponentId {
        &self.route.from.component
    }

    pub fn destination(&self) -> &ComponentId {
        &self.route.to.component
    }

    /// Computes the polyline in `layout`.
    pub fn compute(&self, layout: &Layout) -> Result<Vec<Point>, WireError> {
        self.route.compute(layout).map_err(|source| WireError::Route {
            name: self.name.clone(),
            source,
        })
    }
}

/// Formats the canonical connection name.
pub fn connection_name(source: &str, destination: &str) -> String {
    format!("{}->{}", source, destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Side;

    #[test]
    fn test_stage_serde_tags() {
        let json = serde_json::to_string(&PipelineStage::PcUpdate).unwrap();
        assert_eq!(json, "\"PC_UPDATE\"");
        let stage: PipelineStage = serde_json::from_str("\"MEM\"").unwrap();
        assert_eq!(stage, PipelineStage::Memory);
    }

    #[test]
    fn test_between_names_connection() {
        let conn = WireConnection::between(
            PipelineStage::Fetch,
            Route::new(Port::new("PC", Side::Right), Port::new("InstructionMemory", Side::Left)),
        );
        assert_eq!(conn.name, "PC->InstructionMemory");
        assert_eq!(conn.source(), "PC");
        assert_eq!(conn.destination(), "InstructionMemory");
    }

    #[test]
    fn test_compute_wraps_route_error() {
        let conn = WireConnection::between(
            PipelineStage::Fetch,
            Route::new(Port::new("PC", Side::Right), Port::new("Nowhere", Side::Left)),
        );
        let err = conn.compute(&Layout::standard(1.0)).unwrap_err();
        assert!(matches!(err, WireError::Route { .. }));
        assert!(err.to_string().contains("PC->Nowhere"));
    }
}
