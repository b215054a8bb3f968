//! Instruction flow definitions.
//!
//! A [`Flow`] is the ordered list of [`Stage`]s animated for one instruction
//! (or instruction class). Each stage lists the tokens alive at its start,
//! an ordered list of timed [`Operation`]s, and the tokens alive at its end.
//! The initial and final token sets are contracts: [`validate`] replays every
//! stage at load time and reports any [`FlowDefect`].
//!
//! Flows are data. [`templates`] instantiates one template per instruction
//! format and [`library::FlowLibrary`] maps mnemonics onto them.

pub mod builder;
pub mod library;
pub mod templates;
pub mod validate;

use serde::{Deserialize, Serialize};

use crate::token::DataType;
use crate::types::{ComponentId, Millis, TokenId};
use crate::wire::PipelineStage;

pub use builder::StageBuilder;
pub use library::{FlowLibrary, FlowResolution};
pub use templates::InstructionFormat;
pub use validate::{validate_flow, DefectKind, FlowDefect};

/// The four primitive token operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Relocates one token along a wire; the token keeps its id.
    Move,
    /// Consumes at most one token and produces one token per result.
    Split,
    /// Consumes one token and produces one token at the same component.
    Transform,
    /// Consumes every source and produces one token at the target.
    Merge,
}

/// Description of a token produced by an operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenSpec {
    pub id: TokenId,
    /// Label template, resolved against the CPU state when the token is created.
    pub value: String,
    pub data_type: DataType,
    /// Wire the new token travels along right after creation (split results).
    #[serde(default)]
    pub wire: Option<String>,
}

impl TokenSpec {
    pub fn new(id: impl Into<TokenId>, value: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            data_type,
            wire: None,
        }
    }

    /// Sends the token along `wire` as soon as it is created.
    pub fn via(mut self, wire: impl Into<String>) -> Self {
        self.wire = Some(wire.into());
        self
    }
}

/// One timed action within a stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    /// Offset from stage start.
    pub timing: Millis,
    #[serde(default)]
    pub source_ids: Vec<TokenId>,
    pub target_component: ComponentId,
    /// Wire used by a `move`.
    #[serde(default)]
    pub wire: Option<String>,
    #[serde(default)]
    pub results: Vec<TokenSpec>,
    /// Overrides the configured travel time for tokens this operation sends.
    #[serde(default)]
    pub travel_ms: Option<Millis>,
}

impl Operation {
    /// Token ids this operation removes from the live set.
    pub fn consumed_ids(&self) -> &[TokenId] {
        match self.kind {
            OperationKind::Move => &[],
            _ => &self.source_ids,
        }
    }

    /// Token ids this operation adds to the live set.
    pub fn produced_ids(&self) -> impl Iterator<Item = &TokenId> {
        self.results.iter().map(|spec| &spec.id)
    }

    /// Every wire this operation references, its own and its results'.
    pub fn wire_names(&self) -> impl Iterator<Item = &str> {
        self.wire
            .iter()
            .chain(self.results.iter().filter_map(|spec| spec.wire.as_ref()))
            .map(String::as_str)
    }
}

/// One pipeline phase of an instruction's animation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub kind: PipelineStage,
    pub duration: Millis,
    pub initial_circles: Vec<TokenId>,
    pub operations: Vec<Operation>,
    pub final_circles: Vec<TokenId>,
    /// Whether several tokens travel at once during this stage.
    #[serde(default)]
    pub simultaneous_flows: bool,
}

impl Stage {
    /// Operation indices in firing order: ascending timing, ties in array order.
    pub fn firing_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.operations.len()).collect();
        order.sort_by_key(|&i| self.operations[i].timing);
        order
    }
}

/// The complete ordered stage sequence for one instruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub name: String,
    pub stages: Vec<Stage>,
}

impl Flow {
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Self {
        Self {
            name: name.into(),
            stages,
        }
    }

    /// Sum of every stage duration, before speed scaling.
    pub fn total_duration(&self) -> Millis {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn stage(&self, kind: PipelineStage) -> Option<&Stage> {
        self.stages.iter().find(|s| s.kind == kind)
    }
}

/// Returns the destination component of a `"Src->Dst"` wire name.
pub fn wire_destination(name: &str) -> &str {
    name.rsplit_once("->").map_or(name, |(_, dst)| dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(kind: OperationKind, timing: Millis) -> Operation {
        Operation {
            kind,
            timing,
            source_ids: vec!["a".to_string()],
            target_component: "X".to_string(),
            wire: None,
            results: vec![TokenSpec::new("b", "v", DataType::Flag).via("X->Y")],
            travel_ms: None,
        }
    }

    #[test]
    fn test_firing_order_is_stable() {
        let stage = Stage {
            name: "s".to_string(),
            kind: PipelineStage::Execute,
            duration: 100,
            initial_circles: vec![],
            operations: vec![
                op(OperationKind::Split, 50),
                op(OperationKind::Merge, 0),
                op(OperationKind::Transform, 50),
                op(OperationKind::Move, 0),
            ],
            final_circles: vec![],
            simultaneous_flows: false,
        };
        assert_eq!(stage.firing_order(), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_move_consumes_nothing() {
        assert!(op(OperationKind::Move, 0).consumed_ids().is_empty());
        assert_eq!(op(OperationKind::Merge, 0).consumed_ids(), &["a".to_string()]);
    }

    #[test]
    fn test_wire_names() {
        let mut operation = op(OperationKind::Split, 0);
        operation.wire = Some("A->X".to_string());
        let names: Vec<_> = operation.wire_names().collect();
        assert_eq!(names, vec!["A->X", "X->Y"]);
    }

    #[test]
    fn test_wire_destination() {
        assert_eq!(wire_destination("ALUMain->DataMemory"), "DataMemory");
        assert_eq!(wire_destination("Nothing"), "Nothing");
    }
}
