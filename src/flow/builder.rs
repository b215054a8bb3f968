//! Fluent construction of stages.
//!
//! ```
//! use datapath_flow::flow::{StageBuilder, TokenSpec};
//! use datapath_flow::token::DataType;
//! use datapath_flow::wire::PipelineStage;
//!
//! let stage = StageBuilder::new("Write Back", PipelineStage::WriteBack, 2000)
//!     .initial(&["alu_result", "rd_idx", "sig_regwrite"])
//!     .moves(0, "alu_result", "MuxMemToReg->RegFile")
//!     .merge(
//!         1000,
//!         &["alu_result", "rd_idx", "sig_regwrite"],
//!         "RegFile",
//!         TokenSpec::new("reg_written", "X{rd}={alu_result}", DataType::RegisterValue),
//!     )
//!     .finals(&["reg_written"])
//!     .build();
//!
//! assert_eq!(stage.operations.len(), 2);
//! assert_eq!(stage.operations[0].target_component, "RegFile");
//! ```

use crate::flow::{wire_destination, Operation, OperationKind, Stage, TokenSpec};
use crate::types::Millis;
use crate::wire::PipelineStage;

/// Builds a [`Stage`] operation by operation.
#[derive(Clone, Debug)]
pub struct StageBuilder {
    stage: Stage,
}

impl StageBuilder {
    pub fn new(name: impl Into<String>, kind: PipelineStage, duration: Millis) -> Self {
        Self {
            stage: Stage {
                name: name.into(),
                kind,
                duration,
                initial_circles: Vec::new(),
                operations: Vec::new(),
                final_circles: Vec::new(),
                simultaneous_flows: false,
            },
        }
    }

    pub fn initial(mut self, ids: &[&str]) -> Self {
        self.stage.initial_circles = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn finals(mut self, ids: &[&str]) -> Self {
        self.stage.final_circles = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Appends a raw operation.
    pub fn operation(mut self, operation: Operation) -> Self {
        self.stage.operations.push(operation);
        self
    }

    /// Consumes `source` (if any) at `at` and sends one new token per result.
    pub fn split(self, timing: Millis, at: &str, source: Option<&str>, results: Vec<TokenSpec>) -> Self {
        self.operation(Operation {
            kind: OperationKind::Split,
            timing,
            source_ids: source.map(str::to_string).into_iter().collect(),
            target_component: at.to_string(),
            wire: None,
            results,
            travel_ms: None,
        })
    }

    /// Moves `token` along `wire` to the wire's destination.
    pub fn moves(self, timing: Millis, token: &str, wire: &str) -> Self {
        self.operation(Operation {
            kind: OperationKind::Move,
            timing,
            source_ids: vec![token.to_string()],
            target_component: wire_destination(wire).to_string(),
            wire: Some(wire.to_string()),
            results: Vec::new(),
            travel_ms: None,
        })
    }

    /// Replaces `token` by `result` in place at `at`.
    pub fn transform(self, timing: Millis, token: &str, at: &str, result: TokenSpec) -> Self {
        self.operation(Operation {
            kind: OperationKind::Transform,
            timing,
            source_ids: vec![token.to_string()],
            target_component: at.to_string(),
            wire: None,
            results: vec![result],
            travel_ms: None,
        })
    }

    /// Combines `sources` into `result` at `at`.
    pub fn merge(self, timing: Millis, sources: &[&str], at: &str, result: TokenSpec) -> Self {
        self.operation(Operation {
            kind: OperationKind::Merge,
            timing,
            source_ids: sources.iter().map(|s| s.to_string()).collect(),
            target_component: at.to_string(),
            wire: None,
            results: vec![result],
            travel_ms: None,
        })
    }

    pub fn build(mut self) -> Stage {
        let senders = self
            .stage
            .operations
            .iter()
            .filter(|op| op.kind == OperationKind::Move || op.results.iter().any(|r| r.wire.is_some()))
            .count();
        self.stage.simultaneous_flows = senders > 1;
        self.stage
    }
}
