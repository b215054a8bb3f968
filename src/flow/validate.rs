//! Load-time flow checking.
//!
//! [`validate_flow`] replays every stage of a flow without any timers: it
//! walks the operations in firing order, tracks which tokens are live and
//! where they sit, and reports everything that would make the animation
//! lie. Defects are data; callers log them and keep going.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::flow::{wire_destination, Flow, OperationKind, Stage};
use crate::types::{ComponentId, Millis, TokenId};
use crate::wire::{PipelineStage, WirePathRegistry};

/// What is wrong with one operation or stage.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DefectKind {
    #[error("token {token} has no producer")]
    MissingProducer { token: TokenId },

    #[error("token {token} used after it was consumed")]
    ConsumedToken { token: TokenId },

    #[error("token {token} produced while already live")]
    DuplicateToken { token: TokenId },

    #[error("token {token} is at {actual}, expected at {expected}")]
    Misplaced {
        token: TokenId,
        expected: ComponentId,
        actual: ComponentId,
    },

    #[error("move without a wire")]
    MissingWire,

    #[error("unknown wire {wire}")]
    UnknownWire { wire: String },

    #[error("wire {wire} belongs to {registered}")]
    WireStageMismatch {
        wire: String,
        registered: PipelineStage,
    },

    #[error("timing {timing} ms exceeds stage duration {duration} ms")]
    TimingBeyondDuration { timing: Millis, duration: Millis },

    #[error("final set mismatch (missing {missing:?}, unexpected {unexpected:?})")]
    FinalMismatch {
        missing: Vec<TokenId>,
        unexpected: Vec<TokenId>,
    },

    #[error("initial set differs from previous stage (missing {missing:?}, unexpected {unexpected:?})")]
    HandoffMismatch {
        missing: Vec<TokenId>,
        unexpected: Vec<TokenId>,
    },
}

/// A defect located in a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowDefect {
    pub flow: String,
    pub stage: String,
    /// Index into the stage's operation list, if the defect is per-operation.
    pub operation: Option<usize>,
    pub kind: DefectKind,
}

impl fmt::Display for FlowDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operation {
            Some(index) => write!(f, "{} / {} / op {}: {}", self.flow, self.stage, index, self.kind),
            None => write!(f, "{} / {}: {}", self.flow, self.stage, self.kind),
        }
    }
}

impl std::error::Error for FlowDefect {}

/// Differences between an expected and an actual token set, both sorted.
fn set_diff<'a>(
    expected: impl IntoIterator<Item = &'a TokenId>,
    actual: impl IntoIterator<Item = &'a TokenId>,
) -> (Vec<TokenId>, Vec<TokenId>) {
    let expected: BTreeSet<&TokenId> = expected.into_iter().collect();
    let actual: BTreeSet<&TokenId> = actual.into_iter().collect();
    let missing = expected.difference(&actual).map(|s| s.to_string()).collect();
    let unexpected = actual.difference(&expected).map(|s| s.to_string()).collect();
    (missing, unexpected)
}

struct Replay<'a> {
    flow: &'a Flow,
    wires: &'a WirePathRegistry,
    /// Live token -> component it sits at, if known.
    live: BTreeMap<TokenId, Option<ComponentId>>,
    consumed: BTreeSet<TokenId>,
    defects: Vec<FlowDefect>,
}

impl<'a> Replay<'a> {
    fn report(&mut self, stage: &Stage, operation: Option<usize>, kind: DefectKind) {
        self.defects.push(FlowDefect {
            flow: self.flow.name.clone(),
            stage: stage.name.clone(),
            operation,
            kind,
        });
    }

    fn check_wires(&mut self, stage: &Stage) {
        for (index, op) in stage.operations.iter().enumerate() {
            let names: Vec<&str> = op.wire_names().collect();
            let report = self.wires.validate_stage(stage.kind, &names);
            for wire in report.invalid {
                let kind = match self.wires.resolve(&wire) {
                    Err(_) => Some(DefectKind::UnknownWire { wire }),
                    Ok(conn) if conn.stage == PipelineStage::ControlSignals => None,
                    Ok(conn) => Some(DefectKind::WireStageMismatch {
                        wire,
                        registered: conn.stage,
                    }),
                };
                if let Some(kind) = kind {
                    self.report(stage, Some(index), kind);
                }
            }
        }
    }

    /// Checks that `token` is live (and at `at`, when given).
    fn require(&mut self, stage: &Stage, index: usize, token: &TokenId, at: Option<&str>) -> bool {
        match self.live.get(token) {
            None => {
                let kind = if self.consumed.contains(token) {
                    DefectKind::ConsumedToken {
                        token: token.clone(),
                    }
                } else {
                    DefectKind::MissingProducer {
                        token: token.clone(),
                    }
                };
                self.report(stage, Some(index), kind);
                false
            }
            Some(location) => {
                if let (Some(actual), Some(expected)) = (location, at) {
                    if actual != expected {
                        let kind = DefectKind::Misplaced {
                            token: token.clone(),
                            expected: expected.to_string(),
                            actual: actual.clone(),
                        };
                        self.report(stage, Some(index), kind);
                    }
                }
                true
            }
        }
    }

    fn run_stage(&mut self, stage: &Stage) {
        self.check_wires(stage);

        for index in stage.firing_order() {
            let op = &stage.operations[index];
            if op.timing > stage.duration {
                self.report(
                    stage,
                    Some(index),
                    DefectKind::TimingBeyondDuration {
                        timing: op.timing,
                        duration: stage.duration,
                    },
                );
            }

            if op.kind == OperationKind::Move {
                let Some(wire) = op.wire.as_deref() else {
                    self.report(stage, Some(index), DefectKind::MissingWire);
                    continue;
                };
                let origin = self.wires.resolve(wire).ok().map(|conn| conn.source().clone());
                for token in &op.source_ids {
                    if self.require(stage, index, token, origin.as_deref()) {
                        self.live
                            .insert(token.clone(), Some(wire_destination(wire).to_string()));
                    }
                }
                continue;
            }

            for token in op.consumed_ids() {
                if self.require(stage, index, token, Some(&op.target_component)) {
                    self.live.remove(token);
                    self.consumed.insert(token.clone());
                }
            }

            for spec in &op.results {
                if self.live.contains_key(&spec.id) {
                    self.report(
                        stage,
                        Some(index),
                        DefectKind::DuplicateToken {
                            token: spec.id.clone(),
                        },
                    );
                }
                let at = spec
                    .wire
                    .as_deref()
                    .map_or(op.target_component.as_str(), wire_destination);
                self.consumed.remove(&spec.id);
                self.live.insert(spec.id.clone(), Some(at.to_string()));
            }
        }

        let (missing, unexpected) = set_diff(&stage.final_circles, self.live.keys());
        if !missing.is_empty() || !unexpected.is_empty() {
            self.report(stage, None, DefectKind::FinalMismatch { missing, unexpected });
        }
    }
}

/// Replays `flow` against `wires` and returns every defect found.
///
/// An empty result means that every operation's sources exist when it fires,
/// every wire is registered for the stage that uses it, and every stage's
/// declared initial and final token sets match the replay.
pub fn validate_flow(flow: &Flow, wires: &WirePathRegistry) -> Vec<FlowDefect> {
    let mut replay = Replay {
        flow,
        wires,
        live: BTreeMap::new(),
        consumed: BTreeSet::new(),
        defects: Vec::new(),
    };

    let mut previous_final: Vec<TokenId> = Vec::new();
    for stage in &flow.stages {
        let (missing, unexpected) = set_diff(&previous_final, &stage.initial_circles);
        if !missing.is_empty() || !unexpected.is_empty() {
            replay.report(stage, None, DefectKind::HandoffMismatch { missing, unexpected });
        }
        // Tokens the stage claims to start with are trusted from here on.
        for token in &stage.initial_circles {
            replay.live.entry(token.clone()).or_insert(None);
        }

        replay.run_stage(stage);
        previous_final = stage.final_circles.clone();
    }

    replay.defects
}
