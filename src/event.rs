//! Visual events emitted to the rendering layer.
//!
//! Every state change of an animation run becomes one [`VisualEvent`]. The
//! renderer consumes them in `(time, seq)` order, either by subscribing a
//! listener or by draining the orchestrator's buffer.

use serde::{Deserialize, Serialize};

use crate::token::Token;
use crate::types::{ComponentId, Millis, Point, TokenId};
use crate::wire::PipelineStage;

/// A timed instruction for the renderer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisualEvent {
    /// Virtual time at which the event happens
    pub time: Millis,
    /// Emission order, unique within one orchestrator
    pub seq: u64,
    pub payload: EventPayload,
}

impl VisualEvent {
    /// Creates a new event.
    pub fn new(time: Millis, seq: u64, payload: EventPayload) -> Self {
        Self { time, seq, payload }
    }

    /// Returns the id of the token this event is about, if any.
    pub fn token_id(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::TokenCreated { token }
            | EventPayload::TokenTransformed { token, .. }
            | EventPayload::TokensMerged { result: token, .. } => Some(token.id.as_str()),
            EventPayload::TokenMoved { token_id, .. } | EventPayload::TokenDestroyed { token_id } => {
                Some(token_id.as_str())
            }
            _ => None,
        }
    }

    /// True for the events that end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::FlowCompleted { .. } | EventPayload::AnimationAborted { .. }
        )
    }
}

/// Why a component lights up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightKind {
    /// A token arrived.
    Receive,
    /// A token was split into several.
    Split,
    /// A token changed in place.
    Transform,
    /// Several tokens were combined.
    Merge,
}

/// The payload of a visual event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    StageStarted {
        index: usize,
        name: String,
        kind: PipelineStage,
        /// Scaled duration
        duration: Millis,
    },
    StageCompleted {
        index: usize,
        name: String,
    },
    TokenCreated {
        token: Token,
    },
    /// A token starts travelling along `path`; it arrives `duration` later.
    TokenMoved {
        token_id: TokenId,
        connection: String,
        path: Vec<Point>,
        duration: Millis,
    },
    TokenTransformed {
        source_id: TokenId,
        token: Token,
    },
    TokensMerged {
        sources: Vec<TokenId>,
        result: Token,
    },
    TokenDestroyed {
        token_id: TokenId,
    },
    ComponentHighlighted {
        component: ComponentId,
        kind: HighlightKind,
        duration: Millis,
    },
    WireHighlighted {
        connection: String,
        duration: Millis,
    },
    /// The run finished normally and the CPU was stepped.
    FlowCompleted {
        flow: String,
    },
    /// The watchdog stopped a run that did not finish in time.
    AnimationAborted {
        flow: String,
        reason: String,
    },
}

/// Receives events as they are emitted.
pub trait EventListener: Send {
    fn on_event(&mut self, event: &VisualEvent);
}

impl<F> EventListener for F
where
    F: FnMut(&VisualEvent) + Send,
{
    fn on_event(&mut self, event: &VisualEvent) {
        self(event)
    }
}
