//! Animation orchestrator.
//!
//! The [`Orchestrator`] walks one [`Flow`] stage by stage on a virtual clock.
//! Nothing happens on its own: the caller feeds time in with
//! [`Orchestrator::advance_to`] (or lets a [`Player`] do it) and every due
//! timer fires in deadline order. At equal deadlines a stage end fires after
//! everything else, otherwise timers fire in the order they were scheduled.
//!
//! # Run lifecycle
//!
//! ```text
//! Idle ──start──▶ StageRunning(0) ──end──▶ StageComplete(0) ──▶ StageRunning(1) ... ──▶ Done
//!                        │
//!                        └──── stop() / watchdog ────▶ Cancelled
//! ```
//!
//! - Stages run strictly one after the other; a stage ends when its scaled
//!   duration has elapsed, whatever is still in flight.
//! - Operations fire at their offset, ties in array order. A token arriving
//!   exactly at the stage end still counts as arrived. An operation whose
//!   source tokens are not live and arrived yet waits and is retried whenever
//!   a token arrives or is produced. Operations still waiting when the stage
//!   ends are skipped and logged.
//! - Referencing a consumed token is an invariant violation: logged at error
//!   level, operation skipped.
//! - Every timer carries the generation it was scheduled in. `stop()` bumps
//!   the generation and clears the queue, so nothing scheduled before the
//!   stop can fire afterwards.
//!
//! # Example
//!
//! ```
//! use datapath_flow::label::SnapshotCore;
//! use datapath_flow::scheduler::{Orchestrator, RunState};
//!
//! let core = SnapshotCore::with_instruction("ADD X1, X2, X3");
//! let mut orchestrator = Orchestrator::standard(core);
//!
//! orchestrator.start(0).unwrap();
//! while let Some(deadline) = orchestrator.next_deadline() {
//!     orchestrator.advance_to(deadline);
//! }
//!
//! assert_eq!(orchestrator.state(), RunState::Done);
//! assert_eq!(orchestrator.core().steps, 1);
//! assert!(orchestrator.drain_events().last().unwrap().is_terminal());
//! ```

pub mod player;
pub mod queue;

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::analysis::{find_shared_segments, SharedSegment};
use crate::component::ComponentRegistry;
use crate::config::{AnimationParams, ConfigResult, EngineConfig};
use crate::event::{EventListener, EventPayload, HighlightKind, VisualEvent};
use crate::flow::{wire_destination, Flow, FlowLibrary, FlowResolution, OperationKind, Stage, TokenSpec};
use crate::label::{resolve_label, CpuCore};
use crate::stats::RunStats;
use crate::token::Token;
use crate::types::{Millis, Point, TokenId};
use crate::wire::{create_default_registry, WireError, WirePathRegistry};

pub use player::{Clock, ManualClock, Player, StopHandle, SystemClock};
pub use queue::{Timer, TimerKind, TimerQueue};

/// Errors returned when starting a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("no instruction selected")]
    NoInstruction,
}

/// Where the orchestrator is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    StageRunning { stage: usize },
    /// Transient: the stage has ended and the next one is about to start.
    StageComplete { stage: usize },
    Done,
    Cancelled,
}

impl RunState {
    /// True while a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::StageRunning { .. } | RunState::StageComplete { .. })
    }
}

struct Travel {
    path: Vec<Point>,
}

struct LiveToken {
    token: Token,
    arrived: bool,
    travel: Option<Travel>,
}

struct Run {
    flow: Arc<Flow>,
    stage: usize,
    /// Timing captured at stage start
    timing: AnimationParams,
    tokens: BTreeMap<TokenId, LiveToken>,
    consumed: HashSet<TokenId>,
    /// Deferred operation indices of the current stage, in firing order
    waiting: Vec<usize>,
}

enum Readiness {
    Ready,
    Waiting,
    Consumed(TokenId),
}

impl Run {
    fn readiness(&self, sources: &[TokenId]) -> Readiness {
        if let Some(gone) = sources.iter().find(|id| {
            !self.tokens.contains_key(id.as_str()) && self.consumed.contains(id.as_str())
        }) {
            return Readiness::Consumed(gone.clone());
        }
        let ready = sources
            .iter()
            .all(|id| self.tokens.get(id).map_or(false, |live| live.arrived));
        if ready {
            Readiness::Ready
        } else {
            Readiness::Waiting
        }
    }

    fn consume(&mut self, id: &TokenId) -> Option<LiveToken> {
        let live = self.tokens.remove(id)?;
        self.consumed.insert(id.clone());
        Some(live)
    }
}

/// Drives instruction flows and emits [`VisualEvent`]s.
pub struct Orchestrator<C: CpuCore> {
    core: C,
    components: Arc<ComponentRegistry>,
    wires: Arc<WirePathRegistry>,
    flows: Arc<FlowLibrary>,
    animation: AnimationParams,
    tolerance: f64,
    state: RunState,
    generation: u64,
    now: Millis,
    run: Option<Run>,
    timers: TimerQueue,
    listeners: Vec<Box<dyn EventListener>>,
    buffering: bool,
    events: Vec<VisualEvent>,
    next_seq: u64,
    stats: RunStats,
}

impl<C: CpuCore> Orchestrator<C> {
    /// Creates an orchestrator from injected registries.
    pub fn new(
        core: C,
        components: Arc<ComponentRegistry>,
        wires: Arc<WirePathRegistry>,
        flows: Arc<FlowLibrary>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            core,
            components,
            wires,
            flows,
            animation: config.animation.clone(),
            tolerance: config.analysis.shared_segment_tolerance,
            state: RunState::Idle,
            generation: 0,
            now: 0,
            run: None,
            timers: TimerQueue::new(),
            listeners: Vec::new(),
            buffering: true,
            events: Vec::new(),
            next_seq: 0,
            stats: RunStats::new(),
        }
    }

    /// Creates an orchestrator over the standard layout, wiring and flows
    /// with the default configuration.
    pub fn standard(core: C) -> Self {
        let config = EngineConfig::default();
        let wires = create_default_registry();
        let flows = FlowLibrary::load(&wires);
        Self::new(
            core,
            Arc::new(ComponentRegistry::new(config.build_layout())),
            Arc::new(wires),
            Arc::new(flows),
            &config,
        )
    }

    // ------------------------------------------------------------------
    // Subscription
    // ------------------------------------------------------------------

    /// Registers a listener called synchronously for every event.
    pub fn subscribe(&mut self, listener: impl EventListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Turns the internal event buffer on or off. On by default.
    pub fn set_buffering(&mut self, enabled: bool) {
        self.buffering = enabled;
        if !enabled {
            self.events.clear();
        }
    }

    /// Takes every buffered event, oldest first.
    pub fn drain_events(&mut self) -> Vec<VisualEvent> {
        std::mem::take(&mut self.events)
    }

    // ------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------

    /// Starts the flow of the core's current instruction at `now`.
    pub fn start(&mut self, now: Millis) -> Result<FlowResolution, SchedulerError> {
        let instruction = self
            .core
            .current_instruction()
            .ok_or(SchedulerError::NoInstruction)?;
        Ok(self.start_mnemonic(&instruction.mnemonic, now))
    }

    /// Starts the flow registered for `mnemonic`, or the default flow.
    pub fn start_mnemonic(&mut self, mnemonic: &str, now: Millis) -> FlowResolution {
        let resolution = self.flows.resolve(mnemonic);
        self.start_flow(Arc::clone(&resolution.flow), now);
        resolution
    }

    /// Starts `flow` at `now`, cancelling any run in progress, and fires
    /// whatever is due immediately.
    pub fn start_flow(&mut self, flow: Arc<Flow>, now: Millis) {
        if self.state.is_active() {
            tracing::info!("new animation requested, cancelling the current one");
            self.stop();
        }

        self.now = self.now.max(now);
        self.generation += 1;
        self.timers.clear();

        tracing::info!(flow = %flow.name, stages = flow.stages.len(), "animation started");
        self.stats.flows_started += 1;
        self.stats.last_flow = Some(flow.name.clone());

        let is_empty = flow.stages.is_empty();
        self.run = Some(Run {
            flow,
            stage: 0,
            timing: self.animation.clone(),
            tokens: BTreeMap::new(),
            consumed: HashSet::new(),
            waiting: Vec::new(),
        });

        if self.animation.watchdog_ms > 0 {
            self.timers.schedule(
                self.now.saturating_add(self.animation.watchdog_ms),
                self.generation,
                TimerKind::Watchdog,
            );
        }

        if is_empty {
            self.finish();
        } else {
            self.start_stage(0);
            let now = self.now;
            self.advance_to(now);
        }
    }

    /// Cancels the current run. Pending timers and live tokens are dropped
    /// immediately and nothing is emitted. Returns false if nothing ran.
    pub fn stop(&mut self) -> bool {
        match self.cancel_run() {
            Some(flow) => {
                self.stats.flows_cancelled += 1;
                tracing::info!(flow = %flow.name, "animation cancelled");
                true
            }
            None => false,
        }
    }

    /// Changes the speed multiplier. Takes effect at the next stage start.
    pub fn set_speed(&mut self, speed: f64) -> ConfigResult<()> {
        let mut animation = self.animation.clone();
        animation.speed = speed;
        animation.validate()?;
        self.animation = animation;
        Ok(())
    }

    /// Fires every timer due at or before `now`, then moves the clock to
    /// `now`. Returns the number of timers fired. Time never goes backwards.
    pub fn advance_to(&mut self, now: Millis) -> usize {
        if now < self.now {
            tracing::debug!(now, current = self.now, "ignoring clock moving backwards");
            return 0;
        }

        let mut fired = 0;
        while let Some((deadline, timer)) = self.timers.pop_due(now) {
            if timer.generation != self.generation {
                continue;
            }
            self.now = deadline;
            self.handle(timer.kind);
            fired += 1;
        }
        self.now = now;
        self.stats.virtual_time = now;
        fired
    }

    /// Deadline of the next pending timer, if any.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.timers.next_deadline()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_flow(&self) -> Option<&Flow> {
        self.run.as_ref().map(|run| run.flow.as_ref())
    }

    pub fn current_stage(&self) -> Option<&Stage> {
        self.run.as_ref().and_then(|run| run.flow.stages.get(run.stage))
    }

    /// Live tokens, sorted by id.
    pub fn live_tokens(&self) -> impl Iterator<Item = &Token> {
        self.run
            .iter()
            .flat_map(|run| run.tokens.values().map(|live| &live.token))
    }

    pub fn token(&self, id: &str) -> Option<&Token> {
        self.run
            .as_ref()
            .and_then(|run| run.tokens.get(id))
            .map(|live| &live.token)
    }

    pub fn live_token_count(&self) -> usize {
        self.run.as_ref().map_or(0, |run| run.tokens.len())
    }

    /// Tokens currently travelling, with their paths.
    pub fn paths_in_flight(&self) -> Vec<(TokenId, Vec<Point>)> {
        self.run
            .iter()
            .flat_map(|run| run.tokens.iter())
            .filter_map(|(id, live)| live.travel.as_ref().map(|t| (id.clone(), t.path.clone())))
            .collect()
    }

    /// Segments shared by tokens currently in flight.
    pub fn shared_segments(&self) -> Vec<SharedSegment> {
        find_shared_segments(&self.paths_in_flight(), self.tolerance)
    }

    pub fn core(&self) -> &C {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut C {
        &mut self.core
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Exports statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "orchestrator": {
                "state": self.state,
                "current_time": self.now,
                "generation": self.generation,
                "flow": self.run.as_ref().map(|run| run.flow.name.clone()),
                "live_tokens": self.live_token_count(),
                "pending_timers": self.timers.len(),
                "waiting_operations": self.run.as_ref().map_or(0, |run| run.waiting.len()),
                "listeners": self.listeners.len(),
            },
            "stats": self.stats,
        })
    }

    // ------------------------------------------------------------------
    // Timer handling
    // ------------------------------------------------------------------

    fn handle(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::FireOperation { stage, operation } => self.fire_operation(stage, operation),
            TimerKind::Arrival { token } => self.arrive(&token),
            TimerKind::StageEnd { stage } => self.end_stage(stage),
            TimerKind::Watchdog => self.watchdog(),
        }
    }

    fn emit(&mut self, payload: EventPayload) {
        let event = VisualEvent::new(self.now, self.next_seq, payload);
        self.next_seq += 1;
        self.stats.events_emitted += 1;
        for listener in &mut self.listeners {
            listener.on_event(&event);
        }
        if self.buffering {
            self.events.push(event);
        }
    }

    fn timing(&self) -> AnimationParams {
        self.run
            .as_ref()
            .map_or_else(|| self.animation.clone(), |run| run.timing.clone())
    }

    fn center_of(&self, component: &str) -> Option<Point> {
        self.components.snapshot().rect(component).map(|rect| rect.center())
    }

    fn start_stage(&mut self, index: usize) {
        let animation = self.animation.clone();
        let Some(run) = self.run.as_mut() else {
            return;
        };
        run.stage = index;
        run.timing = animation.clone();
        run.waiting.clear();
        let flow = Arc::clone(&run.flow);
        let Some(stage) = flow.stages.get(index) else {
            return;
        };

        let live: BTreeSet<&str> = run.tokens.keys().map(String::as_str).collect();
        let initial: BTreeSet<&str> = stage.initial_circles.iter().map(String::as_str).collect();
        let mismatch = live != initial;

        self.state = RunState::StageRunning { stage: index };
        self.emit(EventPayload::StageStarted {
            index,
            name: stage.name.clone(),
            kind: stage.kind,
            duration: animation.scale(stage.duration),
        });
        tracing::debug!(flow = %flow.name, stage = %stage.name, "stage started");

        if mismatch {
            self.stats.defects += 1;
            tracing::warn!(
                flow = %flow.name,
                stage = %stage.name,
                "live tokens differ from the stage's initial set"
            );
        }

        for operation in stage.firing_order() {
            let at = self.now.saturating_add(animation.scale(stage.operations[operation].timing));
            self.timers.schedule(
                at,
                self.generation,
                TimerKind::FireOperation {
                    stage: index,
                    operation,
                },
            );
        }
        self.timers.schedule(
            self.now.saturating_add(animation.scale(stage.duration)),
            self.generation,
            TimerKind::StageEnd { stage: index },
        );
    }

    fn fire_operation(&mut self, stage: usize, operation: usize) {
        let flow = match self.run.as_ref() {
            Some(run) if run.stage == stage => Arc::clone(&run.flow),
            Some(run) => {
                self.stats.operations_skipped += 1;
                self.stats.defects += 1;
                tracing::warn!(
                    flow = %run.flow.name,
                    stage,
                    operation,
                    "operation scheduled past its stage end, skipped"
                );
                return;
            }
            None => return,
        };

        if self.attempt(&flow, stage, operation) {
            self.drain_waiting(&flow, stage);
        } else {
            self.stats.operations_deferred += 1;
            if let Some(run) = self.run.as_mut() {
                run.waiting.push(operation);
            }
            tracing::trace!(flow = %flow.name, stage, operation, "operation waiting for tokens");
        }
    }

    /// Executes the operation if its sources are ready. Returns false if it
    /// has to keep waiting.
    fn attempt(&mut self, flow: &Flow, stage: usize, index: usize) -> bool {
        let Some(run) = self.run.as_ref() else {
            return true;
        };
        let op = &flow.stages[stage].operations[index];
        match run.readiness(&op.source_ids) {
            Readiness::Ready => {
                self.execute(flow, stage, index);
                true
            }
            Readiness::Waiting => false,
            Readiness::Consumed(token) => {
                self.stats.invariant_violations += 1;
                self.stats.operations_skipped += 1;
                tracing::error!(
                    flow = %flow.name,
                    stage = %flow.stages[stage].name,
                    operation = index,
                    token = %token,
                    "operation references a consumed token, skipped"
                );
                true
            }
        }
    }

    /// Retries deferred operations in firing order until none can proceed.
    fn drain_waiting(&mut self, flow: &Flow, stage: usize) {
        loop {
            let waiting = match self.run.as_ref() {
                Some(run) if run.stage == stage && !run.waiting.is_empty() => run.waiting.clone(),
                _ => return,
            };

            let Some(done) = waiting
                .into_iter()
                .find(|&index| self.attempt(flow, stage, index))
            else {
                return;
            };
            if let Some(run) = self.run.as_mut() {
                run.waiting.retain(|&index| index != done);
            }
        }
    }

    fn execute(&mut self, flow: &Flow, stage: usize, index: usize) {
        let op = &flow.stages[stage].operations[index];
        self.stats.operations_fired += 1;
        let timing = self.timing();
        let pulse = timing.scale(timing.pulse_ms);

        match op.kind {
            OperationKind::Move => {
                for id in &op.source_ids {
                    self.begin_travel(flow, stage, index, id, op.wire.as_deref(), op.travel_ms);
                }
            }
            OperationKind::Split => {
                for id in op.consumed_ids() {
                    if let Some(run) = self.run.as_mut() {
                        run.consume(id);
                    }
                    self.stats.tokens_destroyed += 1;
                    self.emit(EventPayload::TokenDestroyed { token_id: id.clone() });
                }
                self.emit(EventPayload::ComponentHighlighted {
                    component: op.target_component.clone(),
                    kind: HighlightKind::Split,
                    duration: pulse,
                });
                let origin = self.center_of(&op.target_component).unwrap_or_default();
                for spec in &op.results {
                    let token = self.make_token(spec, &op.target_component, origin);
                    self.insert_token(token.clone());
                    self.emit(EventPayload::TokenCreated { token });
                    if let Some(wire) = spec.wire.as_deref() {
                        self.begin_travel(flow, stage, index, &spec.id, Some(wire), op.travel_ms);
                    }
                }
            }
            OperationKind::Transform => {
                let Some(source_id) = op.source_ids.first() else {
                    return;
                };
                let source = self.run.as_mut().and_then(|run| run.consume(source_id));
                let position = source
                    .map(|live| live.token.position)
                    .or_else(|| self.center_of(&op.target_component))
                    .unwrap_or_default();
                if let Some(spec) = op.results.first() {
                    let token = self.make_token(spec, &op.target_component, position);
                    self.insert_token(token.clone());
                    self.emit(EventPayload::TokenTransformed {
                        source_id: source_id.clone(),
                        token,
                    });
                }
                self.emit(EventPayload::ComponentHighlighted {
                    component: op.target_component.clone(),
                    kind: HighlightKind::Transform,
                    duration: pulse,
                });
            }
            OperationKind::Merge => {
                if let Some(run) = self.run.as_mut() {
                    for id in &op.source_ids {
                        run.consume(id);
                    }
                }
                let position = self.center_of(&op.target_component).unwrap_or_default();
                if let Some(spec) = op.results.first() {
                    let token = self.make_token(spec, &op.target_component, position);
                    self.insert_token(token.clone());
                    self.emit(EventPayload::TokensMerged {
                        sources: op.source_ids.clone(),
                        result: token,
                    });
                }
                self.emit(EventPayload::ComponentHighlighted {
                    component: op.target_component.clone(),
                    kind: HighlightKind::Merge,
                    duration: pulse,
                });
            }
        }
    }

    fn make_token(&self, spec: &TokenSpec, component: &str, position: Point) -> Token {
        let value = resolve_label(&spec.value, &self.core);
        Token::new(spec.id.clone(), value, spec.data_type, component, position)
    }

    fn insert_token(&mut self, token: Token) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        run.consumed.remove(&token.id);
        let replaced = run.tokens.insert(
            token.id.clone(),
            LiveToken {
                token,
                arrived: true,
                travel: None,
            },
        );
        if let Some(old) = replaced {
            self.stats.defects += 1;
            tracing::warn!(token = %old.token.id, "token produced while already live, replaced");
        }
        self.stats.tokens_created += 1;
    }

    fn begin_travel(
        &mut self,
        flow: &Flow,
        stage: usize,
        index: usize,
        token_id: &TokenId,
        wire: Option<&str>,
        travel_override: Option<Millis>,
    ) {
        let Some(wire) = wire else {
            self.stats.defects += 1;
            tracing::warn!(
                flow = %flow.name,
                stage = %flow.stages[stage].name,
                operation = index,
                "move without a wire, skipped"
            );
            return;
        };

        let layout = self.components.snapshot();
        let path = match self.wires.compute(wire, &layout) {
            Ok(path) => Some(path),
            Err(WireError::UnknownPath(name)) => {
                self.stats.defects += 1;
                tracing::warn!(
                    flow = %flow.name,
                    stage = %flow.stages[stage].name,
                    operation = index,
                    wire = %name,
                    "unknown wire, visual omitted"
                );
                None
            }
            Err(err) => {
                tracing::debug!(%err, "wire endpoint absent, nothing to draw");
                None
            }
        };

        let timing = self.timing();
        let duration = timing.scale(travel_override.unwrap_or(timing.travel_ms));
        let destination = wire_destination(wire).to_string();
        let landing = self.center_of(&destination);

        let Some(live) = self.run.as_mut().and_then(|run| run.tokens.get_mut(token_id)) else {
            return;
        };
        live.token.component = destination;

        match path {
            Some(path) => {
                if let Some(start) = path.first() {
                    live.token.position = *start;
                }
                live.arrived = false;
                live.travel = Some(Travel { path: path.clone() });

                self.emit(EventPayload::TokenMoved {
                    token_id: token_id.clone(),
                    connection: wire.to_string(),
                    path,
                    duration,
                });
                self.emit(EventPayload::WireHighlighted {
                    connection: wire.to_string(),
                    duration: duration.max(timing.scale(timing.highlight_ms)),
                });
                self.timers.schedule(
                    self.now.saturating_add(duration),
                    self.generation,
                    TimerKind::Arrival {
                        token: token_id.clone(),
                    },
                );
            }
            None => {
                if let Some(point) = landing {
                    live.token.position = point;
                }
                live.arrived = true;
                live.travel = None;
            }
        }
    }

    fn arrive(&mut self, token_id: &TokenId) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let Some(live) = run.tokens.get_mut(token_id) else {
            return;
        };
        if live.arrived {
            return;
        }
        live.arrived = true;
        if let Some(end) = live.travel.take().and_then(|t| t.path.last().copied()) {
            live.token.position = end;
        }
        let component = live.token.component.clone();
        let flow = Arc::clone(&run.flow);
        let stage = run.stage;
        let timing = run.timing.clone();

        self.emit(EventPayload::ComponentHighlighted {
            component,
            kind: HighlightKind::Receive,
            duration: timing.scale(timing.highlight_ms),
        });
        self.drain_waiting(&flow, stage);
    }

    fn end_stage(&mut self, index: usize) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        if run.stage != index {
            return;
        }
        let flow = Arc::clone(&run.flow);
        let Some(stage) = flow.stages.get(index) else {
            return;
        };

        let leftovers = std::mem::take(&mut run.waiting);
        let live: BTreeSet<&str> = run.tokens.keys().map(String::as_str).collect();
        let expected: BTreeSet<&str> = stage.final_circles.iter().map(String::as_str).collect();
        let missing: Vec<&str> = expected.difference(&live).copied().collect();
        let unexpected: Vec<&str> = live.difference(&expected).copied().collect();

        for operation in &leftovers {
            tracing::warn!(
                flow = %flow.name,
                stage = %stage.name,
                operation,
                "sources never arrived before stage end, operation skipped"
            );
        }
        if !missing.is_empty() || !unexpected.is_empty() {
            tracing::warn!(
                flow = %flow.name,
                stage = %stage.name,
                ?missing,
                ?unexpected,
                "live tokens differ from the stage's final set"
            );
            self.stats.defects += 1;
        }
        self.stats.operations_skipped += leftovers.len() as u64;
        self.stats.defects += leftovers.len() as u64;

        self.state = RunState::StageComplete { stage: index };
        self.stats.stages_completed += 1;
        self.emit(EventPayload::StageCompleted {
            index,
            name: stage.name.clone(),
        });

        if index + 1 < flow.stages.len() {
            self.start_stage(index + 1);
        } else {
            self.finish();
        }
    }

    fn finish(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        self.generation += 1;
        self.timers.clear();

        for id in run.tokens.into_keys() {
            self.stats.tokens_destroyed += 1;
            self.emit(EventPayload::TokenDestroyed { token_id: id });
        }

        self.core.step();
        self.state = RunState::Done;
        self.stats.flows_completed += 1;
        tracing::info!(flow = %run.flow.name, "animation finished");
        self.emit(EventPayload::FlowCompleted {
            flow: run.flow.name.clone(),
        });
    }

    fn cancel_run(&mut self) -> Option<Arc<Flow>> {
        if !self.state.is_active() {
            return None;
        }
        self.generation += 1;
        self.timers.clear();
        self.state = RunState::Cancelled;
        self.run.take().map(|run| run.flow)
    }

    fn watchdog(&mut self) {
        let budget = self.animation.watchdog_ms;
        if let Some(flow) = self.cancel_run() {
            self.stats.flows_aborted += 1;
            tracing::warn!(flow = %flow.name, budget_ms = budget, "watchdog expired, animation aborted");
            self.emit(EventPayload::AnimationAborted {
                flow: flow.name.clone(),
                reason: format!("not finished within {} ms", budget),
            });
        }
    }
}
