//! End-to-end animation scenarios.
//!
//! Each test drives a full flow on the virtual clock and checks the emitted
//! event stream:
//! - R-format, store and branch flows
//! - Fallback for unknown mnemonics
//! - Layouts with a component missing
//! - Shared wire segments while tokens are in flight
//! - Determinism and listener delivery

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use datapath_flow::component::Layout;
use datapath_flow::{
    ComponentRegistry, CpuCore, EngineConfig, EventPayload, FlowLibrary, Orchestrator, RunState,
    SnapshotCore, VisualEvent, create_default_registry,
};

// ============================================================================
// Helpers
// ============================================================================

fn run<C: CpuCore>(orchestrator: &mut Orchestrator<C>) -> Vec<VisualEvent> {
    while let Some(deadline) = orchestrator.next_deadline() {
        orchestrator.advance_to(deadline);
    }
    orchestrator.drain_events()
}

fn play(instruction: &str) -> (Orchestrator<SnapshotCore>, Vec<VisualEvent>) {
    let core = SnapshotCore::with_instruction(instruction)
        .set_pc(0x400)
        .set_register(2, 5)
        .set_register(3, 7)
        .set_value("alu_result", "12");
    let mut orchestrator = Orchestrator::standard(core);
    orchestrator.start(0).unwrap();
    let events = run(&mut orchestrator);
    (orchestrator, events)
}

/// Events emitted while stage `index` was running.
fn stage_events(events: &[VisualEvent], index: usize) -> &[VisualEvent] {
    let start = events
        .iter()
        .position(|e| matches!(e.payload, EventPayload::StageStarted { index: i, .. } if i == index))
        .unwrap();
    let end = events
        .iter()
        .position(|e| matches!(e.payload, EventPayload::StageCompleted { index: i, .. } if i == index))
        .unwrap();
    &events[start + 1..end]
}

/// Replays token lifetimes from the event stream and checks that every
/// referenced token is live at that point. Returns the tokens still live at
/// the end.
fn replay_lifetimes(events: &[VisualEvent]) -> BTreeSet<String> {
    let mut live = BTreeSet::new();
    for event in events {
        match &event.payload {
            EventPayload::TokenCreated { token } => {
                assert!(live.insert(token.id.clone()), "{} created twice", token.id);
            }
            EventPayload::TokenMoved { token_id, .. } => {
                assert!(live.contains(token_id), "{} moved while not live", token_id);
            }
            EventPayload::TokenTransformed { source_id, token } => {
                assert!(live.remove(source_id), "{} transformed while not live", source_id);
                live.insert(token.id.clone());
            }
            EventPayload::TokensMerged { sources, result } => {
                for id in sources {
                    assert!(live.remove(id), "{} merged while not live", id);
                }
                live.insert(result.id.clone());
            }
            EventPayload::TokenDestroyed { token_id } => {
                assert!(live.remove(token_id), "{} destroyed while not live", token_id);
            }
            _ => {}
        }
    }
    live
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_add_flow() {
    let (orchestrator, events) = play("ADD X1, X2, X3");

    assert_eq!(orchestrator.state(), RunState::Done);
    assert_eq!(orchestrator.core().steps, 1);
    assert_eq!(orchestrator.stats().defects, 0);
    assert_eq!(orchestrator.stats().invariant_violations, 0);

    // Exactly one ALU result appears in EX, at the main ALU.
    let execute = stage_events(&events, 2);
    let results: Vec<_> = execute
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::TokensMerged { result, .. } if result.id == "alu_result" => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].component, "ALUMain");
    assert_eq!(results[0].data_value, "12");

    // WB merges result, destination index and RegWrite at the register file.
    let write_back = stage_events(&events, 4);
    let merge = write_back
        .iter()
        .find_map(|e| match &e.payload {
            EventPayload::TokensMerged { sources, result } => Some((sources, result)),
            _ => None,
        })
        .unwrap();
    assert_eq!(merge.0, &vec!["alu_result", "rd_idx", "sig_regwrite"]);
    assert_eq!(merge.1.component, "RegFile");
    assert_eq!(merge.1.data_value, "X1=12");

    // The PC stage is a single move of PC+4 back into the PC.
    let pc_update = stage_events(&events, 5);
    let moves: Vec<_> = pc_update
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::TokenMoved { token_id, connection, .. } => Some((token_id.as_str(), connection.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(moves, vec![("pc_plus4", "MuxPC->PC")]);

    assert!(matches!(
        events.last().unwrap().payload,
        EventPayload::FlowCompleted { ref flow } if flow == "ADD"
    ));
}

#[test]
fn test_fetch_labels_use_cpu_state() {
    let (_, events) = play("ADD X1, X2, X3");

    let created: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::TokenCreated { token } if token.id == "pc_addr" => Some(token.data_value.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(created, vec!["0x400"]);

    let pc_plus4 = events.iter().find_map(|e| match &e.payload {
        EventPayload::TokenTransformed { token, .. } if token.id == "pc_plus4" => Some(token.data_value.clone()),
        _ => None,
    });
    assert_eq!(pc_plus4.as_deref(), Some("0x404"));
}

#[test]
fn test_store_write_back_is_empty() {
    let (orchestrator, events) = play("STUR X5, [X6, #16]");

    assert_eq!(orchestrator.state(), RunState::Done);
    assert_eq!(orchestrator.stats().defects, 0);

    let write_back = stage_events(&events, 4);
    assert!(write_back.is_empty(), "unexpected events: {:?}", write_back);

    // Stage 4 starts and completes after its full nominal duration.
    let started = events
        .iter()
        .find(|e| matches!(e.payload, EventPayload::StageStarted { index: 4, .. }))
        .unwrap();
    let completed = events
        .iter()
        .find(|e| matches!(e.payload, EventPayload::StageCompleted { index: 4, .. }))
        .unwrap();
    assert_eq!(completed.time - started.time, 1000);
}

#[test]
fn test_unconditional_branch_updates_pc_through_mux() {
    let (orchestrator, events) = play("B #16");

    assert_eq!(orchestrator.state(), RunState::Done);
    assert_eq!(orchestrator.stats().defects, 0);

    let pc_update = stage_events(&events, 5);
    let last_move = pc_update
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::TokenMoved { token_id, connection, .. } => Some((token_id.clone(), connection.clone())),
            _ => None,
        })
        .last();
    assert_eq!(last_move, Some(("next_pc".to_string(), "MuxPC->PC".to_string())));
}

#[test]
fn test_unknown_mnemonic_falls_back() {
    let mut orchestrator = Orchestrator::standard(SnapshotCore::with_instruction("FOO X1"));
    let resolution = orchestrator.start(0).unwrap();
    assert!(resolution.fallback);
    assert_eq!(resolution.flow.name, "ADD");

    let events = run(&mut orchestrator);
    assert_eq!(orchestrator.state(), RunState::Done);

    // Same shape as a genuine ADD run.
    let (_, add_events) = play("ADD X1, X2, X3");
    assert_eq!(events.len(), add_events.len());
}

#[test]
fn test_missing_component_still_completes() {
    let mut layout = Layout::standard(1.0);
    layout.remove_rect("DataMemory");

    let config = EngineConfig::default();
    let wires = create_default_registry();
    let flows = FlowLibrary::load(&wires);
    let mut orchestrator = Orchestrator::new(
        SnapshotCore::with_instruction("STUR X1, [X2, #8]"),
        Arc::new(ComponentRegistry::new(layout)),
        Arc::new(wires),
        Arc::new(flows),
        &config,
    );
    orchestrator.start(0).unwrap();
    let events = run(&mut orchestrator);

    assert_eq!(orchestrator.state(), RunState::Done);
    assert_eq!(orchestrator.core().steps, 1);
    assert_eq!(orchestrator.stats().defects, 0);
    assert!(replay_lifetimes(&events).is_empty());

    // Nothing is drawn towards the absent memory.
    assert!(!events.iter().any(|e| matches!(
        &e.payload,
        EventPayload::TokenMoved { connection, .. } if connection.ends_with("->DataMemory")
    )));
}

#[test]
fn test_decode_fan_out_shares_the_instruction_bus() {
    let mut orchestrator = Orchestrator::standard(SnapshotCore::with_instruction("ADD X1, X2, X3"));
    orchestrator.start(0).unwrap();
    while orchestrator.state() != (RunState::StageRunning { stage: 1 }) {
        let deadline = orchestrator.next_deadline().unwrap();
        orchestrator.advance_to(deadline);
    }
    let decode_start = orchestrator.now();
    orchestrator.advance_to(decode_start + 100);

    let shared = orchestrator.shared_segments();
    assert!(!shared.is_empty());
    assert!(shared.iter().any(|s| {
        let pair: BTreeSet<&str> = [s.tokens.0.as_str(), s.tokens.1.as_str()].into();
        pair == BTreeSet::from(["rd_idx", "rn_idx"])
    }));
}

#[test]
fn test_shared_segment_queries_leave_events_unchanged() {
    let (_, expected) = play("ADD X1, X2, X3");

    let core = SnapshotCore::with_instruction("ADD X1, X2, X3")
        .set_pc(0x400)
        .set_register(2, 5)
        .set_register(3, 7)
        .set_value("alu_result", "12");
    let mut orchestrator = Orchestrator::standard(core);
    orchestrator.start(0).unwrap();
    let mut queried = 0;
    while let Some(deadline) = orchestrator.next_deadline() {
        orchestrator.advance_to(deadline);
        queried += orchestrator.shared_segments().len();
    }

    assert!(queried > 0);
    assert_eq!(orchestrator.drain_events(), expected);
}

#[test]
fn test_every_flow_keeps_token_lifetimes_consistent() {
    let wires = create_default_registry();
    let flows = FlowLibrary::load(&wires);

    for mnemonic in flows.mnemonics() {
        let (orchestrator, events) = play(&format!("{} X1, X2, X3", mnemonic));
        assert_eq!(orchestrator.state(), RunState::Done, "{}", mnemonic);
        assert_eq!(orchestrator.stats().invariant_violations, 0, "{}", mnemonic);
        assert!(replay_lifetimes(&events).is_empty(), "{} leaked tokens", mnemonic);
    }
}

#[test]
fn test_events_are_time_ordered() {
    let (_, events) = play("LDUR X1, [X2, #8]");
    for pair in events.windows(2) {
        assert!(pair[0].time <= pair[1].time);
        assert!(pair[0].seq < pair[1].seq);
    }
}

#[test]
fn test_replay_is_deterministic() {
    let (_, first) = play("CBZ X1, #8");
    let (_, second) = play("CBZ X1, #8");
    assert_eq!(first, second);
}

#[test]
fn test_listener_sees_every_event() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let mut orchestrator = Orchestrator::standard(SnapshotCore::with_instruction("ADDI X1, X2, #4"));
    orchestrator.subscribe(move |event: &VisualEvent| sink.lock().push(event.clone()));
    orchestrator.start(0).unwrap();
    let buffered = run(&mut orchestrator);

    assert_eq!(*seen.lock(), buffered);
    assert_eq!(orchestrator.stats().events_emitted as usize, buffered.len());
}

#[test]
fn test_listener_without_buffer() {
    let count = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&count);

    let mut orchestrator = Orchestrator::standard(SnapshotCore::with_instruction("SUB X1, X2, X3"));
    orchestrator.set_buffering(false);
    orchestrator.subscribe(move |_: &VisualEvent| *sink.lock() += 1);
    orchestrator.start(0).unwrap();
    assert!(run(&mut orchestrator).is_empty());
    assert!(*count.lock() > 0);
}

#[test]
fn test_back_to_back_runs_step_core_each_time() {
    let mut orchestrator = Orchestrator::standard(SnapshotCore::with_instruction("ADD X1, X2, X3"));
    for expected in 1..=3 {
        let now = orchestrator.now();
        orchestrator.start(now).unwrap();
        run(&mut orchestrator);
        assert_eq!(orchestrator.core().steps, expected);
    }
    assert_eq!(orchestrator.core().pc, 12);
    assert_eq!(orchestrator.stats().flows_completed, 3);
}
