//! Static checks over the shipped flow library.

use std::collections::BTreeSet;

use datapath_flow::flow::templates::{fetch_stage, DECODE, FETCH};
use datapath_flow::flow::{validate_flow, DefectKind, StageBuilder, TokenSpec};
use datapath_flow::{
    create_default_registry, DataType, Flow, FlowLibrary, InstructionFormat, OperationKind,
    PipelineStage,
};

const STAGE_ORDER: [PipelineStage; 6] = [
    PipelineStage::Fetch,
    PipelineStage::Decode,
    PipelineStage::Execute,
    PipelineStage::Memory,
    PipelineStage::WriteBack,
    PipelineStage::PcUpdate,
];

fn library() -> FlowLibrary {
    FlowLibrary::load(&create_default_registry())
}

fn all_flows() -> Vec<Flow> {
    InstructionFormat::ALL
        .into_iter()
        .flat_map(|format| format.mnemonics().iter().map(move |m| format.flow(*m)))
        .collect()
}

// ============================================================================
// Library
// ============================================================================

#[test]
fn test_library_loads_without_defects() {
    let library = library();
    assert!(library.defects().is_empty(), "{:?}", library.defects());
    assert_eq!(library.len(), 20);
    assert!(library.contains("add"));
    assert!(!library.contains("FOO"));
}

#[test]
fn test_resolve_is_case_insensitive() {
    let library = library();
    let resolution = library.resolve("  ldur ");
    assert!(!resolution.fallback);
    assert_eq!(resolution.flow.name, "LDUR");
}

#[test]
fn test_insert_reports_defects() {
    let wires = create_default_registry();
    let mut library = FlowLibrary::load(&wires);

    let broken = Flow::new(
        "BROKEN",
        vec![StageBuilder::new(FETCH, PipelineStage::Fetch, 1000)
            .merge(0, &["ghost"], "PC", TokenSpec::new("x", "?", DataType::Address))
            .finals(&["x"])
            .build()],
    );
    let defects = library.insert("BROKEN", broken, &wires);

    assert!(defects
        .iter()
        .any(|d| d.kind == DefectKind::MissingProducer { token: "ghost".to_string() }));
    assert!(library.contains("broken"));
    assert_eq!(library.defects().len(), defects.len());
}

// ============================================================================
// Shape
// ============================================================================

#[test]
fn test_every_flow_has_six_stages_in_order() {
    for flow in all_flows() {
        let kinds: Vec<PipelineStage> = flow.stages.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, STAGE_ORDER, "{}", flow.name);
        assert_eq!(flow.stages[0].name, FETCH);
        assert_eq!(flow.stages[1].name, DECODE);
        assert_eq!(flow.stages[0], fetch_stage());
    }
}

#[test]
fn test_stage_handoff_matches() {
    for flow in all_flows() {
        assert!(flow.stages[0].initial_circles.is_empty());
        for pair in flow.stages.windows(2) {
            let before: BTreeSet<_> = pair[0].final_circles.iter().collect();
            let after: BTreeSet<_> = pair[1].initial_circles.iter().collect();
            assert_eq!(before, after, "{}: {} -> {}", flow.name, pair[0].name, pair[1].name);
        }
    }
}

#[test]
fn test_operation_timings_fit_their_stage() {
    for flow in all_flows() {
        for stage in &flow.stages {
            for op in &stage.operations {
                assert!(op.timing <= stage.duration, "{} / {}", flow.name, stage.name);
            }
        }
    }
}

#[test]
fn test_flow_wires_belong_to_their_stage() {
    let wires = create_default_registry();
    for flow in all_flows() {
        for stage in &flow.stages {
            for name in stage.operations.iter().flat_map(|op| op.wire_names()) {
                let connection = wires.resolve(name).unwrap();
                assert!(
                    connection.stage == stage.kind || connection.stage == PipelineStage::ControlSignals,
                    "{}: {} is {} in {}",
                    flow.name,
                    name,
                    connection.stage,
                    stage.kind
                );
            }
        }
    }
}

#[test]
fn test_total_durations() {
    let library = library();
    let total = |m: &str| library.resolve(m).flow.total_duration();
    assert_eq!(total("ADD"), 12_500);
    assert_eq!(total("ADDI"), 11_500);
    assert_eq!(total("LDUR"), 13_000);
    assert_eq!(total("STUR"), 12_000);
    assert_eq!(total("B"), 12_000);
}

#[test]
fn test_store_never_writes_registers() {
    let library = library();
    let flow = library.resolve("STUR").flow;
    let write_back = flow.stage(PipelineStage::WriteBack).unwrap();
    assert!(write_back
        .operations
        .iter()
        .all(|op| op.target_component != "RegFile"));
}

#[test]
fn test_add_has_no_branch_target() {
    let library = library();
    let flow = library.resolve("ADD").flow;
    let produced: Vec<&str> = flow
        .stages
        .iter()
        .flat_map(|s| s.operations.iter())
        .flat_map(|op| op.produced_ids())
        .map(String::as_str)
        .collect();
    assert!(!produced.contains(&"branch_target"));
    assert_eq!(produced.iter().filter(|id| **id == "alu_result").count(), 1);

    let pc_update = flow.stage(PipelineStage::PcUpdate).unwrap();
    assert_eq!(pc_update.operations.len(), 1);
    assert_eq!(pc_update.operations[0].kind, OperationKind::Move);
}

#[test]
fn test_unregistered_wire_is_reported() {
    let mut wires = create_default_registry();
    let flow = InstructionFormat::R.flow("ADD");
    assert!(validate_flow(&flow, &wires).is_empty());

    wires.unregister("MuxPC->PC");
    let defects = validate_flow(&flow, &wires);
    assert_eq!(defects.len(), 1);
    assert_eq!(
        defects[0].kind,
        DefectKind::UnknownWire { wire: "MuxPC->PC".to_string() }
    );
}
