//! Hand-authored wiring of the standard LEGv8 single-cycle datapath.
//!
//! Each entry names its two endpoint ports and the explicit runs it takes.
//! Runs only reference the endpoints' own edges or shared vertical routing
//! lines, so wires stay clear of unrelated units and parallel wires line up.

use crate::component::Side;
use crate::component::Side::{Bottom, Left, Right, Top};
use crate::wire::route::{Coord, Edge, Port, Route};
use crate::wire::PipelineStage::{
    ControlSignals, Decode, Execute, Fetch, Memory, PcUpdate, WriteBack,
};
use crate::wire::WireConnection;

fn route(from: (&str, Side, f64), to: (&str, Side, f64)) -> Route {
    Route::new(
        Port::at(from.0, from.1, from.2),
        Port::at(to.0, to.1, to.2),
    )
}

fn line(name: &str) -> Coord {
    Coord::line(name)
}

/// Returns every connection of the standard datapath.
pub fn standard_connections() -> Vec<WireConnection> {
    let routes = vec![
        // Instruction fetch
        (
            Fetch,
            route(("PC", Right, 0.5), ("InstructionMemory", Left, 0.5)).horizontal(line("pc_out")),
        ),
        (Fetch, route(("PC", Top, 0.5), ("ALUPC", Left, 0.3))),
        (
            Fetch,
            route(("ALUPC", Right, 0.5), ("MuxPC", Left, 0.3)).horizontal(line("pc4_out")),
        ),
        // Instruction bus fan-out
        (
            Decode,
            route(("InstructionMemory", Right, 0.5), ("Control", Left, 0.5))
                .horizontal(line("instr_bus")),
        ),
        (
            Decode,
            route(("InstructionMemory", Right, 0.5), ("RegFile", Left, 0.15))
                .horizontal(line("instr_bus")),
        ),
        (
            Decode,
            route(("InstructionMemory", Right, 0.5), ("MuxReg2Loc", Left, 0.25))
                .horizontal(line("instr_bus")),
        ),
        (
            Decode,
            route(("InstructionMemory", Right, 0.5), ("SignExtend", Left, 0.5))
                .horizontal(line("instr_bus")),
        ),
        (
            Decode,
            route(("InstructionMemory", Right, 0.5), ("ALUControl", Bottom, 0.5))
                .horizontal(line("instr_bus"))
                .vertical(Coord::dst(Edge::Bottom, 25.0)),
        ),
        // Operand fetch and execute
        (Execute, route(("MuxReg2Loc", Right, 0.5), ("RegFile", Left, 0.55))),
        (
            Execute,
            route(("RegFile", Right, 0.2), ("ALUMain", Left, 0.2)).horizontal(line("rd1")),
        ),
        (
            Execute,
            route(("RegFile", Right, 0.6), ("MuxALUSrc", Left, 0.3)).horizontal(line("rd2")),
        ),
        (
            Execute,
            route(("SignExtend", Right, 0.5), ("MuxALUSrc", Left, 0.75))
                .horizontal(line("imm_bus")),
        ),
        (
            Execute,
            route(("SignExtend", Right, 0.5), ("ShiftLeft2", Left, 0.5))
                .horizontal(line("imm_bus")),
        ),
        (
            Execute,
            route(("MuxALUSrc", Right, 0.5), ("ALUMain", Left, 0.7)).horizontal(line("alu_b")),
        ),
        (Execute, route(("ALUControl", Right, 0.5), ("ALUMain", Bottom, 0.5))),
        (
            Execute,
            route(("ShiftLeft2", Right, 0.5), ("ALUBranch", Left, 0.85))
                .horizontal(line("sl2_out")),
        ),
        (
            Execute,
            route(("PC", Right, 0.25), ("ALUBranch", Left, 0.25))
                .horizontal(line("pc_tap"))
                .vertical(Coord::dst(Edge::Top, -20.0))
                .horizontal(line("branch_pc_in")),
        ),
        // Memory access
        (
            Memory,
            route(("ALUMain", Right, 0.5), ("DataMemory", Left, 0.3)).horizontal(line("alu_out")),
        ),
        (
            Memory,
            route(("ALUMain", Right, 0.5), ("MuxMemToReg", Left, 0.75))
                .horizontal(line("alu_out"))
                .vertical(Coord::src(Edge::Bottom, 45.0))
                .horizontal(line("wb_mux_in")),
        ),
        (
            Memory,
            route(("RegFile", Right, 0.6), ("DataMemory", Left, 0.85))
                .horizontal(line("store_data"))
                .vertical(Coord::src(Edge::Bottom, 20.0))
                .horizontal(line("dm_in")),
        ),
        (
            Memory,
            route(("DataMemory", Right, 0.3), ("MuxMemToReg", Left, 0.25))
                .horizontal(line("dm_out")),
        ),
        // Write-back
        (
            WriteBack,
            route(("MuxMemToReg", Right, 0.5), ("RegFile", Left, 0.85))
                .horizontal(line("wb_out"))
                .vertical(Coord::dst(Edge::Bottom, 160.0))
                .horizontal(line("wb_return")),
        ),
        // Next PC selection
        (
            PcUpdate,
            route(("MuxPC", Right, 0.5), ("PC", Left, 0.5))
                .horizontal(line("pc_loop"))
                .vertical(Coord::src(Edge::Top, -25.0))
                .horizontal(line("pc_feedback")),
        ),
        (
            PcUpdate,
            route(("ALUBranch", Right, 0.5), ("MuxPC", Left, 0.7))
                .horizontal(line("branch_target")),
        ),
        (
            PcUpdate,
            route(("ALUMain", Right, 0.2), ("ZeroAND", Left, 0.75)).horizontal(line("alu_zero")),
        ),
        (
            PcUpdate,
            route(("ZeroAND", Right, 0.5), ("BranchOR", Left, 0.75)).horizontal(line("and_out")),
        ),
        (PcUpdate, route(("BranchOR", Right, 0.5), ("MuxPC", Bottom, 0.5))),
        // Control signals
        (ControlSignals, route(("Control", Bottom, 0.2), ("MuxReg2Loc", Top, 0.5))),
        (ControlSignals, route(("Control", Bottom, 0.7), ("RegFile", Top, 0.5))),
        (
            ControlSignals,
            route(("Control", Right, 0.4), ("MuxALUSrc", Top, 0.5))
                .horizontal(line("ctl_alusrc"))
                .vertical(Coord::dst(Edge::Top, -15.0)),
        ),
        (
            ControlSignals,
            route(("Control", Right, 0.6), ("ALUControl", Left, 0.5))
                .horizontal(line("ctl_aluop")),
        ),
        (ControlSignals, route(("Control", Right, 0.7), ("DataMemory", Top, 0.5))),
        (ControlSignals, route(("Control", Right, 0.8), ("MuxMemToReg", Top, 0.5))),
        (
            ControlSignals,
            route(("Control", Right, 0.5), ("ZeroAND", Left, 0.25))
                .horizontal(line("ctl_branch")),
        ),
        (
            ControlSignals,
            route(("Control", Right, 0.1), ("BranchOR", Left, 0.25))
                .vertical(Coord::src(Edge::Top, -15.0))
                .horizontal(line("uncond_drop")),
        ),
    ];

    routes
        .into_iter()
        .map(|(stage, route)| WireConnection::between(stage, route))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Layout;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let connections = standard_connections();
        let names: HashSet<_> = connections.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names.len(), connections.len());
    }

    #[test]
    fn test_all_routes_compute_on_standard_layout() {
        let layout = Layout::standard(1.0);
        for conn in standard_connections() {
            let points = conn.compute(&layout).unwrap();
            assert!(points.len() >= 2, "{} too short", conn.name);
        }
    }

    #[test]
    fn test_routes_are_manhattan() {
        let layout = Layout::standard(1.0);
        for conn in standard_connections() {
            let points = conn.compute(&layout).unwrap();
            for pair in points.windows(2) {
                let horizontal = (pair[0].y - pair[1].y).abs() < 1e-9;
                let vertical = (pair[0].x - pair[1].x).abs() < 1e-9;
                assert!(horizontal || vertical, "{} has a diagonal segment", conn.name);
            }
        }
    }

    #[test]
    fn test_every_stage_has_wires() {
        let stages: HashSet<_> = standard_connections().iter().map(|c| c.stage).collect();
        assert_eq!(stages.len(), 7);
    }
}
