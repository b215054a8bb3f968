//! Per-format flow templates.
//!
//! Every flow starts with the universal fetch and decode stages. The
//! remaining four stages depend only on the instruction format, so one
//! template per format covers every supported mnemonic.

use serde::{Deserialize, Serialize};

use crate::flow::{Flow, Stage, StageBuilder, TokenSpec};
use crate::token::DataType;
use crate::types::Millis;
use crate::wire::PipelineStage;

pub const FETCH: &str = "Instruction Fetch";
pub const DECODE: &str = "Instruction Decode";
pub const EXECUTE: &str = "Execute";
pub const MEMORY: &str = "Memory Access";
pub const WRITE_BACK: &str = "Write Back";
pub const PC_UPDATE: &str = "PC Update";

/// LEGv8 instruction formats with distinct datapath behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstructionFormat {
    /// Register-register ALU operations.
    R,
    /// Register-immediate ALU operations.
    I,
    /// Loads.
    DLoad,
    /// Stores.
    DStore,
    /// Unconditional branch.
    B,
    /// Compare and branch.
    CB,
}

impl InstructionFormat {
    pub const ALL: [InstructionFormat; 6] = [
        InstructionFormat::R,
        InstructionFormat::I,
        InstructionFormat::DLoad,
        InstructionFormat::DStore,
        InstructionFormat::B,
        InstructionFormat::CB,
    ];

    /// Mnemonics animated with this format's template.
    pub fn mnemonics(self) -> &'static [&'static str] {
        match self {
            InstructionFormat::R => &["ADD", "SUB", "AND", "ORR", "EOR", "ADDS", "SUBS", "ANDS"],
            InstructionFormat::I => &["ADDI", "SUBI", "ANDI", "ORRI", "EORI", "ADDIS", "SUBIS"],
            InstructionFormat::DLoad => &["LDUR"],
            InstructionFormat::DStore => &["STUR"],
            InstructionFormat::B => &["B"],
            InstructionFormat::CB => &["CBZ", "CBNZ"],
        }
    }

    /// Finds the format of `mnemonic`, ignoring case.
    pub fn of(mnemonic: &str) -> Option<Self> {
        let upper = mnemonic.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|format| format.mnemonics().contains(&upper.as_str()))
    }

    /// Instantiates the full flow for one mnemonic of this format.
    pub fn flow(self, name: impl Into<String>) -> Flow {
        let mut stages = vec![fetch_stage(), decode_stage()];
        stages.extend(match self {
            InstructionFormat::R => r_format(),
            InstructionFormat::I => i_format(),
            InstructionFormat::DLoad => load_format(),
            InstructionFormat::DStore => store_format(),
            InstructionFormat::B => branch_format(),
            InstructionFormat::CB => compare_branch_format(),
        });
        Flow::new(name, stages)
    }
}

fn token(id: &str, value: &str, data_type: DataType) -> TokenSpec {
    TokenSpec::new(id, value, data_type)
}

fn signal(id: &str, value: &str, wire: &str) -> TokenSpec {
    TokenSpec::new(id, value, DataType::ControlSignal).via(wire)
}

/// Reads PC, fetches the instruction and computes PC+4.
pub fn fetch_stage() -> Stage {
    StageBuilder::new(FETCH, PipelineStage::Fetch, 2000)
        .initial(&[])
        .split(
            0,
            "PC",
            None,
            vec![
                token("pc_addr", "{pc}", DataType::Address).via("PC->InstructionMemory"),
                token("pc_inc", "{pc}", DataType::Address).via("PC->ALUPC"),
            ],
        )
        .transform(
            1000,
            "pc_addr",
            "InstructionMemory",
            token("instruction", "{instruction}", DataType::Instruction),
        )
        .transform(1000, "pc_inc", "ALUPC", token("pc_plus4", "{pc_plus4}", DataType::Address))
        .moves(1000, "pc_plus4", "ALUPC->MuxPC")
        .finals(&["instruction", "pc_plus4"])
        .build()
}

/// Splits the instruction word into its fields.
pub fn decode_stage() -> Stage {
    StageBuilder::new(DECODE, PipelineStage::Decode, 2000)
        .initial(&["instruction", "pc_plus4"])
        .split(
            0,
            "InstructionMemory",
            Some("instruction"),
            vec![
                token("opcode", "{opcode}", DataType::Opcode).via("InstructionMemory->Control"),
                token("rn_idx", "X{rn}", DataType::RegisterIndex).via("InstructionMemory->RegFile"),
                token("rm_idx", "X{rm}", DataType::RegisterIndex)
                    .via("InstructionMemory->MuxReg2Loc"),
                token("rd_idx", "X{rd}", DataType::RegisterIndex).via("InstructionMemory->RegFile"),
                token("imm_raw", "{imm}", DataType::Immediate).via("InstructionMemory->SignExtend"),
                token("funct", "{opcode}", DataType::Opcode).via("InstructionMemory->ALUControl"),
            ],
        )
        .transform(1000, "opcode", "Control", token("ctrl", "{control}", DataType::ControlSignal))
        .transform(1000, "imm_raw", "SignExtend", token("imm", "#{imm}", DataType::Immediate))
        .finals(&["pc_plus4", "ctrl", "rn_idx", "rm_idx", "rd_idx", "imm", "funct"])
        .build()
}

/// Stages after the ALU result exists: forward it through the write-back mux
/// into the register file, then take PC+4. `extra` names tokens left over from
/// earlier stages that simply stay put.
fn alu_write_back(extra: &[&str]) -> Vec<Stage> {
    let after_ex: Vec<&str> = ["pc_plus4", "rd_idx", "sig_regwrite", "alu_result"]
        .into_iter()
        .chain(extra.iter().copied())
        .collect();
    let after_wb: Vec<&str> = ["pc_plus4", "reg_written"]
        .into_iter()
        .chain(extra.iter().copied())
        .collect();

    vec![
        StageBuilder::new(MEMORY, PipelineStage::Memory, 1500)
            .initial(&after_ex)
            .moves(0, "alu_result", "ALUMain->MuxMemToReg")
            .finals(&after_ex)
            .build(),
        StageBuilder::new(WRITE_BACK, PipelineStage::WriteBack, 2000)
            .initial(&after_ex)
            .moves(0, "alu_result", "MuxMemToReg->RegFile")
            .merge(
                1000,
                &["alu_result", "rd_idx", "sig_regwrite"],
                "RegFile",
                token("reg_written", "X{rd}={alu_result}", DataType::RegisterValue),
            )
            .finals(&after_wb)
            .build(),
        sequential_pc(&after_wb),
    ]
}

fn sequential_pc(live: &[&str]) -> Stage {
    StageBuilder::new(PC_UPDATE, PipelineStage::PcUpdate, 1000)
        .initial(live)
        .moves(0, "pc_plus4", "MuxPC->PC")
        .finals(live)
        .build()
}

fn idle(name: &str, kind: PipelineStage, duration: Millis, live: &[&str]) -> Stage {
    StageBuilder::new(name, kind, duration)
        .initial(live)
        .finals(live)
        .build()
}

const DECODED: [&str; 7] = ["pc_plus4", "ctrl", "rn_idx", "rm_idx", "rd_idx", "imm", "funct"];

fn r_format() -> Vec<Stage> {
    let execute = StageBuilder::new(EXECUTE, PipelineStage::Execute, 4000)
        .initial(&DECODED)
        .split(
            0,
            "Control",
            Some("ctrl"),
            vec![
                signal("sig_reg2loc", "Reg2Loc={reg2loc}", "Control->MuxReg2Loc"),
                signal("sig_alusrc", "ALUSrc={alusrc}", "Control->MuxALUSrc"),
                signal("sig_aluop", "ALUOp={aluop}", "Control->ALUControl"),
                signal("sig_regwrite", "RegWrite={regwrite}", "Control->RegFile"),
            ],
        )
        .transform(0, "rn_idx", "RegFile", token("rn_val", "{reg:rn}", DataType::RegisterValue))
        .moves(0, "imm", "SignExtend->MuxALUSrc")
        .merge(
            1000,
            &["rm_idx", "sig_reg2loc"],
            "MuxReg2Loc",
            token("reg2_idx", "X{rm}", DataType::RegisterIndex),
        )
        .merge(
            1000,
            &["funct", "sig_aluop"],
            "ALUControl",
            token("alu_op", "{alu_operation}", DataType::ControlSignal),
        )
        .moves(1000, "reg2_idx", "MuxReg2Loc->RegFile")
        .moves(1000, "rn_val", "RegFile->ALUMain")
        .moves(1000, "alu_op", "ALUControl->ALUMain")
        .transform(1900, "reg2_idx", "RegFile", token("rm_val", "{reg:rm}", DataType::RegisterValue))
        .moves(1900, "rm_val", "RegFile->MuxALUSrc")
        .merge(
            2800,
            &["rm_val", "imm", "sig_alusrc"],
            "MuxALUSrc",
            token("alu_b", "{reg:rm}", DataType::RegisterValue),
        )
        .moves(2800, "alu_b", "MuxALUSrc->ALUMain")
        .merge(
            3700,
            &["rn_val", "alu_b", "alu_op"],
            "ALUMain",
            token("alu_result", "{alu_result}", DataType::AluResult),
        )
        .finals(&["pc_plus4", "rd_idx", "sig_regwrite", "alu_result"])
        .build();

    let mut stages = vec![execute];
    stages.extend(alu_write_back(&[]));
    stages
}

/// Shared execute stage of the formats that add an immediate to a base
/// register. `signals` are the control lines leaving the control unit besides
/// ALUSrc and ALUOp; `result` names the ALU output.
fn immediate_execute(signals: Vec<TokenSpec>, result: TokenSpec, finals: &[&str]) -> Stage {
    let mut outputs = vec![
        signal("sig_alusrc", "ALUSrc={alusrc}", "Control->MuxALUSrc"),
        signal("sig_aluop", "ALUOp={aluop}", "Control->ALUControl"),
    ];
    outputs.extend(signals);

    StageBuilder::new(EXECUTE, PipelineStage::Execute, 3000)
        .initial(&DECODED)
        .split(0, "Control", Some("ctrl"), outputs)
        .transform(0, "rn_idx", "RegFile", token("rn_val", "{reg:rn}", DataType::RegisterValue))
        .moves(0, "imm", "SignExtend->MuxALUSrc")
        .merge(
            1000,
            &["funct", "sig_aluop"],
            "ALUControl",
            token("alu_op", "{alu_operation}", DataType::ControlSignal),
        )
        .merge(1000, &["imm", "sig_alusrc"], "MuxALUSrc", token("alu_b", "#{imm}", DataType::Immediate))
        .moves(1000, "rn_val", "RegFile->ALUMain")
        .moves(1000, "alu_op", "ALUControl->ALUMain")
        .moves(1000, "alu_b", "MuxALUSrc->ALUMain")
        .merge(2000, &["rn_val", "alu_b", "alu_op"], "ALUMain", result)
        .finals(finals)
        .build()
}

fn i_format() -> Vec<Stage> {
    let execute = immediate_execute(
        vec![signal("sig_regwrite", "RegWrite={regwrite}", "Control->RegFile")],
        token("alu_result", "{alu_result}", DataType::AluResult),
        &["pc_plus4", "rm_idx", "rd_idx", "sig_regwrite", "alu_result"],
    );

    let mut stages = vec![execute];
    stages.extend(alu_write_back(&["rm_idx"]));
    stages
}

fn load_format() -> Vec<Stage> {
    let after_ex = [
        "pc_plus4",
        "rm_idx",
        "rd_idx",
        "sig_memread",
        "sig_memtoreg",
        "sig_regwrite",
        "mem_addr",
    ];
    let execute = immediate_execute(
        vec![
            signal("sig_memread", "MemRead={memread}", "Control->DataMemory"),
            signal("sig_memtoreg", "MemToReg={memtoreg}", "Control->MuxMemToReg"),
            signal("sig_regwrite", "RegWrite={regwrite}", "Control->RegFile"),
        ],
        token("mem_addr", "{alu_result}", DataType::Address),
        &after_ex,
    );

    let after_mem = ["pc_plus4", "rm_idx", "rd_idx", "sig_regwrite", "wb_data"];
    let memory = StageBuilder::new(MEMORY, PipelineStage::Memory, 3000)
        .initial(&after_ex)
        .moves(0, "mem_addr", "ALUMain->DataMemory")
        .merge(
            1000,
            &["mem_addr", "sig_memread"],
            "DataMemory",
            token("mem_data", "{mem_data}", DataType::MemoryData),
        )
        .moves(1000, "mem_data", "DataMemory->MuxMemToReg")
        .merge(
            2000,
            &["mem_data", "sig_memtoreg"],
            "MuxMemToReg",
            token("wb_data", "{mem_data}", DataType::MemoryData),
        )
        .finals(&after_mem)
        .build();

    let after_wb = ["pc_plus4", "rm_idx", "reg_written"];
    let write_back = StageBuilder::new(WRITE_BACK, PipelineStage::WriteBack, 2000)
        .initial(&after_mem)
        .moves(0, "wb_data", "MuxMemToReg->RegFile")
        .merge(
            1000,
            &["wb_data", "rd_idx", "sig_regwrite"],
            "RegFile",
            token("reg_written", "X{rd}={mem_data}", DataType::RegisterValue),
        )
        .finals(&after_wb)
        .build();

    vec![execute, memory, write_back, sequential_pc(&after_wb)]
}

fn store_format() -> Vec<Stage> {
    let after_ex = ["pc_plus4", "rd_idx", "sig_memwrite", "store_val", "mem_addr"];
    let execute = StageBuilder::new(EXECUTE, PipelineStage::Execute, 3000)
        .initial(&DECODED)
        .split(
            0,
            "Control",
            Some("ctrl"),
            vec![
                signal("sig_reg2loc", "Reg2Loc={reg2loc}", "Control->MuxReg2Loc"),
                signal("sig_alusrc", "ALUSrc={alusrc}", "Control->MuxALUSrc"),
                signal("sig_aluop", "ALUOp={aluop}", "Control->ALUControl"),
                signal("sig_memwrite", "MemWrite={memwrite}", "Control->DataMemory"),
            ],
        )
        .transform(0, "rn_idx", "RegFile", token("rn_val", "{reg:rn}", DataType::RegisterValue))
        .moves(0, "imm", "SignExtend->MuxALUSrc")
        .merge(
            1000,
            &["rm_idx", "sig_reg2loc"],
            "MuxReg2Loc",
            token("reg2_idx", "X{rt}", DataType::RegisterIndex),
        )
        .merge(
            1000,
            &["funct", "sig_aluop"],
            "ALUControl",
            token("alu_op", "{alu_operation}", DataType::ControlSignal),
        )
        .merge(1000, &["imm", "sig_alusrc"], "MuxALUSrc", token("alu_b", "#{imm}", DataType::Immediate))
        .moves(1000, "reg2_idx", "MuxReg2Loc->RegFile")
        .moves(1000, "rn_val", "RegFile->ALUMain")
        .moves(1000, "alu_op", "ALUControl->ALUMain")
        .moves(1000, "alu_b", "MuxALUSrc->ALUMain")
        .transform(
            1900,
            "reg2_idx",
            "RegFile",
            token("store_val", "{reg:rt}", DataType::RegisterValue),
        )
        .merge(
            2000,
            &["rn_val", "alu_b", "alu_op"],
            "ALUMain",
            token("mem_addr", "{alu_result}", DataType::Address),
        )
        .finals(&after_ex)
        .build();

    let after_mem = ["pc_plus4", "rd_idx", "mem_written"];
    let memory = StageBuilder::new(MEMORY, PipelineStage::Memory, 3000)
        .initial(&after_ex)
        .moves(0, "mem_addr", "ALUMain->DataMemory")
        .moves(0, "store_val", "RegFile->DataMemory")
        .merge(
            1000,
            &["mem_addr", "store_val", "sig_memwrite"],
            "DataMemory",
            token("mem_written", "M[{alu_result}]={reg:rt}", DataType::MemoryData),
        )
        .finals(&after_mem)
        .build();

    vec![
        execute,
        memory,
        idle(WRITE_BACK, PipelineStage::WriteBack, 1000, &after_mem),
        sequential_pc(&after_mem),
    ]
}

fn branch_format() -> Vec<Stage> {
    let after_ex = ["pc_plus4", "rn_idx", "rm_idx", "rd_idx", "funct", "sig_uncond", "branch_target"];
    let execute = StageBuilder::new(EXECUTE, PipelineStage::Execute, 3000)
        .initial(&DECODED)
        .split(
            0,
            "Control",
            Some("ctrl"),
            vec![signal("sig_uncond", "UncondBranch={uncondbranch}", "Control->BranchOR")],
        )
        .split(
            0,
            "PC",
            None,
            vec![token("pc_branch", "{pc}", DataType::Address).via("PC->ALUBranch")],
        )
        .moves(0, "imm", "SignExtend->ShiftLeft2")
        .transform(
            1000,
            "imm",
            "ShiftLeft2",
            token("imm_shifted", "#{imm}<<2", DataType::Immediate),
        )
        .moves(1000, "imm_shifted", "ShiftLeft2->ALUBranch")
        .merge(
            1900,
            &["pc_branch", "imm_shifted"],
            "ALUBranch",
            token("branch_target", "{branch_target}", DataType::BranchTarget),
        )
        .finals(&after_ex)
        .build();

    let done = ["rn_idx", "rm_idx", "rd_idx", "funct", "next_pc"];
    let pc_update = StageBuilder::new(PC_UPDATE, PipelineStage::PcUpdate, 3000)
        .initial(&after_ex)
        .transform(0, "sig_uncond", "BranchOR", token("pc_src", "PCSrc=1", DataType::ControlSignal))
        .moves(0, "pc_src", "BranchOR->MuxPC")
        .moves(0, "branch_target", "ALUBranch->MuxPC")
        .merge(
            1000,
            &["pc_plus4", "branch_target", "pc_src"],
            "MuxPC",
            token("next_pc", "{next_pc}", DataType::Address),
        )
        .moves(1100, "next_pc", "MuxPC->PC")
        .finals(&done)
        .build();

    vec![
        execute,
        idle(MEMORY, PipelineStage::Memory, 1000, &after_ex),
        idle(WRITE_BACK, PipelineStage::WriteBack, 1000, &after_ex),
        pc_update,
    ]
}

fn compare_branch_format() -> Vec<Stage> {
    let after_ex = ["pc_plus4", "rn_idx", "rd_idx", "sig_branch", "branch_target", "zero_flag"];
    let execute = StageBuilder::new(EXECUTE, PipelineStage::Execute, 4000)
        .initial(&DECODED)
        .split(
            0,
            "Control",
            Some("ctrl"),
            vec![
                signal("sig_reg2loc", "Reg2Loc={reg2loc}", "Control->MuxReg2Loc"),
                signal("sig_alusrc", "ALUSrc={alusrc}", "Control->MuxALUSrc"),
                signal("sig_aluop", "ALUOp={aluop}", "Control->ALUControl"),
                signal("sig_branch", "Branch={branch}", "Control->ZeroAND"),
            ],
        )
        .split(
            0,
            "PC",
            None,
            vec![token("pc_branch", "{pc}", DataType::Address).via("PC->ALUBranch")],
        )
        .moves(0, "imm", "SignExtend->ShiftLeft2")
        .merge(
            1000,
            &["rm_idx", "sig_reg2loc"],
            "MuxReg2Loc",
            token("reg2_idx", "X{rt}", DataType::RegisterIndex),
        )
        .merge(
            1000,
            &["funct", "sig_aluop"],
            "ALUControl",
            token("alu_op", "{alu_operation}", DataType::ControlSignal),
        )
        .transform(
            1000,
            "imm",
            "ShiftLeft2",
            token("imm_shifted", "#{imm}<<2", DataType::Immediate),
        )
        .moves(1000, "reg2_idx", "MuxReg2Loc->RegFile")
        .moves(1000, "alu_op", "ALUControl->ALUMain")
        .moves(1000, "imm_shifted", "ShiftLeft2->ALUBranch")
        .transform(1900, "reg2_idx", "RegFile", token("rt_val", "{reg:rt}", DataType::RegisterValue))
        .moves(1900, "rt_val", "RegFile->MuxALUSrc")
        .merge(
            1900,
            &["pc_branch", "imm_shifted"],
            "ALUBranch",
            token("branch_target", "{branch_target}", DataType::BranchTarget),
        )
        .merge(
            2800,
            &["rt_val", "sig_alusrc"],
            "MuxALUSrc",
            token("alu_b", "{reg:rt}", DataType::RegisterValue),
        )
        .moves(2800, "alu_b", "MuxALUSrc->ALUMain")
        .merge(3700, &["alu_b", "alu_op"], "ALUMain", token("zero_flag", "Zero={zero}", DataType::Flag))
        .finals(&after_ex)
        .build();

    let done = ["rn_idx", "rd_idx", "next_pc"];
    let pc_update = StageBuilder::new(PC_UPDATE, PipelineStage::PcUpdate, 4000)
        .initial(&after_ex)
        .moves(0, "zero_flag", "ALUMain->ZeroAND")
        .merge(
            1000,
            &["zero_flag", "sig_branch"],
            "ZeroAND",
            token("take_branch", "{take_branch}", DataType::Flag),
        )
        .moves(1000, "take_branch", "ZeroAND->BranchOR")
        .transform(1900, "take_branch", "BranchOR", token("pc_src", "PCSrc={pcsrc}", DataType::ControlSignal))
        .moves(1900, "pc_src", "BranchOR->MuxPC")
        .moves(1900, "branch_target", "ALUBranch->MuxPC")
        .merge(
            2800,
            &["pc_plus4", "branch_target", "pc_src"],
            "MuxPC",
            token("next_pc", "{next_pc}", DataType::Address),
        )
        .moves(2900, "next_pc", "MuxPC->PC")
        .finals(&done)
        .build();

    vec![
        execute,
        idle(MEMORY, PipelineStage::Memory, 1000, &after_ex),
        idle(WRITE_BACK, PipelineStage::WriteBack, 1000, &after_ex),
        pc_update,
    ]
}
