//! CPU core interface and token label templates.
//!
//! The engine never executes instructions. It asks a [`CpuCore`] for the
//! current instruction and for display values, and fills in token labels
//! such as `"X{rd}"` or `"{reg:rn}"` with [`resolve_label`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::flow::InstructionFormat;

/// Placeholder shown when a template key cannot be resolved.
pub const UNKNOWN_LABEL: &str = "?";

/// The selected instruction with its operand fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedInstruction {
    pub mnemonic: String,
    pub rd: Option<u8>,
    pub rn: Option<u8>,
    pub rm: Option<u8>,
    pub rt: Option<u8>,
    pub imm: Option<i64>,
    /// Source text, e.g. `"ADD X1, X2, X3"`.
    pub text: String,
}

fn parse_register(operand: &str) -> Option<u8> {
    let upper = operand.to_ascii_uppercase();
    match upper.as_str() {
        "XZR" => Some(31),
        "SP" => Some(28),
        "FP" => Some(29),
        "LR" => Some(30),
        _ => upper.strip_prefix('X')?.parse().ok().filter(|n| *n < 32),
    }
}

fn parse_immediate(operand: &str) -> Option<i64> {
    let digits = operand.strip_prefix('#').unwrap_or(operand);
    match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => digits.parse().ok(),
    }
}

impl DecodedInstruction {
    /// Parses LEGv8 assembly text such as `"STUR X1, [X2, #8]"`.
    ///
    /// Operands are assigned to fields according to the mnemonic's format;
    /// unknown mnemonics fill `rd`, `rn`, `rm` in order. Returns `None` for
    /// blank input.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (mnemonic, rest) = match text.split_once(char::is_whitespace) {
            Some((m, rest)) => (m, rest),
            None => (text, ""),
        };
        if mnemonic.is_empty() {
            return None;
        }

        let operands: Vec<&str> = rest
            .split(|c: char| c == ',' || c == '[' || c == ']')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let registers: Vec<u8> = operands.iter().filter_map(|op| parse_register(op)).collect();
        let imm = operands
            .iter()
            .filter(|op| parse_register(op).is_none())
            .find_map(|op| parse_immediate(op));
        let reg = |i: usize| registers.get(i).copied();

        let mut decoded = DecodedInstruction {
            mnemonic: mnemonic.to_ascii_uppercase(),
            imm,
            text: text.to_string(),
            ..Default::default()
        };

        match InstructionFormat::of(mnemonic) {
            Some(InstructionFormat::R) => {
                decoded.rd = reg(0);
                decoded.rn = reg(1);
                decoded.rm = reg(2);
            }
            Some(InstructionFormat::I) => {
                decoded.rd = reg(0);
                decoded.rn = reg(1);
            }
            Some(InstructionFormat::DLoad | InstructionFormat::DStore) => {
                decoded.rt = reg(0);
                decoded.rd = reg(0);
                decoded.rn = reg(1);
            }
            Some(InstructionFormat::CB) => {
                decoded.rt = reg(0);
            }
            Some(InstructionFormat::B) => {}
            None => {
                decoded.rd = reg(0);
                decoded.rn = reg(1);
                decoded.rm = reg(2);
            }
        }

        Some(decoded)
    }
}

/// What the engine needs from the CPU simulator.
pub trait CpuCore {
    /// The instruction about to be animated, if any is selected.
    fn current_instruction(&self) -> Option<DecodedInstruction>;

    /// Current program counter.
    fn pc(&self) -> u64;

    /// Value of general register `index`.
    fn register(&self, index: u8) -> i64;

    /// Any other display value (control signal levels, ALU result, memory
    /// contents) keyed by name. `None` renders as `"?"`.
    fn datapath_value(&self, _key: &str) -> Option<String> {
        None
    }

    /// Advances the CPU by one instruction. Called once per completed flow.
    fn step(&mut self);
}

fn lookup<C: CpuCore + ?Sized>(key: &str, core: &C, instruction: Option<&DecodedInstruction>) -> Option<String> {
    let field = |pick: fn(&DecodedInstruction) -> Option<u8>| instruction.and_then(pick);

    match key {
        "pc" => Some(format!("0x{:X}", core.pc())),
        "pc_plus4" => Some(format!("0x{:X}", core.pc().wrapping_add(4))),
        "instruction" => instruction.map(|i| i.text.clone()),
        "opcode" | "mnemonic" => instruction.map(|i| i.mnemonic.clone()),
        "rd" => field(|i| i.rd).map(|r| r.to_string()),
        "rn" => field(|i| i.rn).map(|r| r.to_string()),
        "rm" => field(|i| i.rm).map(|r| r.to_string()),
        "rt" => field(|i| i.rt).map(|r| r.to_string()),
        "imm" => instruction.and_then(|i| i.imm).map(|v| v.to_string()),
        _ => match key.strip_prefix("reg:") {
            Some(name) => {
                let index = match name {
                    "rd" => field(|i| i.rd),
                    "rn" => field(|i| i.rn),
                    "rm" => field(|i| i.rm),
                    "rt" => field(|i| i.rt),
                    other => other.parse().ok(),
                }?;
                Some(core.register(index).to_string())
            }
            None => core.datapath_value(key),
        },
    }
}

/// Fills every `{key}` in `template` from `core`.
///
/// Unknown or unavailable keys become `"?"`; an unterminated brace is kept
/// as literal text.
pub fn resolve_label<C: CpuCore + ?Sized>(template: &str, core: &C) -> String {
    let instruction = core.current_instruction();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = after[..close].trim();
                match lookup(key, core, instruction.as_ref()) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(UNKNOWN_LABEL),
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// A [`CpuCore`] holding fixed values.
///
/// `step()` advances the PC by four and counts calls. Useful as a stand-in
/// when driving the engine without a real simulator.
#[derive(Clone, Debug, Default)]
pub struct SnapshotCore {
    pub instruction: Option<DecodedInstruction>,
    pub pc: u64,
    pub registers: HashMap<u8, i64>,
    pub values: HashMap<String, String>,
    pub steps: u64,
}

impl SnapshotCore {
    /// Creates a core with `text` parsed as the current instruction.
    pub fn with_instruction(text: &str) -> Self {
        Self {
            instruction: DecodedInstruction::parse(text),
            ..Default::default()
        }
    }

    pub fn set_register(mut self, index: u8, value: i64) -> Self {
        self.registers.insert(index, value);
        self
    }

    pub fn set_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set_pc(mut self, pc: u64) -> Self {
        self.pc = pc;
        self
    }
}

impl CpuCore for SnapshotCore {
    fn current_instruction(&self) -> Option<DecodedInstruction> {
        self.instruction.clone()
    }

    fn pc(&self) -> u64 {
        self.pc
    }

    fn register(&self, index: u8) -> i64 {
        if index == 31 {
            return 0;
        }
        self.registers.get(&index).copied().unwrap_or(0)
    }

    fn datapath_value(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn step(&mut self) {
        self.pc = self.pc.wrapping_add(4);
        self.steps += 1;
    }
}
