//! Tokens ("circles"): the animated units of data.

use serde::{Deserialize, Serialize};

use crate::types::{ComponentId, Point, TokenId};

/// What kind of datum a token carries. Drives the renderer's colour choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Address,
    Instruction,
    Opcode,
    RegisterIndex,
    RegisterValue,
    Immediate,
    ControlSignal,
    AluResult,
    MemoryData,
    BranchTarget,
    Flag,
}

/// A live token in one animation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    /// Display label, already resolved against the CPU state.
    pub data_value: String,
    pub data_type: DataType,
    pub position: Point,
    /// Component the token sits at, or is travelling to.
    pub component: ComponentId,
    pub active: bool,
}

impl Token {
    pub fn new(
        id: impl Into<TokenId>,
        data_value: impl Into<String>,
        data_type: DataType,
        component: impl Into<ComponentId>,
        position: Point,
    ) -> Self {
        Self {
            id: id.into(),
            data_value: data_value.into(),
            data_type,
            position,
            component: component.into(),
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_serde() {
        let json = serde_json::to_string(&DataType::AluResult).unwrap();
        assert_eq!(json, "\"alu_result\"");
    }

    #[test]
    fn test_token_is_active_on_creation() {
        let token = Token::new("pc", "0x0", DataType::Address, "PC", Point::new(1.0, 2.0));
        assert!(token.active);
        assert_eq!(token.component, "PC");
    }
}
