//! Structured control-flow skeleton consumed by the AST builder.
//!
//! Discovering this structure (basic blocks, loops, branches, try regions)
//! happens before decompilation; here it is plain data.

use serde::{Deserialize, Serialize};

use crate::instruction::Instruction;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub start_address: u32,
    pub instructions: Vec<Instruction>,
}

impl Block {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        let start_address = instructions.first().map(|i| i.address).unwrap_or(0);
        Self { start_address, instructions }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShortCircuitType {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlNode {
    Block(Block),
    /// Consumes the condition left on the stack by the preceding node.
    If {
        then_branch: Vec<ControlNode>,
        #[serde(default)]
        else_branch: Option<Vec<ControlNode>>,
    },
    /// Each condition region leaves exactly one expression on the stack.
    ShortCircuit {
        logic: ShortCircuitType,
        conditions: Vec<Vec<ControlNode>>,
    },
    While {
        condition: Vec<ControlNode>,
        body: Vec<ControlNode>,
    },
    Break,
    Continue,
    Try {
        body: Vec<ControlNode>,
        #[serde(default)]
        finally: Option<Vec<ControlNode>>,
    },
    /// Region guarded by the has-static-initialized check; its assignments
    /// run once per function.
    StaticInit {
        body: Vec<ControlNode>,
    },
    Fragment(FragmentNode),
}

/// A nested function body (anonymous function, named function or constructor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentNode {
    pub code_entry_name: String,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub is_constructor: bool,
    #[serde(default)]
    pub argument_count: u16,
    pub body: Vec<ControlNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeEntry {
    pub name: String,
    #[serde(default)]
    pub argument_count: u16,
    pub body: Vec<ControlNode>,
}
