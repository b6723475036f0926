//! Expression and statement tree produced by the builder.
//!
//! Every node can `clean` itself (consuming the node and returning its
//! normalized replacement) and `print` itself into a [`Printer`].
//!
//! [`Printer`]: crate::printer::Printer

mod enum_decl;
mod expr;
mod function;
mod stmt;

pub use enum_decl::{EnumDeclNode, generate_enum_declarations};
pub use expr::{Expr, ExprKind, VariableNode};
pub use function::FunctionDeclNode;
pub use stmt::{AssignNode, BlockNode, IfNode, Stmt, TryNode, WhileNode};

use crate::control::ShortCircuitType;
use crate::instruction::{DataType, Instruction, Opcode};

/// Operator text and binding strength of a binary instruction. Larger binds
/// tighter.
pub(crate) fn binary_operator(instruction: &Instruction) -> (&'static str, u8) {
    let logical = instruction.type1 == DataType::Boolean && instruction.type2 == DataType::Boolean;
    match instruction.kind {
        Opcode::Or if logical => ("||", 1),
        Opcode::Xor if logical => ("^^", 2),
        Opcode::And if logical => ("&&", 3),
        Opcode::Compare => (instruction.comparison.map(|c| c.symbol()).unwrap_or("=="), 4),
        Opcode::Or => ("|", 5),
        Opcode::Xor => ("^", 6),
        Opcode::And => ("&", 7),
        Opcode::ShiftLeft => ("<<", 8),
        Opcode::ShiftRight => (">>", 8),
        Opcode::Add => ("+", 9),
        Opcode::Subtract => ("-", 9),
        Opcode::Multiply => ("*", 10),
        Opcode::Divide => ("/", 10),
        Opcode::GmlDivRemainder => ("div", 10),
        Opcode::GmlModulo => ("%", 10),
        _ => ("?", 11),
    }
}

pub(crate) fn short_circuit_operator(logic: ShortCircuitType) -> (&'static str, u8) {
    match logic {
        ShortCircuitType::Or => ("||", 1),
        ShortCircuitType::And => ("&&", 3),
    }
}

/// Binding strength of an expression when used as an operand, `None` for
/// atoms.
pub(crate) fn precedence(expr: &Expr) -> Option<u8> {
    match &expr.kind {
        ExprKind::Binary { instruction, .. } => Some(binary_operator(instruction).1),
        ExprKind::ShortCircuit { logic, .. } => Some(short_circuit_operator(*logic).1),
        _ => None,
    }
}
