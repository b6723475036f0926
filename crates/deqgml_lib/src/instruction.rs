use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest first-dimension stride used by pre-GMLv2 compilers for 2D arrays.
pub const OLD_ARRAY_LIMIT: i32 = 32000;

pub const NEW_OBJECT_FUNCTION: &str = "@@NewGMLObject@@";
pub const NULL_OBJECT_FUNCTION: &str = "@@NullObject@@";
pub const METHOD_FUNCTION: &str = "method";
pub const COPY_STATIC_FUNCTION: &str = "@@CopyStatic@@";
/// Marks the code entries the compiler generates for struct literals.
pub const STRUCT_ENTRY_MARKER: &str = "___struct___";
pub const TEMP_VARIABLE_NAME: &str = "$$$$temp$$$$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Convert,
    Multiply,
    Divide,
    GmlDivRemainder,
    GmlModulo,
    Add,
    Subtract,
    And,
    Or,
    Xor,
    Negate,
    Not,
    ShiftLeft,
    ShiftRight,
    Compare,
    Pop,
    Duplicate,
    Return,
    Exit,
    PopDelete,
    Branch,
    BranchTrue,
    BranchFalse,
    PushWithContext,
    PopWithContext,
    Push,
    PushLocal,
    PushGlobal,
    PushBuiltin,
    PushImmediate,
    Call,
    CallVariable,
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtendedOpcode {
    SetArrayOwner,
    PushArrayFinal,
    PopArrayFinal,
    PushArrayContainer,
    SetStaticInitialized,
    HasStaticInitialized,
    CopyOnWrite,
    PushReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    Double,
    Int32,
    Int64,
    Boolean,
    #[default]
    Variable,
    String,
    Int16,
}

impl DataType {
    /// Number of bytes a value of this type occupies on the VM stack.
    pub const fn size(self) -> i32 {
        match self {
            DataType::Double => 8,
            DataType::Int32 => 4,
            DataType::Int64 => 8,
            DataType::Boolean => 4,
            DataType::Variable => 16,
            DataType::String => 4,
            DataType::Int16 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonType {
    LesserThan,
    LesserEqualThan,
    EqualTo,
    NotEqualTo,
    GreaterEqualThan,
    GreaterThan,
}

impl ComparisonType {
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonType::LesserThan => "<",
            ComparisonType::LesserEqualThan => "<=",
            ComparisonType::EqualTo => "==",
            ComparisonType::NotEqualTo => "!=",
            ComparisonType::GreaterEqualThan => ">=",
            ComparisonType::GreaterThan => ">",
        }
    }
}

/// Instance a variable access is resolved against. Non-negative values are
/// object indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InstanceType {
    Undefined,
    #[default]
    Own,
    Other,
    All,
    Noone,
    Global,
    Builtin,
    Local,
    StackTop,
    Argument,
    Static,
    Object(i16),
}

impl InstanceType {
    pub fn from_i16(v: i16) -> Self {
        match v {
            0.. => InstanceType::Object(v),
            -1 => InstanceType::Own,
            -2 => InstanceType::Other,
            -3 => InstanceType::All,
            -4 => InstanceType::Noone,
            -5 => InstanceType::Global,
            -6 => InstanceType::Builtin,
            -7 => InstanceType::Local,
            -9 => InstanceType::StackTop,
            -15 => InstanceType::Argument,
            -16 => InstanceType::Static,
            _ => InstanceType::Undefined,
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            InstanceType::Undefined => 0,
            InstanceType::Own => -1,
            InstanceType::Other => -2,
            InstanceType::All => -3,
            InstanceType::Noone => -4,
            InstanceType::Global => -5,
            InstanceType::Builtin => -6,
            InstanceType::Local => -7,
            InstanceType::StackTop => -9,
            InstanceType::Argument => -15,
            InstanceType::Static => -16,
            InstanceType::Object(v) => v,
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceType::Undefined => write!(f, "undefined"),
            InstanceType::Own => write!(f, "self"),
            InstanceType::Other => write!(f, "other"),
            InstanceType::All => write!(f, "all"),
            InstanceType::Noone => write!(f, "noone"),
            InstanceType::Global => write!(f, "global"),
            InstanceType::Builtin => write!(f, "builtin"),
            InstanceType::Local => write!(f, "local"),
            InstanceType::StackTop => write!(f, "stacktop"),
            InstanceType::Argument => write!(f, "argument"),
            InstanceType::Static => write!(f, "static"),
            InstanceType::Object(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VariableType {
    Array,
    StackTop,
    #[default]
    Normal,
    Instance,
    MultiPush,
    MultiPushPop,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub instance_type: InstanceType,
}

impl Variable {
    pub fn new(name: impl Into<String>, instance_type: InstanceType) -> Self {
        Self { name: name.into(), instance_type }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Boolean(bool),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(default)]
    pub address: u32,
    pub kind: Opcode,
    #[serde(default)]
    pub ext_kind: Option<ExtendedOpcode>,
    #[serde(default)]
    pub comparison: Option<ComparisonType>,
    #[serde(default)]
    pub type1: DataType,
    #[serde(default)]
    pub type2: DataType,
    #[serde(default)]
    pub instance_type: InstanceType,
    #[serde(default)]
    pub reference_type: VariableType,
    #[serde(default)]
    pub variable: Option<Variable>,
    #[serde(default)]
    pub function: Option<Function>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub argument_count: u16,
    #[serde(default)]
    pub duplication_size: u8,
    #[serde(default)]
    pub duplication_size2: u8,
}

impl Instruction {
    pub fn new(kind: Opcode) -> Self {
        Self {
            address: 0,
            kind,
            ext_kind: None,
            comparison: None,
            type1: DataType::Variable,
            type2: DataType::Variable,
            instance_type: InstanceType::Own,
            reference_type: VariableType::Normal,
            variable: None,
            function: None,
            value: None,
            argument_count: 0,
            duplication_size: 0,
            duplication_size2: 0,
        }
    }

    pub fn at(mut self, address: u32) -> Self {
        self.address = address;
        self
    }

    pub fn types(mut self, type1: DataType, type2: DataType) -> Self {
        self.type1 = type1;
        self.type2 = type2;
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_variable(mut self, variable: Variable, reference_type: VariableType) -> Self {
        self.variable = Some(variable);
        self.reference_type = reference_type;
        self
    }

    pub fn with_instance(mut self, instance_type: InstanceType) -> Self {
        self.instance_type = instance_type;
        self
    }

    pub fn with_function(mut self, function: Function, argument_count: u16) -> Self {
        self.function = Some(function);
        self.argument_count = argument_count;
        self
    }

    pub fn compare(comparison: ComparisonType, type1: DataType, type2: DataType) -> Self {
        let mut instr = Instruction::new(Opcode::Compare).types(type1, type2);
        instr.comparison = Some(comparison);
        instr
    }

    pub fn duplicate(data_type: DataType, size: u8, size2: u8) -> Self {
        let mut instr = Instruction::new(Opcode::Duplicate).types(data_type, data_type);
        instr.duplication_size = size;
        instr.duplication_size2 = size2;
        instr
    }

    pub fn extended(ext_kind: ExtendedOpcode) -> Self {
        let mut instr = Instruction::new(Opcode::Extended);
        instr.ext_kind = Some(ext_kind);
        instr
    }

    pub fn push_immediate(v: i16) -> Self {
        Instruction::new(Opcode::PushImmediate)
            .types(DataType::Int16, DataType::Int16)
            .with_value(Value::Int16(v))
    }

    pub fn push_int32(v: i32) -> Self {
        Instruction::new(Opcode::Push)
            .types(DataType::Int32, DataType::Int32)
            .with_value(Value::Int32(v))
    }

    pub fn push_string(s: impl Into<String>) -> Self {
        Instruction::new(Opcode::Push)
            .types(DataType::String, DataType::String)
            .with_value(Value::String(s.into()))
    }

    pub fn push_variable(opcode: Opcode, variable: Variable, reference_type: VariableType) -> Self {
        let instance_type = variable.instance_type;
        Instruction::new(opcode)
            .with_variable(variable, reference_type)
            .with_instance(instance_type)
    }

    pub fn pop_variable(variable: Variable, reference_type: VariableType, type1: DataType) -> Self {
        let instance_type = variable.instance_type;
        Instruction::new(Opcode::Pop)
            .types(type1, DataType::Variable)
            .with_variable(variable, reference_type)
            .with_instance(instance_type)
    }

    pub fn call(name: impl Into<String>, argument_count: u16) -> Self {
        Instruction::new(Opcode::Call)
            .types(DataType::Int32, DataType::Int32)
            .with_function(Function::new(name), argument_count)
    }

    pub fn convert(from: DataType, to: DataType) -> Self {
        Instruction::new(Opcode::Convert).types(from, to)
    }

    pub fn value_i16(&self) -> i16 {
        match &self.value {
            Some(Value::Int16(v)) => *v,
            Some(Value::Int32(v)) => *v as i16,
            Some(Value::Int64(v)) => *v as i16,
            Some(Value::Boolean(b)) => *b as i16,
            _ => 0,
        }
    }

    pub fn value_i32(&self) -> i32 {
        match &self.value {
            Some(Value::Int16(v)) => *v as i32,
            Some(Value::Int32(v)) => *v,
            Some(Value::Int64(v)) => *v as i32,
            Some(Value::Boolean(b)) => *b as i32,
            _ => 0,
        }
    }

    pub fn value_i64(&self) -> i64 {
        match &self.value {
            Some(Value::Int16(v)) => *v as i64,
            Some(Value::Int32(v)) => *v as i64,
            Some(Value::Int64(v)) => *v,
            Some(Value::Boolean(b)) => *b as i64,
            _ => 0,
        }
    }

    pub fn value_f64(&self) -> f64 {
        match &self.value {
            Some(Value::Double(v)) => *v,
            Some(Value::Int16(v)) => *v as f64,
            Some(Value::Int32(v)) => *v as f64,
            Some(Value::Int64(v)) => *v as f64,
            _ => 0.0,
        }
    }

    pub fn value_string(&self) -> &str {
        match &self.value {
            Some(Value::String(s)) => s,
            _ => "",
        }
    }

    pub fn function_name(&self) -> Option<&str> {
        self.function.as_ref().map(|f| f.name.as_str())
    }

    pub fn variable_name(&self) -> Option<&str> {
        self.variable.as_ref().map(|v| v.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_sizes_match_vm_slots() {
        assert_eq!(DataType::Variable.size(), 16);
        assert_eq!(DataType::Double.size(), 8);
        assert_eq!(DataType::Int64.size(), 8);
        for t in [DataType::Int32, DataType::Int16, DataType::Boolean, DataType::String] {
            assert_eq!(t.size(), 4);
        }
    }

    #[test]
    fn instance_types_round_trip_through_raw_values() {
        for raw in [-1, -2, -3, -4, -5, -6, -7, -9, -15, -16, 0, 12] {
            assert_eq!(InstanceType::from_i16(raw).as_i16(), raw);
        }
        assert_eq!(InstanceType::from_i16(-9), InstanceType::StackTop);
    }

    #[test]
    fn instruction_json_fills_defaults() {
        let instr: Instruction = serde_json::from_str(
            r#"{ "kind": "PushImmediate", "type1": "Int16", "value": { "Int16": 7 } }"#,
        )
        .unwrap();
        assert_eq!(instr.value_i16(), 7);
        assert_eq!(instr.reference_type, VariableType::Normal);
        assert!(instr.variable.is_none());
    }
}
