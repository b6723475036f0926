//! Discovery of readable names for global functions.
//!
//! GMLv2 scripts declare their functions by binding each nested fragment to
//! a global variable right after the fragment ends. Scanning those binding
//! tails across all global scripts yields the function reference to name
//! mapping the printer uses.

use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::DecompileError;
use crate::control::Block;
use crate::instruction::{
    DataType, Function, Instruction, METHOD_FUNCTION, NULL_OBJECT_FUNCTION, Opcode,
};

/// A global script as seen by the scan: its fragments in code order, the
/// first being the script body itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalScript {
    pub name: String,
    #[serde(default)]
    pub fragments: Vec<ScriptFragment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptFragment {
    #[serde(default)]
    pub successors: Vec<Successor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Successor {
    Block(Block),
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalFunctions {
    function_to_name: FxHashMap<Function, String>,
    name_to_function: FxHashMap<String, Function>,
}

#[derive(Default)]
struct Lookup {
    function_to_name: FxHashMap<Function, String>,
    name_to_function: FxHashMap<String, Function>,
}

impl GlobalFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(scripts: &[GlobalScript]) -> Self {
        let lookup = Mutex::new(Lookup::default());

        scripts.par_iter().for_each(|script| {
            for (function, name) in scan_script(script) {
                let mut lookup = lookup.lock();
                lookup.function_to_name.insert(function.clone(), name.clone());
                lookup.name_to_function.insert(name, function);
            }
        });

        let lookup = lookup.into_inner();
        debug!(count = lookup.function_to_name.len(), "found global functions");
        Self {
            function_to_name: lookup.function_to_name,
            name_to_function: lookup.name_to_function,
        }
    }

    pub fn find_with_threads(scripts: &[GlobalScript], threads: usize) -> Result<Self, DecompileError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| DecompileError::ThreadPool(e.to_string()))?;
        Ok(pool.install(|| Self::find(scripts)))
    }

    pub fn insert(&mut self, function: Function, name: impl Into<String>) {
        let name = name.into();
        self.function_to_name.insert(function.clone(), name.clone());
        self.name_to_function.insert(name, function);
    }

    pub fn function_name(&self, function: &Function) -> Option<&str> {
        self.function_to_name.get(function).map(String::as_str)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.name_to_function.get(name)
    }

    pub fn len(&self) -> usize {
        self.function_to_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.function_to_name.is_empty()
    }
}

fn scan_script(script: &GlobalScript) -> Vec<(Function, String)> {
    let mut found = Vec::new();
    for (i, fragment) in script.fragments.iter().enumerate().skip(1) {
        let after = match fragment.successors.first() {
            Some(Successor::Block(block)) => block,
            Some(Successor::Other) | None => {
                warn!(script = %script.name, fragment = i, "fragment has no block after it, skipping");
                continue;
            }
        };
        if let Some(entry) = function_name_after_fragment(&after.instructions) {
            found.push(entry);
        }
    }
    found
}

fn is_call_to(instr: &Instruction, name: &str) -> bool {
    instr.kind == Opcode::Call && instr.function_name() == Some(name)
}

fn is_int_to_variable(instr: &Instruction) -> bool {
    instr.kind == Opcode::Convert && instr.type1 == DataType::Int32 && instr.type2 == DataType::Variable
}

fn is_plain_dup(instr: &Instruction) -> bool {
    instr.kind == Opcode::Duplicate && instr.duplication_size2 == 0
}

/// Recognizes the instructions binding a just-declared fragment to its name.
fn function_name_after_fragment(instructions: &[Instruction]) -> Option<(Function, String)> {
    let [push, conv, third, ..] = instructions else {
        return None;
    };
    if push.kind != Opcode::Push || push.type1 != DataType::Int32 || !is_int_to_variable(conv) {
        return None;
    }
    let function = push.function.clone()?;

    let name = match third.kind {
        Opcode::PushImmediate => {
            let [_, _, owner, owner_conv, method, rest @ ..] = instructions else {
                return None;
            };
            if !matches!(owner.value_i16(), -1 | -16)
                || !is_int_to_variable(owner_conv)
                || !is_call_to(method, METHOD_FUNCTION)
            {
                return None;
            }
            match rest {
                [dup, pushi, pop, ..]
                    if is_plain_dup(dup) && pushi.kind == Opcode::PushImmediate && pop.kind == Opcode::Pop =>
                {
                    pop.variable_name()?
                }
                _ => return None,
            }
        }
        Opcode::Call => {
            let [_, _, null_object, method, rest @ ..] = instructions else {
                return None;
            };
            if !is_call_to(null_object, NULL_OBJECT_FUNCTION) || !is_call_to(method, METHOD_FUNCTION) {
                return None;
            }
            match rest {
                // Struct literals bind through static or global owners.
                [dup, pushi, pop, ..]
                    if is_plain_dup(dup)
                        && pushi.kind == Opcode::PushImmediate
                        && !matches!(pushi.value_i16(), -16 | -5)
                        && pop.kind == Opcode::Pop =>
                {
                    pop.variable_name()?
                }
                _ => return None,
            }
        }
        _ => return None,
    };

    Some((function, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{InstanceType, Variable, VariableType};

    fn binding_tail(function: &str, name: &str, owner: i16) -> Vec<Instruction> {
        vec![
            Instruction::push_int32(0).with_function(Function::new(function), 0),
            Instruction::convert(DataType::Int32, DataType::Variable),
            Instruction::push_immediate(owner),
            Instruction::convert(DataType::Int32, DataType::Variable),
            Instruction::call(METHOD_FUNCTION, 2),
            Instruction::duplicate(DataType::Variable, 0, 0),
            Instruction::push_immediate(-6),
            Instruction::pop_variable(
                Variable::new(name, InstanceType::Own),
                VariableType::StackTop,
                DataType::Variable,
            ),
        ]
    }

    fn constructor_tail(function: &str, name: &str, owner: i16) -> Vec<Instruction> {
        vec![
            Instruction::push_int32(0).with_function(Function::new(function), 0),
            Instruction::convert(DataType::Int32, DataType::Variable),
            Instruction::call(NULL_OBJECT_FUNCTION, 0),
            Instruction::call(METHOD_FUNCTION, 2),
            Instruction::duplicate(DataType::Variable, 0, 0),
            Instruction::push_immediate(owner),
            Instruction::pop_variable(
                Variable::new(name, InstanceType::Own),
                VariableType::StackTop,
                DataType::Variable,
            ),
        ]
    }

    fn script(name: &str, tails: Vec<Vec<Instruction>>) -> GlobalScript {
        let mut fragments = vec![ScriptFragment::default()];
        fragments.extend(tails.into_iter().map(|instructions| ScriptFragment {
            successors: vec![Successor::Block(Block::new(instructions))],
        }));
        GlobalScript {
            name: name.into(),
            fragments,
        }
    }

    #[test]
    fn recognizes_functions_and_constructors() {
        let functions = GlobalFunctions::find(&[script(
            "gml_GlobalScript_util",
            vec![
                binding_tail("gml_Script_clamp01", "clamp01", -1),
                constructor_tail("gml_Script_Vec2", "Vec2", -6),
            ],
        )]);

        assert_eq!(functions.len(), 2);
        assert_eq!(functions.function_name(&Function::new("gml_Script_clamp01")), Some("clamp01"));
        assert_eq!(functions.function_by_name("Vec2"), Some(&Function::new("gml_Script_Vec2")));
    }

    #[test]
    fn skips_struct_bindings_and_malformed_tails() {
        let mut broken = binding_tail("gml_Script_b", "b", -1);
        broken.truncate(5);
        let functions = GlobalFunctions::find(&[script(
            "gml_GlobalScript_s",
            vec![
                constructor_tail("gml_Script_s1", "s1", -16),
                constructor_tail("gml_Script_s2", "s2", -5),
                binding_tail("gml_Script_a", "a", -7),
                broken,
            ],
        )]);
        assert!(functions.is_empty());
    }

    #[test]
    fn first_fragment_and_non_block_successors_are_ignored() {
        let mut s = script("gml_GlobalScript_x", vec![binding_tail("gml_Script_x", "x", -1)]);
        s.fragments[0].successors = vec![Successor::Block(Block::new(binding_tail("gml_Script_y", "y", -1)))];
        s.fragments.push(ScriptFragment {
            successors: vec![Successor::Other],
        });
        s.fragments.push(ScriptFragment::default());

        let functions = GlobalFunctions::find(&[s]);
        assert_eq!(functions.len(), 1);
        assert_eq!(functions.function_name(&Function::new("gml_Script_x")), Some("x"));
    }

    #[test]
    fn result_does_not_depend_on_order_or_threads() {
        let scripts: Vec<GlobalScript> = (0..32)
            .map(|i| {
                script(
                    &format!("gml_GlobalScript_{i}"),
                    vec![binding_tail(&format!("gml_Script_f{i}"), &format!("f{i}"), -1)],
                )
            })
            .collect();
        let mut reversed = scripts.clone();
        reversed.reverse();

        let single = GlobalFunctions::find_with_threads(&scripts, 1).unwrap();
        let many = GlobalFunctions::find_with_threads(&reversed, 4).unwrap();
        assert_eq!(single, many);
        assert_eq!(single.len(), 32);
    }
}
