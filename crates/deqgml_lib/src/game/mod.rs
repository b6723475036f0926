//! Per-game knowledge supplied from outside the decompiler: argument names,
//! macro types and enum definitions.

mod enums;
mod macros;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

pub use enums::{GmlEnum, GmlEnumValue};
pub use macros::{MacroType, MacroTypeRegistry};

/// Supplies human-readable names for positional arguments.
pub trait NamedArgumentResolver {
    fn resolve_argument(&self, code_entry_name: &str, index: usize) -> Option<String>;
}

/// Argument names keyed by code entry name, in argument order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamedArgumentTable {
    names: FxHashMap<String, Vec<String>>,
}

impl NamedArgumentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code_entry_name: impl Into<String>, names: Vec<String>) {
        self.names.insert(code_entry_name.into(), names);
    }
}

impl NamedArgumentResolver for NamedArgumentTable {
    fn resolve_argument(&self, code_entry_name: &str, index: usize) -> Option<String> {
        self.names.get(code_entry_name)?.get(index).cloned()
    }
}

pub struct GameSpecificRegistry {
    pub macro_types: MacroTypeRegistry,
    argument_resolver: Box<dyn NamedArgumentResolver + Send + Sync>,
}

impl Default for GameSpecificRegistry {
    fn default() -> Self {
        Self {
            macro_types: MacroTypeRegistry::default(),
            argument_resolver: Box::new(NamedArgumentTable::new()),
        }
    }
}

impl GameSpecificRegistry {
    pub fn with_macro_types(mut self, macro_types: MacroTypeRegistry) -> Self {
        self.macro_types = macro_types;
        self
    }

    pub fn with_argument_resolver(
        mut self,
        resolver: impl NamedArgumentResolver + Send + Sync + 'static,
    ) -> Self {
        self.argument_resolver = Box::new(resolver);
        self
    }

    pub fn argument_resolver(&self) -> &dyn NamedArgumentResolver {
        self.argument_resolver.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_resolves_by_entry_and_index() {
        let mut table = NamedArgumentTable::new();
        table.insert("gml_Script_move", vec!["dx".into(), "dy".into()]);
        assert_eq!(table.resolve_argument("gml_Script_move", 1).as_deref(), Some("dy"));
        assert_eq!(table.resolve_argument("gml_Script_move", 2), None);
        assert_eq!(table.resolve_argument("gml_Script_other", 0), None);
    }
}
