use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompileSettings {
    /// Pattern for argument names the registry doesn't know; `{0}` is the index.
    pub unknown_argument_name_pattern: String,
    pub cleanup_default_argument_values: bool,
    pub empty_line_around_enums: bool,
    pub empty_line_around_function_declarations: bool,
    pub macro_declarations_at_top: bool,
    pub open_block_brace_on_same_line: bool,
    pub indent_string: String,
}

impl Default for DecompileSettings {
    fn default() -> Self {
        Self {
            unknown_argument_name_pattern: "arg{0}".into(),
            cleanup_default_argument_values: true,
            empty_line_around_enums: true,
            empty_line_around_function_declarations: true,
            macro_declarations_at_top: true,
            open_block_brace_on_same_line: true,
            indent_string: "    ".into(),
        }
    }
}

impl DecompileSettings {
    pub fn format_unknown_argument(&self, index: usize) -> String {
        self.unknown_argument_name_pattern.replace("{0}", &index.to_string())
    }
}

/// Version-dependent bytecode semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialect {
    pub named_arguments: bool,
    pub unified_arrays: bool,
}

impl Dialect {
    pub const fn gml_v2() -> Self {
        Self { named_arguments: true, unified_arrays: true }
    }

    pub const fn legacy() -> Self {
        Self { named_arguments: false, unified_arrays: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecompileVersion {
    Current,
    Legacy,
}

impl DecompileVersion {
    pub fn dialect(self) -> Dialect {
        match self {
            DecompileVersion::Current => Dialect::gml_v2(),
            DecompileVersion::Legacy => Dialect::legacy(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompileOptions {
    pub version: DecompileVersion,
    pub settings: DecompileSettings,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            version: DecompileVersion::Current,
            settings: DecompileSettings::default(),
        }
    }
}
