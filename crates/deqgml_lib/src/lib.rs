use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

pub mod ast;
pub mod builder;
pub mod cleaner;
pub mod context;
pub mod control;
pub mod game;
pub mod global_functions;
pub mod instruction;
pub mod printer;
pub mod settings;
mod simulate;

pub use ast::{BlockNode, Expr, ExprKind, Stmt};
pub use context::FragmentContext;
pub use control::{Block, CodeEntry, ControlNode, FragmentNode, ShortCircuitType};
pub use game::{
    GameSpecificRegistry, GmlEnum, GmlEnumValue, MacroType, MacroTypeRegistry,
    NamedArgumentResolver, NamedArgumentTable,
};
pub use global_functions::{GlobalFunctions, GlobalScript, ScriptFragment, Successor};
pub use instruction::{DataType, Instruction, Opcode};
pub use settings::{DecompileOptions, DecompileSettings, DecompileVersion, Dialect};

use builder::AstBuilder;
use cleaner::AstCleaner;
use printer::Printer;

#[derive(Debug, Error)]
pub enum DecompileError {
    #[error("operand stack underflow at address {address}")]
    StackUnderflow { address: u32 },

    #[error("dup read too much data from stack ({requested} -> {remaining})")]
    DuplicateOverread { requested: i32, remaining: i32 },

    #[error(
        "dup swap read too much data from stack ({top_requested} -> {top_remaining}, {bottom_requested} -> {bottom_remaining})"
    )]
    DuplicateSwapOverread {
        top_requested: i32,
        top_remaining: i32,
        bottom_requested: i32,
        bottom_remaining: i32,
    },

    #[error("malformed instruction at address {address}: {reason}")]
    MalformedInstruction { address: u32, reason: &'static str },

    #[error("no condition on the stack for {construct}")]
    MissingCondition { construct: &'static str },

    #[error("{statement} outside of a loop")]
    LoopControlOutsideLoop { statement: &'static str },

    #[error("no fragment context is active")]
    MissingFragmentContext,

    #[error("expected final AST to be a {expected}")]
    UnexpectedStructure { expected: &'static str },

    #[error("printing is not implemented for {0}")]
    NotImplemented(&'static str),

    #[error("failed to decompile {name}: {source}")]
    CodeEntry {
        name: String,
        #[source]
        source: Box<DecompileError>,
    },

    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),
}

pub struct DecompileContext {
    pub settings: DecompileSettings,
    pub dialect: Dialect,
    pub registry: GameSpecificRegistry,
    pub global_functions: GlobalFunctions,
    pub enums: Vec<GmlEnum>,
}

impl DecompileContext {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            settings: DecompileSettings::default(),
            dialect,
            registry: GameSpecificRegistry::default(),
            global_functions: GlobalFunctions::new(),
            enums: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: DecompileSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_registry(mut self, registry: GameSpecificRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_global_functions(mut self, global_functions: GlobalFunctions) -> Self {
        self.global_functions = global_functions;
        self
    }

    pub fn with_enums(mut self, enums: Vec<GmlEnum>) -> Self {
        self.enums = enums;
        self
    }

    /// Builds and cleans the tree for one code entry. Failures are labeled
    /// with the entry's name.
    pub fn decompile(&self, entry: &CodeEntry) -> Result<Decompiled, DecompileError> {
        self.decompile_entry(entry).map_err(|source| DecompileError::CodeEntry {
            name: entry.name.clone(),
            source: Box::new(source),
        })
    }

    pub fn decompile_to_string(&self, entry: &CodeEntry) -> Result<String, DecompileError> {
        let decompiled = self.decompile(entry)?;
        decompiled.print(self).map_err(|source| DecompileError::CodeEntry {
            name: entry.name.clone(),
            source: Box::new(source),
        })
    }

    fn decompile_entry(&self, entry: &CodeEntry) -> Result<Decompiled, DecompileError> {
        debug!(code_entry = %entry.name, "decompiling");
        let (block, fragment) = AstBuilder::new(self).build(entry)?;
        let (root, context) = AstCleaner::new(self).clean_code_entry(Stmt::Block(block), fragment)?;
        Ok(Decompiled { root, context })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decompiled {
    pub root: Stmt,
    pub context: FragmentContext,
}

impl Decompiled {
    pub fn print(&self, context: &DecompileContext) -> Result<String, DecompileError> {
        let mut printer = Printer::new(context);
        printer.push_fragment_context(&self.context);
        self.root.print(&mut printer)?;
        printer.pop_fragment_context();
        Ok(printer.finish())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub code_entries: Vec<CodeEntry>,
    #[serde(default)]
    pub enums: Vec<GmlEnum>,
    #[serde(default)]
    pub global_scripts: Vec<GlobalScript>,
    #[serde(default)]
    pub argument_names: NamedArgumentTable,
    #[serde(default)]
    pub macro_types: MacroTypeRegistry,
}

/// Decompiles every entry of `program`. A failing entry is reported inline
/// and does not stop the others.
pub fn decompile_program(program: &Program, options: &DecompileOptions) -> String {
    let dialect = options.version.dialect();
    let global_functions = if dialect.named_arguments && !program.global_scripts.is_empty() {
        GlobalFunctions::find(&program.global_scripts)
    } else {
        GlobalFunctions::new()
    };
    let registry = GameSpecificRegistry::default()
        .with_macro_types(program.macro_types.clone())
        .with_argument_resolver(program.argument_names.clone());
    let context = DecompileContext::new(dialect)
        .with_settings(options.settings.clone())
        .with_registry(registry)
        .with_global_functions(global_functions)
        .with_enums(program.enums.clone());

    let mut out = String::new();
    for (i, entry) in program.code_entries.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("// {}\n", entry.name));
        match context.decompile_to_string(entry) {
            Ok(s) => out.push_str(&s),
            Err(e) => {
                error!(code_entry = %entry.name, "{e}");
                out.push_str(&format!("// {e}\n"));
            }
        }
    }
    out
}

pub fn decompile(entry: &CodeEntry) -> Result<String, DecompileError> {
    DecompileContext::new(DecompileVersion::Current.dialect()).decompile_to_string(entry)
}
