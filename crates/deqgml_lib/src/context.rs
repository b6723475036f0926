use indexmap::{IndexMap, IndexSet};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::DecompileError;
use crate::ast::{Expr, FunctionDeclNode, Stmt};
use crate::game::NamedArgumentResolver;
use crate::instruction::STRUCT_ENTRY_MARKER;
use crate::settings::DecompileSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    While,
}

/// State of one fragment (script body, function or constructor) while it is
/// simulated and cleaned.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentContext {
    code_entry_name: String,
    pub function_name: Option<String>,
    expression_stack: Vec<Expr>,
    locals: IndexSet<String>,
    named_arguments: FxHashSet<String>,
    named_argument_by_index: FxHashMap<usize, String>,
    /// Highest argument index referenced, -1 for none.
    pub max_referenced_argument: i32,
    surrounding_loop: Option<LoopKind>,
    finally_statements: Vec<Vec<Stmt>>,
    locals_to_purge: FxHashSet<String>,
    /// Code entry name -> function name, for child fragments.
    pub sub_function_names: FxHashMap<String, String>,
    pending_functions: IndexMap<String, FunctionDeclNode>,
    /// Values passed to a struct literal; `argumentN` inside it reads the Nth.
    pub struct_arguments: Option<Vec<Expr>>,
    /// `Parent(...)` call of a constructor that inherits from another.
    pub base_parent_call: Option<Expr>,
}

impl Default for FragmentContext {
    fn default() -> Self {
        Self::new(String::new(), None, 0)
    }
}

impl FragmentContext {
    pub fn new(
        code_entry_name: impl Into<String>,
        function_name: Option<String>,
        argument_count: u16,
    ) -> Self {
        Self {
            code_entry_name: code_entry_name.into(),
            function_name,
            expression_stack: Vec::new(),
            locals: IndexSet::new(),
            named_arguments: FxHashSet::default(),
            named_argument_by_index: FxHashMap::default(),
            max_referenced_argument: argument_count as i32 - 1,
            surrounding_loop: None,
            finally_statements: Vec::new(),
            locals_to_purge: FxHashSet::default(),
            sub_function_names: FxHashMap::default(),
            pending_functions: IndexMap::new(),
            struct_arguments: None,
            base_parent_call: None,
        }
    }

    pub fn code_entry_name(&self) -> &str {
        &self.code_entry_name
    }

    pub fn push(&mut self, expr: Expr) {
        self.expression_stack.push(expr);
    }

    pub fn pop(&mut self, address: u32) -> Result<Expr, DecompileError> {
        self.expression_stack.pop().ok_or(DecompileError::StackUnderflow { address })
    }

    pub fn try_pop(&mut self) -> Option<Expr> {
        self.expression_stack.pop()
    }

    pub fn peek_mut(&mut self, address: u32) -> Result<&mut Expr, DecompileError> {
        self.expression_stack.last_mut().ok_or(DecompileError::StackUnderflow { address })
    }

    pub fn stack_depth(&self) -> usize {
        self.expression_stack.len()
    }

    pub fn stack(&self) -> &[Expr] {
        &self.expression_stack
    }

    pub fn add_local(&mut self, name: &str) {
        if !self.locals.contains(name) {
            self.locals.insert(name.to_string());
        }
    }

    pub fn locals(&self) -> impl Iterator<Item = &str> {
        self.locals.iter().map(String::as_str)
    }

    pub fn remove_local(&mut self, name: &str) {
        self.locals.shift_remove(name);
    }

    pub fn flag_for_purge(&mut self, name: &str) {
        self.locals_to_purge.insert(name.to_string());
    }

    pub fn purge_locals(&mut self) {
        let purge: Vec<String> = self.locals_to_purge.drain().collect();
        for name in purge {
            self.remove_local(&name);
        }
    }

    pub fn surrounding_loop(&self) -> Option<LoopKind> {
        self.surrounding_loop
    }

    /// Sets the surrounding loop, returning the previous one for `exit_loop`.
    pub fn enter_loop(&mut self, kind: LoopKind) -> Option<LoopKind> {
        self.surrounding_loop.replace(kind)
    }

    pub fn exit_loop(&mut self, previous: Option<LoopKind>) {
        self.surrounding_loop = previous;
    }

    pub fn push_finally(&mut self, statements: Vec<Stmt>) {
        self.finally_statements.push(statements);
    }

    pub fn pop_finally(&mut self) -> Option<Vec<Stmt>> {
        self.finally_statements.pop()
    }

    pub fn current_finally(&self) -> Option<&[Stmt]> {
        self.finally_statements.last().map(Vec::as_slice)
    }

    pub fn is_struct_entry(&self) -> bool {
        self.code_entry_name.contains(STRUCT_ENTRY_MARKER)
    }

    pub fn add_pending_function(&mut self, code_entry_name: String, decl: FunctionDeclNode) {
        self.pending_functions.insert(code_entry_name, decl);
    }

    pub fn take_pending_function(&mut self, code_entry_name: &str) -> Option<FunctionDeclNode> {
        self.pending_functions.shift_remove(code_entry_name)
    }

    /// Returns the name argument `index` is shown as, or `None` when the
    /// dialect has no named arguments. Names are memoized per index and
    /// never collide with locals or other arguments.
    pub fn resolve_named_argument(
        &mut self,
        index: usize,
        named_arguments: bool,
        resolver: &dyn NamedArgumentResolver,
        settings: &DecompileSettings,
    ) -> Option<String> {
        if !named_arguments {
            return None;
        }

        if let Some(existing) = self.named_argument_by_index.get(&index) {
            return Some(existing.clone());
        }

        let mut name = resolver
            .resolve_argument(&self.code_entry_name, index)
            .unwrap_or_else(|| settings.format_unknown_argument(index));

        while self.locals.contains(&name) || self.named_arguments.contains(&name) {
            name.push('_');
        }

        self.named_arguments.insert(name.clone());
        self.named_argument_by_index.insert(index, name.clone());
        Some(name)
    }
}
