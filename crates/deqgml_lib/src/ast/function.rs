use std::collections::BTreeMap;
use std::mem;

use crate::DecompileError;
use crate::ast::{AssignNode, BlockNode, Expr, ExprKind, Stmt};
use crate::cleaner::AstCleaner;
use crate::context::FragmentContext;
use crate::instruction::{ComparisonType, Opcode};
use crate::printer::Printer;

/// A nested fragment: named function, anonymous function or constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclNode {
    pub name: Option<String>,
    pub is_constructor: bool,
    pub body: BlockNode,
    pub context: FragmentContext,
    pub argument_default_values: BTreeMap<usize, Expr>,
    pub parameters: Vec<String>,
    pub empty_line_before: bool,
    pub empty_line_after: bool,
}

impl FunctionDeclNode {
    pub fn new(
        name: Option<String>,
        is_constructor: bool,
        body: BlockNode,
        context: FragmentContext,
    ) -> Self {
        Self {
            name,
            is_constructor,
            body,
            context,
            argument_default_values: BTreeMap::new(),
            parameters: Vec::new(),
            empty_line_before: false,
            empty_line_after: false,
        }
    }

    pub fn clean(mut self, cleaner: &mut AstCleaner<'_>) -> Result<Self, DecompileError> {
        cleaner.push_fragment_context(mem::take(&mut self.context));

        self.body = mem::take(&mut self.body).clean(cleaner)?;
        self.body.use_braces = true;

        if let Some(call) = cleaner.top_fragment_context()?.base_parent_call.take() {
            let call = call.clean(cleaner)?;
            cleaner.top_fragment_context()?.base_parent_call = Some(call);
        }

        if cleaner.top_fragment_context()?.is_struct_entry() {
            self.context = cleaner.pop_fragment_context()?;
            return Ok(self);
        }

        let around = cleaner.settings().empty_line_around_function_declarations;
        self.empty_line_before = around;
        self.empty_line_after = around;

        if cleaner.settings().cleanup_default_argument_values {
            self.clean_default_argument_values();
        }

        let max_argument = cleaner.top_fragment_context()?.max_referenced_argument;
        let parameter_count = usize::try_from(max_argument + 1).unwrap_or(0);
        self.parameters = (0..parameter_count)
            .map(|i| -> Result<String, DecompileError> {
                Ok(cleaner
                    .resolve_named_argument(i)?
                    .unwrap_or_else(|| format!("argument{i}")))
            })
            .collect::<Result<_, _>>()?;

        self.context = cleaner.pop_fragment_context()?;
        Ok(self)
    }

    /// Folds the leading `if (argN == undefined) { argN = value; }` checks
    /// into default parameter values. Stops at the first statement that does
    /// not fit; checks matched before it stay folded.
    fn clean_default_argument_values(&mut self) {
        let children = &self.body.children;
        let mut first_if_index = 0;
        let mut child_index = 0;
        let mut last_argument_index: Option<usize> = None;

        while child_index < children.len() {
            let if_node = match &children[child_index] {
                Stmt::LocalVarDecl(_) if last_argument_index.is_none() => {
                    first_if_index += 1;
                    child_index += 1;
                    continue;
                }
                Stmt::If(if_node) => if_node,
                _ => break,
            };

            let ExprKind::Binary {
                left,
                right,
                instruction,
            } = &if_node.condition.kind
            else {
                break;
            };
            if instruction.kind != Opcode::Compare
                || instruction.comparison != Some(ComparisonType::EqualTo)
            {
                break;
            }
            let (Some(argument), Some(undefined)) = (left.as_variable(), right.as_variable()) else {
                break;
            };

            let Some(index) = argument.argument_index() else {
                break;
            };
            if self.argument_default_values.contains_key(&index)
                || last_argument_index.is_some_and(|last| index <= last)
            {
                break;
            }
            if !undefined.is_undefined_variable() || if_node.else_block.is_some() {
                break;
            }

            let [Stmt::Assign(assign)] = if_node.true_block.children.as_slice() else {
                break;
            };
            if assign.variable.as_variable().and_then(|v| v.argument_index()) != Some(index) {
                break;
            }

            self.argument_default_values.insert(index, assign.value.clone());
            last_argument_index = Some(index);
            child_index += 1;
        }

        self.body.children.drain(first_if_index..child_index);
    }

    pub fn print<'a>(&'a self, printer: &mut Printer<'a>) -> Result<(), DecompileError> {
        match &self.name {
            Some(name) => {
                printer.write("function ");
                printer.write(name);
                printer.write("(");
            }
            None => printer.write("function("),
        }

        printer.push_fragment_context(&self.context);
        for (i, parameter) in self.parameters.iter().enumerate() {
            if i > 0 {
                printer.write(", ");
            }
            printer.write(parameter);
            if let Some(default) = self.argument_default_values.get(&i) {
                printer.write(" = ");
                default.print(printer)?;
            }
        }
        printer.write(")");

        if let Some(call) = &self.context.base_parent_call {
            printer.write(" : ");
            call.print(printer)?;
        }
        if self.is_constructor {
            printer.write(" constructor");
        }

        self.body.print(printer)?;
        printer.pop_fragment_context();
        Ok(())
    }

    /// Struct literal form: one `name: value` member per line.
    pub fn print_struct<'a>(&'a self, printer: &mut Printer<'a>) -> Result<(), DecompileError> {
        let members = self
            .body
            .children
            .iter()
            .filter_map(|child| match child {
                Stmt::Assign(assign) => Some(Ok(assign)),
                Stmt::LocalVarDecl(_) => None,
                _ => Some(Err(DecompileError::NotImplemented("statement inside a struct literal"))),
            })
            .collect::<Result<Vec<&AssignNode>, _>>()?;

        if members.is_empty() {
            printer.write("{}");
            return Ok(());
        }

        printer.open_inline_block();
        for (i, member) in members.iter().enumerate() {
            let name = member
                .variable
                .as_variable()
                .map(|v| v.variable.name.as_str())
                .ok_or(DecompileError::UnexpectedStructure {
                    expected: "struct member variable",
                })?;
            printer.start_line();
            printer.write(name);
            printer.write(": ");
            member.value.print(printer)?;
            if i + 1 < members.len() {
                printer.write(",");
            }
            printer.end_line();
        }
        printer.close_block();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DecompileContext;
    use crate::ast::{IfNode, VariableNode};
    use crate::instruction::{DataType, Function, InstanceType, Instruction, Variable, VariableType};
    use crate::settings::Dialect;

    fn variable(name: &str, instance: InstanceType) -> Expr {
        Expr::variable(VariableNode::new(
            Variable::new(name, instance),
            VariableType::Normal,
            Expr::new(ExprKind::InstanceType(instance)),
            false,
        ))
    }

    fn default_check(argument: &str, value: i16) -> Stmt {
        Stmt::If(IfNode {
            condition: Expr::new(ExprKind::Binary {
                left: Box::new(variable(argument, InstanceType::Argument)),
                right: Box::new(variable("undefined", InstanceType::Builtin)),
                instruction: Instruction::compare(
                    ComparisonType::EqualTo,
                    DataType::Variable,
                    DataType::Variable,
                ),
            }),
            true_block: BlockNode::new(vec![Stmt::Assign(AssignNode {
                variable: variable(argument, InstanceType::Argument),
                value: Expr::new(ExprKind::Int16(value)),
            })]),
            else_block: None,
        })
    }

    fn decl(children: Vec<Stmt>) -> FunctionDeclNode {
        FunctionDeclNode::new(
            Some("f".into()),
            false,
            BlockNode::new(children),
            FragmentContext::new("gml_Script_f", Some("f".into()), 2),
        )
    }

    #[test]
    fn default_values_are_folded_after_locals() {
        let mut node = decl(vec![
            Stmt::LocalVarDecl(vec!["tmp".into()]),
            default_check("argument0", 1),
            default_check("argument1", 2),
            Stmt::Exit,
        ]);
        node.clean_default_argument_values();

        assert_eq!(node.argument_default_values.len(), 2);
        assert_eq!(node.argument_default_values[&1].as_integer(), Some(2));
        assert_eq!(node.body.children.len(), 2);
        assert!(matches!(node.body.children[0], Stmt::LocalVarDecl(_)));
        assert!(matches!(node.body.children[1], Stmt::Exit));
    }

    #[test]
    fn folding_is_idempotent() {
        let mut node = decl(vec![default_check("argument0", 1), Stmt::Exit]);
        node.clean_default_argument_values();
        let once = node.clone();
        node.clean_default_argument_values();
        assert_eq!(node, once);
    }

    #[test]
    fn partial_match_keeps_earlier_defaults() {
        let mut node = decl(vec![
            default_check("argument1", 1),
            default_check("argument0", 2),
            Stmt::Exit,
        ]);
        node.clean_default_argument_values();

        assert_eq!(node.argument_default_values.keys().copied().collect::<Vec<_>>(), [1]);
        assert_eq!(node.body.children.len(), 2);
        assert!(matches!(node.body.children[0], Stmt::If(_)));
    }

    #[test]
    fn locals_between_checks_end_the_run() {
        let mut node = decl(vec![
            default_check("argument0", 1),
            Stmt::LocalVarDecl(vec!["tmp".into()]),
            default_check("argument1", 2),
        ]);
        node.clean_default_argument_values();

        assert_eq!(node.argument_default_values.keys().copied().collect::<Vec<_>>(), [0]);
        assert!(matches!(node.body.children[0], Stmt::LocalVarDecl(_)));
        assert!(matches!(node.body.children[1], Stmt::If(_)));
    }

    #[test]
    fn inheriting_constructor_prints_its_parent_call() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let mut fragment = FragmentContext::new("gml_Script_Circle", Some("Circle".into()), 1);
        fragment.base_parent_call = Some(Expr::new(ExprKind::FunctionCall {
            function: Function::new("Shape"),
            arguments: vec![variable("argument0", InstanceType::Argument)],
        }));
        let node = FunctionDeclNode::new(Some("Circle".into()), true, BlockNode::default(), fragment);

        let mut cleaner = AstCleaner::new(&context);
        cleaner.push_fragment_context(FragmentContext::new("gml_GlobalScript_shapes", None, 0));
        let node = node.clean(&mut cleaner).unwrap();

        let mut printer = Printer::new(&context);
        node.print(&mut printer).unwrap();
        assert_eq!(printer.finish(), "function Circle(arg0) : Shape(arg0) constructor {\n}");
    }

    #[test]
    fn check_with_else_is_left_alone() {
        let mut check = default_check("argument0", 1);
        if let Stmt::If(if_node) = &mut check {
            if_node.else_block = Some(BlockNode::default());
        }
        let mut node = decl(vec![check]);
        node.clean_default_argument_values();
        assert!(node.argument_default_values.is_empty());
        assert_eq!(node.body.children.len(), 1);
    }
}
