use tracing::{debug, warn};

use crate::ast::{BlockNode, Expr, ExprKind, FunctionDeclNode, IfNode, Stmt, TryNode, WhileNode};
use crate::context::{FragmentContext, LoopKind};
use crate::control::{CodeEntry, ControlNode, FragmentNode};
use crate::simulate::BlockSimulator;
use crate::{DecompileContext, DecompileError};

pub struct AstBuilder<'a> {
    context: &'a DecompileContext,
    fragments: Vec<FragmentContext>,
}

impl<'a> AstBuilder<'a> {
    pub fn new(context: &'a DecompileContext) -> Self {
        Self {
            context,
            fragments: Vec::new(),
        }
    }

    pub fn build(mut self, entry: &CodeEntry) -> Result<(BlockNode, FragmentContext), DecompileError> {
        self.fragments
            .push(FragmentContext::new(entry.name.clone(), None, entry.argument_count));
        let children = self.build_sequence(&entry.body);
        let mut fragment = self.pop_fragment_context()?;
        let mut children = children?;
        finalize_fragment(&mut fragment, &mut children);

        let block = BlockNode {
            children,
            use_braces: false,
        };
        Ok((block, fragment))
    }

    fn top_fragment_context(&mut self) -> Result<&mut FragmentContext, DecompileError> {
        self.fragments.last_mut().ok_or(DecompileError::MissingFragmentContext)
    }

    fn pop_fragment_context(&mut self) -> Result<FragmentContext, DecompileError> {
        self.fragments.pop().ok_or(DecompileError::MissingFragmentContext)
    }

    fn pop_condition(&mut self, construct: &'static str) -> Result<Expr, DecompileError> {
        self.top_fragment_context()?
            .try_pop()
            .ok_or(DecompileError::MissingCondition { construct })
    }

    /// Builds a run of sibling nodes. Child functions declared here and never
    /// bound by a later instruction are emitted where they were declared.
    fn build_sequence(&mut self, nodes: &[ControlNode]) -> Result<Vec<Stmt>, DecompileError> {
        let mut output = Vec::new();
        let mut declared: Vec<(usize, String)> = Vec::new();

        for node in nodes {
            self.build_node(node, &mut output, &mut declared)?;
        }

        // Later statements may have been dropped as an inlined finally copy.
        let parent = self.top_fragment_context()?;
        for (position, code_entry_name) in declared.into_iter().rev() {
            if let Some(decl) = parent.take_pending_function(&code_entry_name) {
                output.insert(position.min(output.len()), Stmt::FunctionDecl(Box::new(decl)));
            }
        }
        Ok(output)
    }

    fn build_node(
        &mut self,
        node: &ControlNode,
        output: &mut Vec<Stmt>,
        declared: &mut Vec<(usize, String)>,
    ) -> Result<(), DecompileError> {
        match node {
            ControlNode::Block(block) => {
                let dialect = self.context.dialect;
                let fragment = self.top_fragment_context()?;
                BlockSimulator::new(fragment, dialect, output).simulate(block)?;
            }
            ControlNode::If {
                then_branch,
                else_branch,
            } => {
                let condition = self.pop_condition("if")?;
                let true_block = BlockNode::new(self.build_sequence(then_branch)?);
                let else_block = match else_branch {
                    Some(nodes) => Some(BlockNode::new(self.build_sequence(nodes)?)),
                    None => None,
                };
                output.push(Stmt::If(IfNode {
                    condition,
                    true_block,
                    else_block,
                }));
            }
            ControlNode::ShortCircuit { logic, conditions } => {
                let mut exprs = Vec::with_capacity(conditions.len());
                for region in conditions {
                    let stmts = self.build_sequence(region)?;
                    output.extend(stmts);
                    exprs.push(self.pop_condition("short-circuit")?);
                }
                self.top_fragment_context()?.push(Expr::new(ExprKind::ShortCircuit {
                    logic: *logic,
                    conditions: exprs,
                }));
            }
            ControlNode::While { condition, body } => {
                let stmts = self.build_sequence(condition)?;
                output.extend(stmts);
                let condition = self.pop_condition("while")?;

                let previous = self.top_fragment_context()?.enter_loop(LoopKind::While);
                let body = self.build_sequence(body);
                self.top_fragment_context()?.exit_loop(previous);

                output.push(Stmt::While(WhileNode {
                    condition,
                    body: BlockNode::new(body?),
                }));
            }
            ControlNode::Break => {
                self.require_loop("break")?;
                output.push(Stmt::Break);
            }
            ControlNode::Continue => {
                self.require_loop("continue")?;
                output.push(Stmt::Continue);
            }
            ControlNode::Try { body, finally } => {
                let finally_block = match finally {
                    Some(nodes) => Some(self.build_sequence(nodes)?),
                    None => None,
                };

                let body = match &finally_block {
                    Some(stmts) => {
                        self.top_fragment_context()?.push_finally(stmts.clone());
                        let body = self.build_sequence(body);
                        self.top_fragment_context()?.pop_finally();
                        body?
                    }
                    None => self.build_sequence(body)?,
                };

                output.push(Stmt::Try(TryNode {
                    try_block: BlockNode::new(body),
                    finally_block: finally_block.map(BlockNode::new),
                }));
            }
            ControlNode::StaticInit { body } => {
                let stmts = self.build_sequence(body)?;
                output.extend(stmts.into_iter().map(|stmt| match stmt {
                    Stmt::Assign(assign) => Stmt::StaticVar(assign),
                    other => other,
                }));
            }
            ControlNode::Fragment(fragment) => {
                let decl = self.build_fragment(fragment)?;
                let parent = self.top_fragment_context()?;
                if let Some(name) = &fragment.function_name {
                    parent
                        .sub_function_names
                        .insert(fragment.code_entry_name.clone(), name.clone());
                }
                parent.add_pending_function(fragment.code_entry_name.clone(), decl);
                declared.push((output.len(), fragment.code_entry_name.clone()));
            }
        }
        Ok(())
    }

    fn require_loop(&mut self, statement: &'static str) -> Result<(), DecompileError> {
        match self.top_fragment_context()?.surrounding_loop() {
            Some(_) => Ok(()),
            None => Err(DecompileError::LoopControlOutsideLoop { statement }),
        }
    }

    fn build_fragment(&mut self, node: &FragmentNode) -> Result<FunctionDeclNode, DecompileError> {
        debug!(code_entry = %node.code_entry_name, function = ?node.function_name, "building fragment");
        self.fragments.push(FragmentContext::new(
            node.code_entry_name.clone(),
            node.function_name.clone(),
            node.argument_count,
        ));
        let children = self.build_sequence(&node.body);
        let mut fragment = self.pop_fragment_context()?;
        let mut children = children?;
        finalize_fragment(&mut fragment, &mut children);

        Ok(FunctionDeclNode::new(
            node.function_name.clone(),
            node.is_constructor,
            BlockNode::new(children),
            fragment,
        ))
    }
}

fn finalize_fragment(fragment: &mut FragmentContext, children: &mut Vec<Stmt>) {
    if fragment.stack_depth() > 0 {
        warn!(
            code_entry = fragment.code_entry_name(),
            depth = fragment.stack_depth(),
            "operand stack not empty at end of fragment"
        );
    }

    fragment.purge_locals();
    let locals: Vec<String> = fragment.locals().map(str::to_string).collect();
    if !locals.is_empty() {
        children.insert(0, Stmt::LocalVarDecl(locals));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Block;
    use crate::instruction::{
        ComparisonType, DataType, ExtendedOpcode, InstanceType, Instruction, Opcode, Variable, VariableType,
    };
    use crate::settings::Dialect;

    fn entry(body: Vec<ControlNode>) -> CodeEntry {
        CodeEntry {
            name: "gml_Object_obj_Step_0".into(),
            argument_count: 0,
            body,
        }
    }

    fn block(instructions: Vec<Instruction>) -> ControlNode {
        ControlNode::Block(Block::new(instructions))
    }

    fn local(name: &str) -> Variable {
        Variable::new(name, InstanceType::Local)
    }

    #[test]
    fn if_consumes_condition_from_previous_block() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let body = vec![
            block(vec![
                Instruction::push_variable(Opcode::PushLocal, local("i"), VariableType::Normal),
                Instruction::push_immediate(3),
                Instruction::compare(ComparisonType::LesserThan, DataType::Variable, DataType::Int16),
                Instruction::new(Opcode::BranchFalse),
            ]),
            ControlNode::If {
                then_branch: vec![block(vec![Instruction::new(Opcode::Exit)])],
                else_branch: None,
            },
        ];

        let (root, fragment) = AstBuilder::new(&context).build(&entry(body)).unwrap();
        assert!(!root.use_braces);
        assert_eq!(fragment.stack_depth(), 0);
        assert!(matches!(&root.children[0], Stmt::LocalVarDecl(names) if names == &["i".to_string()]));
        let Stmt::If(node) = &root.children[1] else {
            panic!("expected if, got {:?}", root.children);
        };
        assert!(matches!(node.true_block.children.as_slice(), [Stmt::Exit]));
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let result = AstBuilder::new(&context).build(&entry(vec![ControlNode::Break]));
        assert!(matches!(
            result,
            Err(DecompileError::LoopControlOutsideLoop { statement: "break" })
        ));
    }

    #[test]
    fn break_inside_while_is_accepted() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let body = vec![ControlNode::While {
            condition: vec![block(vec![Instruction::push_immediate(1)])],
            body: vec![ControlNode::Break],
        }];
        let (root, _) = AstBuilder::new(&context).build(&entry(body)).unwrap();
        let Stmt::While(node) = &root.children[0] else {
            panic!("expected while");
        };
        assert_eq!(node.body.children, [Stmt::Break]);
    }

    #[test]
    fn missing_condition_is_an_error() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let body = vec![ControlNode::If {
            then_branch: vec![],
            else_branch: None,
        }];
        let result = AstBuilder::new(&context).build(&entry(body));
        assert!(matches!(result, Err(DecompileError::MissingCondition { construct: "if" })));
    }

    #[test]
    fn inlined_finally_before_exit_is_removed() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let cleanup = || {
            vec![
                Instruction::push_string("done"),
                Instruction::call("show_debug_message", 1),
                Instruction::new(Opcode::PopDelete),
            ]
        };
        let mut try_body = cleanup();
        try_body.push(Instruction::new(Opcode::Exit));

        let body = vec![ControlNode::Try {
            body: vec![block(try_body)],
            finally: Some(vec![block(cleanup())]),
        }];
        let (root, _) = AstBuilder::new(&context).build(&entry(body)).unwrap();
        let Stmt::Try(node) = &root.children[0] else {
            panic!("expected try");
        };
        assert_eq!(node.try_block.children, [Stmt::Exit]);
        assert_eq!(node.finally_block.as_ref().map(|b| b.children.len()), Some(1));
    }

    fn call_statement(name: &str) -> Vec<Instruction> {
        vec![Instruction::call(name, 0), Instruction::new(Opcode::PopDelete)]
    }

    fn calls(names: &[&str]) -> Vec<Instruction> {
        names.iter().flat_map(|name| call_statement(name)).collect()
    }

    fn child_function(name: &str) -> ControlNode {
        ControlNode::Fragment(FragmentNode {
            code_entry_name: format!("gml_Script_{name}"),
            function_name: Some(name.into()),
            is_constructor: false,
            argument_count: 0,
            body: vec![block(vec![Instruction::new(Opcode::Exit)])],
        })
    }

    fn call_name(stmt: &Stmt) -> Option<&str> {
        match stmt {
            Stmt::Expr(Expr {
                kind: ExprKind::FunctionCall { function, .. },
                ..
            }) => Some(function.name.as_str()),
            _ => None,
        }
    }

    fn try_block(root: &BlockNode) -> &[Stmt] {
        match &root.children[0] {
            Stmt::Try(node) => &node.try_block.children,
            other => panic!("expected try, got {other:?}"),
        }
    }

    #[test]
    fn work_before_exit_survives_a_different_finally() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let mut try_body = calls(&["user_work"]);
        try_body.push(Instruction::new(Opcode::Exit));
        let body = vec![ControlNode::Try {
            body: vec![block(try_body)],
            finally: Some(vec![block(calls(&["cleanup"]))]),
        }];

        let (root, _) = AstBuilder::new(&context).build(&entry(body)).unwrap();
        let children = try_block(&root);
        assert_eq!(children.len(), 2);
        assert_eq!(call_name(&children[0]), Some("user_work"));
        assert_eq!(children[1], Stmt::Exit);
    }

    #[test]
    fn unbound_function_in_try_with_longer_finally() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let body = vec![ControlNode::Try {
            body: vec![
                block(calls(&["w1", "w2"])),
                child_function("h"),
                block(vec![Instruction::new(Opcode::Exit)]),
            ],
            finally: Some(vec![block(calls(&["c1", "c2", "c3"]))]),
        }];

        let (root, _) = AstBuilder::new(&context).build(&entry(body)).unwrap();
        let children = try_block(&root);
        assert_eq!(children.len(), 4);
        assert_eq!(call_name(&children[0]), Some("w1"));
        assert_eq!(call_name(&children[1]), Some("w2"));
        assert!(matches!(&children[2], Stmt::FunctionDecl(decl) if decl.name.as_deref() == Some("h")));
        assert_eq!(children[3], Stmt::Exit);
    }

    #[test]
    fn declaration_inside_a_dropped_finally_copy_is_kept() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let mut tail = calls(&["c2"]);
        tail.push(Instruction::new(Opcode::Exit));
        let body = vec![ControlNode::Try {
            body: vec![block(calls(&["c1"])), child_function("h"), block(tail)],
            finally: Some(vec![block(calls(&["c1", "c2"]))]),
        }];

        let (root, _) = AstBuilder::new(&context).build(&entry(body)).unwrap();
        assert!(matches!(try_block(&root), [Stmt::Exit, Stmt::FunctionDecl(_)]));
    }

    #[test]
    fn static_region_assignments_become_static_variables() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let body = vec![ControlNode::StaticInit {
            body: vec![block(vec![
                Instruction::push_immediate(0),
                Instruction::pop_variable(
                    Variable::new("count", InstanceType::Static),
                    VariableType::Normal,
                    DataType::Int16,
                ),
                Instruction::extended(ExtendedOpcode::SetStaticInitialized),
            ])],
        }];

        let (root, _) = AstBuilder::new(&context).build(&entry(body)).unwrap();
        let [Stmt::StaticVar(assign)] = root.children.as_slice() else {
            panic!("expected one static variable, got {:?}", root.children);
        };
        assert_eq!(assign.variable.as_variable().map(|v| v.variable.name.as_str()), Some("count"));
        assert_eq!(assign.value.as_integer(), Some(0));
    }

    #[test]
    fn unbound_child_function_is_emitted_in_place() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let body = vec![
            block(vec![Instruction::push_immediate(1), Instruction::new(Opcode::PopDelete)]),
            ControlNode::Fragment(FragmentNode {
                code_entry_name: "gml_Script_helper".into(),
                function_name: Some("helper".into()),
                is_constructor: false,
                argument_count: 0,
                body: vec![block(vec![Instruction::new(Opcode::Exit)])],
            }),
            block(vec![Instruction::new(Opcode::Exit)]),
        ];
        let (root, fragment) = AstBuilder::new(&context).build(&entry(body)).unwrap();

        assert_eq!(
            fragment.sub_function_names.get("gml_Script_helper").map(String::as_str),
            Some("helper")
        );
        assert!(matches!(root.children[1], Stmt::FunctionDecl(_)));
        assert!(matches!(root.children[2], Stmt::Exit));
    }
}
