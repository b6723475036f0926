use tracing::trace;

use crate::DecompileError;
use crate::ast::{AssignNode, Expr, ExprKind, Stmt, VariableNode};
use crate::context::FragmentContext;
use crate::control::Block;
use crate::instruction::{
    COPY_STATIC_FUNCTION, DataType, ExtendedOpcode, InstanceType, Instruction, METHOD_FUNCTION,
    NEW_OBJECT_FUNCTION, OLD_ARRAY_LIMIT, Opcode, TEMP_VARIABLE_NAME, Variable, VariableType,
};
use crate::settings::Dialect;

/// Replays the instructions of a block against the operand stack of one
/// fragment, appending the statements it completes to `output`.
pub(crate) struct BlockSimulator<'a> {
    fragment: &'a mut FragmentContext,
    dialect: Dialect,
    output: &'a mut Vec<Stmt>,
}

impl<'a> BlockSimulator<'a> {
    pub(crate) fn new(
        fragment: &'a mut FragmentContext,
        dialect: Dialect,
        output: &'a mut Vec<Stmt>,
    ) -> Self {
        Self {
            fragment,
            dialect,
            output,
        }
    }

    pub(crate) fn simulate(&mut self, block: &Block) -> Result<(), DecompileError> {
        trace!(
            start = block.start_address,
            instructions = block.instructions.len(),
            depth = self.fragment.stack_depth(),
            "simulating block"
        );
        for instr in &block.instructions {
            self.step(instr)?;
        }
        Ok(())
    }

    fn step(&mut self, instr: &Instruction) -> Result<(), DecompileError> {
        match instr.kind {
            Opcode::Multiply
            | Opcode::Divide
            | Opcode::GmlDivRemainder
            | Opcode::GmlModulo
            | Opcode::Add
            | Opcode::Subtract
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::ShiftLeft
            | Opcode::ShiftRight
            | Opcode::Compare => {
                let right = self.pop(instr)?;
                let left = self.pop(instr)?;
                // Operator nodes drop the address so that repeated code compares equal.
                self.fragment.push(Expr::new(ExprKind::Binary {
                    left: Box::new(left),
                    right: Box::new(right),
                    instruction: instr.clone().at(0),
                }));
            }
            Opcode::Negate | Opcode::Not => {
                let value = self.pop(instr)?;
                self.fragment.push(Expr::new(ExprKind::Unary {
                    value: Box::new(value),
                    instruction: instr.clone().at(0),
                }));
            }
            Opcode::Convert => self.convert(instr)?,
            Opcode::Return => {
                let value = self.pop(instr)?;
                self.drop_inlined_finally();
                self.output.push(Stmt::Return(value));
            }
            Opcode::Exit => {
                self.drop_inlined_finally();
                self.output.push(Stmt::Exit);
            }
            Opcode::PopDelete => self.pop_delete(),
            Opcode::Call => self.call(instr)?,
            Opcode::CallVariable => {
                let function = self.pop(instr)?;
                let instance = self.pop(instr)?;
                let arguments = self.pop_arguments(instr, instr.argument_count as usize)?;
                self.fragment.push(Expr::new(ExprKind::VariableCall {
                    function: Box::new(function),
                    instance: Box::new(instance),
                    arguments,
                }));
            }
            Opcode::Push | Opcode::PushLocal | Opcode::PushGlobal | Opcode::PushBuiltin => self.push(instr)?,
            Opcode::PushImmediate => self.fragment.push(Expr::new(ExprKind::Int16(instr.value_i16()))),
            Opcode::Pop => self.pop_variable(instr)?,
            Opcode::Duplicate => self.duplicate(instr)?,
            Opcode::Extended => self.extended(instr)?,
            Opcode::Branch
            | Opcode::BranchTrue
            | Opcode::BranchFalse
            | Opcode::PushWithContext
            | Opcode::PopWithContext => {}
        }
        Ok(())
    }

    fn pop(&mut self, instr: &Instruction) -> Result<Expr, DecompileError> {
        self.fragment.pop(instr.address)
    }

    fn pop_arguments(&mut self, instr: &Instruction, count: usize) -> Result<Vec<Expr>, DecompileError> {
        (0..count).map(|_| self.pop(instr)).collect()
    }

    fn convert(&mut self, instr: &Instruction) -> Result<(), DecompileError> {
        let top = self.fragment.peek_mut(instr.address)?;
        if let ExprKind::Int16(v @ (0 | 1)) = top.kind {
            if instr.type1 == DataType::Int32 && instr.type2 == DataType::Boolean {
                *top = Expr::new(ExprKind::Boolean(v == 1));
                return Ok(());
            }
            // A 0/1 converted from boolean was a boolean literal all along.
            if instr.type1 == DataType::Boolean {
                *top = Expr::new(ExprKind::Boolean(v == 1)).with_stack_type(instr.type2);
                return Ok(());
            }
        }
        top.stack_type = instr.type2;
        Ok(())
    }

    /// Removes the copy of the enclosing finally block the compiler inlines
    /// before an early return or exit. Only an exact trailing copy is removed.
    fn drop_inlined_finally(&mut self) {
        let Some(finally) = self.fragment.current_finally() else {
            return;
        };
        if !finally.is_empty() && self.output.ends_with(finally) {
            let keep = self.output.len() - finally.len();
            self.output.truncate(keep);
        }
    }

    fn pop_delete(&mut self) {
        let Some(expr) = self.fragment.try_pop() else {
            return;
        };
        if expr.duplicated || matches!(expr.kind, ExprKind::Variable(_)) {
            return;
        }
        self.output.push(Stmt::Expr(expr));
    }

    fn call(&mut self, instr: &Instruction) -> Result<(), DecompileError> {
        let function = instr
            .function
            .clone()
            .ok_or(DecompileError::MalformedInstruction {
                address: instr.address,
                reason: "call without a function",
            })?;

        if function.name == NEW_OBJECT_FUNCTION {
            let constructor = self.pop(instr)?;
            let count = (instr.argument_count as usize).saturating_sub(1);
            let arguments = self.pop_arguments(instr, count)?;
            let expr = match constructor.kind {
                ExprKind::FunctionDecl(mut decl) if decl.context.is_struct_entry() => {
                    decl.context.struct_arguments = Some(arguments);
                    Expr::new(ExprKind::Struct(decl))
                }
                kind => Expr::new(ExprKind::NewObject {
                    function: Box::new(Expr { kind, ..constructor }),
                    arguments,
                }),
            };
            self.fragment.push(expr);
            return Ok(());
        }

        let mut arguments = self.pop_arguments(instr, instr.argument_count as usize)?;

        // An inheriting constructor calls its parent, then copies the parent's
        // statics onto itself. The parent call is still on the stack.
        if function.name == COPY_STATIC_FUNCTION {
            let parent_call = self.pop(instr)?;
            self.fragment.base_parent_call = Some(parent_call);
            return Ok(());
        }

        // `method(owner, function () {})` binds a freshly declared function.
        if function.name == METHOD_FUNCTION
            && arguments.len() == 2
            && matches!(arguments[1].kind, ExprKind::FunctionDecl(_))
        {
            let decl = arguments.swap_remove(1);
            self.fragment.push(decl);
            return Ok(());
        }

        self.fragment.push(Expr::new(ExprKind::FunctionCall { function, arguments }));
        Ok(())
    }

    fn push(&mut self, instr: &Instruction) -> Result<(), DecompileError> {
        let expr = match instr.type1 {
            DataType::Int32 => match &instr.function {
                Some(function) => match self.fragment.take_pending_function(&function.name) {
                    Some(decl) => Expr::new(ExprKind::FunctionDecl(Box::new(decl))),
                    None => Expr::new(ExprKind::FunctionReference(function.clone())),
                },
                None => Expr::new(ExprKind::Int32(instr.value_i32())),
            },
            DataType::String => Expr::new(ExprKind::String(instr.value_string().to_string())),
            DataType::Double => Expr::new(ExprKind::Double(instr.value_f64())),
            DataType::Int64 => Expr::new(ExprKind::Int64(instr.value_i64())),
            DataType::Int16 => Expr::new(ExprKind::Int16(instr.value_i16())),
            DataType::Boolean => Expr::new(ExprKind::Boolean(instr.value_i16() != 0)),
            DataType::Variable => self.push_variable(instr)?,
        };
        self.fragment.push(expr);
        Ok(())
    }

    fn variable_of(&mut self, instr: &Instruction) -> Result<Variable, DecompileError> {
        let variable = instr.variable.clone().ok_or(DecompileError::MalformedInstruction {
            address: instr.address,
            reason: "variable access without a variable",
        })?;
        if variable.instance_type == InstanceType::Local {
            self.fragment.add_local(&variable.name);
            if variable.name == TEMP_VARIABLE_NAME {
                self.fragment.flag_for_purge(&variable.name);
            }
        }
        Ok(variable)
    }

    fn push_variable(&mut self, instr: &Instruction) -> Result<Expr, DecompileError> {
        let variable = self.variable_of(instr)?;
        let placeholder = Expr::new(ExprKind::InstanceType(instr.instance_type));
        let regular_push = instr.kind == Opcode::Push;
        let mut node = VariableNode::new(variable, instr.reference_type, placeholder, regular_push);

        if instr.instance_type == InstanceType::StackTop || node.reference_type == VariableType::StackTop {
            node.left = self.pop(instr)?;
        } else if node.reference_type == VariableType::Array {
            node.array_indices = Some(self.array_indices(instr)?);
            node.left = self.pop(instr)?;
        } else if matches!(node.reference_type, VariableType::MultiPush | VariableType::MultiPushPop) {
            node.array_indices = Some(vec![self.pop(instr)?]);
            node.left = self.pop(instr)?;
        }

        self.resolve_stacktop_owner(instr, &mut node)?;
        Ok(Expr::variable(node))
    }

    /// Structs have no instance id, so the VM leaves a stack-top marker and
    /// the real owner one level further down.
    fn resolve_stacktop_owner(
        &mut self,
        instr: &Instruction,
        node: &mut VariableNode,
    ) -> Result<(), DecompileError> {
        if matches!(node.left.kind, ExprKind::Int16(v) if v == InstanceType::StackTop.as_i16()) {
            node.left = self.pop(instr)?;
        }
        Ok(())
    }

    fn pop_variable(&mut self, instr: &Instruction) -> Result<(), DecompileError> {
        if instr.variable.is_none() {
            // Pop-swap: reorders the stack, produces no statement.
            let e1 = self.pop(instr)?;
            let e2 = self.pop(instr)?;
            for _ in 0..(instr.value_i16() as i32 - 4).max(0) {
                self.pop(instr)?;
            }
            self.fragment.push(e2);
            self.fragment.push(e1);
            return Ok(());
        }

        let variable = self.variable_of(instr)?;
        let mut value = if instr.type1 == DataType::Int32 {
            Some(self.pop(instr)?)
        } else {
            None
        };

        let placeholder = Expr::new(ExprKind::InstanceType(instr.instance_type));
        let mut node = VariableNode::new(variable, instr.reference_type, placeholder, false);
        if node.reference_type == VariableType::StackTop {
            node.left = self.pop(instr)?;
        } else if node.reference_type == VariableType::Array {
            node.array_indices = Some(self.array_indices(instr)?);
            node.left = self.pop(instr)?;
        }
        self.resolve_stacktop_owner(instr, &mut node)?;

        let mut value = match value.take() {
            Some(value) => value,
            None => self.pop(instr)?,
        };
        if instr.type2 == DataType::Boolean {
            if let ExprKind::Int16(v @ (0 | 1)) = value.kind {
                value = Expr::new(ExprKind::Boolean(v == 1));
            }
        }

        // The compiler stores every struct literal's constructor in a static
        // slot before instantiating it.
        let struct_constructor =
            matches!(&value.kind, ExprKind::FunctionDecl(decl) if decl.context.is_struct_entry());
        if value.duplicated && struct_constructor {
            return Ok(());
        }

        self.output.push(Stmt::Assign(AssignNode {
            variable: Expr::variable(node),
            value,
        }));
        Ok(())
    }

    /// Pops an array index, splitting the pre-GMLv2 `a * 32000 + b` encoding
    /// of two-dimensional accesses.
    fn array_indices(&mut self, instr: &Instruction) -> Result<Vec<Expr>, DecompileError> {
        let index = self.pop(instr)?;
        if self.dialect.unified_arrays {
            return Ok(vec![index]);
        }

        if let ExprKind::Binary { left, right, instruction } = &index.kind {
            if let ExprKind::Binary {
                left: first,
                right: stride,
                instruction: multiply,
            } = &left.kind
            {
                if instruction.kind == Opcode::Add
                    && multiply.kind == Opcode::Multiply
                    && is_old_array_limit(stride)
                {
                    return Ok(vec![(**first).clone(), (**right).clone()]);
                }
            }
        }
        Ok(vec![index])
    }

    fn duplicate(&mut self, instr: &Instruction) -> Result<(), DecompileError> {
        let dup_type = instr.type1;
        let type_size = dup_type.size();
        let dup_size = instr.duplication_size as i32;
        let swap_size = instr.duplication_size2 as i32;

        if swap_size != 0 {
            if dup_type == DataType::Variable && dup_size == 0 {
                return Ok(());
            }

            let mut top_remaining = dup_size * type_size;
            let mut top = Vec::new();
            while top_remaining > 0 {
                let expr = self.pop(instr)?;
                top_remaining -= expr.stack_type.size();
                top.push(expr);
            }

            let mut bottom_remaining = swap_size * type_size;
            let mut bottom = Vec::new();
            while bottom_remaining > 0 {
                let expr = self.pop(instr)?;
                bottom_remaining -= expr.stack_type.size();
                bottom.push(expr);
            }

            if top_remaining < 0 || bottom_remaining < 0 {
                return Err(DecompileError::DuplicateSwapOverread {
                    top_requested: dup_size * type_size,
                    top_remaining,
                    bottom_requested: swap_size * type_size,
                    bottom_remaining,
                });
            }

            for expr in top.into_iter().rev() {
                self.fragment.push(expr);
            }
            for expr in bottom.into_iter().rev() {
                self.fragment.push(expr);
            }
            return Ok(());
        }

        let requested = (dup_size + 1) * type_size;
        let mut remaining = requested;
        let mut captured = Vec::new();
        while remaining > 0 {
            let mut expr = self.pop(instr)?;
            expr.duplicated = true;
            remaining -= expr.stack_type.size();
            captured.push(expr);
        }

        if remaining < 0 {
            return Err(DecompileError::DuplicateOverread { requested, remaining });
        }

        for _ in 0..2 {
            for expr in captured.iter().rev() {
                self.fragment.push(expr.clone());
            }
        }
        Ok(())
    }

    fn extended(&mut self, instr: &Instruction) -> Result<(), DecompileError> {
        match instr.ext_kind {
            Some(ExtendedOpcode::SetArrayOwner) => {
                self.pop(instr)?;
            }
            Some(ExtendedOpcode::PushReference) => {
                let expr = match &instr.function {
                    Some(function) => Expr::new(ExprKind::FunctionReference(function.clone())),
                    None => Expr::new(ExprKind::Int32(instr.value_i32())),
                };
                self.fragment.push(expr);
            }
            _ => {}
        }
        Ok(())
    }
}

fn is_old_array_limit(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Int32(v) if v == OLD_ARRAY_LIMIT)
}
