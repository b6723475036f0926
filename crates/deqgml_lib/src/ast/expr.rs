use crate::DecompileError;
use crate::ast::{FunctionDeclNode, binary_operator, precedence, short_circuit_operator};
use crate::cleaner::AstCleaner;
use crate::control::ShortCircuitType;
use crate::instruction::{DataType, Function, InstanceType, Instruction, Opcode, Variable, VariableType};
use crate::printer::Printer;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    /// Set when a `dup` copied this node; a later discard of it is not a
    /// statement.
    pub duplicated: bool,
    pub group: bool,
    pub stack_type: DataType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Boolean(bool),
    InstanceType(InstanceType),
    FunctionReference(Function),
    /// A resolved macro or enum member, printed verbatim.
    Macro(String),
    Variable(Box<VariableNode>),
    Unary {
        value: Box<Expr>,
        instruction: Instruction,
    },
    Binary {
        left: Box<Expr>,
        right: Box<Expr>,
        instruction: Instruction,
    },
    FunctionCall {
        function: Function,
        arguments: Vec<Expr>,
    },
    VariableCall {
        function: Box<Expr>,
        instance: Box<Expr>,
        arguments: Vec<Expr>,
    },
    NewObject {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },
    ShortCircuit {
        logic: ShortCircuitType,
        conditions: Vec<Expr>,
    },
    FunctionDecl(Box<FunctionDeclNode>),
    /// `{ name: value, ... }`; the values live in the fragment context as
    /// struct arguments.
    Struct(Box<FunctionDeclNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableNode {
    pub variable: Variable,
    pub reference_type: VariableType,
    /// Owner of the variable: an instance type, an object index or any
    /// expression yielding an instance.
    pub left: Expr,
    pub array_indices: Option<Vec<Expr>>,
    pub regular_push: bool,
    pub named_argument: Option<String>,
}

impl VariableNode {
    pub fn new(variable: Variable, reference_type: VariableType, left: Expr, regular_push: bool) -> Self {
        Self {
            variable,
            reference_type,
            left,
            array_indices: None,
            regular_push,
            named_argument: None,
        }
    }

    /// Index of the argument this variable reads, for `argumentN` and
    /// `argument[N]`.
    pub fn argument_index(&self) -> Option<usize> {
        let name = self.variable.name.as_str();
        if name == "argument" {
            return match self.array_indices.as_deref() {
                Some([index]) => index.as_integer().and_then(|v| usize::try_from(v).ok()),
                _ => None,
            };
        }
        let digits = name.strip_prefix("argument")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    pub fn is_undefined_variable(&self) -> bool {
        self.variable.name == "undefined" && self.array_indices.is_none()
    }

    fn clean(mut self, cleaner: &mut AstCleaner<'_>) -> Result<Self, DecompileError> {
        self.left = self.left.clean(cleaner)?;
        if let Some(indices) = self.array_indices.take() {
            self.array_indices = Some(clean_all(indices, cleaner)?);
        }

        if let Some(index) = self.argument_index() {
            let fragment = cleaner.top_fragment_context()?;
            fragment.max_referenced_argument = fragment.max_referenced_argument.max(index as i32);
            if cleaner.in_function_declaration() {
                self.named_argument = cleaner.resolve_named_argument(index)?;
            }
        }
        Ok(self)
    }

    fn print<'a>(&'a self, printer: &mut Printer<'a>) -> Result<(), DecompileError> {
        if let Some(name) = &self.named_argument {
            printer.write(name);
            return Ok(());
        }

        let owner = match &self.left.kind {
            ExprKind::InstanceType(it) => Some(*it),
            ExprKind::Int16(v) => Some(InstanceType::from_i16(*v)),
            _ => None,
        };
        match owner {
            Some(
                InstanceType::Own
                | InstanceType::Local
                | InstanceType::Builtin
                | InstanceType::Argument
                | InstanceType::Static
                | InstanceType::StackTop
                | InstanceType::Undefined,
            ) => {}
            Some(it) => {
                printer.write(&it.to_string());
                printer.write(".");
            }
            None => {
                self.left.print(printer)?;
                printer.write(".");
            }
        }

        printer.write(&self.variable.name);
        if let Some(indices) = &self.array_indices {
            printer.write("[");
            print_separated(indices, printer)?;
            printer.write("]");
        }
        Ok(())
    }
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        let stack_type = match &kind {
            ExprKind::Int16(_) | ExprKind::InstanceType(_) => DataType::Int16,
            ExprKind::Int32(_) | ExprKind::FunctionReference(_) => DataType::Int32,
            ExprKind::Int64(_) => DataType::Int64,
            ExprKind::Double(_) => DataType::Double,
            ExprKind::String(_) => DataType::String,
            ExprKind::Boolean(_) | ExprKind::ShortCircuit { .. } => DataType::Boolean,
            ExprKind::Unary { instruction, .. } => instruction.type1,
            ExprKind::Binary { instruction, .. } => binary_stack_type(instruction),
            ExprKind::Macro(_)
            | ExprKind::Variable(_)
            | ExprKind::FunctionCall { .. }
            | ExprKind::VariableCall { .. }
            | ExprKind::NewObject { .. }
            | ExprKind::FunctionDecl(_)
            | ExprKind::Struct(_) => DataType::Variable,
        };
        Self {
            kind,
            duplicated: false,
            group: false,
            stack_type,
        }
    }

    pub fn with_stack_type(mut self, stack_type: DataType) -> Self {
        self.stack_type = stack_type;
        self
    }

    pub fn variable(node: VariableNode) -> Self {
        Expr::new(ExprKind::Variable(Box::new(node)))
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.kind {
            ExprKind::Int16(v) => Some(v as i64),
            ExprKind::Int32(v) => Some(v as i64),
            ExprKind::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&VariableNode> {
        match &self.kind {
            ExprKind::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn clean(self, cleaner: &mut AstCleaner<'_>) -> Result<Expr, DecompileError> {
        let Expr {
            kind,
            duplicated,
            group,
            stack_type,
        } = self;

        let kind = match kind {
            ExprKind::Variable(v) => match v.argument_index().and_then(|i| cleaner.struct_argument(i)) {
                Some(argument) => return Ok(argument),
                None => ExprKind::Variable(Box::new(v.clean(cleaner)?)),
            },
            ExprKind::Unary { value, instruction } => {
                let mut value = value.clean(cleaner)?;
                if precedence(&value).is_some() {
                    value.group = true;
                }
                ExprKind::Unary {
                    value: Box::new(value),
                    instruction,
                }
            }
            ExprKind::Binary {
                left,
                right,
                instruction,
            } => {
                let mut left = left.clean(cleaner)?;
                let mut right = right.clean(cleaner)?;

                if instruction.kind == Opcode::Compare {
                    let macro_type = |e: &Expr| {
                        e.as_variable().and_then(|v| cleaner.variable_macro_type(&v.variable.name))
                    };
                    if let Some(ty) = macro_type(&left) {
                        right = cleaner.resolve_macro(ty, right);
                    } else if let Some(ty) = macro_type(&right) {
                        left = cleaner.resolve_macro(ty, left);
                    }
                }

                let own = binary_operator(&instruction).1;
                if precedence(&left).is_some_and(|p| p < own) {
                    left.group = true;
                }
                if precedence(&right).is_some_and(|p| p <= own) {
                    right.group = true;
                }
                ExprKind::Binary {
                    left: Box::new(left),
                    right: Box::new(right),
                    instruction,
                }
            }
            ExprKind::FunctionCall { function, arguments } => {
                let mut arguments = clean_all(arguments, cleaner)?;
                if let Some(types) = cleaner.function_argument_macro_types(&function.name) {
                    for (argument, ty) in arguments.iter_mut().zip(types) {
                        if let Some(ty) = ty {
                            let value = std::mem::replace(argument, Expr::placeholder());
                            *argument = cleaner.resolve_macro(ty, value);
                        }
                    }
                }
                ExprKind::FunctionCall { function, arguments }
            }
            ExprKind::VariableCall {
                function,
                instance,
                arguments,
            } => ExprKind::VariableCall {
                function: Box::new(function.clean(cleaner)?),
                instance: Box::new(instance.clean(cleaner)?),
                arguments: clean_all(arguments, cleaner)?,
            },
            ExprKind::NewObject { function, arguments } => ExprKind::NewObject {
                function: Box::new(function.clean(cleaner)?),
                arguments: clean_all(arguments, cleaner)?,
            },
            ExprKind::ShortCircuit { logic, conditions } => {
                let mut conditions = clean_all(conditions, cleaner)?;
                for condition in &mut conditions {
                    if matches!(condition.kind, ExprKind::ShortCircuit { .. }) {
                        condition.group = true;
                    }
                }
                ExprKind::ShortCircuit { logic, conditions }
            }
            ExprKind::FunctionDecl(decl) => ExprKind::FunctionDecl(Box::new(decl.clean(cleaner)?)),
            ExprKind::Struct(mut decl) => {
                // Arguments belong to the enclosing fragment.
                if let Some(arguments) = decl.context.struct_arguments.take() {
                    decl.context.struct_arguments = Some(clean_all(arguments, cleaner)?);
                }
                ExprKind::Struct(Box::new(decl.clean(cleaner)?))
            }
            other => other,
        };

        Ok(Expr {
            kind,
            duplicated,
            group,
            stack_type,
        })
    }

    fn placeholder() -> Self {
        Expr::new(ExprKind::Int16(0))
    }

    pub fn print<'a>(&'a self, printer: &mut Printer<'a>) -> Result<(), DecompileError> {
        if self.group {
            printer.write("(");
        }

        match &self.kind {
            ExprKind::Int16(v) => printer.write(&v.to_string()),
            ExprKind::Int32(v) => printer.write(&v.to_string()),
            ExprKind::Int64(v) => printer.write(&v.to_string()),
            ExprKind::Double(v) => printer.write(&v.to_string()),
            ExprKind::String(s) => printer.write(&quote_string(s)),
            ExprKind::Boolean(b) => printer.write(if *b { "true" } else { "false" }),
            ExprKind::InstanceType(it) => printer.write(&it.to_string()),
            ExprKind::FunctionReference(function) => {
                let name = printer.lookup_function_name(function);
                printer.write(&name);
            }
            ExprKind::Macro(name) => printer.write(name),
            ExprKind::Variable(v) => v.print(printer)?,
            ExprKind::Unary { value, instruction } => {
                let op = match instruction.kind {
                    Opcode::Negate => "-",
                    _ if instruction.type1 == DataType::Boolean => "!",
                    _ => "~",
                };
                printer.write(op);
                value.print(printer)?;
            }
            ExprKind::Binary {
                left,
                right,
                instruction,
            } => {
                left.print(printer)?;
                printer.write(" ");
                printer.write(binary_operator(instruction).0);
                printer.write(" ");
                right.print(printer)?;
            }
            ExprKind::FunctionCall { function, arguments } => {
                let name = printer.lookup_function_name(function);
                printer.write(&name);
                print_arguments(arguments, printer)?;
            }
            ExprKind::VariableCall { function, arguments, .. } => {
                function.print(printer)?;
                print_arguments(arguments, printer)?;
            }
            ExprKind::NewObject { function, arguments } => {
                match &function.kind {
                    ExprKind::FunctionReference(_) | ExprKind::Variable(_) | ExprKind::FunctionDecl(_) => {}
                    _ => return Err(DecompileError::NotImplemented("new-object with a computed constructor")),
                }
                printer.write("new ");
                function.print(printer)?;
                print_arguments(arguments, printer)?;
            }
            ExprKind::ShortCircuit { logic, conditions } => {
                let op = short_circuit_operator(*logic).0;
                for (i, condition) in conditions.iter().enumerate() {
                    if i > 0 {
                        printer.write(" ");
                        printer.write(op);
                        printer.write(" ");
                    }
                    condition.print(printer)?;
                }
            }
            ExprKind::FunctionDecl(decl) => decl.print(printer)?,
            ExprKind::Struct(decl) => decl.print_struct(printer)?,
        }

        if self.group {
            printer.write(")");
        }
        Ok(())
    }
}

fn binary_stack_type(instruction: &Instruction) -> DataType {
    let (a, b) = (instruction.type1, instruction.type2);
    if instruction.kind == Opcode::Compare {
        DataType::Boolean
    } else if a == b {
        a
    } else if a == DataType::Variable || b == DataType::Variable {
        DataType::Variable
    } else if a == DataType::Double || b == DataType::Double {
        DataType::Double
    } else if a == DataType::Int64 || b == DataType::Int64 {
        DataType::Int64
    } else {
        DataType::Int32
    }
}

pub(crate) fn clean_all(exprs: Vec<Expr>, cleaner: &mut AstCleaner<'_>) -> Result<Vec<Expr>, DecompileError> {
    exprs.into_iter().map(|e| e.clean(cleaner)).collect()
}

fn print_separated<'a>(exprs: &'a [Expr], printer: &mut Printer<'a>) -> Result<(), DecompileError> {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            printer.write(", ");
        }
        expr.print(printer)?;
    }
    Ok(())
}

fn print_arguments<'a>(arguments: &'a [Expr], printer: &mut Printer<'a>) -> Result<(), DecompileError> {
    printer.write("(");
    print_separated(arguments, printer)?;
    printer.write(")");
    Ok(())
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DecompileContext;
    use crate::ast::{AssignNode, BlockNode, Stmt};
    use crate::context::FragmentContext;
    use crate::instruction::ComparisonType;
    use crate::settings::Dialect;

    fn var(name: &str) -> VariableNode {
        VariableNode::new(
            Variable::new(name, InstanceType::Own),
            VariableType::Normal,
            Expr::new(ExprKind::InstanceType(InstanceType::Own)),
            false,
        )
    }

    #[test]
    fn argument_index_covers_both_spellings() {
        assert_eq!(var("argument3").argument_index(), Some(3));
        assert_eq!(var("argument_count").argument_index(), None);
        assert_eq!(var("argument").argument_index(), None);

        let mut indexed = var("argument");
        indexed.array_indices = Some(vec![Expr::new(ExprKind::Int16(2))]);
        assert_eq!(indexed.argument_index(), Some(2));
    }

    #[test]
    fn stack_types_follow_node_kind() {
        assert_eq!(Expr::new(ExprKind::Int16(1)).stack_type, DataType::Int16);
        assert_eq!(Expr::variable(var("x")).stack_type, DataType::Variable);

        let compare = Instruction::compare(ComparisonType::LesserThan, DataType::Int32, DataType::Double);
        let binary = Expr::new(ExprKind::Binary {
            left: Box::new(Expr::new(ExprKind::Int32(1))),
            right: Box::new(Expr::new(ExprKind::Double(2.0))),
            instruction: compare,
        });
        assert_eq!(binary.stack_type, DataType::Boolean);
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(quote_string("a\"b\\c\n"), r#""a\"b\\c\n""#);
    }

    fn arith(opcode: Opcode, left: Expr, right: Expr) -> Expr {
        Expr::new(ExprKind::Binary {
            left: Box::new(left),
            right: Box::new(right),
            instruction: Instruction::new(opcode).types(DataType::Int16, DataType::Int16),
        })
    }

    fn int(v: i16) -> Expr {
        Expr::new(ExprKind::Int16(v))
    }

    fn render(expr: Expr) -> String {
        let context = DecompileContext::new(Dialect::gml_v2());
        let expr = expr.clean(&mut AstCleaner::new(&context)).unwrap();
        let mut printer = Printer::new(&context);
        expr.print(&mut printer).unwrap();
        printer.finish()
    }

    #[test]
    fn lower_precedence_operands_are_grouped() {
        let sum = arith(Opcode::Add, int(1), int(2));
        assert_eq!(render(arith(Opcode::Multiply, sum, int(3))), "(1 + 2) * 3");

        let difference = arith(Opcode::Subtract, int(2), int(3));
        assert_eq!(render(arith(Opcode::Subtract, int(1), difference)), "1 - (2 - 3)");

        let product = arith(Opcode::Multiply, int(2), int(3));
        assert_eq!(render(arith(Opcode::Add, int(1), product)), "1 + 2 * 3");
    }

    #[test]
    fn owners_are_printed_only_when_meaningful() {
        let mut global = var("score");
        global.left = Expr::new(ExprKind::InstanceType(InstanceType::Global));
        assert_eq!(render(Expr::variable(global)), "global.score");

        let mut object = var("hp");
        object.left = int(4);
        object.array_indices = Some(vec![int(0), int(1)]);
        assert_eq!(render(Expr::variable(object)), "4.hp[0, 1]");

        assert_eq!(render(Expr::variable(var("x"))), "x");
    }

    fn short_circuit(logic: ShortCircuitType, conditions: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::ShortCircuit { logic, conditions })
    }

    #[test]
    fn nested_short_circuits_are_grouped() {
        let either = short_circuit(
            ShortCircuitType::Or,
            vec![Expr::variable(var("b")), Expr::variable(var("c"))],
        );
        let both = short_circuit(ShortCircuitType::And, vec![Expr::variable(var("a")), either]);
        assert_eq!(render(both), "a && (b || c)");
    }

    #[test]
    fn struct_literal_prints_its_arguments_as_members() {
        let member = |name: &str, argument: &str| {
            let mut value = var(argument);
            value.variable.instance_type = InstanceType::Argument;
            Stmt::Assign(AssignNode {
                variable: Expr::variable(var(name)),
                value: Expr::variable(value),
            })
        };
        let mut fragment = FragmentContext::new("gml_Script____struct___0_gml_Object_o_Create_0", None, 2);
        fragment.struct_arguments = Some(vec![int(5), Expr::variable(var("speed"))]);
        let body = BlockNode::new(vec![member("x", "argument0"), member("pace", "argument1")]);
        let decl = FunctionDeclNode::new(None, true, body, fragment);

        assert_eq!(
            render(Expr::new(ExprKind::Struct(Box::new(decl)))),
            "{\n    x: 5,\n    pace: speed\n}"
        );

        let mut fragment = FragmentContext::new("gml_Script____struct___1_gml_Object_o_Create_0", None, 0);
        fragment.struct_arguments = Some(Vec::new());
        let empty = FunctionDeclNode::new(None, true, BlockNode::default(), fragment);
        assert_eq!(render(Expr::new(ExprKind::Struct(Box::new(empty)))), "{}");
    }

    #[test]
    fn new_with_computed_constructor_is_not_printable() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let expr = Expr::new(ExprKind::NewObject {
            function: Box::new(arith(Opcode::Add, int(1), int(2))),
            arguments: vec![],
        });
        let mut printer = Printer::new(&context);
        assert!(matches!(expr.print(&mut printer), Err(DecompileError::NotImplemented(_))));
    }
}
