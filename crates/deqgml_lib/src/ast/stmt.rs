use crate::DecompileError;
use crate::ast::{EnumDeclNode, Expr, ExprKind, FunctionDeclNode};
use crate::cleaner::AstCleaner;
use crate::printer::Printer;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(BlockNode),
    Expr(Expr),
    Assign(AssignNode),
    /// `static name = value;`
    StaticVar(AssignNode),
    Return(Expr),
    Exit,
    Break,
    Continue,
    If(IfNode),
    While(WhileNode),
    Try(TryNode),
    /// `var a, b;` at the top of a fragment.
    LocalVarDecl(Vec<String>),
    FunctionDecl(Box<FunctionDeclNode>),
    EnumDecl(EnumDeclNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub children: Vec<Stmt>,
    pub use_braces: bool,
}

impl Default for BlockNode {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            use_braces: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignNode {
    pub variable: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub condition: Expr,
    pub true_block: BlockNode,
    pub else_block: Option<BlockNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileNode {
    pub condition: Expr,
    pub body: BlockNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryNode {
    pub try_block: BlockNode,
    pub finally_block: Option<BlockNode>,
}

impl BlockNode {
    pub fn new(children: Vec<Stmt>) -> Self {
        Self {
            children,
            use_braces: true,
        }
    }

    pub fn clean(mut self, cleaner: &mut AstCleaner<'_>) -> Result<Self, DecompileError> {
        self.children = self
            .children
            .into_iter()
            .map(|child| child.clean(cleaner))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    pub fn print<'a>(&'a self, printer: &mut Printer<'a>) -> Result<(), DecompileError> {
        if self.use_braces {
            printer.open_block();
        }

        let mut pending_empty_line = false;
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 && (pending_empty_line || child.empty_line_before()) {
                printer.empty_line();
            }
            printer.start_line();
            child.print(printer)?;
            if child.semicolon_after() {
                printer.write(";");
            }
            printer.end_line();
            pending_empty_line = child.empty_line_after();
        }

        if self.use_braces {
            printer.close_block();
        }
        Ok(())
    }
}

impl Stmt {
    pub fn semicolon_after(&self) -> bool {
        match self {
            Stmt::Expr(_)
            | Stmt::Assign(_)
            | Stmt::StaticVar(_)
            | Stmt::Return(_)
            | Stmt::Exit
            | Stmt::Break
            | Stmt::Continue
            | Stmt::LocalVarDecl(_) => true,
            Stmt::Block(_)
            | Stmt::If(_)
            | Stmt::While(_)
            | Stmt::Try(_)
            | Stmt::FunctionDecl(_)
            | Stmt::EnumDecl(_) => false,
        }
    }

    pub fn empty_line_before(&self) -> bool {
        match self {
            Stmt::FunctionDecl(decl) => decl.empty_line_before,
            Stmt::EnumDecl(decl) => decl.empty_line_before,
            _ => false,
        }
    }

    pub fn empty_line_after(&self) -> bool {
        match self {
            Stmt::FunctionDecl(decl) => decl.empty_line_after,
            Stmt::EnumDecl(decl) => decl.empty_line_after,
            _ => false,
        }
    }

    pub fn clean(self, cleaner: &mut AstCleaner<'_>) -> Result<Stmt, DecompileError> {
        Ok(match self {
            Stmt::Block(block) => Stmt::Block(block.clean(cleaner)?),
            Stmt::Expr(expr) => Stmt::Expr(expr.clean(cleaner)?),
            Stmt::Assign(assign) => assign.clean(cleaner)?,
            Stmt::StaticVar(assign) => Stmt::StaticVar(AssignNode {
                variable: assign.variable.clean(cleaner)?,
                value: assign.value.clean(cleaner)?,
            }),
            Stmt::Return(value) => Stmt::Return(value.clean(cleaner)?),
            Stmt::If(node) => Stmt::If(IfNode {
                condition: node.condition.clean(cleaner)?,
                true_block: node.true_block.clean(cleaner)?,
                else_block: node.else_block.map(|b| b.clean(cleaner)).transpose()?,
            }),
            Stmt::While(node) => Stmt::While(WhileNode {
                condition: node.condition.clean(cleaner)?,
                body: node.body.clean(cleaner)?,
            }),
            Stmt::Try(node) => Stmt::Try(TryNode {
                try_block: node.try_block.clean(cleaner)?,
                finally_block: node.finally_block.map(|b| b.clean(cleaner)).transpose()?,
            }),
            Stmt::FunctionDecl(decl) => Stmt::FunctionDecl(Box::new(decl.clean(cleaner)?)),
            Stmt::EnumDecl(decl) => Stmt::EnumDecl(decl.clean(cleaner)),
            other @ (Stmt::Exit | Stmt::Break | Stmt::Continue | Stmt::LocalVarDecl(_)) => other,
        })
    }

    pub fn print<'a>(&'a self, printer: &mut Printer<'a>) -> Result<(), DecompileError> {
        match self {
            Stmt::Block(block) => block.print(printer)?,
            Stmt::Expr(expr) => expr.print(printer)?,
            Stmt::Assign(assign) => assign.print(printer)?,
            Stmt::StaticVar(assign) => {
                printer.write("static ");
                assign.print(printer)?;
            }
            Stmt::Return(value) => {
                printer.write("return ");
                value.print(printer)?;
            }
            Stmt::Exit => printer.write("exit"),
            Stmt::Break => printer.write("break"),
            Stmt::Continue => printer.write("continue"),
            Stmt::If(node) => {
                printer.write("if (");
                node.condition.print(printer)?;
                printer.write(")");
                node.true_block.print(printer)?;
                if let Some(else_block) = &node.else_block {
                    printer.continue_after_block("else");
                    else_block.print(printer)?;
                }
            }
            Stmt::While(node) => {
                printer.write("while (");
                node.condition.print(printer)?;
                printer.write(")");
                node.body.print(printer)?;
            }
            Stmt::Try(node) => {
                printer.write("try");
                node.try_block.print(printer)?;
                if let Some(finally_block) = &node.finally_block {
                    printer.continue_after_block("finally");
                    finally_block.print(printer)?;
                }
            }
            Stmt::LocalVarDecl(names) => {
                printer.write("var ");
                printer.write(&names.join(", "));
            }
            Stmt::FunctionDecl(decl) => decl.print(printer)?,
            Stmt::EnumDecl(decl) => decl.print(printer),
        }
        Ok(())
    }
}

impl AssignNode {
    fn print<'a>(&'a self, printer: &mut Printer<'a>) -> Result<(), DecompileError> {
        self.variable.print(printer)?;
        printer.write(" = ");
        self.value.print(printer)
    }

    fn clean(self, cleaner: &mut AstCleaner<'_>) -> Result<Stmt, DecompileError> {
        let variable = self.variable.clean(cleaner)?;
        let mut value = self.value.clean(cleaner)?;

        let target = variable.as_variable().map(|v| v.variable.name.as_str());
        if let Some(ty) = target.and_then(|name| cleaner.variable_macro_type(name)) {
            value = cleaner.resolve_macro(ty, value);
        }

        // `name = function name() {}` is how a named declaration is bound.
        match value.kind {
            ExprKind::FunctionDecl(decl) if decl.name.is_some() && decl.name.as_deref() == target => {
                Ok(Stmt::FunctionDecl(decl))
            }
            kind => Ok(Stmt::Assign(AssignNode {
                variable,
                value: Expr { kind, ..value },
            })),
        }
    }
}
