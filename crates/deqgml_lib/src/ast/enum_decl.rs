use crate::DecompileError;
use crate::ast::Stmt;
use crate::cleaner::AstCleaner;
use crate::game::GmlEnum;
use crate::printer::Printer;

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDeclNode {
    pub gml_enum: GmlEnum,
    pub empty_line_before: bool,
    pub empty_line_after: bool,
}

impl EnumDeclNode {
    pub fn new(gml_enum: GmlEnum) -> Self {
        Self {
            gml_enum,
            empty_line_before: false,
            empty_line_after: false,
        }
    }

    pub fn clean(mut self, cleaner: &AstCleaner<'_>) -> Self {
        let around = cleaner.settings().empty_line_around_enums;
        self.empty_line_before = around;
        self.empty_line_after = around;
        self
    }

    /// Members are printed in value order; a value is only written when it
    /// differs from the one the compiler would assign implicitly.
    pub fn print(&self, printer: &mut Printer<'_>) {
        printer.write("enum ");
        printer.write(&self.gml_enum.name);
        printer.open_block();

        let sorted = self.gml_enum.sorted_values();
        let mut expected: i64 = 0;
        for (i, member) in sorted.iter().enumerate() {
            if i > 0 {
                printer.write(",");
                printer.end_line();
            }
            printer.start_line();
            printer.write(&member.name);

            if member.value == expected {
                expected = expected.saturating_add(1);
            } else {
                printer.write(" = ");
                printer.write(&member.value.to_string());
                expected = member.value.saturating_add(1);
            }
        }
        if !sorted.is_empty() {
            printer.end_line();
        }

        printer.close_block();
    }
}

pub fn generate_enum_declarations(cleaner: &AstCleaner<'_>, root: Stmt) -> Result<Stmt, DecompileError> {
    let Stmt::Block(mut block) = root else {
        return Err(DecompileError::UnexpectedStructure { expected: "block" });
    };

    let mut declarations: Vec<Stmt> = cleaner
        .context()
        .enums
        .iter()
        .map(|gml_enum| Stmt::EnumDecl(EnumDeclNode::new(gml_enum.clone()).clean(cleaner)))
        .collect();

    if cleaner.settings().macro_declarations_at_top {
        declarations.append(&mut block.children);
        block.children = declarations;
    } else {
        block.children.append(&mut declarations);
    }
    Ok(Stmt::Block(block))
}
