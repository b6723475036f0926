use tracing::debug;

use crate::ast::{Expr, Stmt, generate_enum_declarations};
use crate::context::FragmentContext;
use crate::game::MacroType;
use crate::settings::DecompileSettings;
use crate::{DecompileContext, DecompileError};

pub struct AstCleaner<'a> {
    context: &'a DecompileContext,
    fragments: Vec<FragmentContext>,
}

impl<'a> AstCleaner<'a> {
    pub fn new(context: &'a DecompileContext) -> Self {
        Self {
            context,
            fragments: Vec::new(),
        }
    }

    pub fn context(&self) -> &'a DecompileContext {
        self.context
    }

    pub fn settings(&self) -> &'a DecompileSettings {
        &self.context.settings
    }

    pub fn push_fragment_context(&mut self, fragment: FragmentContext) {
        self.fragments.push(fragment);
    }

    pub fn pop_fragment_context(&mut self) -> Result<FragmentContext, DecompileError> {
        self.fragments.pop().ok_or(DecompileError::MissingFragmentContext)
    }

    pub fn top_fragment_context(&mut self) -> Result<&mut FragmentContext, DecompileError> {
        self.fragments.last_mut().ok_or(DecompileError::MissingFragmentContext)
    }

    /// True while cleaning the body of a nested function rather than the
    /// code entry's own body.
    pub fn in_function_declaration(&self) -> bool {
        self.fragments.len() > 1
    }

    pub fn resolve_named_argument(&mut self, index: usize) -> Result<Option<String>, DecompileError> {
        let context = self.context;
        let fragment = self.top_fragment_context()?;
        Ok(fragment.resolve_named_argument(
            index,
            context.dialect.named_arguments,
            context.registry.argument_resolver(),
            &context.settings,
        ))
    }

    pub fn struct_argument(&self, index: usize) -> Option<Expr> {
        self.fragments
            .last()
            .and_then(|fragment| fragment.struct_arguments.as_ref())
            .and_then(|arguments| arguments.get(index))
            .cloned()
    }

    pub fn variable_macro_type(&self, name: &str) -> Option<&'a MacroType> {
        self.context.registry.macro_types.variable_type(name)
    }

    pub fn function_argument_macro_types(&self, function_name: &str) -> Option<&'a [Option<MacroType>]> {
        self.context.registry.macro_types.function_argument_types(function_name)
    }

    pub fn resolve_macro(&self, ty: &MacroType, expr: Expr) -> Expr {
        match expr.as_integer().and_then(|v| ty.resolve(v, &self.context.enums)) {
            Some(kind) => Expr {
                kind,
                ..expr
            },
            None => expr,
        }
    }

    pub fn clean_code_entry(
        &mut self,
        root: Stmt,
        fragment: FragmentContext,
    ) -> Result<(Stmt, FragmentContext), DecompileError> {
        debug!(code_entry = fragment.code_entry_name(), "cleaning");
        self.push_fragment_context(fragment);
        let root = root.clean(self)?;
        let root = generate_enum_declarations(self, root)?;
        let fragment = self.pop_fragment_context()?;
        Ok((root, fragment))
    }
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashMap;

    use super::*;
    use crate::ast::{BlockNode, ExprKind};
    use crate::game::{GameSpecificRegistry, GmlEnum, MacroTypeRegistry};
    use crate::settings::Dialect;

    #[test]
    fn macro_resolution_keeps_unknown_values() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let cleaner = AstCleaner::new(&context);
        let mut names = FxHashMap::default();
        names.insert(255, "c_red".to_string());
        let ty = MacroType::Constants(names);

        let resolved = cleaner.resolve_macro(&ty, Expr::new(ExprKind::Int32(255)));
        assert_eq!(resolved.kind, ExprKind::Macro("c_red".into()));
        let kept = cleaner.resolve_macro(&ty, Expr::new(ExprKind::Int32(7)));
        assert_eq!(kept.kind, ExprKind::Int32(7));
    }

    #[test]
    fn enums_go_to_the_top_or_bottom() {
        let body = Stmt::Block(BlockNode::new(vec![Stmt::Exit]));
        let enums = vec![GmlEnum::new("State", [("Idle", 0)])];

        let context = DecompileContext::new(Dialect::gml_v2()).with_enums(enums.clone());
        let (root, _) = AstCleaner::new(&context)
            .clean_code_entry(body.clone(), FragmentContext::default())
            .unwrap();
        let Stmt::Block(block) = root else { panic!("root is not a block") };
        assert!(matches!(block.children[0], Stmt::EnumDecl(_)));

        let mut settings = context.settings.clone();
        settings.macro_declarations_at_top = false;
        let context = DecompileContext::new(Dialect::gml_v2())
            .with_enums(enums)
            .with_settings(settings)
            .with_registry(GameSpecificRegistry::default().with_macro_types(MacroTypeRegistry::default()));
        let (root, _) = AstCleaner::new(&context)
            .clean_code_entry(body, FragmentContext::default())
            .unwrap();
        let Stmt::Block(block) = root else { panic!("root is not a block") };
        assert!(matches!(block.children[1], Stmt::EnumDecl(_)));
    }

    #[test]
    fn root_must_be_a_block() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let result = AstCleaner::new(&context).clean_code_entry(Stmt::Exit, FragmentContext::default());
        assert!(matches!(result, Err(DecompileError::UnexpectedStructure { expected: "block" })));
    }
}
