use crate::DecompileContext;
use crate::context::FragmentContext;
use crate::instruction::Function;
use crate::settings::DecompileSettings;

pub struct Printer<'a> {
    context: &'a DecompileContext,
    fragments: Vec<&'a FragmentContext>,
    out: String,
    indent: usize,
    line_has_text: bool,
}

impl<'a> Printer<'a> {
    pub fn new(context: &'a DecompileContext) -> Self {
        Self {
            context,
            fragments: Vec::new(),
            out: String::new(),
            indent: 0,
            line_has_text: false,
        }
    }

    pub fn settings(&self) -> &'a DecompileSettings {
        &self.context.settings
    }

    pub fn write(&mut self, s: &str) {
        self.out.push_str(s);
        self.line_has_text = true;
    }

    pub fn start_line(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str(&self.context.settings.indent_string);
        }
        self.line_has_text = false;
    }

    pub fn end_line(&mut self) {
        self.out.push('\n');
        self.line_has_text = false;
    }

    pub fn empty_line(&mut self) {
        self.out.push('\n');
    }

    pub fn open_block(&mut self) {
        if self.line_has_text {
            if self.settings().open_block_brace_on_same_line {
                self.write(" ");
            } else {
                self.end_line();
                self.start_line();
            }
        }
        self.write("{");
        self.end_line();
        self.indent += 1;
    }

    pub fn open_inline_block(&mut self) {
        self.write("{");
        self.end_line();
        self.indent += 1;
    }

    pub fn close_block(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.start_line();
        self.write("}");
    }

    pub fn continue_after_block(&mut self, keyword: &str) {
        if self.settings().open_block_brace_on_same_line {
            self.write(" ");
        } else {
            self.end_line();
            self.start_line();
        }
        self.write(keyword);
    }

    pub fn push_fragment_context(&mut self, fragment: &'a FragmentContext) {
        self.fragments.push(fragment);
    }

    pub fn pop_fragment_context(&mut self) {
        self.fragments.pop();
    }

    pub fn top_fragment_context(&self) -> Option<&'a FragmentContext> {
        self.fragments.last().copied()
    }

    /// Name a function reference is printed as: the enclosing fragment's
    /// child functions first, then the global function names.
    pub fn lookup_function_name(&self, function: &Function) -> String {
        if let Some(name) = self
            .top_fragment_context()
            .and_then(|fragment| fragment.sub_function_names.get(&function.name))
        {
            return name.clone();
        }
        if let Some(name) = self.context.global_functions.function_name(function) {
            return name.to_string();
        }
        function.name.clone()
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Dialect;

    #[test]
    fn brace_placement_follows_settings() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let mut printer = Printer::new(&context);
        printer.start_line();
        printer.write("while (x)");
        printer.open_block();
        printer.start_line();
        printer.write("y();");
        printer.end_line();
        printer.close_block();
        printer.end_line();
        assert_eq!(printer.finish(), "while (x) {\n    y();\n}\n");

        let mut settings = context.settings.clone();
        settings.open_block_brace_on_same_line = false;
        settings.indent_string = "\t".into();
        let context = DecompileContext::new(Dialect::gml_v2()).with_settings(settings);
        let mut printer = Printer::new(&context);
        printer.start_line();
        printer.write("while (x)");
        printer.open_block();
        printer.close_block();
        printer.continue_after_block("else");
        printer.end_line();
        assert_eq!(printer.finish(), "while (x)\n{\n}\nelse\n");
    }

    #[test]
    fn function_names_prefer_enclosing_fragment() {
        let context = DecompileContext::new(Dialect::gml_v2());
        let mut fragment = FragmentContext::new("gml_Script_outer", None, 0);
        fragment
            .sub_function_names
            .insert("gml_Script_inner".into(), "inner".into());

        let mut printer = Printer::new(&context);
        let function = Function::new("gml_Script_inner");
        assert_eq!(printer.lookup_function_name(&function), "gml_Script_inner");
        printer.push_fragment_context(&fragment);
        assert_eq!(printer.lookup_function_name(&function), "inner");
    }
}
