// AST visitor for formatting

use crate::config::Config;
use unibox_ast::*;
use unibox_lexer::escape_string;

/// Formatting visitor that traverses AST and generates formatted output
pub struct FormattingVisitor<'a> {
    config: &'a Config,
    output: String,
    indent_level: usize,
}

impl<'a> FormattingVisitor<'a> {
    /// Create new formatting visitor
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            output: String::new(),
            indent_level: 0,
        }
    }

    /// Get formatted output
    pub fn output(self) -> String {
        self.output
    }

    /// Visit a whole file
    pub fn visit_file(&mut self, file: &SourceFile) {
        for import in &file.imports {
            self.visit_import(import);
        }

        if !file.imports.is_empty() && !file.items.is_empty() {
            self.write_line("");
        }

        for (i, item) in file.items.iter().enumerate() {
            if i > 0 {
                for _ in 0..self.config.blank_lines_between_items {
                    self.write_line("");
                }
            }
            self.visit_item(item);
        }
    }

    fn visit_import(&mut self, import: &Import) {
        let line = match &import.alias {
            Some(alias) => format!("import {} \"{}\";", alias, escape_string(&import.path)),
            None => format!("import \"{}\";", escape_string(&import.path)),
        };
        self.write_line(&line);
    }

    fn visit_item(&mut self, item: &Item) {
        match item {
            Item::Function(func) => self.visit_function(func),
            Item::Var(global) => self.visit_global("var", global),
            Item::Const(global) => self.visit_global("const", global),
            Item::TypeAlias(alias) => {
                let line = format!("type {} = {};", alias.name, alias.target);
                self.write_line(&line);
            }
            Item::Struct(strukt) => self.visit_struct(strukt),
        }
    }

    fn visit_function(&mut self, func: &Function) {
        self.write_indent();
        self.write(&format!("fn {}(", func.name));
        for (i, param) in func.params.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.write(&format!("{}: {}", param.name, param.ty));
        }
        self.write(")");
        if let Some(ret) = &func.return_type {
            self.write(&format!(" -> {}", ret));
        }
        self.write(" ");
        self.visit_block(&func.body);
        self.write("\n");
    }

    fn visit_global(&mut self, keyword: &str, global: &Global) {
        let mut line = format!("{} {}", keyword, global.name);
        if let Some(ty) = &global.ty {
            line.push_str(&format!(": {}", ty));
        }
        if let Some(value) = &global.value {
            line.push_str(" = ");
            line.push_str(&self.format_expression(value));
        }
        line.push(';');
        self.write_line(&line);
    }

    fn visit_struct(&mut self, strukt: &Struct) {
        if strukt.fields.is_empty() {
            self.write_line(&format!("struct {} {{}}", strukt.name));
            return;
        }

        self.write_line(&format!("struct {} {{", strukt.name));
        self.indent_level += 1;
        for field in &strukt.fields {
            self.write_line(&format!("{}: {},", field.name, field.ty));
        }
        self.indent_level -= 1;
        self.write_line("}");
    }

    /// Writes `{ ... }` starting at the current column, without a trailing newline
    fn visit_block(&mut self, block: &Block) {
        if block.statements.is_empty() {
            self.write("{}");
            return;
        }

        self.write("{\n");
        self.indent_level += 1;
        for stmt in &block.statements {
            self.visit_statement(stmt);
        }
        self.indent_level -= 1;
        self.write_indent();
        self.write("}");
    }

    fn visit_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Let { name, ty, value } => {
                let mut line = format!("let {}", name);
                if let Some(ty) = ty {
                    line.push_str(&format!(": {}", ty));
                }
                line.push_str(&format!(" = {};", self.format_expression(value)));
                self.write_line(&line);
            }
            Statement::Assign { target, value } => {
                let line = format!(
                    "{} = {};",
                    self.format_expression(target),
                    self.format_expression(value)
                );
                self.write_line(&line);
            }
            Statement::Return(None) => self.write_line("return;"),
            Statement::Return(Some(value)) => {
                let line = format!("return {};", self.format_expression(value));
                self.write_line(&line);
            }
            Statement::If(if_stmt) => {
                self.write_indent();
                self.visit_if(if_stmt);
                self.write("\n");
            }
            Statement::While { condition, body } => {
                self.write_indent();
                let head = format!("while {} ", self.format_expression(condition));
                self.write(&head);
                self.visit_block(body);
                self.write("\n");
            }
            Statement::Block(block) => {
                self.write_indent();
                self.visit_block(block);
                self.write("\n");
            }
            Statement::Expression(expr) => {
                let line = format!("{};", self.format_expression(expr));
                self.write_line(&line);
            }
        }
    }

    fn visit_if(&mut self, if_stmt: &IfStatement) {
        let head = format!("if {} ", self.format_expression(&if_stmt.condition));
        self.write(&head);
        self.visit_block(&if_stmt.then_block);
        match &if_stmt.else_branch {
            Some(ElseBranch::Block(block)) => {
                self.write(" else ");
                self.visit_block(block);
            }
            Some(ElseBranch::If(nested)) => {
                self.write(" else ");
                self.visit_if(nested);
            }
            None => {}
        }
    }

    /// Expressions print on one line; parentheses are kept exactly as parsed
    pub fn format_expression(&self, expr: &Expression) -> String {
        match expr {
            Expression::Literal(lit) => format_literal(lit),
            Expression::Ident(ident) => ident.name.clone(),
            Expression::Member { object, member } => {
                format!("{}.{}", self.format_expression(object), member)
            }
            Expression::Call { callee, args } => {
                format!(
                    "{}({})",
                    self.format_expression(callee),
                    self.format_list(args)
                )
            }
            Expression::Index { object, index } => format!(
                "{}[{}]",
                self.format_expression(object),
                self.format_expression(index)
            ),
            Expression::Binary { left, op, right } => format!(
                "{} {} {}",
                self.format_expression(left),
                op.symbol(),
                self.format_expression(right)
            ),
            Expression::Unary { op, expr } => {
                format!("{}{}", op.symbol(), self.format_expression(expr))
            }
            Expression::Paren(inner) => format!("({})", self.format_expression(inner)),
            Expression::Array(elements) => format!("[{}]", self.format_list(elements)),
        }
    }

    fn format_list(&self, exprs: &[Expression]) -> String {
        exprs
            .iter()
            .map(|e| self.format_expression(e))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn write_indent(&mut self) {
        let indent = " ".repeat(self.indent_level * self.config.indent_size);
        self.output.push_str(&indent);
    }

    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn write_line(&mut self, s: &str) {
        if !s.is_empty() {
            self.write_indent();
        }
        self.output.push_str(s);
        self.output.push('\n');
    }
}

fn format_literal(lit: &Literal) -> String {
    match lit {
        Literal::Int(n) | Literal::Float(n) => n.clone(),
        Literal::Str(s) => format!("\"{}\"", escape_string(s)),
        Literal::Bool(b) => b.to_string(),
    }
}
