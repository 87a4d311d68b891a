// Name resolution over one package of parsed files
//
// A unit is resolved as a package before merging; the merged output is
// resolved the same way afterwards. Lookup order inside code is locals,
// package scope, file imports, universe.

use crate::index::{is_identifier, DependencyIndex, MemberKind};
use crate::scope::{is_universe, ScopeStack, UNIVERSE_FUNCTIONS, UNIVERSE_TYPES};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use unibox_ast::*;
use unibox_diagnostics::{duplicate_declaration, error_codes, fuzzy, undefined_name, Diagnostic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Variable,
    Constant,
    Type,
}

impl SymbolKind {
    fn of(item: &Item) -> Self {
        match item {
            Item::Function(_) => SymbolKind::Function,
            Item::Var(_) => SymbolKind::Variable,
            Item::Const(_) => SymbolKind::Constant,
            Item::TypeAlias(_) | Item::Struct(_) => SymbolKind::Type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolRole {
    Ordinary,
    Entry,
    /// n-th `init` of the unit, in file then source order
    Initializer(usize),
}

/// A top-level declaration
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub role: SymbolRole,
    pub file: usize,
    pub item: usize,
    pub decl: Range<usize>,
    /// (file, span) of every use, declaration excluded
    pub references: Vec<(usize, Range<usize>)>,
    /// Top-level symbols this declaration's body or initializer refers to
    pub deps: BTreeSet<usize>,
}

/// alias -> dependency path, scoped to one file
#[derive(Debug, Clone)]
pub struct ImportBinding {
    pub alias: String,
    pub path: String,
    /// Position in the file's import list
    pub import: usize,
    /// Whether the alias is spelled out in the import
    pub explicit: bool,
    pub decl: Option<Range<usize>>,
    pub references: Vec<Range<usize>>,
}

/// A parsed file handed to the resolver
#[derive(Debug, Clone, Copy)]
pub struct FileInput<'a> {
    pub display: &'a str,
    pub source: &'a str,
    pub ast: &'a SourceFile,
}

#[derive(Debug, Clone, Default)]
pub struct PackageAnalysis {
    /// In file order, then item order; one per item
    pub symbols: Vec<Symbol>,
    /// Package scope; `init` functions are not in it
    pub scope: BTreeMap<String, usize>,
    /// Per file
    pub bindings: Vec<Vec<ImportBinding>>,
    /// Every identifier spelled in each file, plus implicit import names
    pub file_names: Vec<BTreeSet<String>>,
    pub universe_uses: BTreeSet<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PackageAnalysis {
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scope.get(name).and_then(|&id| self.symbols.get(id))
    }

    pub fn binding(&self, file: usize, alias: &str) -> Option<&ImportBinding> {
        self.bindings.get(file)?.iter().find(|b| b.alias == alias)
    }

    pub fn used_names(&self) -> BTreeSet<String> {
        self.file_names.iter().flatten().cloned().collect()
    }

    pub fn symbol_of_item(&self, file: usize, item: usize) -> Option<usize> {
        self.symbols
            .iter()
            .position(|s| s.file == file && s.item == item)
    }
}

pub fn analyze_package(files: &[FileInput<'_>], index: &DependencyIndex) -> PackageAnalysis {
    let mut resolver = Resolver {
        files,
        index,
        analysis: PackageAnalysis::default(),
        file: 0,
        current: None,
        scopes: ScopeStack::new(),
    };

    resolver.declare_items();
    resolver.bind_imports();
    for file in 0..files.len() {
        resolver.resolve_file(file);
    }

    resolver.analysis
}

struct Resolver<'r, 'a> {
    files: &'r [FileInput<'a>],
    index: &'r DependencyIndex,
    analysis: PackageAnalysis,
    file: usize,
    current: Option<usize>,
    scopes: ScopeStack,
}

impl<'r, 'a> Resolver<'r, 'a> {
    fn declare_items(&mut self) {
        let files = self.files;
        for (file, input) in files.iter().enumerate() {
            for (item_idx, item) in input.ast.items.iter().enumerate() {
                let name = item.name();
                let kind = SymbolKind::of(item);
                let id = self.analysis.symbols.len();
                self.analysis.symbols.push(Symbol {
                    name: name.name.clone(),
                    kind,
                    role: SymbolRole::Ordinary,
                    file,
                    item: item_idx,
                    decl: name.span.clone(),
                    references: Vec::new(),
                    deps: BTreeSet::new(),
                });

                if kind == SymbolKind::Function && name.name == "init" {
                    continue;
                }

                match self.analysis.scope.get(&name.name) {
                    Some(&previous) => {
                        let previous = self.symbol_location(previous);
                        let diag =
                            duplicate_declaration(&name.name, self.location(file, &name.span), &previous);
                        self.analysis.diagnostics.push(diag);
                    }
                    None => {
                        self.analysis.scope.insert(name.name.clone(), id);
                    }
                }
            }
        }
    }

    fn bind_imports(&mut self) {
        let files = self.files;
        for (file, input) in files.iter().enumerate() {
            let mut bindings: Vec<ImportBinding> = Vec::new();
            let mut names = BTreeSet::new();
            walk_idents(input.ast, &mut |ident| {
                names.insert(ident.name.clone());
            });

            for (import_idx, import) in input.ast.imports.iter().enumerate() {
                let (alias, span) = match &import.alias {
                    Some(alias) => (alias.name.clone(), alias.span.clone()),
                    None => (self.index.package_name(&import.path), import.span.clone()),
                };

                if !is_identifier(&alias) {
                    self.analysis.diagnostics.push(
                        Diagnostic::error(
                            error_codes::IMPORT_CONFLICT,
                            format!("import \"{}\" needs an explicit alias", import.path),
                            self.location(file, &span),
                        )
                        .with_note(format!("`{}` is not an identifier", alias)),
                    );
                    continue;
                }
                if bindings.iter().any(|b| b.alias == alias) {
                    self.analysis.diagnostics.push(Diagnostic::error(
                        error_codes::IMPORT_CONFLICT,
                        format!("`{}` is imported more than once in this file", alias),
                        self.location(file, &span),
                    ));
                    continue;
                }
                if let Some(&sym) = self.analysis.scope.get(&alias) {
                    let declared = self.symbol_location(sym);
                    self.analysis.diagnostics.push(
                        Diagnostic::error(
                            error_codes::IMPORT_CONFLICT,
                            format!("import `{}` conflicts with a top-level declaration", alias),
                            self.location(file, &span),
                        )
                        .with_note(format!("`{}` is declared at {}", alias, declared)),
                    );
                }
                if UNIVERSE_TYPES.contains(&alias.as_str()) {
                    self.analysis.diagnostics.push(Diagnostic::error(
                        error_codes::IMPORT_CONFLICT,
                        format!("import `{}` shadows the builtin type `{}`", alias, alias),
                        self.location(file, &span),
                    ));
                }

                names.insert(alias.clone());
                bindings.push(ImportBinding {
                    alias,
                    path: import.path.clone(),
                    import: import_idx,
                    explicit: import.alias.is_some(),
                    decl: import.alias.as_ref().map(|a| a.span.clone()),
                    references: Vec::new(),
                });
            }

            self.analysis.bindings.push(bindings);
            self.analysis.file_names.push(names);
        }
    }

    fn resolve_file(&mut self, file: usize) {
        let Some(input) = self.files.get(file).copied() else {
            return;
        };
        self.file = file;

        for (item_idx, item) in input.ast.items.iter().enumerate() {
            self.current = self.analysis.symbol_of_item(file, item_idx);
            match item {
                Item::Function(func) => {
                    self.scopes.push();
                    for param in &func.params {
                        self.resolve_type(&param.ty);
                    }
                    if let Some(ret) = &func.return_type {
                        self.resolve_type(ret);
                    }
                    for param in &func.params {
                        self.scopes.declare(&param.name.name);
                    }
                    self.resolve_block(&func.body);
                    self.scopes.pop();
                }
                Item::Var(global) | Item::Const(global) => {
                    if let Some(ty) = &global.ty {
                        self.resolve_type(ty);
                    }
                    if let Some(value) = &global.value {
                        self.resolve_expr(value);
                    }
                }
                Item::TypeAlias(alias) => self.resolve_type(&alias.target),
                Item::Struct(strukt) => {
                    for field in &strukt.fields {
                        self.resolve_type(&field.ty);
                    }
                }
            }
        }
        self.current = None;
    }

    fn resolve_block(&mut self, block: &Block) {
        self.scopes.push();
        for stmt in &block.statements {
            self.resolve_statement(stmt);
        }
        self.scopes.pop();
    }

    fn resolve_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Let { name, ty, value } => {
                if let Some(ty) = ty {
                    self.resolve_type(ty);
                }
                self.resolve_expr(value);
                self.scopes.declare(&name.name);
            }
            Statement::Assign { target, value } => {
                self.resolve_expr(target);
                self.resolve_expr(value);
            }
            Statement::Return(value) => {
                if let Some(value) = value {
                    self.resolve_expr(value);
                }
            }
            Statement::If(if_stmt) => self.resolve_if(if_stmt),
            Statement::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_block(body);
            }
            Statement::Block(block) => self.resolve_block(block),
            Statement::Expression(expr) => self.resolve_expr(expr),
        }
    }

    fn resolve_if(&mut self, if_stmt: &IfStatement) {
        self.resolve_expr(&if_stmt.condition);
        self.resolve_block(&if_stmt.then_block);
        match &if_stmt.else_branch {
            Some(ElseBranch::Block(block)) => self.resolve_block(block),
            Some(ElseBranch::If(nested)) => self.resolve_if(nested),
            None => {}
        }
    }

    fn resolve_expr(&mut self, expr: &Expression) {
        match expr {
            Expression::Literal(_) => {}
            Expression::Ident(ident) => self.resolve_value(ident),
            Expression::Member { object, member } => {
                if let Expression::Ident(qualifier) = object.as_ref() {
                    if let Some(binding) = self.qualifier(&qualifier.name) {
                        self.resolve_qualified(binding, qualifier, member, false);
                        return;
                    }
                }
                // Field access: only the object is a name reference
                self.resolve_expr(object);
            }
            Expression::Call { callee, args } => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            Expression::Index { object, index } => {
                self.resolve_expr(object);
                self.resolve_expr(index);
            }
            Expression::Binary { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expression::Unary { expr, .. } | Expression::Paren(expr) => self.resolve_expr(expr),
            Expression::Array(elements) => {
                for element in elements {
                    self.resolve_expr(element);
                }
            }
        }
    }

    fn resolve_value(&mut self, ident: &Ident) {
        let name = ident.name.as_str();
        if self.scopes.contains(name) {
            return;
        }
        if let Some(&sym) = self.analysis.scope.get(name) {
            self.reference(sym, ident);
            return;
        }
        if self.binding_index(name).is_some() {
            self.analysis.diagnostics.push(Diagnostic::error(
                error_codes::UNDEFINED_NAME,
                format!("use of package `{}` without a member", name),
                self.location(self.file, &ident.span),
            ));
            return;
        }
        if is_universe(name) {
            self.analysis.universe_uses.insert(name.to_string());
            return;
        }
        self.undefined(ident);
    }

    fn resolve_type(&mut self, ty: &TypeExpr) {
        match ty {
            TypeExpr::Named(ident) => {
                let name = ident.name.as_str();
                if let Some(&sym) = self.analysis.scope.get(name) {
                    if self.analysis.symbols.get(sym).map(|s| s.kind) != Some(SymbolKind::Type) {
                        self.analysis.diagnostics.push(Diagnostic::error(
                            error_codes::UNDEFINED_NAME,
                            format!("`{}` is not a type", name),
                            self.location(self.file, &ident.span),
                        ));
                    }
                    self.reference(sym, ident);
                } else if self.binding_index(name).is_some() {
                    self.analysis.diagnostics.push(Diagnostic::error(
                        error_codes::UNDEFINED_NAME,
                        format!("`{}` is a package, not a type", name),
                        self.location(self.file, &ident.span),
                    ));
                } else if UNIVERSE_TYPES.contains(&name) {
                    self.analysis.universe_uses.insert(name.to_string());
                } else {
                    self.undefined(ident);
                }
            }
            TypeExpr::Qualified { qualifier, name } => {
                match self.binding_index(&qualifier.name) {
                    Some(binding) => self.resolve_qualified(binding, qualifier, name, true),
                    None => self.undefined(qualifier),
                }
            }
            TypeExpr::Slice(inner) => self.resolve_type(inner),
        }
    }

    /// `qualifier.member` where `qualifier` is an import of the current file
    fn resolve_qualified(
        &mut self,
        binding: usize,
        qualifier: &Ident,
        member: &Ident,
        want_type: bool,
    ) {
        let Some(entry) = self
            .analysis
            .bindings
            .get_mut(self.file)
            .and_then(|b| b.get_mut(binding))
        else {
            return;
        };
        entry.references.push(qualifier.span.clone());
        let path = entry.path.clone();

        match self.index.member_kind(&path, &member.name) {
            None => {
                let members = self.package_members(&path);
                let mut diag = Diagnostic::error(
                    error_codes::UNDEFINED_NAME,
                    format!("package \"{}\" has no member `{}`", path, member.name),
                    self.location(self.file, &member.span),
                );
                let similar = fuzzy::find_similar_names(&member.name, &members, 0.8, 3);
                if !similar.is_empty() {
                    diag = diag.with_help(format!("did you mean `{}`?", similar.join("`, `")));
                }
                self.analysis.diagnostics.push(diag);
            }
            Some(MemberKind::Function) | Some(MemberKind::Value) if want_type => {
                self.analysis.diagnostics.push(Diagnostic::error(
                    error_codes::UNDEFINED_NAME,
                    format!("`{}.{}` is not a type", qualifier.name, member.name),
                    self.location(self.file, &member.span),
                ));
            }
            Some(_) => {}
        }
    }

    fn reference(&mut self, sym: usize, ident: &Ident) {
        if let Some(symbol) = self.analysis.symbols.get_mut(sym) {
            symbol.references.push((self.file, ident.span.clone()));
        }
        if let Some(current) = self.current.and_then(|c| self.analysis.symbols.get_mut(c)) {
            current.deps.insert(sym);
        }
    }

    /// Import binding for `name` in expression position, unless shadowed
    fn qualifier(&self, name: &str) -> Option<usize> {
        if self.scopes.contains(name) || self.analysis.scope.contains_key(name) {
            return None;
        }
        self.binding_index(name)
    }

    fn binding_index(&self, name: &str) -> Option<usize> {
        self.analysis
            .bindings
            .get(self.file)?
            .iter()
            .position(|b| b.alias == name)
    }

    fn undefined(&mut self, ident: &Ident) {
        let mut candidates: Vec<String> = self.scopes.names().map(str::to_string).collect();
        candidates.extend(self.analysis.scope.keys().cloned());
        if let Some(bindings) = self.analysis.bindings.get(self.file) {
            candidates.extend(bindings.iter().map(|b| b.alias.clone()));
        }
        candidates.extend(
            UNIVERSE_TYPES
                .iter()
                .chain(UNIVERSE_FUNCTIONS)
                .map(|s| s.to_string()),
        );

        let suggestions = fuzzy::find_similar_names(&ident.name, &candidates, 0.8, 3);
        let mut diag = undefined_name(
            &ident.name,
            self.location(self.file, &ident.span),
            suggestions,
        );
        if ident.name == "init" {
            diag = diag.with_note("`init` functions run automatically and cannot be referenced".to_string());
        }
        self.analysis.diagnostics.push(diag);
    }

    fn package_members(&self, path: &str) -> Vec<String> {
        let Some(info) = self.index.package(path) else {
            return Vec::new();
        };
        info.functions
            .keys()
            .chain(info.values.keys())
            .chain(info.types.iter())
            .cloned()
            .collect()
    }

    fn location(&self, file: usize, span: &Range<usize>) -> unibox_diagnostics::Span {
        match self.files.get(file) {
            Some(input) => {
                unibox_diagnostics::Span::from_file_and_span(input.display, input.source, span.clone())
            }
            None => unibox_diagnostics::Span::unknown(),
        }
    }

    fn symbol_location(&self, sym: usize) -> unibox_diagnostics::Span {
        match self.analysis.symbols.get(sym) {
            Some(symbol) => self.location(symbol.file, &symbol.decl),
            None => unibox_diagnostics::Span::unknown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unibox_parser::parse_source;

    fn analyze(sources: &[(&str, &str)], index: &DependencyIndex) -> PackageAnalysis {
        let asts: Vec<SourceFile> = sources
            .iter()
            .map(|(name, text)| parse_source(name, text).unwrap())
            .collect();
        let inputs: Vec<FileInput> = sources
            .iter()
            .zip(&asts)
            .map(|((name, text), ast)| FileInput {
                display: name,
                source: text,
                ast,
            })
            .collect();
        analyze_package(&inputs, index)
    }

    #[test]
    fn test_references_across_files() {
        let analysis = analyze(
            &[
                ("a.ub", "var count: int = 1;\nfn main() { bump(); println(count); }"),
                ("b.ub", "fn bump() { count = count + 1; }"),
            ],
            &DependencyIndex::default(),
        );

        assert!(analysis.diagnostics.is_empty(), "{:?}", analysis.diagnostics);
        let count = analysis.lookup("count").unwrap();
        assert_eq!(count.references.len(), 3);
        assert_eq!(count.references[0].0, 0);
        assert_eq!(count.references[1].0, 1);
        assert!(analysis.universe_uses.contains("println"));

        let main = analysis.scope["main"];
        let bump = analysis.scope["bump"];
        let count_id = analysis.scope["count"];
        assert!(analysis.symbols[main].deps.contains(&bump));
        assert!(analysis.symbols[main].deps.contains(&count_id));
    }

    #[test]
    fn test_locals_shadow_globals() {
        let analysis = analyze(
            &[("a.ub", "var x: int;\nfn main() { let x = 2; println(x); }")],
            &DependencyIndex::default(),
        );
        assert!(analysis.lookup("x").unwrap().references.is_empty());
    }

    #[test]
    fn test_qualified_references() {
        let analysis = analyze(
            &[(
                "a.ub",
                "import s \"lib/strings\";\nimport \"lib/os\";\nfn main() { let s2 = s.upper(\"x\"); os.exit(0); }",
            )],
            &DependencyIndex::default(),
        );
        assert!(analysis.diagnostics.is_empty(), "{:?}", analysis.diagnostics);
        let s = analysis.binding(0, "s").unwrap();
        assert!(s.explicit);
        assert_eq!(s.references.len(), 1);
        let os = analysis.binding(0, "os").unwrap();
        assert!(!os.explicit);
        assert_eq!(os.path, "lib/os");
        assert!(analysis.file_names[0].contains("os"));
    }

    #[test]
    fn test_local_shadows_import() {
        let analysis = analyze(
            &[(
                "a.ub",
                "import s \"lib/strings\";\nfn main() { let s = [1]; println(s.len); }",
            )],
            &DependencyIndex::default(),
        );
        assert!(analysis.diagnostics.is_empty());
        assert!(analysis.binding(0, "s").unwrap().references.is_empty());
    }

    #[test]
    fn test_unknown_member_of_indexed_package() {
        let index: DependencyIndex = serde_json::from_str(
            r#"{"packages": {"lib/strings": {"functions": {"upper": "string"}}}}"#,
        )
        .unwrap();
        let analysis = analyze(
            &[(
                "a.ub",
                "import \"lib/strings\";\nfn main() { strings.uper(\"x\"); }",
            )],
            &index,
        );
        assert_eq!(analysis.diagnostics.len(), 1);
        assert!(analysis.diagnostics[0].message.contains("has no member `uper`"));
        assert_eq!(
            analysis.diagnostics[0].help.as_deref(),
            Some("did you mean `upper`?")
        );
    }

    #[test]
    fn test_undefined_name_with_suggestion() {
        let analysis = analyze(
            &[("a.ub", "fn main() {\n    prinln(\"x\");\n}")],
            &DependencyIndex::default(),
        );
        assert_eq!(analysis.diagnostics.len(), 1);
        let diag = &analysis.diagnostics[0];
        assert_eq!(diag.code, error_codes::UNDEFINED_NAME);
        assert_eq!((diag.span.line, diag.span.column), (2, 5));
        assert!(diag.help.as_deref().unwrap_or("").contains("println"));
        let suggestion = diag.suggestion.as_ref().unwrap();
        assert_eq!(suggestion.replacement, "println");
        assert_eq!((suggestion.span.line, suggestion.span.column), (2, 5));
    }

    #[test]
    fn test_duplicates_and_import_conflicts() {
        let analysis = analyze(
            &[
                ("a.ub", "import fmt \"lib/fmt\";\nfn helper() {}\nfn main() {}"),
                ("b.ub", "var helper: int;\nfn fmt() {}"),
            ],
            &DependencyIndex::default(),
        );
        let messages: Vec<&str> = analysis
            .diagnostics
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert!(messages.contains(&"`helper` is declared more than once"));
        assert!(messages.contains(&"import `fmt` conflicts with a top-level declaration"));
    }

    #[test]
    fn test_init_not_in_scope() {
        let analysis = analyze(
            &[("a.ub", "fn init() {}\nfn init() {}\nfn main() { init(); }")],
            &DependencyIndex::default(),
        );
        assert_eq!(analysis.symbols.len(), 3);
        assert!(!analysis.scope.contains_key("init"));
        assert_eq!(analysis.diagnostics.len(), 1);
        assert!(analysis.diagnostics[0].message.contains("`init`"));
    }

    #[test]
    fn test_type_positions() {
        let analysis = analyze(
            &[(
                "a.ub",
                "import net \"lib/net\";\nstruct Box { c: net.Conn, n: [Point] }\nstruct Point { x: int }\nfn f(b: Box) -> Point { return b.n[0]; }\nvar v: f;",
            )],
            &DependencyIndex::default(),
        );
        assert_eq!(analysis.diagnostics.len(), 1);
        assert_eq!(analysis.diagnostics[0].message, "`f` is not a type");
        assert_eq!(analysis.lookup("Point").unwrap().references.len(), 2);
        assert_eq!(analysis.binding(0, "net").unwrap().references.len(), 1);
    }
}
