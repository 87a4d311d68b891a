// Type inference for global initializers
//
// Only as much as is needed to spell the type of `var x = expr;` once the
// initializer moves into a generated function.

use crate::index::DependencyIndex;
use crate::resolve::{FileInput, PackageAnalysis, SymbolKind};
use crate::scope::UNIVERSE_TYPES;
use std::collections::BTreeSet;
use std::fmt;
use unibox_ast::*;

/// Alias chains deeper than this are treated as unresolvable
const MAX_ALIAS_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum InferredType {
    Builtin(String),
    /// Type declared in the unit, by symbol id
    Local(usize),
    /// `<path>.<name>`
    Dependency { path: String, name: String },
    Slice(Box<InferredType>),
}

impl fmt::Display for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferredType::Builtin(name) => f.write_str(name),
            InferredType::Local(id) => write!(f, "<type #{}>", id),
            InferredType::Dependency { path, name } => write!(f, "{}.{}", path, name),
            InferredType::Slice(inner) => write!(f, "[{}]", inner),
        }
    }
}

pub struct TypeEnv<'e, 'a> {
    files: &'e [FileInput<'a>],
    analysis: &'e PackageAnalysis,
    index: &'e DependencyIndex,
}

impl<'e, 'a> TypeEnv<'e, 'a> {
    pub fn new(
        files: &'e [FileInput<'a>],
        analysis: &'e PackageAnalysis,
        index: &'e DependencyIndex,
    ) -> Self {
        Self {
            files,
            analysis,
            index,
        }
    }

    /// Type of a global `var`/`const`: its annotation, else its initializer
    pub fn global_type(&self, symbol: usize) -> Option<InferredType> {
        self.global_type_guarded(symbol, &mut BTreeSet::new())
    }

    fn global_type_guarded(
        &self,
        symbol: usize,
        visiting: &mut BTreeSet<usize>,
    ) -> Option<InferredType> {
        let sym = self.analysis.symbols.get(symbol)?;
        let global = match self.item(symbol)? {
            Item::Var(global) | Item::Const(global) => global,
            _ => return None,
        };
        if let Some(ty) = &global.ty {
            return self.from_type_expr(sym.file, ty);
        }
        if !visiting.insert(symbol) {
            return None;
        }
        let inferred = self.infer(sym.file, global.value.as_ref()?, visiting);
        visiting.remove(&symbol);
        inferred
    }

    /// Meaning of a type written in `file`
    pub fn from_type_expr(&self, file: usize, ty: &TypeExpr) -> Option<InferredType> {
        match ty {
            TypeExpr::Named(ident) => match self.analysis.scope.get(&ident.name) {
                Some(&id) => {
                    let sym = self.analysis.symbols.get(id)?;
                    (sym.kind == SymbolKind::Type).then_some(InferredType::Local(id))
                }
                None if UNIVERSE_TYPES.contains(&ident.name.as_str()) => {
                    Some(InferredType::Builtin(ident.name.clone()))
                }
                None => None,
            },
            TypeExpr::Qualified { qualifier, name } => {
                let binding = self.analysis.binding(file, &qualifier.name)?;
                Some(InferredType::Dependency {
                    path: binding.path.clone(),
                    name: name.name.clone(),
                })
            }
            TypeExpr::Slice(inner) => Some(InferredType::Slice(Box::new(
                self.from_type_expr(file, inner)?,
            ))),
        }
    }

    fn infer(
        &self,
        file: usize,
        expr: &Expression,
        visiting: &mut BTreeSet<usize>,
    ) -> Option<InferredType> {
        match expr {
            Expression::Literal(literal) => Some(InferredType::Builtin(
                match literal {
                    Literal::Int(_) => "int",
                    Literal::Float(_) => "float",
                    Literal::Str(_) => "string",
                    Literal::Bool(_) => "bool",
                }
                .to_string(),
            )),
            Expression::Ident(ident) => {
                let &id = self.analysis.scope.get(&ident.name)?;
                match self.analysis.symbols.get(id)?.kind {
                    SymbolKind::Variable | SymbolKind::Constant => {
                        self.global_type_guarded(id, visiting)
                    }
                    _ => None,
                }
            }
            Expression::Member { object, member } => {
                if let Some(path) = self.qualifier_path(file, object) {
                    return self.index.value_type(path, &member.name);
                }
                let object_ty = self.infer(file, object, visiting)?;
                self.field_type(&object_ty, &member.name)
            }
            Expression::Call { callee, .. } => self.call_result(file, callee, visiting),
            Expression::Index { object, .. } => match self.infer(file, object, visiting)? {
                InferredType::Slice(inner) => Some(*inner),
                InferredType::Builtin(name) if name == "string" => Some(InferredType::Builtin(name)),
                _ => None,
            },
            Expression::Binary { left, op, right } => {
                if op.is_comparison() || op.is_logical() {
                    return Some(InferredType::Builtin("bool".to_string()));
                }
                self.infer(file, left, visiting)
                    .or_else(|| self.infer(file, right, visiting))
            }
            Expression::Unary { op, expr } => match op {
                UnaryOp::Not => Some(InferredType::Builtin("bool".to_string())),
                UnaryOp::Neg => self.infer(file, expr, visiting),
            },
            Expression::Paren(inner) => self.infer(file, inner, visiting),
            Expression::Array(elements) => {
                let first = elements.first()?;
                Some(InferredType::Slice(Box::new(self.infer(file, first, visiting)?)))
            }
        }
    }

    fn call_result(
        &self,
        file: usize,
        callee: &Expression,
        visiting: &mut BTreeSet<usize>,
    ) -> Option<InferredType> {
        match callee {
            Expression::Ident(ident) => match self.analysis.scope.get(&ident.name) {
                Some(&id) => {
                    let sym = self.analysis.symbols.get(id)?;
                    match self.item(id)? {
                        Item::Function(func) => {
                            self.from_type_expr(sym.file, func.return_type.as_ref()?)
                        }
                        _ => None,
                    }
                }
                None if ident.name == "len" => Some(InferredType::Builtin("int".to_string())),
                None => None,
            },
            Expression::Member { object, member } => {
                if let Some(path) = self.qualifier_path(file, object) {
                    return self.index.function_result(path, &member.name);
                }
                match self.infer(file, object, visiting)? {
                    InferredType::Dependency { path, name } => {
                        self.index.method_result(&path, &name, &member.name)
                    }
                    _ => None,
                }
            }
            Expression::Paren(inner) => self.call_result(file, inner, visiting),
            _ => None,
        }
    }

    /// Field of a struct declared in the unit, looking through type aliases
    fn field_type(&self, ty: &InferredType, field: &str) -> Option<InferredType> {
        let mut current = ty.clone();
        for _ in 0..MAX_ALIAS_DEPTH {
            let InferredType::Local(id) = current else {
                return None;
            };
            let sym = self.analysis.symbols.get(id)?;
            match self.item(id)? {
                Item::TypeAlias(alias) => {
                    current = self.from_type_expr(sym.file, &alias.target)?;
                }
                Item::Struct(strukt) => {
                    let decl = strukt.fields.iter().find(|f| f.name.name == field)?;
                    return self.from_type_expr(sym.file, &decl.ty);
                }
                _ => return None,
            }
        }
        None
    }

    /// Dependency path when `object` is an unshadowed import alias
    fn qualifier_path(&self, file: usize, object: &Expression) -> Option<&str> {
        let Expression::Ident(ident) = object else {
            return None;
        };
        if self.analysis.scope.contains_key(&ident.name) {
            return None;
        }
        self.analysis
            .binding(file, &ident.name)
            .map(|b| b.path.as_str())
    }

    fn item(&self, symbol: usize) -> Option<&'a Item> {
        let sym = self.analysis.symbols.get(symbol)?;
        self.files.get(sym.file)?.ast.items.get(sym.item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::analyze_package;
    use unibox_parser::parse_source;

    fn infer_all(sources: &[(&str, &str)], index: &DependencyIndex) -> Vec<(String, Option<InferredType>)> {
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
        let analysis = analyze_package(&inputs, index);
        let env = TypeEnv::new(&inputs, &analysis, index);
        analysis
            .symbols
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind == SymbolKind::Variable)
            .map(|(id, s)| (s.name.clone(), env.global_type(id)))
            .collect()
    }

    fn builtin(name: &str) -> Option<InferredType> {
        Some(InferredType::Builtin(name.to_string()))
    }

    #[test]
    fn test_literals_and_operators() {
        let types = infer_all(
            &[(
                "a.ub",
                "const limit = 10;\nvar a = 1 + 2;\nvar b = \"x\";\nvar c = a < 3;\nvar d = -(2.5);\nvar e = [limit, 2];\nvar f = !c;\nvar g = e[0];\nvar h = len(b);\nfn main() {}",
            )],
            &DependencyIndex::default(),
        );
        let expected = vec![
            ("a", builtin("int")),
            ("b", builtin("string")),
            ("c", builtin("bool")),
            ("d", builtin("float")),
            ("e", Some(InferredType::Slice(Box::new(InferredType::Builtin("int".into()))))),
            ("f", builtin("bool")),
            ("g", builtin("int")),
            ("h", builtin("int")),
        ];
        for ((name, ty), (want_name, want_ty)) in types.iter().zip(expected) {
            assert_eq!(name, want_name);
            assert_eq!(ty, &want_ty, "type of {}", name);
        }
    }

    #[test]
    fn test_function_results_resolve_in_declaring_file() {
        let types = infer_all(
            &[
                ("a.ub", "var conn = open();\nvar none = []; \nfn main() {}"),
                (
                    "b.ub",
                    "import n \"lib/net\";\nfn open() -> n.Conn { return n.dial(); }",
                ),
            ],
            &DependencyIndex::default(),
        );
        assert_eq!(
            types[0].1,
            Some(InferredType::Dependency {
                path: "lib/net".to_string(),
                name: "Conn".to_string()
            })
        );
        assert_eq!(types[1].1, None);
    }

    #[test]
    fn test_dependency_index_results() {
        let index: DependencyIndex = serde_json::from_str(
            r#"{"packages": {
                "lib/net": {
                    "functions": {"dial": "lib/net.Conn"},
                    "values": {"timeout": "int"},
                    "types": ["Conn"],
                    "methods": {"Conn": {"addr": "lib/net/addr.Addr"}}
                }
            }}"#,
        )
        .unwrap();
        let types = infer_all(
            &[(
                "a.ub",
                "import \"lib/net\";\nvar t = net.timeout;\nvar a = net.dial().addr();\nvar m = net.missing();\nfn main() {}",
            )],
            &index,
        );
        assert_eq!(types[0].1, builtin("int"));
        assert_eq!(
            types[1].1,
            Some(InferredType::Dependency {
                path: "lib/net/addr".to_string(),
                name: "Addr".to_string()
            })
        );
        assert_eq!(types[2].1, None);
    }

    #[test]
    fn test_fields_through_aliases() {
        let types = infer_all(
            &[(
                "a.ub",
                "struct Point { x: float }\ntype P = Point;\nvar origin: P;\nvar x = origin.x;\nfn main() {}",
            )],
            &DependencyIndex::default(),
        );
        assert_eq!(types[1].1, builtin("float"));
    }

    #[test]
    fn test_self_reference_is_not_inferable() {
        let types = infer_all(
            &[("a.ub", "var a = b;\nvar b = a;\nfn main() {}")],
            &DependencyIndex::default(),
        );
        assert_eq!(types[0].1, None);
        assert_eq!(types[1].1, None);
    }
}
