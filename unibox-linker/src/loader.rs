// Unit loader: parse, resolve and check one unit against the unit contract
//
// Loading is a pure function of the unit's sources and the dependency index;
// units are loaded in parallel on a bounded rayon pool.

use crate::error::{MergeError, MergeResult, Phase};
use crate::index::{DependencyIndex, MemberKind};
use crate::initorder::initialization_order;
use crate::resolve::{analyze_package, FileInput, PackageAnalysis, Symbol, SymbolKind, SymbolRole};
use crate::source::{validate_unit_name, UnitSource};
use crate::typing::{InferredType, TypeEnv};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use unibox_ast::*;
use unibox_diagnostics::{error_codes, Diagnostic, Span as DiagSpan};
use unibox_parser::parse_source;

/// A parsed file of a loaded unit
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub name: String,
    pub display: String,
    pub source: String,
    pub ast: SourceFile,
}

/// Shape of the entry function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySignature {
    pub takes_args: bool,
    pub returns_status: bool,
}

#[derive(Debug, Clone)]
pub struct LoadedUnit {
    pub name: String,
    pub files: Vec<LoadedFile>,
    pub analysis: PackageAnalysis,
    /// Symbol id of `main`
    pub entry: usize,
    pub signature: EntrySignature,
    /// `init` functions, file then source order
    pub initializers: Vec<usize>,
    /// Globals with an initializer, in initialization order
    pub var_order: Vec<usize>,
    /// Inferred type of every initialized global without annotation
    pub var_types: BTreeMap<usize, InferredType>,
}

impl LoadedUnit {
    pub fn symbol(&self, id: usize) -> Option<&Symbol> {
        self.analysis.symbols.get(id)
    }

    pub fn item(&self, id: usize) -> Option<&Item> {
        let symbol = self.symbol(id)?;
        self.files.get(symbol.file)?.ast.items.get(symbol.item)
    }

    pub fn inputs(&self) -> Vec<FileInput<'_>> {
        inputs(&self.files)
    }
}

fn inputs(files: &[LoadedFile]) -> Vec<FileInput<'_>> {
    files
        .iter()
        .map(|f| FileInput {
            display: &f.display,
            source: &f.source,
            ast: &f.ast,
        })
        .collect()
}

/// Loads every unit on at most `jobs` workers. Units come back sorted by
/// name; the first failure in that order wins.
pub fn load_units(
    sources: &[UnitSource],
    index: &DependencyIndex,
    jobs: usize,
) -> MergeResult<Vec<LoadedUnit>> {
    let mut seen = BTreeSet::new();
    for unit in sources {
        validate_unit_name(&unit.name)?;
        if !seen.insert(unit.name.as_str()) {
            return Err(MergeError::DuplicateUnit {
                phase: Phase::Load,
                name: unit.name.clone(),
            });
        }
    }

    let mut ordered: Vec<&UnitSource> = sources.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| MergeError::internal(Phase::Load, format!("worker pool: {}", e)))?;

    let results: Vec<MergeResult<LoadedUnit>> =
        pool.install(|| ordered.par_iter().map(|unit| load_unit(unit, index)).collect());

    results.into_iter().collect()
}

pub fn load_unit(source: &UnitSource, index: &DependencyIndex) -> MergeResult<LoadedUnit> {
    log::debug!("loading unit `{}` ({} files)", source.name, source.files.len());

    if source.files.is_empty() {
        return Err(MergeError::EmptyUnit {
            phase: Phase::Load,
            unit: source.name.clone(),
            dir: source.name.clone().into(),
        });
    }

    let mut files = Vec::with_capacity(source.files.len());
    for file in &source.files {
        let ast = parse_source(&file.display, &file.text).map_err(|e| MergeError::Parse {
            phase: Phase::Load,
            unit: source.name.clone(),
            source: e,
        })?;
        files.push(LoadedFile {
            name: file.name.clone(),
            display: file.display.clone(),
            source: file.text.clone(),
            ast,
        });
    }

    let file_inputs = inputs(&files);
    let mut analysis = analyze_package(&file_inputs, index);
    let diagnostics = std::mem::take(&mut analysis.diagnostics);
    let mut checker = ContractChecker {
        files: &file_inputs,
        analysis: &analysis,
        index,
        diagnostics,
    };

    let entry = checker.check_entry();
    let initializers = checker.check_initializers();
    checker.check_reserved_names();
    checker.check_constants();
    let var_types = checker.infer_var_types();
    let var_order = checker.check_init_order();

    let diagnostics = checker.diagnostics;
    if let Some(err) = MergeError::from_diagnostics(&source.name, diagnostics) {
        return Err(err);
    }

    let Some((entry, signature)) = entry else {
        return Err(MergeError::internal(Phase::Load, "entry check passed without an entry"));
    };

    if let Some(symbol) = analysis.symbols.get_mut(entry) {
        symbol.role = SymbolRole::Entry;
    }
    for (ordinal, &id) in initializers.iter().enumerate() {
        if let Some(symbol) = analysis.symbols.get_mut(id) {
            symbol.role = SymbolRole::Initializer(ordinal);
        }
    }

    drop(file_inputs);
    log::debug!(
        "unit `{}`: {} symbols, {} initializers, {} initialized globals",
        source.name,
        analysis.symbols.len(),
        initializers.len(),
        var_order.len()
    );

    Ok(LoadedUnit {
        name: source.name.clone(),
        files,
        analysis,
        entry,
        signature,
        initializers,
        var_order,
        var_types,
    })
}

struct ContractChecker<'c, 'a> {
    files: &'c [FileInput<'a>],
    analysis: &'c PackageAnalysis,
    index: &'c DependencyIndex,
    diagnostics: Vec<Diagnostic>,
}

impl<'c, 'a> ContractChecker<'c, 'a> {
    fn functions_named(&self, name: &str) -> Vec<(usize, &'a Function)> {
        self.analysis
            .symbols
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind == SymbolKind::Function && s.name == name)
            .filter_map(|(id, _)| match self.item(id)? {
                Item::Function(func) => Some((id, func)),
                _ => None,
            })
            .collect()
    }

    fn check_entry(&mut self) -> Option<(usize, EntrySignature)> {
        let mains = self.functions_named("main");
        let (id, main) = match mains.as_slice() {
            [] => {
                self.diagnostics.push(
                    Diagnostic::error(
                        error_codes::MISSING_ENTRY,
                        "unit has no entry function".to_string(),
                        self.unit_span(),
                    )
                    .with_help("declare `fn main()` in one of the unit's files".to_string()),
                );
                return None;
            }
            [single] => *single,
            [_, extra, ..] => {
                let (extra_id, _) = *extra;
                self.diagnostics.push(Diagnostic::error(
                    error_codes::MULTIPLE_ENTRY,
                    format!("unit has {} entry functions", mains.len()),
                    self.symbol_span(extra_id),
                ));
                return None;
            }
        };

        let takes_args = match main.params.as_slice() {
            [] => Some(false),
            [param] if self.is_builtin_slice(&param.ty, "string") => Some(true),
            _ => None,
        };
        let returns_status = match &main.return_type {
            None => Some(false),
            Some(ty) if self.is_builtin(ty, "int") => Some(true),
            Some(_) => None,
        };

        match (takes_args, returns_status) {
            (Some(takes_args), Some(returns_status)) => Some((
                id,
                EntrySignature {
                    takes_args,
                    returns_status,
                },
            )),
            _ => {
                self.diagnostics.push(
                    Diagnostic::error(
                        error_codes::BAD_SIGNATURE,
                        "entry function has an unsupported signature".to_string(),
                        self.symbol_span(id),
                    )
                    .with_note(
                        "`main` takes no parameters or one `[string]` and returns nothing or `int`"
                            .to_string(),
                    ),
                );
                None
            }
        }
    }

    fn check_initializers(&mut self) -> Vec<usize> {
        let inits = self.functions_named("init");
        for &(id, func) in &inits {
            if !func.params.is_empty() || func.return_type.is_some() {
                self.diagnostics.push(Diagnostic::error(
                    error_codes::BAD_SIGNATURE,
                    "`init` must take no parameters and return nothing".to_string(),
                    self.symbol_span(id),
                ));
            }
        }
        inits.into_iter().map(|(id, _)| id).collect()
    }

    fn check_reserved_names(&mut self) {
        let analysis = self.analysis;
        for (id, symbol) in analysis.symbols.iter().enumerate() {
            let reserved = symbol.name == "main" || symbol.name == "init";
            if reserved && symbol.kind != SymbolKind::Function {
                self.diagnostics.push(Diagnostic::error(
                    error_codes::RESERVED_NAME,
                    format!("`{}` is reserved for functions", symbol.name),
                    self.symbol_span(id),
                ));
            }
        }
    }

    fn check_constants(&mut self) {
        let analysis = self.analysis;
        for (id, symbol) in analysis.symbols.iter().enumerate() {
            if symbol.kind != SymbolKind::Constant {
                continue;
            }
            let Some(Item::Const(global)) = self.item(id) else {
                continue;
            };
            let Some(value) = &global.value else {
                continue;
            };
            if !self.is_constant(symbol.file, value) {
                self.diagnostics.push(Diagnostic::error(
                    error_codes::NON_CONSTANT,
                    format!("initializer of `{}` is not a constant expression", symbol.name),
                    self.symbol_span(id),
                ));
            }
        }
    }

    fn is_constant(&self, file: usize, expr: &Expression) -> bool {
        match expr {
            Expression::Literal(_) => true,
            Expression::Ident(ident) => self
                .analysis
                .lookup(&ident.name)
                .is_some_and(|s| s.kind == SymbolKind::Constant),
            Expression::Member { object, member } => {
                let Expression::Ident(qualifier) = object.as_ref() else {
                    return false;
                };
                if self.analysis.scope.contains_key(&qualifier.name) {
                    return false;
                }
                let Some(binding) = self.analysis.binding(file, &qualifier.name) else {
                    return false;
                };
                matches!(
                    self.index.member_kind(&binding.path, &member.name),
                    Some(MemberKind::Value) | Some(MemberKind::Unknown)
                )
            }
            Expression::Binary { left, right, .. } => {
                self.is_constant(file, left) && self.is_constant(file, right)
            }
            Expression::Unary { expr, .. } | Expression::Paren(expr) => {
                self.is_constant(file, expr)
            }
            _ => false,
        }
    }

    fn infer_var_types(&mut self) -> BTreeMap<usize, InferredType> {
        let env = TypeEnv::new(self.files, self.analysis, self.index);
        let analysis = self.analysis;
        let mut types = BTreeMap::new();
        for (id, symbol) in analysis.symbols.iter().enumerate() {
            let Some(Item::Var(global)) = self.item(id) else {
                continue;
            };
            if global.ty.is_some() {
                continue;
            }
            match (&global.value, env.global_type(id)) {
                (Some(_), Some(ty)) => {
                    types.insert(id, ty);
                }
                _ => self.diagnostics.push(
                    Diagnostic::error(
                        error_codes::UNTYPED_GLOBAL,
                        format!("cannot determine the type of `{}`", symbol.name),
                        self.symbol_span(id),
                    )
                    .with_help(format!("annotate it: `var {}: <type> = ...;`", symbol.name)),
                ),
            }
        }
        types
    }

    fn check_init_order(&mut self) -> Vec<usize> {
        let initialized: BTreeSet<usize> = (0..self.analysis.symbols.len())
            .filter(|&id| matches!(self.item(id), Some(Item::Var(g)) if g.value.is_some()))
            .collect();

        match initialization_order(self.analysis, &initialized) {
            Ok(order) => order,
            Err(left) => {
                let names: Vec<String> = left
                    .iter()
                    .filter_map(|&id| self.analysis.symbols.get(id))
                    .map(|s| format!("`{}`", s.name))
                    .collect();
                let span = left
                    .first()
                    .map(|&id| self.symbol_span(id))
                    .unwrap_or_else(|| self.unit_span());
                self.diagnostics.push(
                    Diagnostic::error(
                        error_codes::INIT_CYCLE,
                        "initialization cycle between global variables".to_string(),
                        span,
                    )
                    .with_note(format!("involved: {}", names.join(", "))),
                );
                Vec::new()
            }
        }
    }

    fn is_builtin(&self, ty: &TypeExpr, name: &str) -> bool {
        matches!(ty, TypeExpr::Named(ident) if ident.name == name)
            && !self.analysis.scope.contains_key(name)
    }

    fn is_builtin_slice(&self, ty: &TypeExpr, name: &str) -> bool {
        matches!(ty, TypeExpr::Slice(inner) if self.is_builtin(inner, name))
    }

    fn item(&self, id: usize) -> Option<&'a Item> {
        let symbol = self.analysis.symbols.get(id)?;
        self.files.get(symbol.file)?.ast.items.get(symbol.item)
    }

    fn symbol_span(&self, id: usize) -> DiagSpan {
        let located = self.analysis.symbols.get(id).and_then(|symbol| {
            let file = self.files.get(symbol.file)?;
            Some(DiagSpan::from_file_and_span(
                file.display,
                file.source,
                symbol.decl.clone(),
            ))
        });
        located.unwrap_or_else(DiagSpan::unknown)
    }

    fn unit_span(&self) -> DiagSpan {
        match self.files.first() {
            Some(file) => DiagSpan::new(file.display.to_string(), 0, 0, 0),
            None => DiagSpan::unknown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(files: &[(&str, &str)]) -> MergeResult<LoadedUnit> {
        load_unit(
            &UnitSource::new("u", files.iter().copied()),
            &DependencyIndex::default(),
        )
    }

    fn violation_codes(result: MergeResult<LoadedUnit>) -> Vec<String> {
        match result {
            Err(MergeError::ContractViolation { diagnostics, .. }) => {
                diagnostics.into_iter().map(|d| d.code).collect()
            }
            other => panic!("expected contract violation, got {:?}", other.map(|u| u.name)),
        }
    }

    #[test]
    fn test_loads_roles_and_signature() {
        let unit = load(&[
            ("a.ub", "fn init() {}\nfn main(args: [string]) -> int { return len(args); }"),
            ("b.ub", "fn init() {}\nfn init() {}"),
        ])
        .unwrap();

        assert_eq!(unit.files.len(), 2);
        assert_eq!(
            unit.signature,
            EntrySignature {
                takes_args: true,
                returns_status: true
            }
        );
        assert_eq!(unit.symbol(unit.entry).unwrap().role, SymbolRole::Entry);
        assert_eq!(unit.initializers.len(), 3);
        let roles: Vec<_> = unit
            .initializers
            .iter()
            .map(|&id| (unit.symbol(id).unwrap().file, unit.symbol(id).unwrap().role))
            .collect();
        assert_eq!(
            roles,
            vec![
                (0, SymbolRole::Initializer(0)),
                (1, SymbolRole::Initializer(1)),
                (1, SymbolRole::Initializer(2)),
            ]
        );
    }

    #[test]
    fn test_parse_error_names_unit_and_file() {
        let err = load(&[("bad.ub", "fn main( {}")]).unwrap_err();
        match &err {
            MergeError::Parse { unit, source, .. } => {
                assert_eq!(unit, "u");
                assert_eq!(source.location().file, "u/bad.ub");
            }
            other => panic!("unexpected error {}", other),
        }
        assert_eq!(err.phase(), Phase::Load);
    }

    #[test]
    fn test_entry_contract() {
        assert_eq!(
            violation_codes(load(&[("a.ub", "fn helper() {}")])),
            vec![error_codes::MISSING_ENTRY]
        );
        assert_eq!(
            violation_codes(load(&[("a.ub", "fn main(n: int) {}")])),
            vec![error_codes::BAD_SIGNATURE]
        );
        assert_eq!(
            violation_codes(load(&[("a.ub", "fn main() -> string { return \"\"; }")])),
            vec![error_codes::BAD_SIGNATURE]
        );
        let codes = violation_codes(load(&[("a.ub", "fn main() {}"), ("b.ub", "fn main() {}")]));
        assert!(codes.contains(&error_codes::MULTIPLE_ENTRY.to_string()));
    }

    #[test]
    fn test_init_and_reserved_names() {
        assert_eq!(
            violation_codes(load(&[("a.ub", "fn init(x: int) {}\nfn main() {}")])),
            vec![error_codes::BAD_SIGNATURE]
        );
        assert_eq!(
            violation_codes(load(&[("a.ub", "var init: int;\nfn main() {}")])),
            vec![error_codes::RESERVED_NAME]
        );
    }

    #[test]
    fn test_constants_must_be_constant() {
        assert!(load(&[(
            "a.ub",
            "import m \"lib/math\";\nconst a = 1;\nconst b = (a + m.pi) * -2;\nfn main() {}"
        )])
        .is_ok());
        assert_eq!(
            violation_codes(load(&[("a.ub", "const a = f();\nfn f() -> int { return 1; }\nfn main() {}")])),
            vec![error_codes::NON_CONSTANT]
        );
    }

    #[test]
    fn test_global_types_and_order() {
        let unit = load(&[(
            "a.ub",
            "var total = base + 1;\nvar base = 41;\nvar label: string = \"x\";\nfn main() {}",
        )])
        .unwrap();
        let names: Vec<_> = unit
            .var_order
            .iter()
            .map(|&id| unit.symbol(id).unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["base", "total", "label"]);
        assert_eq!(unit.var_types.len(), 2);

        assert_eq!(
            violation_codes(load(&[("a.ub", "var x = [];\nfn main() {}")])),
            vec![error_codes::UNTYPED_GLOBAL]
        );
        assert_eq!(
            violation_codes(load(&[(
                "a.ub",
                "var a: int = b;\nvar b: int = a;\nfn main() {}"
            )])),
            vec![error_codes::INIT_CYCLE]
        );
    }

    #[test]
    fn test_load_units_sorted_and_checked() {
        let index = DependencyIndex::default();
        let units = vec![
            UnitSource::new("ls", [("main.ub", "fn main() {}")]),
            UnitSource::new("cat", [("main.ub", "fn main() {}")]),
        ];
        let loaded = load_units(&units, &index, 2).unwrap();
        let names: Vec<_> = loaded.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["cat", "ls"]);

        let dup = vec![
            UnitSource::new("cat", [("main.ub", "fn main() {}")]),
            UnitSource::new("cat", [("other.ub", "fn main() {}")]),
        ];
        assert!(matches!(
            load_units(&dup, &index, 1),
            Err(MergeError::DuplicateUnit { .. })
        ));
    }
}
