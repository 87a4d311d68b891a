// Program synthesis: apply the rename plan and import plan to every unit
// file, isolate global initializers, and emit the dispatcher file plus the
// registry manifest. Output depends only on the inputs.

use crate::error::{MergeError, MergeResult, Phase};
use crate::index::RUNTIME_PACKAGE;
use crate::loader::LoadedUnit;
use crate::namespace::{FileId, Namespace, SymbolKey};
use crate::planner::{RenamePlan, UnitPlan};
use crate::reconciler::ImportPlan;
use std::collections::BTreeMap;
use std::ops::Range;
use unibox_ast::*;
use unibox_formatter::{print_file, Config};
use unibox_runtime::{EntryRef, ProgramManifest, Registry, ThunkRef};

/// Dispatcher source, relative to the output root
pub const REGISTRY_SOURCE: &str = "registry.ub";
/// Registry manifest, relative to the output root
pub const REGISTRY_MANIFEST: &str = "registry.json";

/// The merged source tree, in memory
#[derive(Debug, Clone, PartialEq)]
pub struct MergedProgram {
    /// Output-relative path -> source text
    pub files: BTreeMap<String, String>,
    pub manifest: ProgramManifest,
}

impl MergedProgram {
    pub fn manifest_json(&self) -> MergeResult<String> {
        self.manifest
            .to_json()
            .map_err(|e| MergeError::internal(Phase::Synthesize, format!("registry manifest: {}", e)))
    }
}

/// Where a unit file lands in the output
pub fn output_path(unit: &str, file: &str) -> String {
    format!("{}/{}", unit, file)
}

type SiteMap<'p> = BTreeMap<(usize, usize), (&'p str, &'p str)>;

pub fn synthesize(
    namespace: &Namespace,
    plan: &RenamePlan,
    imports: &ImportPlan,
    program: &str,
    config: &Config,
) -> MergeResult<MergedProgram> {
    let sites = site_maps(plan);
    let mut files = BTreeMap::new();
    let mut registry = Registry::builder();

    for (unit_idx, unit) in namespace.units().iter().enumerate() {
        let unit_plan = plan.unit(unit_idx).ok_or_else(|| {
            MergeError::internal(Phase::Synthesize, format!("no plan for unit `{}`", unit.name))
        })?;

        for (file_idx, file) in unit.files.iter().enumerate() {
            let id = FileId {
                unit: unit_idx,
                file: file_idx,
            };
            let mut ast = file.ast.clone();
            let empty = SiteMap::new();
            rewrite_sites(&mut ast, sites.get(&id).unwrap_or(&empty), &file.display)?;
            explicit_renamed_aliases(&mut ast, unit, plan, id);
            append_imports(&mut ast, imports, id);
            isolate_globals(&mut ast, unit, unit_idx, unit_plan, plan, imports, file_idx)?;
            if unit.symbol(unit.entry).map(|s| s.file) == Some(file_idx) {
                ast.items.push(thunk(unit_plan));
            }
            files.insert(output_path(&unit.name, &file.name), print_file(&ast, config));
        }

        let entry_file = unit
            .symbol(unit.entry)
            .and_then(|s| unit.files.get(s.file))
            .map(|f| output_path(&unit.name, &f.name))
            .ok_or_else(|| {
                MergeError::internal(Phase::Synthesize, format!("unit `{}` lost its entry", unit.name))
            })?;
        registry
            .register(
                &unit.name,
                ThunkRef {
                    symbol: unit_plan.thunk.clone(),
                    file: entry_file.clone(),
                },
                EntryRef {
                    symbol: unit_plan.entry.clone(),
                    file: entry_file,
                    takes_args: unit.signature.takes_args,
                    returns_status: unit.signature.returns_status,
                },
            )
            .map_err(|e| MergeError::internal(Phase::Synthesize, e.to_string()))?;
    }

    files.insert(
        REGISTRY_SOURCE.to_string(),
        print_file(&dispatcher_file(program, namespace.units(), plan), config),
    );

    log::info!("synthesize: {} files", files.len());
    Ok(MergedProgram {
        files,
        manifest: ProgramManifest {
            program: program.to_string(),
            registry: registry.build(),
        },
    })
}

/// Planned renames per file, keyed by span
fn site_maps(plan: &RenamePlan) -> BTreeMap<FileId, SiteMap<'_>> {
    let mut maps: BTreeMap<FileId, SiteMap<'_>> = BTreeMap::new();
    let renames = plan.symbols.values().chain(plan.aliases.values());
    for rename in renames {
        for site in &rename.sites {
            maps.entry(site.file).or_default().insert(
                (site.span.start, site.span.end),
                (rename.old.as_str(), rename.new.as_str()),
            );
        }
    }
    maps
}

/// Rewrites every planned site; a site whose identifier is missing or
/// spelled differently means the plan and the tree disagree.
fn rewrite_sites(ast: &mut SourceFile, sites: &SiteMap<'_>, display: &str) -> MergeResult<()> {
    let mut remaining: BTreeMap<(usize, usize), (&str, &str)> = sites.clone();
    let mut mismatch: Option<(Range<usize>, String)> = None;

    walk_idents_mut(ast, &mut |ident| {
        let key = (ident.span.start, ident.span.end);
        if let Some((old, new)) = remaining.remove(&key) {
            if ident.name == old {
                ident.name = new.to_string();
            } else if mismatch.is_none() {
                mismatch = Some((ident.span.clone(), ident.name.clone()));
            }
        }
    });

    if let Some((span, found)) = mismatch {
        return Err(MergeError::internal(
            Phase::Synthesize,
            format!("{}: planned site {:?} holds `{}`", display, span, found),
        ));
    }
    if let Some(((start, end), (old, _))) = remaining.into_iter().next() {
        return Err(MergeError::internal(
            Phase::Synthesize,
            format!("{}: planned site {}..{} of `{}` no longer exists", display, start, end, old),
        ));
    }
    Ok(())
}

/// An import without alias that gets renamed must spell its new alias
fn explicit_renamed_aliases(ast: &mut SourceFile, unit: &LoadedUnit, plan: &RenamePlan, id: FileId) {
    let Some(bindings) = unit.analysis.bindings.get(id.file) else {
        return;
    };
    for (key, rename) in plan.aliases.range(alias_range(id)) {
        let Some(binding) = bindings.get(key.binding) else {
            continue;
        };
        if binding.explicit {
            continue;
        }
        if let Some(import) = ast.imports.get_mut(binding.import) {
            import.alias = Some(Ident::synthetic(rename.new.clone()));
        }
    }
}

fn alias_range(id: FileId) -> std::ops::RangeInclusive<crate::namespace::AliasKey> {
    use crate::namespace::AliasKey;
    AliasKey {
        unit: id.unit,
        file: id.file,
        binding: 0,
    }..=AliasKey {
        unit: id.unit,
        file: id.file,
        binding: usize::MAX,
    }
}

fn append_imports(ast: &mut SourceFile, imports: &ImportPlan, id: FileId) {
    for added in imports.added.get(&id).into_iter().flatten() {
        ast.imports.push(Import {
            alias: Some(Ident::synthetic(added.alias.clone())),
            path: added.path.clone(),
            span: 0..0,
        });
    }
}

/// `var x = e;` becomes `var x: T;` plus `fn init_x_u() { x = e; }`
fn isolate_globals(
    ast: &mut SourceFile,
    unit: &LoadedUnit,
    unit_idx: usize,
    unit_plan: &UnitPlan,
    plan: &RenamePlan,
    imports: &ImportPlan,
    file_idx: usize,
) -> MergeResult<()> {
    let mut generated = Vec::new();

    for (var, function) in &unit_plan.var_initializers {
        let Some(symbol) = unit.symbol(*var) else {
            continue;
        };
        if symbol.file != file_idx {
            continue;
        }
        let key = SymbolKey {
            unit: unit_idx,
            symbol: *var,
        };

        let Some(Item::Var(global)) = ast.items.get_mut(symbol.item) else {
            return Err(MergeError::internal(
                Phase::Synthesize,
                format!("global `{}` of unit `{}` moved", symbol.name, unit.name),
            ));
        };
        let Some(value) = global.value.take() else {
            return Err(MergeError::internal(
                Phase::Synthesize,
                format!("global `{}` of unit `{}` has no initializer", symbol.name, unit.name),
            ));
        };
        if global.ty.is_none() {
            let ty = imports.var_types.get(&key).cloned().ok_or_else(|| {
                MergeError::internal(
                    Phase::Synthesize,
                    format!("no type planned for `{}` of unit `{}`", symbol.name, unit.name),
                )
            })?;
            global.ty = Some(ty);
        }

        let name = plan.symbol_name(key, &symbol.name);
        generated.push(Item::Function(Function {
            name: Ident::synthetic(function.clone()),
            params: Vec::new(),
            return_type: None,
            body: Block {
                statements: vec![Statement::Assign {
                    target: Expression::ident(name),
                    value,
                }],
            },
        }));
    }

    ast.items.extend(generated);
    Ok(())
}

/// Global initializers in order, then the renamed `init` hooks in order
fn thunk(unit_plan: &UnitPlan) -> Item {
    let calls = unit_plan
        .var_initializers
        .iter()
        .map(|(_, name)| name)
        .chain(unit_plan.hooks.iter())
        .map(|name| Statement::Expression(Expression::call(Expression::ident(name.clone()), Vec::new())))
        .collect();

    Item::Function(Function {
        name: Ident::synthetic(unit_plan.thunk.clone()),
        params: Vec::new(),
        return_type: None,
        body: Block { statements: calls },
    })
}

/// The merged program's `main`: registers every unit, then dispatches
fn dispatcher_file(program: &str, units: &[LoadedUnit], plan: &RenamePlan) -> SourceFile {
    let runtime = plan.runtime_alias.as_str();
    let mut statements: Vec<Statement> = units
        .iter()
        .zip(&plan.units)
        .map(|(unit, unit_plan)| {
            Statement::Expression(Expression::call(
                Expression::member(Expression::ident(runtime), "register"),
                vec![
                    Expression::Literal(Literal::Str(unit.name.clone())),
                    Expression::ident(unit_plan.thunk.clone()),
                    Expression::ident(unit_plan.entry.clone()),
                ],
            ))
        })
        .collect();
    statements.push(Statement::Return(Some(Expression::call(
        Expression::member(Expression::ident(runtime), "dispatch"),
        vec![
            Expression::Literal(Literal::Str(program.to_string())),
            Expression::ident("args"),
        ],
    ))));

    SourceFile {
        imports: vec![Import {
            alias: Some(Ident::synthetic(runtime)),
            path: RUNTIME_PACKAGE.to_string(),
            span: 0..0,
        }],
        items: vec![Item::Function(Function {
            name: Ident::synthetic("main"),
            params: vec![Param {
                name: Ident::synthetic("args"),
                ty: TypeExpr::Slice(Box::new(TypeExpr::Named(Ident::synthetic("string")))),
            }],
            return_type: Some(TypeExpr::Named(Ident::synthetic("int"))),
            body: Block { statements },
        })],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::detect;
    use crate::index::DependencyIndex;
    use crate::loader::load_units;
    use crate::planner::plan;
    use crate::reconciler::reconcile;
    use crate::source::UnitSource;

    fn merge(specs: &[(&str, &[(&str, &str)])]) -> MergedProgram {
        let index = DependencyIndex::default();
        let sources: Vec<UnitSource> = specs
            .iter()
            .map(|(name, files)| UnitSource::new(name, files.iter().copied()))
            .collect();
        let loaded = load_units(&sources, &index, 1).unwrap();
        let namespace = Namespace::build(&loaded);
        let rename = plan(&namespace, &detect(&namespace)).unwrap();
        let imports = reconcile(&namespace, &rename, &index).unwrap();
        synthesize(&namespace, &rename, &imports, "box", &Config::default()).unwrap()
    }

    #[test]
    fn test_unit_file_rewritten() {
        let program = merge(&[
            (
                "cat",
                &[(
                    "main.ub",
                    "import \"lib/io\";\nvar count = 0;\nfn init() { count = 1; }\nfn main(args: [string]) -> int { io.write(args); return count; }",
                )],
            ),
            ("ls", &[("main.ub", "fn main() {}")]),
        ]);

        assert_eq!(
            program.files["cat/main.ub"],
            "import \"lib/io\";\n\
             \n\
             var count: int;\n\
             \n\
             fn init_cat() {\n    count = 1;\n}\n\
             \n\
             fn main_cat(args: [string]) -> int {\n    io.write(args);\n    return count;\n}\n\
             \n\
             fn init_count_cat() {\n    count = 0;\n}\n\
             \n\
             fn initializers_cat() {\n    init_count_cat();\n    init_cat();\n}\n"
        );
    }

    #[test]
    fn test_dispatcher_file_and_manifest() {
        let program = merge(&[
            ("ls", &[("main.ub", "fn main() {}")]),
            ("cat", &[("a.ub", "fn helper() {}"), ("b.ub", "fn main(args: [string]) {}")]),
        ]);

        assert_eq!(
            program.files["registry.ub"],
            "import runtime \"unibox/runtime\";\n\
             \n\
             fn main(args: [string]) -> int {\n    \
             runtime.register(\"cat\", initializers_cat, main_cat);\n    \
             runtime.register(\"ls\", initializers_ls, main_ls);\n    \
             return runtime.dispatch(\"box\", args);\n}\n"
        );

        let cat = program.manifest.registry.get("cat").unwrap();
        assert_eq!(cat.init.file, "cat/b.ub");
        assert_eq!(cat.entry.symbol, "main_cat");
        assert!(cat.entry.takes_args);
        assert!(!cat.entry.returns_status);
        assert!(program.files["cat/b.ub"].contains("fn initializers_cat() {}"));
        assert!(!program.files["cat/a.ub"].contains("initializers_cat"));
        assert_eq!(program.manifest.program, "box");
    }

    #[test]
    fn test_renamed_implicit_alias_becomes_explicit() {
        let program = merge(&[
            ("a", &[("main.ub", "fn fmt() {}\nfn main() { fmt(); }")]),
            ("b", &[("main.ub", "import \"lib/fmt\";\nfn main() { fmt.print(1); }")]),
        ]);
        let b = &program.files["b/main.ub"];
        assert!(b.starts_with("import fmt_b \"lib/fmt\";\n"));
        assert!(b.contains("fmt_b.print(1);"));
        assert!(program.files["a/main.ub"].contains("fn fmt() {}"));
    }

    #[test]
    fn test_stale_site_is_internal_error() {
        let mut ast = unibox_parser::parse_source("x.ub", "fn f() {}").unwrap();
        let mut sites = SiteMap::new();
        sites.insert((100, 101), ("g", "g_a"));
        let err = rewrite_sites(&mut ast, &sites, "x.ub").unwrap_err();
        assert!(matches!(err, MergeError::InternalInvariant { phase: Phase::Synthesize, .. }));

        let mut sites = SiteMap::new();
        sites.insert((3, 4), ("g", "g_a"));
        assert!(rewrite_sites(&mut ast, &sites, "x.ub").is_err());
    }
}
