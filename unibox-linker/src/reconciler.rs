// Import reconciliation
//
// Moving a global initializer out of its declaration means the global's type
// must be written down. When that type lives in a package the file never
// imports, the file gains an import for it, exactly once per path.

use crate::error::{MergeError, MergeResult, Phase};
use crate::index::{is_identifier, DependencyIndex};
use crate::namespace::{AliasKey, FileId, Namespace, SymbolKey};
use crate::planner::{first_free, RenamePlan};
use crate::scope::{UNIVERSE_FUNCTIONS, UNIVERSE_TYPES};
use crate::typing::InferredType;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use unibox_ast::{Ident, TypeExpr};

/// Fallback alias base for packages whose name is not an identifier
const FALLBACK_ALIAS: &str = "pkg";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddedImport {
    pub alias: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportPlan {
    /// Imports appended to a file, in the order they were needed
    pub added: BTreeMap<FileId, Vec<AddedImport>>,
    /// Type annotation for every initialized global that had none
    pub var_types: BTreeMap<SymbolKey, TypeExpr>,
}

impl ImportPlan {
    pub fn added_count(&self) -> usize {
        self.added.values().map(Vec::len).sum()
    }
}

pub fn reconcile(
    namespace: &Namespace,
    plan: &RenamePlan,
    index: &DependencyIndex,
) -> MergeResult<ImportPlan> {
    let mut reconciler = Reconciler {
        namespace,
        plan,
        index,
        reserved: reserved_names(namespace, plan),
        imports: ImportPlan::default(),
    };

    for (unit_idx, unit) in namespace.units().iter().enumerate() {
        for (&var, inferred) in &unit.var_types {
            let Some(symbol) = unit.analysis.symbols.get(var) else {
                continue;
            };
            let file = FileId {
                unit: unit_idx,
                file: symbol.file,
            };
            let ty = reconciler.spell(file, inferred)?;
            log::debug!(
                "type of {} spelled `{}`",
                namespace.describe(SymbolKey { unit: unit_idx, symbol: var }),
                ty
            );
            reconciler.imports.var_types.insert(
                SymbolKey {
                    unit: unit_idx,
                    symbol: var,
                },
                ty,
            );
        }
    }

    reconciler.check_file_scopes()?;
    let imports = reconciler.imports;
    log::info!(
        "reconcile: {} typed globals, {} imports added",
        imports.var_types.len(),
        imports.added_count()
    );
    Ok(imports)
}

/// Names no added alias may take in any file
fn reserved_names(namespace: &Namespace, plan: &RenamePlan) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = namespace.declarations.keys().cloned().collect();
    names.extend(plan.symbols.values().map(|r| r.new.clone()));
    names.extend(plan.aliases.values().map(|r| r.new.clone()));
    names.extend(plan.generated_names().map(str::to_string));
    names.extend(
        UNIVERSE_TYPES
            .iter()
            .chain(UNIVERSE_FUNCTIONS)
            .map(|s| s.to_string()),
    );
    names.insert("main".to_string());
    names.insert("init".to_string());
    names
}

struct Reconciler<'r, 'u> {
    namespace: &'r Namespace<'u>,
    plan: &'r RenamePlan,
    index: &'r DependencyIndex,
    reserved: BTreeSet<String>,
    imports: ImportPlan,
}

impl Reconciler<'_, '_> {
    fn spell(&mut self, file: FileId, ty: &InferredType) -> MergeResult<TypeExpr> {
        match ty {
            InferredType::Builtin(name) => Ok(TypeExpr::Named(Ident::synthetic(name.clone()))),
            InferredType::Local(symbol) => {
                let key = SymbolKey {
                    unit: file.unit,
                    symbol: *symbol,
                };
                let original = self.namespace.symbol(key).ok_or_else(|| {
                    MergeError::internal(Phase::Reconcile, format!("unknown type symbol {:?}", key))
                })?;
                let name = self.plan.symbol_name(key, &original.name);
                Ok(TypeExpr::Named(Ident::synthetic(name)))
            }
            InferredType::Dependency { path, name } => {
                let alias = self.alias_for(file, path)?;
                Ok(TypeExpr::Qualified {
                    qualifier: Ident::synthetic(alias),
                    name: Ident::synthetic(name.clone()),
                })
            }
            InferredType::Slice(inner) => Ok(TypeExpr::Slice(Box::new(self.spell(file, inner)?))),
        }
    }

    /// Final alias under which `file` sees `path`, importing it if needed
    fn alias_for(&mut self, file: FileId, path: &str) -> MergeResult<String> {
        let unit = self.namespace.unit(file.unit).ok_or_else(|| {
            MergeError::internal(Phase::Reconcile, format!("unknown unit {}", file.unit))
        })?;

        if let Some(bindings) = unit.analysis.bindings.get(file.file) {
            for (binding_idx, binding) in bindings.iter().enumerate() {
                if binding.path == path {
                    let key = AliasKey {
                        unit: file.unit,
                        file: file.file,
                        binding: binding_idx,
                    };
                    return Ok(self.plan.alias_name(key, &binding.alias).to_string());
                }
            }
        }

        if let Some(added) = self
            .imports
            .added
            .get(&file)
            .and_then(|added| added.iter().find(|a| a.path == path))
        {
            return Ok(added.alias.clone());
        }

        let package = self.index.package_name(path);
        let base = if is_identifier(&package) {
            package
        } else {
            FALLBACK_ALIAS.to_string()
        };

        let mut avoid: BTreeSet<&str> = self.reserved.iter().map(String::as_str).collect();
        if let Some(names) = unit.analysis.file_names.get(file.file) {
            avoid.extend(names.iter().map(String::as_str));
        }
        for (key, rename) in &self.plan.aliases {
            if key.file_id() == file {
                avoid.insert(rename.new.as_str());
            }
        }
        if let Some(added) = self.imports.added.get(&file) {
            avoid.extend(added.iter().map(|a| a.alias.as_str()));
        }

        let alias = first_free(&base, |candidate| !avoid.contains(candidate)).ok_or_else(|| {
            MergeError::internal(
                Phase::Reconcile,
                format!("no free alias for \"{}\" in unit `{}`", path, unit.name),
            )
        })?;

        log::debug!(
            "import \"{}\" as `{}` added to {}",
            path,
            alias,
            unit.files
                .get(file.file)
                .map(|f| f.display.as_str())
                .unwrap_or(unit.name.as_str())
        );
        self.imports
            .added
            .entry(file)
            .or_default()
            .push(AddedImport {
                alias: alias.clone(),
                path: path.to_string(),
            });
        Ok(alias)
    }

    /// Every file's final aliases are distinct and clear of package names
    fn check_file_scopes(&self) -> MergeResult<()> {
        for (unit_idx, unit) in self.namespace.units().iter().enumerate() {
            for (file_idx, bindings) in unit.analysis.bindings.iter().enumerate() {
                let file = FileId {
                    unit: unit_idx,
                    file: file_idx,
                };
                let mut seen = BTreeSet::new();
                let existing = bindings.iter().enumerate().map(|(binding, b)| {
                    let key = AliasKey {
                        unit: unit_idx,
                        file: file_idx,
                        binding,
                    };
                    self.plan.alias_name(key, &b.alias).to_string()
                });
                let added = self
                    .imports
                    .added
                    .get(&file)
                    .into_iter()
                    .flatten()
                    .map(|a| a.alias.clone());

                for alias in existing.chain(added) {
                    let clashes_package = self.final_top_level(&alias);
                    if !seen.insert(alias.clone()) || clashes_package {
                        return Err(MergeError::internal(
                            Phase::Reconcile,
                            format!(
                                "alias `{}` is ambiguous in {}",
                                alias,
                                unit.files
                                    .get(file_idx)
                                    .map(|f| f.display.as_str())
                                    .unwrap_or(unit.name.as_str())
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn final_top_level(&self, name: &str) -> bool {
        if name == "main" || self.plan.generated_names().any(|g| g == name) {
            return true;
        }
        self.namespace
            .symbols()
            .any(|(key, symbol)| self.plan.symbol_name(key, &symbol.name) == name)
    }
}
