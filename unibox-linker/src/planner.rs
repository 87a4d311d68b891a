// Rename planning
//
// Every collision is resolved by renaming the non-primary side. Generated
// names are `<base>_<unit>`, then `<base>_<unit>_<n>` with the smallest
// free n; a name is free when no file of any unit spells it and nothing
// generated earlier in the same merge took it.

use crate::detector::{Collision, HOST_ENTRY};
use crate::error::{MergeError, MergeResult, Phase};
use crate::namespace::{AliasKey, Namespace, Site, SymbolKey};
use crate::resolve::SymbolRole;
use crate::scope::{UNIVERSE_FUNCTIONS, UNIVERSE_TYPES};
use crate::source::identifier_suffix;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const MAX_DISAMBIGUATOR: usize = 10_000;

/// Base name of the per-unit initializer thunk
pub const THUNK_BASE: &str = "initializers";

/// Alias the dispatcher file imports the runtime package under, if free
pub const RUNTIME_ALIAS_BASE: &str = "runtime";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenameReason {
    Duplicate,
    Initializer,
    Entry,
    Builtin,
    AliasShadowed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rename {
    pub old: String,
    pub new: String,
    pub reason: RenameReason,
    /// Declaration and every reference
    #[serde(skip)]
    pub sites: Vec<Site>,
}

/// Names generated for one unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitPlan {
    pub unit: String,
    /// Final name of the entry function
    pub entry: String,
    /// Function running the unit's global initializers then its `init` hooks
    pub thunk: String,
    /// (global symbol id, generated function), in initialization order
    pub var_initializers: Vec<(usize, String)>,
    /// Final names of the renamed `init` hooks, in original order
    pub hooks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenamePlan {
    #[serde(serialize_with = "serialize_keyed")]
    pub symbols: BTreeMap<SymbolKey, Rename>,
    #[serde(serialize_with = "serialize_keyed")]
    pub aliases: BTreeMap<AliasKey, Rename>,
    pub units: Vec<UnitPlan>,
    pub runtime_alias: String,
}

fn serialize_keyed<K, S>(map: &BTreeMap<K, Rename>, serializer: S) -> Result<S::Ok, S::Error>
where
    K: Serialize,
    S: serde::Serializer,
{
    use serde::ser::SerializeSeq;
    let mut seq = serializer.serialize_seq(Some(map.len()))?;
    for (key, rename) in map {
        seq.serialize_element(&(key, rename))?;
    }
    seq.end()
}

impl RenamePlan {
    /// Final name of a symbol whose original name is `original`
    pub fn symbol_name<'a>(&'a self, key: SymbolKey, original: &'a str) -> &'a str {
        self.symbols
            .get(&key)
            .map(|r| r.new.as_str())
            .unwrap_or(original)
    }

    pub fn alias_name<'a>(&'a self, key: AliasKey, original: &'a str) -> &'a str {
        self.aliases
            .get(&key)
            .map(|r| r.new.as_str())
            .unwrap_or(original)
    }

    pub fn unit(&self, unit: usize) -> Option<&UnitPlan> {
        self.units.get(unit)
    }

    /// Every generated top-level function name, per unit
    pub fn generated_names(&self) -> impl Iterator<Item = &str> {
        self.units.iter().flat_map(|u| {
            std::iter::once(u.thunk.as_str())
                .chain(u.var_initializers.iter().map(|(_, name)| name.as_str()))
        })
    }
}

/// Names in use anywhere, plus everything handed out so far
struct NamePool {
    taken: BTreeSet<String>,
}

impl NamePool {
    fn new(namespace: &Namespace) -> Self {
        let mut taken: BTreeSet<String> = namespace
            .units()
            .iter()
            .flat_map(|u| u.analysis.used_names())
            .collect();
        taken.extend(namespace.declarations.keys().cloned());
        taken.extend(namespace.aliases.keys().cloned());
        taken.extend(
            UNIVERSE_TYPES
                .iter()
                .chain(UNIVERSE_FUNCTIONS)
                .map(|s| s.to_string()),
        );
        taken.insert(HOST_ENTRY.to_string());
        taken.insert("init".to_string());
        Self { taken }
    }

    fn claim(&mut self, name: &str) -> bool {
        self.taken.insert(name.to_string())
    }

    fn fresh(&mut self, base: &str, unit: &str) -> MergeResult<String> {
        let qualified = format!("{}_{}", base, identifier_suffix(unit));
        self.first_free(&qualified)
    }

    fn first_free(&mut self, base: &str) -> MergeResult<String> {
        first_free(base, |candidate| self.taken.insert(candidate.to_string())).ok_or_else(|| {
            MergeError::internal(
                Phase::Plan,
                format!("no free name derived from `{}`", base),
            )
        })
    }
}

/// `base`, then `base_1`, `base_2`, ... up to `MAX_DISAMBIGUATOR`; the first
/// candidate `is_free` accepts
pub(crate) fn first_free(base: &str, mut is_free: impl FnMut(&str) -> bool) -> Option<String> {
    if is_free(base) {
        return Some(base.to_string());
    }
    (1..=MAX_DISAMBIGUATOR)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| is_free(candidate.as_str()))
}

pub fn plan(namespace: &Namespace, collisions: &[Collision]) -> MergeResult<RenamePlan> {
    let mut pool = NamePool::new(namespace);
    let mut planner = Planner {
        namespace,
        symbols: BTreeMap::new(),
        aliases: BTreeMap::new(),
    };

    for collision in collisions {
        match collision {
            Collision::DuplicateDeclaration { symbols, .. } => {
                // The first unit in name order keeps the name
                for &key in symbols.iter().skip(1) {
                    planner.rename_symbol(&mut pool, key, RenameReason::Duplicate)?;
                }
            }
            Collision::Initializer { symbol } => {
                planner.rename_symbol(&mut pool, *symbol, RenameReason::Initializer)?;
            }
            Collision::HostReserved { symbol } => {
                planner.rename_symbol(&mut pool, *symbol, RenameReason::Entry)?;
            }
            Collision::BuiltinShadowed { symbol, .. } => {
                planner.rename_symbol(&mut pool, *symbol, RenameReason::Builtin)?;
            }
            Collision::AliasShadowed { .. } => {}
        }
    }

    // Aliases last: only shadowing names that survive renaming matter
    for collision in collisions {
        if let Collision::AliasShadowed { name, alias, .. } = collision {
            if planner.name_survives(name, alias.unit) {
                planner.rename_alias(&mut pool, *alias)?;
            }
        }
    }

    let mut units = Vec::with_capacity(namespace.units().len());
    for (unit_idx, unit) in namespace.units().iter().enumerate() {
        let entry_key = SymbolKey {
            unit: unit_idx,
            symbol: unit.entry,
        };
        let entry = planner
            .symbols
            .get(&entry_key)
            .map(|r| r.new.clone())
            .ok_or_else(|| {
                MergeError::internal(
                    Phase::Plan,
                    format!("entry of unit `{}` was not renamed", unit.name),
                )
            })?;

        let thunk = pool.fresh(THUNK_BASE, &unit.name)?;
        let mut var_initializers = Vec::with_capacity(unit.var_order.len());
        for &var in &unit.var_order {
            let Some(symbol) = unit.analysis.symbols.get(var) else {
                continue;
            };
            let name = pool.fresh(&format!("init_{}", symbol.name), &unit.name)?;
            var_initializers.push((var, name));
        }

        let mut hooks = Vec::with_capacity(unit.initializers.len());
        for &init in &unit.initializers {
            let key = SymbolKey {
                unit: unit_idx,
                symbol: init,
            };
            match planner.symbols.get(&key) {
                Some(rename) => hooks.push(rename.new.clone()),
                None => {
                    return Err(MergeError::internal(
                        Phase::Plan,
                        format!("initializer {} was not renamed", namespace.describe(key)),
                    ))
                }
            }
        }

        units.push(UnitPlan {
            unit: unit.name.clone(),
            entry,
            thunk,
            var_initializers,
            hooks,
        });
    }

    let runtime_alias = pool.first_free(RUNTIME_ALIAS_BASE)?;

    let plan = RenamePlan {
        symbols: planner.symbols,
        aliases: planner.aliases,
        units,
        runtime_alias,
    };
    check_injective(namespace, &plan)?;

    log::info!(
        "plan: {} symbol renames, {} alias renames, {} generated functions",
        plan.symbols.len(),
        plan.aliases.len(),
        plan.generated_names().count()
    );
    Ok(plan)
}

struct Planner<'p, 'u> {
    namespace: &'p Namespace<'u>,
    symbols: BTreeMap<SymbolKey, Rename>,
    aliases: BTreeMap<AliasKey, Rename>,
}

impl Planner<'_, '_> {
    fn rename_symbol(
        &mut self,
        pool: &mut NamePool,
        key: SymbolKey,
        reason: RenameReason,
    ) -> MergeResult<()> {
        if self.symbols.contains_key(&key) {
            return Ok(());
        }
        let (Some(unit), Some(symbol)) = (self.namespace.unit(key.unit), self.namespace.symbol(key))
        else {
            return Err(MergeError::internal(
                Phase::Plan,
                format!("unknown symbol {:?}", key),
            ));
        };

        let base = match symbol.role {
            SymbolRole::Initializer(_) => "init",
            SymbolRole::Entry => HOST_ENTRY,
            SymbolRole::Ordinary => symbol.name.as_str(),
        };
        let new = pool.fresh(base, &unit.name)?;
        log::debug!(
            "rename {} -> {} ({:?})",
            self.namespace.describe(key),
            new,
            reason
        );

        self.symbols.insert(
            key,
            Rename {
                old: symbol.name.clone(),
                new,
                reason,
                sites: self.namespace.symbol_sites(key),
            },
        );
        Ok(())
    }

    fn rename_alias(&mut self, pool: &mut NamePool, key: AliasKey) -> MergeResult<()> {
        let (Some(unit), Some(binding)) = (self.namespace.unit(key.unit), self.namespace.binding(key))
        else {
            return Err(MergeError::internal(
                Phase::Plan,
                format!("unknown import binding {:?}", key),
            ));
        };

        let new = pool.fresh(&binding.alias, &unit.name)?;
        log::debug!(
            "rename alias {} -> {}",
            self.namespace.describe_alias(key),
            new
        );

        self.aliases.insert(
            key,
            Rename {
                old: binding.alias.clone(),
                new,
                reason: RenameReason::AliasShadowed,
                sites: self.namespace.alias_sites(key),
            },
        );
        Ok(())
    }

    /// Whether a unit other than `unit` still declares `name` after renaming
    fn name_survives(&self, name: &str, unit: usize) -> bool {
        self.namespace
            .declarations
            .get(name)
            .is_some_and(|keys| {
                keys.iter()
                    .any(|key| key.unit != unit && !self.symbols.contains_key(key))
            })
    }
}

/// Final top-level names are pairwise distinct, and no file's final alias
/// equals one of them
fn check_injective(namespace: &Namespace, plan: &RenamePlan) -> MergeResult<()> {
    let mut owners: BTreeMap<String, String> = BTreeMap::new();
    owners.insert(HOST_ENTRY.to_string(), "the dispatcher".to_string());

    let mut claim = |name: &str, owner: String| -> MergeResult<()> {
        if let Some(previous) = owners.get(name) {
            return Err(MergeError::internal(
                Phase::Plan,
                format!("`{}` is used by both {} and {}", name, previous, owner),
            ));
        }
        owners.insert(name.to_string(), owner);
        Ok(())
    };

    for (key, symbol) in namespace.symbols() {
        claim(plan.symbol_name(key, &symbol.name), namespace.describe(key))?;
    }
    for unit_plan in &plan.units {
        let owner = || format!("generated code of unit `{}`", unit_plan.unit);
        claim(&unit_plan.thunk, owner())?;
        for (_, name) in &unit_plan.var_initializers {
            claim(name, owner())?;
        }
    }

    for (name, keys) in &namespace.aliases {
        for &key in keys {
            let alias = plan.alias_name(key, name);
            if owners.contains_key(alias) {
                return Err(MergeError::internal(
                    Phase::Plan,
                    format!(
                        "alias of {} collides with a top-level name",
                        namespace.describe_alias(key)
                    ),
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::detect;
    use crate::index::DependencyIndex;
    use crate::loader::{load_units, LoadedUnit};
    use crate::source::UnitSource;

    fn units(specs: &[(&str, &[(&str, &str)])]) -> Vec<LoadedUnit> {
        let sources: Vec<UnitSource> = specs
            .iter()
            .map(|(name, files)| UnitSource::new(name, files.iter().copied()))
            .collect();
        load_units(&sources, &DependencyIndex::default(), 1).unwrap()
    }

    fn plan_for(loaded: &[LoadedUnit]) -> RenamePlan {
        let namespace = Namespace::build(loaded);
        plan(&namespace, &detect(&namespace)).unwrap()
    }

    fn new_names(plan: &RenamePlan) -> Vec<(usize, &str, &str)> {
        plan.symbols
            .iter()
            .map(|(k, r)| (k.unit, r.old.as_str(), r.new.as_str()))
            .collect()
    }

    #[test]
    fn test_primary_keeps_name() {
        let loaded = units(&[
            ("cat", &[("main.ub", "fn usage() {}\nfn main() { usage(); }")]),
            ("ls", &[("main.ub", "fn usage() {}\nfn main() { usage(); usage(); }")]),
        ]);
        let plan = plan_for(&loaded);

        assert_eq!(
            new_names(&plan),
            vec![
                (0, "main", "main_cat"),
                (1, "usage", "usage_ls"),
                (1, "main", "main_ls"),
            ]
        );
        let usage_ls = plan.symbols.values().find(|r| r.new == "usage_ls").unwrap();
        assert_eq!(usage_ls.sites.len(), 3);
        assert_eq!(plan.units[0].thunk, "initializers_cat");
        assert_eq!(plan.units[1].entry, "main_ls");
        assert_eq!(plan.runtime_alias, "runtime");
    }

    #[test]
    fn test_generated_names_avoid_existing_identifiers() {
        let loaded = units(&[
            ("a", &[("main.ub", "fn helper() {}\nfn main() { let helper_b = 1; }")]),
            (
                "b",
                &[("main.ub", "fn helper() {}\nfn helper_b_1() {}\nfn main() { helper(); }")],
            ),
        ]);
        let plan = plan_for(&loaded);
        let helper = plan
            .symbols
            .values()
            .find(|r| r.old == "helper")
            .unwrap();
        assert_eq!(helper.new, "helper_b_2");
    }

    #[test]
    fn test_initializers_isolated_in_order() {
        let loaded = units(&[
            (
                "a",
                &[
                    ("x.ub", "fn init() {}\nfn main() {}"),
                    ("y.ub", "var n = 1;\nfn init() {}"),
                ],
            ),
            ("b", &[("main.ub", "fn init() {}\nfn main() {}")]),
        ]);
        let plan = plan_for(&loaded);
        assert_eq!(plan.units[0].hooks, vec!["init_a", "init_a_1"]);
        assert_eq!(plan.units[1].hooks, vec!["init_b"]);
        assert_eq!(plan.units[0].var_initializers.len(), 1);
        assert_eq!(plan.units[0].var_initializers[0].1, "init_n_a");
    }

    #[test]
    fn test_alias_renamed_only_when_shadowing_name_survives() {
        let loaded = units(&[
            ("a", &[("main.ub", "fn fmt() {}\nfn main() {}")]),
            ("b", &[("main.ub", "import fmt \"lib/fmt\";\nfn main() { fmt.print(); }")]),
            ("c", &[("main.ub", "fn len() -> int { return 0; }\nfn main() {}")]),
            ("d", &[("main.ub", "import len \"lib/len\";\nfn main() { len.of(); }")]),
        ]);
        let plan = plan_for(&loaded);

        let aliases: Vec<_> = plan
            .aliases
            .iter()
            .map(|(k, r)| (k.unit, r.old.as_str(), r.new.as_str()))
            .collect();
        // c's `len` is renamed for hiding the builtin, so d keeps its alias
        assert_eq!(aliases, vec![(1, "fmt", "fmt_b")]);
        assert_eq!(plan.aliases.values().next().unwrap().sites.len(), 2);
    }

    #[test]
    fn test_runtime_alias_avoids_declarations() {
        let loaded = units(&[("a", &[("main.ub", "var runtime: int;\nfn main() {}")])]);
        assert_eq!(plan_for(&loaded).runtime_alias, "runtime_1");
    }

    #[test]
    fn test_first_free_counts_up_then_gives_up() {
        let taken = ["x", "x_1", "x_2"];
        assert_eq!(
            first_free("y", |c| !taken.contains(&c)).as_deref(),
            Some("y")
        );
        assert_eq!(
            first_free("x", |c| !taken.contains(&c)).as_deref(),
            Some("x_3")
        );

        let mut tried = 0;
        assert_eq!(
            first_free("z", |_| {
                tried += 1;
                false
            }),
            None
        );
        assert_eq!(tried, MAX_DISAMBIGUATOR + 1);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let specs: &[(&str, &[(&str, &str)])] = &[
            ("b", &[("main.ub", "fn init() {}\nfn x() {}\nfn main() {}")]),
            ("a", &[("main.ub", "fn init() {}\nfn x() {}\nfn main() {}")]),
        ];
        assert_eq!(plan_for(&units(specs)), plan_for(&units(specs)));
    }
}
