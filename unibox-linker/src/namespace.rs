// Merged namespace: every unit's top-level names and import aliases, keyed
// by unit index and original identity. Units themselves are never mutated.

use crate::loader::LoadedUnit;
use crate::resolve::{ImportBinding, Symbol, SymbolKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Range;

/// A top-level declaration of one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SymbolKey {
    pub unit: usize,
    pub symbol: usize,
}

/// An import binding of one file of one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AliasKey {
    pub unit: usize,
    pub file: usize,
    pub binding: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FileId {
    pub unit: usize,
    pub file: usize,
}

impl AliasKey {
    pub fn file_id(&self) -> FileId {
        FileId {
            unit: self.unit,
            file: self.file,
        }
    }
}

/// A place an identifier is spelled
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Site {
    pub file: FileId,
    pub span: Range<usize>,
}

pub struct Namespace<'u> {
    units: &'u [LoadedUnit],
    /// Name -> declarations, in unit order; `init` functions excluded
    pub declarations: BTreeMap<String, Vec<SymbolKey>>,
    /// Alias -> bindings, in unit then file order
    pub aliases: BTreeMap<String, Vec<AliasKey>>,
}

impl<'u> Namespace<'u> {
    pub fn build(units: &'u [LoadedUnit]) -> Self {
        let mut declarations: BTreeMap<String, Vec<SymbolKey>> = BTreeMap::new();
        let mut aliases: BTreeMap<String, Vec<AliasKey>> = BTreeMap::new();

        for (unit_idx, unit) in units.iter().enumerate() {
            for (name, &symbol) in &unit.analysis.scope {
                declarations.entry(name.clone()).or_default().push(SymbolKey {
                    unit: unit_idx,
                    symbol,
                });
            }
            for (file, bindings) in unit.analysis.bindings.iter().enumerate() {
                for (binding_idx, binding) in bindings.iter().enumerate() {
                    aliases
                        .entry(binding.alias.clone())
                        .or_default()
                        .push(AliasKey {
                            unit: unit_idx,
                            file,
                            binding: binding_idx,
                        });
                }
            }
        }

        Self {
            units,
            declarations,
            aliases,
        }
    }

    pub fn units(&self) -> &'u [LoadedUnit] {
        self.units
    }

    pub fn unit(&self, unit: usize) -> Option<&'u LoadedUnit> {
        self.units.get(unit)
    }

    pub fn symbol(&self, key: SymbolKey) -> Option<&'u Symbol> {
        self.unit(key.unit)?.analysis.symbols.get(key.symbol)
    }

    pub fn binding(&self, key: AliasKey) -> Option<&'u ImportBinding> {
        self.unit(key.unit)?
            .analysis
            .bindings
            .get(key.file)?
            .get(key.binding)
    }

    /// Every symbol of every unit, including initializers, in key order
    pub fn symbols(&self) -> impl Iterator<Item = (SymbolKey, &'u Symbol)> + 'u {
        self.units.iter().enumerate().flat_map(|(unit, loaded)| {
            loaded
                .analysis
                .symbols
                .iter()
                .enumerate()
                .map(move |(symbol, s)| (SymbolKey { unit, symbol }, s))
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = (SymbolKey, &'u Symbol)> + 'u {
        self.symbols()
            .filter(|(_, s)| s.kind == SymbolKind::Function)
    }

    /// `unit::name`, for logs and reports
    pub fn describe(&self, key: SymbolKey) -> String {
        match (self.unit(key.unit), self.symbol(key)) {
            (Some(unit), Some(symbol)) => format!("{}::{}", unit.name, symbol.name),
            _ => format!("<unit {} symbol {}>", key.unit, key.symbol),
        }
    }

    pub fn describe_alias(&self, key: AliasKey) -> String {
        let unit = self.unit(key.unit);
        let file = unit.and_then(|u| u.files.get(key.file));
        match (unit, file, self.binding(key)) {
            (Some(unit), Some(file), Some(binding)) => {
                format!("{}/{}: import {} \"{}\"", unit.name, file.name, binding.alias, binding.path)
            }
            _ => format!("<unit {} file {} import {}>", key.unit, key.file, key.binding),
        }
    }

    /// Declaration plus every reference of a symbol
    pub fn symbol_sites(&self, key: SymbolKey) -> Vec<Site> {
        let Some(symbol) = self.symbol(key) else {
            return Vec::new();
        };
        let site = |file: usize, span: &Range<usize>| Site {
            file: FileId {
                unit: key.unit,
                file,
            },
            span: span.clone(),
        };
        std::iter::once(site(symbol.file, &symbol.decl))
            .chain(symbol.references.iter().map(|(file, span)| site(*file, span)))
            .collect()
    }

    /// Explicit alias declaration (if any) plus every qualifier use
    pub fn alias_sites(&self, key: AliasKey) -> Vec<Site> {
        let Some(binding) = self.binding(key) else {
            return Vec::new();
        };
        binding
            .decl
            .iter()
            .chain(binding.references.iter())
            .map(|span| Site {
                file: key.file_id(),
                span: span.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::DependencyIndex;
    use crate::loader::load_units;
    use crate::source::UnitSource;

    #[test]
    fn test_symbol_sites_cover_every_file() {
        let sources = vec![UnitSource::new(
            "u",
            [
                ("main.ub", "fn helper() {}\nfn main() { helper(); }"),
                ("util.ub", "fn other() { helper(); helper(); }"),
            ],
        )];
        let loaded = load_units(&sources, &DependencyIndex::default(), 1).unwrap();
        let namespace = Namespace::build(&loaded);

        let key = namespace.declarations["helper"][0];
        let sites = namespace.symbol_sites(key);
        assert_eq!(sites.len(), 4);
        for site in &sites {
            let file = &loaded[site.file.unit].files[site.file.file];
            assert_eq!(&file.source[site.span.clone()], "helper");
        }

        // Each spelling is a distinct site
        let distinct: std::collections::HashSet<&Site> = sites.iter().collect();
        assert_eq!(distinct.len(), sites.len());
        assert_eq!(sites[0].file, FileId { unit: 0, file: 0 });
    }
}
