// Collision detection over the merged namespace

use crate::namespace::{AliasKey, Namespace, SymbolKey};
use crate::resolve::SymbolRole;
use crate::scope::is_universe;
use serde::Serialize;

/// Name of the merged program's own entry function
pub const HOST_ENTRY: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Collision {
    /// Several units declare the same top-level name
    DuplicateDeclaration { name: String, symbols: Vec<SymbolKey> },
    /// An import alias would be shadowed by another unit's declaration
    AliasShadowed {
        name: String,
        alias: AliasKey,
        by: SymbolKey,
    },
    /// `init` hooks always need isolation
    Initializer { symbol: SymbolKey },
    /// Unit entry functions give up `main` to the dispatcher
    HostReserved { symbol: SymbolKey },
    /// A top-level declaration hides a predeclared name from other units
    BuiltinShadowed { name: String, symbol: SymbolKey },
}

impl Collision {
    pub fn name(&self) -> &str {
        match self {
            Collision::DuplicateDeclaration { name, .. }
            | Collision::AliasShadowed { name, .. }
            | Collision::BuiltinShadowed { name, .. } => name,
            Collision::Initializer { .. } => "init",
            Collision::HostReserved { .. } => HOST_ENTRY,
        }
    }

    pub fn describe(&self, namespace: &Namespace) -> String {
        match self {
            Collision::DuplicateDeclaration { name, symbols } => {
                let units: Vec<&str> = symbols
                    .iter()
                    .filter_map(|key| namespace.unit(key.unit))
                    .map(|u| u.name.as_str())
                    .collect();
                format!("`{}` declared by {}", name, units.join(", "))
            }
            Collision::AliasShadowed { name, alias, by } => format!(
                "alias `{}` ({}) shadowed by {}",
                name,
                namespace.describe_alias(*alias),
                namespace.describe(*by)
            ),
            Collision::Initializer { symbol } => {
                format!("initializer {} needs isolation", namespace.describe(*symbol))
            }
            Collision::HostReserved { symbol } => {
                format!("entry {} yields `main` to the dispatcher", namespace.describe(*symbol))
            }
            Collision::BuiltinShadowed { name, symbol } => {
                format!("{} hides the builtin `{}`", namespace.describe(*symbol), name)
            }
        }
    }
}

/// Every collision in the namespace, ordered by name; within a name,
/// declarations come before aliases and both follow unit order.
pub fn detect(namespace: &Namespace) -> Vec<Collision> {
    let mut collisions = Vec::new();

    for (name, symbols) in &namespace.declarations {
        // Every `main` is an entry and is renamed below
        if symbols.len() > 1 && name != HOST_ENTRY {
            collisions.push(Collision::DuplicateDeclaration {
                name: name.clone(),
                symbols: symbols.clone(),
            });
        }
        if is_universe(name) {
            for &symbol in symbols {
                collisions.push(Collision::BuiltinShadowed {
                    name: name.clone(),
                    symbol,
                });
            }
        }
    }

    for (name, aliases) in &namespace.aliases {
        let declared = namespace
            .declarations
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for &alias in aliases {
            // Same-unit conflicts, `main` included, are rejected at load
            let by = declared.iter().find(|key| key.unit != alias.unit).copied();
            if let Some(by) = by {
                collisions.push(Collision::AliasShadowed {
                    name: name.clone(),
                    alias,
                    by,
                });
            }
        }
    }

    for (key, symbol) in namespace.functions() {
        match symbol.role {
            SymbolRole::Initializer(_) => collisions.push(Collision::Initializer { symbol: key }),
            SymbolRole::Entry => collisions.push(Collision::HostReserved { symbol: key }),
            SymbolRole::Ordinary => {}
        }
    }

    collisions.sort_by(|a, b| a.name().cmp(b.name()));
    collisions
}

/// Collision count per kind, for logs
pub fn summarize(collisions: &[Collision]) -> String {
    let mut counts = [0usize; 5];
    for collision in collisions {
        let slot = match collision {
            Collision::DuplicateDeclaration { .. } => 0,
            Collision::AliasShadowed { .. } => 1,
            Collision::Initializer { .. } => 2,
            Collision::HostReserved { .. } => 3,
            Collision::BuiltinShadowed { .. } => 4,
        };
        if let Some(count) = counts.get_mut(slot) {
            *count += 1;
        }
    }
    let [dup, alias, init, host, builtin] = counts;
    format!(
        "{} duplicate, {} alias, {} initializer, {} entry, {} builtin",
        dup, alias, init, host, builtin
    )
}
