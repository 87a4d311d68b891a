// Initialization order of global variables

use crate::resolve::{PackageAnalysis, SymbolKind};
use std::collections::BTreeSet;

/// Orders `initialized` (symbol ids of vars with an initializer).
///
/// Repeatedly picks the earliest variable, in declaration order, all of
/// whose dependencies are initialized. Dependencies are the initialized
/// vars its initializer refers to, directly or through the bodies of the
/// functions it refers to. On a cycle, returns the variables left over.
pub fn initialization_order(
    analysis: &PackageAnalysis,
    initialized: &BTreeSet<usize>,
) -> Result<Vec<usize>, Vec<usize>> {
    let reach: Vec<(usize, BTreeSet<usize>)> = initialized
        .iter()
        .map(|&var| (var, reached_vars(analysis, var, initialized)))
        .collect();

    let mut done: BTreeSet<usize> = BTreeSet::new();
    let mut order = Vec::with_capacity(reach.len());

    while order.len() < reach.len() {
        let next = reach
            .iter()
            .find(|(var, deps)| !done.contains(var) && deps.is_subset(&done));
        match next {
            Some((var, _)) => {
                done.insert(*var);
                order.push(*var);
            }
            None => {
                let left = reach
                    .iter()
                    .map(|(var, _)| *var)
                    .filter(|var| !done.contains(var))
                    .collect();
                return Err(left);
            }
        }
    }

    Ok(order)
}

fn reached_vars(
    analysis: &PackageAnalysis,
    var: usize,
    initialized: &BTreeSet<usize>,
) -> BTreeSet<usize> {
    let mut reached = BTreeSet::new();
    let mut visited = BTreeSet::new();
    let mut stack = vec![var];

    while let Some(current) = stack.pop() {
        let Some(symbol) = analysis.symbols.get(current) else {
            continue;
        };
        for &dep in &symbol.deps {
            if initialized.contains(&dep) {
                reached.insert(dep);
                continue;
            }
            let is_function = analysis
                .symbols
                .get(dep)
                .is_some_and(|s| s.kind == SymbolKind::Function);
            if is_function && visited.insert(dep) {
                stack.push(dep);
            }
        }
    }

    reached
}
