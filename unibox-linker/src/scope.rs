// Lexical scopes and the universe

use std::collections::BTreeSet;

/// Predeclared types, visible everywhere unless shadowed
pub const UNIVERSE_TYPES: &[&str] = &["int", "float", "string", "bool"];

/// Predeclared functions
pub const UNIVERSE_FUNCTIONS: &[&str] = &["print", "println", "len", "exit"];

pub fn is_universe(name: &str) -> bool {
    UNIVERSE_TYPES.contains(&name) || UNIVERSE_FUNCTIONS.contains(&name)
}

/// Function-local scopes, innermost last
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<BTreeSet<String>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.scopes.push(BTreeSet::new());
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().flatten().map(String::as_str)
    }
}
