use std::collections::HashMap;

use crate::macros::Macro;

/// The set of macro definitions visible at a point of the include traversal.
///
/// Definitions are kept in insertion order; name lookup always resolves to
/// the most recent definition, which may be an `#undef` marker.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    macros: Vec<Macro>,
    by_name: HashMap<String, usize>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mac: Macro) {
        self.by_name.insert(mac.name().to_string(), self.macros.len());
        self.macros.push(mac);
    }

    pub fn add_macros<'a>(&mut self, macros: impl IntoIterator<Item = &'a Macro>) {
        for mac in macros {
            self.add(mac.clone());
        }
    }

    /// The most recent definition of `name`, including `#undef` markers.
    pub fn resolve(&self, name: &str) -> Option<&Macro> {
        self.by_name.get(name).map(|&idx| &self.macros[idx])
    }

    /// Whether `name` is currently defined (an `#undef` marker counts as not defined).
    pub fn is_defined(&self, name: &str) -> bool {
        self.resolve(name).is_some_and(|mac| !mac.is_hidden())
    }

    pub fn macros(&self) -> &[Macro] {
        &self.macros
    }

    pub fn reset(&mut self) {
        self.macros.clear();
        self.by_name.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_definitions_shadow_earlier_ones() {
        let mut env = Environment::new();
        env.add(Macro::object("N", "1", "/p/a.h", 1));
        env.add(Macro::object("N", "2", "/p/b.h", 1));

        assert_eq!(env.resolve("N").unwrap().definition(), "2");
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn undef_marker_resolves_as_not_defined() {
        let mut env = Environment::new();
        env.add(Macro::object("N", "1", "/p/a.h", 1));
        assert!(env.is_defined("N"));

        env.add(Macro::undef("N", "/p/a.h", 2));
        assert!(!env.is_defined("N"));
        assert!(env.resolve("N").unwrap().is_hidden());
    }
}
