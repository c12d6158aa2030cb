//! Interned name/descriptor strings. Grounded in `rsvm::object::symbol`'s
//! `SymbolTable` (a `HashSet<String>::get_or_insert` wrapper); this version
//! returns an index handle instead of a pointer into the set, since nothing
//! else in this core needs a symbol's address, only its identity and text.

use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Symbol(u32);

pub struct SymbolTable {
    strings: Vec<String>,
    by_text: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            strings: Vec::new(),
            by_text: HashMap::new(),
        }
    }

    pub fn get_or_insert(&mut self, text: &str) -> Symbol {
        if let Some(&sym) = self.by_text.get(text) {
            return sym;
        }
        let sym = Symbol(self.strings.len() as u32);
        self.strings.push(text.to_string());
        self.by_text.insert(text.to_string(), sym);
        sym
    }

    pub fn as_str(&self, symbol: Symbol) -> &str {
        &self.strings[symbol.0 as usize]
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_text_twice_yields_the_same_symbol() {
        let mut table = SymbolTable::new();
        let a = table.get_or_insert("java/lang/Object");
        let b = table.get_or_insert("java/lang/Object");
        assert_eq!(a, b);
        assert_eq!(table.as_str(a), "java/lang/Object");
    }

    #[test]
    fn distinct_text_gets_distinct_symbols() {
        let mut table = SymbolTable::new();
        let a = table.get_or_insert("foo");
        let b = table.get_or_insert("bar");
        assert_ne!(a, b);
    }
}
