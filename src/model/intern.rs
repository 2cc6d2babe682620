//! Identifier interning.
//!
//! Every document owns one [`IdentTable`]. Identifier tokens and AST name
//! nodes carry an [`Ident`] handle from that table, so comparing two names
//! of the same document is an integer comparison. The table also answers
//! "does this translation unit mention this spelling at all", which is what
//! lets a search skip files without parsing them.

use std::collections::HashMap;

/// Handle of an interned identifier, valid within one [`IdentTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(u32);

impl Ident {
    /// Raw index into the owning table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Deduplicating identifier table.
#[derive(Debug, Clone, Default)]
pub struct IdentTable {
    lookup: HashMap<Box<str>, Ident>,
    names: Vec<Box<str>>,
}

impl IdentTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `text`, returning the existing handle if it was seen before.
    pub fn intern(&mut self, text: &str) -> Ident {
        if let Some(&id) = self.lookup.get(text) {
            return id;
        }
        let id = Ident(self.names.len() as u32);
        self.names.push(text.into());
        self.lookup.insert(text.into(), id);
        id
    }

    /// Handle for `text` if it was interned, without inserting.
    pub fn find(&self, text: &str) -> Option<Ident> {
        self.lookup.get(text).copied()
    }

    /// Whether `text` occurs anywhere in the table.
    pub fn contains(&self, text: &str) -> bool {
        self.lookup.contains_key(text)
    }

    /// Spelling of an interned identifier.
    ///
    /// # Panics
    /// Panics if `id` comes from a different table.
    pub fn resolve(&self, id: Ident) -> &str {
        &self.names[id.index()]
    }

    /// Number of distinct identifiers.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no identifier was interned.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate over all spellings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|n| &**n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates() {
        let mut table = IdentTable::new();
        let a = table.intern("foo");
        let b = table.intern("bar");
        let c = table.intern("foo");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve(b), "bar");
    }

    #[test]
    fn test_find_does_not_insert() {
        let mut table = IdentTable::new();
        table.intern("foo");
        assert!(table.find("baz").is_none());
        assert!(!table.contains("baz"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.find("foo"), Some(table.intern("foo")));
    }
}
