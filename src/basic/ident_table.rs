use std::collections::HashMap;

/// An interned identifier. Token kinds, production ids, and AST tags are
/// all `Ident`s resolved against the session's [IdentTable].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Ident(pub u32);

/// Table for interning strings into small integer ids.
///
/// The table is created once per session and passed explicitly; there is
/// no process-global instance.
#[derive(Debug, Default)]
pub struct IdentTable {
    names: Vec<String>,
    ids: HashMap<String, Ident>,
}

impl IdentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name`, returning the existing id if it was seen before.
    pub fn intern(&mut self, name: &str) -> Ident {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = Ident(self.names.len() as u32);
        self.names.push(name.to_owned());
        self.ids.insert(name.to_owned(), id);
        id
    }

    /// Look up an id without interning.
    pub fn get(&self, name: &str) -> Option<Ident> {
        self.ids.get(name).copied()
    }

    /// Resolve an id back to its string.
    pub fn resolve(&self, id: Ident) -> &str {
        &self.names[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::IdentTable;

    #[test]
    fn test_intern_is_stable() {
        let mut table = IdentTable::new();
        let a = table.intern("Statement");
        let b = table.intern("Expression");
        let c = table.intern("Statement");

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(table.resolve(a), "Statement");
        assert_eq!(table.resolve(b), "Expression");
    }

    #[test]
    fn test_get_does_not_intern() {
        let mut table = IdentTable::new();
        assert_eq!(table.get("missing"), None);
        table.intern("present");
        assert!(table.get("present").is_some());
        assert_eq!(table.len(), 1);
    }
}
