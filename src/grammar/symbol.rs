use std::rc::Rc;

use crate::basic::NamedMap;
use crate::parser::handlers::ParsingHandler;

use super::{QualifiedName, Term};

/// Flags carried by whole symbol definitions.
///
/// `IGNORED_TOKEN` marks token definitions filtered out before delivery
/// to the parser (whitespace, comments). `ROOT_PROD` marks productions
/// that may terminate a parse at end of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SymbolFlags(pub u8);

impl SymbolFlags {
    pub const NONE: SymbolFlags = SymbolFlags(0);
    pub const IGNORED_TOKEN: SymbolFlags = SymbolFlags(1);
    pub const ROOT_PROD: SymbolFlags = SymbolFlags(2);

    pub fn contains(&self, other: SymbolFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: SymbolFlags) -> SymbolFlags {
        SymbolFlags(self.0 | other.0)
    }
}

/// A handler-configuration value stored in a symbol's var map.
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Int(i64),
    Str(String),
    Bool(bool),
}

/// A production: a term plus its parsing handler, configuration vars,
/// flags, and priority.
///
/// Every field except the name is optional; a symbol may inherit from a
/// parent symbol by reference, and resolution fills missing fields from
/// the parent chain. Circular chains are detected at resolution time.
#[derive(Clone, Default)]
pub struct SymbolDefinition {
    pub name: String,
    pub term: Option<Rc<Term>>,
    pub handler: Option<Rc<dyn ParsingHandler>>,
    pub vars: Option<NamedMap<VarValue>>,
    pub flags: Option<SymbolFlags>,
    pub priority: Option<i32>,
    pub parent: Option<QualifiedName>,
}

impl std::fmt::Debug for SymbolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolDefinition")
            .field("name", &self.name)
            .field("term", &self.term)
            .field("handler", &self.handler.as_ref().map(|_| "<handler>"))
            .field("vars", &self.vars)
            .field("flags", &self.flags)
            .field("priority", &self.priority)
            .field("parent", &self.parent)
            .finish()
    }
}

impl SymbolDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn with_term(mut self, term: Rc<Term>) -> Self {
        self.term = Some(term);
        self
    }

    pub fn with_handler(mut self, handler: Rc<dyn ParsingHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_flags(mut self, flags: SymbolFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_parent(mut self, parent: QualifiedName) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_var(mut self, key: &str, value: VarValue) -> Self {
        self.vars.get_or_insert_with(NamedMap::new).insert(key, value);
        self
    }
}

/// The flattened view of a symbol after walking its parent chain.
///
/// Carries the repository version it was resolved at; the parser drops
/// cached resolutions whose version no longer matches.
#[derive(Clone)]
pub struct ResolvedSymbol {
    /// Fully qualified name the symbol was resolved under.
    pub name: String,
    pub term: Rc<Term>,
    pub handler: Option<Rc<dyn ParsingHandler>>,
    pub vars: NamedMap<VarValue>,
    pub flags: SymbolFlags,
    pub priority: i32,
    pub version: u64,
}

impl std::fmt::Debug for ResolvedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSymbol")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("priority", &self.priority)
            .field("version", &self.version)
            .finish()
    }
}
