use std::cell::RefCell;
use std::rc::Rc;

use crate::basic::NamedMap;

use super::{CharGroupDefinition, QualifiedName, SymbolDefinition};

/// A value stored under a qualified name in the grammar namespace.
///
/// Modules are shared handles so that nested lookups and the repository
/// root observe the same mutations. References are followed
/// transparently by [super::GrammarRepository::get_value].
#[derive(Debug, Clone)]
pub enum GrammarValue {
    Module(Rc<RefCell<GrammarModule>>),
    Symbol(Rc<SymbolDefinition>),
    CharGroup(Rc<CharGroupDefinition>),
    Reference(QualifiedName),
    Dimension(Rc<ParsingDimension>),
}

impl GrammarValue {
    pub fn kind(&self) -> &'static str {
        match self {
            GrammarValue::Module(_) => "module",
            GrammarValue::Symbol(_) => "symbol",
            GrammarValue::CharGroup(_) => "char group",
            GrammarValue::Reference(_) => "reference",
            GrammarValue::Dimension(_) => "parsing dimension",
        }
    }
}

/// A declared extension point: `target` names an alternate-bearing
/// symbol that user productions may be hooked into (by priority)
/// through [super::GrammarRepository::hook_into_dimension].
#[derive(Debug, Clone)]
pub struct ParsingDimension {
    pub name: String,
    pub target: QualifiedName,
}

/// A named container of symbol definitions, character groups, and
/// nested modules.
///
/// Unanchored name lookups that miss in a module fall back to its
/// `parent` chain; cycles in that chain are rejected by the repository.
#[derive(Debug, Default)]
pub struct GrammarModule {
    pub name: String,
    pub entries: NamedMap<GrammarValue>,
    pub parent: Option<QualifiedName>,
    /// The production a parse of this module starts at.
    pub start_ref: Option<QualifiedName>,
}

impl GrammarModule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn shared(name: &str) -> Rc<RefCell<GrammarModule>> {
        Rc::new(RefCell::new(Self::new(name)))
    }
}
