//! The grammar as data: character groups, the term algebra, symbol
//! definitions, modules, and the repository that holds them all under
//! qualified names. Everything here may be mutated at runtime — by the
//! standard factory at session start, by library gateways, and by
//! parsing handlers while a parse is in progress.
mod char_group;
pub mod factory;
mod module;
mod repository;
mod symbol;
mod term;

pub use self::char_group::*;
pub use self::module::*;
pub use self::repository::*;
pub use self::symbol::*;
pub use self::term::*;

use std::{error::Error, fmt::Display};

/// A dot-separated path into the grammar namespace. `root.` anchors the
/// path at the repository root; unanchored paths are resolved relative
/// to a module and fall back to its parents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub parts: Vec<String>,
    pub rooted: bool,
}

impl QualifiedName {
    pub fn parse(path: &str) -> Self {
        let mut parts: Vec<String> = path.split('.').map(str::to_owned).collect();
        let rooted = parts.first().map(String::as_str) == Some("root");
        if rooted {
            parts.remove(0);
        }
        Self { parts, rooted }
    }

    pub fn rooted(path: &str) -> Self {
        let mut name = Self::parse(path);
        name.rooted = true;
        name
    }

    pub fn leaf(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or("")
    }
}

impl Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.rooted {
            f.write_str("root")?;
            for part in &self.parts {
                write!(f, ".{part}")?;
            }
            Ok(())
        } else {
            f.write_str(&self.parts.join("."))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// A referenced name does not resolve.
    NotFound(String),
    /// A name was redefined without an explicit removal first.
    Redefinition(String),
    /// A symbol inheritance chain loops back on itself.
    CircularInheritance(String),
    /// A module parent chain loops back on itself.
    CircularModuleChain(String),
    /// A chain of grammar references loops back on itself.
    CircularReference(String),
    /// A name resolved to a value of the wrong kind.
    WrongKind { name: String, expected: &'static str },
}

impl Display for GrammarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrammarError::NotFound(name) => write!(f, "grammar name `{name}` not found"),
            GrammarError::Redefinition(name) => {
                write!(f, "grammar name `{name}` is already defined")
            }
            GrammarError::CircularInheritance(name) => {
                write!(f, "circular symbol inheritance through `{name}`")
            }
            GrammarError::CircularModuleChain(name) => {
                write!(f, "circular module parent chain through `{name}`")
            }
            GrammarError::CircularReference(name) => {
                write!(f, "circular grammar reference through `{name}`")
            }
            GrammarError::WrongKind { name, expected } => {
                write!(f, "grammar name `{name}` is not a {expected}")
            }
        }
    }
}

impl Error for GrammarError {}

#[cfg(test)]
mod tests {
    use super::QualifiedName;

    #[test]
    fn test_parse_rooted() {
        let name = QualifiedName::parse("root.Main.Statement_List");
        assert!(name.rooted);
        assert_eq!(name.parts, vec!["Main", "Statement_List"]);
        assert_eq!(name.leaf(), "Statement_List");
        assert_eq!(name.to_string(), "root.Main.Statement_List");
    }

    #[test]
    fn test_parse_relative() {
        let name = QualifiedName::parse("Expression");
        assert!(!name.rooted);
        assert_eq!(name.parts, vec!["Expression"]);
    }
}
