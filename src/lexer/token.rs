use crate::basic::{Ident, SourceLocation};

/// A token delivered to the parser.
///
/// `kind` is the interned qualified name of the token definition that
/// matched; `prod` mirrors it for handlers that want the producing
/// definition after the token has been wrapped in AST data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: Ident,
    pub prod: Ident,
    pub text: String,
    pub loc: SourceLocation,
}

impl Token {
    pub fn new(kind: Ident, text: &str, loc: SourceLocation) -> Self {
        Self {
            kind,
            prod: kind,
            text: text.to_owned(),
            loc,
        }
    }
}
