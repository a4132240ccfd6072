//! Diagnostics for the whole pipeline. Notices are appended to the
//! session's store, never thrown; a fatal notice marks the surrounding
//! branch or statement as failed while the rest of the session carries
//! on.
mod store;

pub use self::store::*;

use colored::Colorize;

use crate::basic::{SourceLocation, SourceMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }
}

/// Stable notice codes, grouped by the stage that raises them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeCode {
    // lexical
    UnrecognizedChar,
    TokenClamped,
    // syntactic
    SyntaxError,
    UnexpectedToken,
    UnexpectedEof,
    Ambiguity,
    Redefinition,
    ImportLoadFailed,
    // semantic
    NameNotFound,
    MultipleCalleeMatch,
    NoMatchingCallee,
    TypeMismatch,
    InvalidCast,
    UninitializedUse,
    // generator
    InfiniteExpansion,
    CyclicDependency,
    TargetBackendFailure,
    UnreachableCode,
    // runtime
    PreprocessExecutionFailed,
}

impl NoticeCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeCode::UnrecognizedChar => "L1001",
            NoticeCode::TokenClamped => "L1002",
            NoticeCode::SyntaxError => "S2001",
            NoticeCode::UnexpectedToken => "S2002",
            NoticeCode::UnexpectedEof => "S2003",
            NoticeCode::Ambiguity => "S2004",
            NoticeCode::Redefinition => "S2005",
            NoticeCode::ImportLoadFailed => "S2006",
            NoticeCode::NameNotFound => "G3001",
            NoticeCode::MultipleCalleeMatch => "G3002",
            NoticeCode::NoMatchingCallee => "G3003",
            NoticeCode::TypeMismatch => "G3004",
            NoticeCode::InvalidCast => "G3005",
            NoticeCode::UninitializedUse => "G3006",
            NoticeCode::InfiniteExpansion => "G4001",
            NoticeCode::CyclicDependency => "G4002",
            NoticeCode::TargetBackendFailure => "G4003",
            NoticeCode::UnreachableCode => "G4004",
            NoticeCode::PreprocessExecutionFailed => "R5001",
        }
    }

    /// The severity a notice of this code is raised with by default.
    pub fn default_severity(&self) -> Severity {
        match self {
            NoticeCode::TokenClamped | NoticeCode::UnreachableCode => Severity::Warning,
            NoticeCode::Ambiguity => Severity::Warning,
            NoticeCode::UnrecognizedChar
            | NoticeCode::SyntaxError
            | NoticeCode::UnexpectedToken
            | NoticeCode::UnexpectedEof
            | NoticeCode::Redefinition
            | NoticeCode::NameNotFound
            | NoticeCode::MultipleCalleeMatch
            | NoticeCode::NoMatchingCallee
            | NoticeCode::TypeMismatch
            | NoticeCode::InvalidCast
            | NoticeCode::UninitializedUse => Severity::Error,
            NoticeCode::ImportLoadFailed
            | NoticeCode::InfiniteExpansion
            | NoticeCode::CyclicDependency
            | NoticeCode::TargetBackendFailure
            | NoticeCode::PreprocessExecutionFailed => Severity::Fatal,
        }
    }
}

/// A single diagnostic. `includers` records the import chain that led to
/// the offending source, innermost first.
#[derive(Debug, Clone)]
pub struct Notice {
    pub severity: Severity,
    pub code: NoticeCode,
    pub location: SourceLocation,
    pub message: String,
    pub includers: Vec<SourceLocation>,
}

impl Notice {
    pub fn new(code: NoticeCode, location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            severity: code.default_severity(),
            code,
            location,
            message: message.into(),
            includers: vec![],
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_includer(mut self, location: SourceLocation) -> Self {
        self.includers.push(location);
        self
    }

    /// Serialize as `severity:code:file:line:column: message`, with the
    /// includer stack on continuation lines.
    pub fn render(&self, sources: &SourceMap) -> String {
        let mut out = format!(
            "{}:{}:{}:{}:{}: {}",
            self.severity.as_str(),
            self.code.as_str(),
            sources.name(self.location.source_id),
            self.location.line,
            self.location.column,
            self.message
        );
        for includer in &self.includers {
            out.push_str(&format!(
                "\n  from {}:{}:{}",
                sources.name(includer.source_id),
                includer.line,
                includer.column
            ));
        }
        out
    }

    /// Like [Notice::render] with the severity colored for terminals.
    pub fn render_colored(&self, sources: &SourceMap) -> String {
        let plain = self.render(sources);
        let severity = self.severity.as_str();
        let colored = match self.severity {
            Severity::Note => severity.cyan(),
            Severity::Warning => severity.yellow(),
            Severity::Error | Severity::Fatal => severity.red(),
        };
        plain.replacen(severity, &colored.to_string(), 1)
    }
}

#[cfg(test)]
mod tests {
    use crate::basic::{SourceLocation, SourceMap};

    use super::{Notice, NoticeCode, Severity};

    #[test]
    fn test_render_format() {
        let mut sources = SourceMap::new();
        let id = sources.register("main.ql");
        let notice = Notice::new(
            NoticeCode::SyntaxError,
            SourceLocation::point(id.0, 3, 14),
            "unexpected token `}`",
        );

        assert_eq!(
            notice.render(&sources),
            "error:S2001:main.ql:3:14: unexpected token `}`"
        );
    }

    #[test]
    fn test_render_includer_stack() {
        let mut sources = SourceMap::new();
        let inner = sources.register("lib.ql");
        let outer = sources.register("main.ql");
        let notice = Notice::new(
            NoticeCode::ImportLoadFailed,
            SourceLocation::point(inner.0, 1, 1),
            "import cycle detected",
        )
        .with_includer(SourceLocation::point(outer.0, 7, 1));

        assert_eq!(
            notice.render(&sources),
            "fatal:S2006:lib.ql:1:1: import cycle detected\n  from main.ql:7:1"
        );
    }

    #[test]
    fn test_default_severities() {
        assert_eq!(
            NoticeCode::TokenClamped.default_severity(),
            Severity::Warning
        );
        assert_eq!(
            NoticeCode::ImportLoadFailed.default_severity(),
            Severity::Fatal
        );
    }
}
