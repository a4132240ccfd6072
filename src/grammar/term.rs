use std::rc::Rc;

use super::QualifiedName;

/// Flags carried by [Term::Multiply] levels.
///
/// `ERROR_SYNC_TERM` marks a repetition the parser may re-synchronize on
/// after a syntax error. `PASS_UP` makes a production level hand its
/// children to the parent level instead of wrapping them. A
/// `ONE_ROUTE_TERM` commits to its first viable route instead of
/// forking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TermFlags(pub u8);

impl TermFlags {
    pub const NONE: TermFlags = TermFlags(0);
    pub const ERROR_SYNC_TERM: TermFlags = TermFlags(1);
    pub const PASS_UP: TermFlags = TermFlags(2);
    pub const ONE_ROUTE_TERM: TermFlags = TermFlags(4);

    pub fn contains(&self, other: TermFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: TermFlags) -> TermFlags {
        TermFlags(self.0 | other.0)
    }
}

/// The term algebra productions are written in.
///
/// A term tree is acyclic within a single symbol definition; recursion
/// is expressed through [Term::Reference], which is resolved lazily at
/// parse time so that grammar mutation takes effect for states created
/// after it.
#[derive(Debug, Clone)]
pub enum Term {
    /// A literal token text, e.g. the keyword `while` or the sign `+=`.
    Const { text: String },
    /// A single character from a named group. Only meaningful inside
    /// token definitions executed by the lexer.
    CharGroup { group: QualifiedName },
    /// A token of a given kind, optionally constrained to an exact text.
    Token {
        kind: Option<QualifiedName>,
        match_text: Option<String>,
    },
    /// A nested production, pushed as a new production level.
    Reference { target: QualifiedName },
    /// All terms in order.
    Concat { terms: Vec<Rc<Term>> },
    /// Exactly one of the terms; `priorities` weighs the fork the parser
    /// performs here, one entry per term.
    Alternate {
        terms: Vec<Rc<Term>>,
        priorities: Vec<i32>,
    },
    /// `term` repeated between `min` and `max` times (`None` = unbounded).
    /// `priority` favors taking another repetition (positive) or leaving
    /// (negative) when both routes are viable.
    Multiply {
        term: Rc<Term>,
        min: u32,
        max: Option<u32>,
        priority: i32,
        flags: TermFlags,
    },
}

impl Term {
    pub fn constant(text: &str) -> Rc<Term> {
        Rc::new(Term::Const {
            text: text.to_owned(),
        })
    }

    pub fn char_group(group: &str) -> Rc<Term> {
        Rc::new(Term::CharGroup {
            group: QualifiedName::parse(group),
        })
    }

    pub fn token(kind: &str) -> Rc<Term> {
        Rc::new(Term::Token {
            kind: Some(QualifiedName::parse(kind)),
            match_text: None,
        })
    }

    pub fn token_text(kind: &str, text: &str) -> Rc<Term> {
        Rc::new(Term::Token {
            kind: Some(QualifiedName::parse(kind)),
            match_text: Some(text.to_owned()),
        })
    }

    pub fn reference(target: &str) -> Rc<Term> {
        Rc::new(Term::Reference {
            target: QualifiedName::parse(target),
        })
    }

    pub fn concat(terms: Vec<Rc<Term>>) -> Rc<Term> {
        Rc::new(Term::Concat { terms })
    }

    /// Alternation with declaration-order priorities (first highest).
    pub fn alternate(terms: Vec<Rc<Term>>) -> Rc<Term> {
        let count = terms.len() as i32;
        let priorities = (0..count).map(|index| count - index).collect();
        Rc::new(Term::Alternate { terms, priorities })
    }

    pub fn alternate_with(terms: Vec<Rc<Term>>, priorities: Vec<i32>) -> Rc<Term> {
        Rc::new(Term::Alternate { terms, priorities })
    }

    pub fn optional(term: Rc<Term>) -> Rc<Term> {
        Rc::new(Term::Multiply {
            term,
            min: 0,
            max: Some(1),
            priority: 1,
            flags: TermFlags::NONE,
        })
    }

    pub fn zero_or_more(term: Rc<Term>) -> Rc<Term> {
        Rc::new(Term::Multiply {
            term,
            min: 0,
            max: None,
            priority: 1,
            flags: TermFlags::NONE,
        })
    }

    pub fn one_or_more(term: Rc<Term>) -> Rc<Term> {
        Rc::new(Term::Multiply {
            term,
            min: 1,
            max: None,
            priority: 1,
            flags: TermFlags::NONE,
        })
    }

    pub fn multiply(
        term: Rc<Term>,
        min: u32,
        max: Option<u32>,
        priority: i32,
        flags: TermFlags,
    ) -> Rc<Term> {
        Rc::new(Term::Multiply {
            term,
            min,
            max,
            priority,
            flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Term, TermFlags};

    #[test]
    fn test_alternate_priorities_follow_declaration_order() {
        let term = Term::alternate(vec![
            Term::constant("a"),
            Term::constant("b"),
            Term::constant("c"),
        ]);
        let Term::Alternate { priorities, .. } = term.as_ref() else {
            panic!("expected alternate");
        };
        assert_eq!(priorities, &vec![3, 2, 1]);
    }

    #[test]
    fn test_flag_set_operations() {
        let flags = TermFlags::ERROR_SYNC_TERM.union(TermFlags::PASS_UP);
        assert!(flags.contains(TermFlags::ERROR_SYNC_TERM));
        assert!(flags.contains(TermFlags::PASS_UP));
        assert!(!flags.contains(TermFlags::ONE_ROUTE_TERM));
    }
}
