use std::rc::Rc;

use crate::ast::NodeId;
use crate::basic::{Ident, SourceLocation};
use crate::grammar::{ResolvedSymbol, Term, TermFlags};

/// Where a term level stands inside its term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermPos {
    /// Not yet entered; the next advance descends into the term.
    Start,
    /// Inside a concat, matching `terms[index]`.
    Concat { index: usize },
    /// Inside an alternate, committed to branch `chosen`.
    Alternate { chosen: usize },
    /// Inside a multiply, `count` repetitions completed so far.
    Multiply { count: u32 },
    /// Waiting for the referenced production to complete.
    Reference,
}

/// One entry of the term-level stack: the term being matched and the
/// position within it.
#[derive(Debug, Clone)]
pub struct TermLevel {
    pub term: Rc<Term>,
    pub pos: TermPos,
}

impl TermLevel {
    pub fn new(term: Rc<Term>) -> Self {
        Self {
            term,
            pos: TermPos::Start,
        }
    }

    /// Whether this level is an error-sync repetition the parser may
    /// recover at.
    pub fn is_error_sync(&self) -> bool {
        matches!(
            self.term.as_ref(),
            Term::Multiply { flags, .. } if flags.contains(TermFlags::ERROR_SYNC_TERM)
        )
    }
}

/// One entry of the production-level stack: the resolved symbol being
/// produced and the AST data accumulated for it so far.
#[derive(Debug, Clone)]
pub struct ProdLevel {
    pub symbol: Rc<ResolvedSymbol>,
    /// Interned fully qualified production name.
    pub prod: Ident,
    pub children: Vec<NodeId>,
    /// Depth of the term stack when this production was entered; the
    /// production completes when the stack shrinks back to it.
    pub base_term_level: usize,
    pub start_loc: SourceLocation,
}

/// A modifier awaiting attachment to the next definition, tracked per
/// state so that pruning a branch also discards its modifiers.
#[derive(Debug, Clone)]
pub struct ModifierLevel {
    pub node: NodeId,
    /// Production depth the modifier was raised at; it only attaches to
    /// definitions at the same depth or deeper.
    pub min_prod_level: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateStatus {
    /// Being advanced this token cycle.
    Active,
    /// Consumed its turn for the current token.
    Waiting,
    /// In error-recovery mode, swallowing tokens until a sync point.
    Errored,
    /// Completed its root production at end of input.
    Terminated,
    /// Pruned; kept only until bookkeeping releases it.
    Dead,
}

/// One live alternative of the branching parse.
#[derive(Debug, Clone)]
pub struct ParserState {
    pub term_stack: Vec<TermLevel>,
    pub prod_stack: Vec<ProdLevel>,
    pub modifier_stack: Vec<ModifierLevel>,
    /// Decision node notices of this state buffer under.
    pub decision: u32,
    pub status: StateStatus,
    /// Accumulated branch priority; higher survives pruning and wins at
    /// end of input.
    pub priority: i64,
    pub error_count: u32,
    /// An error notice was already emitted for the current error run.
    pub in_error_run: bool,
    /// Index of the next token this state will consume.
    pub token_index: usize,
    /// The root production's result once the state terminates.
    pub result: Option<NodeId>,
}

impl ParserState {
    pub fn new(decision: u32) -> Self {
        Self {
            term_stack: vec![],
            prod_stack: vec![],
            modifier_stack: vec![],
            decision,
            status: StateStatus::Active,
            priority: 0,
            error_count: 0,
            in_error_run: false,
            token_index: 0,
            result: None,
        }
    }

    /// The innermost error-sync term level, if any.
    pub fn error_sync_level(&self) -> Option<usize> {
        self.term_stack.iter().rposition(TermLevel::is_error_sync)
    }

    pub fn is_live(&self) -> bool {
        !matches!(self.status, StateStatus::Dead)
    }
}
