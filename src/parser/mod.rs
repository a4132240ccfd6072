//! The parser: a GLR-like explorer over the mutable grammar. It keeps a
//! set of live states; per token each state either consumes, forks at
//! nondeterministic terms, enters error recovery, or dies. Completed
//! production levels invoke their parsing handlers to build AST data,
//! and notices raised on speculative branches only survive if their
//! branch does.
mod decision;
pub mod handlers;
mod state;

pub use self::decision::*;
pub use self::state::*;

use std::cell::Cell;
use std::rc::Rc;
use std::{error::Error, fmt::Display};

use log::{debug, trace};

use crate::ast::{Ast, NodeId, NodeKind};
use crate::basic::{IdentTable, SourceLocation};
use crate::grammar::{GrammarRepository, QualifiedName, Term, TermFlags};
use crate::lexer::Token;
use crate::notices::{Notice, NoticeCode, NoticeStore};

use self::handlers::{
    CompletedProd, GenericHandler, HandlerCtx, HandlerResult, ImportLoader, ParsingHandler,
};

/// Hard cap on live states; beyond it the lowest-ranked states are
/// pruned. A statement boundary of the standard grammar fans out to a
/// few dozen speculative leaves, so the cap leaves generous headroom.
pub const DEFAULT_MAX_STATES: usize = 160;

// Structural moves allowed between two tokens across the whole
// frontier. A grammar with epsilon cycles trips this instead of
// hanging.
const MAX_EXPANSION_STEPS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: Option<SourceLocation>,
}

impl ParseError {
    fn grammar(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for ParseError {}

/// Borrowed stores the engine threads through a parse.
pub struct ParseCtx<'a> {
    pub ast: &'a mut Ast,
    pub idents: &'a mut IdentTable,
    pub notices: &'a mut NoticeStore,
    pub repo: &'a mut GrammarRepository,
    pub loader: &'a dyn ImportLoader,
    pub cancel: &'a Cell<bool>,
}

pub struct Parser {
    start: String,
    max_states: usize,
    pool: DecisionNodePool,
    generic: Rc<dyn ParsingHandler>,
}

impl Parser {
    /// `start` is the qualified name of the entry production.
    pub fn new(start: &str) -> Self {
        Self {
            start: start.to_owned(),
            max_states: DEFAULT_MAX_STATES,
            pool: DecisionNodePool::new(),
            generic: Rc::new(GenericHandler),
        }
    }

    pub fn with_max_states(mut self, max_states: usize) -> Self {
        self.max_states = max_states.max(1);
        self
    }

    /// Parse a token stream to completion. Returns the surviving root
    /// node, or `None` when no state reached end of input (the notices
    /// then describe the failure).
    pub fn parse(
        &mut self,
        tokens: &[Token],
        ctx: &mut ParseCtx,
    ) -> Result<Option<NodeId>, ParseError> {
        self.pool = DecisionNodePool::new();
        let mut initial = ParserState::new(self.pool.root());
        self.enter_production(&mut initial, &self.start.clone(), ctx, SourceLocation::default())
            .map_err(ParseError::grammar)?;

        let mut frontier = self.expand_all(vec![initial], tokens, ctx);

        for (index, token) in tokens.iter().enumerate() {
            if ctx.cancel.get() {
                debug!("parser: build cancelled at token {index}");
                return Ok(None);
            }
            trace!(
                "parser: token {index} `{}` with {} live states",
                token.text,
                frontier.len()
            );

            let mut consumers: Vec<ParserState> = vec![];
            let mut mismatched: Vec<ParserState> = vec![];
            let mut errored: Vec<ParserState> = vec![];

            for mut state in frontier.drain(..) {
                match state.status {
                    StateStatus::Terminated => {
                        // Completed before the input ran out.
                        ctx.notices.add_tentative(
                            state.decision,
                            Notice::new(
                                NoticeCode::UnexpectedToken,
                                token.loc,
                                format!("unexpected token `{}` after complete input", token.text),
                            ),
                        );
                        self.pool.release(state.decision, ctx.notices);
                    }
                    StateStatus::Errored => {
                        if self.try_consume(&mut state, token, index, ctx) {
                            state.status = StateStatus::Waiting;
                            state.in_error_run = false;
                            consumers.push(state);
                        } else {
                            // Swallow the token and stay at the sync
                            // point.
                            state.token_index = index + 1;
                            errored.push(state);
                        }
                    }
                    _ => {
                        if self.try_consume(&mut state, token, index, ctx) {
                            state.status = StateStatus::Waiting;
                            consumers.push(state);
                        } else {
                            mismatched.push(state);
                        }
                    }
                }
            }

            let anyone_consumed = !consumers.is_empty();
            for mut state in mismatched.drain(..) {
                if !anyone_consumed && state.error_sync_level().is_some() {
                    if !state.in_error_run {
                        ctx.notices.add_tentative(
                            state.decision,
                            Notice::new(
                                NoticeCode::SyntaxError,
                                token.loc,
                                format!("syntax error at `{}`", token.text),
                            ),
                        );
                        state.in_error_run = true;
                        state.error_count += 1;
                    }
                    state.status = StateStatus::Errored;
                    state.token_index = index + 1;
                    errored.push(state);
                } else {
                    ctx.notices.add_tentative(
                        state.decision,
                        Notice::new(
                            NoticeCode::UnexpectedToken,
                            token.loc,
                            format!("unexpected token `{}`", token.text),
                        ),
                    );
                    self.pool.release(state.decision, ctx.notices);
                }
            }

            // Completion cascades and descents for everything that
            // consumed.
            let mut advanced = vec![];
            for state in consumers {
                advanced.extend(self.consume_and_cascade(state, token, index, ctx));
            }
            frontier = self.expand_all(advanced, tokens, ctx);
            frontier.extend(errored);
            self.prune(&mut frontier, ctx);

            if frontier.is_empty() {
                ctx.notices.add(Notice::new(
                    NoticeCode::UnexpectedToken,
                    token.loc,
                    format!("unexpected token `{}`; no parse survives", token.text),
                ));
                return Ok(None);
            }
        }

        Ok(self.finalize(frontier, tokens, ctx))
    }

    /// Whether the state's frontier leaf matches `token`. Does not
    /// mutate the structure.
    fn try_consume(
        &mut self,
        state: &mut ParserState,
        token: &Token,
        _index: usize,
        ctx: &mut ParseCtx,
    ) -> bool {
        let Some(top) = state.term_stack.last() else {
            return false;
        };
        match top.term.as_ref() {
            Term::Const { text } => token.text == *text,
            Term::Token { kind, match_text } => {
                let kind_ok = match kind {
                    Some(name) => ctx.idents.intern(&name.to_string()) == token.kind,
                    None => true,
                };
                let text_ok = match match_text {
                    Some(text) => token.text == *text,
                    None => true,
                };
                kind_ok && text_ok
            }
            _ => false,
        }
    }

    /// The state matched `token`: record the token as AST data and run
    /// the completion cascade. May fork.
    fn consume_and_cascade(
        &mut self,
        mut state: ParserState,
        token: &Token,
        index: usize,
        ctx: &mut ParseCtx,
    ) -> Vec<ParserState> {
        let node = ctx.ast.add(
            NodeKind::TokenData {
                kind: token.kind,
                text: token.text.clone(),
            },
            token.loc,
        );
        if let Some(prod) = state.prod_stack.last_mut() {
            prod.children.push(node);
        }
        state.token_index = index + 1;
        state.status = StateStatus::Active;
        self.complete_level(state, token.loc, ctx)
    }

    /// Descend every queued state to its next frontier leaf, forking at
    /// nondeterministic terms. Terminated states pass through.
    fn expand_all(
        &mut self,
        states: Vec<ParserState>,
        tokens: &[Token],
        ctx: &mut ParseCtx,
    ) -> Vec<ParserState> {
        let mut frontier = vec![];
        let mut queue = states;
        let mut steps = 0usize;

        while let Some(mut state) = queue.pop() {
            steps += 1;
            if steps > MAX_EXPANSION_STEPS {
                ctx.notices.add(Notice::new(
                    NoticeCode::InfiniteExpansion,
                    SourceLocation::default(),
                    "grammar expansion did not converge; check for left recursion",
                ));
                for state in queue.drain(..) {
                    self.pool.release(state.decision, ctx.notices);
                }
                self.pool.release(state.decision, ctx.notices);
                break;
            }

            if matches!(state.status, StateStatus::Terminated) {
                frontier.push(state);
                continue;
            }
            let Some(top) = state.term_stack.last().cloned() else {
                state.status = StateStatus::Terminated;
                frontier.push(state);
                continue;
            };

            let entry_loc = tokens
                .get(state.token_index)
                .map(|token| token.loc)
                .unwrap_or_default();

            match (top.term.as_ref(), top.pos) {
                (Term::Const { .. } | Term::Token { .. }, _) => frontier.push(state),
                (Term::CharGroup { group }, _) => {
                    ctx.notices.add_tentative(
                        state.decision,
                        Notice::new(
                            NoticeCode::SyntaxError,
                            entry_loc,
                            format!("char group `{group}` is not valid in a parser production"),
                        ),
                    );
                    self.pool.release(state.decision, ctx.notices);
                }
                (Term::Concat { terms }, TermPos::Start) => {
                    if terms.is_empty() {
                        queue.extend(self.complete_level(state, entry_loc, ctx));
                    } else {
                        state.term_stack.last_mut().unwrap().pos = TermPos::Concat { index: 0 };
                        state.term_stack.push(TermLevel::new(terms[0].clone()));
                        queue.push(state);
                    }
                }
                (Term::Alternate { terms, priorities }, TermPos::Start) => {
                    if terms.is_empty() {
                        self.pool.release(state.decision, ctx.notices);
                        continue;
                    }
                    if terms.len() == 1 {
                        state.term_stack.last_mut().unwrap().pos =
                            TermPos::Alternate { chosen: 0 };
                        state.term_stack.push(TermLevel::new(terms[0].clone()));
                        queue.push(state);
                        continue;
                    }
                    let decisions = self.pool.fork(state.decision, terms.len());
                    for (index, branch) in terms.iter().enumerate() {
                        let mut sibling = state.clone();
                        sibling.decision = decisions[index];
                        sibling.priority += priorities.get(index).copied().unwrap_or(0) as i64;
                        sibling.term_stack.last_mut().unwrap().pos =
                            TermPos::Alternate { chosen: index };
                        sibling.term_stack.push(TermLevel::new(branch.clone()));
                        queue.push(sibling);
                    }
                }
                (Term::Multiply { term: inner, min, max, .. }, TermPos::Start) => {
                    let inner = inner.clone();
                    let (min, max) = (*min, *max);
                    state.term_stack.last_mut().unwrap().pos = TermPos::Multiply { count: 0 };
                    if min > 0 {
                        state.term_stack.push(TermLevel::new(inner));
                        queue.push(state);
                    } else if max == Some(0) {
                        queue.extend(self.complete_level(state, entry_loc, ctx));
                    } else {
                        queue.extend(self.fork_multiply(state, entry_loc, ctx));
                    }
                }
                (Term::Multiply { .. }, TermPos::Multiply { .. }) => {
                    // Re-entered after error recovery: choose between
                    // another repetition and completion.
                    queue.extend(self.fork_multiply(state, entry_loc, ctx));
                }
                (Term::Reference { target }, TermPos::Start) => {
                    state.term_stack.last_mut().unwrap().pos = TermPos::Reference;
                    let target = target.to_string();
                    match self.enter_production(&mut state, &target, ctx, entry_loc) {
                        Ok(()) => queue.push(state),
                        Err(message) => {
                            ctx.notices.add_tentative(
                                state.decision,
                                Notice::new(NoticeCode::SyntaxError, entry_loc, message),
                            );
                            self.pool.release(state.decision, ctx.notices);
                        }
                    }
                }
                (term, pos) => {
                    trace!("parser: unexpected expansion point {term:?} at {pos:?}");
                    self.pool.release(state.decision, ctx.notices);
                }
            }
        }
        frontier
    }

    /// Fork a multiply level positioned between repetitions into a
    /// "take another" sibling and a "leave" sibling. `ONE_ROUTE_TERM`
    /// biases hard toward taking.
    fn fork_multiply(
        &mut self,
        state: ParserState,
        loc: SourceLocation,
        ctx: &mut ParseCtx,
    ) -> Vec<ParserState> {
        let top = state.term_stack.last().unwrap();
        let Term::Multiply {
            term: inner,
            priority,
            flags,
            ..
        } = top.term.as_ref()
        else {
            unreachable!()
        };
        let inner = inner.clone();
        let priority = *priority;
        let one_route = flags.contains(TermFlags::ONE_ROUTE_TERM);

        let decisions = self.pool.fork(state.decision, 2);
        let mut enter = state.clone();
        enter.decision = decisions[0];
        enter.priority += if one_route {
            priority.abs() as i64 + 1
        } else {
            priority as i64
        };
        enter.term_stack.push(TermLevel::new(inner));

        let mut leave = state;
        leave.decision = decisions[1];

        let mut out = vec![enter];
        out.extend(self.complete_level(leave, loc, ctx));
        out
    }

    /// Pop the just-finished top level and cascade: complete enclosing
    /// productions (invoking handlers), advance parent terms, fork
    /// repetition choices. Returns the successor states, each one
    /// either at a descent point, a frontier, or terminated.
    fn complete_level(
        &mut self,
        mut state: ParserState,
        loc: SourceLocation,
        ctx: &mut ParseCtx,
    ) -> Vec<ParserState> {
        loop {
            state.term_stack.pop();

            // Production completions at this depth.
            while state
                .prod_stack
                .last()
                .map_or(false, |prod| prod.base_term_level == state.term_stack.len())
            {
                let level = state.prod_stack.pop().unwrap();
                match self.run_handler(&mut state, level, ctx) {
                    Ok(nodes) => {
                        if state.prod_stack.is_empty() {
                            state.result = nodes.first().copied();
                            state.status = StateStatus::Terminated;
                            return vec![state];
                        }
                        state.prod_stack.last_mut().unwrap().children.extend(nodes);
                    }
                    Err(()) => {
                        // The handler nullified the data: errored
                        // production, recover through error sync.
                        return self.handler_failure(state, loc, ctx);
                    }
                }
            }

            let Some(top) = state.term_stack.last_mut() else {
                state.status = StateStatus::Terminated;
                return vec![state];
            };

            match (top.term.clone(), top.pos) {
                (term, TermPos::Concat { index }) => {
                    let Term::Concat { terms } = term.as_ref() else {
                        unreachable!()
                    };
                    if index + 1 < terms.len() {
                        top.pos = TermPos::Concat { index: index + 1 };
                        let next = terms[index + 1].clone();
                        state.term_stack.push(TermLevel::new(next));
                        return vec![state];
                    }
                    // Concat finished; pop it too.
                }
                (_, TermPos::Alternate { .. }) => {
                    // An alternate completes with its chosen branch.
                }
                (_, TermPos::Reference) => {
                    // Its production already completed and delivered.
                }
                (term, TermPos::Multiply { count }) => {
                    let Term::Multiply { min, max, .. } = term.as_ref() else {
                        unreachable!()
                    };
                    let count = count + 1;
                    top.pos = TermPos::Multiply { count };
                    let must_more = count < *min;
                    let can_more = max.map_or(true, |max| count < max);
                    if must_more {
                        let Term::Multiply { term: inner, .. } = term.as_ref() else {
                            unreachable!()
                        };
                        state.term_stack.push(TermLevel::new(inner.clone()));
                        return vec![state];
                    }
                    if can_more {
                        return self.fork_multiply(state, loc, ctx);
                    }
                    // Hit the cap; the multiply completes.
                }
                (term, TermPos::Start) => {
                    trace!("parser: completing unentered term {term:?}");
                }
            }
        }
    }

    fn handler_failure(
        &mut self,
        mut state: ParserState,
        loc: SourceLocation,
        ctx: &mut ParseCtx,
    ) -> Vec<ParserState> {
        if state.error_sync_level().is_some() {
            if !state.in_error_run {
                state.in_error_run = true;
                state.error_count += 1;
            }
            state.status = StateStatus::Errored;
            // Drop structure down to the sync repetition so recovery
            // restarts there.
            let sync = state.error_sync_level().unwrap();
            state.term_stack.truncate(sync + 1);
            while state
                .prod_stack
                .last()
                .map_or(false, |prod| prod.base_term_level > sync)
            {
                state.prod_stack.pop();
            }
            vec![state]
        } else {
            ctx.notices.add_tentative(
                state.decision,
                Notice::new(NoticeCode::SyntaxError, loc, "production failed"),
            );
            self.pool.release(state.decision, ctx.notices);
            vec![]
        }
    }

    fn run_handler(
        &mut self,
        state: &mut ParserState,
        level: ProdLevel,
        ctx: &mut ParseCtx,
    ) -> Result<Vec<NodeId>, ()> {
        let handler = match &level.symbol.handler {
            Some(handler) => handler.clone(),
            None => {
                // A handlerless pass-up production hands its children
                // to the parent level unwrapped.
                let pass_up = matches!(
                    level.symbol.term.as_ref(),
                    Term::Multiply { flags, .. } if flags.contains(TermFlags::PASS_UP)
                );
                if pass_up {
                    return Ok(level.children);
                }
                self.generic.clone()
            }
        };
        let loc = if level.children.is_empty() {
            level.start_loc
        } else {
            let mut loc = ctx.ast.enclosing_loc(level.children[0]);
            for child in &level.children[1..] {
                loc = loc.merged_with(&ctx.ast.enclosing_loc(*child));
            }
            loc
        };
        trace!(
            "parser: production `{}` completed, handler `{}`",
            level.symbol.name,
            handler.name()
        );
        let mut completed = CompletedProd {
            prod: level.prod,
            prod_name: &level.symbol.name,
            children: level.children,
            loc,
            vars: &level.symbol.vars,
            modifiers: &mut state.modifier_stack,
            prod_depth: state.prod_stack.len() + 1,
        };
        let mut hctx = HandlerCtx {
            ast: &mut *ctx.ast,
            idents: &mut *ctx.idents,
            notices: &mut *ctx.notices,
            branch: state.decision,
            repo: &mut *ctx.repo,
            loader: ctx.loader,
        };
        match handler.on_prod_end(&mut hctx, &mut completed) {
            HandlerResult::Nodes(nodes) => Ok(nodes),
            HandlerResult::Failed => Err(()),
        }
    }

    fn enter_production(
        &mut self,
        state: &mut ParserState,
        name: &str,
        ctx: &mut ParseCtx,
        loc: SourceLocation,
    ) -> Result<(), String> {
        let resolved = ctx
            .repo
            .resolve_symbol(&QualifiedName::parse(name), None)
            .map_err(|e| format!("cannot enter production `{name}`: {e}"))?;
        let prod = ctx.idents.intern(&resolved.name);
        state.priority += resolved.priority as i64;
        let term = resolved.term.clone();
        let symbol = Rc::new(resolved);
        state.prod_stack.push(ProdLevel {
            symbol,
            prod,
            children: vec![],
            base_term_level: state.term_stack.len(),
            start_loc: loc,
        });
        state.term_stack.push(TermLevel::new(term));
        Ok(())
    }

    /// Keep the live set under the cap, preferring active states with
    /// higher accumulated priority and fewer errors.
    fn prune(&mut self, frontier: &mut Vec<ParserState>, ctx: &mut ParseCtx) {
        if frontier.len() <= self.max_states {
            return;
        }
        frontier.sort_by_key(|state| {
            (
                matches!(state.status, StateStatus::Errored) as u8,
                -state.priority,
                state.error_count,
                state.decision,
            )
        });
        debug!(
            "parser: pruning {} of {} states",
            frontier.len() - self.max_states,
            frontier.len()
        );
        for state in frontier.drain(self.max_states..) {
            self.pool.release(state.decision, ctx.notices);
        }
    }

    /// End of input: select the winner among terminated states, commit
    /// its branch notices, release everything else.
    fn finalize(
        &mut self,
        frontier: Vec<ParserState>,
        tokens: &[Token],
        ctx: &mut ParseCtx,
    ) -> Option<NodeId> {
        let eof_loc = tokens.last().map(|token| token.loc).unwrap_or_default();
        let mut terminated = vec![];
        let mut failed = vec![];
        for state in frontier {
            match state.status {
                StateStatus::Terminated => terminated.push(state),
                _ => failed.push(state),
            }
        }

        if terminated.is_empty() {
            // Report through the most advanced failed branch.
            failed.sort_by_key(|state| std::cmp::Reverse(state.token_index));
            if let Some(best) = failed.first() {
                ctx.notices.add_tentative(
                    best.decision,
                    Notice::new(
                        NoticeCode::UnexpectedEof,
                        eof_loc,
                        "unexpected end of input",
                    ),
                );
                self.pool.commit(best.decision, ctx.notices);
            } else {
                ctx.notices.add(Notice::new(
                    NoticeCode::UnexpectedEof,
                    eof_loc,
                    "unexpected end of input",
                ));
            }
            for state in failed {
                self.pool.release(state.decision, ctx.notices);
            }
            return None;
        }

        terminated.sort_by_key(|state| {
            (-state.priority, state.error_count, state.decision)
        });
        let equal_winners = terminated
            .iter()
            .filter(|state| {
                state.priority == terminated[0].priority
                    && state.error_count == terminated[0].error_count
            })
            .count();
        if equal_winners > 1 {
            // Deterministic tie-break: first-declared (lowest decision
            // id) wins; the rest are dropped.
            ctx.notices.add(Notice::new(
                NoticeCode::Ambiguity,
                eof_loc,
                format!("{equal_winners} parses are equally viable; using the first declared"),
            ));
        }

        let mut iter = terminated.into_iter();
        let winner = iter.next().unwrap();
        for state in iter {
            self.pool.release(state.decision, ctx.notices);
        }
        for state in failed {
            self.pool.release(state.decision, ctx.notices);
        }
        self.pool.commit(winner.decision, ctx.notices);
        debug!(
            "parser: accepted parse with priority {} and {} error(s)",
            winner.priority, winner.error_count
        );
        winner.result
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::ast::{Ast, NodeKind};
    use crate::basic::{IdentTable, SourceLocation};
    use crate::grammar::{
        GrammarRepository, GrammarValue, SymbolDefinition, Term, TermFlags,
    };
    use crate::lexer::Token;
    use crate::notices::{Notice, NoticeCode, NoticeStore, Severity};

    use super::handlers::{
        CompletedProd, HandlerCtx, HandlerResult, NoImports, ParsingHandler,
    };
    use super::{ParseCtx, Parser};

    const INT: &str = "root.T.IntLiteral";

    /// Wraps children like the generic handler but leaves a marker
    /// notice so tests can observe which branch survived.
    struct MarkerHandler(&'static str);

    impl ParsingHandler for MarkerHandler {
        fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
            ctx.notices.add_tentative(
                ctx.branch,
                Notice::new(NoticeCode::SyntaxError, level.loc, self.0)
                    .with_severity(Severity::Note),
            );
            HandlerResult::Nodes(level.children.clone())
        }
    }

    struct Fixture {
        repo: GrammarRepository,
        idents: IdentTable,
    }

    impl Fixture {
        fn new() -> Self {
            let mut repo = GrammarRepository::new();
            repo.add_module("root.T").unwrap();
            Self {
                repo,
                idents: IdentTable::new(),
            }
        }

        fn symbol(&mut self, name: &str, def: SymbolDefinition) {
            self.repo
                .set_value(name, GrammarValue::Symbol(Rc::new(def)))
                .unwrap();
        }

        fn int_token(&mut self, text: &str, column: u32) -> Token {
            Token::new(
                self.idents.intern(INT),
                text,
                SourceLocation::point(0, 1, column),
            )
        }

        fn const_token(&mut self, text: &str, column: u32) -> Token {
            Token::new(
                self.idents.intern("root.T.Op"),
                text,
                SourceLocation::point(0, 1, column),
            )
        }

        fn parse(
            &mut self,
            start: &str,
            tokens: &[Token],
        ) -> (Option<crate::ast::NodeId>, Ast, NoticeStore) {
            let mut ast = Ast::new();
            let mut notices = NoticeStore::new();
            let cancel = Cell::new(false);
            let mut parser = Parser::new(start);
            let result = parser
                .parse(
                    tokens,
                    &mut ParseCtx {
                        ast: &mut ast,
                        idents: &mut self.idents,
                        notices: &mut notices,
                        repo: &mut self.repo,
                        loader: &NoImports,
                        cancel: &cancel,
                    },
                )
                .unwrap();
            (result, ast, notices)
        }
    }

    #[test]
    fn test_concat_and_repetition() {
        let mut fixture = Fixture::new();
        // Start := Int ("+" Int)*
        fixture.symbol(
            "root.T.Start",
            SymbolDefinition::new("Start").with_term(Term::concat(vec![
                Term::token(INT),
                Term::zero_or_more(Term::concat(vec![
                    Term::constant("+"),
                    Term::token(INT),
                ])),
            ])),
        );
        let tokens = vec![
            fixture.int_token("1", 1),
            fixture.const_token("+", 3),
            fixture.int_token("2", 5),
            fixture.const_token("+", 7),
            fixture.int_token("3", 9),
        ];

        let (result, ast, notices) = fixture.parse("root.T.Start", &tokens);
        let root = result.expect("parse should succeed");
        assert!(!notices.has_errors());

        let NodeKind::List { items } = ast.kind(root) else {
            panic!("expected list result, got {:?}", ast.kind(root));
        };
        // 1 + 2 + 3: three materialized integers and two operators.
        assert_eq!(items.len(), 5);
        assert!(matches!(
            ast.kind(items[0]),
            NodeKind::IntegerLiteral { value: 1, .. }
        ));
        assert!(matches!(
            ast.kind(items[4]),
            NodeKind::IntegerLiteral { value: 3, .. }
        ));
    }

    #[test]
    fn test_higher_priority_branch_wins_and_loser_notices_drop() {
        let mut fixture = Fixture::new();
        fixture.symbol(
            "root.T.A",
            SymbolDefinition::new("A")
                .with_term(Term::token(INT))
                .with_handler(Rc::new(MarkerHandler("branch-a"))),
        );
        fixture.symbol(
            "root.T.B",
            SymbolDefinition::new("B")
                .with_term(Term::token(INT))
                .with_handler(Rc::new(MarkerHandler("branch-b"))),
        );
        fixture.symbol(
            "root.T.Start",
            SymbolDefinition::new("Start").with_term(Term::alternate_with(
                vec![
                    Term::reference("root.T.A"),
                    Term::reference("root.T.B"),
                ],
                vec![1, 5],
            )),
        );
        let tokens = vec![fixture.int_token("7", 1)];

        let (result, _ast, notices) = fixture.parse("root.T.Start", &tokens);
        assert!(result.is_some());
        let messages: Vec<_> = notices
            .notices()
            .iter()
            .map(|n| n.message.as_str())
            .collect();
        assert_eq!(messages, vec!["branch-b"]);
    }

    #[test]
    fn test_equal_priority_ambiguity_first_declared_wins() {
        let mut fixture = Fixture::new();
        fixture.symbol(
            "root.T.A",
            SymbolDefinition::new("A")
                .with_term(Term::token(INT))
                .with_handler(Rc::new(MarkerHandler("branch-a"))),
        );
        fixture.symbol(
            "root.T.B",
            SymbolDefinition::new("B")
                .with_term(Term::token(INT))
                .with_handler(Rc::new(MarkerHandler("branch-b"))),
        );
        fixture.symbol(
            "root.T.Start",
            SymbolDefinition::new("Start").with_term(Term::alternate_with(
                vec![
                    Term::reference("root.T.A"),
                    Term::reference("root.T.B"),
                ],
                vec![3, 3],
            )),
        );
        let tokens = vec![fixture.int_token("7", 1)];

        let (result, _ast, notices) = fixture.parse("root.T.Start", &tokens);
        assert!(result.is_some());
        assert!(notices
            .notices()
            .iter()
            .any(|n| n.code == NoticeCode::Ambiguity));
        assert!(notices.notices().iter().any(|n| n.message == "branch-a"));
        assert!(!notices.notices().iter().any(|n| n.message == "branch-b"));
    }

    #[test]
    fn test_error_sync_recovers_and_reports_once() {
        let mut fixture = Fixture::new();
        // Start := (Int ";")* with error sync on the repetition.
        fixture.symbol(
            "root.T.Start",
            SymbolDefinition::new("Start").with_term(Term::multiply(
                Term::concat(vec![Term::token(INT), Term::constant(";")]),
                0,
                None,
                1,
                TermFlags::ERROR_SYNC_TERM,
            )),
        );
        let tokens = vec![
            fixture.int_token("1", 1),
            fixture.const_token(";", 2),
            fixture.const_token("?", 4),
            fixture.const_token("?", 5),
            fixture.int_token("2", 7),
            fixture.const_token(";", 8),
        ];

        let (result, ast, notices) = fixture.parse("root.T.Start", &tokens);
        let root = result.expect("recovered parse should survive");

        let syntax_errors = notices
            .notices()
            .iter()
            .filter(|n| n.code == NoticeCode::SyntaxError)
            .count();
        assert_eq!(syntax_errors, 1);

        // Both statements made it into the result.
        let NodeKind::List { items } = ast.kind(root) else {
            panic!("expected list result");
        };
        let values: Vec<i64> = items
            .iter()
            .filter_map(|id| match ast.kind(*id) {
                NodeKind::IntegerLiteral { value, .. } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn test_no_survivor_reports_unexpected_token() {
        let mut fixture = Fixture::new();
        fixture.symbol(
            "root.T.Start",
            SymbolDefinition::new("Start").with_term(Term::token(INT)),
        );
        let tokens = vec![fixture.const_token("?", 1)];

        let (result, _ast, notices) = fixture.parse("root.T.Start", &tokens);
        assert!(result.is_none());
        assert!(notices.has_errors());
    }

    #[test]
    fn test_cancellation_stops_parse() {
        let mut fixture = Fixture::new();
        fixture.symbol(
            "root.T.Start",
            SymbolDefinition::new("Start").with_term(Term::token(INT)),
        );
        let tokens = vec![fixture.int_token("1", 1)];

        let mut ast = Ast::new();
        let mut notices = NoticeStore::new();
        let cancel = Cell::new(true);
        let mut parser = Parser::new("root.T.Start");
        let result = parser
            .parse(
                &tokens,
                &mut ParseCtx {
                    ast: &mut ast,
                    idents: &mut fixture.idents,
                    notices: &mut notices,
                    repo: &mut fixture.repo,
                    loader: &NoImports,
                    cancel: &cancel,
                },
            )
            .unwrap();
        assert!(result.is_none());
    }
}

