use std::rc::Rc;

use log::trace;

use crate::basic::{Ident, IdentTable, SourceLocation};
use crate::grammar::{
    CharGroupUnit, GrammarRepository, GrammarValue, QualifiedName, SymbolFlags, Term,
};

use super::LexError;

// References inside token definitions are inlined; this caps the
// inlining depth so a self-referential definition cannot hang the
// compiler.
const MAX_INLINE_DEPTH: usize = 32;

/// A character predicate on an NFA edge: either an exact character or a
/// character group with all references flattened away at compile time.
#[derive(Debug, Clone)]
pub enum CharPred {
    Exact(char),
    Group(CharGroupUnit),
}

impl CharPred {
    fn matches(&self, ch: char) -> bool {
        match self {
            CharPred::Exact(expected) => *expected == ch,
            // Refs were flattened during compilation, so resolution
            // cannot be consulted and cannot fail here.
            CharPred::Group(unit) => unit.contains(ch, &|_| None).unwrap_or(false),
        }
    }
}

#[derive(Debug, Default)]
struct NfaState {
    transitions: Vec<(CharPred, usize)>,
    epsilon: Vec<usize>,
    /// Index into [CompiledNfa::defs] when this state accepts.
    accept: Option<usize>,
}

/// A token definition included in the compiled automaton.
#[derive(Debug, Clone)]
pub struct TokenDef {
    pub name: String,
    /// Interned id delivered on emitted tokens; the parser's token
    /// terms intern the same qualified name to compare against it.
    pub kind: Ident,
    pub priority: i32,
    pub order: usize,
    pub ignored: bool,
}

/// The automaton compiled from a lexer module's token definitions,
/// tagged with the grammar version it was built at.
#[derive(Debug)]
pub struct CompiledNfa {
    pub version: u64,
    pub defs: Vec<TokenDef>,
    states: Vec<NfaState>,
    start: usize,
}

impl CompiledNfa {
    /// Compile every symbol in `defs_module` into one automaton. The
    /// module's entry order is the definition order used for
    /// tie-breaking.
    pub fn compile(
        repo: &GrammarRepository,
        idents: &mut IdentTable,
        defs_module: &str,
    ) -> Result<CompiledNfa, LexError> {
        let (value, _) = repo
            .get_value(defs_module)
            .map_err(|e| LexError(format!("lexer module: {e}")))?;
        let GrammarValue::Module(module) = value else {
            return Err(LexError(format!("`{defs_module}` is not a module")));
        };

        let mut builder = Builder {
            repo,
            module_name: defs_module.to_owned(),
            states: vec![NfaState::default()],
        };
        let start = 0;
        let mut defs = vec![];

        let entries: Vec<(String, GrammarValue)> = module
            .borrow()
            .entries
            .iter()
            .map(|(name, value)| (name.to_owned(), value.clone()))
            .collect();

        for (name, value) in entries {
            let GrammarValue::Symbol(_) = value else {
                continue;
            };
            let qualified = format!("{defs_module}.{name}");
            let resolved = repo
                .resolve_symbol(&QualifiedName::parse(&qualified), None)
                .map_err(|e| LexError(format!("token definition `{qualified}`: {e}")))?;

            let order = defs.len();
            let def = TokenDef {
                name: qualified.clone(),
                kind: idents.intern(&qualified),
                priority: resolved.priority,
                order,
                ignored: resolved.flags.contains(SymbolFlags::IGNORED_TOKEN),
            };

            let (frag_start, frag_end) = builder.compile_term(&resolved.term, 0)?;
            builder.states[start].epsilon.push(frag_start);
            builder.states[frag_end].accept = Some(order);
            defs.push(def);
            trace!("lexer: compiled token definition `{qualified}`");
        }

        if defs.is_empty() {
            return Err(LexError(format!(
                "lexer module `{defs_module}` contains no token definitions"
            )));
        }

        Ok(CompiledNfa {
            version: repo.version(),
            defs,
            states: builder.states,
            start,
        })
    }

    fn closure(&self, set: &mut Vec<usize>) {
        let mut index = 0;
        while index < set.len() {
            let state = set[index];
            for &target in &self.states[state].epsilon {
                if !set.contains(&target) {
                    set.push(target);
                }
            }
            index += 1;
        }
    }

    fn step(&self, set: &[usize], ch: char) -> Vec<usize> {
        let mut next = vec![];
        for &state in set {
            for (pred, target) in &self.states[state].transitions {
                if pred.matches(ch) && !next.contains(target) {
                    next.push(*target);
                }
            }
        }
        self.closure(&mut next);
        next
    }

    /// The best accepting definition in `set`: highest priority, then
    /// earliest definition order.
    fn best_accept(&self, set: &[usize]) -> Option<usize> {
        let mut best: Option<usize> = None;
        for &state in set {
            let Some(def) = self.states[state].accept else {
                continue;
            };
            best = Some(match best {
                None => def,
                Some(current) => {
                    let (cur, new) = (&self.defs[current], &self.defs[def]);
                    if (new.priority, std::cmp::Reverse(new.order))
                        > (cur.priority, std::cmp::Reverse(cur.order))
                    {
                        def
                    } else {
                        current
                    }
                }
            });
        }
        best
    }
}

/// The longest match recorded so far for the token attempt in progress.
#[derive(Debug, Clone)]
pub struct PendingMatch {
    pub def: usize,
    pub text: String,
    pub loc: SourceLocation,
    /// How many characters of the attempt belong to this match.
    pub consumed: usize,
}

/// One in-progress simulation of the automaton: the live state set, the
/// characters consumed by the current attempt, and the longest match
/// seen so far.
pub struct NfaRun<'a> {
    nfa: &'a CompiledNfa,
    live: Vec<usize>,
    buffer: String,
    start_line: u32,
    start_column: u32,
    last_line: u32,
    last_column: u32,
    source_id: u32,
    pending: Option<PendingMatch>,
}

impl<'a> NfaRun<'a> {
    pub fn new(nfa: &'a CompiledNfa, source_id: u32) -> Self {
        let mut run = Self {
            nfa,
            live: vec![],
            buffer: String::new(),
            start_line: 1,
            start_column: 1,
            last_line: 1,
            last_column: 1,
            source_id,
            pending: None,
        };
        run.reset();
        run
    }

    pub fn nfa(&self) -> &'a CompiledNfa {
        self.nfa
    }

    pub fn reset(&mut self) {
        self.live = vec![self.nfa.start];
        self.nfa.closure(&mut self.live);
        self.buffer.clear();
        self.pending = None;
    }

    pub fn mark_start(&mut self, line: u32, column: u32) {
        self.start_line = line;
        self.start_column = column;
    }

    pub fn buffer_is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.chars().count()
    }

    pub fn start_position(&self) -> (u32, u32) {
        (self.start_line, self.start_column)
    }

    /// Feed one character. Returns false when no live state can consume
    /// it (the run is stuck; the caller decides between emitting the
    /// pending match and error recovery).
    pub fn advance(&mut self, ch: char, line: u32, column: u32) -> bool {
        let next = self.nfa.step(&self.live, ch);
        if next.is_empty() {
            return false;
        }
        self.live = next;
        self.buffer.push(ch);
        self.last_line = line;
        self.last_column = column;
        if let Some(def) = self.nfa.best_accept(&self.live) {
            self.pending = Some(PendingMatch {
                def,
                text: self.buffer.clone(),
                loc: SourceLocation::span(
                    self.source_id,
                    self.start_line,
                    self.start_column,
                    line,
                    column,
                ),
                consumed: self.buffer.chars().count(),
            });
        }
        true
    }

    pub fn take_pending(&mut self) -> Option<PendingMatch> {
        self.pending.take()
    }
}

struct Builder<'a> {
    repo: &'a GrammarRepository,
    module_name: String,
    states: Vec<NfaState>,
}

impl<'a> Builder<'a> {
    fn add_state(&mut self) -> usize {
        self.states.push(NfaState::default());
        self.states.len() - 1
    }

    fn add_edge(&mut self, from: usize, pred: CharPred, to: usize) {
        self.states[from].transitions.push((pred, to));
    }

    fn add_epsilon(&mut self, from: usize, to: usize) {
        self.states[from].epsilon.push(to);
    }

    /// Thompson construction: compile `term` into a fragment and return
    /// its entry and exit states.
    fn compile_term(&mut self, term: &Rc<Term>, depth: usize) -> Result<(usize, usize), LexError> {
        if depth > MAX_INLINE_DEPTH {
            return Err(LexError(
                "token definition nests references too deeply".to_owned(),
            ));
        }
        match term.as_ref() {
            Term::Const { text } => {
                let start = self.add_state();
                let mut current = start;
                for ch in text.chars() {
                    let next = self.add_state();
                    self.add_edge(current, CharPred::Exact(ch), next);
                    current = next;
                }
                Ok((start, current))
            }
            Term::CharGroup { group } => {
                let unit = self.flatten_group(group, depth)?;
                let start = self.add_state();
                let end = self.add_state();
                self.add_edge(start, CharPred::Group(unit), end);
                Ok((start, end))
            }
            Term::Concat { terms } => {
                let start = self.add_state();
                let mut current = start;
                for part in terms {
                    let (frag_start, frag_end) = self.compile_term(part, depth)?;
                    self.add_epsilon(current, frag_start);
                    current = frag_end;
                }
                Ok((start, current))
            }
            Term::Alternate { terms, .. } => {
                let start = self.add_state();
                let end = self.add_state();
                for part in terms {
                    let (frag_start, frag_end) = self.compile_term(part, depth)?;
                    self.add_epsilon(start, frag_start);
                    self.add_epsilon(frag_end, end);
                }
                Ok((start, end))
            }
            Term::Multiply { term, min, max, .. } => {
                let start = self.add_state();
                let mut current = start;
                for _ in 0..*min {
                    let (frag_start, frag_end) = self.compile_term(term, depth)?;
                    self.add_epsilon(current, frag_start);
                    current = frag_end;
                }
                match max {
                    Some(max) => {
                        for _ in *min..*max {
                            let (frag_start, frag_end) = self.compile_term(term, depth)?;
                            let next = self.add_state();
                            self.add_epsilon(current, frag_start);
                            self.add_epsilon(frag_end, next);
                            // Skipping the optional copy is also viable.
                            self.add_epsilon(current, next);
                            current = next;
                        }
                    }
                    None => {
                        let (frag_start, frag_end) = self.compile_term(term, depth)?;
                        self.add_epsilon(current, frag_start);
                        self.add_epsilon(frag_end, current);
                    }
                }
                Ok((start, current))
            }
            Term::Reference { target } => {
                let resolved = self
                    .repo
                    .resolve_symbol(target, None)
                    .or_else(|_| {
                        let qualified = format!("{}.{}", self.module_name, target);
                        self.repo
                            .resolve_symbol(&QualifiedName::parse(&qualified), None)
                    })
                    .map_err(|e| LexError(format!("token reference `{target}`: {e}")))?;
                self.compile_term(&resolved.term, depth + 1)
            }
            Term::Token { .. } => Err(LexError(
                "token terms are not allowed inside token definitions".to_owned(),
            )),
        }
    }

    /// Replace every [CharGroupUnit::Ref] with its definition so edge
    /// predicates can be evaluated without the repository.
    fn flatten_group(
        &self,
        name: &QualifiedName,
        depth: usize,
    ) -> Result<CharGroupUnit, LexError> {
        let group = self
            .repo
            .get_char_group(name, None)
            .or_else(|_| {
                let qualified = format!("{}.{}", self.module_name, name);
                self.repo
                    .get_char_group(&QualifiedName::parse(&qualified), None)
            })
            .map_err(|e| LexError(format!("char group `{name}`: {e}")))?;
        self.flatten_unit(&group.unit, depth)
    }

    fn flatten_unit(&self, unit: &CharGroupUnit, depth: usize) -> Result<CharGroupUnit, LexError> {
        if depth > MAX_INLINE_DEPTH {
            return Err(LexError("char group nests references too deeply".to_owned()));
        }
        Ok(match unit {
            CharGroupUnit::Sequence { start, end } => CharGroupUnit::Sequence {
                start: *start,
                end: *end,
            },
            CharGroupUnit::Union(units) => CharGroupUnit::Union(
                units
                    .iter()
                    .map(|unit| self.flatten_unit(unit, depth))
                    .collect::<Result<_, _>>()?,
            ),
            CharGroupUnit::Intersect(units) => CharGroupUnit::Intersect(
                units
                    .iter()
                    .map(|unit| self.flatten_unit(unit, depth))
                    .collect::<Result<_, _>>()?,
            ),
            CharGroupUnit::Invert(inner) => {
                CharGroupUnit::Invert(Box::new(self.flatten_unit(inner, depth)?))
            }
            CharGroupUnit::Ref(name) => self.flatten_group(name, depth + 1)?,
        })
    }
}
