//! Lexical analysis. Token definitions are ordinary grammar symbols
//! living in a lexer module of the repository; on first use they are
//! compiled into an NFA which is simulated in lock-step per character.
//! The compiled automaton remembers the repository version it was built
//! at and is rebuilt whenever the grammar has been mutated since.
mod input;
mod nfa;
mod token;

pub use self::input::*;
pub use self::nfa::*;
pub use self::token::*;

use std::{error::Error, fmt::Display};

use log::{debug, trace};

use crate::basic::{IdentTable, SourceId, SourceLocation};
use crate::grammar::GrammarRepository;
use crate::notices::{Notice, NoticeCode, NoticeStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError(pub String);

impl Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for LexError {}

/// The default cap on a single token's length. Longer runs are clamped
/// with a [NoticeCode::TokenClamped] notice.
pub const DEFAULT_MAX_TOKEN_LENGTH: usize = 16 * 1024;

/// The lexer engine.
///
/// `defs_module` names the grammar module holding the token
/// definitions (the standard factory installs `root.LexerDefs`).
pub struct Lexer {
    defs_module: String,
    max_token_length: usize,
    compiled: Option<CompiledNfa>,
}

impl Lexer {
    pub fn new(defs_module: &str) -> Self {
        Self {
            defs_module: defs_module.to_owned(),
            max_token_length: DEFAULT_MAX_TOKEN_LENGTH,
            compiled: None,
        }
    }

    pub fn with_max_token_length(mut self, max: usize) -> Self {
        self.max_token_length = max;
        self
    }

    /// Tokenize `input` to completion, filtering ignored tokens and
    /// appending lexical notices to `notices`.
    pub fn tokenize(
        &mut self,
        repo: &GrammarRepository,
        idents: &mut IdentTable,
        notices: &mut NoticeStore,
        source_id: SourceId,
        input: &mut dyn CharInStream,
    ) -> Result<Vec<Token>, LexError> {
        self.ensure_compiled(repo, idents)?;
        let nfa = self.compiled.as_ref().unwrap();
        let max_token_length = self.max_token_length;

        let mut tokens = vec![];
        let mut cursor = InputCursor::new(input);
        let mut run = NfaRun::new(nfa, source_id.0);

        while let Some((ch, line, column)) = cursor.peek() {
            if run.buffer_is_empty() {
                run.mark_start(line, column);
            }
            if run.advance(ch, line, column) {
                cursor.consume();
                if run.buffer_len() >= max_token_length {
                    let (start_line, start_column) = run.start_position();
                    notices.add(Notice::new(
                        NoticeCode::TokenClamped,
                        SourceLocation::point(source_id.0, start_line, start_column),
                        format!("token exceeds {max_token_length} characters and was clamped"),
                    ));
                    match run.take_pending() {
                        Some(pending) => {
                            cursor.rewind_to(pending.consumed);
                            emit(&mut run, pending, &mut tokens);
                        }
                        None => {
                            cursor.checkpoint();
                            run.reset();
                        }
                    }
                }
                continue;
            }

            // The character extends no live state.
            match run.take_pending() {
                Some(pending) => {
                    cursor.rewind_to(pending.consumed);
                    emit(&mut run, pending, &mut tokens);
                }
                None => {
                    notices.add(Notice::new(
                        NoticeCode::UnrecognizedChar,
                        SourceLocation::point(source_id.0, line, column),
                        format!("unrecognized character `{ch}`"),
                    ));
                    cursor.consume();
                    cursor.checkpoint();
                    run.reset();
                }
            }
        }

        // End of input: flush whatever is pending.
        while !run.buffer_is_empty() {
            match run.take_pending() {
                Some(pending) => {
                    cursor.rewind_to(pending.consumed);
                    emit(&mut run, pending, &mut tokens);
                    // Re-lex any tail beyond the emitted match.
                    while let Some((ch, line, column)) = cursor.peek() {
                        if run.buffer_is_empty() {
                            run.mark_start(line, column);
                        }
                        if run.advance(ch, line, column) {
                            cursor.consume();
                        } else if let Some(pending) = run.take_pending() {
                            cursor.rewind_to(pending.consumed);
                            emit(&mut run, pending, &mut tokens);
                        } else {
                            notices.add(Notice::new(
                                NoticeCode::UnrecognizedChar,
                                SourceLocation::point(source_id.0, line, column),
                                format!("unrecognized character `{ch}`"),
                            ));
                            cursor.consume();
                            cursor.checkpoint();
                            run.reset();
                        }
                    }
                }
                None => {
                    let (line, column) = run.start_position();
                    notices.add(Notice::new(
                        NoticeCode::UnrecognizedChar,
                        SourceLocation::point(source_id.0, line, column),
                        "unterminated token at end of input",
                    ));
                    run.reset();
                }
            }
        }

        debug!("lexer: produced {} tokens", tokens.len());
        Ok(tokens)
    }

    /// Tokenize a plain string buffer.
    pub fn tokenize_str(
        &mut self,
        repo: &GrammarRepository,
        idents: &mut IdentTable,
        notices: &mut NoticeStore,
        source_id: SourceId,
        text: &str,
    ) -> Result<Vec<Token>, LexError> {
        let mut input = BatchCharInStream::new(text);
        self.tokenize(repo, idents, notices, source_id, &mut input)
    }

    fn ensure_compiled(
        &mut self,
        repo: &GrammarRepository,
        idents: &mut IdentTable,
    ) -> Result<(), LexError> {
        let up_to_date = self
            .compiled
            .as_ref()
            .map(|nfa| nfa.version == repo.version())
            .unwrap_or(false);
        if !up_to_date {
            debug!(
                "lexer: compiling token definitions from `{}` at grammar version {}",
                self.defs_module,
                repo.version()
            );
            self.compiled = Some(CompiledNfa::compile(repo, idents, &self.defs_module)?);
        }
        Ok(())
    }
}

fn emit(run: &mut NfaRun, pending: PendingMatch, tokens: &mut Vec<Token>) {
    let (kind, ignored) = {
        let def = &run.nfa().defs[pending.def];
        trace!("lexer: `{}` -> {}", pending.text, def.name);
        (def.kind, def.ignored)
    };
    if !ignored {
        tokens.push(Token {
            kind,
            prod: kind,
            text: pending.text,
            loc: pending.loc,
        });
    }
    run.reset();
}

/// Cursor over a [CharInStream] with line/column accounting and the
/// ability to rewind within the current token attempt.
struct InputCursor<'a> {
    input: &'a mut dyn CharInStream,
    // Lookahead consumed from the stream but not yet committed.
    buffered: Vec<(char, u32, u32)>,
    position: usize,
    line: u32,
    column: u32,
}

impl<'a> InputCursor<'a> {
    fn new(input: &'a mut dyn CharInStream) -> Self {
        Self {
            input,
            buffered: vec![],
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&mut self) -> Option<(char, u32, u32)> {
        if self.position < self.buffered.len() {
            return Some(self.buffered[self.position]);
        }
        let ch = self.input.get()?;
        let entry = (ch, self.line, self.column);
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.buffered.push(entry);
        Some(entry)
    }

    fn consume(&mut self) {
        self.position += 1;
    }

    /// Drop committed lookahead so the buffer does not grow without
    /// bound.
    fn checkpoint(&mut self) {
        self.buffered.drain(..self.position);
        self.position = 0;
    }

    /// Rewind so that exactly `consumed` characters of the current
    /// attempt stay committed; the rest are re-delivered by `peek`.
    fn rewind_to(&mut self, consumed: usize) {
        self.position = consumed;
        self.checkpoint();
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::basic::{IdentTable, SourceId};
    use crate::grammar::{
        CharGroupDefinition, CharGroupUnit, GrammarRepository, GrammarValue, SymbolDefinition,
        SymbolFlags, Term, TermFlags,
    };
    use crate::notices::{NoticeCode, NoticeStore};

    use super::Lexer;

    /// A minimal lexer module: identifiers, integers, `+`, whitespace.
    fn setup_repo() -> GrammarRepository {
        let mut repo = GrammarRepository::new();
        repo.add_module("root.TestLexer").unwrap();
        repo.set_value(
            "root.TestLexer.Letter",
            GrammarValue::CharGroup(Rc::new(CharGroupDefinition::new(
                "Letter",
                CharGroupUnit::Union(vec![
                    CharGroupUnit::range('a', 'z'),
                    CharGroupUnit::range('A', 'Z'),
                    CharGroupUnit::single('_'),
                ]),
            ))),
        )
        .unwrap();
        repo.set_value(
            "root.TestLexer.Digit",
            GrammarValue::CharGroup(Rc::new(CharGroupDefinition::new(
                "Digit",
                CharGroupUnit::range('0', '9'),
            ))),
        )
        .unwrap();

        let letter = Term::char_group("root.TestLexer.Letter");
        let digit = Term::char_group("root.TestLexer.Digit");
        let letter_or_digit = Term::alternate(vec![letter.clone(), digit.clone()]);

        repo.set_value(
            "root.TestLexer.Identifier",
            GrammarValue::Symbol(Rc::new(
                SymbolDefinition::new("Identifier")
                    .with_term(Term::concat(vec![
                        letter,
                        Term::zero_or_more(letter_or_digit),
                    ]))
                    .with_priority(0),
            )),
        )
        .unwrap();
        repo.set_value(
            "root.TestLexer.Integer",
            GrammarValue::Symbol(Rc::new(
                SymbolDefinition::new("Integer")
                    .with_term(Term::one_or_more(digit))
                    .with_priority(0),
            )),
        )
        .unwrap();
        // `while` overlaps Identifier; higher priority wins the tie.
        repo.set_value(
            "root.TestLexer.While",
            GrammarValue::Symbol(Rc::new(
                SymbolDefinition::new("While")
                    .with_term(Term::constant("while"))
                    .with_priority(1),
            )),
        )
        .unwrap();
        repo.set_value(
            "root.TestLexer.Plus",
            GrammarValue::Symbol(Rc::new(
                SymbolDefinition::new("Plus").with_term(Term::constant("+")),
            )),
        )
        .unwrap();
        repo.set_value(
            "root.TestLexer.Whitespace",
            GrammarValue::Symbol(Rc::new(
                SymbolDefinition::new("Whitespace")
                    .with_term(Term::multiply(
                        Term::alternate(vec![
                            Term::constant(" "),
                            Term::constant("\t"),
                            Term::constant("\n"),
                        ]),
                        1,
                        None,
                        1,
                        TermFlags::NONE,
                    ))
                    .with_flags(SymbolFlags::IGNORED_TOKEN),
            )),
        )
        .unwrap();
        repo
    }

    fn lex(text: &str) -> (Vec<(String, String)>, NoticeStore) {
        let repo = setup_repo();
        let mut idents = IdentTable::new();
        let mut notices = NoticeStore::new();
        let mut lexer = Lexer::new("root.TestLexer");
        let tokens = lexer
            .tokenize_str(&repo, &mut idents, &mut notices, SourceId(0), text)
            .unwrap();
        let described = tokens
            .into_iter()
            .map(|token| {
                (
                    idents.resolve(token.kind).to_owned(),
                    token.text,
                )
            })
            .collect();
        (described, notices)
    }

    #[test]
    fn test_maximal_munch_and_whitespace_filter() {
        let (tokens, notices) = lex("abc 12+34");
        let texts: Vec<_> = tokens.iter().map(|(_, text)| text.as_str()).collect();
        assert_eq!(texts, vec!["abc", "12", "+", "34"]);
        assert!(!notices.has_errors());
    }

    #[test]
    fn test_keyword_beats_identifier_by_priority() {
        let (tokens, _) = lex("while whilex");
        assert_eq!(tokens[0].0, "root.TestLexer.While");
        // The longer identifier match wins over the keyword prefix.
        assert_eq!(tokens[1].0, "root.TestLexer.Identifier");
        assert_eq!(tokens[1].1, "whilex");
    }

    #[test]
    fn test_unrecognized_char_is_skipped_and_reseeded() {
        let (tokens, notices) = lex("ab?cd");
        let texts: Vec<_> = tokens.iter().map(|(_, text)| text.as_str()).collect();
        assert_eq!(texts, vec!["ab", "cd"]);
        assert_eq!(notices.notices().len(), 1);
        assert_eq!(notices.notices()[0].code, NoticeCode::UnrecognizedChar);
    }

    #[test]
    fn test_determinism() {
        let (first, _) = lex("while a12 + 3");
        let (second, _) = lex("while a12 + 3");
        assert_eq!(first, second);
    }

    #[test]
    fn test_token_positions() {
        let repo = setup_repo();
        let mut idents = IdentTable::new();
        let mut notices = NoticeStore::new();
        let mut lexer = Lexer::new("root.TestLexer");
        let tokens = lexer
            .tokenize_str(&repo, &mut idents, &mut notices, SourceId(0), "ab\n cd")
            .unwrap();
        assert_eq!((tokens[0].loc.line, tokens[0].loc.column), (1, 1));
        assert_eq!((tokens[1].loc.line, tokens[1].loc.column), (2, 2));
    }

    #[test]
    fn test_clamped_long_token() {
        let repo = setup_repo();
        let mut idents = IdentTable::new();
        let mut notices = NoticeStore::new();
        let mut lexer = Lexer::new("root.TestLexer").with_max_token_length(8);
        let long = "a".repeat(20);
        let tokens = lexer
            .tokenize_str(&repo, &mut idents, &mut notices, SourceId(0), &long)
            .unwrap();
        assert!(tokens.len() > 1);
        assert!(notices
            .notices()
            .iter()
            .any(|notice| notice.code == NoticeCode::TokenClamped));
    }
}
