//! The standard grammar, installed programmatically at session start.
//! Everything here is ordinary repository data: a library gateway or a
//! parsing handler may extend, replace, or remove any of it at runtime.
use std::rc::Rc;

use log::debug;
use once_cell::sync::Lazy;

use crate::parser::handlers::{
    ArgHandler, BlockHandler, CommandHandler, DefHandler, ExpansionHandler,
    ExpressionListHandler, FunctionHandler, ImportHandler, InfixHandler, ListHandler,
    ModifierHandler, ParamPassHandler, ParsingHandler, PrefixHandler, RootHandler, ScopeHandler,
    SignatureHandler, UserTypeHandler,
};

use super::{
    CharGroupDefinition, CharGroupUnit, GrammarError, GrammarRepository, GrammarValue,
    ParsingDimension, QualifiedName, SymbolDefinition, SymbolFlags, Term, VarValue,
};

/// Token definition names the parser-side grammar refers to.
pub const IDENTIFIER_TOKEN: &str = "root.LexerDefs.Identifier";
pub const INT_TOKEN: &str = "root.LexerDefs.IntLiteral";
pub const FLOAT_TOKEN: &str = "root.LexerDefs.FloatLiteral";
pub const STRING_TOKEN: &str = "root.LexerDefs.StringLiteral";
pub const CHAR_TOKEN: &str = "root.LexerDefs.CharLiteral";

/// The module token definitions live in.
pub const LEXER_MODULE: &str = "root.LexerDefs";
/// The entry production of the standard syntax.
pub const START_PROD: &str = "root.Main.Program";
/// The statement extension point gateways hook into.
pub const STATEMENT_DIMENSION: &str = "root.Main.StatementDim";

// Multi-character operators first; the lexer breaks length ties by
// definition order, and maximal munch handles the prefixes.
static OPERATORS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        ":=", "==", "!=", "<=", ">=", "&&", "||", "->", "...", "+=", "-=", "*=", "/=",
        ".", ",", ":", ";", "+", "-", "*", "/", "%", "<", ">", "=", "(", ")", "[", "]",
        "{", "}", "@", "&", "|", "!", "~", "?",
    ]
});

/// Install the standard grammar into an empty repository.
pub fn build_standard_grammar(repo: &mut GrammarRepository) -> Result<(), GrammarError> {
    build_lexer_module(repo)?;
    build_syntax_module(repo)?;
    debug!("standard grammar installed at version {}", repo.version());
    Ok(())
}

fn char_group(repo: &mut GrammarRepository, name: &str, unit: CharGroupUnit) -> Result<(), GrammarError> {
    repo.set_value(
        &format!("{LEXER_MODULE}.{name}"),
        GrammarValue::CharGroup(Rc::new(CharGroupDefinition::new(name, unit))),
    )
}

fn token_def(
    repo: &mut GrammarRepository,
    name: &str,
    term: Rc<Term>,
    priority: i32,
    ignored: bool,
) -> Result<(), GrammarError> {
    let mut def = SymbolDefinition::new(name)
        .with_term(term)
        .with_priority(priority);
    if ignored {
        def = def.with_flags(SymbolFlags::IGNORED_TOKEN);
    }
    repo.set_value(
        &format!("{LEXER_MODULE}.{name}"),
        GrammarValue::Symbol(Rc::new(def)),
    )
}

fn build_lexer_module(repo: &mut GrammarRepository) -> Result<(), GrammarError> {
    repo.add_module(LEXER_MODULE)?;

    char_group(
        repo,
        "Letter",
        CharGroupUnit::Union(vec![
            CharGroupUnit::range('a', 'z'),
            CharGroupUnit::range('A', 'Z'),
            CharGroupUnit::single('_'),
        ]),
    )?;
    char_group(repo, "Digit", CharGroupUnit::range('0', '9'))?;
    char_group(
        repo,
        "HexDigit",
        CharGroupUnit::Union(vec![
            CharGroupUnit::Ref(QualifiedName::parse("root.LexerDefs.Digit")),
            CharGroupUnit::range('a', 'f'),
            CharGroupUnit::range('A', 'F'),
        ]),
    )?;
    char_group(repo, "BinDigit", CharGroupUnit::range('0', '1'))?;
    char_group(
        repo,
        "StringChar",
        CharGroupUnit::Invert(Box::new(CharGroupUnit::Union(vec![
            CharGroupUnit::single('"'),
            CharGroupUnit::single('\\'),
            CharGroupUnit::single('\n'),
        ]))),
    )?;
    char_group(
        repo,
        "CharChar",
        CharGroupUnit::Invert(Box::new(CharGroupUnit::Union(vec![
            CharGroupUnit::single('\''),
            CharGroupUnit::single('\\'),
            CharGroupUnit::single('\n'),
        ]))),
    )?;
    char_group(
        repo,
        "NotNewline",
        CharGroupUnit::Invert(Box::new(CharGroupUnit::single('\n'))),
    )?;
    char_group(
        repo,
        "NotStar",
        CharGroupUnit::Invert(Box::new(CharGroupUnit::single('*'))),
    )?;
    char_group(
        repo,
        "NotStarSlash",
        CharGroupUnit::Invert(Box::new(CharGroupUnit::Union(vec![
            CharGroupUnit::single('*'),
            CharGroupUnit::single('/'),
        ]))),
    )?;
    char_group(repo, "AnyChar", CharGroupUnit::range('\0', char::MAX))?;

    let letter = Term::char_group("root.LexerDefs.Letter");
    let digit = Term::char_group("root.LexerDefs.Digit");
    let hex_digit = Term::char_group("root.LexerDefs.HexDigit");
    let bin_digit = Term::char_group("root.LexerDefs.BinDigit");

    token_def(
        repo,
        "Identifier",
        Term::concat(vec![
            letter.clone(),
            Term::zero_or_more(Term::alternate(vec![letter, digit.clone()])),
        ]),
        0,
        false,
    )?;
    token_def(
        repo,
        "IntLiteral",
        Term::alternate(vec![
            Term::concat(vec![Term::constant("0x"), Term::one_or_more(hex_digit)]),
            Term::concat(vec![Term::constant("0b"), Term::one_or_more(bin_digit)]),
            Term::one_or_more(digit.clone()),
        ]),
        0,
        false,
    )?;
    token_def(
        repo,
        "FloatLiteral",
        Term::concat(vec![
            Term::one_or_more(digit.clone()),
            Term::constant("."),
            Term::one_or_more(digit.clone()),
            Term::optional(Term::concat(vec![
                Term::alternate(vec![Term::constant("e"), Term::constant("E")]),
                Term::optional(Term::alternate(vec![
                    Term::constant("+"),
                    Term::constant("-"),
                ])),
                Term::one_or_more(digit),
            ])),
        ]),
        // Outranks IntLiteral on the shared digit prefix.
        1,
        false,
    )?;
    token_def(
        repo,
        "StringLiteral",
        Term::concat(vec![
            Term::constant("\""),
            Term::zero_or_more(Term::alternate(vec![
                Term::char_group("root.LexerDefs.StringChar"),
                Term::concat(vec![
                    Term::constant("\\"),
                    Term::char_group("root.LexerDefs.AnyChar"),
                ]),
            ])),
            Term::constant("\""),
        ]),
        0,
        false,
    )?;
    token_def(
        repo,
        "CharLiteral",
        Term::concat(vec![
            Term::constant("'"),
            Term::alternate(vec![
                Term::char_group("root.LexerDefs.CharChar"),
                Term::concat(vec![
                    Term::constant("\\"),
                    Term::char_group("root.LexerDefs.AnyChar"),
                ]),
            ]),
            Term::constant("'"),
        ]),
        0,
        false,
    )?;

    token_def(
        repo,
        "Operator",
        Term::alternate(OPERATORS.iter().map(|op| Term::constant(op)).collect()),
        0,
        false,
    )?;

    token_def(
        repo,
        "Whitespace",
        Term::one_or_more(Term::alternate(vec![
            Term::constant(" "),
            Term::constant("\t"),
            Term::constant("\r"),
            Term::constant("\n"),
        ])),
        0,
        true,
    )?;
    token_def(
        repo,
        "LineComment",
        Term::concat(vec![
            Term::constant("//"),
            Term::zero_or_more(Term::char_group("root.LexerDefs.NotNewline")),
        ]),
        // Outranks the `/` operator prefix.
        1,
        true,
    )?;
    token_def(
        repo,
        "BlockComment",
        Term::concat(vec![
            Term::constant("/*"),
            Term::zero_or_more(Term::alternate(vec![
                Term::char_group("root.LexerDefs.NotStar"),
                Term::concat(vec![
                    Term::one_or_more(Term::constant("*")),
                    Term::char_group("root.LexerDefs.NotStarSlash"),
                ]),
            ])),
            Term::one_or_more(Term::constant("*")),
            Term::constant("/"),
        ]),
        1,
        true,
    )?;
    Ok(())
}

fn prod(
    repo: &mut GrammarRepository,
    name: &str,
    term: Rc<Term>,
    handler: Option<Rc<dyn ParsingHandler>>,
) -> Result<(), GrammarError> {
    let mut def = SymbolDefinition::new(name).with_term(term);
    if let Some(handler) = handler {
        def = def.with_handler(handler);
    }
    repo.set_value(
        &format!("root.Main.{name}"),
        GrammarValue::Symbol(Rc::new(def)),
    )
}

fn command(
    repo: &mut GrammarRepository,
    name: &str,
    cmd: &str,
    term: Rc<Term>,
) -> Result<(), GrammarError> {
    let def = SymbolDefinition::new(name)
        .with_term(term)
        .with_handler(Rc::new(CommandHandler))
        .with_var("cmd", VarValue::Str(cmd.to_owned()));
    repo.set_value(
        &format!("root.Main.{name}"),
        GrammarValue::Symbol(Rc::new(def)),
    )
}

fn build_syntax_module(repo: &mut GrammarRepository) -> Result<(), GrammarError> {
    let main = repo.add_module("root.Main")?;
    main.borrow_mut().start_ref = Some(QualifiedName::parse(START_PROD));

    let ident = || Term::token(IDENTIFIER_TOKEN);
    let expr = || Term::reference("root.Main.Expr");
    let block = || Term::reference("root.Main.Block");
    let statement = || Term::reference("root.Main.Statement");
    let semi = || Term::constant(";");

    // Program := Statement* with error sync at statement boundaries.
    prod(
        repo,
        "Program",
        Term::multiply(
            statement(),
            0,
            None,
            1,
            super::TermFlags::ERROR_SYNC_TERM,
        ),
        Some(Rc::new(RootHandler)),
    )?;

    // The extensible statement entry: a single-branch alternate that
    // gateways extend through the statement dimension.
    prod(
        repo,
        "Statement",
        Term::alternate_with(vec![Term::reference("root.Main.StatementBase")], vec![0]),
        None,
    )?;
    repo.set_value(
        STATEMENT_DIMENSION,
        GrammarValue::Dimension(Rc::new(ParsingDimension {
            name: "StatementDim".to_owned(),
            target: QualifiedName::parse("root.Main.Statement"),
        })),
    )?;

    prod(
        repo,
        "StatementBase",
        Term::alternate(vec![
            Term::reference("root.Main.Import"),
            Term::reference("root.Main.FuncDef"),
            Term::reference("root.Main.TypeDef"),
            Term::reference("root.Main.MacroDef"),
            Term::reference("root.Main.TemplateDef"),
            Term::reference("root.Main.ModuleDef"),
            Term::reference("root.Main.AliasDef"),
            Term::reference("root.Main.BridgeDef"),
            Term::reference("root.Main.IfStmt"),
            Term::reference("root.Main.WhileStmt"),
            Term::reference("root.Main.ForStmt"),
            Term::reference("root.Main.ReturnStmt"),
            Term::reference("root.Main.BreakStmt"),
            Term::reference("root.Main.ContinueStmt"),
            Term::reference("root.Main.UseStmt"),
            Term::reference("root.Main.PreprocessStmt"),
            Term::reference("root.Main.EvalStmt"),
            Term::reference("root.Main.Modifier"),
            Term::reference("root.Main.Def"),
            Term::reference("root.Main.ExprStmt"),
        ]),
        None,
    )?;

    // Statement forms.
    prod(
        repo,
        "Import",
        Term::concat(vec![
            Term::constant("import"),
            Term::token(STRING_TOKEN),
            semi(),
        ]),
        Some(Rc::new(ImportHandler)),
    )?;
    prod(
        repo,
        "Def",
        Term::concat(vec![Term::reference("root.Main.DefCore"), semi()]),
        Some(Rc::new(ExpressionListHandler)),
    )?;
    prod(
        repo,
        "DefCore",
        Term::concat(vec![ident(), Term::constant(":="), expr()]),
        Some(Rc::new(DefHandler)),
    )?;
    prod(
        repo,
        "ExprStmt",
        Term::concat(vec![expr(), semi()]),
        Some(Rc::new(ExpressionListHandler)),
    )?;
    prod(
        repo,
        "Modifier",
        Term::concat(vec![Term::constant("@"), ident()]),
        Some(Rc::new(ModifierHandler)),
    )?;

    command(
        repo,
        "IfStmt",
        "if",
        Term::concat(vec![
            Term::constant("if"),
            expr(),
            block(),
            Term::optional(Term::concat(vec![
                Term::constant("else"),
                Term::alternate(vec![block(), Term::reference("root.Main.IfStmt")]),
            ])),
        ]),
    )?;
    command(
        repo,
        "WhileStmt",
        "while",
        Term::concat(vec![Term::constant("while"), expr(), block()]),
    )?;
    command(
        repo,
        "ForStmt",
        "for",
        Term::concat(vec![
            Term::constant("for"),
            Term::alternate(vec![Term::reference("root.Main.DefCore"), expr()]),
            semi(),
            expr(),
            semi(),
            expr(),
            block(),
        ]),
    )?;
    command(
        repo,
        "ReturnStmt",
        "return",
        Term::concat(vec![
            Term::constant("return"),
            Term::optional(expr()),
            semi(),
        ]),
    )?;
    command(
        repo,
        "BreakStmt",
        "break",
        Term::concat(vec![Term::constant("break"), semi()]),
    )?;
    command(
        repo,
        "ContinueStmt",
        "continue",
        Term::concat(vec![Term::constant("continue"), semi()]),
    )?;
    command(
        repo,
        "UseStmt",
        "use",
        Term::concat(vec![Term::constant("use"), expr(), semi()]),
    )?;
    command(
        repo,
        "PreprocessStmt",
        "preprocess",
        Term::concat(vec![Term::constant("preprocess"), block()]),
    )?;
    command(
        repo,
        "EvalStmt",
        "eval",
        Term::concat(vec![Term::constant("eval"), expr(), semi()]),
    )?;
    command(
        repo,
        "AliasDef",
        "alias",
        Term::concat(vec![
            Term::constant("alias"),
            ident(),
            Term::constant("="),
            expr(),
            semi(),
        ]),
    )?;
    command(
        repo,
        "BridgeDef",
        "bridge",
        Term::concat(vec![
            Term::constant("bridge"),
            ident(),
            Term::constant(":"),
            expr(),
            semi(),
        ]),
    )?;
    command(
        repo,
        "ModuleDef",
        "module",
        Term::concat(vec![
            Term::constant("module"),
            ident(),
            Term::reference("root.Main.ModuleBody"),
        ]),
    )?;

    prod(
        repo,
        "FuncDef",
        Term::concat(vec![
            Term::constant("func"),
            ident(),
            Term::reference("root.Main.Signature"),
            Term::alternate(vec![block(), semi()]),
        ]),
        Some(Rc::new(FunctionHandler)),
    )?;
    prod(
        repo,
        "Signature",
        Term::concat(vec![
            Term::constant("("),
            Term::optional(Term::reference("root.Main.ArgsDecl")),
            Term::constant(")"),
            Term::optional(Term::concat(vec![Term::constant(":"), expr()])),
        ]),
        Some(Rc::new(SignatureHandler)),
    )?;
    prod(
        repo,
        "ArgsDecl",
        Term::concat(vec![
            Term::reference("root.Main.ArgDecl"),
            Term::zero_or_more(Term::concat(vec![
                Term::constant(","),
                Term::reference("root.Main.ArgDecl"),
            ])),
        ]),
        Some(Rc::new(ListHandler)),
    )?;
    prod(
        repo,
        "ArgDecl",
        Term::concat(vec![
            ident(),
            Term::constant(":"),
            Term::alternate(vec![Term::constant("..."), expr()]),
        ]),
        Some(Rc::new(ArgHandler)),
    )?;

    prod(
        repo,
        "TypeDef",
        Term::concat(vec![Term::constant("type"), ident(), block()]),
        Some(Rc::new(UserTypeHandler)),
    )?;

    let expansion_params = Term::reference("root.Main.NameList");
    prod(
        repo,
        "NameList",
        Term::concat(vec![
            Term::constant("["),
            ident(),
            Term::zero_or_more(Term::concat(vec![Term::constant(","), ident()])),
            Term::constant("]"),
        ]),
        Some(Rc::new(ListHandler)),
    )?;
    let expansion_body = Term::alternate(vec![
        block(),
        Term::reference("root.Main.TypeDef"),
        Term::reference("root.Main.FuncDef"),
        Term::concat(vec![expr(), semi()]),
    ]);
    {
        let def = SymbolDefinition::new("MacroDef")
            .with_term(Term::concat(vec![
                Term::constant("macro"),
                ident(),
                expansion_params.clone(),
                expansion_body.clone(),
            ]))
            .with_handler(Rc::new(ExpansionHandler))
            .with_var("cmd", VarValue::Str("macro".to_owned()));
        repo.set_value("root.Main.MacroDef", GrammarValue::Symbol(Rc::new(def)))?;
    }
    {
        let def = SymbolDefinition::new("TemplateDef")
            .with_term(Term::concat(vec![
                Term::constant("template"),
                ident(),
                expansion_params,
                expansion_body,
            ]))
            .with_handler(Rc::new(ExpansionHandler))
            .with_var("cmd", VarValue::Str("template".to_owned()));
        repo.set_value("root.Main.TemplateDef", GrammarValue::Symbol(Rc::new(def)))?;
    }

    prod(
        repo,
        "Block",
        Term::concat(vec![
            Term::constant("{"),
            Term::multiply(statement(), 0, None, 1, super::TermFlags::ERROR_SYNC_TERM),
            Term::constant("}"),
        ]),
        Some(Rc::new(BlockHandler)),
    )?;
    prod(
        repo,
        "ModuleBody",
        Term::concat(vec![
            Term::constant("{"),
            Term::zero_or_more(statement()),
            Term::constant("}"),
        ]),
        Some(Rc::new(ScopeHandler)),
    )?;

    // Expression precedence ladder, loosest first.
    build_expression_ladder(repo)?;
    Ok(())
}

fn infix(
    repo: &mut GrammarRepository,
    name: &str,
    child: &str,
    ops: &[&str],
    right_assoc: bool,
    link: bool,
) -> Result<(), GrammarError> {
    let op_term = if ops.len() == 1 {
        Term::constant(ops[0])
    } else {
        Term::alternate(ops.iter().map(|op| Term::constant(op)).collect())
    };
    let mut def = SymbolDefinition::new(name)
        .with_term(Term::concat(vec![
            Term::reference(child),
            Term::zero_or_more(Term::concat(vec![op_term, Term::reference(child)])),
        ]))
        .with_handler(Rc::new(InfixHandler));
    if right_assoc {
        def = def.with_var("assoc", VarValue::Str("right".to_owned()));
    }
    if link {
        def = def.with_var("kind", VarValue::Str("link".to_owned()));
    }
    repo.set_value(
        &format!("root.Main.{name}"),
        GrammarValue::Symbol(Rc::new(def)),
    )
}

fn build_expression_ladder(repo: &mut GrammarRepository) -> Result<(), GrammarError> {
    prod(
        repo,
        "Expr",
        Term::reference("root.Main.Assignment"),
        None,
    )?;
    infix(
        repo,
        "Assignment",
        "root.Main.LogicalOr",
        &["=", "+=", "-=", "*=", "/="],
        true,
        false,
    )?;
    infix(repo, "LogicalOr", "root.Main.LogicalAnd", &["||"], false, false)?;
    infix(repo, "LogicalAnd", "root.Main.Comparison", &["&&"], false, false)?;
    infix(
        repo,
        "Comparison",
        "root.Main.Additive",
        &["==", "!=", "<", "<=", ">", ">="],
        false,
        false,
    )?;
    infix(
        repo,
        "Additive",
        "root.Main.Multiplicative",
        &["+", "-"],
        false,
        false,
    )?;
    infix(
        repo,
        "Multiplicative",
        "root.Main.Unary",
        &["*", "/", "%"],
        false,
        false,
    )?;

    prod(
        repo,
        "Unary",
        Term::concat(vec![
            Term::zero_or_more(Term::alternate(vec![
                Term::constant("!"),
                Term::constant("-"),
                Term::constant("&"),
                Term::constant("*"),
            ])),
            Term::reference("root.Main.Functional"),
        ]),
        Some(Rc::new(PrefixHandler)),
    )?;

    prod(
        repo,
        "Functional",
        Term::concat(vec![
            Term::reference("root.Main.Member"),
            Term::zero_or_more(Term::alternate(vec![
                Term::reference("root.Main.ArgsRound"),
                Term::reference("root.Main.ArgsSquare"),
            ])),
        ]),
        Some(Rc::new(ParamPassHandler)),
    )?;
    infix(repo, "Member", "root.Main.Atom", &["."], false, true)?;

    let expr = || Term::reference("root.Main.Expr");
    let arg_list = Term::optional(Term::concat(vec![
        expr(),
        Term::zero_or_more(Term::concat(vec![Term::constant(","), expr()])),
    ]));
    prod(
        repo,
        "ArgsRound",
        Term::concat(vec![
            Term::constant("("),
            arg_list.clone(),
            Term::constant(")"),
        ]),
        Some(Rc::new(ListHandler)),
    )?;
    prod(
        repo,
        "ArgsSquare",
        Term::concat(vec![Term::constant("["), arg_list, Term::constant("]")]),
        Some(Rc::new(ListHandler)),
    )?;

    command(
        repo,
        "CastExpr",
        "cast",
        Term::concat(vec![
            Term::constant("cast"),
            Term::constant("["),
            expr(),
            Term::constant("]"),
            Term::constant("("),
            expr(),
            Term::constant(")"),
        ]),
    )?;
    command(
        repo,
        "SizeExpr",
        "size",
        Term::concat(vec![
            Term::constant("size"),
            Term::constant("("),
            expr(),
            Term::constant(")"),
        ]),
    )?;

    prod(
        repo,
        "Paren",
        Term::concat(vec![Term::constant("("), expr(), Term::constant(")")]),
        Some(Rc::new(ExpressionListHandler)),
    )?;
    prod(
        repo,
        "Atom",
        Term::alternate(vec![
            Term::reference("root.Main.CastExpr"),
            Term::reference("root.Main.SizeExpr"),
            Term::token(IDENTIFIER_TOKEN),
            Term::token(INT_TOKEN),
            Term::token(FLOAT_TOKEN),
            Term::token(STRING_TOKEN),
            Term::token(CHAR_TOKEN),
            Term::reference("root.Main.Paren"),
        ]),
        None,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::grammar::{GrammarRepository, GrammarValue, QualifiedName};

    use super::build_standard_grammar;

    #[test]
    fn test_standard_grammar_installs() {
        let mut repo = GrammarRepository::new();
        build_standard_grammar(&mut repo).unwrap();

        assert!(matches!(
            repo.get_value("root.LexerDefs.Identifier"),
            Ok((GrammarValue::Symbol(_), _))
        ));
        assert!(matches!(
            repo.get_value("root.Main.Program"),
            Ok((GrammarValue::Symbol(_), _))
        ));
        // Every statement branch resolves to a term-bearing symbol.
        for name in [
            "root.Main.Statement",
            "root.Main.StatementBase",
            "root.Main.Expr",
            "root.Main.Atom",
            "root.Main.Block",
        ] {
            repo.resolve_symbol(&QualifiedName::parse(name), None)
                .unwrap_or_else(|e| panic!("`{name}` should resolve: {e}"));
        }
    }

    #[test]
    fn test_statement_dimension_hooks() {
        let mut repo = GrammarRepository::new();
        build_standard_grammar(&mut repo).unwrap();
        repo.add_module("root.Ext").unwrap();
        repo.set_value(
            "root.Ext.Hello",
            GrammarValue::Symbol(std::rc::Rc::new(
                crate::grammar::SymbolDefinition::new("Hello")
                    .with_term(crate::grammar::Term::constant("hello")),
            )),
        )
        .unwrap();

        repo.hook_into_dimension(super::STATEMENT_DIMENSION, "root.Ext.Hello", 5)
            .unwrap();
        let resolved = repo
            .resolve_symbol(&QualifiedName::parse("root.Main.Statement"), None)
            .unwrap();
        let crate::grammar::Term::Alternate { terms, .. } = resolved.term.as_ref() else {
            panic!("statement should stay an alternate");
        };
        assert_eq!(terms.len(), 2);

        repo.unhook_from_dimension(super::STATEMENT_DIMENSION, "root.Ext.Hello")
            .unwrap();
        let resolved = repo
            .resolve_symbol(&QualifiedName::parse("root.Main.Statement"), None)
            .unwrap();
        let crate::grammar::Term::Alternate { terms, .. } = resolved.term.as_ref() else {
            panic!("statement should stay an alternate");
        };
        assert_eq!(terms.len(), 1);
    }
}
