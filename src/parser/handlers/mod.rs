//! Parsing handlers: the callbacks that turn matched input into AST
//! data at production reductions. The engine calls a symbol's handler
//! when its production level completes; the handler builds (or splices)
//! the nodes delivered to the enclosing level.
mod commands;

pub use self::commands::*;

use log::{debug, trace};

use crate::ast::{Ast, Bracket, NodeId, NodeKind};
use crate::basic::{Ident, IdentTable, SourceLocation};
use crate::grammar::{GrammarRepository, VarValue};
use crate::notices::{Notice, NoticeCode, NoticeStore};

use super::state::ModifierLevel;

/// Everything a handler may touch. Grammar mutation through `repo` is
/// legal and takes effect for parser states created afterwards.
pub struct HandlerCtx<'a> {
    pub ast: &'a mut Ast,
    pub idents: &'a mut IdentTable,
    pub notices: &'a mut NoticeStore,
    /// Decision branch notices should buffer under.
    pub branch: u32,
    pub repo: &'a mut GrammarRepository,
    pub loader: &'a dyn ImportLoader,
}

impl<'a> HandlerCtx<'a> {
    pub fn notice(&mut self, code: NoticeCode, loc: SourceLocation, message: impl Into<String>) {
        self.notices
            .add_tentative(self.branch, Notice::new(code, loc, message));
    }
}

/// Loads an imported source and returns its top-level statements,
/// already parsed into `ctx.ast`. Implemented by the session; the
/// parser only knows the seam.
pub trait ImportLoader {
    fn load(
        &self,
        path: &str,
        includer: SourceLocation,
        ctx: &mut HandlerCtx,
    ) -> Result<Vec<NodeId>, String>;
}

/// Loader used where imports cannot occur (child parses, tests).
pub struct NoImports;

impl ImportLoader for NoImports {
    fn load(
        &self,
        path: &str,
        _includer: SourceLocation,
        _ctx: &mut HandlerCtx,
    ) -> Result<Vec<NodeId>, String> {
        Err(format!("imports are not available here (`{path}`)"))
    }
}

/// A completed production level handed to its handler.
pub struct CompletedProd<'a> {
    pub prod: Ident,
    pub prod_name: &'a str,
    pub children: Vec<NodeId>,
    pub loc: SourceLocation,
    pub vars: &'a crate::basic::NamedMap<VarValue>,
    /// The state's pending modifiers; handlers for definitions drain
    /// the ones raised at their depth.
    pub modifiers: &'a mut Vec<ModifierLevel>,
    /// Production nesting depth of the completing level.
    pub prod_depth: usize,
}

impl<'a> CompletedProd<'a> {
    fn var_str(&self, key: &str) -> Option<&str> {
        match self.vars.get(key) {
            Some(VarValue::Str(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Modifiers applicable at this level, in declaration order.
    fn drain_modifiers(&mut self) -> Vec<NodeId> {
        let depth = self.prod_depth;
        let mut drained = vec![];
        self.modifiers.retain(|level| {
            if level.min_prod_level >= depth {
                drained.push(level.node);
                false
            } else {
                true
            }
        });
        drained
    }
}

pub enum HandlerResult {
    /// Nodes delivered to the parent level. More than one splices.
    Nodes(Vec<NodeId>),
    /// The production is errored; the parser recovers through the
    /// enclosing error-sync term.
    Failed,
}

/// The callback seam between the grammar and the AST.
pub trait ParsingHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult;

    fn name(&self) -> &'static str {
        "handler"
    }
}

/// Convert a raw matched token into its typed leaf node, keyed by the
/// token definition's name. Unrecognized kinds (operators, keywords)
/// stay as token data for the caller to interpret or filter.
pub fn materialize_leaf(ctx: &mut HandlerCtx, id: NodeId) -> NodeId {
    let NodeKind::TokenData { kind, text } = ctx.ast.kind(id) else {
        return id;
    };
    let kind_name = ctx.idents.resolve(*kind).to_owned();
    let text = text.clone();
    let loc = ctx.ast.loc(id);

    let new_kind = if kind_name.ends_with(".Identifier") {
        NodeKind::Identifier { name: text }
    } else if kind_name.ends_with(".IntLiteral") {
        match parse_int_literal(&text) {
            Some(value) => NodeKind::IntegerLiteral {
                value,
                width: 64,
                signed: true,
            },
            None => {
                ctx.notice(
                    NoticeCode::SyntaxError,
                    loc,
                    format!("malformed integer literal `{text}`"),
                );
                return id;
            }
        }
    } else if kind_name.ends_with(".FloatLiteral") {
        match text.trim_end_matches('f').parse::<f64>() {
            Ok(value) => NodeKind::FloatLiteral { value, width: 64 },
            Err(_) => {
                ctx.notice(
                    NoticeCode::SyntaxError,
                    loc,
                    format!("malformed float literal `{text}`"),
                );
                return id;
            }
        }
    } else if kind_name.ends_with(".StringLiteral") {
        let inner = text.trim_matches('"');
        NodeKind::StringLiteral {
            value: unescape::unescape(inner).unwrap_or_else(|| inner.to_owned()),
        }
    } else if kind_name.ends_with(".CharLiteral") {
        let inner = text.trim_matches('\'');
        let decoded = unescape::unescape(inner).unwrap_or_else(|| inner.to_owned());
        NodeKind::CharLiteral {
            value: decoded.chars().next().unwrap_or('\0'),
        }
    } else {
        return id;
    };

    ctx.ast.add(new_kind, loc)
}

fn parse_int_literal(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()
    } else if let Some(oct) = text.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else {
        text.parse::<i64>().ok()
    }
}

fn is_token_data(ast: &Ast, id: NodeId) -> bool {
    matches!(ast.kind(id), NodeKind::TokenData { .. })
}

fn token_text(ast: &Ast, id: NodeId) -> Option<String> {
    match ast.kind(id) {
        NodeKind::TokenData { text, .. } => Some(text.clone()),
        _ => None,
    }
}

/// Materialize all children and drop leftover token data (separators,
/// keywords, brackets).
fn collect_items(ctx: &mut HandlerCtx, children: &[NodeId]) -> Vec<NodeId> {
    let materialized: Vec<NodeId> = children
        .iter()
        .map(|child| materialize_leaf(ctx, *child))
        .collect();
    materialized
        .into_iter()
        .filter(|child| !is_token_data(ctx.ast, *child))
        .collect()
}

/// The fallback handler: wraps the accumulated children as a list
/// tagged with the production, passing single children through
/// unwrapped.
pub struct GenericHandler;

impl ParsingHandler for GenericHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        // Keep everything, including tokens no later handler claims.
        let items: Vec<NodeId> = level
            .children
            .iter()
            .map(|child| materialize_leaf(ctx, *child))
            .collect();
        match items.len() {
            1 => HandlerResult::Nodes(items),
            _ => {
                let id = ctx.ast.add(NodeKind::List { items }, level.loc);
                ctx.ast.set_prod_id(id, level.prod);
                HandlerResult::Nodes(vec![id])
            }
        }
    }

    fn name(&self) -> &'static str {
        "generic"
    }
}

/// Builds a [NodeKind::List], filtering separators.
pub struct ListHandler;

impl ParsingHandler for ListHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let items = collect_items(ctx, &level.children);
        let id = ctx.ast.add(NodeKind::List { items }, level.loc);
        ctx.ast.set_prod_id(id, level.prod);
        HandlerResult::Nodes(vec![id])
    }

    fn name(&self) -> &'static str {
        "list"
    }
}

/// Builds a [NodeKind::Map] from alternating key/value children. Keys
/// are identifiers or string literals; separators are filtered.
pub struct MapHandler;

impl ParsingHandler for MapHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let items = collect_items(ctx, &level.children);
        let mut entries = vec![];
        let mut pending_key: Option<String> = None;
        for item in items {
            match (&pending_key, ctx.ast.kind(item)) {
                (None, NodeKind::Identifier { name }) => pending_key = Some(name.clone()),
                (None, NodeKind::StringLiteral { value }) => pending_key = Some(value.clone()),
                (None, _) => {
                    ctx.notice(
                        NoticeCode::SyntaxError,
                        level.loc,
                        "map entry is missing its key",
                    );
                    return HandlerResult::Failed;
                }
                (Some(_), _) => {
                    entries.push((pending_key.take().unwrap(), item));
                }
            }
        }
        if pending_key.is_some() {
            ctx.notice(
                NoticeCode::SyntaxError,
                level.loc,
                "map entry is missing its value",
            );
            return HandlerResult::Failed;
        }
        let id = ctx.ast.add(NodeKind::Map { entries }, level.loc);
        ctx.ast.set_prod_id(id, level.prod);
        HandlerResult::Nodes(vec![id])
    }

    fn name(&self) -> &'static str {
        "map"
    }
}

/// Builds a [NodeKind::ExpressionList].
pub struct ExpressionListHandler;

impl ParsingHandler for ExpressionListHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let items = collect_items(ctx, &level.children);
        if items.len() == 1 {
            return HandlerResult::Nodes(items);
        }
        let id = ctx.ast.add(NodeKind::ExpressionList { items }, level.loc);
        HandlerResult::Nodes(vec![id])
    }

    fn name(&self) -> &'static str {
        "expression-list"
    }
}

/// Builds a [NodeKind::Scope] from the collected statements.
pub struct ScopeHandler;

impl ParsingHandler for ScopeHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let statements = collect_items(ctx, &level.children);
        let id = ctx.ast.add(NodeKind::Scope { statements }, level.loc);
        ctx.ast.set_prod_id(id, level.prod);
        HandlerResult::Nodes(vec![id])
    }

    fn name(&self) -> &'static str {
        "scope"
    }
}

/// Builds a [NodeKind::Block].
pub struct BlockHandler;

impl ParsingHandler for BlockHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let statements = collect_items(ctx, &level.children);
        let id = ctx.ast.add(NodeKind::Block { statements }, level.loc);
        HandlerResult::Nodes(vec![id])
    }

    fn name(&self) -> &'static str {
        "block"
    }
}

/// Folds `operand (op operand)*` into infix nodes. The `assoc` var may
/// be `right`; the `kind` var may be `link` to produce member-access
/// nodes.
pub struct InfixHandler;

impl ParsingHandler for InfixHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let children: Vec<NodeId> = level
            .children
            .iter()
            .map(|child| materialize_leaf(ctx, *child))
            .collect();
        if children.is_empty() {
            return HandlerResult::Failed;
        }
        let link = level.var_str("kind") == Some("link");
        let right_assoc = level.var_str("assoc") == Some("right");

        // children: operand, op, operand, op, operand ...
        let mut operands = vec![];
        let mut ops = vec![];
        for child in children {
            match token_text(ctx.ast, child) {
                Some(op) => ops.push(op),
                None => operands.push(child),
            }
        }
        if operands.len() != ops.len() + 1 {
            trace!(
                "infix {}: {} operands vs {} operators",
                level.prod_name,
                operands.len(),
                ops.len()
            );
            return HandlerResult::Failed;
        }
        if operands.len() == 1 {
            return HandlerResult::Nodes(operands);
        }

        let build = |ctx: &mut HandlerCtx, op: String, lhs: NodeId, rhs: NodeId| {
            let loc = ctx.ast.loc(lhs).merged_with(&ctx.ast.loc(rhs));
            let kind = if link {
                NodeKind::LinkOp { lhs, rhs }
            } else {
                NodeKind::InfixOp { op, lhs, rhs }
            };
            ctx.ast.add(kind, loc)
        };

        let result = if right_assoc {
            let mut acc = operands.pop().unwrap();
            while let Some(lhs) = operands.pop() {
                let op = ops.pop().unwrap();
                acc = build(ctx, op, lhs, acc);
            }
            acc
        } else {
            let mut iter = operands.into_iter();
            let mut acc = iter.next().unwrap();
            for (rhs, op) in iter.zip(ops.into_iter()) {
                acc = build(ctx, op, acc, rhs);
            }
            acc
        };
        HandlerResult::Nodes(vec![result])
    }

    fn name(&self) -> &'static str {
        "infix"
    }
}

/// Folds `op* operand` into prefix nodes, innermost last.
pub struct PrefixHandler;

impl ParsingHandler for PrefixHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let children: Vec<NodeId> = level
            .children
            .iter()
            .map(|child| materialize_leaf(ctx, *child))
            .collect();
        let Some((&operand, ops)) = children.split_last() else {
            return HandlerResult::Failed;
        };
        if is_token_data(ctx.ast, operand) {
            return HandlerResult::Failed;
        }
        let mut acc = operand;
        for op in ops.iter().rev() {
            let Some(op_text) = token_text(ctx.ast, *op) else {
                return HandlerResult::Failed;
            };
            let loc = ctx.ast.loc(*op).merged_with(&ctx.ast.loc(acc));
            let kind = match op_text.as_str() {
                "&" => NodeKind::PointerOp { operand: acc },
                "*" => NodeKind::ContentOp { operand: acc },
                _ => NodeKind::PrefixOp {
                    op: op_text,
                    operand: acc,
                },
            };
            acc = ctx.ast.add(kind, loc);
        }
        HandlerResult::Nodes(vec![acc])
    }

    fn name(&self) -> &'static str {
        "prefix"
    }
}

/// Folds `operand op*` into postfix nodes.
pub struct PostfixHandler;

impl ParsingHandler for PostfixHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let children: Vec<NodeId> = level
            .children
            .iter()
            .map(|child| materialize_leaf(ctx, *child))
            .collect();
        let Some((&operand, ops)) = children.split_first() else {
            return HandlerResult::Failed;
        };
        let mut acc = operand;
        for op in ops {
            let Some(op_text) = token_text(ctx.ast, *op) else {
                return HandlerResult::Failed;
            };
            let loc = ctx.ast.loc(acc).merged_with(&ctx.ast.loc(*op));
            acc = ctx.ast.add(
                NodeKind::PostfixOp {
                    op: op_text,
                    operand: acc,
                },
                loc,
            );
        }
        HandlerResult::Nodes(vec![acc])
    }

    fn name(&self) -> &'static str {
        "postfix"
    }
}

/// Builds an [NodeKind::OutfixOp] from `open body close`.
pub struct OutfixHandler;

impl ParsingHandler for OutfixHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let children = &level.children;
        if children.len() < 2 {
            return HandlerResult::Failed;
        }
        let open = token_text(ctx.ast, children[0]).unwrap_or_default();
        let close = token_text(ctx.ast, *children.last().unwrap()).unwrap_or_default();
        let inner = collect_items(ctx, &children[1..children.len() - 1]);
        let Some(&body) = inner.first() else {
            return HandlerResult::Failed;
        };
        let id = ctx.ast.add(NodeKind::OutfixOp { open, close, body }, level.loc);
        HandlerResult::Nodes(vec![id])
    }

    fn name(&self) -> &'static str {
        "outfix"
    }
}

/// Folds `atom (args-list)*` into [NodeKind::ParamPass] chains. An
/// argument list child is a list node whose production name ends with
/// `Square` for square brackets.
pub struct ParamPassHandler;

impl ParsingHandler for ParamPassHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let materialized: Vec<NodeId> = level
            .children
            .iter()
            .map(|child| materialize_leaf(ctx, *child))
            .collect();
        let children: Vec<NodeId> = materialized
            .into_iter()
            .filter(|child| !is_token_data(ctx.ast, *child))
            .collect();
        let Some((&callee, passes)) = children.split_first() else {
            return HandlerResult::Failed;
        };
        let mut acc = callee;
        for pass in passes {
            let (args, bracket) = match ctx.ast.get(*pass) {
                crate::ast::NodeData {
                    kind: NodeKind::List { items },
                    prod_id,
                    ..
                } => {
                    let bracket = match prod_id {
                        Some(prod) if ctx.idents.resolve(*prod).ends_with("Square") => {
                            Bracket::Square
                        }
                        _ => Bracket::Round,
                    };
                    (items.clone(), bracket)
                }
                _ => (vec![*pass], Bracket::Round),
            };
            let loc = ctx.ast.loc(acc).merged_with(&ctx.ast.loc(*pass));
            acc = ctx.ast.add(
                NodeKind::ParamPass {
                    callee: acc,
                    args,
                    bracket,
                },
                loc,
            );
        }
        HandlerResult::Nodes(vec![acc])
    }

    fn name(&self) -> &'static str {
        "param-pass"
    }
}

/// Recognizes `name := value` shapes and emits [NodeKind::Definition],
/// attaching pending modifiers.
pub struct DefHandler;

impl ParsingHandler for DefHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let materialized: Vec<NodeId> = level
            .children
            .iter()
            .map(|child| materialize_leaf(ctx, *child))
            .collect();
        let items: Vec<NodeId> = materialized
            .into_iter()
            .filter(|child| !is_token_data(ctx.ast, *child))
            .collect();
        let [name_node, value] = items.as_slice() else {
            ctx.notice(
                NoticeCode::SyntaxError,
                level.loc,
                "malformed definition: expected `name := value`",
            );
            return HandlerResult::Failed;
        };
        let NodeKind::Identifier { name } = ctx.ast.kind(*name_node) else {
            ctx.notice(
                NoticeCode::SyntaxError,
                level.loc,
                "definition name must be an identifier",
            );
            return HandlerResult::Failed;
        };
        let name = name.clone();
        let modifiers = level.drain_modifiers();
        let id = ctx.ast.add(
            NodeKind::Definition {
                name,
                target: *value,
                modifiers,
            },
            level.loc,
        );
        HandlerResult::Nodes(vec![id])
    }

    fn name(&self) -> &'static str {
        "def"
    }
}

/// Buffers a modifier for the next definition at this depth.
pub struct ModifierHandler;

impl ParsingHandler for ModifierHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let items = collect_items(ctx, &level.children);
        let Some(&node) = items.first() else {
            return HandlerResult::Failed;
        };
        let depth = level.prod_depth;
        level.modifiers.push(ModifierLevel {
            node,
            min_prod_level: depth,
        });
        HandlerResult::Nodes(vec![])
    }

    fn name(&self) -> &'static str {
        "modifier"
    }
}

/// The entry-level handler: collects completed statements into the root
/// scope.
pub struct RootHandler;

impl ParsingHandler for RootHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let statements = collect_items(ctx, &level.children);
        debug!("root production completed with {} statements", statements.len());
        let id = ctx.ast.add(NodeKind::Scope { statements }, level.loc);
        ctx.ast.set_prod_id(id, level.prod);
        HandlerResult::Nodes(vec![id])
    }

    fn name(&self) -> &'static str {
        "root"
    }
}

/// Resolves an `import "path"` statement: the referenced file is lexed
/// and parsed through the loader, and its top-level statements are
/// spliced into the current scope.
pub struct ImportHandler;

impl ParsingHandler for ImportHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let items = collect_items(ctx, &level.children);
        let path = items.first().and_then(|id| match ctx.ast.kind(*id) {
            NodeKind::StringLiteral { value } => Some(value.clone()),
            _ => None,
        });
        let Some(path) = path else {
            ctx.notice(
                NoticeCode::ImportLoadFailed,
                level.loc,
                "import expects a string literal path",
            );
            return HandlerResult::Failed;
        };
        let loc = level.loc;
        let loader = ctx.loader;
        match loader.load(&path, loc, ctx) {
            Ok(statements) => HandlerResult::Nodes(statements),
            Err(message) => {
                ctx.notice(
                    NoticeCode::ImportLoadFailed,
                    loc,
                    format!("failed to import `{path}`: {message}"),
                );
                HandlerResult::Failed
            }
        }
    }

    fn name(&self) -> &'static str {
        "import"
    }
}
