use crate::ast::{NodeId, NodeKind};
use crate::notices::NoticeCode;

use super::{
    collect_items, CompletedProd, HandlerCtx, HandlerResult, ParsingHandler,
};

/// Builds statement nodes for keyword commands. The symbol's `cmd` var
/// selects the shape: `if`, `while`, `for`, `return`, `break`,
/// `continue`, `use`, `module`, `alias`, `bridge` (a named graft of
/// another module's members), `preprocess`, `eval`, `cast`, `size`,
/// `init`, `terminate`.
pub struct CommandHandler;

impl CommandHandler {
    fn build(
        &self,
        ctx: &mut HandlerCtx,
        level: &mut CompletedProd,
        items: Vec<NodeId>,
    ) -> Option<NodeKind> {
        let cmd = level.var_str("cmd").unwrap_or_default().to_owned();
        match (cmd.as_str(), items.as_slice()) {
            ("if", [cond, body]) => Some(NodeKind::If {
                cond: *cond,
                body: *body,
                else_body: None,
            }),
            ("if", [cond, body, else_body]) => Some(NodeKind::If {
                cond: *cond,
                body: *body,
                else_body: Some(*else_body),
            }),
            ("while", [cond, body]) => Some(NodeKind::While {
                cond: *cond,
                body: *body,
            }),
            ("for", [init, cond, step, body]) => Some(NodeKind::For {
                init: Some(*init),
                cond: Some(*cond),
                step: Some(*step),
                body: *body,
            }),
            ("return", []) => Some(NodeKind::Return { value: None }),
            ("return", [value]) => Some(NodeKind::Return {
                value: Some(*value),
            }),
            ("break", []) => Some(NodeKind::Break),
            ("continue", []) => Some(NodeKind::Continue),
            ("use", [target]) => Some(NodeKind::Use { target: *target }),
            ("preprocess", [body]) => Some(NodeKind::Preprocess { body: *body }),
            ("eval", [expr]) => Some(NodeKind::Eval { expr: *expr }),
            ("bridge", [name, target]) => {
                let NodeKind::Identifier { name } = ctx.ast.kind(*name) else {
                    return None;
                };
                Some(NodeKind::Bridge {
                    name: name.clone(),
                    target: *target,
                })
            }
            ("alias", [name, target]) => {
                let NodeKind::Identifier { name } = ctx.ast.kind(*name) else {
                    return None;
                };
                Some(NodeKind::Alias {
                    name: name.clone(),
                    target: *target,
                })
            }
            ("module", [name, body]) => {
                let NodeKind::Identifier { name } = ctx.ast.kind(*name) else {
                    return None;
                };
                Some(NodeKind::Module {
                    name: name.clone(),
                    body: *body,
                })
            }
            ("cast", [target_type, value]) => Some(NodeKind::CastOp {
                value: *value,
                target_type: *target_type,
            }),
            ("size", [operand]) => Some(NodeKind::SizeOp { operand: *operand }),
            ("init", [operand, args @ ..]) => Some(NodeKind::InitOp {
                operand: *operand,
                args: args.to_vec(),
            }),
            ("terminate", [operand]) => Some(NodeKind::TerminateOp { operand: *operand }),
            _ => None,
        }
    }
}

impl ParsingHandler for CommandHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let items = collect_items(ctx, &level.children);
        let loc = level.loc;
        match self.build(ctx, level, items) {
            Some(kind) => {
                let wrap_def = matches!(kind, NodeKind::Module { .. });
                let id = ctx.ast.add(kind, loc);
                ctx.ast.set_prod_id(id, level.prod);
                if wrap_def {
                    let NodeKind::Module { name, .. } = ctx.ast.kind(id) else {
                        unreachable!()
                    };
                    let name = name.clone();
                    let modifiers = level.drain_modifiers();
                    let def = ctx.ast.add(
                        NodeKind::Definition {
                            name,
                            target: id,
                            modifiers,
                        },
                        loc,
                    );
                    return HandlerResult::Nodes(vec![def]);
                }
                HandlerResult::Nodes(vec![id])
            }
            None => {
                let cmd = level.var_str("cmd").unwrap_or("?").to_owned();
                ctx.notice(
                    NoticeCode::SyntaxError,
                    loc,
                    format!("malformed `{cmd}` command"),
                );
                HandlerResult::Failed
            }
        }
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

/// Builds the [NodeKind::FunctionType] of a function signature:
/// `( args ) (: ret)?`. Argument definitions arrive as a list child;
/// the optional return type is any trailing expression.
pub struct SignatureHandler;

impl ParsingHandler for SignatureHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let items = collect_items(ctx, &level.children);
        let mut args = vec![];
        let mut ret = None;
        for item in items {
            match ctx.ast.kind(item) {
                NodeKind::List { items } => args.extend(items.iter().copied()),
                NodeKind::Definition { .. } | NodeKind::ArgPack { .. } => args.push(item),
                _ => ret = Some(item),
            }
        }
        let id = ctx.ast.add(
            NodeKind::FunctionType {
                args,
                ret,
                modifiers: vec![],
            },
            level.loc,
        );
        HandlerResult::Nodes(vec![id])
    }

    fn name(&self) -> &'static str {
        "signature"
    }
}

/// Builds one function argument: `name: type` becomes a definition,
/// `name: ...` an argument pack.
pub struct ArgHandler;

impl ParsingHandler for ArgHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let children: Vec<NodeId> = level
            .children
            .iter()
            .map(|child| super::materialize_leaf(ctx, *child))
            .collect();
        let mut name = None;
        let mut variadic = false;
        let mut ty = None;
        for child in &children {
            match ctx.ast.kind(*child) {
                NodeKind::Identifier { name: id_name } if name.is_none() => {
                    name = Some(id_name.clone());
                }
                NodeKind::TokenData { text, .. } if text == "..." => variadic = true,
                NodeKind::TokenData { .. } => {}
                _ => ty = Some(*child),
            }
        }
        let Some(name) = name else {
            ctx.notice(
                NoticeCode::SyntaxError,
                level.loc,
                "argument name must be an identifier",
            );
            return HandlerResult::Failed;
        };
        let id = if variadic {
            ctx.ast.add(
                NodeKind::ArgPack {
                    name,
                    min: 0,
                    max: None,
                    ty,
                },
                level.loc,
            )
        } else {
            let Some(ty) = ty else {
                ctx.notice(
                    NoticeCode::SyntaxError,
                    level.loc,
                    "argument is missing a type",
                );
                return HandlerResult::Failed;
            };
            ctx.ast.add(
                NodeKind::Definition {
                    name,
                    target: ty,
                    modifiers: vec![],
                },
                level.loc,
            )
        };
        HandlerResult::Nodes(vec![id])
    }

    fn name(&self) -> &'static str {
        "arg"
    }
}

/// Builds `func name signature body?` into a named function
/// definition.
pub struct FunctionHandler;

impl ParsingHandler for FunctionHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let items = collect_items(ctx, &level.children);
        let mut name = None;
        let mut ty = None;
        let mut body = None;
        for item in items {
            match ctx.ast.kind(item) {
                NodeKind::Identifier { name: id_name } if name.is_none() => {
                    name = Some(id_name.clone());
                }
                NodeKind::FunctionType { .. } => ty = Some(item),
                NodeKind::Block { .. } => body = Some(item),
                _ => {}
            }
        }
        let (Some(name), Some(ty)) = (name, ty) else {
            ctx.notice(
                NoticeCode::SyntaxError,
                level.loc,
                "malformed function definition",
            );
            return HandlerResult::Failed;
        };
        let function = ctx.ast.add(NodeKind::Function { ty, body }, level.loc);
        let modifiers = level.drain_modifiers();
        let def = ctx.ast.add(
            NodeKind::Definition {
                name,
                target: function,
                modifiers,
            },
            level.loc,
        );
        HandlerResult::Nodes(vec![def])
    }

    fn name(&self) -> &'static str {
        "function"
    }
}

/// Builds `macro name [params] body` and `template name [params] body`
/// definitions; the `cmd` var selects which.
pub struct ExpansionHandler;

impl ParsingHandler for ExpansionHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let items = collect_items(ctx, &level.children);
        let mut name = None;
        let mut params = vec![];
        let mut body = None;
        for item in items {
            match ctx.ast.kind(item) {
                NodeKind::Identifier { name: id_name } if name.is_none() => {
                    name = Some(id_name.clone());
                }
                NodeKind::List { items } => {
                    for param in items {
                        if let NodeKind::Identifier { name } = ctx.ast.kind(*param) {
                            params.push(name.clone());
                        }
                    }
                }
                _ => body = Some(item),
            }
        }
        let (Some(name), Some(body)) = (name, body) else {
            ctx.notice(
                NoticeCode::SyntaxError,
                level.loc,
                "malformed macro or template definition",
            );
            return HandlerResult::Failed;
        };
        let kind = if level.var_str("cmd") == Some("template") {
            NodeKind::Template { params, body }
        } else {
            NodeKind::Macro { params, body }
        };
        let target = ctx.ast.add(kind, level.loc);
        let modifiers = level.drain_modifiers();
        let def = ctx.ast.add(
            NodeKind::Definition {
                name,
                target,
                modifiers,
            },
            level.loc,
        );
        HandlerResult::Nodes(vec![def])
    }

    fn name(&self) -> &'static str {
        "expansion"
    }
}

/// Builds `type name { members }` into a user-type definition.
pub struct UserTypeHandler;

impl ParsingHandler for UserTypeHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let items = collect_items(ctx, &level.children);
        let mut name = None;
        let mut body = None;
        for item in items {
            match ctx.ast.kind(item) {
                NodeKind::Identifier { name: id_name } if name.is_none() => {
                    name = Some(id_name.clone());
                }
                NodeKind::Block { statements } => {
                    let statements = statements.clone();
                    let loc = ctx.ast.loc(item);
                    body = Some(ctx.ast.add(NodeKind::Scope { statements }, loc));
                }
                NodeKind::Scope { .. } => body = Some(item),
                _ => {}
            }
        }
        let (Some(name), Some(body)) = (name, body) else {
            ctx.notice(NoticeCode::SyntaxError, level.loc, "malformed type definition");
            return HandlerResult::Failed;
        };
        let target = ctx.ast.add(NodeKind::UserType { body }, level.loc);
        let modifiers = level.drain_modifiers();
        let def = ctx.ast.add(
            NodeKind::Definition {
                name,
                target,
                modifiers,
            },
            level.loc,
        );
        HandlerResult::Nodes(vec![def])
    }

    fn name(&self) -> &'static str {
        "user-type"
    }
}
