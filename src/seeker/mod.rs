//! Path-based lookup over the AST. Lookup starts at a node and walks
//! enclosing scopes outward, honoring aliases transparently, `use`
//! statements as additional roots for unqualified names, `bridge`
//! statements as named grafts of another module's members, and nested
//! module bodies for qualified segments. All matches are returned;
//! callee selection picks among them.
use std::collections::HashSet;

use log::trace;

use crate::ast::{Ast, NodeId, NodeKind};

// Alias and `use` resolution re-enters the seeker; this bounds
// self-referential chains.
const MAX_SEEK_DEPTH: usize = 32;

/// Find every definition matching the dot-separated `path`, starting
/// from `start` and walking outward.
pub fn seek(ast: &Ast, start: NodeId, path: &str) -> Vec<NodeId> {
    seek_depth(ast, start, path, 0)
}

fn seek_depth(ast: &Ast, start: NodeId, path: &str, depth: usize) -> Vec<NodeId> {
    if depth > MAX_SEEK_DEPTH {
        return vec![];
    }
    let segments: Vec<&str> = path.split('.').collect();
    let Some((first, rest)) = segments.split_first() else {
        return vec![];
    };

    let mut found = seek_outward(ast, start, first, depth);
    for segment in rest {
        let mut next = vec![];
        for candidate in found {
            let target = definition_target(ast, candidate);
            if let Some(scope) = member_scope(ast, target) {
                next.extend(search_scope(ast, scope, segment, &mut HashSet::new(), depth));
            }
        }
        found = next;
    }
    found
}

/// Resolve a callee expression node (`Identifier` or a `LinkOp` chain)
/// to its candidate definitions.
pub fn seek_callee(ast: &Ast, scope_of: NodeId, callee: NodeId) -> Vec<NodeId> {
    match ast.kind(callee) {
        NodeKind::Identifier { name } => seek_outward(ast, scope_of, name, 0),
        NodeKind::LinkOp { lhs, rhs } => {
            let NodeKind::Identifier { name } = ast.kind(*rhs) else {
                return vec![];
            };
            let name = name.clone();
            let mut out = vec![];
            for base in seek_callee(ast, scope_of, *lhs) {
                let target = definition_target(ast, base);
                if let Some(scope) = member_scope(ast, target) {
                    out.extend(search_scope(ast, scope, &name, &mut HashSet::new(), 0));
                }
            }
            out
        }
        _ => vec![],
    }
}

/// Walk from `start` outward through enclosing scopes, collecting every
/// definition of `name`. Inner scopes come first, so callers preferring
/// the closest match can take the head.
fn seek_outward(ast: &Ast, start: NodeId, name: &str, depth: usize) -> Vec<NodeId> {
    let mut out = vec![];
    let mut current = Some(start);
    let mut guard = HashSet::new();
    while let Some(node) = current {
        if is_scope(ast, node) {
            out.extend(search_scope(ast, node, name, &mut guard, depth));
        }
        current = ast.parent(node);
    }
    trace!("seek `{name}`: {} match(es)", out.len());
    out
}

fn is_scope(ast: &Ast, node: NodeId) -> bool {
    matches!(
        ast.kind(node),
        NodeKind::Scope { .. } | NodeKind::Block { .. }
    )
}

/// Search one scope for `name`: direct definitions, aliases (followed
/// transparently), bridges whose graft name matches, and roots added
/// by `use` statements.
fn search_scope(
    ast: &Ast,
    scope: NodeId,
    name: &str,
    guard: &mut HashSet<NodeId>,
    depth: usize,
) -> Vec<NodeId> {
    if !guard.insert(scope) || depth > MAX_SEEK_DEPTH {
        return vec![];
    }
    let statements = match ast.kind(scope) {
        NodeKind::Scope { statements } | NodeKind::Block { statements } => statements.clone(),
        _ => return vec![],
    };

    let mut out = vec![];
    let mut extra_roots = vec![];
    for statement in statements {
        match ast.kind(statement) {
            NodeKind::Definition { name: def_name, .. } if def_name == name => {
                out.push(statement);
            }
            NodeKind::Alias {
                name: alias_name,
                target,
            } if alias_name == name => {
                // Transparent: resolve the alias target in its own
                // context and deliver those definitions instead.
                if let Some(path) = path_of(ast, *target) {
                    out.extend(seek_depth(ast, statement, &path, depth + 1));
                }
            }
            NodeKind::Bridge {
                name: bridge_name,
                target,
            } if bridge_name == name => {
                // A named graft: the bridge name resolves to the
                // target's definitions, so qualified paths through it
                // reach the target's members. Unlike `use`, nothing
                // spills into unqualified lookup.
                if let Some(path) = path_of(ast, *target) {
                    out.extend(seek_depth(ast, statement, &path, depth + 1));
                }
            }
            NodeKind::Use { target } => {
                extra_roots.push(*target);
            }
            _ => {}
        }
    }

    for root in extra_roots {
        if let Some(path) = path_of(ast, root) {
            for base in seek_depth(ast, scope, &path, depth + 1) {
                let target = definition_target(ast, base);
                if let Some(inner) = member_scope(ast, target) {
                    out.extend(search_scope(ast, inner, name, guard, depth));
                }
            }
        }
    }
    out
}

/// The definition's payload, or the node itself when it is not a
/// definition.
pub fn definition_target(ast: &Ast, node: NodeId) -> NodeId {
    match ast.kind(node) {
        NodeKind::Definition { target, .. } => *target,
        _ => node,
    }
}

/// The scope holding a node's members, for qualified lookup into
/// modules and user types.
fn member_scope(ast: &Ast, node: NodeId) -> Option<NodeId> {
    match ast.kind(node) {
        NodeKind::Module { body, .. } | NodeKind::UserType { body } => Some(*body),
        NodeKind::Scope { .. } => Some(node),
        _ => None,
    }
}

/// Render an `Identifier`/`LinkOp` chain back into a dotted path.
fn path_of(ast: &Ast, node: NodeId) -> Option<String> {
    match ast.kind(node) {
        NodeKind::Identifier { name } => Some(name.clone()),
        NodeKind::LinkOp { lhs, rhs } => {
            let left = path_of(ast, *lhs)?;
            let right = path_of(ast, *rhs)?;
            Some(format!("{left}.{right}"))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Ast, NodeId, NodeKind};
    use crate::basic::SourceLocation;

    use super::{seek, seek_callee};

    fn loc() -> SourceLocation {
        SourceLocation::default()
    }

    fn ident(ast: &mut Ast, name: &str) -> NodeId {
        ast.add(
            NodeKind::Identifier {
                name: name.to_owned(),
            },
            loc(),
        )
    }

    fn def(ast: &mut Ast, name: &str, target: NodeId) -> NodeId {
        ast.add(
            NodeKind::Definition {
                name: name.to_owned(),
                target,
                modifiers: vec![],
            },
            loc(),
        )
    }

    /// root scope: { module M { x := <int> }, y := <int>, <marker> }
    fn build_tree(ast: &mut Ast) -> (NodeId, NodeId, NodeId, NodeId) {
        let x_value = ast.add(
            NodeKind::IntegerLiteral {
                value: 1,
                width: 64,
                signed: true,
            },
            loc(),
        );
        let x_def = def(ast, "x", x_value);
        let module_body = ast.add(
            NodeKind::Scope {
                statements: vec![x_def],
            },
            loc(),
        );
        let module = ast.add(
            NodeKind::Module {
                name: "M".to_owned(),
                body: module_body,
            },
            loc(),
        );
        let module_def = def(ast, "M", module);

        let y_value = ast.add(
            NodeKind::IntegerLiteral {
                value: 2,
                width: 64,
                signed: true,
            },
            loc(),
        );
        let y_def = def(ast, "y", y_value);

        let marker = ident(ast, "marker");
        let root = ast.add(
            NodeKind::Scope {
                statements: vec![module_def, y_def, marker],
            },
            loc(),
        );
        (root, marker, x_def, y_def)
    }

    #[test]
    fn test_finds_in_enclosing_scope() {
        let mut ast = Ast::new();
        let (_root, marker, _x, y_def) = build_tree(&mut ast);
        assert_eq!(seek(&ast, marker, "y"), vec![y_def]);
    }

    #[test]
    fn test_qualified_lookup_through_module() {
        let mut ast = Ast::new();
        let (_root, marker, x_def, _y) = build_tree(&mut ast);
        assert_eq!(seek(&ast, marker, "M.x"), vec![x_def]);
    }

    #[test]
    fn test_use_statement_adds_root() {
        let mut ast = Ast::new();
        let (root, marker, x_def, _y) = build_tree(&mut ast);
        // Append `use M` to the root scope.
        let m_ref = ident(&mut ast, "M");
        let use_stmt = ast.add(NodeKind::Use { target: m_ref }, loc());
        ast.append_to(root, use_stmt);

        assert_eq!(seek(&ast, marker, "x"), vec![x_def]);
    }

    #[test]
    fn test_bridge_grafts_members_under_its_name() {
        let mut ast = Ast::new();
        let (root, marker, x_def, _y) = build_tree(&mut ast);
        let m_ref = ident(&mut ast, "M");
        let bridge = ast.add(
            NodeKind::Bridge {
                name: "IO".to_owned(),
                target: m_ref,
            },
            loc(),
        );
        ast.append_to(root, bridge);

        // Qualified paths through the graft name reach the target's
        // members.
        assert_eq!(seek(&ast, marker, "IO.x"), vec![x_def]);
        // Unlike `use`, nothing spills into unqualified lookup.
        assert!(seek(&ast, marker, "x").is_empty());
    }

    #[test]
    fn test_alias_is_transparent() {
        let mut ast = Ast::new();
        let (root, marker, _x, y_def) = build_tree(&mut ast);
        let y_ref = ident(&mut ast, "y");
        let alias = ast.add(
            NodeKind::Alias {
                name: "why".to_owned(),
                target: y_ref,
            },
            loc(),
        );
        ast.append_to(root, alias);

        assert_eq!(seek(&ast, marker, "why"), vec![y_def]);
    }

    #[test]
    fn test_overloads_all_returned() {
        let mut ast = Ast::new();
        let a = ast.add(NodeKind::VoidType, loc());
        let b = ast.add(NodeKind::VoidType, loc());
        let def_a = def(&mut ast, "f", a);
        let def_b = def(&mut ast, "f", b);
        let marker = ident(&mut ast, "marker");
        let _root = ast.add(
            NodeKind::Scope {
                statements: vec![def_a, def_b, marker],
            },
            loc(),
        );

        assert_eq!(seek(&ast, marker, "f"), vec![def_a, def_b]);
    }

    #[test]
    fn test_callee_link_chain() {
        let mut ast = Ast::new();
        let (_root, marker, x_def, _y) = build_tree(&mut ast);
        let m = ident(&mut ast, "M");
        let x = ident(&mut ast, "x");
        let link = ast.add(NodeKind::LinkOp { lhs: m, rhs: x }, loc());

        assert_eq!(seek_callee(&ast, marker, link), vec![x_def]);
    }
}
