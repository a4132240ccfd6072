//! The abstract syntax tree. All nodes of a session live in one arena
//! and are addressed by stable [NodeId]s; parent links and cross-tree
//! references are plain ids consulted through the arena, so speculative
//! parser branches can share prefixes without copying and pruned
//! branches simply leave unreachable nodes behind.
mod node;

pub use self::node::*;

use std::collections::HashMap;

use serde_json::json;

use crate::basic::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    pub loc: SourceLocation,
    pub parent: Option<NodeId>,
    /// The production that reduced this node, when a handler recorded it.
    pub prod_id: Option<crate::basic::Ident>,
}

/// The session's node arena.
///
/// Append-only while parsing; the processor may rewrite node kinds in
/// place. Nodes are never physically removed — detached subtrees just
/// become unreachable.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<NodeData>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node and adopt its children.
    pub fn add(&mut self, kind: NodeKind, loc: SourceLocation) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let children = kind.children();
        self.nodes.push(NodeData {
            kind,
            loc,
            parent: None,
            prod_id: None,
        });
        for child in children {
            self.nodes[child.0 as usize].parent = Some(id);
        }
        id
    }

    pub fn get(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0 as usize]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0 as usize].kind
    }

    pub fn loc(&self, id: NodeId) -> SourceLocation {
        self.nodes[id.0 as usize].loc
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0 as usize].parent
    }

    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        self.nodes[id.0 as usize].parent = parent;
    }

    pub fn set_prod_id(&mut self, id: NodeId, prod: crate::basic::Ident) {
        self.nodes[id.0 as usize].prod_id = Some(prod);
    }

    pub fn set_loc(&mut self, id: NodeId, loc: SourceLocation) {
        self.nodes[id.0 as usize].loc = loc;
    }

    /// Replace a node's kind, re-adopting the new children.
    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        let children = kind.children();
        self.nodes[id.0 as usize].kind = kind;
        for child in children {
            self.nodes[child.0 as usize].parent = Some(id);
        }
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.kind(id).children()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Replace `old` with `new` in `parent`'s child list and detach
    /// `old`. Returns false when `old` is not a child of `parent`.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> bool {
        let mut replaced = false;
        let kind = self.kind(parent).map_children(|child| {
            if child == old {
                replaced = true;
                new
            } else {
                child
            }
        });
        if replaced {
            self.nodes[parent.0 as usize].kind = kind;
            self.nodes[new.0 as usize].parent = Some(parent);
            self.nodes[old.0 as usize].parent = None;
        }
        replaced
    }

    /// Remove `child` from a statement-list parent (`Scope`, `Block`,
    /// `List`, `ExpressionList`). Returns false for other parents.
    pub fn remove_from_parent(&mut self, parent: NodeId, child: NodeId) -> bool {
        let kind = &mut self.nodes[parent.0 as usize].kind;
        let list = match kind {
            NodeKind::Scope { statements } | NodeKind::Block { statements } => statements,
            NodeKind::List { items } | NodeKind::ExpressionList { items } => items,
            _ => return false,
        };
        let Some(index) = list.iter().position(|id| *id == child) else {
            return false;
        };
        list.remove(index);
        self.nodes[child.0 as usize].parent = None;
        true
    }

    /// Append `child` to a statement-list parent.
    pub fn append_to(&mut self, parent: NodeId, child: NodeId) -> bool {
        let kind = &mut self.nodes[parent.0 as usize].kind;
        let list = match kind {
            NodeKind::Scope { statements } | NodeKind::Block { statements } => statements,
            NodeKind::List { items } | NodeKind::ExpressionList { items } => items,
            _ => return false,
        };
        list.push(child);
        self.nodes[child.0 as usize].parent = Some(parent);
        true
    }

    /// Deep-clone the subtree at `root`.
    ///
    /// `substitutions` maps identifier names to replacement subtrees:
    /// every `Identifier` whose name is mapped becomes a fresh clone of
    /// the mapped subtree. This is the primitive macro expansion and
    /// template instantiation are built on.
    pub fn deep_clone(
        &mut self,
        root: NodeId,
        substitutions: &HashMap<String, NodeId>,
    ) -> NodeId {
        if let NodeKind::Identifier { name } = self.kind(root) {
            if let Some(replacement) = substitutions.get(name).copied() {
                // Clone the argument so each occurrence owns its copy.
                return self.deep_clone(replacement, &HashMap::new());
            }
        }
        let old_children = self.children(root);
        let mut mapping = HashMap::new();
        for child in old_children {
            let cloned = self.deep_clone(child, substitutions);
            mapping.insert(child, cloned);
        }
        let data = self.get(root);
        let loc = data.loc;
        let prod_id = data.prod_id;
        let kind = data
            .kind
            .map_children(|child| mapping.get(&child).copied().unwrap_or(child));
        let id = self.add(kind, loc);
        if let Some(prod) = prod_id {
            self.set_prod_id(id, prod);
        }
        id
    }

    /// The merged source range of `root` and all its descendants.
    pub fn enclosing_loc(&self, root: NodeId) -> SourceLocation {
        let mut loc = self.loc(root);
        for child in self.children(root) {
            loc = loc.merged_with(&self.enclosing_loc(child));
        }
        loc
    }

    /// Nested JSON view of a subtree, used by `--dump-ast`.
    pub fn dump(&self, root: NodeId) -> serde_json::Value {
        let data = self.get(root);
        let children: Vec<_> = self.children(root).iter().map(|id| self.dump(*id)).collect();
        let mut value = json!({
            "kind": data.kind.tag(),
            "loc": [data.loc.line, data.loc.column],
        });
        let summary = data.kind.summary();
        if !summary.is_empty() {
            value["name"] = json!(summary);
        }
        if !children.is_empty() {
            value["children"] = json!(children);
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::basic::SourceLocation;

    use super::{Ast, NodeId, NodeKind};

    fn loc(line: u32, column: u32) -> SourceLocation {
        SourceLocation::point(0, line, column)
    }

    fn identifier(ast: &mut Ast, name: &str, at: (u32, u32)) -> NodeId {
        ast.add(
            NodeKind::Identifier {
                name: name.to_owned(),
            },
            loc(at.0, at.1),
        )
    }

    #[test]
    fn test_add_adopts_children() {
        let mut ast = Ast::new();
        let lhs = identifier(&mut ast, "x", (1, 1));
        let rhs = identifier(&mut ast, "y", (1, 5));
        let infix = ast.add(
            NodeKind::InfixOp {
                op: "+".to_owned(),
                lhs,
                rhs,
            },
            loc(1, 3),
        );

        assert_eq!(ast.parent(lhs), Some(infix));
        assert_eq!(ast.parent(rhs), Some(infix));
        assert_eq!(ast.children(infix), vec![lhs, rhs]);
    }

    #[test]
    fn test_replace_child() {
        let mut ast = Ast::new();
        let lhs = identifier(&mut ast, "x", (1, 1));
        let rhs = identifier(&mut ast, "y", (1, 5));
        let infix = ast.add(
            NodeKind::InfixOp {
                op: "+".to_owned(),
                lhs,
                rhs,
            },
            loc(1, 3),
        );
        let replacement = identifier(&mut ast, "z", (1, 5));

        assert!(ast.replace_child(infix, rhs, replacement));
        assert_eq!(ast.children(infix), vec![lhs, replacement]);
        assert_eq!(ast.parent(replacement), Some(infix));
        assert_eq!(ast.parent(rhs), None);
    }

    #[test]
    fn test_deep_clone_substitutes_parameters() {
        let mut ast = Ast::new();
        // body: T + 1
        let param = identifier(&mut ast, "T", (1, 1));
        let one = ast.add(
            NodeKind::IntegerLiteral {
                value: 1,
                width: 64,
                signed: true,
            },
            loc(1, 5),
        );
        let body = ast.add(
            NodeKind::InfixOp {
                op: "+".to_owned(),
                lhs: param,
                rhs: one,
            },
            loc(1, 3),
        );
        let argument = identifier(&mut ast, "value", (9, 1));

        let mut substitutions = HashMap::new();
        substitutions.insert("T".to_owned(), argument);
        let clone = ast.deep_clone(body, &substitutions);

        assert_ne!(clone, body);
        let children = ast.children(clone);
        assert!(matches!(
            ast.kind(children[0]),
            NodeKind::Identifier { name } if name == "value"
        ));
        // The argument was cloned, not linked.
        assert_ne!(children[0], argument);
        // The original body is untouched.
        assert!(matches!(
            ast.kind(ast.children(body)[0]),
            NodeKind::Identifier { name } if name == "T"
        ));
    }

    #[test]
    fn test_enclosing_loc_covers_children() {
        let mut ast = Ast::new();
        let lhs = identifier(&mut ast, "x", (1, 1));
        let rhs = identifier(&mut ast, "y", (2, 7));
        let infix = ast.add(
            NodeKind::InfixOp {
                op: "+".to_owned(),
                lhs,
                rhs,
            },
            loc(1, 3),
        );

        let enclosing = ast.enclosing_loc(infix);
        assert!(enclosing.encloses(&ast.loc(lhs)));
        assert!(enclosing.encloses(&ast.loc(rhs)));
    }

    #[test]
    fn test_remove_from_scope() {
        let mut ast = Ast::new();
        let a = identifier(&mut ast, "a", (1, 1));
        let b = identifier(&mut ast, "b", (2, 1));
        let scope = ast.add(
            NodeKind::Scope {
                statements: vec![a, b],
            },
            loc(1, 1),
        );

        assert!(ast.remove_from_parent(scope, a));
        assert_eq!(ast.children(scope), vec![b]);
        assert_eq!(ast.parent(a), None);
    }
}
