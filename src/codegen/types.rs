use crate::ast::{Ast, NodeId, NodeKind};
use crate::seeker;

/// The generator's view of a type, independent of the target back end.
/// Int and float types are keyed by bit width; pointers, references and
/// arrays are structural; user types are identified by their AST node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKey {
    Void,
    Bool,
    Int { bits: u8, signed: bool },
    Float { bits: u8 },
    /// A string constant; lowered to a character pointer.
    Str,
    Ptr(Box<TypeKey>),
    Ref(Box<TypeKey>),
    Array { elem: Box<TypeKey>, len: u64 },
    /// The defining [NodeKind::UserType] node.
    Struct(NodeId),
}

impl TypeKey {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeKey::Int { .. } | TypeKey::Float { .. } | TypeKey::Bool
        )
    }

    /// A canonical rendering used for template cache keys and
    /// diagnostics.
    pub fn canonical(&self, ast: &Ast) -> String {
        match self {
            TypeKey::Void => "Void".to_owned(),
            TypeKey::Bool => "Bool".to_owned(),
            TypeKey::Int { bits, signed } => {
                format!("{}{bits}", if *signed { "Int" } else { "Word" })
            }
            TypeKey::Float { bits } => format!("Float{bits}"),
            TypeKey::Str => "Str".to_owned(),
            TypeKey::Ptr(inner) => format!("ptr[{}]", inner.canonical(ast)),
            TypeKey::Ref(inner) => format!("ref[{}]", inner.canonical(ast)),
            TypeKey::Array { elem, len } => format!("array[{},{len}]", elem.canonical(ast)),
            TypeKey::Struct(node) => match find_type_name(ast, *node) {
                Some(name) => format!("{name}#{}", node.0),
                None => format!("type#{}", node.0),
            },
        }
    }

    /// The conversion cost from `self` to `wanted`, per the callee
    /// match model: exact 0, promotion 1, implicit cast 2, no match
    /// `None`.
    pub fn cost_to(&self, wanted: &TypeKey) -> Option<u32> {
        if self == wanted {
            return Some(0);
        }
        // References bind transparently to their content type.
        if let TypeKey::Ref(inner) = wanted {
            return self.cost_to(inner).map(|cost| cost.min(1));
        }
        if let TypeKey::Ref(inner) = self {
            return inner.cost_to(wanted);
        }
        match (self, wanted) {
            // Promotions: widening, bool to int, int to float.
            (TypeKey::Int { bits: from, .. }, TypeKey::Int { bits: to, .. }) if from <= to => {
                Some(1)
            }
            (TypeKey::Bool, TypeKey::Int { .. }) => Some(1),
            (TypeKey::Int { .. }, TypeKey::Float { .. }) => Some(1),
            (TypeKey::Float { bits: from }, TypeKey::Float { bits: to }) if from <= to => Some(1),
            // Implicit casts: narrowing and float to int.
            (TypeKey::Int { .. }, TypeKey::Int { .. }) => Some(2),
            (TypeKey::Float { .. }, TypeKey::Int { .. }) => Some(2),
            (TypeKey::Float { bits: _ }, TypeKey::Float { .. }) => Some(2),
            (TypeKey::Int { .. }, TypeKey::Bool) | (TypeKey::Float { .. }, TypeKey::Bool) => {
                Some(2)
            }
            (TypeKey::Str, TypeKey::Ptr(inner)) if **inner == (TypeKey::Int { bits: 8, signed: false }) => {
                Some(1)
            }
            (TypeKey::Ptr(_), TypeKey::Ptr(inner)) if **inner == TypeKey::Void => Some(1),
            _ => None,
        }
    }

    /// Structural size in bytes, used by `size(...)` expressions.
    pub fn byte_size(&self, ast: &Ast, sizer: &impl Fn(NodeId) -> u64) -> u64 {
        match self {
            TypeKey::Void => 0,
            TypeKey::Bool => 1,
            TypeKey::Int { bits, .. } => (*bits as u64).div_ceil(8),
            TypeKey::Float { bits } => (*bits as u64).div_ceil(8),
            TypeKey::Str | TypeKey::Ptr(_) | TypeKey::Ref(_) => 8,
            TypeKey::Array { elem, len } => elem.byte_size(ast, sizer) * len,
            TypeKey::Struct(node) => sizer(*node),
        }
    }
}

/// The name of the definition wrapping a user type, if any.
pub fn find_type_name(ast: &Ast, node: NodeId) -> Option<String> {
    let parent = ast.parent(node)?;
    match ast.kind(parent) {
        NodeKind::Definition { name, .. } => Some(name.clone()),
        _ => None,
    }
}

/// Resolve a built-in type name to its key.
pub fn builtin_type(name: &str) -> Option<TypeKey> {
    Some(match name {
        "Void" => TypeKey::Void,
        "Bool" => TypeKey::Bool,
        "Int" | "Int64" => TypeKey::Int { bits: 64, signed: true },
        "Int8" => TypeKey::Int { bits: 8, signed: true },
        "Int16" => TypeKey::Int { bits: 16, signed: true },
        "Int32" => TypeKey::Int { bits: 32, signed: true },
        "Word" | "Word64" => TypeKey::Int { bits: 64, signed: false },
        "Word8" => TypeKey::Int { bits: 8, signed: false },
        "Word16" => TypeKey::Int { bits: 16, signed: false },
        "Word32" => TypeKey::Int { bits: 32, signed: false },
        "Float" | "Float64" => TypeKey::Float { bits: 64 },
        "Float32" => TypeKey::Float { bits: 32 },
        "Char" => TypeKey::Int { bits: 32, signed: false },
        "Str" => TypeKey::Str,
        _ => return None,
    })
}

/// The member definitions of a user type's body, in declaration order.
pub fn struct_members(ast: &Ast, user_type: NodeId) -> Vec<(String, NodeId)> {
    let NodeKind::UserType { body } = ast.kind(user_type) else {
        return vec![];
    };
    let statements = match ast.kind(*body) {
        NodeKind::Scope { statements } | NodeKind::Block { statements } => statements.clone(),
        _ => return vec![],
    };
    statements
        .into_iter()
        .filter_map(|statement| match ast.kind(statement) {
            NodeKind::Definition { name, target, .. } => {
                // Member functions are not data fields.
                if matches!(ast.kind(*target), NodeKind::Function { .. }) {
                    None
                } else {
                    Some((name.clone(), *target))
                }
            }
            _ => None,
        })
        .collect()
}

/// Find a member function of a user type by name.
pub fn find_method(ast: &Ast, user_type: NodeId, name: &str) -> Option<NodeId> {
    let NodeKind::UserType { body } = ast.kind(user_type) else {
        return None;
    };
    let statements = match ast.kind(*body) {
        NodeKind::Scope { statements } | NodeKind::Block { statements } => statements.clone(),
        _ => return None,
    };
    statements.into_iter().find(|statement| {
        matches!(
            ast.kind(*statement),
            NodeKind::Definition { name: def_name, target, .. }
                if def_name == name && matches!(ast.kind(*target), NodeKind::Function { .. })
        )
    })
}

/// The mangled, globally unique symbol name of a definition, derived
/// from its path of enclosing named definitions.
pub fn mangled_name(ast: &Ast, def_node: NodeId) -> String {
    let mut parts = vec![];
    if let NodeKind::Definition { name, .. } = ast.kind(def_node) {
        parts.push(name.clone());
    }
    let mut current = ast.parent(def_node);
    while let Some(node) = current {
        if let NodeKind::Definition { name, .. } = ast.kind(node) {
            parts.push(name.clone());
        }
        current = ast.parent(node);
    }
    parts.reverse();
    parts.join(".")
}

/// `seeker::definition_target` re-exported for generator call sites.
pub use seeker::definition_target;
