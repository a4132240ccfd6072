use crate::basic::Ident;

use super::NodeId;

/// Which bracket pair a parameter pass was written with. Round brackets
/// are calls; square brackets select template parameters or elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Bracket {
    Round,
    Square,
}

/// The closed sum of AST node shapes.
///
/// Children are arena ids owned by their parent in the syntactic tree;
/// cross-tree links (resolved types, template instantiations) are weak
/// ids validated through the arena.
#[derive(Debug, Clone, serde::Serialize)]
pub enum NodeKind {
    Identifier { name: String },
    IntegerLiteral { value: i64, width: u8, signed: bool },
    FloatLiteral { value: f64, width: u8 },
    StringLiteral { value: String },
    CharLiteral { value: char },
    List { items: Vec<NodeId> },
    Map { entries: Vec<(String, NodeId)> },
    ExpressionList { items: Vec<NodeId> },
    InfixOp { op: String, lhs: NodeId, rhs: NodeId },
    PrefixOp { op: String, operand: NodeId },
    PostfixOp { op: String, operand: NodeId },
    OutfixOp { open: String, close: String, body: NodeId },
    ParamPass { callee: NodeId, args: Vec<NodeId>, bracket: Bracket },
    LinkOp { lhs: NodeId, rhs: NodeId },
    Bridge { name: String, target: NodeId },
    Alias { name: String, target: NodeId },
    Definition { name: String, target: NodeId, modifiers: Vec<NodeId> },
    Module { name: String, body: NodeId },
    Scope { statements: Vec<NodeId> },
    Function { ty: NodeId, body: Option<NodeId> },
    FunctionType { args: Vec<NodeId>, ret: Option<NodeId>, modifiers: Vec<NodeId> },
    ArgPack { name: String, min: u32, max: Option<u32>, ty: Option<NodeId> },
    Block { statements: Vec<NodeId> },
    If { cond: NodeId, body: NodeId, else_body: Option<NodeId> },
    While { cond: NodeId, body: NodeId },
    For { init: Option<NodeId>, cond: Option<NodeId>, step: Option<NodeId>, body: NodeId },
    Break,
    Continue,
    Return { value: Option<NodeId> },
    Use { target: NodeId },
    Macro { params: Vec<String>, body: NodeId },
    Template { params: Vec<String>, body: NodeId },
    IntegerType { bits: u8, signed: bool },
    FloatType { bits: u8 },
    PointerType { content: NodeId },
    ReferenceType { content: NodeId },
    ArrayType { content: NodeId, size: NodeId },
    UserType { body: NodeId },
    VoidType,
    CastOp { value: NodeId, target_type: NodeId },
    PointerOp { operand: NodeId },
    ContentOp { operand: NodeId },
    SizeOp { operand: NodeId },
    InitOp { operand: NodeId, args: Vec<NodeId> },
    TerminateOp { operand: NodeId },
    NextArgOp,
    NoDerefOp { operand: NodeId },
    UseInOp { operand: NodeId, body: NodeId },
    CalleePointer { target: NodeId },
    Preprocess { body: NodeId },
    Eval { expr: NodeId },
    /// A raw matched token kept by the generic handler.
    TokenData { kind: Ident, text: String },
}

impl NodeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Identifier { .. } => "Identifier",
            NodeKind::IntegerLiteral { .. } => "IntegerLiteral",
            NodeKind::FloatLiteral { .. } => "FloatLiteral",
            NodeKind::StringLiteral { .. } => "StringLiteral",
            NodeKind::CharLiteral { .. } => "CharLiteral",
            NodeKind::List { .. } => "List",
            NodeKind::Map { .. } => "Map",
            NodeKind::ExpressionList { .. } => "ExpressionList",
            NodeKind::InfixOp { .. } => "InfixOp",
            NodeKind::PrefixOp { .. } => "PrefixOp",
            NodeKind::PostfixOp { .. } => "PostfixOp",
            NodeKind::OutfixOp { .. } => "OutfixOp",
            NodeKind::ParamPass { .. } => "ParamPass",
            NodeKind::LinkOp { .. } => "LinkOp",
            NodeKind::Bridge { .. } => "Bridge",
            NodeKind::Alias { .. } => "Alias",
            NodeKind::Definition { .. } => "Definition",
            NodeKind::Module { .. } => "Module",
            NodeKind::Scope { .. } => "Scope",
            NodeKind::Function { .. } => "Function",
            NodeKind::FunctionType { .. } => "FunctionType",
            NodeKind::ArgPack { .. } => "ArgPack",
            NodeKind::Block { .. } => "Block",
            NodeKind::If { .. } => "If",
            NodeKind::While { .. } => "While",
            NodeKind::For { .. } => "For",
            NodeKind::Break => "Break",
            NodeKind::Continue => "Continue",
            NodeKind::Return { .. } => "Return",
            NodeKind::Use { .. } => "Use",
            NodeKind::Macro { .. } => "Macro",
            NodeKind::Template { .. } => "Template",
            NodeKind::IntegerType { .. } => "IntegerType",
            NodeKind::FloatType { .. } => "FloatType",
            NodeKind::PointerType { .. } => "PointerType",
            NodeKind::ReferenceType { .. } => "ReferenceType",
            NodeKind::ArrayType { .. } => "ArrayType",
            NodeKind::UserType { .. } => "UserType",
            NodeKind::VoidType => "VoidType",
            NodeKind::CastOp { .. } => "CastOp",
            NodeKind::PointerOp { .. } => "PointerOp",
            NodeKind::ContentOp { .. } => "ContentOp",
            NodeKind::SizeOp { .. } => "SizeOp",
            NodeKind::InitOp { .. } => "InitOp",
            NodeKind::TerminateOp { .. } => "TerminateOp",
            NodeKind::NextArgOp => "NextArgOp",
            NodeKind::NoDerefOp { .. } => "NoDerefOp",
            NodeKind::UseInOp { .. } => "UseInOp",
            NodeKind::CalleePointer { .. } => "CalleePointer",
            NodeKind::Preprocess { .. } => "Preprocess",
            NodeKind::Eval { .. } => "Eval",
            NodeKind::TokenData { .. } => "TokenData",
        }
    }

    /// The children of this node in syntactic order.
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = vec![];
        self.visit_children(|id| out.push(id));
        out
    }

    fn visit_children(&self, mut visit: impl FnMut(NodeId)) {
        match self {
            NodeKind::Identifier { .. }
            | NodeKind::IntegerLiteral { .. }
            | NodeKind::FloatLiteral { .. }
            | NodeKind::StringLiteral { .. }
            | NodeKind::CharLiteral { .. }
            | NodeKind::IntegerType { .. }
            | NodeKind::FloatType { .. }
            | NodeKind::VoidType
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::NextArgOp
            | NodeKind::TokenData { .. } => {}
            NodeKind::List { items }
            | NodeKind::ExpressionList { items } => items.iter().copied().for_each(visit),
            NodeKind::Map { entries } => entries.iter().for_each(|(_, id)| visit(*id)),
            NodeKind::InfixOp { lhs, rhs, .. } | NodeKind::LinkOp { lhs, rhs } => {
                visit(*lhs);
                visit(*rhs);
            }
            NodeKind::PrefixOp { operand, .. }
            | NodeKind::PostfixOp { operand, .. }
            | NodeKind::PointerOp { operand }
            | NodeKind::ContentOp { operand }
            | NodeKind::SizeOp { operand }
            | NodeKind::TerminateOp { operand }
            | NodeKind::NoDerefOp { operand } => visit(*operand),
            NodeKind::OutfixOp { body, .. } => visit(*body),
            NodeKind::ParamPass { callee, args, .. } => {
                visit(*callee);
                args.iter().copied().for_each(visit);
            }
            NodeKind::Bridge { target, .. }
            | NodeKind::Alias { target, .. }
            | NodeKind::Use { target }
            | NodeKind::CalleePointer { target } => visit(*target),
            NodeKind::Definition { target, modifiers, .. } => {
                visit(*target);
                modifiers.iter().copied().for_each(visit);
            }
            NodeKind::Module { body, .. }
            | NodeKind::Macro { body, .. }
            | NodeKind::Template { body, .. }
            | NodeKind::UserType { body }
            | NodeKind::Preprocess { body } => visit(*body),
            NodeKind::Scope { statements } | NodeKind::Block { statements } => {
                statements.iter().copied().for_each(visit)
            }
            NodeKind::Function { ty, body } => {
                visit(*ty);
                if let Some(body) = body {
                    visit(*body);
                }
            }
            NodeKind::FunctionType { args, ret, modifiers } => {
                args.iter().copied().for_each(&mut visit);
                if let Some(ret) = ret {
                    visit(*ret);
                }
                modifiers.iter().copied().for_each(&mut visit);
            }
            NodeKind::ArgPack { ty, .. } => {
                if let Some(ty) = ty {
                    visit(*ty);
                }
            }
            NodeKind::If { cond, body, else_body } => {
                visit(*cond);
                visit(*body);
                if let Some(else_body) = else_body {
                    visit(*else_body);
                }
            }
            NodeKind::While { cond, body } => {
                visit(*cond);
                visit(*body);
            }
            NodeKind::For { init, cond, step, body } => {
                for part in [init, cond, step].into_iter().flatten() {
                    visit(*part);
                }
                visit(*body);
            }
            NodeKind::Return { value } => {
                if let Some(value) = value {
                    visit(*value);
                }
            }
            NodeKind::PointerType { content } | NodeKind::ReferenceType { content } => {
                visit(*content)
            }
            NodeKind::ArrayType { content, size } => {
                visit(*content);
                visit(*size);
            }
            NodeKind::CastOp { value, target_type } => {
                visit(*value);
                visit(*target_type);
            }
            NodeKind::InitOp { operand, args } => {
                visit(*operand);
                args.iter().copied().for_each(visit);
            }
            NodeKind::UseInOp { operand, body } => {
                visit(*operand);
                visit(*body);
            }
            NodeKind::Eval { expr } => visit(*expr),
        }
    }

    /// Rewrite every child id through `map`, preserving the shape.
    pub fn map_children(&self, mut map: impl FnMut(NodeId) -> NodeId) -> NodeKind {
        let mut kind = self.clone();
        kind.map_children_in_place(&mut map);
        kind
    }

    fn map_children_in_place(&mut self, map: &mut impl FnMut(NodeId) -> NodeId) {
        match self {
            NodeKind::Identifier { .. }
            | NodeKind::IntegerLiteral { .. }
            | NodeKind::FloatLiteral { .. }
            | NodeKind::StringLiteral { .. }
            | NodeKind::CharLiteral { .. }
            | NodeKind::IntegerType { .. }
            | NodeKind::FloatType { .. }
            | NodeKind::VoidType
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::NextArgOp
            | NodeKind::TokenData { .. } => {}
            NodeKind::List { items } | NodeKind::ExpressionList { items } => {
                for item in items {
                    *item = map(*item);
                }
            }
            NodeKind::Map { entries } => {
                for (_, id) in entries {
                    *id = map(*id);
                }
            }
            NodeKind::InfixOp { lhs, rhs, .. } | NodeKind::LinkOp { lhs, rhs } => {
                *lhs = map(*lhs);
                *rhs = map(*rhs);
            }
            NodeKind::PrefixOp { operand, .. }
            | NodeKind::PostfixOp { operand, .. }
            | NodeKind::PointerOp { operand }
            | NodeKind::ContentOp { operand }
            | NodeKind::SizeOp { operand }
            | NodeKind::TerminateOp { operand }
            | NodeKind::NoDerefOp { operand } => *operand = map(*operand),
            NodeKind::OutfixOp { body, .. } => *body = map(*body),
            NodeKind::ParamPass { callee, args, .. } => {
                *callee = map(*callee);
                for arg in args {
                    *arg = map(*arg);
                }
            }
            NodeKind::Bridge { target, .. }
            | NodeKind::Alias { target, .. }
            | NodeKind::Use { target }
            | NodeKind::CalleePointer { target } => *target = map(*target),
            NodeKind::Definition { target, modifiers, .. } => {
                *target = map(*target);
                for modifier in modifiers {
                    *modifier = map(*modifier);
                }
            }
            NodeKind::Module { body, .. }
            | NodeKind::Macro { body, .. }
            | NodeKind::Template { body, .. }
            | NodeKind::UserType { body }
            | NodeKind::Preprocess { body } => *body = map(*body),
            NodeKind::Scope { statements } | NodeKind::Block { statements } => {
                for statement in statements {
                    *statement = map(*statement);
                }
            }
            NodeKind::Function { ty, body } => {
                *ty = map(*ty);
                if let Some(body) = body {
                    *body = map(*body);
                }
            }
            NodeKind::FunctionType { args, ret, modifiers } => {
                for arg in args {
                    *arg = map(*arg);
                }
                if let Some(ret) = ret {
                    *ret = map(*ret);
                }
                for modifier in modifiers {
                    *modifier = map(*modifier);
                }
            }
            NodeKind::ArgPack { ty, .. } => {
                if let Some(ty) = ty {
                    *ty = map(*ty);
                }
            }
            NodeKind::If { cond, body, else_body } => {
                *cond = map(*cond);
                *body = map(*body);
                if let Some(else_body) = else_body {
                    *else_body = map(*else_body);
                }
            }
            NodeKind::While { cond, body } => {
                *cond = map(*cond);
                *body = map(*body);
            }
            NodeKind::For { init, cond, step, body } => {
                for part in [init, cond, step].into_iter().flatten() {
                    *part = map(*part);
                }
                *body = map(*body);
            }
            NodeKind::Return { value } => {
                if let Some(value) = value {
                    *value = map(*value);
                }
            }
            NodeKind::PointerType { content } | NodeKind::ReferenceType { content } => {
                *content = map(*content)
            }
            NodeKind::ArrayType { content, size } => {
                *content = map(*content);
                *size = map(*size);
            }
            NodeKind::CastOp { value, target_type } => {
                *value = map(*value);
                *target_type = map(*target_type);
            }
            NodeKind::InitOp { operand, args } => {
                *operand = map(*operand);
                for arg in args {
                    *arg = map(*arg);
                }
            }
            NodeKind::UseInOp { operand, body } => {
                *operand = map(*operand);
                *body = map(*body);
            }
            NodeKind::Eval { expr } => *expr = map(*expr),
        }
    }

    /// A short human-readable description used by the AST dump.
    pub fn summary(&self) -> String {
        match self {
            NodeKind::Identifier { name } => name.clone(),
            NodeKind::IntegerLiteral { value, .. } => value.to_string(),
            NodeKind::FloatLiteral { value, .. } => value.to_string(),
            NodeKind::StringLiteral { value } => format!("{value:?}"),
            NodeKind::CharLiteral { value } => format!("{value:?}"),
            NodeKind::InfixOp { op, .. }
            | NodeKind::PrefixOp { op, .. }
            | NodeKind::PostfixOp { op, .. } => op.clone(),
            NodeKind::OutfixOp { open, close, .. } => format!("{open}{close}"),
            NodeKind::Definition { name, .. }
            | NodeKind::Module { name, .. }
            | NodeKind::Alias { name, .. }
            | NodeKind::Bridge { name, .. } => name.clone(),
            NodeKind::IntegerType { bits, signed } => {
                format!("{}{bits}", if *signed { "Int" } else { "Word" })
            }
            NodeKind::FloatType { bits } => format!("Float{bits}"),
            NodeKind::TokenData { text, .. } => text.clone(),
            _ => String::new(),
        }
    }
}
