use log::trace;

use crate::ast::{Bracket, NodeId, NodeKind};
use crate::basic::SourceLocation;
use crate::notices::NoticeCode;
use crate::seeker;
use crate::target::{BinOp, CastKind, CmpOp, ConstValue, TypeId, Value};

use super::{
    builtin_type, definition_target, struct_members, ExprResult, GenFail, Generator, TypeKey,
};

/// The result of generating one expression: its language-level type,
/// its target type, the produced value, and whether that value is an
/// address (l-value) or a plain value.
#[derive(Debug, Clone)]
pub struct ExprComp {
    pub key: TypeKey,
    pub ty: TypeId,
    pub value: Value,
    pub lvalue: bool,
}

impl<'a> Generator<'a> {
    /// Lower a [TypeKey] to its target type, generating user-type
    /// structs (and their methods) on first use.
    pub(crate) fn target_type(&mut self, key: &TypeKey) -> Result<TypeId, GenFail> {
        Ok(match key {
            TypeKey::Void => self.target.make_void_type(),
            TypeKey::Bool => self.target.make_int_type(1, false),
            TypeKey::Int { bits, signed } => self.target.make_int_type(*bits, *signed),
            TypeKey::Float { bits } => self.target.make_float_type(*bits),
            TypeKey::Str => {
                let ch = self.target.make_int_type(8, false);
                self.target.make_pointer(ch)
            }
            TypeKey::Ptr(inner) | TypeKey::Ref(inner) => {
                let inner = self.target_type(inner)?;
                self.target.make_pointer(inner)
            }
            TypeKey::Array { elem, len } => {
                let elem = self.target_type(elem)?;
                self.target.make_array(elem, *len)
            }
            TypeKey::Struct(node) => self.struct_type(*node)?,
        })
    }

    /// Generate the target struct for a user type exactly once per
    /// defining node; the member functions are declared alongside.
    fn struct_type(&mut self, user_type: NodeId) -> Result<TypeId, GenFail> {
        if let Some(ty) = self.struct_cache_get(user_type) {
            return Ok(ty);
        }
        // The node id keeps distinct instantiations of one template
        // from sharing a struct.
        let name = format!(
            "{}#{}",
            super::find_type_name(self.ast, user_type)
                .unwrap_or_else(|| "anon".to_owned()),
            user_type.0
        );
        let members = struct_members(self.ast, user_type);
        let mut field_tys = vec![];
        for (_, type_expr) in &members {
            let key = self.resolve_type(*type_expr)?;
            field_tys.push(self.target_type(&key)?);
        }
        let ty = self.target.make_struct(&name, &field_tys);
        self.struct_cache_put(user_type, ty);

        let NodeKind::UserType { body } = self.ast.kind(user_type).clone() else {
            return Ok(ty);
        };
        let _ = self.declare_user_type_methods(user_type, body, &format!("{name}."));
        Ok(ty)
    }

    /// Field index and type of a struct member.
    pub(crate) fn struct_field(
        &mut self,
        user_type: NodeId,
        name: &str,
        loc: SourceLocation,
    ) -> Result<(u32, TypeKey), GenFail> {
        let members = struct_members(self.ast, user_type);
        for (index, (member, type_expr)) in members.iter().enumerate() {
            if member == name {
                let key = self.resolve_type(*type_expr)?;
                return Ok((index as u32, key));
            }
        }
        Err(self.fail(
            NoticeCode::NameNotFound,
            loc,
            format!("no member `{name}` in this type"),
        ))
    }

    /// Resolve a type expression, reporting a notice on failure.
    pub(crate) fn resolve_type(&mut self, node: NodeId) -> Result<TypeKey, GenFail> {
        match self.try_resolve_type(node) {
            Some(key) => Ok(key),
            None => {
                let loc = self.ast.loc(node);
                Err(self.fail(NoticeCode::NameNotFound, loc, "unknown type"))
            }
        }
    }

    /// Resolve a type expression quietly: identifiers naming builtin or
    /// user types, pointer/reference/array shapes, and template
    /// instantiations.
    pub(crate) fn try_resolve_type(&mut self, node: NodeId) -> Option<TypeKey> {
        match self.ast.kind(node).clone() {
            NodeKind::Identifier { name } => {
                if let Some(key) = builtin_type(&name) {
                    return Some(key);
                }
                self.named_user_type(node, &name)
            }
            NodeKind::LinkOp { .. } => {
                let candidates = seeker::seek_callee(self.ast, node, node);
                self.user_type_from_candidates(&candidates)
            }
            NodeKind::ParamPass {
                callee,
                args,
                bracket: Bracket::Square,
            } => self.resolve_type_application(node, callee, &args),
            NodeKind::IntegerType { bits, signed } => Some(TypeKey::Int { bits, signed }),
            NodeKind::FloatType { bits } => Some(TypeKey::Float { bits }),
            NodeKind::VoidType => Some(TypeKey::Void),
            NodeKind::PointerType { content } => {
                Some(TypeKey::Ptr(Box::new(self.try_resolve_type(content)?)))
            }
            NodeKind::ReferenceType { content } => {
                Some(TypeKey::Ref(Box::new(self.try_resolve_type(content)?)))
            }
            NodeKind::ArrayType { content, size } => {
                let elem = self.try_resolve_type(content)?;
                let NodeKind::IntegerLiteral { value, .. } = self.ast.kind(size) else {
                    return None;
                };
                Some(TypeKey::Array {
                    elem: Box::new(elem),
                    len: (*value).max(0) as u64,
                })
            }
            NodeKind::UserType { .. } => Some(TypeKey::Struct(node)),
            // Template instantiations of whole type definitions arrive
            // as cloned definitions.
            NodeKind::Definition { target, .. } => self.try_resolve_type(target),
            _ => None,
        }
    }

    fn named_user_type(&mut self, from: NodeId, name: &str) -> Option<TypeKey> {
        let candidates = seeker::seek(self.ast, from, name);
        self.user_type_from_candidates(&candidates)
    }

    fn user_type_from_candidates(&mut self, candidates: &[NodeId]) -> Option<TypeKey> {
        for candidate in candidates {
            let target = definition_target(self.ast, *candidate);
            match self.ast.kind(target) {
                NodeKind::UserType { .. } => return Some(TypeKey::Struct(target)),
                NodeKind::IntegerType { .. }
                | NodeKind::FloatType { .. }
                | NodeKind::VoidType
                | NodeKind::PointerType { .. }
                | NodeKind::ReferenceType { .. }
                | NodeKind::ArrayType { .. } => return self.try_resolve_type(target),
                _ => continue,
            }
        }
        None
    }

    /// `ptr[T]`, `ref[T]`, `array[T, n]`, and template applications.
    fn resolve_type_application(
        &mut self,
        node: NodeId,
        callee: NodeId,
        args: &[NodeId],
    ) -> Option<TypeKey> {
        if let NodeKind::Identifier { name } = self.ast.kind(callee).clone() {
            match (name.to_lowercase().as_str(), args) {
                ("ptr", [content]) => {
                    return Some(TypeKey::Ptr(Box::new(self.try_resolve_type(*content)?)));
                }
                ("ref", [content]) => {
                    return Some(TypeKey::Ref(Box::new(self.try_resolve_type(*content)?)));
                }
                ("array", [content, len]) => {
                    let elem = self.try_resolve_type(*content)?;
                    let NodeKind::IntegerLiteral { value, .. } = self.ast.kind(*len) else {
                        return None;
                    };
                    return Some(TypeKey::Array {
                        elem: Box::new(elem),
                        len: (*value).max(0) as u64,
                    });
                }
                _ => {}
            }
        }

        // A user template: instantiate, keyed by the canonical tuple.
        let candidates = seeker::seek_callee(self.ast, node, callee);
        for candidate in candidates {
            let target = definition_target(self.ast, candidate);
            if !matches!(self.ast.kind(target), NodeKind::Template { .. }) {
                continue;
            }
            let mut canonical = vec![];
            for arg in args {
                canonical.push(match self.try_resolve_type(*arg) {
                    Some(key) => key.canonical(self.ast),
                    None => match self.ast.kind(*arg) {
                        NodeKind::IntegerLiteral { value, .. } => value.to_string(),
                        _ => return None,
                    },
                });
            }
            match self
                .templates
                .instantiate(self.ast, target, &canonical, args)
            {
                Ok(instance) => return self.try_resolve_type(instance),
                Err(message) => {
                    let loc = self.ast.loc(node);
                    self.notice(NoticeCode::InfiniteExpansion, loc, message);
                    return None;
                }
            }
        }
        None
    }

    /// A constant initializer for a global, when the expression is a
    /// plain literal.
    pub(crate) fn const_initializer(
        &mut self,
        expr: NodeId,
    ) -> Result<Option<(TypeKey, ConstValue)>, GenFail> {
        Ok(match self.ast.kind(expr).clone() {
            NodeKind::IntegerLiteral { value, width, signed } => {
                let key = TypeKey::Int { bits: width, signed };
                let ty = self.target_type(&key)?;
                Some((key, ConstValue::Int { value, ty }))
            }
            NodeKind::FloatLiteral { value, width } => {
                let key = TypeKey::Float { bits: width };
                let ty = self.target_type(&key)?;
                Some((key, ConstValue::Float { value, ty }))
            }
            NodeKind::StringLiteral { value } => Some((TypeKey::Str, ConstValue::Str(value))),
            _ => None,
        })
    }

    /// Load an l-value; pass an r-value through.
    pub(crate) fn materialize(&mut self, comp: ExprComp) -> Value {
        if comp.lvalue {
            self.target.emit_load(comp.ty, comp.value)
        } else {
            comp.value
        }
    }

    /// Materialize and convert to `wanted`, inserting promotions and
    /// implicit casts; a reference parameter binds the address instead.
    pub(crate) fn convert(
        &mut self,
        comp: ExprComp,
        wanted: &TypeKey,
        loc: SourceLocation,
    ) -> Result<Value, GenFail> {
        if let TypeKey::Ref(inner) = wanted {
            if comp.lvalue && comp.key == **inner {
                return Ok(comp.value);
            }
        }
        if comp.key == *wanted {
            return Ok(self.materialize(comp));
        }
        let Some(_) = comp.key.cost_to(wanted) else {
            let from = comp.key.canonical(self.ast);
            let to = wanted.canonical(self.ast);
            return Err(self.fail(
                NoticeCode::TypeMismatch,
                loc,
                format!("cannot convert `{from}` to `{to}`"),
            ));
        };
        let from_key = comp.key.clone();
        let value = self.materialize(comp);
        let to_ty = self.target_type(wanted)?;
        Ok(match (&from_key, wanted) {
            (TypeKey::Int { .. } | TypeKey::Bool, TypeKey::Int { .. } | TypeKey::Bool) => {
                self.target.emit_cast(CastKind::IntToInt, to_ty, value)
            }
            (TypeKey::Int { .. } | TypeKey::Bool, TypeKey::Float { .. }) => {
                self.target.emit_cast(CastKind::IntToFloat, to_ty, value)
            }
            (TypeKey::Float { .. }, TypeKey::Int { .. } | TypeKey::Bool) => {
                self.target.emit_cast(CastKind::FloatToInt, to_ty, value)
            }
            (TypeKey::Float { .. }, TypeKey::Float { .. }) => {
                self.target.emit_cast(CastKind::FloatToFloat, to_ty, value)
            }
            _ => value,
        })
    }

    // ---- expression generation ----

    pub(crate) fn gen_expr(&mut self, node: NodeId) -> ExprResult {
        let loc = self.ast.loc(node);
        match self.ast.kind(node).clone() {
            NodeKind::IntegerLiteral { value, width, signed } => {
                let key = TypeKey::Int { bits: width, signed };
                let ty = self.target_type(&key)?;
                let value = self.target.const_int(ty, value);
                Ok(ExprComp { key, ty, value, lvalue: false })
            }
            NodeKind::FloatLiteral { value, width } => {
                let key = TypeKey::Float { bits: width };
                let ty = self.target_type(&key)?;
                let value = self.target.const_float(ty, value);
                Ok(ExprComp { key, ty, value, lvalue: false })
            }
            NodeKind::CharLiteral { value } => {
                let key = TypeKey::Int { bits: 32, signed: false };
                let ty = self.target_type(&key)?;
                let value = self.target.const_int(ty, value as i64);
                Ok(ExprComp { key, ty, value, lvalue: false })
            }
            NodeKind::StringLiteral { value } => {
                let key = TypeKey::Str;
                let ty = self.target_type(&key)?;
                let value = self.target.const_string(&value);
                Ok(ExprComp { key, ty, value, lvalue: false })
            }
            NodeKind::Identifier { name } => self.gen_identifier(node, &name, loc),
            NodeKind::InfixOp { op, lhs, rhs } => self.gen_infix(node, &op, lhs, rhs, loc),
            NodeKind::PrefixOp { op, operand } => self.gen_prefix(&op, operand, loc),
            NodeKind::PostfixOp { op, operand } => {
                let _ = operand;
                Err(self.fail(
                    NoticeCode::SyntaxError,
                    loc,
                    format!("postfix operator `{op}` has no meaning here"),
                ))
            }
            NodeKind::OutfixOp { body, .. } | NodeKind::Eval { expr: body } => self.gen_expr(body),
            NodeKind::NoDerefOp { operand } => self.gen_expr(operand),
            NodeKind::PointerOp { operand } => {
                let comp = self.gen_expr(operand)?;
                if !comp.lvalue {
                    return Err(self.fail(
                        NoticeCode::TypeMismatch,
                        loc,
                        "cannot take the address of a temporary",
                    ));
                }
                let key = TypeKey::Ptr(Box::new(comp.key.clone()));
                let ty = self.target_type(&key)?;
                Ok(ExprComp { key, ty, value: comp.value, lvalue: false })
            }
            NodeKind::ContentOp { operand } => {
                let comp = self.gen_expr(operand)?;
                let (TypeKey::Ptr(inner) | TypeKey::Ref(inner)) = comp.key.clone() else {
                    return Err(self.fail(
                        NoticeCode::TypeMismatch,
                        loc,
                        "dereference of a non-pointer",
                    ));
                };
                let value = self.materialize(comp);
                let ty = self.target_type(&inner)?;
                Ok(ExprComp { key: *inner, ty, value, lvalue: true })
            }
            NodeKind::CastOp { value, target_type } => {
                let wanted = self.resolve_type(target_type)?;
                let comp = self.gen_expr(value)?;
                if comp.key.cost_to(&wanted).is_none() && comp.key != wanted {
                    let from = comp.key.canonical(self.ast);
                    let to = wanted.canonical(self.ast);
                    return Err(self.fail(
                        NoticeCode::InvalidCast,
                        loc,
                        format!("cannot cast `{from}` to `{to}`"),
                    ));
                }
                let value = self.convert(comp, &wanted, loc)?;
                let ty = self.target_type(&wanted)?;
                Ok(ExprComp { key: wanted, ty, value, lvalue: false })
            }
            NodeKind::SizeOp { operand } => {
                let key = match self.try_resolve_type(operand) {
                    Some(key) => key,
                    None => self.gen_expr(operand)?.key,
                };
                let size = self.byte_size_of(&key);
                let int = TypeKey::Int { bits: 64, signed: true };
                let ty = self.target_type(&int)?;
                let value = self.target.const_int(ty, size as i64);
                Ok(ExprComp { key: int, ty, value, lvalue: false })
            }
            NodeKind::InitOp { operand, args } => self.gen_lifecycle(operand, &args, "construct", loc),
            NodeKind::TerminateOp { operand } => self.gen_lifecycle(operand, &[], "destruct", loc),
            NodeKind::LinkOp { lhs, rhs } => self.gen_member(node, lhs, rhs, loc),
            NodeKind::ParamPass { callee, args, bracket } => {
                self.gen_param_pass(node, callee, &args, bracket, loc)
            }
            NodeKind::ExpressionList { items } => {
                let mut last = None;
                for item in items {
                    last = Some(self.gen_expr(item)?);
                }
                last.ok_or(GenFail)
            }
            NodeKind::NextArgOp => Err(self.fail(
                NoticeCode::SyntaxError,
                loc,
                "`nextArg` is only meaningful inside variadic runtime code",
            )),
            other => {
                trace!("codegen: no expression rule for {}", other.tag());
                Err(self.fail(
                    NoticeCode::SyntaxError,
                    loc,
                    format!("`{}` is not a value", other.tag()),
                ))
            }
        }
    }

    fn gen_identifier(&mut self, node: NodeId, name: &str, loc: SourceLocation) -> ExprResult {
        if let Some(var) = self.lookup_local(name) {
            return Ok(ExprComp {
                key: var.key,
                ty: var.ty,
                value: var.addr,
                lvalue: true,
            });
        }
        let candidates = seeker::seek(self.ast, node, name);
        for candidate in &candidates {
            if let Some(global) = self.global_info(*candidate) {
                return Ok(ExprComp {
                    key: global.key,
                    ty: global.ty,
                    value: Value::Const(ConstValue::Global(global.name)),
                    lvalue: true,
                });
            }
        }
        Err(self.fail(
            NoticeCode::NameNotFound,
            loc,
            format!("name `{name}` not found"),
        ))
    }

    fn gen_infix(
        &mut self,
        node: NodeId,
        op: &str,
        lhs: NodeId,
        rhs: NodeId,
        loc: SourceLocation,
    ) -> ExprResult {
        match op {
            "=" | "+=" | "-=" | "*=" | "/=" => self.gen_assignment(op, lhs, rhs, loc),
            "&&" | "||" => self.gen_short_circuit(op, lhs, rhs),
            _ => {
                let lhs_comp = self.gen_expr(lhs)?;
                // Overloaded operators rewrite to the resolved member
                // function.
                if let TypeKey::Struct(user_type) = lhs_comp.key.clone() {
                    return self.gen_operator_overload(node, user_type, op, lhs_comp, rhs, loc);
                }
                let rhs_comp = self.gen_expr(rhs)?;
                self.gen_arith(op, lhs_comp, rhs_comp, loc)
            }
        }
    }

    fn gen_arith(
        &mut self,
        op: &str,
        lhs: ExprComp,
        rhs: ExprComp,
        loc: SourceLocation,
    ) -> ExprResult {
        if !lhs.key.is_numeric() || !rhs.key.is_numeric() {
            if matches!((op, &lhs.key, &rhs.key), ("==" | "!=", TypeKey::Str, TypeKey::Str)) {
                // String equality is supported by the back end.
                let ty = self.target_type(&TypeKey::Str)?;
                let lhs = self.materialize(lhs);
                let rhs = self.materialize(rhs);
                let cmp_op = if op == "==" { CmpOp::Eq } else { CmpOp::Ne };
                let value = self.target.emit_cmp(cmp_op, ty, lhs, rhs);
                let bool_ty = self.target_type(&TypeKey::Bool)?;
                return Ok(ExprComp {
                    key: TypeKey::Bool,
                    ty: bool_ty,
                    value,
                    lvalue: false,
                });
            }
            let l = lhs.key.canonical(self.ast);
            let r = rhs.key.canonical(self.ast);
            return Err(self.fail(
                NoticeCode::TypeMismatch,
                loc,
                format!("operator `{op}` cannot combine `{l}` and `{r}`"),
            ));
        }

        // Numeric unification: float wins, otherwise 64-bit int.
        let unified = if matches!(lhs.key, TypeKey::Float { .. })
            || matches!(rhs.key, TypeKey::Float { .. })
        {
            TypeKey::Float { bits: 64 }
        } else {
            TypeKey::Int { bits: 64, signed: true }
        };
        let ty = self.target_type(&unified)?;
        let lhs = self.convert(lhs, &unified, loc)?;
        let rhs = self.convert(rhs, &unified, loc)?;

        let comparison = match op {
            "==" => Some(CmpOp::Eq),
            "!=" => Some(CmpOp::Ne),
            "<" => Some(CmpOp::Lt),
            "<=" => Some(CmpOp::Le),
            ">" => Some(CmpOp::Gt),
            ">=" => Some(CmpOp::Ge),
            _ => None,
        };
        if let Some(cmp_op) = comparison {
            let value = self.target.emit_cmp(cmp_op, ty, lhs, rhs);
            let bool_ty = self.target_type(&TypeKey::Bool)?;
            return Ok(ExprComp {
                key: TypeKey::Bool,
                ty: bool_ty,
                value,
                lvalue: false,
            });
        }

        let bin_op = match op {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "%" => BinOp::Rem,
            _ => {
                return Err(self.fail(
                    NoticeCode::SyntaxError,
                    loc,
                    format!("unknown operator `{op}`"),
                ));
            }
        };
        let value = self.target.emit_binary(bin_op, ty, lhs, rhs);
        Ok(ExprComp {
            key: unified,
            ty,
            value,
            lvalue: false,
        })
    }

    fn gen_assignment(
        &mut self,
        op: &str,
        lhs: NodeId,
        rhs: NodeId,
        loc: SourceLocation,
    ) -> ExprResult {
        let lhs_comp = self.gen_expr(lhs)?;
        if !lhs_comp.lvalue {
            return Err(self.fail(
                NoticeCode::TypeMismatch,
                loc,
                "left side of assignment is not assignable",
            ));
        }
        let rhs_comp = self.gen_expr(rhs)?;
        let value = if op == "=" {
            self.convert(rhs_comp, &lhs_comp.key, loc)?
        } else {
            let arith_op = &op[..1];
            let current = self.gen_arith(arith_op, lhs_comp.clone(), rhs_comp, loc)?;
            self.convert(current, &lhs_comp.key, loc)?
        };
        self.target
            .emit_store(lhs_comp.ty, lhs_comp.value.clone(), value);
        Ok(lhs_comp)
    }

    fn gen_short_circuit(&mut self, op: &str, lhs: NodeId, rhs: NodeId) -> ExprResult {
        let func = self.current_func_or_fail()?;
        let bool_key = TypeKey::Bool;
        let bool_ty = self.target_type(&bool_key)?;

        let lhs_comp = self.gen_expr(lhs)?;
        let lhs_value = self.materialize(lhs_comp);
        let entry = self.target.current_block();

        let rhs_block = self.target.prepare_block(func, "sc_rhs");
        let merge_block = self.target.prepare_block(func, "sc_merge");
        if op == "&&" {
            self.target.emit_cond_br(lhs_value, rhs_block, merge_block);
        } else {
            self.target.emit_cond_br(lhs_value, merge_block, rhs_block);
        }

        self.target.set_insertion_block(rhs_block);
        let rhs_comp = self.gen_expr(rhs)?;
        let rhs_value = self.materialize(rhs_comp);
        let rhs_end = self.target.current_block();
        self.target.emit_br(merge_block);

        self.target.set_insertion_block(merge_block);
        let short_value = self
            .target
            .const_int(bool_ty, if op == "&&" { 0 } else { 1 });
        let value = self.target.emit_phi(
            bool_ty,
            vec![(entry, short_value), (rhs_end, rhs_value)],
        );
        Ok(ExprComp {
            key: bool_key,
            ty: bool_ty,
            value,
            lvalue: false,
        })
    }

    fn gen_prefix(&mut self, op: &str, operand: NodeId, loc: SourceLocation) -> ExprResult {
        let comp = self.gen_expr(operand)?;
        match op {
            "-" => {
                let key = comp.key.clone();
                let ty = comp.ty;
                let zero = match key {
                    TypeKey::Float { .. } => self.target.const_float(ty, 0.0),
                    _ => self.target.const_int(ty, 0),
                };
                let value = self.materialize(comp);
                let negated = self.target.emit_binary(BinOp::Sub, ty, zero, value);
                Ok(ExprComp { key, ty, value: negated, lvalue: false })
            }
            "!" => {
                let ty = comp.ty;
                let value = self.materialize(comp);
                let zero = self.target.const_int(ty, 0);
                let result = self.target.emit_cmp(CmpOp::Eq, ty, value, zero);
                let bool_ty = self.target_type(&TypeKey::Bool)?;
                Ok(ExprComp {
                    key: TypeKey::Bool,
                    ty: bool_ty,
                    value: result,
                    lvalue: false,
                })
            }
            _ => Err(self.fail(
                NoticeCode::SyntaxError,
                loc,
                format!("unknown prefix operator `{op}`"),
            )),
        }
    }

    /// Member access: a field of a struct value, or a name reached
    /// through a module path.
    fn gen_member(
        &mut self,
        node: NodeId,
        lhs: NodeId,
        rhs: NodeId,
        loc: SourceLocation,
    ) -> ExprResult {
        let NodeKind::Identifier { name } = self.ast.kind(rhs).clone() else {
            return Err(self.fail(
                NoticeCode::SyntaxError,
                loc,
                "member access expects an identifier",
            ));
        };

        // Struct instance field?
        if let Ok(base) = self.try_gen_quiet(lhs) {
            let struct_node = match &base.key {
                TypeKey::Struct(node) => Some(*node),
                TypeKey::Ptr(inner) | TypeKey::Ref(inner) => match **inner {
                    TypeKey::Struct(node) => Some(node),
                    _ => None,
                },
                _ => None,
            };
            if let Some(user_type) = struct_node {
                let (index, key) = self.struct_field(user_type, &name, loc)?;
                let base_addr = match &base.key {
                    TypeKey::Struct(_) => base.value.clone(),
                    _ => self.materialize(base.clone()),
                };
                let value = self.target.emit_field_ptr(base_addr, index);
                let ty = self.target_type(&key)?;
                return Ok(ExprComp { key, ty, value, lvalue: true });
            }
        }

        // Module-path global.
        let candidates = seeker::seek_callee(self.ast, node, node);
        for candidate in &candidates {
            if let Some(global) = self.global_info(*candidate) {
                return Ok(ExprComp {
                    key: global.key,
                    ty: global.ty,
                    value: Value::Const(ConstValue::Global(global.name)),
                    lvalue: true,
                });
            }
        }
        Err(self.fail(
            NoticeCode::NameNotFound,
            loc,
            format!("name `{name}` not found"),
        ))
    }

    /// Generate an expression without leaking notices when it fails;
    /// used where the generator probes one interpretation and falls
    /// back to another.
    pub(crate) fn try_gen_quiet(&mut self, node: NodeId) -> ExprResult {
        let mark = self.notices.len();
        let result = self.gen_expr(node);
        if result.is_err() {
            self.notices.truncate(mark);
        }
        result
    }

    /// `init(x, ...)` and `terminate(x)`: explicit constructor and
    /// destructor invocation.
    fn gen_lifecycle(
        &mut self,
        operand: NodeId,
        args: &[NodeId],
        method: &str,
        loc: SourceLocation,
    ) -> ExprResult {
        let comp = self.gen_expr(operand)?;
        let TypeKey::Struct(user_type) = comp.key.clone() else {
            return Err(self.fail(
                NoticeCode::TypeMismatch,
                loc,
                format!("`{method}` expects a user-typed value"),
            ));
        };
        if !comp.lvalue {
            return Err(self.fail(
                NoticeCode::TypeMismatch,
                loc,
                format!("`{method}` expects an addressable value"),
            ));
        }
        let Some(symbol) = self.method_symbol(user_type, method) else {
            return Err(self.fail(
                NoticeCode::NoMatchingCallee,
                loc,
                format!("type has no `{method}` member"),
            ));
        };
        let mut call_args = vec![comp.value.clone()];
        for arg in args {
            let arg_comp = self.gen_expr(*arg)?;
            call_args.push(self.materialize(arg_comp));
        }
        let void = self.target.make_void_type();
        self.target.emit_call(&symbol, void, &call_args);
        let void_key = TypeKey::Void;
        Ok(ExprComp {
            key: void_key,
            ty: void,
            value: Value::Const(ConstValue::Int { value: 0, ty: void }),
            lvalue: false,
        })
    }

    pub(crate) fn current_func_or_fail(&mut self) -> Result<crate::target::FuncId, GenFail> {
        self.current_func_id().ok_or(GenFail)
    }

    pub(crate) fn byte_size_of(&mut self, key: &TypeKey) -> u64 {
        match key {
            TypeKey::Struct(node) => {
                let members = struct_members(self.ast, *node);
                let mut total = 0;
                for (_, type_expr) in members {
                    if let Some(member_key) = self.try_resolve_type(type_expr) {
                        total += self.byte_size_of(&member_key);
                    }
                }
                total
            }
            TypeKey::Array { elem, len } => self.byte_size_of(elem) * len,
            other => other.byte_size(self.ast, &|_| 0),
        }
    }
}
