use log::trace;

use crate::ast::{Bracket, NodeId, NodeKind};
use crate::basic::SourceLocation;
use crate::notices::NoticeCode;
use crate::seeker;
use crate::target::{ConstValue, Value};

use super::{
    definition_target, find_method, ExprComp, ExprResult, FuncInfo, GenFail, Generator, TypeKey,
};

// Match costs of the callee selection model. Exact matches cost
// nothing; promotions and implicit casts are priced by
// `TypeKey::cost_to`; a template specialization carries a flat
// surcharge so a matching plain overload always wins; arguments riding
// a variadic tail are the most expensive match.
const COST_EXACT: u32 = 0;
const COST_TEMPLATE_SPEC: u32 = 3;
const COST_VARIADIC_TAIL: u32 = 4;

/// One way a call could be dispatched.
#[derive(Debug, Clone)]
enum Candidate {
    /// A generated function, with the number of implicit leading
    /// parameters (method receivers) already bound. `penalty` is the
    /// flat surcharge of the dispatch route (template specialization);
    /// `queue_body` marks instantiations whose body is generated only
    /// if this candidate wins.
    Ast {
        info: FuncInfo,
        bound: usize,
        penalty: u32,
        queue_body: bool,
    },
    /// A runtime-registry function resolved by name.
    Runtime { name: String, func: super::RuntimeFn },
}

impl<'a> Generator<'a> {
    pub(crate) fn gen_param_pass(
        &mut self,
        node: NodeId,
        callee: NodeId,
        args: &[NodeId],
        bracket: Bracket,
        loc: SourceLocation,
    ) -> ExprResult {
        if bracket == Bracket::Square {
            return self.gen_square_pass(node, callee, args, loc);
        }

        // Method call on a struct value: `obj.method(args)`.
        if let NodeKind::LinkOp { lhs, rhs } = self.ast.kind(callee).clone() {
            if let NodeKind::Identifier { name } = self.ast.kind(rhs).clone() {
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
                        return self.gen_method_call(user_type, &name, base, args, loc);
                    }
                }
            }
        }

        let mut arg_comps = vec![];
        for arg in args {
            arg_comps.push(self.gen_expr(*arg)?);
        }

        let mut candidates = vec![];
        for candidate in seeker::seek_callee(self.ast, node, callee) {
            let target = definition_target(self.ast, candidate);
            if matches!(self.ast.kind(target), NodeKind::Function { .. }) {
                if let Some(info) = self.funcs.get(&target).cloned() {
                    candidates.push(Candidate::Ast {
                        info,
                        bound: 0,
                        penalty: COST_EXACT,
                        queue_body: false,
                    });
                }
            }
        }

        // Function templates: `f[Int](...)` supplies the parameters,
        // `f(...)` deduces them from the argument types. Either way
        // the specialization competes with the surcharge.
        let template_info = match self.ast.kind(callee).clone() {
            NodeKind::ParamPass {
                callee: inner,
                args: type_args,
                bracket: Bracket::Square,
            } => self.instantiate_function_template(node, inner, Some(&type_args), &arg_comps, loc),
            _ => self.instantiate_function_template(node, callee, None, &arg_comps, loc),
        };
        if let Some(info) = template_info {
            candidates.push(Candidate::Ast {
                info,
                bound: 0,
                penalty: COST_TEMPLATE_SPEC,
                queue_body: true,
            });
        }

        if let NodeKind::Identifier { name } = self.ast.kind(callee).clone() {
            if let Some(func) = self.runtime.get(&name).cloned() {
                candidates.push(Candidate::Runtime { name, func });
            }
        }

        if candidates.is_empty() {
            return Err(self.fail(
                NoticeCode::NameNotFound,
                loc,
                "callee does not name a function",
            ));
        }
        let chosen = self.select_candidate(candidates, &arg_comps, loc)?;
        self.emit_candidate_call(chosen, vec![], arg_comps, loc)
    }

    /// Square brackets: array indexing when the callee is an array
    /// value, otherwise a type application used as a value (the zero
    /// value of the named type).
    fn gen_square_pass(
        &mut self,
        node: NodeId,
        callee: NodeId,
        args: &[NodeId],
        loc: SourceLocation,
    ) -> ExprResult {
        if let Ok(base) = self.try_gen_quiet(callee) {
            if let TypeKey::Array { elem, .. } = base.key.clone() {
                let [index] = args else {
                    return Err(self.fail(
                        NoticeCode::TypeMismatch,
                        loc,
                        "array indexing takes exactly one index",
                    ));
                };
                if !base.lvalue {
                    return Err(self.fail(
                        NoticeCode::TypeMismatch,
                        loc,
                        "cannot index a temporary array",
                    ));
                }
                let index_comp = self.gen_expr(*index)?;
                let index_value = self.materialize(index_comp);
                let value = self.target.emit_index_ptr(base.value, index_value);
                let ty = self.target_type(&elem)?;
                return Ok(ExprComp {
                    key: *elem,
                    ty,
                    value,
                    lvalue: true,
                });
            }
        }

        if let Some(key) = self.try_resolve_type(node) {
            let ty = self.target_type(&key)?;
            let value = self.target.const_zero(ty);
            return Ok(ExprComp {
                key,
                ty,
                value,
                lvalue: false,
            });
        }
        Err(self.fail(
            NoticeCode::NoMatchingCallee,
            loc,
            "square brackets fit neither an array nor a template here",
        ))
    }

    fn gen_method_call(
        &mut self,
        user_type: NodeId,
        method: &str,
        base: ExprComp,
        args: &[NodeId],
        loc: SourceLocation,
    ) -> ExprResult {
        // Materialize the struct's own type first so the methods are
        // declared.
        let _ = self.target_type(&TypeKey::Struct(user_type))?;
        let Some(method_def) = find_method(self.ast, user_type, method) else {
            return Err(self.fail(
                NoticeCode::NoMatchingCallee,
                loc,
                format!("type has no member function `{method}`"),
            ));
        };
        let target = definition_target(self.ast, method_def);
        let Some(info) = self.funcs.get(&target).cloned() else {
            return Err(self.fail(
                NoticeCode::NoMatchingCallee,
                loc,
                format!("member function `{method}` was not generated"),
            ));
        };

        let self_addr = match &base.key {
            TypeKey::Struct(_) => {
                if !base.lvalue {
                    return Err(self.fail(
                        NoticeCode::TypeMismatch,
                        loc,
                        "method call on a temporary",
                    ));
                }
                base.value.clone()
            }
            _ => self.materialize(base),
        };

        let mut arg_comps = vec![];
        for arg in args {
            arg_comps.push(self.gen_expr(*arg)?);
        }
        let candidate = Candidate::Ast {
            info,
            bound: 1,
            penalty: COST_EXACT,
            queue_body: false,
        };
        let chosen = self.select_candidate(vec![candidate], &arg_comps, loc)?;
        self.emit_candidate_call(chosen, vec![self_addr], arg_comps, loc)
    }

    /// Resolve `callee` to a function template and instantiate it for
    /// this call. `supplied` carries explicit square-bracket type
    /// arguments; without them every template parameter must be
    /// deducible from an argument typed by that bare parameter.
    fn instantiate_function_template(
        &mut self,
        node: NodeId,
        callee: NodeId,
        supplied: Option<&[NodeId]>,
        args: &[ExprComp],
        loc: SourceLocation,
    ) -> Option<FuncInfo> {
        for candidate in seeker::seek_callee(self.ast, node, callee) {
            let target = definition_target(self.ast, candidate);
            let NodeKind::Template { params, body } = self.ast.kind(target).clone() else {
                continue;
            };
            let template_fn = definition_target(self.ast, body);
            if !matches!(self.ast.kind(template_fn), NodeKind::Function { .. }) {
                continue;
            }

            let (canonical, arg_nodes) = match supplied {
                Some(type_args) => {
                    let mut canonical = vec![];
                    for type_arg in type_args {
                        canonical.push(match self.try_resolve_type(*type_arg) {
                            Some(key) => key.canonical(self.ast),
                            None => match self.ast.kind(*type_arg) {
                                NodeKind::IntegerLiteral { value, .. } => value.to_string(),
                                _ => return None,
                            },
                        });
                    }
                    (canonical, type_args.to_vec())
                }
                None => match self.deduce_template_args(&params, template_fn, args, loc) {
                    Some(deduced) => deduced,
                    None => continue,
                },
            };
            if params.len() != arg_nodes.len() {
                continue;
            }

            let instance = self
                .templates
                .instantiate(self.ast, target, &canonical, &arg_nodes)
                .ok()?;
            let instance_fn = definition_target(self.ast, instance);
            if !self.funcs.contains_key(&instance_fn) {
                let base = match self.ast.kind(instance) {
                    NodeKind::Definition { name, .. } => name.clone(),
                    _ => "template_fn".to_owned(),
                };
                let mangled = format!("{base}#{}", instance_fn.0);
                trace!("codegen: instantiated function template `{mangled}`");
                // A specialization that cannot be declared quietly
                // drops out; another candidate may still win the call.
                let mark = self.notices.len();
                if self.declare_function(instance_fn, &mangled, None).is_err() {
                    self.notices.truncate(mark);
                    return None;
                }
            }
            return self.funcs.get(&instance_fn).cloned();
        }
        None
    }

    /// Deduce the template parameter tuple from the call arguments:
    /// each parameter must name the declared type of at least one
    /// argument. Returns the canonical tuple and synthesized type
    /// nodes for substitution.
    fn deduce_template_args(
        &mut self,
        params: &[String],
        template_fn: NodeId,
        args: &[ExprComp],
        loc: SourceLocation,
    ) -> Option<(Vec<String>, Vec<NodeId>)> {
        let NodeKind::Function { ty, .. } = self.ast.kind(template_fn).clone() else {
            return None;
        };
        let NodeKind::FunctionType { args: decls, .. } = self.ast.kind(ty).clone() else {
            return None;
        };

        let mut deduced: Vec<Option<(String, NodeId)>> = vec![None; params.len()];
        for (decl, arg) in decls.iter().zip(args.iter()) {
            let NodeKind::Definition { target, .. } = self.ast.kind(*decl) else {
                continue;
            };
            let NodeKind::Identifier { name } = self.ast.kind(*target) else {
                continue;
            };
            let Some(index) = params.iter().position(|param| param == name) else {
                continue;
            };
            if deduced[index].is_none() {
                let key = arg.key.clone();
                let node = self.type_key_node(&key, loc)?;
                deduced[index] = Some((key.canonical(self.ast), node));
            }
        }
        deduced.into_iter().collect::<Option<Vec<_>>>().map(|pairs| {
            pairs.into_iter().unzip()
        })
    }

    /// Synthesize an AST type expression denoting `key`, for use as a
    /// deduced substitution argument.
    fn type_key_node(&mut self, key: &TypeKey, loc: SourceLocation) -> Option<NodeId> {
        Some(match key {
            TypeKey::Int { bits, signed } => self.ast.add(
                NodeKind::IntegerType {
                    bits: *bits,
                    signed: *signed,
                },
                loc,
            ),
            TypeKey::Float { bits } => {
                self.ast.add(NodeKind::FloatType { bits: *bits }, loc)
            }
            TypeKey::Void => self.ast.add(NodeKind::VoidType, loc),
            TypeKey::Bool => self.ast.add(
                NodeKind::Identifier {
                    name: "Bool".to_owned(),
                },
                loc,
            ),
            TypeKey::Str => self.ast.add(
                NodeKind::Identifier {
                    name: "Str".to_owned(),
                },
                loc,
            ),
            TypeKey::Ptr(inner) => {
                let content = self.type_key_node(inner, loc)?;
                self.ast.add(NodeKind::PointerType { content }, loc)
            }
            TypeKey::Ref(inner) => {
                let content = self.type_key_node(inner, loc)?;
                self.ast.add(NodeKind::ReferenceType { content }, loc)
            }
            TypeKey::Array { elem, len } => {
                let content = self.type_key_node(elem, loc)?;
                let size = self.ast.add(
                    NodeKind::IntegerLiteral {
                        value: *len as i64,
                        width: 64,
                        signed: true,
                    },
                    loc,
                );
                self.ast.add(NodeKind::ArrayType { content, size }, loc)
            }
            // Named user types substitute by name so the clone keeps
            // referring to the same defining node.
            TypeKey::Struct(node) => {
                let name = super::find_type_name(self.ast, *node)?;
                self.ast.add(NodeKind::Identifier { name }, loc)
            }
        })
    }

    /// Overloaded infix operators rewrite to the type's member
    /// function.
    pub(crate) fn gen_operator_overload(
        &mut self,
        _node: NodeId,
        user_type: NodeId,
        op: &str,
        lhs: ExprComp,
        rhs: NodeId,
        loc: SourceLocation,
    ) -> ExprResult {
        let method = match op {
            "+" => "add",
            "-" => "sub",
            "*" => "mul",
            "/" => "div",
            "%" => "rem",
            "==" => "equals",
            _ => {
                return Err(self.fail(
                    NoticeCode::TypeMismatch,
                    loc,
                    format!("operator `{op}` is not defined for this type"),
                ));
            }
        };
        if find_method(self.ast, user_type, method).is_none() {
            return Err(self.fail(
                NoticeCode::NoMatchingCallee,
                loc,
                format!("operator `{op}` needs a `{method}` member function"),
            ));
        }
        trace!("codegen: rewriting operator `{op}` to member `{method}`");
        self.gen_method_call(user_type, method, lhs, &[rhs], loc)
    }

    /// Score candidates and select the strict minimum.
    fn select_candidate(
        &mut self,
        candidates: Vec<Candidate>,
        args: &[ExprComp],
        loc: SourceLocation,
    ) -> Result<Candidate, GenFail> {
        let mut scored: Vec<(u32, Candidate)> = vec![];
        for candidate in candidates {
            let cost = match &candidate {
                Candidate::Ast {
                    info,
                    bound,
                    penalty,
                    ..
                } => self
                    .score(&info.params[*bound..], info.variadic, args)
                    .map(|cost| cost + penalty),
                Candidate::Runtime { func, .. } => {
                    let params: Vec<(String, TypeKey)> = func
                        .params
                        .iter()
                        .map(|key| (String::new(), key.clone()))
                        .collect();
                    self.score(&params, func.variadic, args)
                }
            };
            if let Some(cost) = cost {
                scored.push((cost, candidate));
            }
        }

        if scored.is_empty() {
            return Err(self.fail(
                NoticeCode::NoMatchingCallee,
                loc,
                "no callee matches these argument types",
            ));
        }
        scored.sort_by_key(|(cost, _)| *cost);
        if scored.len() > 1 && scored[0].0 == scored[1].0 {
            return Err(self.fail(
                NoticeCode::MultipleCalleeMatch,
                loc,
                "multiple callees match these argument types equally well",
            ));
        }
        Ok(scored.into_iter().next().unwrap().1)
    }

    /// The summed conversion cost of `args` against `params`, or `None`
    /// when the call cannot match.
    fn score(
        &self,
        params: &[(String, TypeKey)],
        variadic: bool,
        args: &[ExprComp],
    ) -> Option<u32> {
        if args.len() < params.len() {
            return None;
        }
        if args.len() > params.len() && !variadic {
            return None;
        }
        let mut total = COST_EXACT;
        for (arg, (_, wanted)) in args.iter().zip(params.iter()) {
            total += arg.key.cost_to(wanted)?;
        }
        // Everything beyond the declared parameters rides the variadic
        // tail.
        total += (args.len() - params.len()) as u32 * COST_VARIADIC_TAIL;
        Some(total)
    }

    fn emit_candidate_call(
        &mut self,
        candidate: Candidate,
        mut prefix_args: Vec<Value>,
        args: Vec<ExprComp>,
        loc: SourceLocation,
    ) -> ExprResult {
        let (symbol, params, bound, ret) = match candidate {
            Candidate::Ast {
                info,
                bound,
                queue_body,
                ..
            } => {
                // The winning specialization's body is owed; it is
                // generated once the body in progress finishes.
                if queue_body {
                    self.queue_template_body(&info);
                }
                (
                    info.mangled.clone(),
                    info.params.clone(),
                    bound,
                    info.ret.clone(),
                )
            }
            Candidate::Runtime { name, func } => {
                self.ensure_runtime_declared(&name, &func)?;
                let params = func
                    .params
                    .iter()
                    .map(|key| (String::new(), key.clone()))
                    .collect();
                (name, params, 0, func.ret.clone())
            }
        };

        let mut values = std::mem::take(&mut prefix_args);
        let declared = &params[bound..];
        for (index, comp) in args.into_iter().enumerate() {
            let value = match declared.get(index) {
                Some((_, wanted)) => self.convert(comp, wanted, loc)?,
                // Variadic tail arguments pass unconverted.
                None => self.materialize(comp),
            };
            values.push(value);
        }

        let ret_ty = self.target_type(&ret)?;
        let result = self.target.emit_call(&symbol, ret_ty, &values);
        Ok(ExprComp {
            key: ret.clone(),
            ty: ret_ty,
            value: result.unwrap_or(Value::Const(ConstValue::Zero(ret_ty))),
            lvalue: false,
        })
    }

    /// Runtime functions are declared in the target module on first
    /// use so calls to them link by name.
    fn ensure_runtime_declared(
        &mut self,
        name: &str,
        func: &super::RuntimeFn,
    ) -> Result<(), GenFail> {
        if self.runtime_declared(name) {
            return Ok(());
        }
        let param_tys: Vec<_> = func
            .params
            .clone()
            .iter()
            .map(|key| self.target_type(key))
            .collect::<Result<_, _>>()?;
        let ret_ty = self.target_type(&func.ret)?;
        let fn_ty = self
            .target
            .make_function_type(&param_tys, ret_ty, func.variadic);
        if let Err(e) = self.target.declare_function(name, fn_ty) {
            return Err(self.fail(
                NoticeCode::TargetBackendFailure,
                SourceLocation::default(),
                e.to_string(),
            ));
        }
        self.mark_runtime_declared(name);
        Ok(())
    }
}
