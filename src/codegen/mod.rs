//! The code generator: walks the processed AST and drives the abstract
//! target generator. Owns the expression-computation protocol, callee
//! resolution, the destruction stack, global constructor/destructor
//! orchestration, and the lowering of control flow to basic blocks.
mod callee;
mod destruction;
mod expr;
mod types;

pub use self::callee::*;
pub use self::destruction::*;
pub use self::expr::*;
pub use self::types::*;

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::{error::Error, fmt::Display};

use log::{debug, trace};

use crate::ast::{Ast, NodeId, NodeKind};
use crate::basic::SourceLocation;
use crate::notices::{Notice, NoticeCode, NoticeStore};
use crate::processor::TemplateCache;
use crate::target::{ConstValue, FuncId, TargetGenerator, TypeId, Value};

/// Hard failure of a whole generation run (target-level corruption);
/// per-statement problems are notices instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenError(pub String);

impl Display for GenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for GenError {}

/// Marker for a poisoned expression or statement; the notice was
/// already recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenFail;

pub type ExprResult = Result<ExprComp, GenFail>;

/// A function the host registers for generated code (runtime library
/// services such as `println`). The JIT binds the same names to native
/// closures.
#[derive(Debug, Clone)]
pub struct RuntimeFn {
    pub params: Vec<TypeKey>,
    pub variadic: bool,
    pub ret: TypeKey,
}

/// Name-keyed registry of runtime functions, filled by library
/// gateways before generation.
#[derive(Debug, Default, Clone)]
pub struct RuntimeRegistry {
    funcs: HashMap<String, RuntimeFn>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, func: RuntimeFn) {
        self.funcs.insert(name.to_owned(), func);
    }

    pub fn remove(&mut self, name: &str) {
        self.funcs.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<&RuntimeFn> {
        self.funcs.get(name)
    }
}

/// A local variable slot.
#[derive(Debug, Clone)]
pub struct LocalVar {
    pub addr: Value,
    pub key: TypeKey,
    pub ty: TypeId,
}

/// A generated (or declared) function known to the generator.
#[derive(Debug, Clone)]
pub struct FuncInfo {
    pub mangled: String,
    pub func: FuncId,
    pub ty: TypeId,
    pub params: Vec<(String, TypeKey)>,
    pub variadic: bool,
    pub ret: TypeKey,
    /// The [NodeKind::Function] node; its body is generated in pass
    /// three.
    pub node: NodeId,
}

struct LoopCtx {
    break_block: crate::target::BlockId,
    continue_block: crate::target::BlockId,
    baseline: usize,
}

pub struct Generator<'a> {
    pub ast: &'a mut Ast,
    pub notices: &'a mut NoticeStore,
    pub target: &'a mut dyn TargetGenerator,
    pub templates: &'a mut TemplateCache,
    pub runtime: &'a RuntimeRegistry,
    pub cancel: &'a Cell<bool>,

    scopes: Vec<HashMap<String, LocalVar>>,
    pub(crate) funcs: HashMap<NodeId, FuncInfo>,
    globals: HashMap<NodeId, GlobalInfo>,
    struct_cache: HashMap<NodeId, TypeId>,
    declared_runtime: HashSet<String>,
    dest_stack: DestructionStack,
    loops: Vec<LoopCtx>,
    current_func: Option<FuncId>,
    terminated: bool,
    ctor_counter: u32,
    /// Nodes currently being generated; re-entry is a cyclic
    /// dependency.
    in_progress: HashSet<NodeId>,
    /// Template-instantiated functions whose bodies are owed. Queued
    /// while another body is in progress and drained afterwards, so
    /// the back end's insertion state is never nested.
    pending_bodies: Vec<FuncInfo>,
    queued_bodies: HashSet<NodeId>,
}

#[derive(Debug, Clone)]
pub struct GlobalInfo {
    pub name: String,
    pub key: TypeKey,
    pub ty: TypeId,
}

impl<'a> Generator<'a> {
    pub fn new(
        ast: &'a mut Ast,
        notices: &'a mut NoticeStore,
        target: &'a mut dyn TargetGenerator,
        templates: &'a mut TemplateCache,
        runtime: &'a RuntimeRegistry,
        cancel: &'a Cell<bool>,
    ) -> Self {
        Self {
            ast,
            notices,
            target,
            templates,
            runtime,
            cancel,
            scopes: vec![],
            funcs: HashMap::new(),
            globals: HashMap::new(),
            struct_cache: HashMap::new(),
            declared_runtime: HashSet::new(),
            dest_stack: DestructionStack::new(),
            loops: vec![],
            current_func: None,
            terminated: false,
            ctor_counter: 0,
            in_progress: HashSet::new(),
            pending_bodies: vec![],
            queued_bodies: HashSet::new(),
        }
    }

    pub fn notice(&mut self, code: NoticeCode, loc: SourceLocation, message: impl Into<String>) {
        self.notices.add(Notice::new(code, loc, message));
    }

    pub(crate) fn fail(
        &mut self,
        code: NoticeCode,
        loc: SourceLocation,
        message: impl Into<String>,
    ) -> GenFail {
        self.notice(code, loc, message);
        GenFail
    }

    /// Generate the whole program: declarations, then globals, then
    /// function bodies. A fatal notice aborts only the statement (or
    /// function) it occurred in.
    pub fn generate_root(&mut self, root: NodeId) -> Result<(), GenError> {
        debug!("codegen: declaring functions");
        self.declare_scope(root, "")?;

        debug!("codegen: generating globals");
        self.generate_globals(root, "")?;

        debug!("codegen: generating {} function bodies", self.funcs.len());
        let infos: Vec<FuncInfo> = self.funcs.values().cloned().collect();
        for info in infos {
            if self.cancel.get() {
                debug!("codegen: build cancelled");
                break;
            }
            let has_body = matches!(
                self.ast.kind(info.node),
                NodeKind::Function { body: Some(_), .. }
            );
            if has_body {
                let _ = self.generate_function_body(&info);
            }
        }
        self.drain_pending_bodies();
        Ok(())
    }

    /// Queue an instantiated function for body generation at the next
    /// drain point.
    pub(crate) fn queue_template_body(&mut self, info: &FuncInfo) {
        if self.queued_bodies.insert(info.node) {
            self.pending_bodies.push(info.clone());
        }
    }

    fn drain_pending_bodies(&mut self) {
        while let Some(info) = self.pending_bodies.pop() {
            let _ = self.generate_function_body(&info);
        }
    }

    pub fn function_named(&self, mangled: &str) -> Option<&FuncInfo> {
        self.funcs.values().find(|info| info.mangled == mangled)
    }

    /// Wrap `body` (a block or scope) into a synthetic zero-argument
    /// function and generate it. `context` keeps name resolution
    /// anchored in the enclosing scope. Used for preprocess blocks,
    /// eval expressions, and root-level imperative statements.
    pub fn generate_entry_fn(
        &mut self,
        name: &str,
        body: NodeId,
        context: Option<NodeId>,
    ) -> Result<(), GenFail> {
        let loc = self.ast.loc(body);
        let ty = self.ast.add(
            NodeKind::FunctionType {
                args: vec![],
                ret: None,
                modifiers: vec![],
            },
            loc,
        );
        let func = self.ast.add(
            NodeKind::Function {
                ty,
                body: Some(body),
            },
            loc,
        );
        if let Some(context) = context {
            self.ast.set_parent(func, Some(context));
        }
        self.declare_function(func, name, None)?;
        let info = self.funcs.get(&func).cloned().ok_or(GenFail)?;
        let result = self.generate_function_body(&info);
        self.drain_pending_bodies();
        result
    }

    /// Pass one: walk scopes and register every function (including
    /// user-type methods) with the back end.
    fn declare_scope(&mut self, scope: NodeId, prefix: &str) -> Result<(), GenError> {
        for statement in self.scope_statements(scope) {
            let NodeKind::Definition { name, target, .. } = self.ast.kind(statement).clone()
            else {
                continue;
            };
            match self.ast.kind(target).clone() {
                NodeKind::Function { .. } => {
                    let mangled = format!("{prefix}{name}");
                    if let Err(GenFail) = self.declare_function(target, &mangled, None) {
                        trace!("codegen: skipping undeclarable function `{mangled}`");
                    }
                }
                NodeKind::Module { body, .. } => {
                    self.declare_scope(body, &format!("{prefix}{name}."))?;
                }
                NodeKind::UserType { body } => {
                    self.declare_user_type_methods(target, body, &format!("{prefix}{name}."))?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub(crate) fn declare_user_type_methods(
        &mut self,
        user_type: NodeId,
        body: NodeId,
        prefix: &str,
    ) -> Result<(), GenError> {
        for statement in self.scope_statements(body) {
            let NodeKind::Definition { name, target, .. } = self.ast.kind(statement).clone()
            else {
                continue;
            };
            if matches!(self.ast.kind(target), NodeKind::Function { .. }) {
                let mangled = format!("{prefix}{name}");
                let this = TypeKey::Ptr(Box::new(TypeKey::Struct(user_type)));
                let _ = self.declare_function(target, &mangled, Some(("this".to_owned(), this)));
            }
        }
        Ok(())
    }

    /// Register one function with the back end and remember its
    /// signature. `implicit` prepends a hidden first parameter (method
    /// receivers).
    fn declare_function(
        &mut self,
        function: NodeId,
        mangled: &str,
        implicit: Option<(String, TypeKey)>,
    ) -> Result<(), GenFail> {
        if self.funcs.contains_key(&function) {
            return Ok(());
        }
        let loc = self.ast.loc(function);
        let NodeKind::Function { ty, body } = self.ast.kind(function).clone() else {
            return Err(self.fail(NoticeCode::TypeMismatch, loc, "not a function"));
        };
        let NodeKind::FunctionType { args, ret, .. } = self.ast.kind(ty).clone() else {
            return Err(self.fail(NoticeCode::TypeMismatch, loc, "function lacks a type"));
        };

        let mut params = vec![];
        let mut variadic = false;
        if let Some(implicit) = implicit {
            params.push(implicit);
        }
        for arg in args {
            match self.ast.kind(arg).clone() {
                NodeKind::Definition { name, target, .. } => {
                    let key = self.resolve_type(target)?;
                    params.push((name, key));
                }
                NodeKind::ArgPack { .. } => variadic = true,
                _ => {
                    return Err(self.fail(
                        NoticeCode::TypeMismatch,
                        loc,
                        "malformed function argument",
                    ));
                }
            }
        }
        let ret_key = match ret {
            Some(ret) => self.resolve_type(ret)?,
            None => TypeKey::Void,
        };

        let param_tys: Vec<TypeId> = params
            .iter()
            .map(|(_, key)| self.target_type(key))
            .collect::<Result<_, _>>()?;
        let ret_ty = self.target_type(&ret_key)?;
        let func_ty = self.target.make_function_type(&param_tys, ret_ty, variadic);
        let result = if body.is_some() {
            self.target.create_function(mangled, func_ty)
        } else {
            self.target.declare_function(mangled, func_ty)
        };
        let func = match result {
            Ok(func) => func,
            Err(e) => {
                return Err(self.fail(NoticeCode::TargetBackendFailure, loc, e.to_string()));
            }
        };

        trace!("codegen: declared `{mangled}`");
        self.funcs.insert(
            function,
            FuncInfo {
                mangled: mangled.to_owned(),
                func,
                ty: func_ty,
                params,
                variadic,
                ret: ret_key,
                node: function,
            },
        );
        Ok(())
    }

    /// Pass two: globals with their initialization and destruction
    /// orchestration.
    fn generate_globals(&mut self, scope: NodeId, prefix: &str) -> Result<(), GenError> {
        for statement in self.scope_statements(scope) {
            let NodeKind::Definition { name, target, .. } = self.ast.kind(statement).clone()
            else {
                continue;
            };
            match self.ast.kind(target).clone() {
                NodeKind::Function { .. }
                | NodeKind::Template { .. }
                | NodeKind::Macro { .. }
                | NodeKind::UserType { .. } => {}
                NodeKind::Module { body, .. } => {
                    self.generate_globals(body, &format!("{prefix}{name}."))?;
                }
                _ => {
                    let mangled = format!("{prefix}{name}");
                    let _ = self.generate_global(statement, target, &mangled);
                }
            }
        }
        Ok(())
    }

    fn generate_global(
        &mut self,
        def_node: NodeId,
        target: NodeId,
        mangled: &str,
    ) -> Result<(), GenFail> {
        let loc = self.ast.loc(target);

        // A type-valued target declares an uninitialized global; a
        // value target initializes it, through a module constructor
        // when the initializer is not constant.
        let key = match self.try_resolve_type(target) {
            Some(key) => {
                let ty = self.target_type(&key)?;
                self.declare_global_slot(def_node, mangled, &key, ty, ConstValue::Zero(ty), loc)?;
                key
            }
            None => match self.const_initializer(target)? {
                Some((key, init)) => {
                    let ty = self.target_type(&key)?;
                    self.declare_global_slot(def_node, mangled, &key, ty, init, loc)?;
                    key
                }
                None => {
                    let ctor_name = format!("__global_ctor_{}", self.ctor_counter);
                    self.ctor_counter += 1;
                    let mut stored_key = None;
                    self.build_synthetic_fn(&ctor_name, |gen| {
                        let comp = gen.gen_expr(target)?;
                        let key = comp.key.clone();
                        let ty = gen.target_type(&key)?;
                        let value = gen.materialize(comp);
                        let addr = Value::Const(ConstValue::Global(mangled.to_owned()));
                        gen.target.emit_store(ty, addr, value);
                        stored_key = Some((key, ty));
                        Ok(())
                    })?;
                    let Some((key, ty)) = stored_key else {
                        return Err(GenFail);
                    };
                    self.target.register_ctor(&ctor_name);
                    self.declare_global_slot(def_node, mangled, &key, ty, ConstValue::Zero(ty), loc)?;
                    key
                }
            },
        };

        // Struct globals with a destructor run it at unload.
        if let TypeKey::Struct(user_type) = key {
            if let Some(dtor) = self.method_symbol(user_type, "destruct") {
                let dtor_name = format!("__global_dtor_{}", self.ctor_counter);
                self.ctor_counter += 1;
                let void = self.target.make_void_type();
                self.build_synthetic_fn(&dtor_name, |gen| {
                    let addr = Value::Const(ConstValue::Global(mangled.to_owned()));
                    gen.target.emit_call(&dtor, void, &[addr]);
                    Ok(())
                })?;
                self.target.register_dtor(&dtor_name);
            }
        }
        Ok(())
    }

    fn declare_global_slot(
        &mut self,
        def_node: NodeId,
        mangled: &str,
        key: &TypeKey,
        ty: TypeId,
        init: ConstValue,
        loc: SourceLocation,
    ) -> Result<(), GenFail> {
        if let Err(e) = self.target.declare_global(mangled, ty, init) {
            return Err(self.fail(NoticeCode::TargetBackendFailure, loc, e.to_string()));
        }
        self.globals.insert(
            def_node,
            GlobalInfo {
                name: mangled.to_owned(),
                key: key.clone(),
                ty,
            },
        );
        Ok(())
    }

    /// Build a `fn() -> void` helper (global ctor/dtor bodies).
    fn build_synthetic_fn(
        &mut self,
        name: &str,
        build: impl FnOnce(&mut Self) -> Result<(), GenFail>,
    ) -> Result<(), GenFail> {
        let void = self.target.make_void_type();
        let ty = self.target.make_function_type(&[], void, false);
        let func = match self.target.create_function(name, ty) {
            Ok(func) => func,
            Err(e) => {
                return Err(self.fail(
                    NoticeCode::TargetBackendFailure,
                    SourceLocation::default(),
                    e.to_string(),
                ));
            }
        };
        let previous = self.current_func.replace(func);
        self.target
            .prepare_function_body(func)
            .map_err(|e| {
                self.fail(
                    NoticeCode::TargetBackendFailure,
                    SourceLocation::default(),
                    e.to_string(),
                )
            })?;
        let result = build(self);
        self.target.emit_ret(None);
        let _ = self.target.finish_function_body(func);
        self.current_func = previous;
        result
    }

    /// Pass three: one function body.
    fn generate_function_body(&mut self, info: &FuncInfo) -> Result<(), GenFail> {
        let loc = self.ast.loc(info.node);
        if !self.in_progress.insert(info.node) {
            return Err(self.fail(
                NoticeCode::CyclicDependency,
                loc,
                format!("function `{}` demanded while being generated", info.mangled),
            ));
        }
        debug!("codegen: body of `{}`", info.mangled);

        let NodeKind::Function { body: Some(body), .. } = self.ast.kind(info.node).clone()
        else {
            self.in_progress.remove(&info.node);
            return Ok(());
        };

        if let Err(e) = self.target.prepare_function_body(info.func) {
            self.in_progress.remove(&info.node);
            return Err(self.fail(NoticeCode::TargetBackendFailure, loc, e.to_string()));
        }
        self.current_func = Some(info.func);
        self.terminated = false;
        self.scopes.push(HashMap::new());
        let baseline = self.dest_stack.baseline();

        // Parameters become addressable slots.
        for (index, (name, key)) in info.params.iter().enumerate() {
            let ty = match self.target_type(&key.clone()) {
                Ok(ty) => ty,
                Err(fail) => {
                    self.scopes.pop();
                    self.current_func = None;
                    self.in_progress.remove(&info.node);
                    return Err(fail);
                }
            };
            let addr = self.target.emit_alloca(ty);
            let value = self.target.param_value(info.func, index);
            self.target.emit_store(ty, addr.clone(), value);
            self.scopes.last_mut().unwrap().insert(
                name.clone(),
                LocalVar {
                    addr,
                    key: key.clone(),
                    ty,
                },
            );
        }

        let statements = self.scope_statements(body);
        for statement in statements {
            let _ = self.gen_statement(statement);
        }

        // Fall-through destruction.
        if !self.terminated {
            self.emit_destruction(baseline);
        }
        self.dest_stack.unwind_to(baseline);
        self.scopes.pop();

        let _ = self.target.finish_function_body(info.func);
        self.current_func = None;
        self.in_progress.remove(&info.node);
        Ok(())
    }

    pub(crate) fn scope_statements(&self, scope: NodeId) -> Vec<NodeId> {
        match self.ast.kind(scope) {
            NodeKind::Scope { statements } | NodeKind::Block { statements } => statements.clone(),
            _ => vec![],
        }
    }

    /// Emit destructor calls for everything above `baseline`, in
    /// reverse push order. Does not pop the stack (callers unwinding
    /// for real call `dest_stack.unwind_to` afterwards).
    pub(crate) fn emit_destruction(&mut self, baseline: usize) {
        let void = self.target.make_void_type();
        for node in self.dest_stack.pending(baseline) {
            trace!("codegen: emitting dtor `{}`", node.dtor);
            self.target.emit_call(&node.dtor, void, &[node.value.clone()]);
        }
    }

    /// The mangled symbol of a user type's member function, if the
    /// member exists.
    pub(crate) fn method_symbol(&mut self, user_type: NodeId, name: &str) -> Option<String> {
        let method_def = find_method(self.ast, user_type, name)?;
        let target = definition_target(self.ast, method_def);
        self.funcs.get(&target).map(|info| info.mangled.clone())
    }

    pub(crate) fn struct_cache_get(&self, node: NodeId) -> Option<TypeId> {
        self.struct_cache.get(&node).copied()
    }

    pub(crate) fn struct_cache_put(&mut self, node: NodeId, ty: TypeId) {
        self.struct_cache.insert(node, ty);
    }

    pub(crate) fn current_func_id(&self) -> Option<FuncId> {
        self.current_func
    }

    pub(crate) fn runtime_declared(&self, name: &str) -> bool {
        self.declared_runtime.contains(name)
    }

    pub(crate) fn mark_runtime_declared(&mut self, name: &str) {
        self.declared_runtime.insert(name.to_owned());
    }

    pub(crate) fn lookup_local(&self, name: &str) -> Option<LocalVar> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    pub(crate) fn global_info(&self, def_node: NodeId) -> Option<GlobalInfo> {
        self.globals.get(&def_node).cloned()
    }

    pub(crate) fn insert_local(&mut self, name: &str, var: LocalVar) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned(), var);
        }
    }

    // ---- statements ----

    pub(crate) fn gen_statement(&mut self, statement: NodeId) -> Result<(), GenFail> {
        if self.cancel.get() {
            return Err(GenFail);
        }
        if self.terminated {
            self.notice(
                NoticeCode::UnreachableCode,
                self.ast.loc(statement),
                "statement is unreachable",
            );
            return Ok(());
        }
        match self.ast.kind(statement).clone() {
            NodeKind::Definition { name, target, .. } => self.gen_local_def(&name, target),
            NodeKind::If { cond, body, else_body } => self.gen_if(cond, body, else_body),
            NodeKind::While { cond, body } => self.gen_while(cond, body),
            NodeKind::For { init, cond, step, body } => self.gen_for(init, cond, step, body),
            NodeKind::Return { value } => self.gen_return(statement, value),
            NodeKind::Break => self.gen_break(statement),
            NodeKind::Continue => self.gen_continue(statement),
            NodeKind::Block { .. } => self.gen_block(statement),
            NodeKind::Use { .. }
            | NodeKind::Alias { .. }
            | NodeKind::Bridge { .. }
            | NodeKind::Preprocess { .. }
            | NodeKind::Macro { .. }
            | NodeKind::Template { .. } => Ok(()),
            NodeKind::Eval { expr } => {
                let _ = self.gen_expr(expr)?;
                Ok(())
            }
            _ => {
                let _ = self.gen_expr(statement)?;
                Ok(())
            }
        }
    }

    fn gen_local_def(&mut self, name: &str, target: NodeId) -> Result<(), GenFail> {
        let loc = self.ast.loc(target);
        let (key, init) = match self.try_resolve_type(target) {
            // `x := Int;` declares an uninitialized slot.
            Some(key) => (key, None),
            None => {
                let comp = self.gen_expr(target)?;
                (comp.key.clone(), Some(comp))
            }
        };
        let ty = self.target_type(&key)?;
        let addr = self.target.emit_alloca(ty);
        if let Some(comp) = init {
            let value = self.convert(comp, &key, loc)?;
            self.target.emit_store(ty, addr.clone(), value);
        }
        self.insert_local(
            name,
            LocalVar {
                addr: addr.clone(),
                key: key.clone(),
                ty,
            },
        );

        if let TypeKey::Struct(user_type) = key {
            if let Some(dtor) = self.method_symbol(user_type, "destruct") {
                self.dest_stack.push(DestructionNode {
                    scope_depth: self.scopes.len(),
                    value: addr,
                    dtor,
                    ty: user_type,
                });
            }
        }
        Ok(())
    }

    fn gen_block(&mut self, block: NodeId) -> Result<(), GenFail> {
        self.scopes.push(HashMap::new());
        let baseline = self.dest_stack.baseline();
        for statement in self.scope_statements(block) {
            let _ = self.gen_statement(statement);
        }
        if !self.terminated {
            self.emit_destruction(baseline);
        }
        self.dest_stack.unwind_to(baseline);
        self.scopes.pop();
        Ok(())
    }

    fn gen_if(
        &mut self,
        cond: NodeId,
        body: NodeId,
        else_body: Option<NodeId>,
    ) -> Result<(), GenFail> {
        let func = self.current_func.ok_or(GenFail)?;
        let comp = self.gen_expr(cond)?;
        let cond_value = self.materialize(comp);

        let then_block = self.target.prepare_block(func, "then");
        let else_block = self.target.prepare_block(func, "else");
        let merge_block = self.target.prepare_block(func, "merge");
        self.target.emit_cond_br(
            cond_value,
            then_block,
            if else_body.is_some() { else_block } else { merge_block },
        );

        self.target.set_insertion_block(then_block);
        self.terminated = false;
        let _ = self.gen_block_like(body);
        if !self.terminated {
            self.target.emit_br(merge_block);
        }

        if let Some(else_body) = else_body {
            self.target.set_insertion_block(else_block);
            self.terminated = false;
            let _ = self.gen_block_like(else_body);
            if !self.terminated {
                self.target.emit_br(merge_block);
            }
        }

        self.target.set_insertion_block(merge_block);
        self.terminated = false;
        Ok(())
    }

    /// A block statement or a single statement used where a block is
    /// expected (`else if` chains).
    fn gen_block_like(&mut self, node: NodeId) -> Result<(), GenFail> {
        match self.ast.kind(node) {
            NodeKind::Block { .. } => self.gen_block(node),
            _ => self.gen_statement(node),
        }
    }

    fn gen_while(&mut self, cond: NodeId, body: NodeId) -> Result<(), GenFail> {
        let func = self.current_func.ok_or(GenFail)?;
        let cond_block = self.target.prepare_block(func, "loop_cond");
        let body_block = self.target.prepare_block(func, "loop_body");
        let exit_block = self.target.prepare_block(func, "loop_exit");

        self.target.emit_br(cond_block);
        self.target.set_insertion_block(cond_block);
        let comp = self.gen_expr(cond)?;
        let cond_value = self.materialize(comp);
        self.target.emit_cond_br(cond_value, body_block, exit_block);

        self.target.set_insertion_block(body_block);
        self.terminated = false;
        self.loops.push(LoopCtx {
            break_block: exit_block,
            continue_block: cond_block,
            baseline: self.dest_stack.baseline(),
        });
        let _ = self.gen_block_like(body);
        self.loops.pop();
        if !self.terminated {
            self.target.emit_br(cond_block);
        }

        self.target.set_insertion_block(exit_block);
        self.terminated = false;
        Ok(())
    }

    fn gen_for(
        &mut self,
        init: Option<NodeId>,
        cond: Option<NodeId>,
        step: Option<NodeId>,
        body: NodeId,
    ) -> Result<(), GenFail> {
        let func = self.current_func.ok_or(GenFail)?;
        self.scopes.push(HashMap::new());
        let scope_baseline = self.dest_stack.baseline();
        if let Some(init) = init {
            let _ = self.gen_statement(init);
        }

        let cond_block = self.target.prepare_block(func, "for_cond");
        let body_block = self.target.prepare_block(func, "for_body");
        let step_block = self.target.prepare_block(func, "for_step");
        let exit_block = self.target.prepare_block(func, "for_exit");

        self.target.emit_br(cond_block);
        self.target.set_insertion_block(cond_block);
        match cond {
            Some(cond) => {
                let comp = self.gen_expr(cond)?;
                let value = self.materialize(comp);
                self.target.emit_cond_br(value, body_block, exit_block);
            }
            None => self.target.emit_br(body_block),
        }

        self.target.set_insertion_block(body_block);
        self.terminated = false;
        self.loops.push(LoopCtx {
            break_block: exit_block,
            continue_block: step_block,
            baseline: self.dest_stack.baseline(),
        });
        let _ = self.gen_block_like(body);
        self.loops.pop();
        if !self.terminated {
            self.target.emit_br(step_block);
        }

        self.target.set_insertion_block(step_block);
        self.terminated = false;
        if let Some(step) = step {
            let _ = self.gen_expr(step);
        }
        self.target.emit_br(cond_block);

        self.target.set_insertion_block(exit_block);
        self.terminated = false;
        self.emit_destruction(scope_baseline);
        self.dest_stack.unwind_to(scope_baseline);
        self.scopes.pop();
        Ok(())
    }

    fn gen_return(&mut self, _statement: NodeId, value: Option<NodeId>) -> Result<(), GenFail> {
        let result = match value {
            Some(value) => {
                let comp = self.gen_expr(value)?;
                Some(self.materialize(comp))
            }
            None => None,
        };
        // Destroy everything the function owns, innermost first.
        self.emit_destruction(0);
        self.target.emit_ret(result);
        self.terminated = true;
        Ok(())
    }

    fn gen_break(&mut self, statement: NodeId) -> Result<(), GenFail> {
        let loc = self.ast.loc(statement);
        let Some(ctx) = self.loops.last() else {
            return Err(self.fail(NoticeCode::SyntaxError, loc, "`break` outside a loop"));
        };
        let (block, baseline) = (ctx.break_block, ctx.baseline);
        self.emit_destruction(baseline);
        self.target.emit_br(block);
        self.terminated = true;
        Ok(())
    }

    fn gen_continue(&mut self, statement: NodeId) -> Result<(), GenFail> {
        let loc = self.ast.loc(statement);
        let Some(ctx) = self.loops.last() else {
            return Err(self.fail(NoticeCode::SyntaxError, loc, "`continue` outside a loop"));
        };
        let (block, baseline) = (ctx.continue_block, ctx.baseline);
        self.emit_destruction(baseline);
        self.target.emit_br(block);
        self.terminated = true;
        Ok(())
    }
}
