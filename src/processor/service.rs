use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use crate::ast::NodeId;
use crate::codegen::{RuntimeFn, RuntimeRegistry, TypeKey};
use crate::target::{Jit, JitError, RtValue};

/// Handle value preprocess-time code uses for the scope enclosing its
/// block.
pub const CURRENT_SCOPE_HANDLE: i64 = 0;

/// What an AST handle held by preprocess-time code stands for. Handles
/// are resolved lazily when the edit queue is drained, so running
/// preprocess code never touches the tree it is embedded in.
#[derive(Debug, Clone)]
pub enum HandleExpr {
    /// The scope the preprocess block hangs in.
    CurrentScope,
    /// A tree to be built by parsing `source`.
    Built { source: String },
    /// The element named `name` looked up from another handle.
    Found { scope: i64, name: String },
    /// The modifier named `name` of another handle's node.
    Modifier { node: i64, name: String },
}

/// An edit request published by preprocess-time code, drained by the
/// processor at its checkpoints.
#[derive(Debug, Clone)]
pub enum EditRequest {
    Insert { parent: i64, child: i64 },
    ProcessStatements { node: i64 },
}

#[derive(Debug, Default)]
struct ServiceState {
    handles: Vec<HandleExpr>,
    requests: Vec<EditRequest>,
    /// Handles resolved during earlier drains; preprocess code may
    /// retain handles across generation steps.
    resolved: Vec<Option<NodeId>>,
}

/// The AST-manager runtime service exposed to preprocess-generated
/// code: `build_ast`, `insert_ast`, `find_element`, `get_modifier`,
/// `process_statements`, and `current_scope`.
///
/// Shared by reference counting so JIT builtins can retain it across
/// calls; all mutation goes through the request queue.
#[derive(Debug, Default)]
pub struct AstService {
    state: RefCell<ServiceState>,
}

impl AstService {
    pub fn new() -> Rc<Self> {
        let service = Rc::new(Self::default());
        // Handle 0 is always the current scope.
        service.state.borrow_mut().handles.push(HandleExpr::CurrentScope);
        service.state.borrow_mut().resolved.push(None);
        service
    }

    fn add_handle(&self, expr: HandleExpr) -> i64 {
        let mut state = self.state.borrow_mut();
        state.handles.push(expr);
        state.resolved.push(None);
        (state.handles.len() - 1) as i64
    }

    pub fn build_ast(&self, source: &str) -> i64 {
        trace!("ast service: staged build of {} chars", source.len());
        self.add_handle(HandleExpr::Built {
            source: source.to_owned(),
        })
    }

    pub fn find_element(&self, scope: i64, name: &str) -> i64 {
        self.add_handle(HandleExpr::Found {
            scope,
            name: name.to_owned(),
        })
    }

    pub fn get_modifier(&self, node: i64, name: &str) -> i64 {
        self.add_handle(HandleExpr::Modifier {
            node,
            name: name.to_owned(),
        })
    }

    pub fn insert_ast(&self, parent: i64, child: i64) {
        self.state
            .borrow_mut()
            .requests
            .push(EditRequest::Insert { parent, child });
    }

    pub fn process_statements(&self, node: i64) {
        self.state
            .borrow_mut()
            .requests
            .push(EditRequest::ProcessStatements { node });
    }

    pub fn handle_expr(&self, handle: i64) -> Option<HandleExpr> {
        self.state.borrow().handles.get(handle as usize).cloned()
    }

    pub fn resolved(&self, handle: i64) -> Option<NodeId> {
        self.state
            .borrow()
            .resolved
            .get(handle as usize)
            .copied()
            .flatten()
    }

    pub fn remember_resolution(&self, handle: i64, node: NodeId) {
        if let Some(slot) = self
            .state
            .borrow_mut()
            .resolved
            .get_mut(handle as usize)
        {
            *slot = Some(node);
        }
    }

    /// Take the pending requests; the handle table stays.
    pub fn take_requests(&self) -> Vec<EditRequest> {
        std::mem::take(&mut self.state.borrow_mut().requests)
    }

    /// The callable surface, as signatures for the code generator.
    pub fn extend_registry(registry: &mut RuntimeRegistry) {
        let int = TypeKey::Int { bits: 64, signed: true };
        registry.register(
            "build_ast",
            RuntimeFn {
                params: vec![TypeKey::Str],
                variadic: false,
                ret: int.clone(),
            },
        );
        registry.register(
            "insert_ast",
            RuntimeFn {
                params: vec![int.clone(), int.clone()],
                variadic: false,
                ret: TypeKey::Void,
            },
        );
        registry.register(
            "find_element",
            RuntimeFn {
                params: vec![int.clone(), TypeKey::Str],
                variadic: false,
                ret: int.clone(),
            },
        );
        registry.register(
            "get_modifier",
            RuntimeFn {
                params: vec![int.clone(), TypeKey::Str],
                variadic: false,
                ret: int.clone(),
            },
        );
        registry.register(
            "process_statements",
            RuntimeFn {
                params: vec![int.clone()],
                variadic: false,
                ret: TypeKey::Void,
            },
        );
        registry.register(
            "current_scope",
            RuntimeFn {
                params: vec![],
                variadic: false,
                ret: int,
            },
        );
    }

    /// The callable surface, as native bindings for the JIT.
    pub fn install_builtins(self: &Rc<Self>, jit: &Jit) {
        let service = self.clone();
        jit.register_builtin(
            "build_ast",
            Rc::new(move |args: &[RtValue]| {
                let source = args
                    .first()
                    .ok_or_else(|| JitError("build_ast needs a source string".to_owned()))?
                    .as_str()?;
                Ok(RtValue::Int(service.build_ast(&source)))
            }),
        );
        let service = self.clone();
        jit.register_builtin(
            "insert_ast",
            Rc::new(move |args: &[RtValue]| {
                let parent = args
                    .first()
                    .ok_or_else(|| JitError("insert_ast needs a parent".to_owned()))?
                    .as_int()?;
                let child = args
                    .get(1)
                    .ok_or_else(|| JitError("insert_ast needs a child".to_owned()))?
                    .as_int()?;
                service.insert_ast(parent, child);
                Ok(RtValue::Void)
            }),
        );
        let service = self.clone();
        jit.register_builtin(
            "find_element",
            Rc::new(move |args: &[RtValue]| {
                let scope = args
                    .first()
                    .ok_or_else(|| JitError("find_element needs a scope".to_owned()))?
                    .as_int()?;
                let name = args
                    .get(1)
                    .ok_or_else(|| JitError("find_element needs a name".to_owned()))?
                    .as_str()?;
                Ok(RtValue::Int(service.find_element(scope, &name)))
            }),
        );
        let service = self.clone();
        jit.register_builtin(
            "get_modifier",
            Rc::new(move |args: &[RtValue]| {
                let node = args
                    .first()
                    .ok_or_else(|| JitError("get_modifier needs a node".to_owned()))?
                    .as_int()?;
                let name = args
                    .get(1)
                    .ok_or_else(|| JitError("get_modifier needs a name".to_owned()))?
                    .as_str()?;
                Ok(RtValue::Int(service.get_modifier(node, &name)))
            }),
        );
        let service = self.clone();
        jit.register_builtin(
            "process_statements",
            Rc::new(move |args: &[RtValue]| {
                let node = args
                    .first()
                    .ok_or_else(|| JitError("process_statements needs a node".to_owned()))?
                    .as_int()?;
                service.process_statements(node);
                Ok(RtValue::Void)
            }),
        );
        jit.register_builtin(
            "current_scope",
            Rc::new(|_args: &[RtValue]| Ok(RtValue::Int(CURRENT_SCOPE_HANDLE))),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{AstService, EditRequest, HandleExpr};

    #[test]
    fn test_requests_queue_and_drain() {
        let service = AstService::new();
        let built = service.build_ast("x := 1;");
        service.insert_ast(super::CURRENT_SCOPE_HANDLE, built);

        let requests = service.take_requests();
        assert_eq!(requests.len(), 1);
        let EditRequest::Insert { parent, child } = &requests[0] else {
            panic!("expected insert request");
        };
        assert_eq!(*parent, super::CURRENT_SCOPE_HANDLE);
        assert_eq!(*child, built);

        // Draining leaves the handle table intact.
        assert!(matches!(
            service.handle_expr(built),
            Some(HandleExpr::Built { .. })
        ));
        assert!(service.take_requests().is_empty());
    }
}
