//! The AST processor: the fixed-point rewriter that runs before any
//! code generation. It expands macro invocations, executes preprocess
//! blocks in a temporary JIT module and folds their queued edits back
//! into the tree, folds `eval` expressions to their computed values,
//! and leaves the subtree stable so a second run changes nothing.
mod service;
mod templates;

pub use self::service::*;
pub use self::templates::*;

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, trace};

use crate::ast::{Ast, NodeId, NodeKind};
use crate::basic::{IdentTable, SourceLocation};
use crate::codegen::{Generator, RuntimeRegistry};
use crate::grammar::GrammarRepository;
use crate::notices::{Notice, NoticeCode, NoticeStore, Severity};
use crate::seeker;
use crate::target::{IrBackend, Jit, RtValue, TargetGenerator};

// Total expansions allowed per processing run; a macro expanding into
// itself trips this instead of diverging.
const MAX_EXPANSIONS: usize = 256;
// Fixed-point passes before the processor gives up.
const MAX_PASSES: usize = 64;

/// Parses a source snippet produced by preprocess-time `build_ast`
/// into the session's arena. Implemented by the session.
pub trait SnippetParser {
    fn parse(
        &self,
        source: &str,
        ast: &mut Ast,
        idents: &mut IdentTable,
        notices: &mut NoticeStore,
        repo: &mut GrammarRepository,
    ) -> Result<NodeId, String>;
}

/// Installs the host's native runtime bindings into a preprocess JIT.
/// Implemented by the session (library gateways register there).
pub trait BuiltinInstaller {
    fn install(&self, jit: &Jit);
}

pub struct Processor<'a> {
    pub ast: &'a mut Ast,
    pub idents: &'a mut IdentTable,
    pub notices: &'a mut NoticeStore,
    pub repo: &'a mut GrammarRepository,
    pub templates: &'a mut TemplateCache,
    pub runtime: &'a RuntimeRegistry,
    pub service: Rc<AstService>,
    pub snippets: &'a dyn SnippetParser,
    pub builtins: &'a dyn BuiltinInstaller,
    pub cancel: &'a Cell<bool>,
    expansions: usize,
    preprocess_counter: u32,
}

impl<'a> Processor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ast: &'a mut Ast,
        idents: &'a mut IdentTable,
        notices: &'a mut NoticeStore,
        repo: &'a mut GrammarRepository,
        templates: &'a mut TemplateCache,
        runtime: &'a RuntimeRegistry,
        service: Rc<AstService>,
        snippets: &'a dyn SnippetParser,
        builtins: &'a dyn BuiltinInstaller,
        cancel: &'a Cell<bool>,
    ) -> Self {
        Self {
            ast,
            idents,
            notices,
            repo,
            templates,
            runtime,
            service,
            snippets,
            builtins,
            cancel,
            expansions: 0,
            preprocess_counter: 0,
        }
    }

    /// Rewrite `root` to fixed point. The subtree is ready for code
    /// generation afterwards; running the processor again on it makes
    /// no changes.
    pub fn process(&mut self, root: NodeId) -> Result<(), ()> {
        for pass in 0..MAX_PASSES {
            if self.cancel.get() {
                return Ok(());
            }
            let mut changed = false;
            changed |= self.expand_macros(root)?;
            changed |= self.run_preprocess_blocks(root)?;
            changed |= self.fold_evals(root)?;
            if !changed {
                trace!("processor: stable after {} pass(es)", pass + 1);
                return Ok(());
            }
        }
        self.notices.add(Notice::new(
            NoticeCode::InfiniteExpansion,
            self.ast.loc(root),
            "preprocessing did not reach a fixed point",
        ));
        Err(())
    }

    // ---- macro expansion ----

    fn expand_macros(&mut self, root: NodeId) -> Result<bool, ()> {
        let mut sites = vec![];
        self.collect_macro_sites(root, &mut sites);
        let mut changed = false;
        for site in sites {
            changed |= self.expand_macro_site(site)?;
        }
        Ok(changed)
    }

    fn collect_macro_sites(&self, node: NodeId, out: &mut Vec<NodeId>) {
        // Definition bodies of macros and templates stay pristine;
        // their contents rewrite only in expanded copies.
        if matches!(
            self.ast.kind(node),
            NodeKind::Macro { .. } | NodeKind::Template { .. }
        ) {
            return;
        }
        for child in self.ast.children(node) {
            self.collect_macro_sites(child, out);
        }
        if let NodeKind::ParamPass {
            callee,
            bracket: crate::ast::Bracket::Round,
            ..
        } = self.ast.kind(node)
        {
            let candidates = seeker::seek_callee(self.ast, node, *callee);
            let is_macro = candidates.iter().any(|candidate| {
                let target = seeker::definition_target(self.ast, *candidate);
                matches!(self.ast.kind(target), NodeKind::Macro { .. })
            });
            if is_macro {
                out.push(node);
            }
        }
    }

    fn expand_macro_site(&mut self, site: NodeId) -> Result<bool, ()> {
        let loc = self.ast.loc(site);
        if self.expansions >= MAX_EXPANSIONS {
            self.notices.add(Notice::new(
                NoticeCode::InfiniteExpansion,
                loc,
                "macro expansion limit reached",
            ));
            return Err(());
        }
        let NodeKind::ParamPass { callee, args, .. } = self.ast.kind(site).clone() else {
            return Ok(false);
        };
        let candidates = seeker::seek_callee(self.ast, site, callee);
        let macro_node = candidates.iter().find_map(|candidate| {
            let target = seeker::definition_target(self.ast, *candidate);
            matches!(self.ast.kind(target), NodeKind::Macro { .. }).then_some(target)
        });
        let Some(macro_node) = macro_node else {
            return Ok(false);
        };
        let NodeKind::Macro { params, body } = self.ast.kind(macro_node).clone() else {
            return Ok(false);
        };
        if params.len() != args.len() {
            self.notices.add(Notice::new(
                NoticeCode::NoMatchingCallee,
                loc,
                format!(
                    "macro expects {} argument(s), got {}",
                    params.len(),
                    args.len()
                ),
            ));
            return Ok(false);
        }

        let mut substitutions = HashMap::new();
        for (param, arg) in params.iter().zip(args.iter()) {
            substitutions.insert(param.clone(), *arg);
        }
        let expansion = self.ast.deep_clone(body, &substitutions);
        self.expansions += 1;

        let Some(parent) = self.ast.parent(site) else {
            return Ok(false);
        };
        let replaced = self.ast.replace_child(parent, site, expansion);
        if replaced {
            // Identifier resolution is re-performed in the expanded
            // context; the clone hangs where the call site was.
            debug!("processor: expanded macro call");
        }
        Ok(replaced)
    }

    // ---- preprocess blocks ----

    fn run_preprocess_blocks(&mut self, root: NodeId) -> Result<bool, ()> {
        let mut sites = vec![];
        self.collect_kind(root, &mut sites, |kind| {
            matches!(kind, NodeKind::Preprocess { .. })
        });
        let mut changed = false;
        for site in sites {
            changed |= self.run_preprocess_block(site)?;
        }
        Ok(changed)
    }

    fn collect_kind(
        &self,
        node: NodeId,
        out: &mut Vec<NodeId>,
        pred: fn(&NodeKind) -> bool,
    ) {
        if matches!(
            self.ast.kind(node),
            NodeKind::Macro { .. } | NodeKind::Template { .. }
        ) {
            return;
        }
        for child in self.ast.children(node) {
            self.collect_kind(child, out, pred);
        }
        if pred(self.ast.kind(node)) {
            out.push(node);
        }
    }

    fn run_preprocess_block(&mut self, site: NodeId) -> Result<bool, ()> {
        let loc = self.ast.loc(site);
        let NodeKind::Preprocess { body } = self.ast.kind(site).clone() else {
            return Ok(false);
        };
        let Some(scope) = self.ast.parent(site) else {
            return Ok(false);
        };
        debug!("processor: running preprocess block at line {}", loc.line);

        let name = format!("__preprocess_{}", self.preprocess_counter);
        self.preprocess_counter += 1;

        // Compile the block into its own temporary module.
        let mut registry = self.runtime.clone();
        AstService::extend_registry(&mut registry);
        let mut backend = IrBackend::new(&name);
        {
            let mut generator = Generator::new(
                self.ast,
                self.notices,
                &mut backend,
                self.templates,
                &registry,
                self.cancel,
            );
            if generator.generate_entry_fn(&name, body, Some(scope)).is_err() {
                self.erase_statement(scope, site);
                return Ok(true);
            }
        }
        if let Err(e) = backend.finalize_module() {
            self.notices.add(Notice::new(
                NoticeCode::PreprocessExecutionFailed,
                loc,
                e.to_string(),
            ));
            self.erase_statement(scope, site);
            return Ok(true);
        }

        // Execute it.
        let jit = Jit::new(backend.take_module());
        self.builtins.install(&jit);
        self.service.install_builtins(&jit);
        match jit.call(&name, &[]) {
            Ok(_) => {}
            Err(e) => {
                self.notices.add(Notice::new(
                    NoticeCode::PreprocessExecutionFailed,
                    loc,
                    format!("preprocess block failed: {e}"),
                ));
            }
        }

        // Observe its edits, then erase the block itself.
        self.drain_requests(scope);
        self.erase_statement(scope, site);
        Ok(true)
    }

    fn erase_statement(&mut self, scope: NodeId, statement: NodeId) {
        if !self.ast.remove_from_parent(scope, statement) {
            trace!("processor: statement already detached");
        }
    }

    /// Drain the AST-manager queue: resolve handles and apply the
    /// edits. Requests naming nodes that no longer resolve are dropped
    /// with a note.
    fn drain_requests(&mut self, current_scope: NodeId) {
        for request in self.service.take_requests() {
            match request {
                EditRequest::Insert { parent, child } => {
                    let parent_node = self.resolve_handle(parent, current_scope);
                    let child_node = self.resolve_handle(child, current_scope);
                    match (parent_node, child_node) {
                        (Some(parent_node), Some(child_node)) => {
                            self.insert_into(parent_node, child_node);
                        }
                        _ => {
                            self.notices.add(
                                Notice::new(
                                    NoticeCode::PreprocessExecutionFailed,
                                    self.ast.loc(current_scope),
                                    "dropped an AST edit whose target no longer exists",
                                )
                                .with_severity(Severity::Note),
                            );
                        }
                    }
                }
                EditRequest::ProcessStatements { node } => {
                    if let Some(node) = self.resolve_handle(node, current_scope) {
                        let _ = self.process(node);
                    }
                }
            }
        }
    }

    fn insert_into(&mut self, parent: NodeId, child: NodeId) {
        // Splice a built scope's statements rather than nesting it.
        if let NodeKind::Scope { statements } = self.ast.kind(child).clone() {
            if self.ast.parent(child).is_none() {
                for statement in statements {
                    self.ast.append_to(parent, statement);
                }
                return;
            }
        }
        self.ast.append_to(parent, child);
    }

    fn resolve_handle(&mut self, handle: i64, current_scope: NodeId) -> Option<NodeId> {
        if let Some(resolved) = self.service.resolved(handle) {
            return Some(resolved);
        }
        let expr = self.service.handle_expr(handle)?;
        let resolved = match expr {
            HandleExpr::CurrentScope => Some(current_scope),
            HandleExpr::Built { source } => {
                match self.snippets.parse(
                    &source,
                    self.ast,
                    self.idents,
                    self.notices,
                    self.repo,
                ) {
                    Ok(node) => Some(node),
                    Err(message) => {
                        self.notices.add(Notice::new(
                            NoticeCode::PreprocessExecutionFailed,
                            self.ast.loc(current_scope),
                            format!("build_ast failed: {message}"),
                        ));
                        None
                    }
                }
            }
            HandleExpr::Found { scope, name } => {
                let scope_node = self.resolve_handle(scope, current_scope)?;
                seeker::seek(self.ast, scope_node, &name).into_iter().next()
            }
            HandleExpr::Modifier { node, name } => {
                let base = self.resolve_handle(node, current_scope)?;
                let NodeKind::Definition { modifiers, .. } = self.ast.kind(base) else {
                    return None;
                };
                modifiers
                    .clone()
                    .into_iter()
                    .find(|modifier| {
                        matches!(
                            self.ast.kind(*modifier),
                            NodeKind::Identifier { name: modifier_name }
                                if *modifier_name == name
                        )
                    })
            }
        };
        if let Some(node) = resolved {
            self.service.remember_resolution(handle, node);
        }
        resolved
    }

    // ---- eval folding ----

    fn fold_evals(&mut self, root: NodeId) -> Result<bool, ()> {
        let mut sites = vec![];
        self.collect_kind(root, &mut sites, |kind| matches!(kind, NodeKind::Eval { .. }));
        let mut changed = false;
        for site in sites {
            changed |= self.fold_eval(site);
        }
        Ok(changed)
    }

    /// Compile and run an `eval` expression now; the computed value
    /// replaces the node in the tree.
    fn fold_eval(&mut self, site: NodeId) -> bool {
        let loc = self.ast.loc(site);
        let NodeKind::Eval { expr } = self.ast.kind(site).clone() else {
            return false;
        };
        let Some(parent) = self.ast.parent(site) else {
            return false;
        };

        let name = format!("__eval_{}", self.preprocess_counter);
        self.preprocess_counter += 1;

        let ret = self.ast.add(NodeKind::Return { value: Some(expr) }, loc);
        let block = self.ast.add(
            NodeKind::Block {
                statements: vec![ret],
            },
            loc,
        );

        let mut registry = self.runtime.clone();
        AstService::extend_registry(&mut registry);
        let mut backend = IrBackend::new(&name);
        {
            let mut generator = Generator::new(
                self.ast,
                self.notices,
                &mut backend,
                self.templates,
                &registry,
                self.cancel,
            );
            if generator.generate_entry_fn(&name, block, Some(parent)).is_err() {
                self.erase_statement(parent, site);
                return true;
            }
        }
        if backend.finalize_module().is_err() {
            self.erase_statement(parent, site);
            return true;
        }
        let jit = Jit::new(backend.take_module());
        self.builtins.install(&jit);
        self.service.install_builtins(&jit);

        match jit.call(&name, &[]) {
            Ok(RtValue::Int(value)) => {
                let literal = self.ast.add(
                    NodeKind::IntegerLiteral {
                        value,
                        width: 64,
                        signed: true,
                    },
                    loc,
                );
                self.ast.replace_child(parent, site, literal)
            }
            Ok(RtValue::Float(value)) => {
                let literal = self
                    .ast
                    .add(NodeKind::FloatLiteral { value, width: 64 }, loc);
                self.ast.replace_child(parent, site, literal)
            }
            Ok(RtValue::Str(value)) => {
                let literal = self.ast.add(
                    NodeKind::StringLiteral {
                        value: (*value).clone(),
                    },
                    loc,
                );
                self.ast.replace_child(parent, site, literal)
            }
            Ok(_) => {
                self.erase_statement(parent, site);
                true
            }
            Err(e) => {
                self.notices.add(Notice::new(
                    NoticeCode::PreprocessExecutionFailed,
                    loc,
                    format!("eval failed: {e}"),
                ));
                self.erase_statement(parent, site);
                true
            }
        }
    }
}
