//! The session: the explicit owner of every process-wide store (the
//! identifier table, the grammar repository, the AST arena, notices,
//! template cache, runtime registry) with documented init and
//! teardown. All pipeline stages run through it, single-threaded and
//! cooperative, and poll its cancellation flag at their suspension
//! points.
mod gateway;

pub use self::gateway::*;

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, info};

use crate::ast::{Ast, NodeId, NodeKind};
use crate::basic::{IdentTable, SourceLocation, SourceMap, TypeRegistry};
use crate::codegen::{Generator, RuntimeFn, RuntimeRegistry};
use crate::grammar::factory::{self, LEXER_MODULE, START_PROD};
use crate::grammar::GrammarRepository;
use crate::lexer::{CharInStream, Lexer};
use crate::notices::NoticeStore;
use crate::parser::handlers::{HandlerCtx, ImportLoader, NoImports};
use crate::parser::{ParseCtx, Parser};
use crate::processor::{AstService, BuiltinInstaller, Processor, SnippetParser, TemplateCache};
use crate::seeker;
use crate::target::{Builtin, IrBackend, IrModule, Jit, TargetGenerator};

/// One compilation/execution session. Created per program run; nothing
/// here is process-global.
pub struct Session {
    pub idents: RefCell<IdentTable>,
    /// Class descriptors for extensible object kinds; gateways register
    /// their own classes here and test derivation instead of
    /// downcasting.
    pub types: RefCell<TypeRegistry>,
    pub sources: RefCell<SourceMap>,
    pub repo: RefCell<GrammarRepository>,
    pub ast: RefCell<Ast>,
    pub notices: RefCell<NoticeStore>,
    pub templates: RefCell<TemplateCache>,
    pub runtime: RefCell<RuntimeRegistry>,
    pub builtins: RefCell<HashMap<String, Builtin>>,
    pub service: Rc<AstService>,
    pub cancel: Cell<bool>,

    import_stack: RefCell<Vec<PathBuf>>,
    loaded_imports: RefCell<HashSet<PathBuf>>,
    import_dirs: RefCell<Vec<PathBuf>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A session with the standard grammar installed.
    pub fn new() -> Self {
        let mut repo = GrammarRepository::new();
        factory::build_standard_grammar(&mut repo)
            .expect("the standard grammar installs into an empty repository");

        let mut types = TypeRegistry::new();
        let value = types.register("GrammarValue", None);
        for kind in ["Module", "Symbol", "CharGroup", "Dimension"] {
            types.register(kind, Some(value));
        }
        let containing = types.register_interface("Containing");
        let module = types.lookup("Module").unwrap();
        types.declare_interface(module, containing);

        Self {
            idents: RefCell::new(IdentTable::new()),
            types: RefCell::new(types),
            sources: RefCell::new(SourceMap::new()),
            repo: RefCell::new(repo),
            ast: RefCell::new(Ast::new()),
            notices: RefCell::new(NoticeStore::new()),
            templates: RefCell::new(TemplateCache::new()),
            runtime: RefCell::new(RuntimeRegistry::new()),
            builtins: RefCell::new(HashMap::new()),
            service: AstService::new(),
            cancel: Cell::new(false),
            import_stack: RefCell::new(vec![]),
            loaded_imports: RefCell::new(HashSet::new()),
            import_dirs: RefCell::new(vec![]),
        }
    }

    /// Ask every stage to stop at its next suspension point. Notices
    /// collected so far are preserved.
    pub fn cancel_build(&self) {
        self.cancel.set(true);
    }

    /// Register a runtime function: its signature for the code
    /// generator and its native binding for the JIT.
    pub fn register_runtime(&self, name: &str, signature: RuntimeFn, builtin: Builtin) {
        self.runtime.borrow_mut().register(name, signature);
        self.builtins.borrow_mut().insert(name.to_owned(), builtin);
    }

    pub fn unregister_runtime(&self, name: &str) {
        self.runtime.borrow_mut().remove(name);
        self.builtins.borrow_mut().remove(name);
    }

    /// Load a library gateway (plug-in).
    pub fn load_gateway(&self, gateway: &mut dyn LibraryGateway) -> Result<(), Box<dyn Error>> {
        gateway.initialize(self)
    }

    pub fn unload_gateway(&self, gateway: &mut dyn LibraryGateway) -> Result<(), Box<dyn Error>> {
        gateway.uninitialize(self)
    }

    // ---- pipeline ----

    /// Lex only; used by `--dump-tokens`.
    pub fn tokenize_source(&self, name: &str, text: &str) -> Vec<crate::lexer::Token> {
        let source_id = self.sources.borrow_mut().register(name);
        let mut idents = self.idents.borrow_mut();
        let mut notices = self.notices.borrow_mut();
        let repo = self.repo.borrow();
        let mut lexer = Lexer::new(LEXER_MODULE);
        lexer
            .tokenize_str(&repo, &mut idents, &mut notices, source_id, text)
            .unwrap_or_default()
    }

    /// Lex and parse one source, returning the root scope node.
    pub fn parse_source(&self, name: &str, text: &str) -> Option<NodeId> {
        // The entry file takes part in import cycle detection.
        let entry_path = Path::new(name).canonicalize().ok();
        if let Some(path) = &entry_path {
            self.import_stack.borrow_mut().push(path.clone());
        }
        let result = self.parse_source_inner(name, text);
        if entry_path.is_some() {
            self.import_stack.borrow_mut().pop();
        }
        result
    }

    fn parse_source_inner(&self, name: &str, text: &str) -> Option<NodeId> {
        let source_id = self.sources.borrow_mut().register(name);
        let mut idents = self.idents.borrow_mut();
        let mut notices = self.notices.borrow_mut();
        let mut repo = self.repo.borrow_mut();
        let mut ast = self.ast.borrow_mut();

        let mut lexer = Lexer::new(LEXER_MODULE);
        let tokens = match lexer.tokenize_str(&repo, &mut idents, &mut notices, source_id, text) {
            Ok(tokens) => tokens,
            Err(e) => {
                notices.add(crate::notices::Notice::new(
                    crate::notices::NoticeCode::SyntaxError,
                    SourceLocation::point(source_id.0, 1, 1),
                    e.to_string(),
                ));
                return None;
            }
        };
        debug!("session: parsing `{name}` ({} tokens)", tokens.len());

        let loader = SessionLoader { session: self };
        let mut parser = Parser::new(START_PROD);
        parser
            .parse(
                &tokens,
                &mut ParseCtx {
                    ast: &mut ast,
                    idents: &mut idents,
                    notices: &mut notices,
                    repo: &mut repo,
                    loader: &loader,
                    cancel: &self.cancel,
                },
            )
            .ok()
            .flatten()
    }

    /// Read a whole interactive stream (prompting per line), then
    /// parse it.
    pub fn parse_stream(&self, name: &str, stream: &mut dyn CharInStream) -> Option<NodeId> {
        let mut text = String::new();
        while let Some(ch) = stream.get() {
            text.push(ch);
        }
        self.parse_source(name, &text)
    }

    /// Run the AST processor to fixed point on `root`.
    pub fn process_ast(&self, root: NodeId) {
        let mut idents = self.idents.borrow_mut();
        let mut notices = self.notices.borrow_mut();
        let mut repo = self.repo.borrow_mut();
        let mut ast = self.ast.borrow_mut();
        let mut templates = self.templates.borrow_mut();
        let runtime = self.runtime.borrow();
        let snippets = SessionSnippets;
        let installer = SessionBuiltins { session: self };

        let mut processor = Processor::new(
            &mut ast,
            &mut idents,
            &mut notices,
            &mut repo,
            &mut templates,
            &runtime,
            self.service.clone(),
            &snippets,
            &installer,
            &self.cancel,
        );
        let _ = processor.process(root);
    }

    /// Generate target code for the processed tree and finalize the
    /// module. Root-level imperative statements are collected into a
    /// synthetic entry the runner invokes first.
    pub fn generate(&self, root: NodeId, module_name: &str) -> Option<IrModule> {
        let mut ast = self.ast.borrow_mut();
        let mut notices = self.notices.borrow_mut();
        let mut templates = self.templates.borrow_mut();
        let runtime = self.runtime.borrow();
        let mut backend = IrBackend::new(module_name);

        {
            let mut generator = Generator::new(
                &mut ast,
                &mut notices,
                &mut backend,
                &mut templates,
                &runtime,
                &self.cancel,
            );
            if generator.generate_root(root).is_err() {
                return None;
            }

            // Top-level imperative statements run before `main`.
            let imperative: Vec<NodeId> = generator
                .ast
                .children(root)
                .into_iter()
                .filter(|statement| {
                    !matches!(
                        generator.ast.kind(*statement),
                        NodeKind::Definition { .. }
                            | NodeKind::Use { .. }
                            | NodeKind::Alias { .. }
                            | NodeKind::Bridge { .. }
                    )
                })
                .collect();
            if !imperative.is_empty() {
                let loc = generator.ast.loc(root);
                let block = generator.ast.add(
                    NodeKind::Block {
                        statements: imperative,
                    },
                    loc,
                );
                generator.ast.set_parent(block, Some(root));
                let _ = generator.generate_entry_fn("__root_statements", block, Some(root));
            }
        }

        match backend.finalize_module() {
            Ok(()) => Some(backend.take_module()),
            Err(e) => {
                notices.add(crate::notices::Notice::new(
                    crate::notices::NoticeCode::TargetBackendFailure,
                    SourceLocation::default(),
                    e.to_string(),
                ));
                None
            }
        }
    }

    /// Execute a finalized module: constructors, root statements,
    /// `execute` entries, `main`, then destructors.
    pub fn run_module(&self, module: IrModule) -> i32 {
        let jit = Jit::new(module);
        SessionBuiltins { session: self }.install(&jit);

        if let Err(e) = jit.run_ctors() {
            eprintln!("runtime error: {e}");
            return 1;
        }

        let mut entries: Vec<(u32, String)> = jit
            .module()
            .functions
            .iter()
            .filter_map(|func| {
                let suffix = func.name.strip_prefix("__execute_")?;
                suffix.parse::<u32>().ok().map(|n| (n, func.name.clone()))
            })
            .collect();
        entries.sort();

        let mut run_one = |name: &str| -> bool {
            match jit.call(name, &[]) {
                Ok(_) => true,
                Err(e) => {
                    eprintln!("runtime error in `{name}`: {e}");
                    false
                }
            }
        };

        let mut ok = true;
        if jit.lookup("__root_statements") {
            ok &= run_one("__root_statements");
        }
        for (_, name) in &entries {
            ok &= run_one(name);
        }
        if jit.lookup("main") {
            ok &= run_one("main");
        }

        if let Err(e) = jit.run_dtors() {
            eprintln!("runtime error: {e}");
            ok = false;
        }
        if ok {
            0
        } else {
            1
        }
    }

    /// The whole pipeline over one source text. Returns the process
    /// exit code: nonzero when an error notice was committed or the
    /// program failed at runtime.
    pub fn run_source(&self, name: &str, text: &str) -> i32 {
        let exit = match self.parse_source(name, text) {
            Some(root) => {
                self.process_ast(root);
                match self.generate(root, name) {
                    // A failed build is reported, not run.
                    Some(_) if self.notices.borrow().has_errors() => 1,
                    Some(module) => self.run_module(module),
                    None => 1,
                }
            }
            None => 1,
        };
        if self.notices.borrow().has_errors() {
            return exit.max(1);
        }
        exit
    }

    /// Compile one source text to a module image on disk.
    pub fn build_source(&self, name: &str, text: &str, out: &Path) -> i32 {
        let result = match self.parse_source(name, text) {
            Some(root) => {
                self.process_ast(root);
                match self.generate(root, name) {
                    Some(module) => crate::target::write_module_file(&module, out)
                        .map_err(|e| e.to_string()),
                    None => Err("generation failed".to_owned()),
                }
            }
            None => Err("parse failed".to_owned()),
        };
        match result {
            Ok(()) if !self.notices.borrow().has_errors() => 0,
            Ok(()) => 1,
            Err(e) => {
                eprintln!("build error: {e}");
                1
            }
        }
    }

    /// Print all committed notices in source order.
    pub fn print_notices(&self) {
        let sources = self.sources.borrow();
        for notice in self.notices.borrow().notices() {
            eprintln!("{}", notice.render_colored(&sources));
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.notices.borrow().has_errors() {
            1
        } else {
            0
        }
    }

    /// Base directory for resolving relative imports of the given
    /// entry file.
    pub fn set_base_dir(&self, dir: &Path) {
        self.import_dirs.borrow_mut().push(dir.to_path_buf());
    }
}

/// Resolves `import` statements by parsing the referenced file in a
/// child run sharing the session's stores. Cycles and repeated loads
/// are detected on canonical paths.
struct SessionLoader<'s> {
    session: &'s Session,
}

impl<'s> ImportLoader for SessionLoader<'s> {
    fn load(
        &self,
        path: &str,
        includer: SourceLocation,
        ctx: &mut HandlerCtx,
    ) -> Result<Vec<NodeId>, String> {
        let base = self
            .session
            .import_dirs
            .borrow()
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."));
        let full = base.join(path);
        let canonical = full
            .canonicalize()
            .map_err(|e| format!("cannot open `{}`: {e}", full.display()))?;

        if self.session.import_stack.borrow().contains(&canonical) {
            return Err(format!(
                "import cycle detected through `{}`",
                canonical.display()
            ));
        }
        if self.session.loaded_imports.borrow().contains(&canonical) {
            // Already spliced elsewhere; importing again is a no-op.
            return Ok(vec![]);
        }

        let text = std::fs::read_to_string(&canonical)
            .map_err(|e| format!("cannot read `{}`: {e}", canonical.display()))?;
        let source_id = self
            .session
            .sources
            .borrow_mut()
            .register(&canonical.display().to_string());
        info!("importing `{}`", canonical.display());

        self.session.import_stack.borrow_mut().push(canonical.clone());
        self.session
            .import_dirs
            .borrow_mut()
            .push(canonical.parent().unwrap_or(&base).to_path_buf());

        let result = (|| {
            let mut lexer = Lexer::new(LEXER_MODULE);
            let tokens = lexer
                .tokenize_str(&*ctx.repo, ctx.idents, ctx.notices, source_id, &text)
                .map_err(|e| e.to_string())?;
            let mut parser = Parser::new(START_PROD);
            let root = parser
                .parse(
                    &tokens,
                    &mut ParseCtx {
                        ast: &mut *ctx.ast,
                        idents: &mut *ctx.idents,
                        notices: &mut *ctx.notices,
                        repo: &mut *ctx.repo,
                        loader: self,
                        cancel: &self.session.cancel,
                    },
                )
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("`{}` did not parse", canonical.display()))?;
            Ok::<NodeId, String>(root)
        })();

        self.session.import_stack.borrow_mut().pop();
        self.session.import_dirs.borrow_mut().pop();

        let root = match result {
            Ok(root) => root,
            Err(mut message) => {
                if includer.line > 0 {
                    message = format!("{message} (imported here)");
                }
                return Err(message);
            }
        };
        self.session.loaded_imports.borrow_mut().insert(canonical);
        Ok(ctx.ast.children(root))
    }
}

/// Parses `build_ast` snippets against the standard start production,
/// without import support.
struct SessionSnippets;

impl SnippetParser for SessionSnippets {
    fn parse(
        &self,
        source: &str,
        ast: &mut Ast,
        idents: &mut IdentTable,
        notices: &mut NoticeStore,
        repo: &mut GrammarRepository,
    ) -> Result<NodeId, String> {
        let mut lexer = Lexer::new(LEXER_MODULE);
        let tokens = lexer
            .tokenize_str(repo, idents, notices, crate::basic::SourceId(u32::MAX), source)
            .map_err(|e| e.to_string())?;
        let mut parser = Parser::new(START_PROD);
        let cancel = Cell::new(false);
        parser
            .parse(
                &tokens,
                &mut ParseCtx {
                    ast,
                    idents,
                    notices,
                    repo,
                    loader: &NoImports,
                    cancel: &cancel,
                },
            )
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "snippet did not parse".to_owned())
    }
}

/// Installs the session's registered native bindings into a JIT.
struct SessionBuiltins<'s> {
    session: &'s Session,
}

impl<'s> BuiltinInstaller for SessionBuiltins<'s> {
    fn install(&self, jit: &Jit) {
        for (name, builtin) in self.session.builtins.borrow().iter() {
            jit.register_builtin(name, builtin.clone());
        }
    }
}

/// Convenience lookup over a parsed tree (used by tests and tools).
pub fn find_definition(ast: &Ast, root: NodeId, name: &str) -> Option<NodeId> {
    seeker::seek(ast, root, name).into_iter().next()
}
