//! The driver's standard library gateway: installs the `execute`
//! statement production and the console runtime functions. It is an
//! ordinary [LibraryGateway]; everything it adds can be removed again
//! by name.

use std::cell::Cell;
use std::error::Error;
use std::rc::Rc;

use quill::ast::NodeKind;
use quill::codegen::{RuntimeFn, TypeKey};
use quill::grammar::factory::STATEMENT_DIMENSION;
use quill::grammar::{GrammarValue, SymbolDefinition, Term};
use quill::parser::handlers::{CompletedProd, HandlerCtx, HandlerResult, ParsingHandler};
use quill::session::{LibraryGateway, Session};
use quill::target::{JitError, RtValue};

const EXECUTE_PROD: &str = "root.Script.ExecuteStmt";

/// Builds `execute { ... }` into an entry function the session runs
/// after constructors.
struct ExecuteHandler {
    counter: Cell<u32>,
}

impl ParsingHandler for ExecuteHandler {
    fn on_prod_end(&self, ctx: &mut HandlerCtx, level: &mut CompletedProd) -> HandlerResult {
        let body = level.children.iter().copied().find(|child| {
            matches!(ctx.ast.kind(*child), NodeKind::Block { .. })
        });
        let Some(body) = body else {
            return HandlerResult::Failed;
        };
        let index = self.counter.get();
        self.counter.set(index + 1);

        let ty = ctx.ast.add(
            NodeKind::FunctionType {
                args: vec![],
                ret: None,
                modifiers: vec![],
            },
            level.loc,
        );
        let function = ctx.ast.add(
            NodeKind::Function {
                ty,
                body: Some(body),
            },
            level.loc,
        );
        let def = ctx.ast.add(
            NodeKind::Definition {
                name: format!("__execute_{index}"),
                target: function,
                modifiers: vec![],
            },
            level.loc,
        );
        HandlerResult::Nodes(vec![def])
    }

    fn name(&self) -> &'static str {
        "execute"
    }
}

fn render(value: &RtValue) -> String {
    match value {
        RtValue::Void => String::new(),
        RtValue::Int(value) => value.to_string(),
        RtValue::Float(value) => value.to_string(),
        RtValue::Str(value) => (**value).clone(),
        RtValue::Null => "null".to_owned(),
        RtValue::Ptr(_) => "<ptr>".to_owned(),
    }
}

/// The console/runtime services shipped with the driver.
#[derive(Default)]
pub struct StandardLibrary;

impl LibraryGateway for StandardLibrary {
    fn initialize(&mut self, session: &Session) -> Result<(), Box<dyn Error>> {
        let mut repo = session.repo.borrow_mut();
        repo.add_module("root.Script")?;
        repo.set_value(
            EXECUTE_PROD,
            GrammarValue::Symbol(Rc::new(
                SymbolDefinition::new("ExecuteStmt")
                    .with_term(Term::concat(vec![
                        Term::constant("execute"),
                        Term::reference("root.Main.Block"),
                    ]))
                    .with_handler(Rc::new(ExecuteHandler {
                        counter: Cell::new(0),
                    })),
            )),
        )?;
        repo.hook_into_dimension(STATEMENT_DIMENSION, EXECUTE_PROD, 5)?;
        drop(repo);

        session.register_runtime(
            "println",
            RuntimeFn {
                params: vec![],
                variadic: true,
                ret: TypeKey::Void,
            },
            Rc::new(|args: &[RtValue]| {
                let line: Vec<String> = args.iter().map(render).collect();
                println!("{}", line.join(" "));
                Ok(RtValue::Void)
            }),
        );
        session.register_runtime(
            "print",
            RuntimeFn {
                params: vec![],
                variadic: true,
                ret: TypeKey::Void,
            },
            Rc::new(|args: &[RtValue]| {
                let parts: Vec<String> = args.iter().map(render).collect();
                print!("{}", parts.join(" "));
                use std::io::Write;
                std::io::stdout().flush().ok();
                Ok(RtValue::Void)
            }),
        );
        session.register_runtime(
            "read_int",
            RuntimeFn {
                params: vec![],
                variadic: false,
                ret: TypeKey::Int { bits: 64, signed: true },
            },
            Rc::new(|_args: &[RtValue]| {
                let mut line = String::new();
                std::io::stdin()
                    .read_line(&mut line)
                    .map_err(|e| JitError(e.to_string()))?;
                line.trim()
                    .parse::<i64>()
                    .map(RtValue::Int)
                    .map_err(|e| JitError(format!("read_int: {e}")))
            }),
        );
        Ok(())
    }

    fn uninitialize(&mut self, session: &Session) -> Result<(), Box<dyn Error>> {
        let mut repo = session.repo.borrow_mut();
        repo.unhook_from_dimension(STATEMENT_DIMENSION, EXECUTE_PROD)?;
        repo.remove_value(EXECUTE_PROD)?;
        repo.remove_value("root.Script")?;
        drop(repo);
        session.unregister_runtime("println");
        session.unregister_runtime("print");
        session.unregister_runtime("read_int");
        Ok(())
    }
}
