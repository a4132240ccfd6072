//! # Quill
//!
//! The driver binary: loads the standard library gateway, opens a
//! source file or the interactive stream, and drives the session
//! through lex, parse, process, and generate before either running the
//! program in the JIT or writing a module image.

mod cli;
mod stdlib;

use std::error::Error;
use std::fs;

use cli::{Cli, Commands};
use log::error;

use quill::lexer::InteractiveCharInStream;
use quill::session::Session;
use stdlib::StandardLibrary;

fn main() {
    let args = Cli::init();
    simple_logger::init_with_level((&args.verbosity).into()).unwrap();

    let code = match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            1
        }
    };
    std::process::exit(code);
}

fn run(args: Cli) -> Result<i32, Box<dyn Error>> {
    let session = Session::new();
    let mut std_lib = StandardLibrary;
    session.load_gateway(&mut std_lib)?;

    let code = match args.command {
        Commands::Run(run_args) => {
            let file = fs::canonicalize(&run_args.file)?;
            let text = fs::read_to_string(&file)?;
            if let Some(dir) = file.parent() {
                session.set_base_dir(dir);
            }
            let name = file.display().to_string();

            if run_args.dump_tokens {
                let idents = &session.idents;
                for token in session.tokenize_source(&name, &text) {
                    println!(
                        "{}:{}\t{}\t{:?}",
                        token.loc.line,
                        token.loc.column,
                        idents.borrow().resolve(token.kind),
                        token.text
                    );
                }
                session.print_notices();
                return Ok(session.exit_code());
            }

            match session.parse_source(&name, &text) {
                Some(root) => {
                    if run_args.dump_ast {
                        let ast = session.ast.borrow();
                        println!("{}", serde_json::to_string_pretty(&ast.dump(root))?);
                    }
                    session.process_ast(root);
                    match session.generate(root, &name) {
                        // A failed build is reported, not run.
                        Some(_) if session.exit_code() != 0 => 1,
                        Some(module) => session.run_module(module),
                        None => 1,
                    }
                }
                None => 1,
            }
        }
        Commands::Build(build_args) => {
            let file = fs::canonicalize(&build_args.file)?;
            let text = fs::read_to_string(&file)?;
            if let Some(dir) = file.parent() {
                session.set_base_dir(dir);
            }
            session.build_source(&file.display().to_string(), &text, &build_args.output)
        }
        Commands::Repl => {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            let mut stream = InteractiveCharInStream::new(stdin.lock(), stdout);
            match session.parse_stream("<interactive>", &mut stream) {
                Some(root) => {
                    session.process_ast(root);
                    match session.generate(root, "<interactive>") {
                        Some(_) if session.exit_code() != 0 => 1,
                        Some(module) => session.run_module(module),
                        None => 1,
                    }
                }
                None => 1,
            }
        }
    };

    session.print_notices();
    Ok(code.max(session.exit_code()))
}
