//! Quill is a compiler toolchain whose grammar is ordinary runtime data:
//! token definitions, character groups, and productions live in a mutable
//! repository that user code may extend while parsing is in progress. A
//! branching parser executes that data speculatively, parsing handlers
//! build the AST, and the code generator drives an abstract target
//! generator with an in-memory JIT that also powers compile-time
//! (preprocess) evaluation.

pub mod ast;
pub mod basic;
pub mod codegen;
pub mod grammar;
pub mod lexer;
pub mod notices;
pub mod parser;
pub mod processor;
pub mod seeker;
pub mod session;
pub mod target;
