pub mod analyzer;
pub mod ast;
pub mod bytecode;
pub mod dispatch;
pub mod effects;
pub mod error;
pub mod eval;
pub mod functions;
pub mod heap;
pub mod lexer;
pub mod output;
pub mod parser;
pub mod pkgconf;
pub mod run_cmd;
pub mod serial;
pub mod token;
pub mod value;
pub mod vm;
pub mod workspace;
