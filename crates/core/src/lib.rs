pub mod ast;
pub mod config;
pub mod diag;
pub mod driver;
pub mod error;
pub mod expand;
pub mod grammar;
pub mod lexer;
pub mod listing;
pub mod loader;
pub mod parser;
pub mod span;

pub use config::{CompilerConfig, load_config};
pub use driver::{
    CompileError, CompileOutput, CompileRenderOptions, Program, compile, compile_with_fs,
    compile_with_options, load_program,
};
pub use error::HuffError;
pub use span::SourceLocation;
