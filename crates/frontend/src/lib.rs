//! C/C++ subset front-end
//!
//! Parses a single translation unit of scientific-style C/C++ into the
//! AST consumed by the hybridc analysis passes. This is deliberately not
//! a full C++ parser: it recognizes the subset the parallelizer can
//! reason about (functions, file-scope variables, the usual statement
//! forms, and ordinary expressions). Anything it cannot parse inside a
//! function body degrades to an opaque statement that still knows its
//! source span, so downstream analysis can reproduce it verbatim.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod source;

pub use ast::{
    AssignOp, BinOp, Block, Expr, ExprKind, FunctionDef, Initializer, Param, Stmt,
    TranslationUnit, UnaryOp, VarDecl,
};
pub use parser::Parser;
pub use source::{SourceFile, SourcePos, Span};

/// Parse a complete translation unit from source text.
///
/// Convenience wrapper used by the compiler pipeline and tests.
pub fn parse(source: &SourceFile) -> Result<TranslationUnit, String> {
    Parser::new(source).parse()
}
