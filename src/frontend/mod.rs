//! Recursive-descent front end.
//!
//! There is no separate lexer or AST: [`compiler::Compiler`] reads the
//! source left-to-right through [`cursor::Cursor`] and drives the backend
//! directly as each statement and expression is recognised.

pub mod compiler;
pub mod cursor;
mod expressions;
mod statements;

pub use compiler::Compiler;
