//! # Syntax
//! The syntax-tree contract between the keel parser and the compiler.
//!
//! Defines the shape of the concrete syntax tree the parser hands over: every
//! node carries its grammar [`Production`], and is either a leaf wrapping a
//! single [`Token`] or a branch with up to two children. Lists are spelled as
//! cons cells through the `…1` continuation productions.
//!
//! The parser itself lives elsewhere; this crate only provides the immutable
//! tree plus constructors, so tooling and tests can build trees directly.

mod span;
mod token;
mod tree;

pub use span::Span;
pub use token::{Token, TokenKind};
pub use tree::{Production, SyntaxTree};
