//! # Keel Compiler
//! Lowers parsed syntax trees into stack-machine bytecode.
//!
//! Compilation runs in two passes over two representations. Shaping
//! (`populate`) turns the uniform concrete syntax tree into a typed
//! [`Expression`] per construct, rejecting malformed shapes with a
//! [`CompileError`]. Production (`produce`) walks the expressions and emits a
//! flat [`Tape`] of instructions, resolving every relative jump as it goes.
//!
//! ```
//! use keel_syntax::{Production, Span, SyntaxTree, Token, TokenKind};
//!
//! let token = Token::new(TokenKind::Identifier, "x", Span::new(0, 1));
//! let tree = SyntaxTree::leaf(Production::Identifier, token);
//!
//! let tape = keel_compiler::compile(&tree).unwrap();
//! assert_eq!(tape.len(), 1);
//! ```

mod assignment;
mod classes;
mod expression;
mod functions;
mod loops;
mod statements;
mod tape;
mod value;

#[cfg(test)]
mod test;

/// Alternative implementations of standard collections
pub(crate) mod collections {
  pub use smartstring::alias::String;
  pub use thin_vec::ThinVec;
}

pub use assignment::{Assign, Assignment};
pub use classes::Class;
pub use expression::{
  ArrayLiteral, BiSuffix, BinaryChain, BinaryOp, CompileError, Conditional, Constant, Expression,
  Identifier, IfElse, InExpression, IsExpression, MapEntry, MapLiteral, Postfix, PostfixChain,
  PostfixKind, Primary, Range, StringLiteral, Tuple, Unary, UnaryKind,
};
pub use functions::{Argument, Arguments, FileStatements, Function, Import, Module};
pub use loops::{For, Foreach, While};
pub use statements::{Block, Break, BreakKind, Exit, Raise, Return, Try};
pub use tape::{Instruction, Op, Operand, PendingJump, Tape};
pub use value::Value;

use keel_syntax::SyntaxTree;

/// Compile a syntax tree into a tape of instructions.
///
/// # Errors
/// Returns a [`CompileError`] when the tree is malformed or uses a construct
/// the compiler has no instruction for.
pub fn compile(tree: &SyntaxTree) -> Result<Tape, CompileError> {
  let expression = Expression::populate(tree)?;
  let mut tape = Tape::new();
  expression.produce(&mut tape);
  Ok(tape)
}
