//! Tokens of keel source, as handed over by the lexer.

use crate::span::Span;

/// A token of source code
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'s> {
  /// The type of the token
  pub kind: TokenKind,
  /// The source text of the token, borrowed from the source string
  pub text: &'s str,
  /// The location of the token
  pub span: Span,
}

impl<'s> Token<'s> {
  /// Create a new token
  pub const fn new(kind: TokenKind, text: &'s str, span: Span) -> Self {
    Self { kind, text, span }
  }
}

/// The type of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  // Values
  /// An identifier
  Identifier,
  /// A numeric literal
  Number,
  /// A string literal
  String,
  /// `true`
  True,
  /// `false`
  False,
  /// `Nil`
  Nil,

  // Brackets
  /// `(`
  LeftParen,
  /// `)`
  RightParen,
  /// `{`
  LeftBrace,
  /// `}`
  RightBrace,
  /// `[`
  LeftBracket,
  /// `]`
  RightBracket,

  // Separators
  /// `,`
  Comma,
  /// `.`
  Period,
  /// `:`
  Colon,

  // Operators
  /// `~`
  Tilde,
  /// `!`
  Exclamation,
  /// `-`
  Minus,
  /// `+`
  Plus,
  /// `*`
  Star,
  /// `/`
  Slash,
  /// `%`
  Percent,
  /// `<`
  Less,
  /// `>`
  Greater,
  /// `<=`
  LessEqual,
  /// `>=`
  GreaterEqual,
  /// `==`
  EqualEqual,
  /// `!=`
  BangEqual,
  /// `&`
  Ampersand,
  /// `|`
  Pipe,
  /// `^`
  Caret,
  /// `=`
  Equal,

  // Keywords
  /// `if`
  If,
  /// `then`
  Then,
  /// `else`
  Else,
  /// `for`
  For,
  /// `while`
  While,
  /// `in`
  In,
  /// `notin`
  NotIn,
  /// `is`
  Is,
  /// `try`
  Try,
  /// `catch`
  Catch,
  /// `raise`
  Raise,
  /// `return`
  Return,
  /// `break`
  Break,
  /// `continue`
  Continue,
  /// `exit`
  Exit,
  /// `const`
  Const,
  /// `def`
  Def,
  /// `method`
  Method,
  /// `new`
  New,
  /// `field`
  Field,
  /// `class`
  Class,
  /// `extends`
  Extends,
  /// `module`
  Module,
  /// `import`
  Import,
}
