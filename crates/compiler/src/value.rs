//! Constant values parsed out of literal tokens.

use crate::expression::CompileError;
use keel_syntax::{Token, TokenKind};
use std::fmt;

/// A constant value embedded in an instruction operand
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
  /// A whole number
  Int(i64),
  /// A floating point number
  Float(f64),
  /// A boolean
  Bool(bool),
}

impl Value {
  /// Arithmetic negation, for folding unary minus applied to a literal
  pub(crate) fn negated(self) -> Option<Self> {
    match self {
      Self::Int(value) => Some(Self::Int(-value)),
      Self::Float(value) => Some(Self::Float(-value)),
      Self::Bool(_) => None,
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Int(value) => write!(f, "{value}"),
      Self::Float(value) => write!(f, "{value:?}"),
      Self::Bool(value) => write!(f, "{value}"),
    }
  }
}

/// Parse a literal token into the [`Value`] it denotes.
pub(crate) fn token_to_val(token: Token) -> Result<Value, CompileError> {
  match token.kind {
    TokenKind::True => Ok(Value::Bool(true)),
    TokenKind::False => Ok(Value::Bool(false)),
    TokenKind::Number => {
      if let Ok(int) = token.text.parse::<i64>() {
        Ok(Value::Int(int))
      } else if let Ok(float) = token.text.parse::<f64>() {
        Ok(Value::Float(float))
      } else {
        Err(CompileError::InvalidConstant { span: token.span })
      }
    }
    _ => Err(CompileError::InvalidConstant { span: token.span }),
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use keel_syntax::Span;

  fn token(kind: TokenKind, text: &str) -> Token<'_> {
    Token::new(kind, text, Span::default())
  }

  #[test]
  fn numbers_parse_as_ints_then_floats() {
    assert_eq!(
      token_to_val(token(TokenKind::Number, "42")),
      Ok(Value::Int(42))
    );
    assert_eq!(
      token_to_val(token(TokenKind::Number, "2.5")),
      Ok(Value::Float(2.5))
    );
    assert_eq!(
      token_to_val(token(TokenKind::Number, "-7")),
      Ok(Value::Int(-7))
    );
  }

  #[test]
  fn booleans_parse() {
    assert_eq!(token_to_val(token(TokenKind::True, "true")), Ok(Value::Bool(true)));
    assert_eq!(
      token_to_val(token(TokenKind::False, "false")),
      Ok(Value::Bool(false))
    );
  }

  #[test]
  fn non_literals_are_rejected() {
    assert!(token_to_val(token(TokenKind::Identifier, "x")).is_err());
    assert!(token_to_val(token(TokenKind::Number, "1.2.3")).is_err());
  }

  #[test]
  fn negation_folds_numbers_only() {
    assert_eq!(Value::Int(3).negated(), Some(Value::Int(-3)));
    assert_eq!(Value::Float(1.5).negated(), Some(Value::Float(-1.5)));
    assert_eq!(Value::Bool(true).negated(), None);
  }
}
