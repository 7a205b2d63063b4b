//! The concrete syntax tree handed from the parser to the compiler.
//!
//! Nodes are deliberately uniform: a grammar [`Production`] tag, plus either a
//! single [`Token`] (a leaf) or up to two children (a branch). Lists are
//! spelled as cons cells through the `…1` continuation productions, which
//! consumers flatten.

use crate::span::Span;
use crate::token::{Token, TokenKind};

/// The grammar production a [`SyntaxTree`] node was parsed as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs, reason = "variants mirror the grammar one to one")]
pub enum Production {
  /// A bare terminal token with no production of its own
  Token,

  // Expressions
  Identifier,
  Constant,
  StringLiteral,
  TupleExpression,
  TupleExpression1,
  ArrayDeclaration,
  MapDeclaration,
  MapEntry,
  MapEntryList,
  MapEntryList1,
  PrimaryExpression,
  PostfixExpression,
  PostfixExpression1,
  RangeExpression,
  UnaryExpression,
  MultiplicativeExpression,
  MultiplicativeExpression1,
  AdditiveExpression,
  AdditiveExpression1,
  RelationalExpression,
  RelationalExpression1,
  EqualityExpression,
  EqualityExpression1,
  AndExpression,
  AndExpression1,
  XorExpression,
  XorExpression1,
  OrExpression,
  OrExpression1,
  InExpression,
  IsExpression,
  ConditionalExpression,

  // Anonymous functions
  AnonFunctionDefinition,
  AnonSignatureConst,
  AnonSignatureNonconst,
  AnonIdentifier,

  // Assignment
  AssignmentExpression,
  ConstAssignment,
  AssignmentTuple,
  AssignmentArray,

  // Statements
  CompoundStatement,
  StatementList,
  StatementList1,
  ForeachStatement,
  ForStatement,
  WhileStatement,
  TryStatement,
  CatchAssign,
  RaiseStatement,
  SelectionStatement,
  JumpStatement,
  BreakStatement,
  ExitStatement,
  ModuleStatement,
  ImportStatement,
  FileLevelStatementList,
  FileLevelStatementList1,

  // Named functions
  FunctionDefinition,
  FunctionSignatureConst,
  FunctionSignatureNonconst,
  DefIdentifier,
  FunctionArgumentsNoArgs,
  FunctionArgumentsPresent,
  FunctionArgumentList,
  FunctionArgumentList1,
  ConstFunctionArgument,
  FunctionArgEltWithDefault,

  // Classes
  ClassDefinition,
  ClassNameAndInheritance,
  ParentClasses,
  ParentClassList,
  ParentClassList1,
  ClassCompoundStatement,
  ClassStatementList,
  ClassStatementList1,
  FieldStatement,
  IdentifierList,
  IdentifierList1,
  MethodDefinition,
  MethodSignatureConst,
  MethodSignatureNonconst,
  MethodIdentifier,
  NewDefinition,
  NewSignatureConst,
  NewSignatureNonconst,
  NewExpression,
  NewArgumentsNoArgs,
  NewArgumentsPresent,
  NewArgumentList,
  NewArgumentList1,
  ConstNewArgument,
  NewArgEltWithDefault,
  NewFieldArg,
}

/// A node of the concrete syntax tree
///
/// A node is a leaf holding a token, or a branch with one or two children.
/// The parser owns no source text; tokens borrow from the source string.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxTree<'s> {
  production: Production,
  token: Option<Token<'s>>,
  first: Option<Box<SyntaxTree<'s>>>,
  second: Option<Box<SyntaxTree<'s>>>,
}

impl<'s> SyntaxTree<'s> {
  /// Create a leaf node wrapping a single token
  pub const fn leaf(production: Production, token: Token<'s>) -> Self {
    Self {
      production,
      token: Some(token),
      first: None,
      second: None,
    }
  }

  /// Create a branch node with two children
  pub fn branch(production: Production, first: SyntaxTree<'s>, second: SyntaxTree<'s>) -> Self {
    Self {
      production,
      token: None,
      first: Some(Box::new(first)),
      second: Some(Box::new(second)),
    }
  }

  /// Create a branch node with a single child
  pub fn unary_branch(production: Production, first: SyntaxTree<'s>) -> Self {
    Self {
      production,
      token: None,
      first: Some(Box::new(first)),
      second: None,
    }
  }

  /// The grammar production this node was parsed as
  pub fn production(&self) -> Production {
    self.production
  }

  /// Is this node the given production?
  #[must_use]
  pub fn is(&self, production: Production) -> bool {
    self.production == production
  }

  /// Is this node a leaf?
  #[must_use]
  pub fn is_leaf(&self) -> bool {
    self.token.is_some()
  }

  /// The token of a leaf node
  #[must_use]
  pub fn token(&self) -> Option<Token<'s>> {
    self.token
  }

  /// Is this node a leaf wrapping a token of the given kind?
  #[must_use]
  pub fn is_token(&self, kind: TokenKind) -> bool {
    self.token.is_some_and(|token| token.kind == kind)
  }

  /// The first child of a branch node
  #[must_use]
  pub fn first(&self) -> Option<&SyntaxTree<'s>> {
    self.first.as_deref()
  }

  /// The second child of a branch node
  #[must_use]
  pub fn second(&self) -> Option<&SyntaxTree<'s>> {
    self.second.as_deref()
  }

  /// The source range this node covers
  pub fn span(&self) -> Span {
    if let Some(token) = self.token {
      return token.span;
    }

    let first = self.first().map(SyntaxTree::span).unwrap_or_default();
    let second = self.second().map(SyntaxTree::span).unwrap_or_default();
    first.merge(second)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn token(kind: TokenKind, text: &str, start: u32) -> Token<'_> {
    #[allow(clippy::cast_possible_truncation)]
    let end = start + text.len() as u32;
    Token::new(kind, text, Span::new(start, end))
  }

  #[test]
  fn leaves_hold_tokens() {
    let tree = SyntaxTree::leaf(Production::Identifier, token(TokenKind::Identifier, "x", 4));

    assert!(tree.is_leaf());
    assert!(tree.is(Production::Identifier));
    assert!(tree.is_token(TokenKind::Identifier));
    assert_eq!(tree.token().unwrap().text, "x");
    assert_eq!(tree.span(), Span::new(4, 5));
  }

  #[test]
  fn branch_spans_cover_children() {
    let left = SyntaxTree::leaf(Production::Identifier, token(TokenKind::Identifier, "abc", 0));
    let right = SyntaxTree::leaf(Production::Constant, token(TokenKind::Number, "12", 6));
    let tree = SyntaxTree::branch(Production::AdditiveExpression, left, right);

    assert!(!tree.is_leaf());
    assert_eq!(tree.token(), None);
    assert_eq!(tree.span(), Span::new(0, 8));
  }

  #[test]
  fn unary_branch_has_no_second_child() {
    let child = SyntaxTree::leaf(Production::Identifier, token(TokenKind::Identifier, "x", 0));
    let tree = SyntaxTree::unary_branch(Production::PrimaryExpression, child);

    assert!(tree.first().is_some());
    assert!(tree.second().is_none());
  }
}
