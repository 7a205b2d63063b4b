//! Statement blocks, `try`/`catch`, and the jump statements.

use crate::assignment::{self, Assignment};
use crate::collections::ThinVec;
use crate::expression::{CompileError, Expression, expect_production, leaf_token, parts};
use crate::tape::{Op, PendingJump, Tape, offset};
use keel_syntax::{Production, SyntaxTree, Token, TokenKind};

const TRY_GOTO: &str = "$try_goto";

/// A `{ … }` statement block
#[derive(Debug)]
pub struct Block<'s> {
  pub(crate) statements: ThinVec<Expression<'s>>,
}

/// A `try`/`catch` statement
#[derive(Debug)]
pub struct Try<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) body: Box<Expression<'s>>,
  pub(crate) catch_token: Token<'s>,
  pub(crate) error_target: Assignment<'s>,
  pub(crate) catch_body: Box<Expression<'s>>,
}

/// A `raise` statement
#[derive(Debug)]
pub struct Raise<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) value: Box<Expression<'s>>,
}

/// A `return` statement, with an optional value
#[derive(Debug)]
pub struct Return<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) value: Option<Box<Expression<'s>>>,
}

/// A `break` or `continue` statement
#[derive(Debug)]
pub struct Break<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) kind: BreakKind,
}

/// Which loop edge a [`Break`] jumps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
  /// Jump past the end of the loop
  Break,
  /// Jump to the loop's re-test step
  Continue,
}

/// An `exit` statement
#[derive(Debug)]
pub struct Exit<'s> {
  pub(crate) token: Token<'s>,
}

pub(crate) fn populate_block<'s>(stree: &SyntaxTree<'s>) -> Result<Block<'s>, CompileError> {
  expect_production(stree, Production::CompoundStatement, "a statement block")?;
  let (_open, rest) = parts(stree, "a statement block")?;

  let mut statements = ThinVec::new();
  if rest.is_token(TokenKind::RightBrace) {
    return Ok(Block { statements });
  }
  let (list, _close) = parts(rest, "a statement block")?;
  populate_statement_list(list, &mut statements)?;
  Ok(Block { statements })
}

fn populate_statement_list<'s>(
  list: &SyntaxTree<'s>,
  statements: &mut ThinVec<Expression<'s>>,
) -> Result<(), CompileError> {
  if !list.is(Production::StatementList) {
    statements.push(Expression::populate(list)?);
    return Ok(());
  }
  let (first, rest) = parts(list, "a statement list")?;
  statements.push(Expression::populate(first)?);

  let mut cur = rest;
  while cur.is(Production::StatementList1) {
    let (statement, tail) = parts(cur, "a statement list")?;
    statements.push(Expression::populate(statement)?);
    cur = tail;
  }
  statements.push(Expression::populate(cur)?);
  Ok(())
}

pub(crate) fn produce_block(block: &Block, tape: &mut Tape) -> usize {
  block
    .statements
    .iter()
    .map(|statement| statement.produce(tape))
    .sum()
}

pub(crate) fn populate_try<'s>(stree: &SyntaxTree<'s>) -> Result<Try<'s>, CompileError> {
  expect_production(stree, Production::TryStatement, "a try statement")?;
  let (try_part, rest) = parts(stree, "a try statement")?;
  let token = leaf_token(try_part)?;
  let (body, rest) = parts(rest, "a try statement")?;
  let (catch_part, rest) = parts(rest, "a catch clause")?;
  let catch_token = leaf_token(catch_part)?;
  let (catch_assign, catch_body) = parts(rest, "a catch clause")?;

  expect_production(catch_assign, Production::CatchAssign, "a catch clause")?;
  let (_open, inner) = parts(catch_assign, "a catch clause")?;
  let (target, _close) = parts(inner, "a catch clause")?;

  Ok(Try {
    token,
    body: Box::new(Expression::populate(body)?),
    catch_token,
    error_target: assignment::populate_assignment(target)?,
    catch_body: Box::new(Expression::populate(catch_body)?),
  })
}

/// Lay out `try`/`catch`.
///
/// `Ctch` arms the handler to land on the catch code; a clean run of the try
/// body jumps over it. Both paths meet at the `Rnil`/`Set` pair that clears
/// the handler state.
pub(crate) fn produce_try(try_statement: &Try, tape: &mut Tape) -> usize {
  let span = try_statement.token.span;
  let catch_span = try_statement.catch_token.span;

  let mut try_body = Tape::new();
  let try_len = try_statement.body.produce(&mut try_body);

  let mut catch_tape = Tape::new();
  let mut catch_len =
    assignment::produce_assignment(&try_statement.error_target, &mut catch_tape, try_statement.catch_token);
  catch_len += try_statement.catch_body.produce(&mut catch_tape);

  let mut count = tape.ins_jump(
    Op::Ctch,
    PendingJump::Resolved(offset(try_len) + 1),
    span,
  );
  count += tape.splice(try_body);
  count += tape.jump(Op::Jmp, offset(catch_len), span);
  count += tape.splice(catch_tape);
  count += tape.ins(Op::Rnil, catch_span);
  count + tape.ins_id(Op::Set, TRY_GOTO, catch_span)
}

pub(crate) fn populate_raise<'s>(stree: &SyntaxTree<'s>) -> Result<Raise<'s>, CompileError> {
  expect_production(stree, Production::RaiseStatement, "a raise statement")?;
  let (raise_part, value) = parts(stree, "a raise statement")?;
  Ok(Raise {
    token: leaf_token(raise_part)?,
    value: Box::new(Expression::populate(value)?),
  })
}

pub(crate) fn produce_raise(raise: &Raise, tape: &mut Tape) -> usize {
  raise.value.produce(tape) + tape.ins(Op::Rais, raise.token.span)
}

pub(crate) fn populate_return<'s>(stree: &SyntaxTree<'s>) -> Result<Return<'s>, CompileError> {
  expect_production(stree, Production::JumpStatement, "a return statement")?;
  // a bare `return` is a leaf
  if let Some(token) = stree.token() {
    return Ok(Return { token, value: None });
  }
  let (return_part, value) = parts(stree, "a return statement")?;
  let token = leaf_token(return_part)?;
  // `return (value)` carries the parens in the tree
  let value = if value.first().is_some_and(|first| first.is_token(TokenKind::LeftParen)) {
    let (_open, rest) = parts(value, "a return value")?;
    let (inner, _close) = parts(rest, "a return value")?;
    inner
  } else {
    value
  };
  Ok(Return {
    token,
    value: Some(Box::new(Expression::populate(value)?)),
  })
}

pub(crate) fn produce_return(return_statement: &Return, tape: &mut Tape) -> usize {
  let span = return_statement.token.span;
  let count = match &return_statement.value {
    Some(value) => value.produce(tape),
    None => tape.ins(Op::Rnil, span),
  };
  count + tape.ins(Op::Ret, span)
}

pub(crate) fn populate_break<'s>(stree: &SyntaxTree<'s>) -> Result<Break<'s>, CompileError> {
  expect_production(stree, Production::BreakStatement, "a break statement")?;
  let token = leaf_token(stree)?;
  let kind = match token.kind {
    TokenKind::Break => BreakKind::Break,
    TokenKind::Continue => BreakKind::Continue,
    _ => {
      return Err(CompileError::UnexpectedShape {
        expected: "`break` or `continue`",
        span: token.span,
      });
    }
  };
  Ok(Break { token, kind })
}

pub(crate) fn produce_break(break_statement: &Break, tape: &mut Tape) -> usize {
  let pending = match break_statement.kind {
    BreakKind::Break => PendingJump::Break,
    BreakKind::Continue => PendingJump::Continue,
  };
  tape.ins_jump(Op::Jmp, pending, break_statement.token.span)
}
