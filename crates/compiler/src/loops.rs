//! The three loop forms and the resolution of `break`/`continue`.
//!
//! Every loop produces its body onto a detached tape first, so the pending
//! jumps the body emitted can be rewritten once the body length is known, and
//! so the loop head knows how far its exit jump must reach.

use crate::assignment::{self, Assignment};
use crate::expression::{CompileError, Expression, expect_production, parts};
use crate::tape::{Op, Operand, PendingJump, Tape, offset};
use keel_syntax::{Production, SyntaxTree, Token, TokenKind};

pub(crate) const ITER_FN: &str = "iter";
pub(crate) const HAS_NEXT_FN: &str = "has_next";
pub(crate) const NEXT_FN: &str = "next";

/// A `while` loop
#[derive(Debug)]
pub struct While<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) condition: Box<Expression<'s>>,
  pub(crate) body: Box<Expression<'s>>,
}

/// A C-style `for` loop
#[derive(Debug)]
pub struct For<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) init: Box<Expression<'s>>,
  pub(crate) condition: Box<Expression<'s>>,
  pub(crate) increment: Box<Expression<'s>>,
  pub(crate) body: Box<Expression<'s>>,
}

/// A `foreach` loop over an iterable
#[derive(Debug)]
pub struct Foreach<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) target: Assignment<'s>,
  pub(crate) iterable: Box<Expression<'s>>,
  pub(crate) body: Box<Expression<'s>>,
}

/// Strip the parenthesis leaves around a loop header clause.
fn unwrap_parens<'a, 's>(stree: &'a SyntaxTree<'s>) -> Result<&'a SyntaxTree<'s>, CompileError> {
  let (open, rest) = parts(stree, "a parenthesised loop header")?;
  if !open.is_token(TokenKind::LeftParen) {
    return Err(CompileError::UnexpectedShape {
      expected: "a parenthesised loop header",
      span: open.span(),
    });
  }
  let (inner, _close) = parts(rest, "a parenthesised loop header")?;
  Ok(inner)
}

pub(crate) fn populate_while<'s>(stree: &SyntaxTree<'s>) -> Result<While<'s>, CompileError> {
  expect_production(stree, Production::WhileStatement, "a while loop")?;
  let (while_part, rest) = parts(stree, "a while loop")?;
  let token = crate::expression::leaf_token(while_part)?;
  let (header, body) = parts(rest, "a while loop")?;
  Ok(While {
    token,
    condition: Box::new(Expression::populate(unwrap_parens(header)?)?),
    body: Box::new(Expression::populate(body)?),
  })
}

pub(crate) fn populate_for<'s>(stree: &SyntaxTree<'s>) -> Result<For<'s>, CompileError> {
  expect_production(stree, Production::ForStatement, "a for loop")?;
  let (for_part, rest) = parts(stree, "a for loop")?;
  let token = crate::expression::leaf_token(for_part)?;
  let (header, body) = parts(rest, "a for loop")?;

  // header: init , condition , increment
  let inner = unwrap_parens(header)?;
  let (init, rest) = parts(inner, "a for loop header")?;
  let (_comma, rest) = parts(rest, "a for loop header")?;
  let (condition, rest) = parts(rest, "a for loop header")?;
  let (_comma, increment) = parts(rest, "a for loop header")?;

  Ok(For {
    token,
    init: Box::new(Expression::populate(init)?),
    condition: Box::new(Expression::populate(condition)?),
    increment: Box::new(Expression::populate(increment)?),
    body: Box::new(Expression::populate(body)?),
  })
}

pub(crate) fn populate_foreach<'s>(stree: &SyntaxTree<'s>) -> Result<Foreach<'s>, CompileError> {
  expect_production(stree, Production::ForeachStatement, "a foreach loop")?;
  let (foreach_part, rest) = parts(stree, "a foreach loop")?;
  let token = crate::expression::leaf_token(foreach_part)?;
  let (header, body) = parts(rest, "a foreach loop")?;

  // header: target in iterable
  let inner = unwrap_parens(header)?;
  let (target, rest) = parts(inner, "a foreach loop header")?;
  let (_in, iterable) = parts(rest, "a foreach loop header")?;

  Ok(Foreach {
    token,
    target: assignment::populate_assignment(target)?,
    iterable: Box::new(Expression::populate(iterable)?),
    body: Box::new(Expression::populate(body)?),
  })
}

/// Rewrite the body's pending `break`/`continue` jumps to resolved offsets.
///
/// `break_base` and `continue_base` are the offsets a jump at body index 0
/// would need; a jump further in needs proportionally less.
pub(crate) fn resolve_pending_jumps(body: &mut Tape, break_base: i32, continue_base: i32) {
  for (position, instruction) in body.iter_mut().enumerate() {
    if let Operand::Jump(pending) = &mut instruction.operand {
      let base = match pending {
        PendingJump::Break => break_base,
        PendingJump::Continue => continue_base,
        PendingJump::Resolved(_) => continue,
      };
      *pending = PendingJump::Resolved(base - offset(position));
    }
  }
}

pub(crate) fn produce_while(while_loop: &While, tape: &mut Tape) -> usize {
  let span = while_loop.token.span;
  let mut count = tape.ins(Op::Nblk, span);

  let condition_len = while_loop.condition.produce(tape);
  count += condition_len;

  let mut body = Tape::new();
  let body_len = while_loop.body.produce(&mut body);
  resolve_pending_jumps(&mut body, offset(body_len), offset(body_len) - 1);

  count += tape.jump(Op::Ifn, offset(body_len) + 1, span);
  count += tape.splice(body);
  count += tape.jump(Op::Jmp, -(offset(condition_len + body_len) + 2), span);
  count + tape.ins(Op::Bblk, span)
}

pub(crate) fn produce_for(for_loop: &For, tape: &mut Tape) -> usize {
  let span = for_loop.token.span;
  let mut count = tape.ins(Op::Nblk, span);
  count += for_loop.init.produce(tape);

  let condition_len = for_loop.condition.produce(tape);
  count += condition_len;

  // body and increment share one frame so continue lands on the increment
  let mut body = Tape::new();
  let body_len = for_loop.body.produce(&mut body);
  let increment_len = for_loop.increment.produce(&mut body);
  resolve_pending_jumps(&mut body, offset(body_len + increment_len), offset(body_len) - 1);

  count += tape.jump(Op::Ifn, offset(body_len + increment_len) + 1, span);
  count += tape.splice(body);
  count += tape.jump(
    Op::Jmp,
    -(offset(body_len + increment_len + condition_len) + 2),
    span,
  );
  count + tape.ins(Op::Bblk, span)
}

/// Lay out a `foreach` loop.
///
/// The iterator protocol is three named calls: `iter` fetches the iterator
/// once before the loop, then each pass calls `has_next` and `next` on a
/// duplicate of it.
pub(crate) fn produce_foreach(foreach: &Foreach, tape: &mut Tape) -> usize {
  let span = foreach.token.span;
  let mut count = tape.ins(Op::Nblk, span);
  count += foreach.iterable.produce(tape);
  count += tape.ins(Op::Push, span);
  count += tape.ins_id(Op::Call, ITER_FN, span);
  count += tape.ins(Op::Push, span);

  let mut body = Tape::new();
  let mut body_len = body.ins(Op::Dup, span);
  body_len += body.ins_id(Op::Call, NEXT_FN, span);
  body_len += assignment::produce_assignment(&foreach.target, &mut body, foreach.token);
  body_len += foreach.body.produce(&mut body);
  resolve_pending_jumps(&mut body, offset(body_len), offset(body_len) - 1);

  count += tape.ins(Op::Dup, span);
  count += tape.ins_id(Op::Call, HAS_NEXT_FN, span);
  count += tape.jump(Op::Ifn, offset(body_len) + 1, span);
  count += tape.splice(body);
  count += tape.jump(Op::Jmp, -(offset(body_len) + 4), span);
  count += tape.ins(Op::Res, span);
  count + tape.ins(Op::Bblk, span)
}
