//! Assignment targets and their production.
//!
//! A target is a plain variable, an access path ending in a field or index, or
//! a destructuring of a tuple-shaped value. The assigned value is produced
//! first; the target decides which store instruction consumes it.

use crate::collections::ThinVec;
use crate::expression::{
  CompileError, Expression, Postfix, PostfixKind, expect_production, leaf_token, parts,
  populate_suffixes, produce_suffixes,
};
use crate::tape::{Op, Tape};
use keel_syntax::{Production, SyntaxTree, Token, TokenKind};

/// An assignment: a target and the value stored into it
#[derive(Debug)]
pub struct Assign<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) target: Assignment<'s>,
  pub(crate) value: Box<Expression<'s>>,
}

/// The target of an assignment
#[derive(Debug)]
pub enum Assignment<'s> {
  /// A plain variable, optionally declared `const`
  Variable {
    /// The variable name
    name: Token<'s>,
    /// Was the target declared `const`?
    is_const: bool,
    /// The `const` keyword, when present
    const_token: Option<Token<'s>>,
  },
  /// An access path whose final step is a field or index
  Access {
    /// The expression the path starts from
    prefix: Box<Expression<'s>>,
    /// The steps of the path, final step included
    suffixes: ThinVec<Postfix<'s>>,
  },
  /// A tuple or array destructuring over nested targets
  Destructure {
    /// The opening token of the pattern
    token: Token<'s>,
    /// The targets, in pattern order
    targets: ThinVec<Assignment<'s>>,
  },
}

pub(crate) fn populate_assign<'s>(stree: &SyntaxTree<'s>) -> Result<Assign<'s>, CompileError> {
  expect_production(stree, Production::AssignmentExpression, "an assignment")?;
  let (target, rest) = parts(stree, "an assignment")?;
  let (equals, value) = parts(rest, "an assignment")?;
  Ok(Assign {
    token: leaf_token(equals)?,
    target: populate_assignment(target)?,
    value: Box::new(Expression::populate(value)?),
  })
}

pub(crate) fn populate_assignment<'s>(
  stree: &SyntaxTree<'s>,
) -> Result<Assignment<'s>, CompileError> {
  match stree.production() {
    Production::Identifier => Ok(Assignment::Variable {
      name: leaf_token(stree)?,
      is_const: false,
      const_token: None,
    }),
    Production::ConstAssignment => {
      let (const_part, name) = parts(stree, "a const assignment target")?;
      Ok(Assignment::Variable {
        name: leaf_token(name)?,
        is_const: true,
        const_token: Some(leaf_token(const_part)?),
      })
    }
    Production::PostfixExpression => {
      let (prefix, suffix) = parts(stree, "an assignment target")?;
      let mut suffixes = ThinVec::new();
      populate_suffixes(suffix, &mut suffixes)?;
      // a call result is not a place
      if suffixes.last().is_some_and(|last| last.kind == PostfixKind::Call) {
        return Err(CompileError::UnexpectedShape {
          expected: "a field or index as the final assignment step",
          span: stree.span(),
        });
      }
      Ok(Assignment::Access {
        prefix: Box::new(Expression::populate(prefix)?),
        suffixes,
      })
    }
    Production::AssignmentTuple | Production::AssignmentArray => populate_destructure(stree),
    _ => Err(CompileError::UnexpectedShape {
      expected: "an assignment target",
      span: stree.span(),
    }),
  }
}

fn populate_destructure<'s>(stree: &SyntaxTree<'s>) -> Result<Assignment<'s>, CompileError> {
  let (open, rest) = parts(stree, "a destructuring pattern")?;
  let token = leaf_token(open)?;
  let (list, _close) = parts(rest, "a destructuring pattern")?;

  let mut targets = ThinVec::new();
  let mut cur = list;
  loop {
    match (cur.first(), cur.second()) {
      (Some(target), Some(tail)) if tail.first().is_some_and(|t| t.is_token(TokenKind::Comma)) => {
        targets.push(populate_assignment(target)?);
        let (_comma, next) = parts(tail, "a destructuring pattern")?;
        cur = next;
      }
      _ => {
        targets.push(populate_assignment(cur)?);
        break;
      }
    }
  }
  Ok(Assignment::Destructure { token, targets })
}

pub(crate) fn produce_assign(assign: &Assign, tape: &mut Tape) -> usize {
  assign.value.produce(tape) + produce_assignment(&assign.target, tape, assign.token)
}

/// Store the current result into `target`.
///
/// For access paths the value is pushed first, then the path up to its final
/// step is evaluated; the final field or index step consumes the pushed value.
pub(crate) fn produce_assignment(target: &Assignment, tape: &mut Tape, token: Token) -> usize {
  match target {
    Assignment::Variable {
      name, is_const, ..
    } => {
      let op = if *is_const { Op::Setc } else { Op::Set };
      tape.ins_id(op, name.text, name.span)
    }
    Assignment::Access { prefix, suffixes } => {
      let mut count = tape.ins(Op::Push, token.span);
      count += prefix.produce(tape);
      let (last, path) = suffixes
        .split_last()
        .expect("access targets always have a final step");
      count += produce_suffixes(path, tape);
      count + produce_access(last, tape)
    }
    Assignment::Destructure { token, targets } => {
      let mut count = tape.ins(Op::Push, token.span);
      for (position, target) in targets.iter().enumerate() {
        count += tape.ins(Op::Peek, token.span);
        count += tape.ins_int(Op::Tget, crate::tape::index(position), token.span);
        count += produce_assignment(target, tape, *token);
      }
      count + tape.ins(Op::Res, token.span)
    }
  }
}

fn produce_access(last: &Postfix, tape: &mut Tape) -> usize {
  match last.kind {
    PostfixKind::Field => {
      let Some(name) = last.id else {
        unreachable!("field suffixes always carry a name")
      };
      tape.ins_id(Op::Fld, name.text, name.span)
    }
    PostfixKind::Index => {
      let mut count = tape.ins(Op::Push, last.token.span);
      if let Some(argument) = &last.argument {
        count += argument.produce(tape);
      }
      count + tape.ins(Op::Aset, last.token.span)
    }
    PostfixKind::Call => unreachable!("call targets are rejected while shaping"),
  }
}
