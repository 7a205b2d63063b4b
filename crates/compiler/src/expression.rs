//! The typed expression tree and its production onto a [`Tape`].
//!
//! Shaping (`populate`) turns a [`SyntaxTree`] into one closed [`Expression`]
//! variant per construct; production (`produce`) emits its instructions.
//! Produce returns the exact number of instructions appended, which the layout
//! arithmetic of conditionals, loops and argument binding relies on.

use crate::assignment::{self, Assign};
use crate::classes::{self, Class};
use crate::collections::ThinVec;
use crate::functions::{self, FileStatements, Function, Import, Module};
use crate::loops::{self, For, Foreach, While};
use crate::statements::{self, Block, Break, Exit, Raise, Return, Try};
use crate::tape::{Op, Tape, offset};
use crate::value::{Value, token_to_val};
use keel_syntax::{Production, Span, SyntaxTree, Token, TokenKind};
use std::{error, fmt};

const RANGE_FN: &str = "range";
const IN_FN: &str = "__in__";

/// A shaped expression, ready to produce instructions
#[must_use]
#[derive(Debug)]
pub enum Expression<'s> {
  /// A variable reference
  Identifier(Identifier<'s>),
  /// A literal number or boolean
  Constant(Constant<'s>),
  /// A string literal
  String(StringLiteral<'s>),
  /// A tuple construction
  Tuple(Tuple<'s>),
  /// An array literal
  Array(ArrayLiteral<'s>),
  /// A map literal
  Map(MapLiteral<'s>),
  /// A parenthesised expression
  Primary(Primary<'s>),
  /// A field/call/index suffix chain
  Postfix(PostfixChain<'s>),
  /// A `start:end` or `start:inc:end` range
  Range(Range<'s>),
  /// A unary operator application
  Unary(Unary<'s>),
  /// A left-associative chain of binary operators
  Binary(BinaryChain<'s>),
  /// An `in` / `notin` membership test
  In(InExpression<'s>),
  /// An `is` type test
  Is(IsExpression<'s>),
  /// An `if`/`else` conditional expression
  Conditional(IfElse<'s>),
  /// An anonymous function
  Lambda(Function<'s>),
  /// An assignment
  Assign(Assign<'s>),
  /// A `foreach` iterator loop
  Foreach(Foreach<'s>),
  /// A C-style `for` loop
  For(For<'s>),
  /// A `while` loop
  While(While<'s>),
  /// A `{ … }` statement block
  Block(Block<'s>),
  /// A `try`/`catch` statement
  Try(Try<'s>),
  /// A `raise` statement
  Raise(Raise<'s>),
  /// An `if` selection statement
  Select(IfElse<'s>),
  /// A `return` statement
  Return(Return<'s>),
  /// A `break` or `continue` statement
  Break(Break<'s>),
  /// An `exit` statement
  Exit(Exit<'s>),
  /// A `module` declaration
  Module(Module<'s>),
  /// An `import` statement
  Import(Import<'s>),
  /// A named function definition
  Function(Function<'s>),
  /// A class definition
  Class(Class<'s>),
  /// The statement list of a whole source file
  File(FileStatements<'s>),
}

impl<'s> Expression<'s> {
  /// Shape a syntax tree into an expression.
  ///
  /// # Errors
  /// Returns an error when the tree does not have the shape its production
  /// promises, or uses a construct the compiler has no instruction for.
  pub fn populate(stree: &SyntaxTree<'s>) -> Result<Self, CompileError> {
    match stree.production() {
      Production::Identifier => Ok(Self::Identifier(Identifier {
        name: leaf_token(stree)?,
      })),
      Production::Constant => {
        let token = leaf_token(stree)?;
        Ok(Self::Constant(Constant {
          token,
          value: token_to_val(token)?,
        }))
      }
      Production::StringLiteral => Ok(Self::String(StringLiteral {
        token: leaf_token(stree)?,
      })),
      Production::TupleExpression => Ok(Self::Tuple(populate_tuple(stree)?)),
      Production::ArrayDeclaration => Ok(Self::Array(populate_array(stree)?)),
      Production::MapDeclaration => Ok(Self::Map(populate_map(stree)?)),
      Production::PrimaryExpression => {
        let (_open, rest) = parts(stree, "a parenthesised expression")?;
        let (inner, _close) = parts(rest, "a parenthesised expression")?;
        Ok(Self::Primary(Primary {
          expression: Box::new(Expression::populate(inner)?),
        }))
      }
      Production::PostfixExpression => Ok(Self::Postfix(populate_postfix(stree)?)),
      Production::RangeExpression => Ok(Self::Range(populate_range(stree)?)),
      Production::UnaryExpression => Ok(Self::Unary(populate_unary(stree)?)),
      Production::MultiplicativeExpression
      | Production::AdditiveExpression
      | Production::RelationalExpression
      | Production::EqualityExpression
      | Production::AndExpression
      | Production::XorExpression
      | Production::OrExpression => Ok(Self::Binary(populate_binary(stree)?)),
      Production::InExpression => Ok(Self::In(populate_in(stree)?)),
      Production::IsExpression => Ok(Self::Is(populate_is(stree)?)),
      Production::ConditionalExpression => Ok(Self::Conditional(populate_if_else(
        stree,
        Production::ConditionalExpression,
      )?)),
      Production::SelectionStatement => Ok(Self::Select(populate_if_else(
        stree,
        Production::SelectionStatement,
      )?)),
      Production::AnonFunctionDefinition => Ok(Self::Lambda(functions::populate_lambda(stree)?)),
      Production::AssignmentExpression => Ok(Self::Assign(assignment::populate_assign(stree)?)),
      Production::ForeachStatement => Ok(Self::Foreach(loops::populate_foreach(stree)?)),
      Production::ForStatement => Ok(Self::For(loops::populate_for(stree)?)),
      Production::WhileStatement => Ok(Self::While(loops::populate_while(stree)?)),
      Production::CompoundStatement => Ok(Self::Block(statements::populate_block(stree)?)),
      Production::TryStatement => Ok(Self::Try(statements::populate_try(stree)?)),
      Production::RaiseStatement => Ok(Self::Raise(statements::populate_raise(stree)?)),
      Production::JumpStatement => Ok(Self::Return(statements::populate_return(stree)?)),
      Production::BreakStatement => Ok(Self::Break(statements::populate_break(stree)?)),
      Production::ExitStatement => Ok(Self::Exit(Exit {
        token: leaf_token(stree)?,
      })),
      Production::ModuleStatement => Ok(Self::Module(functions::populate_module(stree)?)),
      Production::ImportStatement => Ok(Self::Import(functions::populate_import(stree)?)),
      Production::FunctionDefinition => Ok(Self::Function(functions::populate_function_def(stree)?)),
      Production::ClassDefinition => Ok(Self::Class(classes::populate_class(stree)?)),
      Production::FileLevelStatementList => Ok(Self::File(functions::populate_file(stree)?)),
      _ => Err(CompileError::UnexpectedShape {
        expected: "an expression or statement",
        span: stree.span(),
      }),
    }
  }

  /// Emit the instructions for this expression onto `tape`.
  ///
  /// Returns the exact number of instructions appended.
  pub fn produce(&self, tape: &mut Tape) -> usize {
    match self {
      Self::Identifier(identifier) => {
        tape.ins_id(Op::Res, identifier.name.text, identifier.name.span)
      }
      Self::Constant(constant) => tape.ins_value(Op::Res, constant.value, constant.token.span),
      Self::String(string) => tape.ins_str(Op::Res, string.value(), string.token.span),
      Self::Tuple(tuple) => produce_tuple(tuple, tape),
      Self::Array(array) => produce_array(array, tape),
      Self::Map(map) => produce_map(map, tape),
      Self::Primary(primary) => primary.expression.produce(tape),
      Self::Postfix(chain) => chain.prefix.produce(tape) + produce_suffixes(&chain.suffixes, tape),
      Self::Range(range) => produce_range(range, tape),
      Self::Unary(unary) => produce_unary(unary, tape),
      Self::Binary(chain) => produce_binary(chain, tape),
      Self::In(in_expression) => produce_in(in_expression, tape),
      Self::Is(is_expression) => produce_is(is_expression, tape),
      Self::Conditional(if_else) | Self::Select(if_else) => produce_if_else(if_else, tape),
      Self::Lambda(function) => functions::produce_lambda(function, tape),
      Self::Assign(assign) => assignment::produce_assign(assign, tape),
      Self::Foreach(foreach) => loops::produce_foreach(foreach, tape),
      Self::For(for_loop) => loops::produce_for(for_loop, tape),
      Self::While(while_loop) => loops::produce_while(while_loop, tape),
      Self::Block(block) => statements::produce_block(block, tape),
      Self::Try(try_statement) => statements::produce_try(try_statement, tape),
      Self::Raise(raise) => statements::produce_raise(raise, tape),
      Self::Return(return_statement) => statements::produce_return(return_statement, tape),
      Self::Break(break_statement) => statements::produce_break(break_statement, tape),
      Self::Exit(exit) => tape.ins(Op::Exit, exit.token.span),
      Self::Module(module) => tape.module(module.name.text, module.name.span),
      Self::Import(import) => tape.ins_id(Op::Lmdl, import.name.text, import.name.span),
      Self::Function(function) => functions::produce_function(function, tape),
      Self::Class(class) => classes::produce_class(class, tape),
      Self::File(file) => functions::produce_file(file, tape),
    }
  }
}

/// A variable reference
#[derive(Debug)]
pub struct Identifier<'s> {
  pub(crate) name: Token<'s>,
}

/// A literal number or boolean with its parsed value
#[derive(Debug)]
pub struct Constant<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) value: Value,
}

/// A string literal
#[derive(Debug)]
pub struct StringLiteral<'s> {
  pub(crate) token: Token<'s>,
}

impl<'s> StringLiteral<'s> {
  fn value(&self) -> &'s str {
    let text = self.token.text;
    text
      .strip_prefix('\'')
      .and_then(|text| text.strip_suffix('\''))
      .or_else(|| text.strip_prefix('"').and_then(|text| text.strip_suffix('"')))
      .unwrap_or(text)
  }
}

/// A tuple construction
#[derive(Debug)]
pub struct Tuple<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) elements: ThinVec<Expression<'s>>,
}

/// An array literal
#[derive(Debug)]
pub struct ArrayLiteral<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) element: Option<Box<Expression<'s>>>,
}

/// A map literal
#[derive(Debug)]
pub struct MapLiteral<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) entries: ThinVec<MapEntry<'s>>,
}

/// A single `key: value` entry of a map literal
#[derive(Debug)]
pub struct MapEntry<'s> {
  pub(crate) colon: Token<'s>,
  pub(crate) key: Expression<'s>,
  pub(crate) value: Expression<'s>,
}

/// A parenthesised expression
#[derive(Debug)]
pub struct Primary<'s> {
  pub(crate) expression: Box<Expression<'s>>,
}

/// A postfix chain: a prefix expression and its suffix steps
#[derive(Debug)]
pub struct PostfixChain<'s> {
  pub(crate) prefix: Box<Expression<'s>>,
  pub(crate) suffixes: ThinVec<Postfix<'s>>,
}

/// A single postfix step
#[derive(Debug)]
pub struct Postfix<'s> {
  pub(crate) kind: PostfixKind,
  pub(crate) token: Token<'s>,
  pub(crate) id: Option<Token<'s>>,
  pub(crate) argument: Option<Box<Expression<'s>>>,
}

/// The kind of a postfix step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixKind {
  /// A `.name` field access
  Field,
  /// A `(…)` call
  Call,
  /// A `[…]` index
  Index,
}

/// A `start:end` or `start:inc:end` range
#[derive(Debug)]
pub struct Range<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) start: Box<Expression<'s>>,
  pub(crate) increment: Option<Box<Expression<'s>>>,
  pub(crate) end: Box<Expression<'s>>,
}

/// A unary operator application
#[derive(Debug)]
pub struct Unary<'s> {
  pub(crate) kind: UnaryKind,
  pub(crate) token: Token<'s>,
  pub(crate) operand: Box<Expression<'s>>,
}

/// The kind of a unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryKind {
  /// `~`
  Not,
  /// `!`
  NotC,
  /// `-`
  Negate,
  /// `const`
  Const,
}

/// A left-associative chain of binary operators over one precedence level
#[derive(Debug)]
pub struct BinaryChain<'s> {
  pub(crate) left: Box<Expression<'s>>,
  pub(crate) suffixes: ThinVec<BiSuffix<'s>>,
}

/// One operator and right-hand operand of a [`BinaryChain`]
#[derive(Debug)]
pub struct BiSuffix<'s> {
  pub(crate) op: BinaryOp,
  pub(crate) token: Token<'s>,
  pub(crate) operand: Expression<'s>,
}

/// A binary operator with a direct instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs, reason = "operators named after their instructions")]
pub enum BinaryOp {
  Mult,
  Div,
  Mod,
  Add,
  Sub,
  Lt,
  Gt,
  Lte,
  Gte,
  Eq,
  Neq,
  And,
  Or,
  Xor,
}

impl BinaryOp {
  fn from_token(token: Token) -> Result<Self, CompileError> {
    match token.kind {
      TokenKind::Star => Ok(Self::Mult),
      TokenKind::Slash => Ok(Self::Div),
      TokenKind::Percent => Ok(Self::Mod),
      TokenKind::Plus => Ok(Self::Add),
      TokenKind::Minus => Ok(Self::Sub),
      TokenKind::Less => Ok(Self::Lt),
      TokenKind::Greater => Ok(Self::Gt),
      TokenKind::LessEqual => Ok(Self::Lte),
      TokenKind::GreaterEqual => Ok(Self::Gte),
      TokenKind::EqualEqual => Ok(Self::Eq),
      TokenKind::BangEqual => Ok(Self::Neq),
      TokenKind::Ampersand => Ok(Self::And),
      TokenKind::Pipe => Ok(Self::Or),
      TokenKind::Caret => Ok(Self::Xor),
      _ => Err(CompileError::UnknownOperator { span: token.span }),
    }
  }

  fn op(self) -> Op {
    match self {
      Self::Mult => Op::Mult,
      Self::Div => Op::Div,
      Self::Mod => Op::Mod,
      Self::Add => Op::Add,
      Self::Sub => Op::Sub,
      Self::Lt => Op::Lt,
      Self::Gt => Op::Gt,
      Self::Lte => Op::Lte,
      Self::Gte => Op::Gte,
      Self::Eq => Op::Eq,
      Self::Neq => Op::Neq,
      Self::And => Op::And,
      Self::Or => Op::Or,
      Self::Xor => Op::Xor,
    }
  }
}

/// An `in` / `notin` membership test
#[derive(Debug)]
pub struct InExpression<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) negated: bool,
  pub(crate) element: Box<Expression<'s>>,
  pub(crate) collection: Box<Expression<'s>>,
}

/// An `is` type test
#[derive(Debug)]
pub struct IsExpression<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) operand: Box<Expression<'s>>,
  pub(crate) type_expression: Box<Expression<'s>>,
}

/// An `if`/`else if`/`else` chain
#[derive(Debug)]
pub struct IfElse<'s> {
  pub(crate) conditions: ThinVec<Conditional<'s>>,
  pub(crate) else_body: Option<Box<Expression<'s>>>,
}

/// One condition and body of an [`IfElse`] chain
#[derive(Debug)]
pub struct Conditional<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) condition: Expression<'s>,
  pub(crate) body: Expression<'s>,
}

pub(crate) fn leaf_token<'s>(stree: &SyntaxTree<'s>) -> Result<Token<'s>, CompileError> {
  stree.token().ok_or(CompileError::UnexpectedShape {
    expected: "a leaf token",
    span: stree.span(),
  })
}

pub(crate) fn parts<'a, 's>(
  stree: &'a SyntaxTree<'s>,
  expected: &'static str,
) -> Result<(&'a SyntaxTree<'s>, &'a SyntaxTree<'s>), CompileError> {
  match (stree.first(), stree.second()) {
    (Some(first), Some(second)) => Ok((first, second)),
    _ => Err(CompileError::UnexpectedShape {
      expected,
      span: stree.span(),
    }),
  }
}

pub(crate) fn expect_production(
  stree: &SyntaxTree,
  production: Production,
  expected: &'static str,
) -> Result<(), CompileError> {
  if stree.is(production) {
    Ok(())
  } else {
    Err(CompileError::UnexpectedShape {
      expected,
      span: stree.span(),
    })
  }
}

fn populate_tuple<'s>(stree: &SyntaxTree<'s>) -> Result<Tuple<'s>, CompileError> {
  let (first, rest) = parts(stree, "a tuple expression")?;
  let mut elements = ThinVec::new();
  elements.push(Expression::populate(first)?);

  let token = rest
    .first()
    .and_then(SyntaxTree::token)
    .ok_or(CompileError::UnexpectedShape {
      expected: "a tuple continuation",
      span: rest.span(),
    })?;

  let mut cur = rest;
  loop {
    let (_comma, tail) = parts(cur, "a tuple continuation")?;
    if let (Some(element), Some(next)) = (tail.first(), tail.second()) {
      if next.is(Production::TupleExpression1) {
        elements.push(Expression::populate(element)?);
        cur = next;
        continue;
      }
    }
    elements.push(Expression::populate(tail)?);
    break;
  }
  Ok(Tuple { token, elements })
}

/// Elements are produced in reverse so index 0 ends up on top of the stack.
fn produce_pushed_reversed(elements: &[Expression], span: Span, tape: &mut Tape) -> usize {
  let mut count = 0;
  for element in elements.iter().rev() {
    count += element.produce(tape);
    count += tape.ins(Op::Push, span);
  }
  count
}

fn produce_tuple(tuple: &Tuple, tape: &mut Tape) -> usize {
  let span = tuple.token.span;
  produce_pushed_reversed(&tuple.elements, span, tape)
    + tape.ins_int(Op::Tupl, crate::tape::index(tuple.elements.len()), span)
}

fn populate_array<'s>(stree: &SyntaxTree<'s>) -> Result<ArrayLiteral<'s>, CompileError> {
  let (open, rest) = parts(stree, "an array literal")?;
  let token = leaf_token(open)?;
  if rest.is_token(TokenKind::RightBracket) {
    return Ok(ArrayLiteral {
      token,
      element: None,
    });
  }
  let (element, _close) = parts(rest, "an array literal")?;
  Ok(ArrayLiteral {
    token,
    element: Some(Box::new(Expression::populate(element)?)),
  })
}

fn produce_array(array: &ArrayLiteral, tape: &mut Tape) -> usize {
  let span = array.token.span;
  match array.element.as_deref() {
    None => tape.ins(Op::Anew, span),
    Some(Expression::Tuple(tuple)) => {
      produce_pushed_reversed(&tuple.elements, span, tape)
        + tape.ins_int(Op::Anew, crate::tape::index(tuple.elements.len()), span)
    }
    Some(element) => {
      element.produce(tape) + tape.ins(Op::Push, span) + tape.ins_int(Op::Anew, 1, span)
    }
  }
}

fn populate_map<'s>(stree: &SyntaxTree<'s>) -> Result<MapLiteral<'s>, CompileError> {
  let (open, rest) = parts(stree, "a map literal")?;
  let token = leaf_token(open)?;
  let mut entries = ThinVec::new();
  if rest.is_token(TokenKind::RightBrace) {
    return Ok(MapLiteral { token, entries });
  }
  let (list, _close) = parts(rest, "a map literal")?;
  if !list.is(Production::MapEntryList) {
    entries.push(populate_map_entry(list)?);
    return Ok(MapLiteral { token, entries });
  }

  let (first, chain) = parts(list, "a map entry list")?;
  entries.push(populate_map_entry(first)?);
  let mut cur = chain;
  loop {
    let (head, tail) = parts(cur, "a map entry list")?;
    if head.is_token(TokenKind::Comma) {
      entries.push(populate_map_entry(tail)?);
      break;
    }
    let (_comma, entry) = parts(head, "a map entry list")?;
    entries.push(populate_map_entry(entry)?);
    cur = tail;
  }
  Ok(MapLiteral { token, entries })
}

fn populate_map_entry<'s>(stree: &SyntaxTree<'s>) -> Result<MapEntry<'s>, CompileError> {
  expect_production(stree, Production::MapEntry, "a map entry")?;
  let (key, rest) = parts(stree, "a map entry")?;
  let (colon, value) = parts(rest, "a map entry")?;
  Ok(MapEntry {
    colon: leaf_token(colon)?,
    key: Expression::populate(key)?,
    value: Expression::populate(value)?,
  })
}

fn produce_map(map: &MapLiteral, tape: &mut Tape) -> usize {
  let mut count = tape.ins(Op::Mnew, map.token.span);
  for entry in &map.entries {
    let span = entry.colon.span;
    count += tape.ins(Op::Push, span);
    count += entry.value.produce(tape);
    count += tape.ins(Op::Push, span);
    count += entry.key.produce(tape);
    count += tape.ins(Op::Push, span);
    count += tape.ins(Op::Mset, span);
  }
  count
}

fn populate_postfix<'s>(stree: &SyntaxTree<'s>) -> Result<PostfixChain<'s>, CompileError> {
  let (prefix, suffix) = parts(stree, "a postfix expression")?;
  let mut suffixes = ThinVec::new();
  populate_suffixes(suffix, &mut suffixes)?;
  Ok(PostfixChain {
    prefix: Box::new(Expression::populate(prefix)?),
    suffixes,
  })
}

pub(crate) fn populate_suffixes<'s>(
  suffix: &SyntaxTree<'s>,
  suffixes: &mut ThinVec<Postfix<'s>>,
) -> Result<(), CompileError> {
  let (head, tail) = parts(suffix, "a postfix suffix")?;
  let token = head.token().ok_or(CompileError::UnknownPostfix {
    span: suffix.span(),
  })?;
  match token.kind {
    TokenKind::Period => populate_field_suffix(token, tail, suffixes),
    TokenKind::LeftParen => {
      populate_surround_suffix(PostfixKind::Call, token, TokenKind::RightParen, tail, suffixes)
    }
    TokenKind::LeftBracket => {
      populate_surround_suffix(PostfixKind::Index, token, TokenKind::RightBracket, tail, suffixes)
    }
    _ => Err(CompileError::UnknownPostfix { span: token.span }),
  }
}

fn populate_field_suffix<'s>(
  token: Token<'s>,
  tail: &SyntaxTree<'s>,
  suffixes: &mut ThinVec<Postfix<'s>>,
) -> Result<(), CompileError> {
  // `.name` closing the chain, or `.name` followed by further suffixes
  if tail.is(Production::Identifier) || tail.is_token(TokenKind::New) {
    suffixes.push(Postfix {
      kind: PostfixKind::Field,
      token,
      id: Some(leaf_token(tail)?),
      argument: None,
    });
    return Ok(());
  }
  let (name, rest) = parts(tail, "a field access")?;
  suffixes.push(Postfix {
    kind: PostfixKind::Field,
    token,
    id: Some(leaf_token(name)?),
    argument: None,
  });
  populate_suffixes(rest, suffixes)
}

fn populate_surround_suffix<'s>(
  kind: PostfixKind,
  token: Token<'s>,
  close: TokenKind,
  tail: &SyntaxTree<'s>,
  suffixes: &mut ThinVec<Postfix<'s>>,
) -> Result<(), CompileError> {
  // no argument, closing the chain
  if tail.is_token(close) {
    suffixes.push(empty_suffix(kind, token)?);
    return Ok(());
  }
  // no argument, with further suffixes
  if tail.first().is_some_and(|first| first.is_token(close)) {
    suffixes.push(empty_suffix(kind, token)?);
    let (_close, rest) = parts(tail, "a postfix suffix")?;
    return populate_suffixes(rest, suffixes);
  }

  let (argument, rest) = parts(tail, "a call or index suffix")?;
  suffixes.push(Postfix {
    kind,
    token,
    id: None,
    argument: Some(Box::new(Expression::populate(argument)?)),
  });
  if rest.is_token(close) {
    return Ok(());
  }
  let (_close, rest) = parts(rest, "a call or index suffix")?;
  populate_suffixes(rest, suffixes)
}

fn empty_suffix<'s>(kind: PostfixKind, token: Token<'s>) -> Result<Postfix<'s>, CompileError> {
  match kind {
    PostfixKind::Call => Ok(Postfix {
      kind,
      token,
      id: None,
      argument: None,
    }),
    PostfixKind::Index | PostfixKind::Field => {
      Err(CompileError::UnknownPostfix { span: token.span })
    }
  }
}

pub(crate) fn produce_suffixes(suffixes: &[Postfix], tape: &mut Tape) -> usize {
  let mut count = 0;
  let mut position = 0;
  while position < suffixes.len() {
    let suffix = &suffixes[position];
    match suffix.kind {
      PostfixKind::Call => {
        count += tape.ins(Op::Push, suffix.token.span);
        if let Some(argument) = &suffix.argument {
          count += argument.produce(tape);
        }
        count += tape.ins(Op::Call, suffix.token.span);
      }
      PostfixKind::Index => {
        count += tape.ins(Op::Push, suffix.token.span);
        if let Some(argument) = &suffix.argument {
          count += argument.produce(tape);
        }
        count += tape.ins(Op::Aidx, suffix.token.span);
      }
      PostfixKind::Field => {
        let Some(name) = suffix.id else {
          unreachable!("field suffixes always carry a name")
        };
        // `.name(…)` collapses into a method call
        let next_call = suffixes
          .get(position + 1)
          .filter(|next| next.kind == PostfixKind::Call);
        if let Some(call) = next_call {
          count += tape.ins(Op::Push, call.token.span);
          if let Some(argument) = &call.argument {
            count += argument.produce(tape);
          }
          count += tape.ins_id(Op::Call, name.text, name.span);
          position += 1;
        } else {
          count += tape.ins_id(Op::Get, name.text, name.span);
        }
      }
    }
    position += 1;
  }
  count
}

fn populate_range<'s>(stree: &SyntaxTree<'s>) -> Result<Range<'s>, CompileError> {
  let (start, rest) = parts(stree, "a range expression")?;
  let (colon, tail) = parts(rest, "a range expression")?;
  let token = leaf_token(colon)?;
  let start = Box::new(Expression::populate(start)?);

  // `start:inc:end` nests the increment before a second colon
  if let (Some(increment), Some(rest)) = (tail.first(), tail.second()) {
    if let (Some(second_colon), Some(end)) = (rest.first(), rest.second()) {
      if second_colon.is_token(TokenKind::Colon) {
        return Ok(Range {
          token,
          start,
          increment: Some(Box::new(Expression::populate(increment)?)),
          end: Box::new(Expression::populate(end)?),
        });
      }
    }
  }
  Ok(Range {
    token,
    start,
    increment: None,
    end: Box::new(Expression::populate(tail)?),
  })
}

fn produce_range(range: &Range, tape: &mut Tape) -> usize {
  let span = range.token.span;
  let mut count = tape.ins_id(Op::Push, RANGE_FN, span);
  let mut arity = 2;
  if let Some(increment) = &range.increment {
    count += increment.produce(tape) + tape.ins(Op::Push, span);
    arity = 3;
  }
  count += range.end.produce(tape) + tape.ins(Op::Push, span);
  count += range.start.produce(tape) + tape.ins(Op::Push, span);
  count + tape.ins_int(Op::Tupl, arity, span) + tape.ins(Op::Call, span)
}

fn populate_unary<'s>(stree: &SyntaxTree<'s>) -> Result<Unary<'s>, CompileError> {
  let (operator, operand) = parts(stree, "a unary expression")?;
  let token = leaf_token(operator)?;
  let kind = match token.kind {
    TokenKind::Tilde => UnaryKind::Not,
    TokenKind::Exclamation => UnaryKind::NotC,
    TokenKind::Minus => UnaryKind::Negate,
    TokenKind::Const => UnaryKind::Const,
    _ => return Err(CompileError::UnknownOperator { span: token.span }),
  };
  Ok(Unary {
    kind,
    token,
    operand: Box::new(Expression::populate(operand)?),
  })
}

fn produce_unary(unary: &Unary, tape: &mut Tape) -> usize {
  let span = unary.token.span;
  if unary.kind == UnaryKind::Negate {
    if let Expression::Constant(constant) = unary.operand.as_ref() {
      if let Some(folded) = constant.value.negated() {
        return tape.ins_value(Op::Res, folded, span);
      }
    }
  }

  let count = unary.operand.produce(tape);
  count
    + match unary.kind {
      UnaryKind::Not => tape.ins(Op::Not, span),
      UnaryKind::NotC => tape.ins(Op::Notc, span),
      UnaryKind::Const => tape.ins(Op::Cnst, span),
      UnaryKind::Negate => {
        tape.ins(Op::Push, span) + tape.ins_int(Op::Push, -1, span) + tape.ins(Op::Mult, span)
      }
    }
}

fn chain_continuation(production: Production) -> Production {
  match production {
    Production::MultiplicativeExpression => Production::MultiplicativeExpression1,
    Production::AdditiveExpression => Production::AdditiveExpression1,
    Production::RelationalExpression => Production::RelationalExpression1,
    Production::EqualityExpression => Production::EqualityExpression1,
    Production::AndExpression => Production::AndExpression1,
    Production::XorExpression => Production::XorExpression1,
    Production::OrExpression => Production::OrExpression1,
    _ => unreachable!("only binary chain productions have continuations"),
  }
}

fn populate_binary<'s>(stree: &SyntaxTree<'s>) -> Result<BinaryChain<'s>, CompileError> {
  let chain = stree.production();
  let continuation = chain_continuation(chain);
  let (left, rest) = parts(stree, "a binary expression")?;
  let left = Box::new(Expression::populate(left)?);
  let mut suffixes = ThinVec::new();

  let mut cur = rest;
  loop {
    expect_production(cur, continuation, "a binary operator chain")?;
    let (operator, tail) = parts(cur, "a binary operator chain")?;
    let token = leaf_token(operator)?;
    let op = BinaryOp::from_token(token)?;
    // a tail of the chain's own production carries the next link
    if tail.is(chain) {
      let (operand, next) = parts(tail, "a binary operator chain")?;
      suffixes.push(BiSuffix {
        op,
        token,
        operand: Expression::populate(operand)?,
      });
      cur = next;
    } else {
      suffixes.push(BiSuffix {
        op,
        token,
        operand: Expression::populate(tail)?,
      });
      break;
    }
  }
  Ok(BinaryChain { left, suffixes })
}

fn produce_binary(chain: &BinaryChain, tape: &mut Tape) -> usize {
  let mut count = chain.left.produce(tape);
  for suffix in &chain.suffixes {
    count += tape.ins(Op::Push, suffix.token.span);
    count += suffix.operand.produce(tape);
    count += tape.ins(Op::Push, suffix.token.span);
    count += tape.ins(suffix.op.op(), suffix.token.span);
  }
  count
}

fn populate_in<'s>(stree: &SyntaxTree<'s>) -> Result<InExpression<'s>, CompileError> {
  let (element, rest) = parts(stree, "a membership test")?;
  let (in_part, collection) = parts(rest, "a membership test")?;
  let token = leaf_token(in_part)?;
  Ok(InExpression {
    negated: token.kind == TokenKind::NotIn,
    token,
    element: Box::new(Expression::populate(element)?),
    collection: Box::new(Expression::populate(collection)?),
  })
}

fn produce_in(in_expression: &InExpression, tape: &mut Tape) -> usize {
  let span = in_expression.token.span;
  let mut count = in_expression.collection.produce(tape);
  count += tape.ins(Op::Push, span);
  count += in_expression.element.produce(tape);
  count += tape.ins_id(Op::Call, IN_FN, span);
  if in_expression.negated {
    count += tape.ins(Op::Not, span);
  }
  count
}

fn populate_is<'s>(stree: &SyntaxTree<'s>) -> Result<IsExpression<'s>, CompileError> {
  let (operand, rest) = parts(stree, "a type test")?;
  let (is_part, type_expression) = parts(rest, "a type test")?;
  Ok(IsExpression {
    token: leaf_token(is_part)?,
    operand: Box::new(Expression::populate(operand)?),
    type_expression: Box::new(Expression::populate(type_expression)?),
  })
}

fn produce_is(is_expression: &IsExpression, tape: &mut Tape) -> usize {
  let span = is_expression.token.span;
  is_expression.operand.produce(tape)
    + tape.ins(Op::Push, span)
    + is_expression.type_expression.produce(tape)
    + tape.ins(Op::Push, span)
    + tape.ins(Op::Is, span)
}

/// Shape an `if`/`else if`/`else` chain, shared between conditional
/// expressions and selection statements.
///
/// `chain` is the production the chain continues itself with: an `else`
/// holding that production is another link rather than a final else body.
pub(crate) fn populate_if_else<'s>(
  stree: &SyntaxTree<'s>,
  chain: Production,
) -> Result<IfElse<'s>, CompileError> {
  let mut conditions = ThinVec::new();
  let mut else_body = None;

  let mut if_tree = stree;
  loop {
    let (if_part, rest) = parts(if_tree, "an if condition")?;
    let token = leaf_token(if_part)?;
    let (condition_tree, body_part) = parts(rest, "an if condition")?;
    // optional `then` between condition and body
    let body_part = if body_part.first().is_some_and(|first| first.is_token(TokenKind::Then)) {
      body_part.second().ok_or(CompileError::UnexpectedShape {
        expected: "an if body",
        span: body_part.span(),
      })?
    } else {
      body_part
    };
    // the else clause hangs off the body node
    let (body_tree, else_tree) = split_else(body_part);
    conditions.push(Conditional {
      token,
      condition: Expression::populate(condition_tree)?,
      body: Expression::populate(body_tree)?,
    });
    match else_tree {
      Some(tree) if tree.is(chain) => if_tree = tree,
      Some(tree) => {
        else_body = Some(Box::new(Expression::populate(tree)?));
        break;
      }
      None => break,
    }
  }
  Ok(IfElse {
    conditions,
    else_body,
  })
}

fn split_else<'a, 's>(body: &'a SyntaxTree<'s>) -> (&'a SyntaxTree<'s>, Option<&'a SyntaxTree<'s>>) {
  if let (Some(first), Some(second)) = (body.first(), body.second()) {
    if let (Some(else_part), Some(else_tree)) = (second.first(), second.second()) {
      if else_part.is_token(TokenKind::Else) {
        return (first, Some(else_tree));
      }
    }
  }
  (body, None)
}

/// Emit an `if`/`else if`/`else` chain.
///
/// Conditions are laid out first: each non-final condition is followed by an
/// `If` jumping forwards into its body when true, the final one by an `Ifn`
/// jumping past every body when false. Bodies follow in reverse order, each
/// closed by a `Jmp` to the end, with the else body last.
pub(crate) fn produce_if_else(if_else: &IfElse, tape: &mut Tape) -> usize {
  let mut condition_tapes = Vec::with_capacity(if_else.conditions.len());
  let mut body_tapes = Vec::with_capacity(if_else.conditions.len());
  let mut conditions_len = 0;
  let mut bodies_len = 0;
  for conditional in &if_else.conditions {
    let mut condition_tape = Tape::new();
    conditions_len += conditional.condition.produce(&mut condition_tape);
    condition_tapes.push(condition_tape);

    let mut body_tape = Tape::new();
    bodies_len += conditional.body.produce(&mut body_tape);
    body_tapes.push(body_tape);
  }
  let (else_tape, else_len) = match &if_else.else_body {
    Some(body) => {
      let mut else_tape = Tape::new();
      let else_len = body.produce(&mut else_tape);
      (Some(else_tape), else_len)
    }
    None => (None, 0),
  };

  let num_conditions = if_else.conditions.len();
  let has_else = else_tape.is_some();
  let trailing_jumps = if has_else { num_conditions } else { num_conditions - 1 };

  let mut count = 0;
  let body_lens: Vec<usize> = body_tapes.iter().map(Tape::len).collect();
  let mut conditions_after = conditions_len;
  let mut bodies_after = bodies_len;
  for (position, (conditional, condition_tape)) in
    if_else.conditions.iter().zip(condition_tapes).enumerate()
  {
    conditions_after -= condition_tape.len();
    bodies_after -= body_lens[position];
    count += tape.splice(condition_tape);
    let span = conditional.token.span;
    if position == num_conditions - 1 {
      count += tape.jump(Op::Ifn, offset(bodies_len + trailing_jumps), span);
    } else {
      let skipped = conditions_after + bodies_after + 2 * (num_conditions - 1 - position);
      count += tape.jump(Op::If, offset(skipped), span);
    }
  }

  let mut bodies_before = bodies_len;
  for (position, body_tape) in body_tapes.into_iter().enumerate().rev() {
    bodies_before -= body_tape.len();
    count += tape.splice(body_tape);
    if position > 0 || has_else {
      let jumps_between = if has_else { position } else { position - 1 };
      let span = if_else.conditions[position].token.span;
      count += tape.jump(Op::Jmp, offset(else_len + bodies_before + jumps_between), span);
    }
  }
  if let Some(else_tape) = else_tape {
    count += tape.splice(else_tape);
  }
  count
}

/// An error from compiling a syntax tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileError {
  /// A syntax tree node does not have the shape its production promises
  UnexpectedShape {
    /// What the compiler expected to find
    expected: &'static str,
    /// Where the mismatch was found
    span: Span,
  },
  /// An operator token with no corresponding instruction
  UnknownOperator {
    /// The operator's location
    span: Span,
  },
  /// A literal token which does not denote a value
  InvalidConstant {
    /// The literal's location
    span: Span,
  },
  /// An import form other than `import <identifier>`
  UnsupportedImport {
    /// The import statement's location
    span: Span,
  },
  /// A class name that is neither an identifier nor a name with parents
  UnknownClassName {
    /// The class name's location
    span: Span,
  },
  /// A statement kind that cannot appear in a class body
  UnknownClassStatement {
    /// The statement's location
    span: Span,
  },
  /// A postfix suffix that is not a field access, call, or index
  UnknownPostfix {
    /// The suffix's location
    span: Span,
  },
}

impl CompileError {
  /// The title of the error message
  #[must_use]
  pub fn title(&self) -> &'static str {
    match self {
      Self::UnexpectedShape { .. } => "Unexpected Syntax Shape",
      Self::UnknownOperator { .. } => "Unknown Operator",
      Self::InvalidConstant { .. } => "Invalid Constant",
      Self::UnsupportedImport { .. } => "Unsupported Import",
      Self::UnknownClassName { .. } => "Unknown Class Name",
      Self::UnknownClassStatement { .. } => "Unknown Class Statement",
      Self::UnknownPostfix { .. } => "Unknown Postfix",
    }
  }

  /// The body of the error message describing what has gone wrong
  #[must_use]
  pub fn message(&self) -> String {
    match self {
      Self::UnexpectedShape { expected, .. } => format!("expected {expected} at this position"),
      Self::UnknownOperator { .. } => "this operator has no matching instruction".into(),
      Self::InvalidConstant { .. } => "this token does not denote a constant value".into(),
      Self::UnsupportedImport { .. } => "only `import <identifier>` is supported".into(),
      Self::UnknownClassName { .. } => {
        "a class is named by an identifier, optionally with parent classes".into()
      }
      Self::UnknownClassStatement { .. } => {
        "only fields, methods, and a constructor can appear in a class body".into()
      }
      Self::UnknownPostfix { .. } => {
        "a postfix must be a field access, a call, or an index".into()
      }
    }
  }

  /// The location the error applies to
  #[must_use]
  pub fn span(&self) -> Span {
    match self {
      Self::UnexpectedShape { span, .. }
      | Self::UnknownOperator { span }
      | Self::InvalidConstant { span }
      | Self::UnsupportedImport { span }
      | Self::UnknownClassName { span }
      | Self::UnknownClassStatement { span }
      | Self::UnknownPostfix { span } => *span,
    }
  }
}

impl fmt::Display for CompileError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.message())
  }
}
impl error::Error for CompileError {}
