//! Class definitions: fields, methods, constructors, and inheritance.
//!
//! A class produces an opening row naming it (and its ordered parents), the
//! constructor, every method, and a closing row. When a class declares fields
//! a constructor is always produced, synthesising one when none was declared,
//! so that every instance starts with its fields bound to `Nil`.

use crate::collections::ThinVec;
use crate::expression::{CompileError, expect_production, leaf_token, parts};
use crate::functions::{self, Function, SELF};
use crate::tape::{Op, Tape};
use keel_syntax::{Production, SyntaxTree, Token};

pub(crate) const CONSTRUCTOR_NAME: &str = "new";
const NIL_KEYWORD: &str = "Nil";

/// A class definition
#[derive(Debug)]
pub struct Class<'s> {
  pub(crate) name: Token<'s>,
  pub(crate) parents: ThinVec<Token<'s>>,
  pub(crate) fields: ThinVec<Token<'s>>,
  pub(crate) constructor: Option<Function<'s>>,
  pub(crate) methods: ThinVec<Function<'s>>,
}

pub(crate) fn populate_class<'s>(stree: &SyntaxTree<'s>) -> Result<Class<'s>, CompileError> {
  expect_production(stree, Production::ClassDefinition, "a class definition")?;
  let (_class_part, rest) = parts(stree, "a class definition")?;
  let (name_part, body) = parts(rest, "a class definition")?;

  let (name, parents) = populate_class_name(name_part)?;
  let mut class = Class {
    name,
    parents,
    fields: ThinVec::new(),
    constructor: None,
    methods: ThinVec::new(),
  };
  populate_class_body(body, &mut class)?;
  Ok(class)
}

fn populate_class_name<'s>(
  stree: &SyntaxTree<'s>,
) -> Result<(Token<'s>, ThinVec<Token<'s>>), CompileError> {
  if stree.is(Production::Identifier) {
    return Ok((leaf_token(stree)?, ThinVec::new()));
  }
  if !stree.is(Production::ClassNameAndInheritance) {
    return Err(CompileError::UnknownClassName { span: stree.span() });
  }

  let (name, parent_part) = parts(stree, "a class name")?;
  let name = leaf_token(name)?;
  expect_production(parent_part, Production::ParentClasses, "parent classes")?;
  let (_extends, list) = parts(parent_part, "parent classes")?;

  let mut parents = ThinVec::new();
  if list.is(Production::Identifier) {
    parents.push(leaf_token(list)?);
    return Ok((name, parents));
  }
  expect_production(list, Production::ParentClassList, "a parent class list")?;
  let (first, chain) = parts(list, "a parent class list")?;
  parents.push(leaf_token(first)?);

  let mut cur = chain;
  loop {
    let (head, tail) = parts(cur, "a parent class list")?;
    if head.is_leaf() {
      parents.push(leaf_token(tail)?);
      break;
    }
    let (_comma, parent) = parts(head, "a parent class list")?;
    parents.push(leaf_token(parent)?);
    cur = tail;
  }
  Ok((name, parents))
}

fn populate_class_body<'s>(
  stree: &SyntaxTree<'s>,
  class: &mut Class<'s>,
) -> Result<(), CompileError> {
  expect_production(stree, Production::ClassCompoundStatement, "a class body")?;
  let (_open, rest) = parts(stree, "a class body")?;
  if rest.is_leaf() {
    return Ok(());
  }
  let (list, _close) = parts(rest, "a class body")?;
  populate_class_statements(list, class)
}

fn populate_class_statements<'s>(
  list: &SyntaxTree<'s>,
  class: &mut Class<'s>,
) -> Result<(), CompileError> {
  if !list.is(Production::ClassStatementList) {
    return populate_class_statement(list, class);
  }
  let (first, rest) = parts(list, "a class statement list")?;
  populate_class_statement(first, class)?;

  let mut cur = rest;
  while cur.is(Production::ClassStatementList1) {
    let (statement, tail) = parts(cur, "a class statement list")?;
    populate_class_statement(statement, class)?;
    cur = tail;
  }
  populate_class_statement(cur, class)
}

fn populate_class_statement<'s>(
  stree: &SyntaxTree<'s>,
  class: &mut Class<'s>,
) -> Result<(), CompileError> {
  match stree.production() {
    Production::FieldStatement => populate_field_statement(stree, class),
    Production::MethodDefinition => {
      class.methods.push(functions::populate_method(stree)?);
      Ok(())
    }
    Production::NewDefinition => {
      class.constructor = Some(functions::populate_constructor(stree)?);
      Ok(())
    }
    _ => Err(CompileError::UnknownClassStatement { span: stree.span() }),
  }
}

fn populate_field_statement<'s>(
  stree: &SyntaxTree<'s>,
  class: &mut Class<'s>,
) -> Result<(), CompileError> {
  let (_field_part, list) = parts(stree, "a field statement")?;
  if list.is(Production::Identifier) {
    class.fields.push(leaf_token(list)?);
    return Ok(());
  }
  expect_production(list, Production::IdentifierList, "a field name list")?;
  let (first, chain) = parts(list, "a field name list")?;
  class.fields.push(leaf_token(first)?);

  let mut cur = chain;
  loop {
    let (head, tail) = parts(cur, "a field name list")?;
    if head.is_leaf() {
      class.fields.push(leaf_token(tail)?);
      break;
    }
    let (_comma, field) = parts(head, "a field name list")?;
    class.fields.push(leaf_token(field)?);
    cur = tail;
  }
  Ok(())
}

pub(crate) fn produce_class(class: &Class, tape: &mut Tape) -> usize {
  let span = class.name.span;
  let mut count = if class.parents.is_empty() {
    tape.class(class.name.text, span)
  } else {
    let parents = class.parents.iter().map(|parent| parent.text.into()).collect();
    tape.class_extends(class.name.text, parents, span)
  };
  if class.constructor.is_some() || !class.fields.is_empty() {
    count += produce_constructor(class, tape);
  }
  for method in &class.methods {
    count += functions::produce_function(method, tape);
  }
  count + tape.end_class(span)
}

/// Produce the constructor, synthesising one when the class declares fields
/// but no `new`.
///
/// Field initialisation runs before the declared constructor body, binding
/// every declared field of the fresh instance to `Nil`.
fn produce_constructor(class: &Class, tape: &mut Tape) -> usize {
  let span = class.name.span;
  let mut count = tape.label(CONSTRUCTOR_NAME, span);

  if !class.fields.is_empty() {
    count += tape.ins(Op::Push, span);
    for field in &class.fields {
      count += tape.ins_id(Op::Push, NIL_KEYWORD, field.span);
      count += tape.ins_id(Op::Res, SELF, field.span);
      count += tape.ins_id(Op::Fld, field.text, field.span);
    }
    count += tape.ins(Op::Res, span);
  }

  match &class.constructor {
    Some(constructor) => count + functions::produce_constructor_tail(constructor, tape),
    None => {
      count += tape.ins_id(Op::Res, SELF, span);
      count + tape.ins(Op::Ret, span)
    }
  }
}
