//! Function, method, and constructor definitions, argument binding, and the
//! file-level statement list.
//!
//! All four definition forms (named function, anonymous function, method,
//! constructor) share one shaping routine parameterised by their grammar
//! productions, and one argument-binding layout. A call passes either a single
//! value or a tuple of values in the result register; the binding prologue
//! sorts out which, fills in defaults for missing arguments, and binds each
//! argument as a local (or, in a constructor, as a field of `self`).

use crate::classes::CONSTRUCTOR_NAME;
use crate::collections::{String, ThinVec};
use crate::expression::{CompileError, Expression, expect_production, leaf_token, parts};
use crate::tape::{Op, Tape, index, offset};
use keel_syntax::{Production, Span, SyntaxTree, Token, TokenKind};

pub(crate) const SELF: &str = "self";

/// A function definition in any of its forms
#[derive(Debug)]
pub struct Function<'s> {
  pub(crate) def_token: Token<'s>,
  pub(crate) name: Option<Token<'s>>,
  pub(crate) is_const: bool,
  pub(crate) args: Option<Arguments<'s>>,
  pub(crate) body: Box<Expression<'s>>,
}

/// The declared arguments of a [`Function`]
#[derive(Debug)]
pub struct Arguments<'s> {
  pub(crate) token: Token<'s>,
  pub(crate) args: ThinVec<Argument<'s>>,
}

/// A single declared argument
#[derive(Debug)]
pub struct Argument<'s> {
  pub(crate) name: Token<'s>,
  pub(crate) is_const: bool,
  pub(crate) is_field: bool,
  pub(crate) default: Option<Expression<'s>>,
}

/// A `module` declaration
#[derive(Debug)]
pub struct Module<'s> {
  pub(crate) name: Token<'s>,
}

/// An `import` statement
#[derive(Debug)]
pub struct Import<'s> {
  pub(crate) name: Token<'s>,
}

/// The statement list of a whole source file
#[derive(Debug)]
pub struct FileStatements<'s> {
  pub(crate) statements: ThinVec<Expression<'s>>,
}

/// The grammar productions one definition form is spelled with
struct FunctionForm {
  description: &'static str,
  signature_const: Production,
  signature_nonconst: Production,
}

const NAMED_FUNCTION: FunctionForm = FunctionForm {
  description: "a function definition",
  signature_const: Production::FunctionSignatureConst,
  signature_nonconst: Production::FunctionSignatureNonconst,
};

const LAMBDA: FunctionForm = FunctionForm {
  description: "an anonymous function",
  signature_const: Production::AnonSignatureConst,
  signature_nonconst: Production::AnonSignatureNonconst,
};

const METHOD: FunctionForm = FunctionForm {
  description: "a method definition",
  signature_const: Production::MethodSignatureConst,
  signature_nonconst: Production::MethodSignatureNonconst,
};

const CONSTRUCTOR: FunctionForm = FunctionForm {
  description: "a constructor definition",
  signature_const: Production::NewSignatureConst,
  signature_nonconst: Production::NewSignatureNonconst,
};

fn populate_function_variant<'s>(
  stree: &SyntaxTree<'s>,
  form: &FunctionForm,
  set_def: impl FnOnce(&SyntaxTree<'s>) -> Result<(Token<'s>, Option<Token<'s>>), CompileError>,
  populate_args: impl FnOnce(&SyntaxTree<'s>, Token<'s>) -> Result<Option<Arguments<'s>>, CompileError>,
) -> Result<Function<'s>, CompileError> {
  let (mut signature, body) = parts(stree, form.description)?;

  // a const signature wraps the plain one, the `const` trailing
  let mut is_const = false;
  if signature.is(form.signature_const) {
    let (inner, _const_part) = parts(signature, form.description)?;
    is_const = true;
    signature = inner;
  }
  expect_production(signature, form.signature_nonconst, form.description)?;

  let (def_part, args_part) = parts(signature, form.description)?;
  let (def_token, name) = set_def(def_part)?;
  Ok(Function {
    def_token,
    name,
    is_const,
    args: populate_args(args_part, def_token)?,
    body: Box::new(Expression::populate(body)?),
  })
}

fn set_function_def<'s>(
  def_part: &SyntaxTree<'s>,
) -> Result<(Token<'s>, Option<Token<'s>>), CompileError> {
  expect_production(def_part, Production::DefIdentifier, "a function name")?;
  let (def_keyword, name) = parts(def_part, "a function name")?;
  Ok((leaf_token(def_keyword)?, Some(leaf_token(name)?)))
}

fn set_lambda_def<'s>(
  def_part: &SyntaxTree<'s>,
) -> Result<(Token<'s>, Option<Token<'s>>), CompileError> {
  expect_production(def_part, Production::AnonIdentifier, "an anonymous function")?;
  Ok((leaf_token(def_part)?, None))
}

fn set_method_def<'s>(
  def_part: &SyntaxTree<'s>,
) -> Result<(Token<'s>, Option<Token<'s>>), CompileError> {
  expect_production(def_part, Production::MethodIdentifier, "a method name")?;
  let (method_keyword, name) = parts(def_part, "a method name")?;
  Ok((leaf_token(method_keyword)?, Some(leaf_token(name)?)))
}

fn set_constructor_def<'s>(
  def_part: &SyntaxTree<'s>,
) -> Result<(Token<'s>, Option<Token<'s>>), CompileError> {
  let token = leaf_token(def_part)?;
  Ok((token, Some(token)))
}

/// The grammar productions one argument-list form is spelled with
struct ArgumentForm {
  description: &'static str,
  list: Production,
  list1: Production,
  const_arg: Production,
  with_default: Production,
  allow_field: bool,
}

const FUNCTION_ARGUMENT: ArgumentForm = ArgumentForm {
  description: "a function argument",
  list: Production::FunctionArgumentList,
  list1: Production::FunctionArgumentList1,
  const_arg: Production::ConstFunctionArgument,
  with_default: Production::FunctionArgEltWithDefault,
  allow_field: false,
};

const CONSTRUCTOR_ARGUMENT: ArgumentForm = ArgumentForm {
  description: "a constructor argument",
  list: Production::NewArgumentList,
  list1: Production::NewArgumentList1,
  const_arg: Production::ConstNewArgument,
  with_default: Production::NewArgEltWithDefault,
  allow_field: true,
};

fn populate_argument_form<'s>(
  stree: &SyntaxTree<'s>,
  form: &ArgumentForm,
) -> Result<Argument<'s>, CompileError> {
  if stree.is(form.const_arg) {
    let (_const_part, inner) = parts(stree, form.description)?;
    let mut argument = populate_argument_form(inner, form)?;
    argument.is_const = true;
    return Ok(argument);
  }
  if stree.is(form.with_default) {
    let (inner, rest) = parts(stree, form.description)?;
    let (_equals, default) = parts(rest, form.description)?;
    let mut argument = populate_argument_form(inner, form)?;
    argument.default = Some(Expression::populate(default)?);
    return Ok(argument);
  }
  if form.allow_field && stree.is(Production::NewFieldArg) {
    let (_field_part, name) = parts(stree, form.description)?;
    return Ok(Argument {
      name: leaf_token(name)?,
      is_const: false,
      is_field: true,
      default: None,
    });
  }
  Ok(Argument {
    name: leaf_token(stree)?,
    is_const: false,
    is_field: false,
    default: None,
  })
}

fn populate_argument_list<'s>(
  stree: &SyntaxTree<'s>,
  form: &ArgumentForm,
) -> Result<ThinVec<Argument<'s>>, CompileError> {
  let mut args = ThinVec::new();
  if !stree.is(form.list) {
    args.push(populate_argument_form(stree, form)?);
    return Ok(args);
  }
  let (first, rest) = parts(stree, form.description)?;
  args.push(populate_argument_form(first, form)?);

  let mut cur = rest;
  while cur.is(form.list1) {
    let (argument, tail) = parts(cur, form.description)?;
    args.push(populate_argument_form(argument, form)?);
    cur = tail;
  }
  args.push(populate_argument_form(cur, form)?);
  Ok(args)
}

fn set_args_with<'s>(
  args_part: &SyntaxTree<'s>,
  no_args: Production,
  present: Production,
  form: &ArgumentForm,
) -> Result<Option<Arguments<'s>>, CompileError> {
  if args_part.is(no_args) {
    return Ok(None);
  }
  expect_production(args_part, present, form.description)?;
  let (open, rest) = parts(args_part, form.description)?;
  let token = leaf_token(open)?;
  let (list, _close) = parts(rest, form.description)?;
  Ok(Some(Arguments {
    token,
    args: populate_argument_list(list, form)?,
  }))
}

fn set_function_args<'s>(
  args_part: &SyntaxTree<'s>,
  _def_token: Token<'s>,
) -> Result<Option<Arguments<'s>>, CompileError> {
  set_args_with(
    args_part,
    Production::FunctionArgumentsNoArgs,
    Production::FunctionArgumentsPresent,
    &FUNCTION_ARGUMENT,
  )
}

fn set_constructor_args<'s>(
  args_part: &SyntaxTree<'s>,
  _def_token: Token<'s>,
) -> Result<Option<Arguments<'s>>, CompileError> {
  set_args_with(
    args_part,
    Production::NewArgumentsNoArgs,
    Production::NewArgumentsPresent,
    &CONSTRUCTOR_ARGUMENT,
  )
}

pub(crate) fn populate_function_def<'s>(
  stree: &SyntaxTree<'s>,
) -> Result<Function<'s>, CompileError> {
  populate_function_variant(stree, &NAMED_FUNCTION, set_function_def, set_function_args)
}

pub(crate) fn populate_lambda<'s>(stree: &SyntaxTree<'s>) -> Result<Function<'s>, CompileError> {
  populate_function_variant(stree, &LAMBDA, set_lambda_def, set_function_args)
}

pub(crate) fn populate_method<'s>(stree: &SyntaxTree<'s>) -> Result<Function<'s>, CompileError> {
  populate_function_variant(stree, &METHOD, set_method_def, set_function_args)
}

pub(crate) fn populate_constructor<'s>(
  stree: &SyntaxTree<'s>,
) -> Result<Function<'s>, CompileError> {
  populate_function_variant(stree, &CONSTRUCTOR, set_constructor_def, set_constructor_args)
}

/// Bind one argument: a local variable, or a field of `self` in a constructor.
fn produce_argument(argument: &Argument, tape: &mut Tape) -> usize {
  let name = argument.name;
  if argument.is_field {
    let field_op = if argument.is_const { Op::Fldc } else { Op::Fld };
    return tape.ins(Op::Push, name.span)
      + tape.ins_id(Op::Res, SELF, name.span)
      + tape.ins_id(field_op, name.text, name.span);
  }
  let op = if argument.is_const { Op::Letc } else { Op::Let };
  tape.ins_id(op, name.text, name.span)
}

/// Bind every argument out of the passed tuple.
///
/// Argument `i` is taken with `Tget i`, the last through `Res` so the tuple is
/// dropped with it. A defaulted argument tests the tuple length first and
/// falls back to its default when the call site passed too few values.
fn produce_all_arguments(args: &[Argument], tape: &mut Tape) -> usize {
  let mut count = 0;
  for (position, argument) in args.iter().enumerate() {
    let span = argument.name.span;
    let fetch = if position + 1 == args.len() { Op::Res } else { Op::Peek };
    if let Some(default) = &argument.default {
      let mut default_tape = Tape::new();
      let default_len = default.produce(&mut default_tape);

      count += tape.ins(Op::Peek, span);
      count += tape.ins_int(Op::Tgte, index(position + 1), span);
      count += tape.jump(Op::Ifn, 3, span);
      count += tape.ins(fetch, span);
      count += tape.ins_int(Op::Tget, index(position), span);
      count += tape.jump(Op::Jmp, offset(default_len), span);
      count += tape.splice(default_tape);
    } else {
      count += tape.ins(fetch, span);
      count += tape.ins_int(Op::Tget, index(position), span);
    }
    count += produce_argument(argument, tape);
  }
  count
}

/// The argument-binding prologue of a produced function.
///
/// A single argument arrives as a bare value; several arrive as a tuple. With
/// several declared, a non-tuple value (its length reads as -1) can still be a
/// call with one value, handled by a separate path binding the rest to their
/// defaults.
fn produce_arguments(arguments: &Arguments, tape: &mut Tape) -> usize {
  let span = arguments.token.span;
  let args = &arguments.args;

  if let [argument] = args.as_slice() {
    let mut count = 0;
    if let Some(default) = &argument.default {
      let mut default_tape = Tape::new();
      let default_len = default.produce(&mut default_tape);

      count += tape.ins(Op::Push, span);
      count += tape.ins_int(Op::Tgte, 1, span);
      count += tape.jump(Op::If, offset(default_len) + 1, span);
      count += tape.splice(default_tape);
      count += tape.jump(Op::Jmp, 1, span);
      count += tape.ins_int(Op::Tget, 0, span);
    }
    return count + produce_argument(argument, tape);
  }

  let mut count = tape.ins(Op::Push, span);
  count += tape.ins(Op::Tlen, span);
  count += tape.ins(Op::Push, span);
  count += tape.ins_int(Op::Push, -1, span);
  count += tape.ins(Op::Eq, span);

  let mut nondefaults = Tape::new();
  produce_all_arguments(args, &mut nondefaults);

  let mut defaults = Tape::new();
  defaults.ins(Op::Res, span);
  if let Some((first, rest)) = args.split_first() {
    produce_argument(first, &mut defaults);
    for argument in rest {
      match &argument.default {
        Some(default) => default.produce(&mut defaults),
        None => defaults.ins(Op::Rnil, argument.name.span),
      };
      produce_argument(argument, &mut defaults);
    }
  }
  defaults.jump(Op::Jmp, offset(nondefaults.len()), span);

  count += tape.jump(Op::Ifn, offset(defaults.len()), span);
  count += tape.splice(defaults);
  count + tape.splice(nondefaults)
}

/// Produce a named function or method: label, argument binding, body, return.
pub(crate) fn produce_function(function: &Function, tape: &mut Tape) -> usize {
  let span = function.def_token.span;
  let name = function.name.map_or(CONSTRUCTOR_NAME, |name| name.text);
  let count = tape.label(name, span);
  count + produce_function_tail(function, tape, false)
}

/// Produce a declared constructor's argument binding, body, and return.
/// The opening label and field initialisation come from the class production.
pub(crate) fn produce_constructor_tail(constructor: &Function, tape: &mut Tape) -> usize {
  produce_function_tail(constructor, tape, true)
}

fn produce_function_tail(function: &Function, tape: &mut Tape, returns_self: bool) -> usize {
  let span = function.def_token.span;
  let mut count = 0;
  if let Some(arguments) = &function.args {
    count += produce_arguments(arguments, tape);
  }
  count += function.body.produce(tape);
  if returns_self {
    count += tape.ins_id(Op::Res, SELF, span);
  }
  if function.is_const {
    count += tape.ins(Op::Cnst, span);
  }
  count + tape.ins(Op::Ret, span)
}

/// Produce an anonymous function in place.
///
/// The definition is labelled and jumped over where it appears; the value of
/// the expression is the labelled function looked up through `self`.
pub(crate) fn produce_lambda(function: &Function, tape: &mut Tape) -> usize {
  let span = function.def_token.span;
  let name = anon_name(span);

  let mut body = Tape::new();
  let body_len = produce_function_tail(function, &mut body, false);

  let mut count = tape.jump(Op::Jmp, offset(body_len) + 1, span);
  count += tape.label(&name, span);
  count += tape.splice(body);
  count += tape.ins_id(Op::Res, SELF, span);
  count + tape.ins_id(Op::Get, &name, span)
}

/// Anonymous functions are named by where they appear, keeping labels unique
/// within a file.
fn anon_name(span: Span) -> String {
  format!("$anon_{}", span.start).into()
}

pub(crate) fn populate_module<'s>(stree: &SyntaxTree<'s>) -> Result<Module<'s>, CompileError> {
  expect_production(stree, Production::ModuleStatement, "a module declaration")?;
  let (_module_part, name) = parts(stree, "a module declaration")?;
  Ok(Module {
    name: leaf_token(name)?,
  })
}

pub(crate) fn populate_import<'s>(stree: &SyntaxTree<'s>) -> Result<Import<'s>, CompileError> {
  expect_production(stree, Production::ImportStatement, "an import statement")?;
  let (_import_part, target) = parts(stree, "an import statement")?;
  if !target.is(Production::Identifier) && !target.is_token(TokenKind::Identifier) {
    return Err(CompileError::UnsupportedImport {
      span: target.span(),
    });
  }
  Ok(Import {
    name: leaf_token(target)?,
  })
}

pub(crate) fn populate_file<'s>(
  stree: &SyntaxTree<'s>,
) -> Result<FileStatements<'s>, CompileError> {
  expect_production(
    stree,
    Production::FileLevelStatementList,
    "a file statement list",
  )?;
  let mut statements = ThinVec::new();
  let (first, rest) = parts(stree, "a file statement list")?;
  statements.push(Expression::populate(first)?);

  let mut cur = rest;
  while cur.is(Production::FileLevelStatementList1) {
    let (statement, tail) = parts(cur, "a file statement list")?;
    statements.push(Expression::populate(statement)?);
    cur = tail;
  }
  statements.push(Expression::populate(cur)?);
  Ok(FileStatements { statements })
}

/// Produce a whole file: definitions are jumped over where they appear, and
/// execution falls off the end into `Exit 0`.
pub(crate) fn produce_file(file: &FileStatements, tape: &mut Tape) -> usize {
  let mut count = 0;
  for statement in &file.statements {
    count += match definition_token(statement) {
      Some(token) => {
        let mut definition = Tape::new();
        let definition_len = statement.produce(&mut definition);
        tape.jump(Op::Jmp, offset(definition_len), token.span) + tape.splice(definition)
      }
      None => statement.produce(tape),
    };
  }
  count + tape.ins_int(Op::Exit, 0, Span::default())
}

fn definition_token<'s>(statement: &Expression<'s>) -> Option<Token<'s>> {
  match statement {
    Expression::Function(function) => Some(function.def_token),
    Expression::Class(class) => Some(class.name),
    _ => None,
  }
}
