use crate::tape::{Instruction, Op, Operand, PendingJump, Tape};
use crate::value::Value;
use crate::{CompileError, Expression, compile};
use indoc::indoc;
use keel_syntax::{Production, Span, SyntaxTree, Token, TokenKind};

fn token(kind: TokenKind, text: &str) -> SyntaxTree<'_> {
  SyntaxTree::leaf(Production::Token, Token::new(kind, text, Span::default()))
}

fn leaf<'s>(production: Production, kind: TokenKind, text: &'s str) -> SyntaxTree<'s> {
  SyntaxTree::leaf(production, Token::new(kind, text, Span::default()))
}

fn branch<'s>(
  production: Production,
  first: SyntaxTree<'s>,
  second: SyntaxTree<'s>,
) -> SyntaxTree<'s> {
  SyntaxTree::branch(production, first, second)
}

fn glue<'s>(first: SyntaxTree<'s>, second: SyntaxTree<'s>) -> SyntaxTree<'s> {
  branch(Production::Token, first, second)
}

fn identifier(name: &str) -> SyntaxTree<'_> {
  leaf(Production::Identifier, TokenKind::Identifier, name)
}

fn number(text: &str) -> SyntaxTree<'_> {
  leaf(Production::Constant, TokenKind::Number, text)
}

fn parens(inner: SyntaxTree<'_>) -> SyntaxTree<'_> {
  glue(
    token(TokenKind::LeftParen, "("),
    glue(inner, token(TokenKind::RightParen, ")")),
  )
}

fn if_else<'s>(
  production: Production,
  condition: SyntaxTree<'s>,
  body: SyntaxTree<'s>,
  else_tree: Option<SyntaxTree<'s>>,
) -> SyntaxTree<'s> {
  let body_part = match else_tree {
    Some(else_tree) => glue(body, glue(token(TokenKind::Else, "else"), else_tree)),
    None => body,
  };
  branch(
    production,
    token(TokenKind::If, "if"),
    glue(condition, body_part),
  )
}

fn function_def<'s>(
  name: &'s str,
  args_part: SyntaxTree<'s>,
  body: SyntaxTree<'s>,
) -> SyntaxTree<'s> {
  branch(
    Production::FunctionDefinition,
    branch(
      Production::FunctionSignatureNonconst,
      branch(
        Production::DefIdentifier,
        token(TokenKind::Def, "def"),
        identifier(name),
      ),
      args_part,
    ),
    body,
  )
}

fn no_args() -> SyntaxTree<'static> {
  leaf(Production::FunctionArgumentsNoArgs, TokenKind::LeftParen, "(")
}

fn args_present(list: SyntaxTree<'_>) -> SyntaxTree<'_> {
  branch(
    Production::FunctionArgumentsPresent,
    token(TokenKind::LeftParen, "("),
    glue(list, token(TokenKind::RightParen, ")")),
  )
}

fn arg_default<'s>(name: &'s str, default: SyntaxTree<'s>) -> SyntaxTree<'s> {
  branch(
    Production::FunctionArgEltWithDefault,
    identifier(name),
    glue(token(TokenKind::Equal, "="), default),
  )
}

fn ops(tape: &Tape) -> Vec<Op> {
  tape.iter().map(|instruction| instruction.op).collect()
}

fn resolved(instruction: &Instruction) -> i32 {
  match instruction.operand {
    Operand::Jump(PendingJump::Resolved(jump)) => jump,
    ref operand => panic!("expected a resolved jump, found {operand:?}"),
  }
}

fn target(tape: &Tape, position: usize) -> usize {
  let jump = i64::from(resolved(tape.get(position)));
  usize::try_from(i64::try_from(position).unwrap() + 1 + jump).unwrap()
}

fn id(name: &str) -> Operand {
  Operand::Id(name.into())
}

#[test]
fn identifiers_and_literals_load_the_result_register() {
  let tape = compile(&identifier("x")).unwrap();
  assert_eq!(ops(&tape), [Op::Res]);
  assert_eq!(tape.get(0).operand, id("x"));

  let tape = compile(&number("42")).unwrap();
  assert_eq!(tape.get(0).operand, Operand::Value(Value::Int(42)));

  let string = leaf(Production::StringLiteral, TokenKind::String, "'hi'");
  let tape = compile(&string).unwrap();
  assert_eq!(tape.get(0).operand, Operand::Str("hi".into()));
}

#[test]
fn unary_minus_folds_number_literals() {
  let tree = branch(
    Production::UnaryExpression,
    token(TokenKind::Minus, "-"),
    number("3"),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(ops(&tape), [Op::Res]);
  assert_eq!(tape.get(0).operand, Operand::Value(Value::Int(-3)));
}

#[test]
fn unary_minus_multiplies_everything_else() {
  let tree = branch(
    Production::UnaryExpression,
    token(TokenKind::Minus, "-"),
    identifier("x"),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(ops(&tape), [Op::Res, Op::Push, Op::Push, Op::Mult]);
  assert_eq!(tape.get(2).operand, Operand::Value(Value::Int(-1)));
}

#[test]
fn binary_chains_stay_left_associative() {
  // a + b - c
  let tree = branch(
    Production::AdditiveExpression,
    identifier("a"),
    branch(
      Production::AdditiveExpression1,
      token(TokenKind::Plus, "+"),
      branch(
        Production::AdditiveExpression,
        identifier("b"),
        branch(
          Production::AdditiveExpression1,
          token(TokenKind::Minus, "-"),
          identifier("c"),
        ),
      ),
    ),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(
    ops(&tape),
    [
      Op::Res,
      Op::Push,
      Op::Res,
      Op::Push,
      Op::Add,
      Op::Push,
      Op::Res,
      Op::Push,
      Op::Sub,
    ]
  );
}

#[test]
fn tuples_produce_elements_in_reverse() {
  let tree = branch(
    Production::TupleExpression,
    identifier("a"),
    branch(
      Production::TupleExpression1,
      token(TokenKind::Comma, ","),
      identifier("b"),
    ),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(ops(&tape), [Op::Res, Op::Push, Op::Res, Op::Push, Op::Tupl]);
  assert_eq!(tape.get(0).operand, id("b"));
  assert_eq!(tape.get(2).operand, id("a"));
  assert_eq!(tape.get(4).operand, Operand::Value(Value::Int(2)));
}

#[test]
fn arrays_produce_their_elements() {
  let empty = branch(
    Production::ArrayDeclaration,
    token(TokenKind::LeftBracket, "["),
    token(TokenKind::RightBracket, "]"),
  );
  assert_eq!(ops(&compile(&empty).unwrap()), [Op::Anew]);

  let single = branch(
    Production::ArrayDeclaration,
    token(TokenKind::LeftBracket, "["),
    glue(number("1"), token(TokenKind::RightBracket, "]")),
  );
  let tape = compile(&single).unwrap();
  assert_eq!(ops(&tape), [Op::Res, Op::Push, Op::Anew]);
  assert_eq!(tape.get(2).operand, Operand::Value(Value::Int(1)));
}

#[test]
fn maps_store_each_entry() {
  let entry = branch(
    Production::MapEntry,
    identifier("a"),
    glue(token(TokenKind::Colon, ":"), identifier("b")),
  );
  let tree = branch(
    Production::MapDeclaration,
    token(TokenKind::LeftBrace, "{"),
    glue(entry, token(TokenKind::RightBrace, "}")),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(
    ops(&tape),
    [Op::Mnew, Op::Push, Op::Res, Op::Push, Op::Res, Op::Push, Op::Mset]
  );
  assert_eq!(tape.get(2).operand, id("b"));
  assert_eq!(tape.get(4).operand, id("a"));
}

#[test]
fn ranges_call_the_range_builtin() {
  let tree = branch(
    Production::RangeExpression,
    identifier("a"),
    glue(token(TokenKind::Colon, ":"), identifier("b")),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(
    ops(&tape),
    [Op::Push, Op::Res, Op::Push, Op::Res, Op::Push, Op::Tupl, Op::Call]
  );
  assert_eq!(tape.get(0).operand, id("range"));
  assert_eq!(tape.get(5).operand, Operand::Value(Value::Int(2)));
}

#[test]
fn membership_tests_call_in() {
  let tree = branch(
    Production::InExpression,
    identifier("x"),
    glue(token(TokenKind::In, "in"), identifier("xs")),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(ops(&tape), [Op::Res, Op::Push, Op::Res, Op::Call]);
  assert_eq!(tape.get(3).operand, id("__in__"));

  let negated = branch(
    Production::InExpression,
    identifier("x"),
    glue(token(TokenKind::NotIn, "notin"), identifier("xs")),
  );
  let tape = compile(&negated).unwrap();
  assert_eq!(ops(&tape), [Op::Res, Op::Push, Op::Res, Op::Call, Op::Not]);
}

#[test]
fn type_tests_produce_is() {
  let tree = branch(
    Production::IsExpression,
    identifier("x"),
    glue(token(TokenKind::Is, "is"), identifier("Int")),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(ops(&tape), [Op::Res, Op::Push, Op::Res, Op::Push, Op::Is]);
}

#[test]
fn conditional_without_else_skips_the_body() {
  let tree = if_else(
    Production::ConditionalExpression,
    identifier("c"),
    identifier("x"),
    None,
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(ops(&tape), [Op::Res, Op::Ifn, Op::Res]);
  assert_eq!(target(&tape, 1), 3);
}

#[test]
fn two_branch_if_else_jumps_between_bodies() {
  let tree = if_else(
    Production::SelectionStatement,
    identifier("c"),
    identifier("x"),
    Some(identifier("y")),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(ops(&tape), [Op::Res, Op::Ifn, Op::Res, Op::Jmp, Op::Res]);
  assert_eq!(target(&tape, 1), 4);
  assert_eq!(target(&tape, 3), 5);
  assert_eq!(tape.get(2).operand, id("x"));
  assert_eq!(tape.get(4).operand, id("y"));
}

#[test]
fn elif_chains_share_one_layout() {
  let inner = if_else(
    Production::SelectionStatement,
    identifier("c1"),
    identifier("b1"),
    Some(identifier("e")),
  );
  let tree = if_else(
    Production::SelectionStatement,
    identifier("c0"),
    identifier("b0"),
    Some(inner),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(
    ops(&tape),
    [
      Op::Res, // c0
      Op::If,
      Op::Res, // c1
      Op::Ifn,
      Op::Res, // b1
      Op::Jmp,
      Op::Res, // b0
      Op::Jmp,
      Op::Res, // e
    ]
  );
  // condition zero jumps into its own body, laid out after b1
  assert_eq!(target(&tape, 1), 6);
  assert_eq!(tape.get(6).operand, id("b0"));
  // the final condition falls into the else body when false
  assert_eq!(target(&tape, 3), 8);
  // both bodies finish past the else
  assert_eq!(target(&tape, 5), 9);
  assert_eq!(target(&tape, 7), 9);
}

#[test]
fn while_loops_retest_and_breaks_escape() {
  let tree = branch(
    Production::WhileStatement,
    token(TokenKind::While, "while"),
    glue(
      parens(identifier("c")),
      leaf(Production::BreakStatement, TokenKind::Break, "break"),
    ),
  );
  let tape = compile(&tree).unwrap();
  let listing = indoc! {"
          ╭─[Tape]
     0000 │ Nblk
     0001 │ Res c
     0002 │ Ifn 2 (0005)
     0003 │ Jmp 1 (0005)
     0004 │ Jmp -4 (0001)
     0005 │ Bblk
    ──────╯"};
  assert_eq!(tape.to_string(), listing);
}

#[test]
fn for_loop_continue_lands_on_the_increment() {
  let header = parens(glue(
    identifier("i"),
    glue(
      token(TokenKind::Comma, ","),
      glue(
        identifier("c"),
        glue(token(TokenKind::Comma, ","), identifier("k")),
      ),
    ),
  ));
  let tree = branch(
    Production::ForStatement,
    token(TokenKind::For, "for"),
    glue(
      header,
      leaf(Production::BreakStatement, TokenKind::Continue, "continue"),
    ),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(
    ops(&tape),
    [Op::Nblk, Op::Res, Op::Res, Op::Ifn, Op::Jmp, Op::Res, Op::Jmp, Op::Bblk]
  );
  // exit jump clears the increment as well as the body
  assert_eq!(target(&tape, 3), 7);
  // continue runs the increment
  assert_eq!(target(&tape, 4), 5);
  assert_eq!(tape.get(5).operand, id("k"));
  // the back jump retests the condition
  assert_eq!(target(&tape, 6), 2);
}

#[test]
fn foreach_drives_the_iterator_protocol() {
  let header = parens(glue(
    identifier("x"),
    glue(token(TokenKind::In, "in"), identifier("t")),
  ));
  let tree = branch(
    Production::ForeachStatement,
    token(TokenKind::For, "for"),
    glue(
      header,
      leaf(Production::BreakStatement, TokenKind::Break, "break"),
    ),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(
    ops(&tape),
    [
      Op::Nblk,
      Op::Res,  // the iterable
      Op::Push,
      Op::Call, // iter
      Op::Push,
      Op::Dup,
      Op::Call, // has_next
      Op::Ifn,
      Op::Dup,
      Op::Call, // next
      Op::Set,
      Op::Jmp,  // break
      Op::Jmp,  // back to has_next
      Op::Res,
      Op::Bblk,
    ]
  );
  assert_eq!(tape.get(3).operand, id("iter"));
  assert_eq!(tape.get(6).operand, id("has_next"));
  assert_eq!(tape.get(9).operand, id("next"));
  assert_eq!(tape.get(10).operand, id("x"));
  assert_eq!(target(&tape, 7), 13);
  assert_eq!(target(&tape, 11), 13);
  assert_eq!(target(&tape, 12), 5);
}

#[test]
fn try_catch_meets_at_the_handler_reset() {
  let catch_assign = branch(
    Production::CatchAssign,
    token(TokenKind::LeftParen, "("),
    glue(identifier("e"), token(TokenKind::RightParen, ")")),
  );
  let tree = branch(
    Production::TryStatement,
    token(TokenKind::Try, "try"),
    glue(
      identifier("t"),
      glue(
        token(TokenKind::Catch, "catch"),
        glue(catch_assign, identifier("c")),
      ),
    ),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(
    ops(&tape),
    [Op::Ctch, Op::Res, Op::Jmp, Op::Set, Op::Res, Op::Rnil, Op::Set]
  );
  // the handler lands on the catch binding
  assert_eq!(target(&tape, 0), 3);
  assert_eq!(tape.get(3).operand, id("e"));
  // a clean try body skips to the reset
  assert_eq!(target(&tape, 2), 5);
  assert_eq!(tape.get(6).operand, id("$try_goto"));
}

#[test]
fn jump_statements_produce_their_instructions() {
  let bare = leaf(Production::JumpStatement, TokenKind::Return, "return");
  assert_eq!(ops(&compile(&bare).unwrap()), [Op::Rnil, Op::Ret]);

  let valued = branch(
    Production::JumpStatement,
    token(TokenKind::Return, "return"),
    identifier("v"),
  );
  assert_eq!(ops(&compile(&valued).unwrap()), [Op::Res, Op::Ret]);

  let raise = branch(
    Production::RaiseStatement,
    token(TokenKind::Raise, "raise"),
    identifier("err"),
  );
  assert_eq!(ops(&compile(&raise).unwrap()), [Op::Res, Op::Rais]);

  let exit = leaf(Production::ExitStatement, TokenKind::Exit, "exit");
  assert_eq!(ops(&compile(&exit).unwrap()), [Op::Exit]);
}

#[test]
fn blocks_produce_statements_in_order() {
  let list = branch(Production::StatementList, identifier("a"), identifier("b"));
  let tree = branch(
    Production::CompoundStatement,
    token(TokenKind::LeftBrace, "{"),
    glue(list, token(TokenKind::RightBrace, "}")),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(ops(&tape), [Op::Res, Op::Res]);
  assert_eq!(tape.get(0).operand, id("a"));
  assert_eq!(tape.get(1).operand, id("b"));
}

#[test]
fn a_single_defaulted_argument_tests_the_tuple_length() {
  let tree = function_def("f", args_present(arg_default("x", number("3"))), identifier("b"));
  let tape = compile(&tree).unwrap();
  assert_eq!(
    ops(&tape),
    [
      Op::Label,
      Op::Push,
      Op::Tgte,
      Op::If,
      Op::Res, // the default
      Op::Jmp,
      Op::Tget,
      Op::Let,
      Op::Res, // the body
      Op::Ret,
    ]
  );
  // a passed value skips the default
  assert_eq!(target(&tape, 3), 6);
  // the default skips the tuple access
  assert_eq!(target(&tape, 5), 7);
  assert_eq!(tape.get(4).operand, Operand::Value(Value::Int(3)));
  assert_eq!(tape.get(7).operand, id("x"));
}

#[test]
fn several_arguments_split_single_value_and_tuple_paths() {
  let list = branch(
    Production::FunctionArgumentList,
    identifier("a"),
    arg_default("b", number("2")),
  );
  let tree = function_def("f", args_present(list), identifier("c"));
  let tape = compile(&tree).unwrap();
  assert_eq!(tape.len(), 25);

  // a non-tuple value binds the first argument and defaults the rest
  assert_eq!(target(&tape, 6), 12);
  assert_eq!(tape.get(7).op, Op::Res);
  assert_eq!(tape.get(8).operand, id("a"));
  assert_eq!(tape.get(9).operand, Operand::Value(Value::Int(2)));
  assert_eq!(tape.get(10).operand, id("b"));
  assert_eq!(target(&tape, 11), 23);

  // on the tuple path the defaulted argument tests the tuple length
  assert_eq!(tape.get(16).op, Op::Tgte);
  assert_eq!(target(&tape, 17), 21);
  assert_eq!(target(&tape, 20), 22);
  assert_eq!(tape.get(22).operand, id("b"));
  assert_eq!(tape.get(24).op, Op::Ret);
}

#[test]
fn classes_with_fields_synthesise_a_constructor() {
  let name_part = branch(
    Production::ClassNameAndInheritance,
    identifier("C"),
    branch(
      Production::ParentClasses,
      token(TokenKind::Extends, "extends"),
      identifier("A"),
    ),
  );
  let body = branch(
    Production::ClassCompoundStatement,
    token(TokenKind::LeftBrace, "{"),
    glue(
      branch(
        Production::FieldStatement,
        token(TokenKind::Field, "field"),
        identifier("x"),
      ),
      token(TokenKind::RightBrace, "}"),
    ),
  );
  let tree = branch(
    Production::ClassDefinition,
    token(TokenKind::Class, "class"),
    glue(name_part, body),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(
    ops(&tape),
    [
      Op::ClassExtends,
      Op::Label,
      Op::Push,
      Op::Push, // Nil
      Op::Res,  // self
      Op::Fld,
      Op::Res,
      Op::Res, // self
      Op::Ret,
      Op::EndClass,
    ]
  );
  assert_eq!(
    tape.get(0).operand,
    Operand::ClassDef {
      name: "C".into(),
      parents: vec!["A".into()],
    }
  );
  assert_eq!(tape.get(1).operand, id("new"));
  assert_eq!(tape.get(3).operand, id("Nil"));
  assert_eq!(tape.get(5).operand, id("x"));
}

#[test]
fn parent_classes_keep_their_declaration_order() {
  // class C extends A, B, D {}
  let parent_list = branch(
    Production::ParentClassList,
    identifier("A"),
    glue(
      glue(token(TokenKind::Comma, ","), identifier("B")),
      glue(token(TokenKind::Comma, ","), identifier("D")),
    ),
  );
  let name_part = branch(
    Production::ClassNameAndInheritance,
    identifier("C"),
    branch(
      Production::ParentClasses,
      token(TokenKind::Extends, "extends"),
      parent_list,
    ),
  );
  let body = branch(
    Production::ClassCompoundStatement,
    token(TokenKind::LeftBrace, "{"),
    token(TokenKind::RightBrace, "}"),
  );
  let tree = branch(
    Production::ClassDefinition,
    token(TokenKind::Class, "class"),
    glue(name_part, body),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(ops(&tape), [Op::ClassExtends, Op::EndClass]);
  assert_eq!(
    tape.get(0).operand,
    Operand::ClassDef {
      name: "C".into(),
      parents: vec!["A".into(), "B".into(), "D".into()],
    }
  );
}

#[test]
fn method_calls_fuse_field_and_call() {
  // a.b(c)
  let call = glue(
    token(TokenKind::LeftParen, "("),
    glue(identifier("c"), token(TokenKind::RightParen, ")")),
  );
  let suffix = glue(
    token(TokenKind::Period, "."),
    glue(identifier("b"), call),
  );
  let tree = branch(Production::PostfixExpression, identifier("a"), suffix);
  let tape = compile(&tree).unwrap();
  assert_eq!(ops(&tape), [Op::Res, Op::Push, Op::Res, Op::Call]);
  assert_eq!(tape.get(3).operand, id("b"));
}

#[test]
fn indexing_reads_and_writes() {
  // a[i]
  let read = branch(
    Production::PostfixExpression,
    identifier("a"),
    glue(
      token(TokenKind::LeftBracket, "["),
      glue(identifier("i"), token(TokenKind::RightBracket, "]")),
    ),
  );
  assert_eq!(
    ops(&compile(&read).unwrap()),
    [Op::Res, Op::Push, Op::Res, Op::Aidx]
  );

  // a[i] = 5
  let target_tree = branch(
    Production::PostfixExpression,
    identifier("a"),
    glue(
      token(TokenKind::LeftBracket, "["),
      glue(identifier("i"), token(TokenKind::RightBracket, "]")),
    ),
  );
  let write = branch(
    Production::AssignmentExpression,
    target_tree,
    glue(token(TokenKind::Equal, "="), number("5")),
  );
  let tape = compile(&write).unwrap();
  assert_eq!(
    ops(&tape),
    [Op::Res, Op::Push, Op::Res, Op::Push, Op::Res, Op::Aset]
  );
  assert_eq!(tape.get(0).operand, Operand::Value(Value::Int(5)));
}

#[test]
fn destructuring_peeks_each_element() {
  // (x, y) = t
  let pattern = branch(
    Production::AssignmentTuple,
    token(TokenKind::LeftParen, "("),
    glue(
      glue(
        identifier("x"),
        glue(token(TokenKind::Comma, ","), identifier("y")),
      ),
      token(TokenKind::RightParen, ")"),
    ),
  );
  let tree = branch(
    Production::AssignmentExpression,
    pattern,
    glue(token(TokenKind::Equal, "="), identifier("t")),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(
    ops(&tape),
    [
      Op::Res,
      Op::Push,
      Op::Peek,
      Op::Tget,
      Op::Set,
      Op::Peek,
      Op::Tget,
      Op::Set,
      Op::Res,
    ]
  );
  assert_eq!(tape.get(4).operand, id("x"));
  assert_eq!(tape.get(7).operand, id("y"));
}

#[test]
fn lambdas_are_labelled_and_jumped_over() {
  let signature = branch(
    Production::AnonSignatureNonconst,
    leaf(Production::AnonIdentifier, TokenKind::Def, "def"),
    no_args(),
  );
  let tree = branch(Production::AnonFunctionDefinition, signature, identifier("b"));
  let tape = compile(&tree).unwrap();
  assert_eq!(
    ops(&tape),
    [Op::Jmp, Op::Label, Op::Res, Op::Ret, Op::Res, Op::Get]
  );
  assert_eq!(target(&tape, 0), 4);
  assert_eq!(tape.get(1).operand, id("$anon_0"));
  assert_eq!(tape.get(4).operand, id("self"));
  assert_eq!(tape.get(5).operand, id("$anon_0"));
}

#[test]
fn files_jump_over_definitions_and_exit() {
  let tree = branch(
    Production::FileLevelStatementList,
    function_def("g", no_args(), identifier("b")),
    identifier("s"),
  );
  let tape = compile(&tree).unwrap();
  assert_eq!(
    ops(&tape),
    [Op::Jmp, Op::Label, Op::Res, Op::Ret, Op::Res, Op::Exit]
  );
  assert_eq!(target(&tape, 0), 4);
  assert_eq!(tape.get(1).operand, id("g"));
  assert_eq!(tape.get(4).operand, id("s"));
  assert_eq!(tape.get(5).operand, Operand::Value(Value::Int(0)));
}

#[test]
fn modules_declare_and_imports_load() {
  let module = branch(
    Production::ModuleStatement,
    token(TokenKind::Module, "module"),
    identifier("m"),
  );
  let tape = compile(&module).unwrap();
  assert_eq!(ops(&tape), [Op::Module]);

  let import = branch(
    Production::ImportStatement,
    token(TokenKind::Import, "import"),
    identifier("m"),
  );
  let tape = compile(&import).unwrap();
  assert_eq!(ops(&tape), [Op::Lmdl]);
  assert_eq!(tape.get(0).operand, id("m"));
}

#[test]
fn malformed_trees_are_rejected() {
  let import = branch(
    Production::ImportStatement,
    token(TokenKind::Import, "import"),
    number("3"),
  );
  assert!(matches!(
    compile(&import),
    Err(CompileError::UnsupportedImport { .. })
  ));

  let class_body = branch(
    Production::ClassCompoundStatement,
    token(TokenKind::LeftBrace, "{"),
    glue(identifier("x"), token(TokenKind::RightBrace, "}")),
  );
  let class = branch(
    Production::ClassDefinition,
    token(TokenKind::Class, "class"),
    glue(identifier("C"), class_body),
  );
  assert!(matches!(
    compile(&class),
    Err(CompileError::UnknownClassStatement { .. })
  ));

  // a() = 1 has no place to store into
  let call_target = branch(
    Production::PostfixExpression,
    identifier("a"),
    glue(token(TokenKind::LeftParen, "("), token(TokenKind::RightParen, ")")),
  );
  let assign = branch(
    Production::AssignmentExpression,
    call_target,
    glue(token(TokenKind::Equal, "="), number("1")),
  );
  assert!(matches!(
    compile(&assign),
    Err(CompileError::UnexpectedShape { .. })
  ));
}

#[test]
fn produce_reports_the_exact_instruction_count() {
  let trees = [
    identifier("x"),
    branch(
      Production::AdditiveExpression,
      identifier("a"),
      branch(
        Production::AdditiveExpression1,
        token(TokenKind::Plus, "+"),
        identifier("b"),
      ),
    ),
    if_else(
      Production::SelectionStatement,
      identifier("c"),
      identifier("x"),
      Some(identifier("y")),
    ),
    branch(
      Production::WhileStatement,
      token(TokenKind::While, "while"),
      glue(
        parens(identifier("c")),
        leaf(Production::BreakStatement, TokenKind::Break, "break"),
      ),
    ),
    function_def("f", args_present(arg_default("x", number("3"))), identifier("b")),
  ];
  for tree in &trees {
    let expression = Expression::populate(tree).unwrap();
    let mut tape = Tape::new();
    let count = expression.produce(&mut tape);
    assert_eq!(count, tape.len());
  }
}

#[test]
fn loops_leave_no_pending_jumps() {
  let body = branch(
    Production::CompoundStatement,
    token(TokenKind::LeftBrace, "{"),
    glue(
      branch(
        Production::StatementList,
        leaf(Production::BreakStatement, TokenKind::Break, "break"),
        leaf(Production::BreakStatement, TokenKind::Continue, "continue"),
      ),
      token(TokenKind::RightBrace, "}"),
    ),
  );
  let tree = branch(
    Production::WhileStatement,
    token(TokenKind::While, "while"),
    glue(parens(identifier("c")), body),
  );
  let tape = compile(&tree).unwrap();
  let unresolved = tape
    .iter()
    .filter(|instruction| {
      matches!(
        instruction.operand,
        Operand::Jump(PendingJump::Break | PendingJump::Continue)
      )
    })
    .count();
  assert_eq!(unresolved, 0);
}
