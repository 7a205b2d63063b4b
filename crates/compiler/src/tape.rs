//! The linear instruction tape the compiler produces onto.
//!
//! A tape is an owned list of instructions. Constructs whose layout depends on
//! the size of code not yet emitted (loop bodies, catch blocks, argument
//! defaults) are produced onto a detached tape first and spliced in once the
//! surrounding jumps are known.
//!
//! Jump operands count instructions, never bytes, and are relative to the
//! instruction after the jump: a jump at index `i` with offset `d` moves
//! control to index `i + 1 + d`.

use crate::collections::String;
use crate::value::Value;
use keel_syntax::Span;
use std::fmt;

/// An operation of the keel virtual machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs, reason = "mnemonics mirror the instruction set")]
pub enum Op {
  // Misc
  Nop,
  Exit,

  // Result register and stack
  Res,
  Rnil,
  Push,
  Peek,
  Dup,

  // Tuples
  Tupl,
  Tget,
  Tgte,
  Tlen,

  // Variables
  Set,
  Setc,
  Let,
  Letc,
  Get,

  // Arithmetic
  Add,
  Sub,
  Mult,
  Div,
  Mod,

  // Comparison and logic
  Not,
  Notc,
  Gt,
  Lt,
  Gte,
  Lte,
  Eq,
  Neq,
  And,
  Or,
  Xor,
  Is,

  // Control flow
  If,
  Ifn,
  Jmp,
  Nblk,
  Bblk,
  Call,
  Ret,
  Rais,
  Ctch,

  // Arrays and maps
  Anew,
  Aidx,
  Aset,
  Mnew,
  Mset,

  // Objects and modules
  Fld,
  Fldc,
  Cnst,
  Lmdl,

  // Assembler rows
  Label,
  Module,
  Class,
  ClassExtends,
  EndClass,
}

/// A relative jump distance, counted in instructions
///
/// `break` and `continue` cannot know their distance when emitted: the loop
/// body is produced onto a detached tape before the loop head exists. They are
/// emitted as the matching unresolved variant and rewritten to [`Resolved`]
/// by the loop production before the body is spliced in.
///
/// [`Resolved`]: PendingJump::Resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingJump {
  /// Jump out of the enclosing loop; resolved by the loop production
  Break,
  /// Jump to the enclosing loop's re-test step; resolved by the loop production
  Continue,
  /// A resolved relative offset
  Resolved(i32),
}

/// The operand of an [`Instruction`]
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
  /// No operand
  None,
  /// A constant value
  Value(Value),
  /// An identifier name
  Id(String),
  /// A string literal
  Str(String),
  /// A relative jump, possibly not yet resolved
  Jump(PendingJump),
  /// A class opening carrying the class name and its ordered parents
  ClassDef {
    /// The class name
    name: String,
    /// Parent class names, in declaration order
    parents: Vec<String>,
  },
}

/// A single row of a [`Tape`]
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
  /// The operation
  pub op: Op,
  /// The operand
  pub operand: Operand,
  /// The source range the instruction was produced from
  pub span: Span,
}

/// A sequence of instructions
#[must_use]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Tape {
  instructions: Vec<Instruction>,
}

impl Tape {
  /// Create an empty tape
  pub fn new() -> Self {
    Self {
      instructions: Vec::new(),
    }
  }

  /// The number of instructions on the tape
  #[must_use]
  pub fn len(&self) -> usize {
    self.instructions.len()
  }

  /// Is the tape empty?
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.instructions.is_empty()
  }

  /// The instruction at `index`
  ///
  /// # Panics
  /// Panics if `index` is past the end of the tape.
  #[must_use]
  pub fn get(&self, index: usize) -> &Instruction {
    &self.instructions[index]
  }

  /// Iterate over the instructions
  pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
    self.instructions.iter()
  }

  pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Instruction> {
    self.instructions.iter_mut()
  }

  fn push(&mut self, op: Op, operand: Operand, span: Span) -> usize {
    self.instructions.push(Instruction { op, operand, span });
    1
  }

  /// Append an instruction with no operand; returns the count appended
  pub fn ins(&mut self, op: Op, span: Span) -> usize {
    self.push(op, Operand::None, span)
  }

  /// Append an instruction with an integer value operand
  pub fn ins_int(&mut self, op: Op, value: i64, span: Span) -> usize {
    self.push(op, Operand::Value(Value::Int(value)), span)
  }

  /// Append an instruction with a constant value operand
  pub fn ins_value(&mut self, op: Op, value: Value, span: Span) -> usize {
    self.push(op, Operand::Value(value), span)
  }

  /// Append an instruction with an identifier operand
  pub fn ins_id(&mut self, op: Op, id: &str, span: Span) -> usize {
    self.push(op, Operand::Id(id.into()), span)
  }

  /// Append an instruction with a string literal operand
  pub fn ins_str(&mut self, op: Op, text: &str, span: Span) -> usize {
    self.push(op, Operand::Str(text.into()), span)
  }

  /// Append an instruction with a jump operand
  pub fn ins_jump(&mut self, op: Op, jump: PendingJump, span: Span) -> usize {
    self.push(op, Operand::Jump(jump), span)
  }

  /// Append a jump instruction with an already known offset
  pub fn jump(&mut self, op: Op, offset: i32, span: Span) -> usize {
    self.ins_jump(op, PendingJump::Resolved(offset), span)
  }

  /// Append a function label row
  pub fn label(&mut self, name: &str, span: Span) -> usize {
    self.push(Op::Label, Operand::Id(name.into()), span)
  }

  /// Append a module declaration row
  pub fn module(&mut self, name: &str, span: Span) -> usize {
    self.push(Op::Module, Operand::Id(name.into()), span)
  }

  /// Append a class opening row
  pub fn class(&mut self, name: &str, span: Span) -> usize {
    self.push(Op::Class, Operand::Id(name.into()), span)
  }

  /// Append a class opening row with ordered parent classes
  pub fn class_extends(&mut self, name: &str, parents: Vec<String>, span: Span) -> usize {
    self.push(
      Op::ClassExtends,
      Operand::ClassDef {
        name: name.into(),
        parents,
      },
      span,
    )
  }

  /// Append a class closing row
  pub fn end_class(&mut self, span: Span) -> usize {
    self.ins(Op::EndClass, span)
  }

  /// Move every instruction of `tail` onto the end of this tape;
  /// returns the count appended
  pub fn splice(&mut self, tail: Tape) -> usize {
    let appended = tail.instructions.len();
    self.instructions.extend(tail.instructions);
    appended
  }
}

impl fmt::Display for Tape {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "      ╭─[Tape]")?;
    for (position, instruction) in self.instructions.iter().enumerate() {
      write!(f, " {position:0>4} │ ")?;
      match (instruction.op, &instruction.operand) {
        (Op::Label, Operand::Id(name)) => writeln!(f, "@{name}")?,
        (Op::Module, Operand::Id(name)) => writeln!(f, "module {name}")?,
        (Op::Class, Operand::Id(name)) => writeln!(f, "class {name}")?,
        (Op::ClassExtends, Operand::ClassDef { name, parents }) => {
          writeln!(f, "class {name} extends {}", parents.join(", "))?;
        }
        (op, Operand::None) => writeln!(f, "{op:?}")?,
        (op, Operand::Value(value)) => writeln!(f, "{op:?} {value}")?,
        (op, Operand::Id(name)) => writeln!(f, "{op:?} {name}")?,
        (op, Operand::Str(text)) => writeln!(f, "{op:?} '{text}'")?,
        (op, Operand::Jump(PendingJump::Resolved(jump))) => {
          let target = i64::from(*jump) + index(position) + 1;
          writeln!(f, "{op:?} {jump} ({target:0>4})")?;
        }
        (op, Operand::Jump(pending)) => writeln!(f, "{op:?} {pending:?}")?,
        (op, operand) => writeln!(f, "{op:?} {operand:?}")?,
      }
    }
    write!(f, "──────╯")
  }
}

#[allow(
  clippy::cast_possible_truncation,
  clippy::cast_possible_wrap,
  reason = "tapes are far shorter than i32::MAX"
)]
pub(crate) fn offset(distance: usize) -> i32 {
  distance as i32
}

#[allow(clippy::cast_possible_wrap, reason = "tape indices are far below i64::MAX")]
pub(crate) fn index(value: usize) -> i64 {
  value as i64
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn emit_helpers_count_one_instruction() {
    let mut tape = Tape::new();
    let mut count = tape.ins(Op::Nop, Span::default());
    count += tape.ins_int(Op::Tupl, 2, Span::default());
    count += tape.ins_id(Op::Res, "x", Span::default());
    count += tape.ins_str(Op::Res, "hello", Span::default());
    count += tape.jump(Op::Jmp, -2, Span::default());
    count += tape.label("main", Span::default());

    assert_eq!(count, 6);
    assert_eq!(tape.len(), 6);
    assert_eq!(tape.get(1).operand, Operand::Value(Value::Int(2)));
    assert_eq!(tape.get(4).operand, Operand::Jump(PendingJump::Resolved(-2)));
  }

  #[test]
  fn splice_moves_the_tail_and_reports_its_length() {
    let mut head = Tape::new();
    head.ins(Op::Nblk, Span::default());

    let mut tail = Tape::new();
    tail.ins(Op::Res, Span::default());
    tail.ins(Op::Bblk, Span::default());

    let appended = head.splice(tail);
    assert_eq!(appended, 2);
    assert_eq!(head.len(), 3);
    assert_eq!(head.get(2).op, Op::Bblk);
  }

  #[test]
  fn display_lists_rows_with_jump_targets() {
    let mut tape = Tape::new();
    tape.label("main", Span::default());
    tape.ins_id(Op::Res, "x", Span::default());
    tape.jump(Op::Jmp, -2, Span::default());
    tape.ins_int(Op::Exit, 0, Span::default());

    let listing = "      ╭─[Tape]\n 0000 │ @main\n 0001 │ Res x\n 0002 │ Jmp -2 (0001)\n 0003 │ Exit 0\n──────╯";
    assert_eq!(tape.to_string(), listing);
  }
}
