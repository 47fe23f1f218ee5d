use std::fmt;

use itertools::Itertools;

use crate::value::Value;
use crate::vm::InvalidBytecode;

/// A wrapper around the bytes of an [`f64`]. We do this to keep [`Bytecode`]
/// comparable and small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Number([u8; 8]);

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Self(value.to_ne_bytes())
    }
}

impl From<Number> for f64 {
    fn from(Number(bytes): Number) -> Self {
        Self::from_ne_bytes(bytes)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", f64::from(*self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bytecode {
    Pop,
    Const(u32),
    ConstNil,
    ConstTrue,
    ConstFalse,
    ConstNumber(Number),
    UnaryMinus,
    UnaryNot,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Local(u32),
    StoreLocal(u32),
    JumpIfTrue(u32),
    JumpIfFalse(u32),
    PopJumpIfFalse(u32),
    Jump(u32),
    Print,
    End,
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Bytecode::*;
        match self {
            Pop => write!(f, "pop"),
            Const(constant) => write!(f, "const {constant}"),
            ConstNil => write!(f, "const_nil"),
            ConstTrue => write!(f, "const_true"),
            ConstFalse => write!(f, "const_false"),
            ConstNumber(number) => write!(f, "const_number {number}"),
            UnaryMinus => write!(f, "unary_minus"),
            UnaryNot => write!(f, "unary_not"),
            Equal => write!(f, "equal"),
            NotEqual => write!(f, "not_equal"),
            Less => write!(f, "less"),
            LessEqual => write!(f, "less_equal"),
            Greater => write!(f, "greater"),
            GreaterEqual => write!(f, "greater_equal"),
            Add => write!(f, "add"),
            Subtract => write!(f, "subtract"),
            Multiply => write!(f, "multiply"),
            Divide => write!(f, "divide"),
            Modulo => write!(f, "modulo"),
            Local(slot) => write!(f, "load_local {slot}"),
            StoreLocal(slot) => write!(f, "store_local {slot}"),
            JumpIfTrue(target) => write!(f, "jump_if_true {target}"),
            JumpIfFalse(target) => write!(f, "jump_if_false {target}"),
            PopJumpIfFalse(target) => write!(f, "pop_jump_if_false {target}"),
            Jump(target) => write!(f, "jump {target}"),
            Print => write!(f, "print"),
            End => write!(f, "end"),
        }
    }
}

/// The compiled form of a program. Immutable once the compiler has produced
/// it; the VM only reads from it.
#[derive(Debug)]
pub struct Chunk<'a> {
    pub(crate) code: Vec<Bytecode>,
    pub(crate) constants: Vec<Value<'a>>,
    pub(crate) local_count: u32,
}

impl Chunk<'_> {
    pub fn disassemble(&self) -> String {
        self.code
            .iter()
            .enumerate()
            .map(|(pc, bytecode)| format!("{pc:>5}   {bytecode}"))
            .join("\n")
    }
}

pub(crate) fn validate_bytecode(chunk: &Chunk) -> Result<(), InvalidBytecode> {
    use Bytecode::*;

    if !matches!(chunk.code.last(), Some(End)) {
        return Err(InvalidBytecode::NoEnd);
    }

    let valid_jump_targets = 0..u32::try_from(chunk.code.len()).unwrap();

    for &bytecode in &chunk.code {
        match bytecode {
            Jump(target) | JumpIfTrue(target) | JumpIfFalse(target) | PopJumpIfFalse(target) =>
                if !valid_jump_targets.contains(&target) {
                    return Err(InvalidBytecode::JumpOutOfBounds);
                },
            Const(constant) =>
                if usize::try_from(constant).unwrap() >= chunk.constants.len() {
                    return Err(InvalidBytecode::ConstantOutOfBounds);
                },
            Local(slot) | StoreLocal(slot) =>
                if slot >= chunk.local_count {
                    return Err(InvalidBytecode::LocalOutOfBounds);
                },
            Pop
            | ConstNil
            | ConstTrue
            | ConstFalse
            | ConstNumber(_)
            | UnaryMinus
            | UnaryNot
            | Equal
            | NotEqual
            | Less
            | LessEqual
            | Greater
            | GreaterEqual
            | Add
            | Subtract
            | Multiply
            | Divide
            | Modulo
            | Print
            | End => (),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Bytecode::*;
    use super::*;

    fn chunk(code: Vec<Bytecode>) -> Chunk<'static> {
        Chunk { code, constants: vec![Value::String("s")], local_count: 1 }
    }

    #[test]
    fn valid_chunk_passes() {
        let chunk = chunk(vec![
            ConstNumber(Number::from(1.0)),
            StoreLocal(0),
            Pop,
            Local(0),
            PopJumpIfFalse(6),
            Jump(3),
            Const(0),
            Print,
            End,
        ]);
        assert_eq!(validate_bytecode(&chunk), Ok(()));
    }

    #[test]
    fn empty_chunk_has_no_end() {
        assert_eq!(validate_bytecode(&chunk(vec![])), Err(InvalidBytecode::NoEnd));
    }

    #[test]
    fn missing_end_is_rejected() {
        let chunk = chunk(vec![ConstNil, Pop]);
        assert_eq!(validate_bytecode(&chunk), Err(InvalidBytecode::NoEnd));
    }

    #[test]
    fn jump_past_the_end_is_rejected() {
        let chunk = chunk(vec![Jump(5), End]);
        assert_eq!(validate_bytecode(&chunk), Err(InvalidBytecode::JumpOutOfBounds));
    }

    #[test]
    fn unpatched_jump_is_rejected() {
        let chunk = chunk(vec![ConstTrue, JumpIfTrue(u32::MAX), End]);
        assert_eq!(validate_bytecode(&chunk), Err(InvalidBytecode::JumpOutOfBounds));
    }

    #[test]
    fn constant_index_is_range_checked() {
        let chunk = chunk(vec![Const(1), Pop, End]);
        assert_eq!(validate_bytecode(&chunk), Err(InvalidBytecode::ConstantOutOfBounds));
    }

    #[test]
    fn local_slot_is_range_checked() {
        let chunk = chunk(vec![ConstNil, StoreLocal(1), Pop, End]);
        assert_eq!(validate_bytecode(&chunk), Err(InvalidBytecode::LocalOutOfBounds));
    }

    #[test]
    fn disassembly_lists_one_instruction_per_line() {
        let chunk = chunk(vec![ConstNumber(Number::from(2.0)), Print, End]);
        assert_eq!(
            chunk.disassemble(),
            "    0   const_number 2\n    1   print\n    2   end",
        );
    }
}
