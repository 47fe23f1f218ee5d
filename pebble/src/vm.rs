use std::cmp::Ordering;

use bumpalo::Bump;
use thiserror::Error;

use crate::bytecode::validate_bytecode;
use crate::bytecode::Bytecode;
use crate::bytecode::Chunk;
use crate::diagnostics::Diagnostics;
use crate::value::Value;

const STACK_SIZE: usize = 256;
const LOCALS_SIZE: usize = 256;

trait Cast {
    type Target;

    fn cast(self) -> Self::Target;
}

impl Cast for u32 {
    type Target = usize;

    fn cast(self) -> Self::Target {
        usize::try_from(self).unwrap()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum InvalidBytecode {
    #[error("missing end instruction")]
    NoEnd,
    #[error("jump target out of bounds")]
    JumpOutOfBounds,
    #[error("constant index out of bounds")]
    ConstantOutOfBounds,
    #[error("local slot out of bounds")]
    LocalOutOfBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum OpenError {
    #[error("arena exhausted while allocating the value stack")]
    OutOfMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum LoadError {
    #[error(transparent)]
    Invalid(#[from] InvalidBytecode),
    #[error("program needs {needed} local slots, more than the VM provides")]
    TooManyLocals { needed: u32 },
    #[error("arena exhausted while allocating local slots")]
    OutOfMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum RuntimeError {
    #[error("unsupported operand types for `{op}`: {lhs} and {rhs}")]
    BinaryType {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("unsupported operand type for `{op}`: {operand}")]
    UnaryType {
        op: &'static str,
        operand: &'static str,
    },
    #[error("value stack overflow")]
    StackOverflow,
}

/// How one trip through the execution host went. Only the driver decides
/// whether a non-completed outcome affects the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    OpenFailed,
    LoadFailed,
    RuntimeError,
}

/// A freshly opened VM: value stack allocated, no program loaded yet.
pub(crate) struct Vm<'a> {
    bump: &'a Bump,
    stack: &'a mut [Value<'a>; STACK_SIZE],
    sp: usize,
}

impl<'a> Vm<'a> {
    pub(crate) fn open(bump: &'a Bump) -> Result<Self, OpenError> {
        let stack = bump
            .try_alloc_with(|| [Value::Nil; STACK_SIZE])
            .map_err(|_| OpenError::OutOfMemory)?;
        Ok(Self { bump, stack, sp: 0 })
    }

    pub(crate) fn load<'b>(
        self,
        chunk: &'b Chunk<'a>,
    ) -> Result<LoadedVm<'a, 'b>, LoadError> {
        validate_bytecode(chunk)?;
        if chunk.local_count.cast() > LOCALS_SIZE {
            return Err(LoadError::TooManyLocals { needed: chunk.local_count });
        }
        let locals = self
            .bump
            .try_alloc_with(|| [Value::Nil; LOCALS_SIZE])
            .map_err(|_| LoadError::OutOfMemory)?;
        Ok(LoadedVm { vm: self, chunk, locals, pc: 0 })
    }
}

/// A VM with a validated program loaded. Driven through `begin`, `run`,
/// `end`, `close`, in that order, exactly once each.
pub(crate) struct LoadedVm<'a, 'b> {
    vm: Vm<'a>,
    chunk: &'b Chunk<'a>,
    locals: &'a mut [Value<'a>; LOCALS_SIZE],
    pc: usize,
}

impl<'a> LoadedVm<'a, '_> {
    pub(crate) fn begin(&mut self) {
        self.pc = 0;
        self.vm.sp = 0;
    }

    pub(crate) fn run(&mut self) -> Result<(), RuntimeError> {
        use Bytecode::*;
        loop {
            let bytecode = self.chunk.code[self.pc];
            self.pc += 1;
            match bytecode {
                Pop => {
                    self.pop();
                }
                Const(constant) => self.push(self.chunk.constants[constant.cast()])?,
                ConstNil => self.push(Value::Nil)?,
                ConstTrue => self.push(Value::Bool(true))?,
                ConstFalse => self.push(Value::Bool(false))?,
                ConstNumber(number) => self.push(Value::Number(number.into()))?,
                UnaryMinus => match self.pop() {
                    Value::Number(n) => self.push(Value::Number(-n))?,
                    operand => {
                        return Err(RuntimeError::UnaryType {
                            op: "-",
                            operand: operand.type_name(),
                        })
                    }
                },
                UnaryNot => {
                    let value = self.pop();
                    self.push(Value::Bool(!value.is_truthy()))?;
                }
                Equal => {
                    let rhs = self.pop();
                    let lhs = self.pop();
                    self.push(Value::Bool(lhs == rhs))?;
                }
                NotEqual => {
                    let rhs = self.pop();
                    let lhs = self.pop();
                    self.push(Value::Bool(lhs != rhs))?;
                }
                Less => self.comparison("<", Ordering::is_lt)?,
                LessEqual => self.comparison("<=", Ordering::is_le)?,
                Greater => self.comparison(">", Ordering::is_gt)?,
                GreaterEqual => self.comparison(">=", Ordering::is_ge)?,
                Add => self.add()?,
                Subtract => self.arithmetic("-", |a, b| a - b)?,
                Multiply => self.arithmetic("*", |a, b| a * b)?,
                Divide => self.arithmetic("/", |a, b| a / b)?,
                Modulo => self.arithmetic("%", |a, b| a % b)?,
                Local(slot) => self.push(self.locals[slot.cast()])?,
                StoreLocal(slot) => self.locals[slot.cast()] = self.peek(),
                JumpIfTrue(target) =>
                    if self.peek().is_truthy() {
                        self.pc = target.cast();
                    }
                    else {
                        self.pop();
                    },
                JumpIfFalse(target) =>
                    if !self.peek().is_truthy() {
                        self.pc = target.cast();
                    }
                    else {
                        self.pop();
                    },
                PopJumpIfFalse(target) =>
                    if !self.pop().is_truthy() {
                        self.pc = target.cast();
                    },
                Jump(target) => self.pc = target.cast(),
                Print => println!("{}", self.pop()),
                End => break Ok(()),
            }
        }
    }

    pub(crate) fn end(&mut self) {
        self.vm.sp = 0;
    }

    pub(crate) fn close(self) {}

    fn push(&mut self, value: Value<'a>) -> Result<(), RuntimeError> {
        if self.vm.sp == self.vm.stack.len() {
            return Err(RuntimeError::StackOverflow);
        }
        self.vm.stack[self.vm.sp] = value;
        self.vm.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value<'a> {
        self.vm.sp -= 1;
        self.vm.stack[self.vm.sp]
    }

    fn peek(&self) -> Value<'a> {
        self.vm.stack[self.vm.sp - 1]
    }

    fn add(&mut self) -> Result<(), RuntimeError> {
        let rhs = self.pop();
        let lhs = self.pop();
        match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => self.push(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => {
                let concatenated =
                    bumpalo::format!(in self.vm.bump, "{}{}", a, b).into_bump_str();
                self.push(Value::String(concatenated))
            }
            (lhs, rhs) => Err(RuntimeError::BinaryType {
                op: "+",
                lhs: lhs.type_name(),
                rhs: rhs.type_name(),
            }),
        }
    }

    fn arithmetic(
        &mut self,
        op: &'static str,
        apply: fn(f64, f64) -> f64,
    ) -> Result<(), RuntimeError> {
        let rhs = self.pop();
        let lhs = self.pop();
        match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => self.push(Value::Number(apply(a, b))),
            (lhs, rhs) => Err(RuntimeError::BinaryType {
                op,
                lhs: lhs.type_name(),
                rhs: rhs.type_name(),
            }),
        }
    }

    fn comparison(
        &mut self,
        op: &'static str,
        test: fn(Ordering) -> bool,
    ) -> Result<(), RuntimeError> {
        let rhs = self.pop();
        let lhs = self.pop();
        match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) =>
                self.push(Value::Bool(a.partial_cmp(&b).is_some_and(test))),
            (Value::String(a), Value::String(b)) => self.push(Value::Bool(test(a.cmp(b)))),
            (lhs, rhs) => Err(RuntimeError::BinaryType {
                op,
                lhs: lhs.type_name(),
                rhs: rhs.type_name(),
            }),
        }
    }

    #[cfg(test)]
    fn local(&self, slot: usize) -> Value<'a> {
        self.locals[slot]
    }
}

/// The execution host: opens a VM, loads the chunk into it, and drives one
/// complete `begin`/`run`/`end`/`close` cycle. Failures are reported here;
/// the returned [`Outcome`] only tells the driver what happened.
pub(crate) fn run_chunk<'a>(
    bump: &'a Bump,
    diagnostics: &Diagnostics,
    chunk: &Chunk<'a>,
) -> Outcome {
    let vm = match Vm::open(bump) {
        Ok(vm) => vm,
        Err(err) => {
            diagnostics.error(format_args!("can't open VM: {err}"));
            return Outcome::OpenFailed;
        }
    };
    let mut vm = match vm.load(chunk) {
        Ok(vm) => vm,
        Err(err) => {
            diagnostics.error(format_args!("illegal bytecode: {err}"));
            return Outcome::LoadFailed;
        }
    };
    vm.begin();
    let result = vm.run();
    vm.end();
    vm.close();
    match result {
        Ok(()) => Outcome::Completed,
        Err(err) => {
            diagnostics.error(format_args!("runtime error: {err}"));
            Outcome::RuntimeError
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::bytecode::Number;
    use crate::compiler;
    use crate::diagnostics::LogLevel;
    use crate::stream::SourceStream;

    fn compile<'a>(bump: &'a Bump, src: &str) -> Chunk<'a> {
        let diagnostics = Diagnostics::new(LogLevel::Fatal);
        let stream = SourceStream::memory(bump, src);
        let mut state = compiler::parse_init_state(bump, stream.node_box_size());
        compiler::compile(&mut state, &diagnostics, &stream).unwrap();
        state.chunk.take().unwrap()
    }

    fn run_and_read_local<'a>(
        bump: &'a Bump,
        src: &str,
        slot: usize,
    ) -> Result<Value<'a>, RuntimeError> {
        let chunk = compile(bump, src);
        let mut vm = Vm::open(bump).unwrap().load(&chunk).unwrap();
        vm.begin();
        vm.run()?;
        let value = vm.local(slot);
        vm.end();
        vm.close();
        Ok(value)
    }

    #[rstest]
    #[case::precedence("x = 2 + 3 * 4", Value::Number(14.0))]
    #[case::grouping("x = (2 + 3) * 4", Value::Number(20.0))]
    #[case::unary_minus("x = -(2 + 3)", Value::Number(-5.0))]
    #[case::modulo("x = 7 % 4", Value::Number(3.0))]
    #[case::comparison("x = 1 < 2", Value::Bool(true))]
    #[case::nan_comparison("x = (0 / 0) < 1", Value::Bool(false))]
    #[case::equality("x = 1 == 2", Value::Bool(false))]
    #[case::cross_type_equality("x = nil == false", Value::Bool(false))]
    #[case::not("x = !nil", Value::Bool(true))]
    #[case::and_keeps_falsey_lhs("x = nil && 1", Value::Nil)]
    #[case::and_yields_rhs("x = 1 && 2", Value::Number(2.0))]
    #[case::or_short_circuits("x = \"lhs\" || \"rhs\"", Value::String("lhs"))]
    #[case::or_yields_rhs("x = false or \"rhs\"", Value::String("rhs"))]
    #[case::concatenation("x = \"foo\" + \"bar\"", Value::String("foobar"))]
    #[case::chained_concatenation("x = \"a\" + \"b\" + \"c\"", Value::String("abc"))]
    #[case::string_comparison("x = \"abc\" < \"abd\"", Value::Bool(true))]
    #[case::reassignment("x = 1\nx = x + 1", Value::Number(2.0))]
    fn expressions(#[case] src: &str, #[case] expected: Value) {
        let bump = Bump::new();
        assert_eq!(run_and_read_local(&bump, src, 0), Ok(expected));
    }

    #[rstest]
    #[case::while_loop("i = 0\nwhile i < 5\ni = i + 1\nend", Value::Number(5.0))]
    #[case::if_taken("x = 0\nif 1 < 2\nx = 1\nend", Value::Number(1.0))]
    #[case::if_not_taken("x = 0\nif 2 < 1\nx = 1\nend", Value::Number(0.0))]
    #[case::elsif_chain(
        "x = 0\nif x == 1\nx = 10\nelsif x == 0\nx = 20\nelse\nx = 30\nend",
        Value::Number(20.0)
    )]
    #[case::else_branch("x = 9\nif false\nx = 1\nelse\nx = 2\nend", Value::Number(2.0))]
    fn control_flow(#[case] src: &str, #[case] expected: Value) {
        let bump = Bump::new();
        assert_eq!(run_and_read_local(&bump, src, 0), Ok(expected));
    }

    #[rstest]
    #[case::add_nil_and_number("x = nil + 1", "+", "nil", "number")]
    #[case::add_number_and_string("x = 1 + \"s\"", "+", "number", "string")]
    #[case::subtract_strings("x = \"a\" - \"b\"", "-", "string", "string")]
    #[case::compare_mixed("x = 1 < \"s\"", "<", "number", "string")]
    fn type_errors(
        #[case] src: &str,
        #[case] op: &'static str,
        #[case] lhs: &'static str,
        #[case] rhs: &'static str,
    ) {
        let bump = Bump::new();
        assert_eq!(
            run_and_read_local(&bump, src, 0),
            Err(RuntimeError::BinaryType { op, lhs, rhs }),
        );
    }

    #[test]
    fn unary_minus_rejects_non_numbers() {
        let bump = Bump::new();
        assert_eq!(
            run_and_read_local(&bump, "x = -\"s\"", 0),
            Err(RuntimeError::UnaryType { op: "-", operand: "string" }),
        );
    }

    #[test]
    fn load_rejects_invalid_bytecode() {
        let bump = Bump::new();
        let chunk = Chunk { code: vec![Bytecode::ConstNil], constants: vec![], local_count: 0 };
        let result = Vm::open(&bump).unwrap().load(&chunk);
        assert!(matches!(
            result,
            Err(LoadError::Invalid(InvalidBytecode::NoEnd)),
        ));
    }

    #[test]
    fn run_overflows_gracefully() {
        let bump = Bump::new();
        let mut code = vec![Bytecode::ConstNumber(Number::from(1.0)); STACK_SIZE + 1];
        code.push(Bytecode::End);
        let chunk = Chunk { code, constants: vec![], local_count: 0 };
        let mut vm = Vm::open(&bump).unwrap().load(&chunk).unwrap();
        vm.begin();
        assert_eq!(vm.run(), Err(RuntimeError::StackOverflow));
        vm.end();
        vm.close();
    }

    #[test]
    fn run_chunk_reports_load_failure_as_an_outcome() {
        let bump = Bump::new();
        let diagnostics = Diagnostics::new(LogLevel::Fatal);
        let chunk = Chunk { code: vec![], constants: vec![], local_count: 0 };
        assert_eq!(run_chunk(&bump, &diagnostics, &chunk), Outcome::LoadFailed);
    }

    #[test]
    fn run_chunk_completes_a_valid_program() {
        let bump = Bump::new();
        let diagnostics = Diagnostics::new(LogLevel::Fatal);
        let chunk = compile(&bump, "x = 1 + 1");
        assert_eq!(run_chunk(&bump, &diagnostics, &chunk), Outcome::Completed);
    }
}
