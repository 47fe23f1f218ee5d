use bumpalo::Bump;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::bytecode::Bytecode;
use crate::bytecode::Bytecode::*;
use crate::bytecode::Chunk;
use crate::bytecode::Number;
use crate::diagnostics::Diagnostics;
use crate::lex;
use crate::parse;
use crate::parse::BinOp;
use crate::parse::Expression;
use crate::parse::LiteralKind;
use crate::parse::LogicalOp;
use crate::parse::Statement;
use crate::parse::UnaryOp;
use crate::stream::SourceStream;
use crate::value::Value;

const JUMP_PLACEHOLDER: u32 = u32::MAX;

/// Compiler working state. Created once per run, sized from the stream's
/// node-box capacity hint; holds the produced chunk after a successful
/// [`compile`].
pub struct CompilerState<'a> {
    bump: &'a Bump,
    pub verbose: bool,
    node_capacity: usize,
    pub(crate) chunk: Option<Chunk<'a>>,
}

impl<'a> CompilerState<'a> {
    pub fn chunk(&self) -> Option<&Chunk<'a>> {
        self.chunk.as_ref()
    }
}

pub fn parse_init_state<'a>(bump: &'a Bump, capacity_hint: usize) -> CompilerState<'a> {
    CompilerState {
        bump,
        verbose: false,
        node_capacity: capacity_hint,
        chunk: None,
    }
}

/// Compiles the stream's source to bytecode attached to `state`. Any lex,
/// parse, or name resolution error is returned for the caller to report; no
/// partial chunk is kept in that case.
pub fn compile<'a>(
    state: &mut CompilerState<'a>,
    diagnostics: &Diagnostics,
    stream: &SourceStream<'a>,
) -> Result<(), parse::Error<'a>> {
    let (tokens, eof_loc) = lex::lex(state.bump, stream.origin(), stream.source())?;
    diagnostics.debug(format_args!(
        "lexed {} tokens from {}",
        tokens.len(),
        stream.origin().display(),
    ));

    let stmts = parse::parse(state.bump, tokens, eof_loc, state.node_capacity)?;
    diagnostics.debug(format_args!("parsed {} top-level statements", stmts.len()));

    let mut compiler = Compiler {
        code: Vec::with_capacity(state.node_capacity),
        constants: IndexMap::new(),
        locals: IndexSet::new(),
    };
    for stmt in stmts {
        compiler.compile_stmt(stmt)?;
    }
    compiler.code.push(End);

    let chunk = Chunk {
        code: compiler.code,
        constants: compiler.constants.into_values().collect(),
        local_count: u32::try_from(compiler.locals.len()).unwrap(),
    };
    diagnostics.debug(format_args!(
        "compiled {} instructions, {} constants, {} locals",
        chunk.code.len(),
        chunk.constants.len(),
        chunk.local_count,
    ));
    if state.verbose {
        eprintln!("disassembly of {}:", stream.origin().display());
        eprintln!("{}", chunk.disassemble());
    }
    state.chunk = Some(chunk);
    Ok(())
}

struct Compiler<'a> {
    code: Vec<Bytecode>,
    constants: IndexMap<&'a str, Value<'a>>,
    locals: IndexSet<&'a str>,
}

impl<'a> Compiler<'a> {
    fn compile_stmt(&mut self, stmt: &Statement<'a>) -> Result<(), parse::Error<'a>> {
        match stmt {
            Statement::Expression(expr) => {
                self.compile_expr(expr)?;
                self.code.push(Pop);
            }
            Statement::Puts(expr) => {
                self.compile_expr(expr)?;
                self.code.push(Print);
            }
            Statement::If { arms, else_body } => {
                let mut end_jumps = Vec::new();
                for arm in *arms {
                    self.compile_expr(arm.condition)?;
                    let skip_arm = self.emit_jump(PopJumpIfFalse(JUMP_PLACEHOLDER));
                    for stmt in arm.body {
                        self.compile_stmt(stmt)?;
                    }
                    end_jumps.push(self.emit_jump(Jump(JUMP_PLACEHOLDER)));
                    self.patch_jump(skip_arm);
                }
                for stmt in *else_body {
                    self.compile_stmt(stmt)?;
                }
                for end_jump in end_jumps {
                    self.patch_jump(end_jump);
                }
            }
            Statement::While { condition, body } => {
                let loop_start = u32::try_from(self.code.len()).unwrap();
                self.compile_expr(condition)?;
                let exit = self.emit_jump(PopJumpIfFalse(JUMP_PLACEHOLDER));
                for stmt in *body {
                    self.compile_stmt(stmt)?;
                }
                self.code.push(Jump(loop_start));
                self.patch_jump(exit);
            }
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expression<'a>) -> Result<(), parse::Error<'a>> {
        match *expr {
            Expression::Literal { kind, .. } => {
                let bytecode = match kind {
                    LiteralKind::Nil => ConstNil,
                    LiteralKind::Bool(true) => ConstTrue,
                    LiteralKind::Bool(false) => ConstFalse,
                    LiteralKind::Number(number) => ConstNumber(Number::from(number)),
                    LiteralKind::String(string) => Const(self.string_constant(string)),
                };
                self.code.push(bytecode);
            }
            Expression::Variable { name, loc } => {
                let slot = self
                    .locals
                    .get_index_of(name)
                    .ok_or(parse::Error::UndefinedVariable { name, at: loc })?;
                self.code.push(Local(u32::try_from(slot).unwrap()));
            }
            Expression::Assign { name, value, .. } => {
                self.compile_expr(value)?;
                let (slot, _) = self.locals.insert_full(name);
                self.code.push(StoreLocal(u32::try_from(slot).unwrap()));
            }
            Expression::Unary { op, operand, .. } => {
                self.compile_expr(operand)?;
                self.code.push(match op {
                    UnaryOp::Minus => UnaryMinus,
                    UnaryOp::Not => UnaryNot,
                });
            }
            Expression::Binary { lhs, op, rhs } => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.code.push(match op {
                    BinOp::Add => Add,
                    BinOp::Subtract => Subtract,
                    BinOp::Multiply => Multiply,
                    BinOp::Divide => Divide,
                    BinOp::Modulo => Modulo,
                    BinOp::Equal => Equal,
                    BinOp::NotEqual => NotEqual,
                    BinOp::Less => Less,
                    BinOp::LessEqual => LessEqual,
                    BinOp::Greater => Greater,
                    BinOp::GreaterEqual => GreaterEqual,
                });
            }
            Expression::Logical { lhs, op, rhs } => {
                self.compile_expr(lhs)?;
                let short_circuit = self.emit_jump(match op {
                    LogicalOp::And => JumpIfFalse(JUMP_PLACEHOLDER),
                    LogicalOp::Or => JumpIfTrue(JUMP_PLACEHOLDER),
                });
                self.compile_expr(rhs)?;
                self.patch_jump(short_circuit);
            }
        }
        Ok(())
    }

    fn string_constant(&mut self, string: &'a str) -> u32 {
        let entry = self.constants.entry(string);
        let index = entry.index();
        entry.or_insert(Value::String(string));
        u32::try_from(index).unwrap()
    }

    fn emit_jump(&mut self, bytecode: Bytecode) -> usize {
        self.code.push(bytecode);
        self.code.len() - 1
    }

    fn patch_jump(&mut self, at: usize) {
        let target = u32::try_from(self.code.len()).unwrap();
        self.code[at] = match self.code[at] {
            Jump(_) => Jump(target),
            JumpIfTrue(_) => JumpIfTrue(target),
            JumpIfFalse(_) => JumpIfFalse(target),
            PopJumpIfFalse(_) => PopJumpIfFalse(target),
            bytecode => unreachable!("cannot patch {bytecode}"),
        };
    }
}
