use std::rc::Rc;

use crate::ast::{ArgList, AssignOp, BinOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use crate::error::{ErrorKind, LangError, LangResult};
use crate::token::Span;

/// One compiled evaluation unit. `code` and `spans` run in parallel;
/// identifiers, method names and string literals are interned into
/// `strings` and referenced by index.
#[derive(Debug, Default)]
pub struct Chunk {
    pub code: Vec<Instr>,
    pub spans: Vec<Span>,
    pub strings: Vec<Rc<str>>,
}

impl Chunk {
    pub fn string(&self, idx: u16) -> &Rc<str> {
        &self.strings[idx as usize]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    PushInt(i64),
    PushBool(bool),
    PushStr(u16),
    PushNull,
    MakeArray(u16),
    MakeDict(u16),
    LoadName(u16),
    StoreName(u16),
    Unary(UnaryOp),
    Binary(BinOp),
    /// Replace the top of stack with its truthiness.
    ToBool,
    Index,
    Call {
        name: u16,
        argc: u8,
        kw: Vec<u16>,
    },
    /// Receiver sits below the arguments on the stack.
    Method {
        name: u16,
        argc: u8,
        kw: Vec<u16>,
    },
    Jump(isize),
    JumpIfFalse(isize),
    JumpIfTrue(isize),
    /// Pop an iterable and open an iteration over it.
    BeginIter,
    /// Bind the next element(s) to the named loop variables, or jump
    /// past the loop body when the iteration is exhausted.
    IterNext {
        first: u16,
        second: Option<u16>,
        exit: isize,
    },
    EndIter,
    Pop,
    Return,
}

struct LoopCtx {
    /// Jump sites to patch to the loop's EndIter.
    break_sites: Vec<usize>,
    /// Jump sites to patch back to the loop's IterNext.
    continue_sites: Vec<usize>,
}

#[derive(Default)]
pub struct Compiler {
    chunk: Chunk,
    loops: Vec<LoopCtx>,
}

pub fn compile(program: &Program) -> LangResult<Chunk> {
    let mut compiler = Compiler::default();
    for stmt in &program.statements {
        compiler.compile_statement(stmt)?;
    }
    compiler.emit(Instr::Return, Span::default());
    Ok(compiler.chunk)
}

/// Compiles a single statement into its own chunk; the analyzer uses
/// this to keep an error in one statement from killing the whole run.
pub fn compile_statement(stmt: &Stmt) -> LangResult<Chunk> {
    let mut compiler = Compiler::default();
    compiler.compile_statement(stmt)?;
    compiler.emit(Instr::Return, Span::default());
    Ok(compiler.chunk)
}

impl Compiler {
    fn emit(&mut self, instr: Instr, span: Span) -> usize {
        self.chunk.code.push(instr);
        self.chunk.spans.push(span);
        self.chunk.code.len() - 1
    }

    fn intern(&mut self, s: &Rc<str>) -> u16 {
        if let Some(idx) = self.chunk.strings.iter().position(|existing| existing == s) {
            return idx as u16;
        }
        self.chunk.strings.push(s.clone());
        (self.chunk.strings.len() - 1) as u16
    }

    /// Emits a placeholder jump to be patched later.
    fn emit_jump(&mut self, instr: Instr, span: Span) -> usize {
        self.emit(instr, span)
    }

    /// Points the jump at `site` to the current end of code. Offsets
    /// are relative to the instruction pointer after fetch.
    fn patch_jump(&mut self, site: usize) {
        let target = self.chunk.code.len() as isize - (site as isize + 1);
        match &mut self.chunk.code[site] {
            Instr::Jump(offset)
            | Instr::JumpIfFalse(offset)
            | Instr::JumpIfTrue(offset)
            | Instr::IterNext { exit: offset, .. } => *offset = target,
            other => panic!("patch target is not a jump: {other:?}"),
        }
    }

    fn compile_statement(&mut self, stmt: &Stmt) -> LangResult<()> {
        match &stmt.kind {
            StmtKind::Assign { name, op, value } => {
                let idx = self.intern(name);
                match op {
                    AssignOp::Assign => self.compile_expression(value)?,
                    AssignOp::AddAssign => {
                        self.emit(Instr::LoadName(idx), stmt.span);
                        self.compile_expression(value)?;
                        self.emit(Instr::Binary(BinOp::Add), stmt.span);
                    }
                }
                self.emit(Instr::StoreName(idx), stmt.span);
            }
            StmtKind::Expr(expr) => {
                self.compile_expression(expr)?;
                self.emit(Instr::Pop, stmt.span);
            }
            StmtKind::If {
                branches,
                else_body,
            } => {
                let mut end_sites = Vec::new();
                for (condition, body) in branches {
                    self.compile_expression(condition)?;
                    let skip = self.emit_jump(Instr::JumpIfFalse(0), condition.span);
                    for stmt in body {
                        self.compile_statement(stmt)?;
                    }
                    end_sites.push(self.emit_jump(Instr::Jump(0), stmt.span));
                    self.patch_jump(skip);
                }
                for stmt in else_body {
                    self.compile_statement(stmt)?;
                }
                for site in end_sites {
                    self.patch_jump(site);
                }
            }
            StmtKind::Foreach {
                vars,
                iterable,
                body,
            } => {
                let first = self.intern(&vars[0]);
                let second = vars.get(1).map(|v| self.intern(v));
                self.compile_expression(iterable)?;
                self.emit(Instr::BeginIter, iterable.span);
                let head = self.emit_jump(
                    Instr::IterNext {
                        first,
                        second,
                        exit: 0,
                    },
                    stmt.span,
                );
                self.loops.push(LoopCtx {
                    break_sites: Vec::new(),
                    continue_sites: Vec::new(),
                });
                for stmt in body {
                    self.compile_statement(stmt)?;
                }
                let ctx = self.loops.pop().expect("loop context pushed above");
                let back = self.chunk.code.len() as isize;
                self.emit(Instr::Jump(head as isize - (back + 1)), stmt.span);
                self.patch_jump(head);
                for site in ctx.break_sites {
                    self.patch_jump(site);
                }
                for site in ctx.continue_sites {
                    let target = head as isize - (site as isize + 1);
                    match &mut self.chunk.code[site] {
                        Instr::Jump(offset) => *offset = target,
                        other => panic!("continue site is not a jump: {other:?}"),
                    }
                }
                self.emit(Instr::EndIter, stmt.span);
            }
            StmtKind::Break => {
                if self.loops.is_empty() {
                    return Err(LangError::new(ErrorKind::BreakOutsideLoop, stmt.span));
                }
                let site = self.emit_jump(Instr::Jump(0), stmt.span);
                self.loops
                    .last_mut()
                    .expect("checked above")
                    .break_sites
                    .push(site);
            }
            StmtKind::Continue => {
                if self.loops.is_empty() {
                    return Err(LangError::new(ErrorKind::ContinueOutsideLoop, stmt.span));
                }
                let site = self.emit_jump(Instr::Jump(0), stmt.span);
                self.loops
                    .last_mut()
                    .expect("checked above")
                    .continue_sites
                    .push(site);
            }
        }
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expr) -> LangResult<()> {
        match &expr.kind {
            ExprKind::Bool(value) => {
                self.emit(Instr::PushBool(*value), expr.span);
            }
            ExprKind::Int(value) => {
                self.emit(Instr::PushInt(*value), expr.span);
            }
            ExprKind::Str(value) => {
                let idx = self.intern(value);
                self.emit(Instr::PushStr(idx), expr.span);
            }
            ExprKind::Identifier(name) => {
                let idx = self.intern(name);
                self.emit(Instr::LoadName(idx), expr.span);
            }
            ExprKind::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Instr::MakeArray(elements.len() as u16), expr.span);
            }
            ExprKind::Dict(entries) => {
                for (key, value) in entries {
                    let idx = self.intern(key);
                    self.emit(Instr::PushStr(idx), expr.span);
                    self.compile_expression(value)?;
                }
                self.emit(Instr::MakeDict(entries.len() as u16), expr.span);
            }
            ExprKind::Unary { op, operand } => {
                self.compile_expression(operand)?;
                self.emit(Instr::Unary(*op), expr.span);
            }
            ExprKind::Binary {
                lhs,
                op: BinOp::And,
                rhs,
            } => {
                // Short circuit: a and b == false if a is falsy.
                self.compile_expression(lhs)?;
                let skip = self.emit_jump(Instr::JumpIfFalse(0), expr.span);
                self.compile_expression(rhs)?;
                self.emit(Instr::ToBool, expr.span);
                let end = self.emit_jump(Instr::Jump(0), expr.span);
                self.patch_jump(skip);
                self.emit(Instr::PushBool(false), expr.span);
                self.patch_jump(end);
            }
            ExprKind::Binary {
                lhs,
                op: BinOp::Or,
                rhs,
            } => {
                self.compile_expression(lhs)?;
                let skip = self.emit_jump(Instr::JumpIfTrue(0), expr.span);
                self.compile_expression(rhs)?;
                self.emit(Instr::ToBool, expr.span);
                let end = self.emit_jump(Instr::Jump(0), expr.span);
                self.patch_jump(skip);
                self.emit(Instr::PushBool(true), expr.span);
                self.patch_jump(end);
            }
            ExprKind::Binary { lhs, op, rhs } => {
                self.compile_expression(lhs)?;
                self.compile_expression(rhs)?;
                self.emit(Instr::Binary(*op), expr.span);
            }
            ExprKind::Index { object, index } => {
                self.compile_expression(object)?;
                self.compile_expression(index)?;
                self.emit(Instr::Index, expr.span);
            }
            ExprKind::Call { name, args } => {
                let name = self.intern(name);
                let (argc, kw) = self.compile_args(args)?;
                self.emit(Instr::Call { name, argc, kw }, expr.span);
            }
            ExprKind::MethodCall {
                receiver,
                name,
                args,
            } => {
                self.compile_expression(receiver)?;
                let name = self.intern(name);
                let (argc, kw) = self.compile_args(args)?;
                self.emit(Instr::Method { name, argc, kw }, expr.span);
            }
        }
        Ok(())
    }

    /// Positional values are pushed first, then keyword values in
    /// declaration order; the instruction carries the keyword names.
    fn compile_args(&mut self, args: &ArgList) -> LangResult<(u8, Vec<u16>)> {
        for arg in &args.positional {
            self.compile_expression(arg)?;
        }
        let mut kw = Vec::with_capacity(args.keywords.len());
        for keyword in &args.keywords {
            kw.push(self.intern(&keyword.name));
            self.compile_expression(&keyword.value)?;
        }
        Ok((args.positional.len() as u8, kw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn compile_src(input: &str) -> Chunk {
        compile(&parse(input).expect("parse failed")).expect("compile failed")
    }

    #[test]
    fn compiles_assignment() {
        let chunk = compile_src("x = 1 + 2\n");
        assert_eq!(
            chunk.code,
            vec![
                Instr::PushInt(1),
                Instr::PushInt(2),
                Instr::Binary(BinOp::Add),
                Instr::StoreName(0),
                Instr::Return,
            ]
        );
        assert_eq!(&*chunk.strings[0], "x");
    }

    #[test]
    fn compiles_call_with_keywords() {
        let chunk = compile_src("executable('a', srcs, install: true)\n");
        let call = chunk
            .code
            .iter()
            .find(|instr| matches!(instr, Instr::Call { .. }))
            .expect("expected call instruction");
        let Instr::Call { argc, kw, .. } = call else {
            unreachable!()
        };
        assert_eq!(*argc, 2);
        assert_eq!(kw.len(), 1);
    }

    #[test]
    fn foreach_compiles_to_iter_loop() {
        let chunk = compile_src("foreach i : [1]\nendforeach\n");
        assert!(matches!(chunk.code[0], Instr::PushInt(1)));
        assert!(matches!(chunk.code[1], Instr::MakeArray(1)));
        assert!(matches!(chunk.code[2], Instr::BeginIter));
        let Instr::IterNext { exit, second, .. } = &chunk.code[3] else {
            panic!("expected IterNext");
        };
        assert!(second.is_none());
        // Exhaustion jumps just past the loop-back jump, onto EndIter.
        assert_eq!(*exit, 1);
        assert!(matches!(chunk.code[4], Instr::Jump(-2)));
        assert!(matches!(chunk.code[5], Instr::EndIter));
    }

    #[test]
    fn and_short_circuits() {
        let chunk = compile_src("x = a and b\n");
        assert!(chunk
            .code
            .iter()
            .any(|instr| matches!(instr, Instr::JumpIfFalse(_))));
        assert!(chunk.code.iter().any(|instr| matches!(instr, Instr::ToBool)));
    }

    #[test]
    fn break_outside_loop_is_a_compile_error() {
        let err = compile(&parse("break\n").expect("parse failed"))
            .expect_err("expected compile failure");
        assert_eq!(err.kind, ErrorKind::BreakOutsideLoop);
    }

    #[test]
    fn continue_outside_loop_is_a_compile_error() {
        let err = compile(&parse("continue\n").expect("parse failed"))
            .expect_err("expected compile failure");
        assert_eq!(err.kind, ErrorKind::ContinueOutsideLoop);
    }

    #[test]
    fn break_jumps_to_end_iter() {
        let chunk = compile_src("foreach i : [1, 2]\n  break\nendforeach\n");
        let end_iter = chunk
            .code
            .iter()
            .position(|instr| matches!(instr, Instr::EndIter))
            .expect("expected EndIter");
        // The break jump lands exactly on EndIter so the iteration is
        // closed before control leaves the loop.
        let (site, offset) = chunk
            .code
            .iter()
            .enumerate()
            .find_map(|(i, instr)| match instr {
                Instr::Jump(offset) if *offset > 0 => Some((i, *offset)),
                _ => None,
            })
            .expect("expected forward break jump");
        assert_eq!(site as isize + 1 + offset, end_iter as isize);
    }
}
