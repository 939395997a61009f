use std::rc::Rc;

use crate::bytecode::{Chunk, Instr};
use crate::ast::{BinOp, UnaryOp};
use crate::dispatch::Args;
use crate::error::{ErrorKind, LangError, LangResult};
use crate::functions;
use crate::heap::Heap;
use crate::token::Span;
use crate::value::{Obj, Value};
use crate::workspace::Workspace;

/// One open `foreach` iteration. The iterable is snapshotted when the
/// loop opens, so mutating the underlying container inside the body
/// does not change what the loop visits.
enum IterState {
    Array { values: Vec<Value>, pos: usize },
    Dict { entries: Vec<(Rc<str>, Value)>, pos: usize },
}

/// Runs one chunk to completion against the workspace. The value of
/// the final `Return` is the chunk's result; statement-level chunks
/// return null.
pub fn execute(wk: &mut Workspace, chunk: &Chunk) -> LangResult<Value> {
    let mut stack: Vec<Value> = Vec::new();
    let mut iters: Vec<IterState> = Vec::new();
    let mut ip: usize = 0;

    loop {
        let instr = &chunk.code[ip];
        let span = chunk.spans[ip];
        ip += 1;

        match instr {
            Instr::PushInt(value) => stack.push(Value::Int(*value)),
            Instr::PushBool(value) => stack.push(Value::Bool(*value)),
            Instr::PushStr(idx) => stack.push(Value::Str(chunk.string(*idx).clone())),
            Instr::PushNull => stack.push(Value::Null),
            Instr::MakeArray(n) => {
                let values = stack.split_off(stack.len() - *n as usize);
                stack.push(wk.heap.alloc_array(values));
            }
            Instr::MakeDict(n) => {
                let mut flat = stack.split_off(stack.len() - 2 * *n as usize);
                let mut entries = Vec::with_capacity(*n as usize);
                while !flat.is_empty() {
                    let value = flat.pop().ok_or_else(stack_underflow)?;
                    let key = flat.pop().ok_or_else(stack_underflow)?;
                    let Value::Str(key) = key else {
                        return Err(LangError::new(
                            ErrorKind::Type {
                                expected: "string".to_string(),
                                got: key.kind_name(&wk.heap).to_string(),
                                param: "dict key".to_string(),
                            },
                            span,
                        ));
                    };
                    entries.push((key, value));
                }
                entries.reverse();
                // Literal keys are unique by construction; keep the
                // dict invariant anyway if a later producer reuses this
                // path.
                let mut unique: Vec<(Rc<str>, Value)> = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    Heap::dict_set(&mut unique, key, value);
                }
                stack.push(wk.heap.alloc_dict(unique));
            }
            Instr::LoadName(idx) => {
                let name = chunk.string(*idx);
                wk.record_read(name);
                match wk.lookup_var(name) {
                    Some(value) => stack.push(value),
                    None => {
                        let err = LangError::new(
                            ErrorKind::UndefinedIdentifier(name.to_string()),
                            span,
                        );
                        if wk.analyzing() {
                            // Poison substitution keeps the rest of the
                            // statement analyzable.
                            wk.diag_error(&err);
                            stack.push(Value::Null);
                        } else {
                            return Err(err);
                        }
                    }
                }
            }
            Instr::StoreName(idx) => {
                let name = chunk.string(*idx).clone();
                let value = stack.pop().ok_or_else(stack_underflow)?;
                wk.record_assignment(&name, span);
                wk.assign_var(name, value);
            }
            Instr::Unary(op) => {
                let operand = stack.pop().ok_or_else(stack_underflow)?;
                stack.push(unary_op(wk, *op, operand, span)?);
            }
            Instr::Binary(op) => {
                let rhs = stack.pop().ok_or_else(stack_underflow)?;
                let lhs = stack.pop().ok_or_else(stack_underflow)?;
                stack.push(binary_op(wk, *op, lhs, rhs, span)?);
            }
            Instr::ToBool => {
                let value = stack.pop().ok_or_else(stack_underflow)?;
                stack.push(Value::Bool(value.is_truthy(&wk.heap)));
            }
            Instr::Index => {
                let index = stack.pop().ok_or_else(stack_underflow)?;
                let object = stack.pop().ok_or_else(stack_underflow)?;
                stack.push(index_op(wk, object, index, span)?);
            }
            Instr::Call { name, argc, kw } => {
                let args = pop_args(&mut stack, chunk, *argc, kw, span)?;
                let name = chunk.string(*name);
                let result = functions::call_function(wk, name, args)?;
                stack.push(result);
            }
            Instr::Method { name, argc, kw } => {
                let args = pop_args(&mut stack, chunk, *argc, kw, span)?;
                let receiver = stack.pop().ok_or_else(stack_underflow)?;
                let name = chunk.string(*name);
                let result = functions::call_method(wk, receiver, name, args)?;
                stack.push(result);
            }
            Instr::Jump(offset) => {
                ip = jump(ip, *offset);
            }
            Instr::JumpIfFalse(offset) => {
                let value = stack.pop().ok_or_else(stack_underflow)?;
                if !value.is_truthy(&wk.heap) {
                    ip = jump(ip, *offset);
                }
            }
            Instr::JumpIfTrue(offset) => {
                let value = stack.pop().ok_or_else(stack_underflow)?;
                if value.is_truthy(&wk.heap) {
                    ip = jump(ip, *offset);
                }
            }
            Instr::BeginIter => {
                let iterable = stack.pop().ok_or_else(stack_underflow)?;
                let state = match &iterable {
                    Value::Obj(id) => match wk.heap.get(*id) {
                        Obj::Array(values) => IterState::Array {
                            values: values.clone(),
                            pos: 0,
                        },
                        Obj::Dict(entries) => IterState::Dict {
                            entries: entries.clone(),
                            pos: 0,
                        },
                        other => {
                            return Err(LangError::new(
                                ErrorKind::Type {
                                    expected: "array or dict".to_string(),
                                    got: other.kind_name().to_string(),
                                    param: "foreach iterable".to_string(),
                                },
                                span,
                            ))
                        }
                    },
                    other => {
                        return Err(LangError::new(
                            ErrorKind::Type {
                                expected: "array or dict".to_string(),
                                got: other.kind_name(&wk.heap).to_string(),
                                param: "foreach iterable".to_string(),
                            },
                            span,
                        ))
                    }
                };
                iters.push(state);
            }
            Instr::IterNext {
                first,
                second,
                exit,
            } => {
                let state = iters.last_mut().ok_or_else(stack_underflow)?;
                let bound = match state {
                    IterState::Array { values, pos } => {
                        if let Some(value) = values.get(*pos) {
                            let value = value.clone();
                            *pos += 1;
                            wk.assign_var(chunk.string(*first).clone(), value);
                            if second.is_some() {
                                return Err(LangError::new(
                                    ErrorKind::Type {
                                        expected: "dict".to_string(),
                                        got: "array".to_string(),
                                        param: "foreach iterable".to_string(),
                                    },
                                    span,
                                ));
                            }
                            true
                        } else {
                            false
                        }
                    }
                    IterState::Dict { entries, pos } => {
                        if let Some((key, value)) = entries.get(*pos) {
                            let (key, value) = (key.clone(), value.clone());
                            *pos += 1;
                            match second {
                                Some(second) => {
                                    wk.assign_var(chunk.string(*first).clone(), Value::Str(key));
                                    wk.assign_var(chunk.string(*second).clone(), value);
                                }
                                None => {
                                    return Err(LangError::new(
                                        ErrorKind::Type {
                                            expected: "array".to_string(),
                                            got: "dict".to_string(),
                                            param: "foreach iterable".to_string(),
                                        },
                                        span,
                                    ))
                                }
                            }
                            true
                        } else {
                            false
                        }
                    }
                };
                if !bound {
                    ip = jump(ip, *exit);
                }
            }
            Instr::EndIter => {
                iters.pop();
            }
            Instr::Pop => {
                stack.pop();
            }
            Instr::Return => {
                return Ok(stack.pop().unwrap_or(Value::Null));
            }
        }
    }
}

fn jump(ip: usize, offset: isize) -> usize {
    (ip as isize + offset) as usize
}

fn stack_underflow() -> LangError {
    LangError::bare(ErrorKind::Fatal("evaluation stack underflow".to_string()))
}

fn pop_args(
    stack: &mut Vec<Value>,
    chunk: &Chunk,
    argc: u8,
    kw: &[u16],
    span: Span,
) -> LangResult<Args> {
    let mut keywords = Vec::with_capacity(kw.len());
    for idx in kw.iter().rev() {
        let value = stack.pop().ok_or_else(stack_underflow)?;
        keywords.push((chunk.string(*idx).clone(), value));
    }
    keywords.reverse();
    let positional = stack.split_off(stack.len() - argc as usize);
    Ok(Args {
        positional,
        keywords,
        span,
    })
}

fn is_disabler(wk: &Workspace, value: &Value) -> bool {
    matches!(value, Value::Obj(id) if matches!(wk.heap.get(*id), Obj::Disabler))
}

fn unary_op(wk: &Workspace, op: UnaryOp, operand: Value, span: Span) -> LangResult<Value> {
    if is_disabler(wk, &operand) {
        return Ok(operand);
    }
    match (op, &operand) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!operand.is_truthy(&wk.heap))),
        (UnaryOp::Neg, Value::Int(value)) => value
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| LangError::new(ErrorKind::Overflow, span)),
        (UnaryOp::Neg, _) => Err(LangError::new(
            ErrorKind::UnsupportedUnaryOp {
                op: "-",
                operand: operand.kind_name(&wk.heap).to_string(),
            },
            span,
        )),
    }
}

/// Two absolute-style components joined the way a path join does it:
/// an absolute right side wins outright.
pub(crate) fn path_join(lhs: &str, rhs: &str) -> String {
    if rhs.starts_with('/') {
        return rhs.to_string();
    }
    if lhs.is_empty() || lhs.ends_with('/') {
        format!("{lhs}{rhs}")
    } else {
        format!("{lhs}/{rhs}")
    }
}

fn binary_op(wk: &mut Workspace, op: BinOp, lhs: Value, rhs: Value, span: Span) -> LangResult<Value> {
    if is_disabler(wk, &lhs) {
        return Ok(lhs);
    }
    if is_disabler(wk, &rhs) {
        return Ok(rhs);
    }

    let unsupported = |wk: &Workspace| {
        LangError::new(
            ErrorKind::UnsupportedBinaryOp {
                op: op.symbol(),
                lhs: lhs.kind_name(&wk.heap).to_string(),
                rhs: rhs.kind_name(&wk.heap).to_string(),
            },
            span,
        )
    };

    match op {
        BinOp::Add => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .ok_or_else(|| LangError::new(ErrorKind::Overflow, span)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}").into())),
            (Value::Obj(a), _) if matches!(wk.heap.get(*a), Obj::Array(_)) => {
                // Addition builds a new array; the left operand is
                // untouched, so existing aliases do not see the growth.
                let mut values = wk.heap.array(*a).clone();
                match &rhs {
                    Value::Obj(b) if matches!(wk.heap.get(*b), Obj::Array(_)) => {
                        values.extend(wk.heap.array(*b).iter().cloned());
                    }
                    other => values.push(other.clone()),
                }
                Ok(wk.heap.alloc_array(values))
            }
            (Value::Obj(a), Value::Obj(b)) => {
                match (wk.heap.get(*a), wk.heap.get(*b)) {
                    (Obj::Dict(left), Obj::Dict(right)) => {
                        let mut merged = left.clone();
                        for (key, value) in right.clone() {
                            Heap::dict_set(&mut merged, key, value);
                        }
                        Ok(wk.heap.alloc_dict(merged))
                    }
                    _ => Err(unsupported(wk)),
                }
            }
            _ => Err(unsupported(wk)),
        },
        BinOp::Sub => int_op(wk, &lhs, &rhs, unsupported, |a, b| {
            a.checked_sub(b)
                .map(Value::Int)
                .ok_or_else(|| LangError::new(ErrorKind::Overflow, span))
        }),
        BinOp::Mul => int_op(wk, &lhs, &rhs, unsupported, |a, b| {
            a.checked_mul(b)
                .map(Value::Int)
                .ok_or_else(|| LangError::new(ErrorKind::Overflow, span))
        }),
        BinOp::Div => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Err(LangError::new(ErrorKind::DivisionByZero, span))
                } else {
                    a.checked_div(*b)
                        .map(Value::Int)
                        .ok_or_else(|| LangError::new(ErrorKind::Overflow, span))
                }
            }
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(path_join(a, b).into())),
            _ => Err(unsupported(wk)),
        },
        BinOp::Mod => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Err(LangError::new(ErrorKind::DivisionByZero, span))
                } else {
                    a.checked_rem(*b)
                        .map(Value::Int)
                        .ok_or_else(|| LangError::new(ErrorKind::Overflow, span))
                }
            }
            _ => Err(unsupported(wk)),
        },
        BinOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinOp::Neq => Ok(Value::Bool(lhs != rhs)),
        BinOp::Lt | BinOp::Leq | BinOp::Gt | BinOp::Geq => {
            let ordering = match (&lhs, &rhs) {
                (Value::Int(a), Value::Int(b)) => a.cmp(b),
                (Value::Str(a), Value::Str(b)) => a.cmp(b),
                _ => return Err(unsupported(wk)),
            };
            let result = match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Leq => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BinOp::In | BinOp::NotIn => {
            let contained = match (&lhs, &rhs) {
                (Value::Str(needle), Value::Str(haystack)) => haystack.contains(&**needle),
                (_, Value::Obj(id)) => match wk.heap.get(*id) {
                    Obj::Array(values) => values.contains(&lhs),
                    Obj::Dict(entries) => match &lhs {
                        Value::Str(key) => entries.iter().any(|(k, _)| k == key),
                        _ => return Err(unsupported(wk)),
                    },
                    _ => return Err(unsupported(wk)),
                },
                _ => return Err(unsupported(wk)),
            };
            Ok(Value::Bool(if op == BinOp::In {
                contained
            } else {
                !contained
            }))
        }
        // Rewritten to jumps at compile time.
        BinOp::And | BinOp::Or => Err(unsupported(wk)),
    }
}

fn int_op(
    wk: &Workspace,
    lhs: &Value,
    rhs: &Value,
    unsupported: impl Fn(&Workspace) -> LangError,
    apply: impl Fn(i64, i64) -> LangResult<Value>,
) -> LangResult<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => apply(*a, *b),
        _ => Err(unsupported(wk)),
    }
}

fn index_op(wk: &Workspace, object: Value, index: Value, span: Span) -> LangResult<Value> {
    if is_disabler(wk, &object) {
        return Ok(object);
    }
    match (&object, &index) {
        (Value::Str(s), Value::Int(i)) => {
            let ch = usize::try_from(*i).ok().and_then(|i| s.chars().nth(i));
            match ch {
                Some(ch) => Ok(Value::Str(ch.to_string().into())),
                None => Err(LangError::new(
                    ErrorKind::IndexOutOfBounds {
                        index: *i,
                        len: s.chars().count(),
                    },
                    span,
                )),
            }
        }
        (Value::Obj(id), _) => match (wk.heap.get(*id), &index) {
            (Obj::Array(values), Value::Int(i)) => {
                let slot = usize::try_from(*i).ok().and_then(|i| values.get(i));
                match slot {
                    Some(value) => Ok(value.clone()),
                    None => Err(LangError::new(
                        ErrorKind::IndexOutOfBounds {
                            index: *i,
                            len: values.len(),
                        },
                        span,
                    )),
                }
            }
            (Obj::Dict(entries), Value::Str(key)) => wk
                .heap
                .dict_get(entries, key)
                .ok_or_else(|| LangError::new(ErrorKind::KeyNotFound(key.to_string()), span)),
            _ => Err(index_type_error(wk, &object, &index, span)),
        },
        _ => Err(index_type_error(wk, &object, &index, span)),
    }
}

fn index_type_error(wk: &Workspace, object: &Value, index: &Value, span: Span) -> LangError {
    LangError::new(
        ErrorKind::UnsupportedBinaryOp {
            op: "[]",
            lhs: object.kind_name(&wk.heap).to_string(),
            rhs: index.kind_name(&wk.heap).to_string(),
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile;
    use crate::parser::parse;
    use crate::workspace::Project;
    use std::path::PathBuf;

    fn run(src: &str) -> (Workspace, LangResult<Value>) {
        let mut wk = Workspace::new(PathBuf::from("/src"), PathBuf::from("/build"));
        wk.projects.push(Project::new(
            "test".into(),
            PathBuf::from("/src"),
            PathBuf::from("/build"),
        ));
        let chunk = compile(&parse(src).expect("parse failed")).expect("compile failed");
        let result = execute(&mut wk, &chunk);
        (wk, result)
    }

    fn var(wk: &Workspace, name: &str) -> Value {
        wk.lookup_var(name).expect("variable should be set")
    }

    #[test]
    fn arithmetic_and_precedence() {
        let (wk, result) = run("x = 1 + 2 * 3 - 10 % 4\n");
        result.expect("should run");
        assert_eq!(var(&wk, "x"), Value::Int(5));
    }

    #[test]
    fn integer_overflow_is_an_error() {
        let (_, result) = run("x = 9223372036854775807 + 1\n");
        let err = result.expect_err("expected failure");
        assert_eq!(err.kind, ErrorKind::Overflow);

        let (_, result) = run("x = -(-9223372036854775807 - 1)\n");
        let err = result.expect_err("expected failure");
        assert_eq!(err.kind, ErrorKind::Overflow);
    }

    #[test]
    fn dividing_int_min_by_minus_one_is_an_error() {
        let (_, result) = run("x = (-9223372036854775807 - 1) / -1\n");
        let err = result.expect_err("expected failure");
        assert_eq!(err.kind, ErrorKind::Overflow);

        let (_, result) = run("x = (-9223372036854775807 - 1) % -1\n");
        let err = result.expect_err("expected failure");
        assert_eq!(err.kind, ErrorKind::Overflow);
    }

    #[test]
    fn string_concat_and_path_join() {
        let (wk, result) = run("a = 'foo' + 'bar'\nb = 'src' / 'lib.c'\nc = 'src' / '/abs'\n");
        result.expect("should run");
        assert_eq!(var(&wk, "a"), Value::Str("foobar".into()));
        assert_eq!(var(&wk, "b"), Value::Str("src/lib.c".into()));
        assert_eq!(var(&wk, "c"), Value::Str("/abs".into()));
    }

    #[test]
    fn array_addition_builds_a_new_array() {
        let (wk, result) = run("a = [1]\nb = a + 2\nc = a + [3, 4]\n");
        result.expect("should run");
        let a = var(&wk, "a").as_obj().expect("array");
        let b = var(&wk, "b").as_obj().expect("array");
        let c = var(&wk, "c").as_obj().expect("array");
        assert_eq!(wk.heap.array(a), &vec![Value::Int(1)]);
        assert_eq!(wk.heap.array(b), &vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            wk.heap.array(c),
            &vec![Value::Int(1), Value::Int(3), Value::Int(4)]
        );
    }

    #[test]
    fn dict_addition_merges_with_right_bias() {
        let (wk, result) = run("d = {'a': 1, 'b': 2} + {'b': 3}\n");
        result.expect("should run");
        let id = var(&wk, "d").as_obj().expect("dict");
        let Obj::Dict(entries) = wk.heap.get(id) else {
            panic!("expected dict");
        };
        assert_eq!(
            entries,
            &vec![
                (Rc::from("a"), Value::Int(1)),
                (Rc::from("b"), Value::Int(3)),
            ]
        );
    }

    #[test]
    fn division_by_zero_is_a_runtime_fault() {
        let (_, result) = run("x = 1 / 0\n");
        let err = result.expect_err("expected failure");
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn if_elif_else_chain() {
        let (wk, result) = run(indoc::indoc! {"
            x = 7
            if x < 5
              y = 'small'
            elif x < 10
              y = 'medium'
            else
              y = 'large'
            endif
        "});
        result.expect("should run");
        assert_eq!(var(&wk, "y"), Value::Str("medium".into()));
    }

    #[test]
    fn foreach_leaks_its_loop_variable() {
        let (wk, result) = run(indoc::indoc! {"
            x = 0
            foreach i : [1, 2, 3]
              x = x + i
            endforeach
        "});
        result.expect("should run");
        assert_eq!(var(&wk, "x"), Value::Int(6));
        // The loop variable survives the loop with its last value.
        assert_eq!(var(&wk, "i"), Value::Int(3));
    }

    #[test]
    fn foreach_over_dict_binds_key_and_value() {
        let (wk, result) = run(indoc::indoc! {"
            keys = ''
            total = 0
            foreach k, v : {'a': 1, 'b': 2}
              keys = keys + k
              total = total + v
            endforeach
        "});
        result.expect("should run");
        assert_eq!(var(&wk, "keys"), Value::Str("ab".into()));
        assert_eq!(var(&wk, "total"), Value::Int(3));
    }

    #[test]
    fn break_and_continue() {
        let (wk, result) = run(indoc::indoc! {"
            sum = 0
            foreach i : [1, 2, 3, 4, 5]
              if i == 2
                continue
              endif
              if i == 4
                break
              endif
              sum = sum + i
            endforeach
        "});
        result.expect("should run");
        assert_eq!(var(&wk, "sum"), Value::Int(4));
    }

    #[test]
    fn mutation_during_iteration_sees_the_snapshot() {
        let (wk, result) = run(indoc::indoc! {"
            a = [1, 2]
            n = 0
            foreach i : a
              a = a + [9]
              n = n + 1
            endforeach
        "});
        result.expect("should run");
        assert_eq!(var(&wk, "n"), Value::Int(2));
    }

    #[test]
    fn in_operator_covers_arrays_dict_keys_and_substrings() {
        let (wk, result) = run(indoc::indoc! {"
            a = 2 in [1, 2, 3]
            b = 'k' in {'k': 1}
            c = 'ell' in 'hello'
            d = 'x' not in 'hello'
        "});
        result.expect("should run");
        assert_eq!(var(&wk, "a"), Value::Bool(true));
        assert_eq!(var(&wk, "b"), Value::Bool(true));
        assert_eq!(var(&wk, "c"), Value::Bool(true));
        assert_eq!(var(&wk, "d"), Value::Bool(true));
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        // The right operand would fault if evaluated.
        let (wk, result) = run("ok = false and undefined_name\n");
        result.expect("should run");
        assert_eq!(var(&wk, "ok"), Value::Bool(false));
    }

    #[test]
    fn undefined_identifier_unwinds_the_run() {
        let (_, result) = run("x = missing\n");
        let err = result.expect_err("expected failure");
        assert_eq!(
            err.kind,
            ErrorKind::UndefinedIdentifier("missing".to_string())
        );
    }

    #[test]
    fn index_out_of_bounds_carries_len() {
        let (_, result) = run("x = [1, 2][5]\n");
        let err = result.expect_err("expected failure");
        assert_eq!(err.kind, ErrorKind::IndexOutOfBounds { index: 5, len: 2 });
    }

    #[test]
    fn dict_index_missing_key() {
        let (_, result) = run("x = {'a': 1}['b']\n");
        let err = result.expect_err("expected failure");
        assert_eq!(err.kind, ErrorKind::KeyNotFound("b".to_string()));
    }

    #[test]
    fn string_index_yields_single_characters() {
        let (wk, result) = run("x = 'abc'[1]\n");
        result.expect("should run");
        assert_eq!(var(&wk, "x"), Value::Str("b".into()));
    }

    #[test]
    fn comparison_on_mixed_types_is_unsupported() {
        let (_, result) = run("x = 1 < 'a'\n");
        let err = result.expect_err("expected failure");
        assert!(matches!(err.kind, ErrorKind::UnsupportedBinaryOp { .. }));
    }
}
