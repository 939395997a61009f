use super::FnDesc;
use crate::dispatch::{param, Signature, TypeSpec};
use crate::error::{ErrorKind, LangError};
use crate::value::{Obj, ObjId, Value};
use crate::workspace::Workspace;

fn recv(wk: &Workspace, receiver: Option<Value>) -> ObjId {
    match receiver {
        Some(Value::Obj(id)) if matches!(wk.heap.get(id), Obj::Array(_)) => id,
        _ => unreachable!("array method dispatched on non-array receiver"),
    }
}

/// Membership check, descending one level into nested arrays the way
/// the language's `contains` does.
fn contains(wk: &Workspace, values: &[Value], needle: &Value) -> bool {
    values.iter().any(|v| {
        if v == needle {
            return true;
        }
        match v {
            Value::Obj(id) => match wk.heap.get(*id) {
                Obj::Array(nested) => contains(wk, nested, needle),
                _ => false,
            },
            _ => false,
        }
    })
}

pub static TABLE: &[FnDesc] = &[
    FnDesc {
        name: "contains",
        sig: Signature {
            required: &[param("item", TypeSpec::Any)],
            optional: &[],
            glob: None,
            keywords: &[],
        },
        imp: |wk, receiver, args| {
            let id = recv(wk, receiver);
            let values = wk.heap.array(id).clone();
            Ok(Value::Bool(contains(wk, &values, args.arg(0))))
        },
    },
    FnDesc {
        name: "get",
        sig: Signature {
            required: &[param("index", TypeSpec::Int)],
            optional: &[param("default", TypeSpec::Any)],
            glob: None,
            keywords: &[],
        },
        imp: |wk, receiver, args| {
            let id = recv(wk, receiver);
            let values = wk.heap.array(id);
            let index = args.arg(0).as_int().expect("bound as int");
            let slot = usize::try_from(index).ok().and_then(|i| values.get(i));
            match (slot, args.opt(1)) {
                (Some(value), _) => Ok(value.clone()),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(LangError::new(
                    ErrorKind::IndexOutOfBounds {
                        index,
                        len: values.len(),
                    },
                    args.span,
                )),
            }
        },
    },
    FnDesc {
        name: "length",
        sig: Signature::NONE,
        imp: |wk, receiver, _| {
            let id = recv(wk, receiver);
            Ok(Value::Int(wk.heap.array(id).len() as i64))
        },
    },
];
