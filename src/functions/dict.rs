use std::rc::Rc;

use super::FnDesc;
use crate::dispatch::{param, Signature, TypeSpec};
use crate::error::{ErrorKind, LangError};
use crate::value::{Obj, ObjId, Value};
use crate::workspace::Workspace;

fn recv(wk: &Workspace, receiver: Option<Value>) -> ObjId {
    match receiver {
        Some(Value::Obj(id)) if matches!(wk.heap.get(id), Obj::Dict(_)) => id,
        _ => unreachable!("dict method dispatched on non-dict receiver"),
    }
}

fn entries(wk: &Workspace, id: ObjId) -> &Vec<(Rc<str>, Value)> {
    match wk.heap.get(id) {
        Obj::Dict(entries) => entries,
        _ => unreachable!("receiver checked by recv"),
    }
}

pub static TABLE: &[FnDesc] = &[
    FnDesc {
        name: "get",
        sig: Signature {
            required: &[param("key", TypeSpec::Str)],
            optional: &[param("default", TypeSpec::Any)],
            glob: None,
            keywords: &[],
        },
        imp: |wk, receiver, args| {
            let id = recv(wk, receiver);
            let key = args.arg(0).as_str().expect("bound as string");
            match (wk.heap.dict_get(entries(wk, id), key), args.opt(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(LangError::new(
                    ErrorKind::KeyNotFound(key.to_string()),
                    args.span,
                )),
            }
        },
    },
    FnDesc {
        name: "has_key",
        sig: Signature {
            required: &[param("key", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[],
        },
        imp: |wk, receiver, args| {
            let id = recv(wk, receiver);
            let key = args.arg(0).as_str().expect("bound as string");
            Ok(Value::Bool(entries(wk, id).iter().any(|(k, _)| k == key)))
        },
    },
    FnDesc {
        name: "keys",
        sig: Signature::NONE,
        imp: |wk, receiver, _| {
            // Insertion order, same as iteration.
            let id = recv(wk, receiver);
            let keys: Vec<Value> = entries(wk, id)
                .iter()
                .map(|(k, _)| Value::Str(k.clone()))
                .collect();
            Ok(wk.heap.alloc_array(keys))
        },
    },
];
