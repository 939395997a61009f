pub mod array;
pub mod compiler;
pub mod default;
pub mod dict;
pub mod modules;
pub mod object;
pub mod string;

use std::rc::Rc;

use crate::dispatch::{bind, Args, Signature};
use crate::error::{ErrorKind, LangError, LangResult};
use crate::value::{Obj, Value};
use crate::workspace::Workspace;

pub type NativeFn = fn(&mut Workspace, Option<Value>, crate::dispatch::Bound) -> LangResult<Value>;

/// One dispatchable native: name, declared signature, implementation.
pub struct FnDesc {
    pub name: &'static str,
    pub sig: Signature,
    pub imp: NativeFn,
}

/// Tables are sorted by name so lookup is a binary search.
pub(crate) fn lookup<'a>(table: &'a [FnDesc], name: &str) -> Option<&'a FnDesc> {
    table
        .binary_search_by(|desc| desc.name.cmp(name))
        .ok()
        .map(|idx| &table[idx])
}

/// Functions that must see disablers instead of collapsing on them.
const DISABLER_TRANSPARENT: &[&str] = &["is_disabler", "set_variable", "is_variable", "disabler"];

pub fn call_function(wk: &mut Workspace, name: &Rc<str>, args: Args) -> LangResult<Value> {
    if !DISABLER_TRANSPARENT.contains(&&**name) {
        if let Some(disabler) = args.any_disabler(wk) {
            return Ok(disabler);
        }
    }
    let desc = lookup(default::TABLE, name).ok_or_else(|| {
        LangError::new(ErrorKind::UnknownFunction(name.to_string()), args.span)
    })?;
    let bound = bind(wk, &desc.sig, args)?;
    (desc.imp)(wk, None, bound)
}

pub fn call_method(wk: &mut Workspace, receiver: Value, name: &Rc<str>, args: Args) -> LangResult<Value> {
    // Disabler propagation: a method on a disabler, or any disabler
    // argument, collapses the whole call to the disabler.
    if let Value::Obj(id) = &receiver {
        if matches!(wk.heap.get(*id), Obj::Disabler) {
            return Ok(receiver);
        }
    }
    if let Some(disabler) = args.any_disabler(wk) {
        return Ok(disabler);
    }

    let table: &[FnDesc] = match &receiver {
        Value::Str(_) => string::TABLE,
        Value::Obj(id) => match wk.heap.get(*id) {
            Obj::Array(_) => array::TABLE,
            Obj::Dict(_) => dict::TABLE,
            Obj::Compiler(_) => compiler::TABLE,
            Obj::Module(_) => return modules::call(wk, receiver, name, args),
            _ => object::TABLE,
        },
        _ => {
            return Err(LangError::new(
                ErrorKind::UnknownMethod {
                    method: name.to_string(),
                    receiver: receiver.kind_name(&wk.heap).to_string(),
                },
                args.span,
            ))
        }
    };

    let desc = lookup(table, name).ok_or_else(|| {
        LangError::new(
            ErrorKind::UnknownMethod {
                method: name.to_string(),
                receiver: receiver.kind_name(&wk.heap).to_string(),
            },
            args.span,
        )
    })?;
    let bound = bind(wk, &desc.sig, args)?;
    (desc.imp)(wk, Some(receiver), bound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_sorted_for_binary_search() {
        for table in [
            default::TABLE,
            string::TABLE,
            array::TABLE,
            dict::TABLE,
            compiler::TABLE,
            object::TABLE,
        ] {
            for pair in table.windows(2) {
                assert!(
                    pair[0].name < pair[1].name,
                    "table out of order at '{}' / '{}'",
                    pair[0].name,
                    pair[1].name
                );
            }
        }
    }
}
