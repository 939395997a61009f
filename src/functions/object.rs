use std::rc::Rc;

use super::FnDesc;
use crate::dispatch::{param, Bound, Signature, TypeSpec};
use crate::error::{ErrorKind, LangError, LangResult};
use crate::heap::Heap;
use crate::value::{EnvAction, FeatureKind, Obj, ObjId, Value};
use crate::workspace::Workspace;

fn recv(receiver: Option<Value>) -> ObjId {
    match receiver {
        Some(Value::Obj(id)) => id,
        _ => unreachable!("object method dispatched on non-object receiver"),
    }
}

fn wrong_receiver(wk: &Workspace, id: ObjId, method: &str, args: &Bound) -> LangError {
    LangError::new(
        ErrorKind::UnknownMethod {
            method: method.to_string(),
            receiver: wk.heap.get(id).kind_name().to_string(),
        },
        args.span,
    )
}

fn feature_is(wk: &Workspace, id: ObjId, want: FeatureKind, args: &Bound) -> LangResult<Value> {
    match wk.heap.get(id) {
        Obj::Feature(kind) => Ok(Value::Bool(*kind == want)),
        _ => Err(wrong_receiver(wk, id, "feature query", args)),
    }
}

fn env_action(
    wk: &mut Workspace,
    id: ObjId,
    args: &Bound,
    method: &str,
    make: fn(Rc<str>, Rc<str>) -> EnvAction,
) -> LangResult<Value> {
    let name = args.arg(0).as_str().expect("bound as string").clone();
    let value = args.arg(1).as_str().expect("bound as string").clone();
    match wk.heap.get_mut(id) {
        Obj::Environment(actions) => {
            actions.push(make(name, value));
            Ok(Value::Null)
        }
        _ => Err(wrong_receiver(wk, id, method, args)),
    }
}

/// Scope-chain lookup inside an already-evaluated subproject.
fn subproject_var(wk: &Workspace, project: usize, name: &str) -> Option<Value> {
    wk.projects[project]
        .scopes
        .iter()
        .rev()
        .find_map(|scope| scope.vars.get(name).cloned())
}

const KEY_VALUE: Signature = Signature {
    required: &[param("name", TypeSpec::Str), param("value", TypeSpec::Str)],
    optional: &[],
    glob: None,
    keywords: &[],
};

const NAME_WITH_DEFAULT: Signature = Signature {
    required: &[param("name", TypeSpec::Str)],
    optional: &[param("default", TypeSpec::Any)],
    glob: None,
    keywords: &[],
};

pub static TABLE: &[FnDesc] = &[
    FnDesc {
        name: "append",
        sig: KEY_VALUE,
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            env_action(wk, id, &args, "append", EnvAction::Append)
        },
    },
    FnDesc {
        name: "auto",
        sig: Signature::NONE,
        imp: |wk, receiver, args| feature_is(wk, recv(receiver), FeatureKind::Auto, &args),
    },
    FnDesc {
        name: "disabled",
        sig: Signature::NONE,
        imp: |wk, receiver, args| feature_is(wk, recv(receiver), FeatureKind::Disabled, &args),
    },
    FnDesc {
        name: "enabled",
        sig: Signature::NONE,
        imp: |wk, receiver, args| feature_is(wk, recv(receiver), FeatureKind::Enabled, &args),
    },
    FnDesc {
        name: "found",
        sig: Signature::NONE,
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            let found = match wk.heap.get(id) {
                Obj::Dependency(dep) => dep.found,
                Obj::ExternalProgram(prog) => prog.found,
                Obj::Subproject(sub) => sub.found,
                Obj::Module(module) => module.found,
                _ => return Err(wrong_receiver(wk, id, "found", &args)),
            };
            Ok(Value::Bool(found))
        },
    },
    FnDesc {
        name: "full_path",
        sig: Signature::NONE,
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            match wk.heap.get(id) {
                Obj::BuildTarget(target) => Ok(Value::Str(
                    wk.build_root
                        .join(&*target.build_name)
                        .to_string_lossy()
                        .into_owned()
                        .into(),
                )),
                Obj::ExternalProgram(prog) => Ok(Value::Str(prog.path.clone())),
                _ => Err(wrong_receiver(wk, id, "full_path", &args)),
            }
        },
    },
    FnDesc {
        name: "get",
        sig: NAME_WITH_DEFAULT,
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            let key = args.arg(0).as_str().expect("bound as string");
            match wk.heap.get(id) {
                Obj::ConfigData(entries) => {
                    match (wk.heap.dict_get(entries, key), args.opt(1)) {
                        (Some(value), _) => Ok(value),
                        (None, Some(default)) => Ok(default.clone()),
                        (None, None) => Err(LangError::new(
                            ErrorKind::KeyNotFound(key.to_string()),
                            args.span,
                        )),
                    }
                }
                _ => Err(wrong_receiver(wk, id, "get", &args)),
            }
        },
    },
    FnDesc {
        name: "get_variable",
        sig: NAME_WITH_DEFAULT,
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            let key = args.arg(0).as_str().expect("bound as string").clone();
            match wk.heap.get(id) {
                Obj::Dependency(dep) => {
                    if let Some((_, value)) = dep.variables.iter().find(|(k, _)| *k == key) {
                        return Ok(Value::Str(value.clone()));
                    }
                    let name = dep.name.clone();
                    let timeout = wk.probe_timeout;
                    if let Some(value) = wk.effects.pkg_get_variable(&name, &key, timeout)? {
                        return Ok(Value::Str(value.into()));
                    }
                    match args.opt(1) {
                        Some(default) => Ok(default.clone()),
                        None => Err(LangError::new(
                            ErrorKind::KeyNotFound(key.to_string()),
                            args.span,
                        )),
                    }
                }
                Obj::Subproject(sub) => {
                    let value = sub
                        .project
                        .and_then(|project| subproject_var(wk, project, &key));
                    match (value, args.opt(1)) {
                        (Some(value), _) => Ok(value),
                        (None, Some(default)) => Ok(default.clone()),
                        (None, None) => Err(LangError::new(
                            ErrorKind::UndefinedIdentifier(key.to_string()),
                            args.span,
                        )),
                    }
                }
                _ => Err(wrong_receiver(wk, id, "get_variable", &args)),
            }
        },
    },
    FnDesc {
        name: "has",
        sig: Signature {
            required: &[param("name", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[],
        },
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            let key = args.arg(0).as_str().expect("bound as string");
            match wk.heap.get(id) {
                Obj::ConfigData(entries) => {
                    Ok(Value::Bool(entries.iter().any(|(k, _)| k == key)))
                }
                _ => Err(wrong_receiver(wk, id, "has", &args)),
            }
        },
    },
    FnDesc {
        name: "name",
        sig: Signature::NONE,
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            match wk.heap.get(id) {
                Obj::Dependency(dep) => Ok(Value::Str(dep.name.clone())),
                Obj::BuildTarget(target) => Ok(Value::Str(target.name.clone())),
                Obj::ExternalProgram(prog) => Ok(Value::Str(prog.name.clone())),
                _ => Err(wrong_receiver(wk, id, "name", &args)),
            }
        },
    },
    FnDesc {
        name: "path",
        sig: Signature::NONE,
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            match wk.heap.get(id) {
                Obj::ExternalProgram(prog) => Ok(Value::Str(prog.path.clone())),
                Obj::File(path) => Ok(Value::Str(path.clone())),
                _ => Err(wrong_receiver(wk, id, "path", &args)),
            }
        },
    },
    FnDesc {
        name: "prepend",
        sig: KEY_VALUE,
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            env_action(wk, id, &args, "prepend", EnvAction::Prepend)
        },
    },
    FnDesc {
        name: "returncode",
        sig: Signature::NONE,
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            match wk.heap.get(id) {
                Obj::RunResult(result) => Ok(Value::Int(result.status as i64)),
                _ => Err(wrong_receiver(wk, id, "returncode", &args)),
            }
        },
    },
    FnDesc {
        name: "set",
        sig: Signature {
            required: &[param("name", TypeSpec::Str), param("value", TypeSpec::Any)],
            optional: &[],
            glob: None,
            keywords: &[],
        },
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            let key = args.arg(0).as_str().expect("bound as string").clone();
            let value = args.arg(1).clone();
            match wk.heap.get_mut(id) {
                Obj::ConfigData(entries) => {
                    Heap::dict_set(entries, key, value);
                    Ok(Value::Null)
                }
                Obj::Environment(actions) => {
                    let Value::Str(value) = value else {
                        return Err(LangError::new(
                            ErrorKind::Type {
                                expected: "string".to_string(),
                                got: "non-string".to_string(),
                                param: "value".to_string(),
                            },
                            args.span,
                        ));
                    };
                    actions.push(EnvAction::Set(key, value));
                    Ok(Value::Null)
                }
                _ => Err(wrong_receiver(wk, id, "set", &args)),
            }
        },
    },
    FnDesc {
        name: "set10",
        sig: Signature {
            required: &[param("name", TypeSpec::Str), param("value", TypeSpec::Bool)],
            optional: &[],
            glob: None,
            keywords: &[],
        },
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            let key = args.arg(0).as_str().expect("bound as string").clone();
            let value = args.arg(1).as_bool().expect("bound as bool");
            match wk.heap.get_mut(id) {
                Obj::ConfigData(entries) => {
                    Heap::dict_set(entries, key, Value::Int(i64::from(value)));
                    Ok(Value::Null)
                }
                _ => Err(wrong_receiver(wk, id, "set10", &args)),
            }
        },
    },
    FnDesc {
        name: "stderr",
        sig: Signature::NONE,
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            match wk.heap.get(id) {
                Obj::RunResult(result) => Ok(Value::Str(result.stderr.clone())),
                _ => Err(wrong_receiver(wk, id, "stderr", &args)),
            }
        },
    },
    FnDesc {
        name: "stdout",
        sig: Signature::NONE,
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            match wk.heap.get(id) {
                Obj::RunResult(result) => Ok(Value::Str(result.stdout.clone())),
                _ => Err(wrong_receiver(wk, id, "stdout", &args)),
            }
        },
    },
    FnDesc {
        name: "version",
        sig: Signature::NONE,
        imp: |wk, receiver, args| {
            let id = recv(receiver);
            match wk.heap.get(id) {
                Obj::Dependency(dep) => Ok(Value::Str(dep.version.clone())),
                _ => Err(wrong_receiver(wk, id, "version", &args)),
            }
        },
    },
];
