use std::path::Path;

use tracing::debug;

use super::FnDesc;
use crate::dispatch::{param, Signature, TypeSpec};
use crate::error::{ErrorKind, LangError, LangResult};
use crate::value::{Compiler, Dependency, Obj, Value};
use crate::workspace::Workspace;

fn recv(wk: &Workspace, receiver: Option<Value>) -> Compiler {
    match receiver {
        Some(Value::Obj(id)) => match wk.heap.get(id) {
            Obj::Compiler(compiler) => compiler.clone(),
            _ => unreachable!("compiler method dispatched on non-compiler receiver"),
        },
        _ => unreachable!("compiler method dispatched on non-compiler receiver"),
    }
}

enum ProbeMode {
    Compile,
    Link,
}

/// Writes a probe source into the run's private dir and invokes the
/// compiler on it. A non-zero exit is the expected negative answer,
/// not an error; only an unlaunchable compiler propagates.
fn probe(
    wk: &mut Workspace,
    compiler: &Compiler,
    extra_args: &[&str],
    code: &str,
    mode: ProbeMode,
    what: &str,
) -> LangResult<bool> {
    let serial = wk.heap.len();
    let src = wk.private_path(&format!("probe_{serial}.c"))?;
    let out = wk.private_path(&format!("probe_{serial}.out"))?;
    wk.effects.write_file(&src, code.as_bytes())?;

    let mut argv = vec![compiler.cmd.to_string()];
    argv.extend(extra_args.iter().map(|a| a.to_string()));
    if matches!(mode, ProbeMode::Compile) {
        argv.push("-c".to_string());
    }
    argv.push(src.to_string_lossy().into_owned());
    argv.push("-o".to_string());
    argv.push(out.to_string_lossy().into_owned());

    let timeout = wk.probe_timeout;
    let result = wk.effects.run_cmd(&argv, timeout)?;
    debug!(what, ok = result.success(), "compiler probe");
    Ok(result.success())
}

fn has_argument(wk: &mut Workspace, compiler: &Compiler, arg: &str) -> LangResult<bool> {
    probe(
        wk,
        compiler,
        &[arg, "-Werror"],
        "int main(void) { return 0; }\n",
        ProbeMode::Compile,
        "has_argument",
    )
}

const LIBRARY_DIRS: &[&str] = &[
    "/usr/local/lib",
    "/usr/lib",
    "/usr/lib/x86_64-linux-gnu",
    "/lib",
];

pub static TABLE: &[FnDesc] = &[
    FnDesc {
        name: "cmd_array",
        sig: Signature::NONE,
        imp: |wk, receiver, _| {
            let compiler = recv(wk, receiver);
            Ok(wk.heap.alloc_array(vec![Value::Str(compiler.cmd)]))
        },
    },
    FnDesc {
        name: "compiles",
        sig: Signature {
            required: &[param("code", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[param("name", TypeSpec::Str)],
        },
        imp: |wk, receiver, args| {
            let compiler = recv(wk, receiver);
            let code = args.arg(0).as_str().expect("bound as string").clone();
            let what = args.kw_str("name").unwrap_or_else(|| "compiles".into());
            let ok = probe(wk, &compiler, &[], &code, ProbeMode::Compile, &what)?;
            Ok(Value::Bool(ok))
        },
    },
    FnDesc {
        name: "find_library",
        sig: Signature {
            required: &[param("name", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[
                param("dirs", TypeSpec::ArrayOf(&TypeSpec::Str)),
                param("disabler", TypeSpec::Bool),
                param("required", TypeSpec::Bool),
            ],
        },
        imp: |wk, receiver, args| {
            let _ = recv(wk, receiver);
            let name = args.arg(0).as_str().expect("bound as string").clone();

            let mut dirs: Vec<String> = Vec::new();
            if let Some(extra) = args.kw("dirs").and_then(|v| v.as_obj()) {
                dirs.extend(
                    wk.heap
                        .array(extra)
                        .iter()
                        .filter_map(|v| v.as_str().map(|s| s.to_string())),
                );
            }
            dirs.extend(LIBRARY_DIRS.iter().map(|d| d.to_string()));

            let found = dirs.iter().any(|dir| {
                let dir = Path::new(dir);
                wk.effects.file_exists(&dir.join(format!("lib{name}.so")))
                    || wk.effects.file_exists(&dir.join(format!("lib{name}.a")))
            });

            if found {
                let dep = Dependency {
                    link_args: vec![format!("-l{name}").into()],
                    found: true,
                    ..Dependency::not_found(name)
                };
                return Ok(Value::Obj(wk.heap.alloc(Obj::Dependency(dep))));
            }
            if args.kw_bool("disabler", false) {
                return Ok(Value::Obj(wk.heap.alloc(Obj::Disabler)));
            }
            if args.kw_bool("required", true) {
                return Err(LangError::new(
                    ErrorKind::Fatal(format!("library '{name}' not found")),
                    args.span,
                ));
            }
            Ok(Value::Obj(
                wk.heap.alloc(Obj::Dependency(Dependency::not_found(name))),
            ))
        },
    },
    FnDesc {
        name: "get_id",
        sig: Signature::NONE,
        imp: |wk, receiver, _| {
            let compiler = recv(wk, receiver);
            let id = Path::new(&*compiler.cmd)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| compiler.cmd.to_string());
            Ok(Value::Str(id.into()))
        },
    },
    FnDesc {
        name: "get_supported_arguments",
        sig: Signature {
            required: &[],
            optional: &[],
            glob: Some(TypeSpec::Str),
            keywords: &[],
        },
        imp: |wk, receiver, args| {
            let compiler = recv(wk, receiver);
            let mut supported = Vec::new();
            for value in args.glob().to_vec() {
                let arg = value.as_str().expect("bound as string").clone();
                if has_argument(wk, &compiler, &arg)? {
                    supported.push(Value::Str(arg));
                }
            }
            Ok(wk.heap.alloc_array(supported))
        },
    },
    FnDesc {
        name: "has_argument",
        sig: Signature {
            required: &[param("argument", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[],
        },
        imp: |wk, receiver, args| {
            let compiler = recv(wk, receiver);
            let arg = args.arg(0).as_str().expect("bound as string").clone();
            Ok(Value::Bool(has_argument(wk, &compiler, &arg)?))
        },
    },
    FnDesc {
        name: "has_function",
        sig: Signature {
            required: &[param("name", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[param("prefix", TypeSpec::Str)],
        },
        imp: |wk, receiver, args| {
            let compiler = recv(wk, receiver);
            let name = args.arg(0).as_str().expect("bound as string").clone();
            let prefix = args.kw_str("prefix").unwrap_or_else(|| "".into());
            // Resolving the symbol needs a link, not just a compile.
            let code = format!(
                "{prefix}\nchar {name}(void);\nint main(void) {{ return (int)(long){name}; }}\n"
            );
            let ok = probe(wk, &compiler, &[], &code, ProbeMode::Link, "has_function")?;
            Ok(Value::Bool(ok))
        },
    },
    FnDesc {
        name: "has_header_symbol",
        sig: Signature {
            required: &[
                param("header", TypeSpec::Str),
                param("symbol", TypeSpec::Str),
            ],
            optional: &[],
            glob: None,
            keywords: &[param("prefix", TypeSpec::Str)],
        },
        imp: |wk, receiver, args| {
            let compiler = recv(wk, receiver);
            let header = args.arg(0).as_str().expect("bound as string").clone();
            let symbol = args.arg(1).as_str().expect("bound as string").clone();
            let prefix = args.kw_str("prefix").unwrap_or_else(|| "".into());
            // The #ifndef keeps macros as valid answers.
            let code = format!(
                "{prefix}\n#include <{header}>\nint main(void) {{\n#ifndef {symbol}\n    (void)&{symbol};\n#endif\n    return 0;\n}}\n"
            );
            let ok = probe(
                wk,
                &compiler,
                &[],
                &code,
                ProbeMode::Compile,
                "has_header_symbol",
            )?;
            Ok(Value::Bool(ok))
        },
    },
    FnDesc {
        name: "version",
        sig: Signature::NONE,
        imp: |wk, receiver, _| {
            let compiler = recv(wk, receiver);
            Ok(Value::Str(compiler.version))
        },
    },
];
