use std::rc::Rc;

use tracing::info;

use super::FnDesc;
use crate::dispatch::{bind, param, Args, Signature, TypeSpec};
use crate::error::{ErrorKind, LangError, LangResult};
use crate::value::{Module, Obj, Value};
use crate::workspace::Workspace;

/// Modules shipped with the interpreter.
pub const SUPPORTED: &[&str] = &["pkgconfig"];

fn module(wk: &Workspace, receiver: &Value) -> Module {
    match receiver {
        Value::Obj(id) => match wk.heap.get(*id) {
            Obj::Module(module) => module.clone(),
            _ => unreachable!("module method dispatched on non-module receiver"),
        },
        _ => unreachable!("module method dispatched on non-module receiver"),
    }
}

/// Module methods resolve in two steps: the shared `found` probe, then
/// the per-module table.
pub fn call(wk: &mut Workspace, receiver: Value, name: &Rc<str>, args: Args) -> LangResult<Value> {
    let module = module(wk, &receiver);
    if &**name == "found" {
        return Ok(Value::Bool(module.found));
    }
    let table: &[FnDesc] = match &*module.name {
        "pkgconfig" => PKGCONFIG_TABLE,
        _ => &[],
    };
    let desc = super::lookup(table, name).ok_or_else(|| {
        LangError::new(
            ErrorKind::UnknownMethod {
                method: name.to_string(),
                receiver: format!("module '{}'", module.name),
            },
            args.span,
        )
    })?;
    let bound = bind(wk, &desc.sig, args)?;
    (desc.imp)(wk, Some(receiver), bound)
}

static PKGCONFIG_TABLE: &[FnDesc] = &[FnDesc {
    name: "generate",
    sig: Signature {
        required: &[],
        optional: &[param("library", TypeSpec::BuildTarget)],
        glob: None,
        keywords: &[
            param("description", TypeSpec::Str),
            param("libraries", TypeSpec::ArrayOf(&TypeSpec::Str)),
            param("name", TypeSpec::Str),
            param("version", TypeSpec::Str),
        ],
    },
    imp: |wk, _, args| {
        let lib_name = args.opt(0).and_then(|v| v.as_obj()).and_then(|id| {
            match wk.heap.get(id) {
                Obj::BuildTarget(target) => Some(target.name.clone()),
                _ => None,
            }
        });
        let name = args
            .kw_str("name")
            .or(lib_name.clone())
            .unwrap_or_else(|| wk.cur_project().name.clone());
        let version = args
            .kw_str("version")
            .unwrap_or_else(|| wk.cur_project().version.clone());
        let description = args.kw_str("description").unwrap_or_else(|| "".into());

        let mut libs: Vec<String> = Vec::new();
        if let Some(lib) = &lib_name {
            libs.push(format!("-l{lib}"));
        }
        if let Some(extra) = args.kw("libraries").and_then(|v| v.as_obj()) {
            libs.extend(
                wk.heap
                    .array(extra)
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string())),
            );
        }

        let content = format!(
            "prefix=/usr/local\nlibdir=${{prefix}}/lib\nincludedir=${{prefix}}/include\n\n\
             Name: {name}\nDescription: {description}\nVersion: {version}\n\
             Libs: -L${{libdir}} {}\nCflags: -I${{includedir}}\n",
            libs.join(" ")
        );

        let dir = wk.build_root.join("pkgconfig");
        wk.effects.mkdir_all(&dir)?;
        let path = dir.join(format!("{name}.pc"));
        wk.effects.write_file(&path, content.as_bytes())?;
        info!(path = %path.display(), "generated pkg-config file");
        Ok(Value::Null)
    },
}];
