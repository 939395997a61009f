use std::rc::Rc;

use tracing::{info, warn};

use super::FnDesc;
use crate::dispatch::{param, Bound, Param, Signature, TypeSpec};
use crate::error::{ErrorKind, LangError, LangResult};
use crate::eval;
use crate::value::{
    Compiler, CustomTarget, Dependency, EnvAction, ExternalProgram, FeatureKind, Generator, Module,
    Obj, TargetKind, Value,
};
use crate::vm::path_join;
use crate::workspace::{InstallRule, Severity, TestDef, Workspace};

/// Values of an array-typed keyword, empty when absent.
fn kw_values(wk: &Workspace, args: &Bound, name: &str) -> Vec<Value> {
    args.kw(name)
        .and_then(|v| v.as_obj())
        .map(|id| wk.heap.array(id).clone())
        .unwrap_or_default()
}

fn kw_strs(wk: &Workspace, args: &Bound, name: &str) -> Vec<Rc<str>> {
    kw_values(wk, args, name)
        .iter()
        .filter_map(|v| v.as_str().cloned())
        .collect()
}

/// Interprets a `required:` keyword that accepts a bool or a feature
/// option. Returns (required, skip): an explicitly disabled feature
/// skips the lookup entirely.
fn required_flag(wk: &Workspace, args: &Bound, default: bool) -> (bool, bool) {
    match args.kw("required") {
        Some(Value::Bool(required)) => (*required, false),
        Some(Value::Obj(id)) => match wk.heap.get(*id) {
            Obj::Feature(FeatureKind::Enabled) => (true, false),
            Obj::Feature(FeatureKind::Disabled) => (false, true),
            Obj::Feature(FeatureKind::Auto) => (false, false),
            _ => (default, false),
        },
        _ => (default, false),
    }
}

const REQUIRED_KW: Param = param("required", TypeSpec::Any);

fn render_args(wk: &Workspace, values: &[Value]) -> String {
    values
        .iter()
        .map(|v| v.display(&wk.heap))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `rw-r--r--` style permission string to mode bits.
fn parse_mode(mode: &str) -> Option<u32> {
    if mode.len() != 9 {
        return None;
    }
    let mut bits = 0u32;
    for (idx, ch) in mode.chars().enumerate() {
        bits <<= 1;
        match (idx % 3, ch) {
            (0, 'r') | (1, 'w') | (2, 'x') => bits |= 1,
            (_, '-') => {}
            _ => return None,
        }
    }
    Some(bits)
}

fn detect_compiler(wk: &mut Workspace, language: &str, span: crate::token::Span) -> LangResult<Value> {
    let (env_var, fallback) = match language {
        "c" => ("CC", "cc"),
        "cpp" => ("CXX", "c++"),
        _ => {
            return Err(LangError::new(
                ErrorKind::Fatal(format!("unsupported language '{language}'")),
                span,
            ))
        }
    };
    let cmd = std::env::var(env_var).unwrap_or_else(|_| fallback.to_string());
    let path = wk.effects.find_program(&cmd).ok_or_else(|| {
        LangError::new(
            ErrorKind::Fatal(format!("compiler '{cmd}' for language '{language}' not found")),
            span,
        )
    })?;
    let timeout = wk.probe_timeout;
    let version = match wk
        .effects
        .run_cmd(&[path.clone(), "-dumpversion".to_string()], timeout)
    {
        Ok(out) if out.success() && !out.stdout.trim().is_empty() => {
            out.stdout.trim().to_string()
        }
        _ => "unknown".to_string(),
    };
    info!(language, cmd = %path, version, "detected compiler");
    Ok(Value::Obj(wk.heap.alloc(Obj::Compiler(Compiler {
        cmd: path.into(),
        language: language.into(),
        version: version.into(),
    }))))
}

fn target_sources(wk: &mut Workspace, args: &Bound) -> LangResult<Vec<Value>> {
    let mut sources: Vec<Value> = args.glob().to_vec();
    sources.extend(kw_values(wk, args, "sources"));
    Ok(sources)
}

const TARGET_KEYWORDS: &[Param] = &[
    param("c_args", TypeSpec::ArrayOf(&TypeSpec::Str)),
    param("dependencies", TypeSpec::ArrayOf(&TypeSpec::Dependency)),
    param("include_directories", TypeSpec::ArrayOf(&TypeSpec::Str)),
    param("install", TypeSpec::Bool),
    param("link_args", TypeSpec::ArrayOf(&TypeSpec::Str)),
    param("link_with", TypeSpec::ArrayOf(&TypeSpec::BuildTarget)),
    param("sources", TypeSpec::ArrayOf(&TypeSpec::File)),
];

const TARGET_SIG: Signature = Signature {
    required: &[param("name", TypeSpec::Str)],
    optional: &[],
    glob: Some(TypeSpec::File),
    keywords: TARGET_KEYWORDS,
};

fn make_target(wk: &mut Workspace, kind: TargetKind, args: Bound) -> LangResult<Value> {
    let name = args.arg(0).as_str().expect("bound as string").clone();
    let sources = target_sources(wk, &args)?;
    let target = crate::value::BuildTarget {
        build_name: kind.decorate(&name).into(),
        name: name.clone(),
        kind,
        sources,
        include_directories: kw_values(wk, &args, "include_directories"),
        deps: kw_values(wk, &args, "dependencies")
            .into_iter()
            .chain(kw_values(wk, &args, "link_with"))
            .collect(),
        compile_args: kw_strs(wk, &args, "c_args"),
        link_args: kw_strs(wk, &args, "link_args"),
        install: args.kw_bool("install", false),
    };
    info!(name = %name, kind = kind.name(), "added target");
    let id = wk.heap.alloc(Obj::BuildTarget(target));
    wk.cur_project_mut().targets.push(id);
    Ok(Value::Obj(id))
}

pub static TABLE: &[FnDesc] = &[
    FnDesc {
        name: "add_project_arguments",
        sig: Signature {
            required: &[],
            optional: &[],
            glob: Some(TypeSpec::Str),
            keywords: &[param("language", TypeSpec::ArrayOf(&TypeSpec::Str))],
        },
        imp: |wk, _, args| {
            let new: Vec<Rc<str>> = args
                .glob()
                .iter()
                .filter_map(|v| v.as_str().cloned())
                .collect();
            wk.cur_project_mut().args.extend(new);
            Ok(Value::Null)
        },
    },
    FnDesc {
        name: "assert",
        sig: Signature {
            required: &[param("condition", TypeSpec::Bool)],
            optional: &[param("message", TypeSpec::Str)],
            glob: None,
            keywords: &[],
        },
        imp: |_, _, args| {
            if args.arg(0).as_bool().expect("bound as bool") {
                return Ok(Value::Null);
            }
            let message = args
                .opt(1)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| "assertion failed".to_string());
            Err(LangError::new(ErrorKind::Fatal(message), args.span))
        },
    },
    FnDesc {
        name: "configuration_data",
        sig: Signature {
            required: &[],
            optional: &[param("initial", TypeSpec::Dict)],
            glob: None,
            keywords: &[],
        },
        imp: |wk, _, args| {
            let entries = match args.opt(0).and_then(|v| v.as_obj()) {
                Some(id) => match wk.heap.get(id) {
                    Obj::Dict(entries) => entries.clone(),
                    _ => Vec::new(),
                },
                None => Vec::new(),
            };
            Ok(Value::Obj(wk.heap.alloc(Obj::ConfigData(entries))))
        },
    },
    FnDesc {
        name: "custom_target",
        sig: Signature {
            required: &[param("name", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[
                param("command", TypeSpec::ArrayOf(&TypeSpec::Any)),
                param("input", TypeSpec::ArrayOf(&TypeSpec::File)),
                param("output", TypeSpec::ArrayOf(&TypeSpec::Str)),
            ],
        },
        imp: |wk, _, args| {
            let name = args.arg(0).as_str().expect("bound as string").clone();
            let target = CustomTarget {
                name,
                command: kw_values(wk, &args, "command"),
                input: kw_values(wk, &args, "input"),
                output: kw_strs(wk, &args, "output"),
            };
            let id = wk.heap.alloc(Obj::CustomTarget(target));
            wk.cur_project_mut().targets.push(id);
            Ok(Value::Obj(id))
        },
    },
    FnDesc {
        name: "declare_dependency",
        sig: Signature {
            required: &[],
            optional: &[],
            glob: None,
            keywords: &[
                param("compile_args", TypeSpec::ArrayOf(&TypeSpec::Str)),
                param("include_directories", TypeSpec::ArrayOf(&TypeSpec::Str)),
                param("link_args", TypeSpec::ArrayOf(&TypeSpec::Str)),
                param("link_with", TypeSpec::ArrayOf(&TypeSpec::BuildTarget)),
                param("variables", TypeSpec::Dict),
                param("version", TypeSpec::Str),
            ],
        },
        imp: |wk, _, args| {
            let variables = match args.kw("variables").and_then(|v| v.as_obj()) {
                Some(id) => match wk.heap.get(id) {
                    Obj::Dict(entries) => entries
                        .iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.clone())))
                        .collect(),
                    _ => Vec::new(),
                },
                None => Vec::new(),
            };
            let dep = Dependency {
                name: wk.cur_project().name.clone(),
                found: true,
                version: args
                    .kw_str("version")
                    .unwrap_or_else(|| wk.cur_project().version.clone()),
                include_directories: kw_values(wk, &args, "include_directories"),
                link_with: kw_values(wk, &args, "link_with"),
                compile_args: kw_strs(wk, &args, "compile_args"),
                link_args: kw_strs(wk, &args, "link_args"),
                variables,
            };
            Ok(Value::Obj(wk.heap.alloc(Obj::Dependency(dep))))
        },
    },
    FnDesc {
        name: "dependency",
        sig: Signature {
            required: &[param("name", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[
                param("disabler", TypeSpec::Bool),
                param("fallback", TypeSpec::ArrayOf(&TypeSpec::Str)),
                REQUIRED_KW,
                param("version", TypeSpec::ArrayOf(&TypeSpec::Str)),
            ],
        },
        imp: |wk, _, args| {
            let name = args.arg(0).as_str().expect("bound as string").clone();
            let (required, skip) = required_flag(wk, &args, true);
            if skip {
                return Ok(Value::Obj(
                    wk.heap.alloc(Obj::Dependency(Dependency::not_found(name))),
                ));
            }
            let constraints = kw_strs(wk, &args, "version");

            let timeout = wk.probe_timeout;
            // Dry lookups answer with a placeholder version; constraints
            // only bind against a real one.
            let analyzing = wk.analyzing();
            let found = wk.effects.pkg_lookup(&name, timeout)?.and_then(|info| {
                let ok = analyzing
                    || constraints
                        .iter()
                        .all(|c| super::string::version_compare(&info.version, c));
                if ok {
                    Some(info)
                } else {
                    warn!(name = %name, version = %info.version, "dependency version mismatch");
                    None
                }
            });

            if let Some(info) = found {
                info!(name = %name, version = %info.version, "dependency found");
                let mut link_args: Vec<Rc<str>> =
                    info.libs.iter().map(|d| Rc::from(format!("-L{d}"))).collect();
                link_args.extend(info.link_args.iter().map(|a| Rc::from(a.as_str())));
                let dep = Dependency {
                    found: true,
                    version: info.version.into(),
                    include_directories: info
                        .includes
                        .iter()
                        .map(|d| Value::Str(d.as_str().into()))
                        .collect(),
                    compile_args: info.includes.iter().map(|d| Rc::from(format!("-I{d}"))).collect(),
                    link_args,
                    ..Dependency::not_found(name)
                };
                return Ok(Value::Obj(wk.heap.alloc(Obj::Dependency(dep))));
            }

            // Fallback: [subproject, variable] holding the dependency.
            let fallback = kw_strs(wk, &args, "fallback");
            if fallback.len() == 2 {
                let sub = eval::eval_subproject(wk, &fallback[0], required, args.span)?;
                if let Some(id) = sub.as_obj() {
                    if let Obj::Subproject(sub) = wk.heap.get(id) {
                        if let Some(project) = sub.project {
                            if let Some(value) = wk.projects[project]
                                .scopes
                                .iter()
                                .rev()
                                .find_map(|s| s.vars.get(&*fallback[1]).cloned())
                            {
                                return Ok(value);
                            }
                        }
                    }
                }
            }

            if args.kw_bool("disabler", false) {
                return Ok(Value::Obj(wk.heap.alloc(Obj::Disabler)));
            }
            if required {
                return Err(LangError::new(
                    ErrorKind::Fatal(format!("dependency '{name}' not found")),
                    args.span,
                ));
            }
            warn!(name = %name, "dependency not found");
            Ok(Value::Obj(
                wk.heap.alloc(Obj::Dependency(Dependency::not_found(name))),
            ))
        },
    },
    FnDesc {
        name: "disabler",
        sig: Signature::NONE,
        imp: |wk, _, _| Ok(Value::Obj(wk.heap.alloc(Obj::Disabler))),
    },
    FnDesc {
        name: "environment",
        sig: Signature {
            required: &[],
            optional: &[param("initial", TypeSpec::Dict)],
            glob: None,
            keywords: &[],
        },
        imp: |wk, _, args| {
            let actions = match args.opt(0).and_then(|v| v.as_obj()) {
                Some(id) => match wk.heap.get(id) {
                    Obj::Dict(entries) => entries
                        .iter()
                        .filter_map(|(k, v)| {
                            v.as_str().map(|s| EnvAction::Set(k.clone(), s.clone()))
                        })
                        .collect(),
                    _ => Vec::new(),
                },
                None => Vec::new(),
            };
            Ok(Value::Obj(wk.heap.alloc(Obj::Environment(actions))))
        },
    },
    FnDesc {
        name: "error",
        sig: Signature {
            required: &[],
            optional: &[],
            glob: Some(TypeSpec::Any),
            keywords: &[],
        },
        imp: |wk, _, args| {
            let message = render_args(wk, args.glob());
            Err(LangError::new(ErrorKind::Fatal(message), args.span))
        },
    },
    FnDesc {
        name: "executable",
        sig: TARGET_SIG,
        imp: |wk, _, args| make_target(wk, TargetKind::Executable, args),
    },
    FnDesc {
        name: "files",
        sig: Signature {
            required: &[],
            optional: &[],
            glob: Some(TypeSpec::File),
            keywords: &[],
        },
        imp: |wk, _, args| Ok(wk.heap.alloc_array(args.glob().to_vec())),
    },
    FnDesc {
        name: "find_program",
        sig: Signature {
            required: &[param("name", TypeSpec::Str)],
            optional: &[],
            glob: Some(TypeSpec::Str),
            keywords: &[param("disabler", TypeSpec::Bool), REQUIRED_KW],
        },
        imp: |wk, _, args| {
            let first = args.arg(0).as_str().expect("bound as string").clone();
            let mut candidates = vec![first.clone()];
            candidates.extend(args.glob().iter().filter_map(|v| v.as_str().cloned()));

            for candidate in &candidates {
                if let Some(path) = wk.effects.find_program(candidate) {
                    info!(name = %candidate, path = %path, "program found");
                    return Ok(Value::Obj(wk.heap.alloc(Obj::ExternalProgram(
                        ExternalProgram {
                            name: candidate.clone(),
                            path: path.into(),
                            found: true,
                        },
                    ))));
                }
            }

            let (required, _) = required_flag(wk, &args, true);
            if args.kw_bool("disabler", false) {
                return Ok(Value::Obj(wk.heap.alloc(Obj::Disabler)));
            }
            if required {
                return Err(LangError::new(
                    ErrorKind::Fatal(format!("program '{first}' not found")),
                    args.span,
                ));
            }
            Ok(Value::Obj(wk.heap.alloc(Obj::ExternalProgram(
                ExternalProgram {
                    name: first,
                    path: "".into(),
                    found: false,
                },
            ))))
        },
    },
    FnDesc {
        name: "generator",
        sig: Signature {
            required: &[param("program", TypeSpec::Any)],
            optional: &[],
            glob: None,
            keywords: &[
                param("arguments", TypeSpec::ArrayOf(&TypeSpec::Str)),
                param("output", TypeSpec::ArrayOf(&TypeSpec::Str)),
            ],
        },
        imp: |wk, _, args| {
            let generator = Generator {
                program: args.arg(0).clone(),
                arguments: kw_strs(wk, &args, "arguments"),
                output: kw_strs(wk, &args, "output"),
            };
            Ok(Value::Obj(wk.heap.alloc(Obj::Generator(generator))))
        },
    },
    FnDesc {
        name: "get_compiler",
        sig: Signature {
            required: &[param("language", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[],
        },
        imp: |wk, _, args| {
            let language = args.arg(0).as_str().expect("bound as string").clone();
            detect_compiler(wk, &language, args.span)
        },
    },
    FnDesc {
        name: "get_option",
        sig: Signature {
            required: &[param("name", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[],
        },
        imp: |wk, _, args| {
            let name = args.arg(0).as_str().expect("bound as string");
            if let Some(value) = wk.cur_project().options.get(&**name) {
                return Ok(value.clone());
            }
            let builtin = match &**name {
                "bindir" => "bin",
                "buildtype" => "debug",
                "datadir" => "share",
                "default_library" => "static",
                "includedir" => "include",
                "libdir" => "lib",
                "prefix" => "/usr/local",
                _ => {
                    return Err(LangError::new(
                        ErrorKind::Fatal(format!("unknown option '{name}'")),
                        args.span,
                    ))
                }
            };
            Ok(Value::Str(builtin.into()))
        },
    },
    FnDesc {
        name: "get_variable",
        sig: Signature {
            required: &[param("name", TypeSpec::Str)],
            optional: &[param("default", TypeSpec::Any)],
            glob: None,
            keywords: &[],
        },
        imp: |wk, _, args| {
            let name = args.arg(0).as_str().expect("bound as string").clone();
            wk.record_read(&name);
            match (wk.lookup_var(&name), args.opt(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(LangError::new(
                    ErrorKind::UndefinedIdentifier(name.to_string()),
                    args.span,
                )),
            }
        },
    },
    FnDesc {
        name: "import",
        sig: Signature {
            required: &[param("name", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[REQUIRED_KW],
        },
        imp: |wk, _, args| {
            let name = args.arg(0).as_str().expect("bound as string").clone();
            let found = super::modules::SUPPORTED.contains(&&*name);
            let (required, _) = required_flag(wk, &args, true);
            if !found && required {
                return Err(LangError::new(
                    ErrorKind::Fatal(format!("module '{name}' not found")),
                    args.span,
                ));
            }
            Ok(Value::Obj(wk.heap.alloc(Obj::Module(Module { name, found }))))
        },
    },
    FnDesc {
        name: "include_directories",
        sig: Signature {
            required: &[],
            optional: &[],
            glob: Some(TypeSpec::Str),
            keywords: &[],
        },
        imp: |wk, _, args| {
            let dirs: Vec<Value> = args
                .glob()
                .iter()
                .filter_map(|v| v.as_str())
                .map(|dir| {
                    Value::Str(
                        wk.cur_dir()
                            .join(&**dir)
                            .to_string_lossy()
                            .into_owned()
                            .into(),
                    )
                })
                .collect();
            Ok(wk.heap.alloc_array(dirs))
        },
    },
    FnDesc {
        name: "install_data",
        sig: Signature {
            required: &[],
            optional: &[],
            glob: Some(TypeSpec::File),
            keywords: &[
                param("exclude_directories", TypeSpec::ArrayOf(&TypeSpec::Str)),
                param("exclude_files", TypeSpec::ArrayOf(&TypeSpec::Str)),
                param("install_dir", TypeSpec::Str),
                param("install_mode", TypeSpec::Str),
            ],
        },
        imp: |wk, _, args| {
            let dest = args.kw_str("install_dir").unwrap_or_else(|| {
                format!("share/{}", wk.cur_project().name).into()
            });
            let perm = args.kw_str("install_mode").and_then(|m| parse_mode(&m));
            let exclude_files = kw_strs(wk, &args, "exclude_files");
            let exclude_directories = kw_strs(wk, &args, "exclude_directories");
            let srcs: Vec<Rc<str>> = args
                .glob()
                .iter()
                .filter_map(|v| v.as_obj())
                .filter_map(|id| match wk.heap.get(id) {
                    Obj::File(path) => Some(path.clone()),
                    _ => None,
                })
                .collect();
            for src in srcs {
                info!(src = %src, dest = %dest, "install rule");
                wk.cur_project_mut().install_rules.push(InstallRule {
                    src,
                    dest: dest.clone(),
                    perm,
                    exclude_files: exclude_files.clone(),
                    exclude_directories: exclude_directories.clone(),
                });
            }
            Ok(Value::Null)
        },
    },
    FnDesc {
        name: "is_disabler",
        sig: Signature {
            required: &[param("value", TypeSpec::Any)],
            optional: &[],
            glob: None,
            keywords: &[],
        },
        imp: |wk, _, args| {
            let is = matches!(
                args.arg(0),
                Value::Obj(id) if matches!(wk.heap.get(*id), Obj::Disabler)
            );
            Ok(Value::Bool(is))
        },
    },
    FnDesc {
        name: "is_variable",
        sig: Signature {
            required: &[param("name", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[],
        },
        imp: |wk, _, args| {
            let name = args.arg(0).as_str().expect("bound as string");
            Ok(Value::Bool(wk.lookup_var(name).is_some()))
        },
    },
    FnDesc {
        name: "join_paths",
        sig: Signature {
            required: &[],
            optional: &[],
            glob: Some(TypeSpec::Str),
            keywords: &[],
        },
        imp: |_, _, args| {
            let joined = args
                .glob()
                .iter()
                .filter_map(|v| v.as_str())
                .fold(String::new(), |acc, piece| {
                    if acc.is_empty() {
                        piece.to_string()
                    } else {
                        path_join(&acc, piece)
                    }
                });
            Ok(Value::Str(joined.into()))
        },
    },
    FnDesc {
        name: "library",
        sig: TARGET_SIG,
        imp: |wk, _, args| {
            let kind = match wk.cur_project().options.get("default_library") {
                Some(Value::Str(s)) if &**s == "shared" => TargetKind::SharedLibrary,
                _ => TargetKind::StaticLibrary,
            };
            make_target(wk, kind, args)
        },
    },
    FnDesc {
        name: "message",
        sig: Signature {
            required: &[],
            optional: &[],
            glob: Some(TypeSpec::Any),
            keywords: &[],
        },
        imp: |wk, _, args| {
            println!("{}", render_args(wk, args.glob()));
            Ok(Value::Null)
        },
    },
    FnDesc {
        name: "project",
        sig: Signature {
            required: &[param("name", TypeSpec::Str)],
            optional: &[],
            glob: Some(TypeSpec::Str),
            keywords: &[
                param("default_options", TypeSpec::ArrayOf(&TypeSpec::Str)),
                param("license", TypeSpec::Str),
                param("version", TypeSpec::Str),
            ],
        },
        imp: |wk, _, args| {
            let name = args.arg(0).as_str().expect("bound as string").clone();
            let version = args.kw_str("version").unwrap_or_else(|| "undefined".into());
            let license = args.kw_str("license").unwrap_or_else(|| "unknown".into());
            let options = kw_strs(wk, &args, "default_options");

            for option in options {
                if let Some((key, value)) = option.split_once('=') {
                    let key: Rc<str> = key.into();
                    if wk.cur_project().options.contains_key(&key) {
                        continue;
                    }
                    // Feature-valued options become feature objects so
                    // they plug into `required:` keywords directly.
                    let value = match value {
                        "enabled" => Value::Obj(wk.heap.alloc(Obj::Feature(FeatureKind::Enabled))),
                        "disabled" => {
                            Value::Obj(wk.heap.alloc(Obj::Feature(FeatureKind::Disabled)))
                        }
                        "auto" => Value::Obj(wk.heap.alloc(Obj::Feature(FeatureKind::Auto))),
                        other => Value::Str(other.into()),
                    };
                    wk.cur_project_mut().options.insert(key, value);
                }
            }
            let project = wk.cur_project_mut();
            project.name = name.clone();
            project.version = version.clone();
            project.license = license;
            info!(name = %name, version = %version, "configuring project");
            Ok(Value::Null)
        },
    },
    FnDesc {
        name: "run_command",
        sig: Signature {
            required: &[],
            optional: &[],
            glob: Some(TypeSpec::Any),
            keywords: &[param("check", TypeSpec::Bool)],
        },
        imp: |wk, _, args| {
            let mut argv = Vec::with_capacity(args.glob().len());
            for value in args.glob() {
                let piece = match value {
                    Value::Str(s) => s.to_string(),
                    Value::Obj(id) => match wk.heap.get(*id) {
                        Obj::File(path) => path.to_string(),
                        Obj::ExternalProgram(prog) => prog.path.to_string(),
                        other => {
                            return Err(LangError::new(
                                ErrorKind::Type {
                                    expected: "string, file or external program".to_string(),
                                    got: other.kind_name().to_string(),
                                    param: "command".to_string(),
                                },
                                args.span,
                            ))
                        }
                    },
                    other => {
                        return Err(LangError::new(
                            ErrorKind::Type {
                                expected: "string, file or external program".to_string(),
                                got: other.kind_name(&wk.heap).to_string(),
                                param: "command".to_string(),
                            },
                            args.span,
                        ))
                    }
                };
                argv.push(piece);
            }
            let timeout = wk.probe_timeout;
            let out = wk.effects.run_cmd(&argv, timeout)?;
            if args.kw_bool("check", false) && !out.success() {
                return Err(LangError::new(
                    ErrorKind::Fatal(format!(
                        "command '{}' failed with status {}: {}",
                        argv.join(" "),
                        out.status,
                        out.stderr.trim()
                    )),
                    args.span,
                ));
            }
            Ok(Value::Obj(wk.heap.alloc(Obj::RunResult(
                crate::value::RunResult {
                    status: out.status,
                    stdout: out.stdout.into(),
                    stderr: out.stderr.into(),
                },
            ))))
        },
    },
    FnDesc {
        name: "set_variable",
        sig: Signature {
            required: &[param("name", TypeSpec::Str), param("value", TypeSpec::Any)],
            optional: &[],
            glob: None,
            keywords: &[],
        },
        imp: |wk, _, args| {
            let name = args.arg(0).as_str().expect("bound as string").clone();
            wk.record_assignment(&name, args.span);
            wk.assign_var(name, args.arg(1).clone());
            Ok(Value::Null)
        },
    },
    FnDesc {
        name: "shared_library",
        sig: TARGET_SIG,
        imp: |wk, _, args| make_target(wk, TargetKind::SharedLibrary, args),
    },
    FnDesc {
        name: "static_library",
        sig: TARGET_SIG,
        imp: |wk, _, args| make_target(wk, TargetKind::StaticLibrary, args),
    },
    FnDesc {
        name: "subdir",
        sig: Signature {
            required: &[param("name", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[],
        },
        imp: |wk, _, args| {
            let name = args.arg(0).as_str().expect("bound as string").clone();
            eval::eval_subdir(wk, &name, args.span)?;
            Ok(Value::Null)
        },
    },
    FnDesc {
        name: "subproject",
        sig: Signature {
            required: &[param("name", TypeSpec::Str)],
            optional: &[],
            glob: None,
            keywords: &[REQUIRED_KW],
        },
        imp: |wk, _, args| {
            let name = args.arg(0).as_str().expect("bound as string").clone();
            let (required, skip) = required_flag(wk, &args, true);
            if skip {
                return Ok(Value::Obj(wk.heap.alloc(Obj::Subproject(
                    crate::value::Subproject {
                        project: None,
                        found: false,
                    },
                ))));
            }
            eval::eval_subproject(wk, &name, required, args.span)
        },
    },
    FnDesc {
        name: "test",
        sig: Signature {
            required: &[param("name", TypeSpec::Str), param("exe", TypeSpec::Any)],
            optional: &[],
            glob: None,
            keywords: &[
                param("args", TypeSpec::ArrayOf(&TypeSpec::Any)),
                param("env", TypeSpec::Any),
                param("should_fail", TypeSpec::Bool),
            ],
        },
        imp: |wk, _, args| {
            let name = args.arg(0).as_str().expect("bound as string").clone();
            let env: Vec<(Rc<str>, Rc<str>)> = match args.kw("env").and_then(|v| v.as_obj()) {
                Some(id) => match wk.heap.get(id) {
                    Obj::Environment(actions) => actions
                        .iter()
                        .filter_map(|action| match action {
                            EnvAction::Set(k, v) => Some((k.clone(), v.clone())),
                            _ => None,
                        })
                        .collect(),
                    Obj::Dict(entries) => entries
                        .iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.clone())))
                        .collect(),
                    _ => Vec::new(),
                },
                None => Vec::new(),
            };
            let test = TestDef {
                name: name.clone(),
                exe: args.arg(1).clone(),
                args: kw_values(wk, &args, "args"),
                env,
                should_fail: args.kw_bool("should_fail", false),
            };
            info!(name = %name, "registered test");
            wk.cur_project_mut().tests.push(test);
            Ok(Value::Null)
        },
    },
    FnDesc {
        name: "warning",
        sig: Signature {
            required: &[],
            optional: &[],
            glob: Some(TypeSpec::Any),
            keywords: &[],
        },
        imp: |wk, _, args| {
            let message = render_args(wk, args.glob());
            tracing::warn!("{message}");
            wk.diag(Severity::Warning, args.span, message);
            Ok(Value::Null)
        },
    },
];
