use std::path::Path;
use std::rc::Rc;

use crate::error::{ErrorKind, LangError, LangResult};
use crate::token::Span;
use crate::value::{Obj, Value};
use crate::workspace::Workspace;

/// Evaluated arguments of one call site, still untyped.
#[derive(Debug, Clone)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Vec<(Rc<str>, Value)>,
    pub span: Span,
}

impl Args {
    pub fn any_disabler(&self, wk: &Workspace) -> Option<Value> {
        self.positional
            .iter()
            .chain(self.keywords.iter().map(|(_, v)| v))
            .find(|v| matches!(v, Value::Obj(id) if matches!(wk.heap.get(*id), Obj::Disabler)))
            .cloned()
    }
}

/// Type constraint on one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSpec {
    Any,
    Bool,
    Int,
    Str,
    Array,
    Dict,
    /// A file object; a plain string is coerced (§ binding step e).
    File,
    Compiler,
    Dependency,
    BuildTarget,
    ExternalProgram,
    Environment,
    ConfigData,
    Feature,
    /// One level of nested arrays is flattened before element checks;
    /// a bare element is accepted as a one-element array.
    ArrayOf(&'static TypeSpec),
}

impl TypeSpec {
    pub fn describe(self) -> String {
        match self {
            TypeSpec::Any => "any value".to_string(),
            TypeSpec::Bool => "bool".to_string(),
            TypeSpec::Int => "int".to_string(),
            TypeSpec::Str => "string".to_string(),
            TypeSpec::Array => "array".to_string(),
            TypeSpec::Dict => "dict".to_string(),
            TypeSpec::File => "file or string".to_string(),
            TypeSpec::Compiler => "compiler".to_string(),
            TypeSpec::Dependency => "dependency".to_string(),
            TypeSpec::BuildTarget => "build target".to_string(),
            TypeSpec::ExternalProgram => "external program".to_string(),
            TypeSpec::Environment => "environment".to_string(),
            TypeSpec::ConfigData => "configuration data".to_string(),
            TypeSpec::Feature => "feature option".to_string(),
            TypeSpec::ArrayOf(elem) => format!("array of {}", elem.describe()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub spec: TypeSpec,
}

pub const fn param(name: &'static str, spec: TypeSpec) -> Param {
    Param { name, spec }
}

/// Function Signature Descriptor: the declared shape of one native.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub required: &'static [Param],
    pub optional: &'static [Param],
    /// Element constraint for trailing variadic positionals, when the
    /// native accepts them.
    pub glob: Option<TypeSpec>,
    pub keywords: &'static [Param],
}

impl Signature {
    pub const NONE: Signature = Signature {
        required: &[],
        optional: &[],
        glob: None,
        keywords: &[],
    };
}

/// Arguments after binding against a signature: positionals in
/// declaration order, the glob tail, and keyword values by name.
#[derive(Debug)]
pub struct Bound {
    pos: Vec<Option<Value>>,
    glob: Vec<Value>,
    keywords: Vec<(&'static str, Value)>,
    pub span: Span,
}

impl Bound {
    /// Required positional; always present after a successful bind.
    pub fn arg(&self, idx: usize) -> &Value {
        self.pos[idx].as_ref().expect("required argument was bound")
    }

    pub fn opt(&self, idx: usize) -> Option<&Value> {
        self.pos.get(idx).and_then(|slot| slot.as_ref())
    }

    pub fn glob(&self) -> &[Value] {
        &self.glob
    }

    pub fn kw(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    pub fn kw_str(&self, name: &str) -> Option<Rc<str>> {
        self.kw(name).and_then(|v| v.as_str().cloned())
    }

    pub fn kw_bool(&self, name: &str, default: bool) -> bool {
        self.kw(name).and_then(|v| v.as_bool()).unwrap_or(default)
    }
}

/// Binds call-site arguments against a descriptor, in order: required
/// positionals, optional positionals, the glob tail, then keywords.
/// Typechecking and coercion happen as each slot is bound.
pub fn bind(wk: &mut Workspace, sig: &Signature, args: Args) -> LangResult<Bound> {
    let Args {
        positional,
        keywords,
        span,
    } = args;

    let min = sig.required.len();
    let max = min + sig.optional.len();
    if positional.len() < min {
        return Err(LangError::new(
            ErrorKind::Arity {
                expected: min,
                got: positional.len(),
            },
            span,
        ));
    }
    if positional.len() > max && sig.glob.is_none() {
        return Err(LangError::new(
            ErrorKind::TooManyArgs {
                expected: max,
                got: positional.len(),
            },
            span,
        ));
    }

    let mut pos: Vec<Option<Value>> = Vec::with_capacity(max);
    let mut supplied = positional.into_iter();
    for decl in sig.required.iter().chain(sig.optional) {
        match supplied.next() {
            Some(value) => {
                pos.push(Some(typecheck(wk, value, decl.spec, decl.name, span)?));
            }
            None => pos.push(None),
        }
    }
    // Variadic tails flatten one level of nesting, like array-of
    // constraints, so an array variable can stand in for spread args.
    let mut glob = Vec::new();
    if let Some(elem) = sig.glob {
        for value in supplied {
            let items = match &value {
                Value::Obj(id) => match wk.heap.get(*id) {
                    Obj::Array(values) => values.clone(),
                    _ => vec![value],
                },
                _ => vec![value],
            };
            for item in items {
                glob.push(typecheck(wk, item, elem, "<variadic>", span)?);
            }
        }
    }

    let mut bound_kw: Vec<(&'static str, Value)> = Vec::with_capacity(keywords.len());
    for (name, value) in keywords {
        let decl = sig
            .keywords
            .iter()
            .find(|decl| decl.name == &*name)
            .ok_or_else(|| LangError::new(ErrorKind::UnknownKeyword(name.to_string()), span))?;
        if bound_kw.iter().any(|(k, _)| *k == decl.name) {
            return Err(LangError::new(
                ErrorKind::DuplicateKeyword(name.to_string()),
                span,
            ));
        }
        let value = typecheck(wk, value, decl.spec, decl.name, span)?;
        bound_kw.push((decl.name, value));
    }

    Ok(Bound {
        pos,
        glob,
        keywords: bound_kw,
        span,
    })
}

/// Checks one value against one constraint, applying the declared
/// coercions. Returns the (possibly replaced) value to bind.
pub fn typecheck(
    wk: &mut Workspace,
    value: Value,
    spec: TypeSpec,
    name: &str,
    span: Span,
) -> LangResult<Value> {
    let mismatch = |wk: &Workspace, value: &Value| {
        LangError::new(
            ErrorKind::Type {
                expected: spec.describe(),
                got: value.kind_name(&wk.heap).to_string(),
                param: name.to_string(),
            },
            span,
        )
    };

    let ok = match (&spec, &value) {
        (TypeSpec::Any, _) => true,
        (TypeSpec::Bool, Value::Bool(_)) => true,
        (TypeSpec::Int, Value::Int(_)) => true,
        (TypeSpec::Str, Value::Str(_)) => true,
        (TypeSpec::File, Value::Str(path)) => {
            return coerce_file(wk, path.clone(), name, span);
        }
        (_, Value::Obj(id)) => {
            let obj = wk.heap.get(*id);
            matches!(
                (&spec, obj),
                (TypeSpec::Array, Obj::Array(_))
                    | (TypeSpec::Dict, Obj::Dict(_))
                    | (TypeSpec::File, Obj::File(_))
                    | (TypeSpec::Compiler, Obj::Compiler(_))
                    | (TypeSpec::Dependency, Obj::Dependency(_))
                    | (TypeSpec::BuildTarget, Obj::BuildTarget(_))
                    | (TypeSpec::ExternalProgram, Obj::ExternalProgram(_))
                    | (TypeSpec::Environment, Obj::Environment(_))
                    | (TypeSpec::ConfigData, Obj::ConfigData(_))
                    | (TypeSpec::Feature, Obj::Feature(_))
            )
        }
        _ => false,
    };

    if let TypeSpec::ArrayOf(elem) = spec {
        return coerce_array_of(wk, value, *elem, name, span);
    }
    if ok {
        Ok(value)
    } else {
        Err(mismatch(wk, &value))
    }
}

/// Step (d): flatten exactly one level of nesting, then check every
/// element. A bare element binds as a one-element array.
fn coerce_array_of(
    wk: &mut Workspace,
    value: Value,
    elem: TypeSpec,
    name: &str,
    span: Span,
) -> LangResult<Value> {
    let raw: Vec<Value> = match &value {
        Value::Obj(id) => match wk.heap.get(*id) {
            Obj::Array(values) => {
                let mut flat = Vec::with_capacity(values.len());
                for item in values.clone() {
                    match &item {
                        Value::Obj(inner) => match wk.heap.get(*inner) {
                            Obj::Array(nested) => flat.extend(nested.clone()),
                            _ => flat.push(item),
                        },
                        _ => flat.push(item),
                    }
                }
                flat
            }
            _ => vec![value],
        },
        _ => vec![value],
    };

    let mut checked = Vec::with_capacity(raw.len());
    for item in raw {
        checked.push(typecheck(wk, item, elem, name, span)?);
    }
    Ok(wk.heap.alloc_array(checked))
}

/// Step (e): a plain string is coercible to a file object on demand.
/// Relative paths resolve against the current project directory; the
/// path must exist (the dry effects always say yes).
pub fn coerce_file(wk: &mut Workspace, path: Rc<str>, name: &str, span: Span) -> LangResult<Value> {
    let resolved = if Path::new(&*path).is_absolute() {
        path.to_string()
    } else {
        wk.cur_dir().join(&*path).to_string_lossy().into_owned()
    };
    if !wk.effects.file_exists(Path::new(&resolved)) {
        return Err(LangError::new(
            ErrorKind::Type {
                expected: "existing file".to_string(),
                got: format!("missing path '{path}'"),
                param: name.to_string(),
            },
            span,
        ));
    }
    Ok(Value::Obj(wk.heap.alloc(Obj::File(resolved.into()))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::DryEffects;
    use crate::workspace::{EvalMode, Project};
    use std::path::PathBuf;

    fn workspace() -> Workspace {
        let mut wk = Workspace::with_effects(
            PathBuf::from("/src"),
            PathBuf::from("/build"),
            Box::new(DryEffects),
            EvalMode::Normal,
        );
        wk.projects.push(Project::new(
            "test".into(),
            PathBuf::from("/src"),
            PathBuf::from("/build"),
        ));
        wk
    }

    fn args(positional: Vec<Value>, keywords: Vec<(Rc<str>, Value)>) -> Args {
        Args {
            positional,
            keywords,
            span: Span::default(),
        }
    }

    const SIG: Signature = Signature {
        required: &[param("name", TypeSpec::Str)],
        optional: &[param("count", TypeSpec::Int)],
        glob: None,
        keywords: &[param("install", TypeSpec::Bool)],
    };

    #[test]
    fn binds_required_optional_and_keywords() {
        let mut wk = workspace();
        let bound = bind(
            &mut wk,
            &SIG,
            args(
                vec![Value::Str("x".into()), Value::Int(2)],
                vec![("install".into(), Value::Bool(true))],
            ),
        )
        .expect("bind should succeed");
        assert_eq!(bound.arg(0), &Value::Str("x".into()));
        assert_eq!(bound.opt(1), Some(&Value::Int(2)));
        assert!(bound.kw_bool("install", false));
    }

    #[test]
    fn missing_required_is_an_arity_error() {
        let mut wk = workspace();
        let err = bind(&mut wk, &SIG, args(vec![], vec![])).expect_err("expected failure");
        assert_eq!(err.kind, ErrorKind::Arity { expected: 1, got: 0 });
    }

    #[test]
    fn excess_positionals_without_glob() {
        let mut wk = workspace();
        let err = bind(
            &mut wk,
            &SIG,
            args(
                vec![Value::Str("x".into()), Value::Int(1), Value::Int(2)],
                vec![],
            ),
        )
        .expect_err("expected failure");
        assert_eq!(err.kind, ErrorKind::TooManyArgs { expected: 2, got: 3 });
    }

    #[test]
    fn unknown_and_duplicate_keywords() {
        let mut wk = workspace();
        let err = bind(
            &mut wk,
            &SIG,
            args(
                vec![Value::Str("x".into())],
                vec![("nope".into(), Value::Bool(true))],
            ),
        )
        .expect_err("expected failure");
        assert_eq!(err.kind, ErrorKind::UnknownKeyword("nope".to_string()));

        let err = bind(
            &mut wk,
            &SIG,
            args(
                vec![Value::Str("x".into())],
                vec![
                    ("install".into(), Value::Bool(true)),
                    ("install".into(), Value::Bool(false)),
                ],
            ),
        )
        .expect_err("expected failure");
        assert_eq!(err.kind, ErrorKind::DuplicateKeyword("install".to_string()));
    }

    #[test]
    fn type_mismatch_names_the_parameter() {
        let mut wk = workspace();
        let err = bind(&mut wk, &SIG, args(vec![Value::Int(1)], vec![]))
            .expect_err("expected failure");
        assert_eq!(
            err.kind,
            ErrorKind::Type {
                expected: "string".to_string(),
                got: "int".to_string(),
                param: "name".to_string(),
            }
        );
    }

    #[test]
    fn array_of_flattens_one_level_and_wraps_scalars() {
        let mut wk = workspace();
        let inner = wk.heap.alloc_array(vec![Value::Int(2), Value::Int(3)]);
        let outer = wk.heap.alloc_array(vec![Value::Int(1), inner]);
        let checked = typecheck(
            &mut wk,
            outer,
            TypeSpec::ArrayOf(&TypeSpec::Int),
            "values",
            Span::default(),
        )
        .expect("typecheck should succeed");
        let id = checked.as_obj().expect("array");
        assert_eq!(
            wk.heap.array(id),
            &vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );

        let wrapped = typecheck(
            &mut wk,
            Value::Int(7),
            TypeSpec::ArrayOf(&TypeSpec::Int),
            "values",
            Span::default(),
        )
        .expect("typecheck should succeed");
        let id = wrapped.as_obj().expect("array");
        assert_eq!(wk.heap.array(id), &vec![Value::Int(7)]);
    }

    #[test]
    fn strings_coerce_to_files() {
        let mut wk = workspace();
        let coerced = typecheck(
            &mut wk,
            Value::Str("main.c".into()),
            TypeSpec::File,
            "sources",
            Span::default(),
        )
        .expect("typecheck should succeed");
        let id = coerced.as_obj().expect("file object");
        let Obj::File(path) = wk.heap.get(id) else {
            panic!("expected file object");
        };
        assert_eq!(&**path, "/src/main.c");
    }
}
