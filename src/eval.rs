use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, info};

use crate::bytecode::compile;
use crate::error::{ErrorKind, LangError, LangResult};
use crate::parser::parse;
use crate::token::Span;
use crate::value::{Obj, Subproject, Value};
use crate::vm::execute;
use crate::workspace::{Project, Workspace, MAX_EVAL_DEPTH};

pub const BUILD_FILE: &str = "mason.build";

/// Runs one source string through the whole pipeline. Errors are
/// tagged with `file` so they render with a usable location.
pub fn eval_source(wk: &mut Workspace, source: &str, file: Rc<str>) -> LangResult<Value> {
    let prev_file = std::mem::replace(&mut wk.cur_file, file.clone());
    let result = (|| {
        let program = parse(source)?;
        let chunk = compile(&program)?;
        execute(wk, &chunk)
    })()
    .map_err(|err| err.with_file(file));
    wk.cur_file = prev_file;
    result
}

/// Evaluates one build file from disk. Source reads are deliberately
/// not behind the effects boundary; the analyzer reads real files too.
pub fn eval_file(wk: &mut Workspace, path: &Path) -> LangResult<Value> {
    debug!(path = %path.display(), "evaluating");
    let source = std::fs::read_to_string(path)
        .map_err(|err| LangError::bare(ErrorKind::Io(format!("reading {path:?}: {err}"))))?;
    wk.sources.push(path.to_path_buf());
    eval_source(wk, &source, path.to_string_lossy().into_owned().into())
}

/// One nesting step deeper; converts runaway inclusion into a typed
/// error instead of a stack overflow.
fn enter(wk: &mut Workspace, span: Span) -> LangResult<()> {
    if wk.depth >= MAX_EVAL_DEPTH {
        return Err(LangError::new(ErrorKind::RecursionLimit(MAX_EVAL_DEPTH), span));
    }
    wk.depth += 1;
    Ok(())
}

/// Evaluates the project rooted at the workspace's source root,
/// creating the root project as a side effect.
pub fn eval_project(wk: &mut Workspace) -> LangResult<()> {
    let cwd = wk.source_root.clone();
    let build_dir = wk.build_root.clone();
    wk.projects.push(Project::new("".into(), cwd.clone(), build_dir));
    wk.cur_project = wk.projects.len() - 1;
    eval_file(wk, &cwd.join(BUILD_FILE))?;
    Ok(())
}

/// `subdir()`: same project, same scope chain, different directory.
/// Assignments made in the subdirectory stay visible to the parent.
pub fn eval_subdir(wk: &mut Workspace, name: &str, span: Span) -> LangResult<()> {
    enter(wk, span)?;
    let prev_cwd = wk.cur_project().cwd.clone();
    let next = prev_cwd.join(name);
    wk.cur_project_mut().cwd = next.clone();
    let result = eval_file(wk, &next.join(BUILD_FILE));
    wk.cur_project_mut().cwd = prev_cwd;
    wk.depth -= 1;
    result.map(|_| ())
}

/// `subproject()`: a fresh project with a fresh scope chain, which is
/// what isolates its variables. Evaluated once per run; later calls
/// reuse the cached evaluation.
pub fn eval_subproject(
    wk: &mut Workspace,
    name: &str,
    required: bool,
    span: Span,
) -> LangResult<Value> {
    if let Some(&project) = wk.subprojects.get(name) {
        return Ok(Value::Obj(wk.heap.alloc(Obj::Subproject(Subproject {
            project: Some(project),
            found: true,
        }))));
    }

    let dir: PathBuf = wk
        .source_root
        .join(&*wk.subproject_dir)
        .join(name);
    if !dir.join(BUILD_FILE).is_file() {
        if required {
            return Err(LangError::new(
                ErrorKind::Fatal(format!("subproject '{name}' not found")),
                span,
            ));
        }
        return Ok(Value::Obj(wk.heap.alloc(Obj::Subproject(Subproject {
            project: None,
            found: false,
        }))));
    }

    enter(wk, span)?;
    info!(name, "entering subproject");
    let build_dir = wk
        .build_root
        .join(&*wk.subproject_dir)
        .join(name);
    wk.projects
        .push(Project::new(name.into(), dir.clone(), build_dir));
    let project = wk.projects.len() - 1;
    let prev_project = std::mem::replace(&mut wk.cur_project, project);

    let result = eval_file(wk, &dir.join(BUILD_FILE));

    wk.cur_project = prev_project;
    wk.depth -= 1;
    result?;

    wk.subprojects.insert(name.into(), project);
    Ok(Value::Obj(wk.heap.alloc(Obj::Subproject(Subproject {
        project: Some(project),
        found: true,
    }))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::Workspace;

    fn workspace_in(dir: &Path) -> Workspace {
        let mut wk = Workspace::new(dir.to_path_buf(), dir.join("build"));
        wk.projects.push(Project::new(
            "test".into(),
            dir.to_path_buf(),
            dir.join("build"),
        ));
        wk
    }

    #[test]
    fn subdir_shares_the_scope_chain() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
        std::fs::write(dir.path().join("sub").join(BUILD_FILE), "from_sub = 42\n")
            .expect("write");
        let mut wk = workspace_in(dir.path());
        eval_source(&mut wk, "subdir('sub')\n", "mason.build".into()).expect("should run");
        assert_eq!(wk.lookup_var("from_sub"), Some(Value::Int(42)));
    }

    #[test]
    fn subproject_variables_stay_isolated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sub = dir.path().join("subprojects").join("inner");
        std::fs::create_dir_all(&sub).expect("mkdir");
        std::fs::write(
            sub.join(BUILD_FILE),
            "project('inner', version: '1.0')\nsecret = 'hidden'\n",
        )
        .expect("write");
        let mut wk = workspace_in(dir.path());
        let result = eval_source(
            &mut wk,
            "sp = subproject('inner')\nv = sp.get_variable('secret')\n",
            "mason.build".into(),
        );
        result.expect("should run");
        // Readable through the handle, invisible in the parent scope.
        assert_eq!(wk.lookup_var("v"), Some(Value::Str("hidden".into())));
        assert_eq!(wk.lookup_var("secret"), None);
    }

    #[test]
    fn missing_optional_subproject_does_not_see_parent_variables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut wk = workspace_in(dir.path());
        eval_source(
            &mut wk,
            "secret = 'root-only'\n\
             sp = subproject('nope', required: false)\n\
             v = sp.get_variable('secret', 'fallback')\n\
             f = sp.found()\n",
            "mason.build".into(),
        )
        .expect("should run");
        // The parent's `secret` must not leak through the handle.
        assert_eq!(wk.lookup_var("v"), Some(Value::Str("fallback".into())));
        assert_eq!(wk.lookup_var("f"), Some(Value::Bool(false)));
    }

    #[test]
    fn missing_subproject_is_fatal_when_required() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut wk = workspace_in(dir.path());
        let err = eval_source(&mut wk, "subproject('nope')\n", "mason.build".into())
            .expect_err("expected failure");
        assert!(matches!(err.kind, ErrorKind::Fatal(_)));
    }

    #[test]
    fn recursion_limit_stops_self_inclusion() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A build file that includes its own directory forever.
        std::fs::create_dir(dir.path().join("loop")).expect("mkdir");
        std::fs::write(
            dir.path().join("loop").join(BUILD_FILE),
            "subdir('..' / 'loop')\n",
        )
        .expect("write");
        let mut wk = workspace_in(dir.path());
        let err = eval_source(&mut wk, "subdir('loop')\n", "mason.build".into())
            .expect_err("expected failure");
        assert_eq!(err.kind, ErrorKind::RecursionLimit(MAX_EVAL_DEPTH));
    }
}
