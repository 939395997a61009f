//! Backend handoff: the subset of the evaluated state that later
//! collaborators need. Targets, install rules and test definitions are
//! persisted under `<build>/.mason-private/` so the install and test
//! runners can reload them without re-running the interpreter.

use std::path::PathBuf;

use tracing::info;

use crate::error::LangResult;
use crate::serial;
use crate::value::{ObjId, Value};
use crate::workspace::{InstallRule, TestDef, Workspace};

pub const PRIVATE_DIR: &str = ".mason-private";
pub const TARGETS_FILE: &str = "targets.dat";
pub const INSTALL_FILE: &str = "install.dat";
pub const TESTS_FILE: &str = "tests.dat";

/// Everything the backend consumes, in declaration order across the
/// root project and its subprojects.
pub struct BuildGraph {
    pub targets: Vec<ObjId>,
    pub install: Vec<InstallRule>,
    pub tests: Vec<TestDef>,
}

pub fn collect(wk: &Workspace) -> BuildGraph {
    let mut graph = BuildGraph {
        targets: Vec::new(),
        install: Vec::new(),
        tests: Vec::new(),
    };
    for project in &wk.projects {
        graph.targets.extend(project.targets.iter().copied());
        graph.install.extend(project.install_rules.iter().cloned());
        graph.tests.extend(project.tests.iter().cloned());
    }
    graph
}

fn install_rule_value(wk: &mut Workspace, rule: &InstallRule) -> Value {
    let exclude_files = wk.heap.alloc_array(
        rule.exclude_files
            .iter()
            .map(|f| Value::Str(f.clone()))
            .collect(),
    );
    let exclude_directories = wk.heap.alloc_array(
        rule.exclude_directories
            .iter()
            .map(|d| Value::Str(d.clone()))
            .collect(),
    );
    wk.heap.alloc_dict(vec![
        ("src".into(), Value::Str(rule.src.clone())),
        ("dest".into(), Value::Str(rule.dest.clone())),
        (
            "perm".into(),
            rule.perm.map(|p| Value::Int(p as i64)).unwrap_or(Value::Null),
        ),
        ("exclude_files".into(), exclude_files),
        ("exclude_directories".into(), exclude_directories),
    ])
}

fn test_value(wk: &mut Workspace, test: &TestDef) -> Value {
    let args = wk.heap.alloc_array(test.args.clone());
    let env = wk.heap.alloc_dict(
        test.env
            .iter()
            .map(|(k, v)| (k.clone(), Value::Str(v.clone())))
            .collect(),
    );
    wk.heap.alloc_dict(vec![
        ("name".into(), Value::Str(test.name.clone())),
        ("exe".into(), test.exe.clone()),
        ("args".into(), args),
        ("env".into(), env),
        ("should_fail".into(), Value::Bool(test.should_fail)),
    ])
}

fn private_dir(wk: &Workspace) -> PathBuf {
    wk.build_root.join(PRIVATE_DIR)
}

/// Serializes the handoff state. Everything goes through the effects
/// boundary, so an analyze run writes nothing.
pub fn write_private(wk: &mut Workspace) -> LangResult<()> {
    let graph = collect(wk);
    let dir = private_dir(wk);
    wk.effects.mkdir_all(&dir)?;

    let targets: Vec<Value> = graph.targets.iter().map(|&id| Value::Obj(id)).collect();
    let targets = wk.heap.alloc_array(targets);
    let bytes = serial::dump(&wk.heap, &targets);
    wk.effects.write_file(&dir.join(TARGETS_FILE), &bytes)?;

    let rules: Vec<Value> = graph
        .install
        .iter()
        .map(|rule| install_rule_value(wk, rule))
        .collect();
    let rules = wk.heap.alloc_array(rules);
    let bytes = serial::dump(&wk.heap, &rules);
    wk.effects.write_file(&dir.join(INSTALL_FILE), &bytes)?;

    let tests: Vec<Value> = graph.tests.iter().map(|test| test_value(wk, test)).collect();
    let tests = wk.heap.alloc_array(tests);
    let bytes = serial::dump(&wk.heap, &tests);
    wk.effects.write_file(&dir.join(TESTS_FILE), &bytes)?;

    info!(
        targets = graph.targets.len(),
        install = graph.install.len(),
        tests = graph.tests.len(),
        "wrote backend handoff"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{BuildTarget, Obj, TargetKind};
    use crate::workspace::Project;
    use std::path::PathBuf;

    #[test]
    fn collects_across_projects_in_order() {
        let mut wk = Workspace::new(PathBuf::from("/src"), PathBuf::from("/build"));
        wk.projects.push(Project::new(
            "root".into(),
            PathBuf::from("/src"),
            PathBuf::from("/build"),
        ));
        wk.projects.push(Project::new(
            "sub".into(),
            PathBuf::from("/src/subprojects/sub"),
            PathBuf::from("/build/subprojects/sub"),
        ));
        let first = wk.heap.alloc(Obj::BuildTarget(BuildTarget {
            name: "app".into(),
            build_name: "app".into(),
            kind: TargetKind::Executable,
            sources: Vec::new(),
            include_directories: Vec::new(),
            deps: Vec::new(),
            compile_args: Vec::new(),
            link_args: Vec::new(),
            install: false,
        }));
        let second = wk.heap.alloc(Obj::BuildTarget(BuildTarget {
            name: "sublib".into(),
            build_name: "libsublib.a".into(),
            kind: TargetKind::StaticLibrary,
            sources: Vec::new(),
            include_directories: Vec::new(),
            deps: Vec::new(),
            compile_args: Vec::new(),
            link_args: Vec::new(),
            install: false,
        }));
        wk.projects[0].targets.push(first);
        wk.projects[1].targets.push(second);

        let graph = collect(&wk);
        assert_eq!(graph.targets, vec![first, second]);
    }
}
