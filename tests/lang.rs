//! End-to-end runs over real project trees in temp directories.

use std::path::Path;
use std::rc::Rc;

use indoc::indoc;

use mason::eval;
use mason::output;
use mason::serial;
use mason::value::{Compiler, Obj, TargetKind, Value};
use mason::workspace::{Project, Workspace};

fn workspace_in(dir: &Path) -> Workspace {
    let mut wk = Workspace::new(dir.to_path_buf(), dir.join("build"));
    wk.projects.push(Project::new(
        "".into(),
        dir.to_path_buf(),
        dir.join("build"),
    ));
    wk
}

#[test]
fn setup_evaluates_a_full_project() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("main.c"), "int main(void){return 0;}\n").expect("write");
    std::fs::write(dir.path().join("util.c"), "").expect("write");
    std::fs::write(dir.path().join("README"), "docs\n").expect("write");
    std::fs::write(
        dir.path().join("mason.build"),
        indoc! {"
            project('demo', 'c', version: '0.3.0', license: 'MIT')

            srcs = files('main.c', 'util.c')
            exe = executable('demo', srcs, install: true)

            install_data('README', install_dir: 'share/doc/demo')
            test('smoke', exe, args: ['--version'], should_fail: false)
        "},
    )
    .expect("write");

    let mut wk = Workspace::new(dir.path().to_path_buf(), dir.path().join("build"));
    eval::eval_project(&mut wk).expect("setup should succeed");

    let project = wk.cur_project();
    assert_eq!(&*project.name, "demo");
    assert_eq!(&*project.version, "0.3.0");
    assert_eq!(project.targets.len(), 1);
    assert_eq!(project.install_rules.len(), 1);
    assert_eq!(project.tests.len(), 1);

    let Obj::BuildTarget(target) = wk.heap.get(project.targets[0]) else {
        panic!("expected build target");
    };
    assert_eq!(&*target.name, "demo");
    assert_eq!(target.kind, TargetKind::Executable);
    assert_eq!(target.sources.len(), 2);
    assert!(target.install);
    // Sources were coerced to file objects with absolute paths.
    let Some(id) = target.sources[0].as_obj() else {
        panic!("expected file object");
    };
    let Obj::File(path) = wk.heap.get(id) else {
        panic!("expected file object");
    };
    assert!(path.ends_with("main.c"));
}

#[test]
fn handoff_state_reloads_through_serialization() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("tool.c"), "").expect("write");
    std::fs::write(
        dir.path().join("mason.build"),
        indoc! {"
            project('tools', version: '1.0')
            exe = executable('tool', 'tool.c')
            test('runs', exe)
        "},
    )
    .expect("write");

    let mut wk = Workspace::new(dir.path().to_path_buf(), dir.path().join("build"));
    std::fs::create_dir_all(dir.path().join("build")).expect("mkdir");
    eval::eval_project(&mut wk).expect("setup should succeed");
    output::write_private(&mut wk).expect("handoff should write");

    let tests_path = dir
        .path()
        .join("build")
        .join(output::PRIVATE_DIR)
        .join(output::TESTS_FILE);
    let bytes = std::fs::read(tests_path).expect("tests.dat should exist");
    let mut heap = mason::heap::Heap::new();
    let reloaded = serial::load(&mut heap, &bytes).expect("load should succeed");

    let id = reloaded.as_obj().expect("array of tests");
    let tests = heap.array(id).clone();
    assert_eq!(tests.len(), 1);
    let Obj::Dict(entries) = heap.get(tests[0].as_obj().expect("dict")) else {
        panic!("expected dict");
    };
    assert_eq!(
        heap.dict_get(entries, "name"),
        Some(Value::Str("runs".into()))
    );
}

#[test]
fn failing_compiler_probe_is_an_ordinary_false() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut wk = workspace_in(dir.path());
    // `false` launches fine and exits non-zero, the shape of a probe
    // that did not confirm the condition.
    let cc = wk.heap.alloc(Obj::Compiler(Compiler {
        cmd: "false".into(),
        language: "c".into(),
        version: "0".into(),
    }));
    wk.assign_var("cc".into(), Value::Obj(cc));

    eval::eval_source(
        &mut wk,
        "ok = cc.compiles('int main(void){return 0;}')\n",
        "probe.build".into(),
    )
    .expect("probe failure is not an error");
    assert_eq!(wk.lookup_var("ok"), Some(Value::Bool(false)));
}

#[test]
fn unlaunchable_compiler_probe_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut wk = workspace_in(dir.path());
    let cc = wk.heap.alloc(Obj::Compiler(Compiler {
        cmd: "definitely-not-a-real-compiler".into(),
        language: "c".into(),
        version: "0".into(),
    }));
    wk.assign_var("cc".into(), Value::Obj(cc));

    let err = eval::eval_source(
        &mut wk,
        "ok = cc.compiles('int main(void){return 0;}')\n",
        "probe.build".into(),
    )
    .expect_err("expected launch failure");
    assert!(matches!(
        err.kind,
        mason::error::ErrorKind::ExternalTool { .. }
    ));
}

#[test]
fn disablers_swallow_calls_and_operators() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut wk = workspace_in(dir.path());
    eval::eval_source(
        &mut wk,
        indoc! {"
            d = disabler()
            through_method = d.found()
            through_op = d + 1
            gone = is_disabler(through_method)
            kept = is_disabler(42)
        "},
        "mason.build".into(),
    )
    .expect("should run");
    assert_eq!(wk.lookup_var("gone"), Some(Value::Bool(true)));
    assert_eq!(wk.lookup_var("kept"), Some(Value::Bool(false)));
    let through_op = wk.lookup_var("through_op").expect("set");
    assert!(matches!(
        through_op,
        Value::Obj(id) if matches!(wk.heap.get(id), Obj::Disabler)
    ));
}

#[test]
fn run_command_exposes_the_result_object() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut wk = workspace_in(dir.path());
    eval::eval_source(
        &mut wk,
        indoc! {"
            r = run_command('sh', '-c', 'echo out; echo err >&2; exit 3')
            code = r.returncode()
            out = r.stdout()
            err = r.stderr()
        "},
        "mason.build".into(),
    )
    .expect("non-zero exit is not an error without check");
    assert_eq!(wk.lookup_var("code"), Some(Value::Int(3)));
    assert_eq!(wk.lookup_var("out"), Some(Value::Str("out\n".into())));
    assert_eq!(wk.lookup_var("err"), Some(Value::Str("err\n".into())));
}

#[test]
fn run_command_check_escalates_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut wk = workspace_in(dir.path());
    let err = eval::eval_source(
        &mut wk,
        "r = run_command('sh', '-c', 'exit 1', check: true)\n",
        "mason.build".into(),
    )
    .expect_err("expected failure");
    assert!(matches!(err.kind, mason::error::ErrorKind::Fatal(_)));
}

#[test]
fn string_and_container_methods() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut wk = workspace_in(dir.path());
    eval::eval_source(
        &mut wk,
        indoc! {"
            greeting = 'hello @0@, build @1@'.format('world', 7)
            upper = 'abc'.to_upper()
            slug = 'my-lib 2'.underscorify()
            parts = 'a:b:c'.split(':')
            n = parts.length()
            rejoined = '-'.join(parts)
            d = {'x': 1}
            has = d.has_key('x')
            fallback = d.get('y', 0)
            ver_ok = '1.2.3'.version_compare('>= 1.2')
        "},
        "mason.build".into(),
    )
    .expect("should run");
    assert_eq!(
        wk.lookup_var("greeting"),
        Some(Value::Str("hello world, build 7".into()))
    );
    assert_eq!(wk.lookup_var("upper"), Some(Value::Str("ABC".into())));
    assert_eq!(wk.lookup_var("slug"), Some(Value::Str("my_lib_2".into())));
    assert_eq!(wk.lookup_var("n"), Some(Value::Int(3)));
    assert_eq!(wk.lookup_var("rejoined"), Some(Value::Str("a-b-c".into())));
    assert_eq!(wk.lookup_var("has"), Some(Value::Bool(true)));
    assert_eq!(wk.lookup_var("fallback"), Some(Value::Int(0)));
    assert_eq!(wk.lookup_var("ver_ok"), Some(Value::Bool(true)));
}

#[test]
fn declared_dependencies_flow_into_targets() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("lib.c"), "").expect("write");
    std::fs::write(dir.path().join("app.c"), "").expect("write");
    std::fs::write(
        dir.path().join("mason.build"),
        indoc! {"
            project('layered', version: '1.0')
            core = static_library('core', 'lib.c')
            core_dep = declare_dependency(link_with: [core], compile_args: ['-DCORE'])
            executable('app', 'app.c', dependencies: [core_dep])
        "},
    )
    .expect("write");

    let mut wk = Workspace::new(dir.path().to_path_buf(), dir.path().join("build"));
    eval::eval_project(&mut wk).expect("setup should succeed");

    let targets = &wk.cur_project().targets;
    assert_eq!(targets.len(), 2);
    let Obj::BuildTarget(lib) = wk.heap.get(targets[0]) else {
        panic!("expected build target");
    };
    assert_eq!(&*lib.build_name, "libcore.a");
    let Obj::BuildTarget(app) = wk.heap.get(targets[1]) else {
        panic!("expected build target");
    };
    assert_eq!(app.deps.len(), 1);
    let Obj::Dependency(dep) = wk.heap.get(app.deps[0].as_obj().expect("dep")) else {
        panic!("expected dependency");
    };
    assert!(dep.found);
    assert_eq!(dep.compile_args, vec![Rc::from("-DCORE")]);
}

#[test]
fn get_variable_defaults_and_options() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut wk = workspace_in(dir.path());
    eval::eval_source(
        &mut wk,
        indoc! {"
            set_variable('answer', 41 + 1)
            a = get_variable('answer')
            b = get_variable('missing', 'fallback')
            have = is_variable('answer')
            libkind = get_option('default_library')
        "},
        "mason.build".into(),
    )
    .expect("should run");
    assert_eq!(wk.lookup_var("a"), Some(Value::Int(42)));
    assert_eq!(wk.lookup_var("b"), Some(Value::Str("fallback".into())));
    assert_eq!(wk.lookup_var("have"), Some(Value::Bool(true)));
    assert_eq!(wk.lookup_var("libkind"), Some(Value::Str("static".into())));
}
