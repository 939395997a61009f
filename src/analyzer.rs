//! Dry execution: the same pipeline as a normal run, with the effects
//! boundary swapped for placeholders and every error captured into the
//! diagnostic registry instead of unwinding the run.

use std::path::Path;

use crate::bytecode;
use crate::error::{ErrorKind, LangError, LangResult};
use crate::eval::BUILD_FILE;
use crate::lexer::tokenize;
use crate::parser::Parser;
use crate::vm;
use crate::workspace::{EvalMode, Project, Severity, Workspace};
use crate::ast::{Stmt, StmtKind};
use crate::effects::DryEffects;

#[derive(Debug, Default)]
pub struct AnalyzeOpts {
    /// Print every file evaluated.
    pub trace: bool,
    /// Report the final value and assignment site of one variable.
    pub value: Option<String>,
    /// Escalate warnings into a non-zero exit.
    pub werror: bool,
}

/// Analyzes the project rooted at `source_root` and prints the
/// collected diagnostics. Returns the process exit code.
pub fn run(source_root: &Path, opts: &AnalyzeOpts) -> LangResult<i32> {
    let build_root = source_root.join("build");
    let mut wk = Workspace::with_effects(
        source_root.to_path_buf(),
        build_root.clone(),
        Box::new(DryEffects),
        EvalMode::Analyze,
    );
    wk.projects.push(Project::new(
        "".into(),
        source_root.to_path_buf(),
        build_root,
    ));

    let path = source_root.join(BUILD_FILE);
    analyze_file(&mut wk, &path)?;
    report_unused(&mut wk);

    if opts.trace {
        for source in &wk.sources {
            println!("{}", source.display());
        }
    }
    if let Some(name) = &opts.value {
        report_value(&wk, name);
    }

    let mut warnings = 0usize;
    for diag in wk.sorted_diagnostics() {
        if diag.severity == Severity::Warning {
            warnings += 1;
        }
        eprintln!("{diag}");
    }
    let errors = wk.error_count();
    Ok(if errors > 0 || (opts.werror && warnings > 0) {
        1
    } else {
        0
    })
}

/// One file: resynchronizing parse, then statement-at-a-time
/// execution so one failing statement does not hide the rest.
pub fn analyze_file(wk: &mut Workspace, path: &Path) -> LangResult<()> {
    let source = std::fs::read_to_string(path)
        .map_err(|err| LangError::bare(ErrorKind::Io(format!("reading {path:?}: {err}"))))?;
    wk.sources.push(path.to_path_buf());
    let file: std::rc::Rc<str> = path.to_string_lossy().into_owned().into();
    let prev_file = std::mem::replace(&mut wk.cur_file, file.clone());

    match tokenize(&source) {
        Ok(tokens) => {
            let mut parse_errors = Vec::new();
            let program = Parser::new(tokens).parse_program_resync(&mut parse_errors);
            for err in parse_errors {
                wk.diag_error(&err.with_file(file.clone()));
            }
            dead_code(wk, &program.statements);
            for stmt in &program.statements {
                run_statement(wk, stmt, &file);
            }
        }
        // A lex error aborts this file, not the whole batch.
        Err(err) => wk.diag_error(&err.with_file(file.clone())),
    }

    wk.cur_file = prev_file;
    Ok(())
}

fn run_statement(wk: &mut Workspace, stmt: &Stmt, file: &std::rc::Rc<str>) {
    let chunk = match bytecode::compile_statement(stmt) {
        Ok(chunk) => chunk,
        Err(err) => {
            wk.diag_error(&err.with_file(file.clone()));
            return;
        }
    };
    if let Err(err) = vm::execute(wk, &chunk) {
        wk.diag_error(&err.with_file(file.clone()));
    }
}

/// Statements following an unconditional `break`/`continue` in the
/// same block can never run. One report per block.
fn dead_code(wk: &mut Workspace, statements: &[Stmt]) {
    let mut terminated = false;
    for stmt in statements {
        if terminated {
            wk.diag(
                Severity::Warning,
                stmt.span,
                "unreachable statement".to_string(),
            );
            return;
        }
        match &stmt.kind {
            StmtKind::Break | StmtKind::Continue => terminated = true,
            StmtKind::If {
                branches,
                else_body,
            } => {
                for (_, body) in branches {
                    dead_code(wk, body);
                }
                dead_code(wk, else_body);
            }
            StmtKind::Foreach { body, .. } => dead_code(wk, body),
            _ => {}
        }
    }
}

fn report_unused(wk: &mut Workspace) {
    for (name, site) in wk.unused_variables() {
        wk.diagnostics.push(crate::workspace::Diagnostic {
            severity: Severity::Warning,
            message: format!("unused variable '{name}'"),
            file: site.file.clone(),
            line: site.span.line,
            column: site.span.column,
        });
    }
}

fn report_value(wk: &Workspace, name: &str) {
    match wk.lookup_var(name) {
        Some(value) => {
            println!("{name} = {}", value.display(&wk.heap));
            if let Some(site) = wk.assignments.get(name) {
                println!(
                    "assigned at {}:{}:{}",
                    site.file, site.span.line, site.span.column
                );
            }
        }
        None => println!("{name} is not defined"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use indoc::indoc;

    fn analyze_source(source: &str) -> Workspace {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(BUILD_FILE), source).expect("write");
        let mut wk = Workspace::with_effects(
            dir.path().to_path_buf(),
            dir.path().join("build"),
            Box::new(DryEffects),
            EvalMode::Analyze,
        );
        wk.projects.push(Project::new(
            "".into(),
            dir.path().to_path_buf(),
            dir.path().join("build"),
        ));
        analyze_file(&mut wk, &dir.path().join(BUILD_FILE)).expect("analyze should run");
        report_unused(&mut wk);
        wk
    }

    #[test]
    fn reports_errors_from_independent_bad_statements() {
        let wk = analyze_source(indoc! {"
            x = = 1
            y = 2
            z = ) 3
        "});
        assert_eq!(wk.error_count(), 2);
        // The good statement in between still executed.
        assert_eq!(wk.lookup_var("y"), Some(Value::Int(2)));
    }

    #[test]
    fn continues_past_runtime_faults() {
        let wk = analyze_source(indoc! {"
            a = missing_name
            b = 1
        "});
        assert_eq!(wk.error_count(), 1);
        assert_eq!(wk.lookup_var("b"), Some(Value::Int(1)));
    }

    #[test]
    fn reports_unused_variables() {
        let wk = analyze_source(indoc! {"
            used = 1
            unused = 2
            _scratch = 3
            sink = used
        "});
        let unused: Vec<_> = wk
            .diagnostics
            .iter()
            .filter(|d| d.message.contains("unused variable"))
            .collect();
        assert_eq!(unused.len(), 2);
        assert!(unused.iter().any(|d| d.message.contains("'unused'")));
        // `sink` is assigned but never read; `_scratch` opts out.
        assert!(unused.iter().any(|d| d.message.contains("'sink'")));
    }

    #[test]
    fn reports_dead_code_after_break() {
        let wk = analyze_source(indoc! {"
            foreach i : [1, 2]
              break
              x = 1
            endforeach
        "});
        assert!(wk
            .diagnostics
            .iter()
            .any(|d| d.message == "unreachable statement"));
    }

    #[test]
    fn version_constrained_dependencies_stay_found_in_dry_runs() {
        let wk = analyze_source(indoc! {"
            dep = dependency('zlib', version: '>= 1.0')
            ok = dep.found()
        "});
        assert_eq!(wk.error_count(), 0);
        assert_eq!(wk.lookup_var("ok"), Some(Value::Bool(true)));
    }

    #[test]
    fn dry_probes_report_success() {
        let wk = analyze_source(indoc! {"
            prog = find_program('definitely-not-on-path')
            ok = prog.found()
        "});
        assert_eq!(wk.error_count(), 0);
        assert_eq!(wk.lookup_var("ok"), Some(Value::Bool(true)));
    }
}
