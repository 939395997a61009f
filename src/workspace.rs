use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::effects::{Effects, RealEffects};
use crate::error::{ErrorKind, LangError, LangResult};
use crate::heap::Heap;
use crate::run_cmd::DEFAULT_TIMEOUT;
use crate::token::Span;
use crate::value::{ObjId, Value};

pub const MAX_EVAL_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: Rc<str>,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file, self.line, self.column, severity, self.message
        )
    }
}

/// One lexical environment: a name-to-value mapping.
#[derive(Debug, Default)]
pub struct Scope {
    pub vars: FxHashMap<Rc<str>, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstallRule {
    pub src: Rc<str>,
    pub dest: Rc<str>,
    pub perm: Option<u32>,
    pub exclude_files: Vec<Rc<str>>,
    pub exclude_directories: Vec<Rc<str>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestDef {
    pub name: Rc<str>,
    pub exe: Value,
    pub args: Vec<Value>,
    pub env: Vec<(Rc<str>, Rc<str>)>,
    pub should_fail: bool,
}

/// Per-project state. Each `project()`/`subproject()` evaluation owns
/// one of these; subprojects get a fresh scope chain, which is what
/// isolates their variables from the parent.
pub struct Project {
    pub name: Rc<str>,
    pub version: Rc<str>,
    pub license: Rc<str>,
    pub cwd: PathBuf,
    pub build_dir: PathBuf,
    /// Scope chain, innermost last. Lookup falls through toward the
    /// front; the chain never crosses into another project.
    pub scopes: Vec<Scope>,
    pub args: Vec<Rc<str>>,
    pub targets: Vec<ObjId>,
    pub install_rules: Vec<InstallRule>,
    pub tests: Vec<TestDef>,
    pub options: FxHashMap<Rc<str>, Value>,
}

impl Project {
    pub fn new(name: Rc<str>, cwd: PathBuf, build_dir: PathBuf) -> Self {
        Self {
            name,
            version: "undefined".into(),
            license: "unknown".into(),
            cwd,
            build_dir,
            scopes: vec![Scope::default()],
            args: Vec::new(),
            targets: Vec::new(),
            install_rules: Vec::new(),
            tests: Vec::new(),
            options: FxHashMap::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Normal,
    Analyze,
}

/// Where and when a variable was last assigned; analyzer bookkeeping.
#[derive(Debug, Clone)]
pub struct AssignSite {
    pub file: Rc<str>,
    pub span: Span,
}

/// Process-wide interpreter state for one invocation: the object heap,
/// the project/scope stack, and the diagnostic registry. Never shared
/// across invocations.
pub struct Workspace {
    pub heap: Heap,
    pub projects: Vec<Project>,
    pub cur_project: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub effects: Box<dyn Effects>,
    pub mode: EvalMode,
    pub source_root: PathBuf,
    pub build_root: PathBuf,
    /// Every file evaluated, in order; the analyzer's `--trace` output.
    pub sources: Vec<PathBuf>,
    pub cur_file: Rc<str>,
    pub depth: usize,
    pub subproject_dir: Rc<str>,
    /// Subprojects already evaluated, by directory name. A second
    /// `subproject()` call reuses the first evaluation.
    pub subprojects: FxHashMap<Rc<str>, usize>,
    pub probe_timeout: Duration,
    /// Scratch directory for probe sources; removed at teardown.
    pub private_dir: Option<tempfile::TempDir>,
    // Analyzer instrumentation.
    pub assignments: FxHashMap<Rc<str>, AssignSite>,
    pub reads: FxHashSet<Rc<str>>,
}

impl Workspace {
    pub fn new(source_root: PathBuf, build_root: PathBuf) -> Self {
        Self::with_effects(source_root, build_root, Box::new(RealEffects), EvalMode::Normal)
    }

    pub fn with_effects(
        source_root: PathBuf,
        build_root: PathBuf,
        effects: Box<dyn Effects>,
        mode: EvalMode,
    ) -> Self {
        Self {
            heap: Heap::new(),
            projects: Vec::new(),
            cur_project: 0,
            diagnostics: Vec::new(),
            effects,
            mode,
            source_root,
            build_root,
            sources: Vec::new(),
            cur_file: "<internal>".into(),
            depth: 0,
            subproject_dir: "subprojects".into(),
            subprojects: FxHashMap::default(),
            probe_timeout: DEFAULT_TIMEOUT,
            private_dir: None,
            assignments: FxHashMap::default(),
            reads: FxHashSet::default(),
        }
    }

    pub fn analyzing(&self) -> bool {
        self.mode == EvalMode::Analyze
    }

    pub fn cur_project(&self) -> &Project {
        &self.projects[self.cur_project]
    }

    pub fn cur_project_mut(&mut self) -> &mut Project {
        &mut self.projects[self.cur_project]
    }

    /// Lazily created per-run scratch dir for probe source files.
    /// Dropping the workspace removes it, error paths included.
    pub fn private_path(&mut self, file: &str) -> LangResult<PathBuf> {
        if self.private_dir.is_none() {
            let dir = tempfile::Builder::new()
                .prefix("mason-private")
                .tempdir()
                .map_err(|err| LangError::bare(ErrorKind::Io(err.to_string())))?;
            self.private_dir = Some(dir);
        }
        Ok(self
            .private_dir
            .as_ref()
            .expect("private dir just created")
            .path()
            .join(file))
    }

    // ---- variable scopes ----

    pub fn lookup_var(&self, name: &str) -> Option<Value> {
        let project = self.cur_project();
        for scope in project.scopes.iter().rev() {
            if let Some(value) = scope.vars.get(name) {
                return Some(value.clone());
            }
        }
        None
    }

    /// Assigns into the innermost scope that already binds `name`, or
    /// the current innermost scope otherwise.
    pub fn assign_var(&mut self, name: Rc<str>, value: Value) {
        let project = self.cur_project_mut();
        for scope in project.scopes.iter_mut().rev() {
            if scope.vars.contains_key(&name) {
                scope.vars.insert(name, value);
                return;
            }
        }
        project
            .scopes
            .last_mut()
            .expect("project always has a scope")
            .vars
            .insert(name, value);
    }

    pub fn push_scope(&mut self) {
        self.cur_project_mut().scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        let project = self.cur_project_mut();
        if project.scopes.len() > 1 {
            project.scopes.pop();
        }
    }

    // ---- diagnostics ----

    pub fn diag(&mut self, severity: Severity, span: Span, message: String) {
        self.diagnostics.push(Diagnostic {
            severity,
            message,
            file: self.cur_file.clone(),
            line: span.line,
            column: span.column,
        });
    }

    pub fn diag_error(&mut self, err: &LangError) {
        let span = err.span.unwrap_or_default();
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            message: err.kind.to_string(),
            file: err.file.clone().unwrap_or_else(|| self.cur_file.clone()),
            line: span.line,
            column: span.column,
        });
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// Batch rendering order: file, then line, then column.
    pub fn sorted_diagnostics(&self) -> Vec<&Diagnostic> {
        let mut diags: Vec<&Diagnostic> = self.diagnostics.iter().collect();
        diags.sort_by(|a, b| {
            a.file
                .cmp(&b.file)
                .then(a.line.cmp(&b.line))
                .then(a.column.cmp(&b.column))
        });
        diags
    }

    // ---- analyzer instrumentation ----

    pub fn record_assignment(&mut self, name: &Rc<str>, span: Span) {
        if self.analyzing() {
            self.assignments.insert(
                name.clone(),
                AssignSite {
                    file: self.cur_file.clone(),
                    span,
                },
            );
        }
    }

    pub fn record_read(&mut self, name: &Rc<str>) {
        if self.analyzing() {
            self.reads.insert(name.clone());
        }
    }

    /// Assigned-but-never-read variables; `_`-prefixed names opt out.
    pub fn unused_variables(&self) -> Vec<(Rc<str>, AssignSite)> {
        let mut unused: Vec<(Rc<str>, AssignSite)> = self
            .assignments
            .iter()
            .filter(|(name, _)| !name.starts_with('_') && !self.reads.contains(*name))
            .map(|(name, site)| (name.clone(), site.clone()))
            .collect();
        unused.sort_by(|a, b| {
            a.1.file
                .cmp(&b.1.file)
                .then(a.1.span.line.cmp(&b.1.span.line))
        });
        unused
    }

    // ---- path helpers ----

    pub fn cur_dir(&self) -> &Path {
        &self.cur_project().cwd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_with_project() -> Workspace {
        let mut wk = Workspace::new(PathBuf::from("/src"), PathBuf::from("/build"));
        wk.projects.push(Project::new(
            "test".into(),
            PathBuf::from("/src"),
            PathBuf::from("/build"),
        ));
        wk
    }

    #[test]
    fn assignment_prefers_existing_binding() {
        let mut wk = workspace_with_project();
        wk.assign_var("x".into(), Value::Int(1));
        wk.push_scope();
        wk.assign_var("x".into(), Value::Int(2));
        wk.assign_var("y".into(), Value::Int(3));
        assert_eq!(wk.lookup_var("x"), Some(Value::Int(2)));
        wk.pop_scope();
        // x was rebound in the outer scope; y lived in the popped one.
        assert_eq!(wk.lookup_var("x"), Some(Value::Int(2)));
        assert_eq!(wk.lookup_var("y"), None);
    }

    #[test]
    fn diagnostics_sort_by_file_then_line() {
        let mut wk = workspace_with_project();
        wk.cur_file = "b.build".into();
        wk.diag(Severity::Warning, Span::new(0, 0, 9, 1), "late".into());
        wk.diag(Severity::Warning, Span::new(0, 0, 2, 1), "early".into());
        wk.cur_file = "a.build".into();
        wk.diag(Severity::Error, Span::new(0, 0, 5, 1), "other file".into());
        let sorted = wk.sorted_diagnostics();
        assert_eq!(sorted[0].message, "other file");
        assert_eq!(sorted[1].message, "early");
        assert_eq!(sorted[2].message, "late");
    }

    #[test]
    fn unused_variables_skips_underscore_names() {
        let mut wk = workspace_with_project();
        wk.mode = EvalMode::Analyze;
        wk.record_assignment(&Rc::from("used"), Span::new(0, 0, 1, 1));
        wk.record_assignment(&Rc::from("unused"), Span::new(0, 0, 2, 1));
        wk.record_assignment(&Rc::from("_ignored"), Span::new(0, 0, 3, 1));
        wk.record_read(&Rc::from("used"));
        let unused = wk.unused_variables();
        assert_eq!(unused.len(), 1);
        assert_eq!(&*unused[0].0, "unused");
    }
}
