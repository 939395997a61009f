use std::rc::Rc;

use crate::heap::Heap;

/// Stable handle into the object heap. Handles are never reused within
/// one run, so handle equality implies object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjId(pub u32);

/// The dynamically-typed unit flowing through the VM.
///
/// Booleans, integers and strings are value types: assignment copies.
/// Everything else lives in the heap and is carried by handle, so
/// assignment aliases. Strings are immutable and reference-counted,
/// which makes the copy cheap without changing the semantics.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    Obj(ObjId),
}

/// Heap-resident payloads: containers and the build-domain objects.
#[derive(Debug, Clone, PartialEq)]
pub enum Obj {
    Array(Vec<Value>),
    /// String keys, unique, iteration in insertion order.
    Dict(Vec<(Rc<str>, Value)>),
    /// Absolute path, verified to exist when the object was created.
    File(Rc<str>),
    Compiler(Compiler),
    Dependency(Dependency),
    BuildTarget(BuildTarget),
    CustomTarget(CustomTarget),
    ExternalProgram(ExternalProgram),
    Module(Module),
    Subproject(Subproject),
    Disabler,
    Feature(FeatureKind),
    ConfigData(Vec<(Rc<str>, Value)>),
    Environment(Vec<EnvAction>),
    Generator(Generator),
    RunResult(RunResult),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiler {
    pub cmd: Rc<str>,
    pub language: Rc<str>,
    pub version: Rc<str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub name: Rc<str>,
    pub found: bool,
    pub version: Rc<str>,
    pub include_directories: Vec<Value>,
    pub link_with: Vec<Value>,
    pub compile_args: Vec<Rc<str>>,
    pub link_args: Vec<Rc<str>>,
    pub variables: Vec<(Rc<str>, Rc<str>)>,
}

impl Dependency {
    pub fn not_found(name: Rc<str>) -> Self {
        Self {
            name,
            found: false,
            version: "undefined".into(),
            include_directories: Vec::new(),
            link_with: Vec::new(),
            compile_args: Vec::new(),
            link_args: Vec::new(),
            variables: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Executable,
    StaticLibrary,
    SharedLibrary,
}

impl TargetKind {
    pub fn name(self) -> &'static str {
        match self {
            TargetKind::Executable => "executable",
            TargetKind::StaticLibrary => "static_library",
            TargetKind::SharedLibrary => "shared_library",
        }
    }

    /// Output file name decoration.
    pub fn decorate(self, name: &str) -> String {
        match self {
            TargetKind::Executable => name.to_string(),
            TargetKind::StaticLibrary => format!("lib{name}.a"),
            TargetKind::SharedLibrary => format!("lib{name}.so"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildTarget {
    pub name: Rc<str>,
    pub build_name: Rc<str>,
    pub kind: TargetKind,
    pub sources: Vec<Value>,
    pub include_directories: Vec<Value>,
    pub deps: Vec<Value>,
    pub compile_args: Vec<Rc<str>>,
    pub link_args: Vec<Rc<str>>,
    pub install: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomTarget {
    pub name: Rc<str>,
    pub command: Vec<Value>,
    pub input: Vec<Value>,
    pub output: Vec<Rc<str>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProgram {
    pub name: Rc<str>,
    pub path: Rc<str>,
    pub found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: Rc<str>,
    pub found: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subproject {
    /// Index of the evaluated project in the workspace project list.
    /// `None` when the subproject was not found, so a missing
    /// subproject can never resolve variables against a live project.
    pub project: Option<usize>,
    pub found: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Enabled,
    Disabled,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvAction {
    Set(Rc<str>, Rc<str>),
    Append(Rc<str>, Rc<str>),
    Prepend(Rc<str>, Rc<str>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generator {
    pub program: Value,
    pub arguments: Vec<Rc<str>>,
    pub output: Vec<Rc<str>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub status: i32,
    pub stdout: Rc<str>,
    pub stderr: Rc<str>,
}

impl Obj {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Obj::Array(_) => "array",
            Obj::Dict(_) => "dict",
            Obj::File(_) => "file",
            Obj::Compiler(_) => "compiler",
            Obj::Dependency(_) => "dependency",
            Obj::BuildTarget(_) => "build target",
            Obj::CustomTarget(_) => "custom target",
            Obj::ExternalProgram(_) => "external program",
            Obj::Module(_) => "module",
            Obj::Subproject(_) => "subproject",
            Obj::Disabler => "disabler",
            Obj::Feature(_) => "feature option",
            Obj::ConfigData(_) => "configuration data",
            Obj::Environment(_) => "environment",
            Obj::Generator(_) => "generator",
            Obj::RunResult(_) => "run result",
        }
    }
}

impl Value {
    pub fn kind_name(&self, heap: &Heap) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Obj(id) => heap.get(*id).kind_name(),
        }
    }

    /// Empty containers, empty strings, zero, false and null are falsy.
    /// Domain objects are always truthy.
    pub fn is_truthy(&self, heap: &Heap) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(value) => *value,
            Value::Int(value) => *value != 0,
            Value::Str(value) => !value.is_empty(),
            Value::Obj(id) => match heap.get(*id) {
                Obj::Array(values) => !values.is_empty(),
                Obj::Dict(entries) => !entries.is_empty(),
                _ => true,
            },
        }
    }

    pub fn as_str(&self) -> Option<&Rc<str>> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<ObjId> {
        match self {
            Value::Obj(id) => Some(*id),
            _ => None,
        }
    }

    /// Rendering used by `message()`, diagnostics and the analyzer's
    /// value queries.
    pub fn display(&self, heap: &Heap) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(value) => value.to_string(),
            Value::Int(value) => value.to_string(),
            Value::Str(value) => value.to_string(),
            Value::Obj(id) => match heap.get(*id) {
                Obj::Array(values) => {
                    let rendered = values
                        .iter()
                        .map(|v| v.display_quoted(heap))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("[{rendered}]")
                }
                Obj::Dict(entries) => {
                    let rendered = entries
                        .iter()
                        .map(|(k, v)| format!("'{k}': {}", v.display_quoted(heap)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{{{rendered}}}")
                }
                Obj::File(path) => path.to_string(),
                other => format!("<{}>", other.kind_name()),
            },
        }
    }

    fn display_quoted(&self, heap: &Heap) -> String {
        match self {
            Value::Str(value) => format!("'{value}'"),
            other => other.display(heap),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;

    #[test]
    fn value_types_compare_by_value() {
        assert_eq!(Value::Int(3), Value::Int(3));
        assert_eq!(Value::Str("a".into()), Value::Str("a".into()));
        assert_ne!(Value::Str("a".into()), Value::Str("b".into()));
        assert_ne!(Value::Int(0), Value::Bool(false));
    }

    #[test]
    fn reference_types_compare_by_handle_identity() {
        let mut heap = Heap::new();
        let a = heap.alloc(Obj::Array(vec![Value::Int(1)]));
        let b = heap.alloc(Obj::Array(vec![Value::Int(1)]));
        // Structurally identical, built independently: not equal.
        assert_ne!(Value::Obj(a), Value::Obj(b));
        assert_eq!(Value::Obj(a), Value::Obj(a));
    }

    #[test]
    fn truthiness_follows_emptiness() {
        let mut heap = Heap::new();
        let empty = heap.alloc(Obj::Array(Vec::new()));
        let full = heap.alloc(Obj::Array(vec![Value::Int(0)]));
        let disabler = heap.alloc(Obj::Disabler);
        assert!(!Value::Obj(empty).is_truthy(&heap));
        assert!(Value::Obj(full).is_truthy(&heap));
        assert!(Value::Obj(disabler).is_truthy(&heap));
        assert!(!Value::Str("".into()).is_truthy(&heap));
        assert!(!Value::Int(0).is_truthy(&heap));
        assert!(!Value::Null.is_truthy(&heap));
    }

    #[test]
    fn renders_nested_containers() {
        let mut heap = Heap::new();
        let inner = heap.alloc(Obj::Array(vec![Value::Int(1), Value::Str("x".into())]));
        let dict = heap.alloc(Obj::Dict(vec![("k".into(), Value::Obj(inner))]));
        assert_eq!(Value::Obj(dict).display(&heap), "{'k': [1, 'x']}");
    }
}
