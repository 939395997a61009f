//! Self-describing binary serialization of the value graph: a tag
//! byte per value, length-prefixed payloads for variable-length kinds.
//! Heap objects are written once into a per-dump table in post order
//! (children before parents, valid because no mutation path can make
//! the graph cyclic), so aliasing survives the round trip.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{ErrorKind, LangError, LangResult};
use crate::heap::Heap;
use crate::value::{
    BuildTarget, Compiler, CustomTarget, Dependency, EnvAction, ExternalProgram, FeatureKind,
    Generator, Module, Obj, ObjId, RunResult, Subproject, TargetKind, Value,
};

const MAGIC: &[u8; 4] = b"MSN1";

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_STR: u8 = 3;
const TAG_OBJ: u8 = 4;

const OBJ_ARRAY: u8 = 0;
const OBJ_DICT: u8 = 1;
const OBJ_FILE: u8 = 2;
const OBJ_COMPILER: u8 = 3;
const OBJ_DEPENDENCY: u8 = 4;
const OBJ_BUILD_TARGET: u8 = 5;
const OBJ_CUSTOM_TARGET: u8 = 6;
const OBJ_EXTERNAL_PROGRAM: u8 = 7;
const OBJ_MODULE: u8 = 8;
const OBJ_SUBPROJECT: u8 = 9;
const OBJ_DISABLER: u8 = 10;
const OBJ_FEATURE: u8 = 11;
const OBJ_CONFIG_DATA: u8 = 12;
const OBJ_ENVIRONMENT: u8 = 13;
const OBJ_GENERATOR: u8 = 14;
const OBJ_RUN_RESULT: u8 = 15;

struct Dumper<'a> {
    heap: &'a Heap,
    /// Already-emitted objects, by source handle.
    table: FxHashMap<ObjId, u32>,
    objects: Vec<u8>,
    count: u32,
}

impl<'a> Dumper<'a> {
    /// Emits `id`'s transitive children, then `id` itself, and returns
    /// its table index.
    fn visit(&mut self, id: ObjId) -> u32 {
        if let Some(&idx) = self.table.get(&id) {
            return idx;
        }
        let mut payload = Vec::new();
        match self.heap.get(id).clone() {
            Obj::Array(values) => {
                payload.push(OBJ_ARRAY);
                self.put_values(&mut payload, &values);
            }
            Obj::Dict(entries) => {
                payload.push(OBJ_DICT);
                self.put_entries(&mut payload, &entries);
            }
            Obj::File(path) => {
                payload.push(OBJ_FILE);
                put_str(&mut payload, &path);
            }
            Obj::Compiler(Compiler {
                cmd,
                language,
                version,
            }) => {
                payload.push(OBJ_COMPILER);
                put_str(&mut payload, &cmd);
                put_str(&mut payload, &language);
                put_str(&mut payload, &version);
            }
            Obj::Dependency(dep) => {
                payload.push(OBJ_DEPENDENCY);
                put_str(&mut payload, &dep.name);
                payload.push(dep.found as u8);
                put_str(&mut payload, &dep.version);
                self.put_values(&mut payload, &dep.include_directories);
                self.put_values(&mut payload, &dep.link_with);
                put_strs(&mut payload, &dep.compile_args);
                put_strs(&mut payload, &dep.link_args);
                put_u32(&mut payload, dep.variables.len() as u32);
                for (key, value) in &dep.variables {
                    put_str(&mut payload, key);
                    put_str(&mut payload, value);
                }
            }
            Obj::BuildTarget(target) => {
                payload.push(OBJ_BUILD_TARGET);
                put_str(&mut payload, &target.name);
                put_str(&mut payload, &target.build_name);
                payload.push(match target.kind {
                    TargetKind::Executable => 0,
                    TargetKind::StaticLibrary => 1,
                    TargetKind::SharedLibrary => 2,
                });
                self.put_values(&mut payload, &target.sources);
                self.put_values(&mut payload, &target.include_directories);
                self.put_values(&mut payload, &target.deps);
                put_strs(&mut payload, &target.compile_args);
                put_strs(&mut payload, &target.link_args);
                payload.push(target.install as u8);
            }
            Obj::CustomTarget(target) => {
                payload.push(OBJ_CUSTOM_TARGET);
                put_str(&mut payload, &target.name);
                self.put_values(&mut payload, &target.command);
                self.put_values(&mut payload, &target.input);
                put_strs(&mut payload, &target.output);
            }
            Obj::ExternalProgram(prog) => {
                payload.push(OBJ_EXTERNAL_PROGRAM);
                put_str(&mut payload, &prog.name);
                put_str(&mut payload, &prog.path);
                payload.push(prog.found as u8);
            }
            Obj::Module(module) => {
                payload.push(OBJ_MODULE);
                put_str(&mut payload, &module.name);
                payload.push(module.found as u8);
            }
            Obj::Subproject(sub) => {
                payload.push(OBJ_SUBPROJECT);
                match sub.project {
                    Some(project) => {
                        payload.push(1);
                        put_u32(&mut payload, project as u32);
                    }
                    None => payload.push(0),
                }
                payload.push(sub.found as u8);
            }
            Obj::Disabler => payload.push(OBJ_DISABLER),
            Obj::Feature(kind) => {
                payload.push(OBJ_FEATURE);
                payload.push(match kind {
                    FeatureKind::Enabled => 0,
                    FeatureKind::Disabled => 1,
                    FeatureKind::Auto => 2,
                });
            }
            Obj::ConfigData(entries) => {
                payload.push(OBJ_CONFIG_DATA);
                self.put_entries(&mut payload, &entries);
            }
            Obj::Environment(actions) => {
                payload.push(OBJ_ENVIRONMENT);
                put_u32(&mut payload, actions.len() as u32);
                for action in &actions {
                    let (tag, key, value) = match action {
                        EnvAction::Set(k, v) => (0u8, k, v),
                        EnvAction::Append(k, v) => (1, k, v),
                        EnvAction::Prepend(k, v) => (2, k, v),
                    };
                    payload.push(tag);
                    put_str(&mut payload, key);
                    put_str(&mut payload, value);
                }
            }
            Obj::Generator(generator) => {
                payload.push(OBJ_GENERATOR);
                self.put_value(&mut payload, &generator.program);
                put_strs(&mut payload, &generator.arguments);
                put_strs(&mut payload, &generator.output);
            }
            Obj::RunResult(result) => {
                payload.push(OBJ_RUN_RESULT);
                put_u32(&mut payload, result.status as u32);
                put_str(&mut payload, &result.stdout);
                put_str(&mut payload, &result.stderr);
            }
        }
        let idx = self.count;
        self.count += 1;
        self.objects.extend_from_slice(&payload);
        self.table.insert(id, idx);
        idx
    }

    fn put_value(&mut self, out: &mut Vec<u8>, value: &Value) {
        match value {
            Value::Null => out.push(TAG_NULL),
            Value::Bool(b) => {
                out.push(TAG_BOOL);
                out.push(*b as u8);
            }
            Value::Int(i) => {
                out.push(TAG_INT);
                out.extend_from_slice(&i.to_le_bytes());
            }
            Value::Str(s) => {
                out.push(TAG_STR);
                put_str(out, s);
            }
            Value::Obj(id) => {
                let idx = self.visit(*id);
                out.push(TAG_OBJ);
                put_u32(out, idx);
            }
        }
    }

    fn put_values(&mut self, out: &mut Vec<u8>, values: &[Value]) {
        put_u32(out, values.len() as u32);
        for value in values {
            self.put_value(out, value);
        }
    }

    fn put_entries(&mut self, out: &mut Vec<u8>, entries: &[(Rc<str>, Value)]) {
        put_u32(out, entries.len() as u32);
        for (key, value) in entries {
            put_str(out, key);
            self.put_value(out, value);
        }
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    put_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

fn put_strs(out: &mut Vec<u8>, values: &[Rc<str>]) {
    put_u32(out, values.len() as u32);
    for value in values {
        put_str(out, value);
    }
}

pub fn dump(heap: &Heap, root: &Value) -> Vec<u8> {
    let mut dumper = Dumper {
        heap,
        table: FxHashMap::default(),
        objects: Vec::new(),
        count: 0,
    };
    let mut root_bytes = Vec::new();
    dumper.put_value(&mut root_bytes, root);

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    put_u32(&mut out, dumper.count);
    out.extend_from_slice(&dumper.objects);
    out.extend_from_slice(&root_bytes);
    out
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> LangResult<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(truncated()),
        }
    }

    fn u8(&mut self) -> LangResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> LangResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i64(&mut self) -> LangResult<i64> {
        let bytes: [u8; 8] = self.take(8)?.try_into().map_err(|_| truncated())?;
        Ok(i64::from_le_bytes(bytes))
    }

    fn str(&mut self) -> LangResult<Rc<str>> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(Rc::from)
            .map_err(|_| malformed("invalid utf-8 string"))
    }

    fn strs(&mut self) -> LangResult<Vec<Rc<str>>> {
        let count = self.u32()? as usize;
        (0..count).map(|_| self.str()).collect()
    }

    /// A value whose object references must point at table slots
    /// already materialized into `ids`.
    fn value(&mut self, ids: &[ObjId]) -> LangResult<Value> {
        match self.u8()? {
            TAG_NULL => Ok(Value::Null),
            TAG_BOOL => Ok(Value::Bool(self.u8()? != 0)),
            TAG_INT => Ok(Value::Int(self.i64()?)),
            TAG_STR => Ok(Value::Str(self.str()?)),
            TAG_OBJ => {
                let idx = self.u32()? as usize;
                ids.get(idx)
                    .map(|&id| Value::Obj(id))
                    .ok_or_else(|| malformed("forward object reference"))
            }
            _ => Err(malformed("unknown value tag")),
        }
    }

    fn values(&mut self, ids: &[ObjId]) -> LangResult<Vec<Value>> {
        let count = self.u32()? as usize;
        (0..count).map(|_| self.value(ids)).collect()
    }

    fn entries(&mut self, ids: &[ObjId]) -> LangResult<Vec<(Rc<str>, Value)>> {
        let count = self.u32()? as usize;
        (0..count)
            .map(|_| Ok((self.str()?, self.value(ids)?)))
            .collect()
    }
}

fn truncated() -> LangError {
    LangError::bare(ErrorKind::Io("truncated serialized data".to_string()))
}

fn malformed(what: &str) -> LangError {
    LangError::bare(ErrorKind::Io(format!("malformed serialized data: {what}")))
}

/// Reloads a dumped value graph into `heap`, allocating fresh handles
/// but preserving the aliasing structure of the dump.
pub fn load(heap: &mut Heap, bytes: &[u8]) -> LangResult<Value> {
    let mut reader = Reader { bytes, pos: 0 };
    if reader.take(4)? != MAGIC {
        return Err(malformed("bad magic"));
    }
    let count = reader.u32()? as usize;
    let mut ids: Vec<ObjId> = Vec::with_capacity(count);
    for _ in 0..count {
        let obj = match reader.u8()? {
            OBJ_ARRAY => Obj::Array(reader.values(&ids)?),
            OBJ_DICT => Obj::Dict(reader.entries(&ids)?),
            OBJ_FILE => Obj::File(reader.str()?),
            OBJ_COMPILER => Obj::Compiler(Compiler {
                cmd: reader.str()?,
                language: reader.str()?,
                version: reader.str()?,
            }),
            OBJ_DEPENDENCY => Obj::Dependency(Dependency {
                name: reader.str()?,
                found: reader.u8()? != 0,
                version: reader.str()?,
                include_directories: reader.values(&ids)?,
                link_with: reader.values(&ids)?,
                compile_args: reader.strs()?,
                link_args: reader.strs()?,
                variables: {
                    let count = reader.u32()? as usize;
                    (0..count)
                        .map(|_| Ok((reader.str()?, reader.str()?)))
                        .collect::<LangResult<Vec<_>>>()?
                },
            }),
            OBJ_BUILD_TARGET => Obj::BuildTarget(BuildTarget {
                name: reader.str()?,
                build_name: reader.str()?,
                kind: match reader.u8()? {
                    0 => TargetKind::Executable,
                    1 => TargetKind::StaticLibrary,
                    2 => TargetKind::SharedLibrary,
                    _ => return Err(malformed("unknown target kind")),
                },
                sources: reader.values(&ids)?,
                include_directories: reader.values(&ids)?,
                deps: reader.values(&ids)?,
                compile_args: reader.strs()?,
                link_args: reader.strs()?,
                install: reader.u8()? != 0,
            }),
            OBJ_CUSTOM_TARGET => Obj::CustomTarget(CustomTarget {
                name: reader.str()?,
                command: reader.values(&ids)?,
                input: reader.values(&ids)?,
                output: reader.strs()?,
            }),
            OBJ_EXTERNAL_PROGRAM => Obj::ExternalProgram(ExternalProgram {
                name: reader.str()?,
                path: reader.str()?,
                found: reader.u8()? != 0,
            }),
            OBJ_MODULE => Obj::Module(Module {
                name: reader.str()?,
                found: reader.u8()? != 0,
            }),
            OBJ_SUBPROJECT => {
                let project = match reader.u8()? {
                    0 => None,
                    _ => Some(reader.u32()? as usize),
                };
                Obj::Subproject(Subproject {
                    project,
                    found: reader.u8()? != 0,
                })
            }
            OBJ_DISABLER => Obj::Disabler,
            OBJ_FEATURE => Obj::Feature(match reader.u8()? {
                0 => FeatureKind::Enabled,
                1 => FeatureKind::Disabled,
                2 => FeatureKind::Auto,
                _ => return Err(malformed("unknown feature kind")),
            }),
            OBJ_CONFIG_DATA => Obj::ConfigData(reader.entries(&ids)?),
            OBJ_ENVIRONMENT => {
                let count = reader.u32()? as usize;
                let actions = (0..count)
                    .map(|_| {
                        let tag = reader.u8()?;
                        let key = reader.str()?;
                        let value = reader.str()?;
                        match tag {
                            0 => Ok(EnvAction::Set(key, value)),
                            1 => Ok(EnvAction::Append(key, value)),
                            2 => Ok(EnvAction::Prepend(key, value)),
                            _ => Err(malformed("unknown environment action")),
                        }
                    })
                    .collect::<LangResult<Vec<_>>>()?;
                Obj::Environment(actions)
            }
            OBJ_GENERATOR => Obj::Generator(Generator {
                program: reader.value(&ids)?,
                arguments: reader.strs()?,
                output: reader.strs()?,
            }),
            OBJ_RUN_RESULT => Obj::RunResult(RunResult {
                status: reader.u32()? as i32,
                stdout: reader.str()?,
                stderr: reader.str()?,
            }),
            _ => return Err(malformed("unknown object tag")),
        };
        ids.push(heap.alloc(obj));
    }
    reader.value(&ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structurally_equal(a_heap: &Heap, a: &Value, b_heap: &Heap, b: &Value) -> bool {
        match (a, b) {
            (Value::Obj(x), Value::Obj(y)) => match (a_heap.get(*x), b_heap.get(*y)) {
                (Obj::Array(xs), Obj::Array(ys)) => {
                    xs.len() == ys.len()
                        && xs
                            .iter()
                            .zip(ys)
                            .all(|(x, y)| structurally_equal(a_heap, x, b_heap, y))
                }
                (x, y) => x == y,
            },
            _ => a == b,
        }
    }

    #[test]
    fn round_trip_reproduces_identical_bytes() {
        let mut heap = Heap::new();
        let file = Value::Obj(heap.alloc(Obj::File("/src/main.c".into())));
        let inner = heap.alloc_array(vec![Value::Int(-3), Value::Str("x".into()), file]);
        let root = heap.alloc_dict(vec![
            ("values".into(), inner.clone()),
            ("flag".into(), Value::Bool(true)),
            ("nothing".into(), Value::Null),
        ]);

        let bytes = dump(&heap, &root);
        let mut reloaded_heap = Heap::new();
        let reloaded = load(&mut reloaded_heap, &bytes).expect("load should succeed");
        // Dumping the reloaded graph is bit-identical.
        assert_eq!(dump(&reloaded_heap, &reloaded), bytes);
        assert!(structurally_equal(&heap, &root, &reloaded_heap, &reloaded));
    }

    #[test]
    fn aliasing_survives_the_round_trip() {
        let mut heap = Heap::new();
        let shared = heap.alloc_array(vec![Value::Int(1)]);
        let root = heap.alloc_array(vec![shared.clone(), shared.clone()]);

        let bytes = dump(&heap, &root);
        let mut reloaded_heap = Heap::new();
        let reloaded = load(&mut reloaded_heap, &bytes).expect("load should succeed");

        let id = reloaded.as_obj().expect("array");
        let values = reloaded_heap.array(id);
        // Both elements are the same handle, as in the original.
        assert_eq!(values[0], values[1]);
    }

    #[test]
    fn domain_objects_round_trip() {
        let mut heap = Heap::new();
        let dep = heap.alloc(Obj::Dependency(Dependency {
            found: true,
            version: "2.1".into(),
            link_args: vec!["-lz".into()],
            ..Dependency::not_found("zlib".into())
        }));
        let main_c = heap.alloc(Obj::File("/src/main.c".into()));
        let target = heap.alloc(Obj::BuildTarget(BuildTarget {
            name: "app".into(),
            build_name: "app".into(),
            kind: TargetKind::Executable,
            sources: vec![Value::Obj(main_c)],
            include_directories: Vec::new(),
            deps: vec![Value::Obj(dep)],
            compile_args: vec!["-Wall".into()],
            link_args: Vec::new(),
            install: true,
        }));

        let bytes = dump(&heap, &Value::Obj(target));
        let mut reloaded_heap = Heap::new();
        let reloaded = load(&mut reloaded_heap, &bytes).expect("load should succeed");
        let id = reloaded.as_obj().expect("target");
        let Obj::BuildTarget(target) = reloaded_heap.get(id) else {
            panic!("expected build target");
        };
        assert_eq!(&*target.name, "app");
        assert!(target.install);
        let Some(dep_id) = target.deps[0].as_obj() else {
            panic!("expected dependency handle");
        };
        let Obj::Dependency(dep) = reloaded_heap.get(dep_id) else {
            panic!("expected dependency");
        };
        assert!(dep.found);
        assert_eq!(&*dep.version, "2.1");
    }

    #[test]
    fn truncated_input_is_rejected() {
        let mut heap = Heap::new();
        let root = heap.alloc_array(vec![Value::Int(1)]);
        let bytes = dump(&heap, &root);
        let mut reloaded_heap = Heap::new();
        let err = load(&mut reloaded_heap, &bytes[..bytes.len() - 2])
            .expect_err("expected failure");
        assert!(matches!(err.kind, ErrorKind::Io(_)));
    }
}
