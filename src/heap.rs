use std::rc::Rc;

use crate::value::{Obj, ObjId, Value};

/// Grow-only store of all reference-kind values for one run.
///
/// Objects are addressed only by [`ObjId`]; ids are handed out
/// monotonically and never reused, so any handle stays valid for the
/// remainder of the run. Nothing is freed individually; the whole heap
/// drops at workspace teardown.
#[derive(Debug, Default)]
pub struct Heap {
    objs: Vec<Obj>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, obj: Obj) -> ObjId {
        let id = ObjId(self.objs.len() as u32);
        self.objs.push(obj);
        id
    }

    pub fn get(&self, id: ObjId) -> &Obj {
        // Ids only come from alloc, so the index is always in range.
        &self.objs[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ObjId) -> &mut Obj {
        &mut self.objs[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.objs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objs.is_empty()
    }

    pub fn alloc_array(&mut self, values: Vec<Value>) -> Value {
        Value::Obj(self.alloc(Obj::Array(values)))
    }

    pub fn alloc_dict(&mut self, entries: Vec<(Rc<str>, Value)>) -> Value {
        Value::Obj(self.alloc(Obj::Dict(entries)))
    }

    pub fn array(&self, id: ObjId) -> &Vec<Value> {
        match self.get(id) {
            Obj::Array(values) => values,
            other => panic!("expected array object, got {}", other.kind_name()),
        }
    }

    pub fn dict_get(&self, entries: &[(Rc<str>, Value)], key: &str) -> Option<Value> {
        entries
            .iter()
            .find(|(k, _)| &**k == key)
            .map(|(_, v)| v.clone())
    }

    /// Inserts or replaces, preserving first-insertion order.
    pub fn dict_set(entries: &mut Vec<(Rc<str>, Value)>, key: Rc<str>, value: Value) {
        if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            entries.push((key, value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_monotonic_and_stable() {
        let mut heap = Heap::new();
        let a = heap.alloc(Obj::Array(Vec::new()));
        let b = heap.alloc(Obj::Disabler);
        assert_eq!(a, ObjId(0));
        assert_eq!(b, ObjId(1));
        assert!(matches!(heap.get(a), Obj::Array(_)));
        // Growing the heap does not invalidate earlier handles.
        for _ in 0..100 {
            heap.alloc(Obj::Array(Vec::new()));
        }
        assert!(matches!(heap.get(b), Obj::Disabler));
    }

    #[test]
    fn dict_set_replaces_in_place() {
        let mut entries = Vec::new();
        Heap::dict_set(&mut entries, "a".into(), Value::Int(1));
        Heap::dict_set(&mut entries, "b".into(), Value::Int(2));
        Heap::dict_set(&mut entries, "a".into(), Value::Int(3));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ("a".into(), Value::Int(3)));
        assert_eq!(entries[1], ("b".into(), Value::Int(2)));
    }
}
