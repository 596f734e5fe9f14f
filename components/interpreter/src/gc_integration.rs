//! Garbage collection integration
//!
//! Root enumeration for the VM heap, collection entry points and persistent
//! pins for values held by host code.

use memory_manager::{GcStats, ObjRef, Root};

use crate::object::Object;
use crate::value::Value;
use crate::vm::Vm;

/// A value kept alive across collections until dropped
///
/// Scalars carry no root; object values hold a [`Root`] in the VM's root
/// table.
#[derive(Debug, Clone)]
pub struct Pinned {
    value: Value,
    root: Option<Root>,
}

impl Pinned {
    /// The pinned value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Handle being kept alive, if the value is an object
    pub fn handle(&self) -> Option<ObjRef> {
        self.root.as_ref().map(Root::handle)
    }

    /// Release the pin and return the value
    pub fn into_value(self) -> Value {
        self.value
    }
}

/// Pins compare by the value they keep alive
impl PartialEq for Pinned {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Vm {
    /// Keep `value` alive until the returned pin is dropped
    pub fn pin(&self, value: Value) -> Pinned {
        let root = value.as_object().map(|handle| self.roots.root(handle));
        Pinned { value, root }
    }

    /// Number of persistent roots currently registered
    pub fn pinned_count(&self) -> usize {
        self.roots.len()
    }

    /// Heap statistics
    pub fn gc_stats(&self) -> GcStats {
        self.heap.stats()
    }

    /// Collect if the allocation threshold was reached
    pub fn maybe_collect(&mut self) -> usize {
        if self.heap.should_collect() {
            self.collect()
        } else {
            0
        }
    }

    /// Run a full collection and finalize swept instances
    ///
    /// Skipped while a native entry point is executing, since its arguments
    /// and temporaries may only be referenced from Rust locals. Returns the
    /// number of objects freed.
    pub fn collect(&mut self) -> usize {
        if self.native_depth > 0 {
            tracing::debug!(depth = self.native_depth, "collection deferred inside native call");
            return 0;
        }

        let roots = self.root_set();
        let swept = self.heap.collect(roots);
        let freed = swept.len();
        let mut finalized = 0usize;
        for (handle, object) in swept {
            if let Object::Instance(instance) = object {
                if let (Some(finalizer), Some(userdata)) = (instance.finalizer, instance.userdata) {
                    finalizer(handle, userdata);
                    finalized += 1;
                }
            }
        }
        tracing::debug!(vm = self.id(), freed, finalized, "collection finished");
        freed
    }

    fn root_set(&self) -> Vec<ObjRef> {
        let mut roots: Vec<ObjRef> = Vec::with_capacity(self.stack.len() + 64);
        roots.extend(self.stack.iter().filter_map(Value::as_object));
        roots.extend(self.registers.iter().filter_map(Value::as_object));
        for frame in &self.frames {
            frame.trace(&mut roots);
        }
        roots.extend(self.modules.values().copied());
        roots.push(self.builtins);
        roots.push(self.main_module());
        roots.extend(self.types_handles());
        roots.extend(self.roots.handles());
        roots.extend(self.repr_guard.iter().copied());
        roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::object::{TypeKind, TypeObject};

    #[test]
    fn test_unreachable_list_is_collected() {
        let mut vm = Vm::new();
        let list = vm.new_list(vec![Value::Int(1)]);
        let handle = list.as_object().unwrap();
        drop(list);
        vm.collect();
        assert!(!vm.is_live(handle));
    }

    #[test]
    fn test_pinned_value_survives() {
        let mut vm = Vm::new();
        let list = vm.new_list(Vec::new());
        let pin = vm.pin(list);
        vm.collect();
        let handle = pin.handle().unwrap();
        assert!(vm.is_live(handle));
        drop(pin);
        vm.collect();
        assert!(!vm.is_live(handle));
    }

    #[test]
    fn test_globals_are_roots() {
        let mut vm = Vm::new();
        let main = vm.main_module();
        let list = vm.new_list(Vec::new());
        let handle = list.as_object().unwrap();
        vm.set_global(main, "keep", list);
        vm.collect();
        assert!(vm.is_live(handle));
    }

    #[test]
    fn test_finalizer_receives_userdata() {
        let mut vm = Vm::new();
        let seen = Rc::new(Cell::new(0));
        let observer = seen.clone();
        let mut ty = TypeObject::new("Counter", TypeKind::Host);
        ty.finalizer = Some(Rc::new(move |_, data| {
            if let Ok(n) = data.downcast::<i32>() {
                observer.set(*n);
            }
        }));
        let class = vm.new_type(ty);
        let main = vm.main_module();
        vm.set_global(main, "Counter", Value::Object(class));

        vm.new_instance(class, Some(Box::new(7i32))).unwrap();
        vm.collect();
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn test_collection_deferred_inside_native() {
        let mut vm = Vm::new();
        let collect = vm.new_native("collect", |vm, _frame| Ok(Value::Int(vm.collect() as i64)));
        let garbage = vm.new_list(Vec::new());
        drop(garbage);
        let freed = vm.call(&collect, &[]).unwrap();
        assert_eq!(freed, Value::Int(0));
    }
}
