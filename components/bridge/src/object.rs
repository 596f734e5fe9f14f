//! Object bridge
//!
//! A host object of type `T: Bridged` lives in an `Rc<T>`. Exposing it to
//! a VM allocates one script instance whose userdata slot holds a clone of
//! that `Rc`: one strong count moves to the script heap. The instance
//! handle is remembered in the object's [`BridgeCache`], so exposing the
//! same object again returns the same script value.
//!
//! When the collector sweeps the instance, the type's finalizer drops the
//! userdata and clears the cache if it still names the dying handle. The
//! host object itself lives on as long as host code holds it; exposing it
//! again then allocates a fresh instance.
//!
//! A script class deriving from a bridged type starts out with empty
//! userdata. The base's `__init__` runs the host constructor and attaches
//! the result to the subclass instance, which then stands for the host
//! object in the cache.

use std::cell::Cell;
use std::rc::Rc;

use core_types::{ScriptError, ScriptResult};
use interpreter::{CallFrame, Finalizer, NativeFn, ObjRef, Value, Vm, VmError};

use crate::codec::{FromScript, IntoScript, ScriptType};
use crate::descriptor::{self, TypeBuilder};
use crate::error::BridgeResult;

/// Host type that can appear in scripts with identity
///
/// ```
/// use bridge::{expose, BridgeCache, Bridged, BridgeResult, HostResult, TypeBuilder};
/// use interpreter::Vm;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// #[derive(Default)]
/// struct Counter {
///     cache: BridgeCache,
///     count: Cell<i64>,
/// }
///
/// impl Bridged for Counter {
///     const TYPE_NAME: &'static str = "Counter";
///
///     fn bridge_cache(&self) -> &BridgeCache {
///         &self.cache
///     }
///
///     fn describe(ty: &mut TypeBuilder<'_, Self>) -> BridgeResult<()> {
///         ty.property("count -> int", |c: &Counter| -> HostResult<i64> { Ok(c.count.get()) })?;
///         Ok(())
///     }
/// }
///
/// let mut vm = Vm::new();
/// let counter = Rc::new(Counter::default());
/// let a = expose(&mut vm, &counter).unwrap();
/// let b = expose(&mut vm, &counter).unwrap();
/// assert_eq!(a, b);
/// ```
pub trait Bridged: Sized + 'static {
    /// Script type name
    const TYPE_NAME: &'static str;

    /// Cache slot holding this object's script instance
    fn bridge_cache(&self) -> &BridgeCache;

    /// Declare the operations scripts can use
    fn describe(ty: &mut TypeBuilder<'_, Self>) -> BridgeResult<()> {
        let _ = ty;
        Ok(())
    }
}

/// The script instance currently representing a host object
///
/// Keyed by VM id so a handle from one VM is never used in another.
#[derive(Debug, Default)]
pub struct BridgeCache {
    slot: Cell<Option<(u64, ObjRef)>>,
}

impl BridgeCache {
    /// An empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached handle for the VM with id `vm_id`
    pub fn get(&self, vm_id: u64) -> Option<ObjRef> {
        match self.slot.get() {
            Some((id, handle)) if id == vm_id => Some(handle),
            _ => None,
        }
    }

    /// Whether any instance is cached
    pub fn is_set(&self) -> bool {
        self.slot.get().is_some()
    }

    fn set(&self, vm_id: u64, handle: ObjRef) {
        self.slot.set(Some((vm_id, handle)));
    }

    /// Clear the slot if it still holds `handle`
    fn clear_if(&self, vm_id: u64, handle: ObjRef) -> bool {
        if self.slot.get() == Some((vm_id, handle)) {
            self.slot.set(None);
            true
        } else {
            false
        }
    }
}

/// Finalizer installed on every bridged type
///
/// Drops the userdata share and clears the cache if it names `handle`.
pub(crate) fn finalizer<T: Bridged>(vm_id: u64) -> Finalizer {
    Rc::new(move |handle, userdata| {
        if let Ok(object) = userdata.downcast::<Rc<T>>() {
            let cleared = object.bridge_cache().clear_if(vm_id, handle);
            tracing::trace!(type_name = T::TYPE_NAME, handle = handle.index(), cleared, "released bridged object");
        }
    })
}

/// `__init__` installed on bridged types that have a constructor
///
/// Runs the constructor with the remaining arguments and attaches the host
/// object to the receiver, an instance of a script subclass.
pub(crate) fn initializer<T: Bridged>(constructor: NativeFn) -> NativeFn {
    Rc::new(move |vm: &mut Vm, frame: CallFrame| {
        let receiver = frame.arg(vm, 0).unwrap_or(Value::None);
        let class = descriptor::type_handle::<T>(vm).map_err(ScriptError::from)?;
        if !vm.isinstance(&receiver, class) {
            return Err(ScriptError::type_error(format!(
                "descriptor '__init__' requires a '{}' object but received '{}'",
                T::TYPE_NAME,
                vm.type_name(&receiver)
            ))
            .into());
        }
        if vm.userdata::<Rc<T>>(&receiver).is_some() {
            return Err(ScriptError::type_error(format!(
                "'{}' instance is already initialized",
                T::TYPE_NAME
            ))
            .into());
        }

        let created = constructor(vm, frame.shift())?;
        let object = materialize::<T>(vm, &created).ok_or_else(|| {
            VmError::from(ScriptError::type_error(format!(
                "{}() did not produce a host object",
                T::TYPE_NAME
            )))
        })?;
        vm.set_userdata(&receiver, Box::new(Rc::clone(&object)))?;
        if let Some(handle) = receiver.as_object() {
            object.bridge_cache().set(vm.id(), handle);
            tracing::trace!(type_name = T::TYPE_NAME, handle = handle.index(), "attached bridged object to subclass instance");
        }
        Ok(Value::None)
    })
}

/// Script value for `object`, allocating an instance on first exposure
///
/// Registers `T` with the VM if it has not been registered yet.
pub fn expose<T: Bridged>(vm: &mut Vm, object: &Rc<T>) -> ScriptResult<Value> {
    if let Some(handle) = object.bridge_cache().get(vm.id()) {
        let cached = Value::Object(handle);
        let same = vm
            .userdata::<Rc<T>>(&cached)
            .is_some_and(|held| Rc::ptr_eq(held, object));
        if same {
            return Ok(cached);
        }
    }

    let class = descriptor::type_handle::<T>(vm).map_err(ScriptError::from)?;
    let value = vm
        .new_instance(class, Some(Box::new(Rc::clone(object))))
        .map_err(|e| e.into_script_error())?;
    if let Some(handle) = value.as_object() {
        object.bridge_cache().set(vm.id(), handle);
        tracing::trace!(type_name = T::TYPE_NAME, handle = handle.index(), "exposed bridged object");
    }
    Ok(value)
}

/// Host object behind a script value, without taking the heap's share
pub fn materialize<T: Bridged>(vm: &Vm, value: &Value) -> Option<Rc<T>> {
    vm.userdata::<Rc<T>>(value).cloned()
}

/// Read extra slot `index` of a bridged instance
pub fn slot(vm: &Vm, value: &Value, index: usize) -> Option<Value> {
    vm.instance_slot(value, index)
}

/// Write extra slot `index` of a bridged instance
pub fn set_slot(vm: &mut Vm, value: &Value, index: usize, slot_value: Value) -> ScriptResult<()> {
    vm.set_instance_slot(value, index, slot_value)
        .map_err(|e| e.into_script_error())
}

impl<T: Bridged> ScriptType for Rc<T> {
    fn type_name() -> String {
        T::TYPE_NAME.to_string()
    }
}

impl<T: Bridged> IntoScript for Rc<T> {
    fn into_script(self, vm: &mut Vm) -> ScriptResult<Value> {
        expose(vm, &self)
    }
}

impl<T: Bridged> FromScript for Rc<T> {
    fn from_script(vm: &mut Vm, value: &Value) -> Option<Self> {
        materialize(vm, value)
    }
}
