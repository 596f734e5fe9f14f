//! Type descriptors
//!
//! A [`TypeDescriptor`] is created the first time a host type is
//! registered with a VM and cached in the VM's [`TypeRegistry`]. Building
//! it runs [`Bridged::describe`] against a [`TypeBuilder`]; every
//! signature is checked while the builder runs, so a bad declaration fails
//! before the type object becomes reachable from scripts.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::rc::Rc;

use interpreter::{
    NativeFn, Namespace, ObjRef, Object, Pinned, Property, TypeKind, TypeObject, Value, Vm,
};

use crate::call::{self, Binding, EntryKind, HostFn, HostMethod};
use crate::codec::{IntoScript, ScriptType};
use crate::error::{BridgeError, BridgeResult};
use crate::object::{finalizer, initializer, Bridged};
use crate::signature::{Param, Signature};

/// What kind of member an operation is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Runs when the type object is called
    Constructor,
    /// Bound to the receiver
    Method,
    /// Called without a receiver
    StaticMethod,
    /// Read-only computed attribute
    Property,
    /// Computed attribute with a setter
    MutableProperty,
    /// Plain class attribute
    Attribute,
}

/// One member of a registered type
#[derive(Debug, Clone)]
pub struct Operation {
    /// Member name
    pub name: String,
    /// Member kind
    pub kind: OperationKind,
    /// Declared signature, rendered
    pub signature: String,
}

/// Everything a VM knows about one registered host type
#[derive(Debug)]
pub struct TypeDescriptor {
    /// Script type name
    pub name: String,
    /// Host type
    pub type_id: TypeId,
    /// Type object
    pub handle: ObjRef,
    /// Name of the base type, if bridged
    pub base: Option<String>,
    /// Owning module name
    pub module: Option<String>,
    /// `class` interface text
    pub interface: String,
    /// Members in declaration order
    pub operations: Vec<Operation>,
    pin: Pinned,
}

impl TypeDescriptor {
    /// The type object as a value
    pub fn value(&self) -> Value {
        self.pin.value().clone()
    }

    /// Look up a member by name
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }
}

/// Registered host types of one VM, keyed by `TypeId`
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<TypeId, Rc<TypeDescriptor>>,
    pending: HashSet<TypeId>,
}

impl TypeRegistry {
    /// Descriptor of a registered type
    pub fn get(&self, type_id: TypeId) -> Option<Rc<TypeDescriptor>> {
        self.types.get(&type_id).cloned()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Script names of all registered types, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.values().map(|d| d.name.clone()).collect();
        names.sort();
        names
    }
}

fn with_registry<R>(vm: &mut Vm, f: impl FnOnce(&mut TypeRegistry) -> R) -> R {
    if let Some(registry) = vm.extension_mut::<TypeRegistry>() {
        return f(registry);
    }
    let mut registry = TypeRegistry::default();
    let result = f(&mut registry);
    vm.set_extension(registry);
    result
}

/// Collects the members of `T` while [`Bridged::describe`] runs
pub struct TypeBuilder<'vm, T: Bridged> {
    vm: &'vm mut Vm,
    attrs: Namespace,
    doc: Option<String>,
    module: Option<String>,
    base: Option<(String, ObjRef)>,
    slots: usize,
    has_dict: bool,
    constructor: Option<NativeFn>,
    operations: Vec<Operation>,
    members: Vec<String>,
    _type: PhantomData<fn() -> T>,
}

impl<'vm, T: Bridged> TypeBuilder<'vm, T> {
    fn new(vm: &'vm mut Vm) -> Self {
        Self {
            vm,
            attrs: Namespace::new(),
            doc: None,
            module: None,
            base: None,
            slots: 0,
            has_dict: false,
            constructor: None,
            operations: Vec::new(),
            members: Vec::new(),
            _type: PhantomData,
        }
    }

    /// The VM the type is being registered with
    pub fn vm(&mut self) -> &mut Vm {
        self.vm
    }

    /// Class docstring
    pub fn doc(&mut self, doc: &str) -> &mut Self {
        self.doc = Some(doc.to_string());
        self
    }

    /// Name of the owning module
    pub fn module(&mut self, name: &str) -> &mut Self {
        self.module = Some(name.to_string());
        self
    }

    /// Inherit from another bridged type, registering it if needed
    pub fn base<B: Bridged>(&mut self) -> BridgeResult<&mut Self> {
        let base = register::<B>(self.vm)?;
        self.base = Some((base.name.clone(), base.handle));
        Ok(self)
    }

    /// Extra value slots per instance
    pub fn slots(&mut self, count: usize) -> &mut Self {
        self.slots = count;
        self
    }

    /// Let scripts set arbitrary attributes on instances
    pub fn dynamic_attrs(&mut self) -> &mut Self {
        self.has_dict = true;
        self
    }

    fn record(&mut self, name: &str, kind: OperationKind, signature: String, interface: String) {
        self.operations.push(Operation {
            name: name.to_string(),
            kind,
            signature,
        });
        self.members.push(interface);
    }

    /// Called when scripts call the type object
    ///
    /// The signature names the type, e.g. `Counter(start: int = 0)`.
    pub fn constructor<Args, F>(&mut self, signature: &str, f: F) -> BridgeResult<&mut Self>
    where
        F: HostFn<Args, Output = Rc<T>>,
    {
        let signature = call::parse(T::TYPE_NAME, signature)?;
        let binding = Binding::new(
            self.vm,
            T::TYPE_NAME,
            &signature,
            EntryKind::Function,
            &<F as HostFn<Args>>::param_types(),
            Some(<F::Output as ScriptType>::type_name()),
            <F as HostFn<Args>>::accepts,
        )?;
        let constructor = call::function_entry(binding, f);
        let init = initializer::<T>(Rc::clone(&constructor));
        let init = self.vm.new_native("__init__", move |vm, frame| init(vm, frame));
        self.attrs.insert(Rc::from("__init__"), init);
        self.constructor = Some(constructor);

        let init = Signature {
            name: "__init__".to_string(),
            returns: None,
            ..signature.clone()
        };
        self.record(
            &signature.name,
            OperationKind::Constructor,
            signature.to_string(),
            init.interface(true),
        );
        Ok(self)
    }

    /// Method taking the receiver as `&T`
    pub fn method<Args, F>(&mut self, signature: &str, f: F) -> BridgeResult<&mut Self>
    where
        F: HostMethod<T, Args>,
    {
        let bound = call::method::<T, Args, F>(self.vm, signature, f)?;
        let name = bound.signature.name.clone();
        self.attrs.insert(Rc::from(name.as_str()), bound.value);
        self.record(
            &name,
            OperationKind::Method,
            bound.signature.to_string(),
            bound.interface,
        );
        Ok(self)
    }

    /// Function reachable through the type without a receiver
    pub fn static_method<Args, F>(&mut self, signature: &str, f: F) -> BridgeResult<&mut Self>
    where
        F: HostFn<Args>,
    {
        let bound = call::function(self.vm, T::TYPE_NAME, signature, f)?;
        let name = bound.signature.name.clone();
        let wrapper = self.vm.alloc(Object::StaticMethod(bound.value));
        self.attrs.insert(Rc::from(name.as_str()), Value::Object(wrapper));
        self.record(
            &name,
            OperationKind::StaticMethod,
            bound.signature.to_string(),
            format!("@staticmethod\n{}", bound.interface),
        );
        Ok(self)
    }

    fn getter<F>(&mut self, signature: &str, f: F) -> BridgeResult<(Signature, Value)>
    where
        F: HostMethod<T, ()>,
    {
        let signature = Signature::parse_property(signature).map_err(|e| {
            let name = signature.split("->").next().unwrap_or(signature).trim();
            BridgeError::registration(T::TYPE_NAME, name, e.to_string())
        })?;
        let binding = Binding::new(
            self.vm,
            T::TYPE_NAME,
            &signature,
            EntryKind::Method,
            &[],
            Some(<F::Output as ScriptType>::type_name()),
            <F as HostMethod<T, ()>>::accepts,
        )?;
        let interface = signature.interface(true);
        let getter = call::allocate(self.vm, call::method_entry(binding, f), &signature, &interface);
        Ok((signature, getter))
    }

    fn install_property(&mut self, name: &str, property: Property) {
        let handle = self.vm.alloc(Object::Property(property));
        self.attrs.insert(Rc::from(name), Value::Object(handle));
    }

    /// Read-only computed attribute declared as `name -> Type`
    pub fn property<F>(&mut self, signature: &str, getter: F) -> BridgeResult<&mut Self>
    where
        F: HostMethod<T, ()>,
    {
        let (signature, getter) = self.getter(signature, getter)?;
        self.install_property(
            &signature.name,
            Property {
                getter: Some(getter),
                setter: None,
                doc: signature.doc.clone(),
            },
        );
        self.record(
            &signature.name,
            OperationKind::Property,
            signature.to_string(),
            format!("@property\n{}", signature.interface(true)),
        );
        Ok(self)
    }

    /// Computed attribute with a setter taking one value of the property type
    pub fn property_mut<G, A, S>(&mut self, signature: &str, getter: G, setter: S) -> BridgeResult<&mut Self>
    where
        G: HostMethod<T, ()>,
        S: HostMethod<T, (A,), Output = ()>,
    {
        let (signature, getter) = self.getter(signature, getter)?;
        let setter_signature = Signature {
            name: signature.name.clone(),
            params: vec![Param {
                name: "value".to_string(),
                annotation: signature.returns.clone(),
                default: None,
            }],
            returns: None,
            doc: None,
        };
        let binding = Binding::new(
            self.vm,
            T::TYPE_NAME,
            &setter_signature,
            EntryKind::Setter,
            &<S as HostMethod<T, (A,)>>::param_types(),
            None,
            <S as HostMethod<T, (A,)>>::accepts,
        )?;
        let setter_interface = setter_signature.interface(true);
        let setter = call::allocate(
            self.vm,
            call::method_entry(binding, setter),
            &setter_signature,
            &setter_interface,
        );
        self.install_property(
            &signature.name,
            Property {
                getter: Some(getter),
                setter: Some(setter),
                doc: signature.doc.clone(),
            },
        );
        self.record(
            &signature.name,
            OperationKind::MutableProperty,
            signature.to_string(),
            format!(
                "@property\n{}\n@{}.setter\n{}",
                signature.interface(true),
                signature.name,
                setter_interface
            ),
        );
        Ok(self)
    }

    /// Plain class attribute
    pub fn value<V: IntoScript>(&mut self, name: &str, value: V) -> BridgeResult<&mut Self> {
        let value = value.into_script(self.vm)?;
        self.attrs.insert(Rc::from(name), value);
        let type_name = V::type_name();
        self.record(
            name,
            OperationKind::Attribute,
            type_name.clone(),
            format!("{}: {}", name, type_name),
        );
        Ok(self)
    }

    fn interface(&self) -> String {
        let mut text = match &self.base {
            Some((base, _)) => format!("class {}({}):", T::TYPE_NAME, base),
            None => format!("class {}:", T::TYPE_NAME),
        };
        if let Some(doc) = &self.doc {
            text.push_str(&format!("\n    \"\"\"{}\"\"\"", doc.replace('\n', "\n    ")));
        }
        if self.members.is_empty() && self.doc.is_none() {
            text.push_str(" ...");
        }
        for member in &self.members {
            text.push('\n');
            text.push_str("    ");
            text.push_str(&member.replace('\n', "\n    "));
        }
        text
    }

    fn finish(self) -> TypeDescriptor {
        let interface = self.interface();
        let mut attrs = self.attrs;
        attrs.insert(Rc::from("_interface"), Value::str(&interface));
        if let Some(doc) = &self.doc {
            attrs.insert(Rc::from("__doc__"), Value::str(doc));
        }

        let mut ty = TypeObject::new(T::TYPE_NAME, TypeKind::Host);
        ty.module = self.module.as_deref().map(Rc::from);
        ty.base = self.base.as_ref().map(|(_, handle)| *handle);
        ty.attrs = attrs;
        ty.constructor = self.constructor;
        ty.finalizer = Some(finalizer::<T>(self.vm.id()));
        ty.slots = self.slots;
        ty.has_dict = self.has_dict;

        let handle = self.vm.new_type(ty);
        let pin = self.vm.pin(Value::Object(handle));
        TypeDescriptor {
            name: T::TYPE_NAME.to_string(),
            type_id: TypeId::of::<T>(),
            handle,
            base: self.base.map(|(name, _)| name),
            module: self.module,
            interface,
            operations: self.operations,
            pin,
        }
    }
}

/// Register `T` with `vm`, or return the existing descriptor
pub fn register<T: Bridged>(vm: &mut Vm) -> BridgeResult<Rc<TypeDescriptor>> {
    let type_id = TypeId::of::<T>();
    if let Some(existing) = descriptor::<T>(vm) {
        return Ok(existing);
    }
    if !with_registry(vm, |registry| registry.pending.insert(type_id)) {
        return Err(BridgeError::registration(
            T::TYPE_NAME,
            "describe",
            "type is already being registered",
        ));
    }

    let mut builder = TypeBuilder::<T>::new(vm);
    let described = T::describe(&mut builder);
    let result = described.map(|()| builder.finish());

    with_registry(vm, |registry| registry.pending.remove(&type_id));
    let descriptor = Rc::new(result?);
    with_registry(vm, |registry| registry.types.insert(type_id, Rc::clone(&descriptor)));
    tracing::debug!(
        type_name = %descriptor.name,
        operations = descriptor.operations.len(),
        "registered host type"
    );
    Ok(descriptor)
}

/// Register `T` and bind its type object as a global of `module`
pub fn register_in<T: Bridged>(vm: &mut Vm, module: ObjRef) -> BridgeResult<Rc<TypeDescriptor>> {
    let descriptor = register::<T>(vm)?;
    vm.set_global(module, &descriptor.name, descriptor.value());
    Ok(descriptor)
}

/// Descriptor of `T` if it is registered with `vm`
pub fn descriptor<T: Bridged>(vm: &Vm) -> Option<Rc<TypeDescriptor>> {
    vm.extension::<TypeRegistry>()?.get(TypeId::of::<T>())
}

/// Type object of `T`, registering it if needed
pub fn type_handle<T: Bridged>(vm: &mut Vm) -> BridgeResult<ObjRef> {
    register::<T>(vm).map(|d| d.handle)
}
