//! Attribute and item access

use core_types::{ErrorKind, ScriptError};

use crate::error::{VmError, VmResult};
use crate::object::*;
use crate::value::Value;
use crate::vm::Vm;

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let resolved = if index < 0 {
        index.checked_add(len as i64)?
    } else {
        index
    };
    if resolved >= 0 && (resolved as usize) < len {
        Some(resolved as usize)
    } else {
        None
    }
}

fn int_index(value: &Value) -> Option<i64> {
    match value {
        Value::Int(n) => Some(*n),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

impl Vm {
    fn index_type_error(&self, container: &str, index: &Value) -> VmError {
        ScriptError::type_error(format!(
            "{} indices must be integers or slices, not {}",
            container,
            self.type_name(index)
        ))
        .into()
    }

    fn key_error(&mut self, key: &Value) -> VmError {
        let text = self.repr(key).unwrap_or_else(|_| self.repr_lossy(key));
        VmError::new(ErrorKind::KeyError, text)
    }

    fn missing_attr(&self, object: &Value, name: &str) -> VmError {
        ScriptError::attribute_error(&self.type_name(object), name).into()
    }

    /// Resolve a type attribute found for `receiver`: properties are read,
    /// functions are bound, static methods are unwrapped
    fn bind_type_attr(&mut self, receiver: &Value, attr: Value) -> VmResult<Value> {
        enum Kind {
            Property(Option<Value>),
            Static(Value),
            Callable,
            Plain,
        }
        let kind = match attr.as_object().and_then(|h| self.object(h)) {
            Some(Object::Property(p)) => Kind::Property(p.getter.clone()),
            Some(Object::StaticMethod(v)) => Kind::Static(v.clone()),
            Some(Object::Function(_)) | Some(Object::Native(_)) => Kind::Callable,
            _ => Kind::Plain,
        };
        match kind {
            Kind::Property(Some(getter)) => self.call(&getter, &[receiver.clone()]),
            Kind::Property(None) => Err(VmError::new(ErrorKind::AttributeError, "unreadable attribute")),
            Kind::Static(v) => Ok(v),
            Kind::Callable => Ok(self.bind_method(receiver.clone(), attr)),
            Kind::Plain => Ok(attr),
        }
    }

    fn type_property(&self, ty: memory_manager::ObjRef, name: &str) -> Option<Property> {
        let attr = self.lookup_type_attr(ty, name)?;
        match self.object(attr.as_object()?)? {
            Object::Property(p) => Some(p.clone()),
            _ => None,
        }
    }

    /// `object.name`
    pub fn get_attr(&mut self, object: &Value, name: &str) -> VmResult<Value> {
        if let Value::Object(handle) = object {
            let handle = *handle;
            match self.get_object(handle)? {
                Object::Module(m) => {
                    return match m.namespace.get(name) {
                        Some(v) => Ok(v.clone()),
                        None => Err(VmError::new(
                            ErrorKind::AttributeError,
                            format!("module '{}' has no attribute '{}'", m.name, name),
                        )),
                    }
                }
                Object::Type(t) => {
                    let type_name = t.name.clone();
                    return match self.lookup_type_attr(handle, name) {
                        Some(attr) => match attr.as_object().and_then(|h| self.object(h)) {
                            Some(Object::StaticMethod(v)) => Ok(v.clone()),
                            _ => Ok(attr),
                        },
                        None => Err(VmError::new(
                            ErrorKind::AttributeError,
                            format!("type object '{}' has no attribute '{}'", type_name, name),
                        )),
                    };
                }
                Object::Function(f) => {
                    if let Some(v) = f.attrs.get(name) {
                        return Ok(v.clone());
                    }
                }
                Object::Native(f) => {
                    if let Some(v) = f.attrs.get(name) {
                        return Ok(v.clone());
                    }
                }
                Object::Exception(e) => match name {
                    "value" => return Ok(e.value.clone()),
                    "args" => {
                        let args = if e.error.message.is_empty() {
                            Vec::new()
                        } else {
                            vec![Value::str(&e.error.message)]
                        };
                        return Ok(self.new_list(args));
                    }
                    _ => {}
                },
                Object::Instance(_) => return self.instance_attr(object, handle, name),
                _ => {}
            }
        }

        let ty = self.type_of(object);
        match self.lookup_type_attr(ty, name) {
            Some(attr) => self.bind_type_attr(object, attr),
            None => Err(self.missing_attr(object, name)),
        }
    }

    fn instance_attr(
        &mut self,
        object: &Value,
        handle: memory_manager::ObjRef,
        name: &str,
    ) -> VmResult<Value> {
        let ty = self.type_of(object);
        if let Some(property) = self.type_property(ty, name) {
            return match property.getter {
                Some(getter) => self.call(&getter, &[object.clone()]),
                None => Err(VmError::new(ErrorKind::AttributeError, "unreadable attribute")),
            };
        }
        if let Some(Object::Instance(inst)) = self.object(handle) {
            if let Some(value) = inst.attrs.get(name) {
                return Ok(value.clone());
            }
        }
        match self.lookup_type_attr(ty, name) {
            Some(attr) => self.bind_type_attr(object, attr),
            None => Err(self.missing_attr(object, name)),
        }
    }

    /// `super().name` in a method of `owner` running on `receiver`
    ///
    /// Lookup starts at the owner's base. `object` contributes an `__init__`
    /// that accepts no arguments.
    pub(crate) fn super_attr(
        &mut self,
        owner: Option<memory_manager::ObjRef>,
        receiver: Option<Value>,
        name: &str,
    ) -> VmResult<Value> {
        let (Some(owner), Some(receiver)) = (owner, receiver) else {
            return Err(VmError::new(
                ErrorKind::RuntimeError,
                "super(): no enclosing class or receiver",
            ));
        };
        if !self.isinstance(&receiver, owner) {
            return Err(ScriptError::type_error("super(type, obj): obj must be an instance of type").into());
        }
        let base = self.type_object(owner).and_then(|t| t.base);
        match base.and_then(|b| self.lookup_type_attr(b, name)) {
            Some(attr) => self.bind_type_attr(&receiver, attr),
            None if name == "__init__" => {
                let init = self.new_native("__init__", |_, frame| {
                    frame.expect("__init__", 1, 1)?;
                    Ok(Value::None)
                });
                Ok(self.bind_method(receiver, init))
            }
            None => Err(VmError::new(
                ErrorKind::AttributeError,
                format!("'super' object has no attribute '{}'", name),
            )),
        }
    }

    /// `object.name = value`
    pub fn set_attr(&mut self, object: &Value, name: &str, value: Value) -> VmResult<()> {
        let Value::Object(handle) = object else {
            return Err(self.missing_attr(object, name));
        };
        let handle = *handle;
        match self.get_object(handle)? {
            Object::Instance(inst) => {
                let ty = inst.class;
                if let Some(property) = self.type_property(ty, name) {
                    return match property.setter {
                        Some(setter) => self.call(&setter, &[object.clone(), value]).map(|_| ()),
                        None => Err(VmError::new(
                            ErrorKind::AttributeError,
                            format!("can't set attribute '{}'", name),
                        )),
                    };
                }
                let has_dict = self.type_object(ty).map(|t| t.has_dict).unwrap_or(false);
                if !has_dict {
                    return Err(self.missing_attr(object, name));
                }
            }
            Object::Module(_) | Object::Function(_) | Object::Native(_) | Object::Type(_) => {}
            _ => return Err(self.missing_attr(object, name)),
        }
        match self.attrs_mut(handle) {
            Some(attrs) => {
                attrs.insert(name.into(), value);
                Ok(())
            }
            None => Err(self.missing_attr(object, name)),
        }
    }

    /// `del object.name`
    pub fn del_attr(&mut self, object: &Value, name: &str) -> VmResult<()> {
        let removed = object
            .as_object()
            .and_then(|h| self.attrs_mut(h))
            .and_then(|attrs| attrs.remove(name));
        match removed {
            Some(_) => Ok(()),
            None => Err(self.missing_attr(object, name)),
        }
    }

    /// `hasattr(object, name)`; errors other than AttributeError propagate
    pub fn has_attr(&mut self, object: &Value, name: &str) -> VmResult<bool> {
        match self.get_attr(object, name) {
            Ok(_) => Ok(true),
            Err(VmError::Exception(e)) if e.kind == ErrorKind::AttributeError => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// `container[index]`
    pub fn get_item(&mut self, container: &Value, index: &Value) -> VmResult<Value> {
        match container {
            Value::Str(s) => {
                let i = int_index(index).ok_or_else(|| self.index_type_error("string", index))?;
                let len = s.chars().count();
                let at = normalize_index(i, len)
                    .ok_or_else(|| VmError::new(ErrorKind::IndexError, "string index out of range"))?;
                Ok(s.chars().nth(at).map(|c| Value::str(c.to_string())).unwrap_or(Value::None))
            }
            Value::Bytes(b) => {
                let i = int_index(index).ok_or_else(|| self.index_type_error("byte", index))?;
                let at = normalize_index(i, b.len())
                    .ok_or_else(|| VmError::new(ErrorKind::IndexError, "index out of range"))?;
                Ok(Value::Int(i64::from(b[at])))
            }
            Value::Object(handle) => match self.get_object(*handle)? {
                Object::List(items) => {
                    let i = int_index(index).ok_or_else(|| self.index_type_error("list", index))?;
                    normalize_index(i, items.len())
                        .map(|at| items[at].clone())
                        .ok_or_else(|| VmError::new(ErrorKind::IndexError, "list index out of range"))
                }
                Object::Dict(dict) => {
                    let key = self.hash_key(index)?;
                    match dict.get(&key) {
                        Some(v) => Ok(v.clone()),
                        None => Err(self.key_error(index)),
                    }
                }
                _ => self.item_dunder(container, "__getitem__", &[index.clone()], "is not subscriptable"),
            },
            _ => Err(self.not_supported(container, "is not subscriptable")),
        }
    }

    /// `container[index] = value`
    pub fn set_item(&mut self, container: &Value, index: &Value, value: Value) -> VmResult<()> {
        let Value::Object(handle) = container else {
            return Err(self.not_supported(container, "does not support item assignment"));
        };
        let handle = *handle;
        let key = match self.get_object(handle)? {
            Object::Dict(_) => Some(self.hash_key(index)?),
            _ => None,
        };
        let i = int_index(index);
        match self.get_object_mut(handle)? {
            Object::List(items) => {
                let Some(i) = i else {
                    return Err(self.index_type_error("list", index));
                };
                let len = items.len();
                match normalize_index(i, len) {
                    Some(at) => {
                        items[at] = value;
                        Ok(())
                    }
                    None => Err(VmError::new(
                        ErrorKind::IndexError,
                        "list assignment index out of range",
                    )),
                }
            }
            Object::Dict(dict) => {
                if let Some(key) = key {
                    dict.insert(key, index.clone(), value);
                }
                Ok(())
            }
            _ => self
                .item_dunder(
                    container,
                    "__setitem__",
                    &[index.clone(), value],
                    "does not support item assignment",
                )
                .map(|_| ()),
        }
    }

    /// `del container[index]`
    pub fn del_item(&mut self, container: &Value, index: &Value) -> VmResult<()> {
        let Value::Object(handle) = container else {
            return Err(self.not_supported(container, "doesn't support item deletion"));
        };
        let handle = *handle;
        let key = match self.get_object(handle)? {
            Object::Dict(_) => Some(self.hash_key(index)?),
            _ => None,
        };
        let i = int_index(index);
        let removed = match self.get_object_mut(handle)? {
            Object::List(items) => {
                let Some(i) = i else {
                    return Err(self.index_type_error("list", index));
                };
                match normalize_index(i, items.len()) {
                    Some(at) => {
                        items.remove(at);
                        true
                    }
                    None => {
                        return Err(VmError::new(
                            ErrorKind::IndexError,
                            "list assignment index out of range",
                        ))
                    }
                }
            }
            Object::Dict(dict) => key.map(|k| dict.remove(&k).is_some()).unwrap_or(false),
            _ => {
                return self
                    .item_dunder(
                        container,
                        "__delitem__",
                        &[index.clone()],
                        "doesn't support item deletion",
                    )
                    .map(|_| ())
            }
        };
        if removed {
            Ok(())
        } else {
            Err(self.key_error(index))
        }
    }

    /// `len(value)`
    pub fn len(&mut self, value: &Value) -> VmResult<usize> {
        match value {
            Value::Str(s) => Ok(s.chars().count()),
            Value::Bytes(b) => Ok(b.len()),
            Value::Object(handle) => match self.get_object(*handle)? {
                Object::List(items) => Ok(items.len()),
                Object::Dict(dict) => Ok(dict.len()),
                _ => {
                    let result = self.item_dunder(value, "__len__", &[], "has no len()")?;
                    match result {
                        Value::Int(n) if n >= 0 => Ok(n as usize),
                        _ => Err(ScriptError::type_error("__len__() should return a non-negative int").into()),
                    }
                }
            },
            _ => Err(ScriptError::type_error(format!(
                "object of type '{}' has no len()",
                self.type_name(value)
            ))
            .into()),
        }
    }

    fn not_supported(&self, value: &Value, what: &str) -> VmError {
        if what == "has no len()" {
            return ScriptError::type_error(format!(
                "object of type '{}' has no len()",
                self.type_name(value)
            ))
            .into();
        }
        ScriptError::type_error(format!("'{}' object {}", self.type_name(value), what)).into()
    }

    fn item_dunder(
        &mut self,
        receiver: &Value,
        method: &str,
        args: &[Value],
        missing: &str,
    ) -> VmResult<Value> {
        let is_instance = matches!(
            receiver.as_object().and_then(|h| self.object(h)),
            Some(Object::Instance(_))
        );
        let found = if is_instance {
            self.lookup_type_attr(self.type_of(receiver), method)
        } else {
            None
        };
        match found {
            Some(function) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(receiver.clone());
                full.extend(args.iter().cloned());
                self.call(&function, &full)
            }
            None => Err(self.not_supported(receiver, missing)),
        }
    }
}
