//! Call protocol
//!
//! Turns a host closure plus its signature string into a native entry
//! point. The entry point checks the argument count, fills trailing
//! defaults, converts every argument before the closure runs, converts the
//! result back and translates host errors into script exceptions.
//!
//! Closures take their parameters by value and return a [`HostResult`]:
//!
//! ```
//! use bridge::{call, HostResult};
//! use interpreter::{Value, Vm};
//!
//! let mut vm = Vm::new();
//! let add = call::function(&mut vm, "demo", "add(a: int, b: int = 1) -> int", |a: i64, b: i64| -> HostResult<i64> {
//!     Ok(a + b)
//! })
//! .unwrap();
//! assert_eq!(vm.call(&add.value, &[Value::Int(41)]).unwrap(), Value::Int(42));
//! ```

use std::rc::Rc;

use core_types::{ErrorKind, ScriptError};
use interpreter::{CallFrame, NativeFn, Object, Value, Vm, VmError, VmResult};

use crate::codec::{FromScript, IntoScript, ScriptType};
use crate::error::{BridgeError, BridgeResult, HostError, HostResult};
use crate::object::{materialize, Bridged};
use crate::signature::{normalize, Signature};

/// Why a call produced no value
#[derive(Debug)]
pub enum CallError {
    /// Argument `position` did not convert to `expected`
    Argument {
        /// 0-based position, receiver excluded
        position: usize,
        /// Annotation of the declared parameter
        expected: String,
    },
    /// The host closure or the result conversion failed
    Host(HostError),
}

fn convert<A: FromScript>(vm: &mut Vm, args: &[Value], position: usize) -> Result<A, CallError> {
    args.get(position)
        .and_then(|value| A::from_script(vm, value))
        .ok_or_else(|| CallError::Argument {
            position,
            expected: A::type_name(),
        })
}

fn finish<R: IntoScript>(vm: &mut Vm, result: HostResult<R>) -> Result<Value, CallError> {
    let value = result.map_err(CallError::Host)?;
    value
        .into_script(vm)
        .map_err(|e| CallError::Host(HostError::from(e)))
}

/// Host closure callable without a receiver
///
/// Implemented for `Fn(A1, .., An) -> HostResult<R>` with up to six
/// parameters.
pub trait HostFn<Args>: 'static {
    /// Converted return type
    type Output: IntoScript;

    /// Annotations of the parameters
    fn param_types() -> Vec<String>
    where
        Self: Sized;

    /// Whether `value` converts to the parameter at `position`
    fn accepts(vm: &mut Vm, position: usize, value: &Value) -> bool
    where
        Self: Sized;

    /// Convert `args` and run the closure
    fn invoke(&self, vm: &mut Vm, args: &[Value]) -> Result<Value, CallError>;
}

/// Host closure taking a `&T` receiver
///
/// Implemented for `Fn(&T, A1, .., An) -> HostResult<R>` with up to six
/// parameters after the receiver.
pub trait HostMethod<T, Args>: 'static {
    /// Converted return type
    type Output: IntoScript;

    /// Annotations of the parameters after the receiver
    fn param_types() -> Vec<String>
    where
        Self: Sized;

    /// Whether `value` converts to the parameter at `position`
    fn accepts(vm: &mut Vm, position: usize, value: &Value) -> bool
    where
        Self: Sized;

    /// Convert `args` and run the closure on `receiver`
    fn invoke(&self, vm: &mut Vm, receiver: &T, args: &[Value]) -> Result<Value, CallError>;
}

macro_rules! host_callables {
    ($($arg:ident $idx:tt),*) => {
        impl<F, R, $($arg,)*> HostFn<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> HostResult<R> + 'static,
            R: IntoScript,
            $($arg: FromScript,)*
        {
            type Output = R;

            fn param_types() -> Vec<String> {
                vec![$(<$arg as ScriptType>::type_name()),*]
            }

            #[allow(unused_variables)]
            fn accepts(vm: &mut Vm, position: usize, value: &Value) -> bool {
                match position {
                    $($idx => <$arg as FromScript>::from_script(vm, value).is_some(),)*
                    _ => false,
                }
            }

            #[allow(unused_variables)]
            fn invoke(&self, vm: &mut Vm, args: &[Value]) -> Result<Value, CallError> {
                let result = (self)($(convert::<$arg>(vm, args, $idx)?),*);
                finish(vm, result)
            }
        }

        impl<F, T, R, $($arg,)*> HostMethod<T, ($($arg,)*)> for F
        where
            F: Fn(&T, $($arg),*) -> HostResult<R> + 'static,
            T: 'static,
            R: IntoScript,
            $($arg: FromScript,)*
        {
            type Output = R;

            fn param_types() -> Vec<String> {
                vec![$(<$arg as ScriptType>::type_name()),*]
            }

            #[allow(unused_variables)]
            fn accepts(vm: &mut Vm, position: usize, value: &Value) -> bool {
                match position {
                    $($idx => <$arg as FromScript>::from_script(vm, value).is_some(),)*
                    _ => false,
                }
            }

            #[allow(unused_variables)]
            fn invoke(&self, vm: &mut Vm, receiver: &T, args: &[Value]) -> Result<Value, CallError> {
                let result = (self)(receiver, $(convert::<$arg>(vm, args, $idx)?),*);
                finish(vm, result)
            }
        }
    };
}

host_callables!();
host_callables!(A0 0);
host_callables!(A0 0, A1 1);
host_callables!(A0 0, A1 1, A2 2);
host_callables!(A0 0, A1 1, A2 2, A3 3);
host_callables!(A0 0, A1 1, A2 2, A3 3, A4 4);
host_callables!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5);

/// How an entry point reports conversion failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    Function,
    Method,
    Setter,
}

/// Arity rules for one bound operation
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    name: Rc<str>,
    owner: Rc<str>,
    arity: usize,
    min_arity: usize,
    defaults: Vec<Value>,
    kind: EntryKind,
}

impl Binding {
    /// Check `signature` against the closure's parameter and return types
    ///
    /// `accepts` tells whether a default converts to its parameter.
    pub(crate) fn new(
        vm: &mut Vm,
        owner: &str,
        signature: &Signature,
        kind: EntryKind,
        param_types: &[String],
        return_type: Option<String>,
        accepts: fn(&mut Vm, usize, &Value) -> bool,
    ) -> BridgeResult<Binding> {
        let fail = |reason: String| BridgeError::registration(owner, &signature.name, reason);

        if signature.params.len() != param_types.len() {
            return Err(fail(format!(
                "signature declares {} parameters but the host function takes {}",
                signature.params.len(),
                param_types.len()
            )));
        }
        for (position, (param, host_type)) in signature.params.iter().zip(param_types).enumerate() {
            if let Some(annotation) = &param.annotation {
                if *annotation != normalize(host_type) {
                    return Err(fail(format!(
                        "parameter '{}' is annotated '{}' but the host function takes '{}'",
                        param.name, annotation, host_type
                    )));
                }
            }
            if let Some(default) = &param.default {
                if !accepts(vm, position, &default.to_value()) {
                    return Err(fail(format!(
                        "default {} of parameter '{}' is not a valid '{}'",
                        default, param.name, host_type
                    )));
                }
            }
        }
        if let (Some(annotation), Some(host_type)) = (&signature.returns, return_type) {
            if *annotation != normalize(&host_type) {
                return Err(fail(format!(
                    "return is annotated '{}' but the host function returns '{}'",
                    annotation, host_type
                )));
            }
        }

        Ok(Binding {
            name: Rc::from(signature.name.as_str()),
            owner: Rc::from(owner),
            arity: signature.params.len(),
            min_arity: signature.min_arity(),
            defaults: signature.defaults(),
            kind,
        })
    }

    /// Positional arguments with missing trailing defaults filled in
    fn arguments(&self, vm: &Vm, frame: CallFrame) -> VmResult<Vec<Value>> {
        let given = frame.argc;
        if given > self.arity || given < self.min_arity {
            return Err(self.arity_error(given));
        }
        let mut args = frame.args(vm);
        let skip = given - self.min_arity;
        args.extend(self.defaults.iter().skip(skip).cloned());
        Ok(args)
    }

    fn arity_error(&self, given: usize) -> VmError {
        let message = if self.min_arity == self.arity {
            format!("{}() expected {} arguments, got {}", self.name, self.arity, given)
        } else if given < self.min_arity {
            format!("{}() expected at least {} arguments, got {}", self.name, self.min_arity, given)
        } else {
            format!("{}() expected at most {} arguments, got {}", self.name, self.arity, given)
        };
        ScriptError::type_error(message).into()
    }

    fn failure(&self, vm: &Vm, args: &[Value], error: CallError) -> VmError {
        match error {
            CallError::Argument { position, expected } => {
                let actual = args
                    .get(position)
                    .map(|v| vm.type_name(v))
                    .unwrap_or_else(|| "nothing".to_string());
                let message = match self.kind {
                    EntryKind::Setter => format!("Expected {} at position 1", expected),
                    EntryKind::Function | EntryKind::Method => format!(
                        "{}() expected {} at position {}, got {}",
                        self.name, expected, position, actual
                    ),
                };
                ScriptError::type_error(message).into()
            }
            CallError::Host(e) => {
                tracing::debug!(owner = %self.owner, operation = %self.name, error = %e, "host call failed");
                e.into_vm_error()
            }
        }
    }

    fn receiver<T: Bridged>(&self, vm: &Vm, frame: CallFrame) -> VmResult<Rc<T>> {
        if frame.argc == 0 {
            return Err(VmError::new(ErrorKind::ValueError, "Expected more arguments, got 0"));
        }
        let receiver = frame.arg(vm, 0).unwrap_or(Value::None);
        materialize::<T>(vm, &receiver).ok_or_else(|| {
            ScriptError::type_error(format!(
                "descriptor '{}' for '{}' objects doesn't apply to a '{}' object",
                self.name,
                T::TYPE_NAME,
                vm.type_name(&receiver)
            ))
            .into()
        })
    }
}

pub(crate) fn function_entry<Args, F: HostFn<Args>>(binding: Binding, f: F) -> NativeFn {
    Rc::new(move |vm: &mut Vm, frame: CallFrame| {
        let args = binding.arguments(vm, frame)?;
        match f.invoke(vm, &args) {
            Ok(value) => Ok(value),
            Err(e) => Err(binding.failure(vm, &args, e)),
        }
    })
}

pub(crate) fn method_entry<T: Bridged, Args, F: HostMethod<T, Args>>(binding: Binding, f: F) -> NativeFn {
    Rc::new(move |vm: &mut Vm, frame: CallFrame| {
        let this = binding.receiver::<T>(vm, frame)?;
        let args = binding.arguments(vm, frame.shift())?;
        match f.invoke(vm, &this, &args) {
            Ok(value) => Ok(value),
            Err(e) => Err(binding.failure(vm, &args, e)),
        }
    })
}

/// A bound callable and its parsed signature
#[derive(Debug, Clone)]
pub struct Bound {
    /// The script callable
    pub value: Value,
    /// Declared signature
    pub signature: Signature,
    /// `def ...` interface text
    pub interface: String,
}

/// Allocate a native function and attach its introspection attributes
pub(crate) fn allocate(
    vm: &mut Vm,
    func: NativeFn,
    signature: &Signature,
    interface: &str,
) -> Value {
    let value = vm.new_native(&signature.name, move |vm, frame| func(vm, frame));
    if let Some(attrs) = value.as_object().and_then(|h| vm.attrs_mut(h)) {
        attrs.insert(Rc::from("_signature"), Value::str(signature.to_string()));
        attrs.insert(Rc::from("_interface"), Value::str(interface));
        if let Some(doc) = &signature.doc {
            attrs.insert(Rc::from("__doc__"), Value::str(doc));
        }
    }
    value
}

pub(crate) fn parse(owner: &str, text: &str) -> BridgeResult<Signature> {
    Signature::parse(text).map_err(|e| {
        let operation = text.split('(').next().unwrap_or(text).trim().to_string();
        BridgeError::registration(owner, operation, e.to_string())
    })
}

/// Bind a free or static function declared by `signature`
///
/// `owner` names the module or type in registration errors.
pub fn function<Args, F: HostFn<Args>>(
    vm: &mut Vm,
    owner: &str,
    signature: &str,
    f: F,
) -> BridgeResult<Bound> {
    let signature = parse(owner, signature)?;
    let binding = Binding::new(
        vm,
        owner,
        &signature,
        EntryKind::Function,
        &<F as HostFn<Args>>::param_types(),
        Some(<F::Output as ScriptType>::type_name()),
        <F as HostFn<Args>>::accepts,
    )?;
    let interface = signature.interface(false);
    let value = allocate(vm, function_entry(binding, f), &signature, &interface);
    tracing::debug!(owner, name = %signature.name, "bound host function");
    Ok(Bound {
        value,
        signature,
        interface,
    })
}

/// Bind a method of `T` declared by `signature`
pub fn method<T: Bridged, Args, F: HostMethod<T, Args>>(
    vm: &mut Vm,
    signature: &str,
    f: F,
) -> BridgeResult<Bound> {
    let signature = parse(T::TYPE_NAME, signature)?;
    let binding = Binding::new(
        vm,
        T::TYPE_NAME,
        &signature,
        EntryKind::Method,
        &<F as HostMethod<T, Args>>::param_types(),
        Some(<F::Output as ScriptType>::type_name()),
        <F as HostMethod<T, Args>>::accepts,
    )?;
    let interface = signature.interface(true);
    let value = allocate(vm, method_entry(binding, f), &signature, &interface);
    tracing::debug!(owner = T::TYPE_NAME, name = %signature.name, "bound host method");
    Ok(Bound {
        value,
        signature,
        interface,
    })
}

/// Whether `value` is a native function created by this module
pub fn is_bound(vm: &Vm, value: &Value) -> bool {
    match value.as_object().and_then(|h| vm.object(h)) {
        Some(Object::Native(native)) => native.attrs.contains_key("_signature"),
        _ => false,
    }
}
