//! Dispatch loop for bytecode execution
//!
//! Runs frames from the shared frame stack until the entry frame returns or
//! yields, unwinding to `except` handlers on the way.

use std::rc::Rc;

use bytecode_system::{Constant, Opcode, UnaryOp};
use core_types::{ErrorKind, ScriptError};

use crate::context::{ExecutionContext, Handler};
use crate::error::{VmError, VmResult};
use crate::iteration::{GeneratorStep, IterStep};
use crate::object::*;
use crate::value::Value;
use crate::vm::{CallOutcome, Vm};

/// How the entry frame stopped
pub(crate) enum Exit {
    /// Returned a value
    Return(Value),
    /// Suspended at a `yield`; the frame is handed back to its generator
    Yield(Value, Box<ExecutionContext>),
}

impl Vm {
    /// Run until the frame at index `entry` returns or yields
    pub(crate) fn run_frames(&mut self, entry: usize) -> VmResult<Exit> {
        loop {
            match self.step(entry) {
                Ok(None) => {}
                Ok(Some(exit)) => return Ok(exit),
                Err(err) => self.unwind(entry, err)?,
            }
        }
    }

    /// Find a handler for `err`, popping frames down to `entry`
    ///
    /// Returns `Ok` once a handler is installed, or the error once the
    /// entry frame is gone.
    fn unwind(&mut self, entry: usize, mut err: VmError) -> VmResult<()> {
        while self.frames.len() > entry {
            let Some(frame) = self.frames.last_mut() else {
                break;
            };
            let recorded = std::mem::take(&mut frame.reraising);
            if let VmError::Exception(e) = &mut err {
                if !recorded {
                    e.push_frame(frame.stack_frame());
                }
            }

            if let Some(Handler { target, depth }) = frame.handlers.pop() {
                frame.instruction_pointer = target;
                let base = frame.stack_base + depth;
                self.stack.truncate(base);
                let exception = self.exception_value(err);
                if let Some(frame) = self.frames.last_mut() {
                    frame.current_exception = Some(exception.clone());
                }
                self.stack.push(exception);
                return Ok(());
            }

            if let Some(frame) = self.frames.pop() {
                self.stack.truncate(frame.stack_base);
            }
        }
        Err(err)
    }

    fn current_frame(&mut self) -> VmResult<&mut ExecutionContext> {
        self.frames
            .last_mut()
            .ok_or_else(|| VmError::new(ErrorKind::RuntimeError, "no frame to execute"))
    }

    fn pop_value(&mut self) -> VmResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| VmError::new(ErrorKind::RuntimeError, "operand stack underflow"))
    }

    fn top_value(&self) -> VmResult<Value> {
        self.stack
            .last()
            .cloned()
            .ok_or_else(|| VmError::new(ErrorKind::RuntimeError, "operand stack underflow"))
    }

    fn pop_n(&mut self, n: usize) -> VmResult<Vec<Value>> {
        let at = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or_else(|| VmError::new(ErrorKind::RuntimeError, "operand stack underflow"))?;
        Ok(self.stack.split_off(at))
    }

    fn name_at(&mut self, index: u32) -> VmResult<Rc<str>> {
        let frame = self.current_frame()?;
        frame
            .code
            .names
            .get(index as usize)
            .cloned()
            .ok_or_else(|| VmError::new(ErrorKind::RuntimeError, "name index out of range"))
    }

    fn constant_at(&mut self, index: u32) -> VmResult<Constant> {
        let frame = self.current_frame()?;
        frame
            .code
            .constants
            .get(index as usize)
            .cloned()
            .ok_or_else(|| VmError::new(ErrorKind::RuntimeError, "constant index out of range"))
    }

    fn safepoint(&mut self) {
        if self.native_depth == 0 && self.heap.should_collect() {
            self.collect();
        }
    }

    fn return_from_frame(&mut self, entry: usize, value: Value) -> VmResult<Option<Exit>> {
        if let Some(frame) = self.frames.pop() {
            self.stack.truncate(frame.stack_base);
        }
        if self.frames.len() <= entry {
            return Ok(Some(Exit::Return(value)));
        }
        self.stack.push(value);
        Ok(None)
    }

    fn suspend(&mut self, value: Value) -> VmResult<Option<Exit>> {
        let mut frame = self
            .frames
            .pop()
            .ok_or_else(|| VmError::new(ErrorKind::RuntimeError, "no frame to suspend"))?;
        frame.saved_stack = self.stack.split_off(frame.stack_base.min(self.stack.len()));
        Ok(Some(Exit::Yield(value, Box::new(frame))))
    }

    fn jump(&mut self, target: u32) -> VmResult<()> {
        let frame = self.current_frame()?;
        let backward = (target as usize) < frame.instruction_pointer;
        frame.instruction_pointer = target as usize;
        if backward {
            self.safepoint();
        }
        Ok(())
    }

    fn lookup_name(&mut self, index: u32) -> VmResult<Value> {
        let name = self.name_at(index)?;
        let module = self.current_frame()?.module;
        self.lookup_global(module, &name)
            .ok_or_else(|| ScriptError::name_error(&name).into())
    }

    fn store_name(&mut self, index: u32, value: Value) -> VmResult<()> {
        let name = self.name_at(index)?;
        let module = self.current_frame()?.module;
        self.set_global(module, &name, value);
        Ok(())
    }

    fn delete_name(&mut self, index: u32) -> VmResult<()> {
        let name = self.name_at(index)?;
        let module = self.current_frame()?.module;
        match self.remove_global(module, &name) {
            Some(_) => Ok(()),
            None => Err(ScriptError::name_error(&name).into()),
        }
    }

    fn unbound_local(&mut self, slot: u32) -> VmError {
        let name = self
            .frames
            .last()
            .and_then(|f| f.code.locals.get(slot as usize).cloned())
            .unwrap_or_default();
        VmError::new(
            ErrorKind::UnboundLocalError,
            format!("local variable '{}' referenced before assignment", name),
        )
    }

    fn make_function(&mut self, code: u32, defaults: u32) -> VmResult<Value> {
        let Constant::Code(chunk) = self.constant_at(code)? else {
            return Err(VmError::new(
                ErrorKind::RuntimeError,
                "function constant is not a code object",
            ));
        };
        let defaults = self.pop_n(defaults as usize)?;
        let module = self.current_frame()?.module;
        let mut attrs = Namespace::new();
        attrs.insert(Rc::from("__name__"), Value::str(&chunk.name));
        attrs.insert(
            Rc::from("__doc__"),
            chunk.docstring.as_deref().map(Value::str).unwrap_or(Value::None),
        );
        if let Some(name) = self.module_name(module) {
            attrs.insert(Rc::from("__module__"), Value::str(name));
        }
        Ok(Value::Object(self.alloc(Object::Function(FunctionObject {
            name: Rc::from(chunk.name.as_str()),
            code: chunk,
            defaults,
            module,
            owner: None,
            attrs,
        }))))
    }

    /// Turn a raised value into an error
    pub(crate) fn error_from_value(&self, value: &Value) -> VmError {
        let handle = value.as_object();
        match handle.and_then(|h| self.heap.get(h)) {
            Some(Object::Exception(e)) => {
                let stop = matches!(
                    self.type_object(e.class).map(|t| t.kind),
                    Some(TypeKind::StopIteration)
                );
                if stop {
                    return VmError::StopIteration(e.value.clone());
                }
                let mut error = e.error.clone();
                error.traceback.clear();
                VmError::Exception(error)
            }
            Some(Object::Type(t)) => match t.kind {
                TypeKind::Exception(kind) => VmError::new(kind, ""),
                TypeKind::StopIteration => VmError::StopIteration(Value::None),
                _ => ScriptError::type_error("exceptions must derive from BaseException").into(),
            },
            _ => ScriptError::type_error("exceptions must derive from BaseException").into(),
        }
    }

    /// Error for a bare `raise` of the handled exception, keeping its traceback
    fn reraise(&self, exception: &Value) -> VmError {
        if let Some(Object::Exception(e)) = exception.as_object().and_then(|h| self.heap.get(h)) {
            let stop = matches!(
                self.type_object(e.class).map(|t| t.kind),
                Some(TypeKind::StopIteration)
            );
            if !stop {
                return VmError::Exception(e.error.clone());
            }
        }
        self.error_from_value(exception)
    }

    /// Materialize an error as an exception object
    pub(crate) fn exception_value(&mut self, err: VmError) -> Value {
        match err {
            VmError::Exception(error) => {
                let class = self.exception_type(error.kind);
                let value = Value::str(&error.message);
                self.new_exception(class, error, value)
            }
            VmError::StopIteration(value) => {
                let class = self.types.stop_iteration;
                let message = match &value {
                    Value::None => String::new(),
                    other => self.repr_lossy(other),
                };
                self.new_exception(class, ScriptError::new(ErrorKind::Exception, message), value)
            }
        }
    }

    fn exception_matches(&self, exception: &Value, class: &Value) -> VmResult<bool> {
        if let Some(items) = self.list_items(class) {
            return Ok(items.iter().any(|c| {
                c.as_object()
                    .map(|t| self.isinstance(exception, t))
                    .unwrap_or(false)
            }));
        }
        match class.as_object() {
            Some(handle) if self.type_object(handle).is_some() => {
                Ok(self.isinstance(exception, handle))
            }
            _ => Err(ScriptError::type_error(
                "catching classes that do not inherit from BaseException is not allowed",
            )
            .into()),
        }
    }

    fn step(&mut self, entry: usize) -> VmResult<Option<Exit>> {
        let frame = self.current_frame()?;
        let Some(inst) = frame.fetch() else {
            return self.return_from_frame(entry, Value::None);
        };

        match inst.opcode {
            Opcode::LoadConst(index) => {
                let value = match self.constant_at(index)? {
                    Constant::Int(n) => Value::Int(n),
                    Constant::Float(f) => Value::Float(f),
                    Constant::Str(s) => Value::Str(s),
                    Constant::Bytes(b) => Value::Bytes(b),
                    Constant::Code(_) => {
                        return Err(VmError::new(
                            ErrorKind::RuntimeError,
                            "code constant loaded as a value",
                        ))
                    }
                };
                self.stack.push(value);
            }
            Opcode::LoadNone => self.stack.push(Value::None),
            Opcode::LoadTrue => self.stack.push(Value::Bool(true)),
            Opcode::LoadFalse => self.stack.push(Value::Bool(false)),

            Opcode::LoadName(index) | Opcode::LoadGlobal(index) => {
                let value = self.lookup_name(index)?;
                self.stack.push(value);
            }
            Opcode::StoreName(index) | Opcode::StoreGlobal(index) => {
                let value = self.pop_value()?;
                self.store_name(index, value)?;
            }
            Opcode::DeleteName(index) | Opcode::DeleteGlobal(index) => self.delete_name(index)?,
            Opcode::LoadFast(slot) => {
                let frame = self.current_frame()?;
                match frame.locals.get(slot as usize).cloned().flatten() {
                    Some(value) => self.stack.push(value),
                    None => return Err(self.unbound_local(slot)),
                }
            }
            Opcode::StoreFast(slot) => {
                let value = self.pop_value()?;
                let frame = self.current_frame()?;
                let slot = slot as usize;
                if slot >= frame.locals.len() {
                    frame.locals.resize(slot + 1, None);
                }
                frame.locals[slot] = Some(value);
            }
            Opcode::DeleteFast(slot) => {
                let frame = self.current_frame()?;
                let bound = matches!(frame.locals.get(slot as usize), Some(Some(_)));
                if !bound {
                    return Err(self.unbound_local(slot));
                }
                self.current_frame()?.locals[slot as usize] = None;
            }

            Opcode::LoadAttr(index) => {
                let name = self.name_at(index)?;
                let object = self.pop_value()?;
                let value = self.get_attr(&object, &name)?;
                self.stack.push(value);
            }
            Opcode::LoadSuperAttr(index) => {
                let name = self.name_at(index)?;
                let frame = self.current_frame()?;
                let owner = frame.owner;
                let receiver = frame.locals.first().cloned().flatten();
                let value = self.super_attr(owner, receiver, &name)?;
                self.stack.push(value);
            }
            Opcode::StoreAttr(index) => {
                let name = self.name_at(index)?;
                let object = self.pop_value()?;
                let value = self.pop_value()?;
                self.set_attr(&object, &name, value)?;
            }
            Opcode::DeleteAttr(index) => {
                let name = self.name_at(index)?;
                let object = self.pop_value()?;
                self.del_attr(&object, &name)?;
            }
            Opcode::LoadSubscript => {
                let index = self.pop_value()?;
                let container = self.pop_value()?;
                let value = self.get_item(&container, &index)?;
                self.stack.push(value);
            }
            Opcode::StoreSubscript => {
                let index = self.pop_value()?;
                let container = self.pop_value()?;
                let value = self.pop_value()?;
                self.set_item(&container, &index, value)?;
            }
            Opcode::DeleteSubscript => {
                let index = self.pop_value()?;
                let container = self.pop_value()?;
                self.del_item(&container, &index)?;
            }

            Opcode::Binary(op) => {
                let b = self.pop_value()?;
                let a = self.pop_value()?;
                let value = self.binary_op(op, &a, &b)?;
                self.stack.push(value);
            }
            Opcode::Compare(op) => {
                let b = self.pop_value()?;
                let a = self.pop_value()?;
                let value = self.compare_op(op, &a, &b)?;
                self.stack.push(value);
            }
            Opcode::Unary(op) => {
                let operand = self.pop_value()?;
                let value = match op {
                    UnaryOp::Not => Value::Bool(!self.truthy(&operand)?),
                    other => self.unary_op(other, &operand)?,
                };
                self.stack.push(value);
            }

            Opcode::Jump(target) => self.jump(target)?,
            Opcode::JumpIfFalse(target) => {
                let value = self.pop_value()?;
                if !self.truthy(&value)? {
                    self.jump(target)?;
                }
            }
            Opcode::JumpIfTrue(target) => {
                let value = self.pop_value()?;
                if self.truthy(&value)? {
                    self.jump(target)?;
                }
            }
            Opcode::JumpIfFalseOrPop(target) => {
                let value = self.top_value()?;
                if self.truthy(&value)? {
                    self.stack.pop();
                } else {
                    self.jump(target)?;
                }
            }
            Opcode::JumpIfTrueOrPop(target) => {
                let value = self.top_value()?;
                if self.truthy(&value)? {
                    self.jump(target)?;
                } else {
                    self.stack.pop();
                }
            }

            Opcode::BuildList(count) => {
                let items = self.pop_n(count as usize)?;
                let list = self.new_list(items);
                self.stack.push(list);
            }
            Opcode::BuildDict(count) => {
                let flat = self.pop_n(count as usize * 2)?;
                let mut pairs = Vec::with_capacity(count as usize);
                let mut values = flat.into_iter();
                while let (Some(k), Some(v)) = (values.next(), values.next()) {
                    pairs.push((k, v));
                }
                let dict = self.new_dict(pairs)?;
                self.stack.push(dict);
            }
            Opcode::MakeFunction { code, defaults } => {
                let function = self.make_function(code, defaults)?;
                self.stack.push(function);
            }
            Opcode::BuildClass { name, members } => {
                let name = self.name_at(name)?;
                let start = self
                    .stack
                    .len()
                    .checked_sub(members as usize * 2 + 1)
                    .ok_or_else(|| VmError::new(ErrorKind::RuntimeError, "operand stack underflow"))?;
                let base = self.stack[start].clone();
                let mut pairs = Vec::with_capacity(members as usize);
                for pair in self.stack[start + 1..].chunks(2) {
                    let (Value::Str(key), Some(value)) = (&pair[0], pair.get(1)) else {
                        return Err(VmError::new(ErrorKind::RuntimeError, "malformed class members"));
                    };
                    pairs.push((key.clone(), value.clone()));
                }
                let module = self.current_frame()?.module;
                let class = self.build_class(&name, &base, pairs, module)?;
                self.stack.truncate(start);
                self.stack.push(Value::Object(class));
            }

            Opcode::Call(argc) => {
                self.safepoint();
                if let CallOutcome::Value(value) = self.call_on_stack(argc as usize)? {
                    self.stack.push(value);
                }
            }
            Opcode::Return => {
                let value = self.pop_value()?;
                return self.return_from_frame(entry, value);
            }

            Opcode::Pop => {
                self.pop_value()?;
            }
            Opcode::Dup => {
                let value = self.top_value()?;
                self.stack.push(value);
            }
            Opcode::Dup2 => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(VmError::new(ErrorKind::RuntimeError, "operand stack underflow"));
                }
                let a = self.stack[len - 2].clone();
                let b = self.stack[len - 1].clone();
                self.stack.push(a);
                self.stack.push(b);
            }
            Opcode::Rot2 => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(VmError::new(ErrorKind::RuntimeError, "operand stack underflow"));
                }
                self.stack.swap(len - 1, len - 2);
            }
            Opcode::Rot3 => {
                let top = self.pop_value()?;
                let len = self.stack.len();
                if len < 2 {
                    return Err(VmError::new(ErrorKind::RuntimeError, "operand stack underflow"));
                }
                self.stack.insert(len - 2, top);
            }
            Opcode::PrintExpr => {
                let value = self.pop_value()?;
                if !value.is_none() {
                    let text = self.repr(&value)?;
                    self.write_stdout(&format!("{}\n", text));
                }
            }

            Opcode::GetIter => {
                let value = self.pop_value()?;
                let iterator = self.get_iter(&value)?;
                self.stack.push(iterator);
            }
            Opcode::ForIter(target) => {
                self.safepoint();
                let iterator = self.top_value()?;
                match self.iter_next(&iterator)? {
                    IterStep::Item(item) => self.stack.push(item),
                    IterStep::Done(_) => {
                        self.stack.pop();
                        self.jump(target)?;
                    }
                }
            }
            Opcode::Yield => {
                let value = self.pop_value()?;
                return self.suspend(value);
            }
            Opcode::GetYieldFromIter => {
                let value = self.pop_value()?;
                let iterator = if self.is_generator(&value) {
                    value
                } else {
                    self.get_iter(&value)?
                };
                self.stack.push(iterator);
            }
            Opcode::YieldFrom => {
                let sent = self.pop_value()?;
                let iterator = self.top_value()?;
                let step = if self.is_generator(&iterator) {
                    match self.resume(&iterator, sent)? {
                        GeneratorStep::Yielded(v) => IterStep::Item(v),
                        GeneratorStep::Returned(v) => IterStep::Done(v),
                    }
                } else if sent.is_none() {
                    self.iter_next(&iterator)?
                } else {
                    return Err(ScriptError::type_error(format!(
                        "can't send non-None value to a '{}' iterator",
                        self.type_name(&iterator)
                    ))
                    .into());
                };
                match step {
                    IterStep::Item(value) => {
                        let frame = self.current_frame()?;
                        frame.instruction_pointer -= 1;
                        return self.suspend(value);
                    }
                    IterStep::Done(result) => {
                        self.stack.pop();
                        self.stack.push(result);
                    }
                }
            }

            Opcode::SetupExcept(target) => {
                let height = self.stack.len();
                let frame = self.current_frame()?;
                let depth = height.saturating_sub(frame.stack_base);
                frame.handlers.push(Handler {
                    target: target as usize,
                    depth,
                });
            }
            Opcode::PopExcept => {
                self.current_frame()?.handlers.pop();
            }
            Opcode::Raise(0) => {
                let frame = self.current_frame()?;
                let current = frame.current_exception.clone();
                frame.reraising = current.is_some();
                return Err(match current {
                    Some(exception) => self.reraise(&exception),
                    None => VmError::new(ErrorKind::RuntimeError, "No active exception to reraise"),
                });
            }
            Opcode::Raise(_) => {
                let value = self.pop_value()?;
                return Err(self.error_from_value(&value));
            }
            Opcode::ExceptionMatches => {
                let class = self.pop_value()?;
                let exception = self.top_value()?;
                let matched = self.exception_matches(&exception, &class)?;
                self.stack.push(Value::Bool(matched));
            }

            Opcode::ImportName(index) => {
                let name = self.name_at(index)?;
                let module = self.import(&name)?;
                self.stack.push(Value::Object(module));
            }
            Opcode::ImportFrom(index) => {
                let name = self.name_at(index)?;
                let module = self.top_value()?;
                let value = match self.get_attr(&module, &name) {
                    Ok(value) => value,
                    Err(VmError::Exception(e)) if e.kind == ErrorKind::AttributeError => {
                        let module_name = module
                            .as_object()
                            .and_then(|m| self.module_name(m))
                            .unwrap_or_default();
                        return Err(VmError::new(
                            ErrorKind::ImportError,
                            format!("cannot import name '{}' from '{}'", name, module_name),
                        ));
                    }
                    Err(e) => return Err(e),
                };
                self.stack.push(value);
            }
        }
        Ok(None)
    }
}
