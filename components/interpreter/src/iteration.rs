//! Iterators and generator resumption

use core_types::{ErrorKind, ScriptError};

use crate::dispatch::Exit;
use crate::error::{VmError, VmResult};
use crate::object::*;
use crate::value::Value;
use crate::vm::Vm;

/// One step of an iterator
#[derive(Debug, Clone, PartialEq)]
pub enum IterStep {
    /// Next item
    Item(Value),
    /// Exhausted; carries a generator's return value
    Done(Value),
}

/// Outcome of resuming a generator
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorStep {
    /// Suspended at a `yield`
    Yielded(Value),
    /// Ran to completion
    Returned(Value),
}

impl Vm {
    /// `iter(value)`
    pub fn get_iter(&mut self, value: &Value) -> VmResult<Value> {
        let state = match value {
            Value::Str(s) => IteratorState::Seq {
                items: s.chars().map(|c| Value::str(c.to_string())).collect(),
                index: 0,
            },
            Value::Bytes(b) => IteratorState::Seq {
                items: b.iter().map(|byte| Value::Int(i64::from(*byte))).collect(),
                index: 0,
            },
            Value::Object(handle) => match self.get_object(*handle)? {
                Object::List(_) => IteratorState::List {
                    list: *handle,
                    index: 0,
                },
                Object::Dict(dict) => IteratorState::Seq {
                    items: dict.keys(),
                    index: 0,
                },
                Object::Iterator(_) | Object::Generator(_) => return Ok(value.clone()),
                Object::Instance(_) => {
                    let ty = self.type_of(value);
                    if let Some(method) = self.lookup_type_attr(ty, "__iter__") {
                        return self.call(&method, &[value.clone()]);
                    }
                    return Err(self.not_iterable(value));
                }
                _ => return Err(self.not_iterable(value)),
            },
            _ => return Err(self.not_iterable(value)),
        };
        Ok(Value::Object(self.alloc(Object::Iterator(state))))
    }

    fn not_iterable(&self, value: &Value) -> VmError {
        ScriptError::type_error(format!("'{}' object is not iterable", self.type_name(value))).into()
    }

    /// Advance an iterator
    pub fn iter_next(&mut self, iterator: &Value) -> VmResult<IterStep> {
        let Some(handle) = iterator.as_object() else {
            return Err(self.not_an_iterator(iterator));
        };

        enum Source {
            Step(IterStep),
            ListAt(memory_manager::ObjRef, usize),
            Generator,
            Instance,
        }

        let source = match self.get_object_mut(handle)? {
            Object::Iterator(IteratorState::Seq { items, index }) => {
                let step = match items.get(*index) {
                    Some(item) => IterStep::Item(item.clone()),
                    None => IterStep::Done(Value::None),
                };
                *index += 1;
                Source::Step(step)
            }
            Object::Iterator(IteratorState::List { list, index }) => {
                let at = *index;
                *index += 1;
                Source::ListAt(*list, at)
            }
            Object::Iterator(IteratorState::Range { next, stop, step }) => {
                let current = *next;
                let more = if *step > 0 { current < *stop } else { current > *stop };
                if more {
                    *next = current.saturating_add(*step);
                    Source::Step(IterStep::Item(Value::Int(current)))
                } else {
                    Source::Step(IterStep::Done(Value::None))
                }
            }
            Object::Generator(_) => Source::Generator,
            Object::Instance(_) => Source::Instance,
            _ => return Err(self.not_an_iterator(iterator)),
        };

        match source {
            Source::Step(step) => Ok(step),
            Source::ListAt(list, at) => match self.get_object(list)? {
                Object::List(items) => Ok(match items.get(at) {
                    Some(item) => IterStep::Item(item.clone()),
                    None => IterStep::Done(Value::None),
                }),
                _ => Ok(IterStep::Done(Value::None)),
            },
            Source::Generator => Ok(match self.resume(iterator, Value::None)? {
                GeneratorStep::Yielded(v) => IterStep::Item(v),
                GeneratorStep::Returned(v) => IterStep::Done(v),
            }),
            Source::Instance => {
                let ty = self.type_of(iterator);
                let method = self
                    .lookup_type_attr(ty, "__next__")
                    .ok_or_else(|| self.not_an_iterator(iterator))?;
                match self.call(&method, &[iterator.clone()]) {
                    Ok(v) => Ok(IterStep::Item(v)),
                    Err(VmError::StopIteration(v)) => Ok(IterStep::Done(v)),
                    Err(e) => Err(e),
                }
            }
        }
    }

    fn not_an_iterator(&self, value: &Value) -> VmError {
        ScriptError::type_error(format!("'{}' object is not an iterator", self.type_name(value)))
            .into()
    }

    /// Resume a generator, sending `sent` as the value of the pending `yield`
    ///
    /// A finished generator returns `Returned(None)` again. A StopIteration
    /// raised inside the body becomes a RuntimeError.
    pub fn resume(&mut self, generator: &Value, sent: Value) -> VmResult<GeneratorStep> {
        let handle = generator
            .as_object()
            .ok_or_else(|| ScriptError::type_error("resume requires a generator"))?;

        let (state, mut frame) = match self.get_object_mut(handle)? {
            Object::Generator(g) => match g.state {
                GeneratorState::Running => {
                    return Err(VmError::new(
                        ErrorKind::ValueError,
                        "generator already executing",
                    ))
                }
                GeneratorState::Finished => return Ok(GeneratorStep::Returned(Value::None)),
                GeneratorState::Created if !sent.is_none() => {
                    return Err(ScriptError::type_error(
                        "can't send non-None value to a just-started generator",
                    )
                    .into())
                }
                state => match g.frame.take() {
                    Some(frame) => {
                        g.state = GeneratorState::Running;
                        (state, frame)
                    }
                    None => {
                        g.state = GeneratorState::Finished;
                        return Ok(GeneratorStep::Returned(Value::None));
                    }
                },
            },
            _ => return Err(ScriptError::type_error("resume requires a generator").into()),
        };

        let entry = self.frames.len();
        frame.stack_base = self.stack.len();
        self.stack.append(&mut frame.saved_stack);
        if state == GeneratorState::Suspended {
            self.stack.push(sent);
        }

        let outcome = match self.push_frame(*frame) {
            Ok(()) => self.run_frames(entry),
            Err(e) => Err(e),
        };

        let (next_state, saved, result) = match outcome {
            Ok(Exit::Yield(value, frame)) => (
                GeneratorState::Suspended,
                Some(frame),
                Ok(GeneratorStep::Yielded(value)),
            ),
            Ok(Exit::Return(value)) => (GeneratorState::Finished, None, Ok(GeneratorStep::Returned(value))),
            Err(VmError::StopIteration(_)) => (
                GeneratorState::Finished,
                None,
                Err(VmError::new(
                    ErrorKind::RuntimeError,
                    "generator raised StopIteration",
                )),
            ),
            Err(e) => (GeneratorState::Finished, None, Err(e)),
        };
        if let Some(Object::Generator(g)) = self.object_mut(handle) {
            g.state = next_state;
            g.frame = saved;
        }
        result
    }

    /// Collect every item of an iterable
    pub fn collect_iter(&mut self, iterable: &Value) -> VmResult<Vec<Value>> {
        let iterator = self.get_iter(iterable)?;
        let depth = self.stack_depth();
        self.push(iterator.clone());
        let mut items = Vec::new();
        let result = loop {
            match self.iter_next(&iterator) {
                Ok(IterStep::Item(item)) => {
                    self.push(item.clone());
                    items.push(item);
                }
                Ok(IterStep::Done(_)) => break Ok(items),
                Err(e) => break Err(e),
            }
        };
        self.truncate_stack(depth);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::CompileMode;

    #[test]
    fn test_list_iterator_sees_appends() {
        let mut vm = Vm::new();
        let list = vm.new_list(vec![Value::Int(1)]);
        let it = vm.get_iter(&list).unwrap();
        assert_eq!(vm.iter_next(&it).unwrap(), IterStep::Item(Value::Int(1)));
        if let Some(Object::List(items)) = vm.object_mut(list.as_object().unwrap()) {
            items.push(Value::Int(2));
        }
        assert_eq!(vm.iter_next(&it).unwrap(), IterStep::Item(Value::Int(2)));
        assert_eq!(vm.iter_next(&it).unwrap(), IterStep::Done(Value::None));
    }

    #[test]
    fn test_generator_send_and_return_value() {
        let mut vm = Vm::new();
        let main = vm.main_module();
        vm.compile_exec(
            "def g():\n    x = yield 1\n    yield x + 1\n    return 'done'\n",
            "<test>",
            CompileMode::Exec,
            main,
        )
        .unwrap();
        let g = vm.get_global(main, "g").unwrap();
        let gen = vm.call(&g, &[]).unwrap();
        assert_eq!(vm.resume(&gen, Value::None).unwrap(), GeneratorStep::Yielded(Value::Int(1)));
        assert_eq!(vm.resume(&gen, Value::Int(10)).unwrap(), GeneratorStep::Yielded(Value::Int(11)));
        assert_eq!(
            vm.resume(&gen, Value::None).unwrap(),
            GeneratorStep::Returned(Value::str("done"))
        );
        assert_eq!(vm.resume(&gen, Value::None).unwrap(), GeneratorStep::Returned(Value::None));
    }

    #[test]
    fn test_send_to_fresh_generator_fails() {
        let mut vm = Vm::new();
        let main = vm.main_module();
        vm.compile_exec("def g():\n    yield 1\n", "<test>", CompileMode::Exec, main)
            .unwrap();
        let g = vm.get_global(main, "g").unwrap();
        let gen = vm.call(&g, &[]).unwrap();
        let err = vm.resume(&gen, Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));
    }

    #[test]
    fn test_collect_iter_over_range() {
        let mut vm = Vm::new();
        let range = vm.builtin("range").unwrap();
        let r = vm.call(&range, &[Value::Int(3)]).unwrap();
        assert_eq!(
            vm.collect_iter(&r).unwrap(),
            vec![Value::Int(0), Value::Int(1), Value::Int(2)]
        );
    }

    #[test]
    fn test_int_is_not_iterable() {
        let mut vm = Vm::new();
        let err = vm.get_iter(&Value::Int(3)).unwrap_err();
        assert_eq!(err.to_script_error().message, "'int' object is not iterable");
    }
}
