//! Argument window passed to native entry points

use crate::error::VmResult;
use crate::value::Value;
use crate::vm::Vm;
use core_types::ScriptError;

/// Arguments of a native call: `argc` values starting at `base` on the VM
/// value stack.
///
/// The arguments stay on the stack for the whole call, which keeps them
/// reachable while the native runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    /// Stack index of the first argument
    pub base: usize,
    /// Number of arguments
    pub argc: usize,
}

impl CallFrame {
    /// Create a new call frame
    pub fn new(base: usize, argc: usize) -> Self {
        Self { base, argc }
    }

    /// Argument `index`, or `None` past `argc`
    pub fn arg(&self, vm: &Vm, index: usize) -> Option<Value> {
        if index >= self.argc {
            return None;
        }
        vm.stack_slot(self.base + index)
    }

    /// All arguments in order
    pub fn args(&self, vm: &Vm) -> Vec<Value> {
        (0..self.argc).filter_map(|i| self.arg(vm, i)).collect()
    }

    /// The frame without its first argument
    pub fn shift(&self) -> CallFrame {
        CallFrame {
            base: self.base + 1,
            argc: self.argc.saturating_sub(1),
        }
    }

    /// Check `min <= argc <= max` for a builtin called `name`
    pub fn expect(&self, name: &str, min: usize, max: usize) -> VmResult<()> {
        if self.argc >= min && self.argc <= max {
            return Ok(());
        }
        let message = if min == max {
            let noun = if min == 1 { "argument" } else { "arguments" };
            format!("{}() takes exactly {} {} ({} given)", name, min, noun, self.argc)
        } else if self.argc < min {
            format!("{}() takes at least {} arguments ({} given)", name, min, self.argc)
        } else {
            format!("{}() takes at most {} arguments ({} given)", name, max, self.argc)
        };
        Err(ScriptError::type_error(message).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_frame_new() {
        let frame = CallFrame::new(10, 2);
        assert_eq!(frame.base, 10);
        assert_eq!(frame.argc, 2);
        assert_eq!(frame.shift(), CallFrame::new(11, 1));
    }

    #[test]
    fn test_args_beyond_argc_rejected() {
        let mut vm = Vm::new();
        vm.push(Value::Int(1));
        vm.push(Value::Int(2));
        let frame = CallFrame::new(vm.stack_depth() - 2, 1);
        assert_eq!(frame.arg(&vm, 0), Some(Value::Int(1)));
        assert_eq!(frame.arg(&vm, 1), None);
    }

    #[test]
    fn test_expect_messages() {
        let frame = CallFrame::new(0, 2);
        let err = frame.expect("len", 1, 1).unwrap_err();
        assert_eq!(
            err.to_script_error().message,
            "len() takes exactly 1 argument (2 given)"
        );
        assert!(frame.expect("range", 1, 3).is_ok());
    }
}
