//! The `asyncio` script module
//!
//! ```text
//! import asyncio
//! await asyncio.sleep(0.5)
//! task = asyncio.AsyncTask(worker())
//! ```

use std::rc::Rc;
use std::time::Duration;

use bridge::{register_module, HostError, HostResult};
use core_types::ErrorKind;
use interpreter::Vm;

use crate::scheduler::Scheduler;
use crate::task::AsyncTask;

/// Register `asyncio` as a lazily initialized module backed by `scheduler`
pub fn register(vm: &mut Vm, scheduler: &Scheduler) {
    let scheduler = scheduler.clone();
    register_module(vm, "asyncio", move |m| {
        m.doc("Host-backed asynchronous primitives.");
        m.class::<AsyncTask>()?;

        let sleeper = scheduler.clone();
        m.function(
            "sleep(seconds: float) -> AsyncTask\nFinish after `seconds` have elapsed.",
            move |seconds: f64| -> HostResult<Rc<AsyncTask>> {
                if !seconds.is_finite() || seconds < 0.0 {
                    return Err(HostError::script(
                        ErrorKind::ValueError,
                        "sleep length must be a non-negative number",
                    ));
                }
                let duration = Duration::from_secs_f64(seconds);
                Ok(sleeper.spawn(async move {
                    tokio::time::sleep(duration).await;
                    Ok::<_, HostError>(())
                }))
            },
        )?;
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use interpreter::{CompileMode, Value};

    use super::*;
    use crate::scheduler::SchedulerConfig;

    #[tokio::test]
    async fn test_module_surface() {
        let vm = Rc::new(RefCell::new(Vm::new()));
        let scheduler = Scheduler::new(&vm, SchedulerConfig::default());
        let mut vm = vm.borrow_mut();
        register(&mut vm, &scheduler);
        let main = vm.main_module();
        vm.compile_exec("import asyncio\nfrom asyncio import AsyncTask", "<test>", CompileMode::Exec, main)
            .unwrap();
        let doc = vm
            .compile_exec("asyncio.__doc__", "<test>", CompileMode::Eval, main)
            .unwrap();
        let doc = doc.as_str().map(str::to_string).unwrap_or_default();
        assert!(doc.starts_with("Host-backed asynchronous primitives."));
        assert!(doc.contains("class AsyncTask:"));
        assert!(doc.contains("def sleep(seconds: float) -> AsyncTask:"));

        let err = vm
            .compile_exec("asyncio.sleep(float('nan'))", "<test>", CompileMode::Eval, main)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValueError);

        let pending = vm
            .compile_exec("asyncio.sleep(0).is_done", "<test>", CompileMode::Eval, main)
            .unwrap();
        assert_eq!(pending, Value::Bool(false));
    }
}
