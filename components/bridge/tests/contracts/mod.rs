//! Contract tests for the bridge
//!
//! Guarantees host code relies on: one script instance per live host
//! object, symmetric lifetime coupling with the collector, argument checks
//! that run before any host code, and registration that fails early.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bridge::{
    expose, materialize, register, register_in, BridgeCache, BridgeResult, Bridged, ByteBuf,
    Dynamic, FromScript, HostError, HostResult, IntoScript, TypeBuilder,
};
use core_types::ErrorKind;
use interpreter::{CompileMode, Value, Vm};

#[derive(Default)]
struct Account {
    cache: BridgeCache,
    balance: Cell<i64>,
    history: RefCell<Vec<i64>>,
}

impl Bridged for Account {
    const TYPE_NAME: &'static str = "Account";

    fn bridge_cache(&self) -> &BridgeCache {
        &self.cache
    }

    fn describe(ty: &mut TypeBuilder<'_, Self>) -> BridgeResult<()> {
        ty.slots(1);
        ty.constructor("Account(opening: int = 0)", |opening: i64| -> HostResult<Rc<Account>> {
            let account = Account::default();
            account.balance.set(opening);
            Ok(Rc::new(account))
        })?;
        ty.property("balance -> int", |a: &Account| -> HostResult<i64> { Ok(a.balance.get()) })?;
        ty.method("deposit(self, amount: int, note: str = '') -> int", |a: &Account, amount: i64, _note: String| -> HostResult<i64> {
            if amount <= 0 {
                return Err(HostError::script(ErrorKind::ValueError, "amount must be positive"));
            }
            a.history.borrow_mut().push(amount);
            a.balance.set(a.balance.get() + amount);
            Ok(a.balance.get())
        })?;
        ty.method("__len__(self) -> int", |a: &Account| -> HostResult<usize> { Ok(a.history.borrow().len()) })?;
        ty.method("__getitem__(self, index: int) -> int", |a: &Account, index: usize| -> HostResult<i64> {
            a.history
                .borrow()
                .get(index)
                .copied()
                .ok_or_else(|| HostError::script(ErrorKind::IndexError, "history index out of range"))
        })?;
        ty.method("__repr__(self) -> str", |a: &Account| -> HostResult<String> {
            Ok(format!("<Account {}>", a.balance.get()))
        })?;
        Ok(())
    }
}

struct Mislabeled {
    cache: BridgeCache,
}

impl Bridged for Mislabeled {
    const TYPE_NAME: &'static str = "Mislabeled";

    fn bridge_cache(&self) -> &BridgeCache {
        &self.cache
    }

    fn describe(ty: &mut TypeBuilder<'_, Self>) -> BridgeResult<()> {
        ty.method("resize(self, width: int, height: int) -> None", |_: &Mislabeled, _w: i64| -> HostResult<()> { Ok(()) })?;
        Ok(())
    }
}

#[derive(Default)]
struct Engine {
    cache: BridgeCache,
    start_called: Cell<bool>,
}

impl Bridged for Engine {
    const TYPE_NAME: &'static str = "Engine";

    fn bridge_cache(&self) -> &BridgeCache {
        &self.cache
    }

    fn describe(ty: &mut TypeBuilder<'_, Self>) -> BridgeResult<()> {
        ty.constructor("Engine()", || -> HostResult<Rc<Engine>> { Ok(Rc::new(Engine::default())) })?;
        ty.method("start(self) -> None", |e: &Engine| -> HostResult<()> {
            e.start_called.set(true);
            Ok(())
        })?;
        Ok(())
    }
}

fn vm_with_engine_subclass() -> Vm {
    let mut vm = Vm::new();
    let main = vm.main_module();
    register_in::<Engine>(&mut vm, main).unwrap();
    exec(
        &mut vm,
        "class Turbo(Engine):\n    def __init__(self):\n        super().__init__()\n        self.val = 'val'\n\ntest = Turbo()\n",
    )
    .unwrap();
    vm
}

fn vm_with_accounts() -> Vm {
    let mut vm = Vm::new();
    let main = vm.main_module();
    register_in::<Account>(&mut vm, main).unwrap();
    vm
}

fn exec(vm: &mut Vm, source: &str) -> Result<(), core_types::ScriptError> {
    let main = vm.main_module();
    vm.compile_exec(source, "<contract>", CompileMode::Exec, main).map(|_| ())
}

fn eval(vm: &mut Vm, source: &str) -> Value {
    let main = vm.main_module();
    vm.compile_exec(source, "<contract>", CompileMode::Eval, main).unwrap()
}

/// Exposing a live object twice yields the same script value
#[test]
fn test_single_instance_contract() {
    let mut vm = vm_with_accounts();
    let account = Rc::new(Account::default());
    let first = expose(&mut vm, &account).unwrap();
    let main = vm.main_module();
    vm.set_global(main, "a", first.clone());
    let second = expose(&mut vm, &account).unwrap();
    assert_eq!(first, second);
    assert_eq!(eval(&mut vm, "a"), second);

    let other = Rc::new(Account::default());
    assert_ne!(expose(&mut vm, &other).unwrap(), first);
}

/// The heap's share is released exactly when the instance is swept
#[test]
fn test_finalizer_symmetry_contract() {
    let mut vm = vm_with_accounts();
    let account = Rc::new(Account::default());
    let main = vm.main_module();
    let value = expose(&mut vm, &account).unwrap();
    vm.set_global(main, "kept", value);
    assert_eq!(Rc::strong_count(&account), 2);

    vm.collect();
    assert_eq!(Rc::strong_count(&account), 2);
    assert!(account.cache.is_set());

    vm.remove_global(main, "kept");
    vm.collect();
    assert_eq!(Rc::strong_count(&account), 1);
    assert!(!account.cache.is_set());
}

/// Objects created by scripts live as long as the script holds them
#[test]
fn test_script_created_object_contract() {
    let mut vm = vm_with_accounts();
    exec(&mut vm, "acct = Account(10)\nacct.deposit(5)\n").unwrap();
    let value = eval(&mut vm, "acct");
    let account = materialize::<Account>(&vm, &value).unwrap();
    assert_eq!(account.balance.get(), 15);
    assert_eq!(expose(&mut vm, &account).unwrap(), value);
}

/// Wrong arity or argument types never reach host code
#[test]
fn test_arity_enforcement_contract() {
    let mut vm = vm_with_accounts();
    exec(&mut vm, "acct = Account()\n").unwrap();
    let value = eval(&mut vm, "acct");
    let account = materialize::<Account>(&vm, &value).unwrap();

    let err = exec(&mut vm, "acct.deposit()\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "deposit() expected at least 1 arguments, got 0");

    let err = exec(&mut vm, "acct.deposit(1, 'a', 'b')\n").unwrap_err();
    assert_eq!(err.message, "deposit() expected at most 2 arguments, got 3");

    let err = exec(&mut vm, "acct.deposit('10')\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "deposit() expected int at position 0, got str");

    let err = exec(&mut vm, "acct.deposit(3, 4)\n").unwrap_err();
    assert_eq!(err.message, "deposit() expected str at position 1, got int");

    assert_eq!(account.balance.get(), 0);
    assert!(account.history.borrow().is_empty());
}

/// Host errors surface as catchable script exceptions
#[test]
fn test_host_error_contract() {
    let mut vm = vm_with_accounts();
    exec(
        &mut vm,
        "acct = Account()\ntry:\n    acct.deposit(-1)\n    caught = None\nexcept ValueError as e:\n    caught = str(e)\n",
    )
    .unwrap();
    assert_eq!(eval(&mut vm, "caught"), Value::str("amount must be positive"));
}

/// Dunder methods bound through the bridge drive the VM protocols
#[test]
fn test_protocol_methods_contract() {
    let mut vm = vm_with_accounts();
    exec(&mut vm, "acct = Account(1)\nacct.deposit(2)\nacct.deposit(3)\n").unwrap();
    assert_eq!(eval(&mut vm, "len(acct)"), Value::Int(2));
    assert_eq!(eval(&mut vm, "acct[1]"), Value::Int(3));
    assert_eq!(eval(&mut vm, "repr(acct)"), Value::str("<Account 6>"));
    let err = exec(&mut vm, "acct[5]\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::IndexError);
}

/// Registration fails with the type, operation and parameter named
#[test]
fn test_registration_failure_contract() {
    let mut vm = Vm::new();
    let err = register::<Mislabeled>(&mut vm).unwrap_err();
    assert_eq!(
        err.to_string(),
        "cannot register Mislabeled.resize: signature declares 2 parameters but the host function takes 1"
    );
    let main = vm.main_module();
    assert!(vm.get_global(main, "Mislabeled").is_none());
}

/// Values written and read back keep scalars, order and mapping content
#[test]
fn test_round_trip_contract() {
    let mut vm = Vm::new();
    for value in [Value::Int(-5), Value::Float(0.25), Value::Bool(true), Value::str("text")] {
        let dynamic = Dynamic::from_script(&mut vm, &value).unwrap();
        assert_eq!(dynamic.into_script(&mut vm).unwrap(), value);
    }

    let bytes = ByteBuf(vec![0, 159, 146, 150]);
    let value = bytes.clone().into_script(&mut vm).unwrap();
    assert_eq!(ByteBuf::from_script(&mut vm, &value), Some(bytes));

    let seq = vec![3.5f64, -1.0, 2.0];
    let value = seq.clone().into_script(&mut vm).unwrap();
    assert_eq!(<Vec<f64>>::from_script(&mut vm, &value), Some(seq));
}

/// Extra slots are traced by the collector
#[test]
fn test_slots_are_traced_contract() {
    let mut vm = vm_with_accounts();
    let account = Rc::new(Account::default());
    let value = expose(&mut vm, &account).unwrap();
    let pin = vm.pin(value.clone());
    let payload = vm.new_list(vec![Value::Int(9)]);
    bridge::object::set_slot(&mut vm, &value, 0, payload.clone()).unwrap();
    vm.collect();
    assert!(vm.is_live(payload.as_object().unwrap()));
    assert_eq!(bridge::object::slot(&vm, &value, 0), Some(payload));
    assert!(bridge::object::set_slot(&mut vm, &value, 1, Value::None).is_err());
    drop(pin);
}

/// A script subclass instance stands for the host object its base built
#[test]
fn test_subclass_instance_carries_host_object_contract() {
    let mut vm = vm_with_engine_subclass();
    let main = vm.main_module();
    let test = vm.get_global(main, "test").unwrap();
    let engine = materialize::<Engine>(&vm, &test).unwrap();

    exec(&mut vm, "test.start()").unwrap();
    assert!(engine.start_called.get());
    assert_eq!(eval(&mut vm, "test.val"), Value::str("val"));
    assert_eq!(eval(&mut vm, "isinstance(test, Engine)"), Value::Bool(true));
    assert_eq!(expose(&mut vm, &engine).unwrap(), test);
}

/// Collecting a subclass instance releases its share and clears the cache
#[test]
fn test_subclass_collection_clears_cache_contract() {
    let mut vm = vm_with_engine_subclass();
    exec(&mut vm, "test2 = Turbo()").unwrap();
    let main = vm.main_module();
    let engine = materialize::<Engine>(&vm, &vm.get_global(main, "test2").unwrap()).unwrap();
    assert!(engine.cache.is_set());

    exec(&mut vm, "del test2").unwrap();
    vm.collect();
    assert!(vm.get_global(main, "test2").is_none());
    assert!(!engine.cache.is_set());
    assert_eq!(Rc::strong_count(&engine), 1);
}

/// A subclass without `__init__` runs the host constructor with its arguments
#[test]
fn test_subclass_inherits_host_constructor_contract() {
    let mut vm = vm_with_accounts();
    exec(
        &mut vm,
        "class Savings(Account):\n    rate = 2\n    def accrue(self):\n        return self.deposit(self.balance * self.rate)\n\nclass Audited(Savings):\n    def deposit(self, amount, note=''):\n        self.last = amount\n        return super().deposit(amount, note)\n\ns = Audited(10)\n",
    )
    .unwrap();
    assert_eq!(eval(&mut vm, "s.accrue()"), Value::Int(30));
    assert_eq!(eval(&mut vm, "s.last"), Value::Int(20));
    assert_eq!(eval(&mut vm, "len(s)"), Value::Int(1));

    let err = exec(&mut vm, "Account.__init__(s)").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    let err = exec(&mut vm, "Account.__init__(5)").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    let err = exec(&mut vm, "broken = Savings('ten')").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
}
