//! Unit tests for bridge components

use std::collections::{BTreeMap, HashMap};

use bridge::{ByteBuf, Dynamic, FromScript, IntoScript, ScriptType, Signature, SignatureError};
use interpreter::{CompileMode, Value, Vm};

fn eval(vm: &mut Vm, source: &str) -> Value {
    let main = vm.main_module();
    vm.compile_exec(source, "<unit>", CompileMode::Eval, main).unwrap()
}

#[test]
fn test_type_names() {
    assert_eq!(<Vec<Option<i64>>>::type_name(), "list[Optional[int]]");
    assert_eq!(<BTreeMap<String, Vec<f64>>>::type_name(), "dict[str, list[float]]");
    assert_eq!(<HashMap<i64, String>>::type_name(), "dict[int, str]");
    assert_eq!(ByteBuf::type_name(), "bytes");
    assert_eq!(<()>::type_name(), "None");
    assert_eq!(Dynamic::type_name(), "Any");
}

#[test]
fn test_sequence_preserves_order() {
    let mut vm = Vm::new();
    let words = vec!["c".to_string(), "a".to_string(), "b".to_string()];
    let value = words.clone().into_script(&mut vm).unwrap();
    assert_eq!(vm.list_items(&value).map(|items| items.len()), Some(3));
    assert_eq!(<Vec<String>>::from_script(&mut vm, &value), Some(words));
}

#[test]
fn test_sequence_conversion_is_all_or_nothing() {
    let mut vm = Vm::new();
    let mixed = eval(&mut vm, "[1, 2, 'three']");
    assert_eq!(<Vec<i64>>::from_script(&mut vm, &mixed), None);
    let nested = eval(&mut vm, "[[1, 2], [3]]");
    assert_eq!(
        <Vec<Vec<i64>>>::from_script(&mut vm, &nested),
        Some(vec![vec![1, 2], vec![3]])
    );
}

#[test]
fn test_mapping_content() {
    let mut vm = Vm::new();
    let value = eval(&mut vm, "{'a': 1, 'b': 2}");
    let map = <HashMap<String, i64>>::from_script(&mut vm, &value).unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map["a"], 1);
    assert_eq!(map["b"], 2);

    let mut host = BTreeMap::new();
    host.insert(3i64, "x".to_string());
    host.insert(1i64, "y".to_string());
    let value = host.clone().into_script(&mut vm).unwrap();
    assert_eq!(<BTreeMap<i64, String>>::from_script(&mut vm, &value), Some(host));
}

#[test]
fn test_mapping_rejects_non_mappings() {
    let mut vm = Vm::new();
    let list = eval(&mut vm, "['a', 'b']");
    assert_eq!(<BTreeMap<String, i64>>::from_script(&mut vm, &list), None);
    assert_eq!(<BTreeMap<String, i64>>::from_script(&mut vm, &Value::Int(1)), None);
}

#[test]
fn test_numeric_conversion_rules() {
    let mut vm = Vm::new();
    assert_eq!(f64::from_script(&mut vm, &Value::Int(2)), Some(2.0));
    assert_eq!(f64::from_script(&mut vm, &Value::Bool(true)), None);
    assert_eq!(i64::from_script(&mut vm, &Value::Bool(true)), None);
    assert_eq!(i64::from_script(&mut vm, &Value::Float(1.0)), None);
    assert_eq!(u32::from_script(&mut vm, &Value::Int(-1)), None);
    assert_eq!(usize::from_script(&mut vm, &Value::Int(7)), Some(7));
}

#[test]
fn test_optional_swallows_mismatch() {
    let mut vm = Vm::new();
    assert_eq!(<Option<i64>>::from_script(&mut vm, &Value::None), Some(None));
    assert_eq!(<Option<i64>>::from_script(&mut vm, &Value::str("x")), Some(None));
    assert_eq!(<Option<i64>>::from_script(&mut vm, &Value::Int(4)), Some(Some(4)));
    assert_eq!(None::<i64>.into_script(&mut vm).unwrap(), Value::None);
}

#[test]
fn test_dynamic_priority_and_drops() {
    let mut vm = Vm::new();
    let value = eval(&mut vm, "['s', 1, 2.5, True, None, [1], {'k': 'v'}]");
    let items = <Vec<Dynamic>>::from_script(&mut vm, &value).unwrap();
    let kinds: Vec<&str> = items.iter().map(Dynamic::kind).collect();
    assert_eq!(kinds, vec!["str", "int", "float", "bool", "list", "dict"]);
}

#[test]
fn test_dynamic_serializes_as_plain_json() {
    let mut vm = Vm::new();
    let value = eval(&mut vm, "{'name': 'x', 'sizes': [1, 2.5], 'ok': False}");
    let dynamic = Dynamic::from_script(&mut vm, &value).unwrap();
    let json = serde_json::to_string(&dynamic).unwrap();
    assert_eq!(json, r#"{"name":"x","ok":false,"sizes":[1,2.5]}"#);
}

#[test]
fn test_dynamic_round_trip() {
    let mut vm = Vm::new();
    let mut map = BTreeMap::new();
    map.insert("n".to_string(), Dynamic::Int(1));
    map.insert("l".to_string(), Dynamic::List(vec![Dynamic::Str("a".into()), Dynamic::Bool(false)]));
    let original = Dynamic::Map(map);
    let value = original.clone().into_script(&mut vm).unwrap();
    assert_eq!(Dynamic::from_script(&mut vm, &value), Some(original));
}

#[test]
fn test_signature_rendering() {
    let sig = Signature::parse("find(self, needle: str, start: int = 0, flags: dict[str,int] = None) -> Optional[int]\nFind a needle.").unwrap();
    assert_eq!(sig.params.len(), 3);
    assert_eq!(sig.min_arity(), 1);
    assert_eq!(
        sig.to_string(),
        "find(needle: str, start: int = 0, flags: dict[str, int] = None) -> Optional[int]"
    );
    assert_eq!(
        sig.interface(true),
        "def find(self, needle: str, start: int = 0, flags: dict[str, int] = None) -> Optional[int]:\n    \"\"\"Find a needle.\"\"\""
    );
}

#[test]
fn test_signature_errors() {
    assert!(matches!(
        Signature::parse("f(a: int = 1, b: int)"),
        Err(SignatureError::DefaultOrder(name)) if name == "b"
    ));
    assert!(matches!(
        Signature::parse("f(a: int, a: str)"),
        Err(SignatureError::Duplicate(name)) if name == "a"
    ));
    assert!(matches!(
        Signature::parse("f(a: int = [])"),
        Err(SignatureError::UnsupportedDefault { .. })
    ));
    assert!(matches!(Signature::parse("f(a: int"), Err(SignatureError::Expected { .. })));
}
