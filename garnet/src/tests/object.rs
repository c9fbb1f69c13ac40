use gc::Gc;
use pretty_assertions::assert_eq;

use crate::object::{format_float, Class, Instance, Value};
use crate::types::{Key, Type};


fn class(name: &str, superclass: Option<&Gc<Class>>, parent: Option<&Gc<Class>>) -> Gc<Class> {
    Gc::new(Class::new(Key::new(name), superclass.cloned(), parent.cloned(), false))
}


#[test]
fn equality() {
    assert!(Value::Int(1).user_eq(&Value::Float(1.0)));
    assert!(Value::Int(1) != Value::Float(1.0));
    assert_eq!(Value::str("a"), Value::str("a"));
    assert_eq!(Value::symbol("a"), Value::symbol("a"));
    assert!(Value::str("a") != Value::symbol("a"));
    assert_eq!(Value::Range(1, 3), Value::Range(1, 3));

    assert_eq!(
        Value::array(vec![Value::Int(1), Value::str("x")]),
        Value::array(vec![Value::Int(1), Value::str("x")]),
    );

    let x = Value::hash_from_pairs([(Value::symbol("a"), Value::Int(1)), (Value::Int(2), Value::Nil)]);
    let y = Value::hash_from_pairs([(Value::Int(2), Value::Nil), (Value::symbol("a"), Value::Int(1))]);
    assert_eq!(x, y);
}


#[test]
fn identity() {
    let x = Value::str("abc");
    let y = x.clone();
    assert!(x.same(&y));
    assert!(!x.same(&Value::str("abc")));

    assert!(Value::Int(5).same(&Value::Int(5)));
    assert!(Value::symbol("k").same(&Value::symbol("k")));

    let c = class("C", None, None);
    let a = Value::object(c.clone());
    let b = Value::object(c);
    assert!(a.same(&a.clone()));
    assert!(!a.same(&b));
    assert!(!a.user_eq(&b));
}


#[test]
fn aliasing() {
    let x = Value::array(vec![]);
    let y = x.clone();
    y.get_array().unwrap().borrow_mut().push(Value::Int(1));
    assert_eq!(x, Value::array(vec![Value::Int(1)]));

    let s = Value::str("a");
    let t = s.clone();
    t.get_str_cell().unwrap().borrow_mut().push('b');
    assert_eq!(s.get_str(), Some("ab".to_owned()));
}


#[test]
fn hash_keys() {
    assert_eq!(Value::str("k").hash_key(), Value::str("k").hash_key());
    assert_eq!(
        Value::array(vec![Value::Int(1)]).hash_key(),
        Value::array(vec![Value::Int(1)]).hash_key(),
    );
    assert!(Value::Int(1).hash_key() != Value::Float(1.0).hash_key());
    assert!(Value::str("a").hash_key() != Value::symbol("a").hash_key());

    let c = class("C", None, None);
    let a = Value::object(c.clone());
    let b = Value::object(c);
    assert_eq!(a.hash_key(), a.clone().hash_key());
    assert!(a.hash_key() != b.hash_key());

    assert_eq!(Value::str("k").hash_code(), Value::str("k").hash_code());
}


#[test]
fn hash_from_pairs() {
    let h = Value::hash_from_pairs([
        (Value::symbol("a"), Value::Int(1)),
        (Value::symbol("b"), Value::Int(2)),
        (Value::symbol("a"), Value::Int(3)),
    ]);
    let table = h.get_hash().unwrap().borrow();
    assert_eq!(table.len(), 2);

    let entries: Vec<(Value, Value)> = table.values().map(|e| (e.key.clone(), e.value.clone())).collect();
    assert_eq!(
        entries,
        vec![(Value::symbol("a"), Value::Int(3)), (Value::symbol("b"), Value::Int(2))],
    );
}


#[test]
fn truthiness() {
    assert!(!Value::Nil.truthy());
    assert!(!Value::Bool(false).truthy());
    assert!(Value::Bool(true).truthy());
    assert!(Value::Int(0).truthy());
    assert!(Value::str("").truthy());
    assert!(Value::array(vec![]).truthy());
}


#[test]
fn conversions() {
    assert_eq!(Value::from(Some(3)), Value::Int(3));
    assert_eq!(Value::from(None::<i64>), Value::Nil);
    assert_eq!(Value::from("x"), Value::str("x"));
    assert_eq!(Value::from(2.5), Value::Float(2.5));

    assert_eq!(Value::Int(2).to_f64(), Some(2.0));
    assert_eq!(Value::Float(2.5).get_int(), None);
    assert_eq!(Value::str("name").get_name(), Some(Key::new("name")));
    assert_eq!(Value::symbol("name").get_name(), Some(Key::new("name")));
    assert_eq!(Value::Int(1).get_name(), None);

    assert_eq!(Value::Nil.type_of(), Type::Nil);
    assert_eq!(Value::Range(0, 1).type_of(), Type::Range);
    assert_eq!(Value::object(class("C", None, None)).type_of(), Type::Object);
}


#[test]
fn debug() {
    let x = Value::array(vec![
        Value::Int(1),
        Value::str("a"),
        Value::symbol("b"),
        Value::Nil,
        Value::Float(2.0),
        Value::Range(1, 3),
    ]);
    assert_eq!(format!("{:?}", x), "[1, \"a\", :b, nil, 2.0, 1..3]");

    let c = class("Widget", None, None);
    assert_eq!(format!("{:?}", Value::Class(c.clone())), "Widget");
    assert_eq!(format!("{:?}", Value::object(c)), "#<Widget>");
}


#[test]
fn floats() {
    assert_eq!(format_float(3.0), "3.0");
    assert_eq!(format_float(-0.5), "-0.5");
    assert_eq!(format_float(2.25), "2.25");
    assert_eq!(format_float(1e20), "1.0e+20");
    assert_eq!(format_float(1.5e-5), "1.5e-05");
    assert_eq!(format_float(1e-5), "1.0e-05");
    assert_eq!(format_float(f64::NAN), "NaN");
    assert_eq!(format_float(f64::INFINITY), "Infinity");
    assert_eq!(format_float(f64::NEG_INFINITY), "-Infinity");
}


#[test]
fn class_hierarchy() {
    let object = class("Object", None, None);
    let animal = class("Animal", Some(&object), None);
    let dog = class("Dog", Some(&animal), None);

    let names: Vec<String> = Class::ancestors(&dog).iter().map(|c| c.full_name()).collect();
    assert_eq!(names, vec!["Dog", "Animal", "Object"]);

    assert!(Class::is_subclass_of(&dog, &animal));
    assert!(Class::is_subclass_of(&dog, &dog));
    assert!(!Class::is_subclass_of(&animal, &dog));
}


#[test]
fn method_lookup() {
    use crate::object::Func;

    let base = class("Base", None, None);
    let derived = class("Derived", Some(&base), None);

    base.set_method(Key::new("f"), Func::native(|_, _, _, _| Ok(Value::Int(1))));
    assert!(derived.find_method(Key::new("f")).is_some());
    assert!(derived.own_method(Key::new("f")).is_none());
    assert!(derived.find_method(Key::new("g")).is_none());

    derived.set_method(Key::new("g"), Func::native(|_, _, _, _| Ok(Value::Nil)));
    derived.set_method(Key::new("f"), Func::native(|_, _, _, _| Ok(Value::Nil)));
    assert_eq!(derived.method_names(), vec![Key::new("g"), Key::new("f")]);
}


#[test]
fn qualified_names() {
    let outer = Gc::new(Class::new(Key::new("Outer"), None, None, true));
    let inner = class("Inner", None, Some(&outer));
    assert!(outer.is_module());
    assert_eq!(inner.name(), Key::new("Inner"));
    assert_eq!(inner.full_name(), "Outer::Inner");
}


#[test]
fn singletons() {
    let base = class("Base", None, None);
    assert!(base.singleton().is_none());

    let singleton = Class::ensure_singleton(&base);
    assert!(singleton.is_singleton());
    assert!(Gc::ptr_eq(&singleton, &Class::ensure_singleton(&base)));

    let object = Value::object(base.clone());
    let instance = object.get_object().unwrap();
    let own = instance.ensure_singleton();
    assert!(own.is_singleton());
    assert!(Gc::ptr_eq(&own.superclass().unwrap(), &base));
    assert!(Gc::ptr_eq(&instance.class(), &base));
}


#[test]
fn cyclic_values() {
    let a = Value::array(vec![]);
    a.get_array().unwrap().borrow_mut().push(a.clone());
    let b = Value::array(vec![]);
    b.get_array().unwrap().borrow_mut().push(b.clone());

    assert!(a.user_eq(&b));
    assert!(a.user_eq(&a));
    assert_eq!(a.hash_key(), a.clone().hash_key());
    assert_eq!(a.hash_code(), a.hash_code());
}


#[test]
fn base_representation() {
    let stack = class("Stack", None, None);
    let items = Value::array(vec![Value::Int(1)]);
    let value = Value::Object(Gc::new(Instance::with_base(stack, items.clone())));

    assert_eq!(value.type_of(), Type::Object);
    assert!(value.representation().same(&items));
    assert_eq!(value.get_array().map(|x| x.borrow().len()), Some(1));
    assert!(value.get_str().is_none());
    assert!(Value::Int(1).representation().same(&Value::Int(1)));
}
