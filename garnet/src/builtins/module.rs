use std::collections::HashSet;

use gc::Gc;

use super::{arity, convert, need_block, too_big};
use crate::error::{Argument, Error, Reason, TypeMismatch};
use crate::eval::Vm;
use crate::object::{Builtin, Class, Func, Instance, Value};
use crate::types::{Key, List, Type};


lazy_static! {
    /// Methods of every class and module.
    pub static ref MODULE: Vec<Builtin> = {
        let mut m = Vec::new();
        builtin!(m, "name", name);
        builtin!(m, "to_s", name);
        builtin!(m, "inspect", name);
        builtin!(m, "===", case_eq);
        builtin!(m, "attr_accessor", attr_accessor);
        builtin!(m, "attr_reader", attr_reader);
        builtin!(m, "attr_writer", attr_writer);
        builtin!(m, "instance_methods", instance_methods);
        builtin!(m, "method_defined?", method_defined);
        builtin!(m, "const_get", const_get);
        builtin!(m, "ancestors", ancestors);
        m
    };

    /// Methods of classes only.
    pub static ref CLASS: Vec<Builtin> = {
        let mut m = Vec::new();
        builtin!(m, "new", new);
        builtin!(m, "superclass", superclass);
        m
    };
}


fn this_class(vm: &Vm, this: &Value) -> Result<Gc<Class>, Error> {
    vm.expect_class(this)
}

pub fn name(vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::str(this_class(vm, this)?.full_name()))
}

pub fn case_eq(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let class = this_class(vm, this)?;
    match args {
        [x] => Ok(Value::Bool(Class::is_subclass_of(&vm.class_of(x), &class))),
        _ => Err(arity(args, 1, Some(1))),
    }
}


// Attribute accessors
// ------------------------------------------------------------------------------------------------

fn attribute_names(args: &[Value]) -> Result<Vec<Key>, Error> {
    args.iter()
        .map(|arg| arg.get_name().ok_or_else(|| convert(arg, Type::Symbol)))
        .collect()
}

fn define_reader(class: &Gc<Class>, name: Key) -> Value {
    let ivar = Key::new(format!("@{}", name.as_str()));
    class.set_method(name, Func::native(move |vm, this, _args, _block| Ok(vm.get_ivar(this, ivar))));
    Value::Symbol(name)
}

fn define_writer(class: &Gc<Class>, name: Key) -> Value {
    let ivar = Key::new(format!("@{}", name.as_str()));
    let setter = Key::new(format!("{}=", name.as_str()));
    class.set_method(
        setter,
        Func::native(move |vm, this, args, _block| match args {
            [value] => {
                vm.set_ivar(this, ivar, value.clone())?;
                Ok(value.clone())
            }
            _ => Err(arity(args, 1, Some(1))),
        }),
    );
    Value::Symbol(setter)
}

pub fn attr_accessor(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let class = this_class(vm, this)?;
    let mut defined = List::new();
    for name in attribute_names(args)? {
        defined.push(define_reader(&class, name));
        defined.push(define_writer(&class, name));
    }
    Ok(Value::array(defined))
}

pub fn attr_reader(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let class = this_class(vm, this)?;
    let defined = attribute_names(args)?
        .into_iter()
        .map(|name| define_reader(&class, name))
        .collect();
    Ok(Value::array(defined))
}

pub fn attr_writer(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let class = this_class(vm, this)?;
    let defined = attribute_names(args)?
        .into_iter()
        .map(|name| define_writer(&class, name))
        .collect();
    Ok(Value::array(defined))
}


// Reflection
// ------------------------------------------------------------------------------------------------

/// Names of public instance methods, excluding constructors. With inherited
/// methods included, the walk stops before `Object` so that the core methods
/// every value has are not listed.
pub fn instance_methods(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let class = this_class(vm, this)?;
    let inherit = match args {
        [] => true,
        [flag] => flag.truthy(),
        _ => return Err(arity(args, 0, Some(1))),
    };

    let object = vm.classes().object.clone();
    let classes: Vec<Gc<Class>> = if inherit {
        Class::ancestors(&class)
            .into_iter()
            .take_while(|c| Gc::ptr_eq(c, &class) || !Gc::ptr_eq(c, &object))
            .collect()
    } else {
        vec![class]
    };

    let mut seen = HashSet::new();
    let mut names = List::new();
    for c in classes {
        for name in c.method_names() {
            let constructor = c.own_method(name).map_or(false, |f| f.is_constructor());
            if !constructor && seen.insert(name) {
                names.push(Value::Symbol(name));
            }
        }
    }
    Ok(Value::array(names))
}

pub fn method_defined(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let class = this_class(vm, this)?;

    signature!(args = [name: name] {
        return Ok(Value::Bool(class.find_method(name).is_some()))
    });

    signature!(args = [x: any] {
        return Err(convert(x, Type::Symbol))
    });

    Err(arity(args, 1, Some(1)))
}

/// Look a constant up in a class and its superclasses. Qualified names
/// (`"A::B"`) are resolved segment by segment.
pub fn const_get(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let class = this_class(vm, this)?;
    let path = match args {
        [x] => x.get_name().ok_or_else(|| convert(x, Type::Symbol))?,
        _ => return Err(arity(args, 1, Some(1))),
    };

    let mut current = Value::Class(class);
    for segment in path.as_str().split("::").filter(|s| !s.is_empty()) {
        let key = Key::new(segment);
        let scope = vm.expect_class(&current)?;
        current = Class::ancestors(&scope)
            .iter()
            .find_map(|c| c.constant(key))
            .ok_or_else(|| Error::new(Reason::UninitializedConstant(key)))?;
    }
    Ok(current)
}

pub fn ancestors(vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let class = this_class(vm, this)?;
    Ok(Value::array(Class::ancestors(&class).into_iter().map(Value::Class).collect()))
}


// Class
// ------------------------------------------------------------------------------------------------

pub fn superclass(vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(this_class(vm, this)?.superclass().into())
}

/// Which built-in representation instances of a class need.
enum Layout {
    Array,
    String,
    Hash,
    Range,
    Proc,
    Object,
}

/// The nearest value class among the ancestors decides the layout. Classes
/// whose values only come from literals give `None`.
fn layout(vm: &Vm, class: &Gc<Class>) -> Option<Layout> {
    let c = vm.classes();
    if class.is_module() || class.is_singleton() {
        return None;
    }

    let literal_only = [&c.integer, &c.float, &c.numeric, &c.symbol, &c.nil, &c.true_class, &c.false_class, &c.class, &c.module];
    for ancestor in Class::ancestors(class) {
        let is = |other: &Gc<Class>| Gc::ptr_eq(&ancestor, other);
        let layout = if is(&c.array) {
            Layout::Array
        } else if is(&c.string) {
            Layout::String
        } else if is(&c.hash) {
            Layout::Hash
        } else if is(&c.range) {
            Layout::Range
        } else if is(&c.proc) {
            Layout::Proc
        } else if literal_only.into_iter().any(is) {
            return None;
        } else {
            continue;
        };
        return Some(layout);
    }
    Some(Layout::Object)
}

fn new_array(vm: &mut Vm, this: &Value, args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    signature!(args = [] {
        return Ok(Value::array(vec![]))
    });

    signature!(args = [items: array] {
        return Ok(Value::array(items.borrow().clone()))
    });

    let (size, fill) = match args {
        [Value::Int(n)] => (*n, Value::Nil),
        [Value::Int(n), fill] => (*n, fill.clone()),
        [x] | [x, _] => return Err(convert(x, Type::Integer)),
        _ => return Err(arity(args, 0, Some(2))),
    };
    if size < 0 {
        return Err(Error::new(Argument::Negative(size)));
    }

    let count = usize::try_from(size).map_err(|_| Error::new(Reason::Overflow))?;
    let mut items = List::new();
    items.try_reserve_exact(count).map_err(too_big)?;
    for i in 0..size {
        match block {
            Some(block) => items.push(block.invoke(vm, this, &[Value::Int(i)], None)?),
            None => items.push(fill.clone()),
        }
    }
    Ok(Value::array(items))
}

fn new_range(args: &[Value]) -> Result<Value, Error> {
    let (low, high, exclusive) = match args {
        [low, high] => (low, high, false),
        [low, high, exclusive] => (low, high, exclusive.truthy()),
        _ => return Err(arity(args, 2, Some(3))),
    };
    match (low, high) {
        (Value::Int(low), Value::Int(high)) => {
            let high = if exclusive { high.saturating_sub(1) } else { *high };
            Ok(Value::Range(*low, high))
        }
        (Value::Int(_), other) | (other, _) => Err(Error::new(TypeMismatch::RangeBounds(other.type_of()))),
    }
}

/// Allocate an instance and run its `initialize` method with the arguments.
/// Built-in value classes construct their own representation; classes whose
/// values only come from literals can't be instantiated.
pub fn new(vm: &mut Vm, this: &Value, args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let class = this_class(vm, this)?;
    let layout = layout(vm, &class).ok_or_else(|| vm.no_method(this, Key::new("new")))?;

    let value = match layout {
        Layout::Array => new_array(vm, this, args, block),

        Layout::String => match args {
            [] => Ok(Value::str("")),
            [Value::Str(x)] => Ok(Value::str(x.borrow().clone())),
            [x] => Err(convert(x, Type::String)),
            _ => Err(arity(args, 0, Some(1))),
        },

        Layout::Hash => match args {
            [] => Ok(Value::hash(Default::default())),
            _ => Err(arity(args, 0, Some(0))),
        },

        Layout::Range => new_range(args),

        Layout::Proc => Ok(Value::Proc(need_block(block)?.clone())),

        Layout::Object => {
            let object = Value::object(class.clone());
            match vm.find_method_for(&object, Key::new("initialize")) {
                Some(init) => {
                    init.invoke(vm, &object, args, block)?;
                }
                None if !args.is_empty() => return Err(arity(args, 0, Some(0))),
                None => {}
            }
            return Ok(object);
        }
    }?;

    // Instances of subclasses wrap the built-in value
    if Gc::ptr_eq(&vm.class_of(&value), &class) {
        Ok(value)
    } else {
        Ok(Value::Object(Gc::new(Instance::with_base(class, value))))
    }
}
