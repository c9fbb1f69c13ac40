use gc::Gc;
use rand::Rng;

use super::{arity, convert, need_block};
use crate::error::Error;
use crate::eval::Vm;
use crate::object::{gc_addr, Builtin, Class, Func, Value};
use crate::types::{Key, List, Type};


lazy_static! {
    /// Global functions, callable without a receiver from anywhere.
    pub static ref KERNEL: Vec<Builtin> = {
        let mut m = Vec::new();
        builtin!(m, "puts", puts);
        builtin!(m, "print", print);
        builtin!(m, "p", p);
        builtin!(m, "rand", rand);
        builtin!(m, "require", require);
        builtin!(m, "proc", proc);
        builtin!(m, "lambda", proc);
        m
    };

    /// Methods every value responds to.
    pub static ref OBJECT: Vec<Builtin> = {
        let mut m = Vec::new();
        builtin!(m, "class", class);
        builtin!(m, "inspect", inspect);
        builtin!(m, "to_s", to_s);
        builtin!(m, "hash", hash);
        builtin!(m, "==", eq);
        builtin!(m, "!=", ne);
        builtin!(m, "!", not);
        builtin!(m, "equal?", equal);
        builtin!(m, "===", eq);
        builtin!(m, "nil?", is_nil);
        builtin!(m, "respond_to?", respond_to);
        builtin!(m, "send", send);
        builtin!(m, "__send__", send);
        builtin!(m, "instance_variable_get", instance_variable_get);
        builtin!(m, "instance_variable_set", instance_variable_set);
        builtin!(m, "instance_variables", instance_variables);
        builtin!(m, "is_a?", is_a);
        builtin!(m, "kind_of?", is_a);
        builtin!(m, "instance_of?", instance_of);
        m
    };

    pub static ref NIL: Vec<Builtin> = {
        let mut m = Vec::new();
        builtin!(m, "to_s", nil_to_s);
        builtin!(m, "to_a", nil_to_a);
        builtin!(m, "inspect", nil_inspect);
        m
    };
}


// Output
// ------------------------------------------------------------------------------------------------

/// Collect the lines `puts` prints for one argument. Arrays are flattened.
fn puts_lines(vm: &mut Vm, value: &Value, lines: &mut Vec<String>) -> Result<(), Error> {
    match value {
        Value::Nil => lines.push(String::new()),
        Value::Array(items) => {
            let snapshot: List = items.borrow().clone();
            let marker = vm.guard_recursion(items.addr(), "[...]", |vm| {
                for item in &snapshot {
                    puts_lines(vm, item, lines)?;
                }
                Ok(String::new())
            })?;
            if !marker.is_empty() {
                lines.push(marker);
            }
        }
        other => lines.push(vm.to_s(other)?),
    }
    Ok(())
}

pub fn puts(vm: &mut Vm, _this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let mut lines = Vec::new();
    for arg in args {
        match arg {
            Value::Array(items) if items.borrow().is_empty() => lines.push(String::new()),
            _ => puts_lines(vm, arg, &mut lines)?,
        }
    }
    if args.is_empty() {
        lines.push(String::new());
    }

    let mut text = String::new();
    for line in lines {
        text.push_str(&line);
        if !line.ends_with('\n') {
            text.push('\n');
        }
    }
    vm.write(&text)?;
    Ok(Value::Nil)
}

pub fn print(vm: &mut Vm, _this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let mut text = String::new();
    for arg in args {
        if !arg.is_nil() {
            text.push_str(&vm.to_s(arg)?);
        }
    }
    vm.write(&text)?;
    Ok(Value::Nil)
}

pub fn p(vm: &mut Vm, _this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let mut text = String::new();
    for arg in args {
        text.push_str(&vm.inspect(arg)?);
        text.push('\n');
    }
    vm.write(&text)?;

    Ok(match args {
        [] => Value::Nil,
        [x] => x.clone(),
        _ => Value::array(args.to_vec()),
    })
}


// Other global functions
// ------------------------------------------------------------------------------------------------

pub fn rand(vm: &mut Vm, _this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    signature!(args = [] {
        return Ok(Value::Float(vm.rng().gen::<f64>()))
    });

    signature!(args = [n: int] {
        let n = n.saturating_abs();
        if n == 0 {
            return Ok(Value::Float(vm.rng().gen::<f64>()))
        }
        return Ok(Value::Int(vm.rng().gen_range(0..n)))
    });

    signature!(args = [x: float] {
        return Ok(Value::Float(vm.rng().gen::<f64>() * x))
    });

    signature!(args = [r: range] {
        let (low, high) = r;
        if low > high {
            return Ok(Value::Nil)
        }
        return Ok(Value::Int(vm.rng().gen_range(low..=high)))
    });

    signature!(args = [x: any] {
        return Err(convert(x, Type::Integer))
    });

    Err(arity(args, 0, Some(1)))
}

pub fn require(vm: &mut Vm, _this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    signature!(args = [path: str] {
        return vm.require(&path).map(Value::Bool)
    });

    signature!(args = [x: any] {
        return Err(convert(x, Type::String))
    });

    Err(arity(args, 1, Some(1)))
}

pub fn proc(_vm: &mut Vm, _this: &Value, args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    if !args.is_empty() {
        return Err(arity(args, 0, Some(0)));
    }
    Ok(Value::Proc(need_block(block)?.clone()))
}


// Object
// ------------------------------------------------------------------------------------------------

pub fn class(vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Class(vm.class_of(this)))
}

pub fn inspect(vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let object = match this {
        Value::Object(x) if !this.same(vm.main()) => x.clone(),
        _ => return to_s(vm, this, &[], None),
    };

    let ivars = object.ivars();
    if ivars.is_empty() {
        return Ok(Value::str(vm.default_to_s(this)));
    }

    let name = object.class().full_name();
    let text = vm.guard_recursion(gc_addr(&object), &format!("#<{} ...>", name), |vm| {
        let mut parts = Vec::with_capacity(ivars.len());
        for (key, value) in &ivars {
            parts.push(format!("{}={}", key.as_str(), vm.inspect(value)?));
        }
        Ok(format!("#<{} {}>", name, parts.join(", ")))
    })?;
    Ok(Value::str(text))
}

pub fn to_s(vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    if this.same(vm.main()) {
        return Ok(Value::str("main"));
    }
    Ok(Value::str(vm.default_to_s(this)))
}

pub fn hash(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Int(this.hash_code()))
}

pub fn eq(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    signature!(args = [other: any] {
        return Ok(Value::Bool(this.user_eq(other)))
    });

    Err(arity(args, 1, Some(1)))
}

pub fn ne(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let eq = vm.send(this, Key::new("=="), args, None)?;
    Ok(Value::Bool(!eq.truthy()))
}

pub fn not(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Bool(!this.truthy()))
}

pub fn equal(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    signature!(args = [other: any] {
        return Ok(Value::Bool(this.same(other)))
    });

    Err(arity(args, 1, Some(1)))
}

pub fn is_nil(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Bool(this.is_nil()))
}

pub fn respond_to(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    signature!(args = [name: name] {
        return Ok(Value::Bool(vm.responds_to(this, name)))
    });

    signature!(args = [x: any] {
        return Err(convert(x, Type::Symbol))
    });

    Err(arity(args, 1, Some(1)))
}

pub fn send(vm: &mut Vm, this: &Value, args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    match args.split_first() {
        Some((name, rest)) => {
            let name = name.get_name().ok_or_else(|| convert(name, Type::Symbol))?;
            vm.send(this, name, rest, block)
        }
        None => Err(arity(args, 1, None)),
    }
}

pub fn instance_variable_get(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    signature!(args = [name: name] {
        return Ok(vm.get_ivar(this, name))
    });

    signature!(args = [x: any] {
        return Err(convert(x, Type::Symbol))
    });

    Err(arity(args, 1, Some(1)))
}

pub fn instance_variable_set(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    signature!(args = [name: name, value: any] {
        vm.set_ivar(this, name, value.clone())?;
        return Ok(value.clone())
    });

    signature!(args = [x: any, _y: any] {
        return Err(convert(x, Type::Symbol))
    });

    Err(arity(args, 2, Some(2)))
}

pub fn instance_variables(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let names = match this {
        Value::Object(x) => x.ivars().into_iter().map(|(key, _)| Value::Symbol(key)).collect(),
        _ => vec![],
    };
    Ok(Value::array(names))
}

fn expect_class_arg(vm: &Vm, args: &[Value]) -> Result<Gc<Class>, Error> {
    match args {
        [x] => vm.expect_class(x),
        _ => Err(arity(args, 1, Some(1))),
    }
}

pub fn is_a(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let class = expect_class_arg(vm, args)?;
    Ok(Value::Bool(Class::is_subclass_of(&vm.class_of(this), &class)))
}

pub fn instance_of(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let class = expect_class_arg(vm, args)?;
    Ok(Value::Bool(Gc::ptr_eq(&vm.class_of(this), &class)))
}


// Nil
// ------------------------------------------------------------------------------------------------

pub fn nil_to_s(_vm: &mut Vm, _this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::str(""))
}

pub fn nil_to_a(_vm: &mut Vm, _this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::array(vec![]))
}

pub fn nil_inspect(_vm: &mut Vm, _this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::str("nil"))
}
