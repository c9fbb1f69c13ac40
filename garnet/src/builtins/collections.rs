use std::cmp::Ordering;

use super::{arity, convert, need_block, normalize_index, normalize_slice, range_slice, too_big};
use crate::error::{Argument, Error, Reason};
use crate::eval::Vm;
use crate::object::{Builtin, Func, HashEntry, HashTable, Value};
use crate::types::{GcCell, Key, List, Type};


lazy_static! {
    pub static ref ARRAY: Vec<Builtin> = {
        let mut m = Vec::new();
        builtin!(m, "[]", array_index);
        builtin!(m, "[]=", array_set);
        builtin!(m, "<<", array_push_one);
        builtin!(m, "push", array_push);
        builtin!(m, "append", array_push);
        builtin!(m, "pop", array_pop);
        builtin!(m, "clear", array_clear);
        builtin!(m, "first", array_first);
        builtin!(m, "last", array_last);
        builtin!(m, "each", array_each);
        builtin!(m, "each_with_index", array_each_with_index);
        builtin!(m, "map", array_map);
        builtin!(m, "collect", array_map);
        builtin!(m, "select", array_select);
        builtin!(m, "filter", array_select);
        builtin!(m, "reject", array_reject);
        builtin!(m, "reduce", array_reduce);
        builtin!(m, "inject", array_reduce);
        builtin!(m, "sum", array_sum);
        builtin!(m, "sort", array_sort);
        builtin!(m, "min", array_min);
        builtin!(m, "max", array_max);
        builtin!(m, "size", array_size);
        builtin!(m, "length", array_size);
        builtin!(m, "empty?", array_is_empty);
        builtin!(m, "include?", array_include);
        builtin!(m, "join", array_join);
        builtin!(m, "to_s", array_inspect);
        builtin!(m, "inspect", array_inspect);
        builtin!(m, "to_a", array_to_a);
        builtin!(m, "reverse", array_reverse);
        builtin!(m, "+", array_concat);
        builtin!(m, "==", array_eq);
        m
    };

    pub static ref HASH: Vec<Builtin> = {
        let mut m = Vec::new();
        builtin!(m, "[]", hash_index);
        builtin!(m, "[]=", hash_set);
        builtin!(m, "store", hash_set);
        builtin!(m, "delete", hash_delete);
        builtin!(m, "clear", hash_clear);
        builtin!(m, "size", hash_size);
        builtin!(m, "length", hash_size);
        builtin!(m, "empty?", hash_is_empty);
        builtin!(m, "key?", hash_has_key);
        builtin!(m, "has_key?", hash_has_key);
        builtin!(m, "include?", hash_has_key);
        builtin!(m, "member?", hash_has_key);
        builtin!(m, "keys", hash_keys);
        builtin!(m, "values", hash_values);
        builtin!(m, "each", hash_each);
        builtin!(m, "each_pair", hash_each);
        builtin!(m, "map", hash_map);
        builtin!(m, "merge", hash_merge);
        builtin!(m, "to_a", hash_to_a);
        builtin!(m, "to_s", hash_inspect);
        builtin!(m, "inspect", hash_inspect);
        builtin!(m, "==", hash_eq);
        m
    };

    pub static ref RANGE: Vec<Builtin> = {
        let mut m = Vec::new();
        builtin!(m, "each", range_each);
        builtin!(m, "map", range_map);
        builtin!(m, "select", range_select);
        builtin!(m, "to_a", range_to_a);
        builtin!(m, "first", range_first);
        builtin!(m, "begin", range_first);
        builtin!(m, "last", range_last);
        builtin!(m, "size", range_size);
        builtin!(m, "count", range_size);
        builtin!(m, "sum", range_sum);
        builtin!(m, "include?", range_include);
        builtin!(m, "member?", range_include);
        builtin!(m, "===", range_include);
        builtin!(m, "to_s", range_to_s);
        builtin!(m, "inspect", range_to_s);
        m
    };

    pub static ref PROC: Vec<Builtin> = {
        let mut m = Vec::new();
        builtin!(m, "call", proc_call);
        builtin!(m, "()", proc_call);
        builtin!(m, "yield", proc_call);
        builtin!(m, "[]", proc_call);
        builtin!(m, "to_proc", proc_to_proc);
        builtin!(m, "arity", proc_arity);
        m
    };
}


// Utilities
// ------------------------------------------------------------------------------------------------

fn this_array(this: &Value) -> Result<&GcCell<List>, Error> {
    this.get_array().ok_or_else(|| convert(this, Type::Array))
}

fn this_hash(this: &Value) -> Result<&GcCell<HashTable>, Error> {
    this.get_hash().ok_or_else(|| convert(this, Type::Hash))
}

fn this_range(this: &Value) -> Result<(i64, i64), Error> {
    this.get_range().ok_or_else(|| convert(this, Type::Range))
}

fn single(args: &[Value]) -> Result<&Value, Error> {
    match args {
        [x] => Ok(x),
        _ => Err(arity(args, 1, Some(1))),
    }
}

fn equals(vm: &mut Vm, x: &Value, y: &Value) -> Result<bool, Error> {
    Ok(vm.send(x, Key::new("=="), &[y.clone()], None)?.truthy())
}

/// Order two values through `<=>`.
fn compare(vm: &mut Vm, x: &Value, y: &Value) -> Result<Ordering, Error> {
    match vm.send(x, Key::new("<=>"), &[y.clone()], None)? {
        Value::Int(c) => Ok(c.cmp(&0)),
        _ => Err(Error::new(Argument::Invalid("comparison failed"))),
    }
}

/// Call a block once per element. The array is re-read on every step, so
/// the block may modify it.
fn for_each_item(
    vm: &mut Vm,
    this: &Value,
    block: &Func,
    mut f: impl FnMut(&mut Vm, usize, Value, Value) -> Result<(), Error>,
) -> Result<(), Error> {
    let items = this_array(this)?;
    let mut i = 0;
    loop {
        let item = items.borrow().get(i).cloned();
        let item = match item {
            Some(item) => item,
            None => return Ok(()),
        };
        let result = block.invoke(vm, this, &[item.clone()], None)?;
        f(vm, i, item, result)?;
        i += 1;
    }
}

fn inspect_list(vm: &mut Vm, items: &GcCell<List>) -> Result<String, Error> {
    let snapshot = items.borrow().clone();
    vm.guard_recursion(items.addr(), "[...]", |vm| {
        let mut parts = Vec::with_capacity(snapshot.len());
        for item in &snapshot {
            parts.push(vm.inspect(item)?);
        }
        Ok(format!("[{}]", parts.join(", ")))
    })
}

fn join_list(vm: &mut Vm, items: &GcCell<List>, sep: &str) -> Result<String, Error> {
    let snapshot = items.borrow().clone();
    vm.guard_recursion(items.addr(), "[...]", |vm| {
        let mut parts = Vec::with_capacity(snapshot.len());
        for item in &snapshot {
            match item {
                Value::Array(inner) => parts.push(join_list(vm, inner, sep)?),
                Value::Nil => parts.push(String::new()),
                other => parts.push(vm.to_s(other)?),
            }
        }
        Ok(parts.join(sep))
    })
}


// Array
// ------------------------------------------------------------------------------------------------

/// Element access by index, by start and length, or by range. Reading out of
/// range gives `nil`.
pub fn array_index(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let items = this_array(this)?.borrow();

    signature!(args = [i: int] {
        return Ok(normalize_index(i, items.len()).map(|i| items[i].clone()).into())
    });

    signature!(args = [start: int, count: int] {
        return Ok(normalize_slice(start, count, items.len())
            .map(|(start, end)| Value::array(items[start..end].to_vec()))
            .into())
    });

    signature!(args = [r: range] {
        let (low, high) = r;
        return Ok(range_slice(low, high, items.len())
            .map(|(start, end)| Value::array(items[start..end].to_vec()))
            .into())
    });

    signature!(args = [x: any] {
        return Err(convert(x, Type::Integer))
    });

    Err(arity(args, 1, Some(2)))
}

/// Assign by index. Writing past the end pads the array with `nil`.
pub fn array_set(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let items = this_array(this)?;

    signature!(args = [i: int, value: any] {
        let mut items = items.borrow_mut();
        let len = items.len() as i64;
        let index = if i < 0 { i + len } else { i };
        if index < 0 {
            return Err(Error::new(Reason::Index(i)))
        }
        let index = usize::try_from(index).map_err(|_| Error::new(Reason::Index(i)))?;
        if index >= items.len() {
            let extra = index - items.len() + 1;
            items.try_reserve(extra).map_err(too_big)?;
            items.resize(index + 1, Value::Nil);
        }
        items[index] = value.clone();
        return Ok(value.clone())
    });

    signature!(args = [x: any, _value: any] {
        return Err(convert(x, Type::Integer))
    });

    Err(arity(args, 2, Some(2)))
}

pub fn array_push_one(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let value = single(args)?;
    this_array(this)?.borrow_mut().push(value.clone());
    Ok(this.clone())
}

pub fn array_push(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    this_array(this)?.borrow_mut().extend(args.iter().cloned());
    Ok(this.clone())
}

pub fn array_pop(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(this_array(this)?.borrow_mut().pop().into())
}

pub fn array_clear(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    this_array(this)?.borrow_mut().clear();
    Ok(this.clone())
}

pub fn array_first(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let items = this_array(this)?.borrow();

    signature!(args = [] {
        return Ok(items.first().cloned().into())
    });

    signature!(args = [n: int] {
        if n < 0 {
            return Err(Error::new(Argument::Negative(n)))
        }
        let n = (n as usize).min(items.len());
        return Ok(Value::array(items[..n].to_vec()))
    });

    signature!(args = [x: any] {
        return Err(convert(x, Type::Integer))
    });

    Err(arity(args, 0, Some(1)))
}

pub fn array_last(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let items = this_array(this)?.borrow();

    signature!(args = [] {
        return Ok(items.last().cloned().into())
    });

    signature!(args = [n: int] {
        if n < 0 {
            return Err(Error::new(Argument::Negative(n)))
        }
        let n = (n as usize).min(items.len());
        return Ok(Value::array(items[items.len() - n..].to_vec()))
    });

    signature!(args = [x: any] {
        return Err(convert(x, Type::Integer))
    });

    Err(arity(args, 0, Some(1)))
}

pub fn array_each(vm: &mut Vm, this: &Value, _args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let block = need_block(block)?;
    for_each_item(vm, this, block, |_, _, _, _| Ok(()))?;
    Ok(this.clone())
}

pub fn array_each_with_index(vm: &mut Vm, this: &Value, _args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let block = need_block(block)?;
    let items = this_array(this)?;
    let mut i = 0;
    loop {
        let item = items.borrow().get(i).cloned();
        match item {
            Some(item) => block.invoke(vm, this, &[item, Value::Int(i as i64)], None)?,
            None => break,
        };
        i += 1;
    }
    Ok(this.clone())
}

pub fn array_map(vm: &mut Vm, this: &Value, _args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let block = need_block(block)?;
    let mut ret = List::new();
    for_each_item(vm, this, block, |_, _, _, result| {
        ret.push(result);
        Ok(())
    })?;
    Ok(Value::array(ret))
}

pub fn array_select(vm: &mut Vm, this: &Value, _args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let block = need_block(block)?;
    let mut ret = List::new();
    for_each_item(vm, this, block, |_, _, item, result| {
        if result.truthy() {
            ret.push(item);
        }
        Ok(())
    })?;
    Ok(Value::array(ret))
}

pub fn array_reject(vm: &mut Vm, this: &Value, _args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let block = need_block(block)?;
    let mut ret = List::new();
    for_each_item(vm, this, block, |_, _, item, result| {
        if !result.truthy() {
            ret.push(item);
        }
        Ok(())
    })?;
    Ok(Value::array(ret))
}

/// Fold the elements with a block, or with a method named by a symbol. Without
/// an initial value the first element is the start.
pub fn array_reduce(vm: &mut Vm, this: &Value, args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let items = this_array(this)?.borrow().clone();

    let (initial, op) = match (args, block) {
        ([], Some(_)) => (None, None),
        ([init], Some(_)) => (Some(init.clone()), None),
        ([Value::Symbol(op)], None) => (None, Some(*op)),
        ([init, Value::Symbol(op)], None) => (Some(init.clone()), Some(*op)),
        ([_, x], None) => return Err(convert(x, Type::Symbol)),
        ([], None) | ([_], None) => return Err(Error::new(Argument::NoBlock)),
        _ => return Err(arity(args, 0, Some(2))),
    };

    let mut rest = items.into_iter();
    let mut acc = match initial {
        Some(init) => init,
        None => match rest.next() {
            Some(first) => first,
            None => return Ok(Value::Nil),
        },
    };

    for item in rest {
        acc = match (op, block) {
            (Some(op), _) => vm.send(&acc, op, &[item], None)?,
            (None, Some(block)) => block.invoke(vm, this, &[acc, item], None)?,
            (None, None) => return Err(Error::new(Argument::NoBlock)),
        };
    }
    Ok(acc)
}

pub fn array_sum(vm: &mut Vm, this: &Value, args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let items = this_array(this)?.borrow().clone();
    let mut acc = match args {
        [] => Value::Int(0),
        [init] => init.clone(),
        _ => return Err(arity(args, 0, Some(1))),
    };
    let plus = Key::new("+");
    for item in items {
        let item = match block {
            Some(block) => block.invoke(vm, this, &[item], None)?,
            None => item,
        };
        acc = vm.send(&acc, plus, &[item], None)?;
    }
    Ok(acc)
}

/// Merge sort, so that a failing comparison can abort the sort.
fn sort_values(vm: &mut Vm, items: List) -> Result<List, Error> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = sort_values(vm, left)?;
    let right = sort_values(vm, right)?;

    let mut ret = List::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(x), Some(y)) = (left.peek(), right.peek()) {
        if compare(vm, y, x)? == Ordering::Less {
            ret.extend(right.next());
        } else {
            ret.extend(left.next());
        }
    }
    ret.extend(left);
    ret.extend(right);
    Ok(ret)
}

pub fn array_sort(vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let items = this_array(this)?.borrow().clone();
    Ok(Value::array(sort_values(vm, items)?))
}

fn extreme(vm: &mut Vm, this: &Value, wanted: Ordering) -> Result<Value, Error> {
    let items = this_array(this)?.borrow().clone();
    let mut best: Option<Value> = None;
    for item in items {
        best = match best {
            Some(current) if compare(vm, &item, &current)? != wanted => Some(current),
            _ => Some(item),
        };
    }
    Ok(best.into())
}

pub fn array_min(vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    extreme(vm, this, Ordering::Less)
}

pub fn array_max(vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    extreme(vm, this, Ordering::Greater)
}

pub fn array_size(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Int(this_array(this)?.borrow().len() as i64))
}

pub fn array_is_empty(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Bool(this_array(this)?.borrow().is_empty()))
}

pub fn array_include(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let needle = single(args)?;
    let items = this_array(this)?.borrow().clone();
    for item in &items {
        if equals(vm, item, needle)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

pub fn array_join(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let items = this_array(this)?;

    signature!(args = [] {
        return join_list(vm, items, "").map(Value::str)
    });

    signature!(args = [sep: str] {
        return join_list(vm, items, &sep).map(Value::str)
    });

    signature!(args = [x: any] {
        return Err(convert(x, Type::String))
    });

    Err(arity(args, 0, Some(1)))
}

pub fn array_inspect(vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    inspect_list(vm, this_array(this)?).map(Value::str)
}

pub fn array_to_a(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(this.clone())
}

pub fn array_reverse(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let items = this_array(this)?.borrow();
    Ok(Value::array(items.iter().rev().cloned().collect()))
}

pub fn array_concat(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let other = single(args)?;
    let other = other.get_array().ok_or_else(|| convert(other, Type::Array))?;
    let mut ret = this_array(this)?.borrow().clone();
    ret.extend(other.borrow().iter().cloned());
    Ok(Value::array(ret))
}

pub fn array_eq(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let items = this_array(this)?;
    let other = match single(args)?.get_array() {
        Some(other) => other,
        None => return Ok(Value::Bool(false)),
    };
    if items.same(other) {
        return Ok(Value::Bool(true));
    }

    let xs = items.borrow().clone();
    let ys = other.borrow().clone();
    if xs.len() != ys.len() {
        return Ok(Value::Bool(false));
    }
    let same = vm.guard_comparison((items.addr(), other.addr()), |vm| {
        for (x, y) in xs.iter().zip(ys.iter()) {
            if !equals(vm, x, y)? {
                return Ok(false);
            }
        }
        Ok(true)
    })?;
    Ok(Value::Bool(same))
}


// Hash
// ------------------------------------------------------------------------------------------------

fn pairs(table: &GcCell<HashTable>) -> Vec<(Value, Value)> {
    table
        .borrow()
        .values()
        .map(|entry| (entry.key.clone(), entry.value.clone()))
        .collect()
}

pub fn hash_index(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let key = single(args)?;
    let table = this_hash(this)?.borrow();
    Ok(table.get(&key.hash_key()).map(|entry| entry.value.clone()).into())
}

pub fn hash_set(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let (key, value) = match args {
        [key, value] => (key, value),
        _ => return Err(arity(args, 2, Some(2))),
    };

    let mut table = this_hash(this)?.borrow_mut();
    let hash_key = key.hash_key();
    match table.get_mut(&hash_key) {
        Some(entry) => entry.value = value.clone(),
        None => {
            table.insert(hash_key, HashEntry::new(key, value.clone()));
        }
    }
    Ok(value.clone())
}

pub fn hash_delete(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let key = single(args)?;
    let removed = this_hash(this)?.borrow_mut().remove(&key.hash_key());
    Ok(removed.map(|entry| entry.value.clone()).into())
}

pub fn hash_clear(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    this_hash(this)?.borrow_mut().clear();
    Ok(this.clone())
}

pub fn hash_size(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Int(this_hash(this)?.borrow().len() as i64))
}

pub fn hash_is_empty(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Bool(this_hash(this)?.borrow().is_empty()))
}

pub fn hash_has_key(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let key = single(args)?;
    Ok(Value::Bool(this_hash(this)?.borrow().contains_key(&key.hash_key())))
}

pub fn hash_keys(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let table = this_hash(this)?.borrow();
    Ok(Value::array(table.values().map(|entry| entry.key.clone()).collect()))
}

pub fn hash_values(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let table = this_hash(this)?.borrow();
    Ok(Value::array(table.values().map(|entry| entry.value.clone()).collect()))
}

/// Each entry is passed as one `[key, value]` array, which a block with two
/// parameters spreads.
pub fn hash_each(vm: &mut Vm, this: &Value, _args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let block = need_block(block)?;
    for (key, value) in pairs(this_hash(this)?) {
        block.invoke(vm, this, &[Value::array(vec![key, value])], None)?;
    }
    Ok(this.clone())
}

pub fn hash_map(vm: &mut Vm, this: &Value, _args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let block = need_block(block)?;
    let mut ret = List::new();
    for (key, value) in pairs(this_hash(this)?) {
        ret.push(block.invoke(vm, this, &[Value::array(vec![key, value])], None)?);
    }
    Ok(Value::array(ret))
}

pub fn hash_merge(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let other = single(args)?;
    let other = other.get_hash().ok_or_else(|| convert(other, Type::Hash))?;
    let mut ret = pairs(this_hash(this)?);
    ret.extend(pairs(other));
    Ok(Value::hash_from_pairs(ret))
}

pub fn hash_to_a(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let ret = pairs(this_hash(this)?)
        .into_iter()
        .map(|(key, value)| Value::array(vec![key, value]))
        .collect();
    Ok(Value::array(ret))
}

pub fn hash_inspect(vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let table = this_hash(this)?;
    let entries = pairs(table);
    let text = vm.guard_recursion(table.addr(), "{...}", |vm| {
        let mut parts = Vec::with_capacity(entries.len());
        for (key, value) in &entries {
            parts.push(format!("{}=>{}", vm.inspect(key)?, vm.inspect(value)?));
        }
        Ok(format!("{{{}}}", parts.join(", ")))
    })?;
    Ok(Value::str(text))
}

pub fn hash_eq(vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let table = this_hash(this)?;
    let other = match single(args)?.get_hash() {
        Some(other) => other,
        None => return Ok(Value::Bool(false)),
    };
    if table.same(other) {
        return Ok(Value::Bool(true));
    }
    if table.borrow().len() != other.borrow().len() {
        return Ok(Value::Bool(false));
    }

    let entries = pairs(table);
    let same = vm.guard_comparison((table.addr(), other.addr()), |vm| {
        for (key, value) in &entries {
            let theirs = other.borrow().get(&key.hash_key()).map(|entry| entry.value.clone());
            match theirs {
                Some(theirs) if equals(vm, value, &theirs)? => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    })?;
    Ok(Value::Bool(same))
}


// Range
// ------------------------------------------------------------------------------------------------

fn range_values(this: &Value) -> Result<impl Iterator<Item = Value>, Error> {
    let (low, high) = this_range(this)?;
    Ok((low..=high).map(Value::Int))
}

pub fn range_each(vm: &mut Vm, this: &Value, _args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let block = need_block(block)?;
    for i in range_values(this)? {
        block.invoke(vm, this, &[i], None)?;
    }
    Ok(this.clone())
}

pub fn range_map(vm: &mut Vm, this: &Value, _args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let block = need_block(block)?;
    let mut ret = List::new();
    for i in range_values(this)? {
        ret.push(block.invoke(vm, this, &[i], None)?);
    }
    Ok(Value::array(ret))
}

pub fn range_select(vm: &mut Vm, this: &Value, _args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let block = need_block(block)?;
    let mut ret = List::new();
    for i in range_values(this)? {
        if block.invoke(vm, this, &[i.clone()], None)?.truthy() {
            ret.push(i);
        }
    }
    Ok(Value::array(ret))
}

pub fn range_to_a(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::array(range_values(this)?.collect()))
}

pub fn range_first(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let (low, _) = this_range(this)?;

    signature!(args = [] {
        return Ok(Value::Int(low))
    });

    signature!(args = [n: int] {
        if n < 0 {
            return Err(Error::new(Argument::Negative(n)))
        }
        return Ok(Value::array(range_values(this)?.take(n as usize).collect()))
    });

    signature!(args = [x: any] {
        return Err(convert(x, Type::Integer))
    });

    Err(arity(args, 0, Some(1)))
}

pub fn range_last(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let (low, high) = this_range(this)?;

    signature!(args = [] {
        return Ok(Value::Int(high))
    });

    signature!(args = [n: int] {
        if n < 0 {
            return Err(Error::new(Argument::Negative(n)))
        }
        let start = high.saturating_sub(n).saturating_add(1).max(low);
        return Ok(Value::array((start..=high).map(Value::Int).collect()))
    });

    signature!(args = [x: any] {
        return Err(convert(x, Type::Integer))
    });

    Err(arity(args, 0, Some(1)))
}

pub fn range_size(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let (low, high) = this_range(this)?;
    let size = (high as i128 - low as i128 + 1).max(0);
    i64::try_from(size)
        .map(Value::Int)
        .map_err(|_| Error::new(Reason::Overflow))
}

pub fn range_sum(vm: &mut Vm, this: &Value, _args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let plus = Key::new("+");
    let mut acc = Value::Int(0);
    for i in range_values(this)? {
        let item = match block {
            Some(block) => block.invoke(vm, this, &[i], None)?,
            None => i,
        };
        acc = vm.send(&acc, plus, &[item], None)?;
    }
    Ok(acc)
}

pub fn range_include(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let (low, high) = this_range(this)?;
    let contained = match single(args)? {
        Value::Int(x) => low <= *x && *x <= high,
        Value::Float(x) => (low as f64) <= *x && *x <= (high as f64),
        _ => false,
    };
    Ok(Value::Bool(contained))
}

pub fn range_to_s(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let (low, high) = this_range(this)?;
    Ok(Value::str(format!("{}..{}", low, high)))
}


// Proc
// ------------------------------------------------------------------------------------------------

fn this_proc(this: &Value) -> Result<&Func, Error> {
    this.get_proc().ok_or_else(|| convert(this, Type::Proc))
}

pub fn proc_call(vm: &mut Vm, this: &Value, args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    this_proc(this)?.invoke(vm, this, args, block)
}

pub fn proc_to_proc(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(this.clone())
}

/// Number of declared parameters, or -1 for native procs.
pub fn proc_arity(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Int(this_proc(this)?.arity().map_or(-1, |n| n as i64)))
}
