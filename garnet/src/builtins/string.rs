use std::cmp::Ordering;

use super::{arity, convert, normalize_index, normalize_slice, range_slice, too_big};
use crate::error::{Argument, Error, Reason};
use crate::eval::Vm;
use crate::object::{Builtin, Func, Value};
use crate::types::{Key, Type};


lazy_static! {
    pub static ref STRING: Vec<Builtin> = {
        let mut m = Vec::new();
        builtin!(m, "+", add);
        builtin!(m, "*", mul);
        builtin!(m, "<=>", cmp);
        builtin!(m, "<", lt);
        builtin!(m, ">", gt);
        builtin!(m, "<=", le);
        builtin!(m, ">=", ge);
        builtin!(m, "length", length);
        builtin!(m, "size", length);
        builtin!(m, "upcase", upcase);
        builtin!(m, "downcase", downcase);
        builtin!(m, "capitalize", capitalize);
        builtin!(m, "reverse", reverse);
        builtin!(m, "strip", strip);
        builtin!(m, "to_s", to_s);
        builtin!(m, "to_str", to_s);
        builtin!(m, "to_sym", to_sym);
        builtin!(m, "to_i", to_i);
        builtin!(m, "to_f", to_f);
        builtin!(m, "inspect", inspect);
        builtin!(m, "include?", include);
        builtin!(m, "empty?", is_empty);
        builtin!(m, "start_with?", start_with);
        builtin!(m, "end_with?", end_with);
        builtin!(m, "[]", index);
        builtin!(m, "<<", append);
        builtin!(m, "concat", append);
        builtin!(m, "split", split);
        builtin!(m, "chars", chars);
        m
    };

    pub static ref SYMBOL: Vec<Builtin> = {
        let mut m = Vec::new();
        builtin!(m, "to_s", sym_to_s);
        builtin!(m, "id2name", sym_to_s);
        builtin!(m, "name", sym_to_s);
        builtin!(m, "to_sym", sym_to_sym);
        builtin!(m, "to_proc", sym_to_proc);
        builtin!(m, "inspect", sym_inspect);
        builtin!(m, "length", sym_length);
        builtin!(m, "size", sym_length);
        builtin!(m, "<=>", sym_cmp);
        m
    };
}


/// A proc that calls the named method on its first argument, passing the
/// rest along. This is what `&:name` turns into.
pub(crate) fn symbol_proc(name: Key) -> Func {
    Func::native(move |vm, _this, args, block| match args.split_first() {
        Some((receiver, rest)) => vm.send(receiver, name, rest, block),
        None => Err(arity(args, 1, None)),
    })
}

/// Quote a string the way `inspect` shows it.
pub(crate) fn inspect_str(s: &str) -> String {
    let mut ret = String::with_capacity(s.len() + 2);
    ret.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => ret.push_str("\\\""),
            '\\' => ret.push_str("\\\\"),
            '\n' => ret.push_str("\\n"),
            '\t' => ret.push_str("\\t"),
            '\r' => ret.push_str("\\r"),
            '\x1b' => ret.push_str("\\e"),
            '#' if matches!(chars.peek(), Some('{' | '$' | '@')) => ret.push_str("\\#"),
            c if c.is_control() => ret.push_str(&format!("\\u{:04X}", c as u32)),
            c => ret.push(c),
        }
    }
    ret.push('"');
    ret
}

fn this_str(this: &Value) -> Result<String, Error> {
    this.get_str().ok_or_else(|| convert(this, Type::String))
}

fn str_arg(args: &[Value]) -> Result<String, Error> {
    match args {
        [x] => x.get_str().ok_or_else(|| convert(x, Type::String)),
        _ => Err(arity(args, 1, Some(1))),
    }
}

/// Leading integer of a string, ignoring whitespace and underscores between
/// digits. No digits gives zero.
fn parse_int_prefix(s: &str) -> Result<i64, Error> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut ret: i64 = 0;
    let mut previous_digit = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => {
                let digit = c as i64 - '0' as i64;
                let signed = if negative { -digit } else { digit };
                ret = ret
                    .checked_mul(10)
                    .and_then(|x| x.checked_add(signed))
                    .ok_or_else(|| Error::new(Reason::Overflow))?;
                previous_digit = true;
            }
            '_' if previous_digit => previous_digit = false,
            _ => break,
        }
    }
    Ok(ret)
}

/// Leading float of a string. No number gives zero.
fn parse_float_prefix(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return 0.0;
    }
    if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'-' | b'+')) {
            exp += 1;
        }
        if bytes.get(exp).map_or(false, u8::is_ascii_digit) {
            while exp < bytes.len() && bytes[exp].is_ascii_digit() {
                exp += 1;
            }
            end = exp;
        }
    }

    s[..end].parse().unwrap_or(0.0)
}


// String
// ------------------------------------------------------------------------------------------------

pub fn add(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let mut ret = this_str(this)?;
    ret.push_str(&str_arg(args)?);
    Ok(Value::str(ret))
}

pub fn mul(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let s = this_str(this)?;

    signature!(args = [n: int] {
        if n < 0 {
            return Err(Error::new(Argument::Negative(n)))
        }
        let count = usize::try_from(n).map_err(|_| Error::new(Reason::Overflow))?;
        let total = s.len().checked_mul(count).ok_or_else(|| Error::new(Reason::Overflow))?;
        let mut ret = String::new();
        ret.try_reserve_exact(total).map_err(too_big)?;
        if !s.is_empty() {
            for _ in 0..count {
                ret.push_str(&s);
            }
        }
        return Ok(Value::str(ret))
    });

    signature!(args = [x: any] {
        return Err(convert(x, Type::Integer))
    });

    Err(arity(args, 1, Some(1)))
}

fn compare(this: &Value, args: &[Value]) -> Result<Option<Ordering>, Error> {
    let s = this_str(this)?;
    match args {
        [Value::Str(other)] => Ok(Some(s.as_str().cmp(other.borrow().as_str()))),
        [_] => Ok(None),
        _ => Err(arity(args, 1, Some(1))),
    }
}

pub fn cmp(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(compare(this, args)?.map(|ord| Value::Int(ord as i64)).into())
}

pub fn lt(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(compare(this, args)?.map(Ordering::is_lt).into())
}

pub fn gt(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(compare(this, args)?.map(Ordering::is_gt).into())
}

pub fn le(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(compare(this, args)?.map(Ordering::is_le).into())
}

pub fn ge(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(compare(this, args)?.map(Ordering::is_ge).into())
}

pub fn length(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Int(this_str(this)?.chars().count() as i64))
}

pub fn upcase(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::str(this_str(this)?.to_uppercase()))
}

pub fn downcase(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::str(this_str(this)?.to_lowercase()))
}

pub fn capitalize(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let s = this_str(this)?;
    let mut chars = s.chars();
    let ret = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    };
    Ok(Value::str(ret))
}

pub fn reverse(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::str(this_str(this)?.chars().rev().collect::<String>()))
}

pub fn strip(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::str(this_str(this)?.trim()))
}

pub fn to_s(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(this.clone())
}

pub fn to_sym(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::symbol(&this_str(this)?))
}

pub fn to_i(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    parse_int_prefix(&this_str(this)?).map(Value::Int)
}

pub fn to_f(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Float(parse_float_prefix(&this_str(this)?)))
}

pub fn inspect(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::str(inspect_str(&this_str(this)?)))
}

pub fn include(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Bool(this_str(this)?.contains(str_arg(args)?.as_str())))
}

pub fn is_empty(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Bool(this_str(this)?.is_empty()))
}

pub fn start_with(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let s = this_str(this)?;
    for arg in args {
        let prefix = arg.get_str().ok_or_else(|| convert(arg, Type::String))?;
        if s.starts_with(prefix.as_str()) {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

pub fn end_with(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let s = this_str(this)?;
    for arg in args {
        let suffix = arg.get_str().ok_or_else(|| convert(arg, Type::String))?;
        if s.ends_with(suffix.as_str()) {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn substring(chars: &[char], bounds: Option<(usize, usize)>) -> Value {
    bounds
        .map(|(start, end)| Value::str(chars[start..end].iter().collect::<String>()))
        .into()
}

/// Character access by index, by start and length, by range or by
/// substring. Out of range gives `nil`.
pub fn index(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let s = this_str(this)?;
    let chars: Vec<char> = s.chars().collect();

    signature!(args = [i: int] {
        return Ok(normalize_index(i, chars.len()).map(|i| Value::str(chars[i].to_string())).into())
    });

    signature!(args = [start: int, count: int] {
        return Ok(substring(&chars, normalize_slice(start, count, chars.len())))
    });

    signature!(args = [r: range] {
        let (low, high) = r;
        return Ok(substring(&chars, range_slice(low, high, chars.len())))
    });

    signature!(args = [needle: str] {
        return Ok(if s.contains(needle.as_str()) { Value::str(needle) } else { Value::Nil })
    });

    signature!(args = [x: any] {
        return Err(convert(x, Type::Integer))
    });

    Err(arity(args, 1, Some(2)))
}

/// Append in place, visible through every alias of the string.
pub fn append(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let cell = this.get_str_cell().ok_or_else(|| convert(this, Type::String))?;
    let other = str_arg(args)?;
    cell.borrow_mut().push_str(&other);
    Ok(this.clone())
}

pub fn split(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let s = this_str(this)?;

    let parts: Vec<String> = match args {
        [] => s.split_whitespace().map(str::to_owned).collect(),
        [Value::Str(sep)] if sep.borrow().as_str() == " " => s.split_whitespace().map(str::to_owned).collect(),
        [Value::Str(sep)] if sep.borrow().is_empty() => s.chars().map(String::from).collect(),
        [Value::Str(sep)] => {
            let sep = sep.borrow().clone();
            let mut parts: Vec<String> = s.split(sep.as_str()).map(str::to_owned).collect();
            while parts.last().map_or(false, String::is_empty) {
                parts.pop();
            }
            parts
        }
        [x] => return Err(convert(x, Type::String)),
        _ => return Err(arity(args, 0, Some(1))),
    };

    Ok(Value::array(parts.into_iter().map(Value::str).collect()))
}

pub fn chars(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let s = this_str(this)?;
    Ok(Value::array(s.chars().map(|c| Value::str(c.to_string())).collect()))
}


// Symbol
// ------------------------------------------------------------------------------------------------

fn this_sym(this: &Value) -> Result<Key, Error> {
    this.get_symbol().ok_or_else(|| convert(this, Type::Symbol))
}

const OPERATOR_SYMBOLS: &[&str] = &[
    "+", "-", "*", "/", "%", "**", "==", "===", "!=", "<=>", "<", ">", "<=", ">=", "<<", ">>", "&", "|", "^", "!",
    "[]", "[]=", "-@", "+@",
];

/// Whether a symbol can be written without quotes.
fn is_plain_symbol(name: &str) -> bool {
    if OPERATOR_SYMBOLS.contains(&name) {
        return true;
    }
    let body = name
        .strip_prefix("@@")
        .or_else(|| name.strip_prefix('@'))
        .or_else(|| name.strip_prefix('$'))
        .unwrap_or(name);
    let body = body
        .strip_suffix(|c: char| matches!(c, '?' | '!' | '='))
        .unwrap_or(body);

    let mut chars = body.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

pub fn sym_to_s(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::str(this_sym(this)?.as_str()))
}

pub fn sym_to_sym(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(this.clone())
}

pub fn sym_to_proc(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Proc(symbol_proc(this_sym(this)?)))
}

pub fn sym_inspect(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let name = this_sym(this)?;
    let text = if is_plain_symbol(name.as_str()) {
        format!(":{}", name.as_str())
    } else {
        format!(":{}", inspect_str(name.as_str()))
    };
    Ok(Value::str(text))
}

pub fn sym_length(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Int(this_sym(this)?.as_str().chars().count() as i64))
}

pub fn sym_cmp(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let name = this_sym(this)?;
    match args {
        [Value::Symbol(other)] => Ok(Value::Int(name.as_str().cmp(other.as_str()) as i64)),
        [_] => Ok(Value::Nil),
        _ => Err(arity(args, 1, Some(1))),
    }
}
