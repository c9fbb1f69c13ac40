use std::cmp::Ordering;

use gc::Gc;

use super::{arity, convert, need_block};
use crate::error::{Argument, Error, Reason, TypeMismatch};
use crate::eval::Vm;
use crate::object::{format_float, Builtin, Class, Func, Value};
use crate::types::{Key, Type};


lazy_static! {
    /// Arithmetic shared by integers and floats.
    pub static ref NUMERIC: Vec<Builtin> = {
        let mut m = Vec::new();
        builtin!(m, "+", add);
        builtin!(m, "-", sub);
        builtin!(m, "*", mul);
        builtin!(m, "/", div);
        builtin!(m, "%", rem);
        builtin!(m, "modulo", rem);
        builtin!(m, "**", pow);
        builtin!(m, "<", lt);
        builtin!(m, ">", gt);
        builtin!(m, "<=", le);
        builtin!(m, ">=", ge);
        builtin!(m, "<=>", cmp);
        builtin!(m, "-@", neg);
        builtin!(m, "+@", pos);
        builtin!(m, "abs", abs);
        builtin!(m, "zero?", is_zero);
        builtin!(m, "to_f", to_f);
        m
    };

    pub static ref INTEGER: Vec<Builtin> = {
        let mut m = Vec::new();
        builtin!(m, "&", bitand);
        builtin!(m, "|", bitor);
        builtin!(m, "^", bitxor);
        builtin!(m, "<<", shl);
        builtin!(m, ">>", shr);
        builtin!(m, "even?", is_even);
        builtin!(m, "odd?", is_odd);
        builtin!(m, "succ", succ);
        builtin!(m, "next", succ);
        builtin!(m, "pred", pred);
        builtin!(m, "to_i", int_to_i);
        builtin!(m, "to_s", int_to_s);
        builtin!(m, "inspect", int_to_s);
        builtin!(m, "times", times);
        builtin!(m, "upto", upto);
        builtin!(m, "downto", downto);
        m
    };

    pub static ref FLOAT: Vec<Builtin> = {
        let mut m = Vec::new();
        builtin!(m, "to_i", float_to_i);
        builtin!(m, "truncate", float_to_i);
        builtin!(m, "ceil", ceil);
        builtin!(m, "floor", floor);
        builtin!(m, "round", round);
        builtin!(m, "nan?", is_nan);
        builtin!(m, "finite?", is_finite);
        builtin!(m, "infinite?", is_infinite);
        builtin!(m, "to_s", float_to_s);
        builtin!(m, "inspect", float_to_s);
        m
    };
}

pub(super) fn install_constants(float: &Gc<Class>) {
    float.set_constant(Key::new("INFINITY"), Value::Float(f64::INFINITY));
    float.set_constant(Key::new("NAN"), Value::Float(f64::NAN));
    float.set_constant(Key::new("EPSILON"), Value::Float(f64::EPSILON));
    float.set_constant(Key::new("MAX"), Value::Float(f64::MAX));
    float.set_constant(Key::new("MIN"), Value::Float(f64::MIN_POSITIVE));
}


// Utilities
// ------------------------------------------------------------------------------------------------

fn overflow() -> Error {
    Error::new(Reason::Overflow)
}

fn single(args: &[Value]) -> Result<&Value, Error> {
    match args {
        [x] => Ok(x),
        _ => Err(arity(args, 1, Some(1))),
    }
}

/// Universal utility for implementing arithmetic operators.
///
/// If both operands are integers, the `ixi` function is applied. If either is
/// a float, both are converted to floats and the `fxf` function is applied.
/// Any other right operand is a type error.
fn operate(
    this: &Value,
    other: &Value,
    ixi: impl Fn(i64, i64) -> Result<Value, Error>,
    fxf: impl Fn(f64, f64) -> f64,
) -> Result<Value, Error> {
    match (this, other) {
        (Value::Int(x), Value::Int(y)) => ixi(*x, *y),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(fxf(*x as f64, *y))),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(fxf(*x, *y as f64))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(fxf(*x, *y))),
        _ => Err(Error::new(TypeMismatch::Coerce {
            from: other.type_of(),
            to: this.type_of(),
        })),
    }
}

fn checked(result: Option<i64>) -> Result<Value, Error> {
    result.map(Value::Int).ok_or_else(overflow)
}

/// Integer division rounding towards negative infinity.
fn floor_div(x: i64, y: i64) -> Result<Value, Error> {
    if y == 0 {
        return Err(Error::new(Reason::ZeroDivision));
    }
    let q = x.checked_div(y).ok_or_else(overflow)?;
    if x % y != 0 && ((x < 0) != (y < 0)) {
        Ok(Value::Int(q - 1))
    } else {
        Ok(Value::Int(q))
    }
}

/// Remainder with the sign of the divisor.
fn floor_rem(x: i64, y: i64) -> Result<Value, Error> {
    if y == 0 {
        return Err(Error::new(Reason::ZeroDivision));
    }
    let r = x.checked_rem(y).unwrap_or(0);
    if r != 0 && ((r < 0) != (y < 0)) {
        Ok(Value::Int(r + y))
    } else {
        Ok(Value::Int(r))
    }
}

fn float_rem(x: f64, y: f64) -> f64 {
    let r = x % y;
    if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
        r + y
    } else {
        r
    }
}

/// Ordering of two numbers, or `None` if either isn't numeric (or is NaN).
fn compare(this: &Value, other: &Value) -> Option<Ordering> {
    match (this, other) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        _ => this
            .to_f64()
            .zip(other.to_f64())
            .and_then(|(x, y)| x.partial_cmp(&y)),
    }
}

/// Comparison operators give `nil` for non-numeric operands.
fn comparison(this: &Value, args: &[Value], test: impl Fn(Ordering) -> bool) -> Result<Value, Error> {
    let other = single(args)?;
    if other.to_f64().is_none() {
        return Ok(Value::Nil);
    }
    Ok(Value::Bool(compare(this, other).map_or(false, test)))
}

fn float_to_int(x: f64) -> Result<Value, Error> {
    if !x.is_finite() {
        return Err(Error::new(Reason::FloatDomain(x)));
    }
    // i64::MAX is not representable; 2^63 is the first float out of range
    if x >= 9_223_372_036_854_775_808.0 || x < -9_223_372_036_854_775_808.0 {
        return Err(overflow());
    }
    Ok(Value::Int(x as i64))
}

fn int_arg(args: &[Value]) -> Result<i64, Error> {
    let other = single(args)?;
    other.get_int().ok_or_else(|| convert(other, Type::Integer))
}


// Numeric
// ------------------------------------------------------------------------------------------------

pub fn add(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    operate(this, single(args)?, |x, y| checked(x.checked_add(y)), |x, y| x + y)
}

pub fn sub(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    operate(this, single(args)?, |x, y| checked(x.checked_sub(y)), |x, y| x - y)
}

pub fn mul(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    operate(this, single(args)?, |x, y| checked(x.checked_mul(y)), |x, y| x * y)
}

pub fn div(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    operate(this, single(args)?, floor_div, |x, y| x / y)
}

pub fn rem(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    operate(this, single(args)?, floor_rem, float_rem)
}

/// Integer powers stay integers for non-negative exponents. Everything else
/// goes through floating point.
pub fn pow(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    operate(
        this,
        single(args)?,
        |x, y| match u32::try_from(y) {
            Ok(y) => checked(x.checked_pow(y)),
            Err(_) if y < 0 => Ok(Value::Float((x as f64).powf(y as f64))),
            Err(_) => match x {
                0 | 1 => Ok(Value::Int(x)),
                -1 => Ok(Value::Int(if y % 2 == 0 { 1 } else { -1 })),
                _ => Err(overflow()),
            },
        },
        f64::powf,
    )
}

pub fn lt(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    comparison(this, args, Ordering::is_lt)
}

pub fn gt(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    comparison(this, args, Ordering::is_gt)
}

pub fn le(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    comparison(this, args, Ordering::is_le)
}

pub fn ge(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    comparison(this, args, Ordering::is_ge)
}

pub fn cmp(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let other = single(args)?;
    Ok(compare(this, other).map(|ord| Value::Int(ord as i64)).into())
}

pub fn neg(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    match this {
        Value::Int(x) => checked(x.checked_neg()),
        Value::Float(x) => Ok(Value::Float(-x)),
        other => Err(convert(other, Type::Integer)),
    }
}

pub fn pos(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(this.clone())
}

pub fn abs(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    match this {
        Value::Int(x) => checked(x.checked_abs()),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        other => Err(convert(other, Type::Integer)),
    }
}

pub fn is_zero(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Bool(this.to_f64().map_or(false, |x| x == 0.0)))
}

pub fn to_f(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    this.to_f64()
        .map(Value::Float)
        .ok_or_else(|| convert(this, Type::Float))
}


// Integer
// ------------------------------------------------------------------------------------------------

fn this_int(this: &Value) -> Result<i64, Error> {
    this.get_int().ok_or_else(|| convert(this, Type::Integer))
}

pub fn bitand(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Int(this_int(this)? & int_arg(args)?))
}

pub fn bitor(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Int(this_int(this)? | int_arg(args)?))
}

pub fn bitxor(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Int(this_int(this)? ^ int_arg(args)?))
}

fn shift_left(x: i64, n: i64) -> Result<Value, Error> {
    if n < 0 {
        return shift_right(x, n.checked_neg().unwrap_or(i64::MAX));
    }
    if x == 0 {
        return Ok(Value::Int(0));
    }
    if n >= 64 {
        return Err(overflow());
    }
    let shifted = x << n;
    if shifted >> n != x {
        return Err(overflow());
    }
    Ok(Value::Int(shifted))
}

fn shift_right(x: i64, n: i64) -> Result<Value, Error> {
    if n < 0 {
        return shift_left(x, n.checked_neg().unwrap_or(i64::MAX));
    }
    if n >= 64 {
        return Ok(Value::Int(if x < 0 { -1 } else { 0 }));
    }
    Ok(Value::Int(x >> n))
}

pub fn shl(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    shift_left(this_int(this)?, int_arg(args)?)
}

pub fn shr(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    shift_right(this_int(this)?, int_arg(args)?)
}

pub fn is_even(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Bool(this_int(this)? % 2 == 0))
}

pub fn is_odd(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Bool(this_int(this)? % 2 != 0))
}

pub fn succ(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    checked(this_int(this)?.checked_add(1))
}

pub fn pred(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    checked(this_int(this)?.checked_sub(1))
}

pub fn int_to_i(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(this.clone())
}

const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn radix_string(x: i64, radix: i64) -> Result<String, Error> {
    if !(2..=36).contains(&radix) {
        return Err(Error::new(Argument::Invalid("radix")));
    }
    if radix == 10 {
        return Ok(x.to_string());
    }

    let radix = radix as u64;
    let mut n = x.unsigned_abs();
    let mut digits = Vec::new();
    loop {
        digits.push(DIGITS[(n % radix) as usize]);
        n /= radix;
        if n == 0 {
            break;
        }
    }
    if x < 0 {
        digits.push(b'-');
    }
    digits.reverse();
    Ok(digits.into_iter().map(char::from).collect())
}

pub fn int_to_s(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let x = this_int(this)?;

    signature!(args = [] {
        return Ok(Value::str(x.to_string()))
    });

    signature!(args = [radix: int] {
        return radix_string(x, radix).map(Value::str)
    });

    signature!(args = [y: any] {
        return Err(convert(y, Type::Integer))
    });

    Err(arity(args, 0, Some(1)))
}

pub fn times(vm: &mut Vm, this: &Value, _args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let block = need_block(block)?;
    for i in 0..this_int(this)? {
        block.invoke(vm, this, &[Value::Int(i)], None)?;
    }
    Ok(this.clone())
}

pub fn upto(vm: &mut Vm, this: &Value, args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let limit = int_arg(args)?;
    let block = need_block(block)?;
    for i in this_int(this)?..=limit {
        block.invoke(vm, this, &[Value::Int(i)], None)?;
    }
    Ok(this.clone())
}

pub fn downto(vm: &mut Vm, this: &Value, args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
    let limit = int_arg(args)?;
    let block = need_block(block)?;
    for i in (limit..=this_int(this)?).rev() {
        block.invoke(vm, this, &[Value::Int(i)], None)?;
    }
    Ok(this.clone())
}


// Float
// ------------------------------------------------------------------------------------------------

fn this_float(this: &Value) -> Result<f64, Error> {
    this.get_float().ok_or_else(|| convert(this, Type::Float))
}

pub fn float_to_i(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    float_to_int(this_float(this)?.trunc())
}

pub fn ceil(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    float_to_int(this_float(this)?.ceil())
}

pub fn floor(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    float_to_int(this_float(this)?.floor())
}

/// Round half away from zero. With a positive number of digits the result
/// stays a float.
pub fn round(_vm: &mut Vm, this: &Value, args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let x = this_float(this)?;

    signature!(args = [] {
        return float_to_int(x.round())
    });

    signature!(args = [digits: int] {
        if digits <= 0 {
            let scale = 10f64.powi(digits.saturating_neg().min(308) as i32);
            return float_to_int((x / scale).round() * scale)
        }
        if !x.is_finite() {
            return Ok(Value::Float(x))
        }
        let scale = 10f64.powi(digits.min(308) as i32);
        return Ok(Value::Float((x * scale).round() / scale))
    });

    signature!(args = [y: any] {
        return Err(convert(y, Type::Integer))
    });

    Err(arity(args, 0, Some(1)))
}

pub fn is_nan(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Bool(this_float(this)?.is_nan()))
}

pub fn is_finite(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::Bool(this_float(this)?.is_finite()))
}

/// 1 or -1 for infinities, nil otherwise.
pub fn is_infinite(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    let x = this_float(this)?;
    Ok(match x.is_infinite() {
        true if x > 0.0 => Value::Int(1),
        true => Value::Int(-1),
        false => Value::Nil,
    })
}

pub fn float_to_s(_vm: &mut Vm, this: &Value, _args: &[Value], _block: Option<&Func>) -> Result<Value, Error> {
    Ok(Value::str(format_float(this_float(this)?)))
}
