//! Runtime values.
//!
//! A [`Value`] is either an immediate (nil, booleans, numbers, symbols,
//! ranges) or a handle to garbage collected shared state (strings, arrays,
//! hashes, classes, procs and objects). Cloning a value never copies the
//! shared state behind it, so mutation through one handle is visible through
//! every alias.

use std::any::Any;
use std::fmt::Debug;
use std::rc::Rc;

use gc::{Finalize, Gc, Trace};

use crate::stack::ensure_sufficient_stack;
use crate::types::{GcCell, Key, List, Type};
use crate::wrappers::OrderedMap;

// Utility macro for extracting a certain type from an argument list. Used for
// writing native methods.
macro_rules! extract {
    ($index:expr , $args:ident , int) => {
        $args.get($index).and_then(|x| x.get_int())
    };
    ($index:expr , $args:ident , float) => {
        $args.get($index).and_then(|x| x.get_float())
    };
    ($index:expr , $args:ident , tofloat) => {
        $args.get($index).and_then(|x| x.to_f64())
    };
    ($index:expr , $args:ident , str) => {
        $args.get($index).and_then(|x| x.get_str())
    };
    ($index:expr , $args:ident , strcell) => {
        $args.get($index).and_then(|x| x.get_str_cell())
    };
    ($index:expr , $args:ident , array) => {
        $args.get($index).and_then(|x| x.get_array())
    };
    ($index:expr , $args:ident , hash) => {
        $args.get($index).and_then(|x| x.get_hash())
    };
    ($index:expr , $args:ident , sym) => {
        $args.get($index).and_then(|x| x.get_symbol())
    };
    ($index:expr , $args:ident , name) => {
        $args.get($index).and_then(|x| x.get_name())
    };
    ($index:expr , $args:ident , range) => {
        $args.get($index).and_then(|x| x.get_range())
    };
    ($index:expr , $args:ident , class) => {
        $args.get($index).and_then(|x| x.get_class())
    };
    ($index:expr , $args:ident , proc) => {
        $args.get($index).and_then(|x| x.get_proc())
    };
    ($index:expr , $args:ident , any) => {
        $args.get($index)
    };
}

/// Utility macro for capturing a certain calling convention. Used for writing
/// native methods.
///
/// ```ignore
/// signature!(args = [x: int, y: float] {
///     // function body
/// })
/// ```
///
/// The body is executed if the argument slice matches the given types. The
/// number and types of the arguments must be exact. If the arguments don't
/// match, or if the body does not return, evaluation proceeds, so the macro
/// can be used several times in succession to match different calling
/// conventions.
macro_rules! signature {
    ($args:ident = [ $($param:ident : $type:ident),* ] $block:block) => {
        signature!(0 ; $args [ $($param : $type),* ] , $block)
    };

    ($index:expr ; $args:ident [ $param:ident : $type:ident , $($params:ident : $types:ident),+ ] , $block:block) => {
        if let Some($param) = extract!($index, $args, $type) {
            signature!($index + 1 ; $args [ $($params : $types),* ] , $block)
        }
    };

    ($index:expr ; $args:ident [ $param:ident : $type:ident ] , $block:block) => {
        if let Some($param) = extract!($index, $args, $type) {
            signature!($index + 1 ; $args [ ] , $block)
        }
    };

    ($index:expr ; $args:ident [ ] , $block:block) => {
        if $args.len() == $index $block
    };
}

mod class;
mod function;

pub use class::{Class, Instance};
pub use function::{Builtin, Func};


/// Structural key used to store values in hashes.
///
/// Value types hash by contents, reference types (other than strings and
/// arrays) by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Nil,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
    Symbol(Key),
    Array(Vec<HashKey>),
    Range(i64, i64),
    Identity(usize),
}

/// A hash entry remembers the original key value alongside the value.
#[derive(Clone, Debug, Trace, Finalize)]
pub struct HashEntry {
    pub key: Value,
    pub value: Value,
}

impl HashEntry {
    /// String keys are copied, so that mutating the original string later
    /// can't desynchronize the entry from its hash key.
    pub fn new(key: &Value, value: Value) -> HashEntry {
        let key = match key {
            Value::Str(x) => Value::str(x.borrow().clone()),
            other => other.clone(),
        };
        HashEntry { key, value }
    }
}

pub type HashTable = OrderedMap<HashKey, HashEntry>;


#[derive(Clone, Trace, Finalize)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Symbol(#[unsafe_ignore_trace] Key),
    Str(GcCell<String>),
    Array(GcCell<List>),
    Hash(GcCell<HashTable>),

    /// Inclusive integer range. Exclusive ranges are normalized when created.
    Range(i64, i64),

    Class(Gc<Class>),
    Proc(Func),
    Object(Gc<Instance>),
}

pub(crate) fn gc_addr<T: Trace>(x: &Gc<T>) -> usize {
    &**x as *const T as usize
}

impl Value {
    pub fn str(x: impl Into<String>) -> Value {
        Value::Str(GcCell::new(x.into()))
    }

    pub fn symbol(x: &str) -> Value {
        Value::Symbol(Key::new(x))
    }

    pub fn array(x: List) -> Value {
        Value::Array(GcCell::new(x))
    }

    pub fn hash(x: HashTable) -> Value {
        Value::Hash(GcCell::new(x))
    }

    /// Build a hash from key-value pairs. Later duplicates win.
    pub fn hash_from_pairs(pairs: impl IntoIterator<Item = (Value, Value)>) -> Value {
        let mut table = HashTable::new();
        for (key, value) in pairs {
            table.insert(key.hash_key(), HashEntry::new(&key, value));
        }
        Value::hash(table)
    }

    /// A new plain object of some class.
    pub fn object(class: Gc<Class>) -> Value {
        Value::Object(Gc::new(Instance::new(class)))
    }

    /// An object carrying opaque host data.
    pub fn data(class: Gc<Class>, data: Rc<dyn Any>) -> Value {
        Value::Object(Gc::new(Instance::with_data(class, data)))
    }

    /// The built-in value behind an object whose class derives from a value
    /// class, otherwise the value itself.
    pub fn representation(&self) -> &Value {
        match self {
            Value::Object(x) => x.base().unwrap_or(self),
            _ => self,
        }
    }

    /// Anything except `nil` and `false` is truthy.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn type_of(&self) -> Type {
        match self {
            Value::Nil => Type::Nil,
            Value::Bool(_) => Type::Boolean,
            Value::Int(_) => Type::Integer,
            Value::Float(_) => Type::Float,
            Value::Symbol(_) => Type::Symbol,
            Value::Str(_) => Type::String,
            Value::Array(_) => Type::Array,
            Value::Hash(_) => Type::Hash,
            Value::Range(..) => Type::Range,
            Value::Class(_) => Type::Class,
            Value::Proc(_) => Type::Proc,
            Value::Object(_) => Type::Object,
        }
    }

    pub fn get_int(&self) -> Option<i64> {
        match self {
            Value::Int(x) => Some(*x),
            _ => None,
        }
    }

    pub fn get_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Numeric value as a float, for mixed arithmetic.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Int(x) => Some(*x as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn get_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(x) => Some(*x),
            _ => None,
        }
    }

    /// A copy of the string contents.
    pub fn get_str(&self) -> Option<String> {
        match self.representation() {
            Value::Str(x) => Some(x.borrow().clone()),
            _ => None,
        }
    }

    pub fn get_str_cell(&self) -> Option<&GcCell<String>> {
        match self.representation() {
            Value::Str(x) => Some(x),
            _ => None,
        }
    }

    pub fn get_array(&self) -> Option<&GcCell<List>> {
        match self.representation() {
            Value::Array(x) => Some(x),
            _ => None,
        }
    }

    pub fn get_hash(&self) -> Option<&GcCell<HashTable>> {
        match self.representation() {
            Value::Hash(x) => Some(x),
            _ => None,
        }
    }

    pub fn get_symbol(&self) -> Option<Key> {
        match self {
            Value::Symbol(x) => Some(*x),
            _ => None,
        }
    }

    /// A symbol or a string, as a name.
    pub fn get_name(&self) -> Option<Key> {
        match self {
            Value::Symbol(x) => Some(*x),
            Value::Str(x) => Some(Key::new(x.borrow().as_str())),
            _ => None,
        }
    }

    pub fn get_range(&self) -> Option<(i64, i64)> {
        match self.representation() {
            Value::Range(x, y) => Some((*x, *y)),
            _ => None,
        }
    }

    pub fn get_class(&self) -> Option<&Gc<Class>> {
        match self {
            Value::Class(x) => Some(x),
            _ => None,
        }
    }

    pub fn get_proc(&self) -> Option<&Func> {
        match self.representation() {
            Value::Proc(x) => Some(x),
            _ => None,
        }
    }

    pub fn get_object(&self) -> Option<&Gc<Instance>> {
        match self {
            Value::Object(x) => Some(x),
            _ => None,
        }
    }

    /// Host data attached to an object, if it has the requested type.
    pub fn get_data<T: 'static>(&self) -> Option<Rc<T>> {
        self.get_object()
            .and_then(|x| x.data())
            .and_then(|x| x.downcast::<T>().ok())
    }

    /// Object identity, as used by `equal?`.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(x), Value::Str(y)) => x.same(y),
            (Value::Array(x), Value::Array(y)) => x.same(y),
            (Value::Hash(x), Value::Hash(y)) => x.same(y),
            (Value::Class(x), Value::Class(y)) => Gc::ptr_eq(x, y),
            (Value::Object(x), Value::Object(y)) => Gc::ptr_eq(x, y),
            (Value::Proc(x), Value::Proc(y)) => x.same(y),
            (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
            _ => self.user_eq(other),
        }
    }

    /// Structural equality for value types and collections, identity for
    /// classes, procs and objects. Integers and floats compare numerically.
    pub fn user_eq(&self, other: &Value) -> bool {
        self.user_eq_in(other, &mut vec![])
    }

    /// Collections already being compared further up are taken as equal, so
    /// that self-containing arrays and hashes compare without looping.
    fn user_eq_in(&self, other: &Value, comparing: &mut Vec<(usize, usize)>) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Int(x), Value::Float(y)) => (*x as f64) == *y,
            (Value::Float(x), Value::Int(y)) => *x == (*y as f64),
            (Value::Symbol(x), Value::Symbol(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => x.same(y) || *x.borrow() == *y.borrow(),
            (Value::Range(a, b), Value::Range(c, d)) => a == c && b == d,
            (Value::Array(x), Value::Array(y)) => {
                let pair = (x.addr(), y.addr());
                if x.same(y) || comparing.contains(&pair) {
                    return true;
                }
                let xs = x.borrow().clone();
                let ys = y.borrow().clone();
                if xs.len() != ys.len() {
                    return false;
                }
                comparing.push(pair);
                let ret = ensure_sufficient_stack(|| xs.iter().zip(ys.iter()).all(|(a, b)| a.user_eq_in(b, comparing)));
                comparing.pop();
                ret
            }
            (Value::Hash(x), Value::Hash(y)) => {
                let pair = (x.addr(), y.addr());
                if x.same(y) || comparing.contains(&pair) {
                    return true;
                }
                if x.borrow().len() != y.borrow().len() {
                    return false;
                }
                let ours: Vec<(HashKey, Value)> = x.borrow().iter().map(|(k, e)| (k.clone(), e.value.clone())).collect();
                comparing.push(pair);
                let ret = ensure_sufficient_stack(|| {
                    ours.iter().all(|(k, a)| {
                        let theirs = y.borrow().get(k).map(|e| e.value.clone());
                        theirs.map_or(false, |b| a.user_eq_in(&b, comparing))
                    })
                });
                comparing.pop();
                ret
            }
            _ => self.same_reference(other),
        }
    }

    fn same_reference(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Class(x), Value::Class(y)) => Gc::ptr_eq(x, y),
            (Value::Object(x), Value::Object(y)) => Gc::ptr_eq(x, y),
            (Value::Proc(x), Value::Proc(y)) => x.same(y),
            _ => false,
        }
    }

    /// Key under which this value is stored in a hash.
    pub fn hash_key(&self) -> HashKey {
        self.hash_key_in(&mut vec![])
    }

    /// An array that contains itself keys its inner occurrences by identity.
    fn hash_key_in(&self, visiting: &mut Vec<usize>) -> HashKey {
        match self {
            Value::Nil => HashKey::Nil,
            Value::Bool(x) => HashKey::Bool(*x),
            Value::Int(x) => HashKey::Int(*x),
            Value::Float(x) => HashKey::Float(x.to_bits()),
            Value::Symbol(x) => HashKey::Symbol(*x),
            Value::Str(x) => HashKey::Str(x.borrow().clone()),
            Value::Array(x) => {
                let addr = x.addr();
                if visiting.contains(&addr) {
                    return HashKey::Identity(addr);
                }
                let items = x.borrow().clone();
                visiting.push(addr);
                let key = ensure_sufficient_stack(|| items.iter().map(|item| item.hash_key_in(visiting)).collect());
                visiting.pop();
                HashKey::Array(key)
            }
            Value::Range(x, y) => HashKey::Range(*x, *y),
            Value::Hash(x) => HashKey::Identity(x.addr()),
            Value::Class(x) => HashKey::Identity(gc_addr(x)),
            Value::Object(x) => HashKey::Identity(gc_addr(x)),
            Value::Proc(x) => HashKey::Identity(x.id()),
        }
    }

    /// A number identifying the value, as returned by `hash`.
    pub fn hash_code(&self) -> i64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.hash_key().hash(&mut hasher);
        hasher.finish() as i64
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(x) => Debug::fmt(x, f),
            Value::Int(x) => Debug::fmt(x, f),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Symbol(x) => f.write_fmt(format_args!(":{}", x.as_str())),
            Value::Str(x) => Debug::fmt(&*x.borrow(), f),
            Value::Array(x) => f.debug_list().entries(x.borrow().iter()).finish(),
            Value::Hash(x) => f
                .debug_map()
                .entries(x.borrow().values().map(|e| (e.key.clone(), e.value.clone())))
                .finish(),
            Value::Range(x, y) => f.write_fmt(format_args!("{}..{}", x, y)),
            Value::Class(x) => f.write_str(&x.full_name()),
            Value::Proc(x) => Debug::fmt(x, f),
            Value::Object(x) => f.write_fmt(format_args!("#<{}>", x.class().full_name())),
        }
    }
}

// Used by tests: structural equality, without float/integer mixing.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => false,
            _ => self.user_eq(other),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::str(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::str(value)
    }
}

impl From<List> for Value {
    fn from(value: List) -> Self {
        Value::array(value)
    }
}

impl From<Func> for Value {
    fn from(value: Func) -> Self {
        Value::Proc(value)
    }
}

impl From<Gc<Class>> for Value {
    fn from(value: Gc<Class>) -> Self {
        Value::Class(value)
    }
}

impl<T> From<Option<T>> for Value where Value: From<T> {
    fn from(value: Option<T>) -> Self {
        value.map(Value::from).unwrap_or(Value::Nil)
    }
}


/// Format a float the way programs print them: integral values keep a `.0`
/// and large or tiny magnitudes use exponent notation.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_owned();
    }
    if x.is_infinite() {
        return if x > 0.0 { "Infinity".to_owned() } else { "-Infinity".to_owned() };
    }

    let magnitude = x.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let text = format!("{:e}", x);
        let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
        let mantissa = if mantissa.contains('.') { mantissa.to_owned() } else { format!("{}.0", mantissa) };
        let exponent = match exponent.strip_prefix('-') {
            Some(digits) => format!("-{:0>2}", digits),
            None => format!("+{:0>2}", exponent),
        };
        return format!("{}e{}", mantissa, exponent);
    }

    if x.fract() == 0.0 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}
