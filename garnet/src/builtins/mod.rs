//! Native methods of the core classes.
//!
//! Each submodule fills one or more tables of [`Builtin`]s, which are
//! installed into the corresponding classes when a [`Vm`] is created. Once
//! installed they are ordinary methods: programs can call, override and
//! reopen them like any other.

use std::collections::TryReserveError;

use gc::Gc;

use crate::error::{Argument, Error, TypeMismatch};
use crate::eval::Vm;
use crate::object::{Builtin, Class, Func, Value};
use crate::types::Type;

macro_rules! builtin {
    ($m:ident, $name:expr, $f:path) => {
        $m.push(Builtin {
            func: $f,
            name: Key::new($name),
        })
    };
}

mod collections;
mod kernel;
mod module;
mod numeric;
mod string;

pub(crate) use string::symbol_proc;

fn install_table(class: &Gc<Class>, table: &[Builtin]) {
    for builtin in table {
        class.set_method(builtin.name, Func::from(*builtin));
    }
}

/// Install all native methods and constants.
pub(crate) fn install(vm: &mut Vm) {
    let classes = vm.classes();

    install_table(&classes.object, &kernel::KERNEL);
    install_table(&classes.object, &kernel::OBJECT);
    install_table(&classes.nil, &kernel::NIL);
    install_table(&classes.module, &module::MODULE);
    install_table(&classes.class, &module::CLASS);
    install_table(&classes.numeric, &numeric::NUMERIC);
    install_table(&classes.integer, &numeric::INTEGER);
    install_table(&classes.float, &numeric::FLOAT);
    install_table(&classes.string, &string::STRING);
    install_table(&classes.symbol, &string::SYMBOL);
    install_table(&classes.array, &collections::ARRAY);
    install_table(&classes.hash, &collections::HASH);
    install_table(&classes.range, &collections::RANGE);
    install_table(&classes.proc, &collections::PROC);

    numeric::install_constants(&classes.float);
}


// Helpers shared by the native methods
// ------------------------------------------------------------------------------------------------

/// Wrong number of arguments.
pub(crate) fn arity(args: &[Value], min: usize, max: Option<usize>) -> Error {
    Error::new(Argument::Count {
        given: args.len(),
        min,
        max,
    })
}

/// Wrong type of argument.
pub(crate) fn convert(value: &Value, to: Type) -> Error {
    Error::new(TypeMismatch::Convert {
        from: value.type_of(),
        to,
    })
}

/// A size computed by a program that can't be allocated.
pub(crate) fn too_big(_: TryReserveError) -> Error {
    Error::new(Argument::Invalid("size too big"))
}

pub(crate) fn need_block(block: Option<&Func>) -> Result<&Func, Error> {
    block.ok_or_else(|| Error::new(Argument::NoBlock))
}

/// Resolve a possibly negative index against a length.
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) {
        Some(index as usize)
    } else {
        None
    }
}

/// Resolve a start and a length against a sequence length, the way slicing
/// does: starting exactly at the end gives an empty slice, past the end gives
/// nothing.
pub(crate) fn normalize_slice(start: i64, count: i64, len: usize) -> Option<(usize, usize)> {
    let total = len as i64;
    let start = if start < 0 { start + total } else { start };
    if start < 0 || start > total || count < 0 {
        return None;
    }
    let end = start.saturating_add(count).min(total);
    Some((start as usize, end as usize))
}

/// Like [`normalize_slice`], but for an inclusive range of indices.
pub(crate) fn range_slice(low: i64, high: i64, len: usize) -> Option<(usize, usize)> {
    let total = len as i64;
    let low = if low < 0 { low + total } else { low };
    let high = if high < 0 { high + total } else { high };
    let count = high.saturating_sub(low).saturating_add(1).max(0);
    normalize_slice(low, count, len)
}
