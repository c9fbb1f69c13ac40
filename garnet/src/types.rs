use std::fmt::Display;

use symbol_table::GlobalSymbol;

use crate::object::Value;

/// Type used for all interned strings: variable names, method names, symbols.
pub type Key = GlobalSymbol;

/// Type used for array contents.
pub type List = Vec<Value>;

/// Enumeration of the built-in shapes a value can have.
///
/// User-defined classes all report `Object`; use the class table to find the
/// precise class of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Nil,
    Boolean,
    Integer,
    Float,
    String,
    Symbol,
    Array,
    Hash,
    Range,
    Class,
    Proc,
    Object,
}

// These names match the class names programs see.
impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Boolean => f.write_str("Boolean"),
            Self::Integer => f.write_str("Integer"),
            Self::Float => f.write_str("Float"),
            Self::String => f.write_str("String"),
            Self::Symbol => f.write_str("Symbol"),
            Self::Array => f.write_str("Array"),
            Self::Hash => f.write_str("Hash"),
            Self::Range => f.write_str("Range"),
            Self::Class => f.write_str("Class"),
            Self::Proc => f.write_str("Proc"),
            Self::Object => f.write_str("Object"),
        }
    }
}

/// Shared, mutable, garbage collected cell.
///
/// Cloning the cell clones the handle, not the contents. This gives strings,
/// arrays and hashes their reference semantics.
#[derive(gc::Trace, gc::Finalize)]
pub struct GcCell<T: gc::Trace + ?Sized + 'static>(gc::Gc<gc::GcCell<T>>);

impl<T: gc::Trace + ?Sized> Clone for GcCell<T> {
    fn clone(&self) -> Self {
        GcCell(self.0.clone())
    }
}

impl<T: gc::Trace> GcCell<T> {
    pub fn new(obj: T) -> GcCell<T> {
        GcCell(gc::Gc::new(gc::GcCell::new(obj)))
    }

    pub fn borrow(&self) -> gc::GcCellRef<'_, T> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> gc::GcCellRefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// Identity of the shared contents.
    pub fn addr(&self) -> usize {
        &*self.0 as *const gc::GcCell<T> as usize
    }

    /// True if both handles point to the same contents.
    pub fn same(&self, other: &GcCell<T>) -> bool {
        gc::Gc::ptr_eq(&self.0, &other.0)
    }
}
