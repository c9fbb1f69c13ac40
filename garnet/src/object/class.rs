//! Classes, modules and plain objects.

use std::any::Any;
use std::rc::Rc;

use gc::{Finalize, Gc, Trace};

use super::{Func, Value};
use crate::types::Key;
use crate::wrappers::OrderedMap;

type Table<V> = gc::GcCell<OrderedMap<Key, V>>;


/// A class or a module.
///
/// Method, constant and variable tables are interior mutable so that classes
/// can be reopened and extended while shared.
#[derive(Trace, Finalize)]
pub struct Class {
    #[unsafe_ignore_trace]
    name: Key,

    #[unsafe_ignore_trace]
    module: bool,

    /// True for the hidden class holding singleton methods.
    #[unsafe_ignore_trace]
    singleton_class: bool,

    superclass: Option<Gc<Class>>,

    /// Lexically enclosing class or module, for qualified names.
    parent: Option<Gc<Class>>,

    methods: Table<Func>,
    constants: Table<Value>,

    /// Instance variables of the class object itself. Class variables (`@@x`)
    /// are stored here as well, under their sigiled names.
    ivars: Table<Value>,

    singleton: gc::GcCell<Option<Gc<Class>>>,
}

impl Class {
    pub fn new(name: Key, superclass: Option<Gc<Class>>, parent: Option<Gc<Class>>, module: bool) -> Class {
        Class {
            name,
            module,
            singleton_class: false,
            superclass,
            parent,
            methods: gc::GcCell::new(OrderedMap::new()),
            constants: gc::GcCell::new(OrderedMap::new()),
            ivars: gc::GcCell::new(OrderedMap::new()),
            singleton: gc::GcCell::new(None),
        }
    }

    pub fn name(&self) -> Key {
        self.name
    }

    /// Name qualified by the enclosing modules, such as `Outer::Inner`.
    pub fn full_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}::{}", parent.full_name(), self.name.as_str()),
            None => self.name.as_str().to_owned(),
        }
    }

    pub fn is_module(&self) -> bool {
        self.module
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton_class
    }

    pub fn superclass(&self) -> Option<Gc<Class>> {
        self.superclass.clone()
    }

    pub fn parent(&self) -> Option<Gc<Class>> {
        self.parent.clone()
    }

    /// The class itself followed by its superclasses, up to the root.
    pub fn ancestors(this: &Gc<Class>) -> Vec<Gc<Class>> {
        let mut ret = vec![this.clone()];
        let mut current = this.superclass();
        while let Some(class) = current {
            current = class.superclass();
            ret.push(class);
        }
        ret
    }

    pub fn is_subclass_of(this: &Gc<Class>, other: &Gc<Class>) -> bool {
        Class::ancestors(this).iter().any(|c| Gc::ptr_eq(c, other))
    }

    // Methods
    // --------------------------------------------------------------------------------------------

    /// Method defined directly on this class.
    pub fn own_method(&self, name: Key) -> Option<Func> {
        self.methods.borrow().get(&name).cloned()
    }

    /// Walk the superclass chain and return the first method found.
    pub fn find_method(&self, name: Key) -> Option<Func> {
        if let Some(func) = self.own_method(name) {
            return Some(func);
        }
        let mut current = self.superclass();
        while let Some(class) = current {
            if let Some(func) = class.own_method(name) {
                return Some(func);
            }
            current = class.superclass();
        }
        None
    }

    pub fn set_method(&self, name: Key, func: Func) {
        self.methods.borrow_mut().insert(name, func);
    }

    pub fn method_names(&self) -> Vec<Key> {
        self.methods.borrow().keys().copied().collect()
    }

    // Constants and variables
    // --------------------------------------------------------------------------------------------

    pub fn constant(&self, name: Key) -> Option<Value> {
        self.constants.borrow().get(&name).cloned()
    }

    pub fn set_constant(&self, name: Key, value: Value) {
        self.constants.borrow_mut().insert(name, value);
    }

    pub fn ivar(&self, name: Key) -> Option<Value> {
        self.ivars.borrow().get(&name).cloned()
    }

    pub fn has_ivar(&self, name: Key) -> bool {
        self.ivars.borrow().contains_key(&name)
    }

    pub fn set_ivar(&self, name: Key, value: Value) {
        self.ivars.borrow_mut().insert(name, value);
    }

    // Singleton
    // --------------------------------------------------------------------------------------------

    pub fn singleton(&self) -> Option<Gc<Class>> {
        self.singleton.borrow().clone()
    }

    /// Return the class holding this class's own methods, creating it on first
    /// use.
    pub fn ensure_singleton(this: &Gc<Class>) -> Gc<Class> {
        if let Some(singleton) = this.singleton() {
            return singleton;
        }
        let name = Key::new(format!("#<Class:{}>", this.full_name()));
        let mut class = Class::new(name, None, None, false);
        class.singleton_class = true;
        let class = Gc::new(class);
        *this.singleton.borrow_mut() = Some(class.clone());
        class
    }
}


/// An instance of a user-defined (or host-defined) class.
#[derive(Trace, Finalize)]
pub struct Instance {
    class: Gc<Class>,
    ivars: Table<Value>,
    singleton: gc::GcCell<Option<Gc<Class>>>,

    /// Opaque host data.
    #[unsafe_ignore_trace]
    data: Option<Rc<dyn Any>>,

    /// Built-in representation of instances of subclasses of value classes
    /// such as `Array` or `String`.
    base: Option<Value>,
}

impl Instance {
    pub fn new(class: Gc<Class>) -> Instance {
        Instance {
            class,
            ivars: gc::GcCell::new(OrderedMap::new()),
            singleton: gc::GcCell::new(None),
            data: None,
            base: None,
        }
    }

    pub fn with_data(class: Gc<Class>, data: Rc<dyn Any>) -> Instance {
        let mut instance = Instance::new(class);
        instance.data = Some(data);
        instance
    }

    pub fn with_base(class: Gc<Class>, base: Value) -> Instance {
        let mut instance = Instance::new(class);
        instance.base = Some(base);
        instance
    }

    pub fn class(&self) -> Gc<Class> {
        self.class.clone()
    }

    pub fn data(&self) -> Option<Rc<dyn Any>> {
        self.data.clone()
    }

    pub fn base(&self) -> Option<&Value> {
        self.base.as_ref()
    }

    pub fn ivar(&self, name: Key) -> Option<Value> {
        self.ivars.borrow().get(&name).cloned()
    }

    pub fn set_ivar(&self, name: Key, value: Value) {
        self.ivars.borrow_mut().insert(name, value);
    }

    pub fn ivars(&self) -> Vec<(Key, Value)> {
        self.ivars.borrow().iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    pub fn singleton(&self) -> Option<Gc<Class>> {
        self.singleton.borrow().clone()
    }

    /// Return the class holding methods for this object alone, creating it on
    /// first use. It inherits from the object's class, so lookups through it
    /// fall back to the ordinary methods.
    pub fn ensure_singleton(&self) -> Gc<Class> {
        if let Some(singleton) = self.singleton() {
            return singleton;
        }
        let name = Key::new(format!("#<Class:#<{}>>", self.class.full_name()));
        let mut class = Class::new(name, Some(self.class.clone()), None, false);
        class.singleton_class = true;
        let class = Gc::new(class);
        *self.singleton.borrow_mut() = Some(class.clone());
        class
    }
}
