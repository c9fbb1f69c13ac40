//! Evaluation contexts.
//!
//! A context holds the local variables of one scope together with the current
//! receiver (`self`), the enclosing class or module and the block passed to
//! the current method. Contexts form a chain through their parents: method
//! calls get a child of the context the method was defined in, and blocks a
//! child of the context they were created in.

use gc::{Finalize, Gc, Trace};

use crate::object::{Class, Func, Value};
use crate::types::Key;
use crate::wrappers::OrderedMap;

/// How assignments to unknown names behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Assignments always create or update a local.
    Plain,

    /// Assignments update the nearest enclosing context that already has the
    /// name, and only create a local if none does.
    Block,
}

#[derive(Trace, Finalize)]
pub struct Context {
    locals: gc::GcCell<OrderedMap<Key, Value>>,
    parent: Option<Gc<Context>>,
    receiver: Value,
    module: Option<Gc<Class>>,
    block: Option<Func>,

    #[unsafe_ignore_trace]
    kind: ContextKind,
}

impl Context {
    /// A top-level context.
    pub fn root(receiver: Value, module: Option<Gc<Class>>) -> Gc<Context> {
        Gc::new(Context {
            locals: gc::GcCell::new(OrderedMap::new()),
            parent: None,
            receiver,
            module,
            block: None,
            kind: ContextKind::Plain,
        })
    }

    pub fn child(
        parent: &Gc<Context>,
        receiver: Value,
        module: Option<Gc<Class>>,
        kind: ContextKind,
        block: Option<Func>,
    ) -> Gc<Context> {
        Gc::new(Context {
            locals: gc::GcCell::new(OrderedMap::new()),
            parent: Some(parent.clone()),
            receiver,
            module,
            block,
            kind,
        })
    }

    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    pub fn module(&self) -> Option<Gc<Class>> {
        self.module.clone()
    }

    pub fn block(&self) -> Option<Func> {
        self.block.clone()
    }

    pub fn parent(&self) -> Option<Gc<Context>> {
        self.parent.clone()
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn has_local(&self, name: Key) -> bool {
        self.locals.borrow().contains_key(&name)
    }

    /// Look a variable up here and then through the parents.
    pub fn get(&self, name: Key) -> Option<Value> {
        if let Some(value) = self.locals.borrow().get(&name) {
            return Some(value.clone());
        }
        let mut current = self.parent();
        while let Some(ctx) = current {
            if let Some(value) = ctx.locals.borrow().get(&name) {
                return Some(value.clone());
            }
            current = ctx.parent();
        }
        None
    }

    /// Set a variable in this context, shadowing any outer one.
    pub fn define(&self, name: Key, value: Value) {
        self.locals.borrow_mut().insert(name, value);
    }

    /// Assign a variable according to the context kind.
    pub fn assign(this: &Gc<Context>, name: Key, value: Value) {
        if this.kind == ContextKind::Block && !this.has_local(name) {
            let mut current = this.parent();
            while let Some(ctx) = current {
                if ctx.has_local(name) {
                    ctx.define(name, value);
                    return;
                }
                current = ctx.parent();
            }
        }
        this.define(name, value);
    }

    /// The outermost context of the chain.
    pub fn root_of(this: &Gc<Context>) -> Gc<Context> {
        let mut current = this.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Resolve a constant: locals of each context in the chain first, then the
    /// constants of its module, its enclosing modules and its superclasses.
    pub fn lookup_constant(&self, name: Key) -> Option<Value> {
        if let Some(value) = self.lookup_constant_here(name) {
            return Some(value);
        }
        let mut current = self.parent();
        while let Some(ctx) = current {
            if let Some(value) = ctx.lookup_constant_here(name) {
                return Some(value);
            }
            current = ctx.parent();
        }
        None
    }

    fn lookup_constant_here(&self, name: Key) -> Option<Value> {
        if let Some(value) = self.locals.borrow().get(&name) {
            return Some(value.clone());
        }
        let module = self.module.as_ref()?;

        let mut lexical = Some(module.clone());
        while let Some(class) = lexical {
            if let Some(value) = class.constant(name) {
                return Some(value);
            }
            lexical = class.parent();
        }

        Class::ancestors(module).iter().find_map(|class| class.constant(name))
    }
}
