//! Function implementation.

use std::fmt::Debug;
use std::rc::Rc;

use gc::{Finalize, Gc, Trace};

use super::Value;
use crate::ast::{BlockDef, MethodDef, Params};
use crate::context::{Context, ContextKind};
use crate::error::Error;
use crate::eval::Vm;
use crate::types::Key;

/// Signature of methods implemented in Rust: the interpreter, the receiver,
/// the positional arguments and the block, if any.
pub type NativeFunction = fn(&mut Vm, &Value, &[Value], Option<&Func>) -> Result<Value, Error>;

/// A native method associated with a name.
#[derive(Copy, Clone)]
pub struct Builtin {
    /// The rust callable for evaluating the function.
    pub func: NativeFunction,

    /// The name of the method.
    pub name: Key,
}

/// A native method backed by a dynamic callable object, such as a closure.
/// Used for methods generated at runtime (attribute accessors,
/// `Symbol#to_proc`) and for host-supplied methods.
#[derive(Clone)]
pub struct NativeClosure(pub Rc<dyn Fn(&mut Vm, &Value, &[Value], Option<&Func>) -> Result<Value, Error>>);

impl NativeClosure {
    pub fn new(f: impl Fn(&mut Vm, &Value, &[Value], Option<&Func>) -> Result<Value, Error> + 'static) -> Self {
        Self(Rc::new(f))
    }
}

#[derive(Clone, Trace, Finalize)]
enum FuncV {
    /// A `def` method with the context it was defined in.
    Method(#[unsafe_ignore_trace] Rc<MethodDef>, Gc<Context>),

    /// A block or lambda closing over the context it was created in.
    Block(#[unsafe_ignore_trace] Rc<BlockDef>, Gc<Context>),

    Builtin(#[unsafe_ignore_trace] Builtin),
    NativeClosure(#[unsafe_ignore_trace] NativeClosure),
}

impl Debug for FuncV {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Method(def, _) => f.debug_tuple("Func::Method").field(&def.name).finish(),
            Self::Block(def, _) => f.debug_tuple("Func::Block").field(&def.params).finish(),
            Self::Builtin(b) => f.debug_tuple("Func::Builtin").field(&b.name).finish(),
            Self::NativeClosure(_) => f.debug_tuple("Func::NativeClosure").finish(),
        }
    }
}

/// Any callable: methods, blocks, procs and native methods.
#[derive(Clone, Debug, Trace, Finalize)]
pub struct Func(FuncV);

impl From<Builtin> for Func {
    fn from(value: Builtin) -> Self {
        Self(FuncV::Builtin(value))
    }
}

impl From<NativeClosure> for Func {
    fn from(value: NativeClosure) -> Self {
        Self(FuncV::NativeClosure(value))
    }
}

fn rc_addr<T: ?Sized>(x: &Rc<T>) -> usize {
    Rc::as_ptr(x) as *const () as usize
}

fn ctx_addr(x: &Gc<Context>) -> usize {
    &**x as *const Context as usize
}

impl Func {
    pub fn method(def: Rc<MethodDef>, ctx: Gc<Context>) -> Self {
        Self(FuncV::Method(def, ctx))
    }

    pub fn block(def: Rc<BlockDef>, ctx: Gc<Context>) -> Self {
        Self(FuncV::Block(def, ctx))
    }

    pub fn native(f: impl Fn(&mut Vm, &Value, &[Value], Option<&Func>) -> Result<Value, Error> + 'static) -> Self {
        Self::from(NativeClosure::new(f))
    }

    /// The defined name, for methods.
    pub fn name(&self) -> Option<Key> {
        let Self(this) = self;
        match this {
            FuncV::Method(def, _) => Some(def.name),
            FuncV::Builtin(b) => Some(b.name),
            _ => None,
        }
    }

    /// Constructors are hidden from `instance_methods`.
    pub fn is_constructor(&self) -> bool {
        self.name().map_or(false, |name| name.as_str() == "initialize")
    }

    /// Number of declared parameters, where known.
    pub fn arity(&self) -> Option<usize> {
        let Self(this) = self;
        match this {
            FuncV::Method(def, _) => Some(def.params.names.len()),
            FuncV::Block(def, _) => Some(def.params.names.len()),
            _ => None,
        }
    }

    /// Identity of the callable.
    pub fn id(&self) -> usize {
        let Self(this) = self;
        match this {
            FuncV::Method(def, ctx) => rc_addr(def).wrapping_mul(31) ^ ctx_addr(ctx),
            FuncV::Block(def, ctx) => rc_addr(def).wrapping_mul(31) ^ ctx_addr(ctx),
            FuncV::Builtin(b) => b.func as usize,
            FuncV::NativeClosure(NativeClosure(f)) => rc_addr(f),
        }
    }

    pub fn same(&self, other: &Func) -> bool {
        let (Self(this), Self(that)) = (self, other);
        match (this, that) {
            (FuncV::Method(x, xc), FuncV::Method(y, yc)) => Rc::ptr_eq(x, y) && Gc::ptr_eq(xc, yc),
            (FuncV::Block(x, xc), FuncV::Block(y, yc)) => Rc::ptr_eq(x, y) && Gc::ptr_eq(xc, yc),
            (FuncV::Builtin(x), FuncV::Builtin(y)) => x.name == y.name && x.func as usize == y.func as usize,
            (FuncV::NativeClosure(NativeClosure(x)), FuncV::NativeClosure(NativeClosure(y))) => {
                rc_addr(x) == rc_addr(y)
            }
            _ => false,
        }
    }

    /// Call the function.
    ///
    /// Methods run in a fresh context whose parent is the context they were
    /// defined in, with `self` bound to the receiver. Blocks ignore the
    /// receiver and keep the `self` of their defining context.
    pub fn invoke(&self, vm: &mut Vm, receiver: &Value, args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
        let Self(this) = self;
        match this {
            FuncV::Builtin(Builtin { func, .. }) => func(vm, receiver, args, block),
            FuncV::NativeClosure(NativeClosure(f)) => f(vm, receiver, args, block),

            FuncV::Method(def, captured) => {
                let ctx = Context::child(
                    captured,
                    receiver.clone(),
                    captured.module(),
                    ContextKind::Plain,
                    block.cloned(),
                );
                bind_params(&ctx, &def.params, args, block);
                vm.eval_body(&def.body, &ctx).map_err(|err| err.in_file(&def.file))
            }

            FuncV::Block(def, captured) => {
                if def.params.is_empty() {
                    return vm.eval_body(&def.body, captured).map_err(|err| err.in_file(&def.file));
                }

                let ctx = Context::child(
                    captured,
                    captured.receiver().clone(),
                    captured.module(),
                    ContextKind::Block,
                    captured.block(),
                );

                // A single array argument is spread over several parameters
                let spread;
                let args = match args {
                    [Value::Array(items)] if def.params.names.len() > 1 => {
                        spread = items.borrow().clone();
                        spread.as_slice()
                    }
                    _ => args,
                };

                bind_params(&ctx, &def.params, args, block);
                vm.eval_body(&def.body, &ctx).map_err(|err| err.in_file(&def.file))
            }
        }
    }
}

/// Bind positional parameters and the block parameter in a fresh context.
/// Missing arguments are left unbound and extra arguments are ignored.
fn bind_params(ctx: &Gc<Context>, params: &Params, args: &[Value], block: Option<&Func>) {
    for (name, value) in params.names.iter().zip(args.iter()) {
        ctx.define(*name, value.clone());
    }
    if let Some(name) = params.block {
        ctx.define(name, block.cloned().map(Value::Proc).unwrap_or(Value::Nil));
    }
}
