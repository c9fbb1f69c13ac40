//! The tree-walking evaluator.
//!
//! [`Vm`] owns the global interpreter state: the core classes, the top-level
//! context, the output writer and the import machinery. Evaluation walks the
//! syntax tree directly; every operator is a method call, so native and
//! user-defined methods are dispatched the same way.

use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;

use gc::Gc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, instrument, trace};

use crate::ast::{BlockArg, Body, Call, MethodDef, Node, Program};
use crate::builtins;
use crate::config::Config;
use crate::context::{Context, ContextKind};
use crate::error::{Action, Argument, Error, Reason, Tagged, TypeMismatch};
use crate::object::{Class, Func, HashEntry, HashTable, Value};
use crate::lexing::Lexer;
use crate::parsing::{parse, Parser};
use crate::stack::ensure_sufficient_stack;
use crate::stream::ReaderStream;
use crate::types::{Key, List};


// Import resolution
// ------------------------------------------------------------------------------------------------

/// Finds the source code for `require`.
pub trait ImportResolver {
    fn resolve(&self, path: &str) -> Result<String, Error>;
}


/// Reads files relative to a root directory, adding `.rb` to paths without
/// an extension.
pub struct FileResolver {
    pub root: PathBuf,
}

impl ImportResolver for FileResolver {
    fn resolve(&self, path: &str) -> Result<String, Error> {
        let mut target = self.root.join(path);
        if target.extension().is_none() {
            target.set_extension("rb");
        }
        std::fs::read_to_string(&target).map_err(|_| Error::new(Reason::Load(path.to_owned())))
    }
}


pub struct ResolveFunc(pub Rc<dyn Fn(&str) -> Option<String>>);

/// Resolves paths with a host-supplied function.
pub struct CallableResolver {
    pub resolver: ResolveFunc,
}

impl CallableResolver {
    pub fn new(f: impl Fn(&str) -> Option<String> + 'static) -> CallableResolver {
        CallableResolver {
            resolver: ResolveFunc(Rc::new(f)),
        }
    }
}

impl ImportResolver for CallableResolver {
    fn resolve(&self, path: &str) -> Result<String, Error> {
        self.resolver.0.as_ref()(path).ok_or_else(|| Error::new(Reason::Load(path.to_owned())))
    }
}


/// Tries several resolvers in order.
pub struct SeqResolver {
    pub resolvers: Vec<Box<dyn ImportResolver>>,
}

impl ImportResolver for SeqResolver {
    fn resolve(&self, path: &str) -> Result<String, Error> {
        for resolver in &self.resolvers {
            if let Ok(code) = resolver.resolve(path) {
                return Ok(code);
            }
        }
        Err(Error::new(Reason::Load(path.to_owned())))
    }
}


pub struct NullResolver {}

impl ImportResolver for NullResolver {
    fn resolve(&self, path: &str) -> Result<String, Error> {
        Err(Error::new(Reason::Load(path.to_owned())))
    }
}


// Core classes
// ------------------------------------------------------------------------------------------------

/// The classes every program starts with.
pub struct CoreClasses {
    pub object: Gc<Class>,
    pub module: Gc<Class>,
    pub class: Gc<Class>,
    pub numeric: Gc<Class>,
    pub integer: Gc<Class>,
    pub float: Gc<Class>,
    pub string: Gc<Class>,
    pub symbol: Gc<Class>,
    pub array: Gc<Class>,
    pub hash: Gc<Class>,
    pub range: Gc<Class>,
    pub proc: Gc<Class>,
    pub nil: Gc<Class>,
    pub true_class: Gc<Class>,
    pub false_class: Gc<Class>,
}

fn subclass(name: &str, superclass: &Gc<Class>) -> Gc<Class> {
    Gc::new(Class::new(Key::new(name), Some(superclass.clone()), None, false))
}

impl CoreClasses {
    fn new() -> CoreClasses {
        let object = Gc::new(Class::new(Key::new("Object"), None, None, false));
        let module = subclass("Module", &object);
        let class = subclass("Class", &module);
        let numeric = subclass("Numeric", &object);

        let classes = CoreClasses {
            integer: subclass("Integer", &numeric),
            float: subclass("Float", &numeric),
            string: subclass("String", &object),
            symbol: subclass("Symbol", &object),
            array: subclass("Array", &object),
            hash: subclass("Hash", &object),
            range: subclass("Range", &object),
            proc: subclass("Proc", &object),
            nil: subclass("NilClass", &object),
            true_class: subclass("TrueClass", &object),
            false_class: subclass("FalseClass", &object),
            object,
            module,
            class,
            numeric,
        };

        for class in classes.all() {
            classes.object.set_constant(class.name(), Value::Class(class));
        }
        classes
    }

    pub fn all(&self) -> Vec<Gc<Class>> {
        vec![
            self.object.clone(),
            self.module.clone(),
            self.class.clone(),
            self.numeric.clone(),
            self.integer.clone(),
            self.float.clone(),
            self.string.clone(),
            self.symbol.clone(),
            self.array.clone(),
            self.hash.clone(),
            self.range.clone(),
            self.proc.clone(),
            self.nil.clone(),
            self.true_class.clone(),
            self.false_class.clone(),
        ]
    }
}


// The interpreter
// ------------------------------------------------------------------------------------------------

pub struct Vm {
    root: Gc<Context>,
    main: Value,
    classes: CoreClasses,
    output: Box<dyn Write>,
    resolver: Box<dyn ImportResolver>,
    loaded: HashSet<String>,
    rng: StdRng,
    source_name: String,

    /// Collections currently being inspected, to cut off cycles.
    inspecting: Vec<usize>,

    /// Pairs of collections currently being compared.
    comparing: Vec<(usize, usize)>,
}

impl Vm {
    pub fn new(config: Config) -> Vm {
        let Config { output, resolver, seed, source_name } = config;

        let classes = CoreClasses::new();
        let main = Value::object(classes.object.clone());
        let root = Context::root(main.clone(), Some(classes.object.clone()));
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut vm = Vm {
            root,
            main,
            classes,
            output,
            resolver,
            loaded: HashSet::new(),
            rng,
            source_name,
            inspecting: vec![],
            comparing: vec![],
        };
        builtins::install(&mut vm);
        vm
    }

    pub fn classes(&self) -> &CoreClasses {
        &self.classes
    }

    /// The top-level object.
    pub fn main(&self) -> &Value {
        &self.main
    }

    pub fn root(&self) -> &Gc<Context> {
        &self.root
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub(crate) fn write(&mut self, text: &str) -> Result<(), Error> {
        self.output
            .write_all(text.as_bytes())
            .map_err(|err| Error::external(err.to_string()))
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.root.get(Key::new(name))
    }

    pub fn set_global(&self, name: &str, value: Value) {
        self.root.define(Key::new(name), value)
    }

    /// A top-level constant, such as a class.
    pub fn constant(&self, name: &str) -> Option<Value> {
        self.classes.object.constant(Key::new(name))
    }

    // Entry points
    // --------------------------------------------------------------------------------------------

    /// Evaluate the main program.
    #[instrument(skip(self, code))]
    pub fn eval_str(&mut self, code: &str) -> Result<Value, Error> {
        let file = self.source_name.clone();
        self.eval_source(code, &file)
    }

    /// Evaluate source code at the top level. The file label is used in
    /// diagnostics. Errors are rendered with the source line when they
    /// originate in this file.
    pub fn eval_source(&mut self, code: &str, file: &str) -> Result<Value, Error> {
        let program = parse(code, file).map_err(|err| Error::from(err).in_file(file).render(Some(code)))?;
        self.eval_parsed(&program, code, file)
    }

    /// Parse and evaluate a program read line by line from `reader`.
    pub fn eval_reader<R: BufRead>(&mut self, reader: R, file: &str) -> Result<Value, Error> {
        let mut parser = Parser::new(Lexer::new(ReaderStream::new(reader)), file);
        let program = parser.parse();
        let code = parser.text();
        let program = program.map_err(|err| Error::from(err).in_file(file).render(Some(&code)))?;
        self.eval_parsed(&program, &code, file)
    }

    fn eval_parsed(&mut self, program: &Program, code: &str, file: &str) -> Result<Value, Error> {
        self.eval_program(program).map_err(|err| {
            let err = err.in_file(file);
            if err.file() == Some(file) {
                err.render(Some(code))
            } else {
                err.render(None)
            }
        })
    }

    pub fn eval_program(&mut self, program: &Program) -> Result<Value, Error> {
        let root = self.root.clone();
        self.eval_body(&program.body, &root)
    }

    /// Load a file through the import resolver, once. Returns false if the
    /// path was loaded before.
    #[instrument(skip(self))]
    pub fn require(&mut self, path: &str) -> Result<bool, Error> {
        if self.loaded.contains(path) {
            return Ok(false);
        }
        let code = self.resolver.resolve(path)?;
        self.loaded.insert(path.to_owned());
        debug!(path, "loading file");
        self.eval_source(&code, path)?;
        Ok(true)
    }

    // Dispatch
    // --------------------------------------------------------------------------------------------

    pub fn class_of(&self, value: &Value) -> Gc<Class> {
        let c = &self.classes;
        match value {
            Value::Nil => c.nil.clone(),
            Value::Bool(true) => c.true_class.clone(),
            Value::Bool(false) => c.false_class.clone(),
            Value::Int(_) => c.integer.clone(),
            Value::Float(_) => c.float.clone(),
            Value::Symbol(_) => c.symbol.clone(),
            Value::Str(_) => c.string.clone(),
            Value::Array(_) => c.array.clone(),
            Value::Hash(_) => c.hash.clone(),
            Value::Range(..) => c.range.clone(),
            Value::Proc(_) => c.proc.clone(),
            Value::Class(x) if x.is_module() => c.module.clone(),
            Value::Class(_) => c.class.clone(),
            Value::Object(x) => x.class(),
        }
    }

    /// Find the method a value responds to: singleton methods first, then the
    /// class chain. Classes respond to the singleton methods of themselves and
    /// their superclasses, then to the instance methods of `Class`.
    pub fn find_method_for(&self, receiver: &Value, name: Key) -> Option<Func> {
        match receiver {
            Value::Object(obj) => match obj.singleton() {
                Some(singleton) => singleton.find_method(name),
                None => obj.class().find_method(name),
            },
            Value::Class(class) => self.find_class_method(class, name),
            _ => self.class_of(receiver).find_method(name),
        }
    }

    pub fn find_class_method(&self, class: &Gc<Class>, name: Key) -> Option<Func> {
        Class::ancestors(class)
            .iter()
            .filter_map(|c| c.singleton())
            .find_map(|s| s.own_method(name))
            .or_else(|| self.class_of(&Value::Class(class.clone())).find_method(name))
    }

    pub fn responds_to(&self, receiver: &Value, name: Key) -> bool {
        self.find_method_for(receiver, name).is_some()
    }

    /// Call a method on an explicit receiver, falling back to
    /// `method_missing` for receivers that aren't classes.
    pub fn send(&mut self, receiver: &Value, name: Key, args: &[Value], block: Option<&Func>) -> Result<Value, Error> {
        trace!(method = name.as_str(), "dispatch");
        if let Some(func) = self.find_method_for(receiver, name) {
            return func.invoke(self, receiver, args, block);
        }

        if !matches!(receiver, Value::Class(_)) {
            if let Some(func) = self.find_method_for(receiver, Key::new("method_missing")) {
                trace!(method = name.as_str(), "method_missing");
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(Value::Symbol(name));
                full.extend_from_slice(args);
                return func.invoke(self, receiver, &full, block);
            }
        }

        Err(self.no_method(receiver, name))
    }

    /// Convenience wrapper around [`Vm::send`] for embedders.
    pub fn call(&mut self, receiver: &Value, name: &str, args: &[Value]) -> Result<Value, Error> {
        self.send(receiver, Key::new(name), args, None)
    }

    pub(crate) fn no_method(&self, receiver: &Value, name: Key) -> Error {
        let class = Key::new(self.class_of(receiver).full_name());
        Error::new(Reason::NoMethod { name, class })
    }

    /// Call a method without an explicit receiver: on `self` first, then on
    /// the top-level object. Returns `None` if neither has it.
    fn call_implicit(&mut self, ctx: &Gc<Context>, name: Key, args: &[Value], block: Option<&Func>) -> Result<Option<Value>, Error> {
        let receiver = ctx.receiver().clone();
        if let Some(func) = self.find_method_for(&receiver, name) {
            trace!(method = name.as_str(), "dispatch on self");
            return func.invoke(self, &receiver, args, block).map(Some);
        }

        let main = self.main.clone();
        if let Some(func) = self.find_method_for(&main, name) {
            trace!(method = name.as_str(), "dispatch on main");
            return func.invoke(self, &main, args, block).map(Some);
        }

        Ok(None)
    }

    // Conversions
    // --------------------------------------------------------------------------------------------

    /// String form of a value, via its `to_s` method.
    pub fn to_s(&mut self, value: &Value) -> Result<String, Error> {
        if let Value::Str(x) = value {
            return Ok(x.borrow().clone());
        }
        match self.send(value, Key::new("to_s"), &[], None)? {
            Value::Str(ref x) => Ok(x.borrow().clone()),
            _ => Ok(self.default_to_s(value)),
        }
    }

    /// Debug form of a value, via its `inspect` method.
    pub fn inspect(&mut self, value: &Value) -> Result<String, Error> {
        match self.send(value, Key::new("inspect"), &[], None)? {
            Value::Str(ref x) => Ok(x.borrow().clone()),
            _ => Ok(self.default_to_s(value)),
        }
    }

    pub(crate) fn default_to_s(&self, value: &Value) -> String {
        match value {
            Value::Object(x) => format!("#<{}>", x.class().full_name()),
            Value::Class(x) => x.full_name(),
            Value::Proc(_) => "#<Proc>".to_owned(),
            _ => format!("{:?}", value),
        }
    }

    /// Run `f` unless the collection with this identity is already being
    /// converted further up the stack, in which case return `recursive`.
    pub(crate) fn guard_recursion(
        &mut self,
        id: usize,
        recursive: &str,
        f: impl FnOnce(&mut Vm) -> Result<String, Error>,
    ) -> Result<String, Error> {
        if self.inspecting.contains(&id) {
            return Ok(recursive.to_owned());
        }
        self.inspecting.push(id);
        let ret = ensure_sufficient_stack(|| f(self));
        self.inspecting.pop();
        ret
    }

    /// Run the comparison `f` unless the same pair of collections is already
    /// being compared further up the stack, in which case they count as equal.
    pub(crate) fn guard_comparison(
        &mut self,
        pair: (usize, usize),
        f: impl FnOnce(&mut Vm) -> Result<bool, Error>,
    ) -> Result<bool, Error> {
        if self.comparing.contains(&pair) {
            return Ok(true);
        }
        self.comparing.push(pair);
        let ret = ensure_sufficient_stack(|| f(self));
        self.comparing.pop();
        ret
    }

    pub(crate) fn expect_class(&self, value: &Value) -> Result<Gc<Class>, Error> {
        match value {
            Value::Class(x) => Ok(x.clone()),
            other => Err(Error::new(TypeMismatch::NotAClass(Key::new(format!("{:?}", other))))),
        }
    }

    pub fn get_ivar(&self, receiver: &Value, name: Key) -> Value {
        match receiver {
            Value::Object(x) => x.ivar(name).unwrap_or(Value::Nil),
            Value::Class(x) => x.ivar(name).unwrap_or(Value::Nil),
            _ => Value::Nil,
        }
    }

    pub fn set_ivar(&self, receiver: &Value, name: Key, value: Value) -> Result<(), Error> {
        match receiver {
            Value::Object(x) => x.set_ivar(name, value),
            Value::Class(x) => x.set_ivar(name, value),
            other => return Err(Error::new(TypeMismatch::NoInstanceVariables(other.type_of()))),
        }
        Ok(())
    }

    /// The class holding class variables for code running with this context.
    fn class_var_owner(&self, ctx: &Gc<Context>) -> Gc<Class> {
        match ctx.receiver() {
            Value::Class(x) => x.clone(),
            other => self.class_of(other),
        }
    }

    // Host interop
    // --------------------------------------------------------------------------------------------

    /// Create a class (or return the existing one with this name) inside
    /// `enclosing`, or at the top level.
    pub fn define_class(&mut self, name: &str, superclass: Option<&Gc<Class>>, enclosing: Option<&Gc<Class>>) -> Gc<Class> {
        let key = Key::new(name);
        let object = self.classes.object.clone();
        let namespace = enclosing.cloned().unwrap_or_else(|| object.clone());

        if let Some(Value::Class(ref existing)) = namespace.constant(key) {
            return existing.clone();
        }

        let parent = enclosing.filter(|e| !Gc::ptr_eq(e, &object)).cloned();
        let superclass = superclass.cloned().unwrap_or(object);
        let class = Gc::new(Class::new(key, Some(superclass), parent, false));
        namespace.set_constant(key, Value::Class(class.clone()));
        debug!(class = %class.full_name(), "defined host class");
        class
    }

    pub fn set_instance_method(
        &self,
        class: &Gc<Class>,
        name: &str,
        f: impl Fn(&mut Vm, &Value, &[Value], Option<&Func>) -> Result<Value, Error> + 'static,
    ) {
        class.set_method(Key::new(name), Func::native(f));
    }

    pub fn set_class_method(
        &self,
        class: &Gc<Class>,
        name: &str,
        f: impl Fn(&mut Vm, &Value, &[Value], Option<&Func>) -> Result<Value, Error> + 'static,
    ) {
        Class::ensure_singleton(class).set_method(Key::new(name), Func::native(f));
    }

    // Evaluation
    // --------------------------------------------------------------------------------------------

    /// Evaluate statements in order, returning the last value.
    pub(crate) fn eval_body(&mut self, body: &Body, ctx: &Gc<Context>) -> Result<Value, Error> {
        let mut ret = Value::Nil;
        for node in body {
            ret = self.eval(node, ctx)?;
        }
        Ok(ret)
    }

    pub(crate) fn eval(&mut self, node: &Tagged<Node>, ctx: &Gc<Context>) -> Result<Value, Error> {
        ensure_sufficient_stack(|| self.eval_node(node, ctx)).map_err(|err| {
            if err.locations().is_empty() {
                err.tag(node, Action::Evaluate)
            } else {
                err
            }
        })
    }

    fn eval_args(&mut self, args: &[Tagged<Node>], ctx: &Gc<Context>) -> Result<List, Error> {
        let mut ret = List::with_capacity(args.len());
        for arg in args {
            ret.push(self.eval(arg, ctx)?);
        }
        Ok(ret)
    }

    fn eval_node(&mut self, node: &Tagged<Node>, ctx: &Gc<Context>) -> Result<Value, Error> {
        match node.as_ref() {
            Node::Nil => Ok(Value::Nil),
            Node::True => Ok(Value::Bool(true)),
            Node::False => Ok(Value::Bool(false)),
            Node::SelfRef => Ok(ctx.receiver().clone()),
            Node::Integer(x) => Ok(Value::Int(*x)),
            Node::Float(x) => Ok(Value::Float(*x)),
            Node::Str(x) => Ok(Value::str(x.as_str())),
            Node::Symbol(x) => Ok(Value::Symbol(*x)),

            Node::Array(items) => Ok(Value::array(self.eval_args(items, ctx)?)),

            Node::Hash(pairs) => {
                let mut table = HashTable::new();
                for (k, v) in pairs {
                    let key = self.eval(k, ctx)?;
                    let value = self.eval(v, ctx)?;
                    table.insert(key.hash_key(), HashEntry::new(&key, value));
                }
                Ok(Value::hash(table))
            }

            Node::Range { low, high, exclusive } => {
                let low = self.eval(low, ctx)?;
                let high = self.eval(high, ctx)?;
                match (low, high) {
                    (Value::Int(low), Value::Int(high)) => {
                        let high = if *exclusive { high.saturating_sub(1) } else { high };
                        Ok(Value::Range(low, high))
                    }
                    (Value::Int(_), other) | (other, _) => {
                        Err(Error::new(TypeMismatch::RangeBounds(other.type_of())).tag(node, Action::Evaluate))
                    }
                }
            }

            Node::LocalVar(name) => {
                if let Some(value) = ctx.get(*name) {
                    return Ok(value);
                }
                match self.call_implicit(ctx, *name, &[], None).map_err(|e| e.tag(node, Action::Call))? {
                    Some(value) => Ok(value),
                    None => Err(Error::new(Reason::Name(*name)).tag(node, Action::Lookup)),
                }
            }

            Node::InstanceVar(name) => Ok(self.get_ivar(ctx.receiver(), *name)),

            Node::ClassVar(name) => {
                let owner = self.class_var_owner(ctx);
                Class::ancestors(&owner)
                    .iter()
                    .find_map(|c| c.ivar(*name))
                    .ok_or_else(|| Error::new(Reason::UninitializedClassVariable(*name)).tag(node, Action::Lookup))
            }

            Node::GlobalVar(name) => Ok(self.root.get(*name).unwrap_or(Value::Nil)),

            Node::Constant(name) => ctx
                .lookup_constant(*name)
                .ok_or_else(|| Error::new(Reason::UninitializedConstant(*name)).tag(node, Action::Lookup)),

            Node::ScopedConstant { scope, name } => {
                let scope = self.eval(scope, ctx)?;
                let class = self.expect_class(&scope).map_err(|e| e.tag(node, Action::Lookup))?;
                Class::ancestors(&class)
                    .iter()
                    .find_map(|c| c.constant(*name))
                    .ok_or_else(|| Error::new(Reason::UninitializedConstant(*name)).tag(node, Action::Lookup))
            }

            Node::Call(call) => self.eval_call(node, call, ctx),

            Node::Index { receiver, args } => {
                let receiver = self.eval(receiver, ctx)?;
                let args = self.eval_args(args, ctx)?;
                self.send(&receiver, Key::new("[]"), &args, None)
                    .map_err(|e| e.tag(node, Action::Call))
            }

            Node::And(left, right) => {
                let left = self.eval(left, ctx)?;
                if left.truthy() {
                    self.eval(right, ctx)
                } else {
                    Ok(left)
                }
            }

            Node::Or(left, right) => {
                let left = self.eval(left, ctx)?;
                if left.truthy() {
                    Ok(left)
                } else {
                    self.eval(right, ctx)
                }
            }

            Node::Assign { target, value } => self.eval_assign(target, value, ctx),

            Node::If { condition, then_branch, else_branch } => {
                if self.eval(condition, ctx)?.truthy() {
                    self.eval_body(then_branch, ctx)
                } else {
                    self.eval_body(else_branch, ctx)
                }
            }

            Node::While { condition, body } => {
                while self.eval(condition, ctx)?.truthy() {
                    self.eval_body(body, ctx)?;
                }
                Ok(Value::Nil)
            }

            Node::Until { condition, body } => {
                while !self.eval(condition, ctx)?.truthy() {
                    self.eval_body(body, ctx)?;
                }
                Ok(Value::Nil)
            }

            Node::For { iterable, body } => {
                let iterable = self.eval(iterable, ctx)?;
                let block = Func::block(body.clone(), ctx.clone());
                self.send(&iterable, Key::new("each"), &[], Some(&block))
                    .map_err(|e| e.tag(node, Action::Call))
            }

            Node::Def { target, def } => self.eval_def(node, target.as_deref(), def, ctx),

            Node::Class { path, superclass, body } => {
                self.eval_class(node, path, superclass.as_deref(), body, false, ctx)
            }

            Node::Module { path, body } => self.eval_class(node, path, None, body, true, ctx),

            Node::Lambda(def) => Ok(Value::Proc(Func::block(def.clone(), ctx.clone()))),

            Node::Sequence(body) => self.eval_body(body, ctx),

            Node::Yield(args) => {
                let args = self.eval_args(args, ctx)?;
                let block = ctx
                    .block()
                    .ok_or_else(|| Error::new(Argument::NoBlock).tag(node, Action::Yield))?;
                block
                    .invoke(self, ctx.receiver(), &args, None)
                    .map_err(|e| e.tag(node, Action::Yield))
            }

            Node::Super(_) => Err(Error::new(Reason::NotImplemented("super"))),
            Node::Return(_) => Err(Error::new(Reason::NotImplemented("return"))),
            Node::Next(_) => Err(Error::new(Reason::NotImplemented("next"))),
            Node::Break => Err(Error::new(Reason::NotImplemented("break"))),
            Node::Redo => Err(Error::new(Reason::NotImplemented("redo"))),
            Node::Retry => Err(Error::new(Reason::NotImplemented("retry"))),
        }
    }

    fn eval_block_arg(&mut self, block: &Option<BlockArg>, ctx: &Gc<Context>) -> Result<Option<Func>, Error> {
        match block {
            None => Ok(None),
            Some(BlockArg::Literal(def)) => Ok(Some(Func::block(def.clone(), ctx.clone()))),
            Some(BlockArg::Expr(expr)) => match self.eval(expr, ctx)? {
                Value::Nil => Ok(None),
                Value::Proc(ref func) => Ok(Some(func.clone())),
                Value::Symbol(name) => Ok(Some(builtins::symbol_proc(name))),
                other => Err(Error::new(TypeMismatch::NotAProc(other.type_of())).tag(&**expr, Action::Evaluate)),
            },
        }
    }

    fn eval_call(&mut self, node: &Tagged<Node>, call: &Call, ctx: &Gc<Context>) -> Result<Value, Error> {
        let receiver = match &call.receiver {
            Some(receiver) => Some(self.eval(receiver, ctx)?),
            None => None,
        };
        let args = self.eval_args(&call.args, ctx)?;
        let block = self.eval_block_arg(&call.block, ctx)?;

        let result = match receiver {
            Some(receiver) => self.send(&receiver, call.name, &args, block.as_ref()),
            None => self
                .call_implicit(ctx, call.name, &args, block.as_ref())
                .and_then(|found| found.ok_or_else(|| self.no_method(ctx.receiver(), call.name))),
        };

        result.map_err(|e| e.tag(node, Action::Call))
    }

    fn eval_assign(&mut self, target: &Tagged<Node>, value: &Tagged<Node>, ctx: &Gc<Context>) -> Result<Value, Error> {
        let value = self.eval(value, ctx)?;
        let tag = |e: Error| e.tag(target, Action::Assign);

        match target.as_ref() {
            Node::LocalVar(name) => Context::assign(ctx, *name, value.clone()),

            Node::GlobalVar(name) => self.root.define(*name, value.clone()),

            Node::InstanceVar(name) => self.set_ivar(ctx.receiver(), *name, value.clone()).map_err(tag)?,

            Node::ClassVar(name) => {
                let owner = self.class_var_owner(ctx);
                let holder = Class::ancestors(&owner)
                    .into_iter()
                    .find(|c| c.has_ivar(*name))
                    .unwrap_or(owner);
                holder.set_ivar(*name, value.clone());
            }

            Node::Constant(name) => match ctx.module() {
                Some(module) => module.set_constant(*name, value.clone()),
                None => ctx.define(*name, value.clone()),
            },

            Node::ScopedConstant { scope, name } => {
                let scope = self.eval(scope, ctx)?;
                let class = self.expect_class(&scope).map_err(tag)?;
                class.set_constant(*name, value.clone());
            }

            Node::Index { receiver, args } => {
                let receiver = self.eval(receiver, ctx)?;
                let mut args = self.eval_args(args, ctx)?;
                args.push(value.clone());
                self.send(&receiver, Key::new("[]="), &args, None)
                    .map_err(|e| e.tag(target, Action::Call))?;
            }

            Node::Call(Call { receiver: Some(receiver), name, args, block: None }) if args.is_empty() => {
                let receiver = self.eval(receiver, ctx)?;
                let setter = Key::new(format!("{}=", name.as_str()));
                self.send(&receiver, setter, &[value.clone()], None)
                    .map_err(|e| e.tag(target, Action::Call))?;
            }

            _ => return Err(tag(Error::new(Reason::NotImplemented("assignment to this target")))),
        }

        Ok(value)
    }

    fn eval_def(
        &mut self,
        node: &Tagged<Node>,
        target: Option<&Tagged<Node>>,
        def: &Rc<MethodDef>,
        ctx: &Gc<Context>,
    ) -> Result<Value, Error> {
        let class = match target {
            None => ctx.module().unwrap_or_else(|| self.classes.object.clone()),
            Some(target) => match self.eval(target, ctx)? {
                Value::Class(ref class) => Class::ensure_singleton(class),
                Value::Object(ref obj) => obj.ensure_singleton(),
                other => {
                    return Err(Error::new(TypeMismatch::NoSingleton(other.type_of())).tag(node, Action::DefineMethod))
                }
            },
        };

        debug!(class = %class.full_name(), method = def.name.as_str(), "defined method");
        class.set_method(def.name, Func::method(def.clone(), ctx.clone()));
        Ok(Value::Symbol(def.name))
    }

    fn eval_class(
        &mut self,
        node: &Tagged<Node>,
        path: &Tagged<Node>,
        superclass: Option<&Tagged<Node>>,
        body: &Body,
        module: bool,
        ctx: &Gc<Context>,
    ) -> Result<Value, Error> {
        let object = self.classes.object.clone();

        let (namespace, name) = match path.as_ref() {
            Node::Constant(name) => (ctx.module().unwrap_or_else(|| object.clone()), *name),
            Node::ScopedConstant { scope, name } => {
                let scope = self.eval(scope, ctx)?;
                let namespace = self.expect_class(&scope).map_err(|e| e.tag(path, Action::Lookup))?;
                (namespace, *name)
            }
            _ => return Err(Error::new(Reason::NotImplemented("class path")).tag(path, Action::DefineClass)),
        };

        let superclass = match superclass {
            Some(expr) => {
                let value = self.eval(expr, ctx)?;
                Some(self.expect_class(&value).map_err(|e| e.tag(expr, Action::DefineClass))?)
            }
            None => None,
        };

        let class = match namespace.constant(name) {
            Some(Value::Class(ref existing)) => {
                if let Some(requested) = &superclass {
                    let same = existing.superclass().map_or(false, |s| Gc::ptr_eq(&s, requested));
                    if !same {
                        return Err(Error::new(TypeMismatch::SuperclassMismatch(name)).tag(node, Action::DefineClass));
                    }
                }
                debug!(class = %existing.full_name(), "reopening class");
                existing.clone()
            }
            Some(_) => return Err(Error::new(TypeMismatch::NotAClass(name)).tag(path, Action::DefineClass)),
            None => {
                let parent = if Gc::ptr_eq(&namespace, &object) { None } else { Some(namespace.clone()) };
                let superclass = if module { None } else { Some(superclass.unwrap_or(object)) };
                let class = Gc::new(Class::new(name, superclass, parent, module));
                namespace.set_constant(name, Value::Class(class.clone()));
                debug!(class = %class.full_name(), module, "created class");
                class
            }
        };

        let body_ctx = Context::child(
            ctx,
            Value::Class(class.clone()),
            Some(class),
            ContextKind::Plain,
            None,
        );
        self.eval_body(body, &body_ctx).map_err(|e| e.tag(node, Action::DefineClass))
    }
}
