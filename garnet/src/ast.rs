//! Syntax tree produced by the parser.
//!
//! Nodes are immutable once built. Method and block bodies are held behind
//! `Rc` so that the function values created from them at runtime can share
//! them with the tree.

use std::rc::Rc;

use crate::error::Tagged;
use crate::types::Key;

/// A sequence of statements; evaluates to the value of the last one.
pub type Body = Vec<Tagged<Node>>;

/// Parameter list of a method or a block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    /// Positional parameters.
    pub names: Vec<Key>,

    /// The `&name` parameter receiving the block, if any.
    pub block: Option<Key>,
}

impl Params {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.block.is_none()
    }
}

/// The body of a `def`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub name: Key,
    pub params: Params,
    pub body: Body,

    /// Label of the source file, for diagnostics.
    pub file: Rc<str>,
}

/// A block literal (`{ |x| ... }`, `do ... end`, `-> (x) { ... }`), or the
/// body of a `for` loop.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDef {
    pub params: Params,
    pub body: Body,
    pub file: Rc<str>,
}

/// Block passed to a call.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockArg {
    /// A literal block following the call.
    Literal(Rc<BlockDef>),

    /// An `&expr` argument.
    Expr(Box<Tagged<Node>>),
}

/// A method call with an optional explicit receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub receiver: Option<Box<Tagged<Node>>>,
    pub name: Key,
    pub args: Vec<Tagged<Node>>,
    pub block: Option<BlockArg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Nil,
    True,
    False,
    SelfRef,
    Integer(i64),
    Float(f64),
    Str(String),
    Symbol(Key),

    Array(Vec<Tagged<Node>>),
    Hash(Vec<(Tagged<Node>, Tagged<Node>)>),

    /// `low..high` or `low...high`.
    Range {
        low: Box<Tagged<Node>>,
        high: Box<Tagged<Node>>,
        exclusive: bool,
    },

    LocalVar(Key),
    InstanceVar(Key),
    ClassVar(Key),
    GlobalVar(Key),
    Constant(Key),

    /// `Scope::Name`
    ScopedConstant {
        scope: Box<Tagged<Node>>,
        name: Key,
    },

    Call(Call),

    /// `receiver[args]`
    Index {
        receiver: Box<Tagged<Node>>,
        args: Vec<Tagged<Node>>,
    },

    /// Short-circuiting `&&` / `and`.
    And(Box<Tagged<Node>>, Box<Tagged<Node>>),

    /// Short-circuiting `||` / `or`.
    Or(Box<Tagged<Node>>, Box<Tagged<Node>>),

    Assign {
        target: Box<Tagged<Node>>,
        value: Box<Tagged<Node>>,
    },

    /// `if` and `unless` (with the branches swapped).
    If {
        condition: Box<Tagged<Node>>,
        then_branch: Body,
        else_branch: Body,
    },

    While {
        condition: Box<Tagged<Node>>,
        body: Body,
    },

    Until {
        condition: Box<Tagged<Node>>,
        body: Body,
    },

    /// `for var in iterable`, evaluated as `iterable.each { |var| body }`.
    For {
        iterable: Box<Tagged<Node>>,
        body: Rc<BlockDef>,
    },

    /// A method definition, on the singleton of `target` if given.
    Def {
        target: Option<Box<Tagged<Node>>>,
        def: Rc<MethodDef>,
    },

    Class {
        path: Box<Tagged<Node>>,
        superclass: Option<Box<Tagged<Node>>>,
        body: Body,
    },

    Module {
        path: Box<Tagged<Node>>,
        body: Body,
    },

    /// `-> (params) { body }`
    Lambda(Rc<BlockDef>),

    /// Parenthesized statement list.
    Sequence(Body),

    Yield(Vec<Tagged<Node>>),
    Super(Vec<Tagged<Node>>),
    Return(Option<Box<Tagged<Node>>>),
    Next(Option<Box<Tagged<Node>>>),
    Break,
    Redo,
    Retry,
}

impl Node {
    /// Whether this node may appear on the left of `=`.
    pub fn is_assignable(&self) -> bool {
        match self {
            Node::LocalVar(_)
            | Node::InstanceVar(_)
            | Node::ClassVar(_)
            | Node::GlobalVar(_)
            | Node::Constant(_)
            | Node::ScopedConstant { .. }
            | Node::Index { .. } => true,
            Node::Call(Call { receiver: Some(_), args, block: None, .. }) => args.is_empty(),
            _ => false,
        }
    }
}

/// A parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Body,
    pub file: Rc<str>,
}
