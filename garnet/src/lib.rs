//! Garnet: an embeddable interpreter for a small Ruby-like language.
//!
//! Source text goes through a hand-written lexer and recursive descent
//! parser into a syntax tree, which the [`Vm`] evaluates directly against a
//! dynamic class model with single inheritance, singleton methods and
//! closures.
//!
//! ```ignore
//! use garnet::{Config, SharedBuffer, Vm};
//!
//! let output = SharedBuffer::new();
//! let mut vm = Vm::new(Config::new().with_output(output.clone()));
//! vm.eval_str("puts [1, 2, 3].map { |x| x * 2 }.inspect")?;
//! assert_eq!(output.contents(), "[2, 4, 6]\n");
//! ```

#[macro_use]
extern crate lazy_static;

#[macro_use]
mod object;

pub mod ast;
mod builtins;
mod config;
mod context;
mod error;
mod eval;
mod lexing;
mod parsing;
mod stack;
mod stream;
mod traits;
mod types;
mod wrappers;

#[cfg(test)]
mod tests;

pub use config::{Config, SharedBuffer};
pub use error::{Action, Argument, Error, ErrorKind, Position, Reason, Span, Syntax, SyntaxError, Tagged, TypeMismatch};
pub use eval::{CallableResolver, CoreClasses, FileResolver, ImportResolver, NullResolver, SeqResolver, Vm};
pub use object::{format_float, Class, Func, Instance, Value};
pub use parsing::{parse, parse_reader};
pub use types::{Key, Type};
