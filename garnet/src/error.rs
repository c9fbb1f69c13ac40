use std::cmp::{max, min};
use std::fmt::{Debug, Display, Write};
use std::ops::{Deref, Range, Sub};

use crate::types::{Key, Type};

/// Marks a position in a text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    offset: usize,
    line: u32,
    column: u32,
}

impl Position {
    /// Construct a new position from offset, line and column (all 0-indexed).
    ///
    /// The offset counts characters, not bytes.
    pub fn new(offset: usize, line: u32, column: u32) -> Position {
        Position {
            offset,
            line,
            column,
        }
    }

    /// Construct a new position pointing to the beginning of a buffer.
    pub fn zero() -> Position {
        Position {
            offset: 0,
            line: 0,
            column: 0,
        }
    }

    /// Return the zero-indexed offset into the buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Return the zero-indexed line number.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Return the zero-indexed column number.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Return a new span starting at this position with a certain length.
    pub fn with_length(&self, length: usize) -> Span {
        Span {
            start: *self,
            length,
        }
    }
}

impl Sub<Position> for Position {
    type Output = Span;

    /// Create a span marking the interval between two positions.
    fn sub(self, rhs: Position) -> Self::Output {
        rhs.with_length(self.offset.saturating_sub(rhs.offset))
    }
}

/// Mark an interval of text in a buffer starting at a `Position` with a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    start: Position,
    length: usize,
}

impl Span {
    /// The starting position in the text span.
    pub fn start(&self) -> Position {
        self.start
    }

    /// The offset of the start of the span into the buffer.
    pub fn offset(&self) -> usize {
        self.start.offset
    }

    /// The zero-indexed line number of the start of the span.
    pub fn line(&self) -> u32 {
        self.start.line
    }

    /// The zero-indexed column number of the start of the span.
    pub fn column(&self) -> u32 {
        self.start.column
    }

    /// The length of the span.
    pub fn length(&self) -> usize {
        self.length
    }

    /// The offset one past the end of the span.
    pub fn end(&self) -> usize {
        self.start.offset + self.length
    }
}

impl From<Position> for Span {
    fn from(value: Position) -> Self {
        value.with_length(0)
    }
}

impl<T> From<&Tagged<T>> for Span {
    fn from(value: &Tagged<T>) -> Self {
        value.span()
    }
}

impl From<Range<Span>> for Span {
    /// Join two spans into one covering both, assuming `start` comes first.
    fn from(Range { start, end }: Range<Span>) -> Self {
        Span {
            start: start.start(),
            length: max(end.end(), start.end()) - start.offset(),
        }
    }
}

/// A wrapper for marking any object with a text span pointing to its origin in
/// a source file.
///
/// The AST (see ast.rs) makes heavy use of Tagged objects, so that errors can
/// be accurately reported.
#[derive(Clone, PartialEq)]
pub struct Tagged<T> {
    span: Span,
    contents: T,
}

impl<T> Tagged<T> {
    /// Construct a new Tagged wrapper.
    pub fn new(location: Span, contents: T) -> Tagged<T> {
        Tagged::<T> {
            span: location,
            contents,
        }
    }

    /// Return the text span.
    pub fn span(&self) -> Span {
        self.span
    }

    /// Destroy the wrapper and return its contents.
    pub fn unwrap(self) -> T {
        self.contents
    }

    /// Map the wrapped object and return a new tagged wrapper.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Tagged<U> {
        Tagged::<U> {
            span: self.span,
            contents: f(self.contents),
        }
    }

    /// Map the whole tagged object and return a new tagged wrapper.
    ///
    /// Useful for creating longer layers of tagged objects.
    pub fn wrap<U>(self, f: impl FnOnce(Tagged<T>) -> U) -> Tagged<U> {
        Tagged::<U> {
            span: self.span,
            contents: f(self),
        }
    }

    /// Substitute the text span with a new one.
    pub fn retag<U>(self, loc: U) -> Tagged<T>
    where
        Span: From<U>,
    {
        Tagged::<T> {
            span: Span::from(loc),
            contents: self.contents,
        }
    }
}

impl<T: Debug> Debug for Tagged<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.contents.fmt(f)?;
        let span = self.span;
        f.write_fmt(format_args!(
            ".tag({}:{}, {}..{})",
            span.line() + 1,
            span.column() + 1,
            span.offset(),
            span.end()
        ))
    }
}

impl<T> Deref for Tagged<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.contents
    }
}

impl<T> AsRef<T> for Tagged<T> {
    fn as_ref(&self) -> &T {
        &self.contents
    }
}

/// Error type produced by the lexer and the parser.
///
/// Besides the position, a syntax error remembers the text of the offending
/// line so that it can be displayed with a caret even when the source came
/// from an incremental reader.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntaxError {
    position: Position,
    reason: Syntax,
    line_text: Option<String>,
}

impl SyntaxError {
    /// Create a new syntax error.
    pub fn new(position: Position, reason: Syntax) -> SyntaxError {
        SyntaxError {
            position,
            reason,
            line_text: None,
        }
    }

    pub(crate) fn with_line_text(mut self, text: String) -> SyntaxError {
        if self.line_text.is_none() {
            self.line_text = Some(text);
        }
        self
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn reason(&self) -> &Syntax {
        &self.reason
    }

    pub fn line_text(&self) -> Option<&str> {
        self.line_text.as_deref()
    }

    /// Convert to the general error type.
    pub fn to_error(self) -> Error {
        let SyntaxError { position, reason, .. } = self;
        Error::new(reason).tag(position, Action::Parse)
    }
}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{}:{}: {}",
            self.position.line() + 1,
            self.position.column() + 1,
            Reason::Syntax(self.reason.clone()),
        ))?;
        if let Some(text) = &self.line_text {
            f.write_char('\n')?;
            f.write_str(text)?;
            f.write_char('\n')?;
            for _ in 0..self.position.column() {
                f.write_char(' ')?;
            }
            f.write_char('^')?;
        }
        Ok(())
    }
}

impl From<SyntaxError> for Error {
    fn from(value: SyntaxError) -> Self {
        value.to_error()
    }
}

/// Reasons for failing to lex or parse a program.
#[derive(Debug, Clone, PartialEq)]
pub enum Syntax {
    UnexpectedEof,
    UnexpectedChar(char),
    UnterminatedString,
    InvalidSymbol,
    InvalidNumber(String),
    UnexpectedToken(String),
    Expected(&'static str),
    InvalidAssignment,
}

/// Type errors raised by built-in operations.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TypeMismatch {
    /// The right operand of an arithmetic operator can't be coerced.
    Coerce { from: Type, to: Type },

    /// A value of one type was given where another was required.
    Convert { from: Type, to: Type },

    /// Range endpoints must be integers.
    RangeBounds(Type),

    /// A name was expected to refer to a class or module.
    NotAClass(Key),

    /// A class was reopened with a different superclass.
    SuperclassMismatch(Key),

    /// Instance variables can only live on objects and classes.
    NoInstanceVariables(Type),

    /// A block argument (`&x`) wasn't a proc.
    NotAProc(Type),

    /// Singleton methods can only be defined on objects and classes.
    NoSingleton(Type),
}

/// Argument errors raised by native functions.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Argument {
    /// Wrong number of arguments: given, minimum and maximum expected.
    Count { given: usize, min: usize, max: Option<usize> },

    /// A block was required.
    NoBlock,

    /// A negative argument where a size or count was required.
    Negative(i64),

    /// An argument had an invalid value.
    Invalid(&'static str),
}

/// Grand enumeration of all possible error reasons.
#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    /// Unknown reason - should never happen.
    None,

    Syntax(Syntax),

    /// A bare name was neither a local variable nor a method.
    Name(Key),

    /// A constant lookup failed.
    UninitializedConstant(Key),

    /// A class variable was read before being assigned.
    UninitializedClassVariable(Key),

    /// Method lookup failed on a receiver of the given class.
    NoMethod { name: Key, class: Key },

    Type(TypeMismatch),

    Argument(Argument),

    /// An array write before the start of the array.
    Index(i64),

    ZeroDivision,

    /// Integer arithmetic left the fixed-width range.
    Overflow,

    /// Converting a non-finite float to an integer.
    FloatDomain(f64),

    /// A required file could not be resolved.
    Load(String),

    /// Language features that parse but do not evaluate.
    NotImplemented(&'static str),

    /// Error received from a host-supplied function.
    External(String),
}

impl From<Syntax> for Reason {
    fn from(value: Syntax) -> Self {
        Self::Syntax(value)
    }
}

impl From<TypeMismatch> for Reason {
    fn from(value: TypeMismatch) -> Self {
        Self::Type(value)
    }
}

impl From<Argument> for Reason {
    fn from(value: Argument) -> Self {
        Self::Argument(value)
    }
}

/// The error classes visible to programs and to embedders.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    SyntaxError,
    NameError,
    NoMethodError,
    TypeError,
    ArgumentError,
    IndexError,
    ZeroDivisionError,
    RangeError,
    FloatDomainError,
    LoadError,
    NotImplementedError,
    RuntimeError,
}

impl Reason {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::None | Self::External(_) => ErrorKind::RuntimeError,
            Self::Syntax(_) => ErrorKind::SyntaxError,
            Self::Name(_) | Self::UninitializedConstant(_) | Self::UninitializedClassVariable(_) => {
                ErrorKind::NameError
            }
            Self::NoMethod { .. } => ErrorKind::NoMethodError,
            Self::Type(_) => ErrorKind::TypeError,
            Self::Argument(_) => ErrorKind::ArgumentError,
            Self::Index(_) => ErrorKind::IndexError,
            Self::ZeroDivision => ErrorKind::ZeroDivisionError,
            Self::Overflow => ErrorKind::RangeError,
            Self::FloatDomain(_) => ErrorKind::FloatDomainError,
            Self::Load(_) => ErrorKind::LoadError,
            Self::NotImplemented(_) => ErrorKind::NotImplementedError,
        }
    }
}

/// Enumerates all different 'actions' - things the interpreter might try to do
/// which can cause an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Parsing phase.
    Parse,

    /// Looking up a variable or constant.
    Lookup,

    /// Calling a method.
    Call,

    Assign,

    /// Evaluating a class or module body.
    DefineClass,

    DefineMethod,

    /// Passing control to a block.
    Yield,

    /// Loading another file.
    Require,

    /// Evaluating an expression.
    Evaluate,
}

/// The general error type of the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    /// Stack trace of locations where the error happened, innermost first.
    locations: Vec<(Span, Action)>,

    /// Reason for the error.
    reason: Reason,

    /// Label of the source file the innermost location belongs to.
    file: Option<String>,

    /// Human friendly string representation.
    rendered: Option<String>,
}

impl Error {
    /// Construct a new error with an empty stack.
    pub fn new<T>(reason: T) -> Self
    where
        Reason: From<T>,
    {
        Self {
            locations: vec![],
            reason: Reason::from(reason),
            file: None,
            rendered: None,
        }
    }

    /// Error raised by host code.
    pub fn external(message: impl Into<String>) -> Self {
        Self::new(Reason::External(message.into()))
    }

    /// Append a location to the stack. Takes ownership and returns the same
    /// object, for ease of use with `Result::map_err`.
    pub(crate) fn tag<T>(mut self, loc: T, action: Action) -> Self
    where
        Span: From<T>,
    {
        self.locations.push((Span::from(loc), action));
        self
    }

    /// Record the source label, unless an inner frame already did.
    pub(crate) fn in_file(mut self, file: &str) -> Self {
        if self.file.is_none() {
            self.file = Some(file.to_owned());
        }
        self
    }

    pub fn reason(&self) -> &Reason {
        &self.reason
    }

    pub fn kind(&self) -> ErrorKind {
        self.reason.kind()
    }

    pub fn locations(&self) -> &[(Span, Action)] {
        &self.locations
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// Get the human-friendly text
    pub fn rendered(&self) -> Option<&str> {
        self.rendered.as_deref()
    }

    /// Add a human-friendly string representation.
    pub fn render(mut self, code: Option<&str>) -> Self {
        if self.rendered.is_none() {
            self.rendered = Some(format!("{}", ErrorRenderer(&self, code)));
        }
        self
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.rendered {
            Some(text) => f.write_str(text),
            None => f.write_fmt(format_args!("{}: {}", self.kind(), self.reason)),
        }
    }
}

impl std::error::Error for Error {}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

fn fmt_arg_count(f: &mut std::fmt::Formatter<'_>, given: usize, min: usize, max: Option<usize>) -> std::fmt::Result {
    f.write_fmt(format_args!("wrong number of arguments (given {}, expected ", given))?;
    match max {
        Some(max) if max == min => f.write_fmt(format_args!("{})", min)),
        Some(max) => f.write_fmt(format_args!("{}..{})", min, max)),
        None => f.write_fmt(format_args!("{}+)", min)),
    }
}

impl Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("unknown reason - this should not happen"),

            Self::Syntax(Syntax::UnexpectedEof) => f.write_str("unexpected end of input"),
            Self::Syntax(Syntax::UnexpectedChar(c)) => f.write_fmt(format_args!("unexpected character '{}'", c)),
            Self::Syntax(Syntax::UnterminatedString) => f.write_str("unterminated string meets end of file"),
            Self::Syntax(Syntax::InvalidSymbol) => f.write_str("invalid symbol"),
            Self::Syntax(Syntax::InvalidNumber(x)) => f.write_fmt(format_args!("invalid number '{}'", x)),
            Self::Syntax(Syntax::UnexpectedToken(x)) => f.write_fmt(format_args!("unexpected '{}'", x)),
            Self::Syntax(Syntax::Expected(x)) => f.write_fmt(format_args!("expected {}", x)),
            Self::Syntax(Syntax::InvalidAssignment) => f.write_str("invalid assignment target"),

            Self::Name(key) => f.write_fmt(format_args!("undefined local variable or method '{}'", key)),
            Self::UninitializedConstant(key) => f.write_fmt(format_args!("uninitialized constant {}", key)),
            Self::UninitializedClassVariable(key) => {
                f.write_fmt(format_args!("uninitialized class variable {}", key))
            }
            Self::NoMethod { name, class } => {
                f.write_fmt(format_args!("undefined method '{}' for an instance of {}", name, class))
            }

            Self::Type(TypeMismatch::Coerce { from, to }) => {
                f.write_fmt(format_args!("{} can't be coerced into {}", from, to))
            }
            Self::Type(TypeMismatch::Convert { from, to }) => {
                f.write_fmt(format_args!("no implicit conversion of {} into {}", from, to))
            }
            Self::Type(TypeMismatch::RangeBounds(x)) => f.write_fmt(format_args!("bad value for range: {}", x)),
            Self::Type(TypeMismatch::NotAClass(x)) => f.write_fmt(format_args!("{} is not a class/module", x)),
            Self::Type(TypeMismatch::SuperclassMismatch(x)) => {
                f.write_fmt(format_args!("superclass mismatch for class {}", x))
            }
            Self::Type(TypeMismatch::NoInstanceVariables(x)) => {
                f.write_fmt(format_args!("can't modify instance variables of {}", x))
            }
            Self::Type(TypeMismatch::NotAProc(x)) => {
                f.write_fmt(format_args!("wrong argument type {} (expected Proc)", x))
            }
            Self::Type(TypeMismatch::NoSingleton(x)) => {
                f.write_fmt(format_args!("can't define singleton method for {}", x))
            }

            Self::Argument(Argument::Count { given, min, max }) => fmt_arg_count(f, *given, *min, *max),
            Self::Argument(Argument::NoBlock) => f.write_str("no block given"),
            Self::Argument(Argument::Negative(x)) => f.write_fmt(format_args!("negative argument ({})", x)),
            Self::Argument(Argument::Invalid(x)) => f.write_fmt(format_args!("invalid argument: {}", x)),

            Self::Index(x) => f.write_fmt(format_args!("index {} too small for array", x)),
            Self::ZeroDivision => f.write_str("divided by 0"),
            Self::Overflow => f.write_str("integer overflow"),
            Self::FloatDomain(x) => f.write_str(&crate::object::format_float(*x)),
            Self::Load(x) => f.write_fmt(format_args!("cannot load such file -- {}", x)),
            Self::NotImplemented(x) => f.write_fmt(format_args!("'{}' is not implemented", x)),
            Self::External(x) => f.write_str(x),
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse => f.write_str("parsing"),
            Self::Lookup => f.write_str("looking up"),
            Self::Call => f.write_str("calling"),
            Self::Assign => f.write_str("assigning"),
            Self::DefineClass => f.write_str("defining class"),
            Self::DefineMethod => f.write_str("defining method"),
            Self::Yield => f.write_str("yielding"),
            Self::Require => f.write_str("requiring"),
            Self::Evaluate => f.write_str("evaluating"),
        }
    }
}

/// Utility struct for facilitating error rendering.
///
/// Has access to both the error and the code, so that it can just implement the
/// Display trait.
struct ErrorRenderer<'a>(&'a Error, Option<&'a str>);

impl<'a> Display for ErrorRenderer<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ErrorRenderer(err, code) = self;

        if let Some(file) = &err.file {
            f.write_str(file)?;
            if let Some((loc, _)) = err.locations.first() {
                f.write_fmt(format_args!(":{}:{}", loc.line() + 1, loc.column() + 1))?;
            }
            f.write_str(": ")?;
        }
        f.write_fmt(format_args!("{}: {}", err.kind(), err.reason))?;

        for (loc, act) in err.locations.iter() {
            if let Some(line) = code.and_then(|code| code.lines().nth(loc.line() as usize)) {
                let width = line.chars().count();
                let column = min(loc.column() as usize, width);
                let carets = max(1, min(loc.length(), width.saturating_sub(column)));

                f.write_char('\n')?;
                f.write_str(line)?;
                f.write_char('\n')?;
                for _ in 0..column {
                    f.write_char(' ')?;
                }
                for _ in 0..carets {
                    f.write_char('^')?;
                }
            }
            f.write_fmt(format_args!("\nwhile {} at {}:{}", act, loc.line() + 1, loc.column() + 1))?;
        }

        Ok(())
    }
}
