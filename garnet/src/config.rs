//! Interpreter configuration.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use crate::eval::{ImportResolver, NullResolver};


/// Options for constructing a [`Vm`](crate::Vm).
///
/// ```ignore
/// let output = SharedBuffer::new();
/// let mut vm = Vm::new(Config::new().with_output(output.clone()).with_seed(7));
/// ```
pub struct Config {
    pub(crate) output: Box<dyn Write>,
    pub(crate) resolver: Box<dyn ImportResolver>,
    pub(crate) seed: Option<u64>,
    pub(crate) source_name: String,
}

impl Config {
    pub fn new() -> Config {
        Config {
            output: Box::new(std::io::stdout()),
            resolver: Box::new(NullResolver {}),
            seed: None,
            source_name: "main".to_owned(),
        }
    }

    /// Where `puts`, `print` and `p` write to.
    pub fn with_output(mut self, output: impl Write + 'static) -> Config {
        self.output = Box::new(output);
        self
    }

    /// How `require` finds source code.
    pub fn with_resolver(mut self, resolver: impl ImportResolver + 'static) -> Config {
        self.resolver = Box::new(resolver);
        self
    }

    /// Seed for `rand`. Without one, the generator is seeded from entropy.
    pub fn with_seed(mut self, seed: u64) -> Config {
        self.seed = Some(seed);
        self
    }

    /// Label used for the main program in diagnostics.
    pub fn with_source_name(mut self, name: impl Into<String>) -> Config {
        self.source_name = name.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}


/// In-memory writer whose clones share one buffer, for capturing program
/// output.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> SharedBuffer {
        SharedBuffer::default()
    }

    /// Everything written so far, decoded lossily.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
