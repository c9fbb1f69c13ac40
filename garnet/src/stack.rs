//! Stack growth for the recursive parser and evaluator.
//!
//! Deeply nested programs recurse once per nesting level in both the parser
//! and the tree walker. Wrapping those recursion points in
//! [`ensure_sufficient_stack`] grows the native stack on demand instead of
//! overflowing it.

/// If less than this much stack remains, grow it.
const RED_ZONE: usize = 100 * 1024;

/// Stack space to allocate when growing.
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, first growing the stack if it is close to running out.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
