//! Stack growth for the recursive parser and evaluator.
//!
//! Nested expressions, blocks and Solar function calls all recurse on the
//! Rust stack.  Wrapping the recursive entry points in
//! [`ensure_sufficient_stack`] keeps a deep (but depth-limited) program from
//! overflowing a small thread stack.

/// Grow the stack by 2 MiB when less than 256 KiB remains, then run `f`.
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(256 * 1024, 2 * 1024 * 1024, f)
}
