//! Python interop module.
//!
//! This module handles all interactions with the embedded CPython interpreter:
//! built-in module registration and the interpreter lifecycle.

pub mod inittab;
pub mod runtime;
