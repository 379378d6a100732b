//! Walkable frames of a suspended continuation.
//!
//! When a continuation freezes, its x86 frames are copied into a
//! [`ContMirror`]; [`HFrame`]s describe those frames, find their callers and
//! turn them back into native [`Frame`]s when the continuation thaws.

pub mod code;
pub mod cont;
pub mod error;
pub mod hframe;
pub mod oop;
pub mod options;
pub mod utils;

#[cfg(test)]
mod testing;

pub use code::{CodeBlob, CodeCache, Method, MethodId};
pub use cont::ContMirror;
pub use error::WalkError;
pub use hframe::{Frame, HFrame};
pub use oop::Oop;
