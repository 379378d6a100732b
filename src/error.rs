//! Errors reported by the checked walk.
//!
//! The frame walker itself has no error channel: callers are trusted and
//! precondition violations are debug assertions. [`ContMirror::verify`] is the
//! one place where an inconsistent mirror is reported instead of assumed away.
//!
//! [`ContMirror::verify`]: crate::cont::ContMirror::verify
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalkError {
    #[error("pc {pc:#x} of frame at sp {sp} is neither interpreted nor inside a code blob")]
    UnknownPc { sp: usize, pc: usize },

    #[error("frame at sp {sp} has sender sp {sender_sp}, the walk would not move toward the bottom")]
    NonMonotonic { sp: usize, sender_sp: usize },

    #[error("frame at sp {sp} holds {num_oops} references but only {ref_sp} remain below it")]
    RefUnderflow {
        sp: usize,
        ref_sp: usize,
        num_oops: usize,
    },

    #[error("frame at sp {sp} lies outside a stack of {length} words")]
    OutOfBounds { sp: usize, length: usize },

    #[error("interpreted frame at sp {sp} has a malformed header at fp {fp}")]
    BadFramePointer { sp: usize, fp: isize },

    #[error("interpreted frame at sp {sp} names method {method}, which is not installed")]
    BadMethod { sp: usize, method: isize },

    #[error("interpreted frame at sp {sp} has bcp {bcp:#x} outside its method's bytecode")]
    BadBcp { sp: usize, bcp: usize },

    #[error("walk visited {0} frames without reaching the bottom frame")]
    TooDeep(usize),

    #[error("walk ended at sp {sp} ref_sp {ref_sp} instead of the bottom frame")]
    MissedBottom { sp: usize, ref_sp: usize },

    #[error("walk accounted for {walked} references but the mirror records {recorded}")]
    RefAccountingMismatch { walked: usize, recorded: usize },
}
