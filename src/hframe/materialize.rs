use std::fmt;

use super::HFrame;
use crate::{code::CodeBlob, cont::ContMirror, utils::WORD_SIZE};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeoptState {
    NotDeoptimized,
    /// The frame resumes in the deoptimization entry, which needs the pc the
    /// compiled code was suspended at.
    Deoptimized { original_pc: usize },
}

/// A frame placed on a native stack, with absolute addresses.
#[derive(Clone, Copy)]
pub struct Frame {
    pub sp: usize,
    pub fp: usize,
    pub pc: usize,
    pub cb: Option<&'static CodeBlob>,
    pub is_interpreted: bool,
    pub deopt_state: DeoptState,
}

impl Frame {
    pub fn is_deoptimized(&self) -> bool {
        matches!(self.deopt_state, DeoptState::Deoptimized { .. })
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        let same_cb = match (self.cb, other.cb) {
            (Some(a), Some(b)) => std::ptr::eq(a, b),
            (None, None) => true,
            _ => false,
        };

        same_cb
            && self.sp == other.sp
            && self.fp == other.fp
            && self.pc == other.pc
            && self.is_interpreted == other.is_interpreted
            && self.deopt_state == other.deopt_state
    }
}

impl Eq for Frame {}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sp", &format_args!("{:#x}", self.sp))
            .field("fp", &format_args!("{:#x}", self.fp))
            .field("pc", &format_args!("{:#x}", self.pc))
            .field("cb", &self.cb.map(CodeBlob::name))
            .field("is_interpreted", &self.is_interpreted)
            .field("deopt_state", &self.deopt_state)
            .finish()
    }
}

impl HFrame {
    /// Places this frame at `dest_sp` on a native stack. With `deopt`, a
    /// compiled frame resumes in the deoptimization entry instead of its
    /// own code.
    pub fn to_frame(&self, mirror: &ContMirror, dest_sp: usize, deopt: bool) -> Frame {
        debug_assert!(!mirror.is_bottom(self), "the bottom frame is never thawed");

        if self.is_interpreted {
            debug_assert!(!deopt, "interpreted frames are not deoptimized");
            let fp = dest_sp + (self.sp - self.fp as usize) * WORD_SIZE;
            return Frame {
                sp: dest_sp,
                fp,
                pc: self.pc,
                cb: None,
                is_interpreted: true,
                deopt_state: DeoptState::NotDeoptimized,
            };
        }

        let (pc, deopt_state) = if deopt {
            log::debug!(
                target: "cont-thaw",
                "deoptimizing {:?} at pc {:#x}",
                self.cb.map(CodeBlob::name),
                self.pc
            );
            (
                mirror.code_cache().deopt_entry(),
                DeoptState::Deoptimized { original_pc: self.pc },
            )
        } else {
            (self.pc, DeoptState::NotDeoptimized)
        };

        Frame {
            sp: dest_sp,
            fp: self.fp as usize,
            pc,
            cb: self.cb,
            is_interpreted: false,
            deopt_state,
        }
    }

    /// Like [`to_frame`](Self::to_frame), deoptimizing exactly when the
    /// frame's code has been made not entrant.
    pub fn to_frame_for_thaw(&self, mirror: &ContMirror, dest_sp: usize) -> Frame {
        let deopt = !self.is_interpreted && self.compiled_blob().is_not_entrant();
        self.to_frame(mirror, dest_sp, deopt)
    }
}
