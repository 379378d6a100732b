//! # Mirrored frames
//!
//! An [`HFrame`] describes one activation record that has been copied out of
//! the native stack into a [`ContMirror`]. It is a small `Copy` value: the
//! stack pointer and reference stack pointer as mirror indices, the frame's
//! pc and fp, its code blob and the cached index of its link slot.
//!
//! The link slot is where the caller's frame pointer was saved. Its contents
//! depend on the *caller*: an interpreted caller's fp lives in the mirror, so
//! the link holds the distance from the link slot to it; a compiled caller's
//! fp is an opaque native `rbp` value and is stored as is. The cached
//! [`LinkAddress`] is tied to the mirror's generation and must be re-derived
//! with [`HFrame::set_link_address`] after the mirror is relocated.
use std::fmt;

use crate::{
    code::CodeBlob,
    cont::{ContMirror, MirrorId},
};

pub mod interpreted;
pub mod kind;
pub mod layout;
pub mod link;
pub mod materialize;
pub mod sender;
pub mod walk;

pub use interpreted::{InterpreterOopMap, OopSlot};
pub use kind::{Compiled, Fast, FrameKind, Full, Interpreted, WalkMode};
pub use link::LinkAddress;
pub use materialize::{DeoptState, Frame};
pub use sender::Sender;
pub use walk::{FrameWalk, WalkSummary, WalkedFrame};

#[derive(Clone, Copy)]
pub struct HFrame {
    sp: usize,
    ref_sp: usize,
    pc: usize,
    /// Mirror index of the real fp for interpreted frames, the native `rbp`
    /// value otherwise.
    fp: isize,
    link_address: Option<LinkAddress>,
    cb: Option<&'static CodeBlob>,
    is_interpreted: bool,
    mirror: MirrorId,
}

impl HFrame {
    /// Creates a frame, classifying `pc` as interpreted or compiled.
    pub fn new(sp: usize, ref_sp: usize, fp: isize, pc: usize, mirror: &ContMirror) -> Self {
        let code = mirror.code_cache();
        let is_interpreted = code.is_interpreter_pc(pc);
        let cb = if is_interpreted {
            None
        } else {
            code.find_blob(pc)
        };

        debug_assert!(
            is_interpreted || cb.is_some(),
            "pc {:#x} is neither interpreted nor compiled",
            pc
        );

        Self::with_code(sp, ref_sp, fp, pc, cb, is_interpreted, mirror)
    }

    /// Creates a frame whose kind is already known.
    pub fn with_code(
        sp: usize,
        ref_sp: usize,
        fp: isize,
        pc: usize,
        cb: Option<&'static CodeBlob>,
        is_interpreted: bool,
        mirror: &ContMirror,
    ) -> Self {
        let mut hf = Self::with_link_address(sp, ref_sp, fp, pc, cb, is_interpreted, None, mirror);
        hf.set_link_address(mirror);
        hf
    }

    /// Creates a frame whose link address was determined by the caller, as
    /// when pushing a new callee or building the bottom frame.
    #[allow(clippy::too_many_arguments)]
    pub fn with_link_address(
        sp: usize,
        ref_sp: usize,
        fp: isize,
        pc: usize,
        cb: Option<&'static CodeBlob>,
        is_interpreted: bool,
        link_address: Option<LinkAddress>,
        mirror: &ContMirror,
    ) -> Self {
        debug_assert_eq!(
            cb.is_none(),
            is_interpreted,
            "frame at sp {} pc {:#x}: code blob and kind disagree",
            sp,
            pc
        );

        HFrame {
            sp,
            ref_sp,
            pc,
            fp,
            link_address,
            cb,
            is_interpreted,
            mirror: mirror.id(),
        }
    }

    pub fn new_hframe<K: FrameKind>(sp: usize, ref_sp: usize, fp: isize, pc: usize, mirror: &ContMirror) -> Self {
        let code = mirror.code_cache();
        debug_assert_eq!(K::INTERPRETED, code.is_interpreter_pc(pc), "pc {:#x} is not {}", pc, K::NAME);

        let cb = if K::INTERPRETED { None } else { code.find_blob(pc) };
        let link_address = Self::link_address_for::<K>(sp, fp, cb, mirror);
        Self::with_link_address(sp, ref_sp, fp, pc, cb, K::INTERPRETED, Some(link_address), mirror)
    }

    #[inline]
    pub fn sp(&self) -> usize {
        self.sp
    }

    #[inline]
    pub fn ref_sp(&self) -> usize {
        self.ref_sp
    }

    #[inline]
    pub fn pc(&self) -> usize {
        self.pc
    }

    #[inline]
    pub fn fp(&self) -> isize {
        self.fp
    }

    #[inline]
    pub fn set_fp(&mut self, fp: isize) {
        self.fp = fp;
    }

    #[inline]
    pub fn cb(&self) -> Option<&'static CodeBlob> {
        self.cb
    }

    #[inline]
    pub fn is_interpreted(&self) -> bool {
        self.is_interpreted
    }

    #[inline]
    pub fn mirror_id(&self) -> MirrorId {
        self.mirror
    }

    pub fn is_bottom(&self, mirror: &ContMirror) -> bool {
        mirror.is_bottom(self)
    }

    /// Takes the platform-dependent state (fp and link address) of `other`,
    /// a refreshed descriptor of the same frame.
    pub fn copy_partial(&mut self, other: &HFrame) {
        debug_assert!(self.sp == other.sp && self.pc == other.pc, "{:?} and {:?} are different frames", self, other);
        self.fp = other.fp;
        self.link_address = other.link_address;
    }

    #[inline]
    pub(crate) fn compiled_blob(&self) -> &'static CodeBlob {
        match self.cb {
            Some(cb) => cb,
            None => panic!("{:?} has no code blob", self),
        }
    }

    pub fn display<'a>(&'a self, mirror: &'a ContMirror) -> HFrameDisplay<'a> {
        HFrameDisplay { hf: self, mirror }
    }
}

impl PartialEq for HFrame {
    fn eq(&self, other: &Self) -> bool {
        self.sp == other.sp && self.pc == other.pc && self.mirror == other.mirror
    }
}

impl Eq for HFrame {}

impl fmt::Debug for HFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HFrame({} sp: {} ref_sp: {} fp: {:#x} pc: {:#x}",
            if self.is_interpreted { "interpreted" } else { "compiled" },
            self.sp,
            self.ref_sp,
            self.fp,
            self.pc
        )?;

        if let Some(la) = self.link_address {
            write!(f, " link@{}", la.index())?;
        }

        if let Some(cb) = self.cb {
            write!(f, " {}", cb.name())?;
        }

        write!(f, ")")
    }
}

pub struct HFrameDisplay<'a> {
    hf: &'a HFrame,
    mirror: &'a ContMirror,
}

impl fmt::Display for HFrameDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (hf, mirror) = (self.hf, self.mirror);

        if mirror.is_bottom(hf) {
            return write!(f, "bottom sp: {} ref_sp: {} fp: {:#x} pc: {:#x}", hf.sp, hf.ref_sp, hf.fp, hf.pc);
        }

        write!(
            f,
            "{} sp: {} ref_sp: {} fp: {:#x} pc: {:#x} link@{}: {:#x}",
            if hf.is_interpreted { "interpreted" } else { "compiled" },
            hf.sp,
            hf.ref_sp,
            hf.fp,
            hf.pc,
            hf.link_index(mirror),
            hf.link(mirror)
        )?;

        if hf.is_interpreted {
            let method = hf.interpreted_method(mirror);
            write!(
                f,
                " {} bci: {} monitors: {} stack: {}",
                method.name(),
                method.bci_from(hf.interpreter_frame_bcp(mirror)),
                hf.interpreted_frame_num_monitors(mirror),
                hf.interpreted_frame_expression_stack_size(mirror)
            )
        } else {
            let cb = hf.compiled_blob();
            write!(f, " {}", cb.name())?;
            if cb.is_not_entrant() {
                write!(f, " (not entrant)")?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::*;

    #[test]
    fn test_display() {
        let fx = Fixture::new();
        let mut mirror = ContMirror::with_capacity(fx.code.clone(), ENTRY_FP, 64, 16);
        let mut next = 1;

        let bottom = mirror.last_frame();
        assert_eq!(
            format!("{}", bottom.display(&mirror)),
            format!("bottom sp: 0 ref_sp: 0 fp: 0x7ffff000 pc: {:#x}", mirror.entry_pc())
        );

        let hf = mirror.push_interpreted(fx.interpreted(0, 4, &mut next));
        assert_eq!(
            format!("{}", hf.display(&mirror)),
            format!(
                "interpreted sp: 19 ref_sp: 3 fp: 0x7 pc: {:#x} link@7: 0x7ffff000 leaf bci: 4 monitors: 0 stack: 3",
                hf.pc()
            )
        );

        let hf = mirror.push_compiled(fx.compiled(0, 24, 0x6f00, &mut next));
        let shown = format!("{}", hf.display(&mirror));
        assert!(shown.starts_with("compiled sp: 25 ref_sp: 3 fp: 0x6f00 "), "{}", shown);
        assert!(shown.contains(&format!("link@{}:", hf.link_index(&mirror))), "{}", shown);
        assert!(shown.ends_with(" compiled.a"), "{}", shown);

        fx.blobs[0].make_not_entrant();
        assert!(format!("{}", hf.display(&mirror)).ends_with(" compiled.a (not entrant)"));
    }
}
