use super::{
    kind::{Compiled, FrameKind, Interpreted, WalkMode},
    layout::{index_at, RETURN_ADDR_OFFSET},
    HFrame,
};
use crate::cont::ContMirror;

/// Result of a [`Full`](super::Full) sender step: the caller and the number of
/// reference stack slots it owns.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Sender {
    pub frame: HFrame,
    pub num_oops: usize,
}

impl HFrame {
    #[inline]
    pub fn return_pc_index<K: FrameKind>(&self, _mirror: &ContMirror) -> usize {
        if K::INTERPRETED {
            index_at(self.fp as usize, RETURN_ADDR_OFFSET)
        } else {
            self.sp - self.compiled_blob().return_address_offset()
        }
    }

    #[inline]
    pub fn return_pc<K: FrameKind>(&self, mirror: &ContMirror) -> usize {
        mirror.read_word(self.return_pc_index::<K>(mirror)) as usize
    }

    /// Index one word past the frame's oldest word; the sender's sp.
    #[inline]
    pub fn frame_bottom_index<K: FrameKind>(&self, mirror: &ContMirror) -> usize {
        if K::INTERPRETED {
            self.interpreter_frame_locals_index(mirror) - 1
        } else {
            self.sp - self.compiled_blob().frame_size()
        }
    }

    /// Computes the caller of this `K` frame, which owns `num_oops` slots of
    /// the reference stack.
    ///
    /// The sender's pc is classified in both modes: it decides whether the
    /// link holds an index delta or a native frame pointer.
    pub fn sender<K: FrameKind, M: WalkMode>(&self, mirror: &ContMirror, num_oops: usize) -> M::Output {
        debug_assert!(K::is_instance(self), "{:?} is not {}", self, K::NAME);
        debug_assert!(!mirror.is_bottom(self), "the bottom frame has no sender");
        debug_assert!(num_oops <= self.ref_sp, "{:?} cannot own {} references", self, num_oops);

        let sender_sp = self.frame_bottom_index::<K>(mirror);
        let sender_ref_sp = self.ref_sp - num_oops;
        let sender_pc = self.return_pc::<K>(mirror);
        debug_assert!(sender_sp < self.sp, "{:?} has sender sp {}", self, sender_sp);

        let sender = if sender_pc == mirror.entry_pc() {
            debug_assert_eq!(sender_sp, 0, "entry frame reached above the bottom of the mirror");
            mirror.bottom_frame()
        } else {
            let code = mirror.code_cache();
            let link_index = self.link_index(mirror);
            let link = mirror.read_word(link_index);

            if code.is_interpreter_pc(sender_pc) {
                let fp = link_index as isize + link;
                let la = Self::link_address_for::<Interpreted>(sender_sp, fp, None, mirror);
                Self::with_link_address(sender_sp, sender_ref_sp, fp, sender_pc, None, true, Some(la), mirror)
            } else {
                let cb = code.find_blob(sender_pc);
                debug_assert!(cb.is_some(), "return pc {:#x} of {:?} is unknown", sender_pc, self);
                let la = Self::link_address_for::<Compiled>(sender_sp, link, cb, mirror);
                Self::with_link_address(sender_sp, sender_ref_sp, link, sender_pc, cb, false, Some(la), mirror)
            }
        };

        log::trace!(
            target: "cont-walk",
            "{} sender of {:?} ({} oops): {:?}",
            M::NAME,
            self,
            num_oops,
            sender
        );

        M::finish(sender, mirror)
    }

    #[inline]
    pub fn sender_generic<M: WalkMode>(&self, mirror: &ContMirror, num_oops: usize) -> M::Output {
        match self.is_interpreted {
            true => self.sender::<Interpreted, M>(mirror, num_oops),
            false => self.sender::<Compiled, M>(mirror, num_oops),
        }
    }

    /// Reference stack slots owned by this frame.
    pub fn num_oops(&self, mirror: &ContMirror) -> usize {
        if mirror.is_bottom(self) {
            0
        } else if self.is_interpreted {
            self.interpreted_frame_num_oops(mirror)
        } else {
            self.compiled_blob().num_oops_at(self.pc)
        }
    }
}
