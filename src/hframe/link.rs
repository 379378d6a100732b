//! Link slots: where a frame keeps its caller's frame pointer.
//!
//! The value in a link slot depends on the caller. An interpreted caller's fp
//! is a mirror index, so the link holds `caller_fp - link_index`, which moves
//! with the mirror for free. A compiled caller (or the entry frame) has a
//! native `rbp` that the mirror knows nothing about; it is stored verbatim.
use super::{
    kind::{Compiled, FrameKind, Interpreted},
    layout::{index_at, InterpreterFrameSlot},
    HFrame,
};
use crate::{code::CodeBlob, cont::ContMirror};

/// Index of a frame's link slot in a particular mirror generation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LinkAddress {
    index: usize,
    generation: u32,
}

impl LinkAddress {
    pub(crate) const fn new(index: usize, generation: u32) -> Self {
        LinkAddress { index, generation }
    }

    /// Index without checking the generation. Use [`ContMirror::resolve`] to
    /// dereference.
    #[inline]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

macro_rules! fp_relative_slots {
    ($($name: ident => $slot: ident),*) => {
        paste::paste! {
            impl HFrame {
                $(
                    #[doc = concat!("Mirror index stored relative to fp in the `", stringify!($name), "` slot.")]
                    #[inline]
                    pub fn [<interpreter_frame_ $name _index>](&self, mirror: &ContMirror) -> usize {
                        debug_assert!(self.is_interpreted, "{:?} is not interpreted", self);
                        let delta = self.get_real_fp_offset(mirror, InterpreterFrameSlot::$slot.offset());
                        (self.real_fp_index(mirror) as isize + delta) as usize
                    }

                    #[inline]
                    pub fn [<patch_interpreter_frame_ $name>](&self, mirror: &ContMirror, index: usize) {
                        debug_assert!(self.is_interpreted, "{:?} is not interpreted", self);
                        let delta = index as isize - self.real_fp_index(mirror) as isize;
                        self.patch_real_fp_offset(mirror, InterpreterFrameSlot::$slot.offset(), delta);
                    }
                )*
            }
        }
    };
}

fp_relative_slots! {
    sender_sp => SenderSp,
    locals => Locals,
    monitor_block_top => MONITOR_BLOCK_TOP
}

impl HFrame {
    /// Link slot of a `K` frame at `sp`.
    pub fn link_address_for<K: FrameKind>(
        sp: usize,
        fp: isize,
        cb: Option<&'static CodeBlob>,
        mirror: &ContMirror,
    ) -> LinkAddress {
        let index = if K::INTERPRETED {
            debug_assert!(fp > 0 && (fp as usize) < sp, "fp {} outside interpreted frame at sp {}", fp, sp);
            fp as usize
        } else {
            let cb = match cb {
                Some(cb) => cb,
                None => panic!("compiled frame at sp {} has no code blob", sp),
            };
            sp - cb.link_offset()
        };

        LinkAddress::new(index, mirror.generation())
    }

    pub fn set_link_address_typed<K: FrameKind>(&mut self, mirror: &ContMirror) {
        debug_assert!(K::is_instance(self), "{:?} is not {}", self, K::NAME);
        self.link_address = Some(Self::link_address_for::<K>(self.sp, self.fp, self.cb, mirror));
    }

    /// Derives the link address from the frame's other fields. Must be called
    /// again whenever `mirror` has been relocated.
    pub fn set_link_address(&mut self, mirror: &ContMirror) {
        if mirror.is_bottom(self) {
            self.link_address = None;
        } else if self.is_interpreted {
            self.set_link_address_typed::<Interpreted>(mirror);
        } else {
            self.set_link_address_typed::<Compiled>(mirror);
        }
    }

    #[inline]
    pub fn link_address(&self) -> Option<LinkAddress> {
        self.link_address
    }

    /// Current index of the link slot. Panics on the bottom frame; in debug
    /// builds also when the address predates a relocation.
    #[inline]
    pub fn link_index(&self, mirror: &ContMirror) -> usize {
        debug_assert_eq!(self.mirror, mirror.id(), "{:?} belongs to another mirror", self);
        match self.link_address {
            Some(la) => mirror.resolve(la),
            None => panic!("{:?} has no link", self),
        }
    }

    /// Raw content of the link slot.
    #[inline]
    pub fn link(&self, mirror: &ContMirror) -> isize {
        mirror.read_word(self.link_index(mirror))
    }

    #[inline]
    pub fn patch_link(&self, mirror: &ContMirror, value: isize) {
        mirror.write_word(self.link_index(mirror), value);
    }

    /// Links to an interpreted sender whose real fp is at `fp_index`.
    #[inline]
    pub fn patch_link_relative(&self, mirror: &ContMirror, fp_index: usize) {
        let link_index = self.link_index(mirror);
        mirror.write_word(link_index, fp_index as isize - link_index as isize);
    }

    /// Index of the word the native frame pointer points at: fp itself for
    /// interpreted frames, the saved rbp slot for compiled ones.
    #[inline]
    pub fn real_fp_index(&self, mirror: &ContMirror) -> usize {
        if self.is_interpreted {
            self.fp as usize
        } else {
            self.link_index(mirror)
        }
    }

    #[inline]
    pub fn get_real_fp_offset(&self, mirror: &ContMirror, offset: isize) -> isize {
        mirror.read_word(index_at(self.real_fp_index(mirror), offset))
    }

    #[inline]
    pub fn patch_real_fp_offset(&self, mirror: &ContMirror, offset: isize, value: isize) {
        mirror.write_word(index_at(self.real_fp_index(mirror), offset), value);
    }

    /// Records `sender_sp` as this frame's sender sp, relative to fp.
    #[inline]
    pub fn patch_sender_sp_relative(&self, mirror: &ContMirror, sender_sp: usize) {
        self.patch_interpreter_frame_sender_sp(mirror, sender_sp);
    }
}
