//! Accessors for frames known to be interpreted.
//!
//! Everything here reads the fixed header between fp and the monitor block;
//! calling them on a compiled frame is a bug and asserts in debug builds.
use super::{
    kind::{FrameKind, Interpreted},
    layout::{index_at, InterpreterFrameSlot, MONITOR_SIZE_IN_WORDS},
    HFrame,
};
use crate::{
    code::{Method, MethodId},
    cont::ContMirror,
    utils::fast_bitvec::FastBitVector,
};

/// Reference slots of an interpreted frame at its current bci.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct InterpreterOopMap {
    pub bci: u32,
    pub locals: FastBitVector,
    pub expression_stack: FastBitVector,
    pub num_monitors: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OopSlot {
    Local(usize),
    ExpressionStack(usize),
    Monitor(usize),
}

impl InterpreterOopMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_oops(&self) -> usize {
        self.locals.bit_count() + self.expression_stack.bit_count() + self.num_monitors
    }

    /// Visits reference slots in reference stack order: locals, then the
    /// expression stack, then monitor objects.
    pub fn for_each_oop_slot(&self, mut f: impl FnMut(OopSlot)) {
        self.locals.for_each_set_bit(|i| f(OopSlot::Local(i)));
        self.expression_stack.for_each_set_bit(|i| f(OopSlot::ExpressionStack(i)));
        (0..self.num_monitors).for_each(|i| f(OopSlot::Monitor(i)));
    }
}

impl HFrame {
    #[inline]
    fn assert_interpreted(&self) {
        debug_assert!(Interpreted::is_instance(self), "{:?} is not interpreted", self);
    }

    #[inline]
    pub fn interpreter_frame_metadata_at(&self, mirror: &ContMirror, slot: InterpreterFrameSlot) -> isize {
        self.assert_interpreted();
        self.get_real_fp_offset(mirror, slot.offset())
    }

    pub fn interpreted_method(&self, mirror: &ContMirror) -> &'static Method {
        let id = self.interpreter_frame_metadata_at(mirror, InterpreterFrameSlot::Method);
        mirror.code_cache().interpreter().method(MethodId::from_raw(id as u32))
    }

    /// Like [`interpreted_method`](Self::interpreted_method), but `None` when
    /// the method slot does not name an installed method.
    pub fn try_interpreted_method(&self, mirror: &ContMirror) -> Option<&'static Method> {
        let id = self.interpreter_frame_metadata_at(mirror, InterpreterFrameSlot::Method);
        let id = u32::try_from(id).ok()?;
        mirror.code_cache().interpreter().try_method(MethodId::from_raw(id))
    }

    /// The method a `K` frame executes. Compiled frames report the method
    /// their code was compiled from, if any.
    pub fn method<K: FrameKind>(&self, mirror: &ContMirror) -> Option<&'static Method> {
        if K::INTERPRETED {
            Some(self.interpreted_method(mirror))
        } else {
            let id = self.compiled_blob().method()?;
            Some(mirror.code_cache().interpreter().method(id))
        }
    }

    #[inline]
    pub fn interpreter_frame_bcp(&self, mirror: &ContMirror) -> usize {
        self.interpreter_frame_metadata_at(mirror, InterpreterFrameSlot::Bcp) as usize
    }

    pub fn interpreter_frame_bci(&self, mirror: &ContMirror) -> u32 {
        let bcp = self.interpreter_frame_bcp(mirror);
        self.interpreted_method(mirror).bci_from(bcp)
    }

    /// Index of local `index`. Locals grow toward higher indices.
    #[inline]
    pub fn interpreter_frame_local_at(&self, mirror: &ContMirror, index: usize) -> usize {
        self.interpreter_frame_locals_index(mirror) + index
    }

    /// First word past the header; monitor records follow it.
    #[inline]
    pub fn interpreter_frame_monitor_begin(&self, _mirror: &ContMirror) -> usize {
        self.assert_interpreted();
        index_at(self.fp as usize, InterpreterFrameSlot::MONITOR_BLOCK_BOTTOM.offset())
    }

    #[inline]
    pub fn interpreter_frame_monitor_end(&self, mirror: &ContMirror) -> usize {
        self.interpreter_frame_monitor_block_top_index(mirror)
    }

    pub fn interpreted_frame_num_monitors(&self, mirror: &ContMirror) -> usize {
        let begin = self.interpreter_frame_monitor_begin(mirror);
        let end = self.interpreter_frame_monitor_end(mirror);
        debug_assert!(end >= begin && (end - begin) % MONITOR_SIZE_IN_WORDS == 0);
        (end - begin) / MONITOR_SIZE_IN_WORDS
    }

    /// Index of the displaced header word of monitor `n`.
    #[inline]
    pub fn interpreter_frame_monitor_at(&self, mirror: &ContMirror, n: usize) -> usize {
        debug_assert!(n < self.interpreted_frame_num_monitors(mirror));
        self.interpreter_frame_monitor_begin(mirror) + MONITOR_SIZE_IN_WORDS * (n + 1)
    }

    #[inline]
    pub fn interpreter_frame_monitor_obj_at(&self, mirror: &ContMirror, n: usize) -> usize {
        self.interpreter_frame_monitor_at(mirror, n) - 1
    }

    /// Index of expression stack slot `offset`; slot 0 was pushed first.
    #[inline]
    pub fn interpreter_frame_expression_stack_at(&self, mirror: &ContMirror, offset: usize) -> usize {
        self.interpreter_frame_monitor_end(mirror) + 1 + offset
    }

    pub fn interpreted_frame_expression_stack_size(&self, mirror: &ContMirror) -> usize {
        let end = self.interpreter_frame_monitor_end(mirror);
        debug_assert!(self.sp >= end, "{:?} ends inside its monitor block", self);
        self.sp - end
    }

    /// Index of the youngest word of the frame.
    #[inline]
    pub fn interpreted_frame_top_index(&self, mirror: &ContMirror) -> usize {
        self.interpreter_frame_monitor_end(mirror) + self.interpreted_frame_expression_stack_size(mirror)
    }

    /// Fills `mask` with the frame's reference slots at its current bci.
    pub fn interpreted_frame_oop_map(&self, mirror: &ContMirror, mask: &mut InterpreterOopMap) {
        self.oop_map_of(self.interpreted_method(mirror), mirror, mask);
    }

    /// `interpreted_frame_oop_map` for a frame whose method is already known.
    pub(crate) fn oop_map_of(&self, method: &Method, mirror: &ContMirror, mask: &mut InterpreterOopMap) {
        let bci = method.bci_from(self.interpreter_frame_bcp(mirror));
        let stack_size = self.interpreted_frame_expression_stack_size(mirror);

        mask.bci = bci;
        mask.num_monitors = self.interpreted_frame_num_monitors(mirror);

        match method.live_slots_at(bci) {
            Some(live) => {
                mask.locals.copy_prefix(&live.locals, method.max_locals());
                mask.expression_stack.copy_prefix(&live.stack, stack_size);
            }
            None => {
                mask.locals.resize(method.max_locals());
                mask.locals.clear_all();
                mask.expression_stack.resize(stack_size);
                mask.expression_stack.clear_all();
            }
        }
    }

    pub fn interpreted_frame_num_oops(&self, mirror: &ContMirror) -> usize {
        self.num_oops_of(self.interpreted_method(mirror), mirror)
    }

    pub(crate) fn num_oops_of(&self, method: &Method, mirror: &ContMirror) -> usize {
        let mut mask = InterpreterOopMap::new();
        self.oop_map_of(method, mirror, &mut mask);
        mask.num_oops()
    }
}
