//! Recording frames into a mirror, one callee at a time, and removing them
//! again from the top.
use super::ContMirror;
use crate::{
    code::{CodeBlob, MethodId},
    hframe::{
        layout::{InterpreterFrameSlot, INTERPRETER_FRAME_HEADER_WORDS, MONITOR_SIZE_IN_WORDS},
        Compiled, Fast, HFrame, Interpreted, WalkedFrame,
    },
    oop::Oop,
    options::options,
    utils::fast_bitvec::FastBitVector,
};

/// Content of one frame slot before it is recorded.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Slot {
    Word(isize),
    Oop(Oop),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Monitor {
    /// Displaced header.
    pub lock: isize,
    pub obj: Oop,
}

/// State of an interpreted activation to record.
#[derive(Clone, Debug)]
pub struct InterpretedActivation {
    pub method: MethodId,
    pub bci: u32,
    /// Exactly `max_locals` slots.
    pub locals: Vec<Slot>,
    /// Oldest first.
    pub expression_stack: Vec<Slot>,
    pub monitors: Vec<Monitor>,
}

/// State of a compiled activation to record.
#[derive(Clone, Debug)]
pub struct CompiledActivation {
    pub pc: usize,
    /// Native frame pointer of the activation.
    pub fp: isize,
    /// Spill slots at word offsets `0..frame_size - 2` from sp.
    pub slots: Vec<Slot>,
}

/// Raw value of `slot`. References in live slots are appended to `refs`;
/// references in dead slots are dropped.
fn record_slot(slot: Slot, live: bool, refs: &mut Vec<Oop>) -> isize {
    match (slot, live) {
        (Slot::Oop(oop), true) => {
            refs.push(oop);
            0
        }
        (Slot::Oop(_), false) => 0,
        (Slot::Word(word), false) => word,
        (Slot::Word(word), true) => panic!("live reference slot holds the word {:#x}", word),
    }
}

impl ContMirror {
    fn push_refs(&self, base: usize, refs: &[Oop]) {
        for (i, &oop) in refs.iter().enumerate() {
            self.write_ref(base + 1 + i, oop);
        }
    }

    /// Writes the link of the new top frame `hf` whose caller is `caller`.
    fn link_to_caller(&self, hf: &HFrame, caller: &HFrame) {
        if caller.is_interpreted() {
            hf.patch_link_relative(self, caller.fp() as usize);
        } else {
            hf.patch_link(self, caller.fp());
        }
    }

    fn after_push(&mut self, hf: &HFrame) {
        self.set_last_frame(hf);
        log::trace!(target: "cont-freeze", "pushed {}", hf.display(self));

        if options().verify {
            if let Err(e) = self.verify() {
                log::warn!(target: "cont-freeze", "{:?} is inconsistent after push: {}", self.id(), e);
            }
        }
    }

    /// Records an interpreted activation as the new top frame.
    pub fn push_interpreted(&mut self, act: InterpretedActivation) -> HFrame {
        let interpreter = self.code_cache().interpreter();
        let method = interpreter.method(act.method);
        let pc = interpreter.return_entry();

        assert_eq!(act.locals.len(), method.max_locals(), "locals of {}", method.name());
        assert!(act.expression_stack.len() <= method.max_stack(), "stack of {}", method.name());

        let empty = FastBitVector::new();
        let (live_locals, live_stack) = match method.live_slots_at(act.bci) {
            Some(live) => (&live.locals, &live.stack),
            None => (&empty, &empty),
        };

        let mut refs = Vec::new();
        let locals: Vec<isize> = act
            .locals
            .iter()
            .enumerate()
            .map(|(i, &slot)| record_slot(slot, live_locals.at(i), &mut refs))
            .collect();
        let stack: Vec<isize> = act
            .expression_stack
            .iter()
            .enumerate()
            .map(|(i, &slot)| record_slot(slot, live_stack.at(i), &mut refs))
            .collect();
        refs.extend(act.monitors.iter().map(|m| m.obj));

        let monitor_words = act.monitors.len() * MONITOR_SIZE_IN_WORDS;
        let size = locals.len() + 2 + INTERPRETER_FRAME_HEADER_WORDS + monitor_words + stack.len();
        self.ensure_capacity(self.sp + size, self.ref_sp + refs.len());

        let caller = self.last_frame();
        let sp = caller.sp() + size;
        let ref_sp = caller.ref_sp() + refs.len();
        let fp = caller.sp() + locals.len() + 2;
        let hf = HFrame::new_hframe::<Interpreted>(sp, ref_sp, fp as isize, pc, self);

        self.link_to_caller(&hf, &caller);
        self.write_word(hf.return_pc_index::<Interpreted>(self), caller.pc() as isize);

        hf.patch_sender_sp_relative(self, caller.sp());
        hf.patch_real_fp_offset(self, InterpreterFrameSlot::LastSp.offset(), 0);
        hf.patch_real_fp_offset(self, InterpreterFrameSlot::Method.offset(), act.method.raw() as isize);
        hf.patch_real_fp_offset(self, InterpreterFrameSlot::Holder.offset(), 0);
        hf.patch_real_fp_offset(self, InterpreterFrameSlot::Mdp.offset(), 0);
        hf.patch_real_fp_offset(self, InterpreterFrameSlot::Cache.offset(), 0);
        hf.patch_interpreter_frame_locals(self, caller.sp() + 1);
        hf.patch_real_fp_offset(self, InterpreterFrameSlot::Bcp.offset(), method.bcp_from(act.bci) as isize);
        hf.patch_interpreter_frame_monitor_block_top(self, fp + INTERPRETER_FRAME_HEADER_WORDS + monitor_words);

        for (i, &word) in locals.iter().enumerate() {
            self.write_word(hf.interpreter_frame_local_at(self, i), word);
        }
        for (n, monitor) in act.monitors.iter().enumerate() {
            self.write_word(hf.interpreter_frame_monitor_at(self, n), monitor.lock);
            self.write_word(hf.interpreter_frame_monitor_obj_at(self, n), 0);
        }
        for (i, &word) in stack.iter().enumerate() {
            self.write_word(hf.interpreter_frame_expression_stack_at(self, i), word);
        }
        self.push_refs(caller.ref_sp(), &refs);

        self.after_push(&hf);
        hf
    }

    /// Records a compiled activation as the new top frame.
    pub fn push_compiled(&mut self, act: CompiledActivation) -> HFrame {
        let cb: &'static CodeBlob = match self.code_cache().find_blob(act.pc) {
            Some(cb) => cb,
            None => panic!("pc {:#x} is not compiled code", act.pc),
        };
        assert_eq!(act.slots.len(), cb.link_offset(), "spill slots of {}", cb.name());

        let mut refs = Vec::new();
        let live = cb.oop_map_for(act.pc).map_or(&[][..], |map| map.slots());
        let words: Vec<isize> = act
            .slots
            .iter()
            .enumerate()
            .map(|(offset, &slot)| record_slot(slot, live.binary_search(&offset).is_ok(), &mut refs))
            .collect();

        self.ensure_capacity(self.sp + cb.frame_size(), self.ref_sp + refs.len());

        let caller = self.last_frame();
        let sp = caller.sp() + cb.frame_size();
        let ref_sp = caller.ref_sp() + refs.len();
        let hf = HFrame::new_hframe::<Compiled>(sp, ref_sp, act.fp, act.pc, self);

        self.link_to_caller(&hf, &caller);
        self.write_word(hf.return_pc_index::<Compiled>(self), caller.pc() as isize);
        for (offset, &word) in words.iter().enumerate() {
            self.write_word(sp - offset, word);
        }
        self.push_refs(caller.ref_sp(), &refs);

        self.after_push(&hf);
        hf
    }

    /// Removes the top frame. Its words stay in place until overwritten, so
    /// the returned frame can still be read and materialized.
    pub fn pop_frame(&mut self) -> Option<WalkedFrame> {
        if self.is_empty() {
            return None;
        }

        let frame = self.last_frame();
        let num_oops = frame.num_oops(self);
        let sender = frame.sender_generic::<Fast>(self, num_oops);
        self.set_last_frame(&sender);

        log::trace!(target: "cont-thaw", "popped {:?}, {} oops", frame, num_oops);
        Some(WalkedFrame { frame, num_oops })
    }
}
