//! Whole-mirror walks built on the sender step.
use std::{iter::FusedIterator, ops::Range};

use super::{
    kind::{Compiled, Fast, FrameKind, Full, Interpreted},
    layout::{InterpreterFrameSlot, INTERPRETER_FRAME_HEADER_WORDS, MONITOR_SIZE_IN_WORDS},
    HFrame,
};
use crate::{cont::ContMirror, error::WalkError, oop::Oop, options::options};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct WalkedFrame {
    pub frame: HFrame,
    pub num_oops: usize,
}

impl WalkedFrame {
    /// Reference stack indices owned by the frame, oldest first.
    pub fn ref_slots(&self) -> Range<usize> {
        self.frame.ref_sp() + 1 - self.num_oops..self.frame.ref_sp() + 1
    }

    pub fn oops(&self, mirror: &ContMirror) -> Vec<Oop> {
        self.ref_slots().map(|index| mirror.read_ref(index)).collect()
    }
}

/// Iterates a mirror's frames from the top, excluding the bottom frame.
pub struct FrameWalk<'m> {
    mirror: &'m ContMirror,
    next: Option<WalkedFrame>,
}

impl<'m> FrameWalk<'m> {
    fn new(mirror: &'m ContMirror) -> Self {
        let next = if mirror.is_empty() {
            None
        } else {
            let frame = mirror.last_frame();
            Some(WalkedFrame {
                num_oops: frame.num_oops(mirror),
                frame,
            })
        };

        FrameWalk { mirror, next }
    }
}

impl Iterator for FrameWalk<'_> {
    type Item = WalkedFrame;

    fn next(&mut self) -> Option<WalkedFrame> {
        let current = self.next?;
        let sender = current.frame.sender_generic::<Full>(self.mirror, current.num_oops);

        self.next = if sender.frame.is_bottom(self.mirror) {
            None
        } else {
            Some(WalkedFrame {
                frame: sender.frame,
                num_oops: sender.num_oops,
            })
        };

        Some(current)
    }
}

impl FusedIterator for FrameWalk<'_> {}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct WalkSummary {
    pub frames: usize,
    pub interpreted: usize,
    pub compiled: usize,
    pub refs: usize,
    pub stack_words: usize,
}

impl ContMirror {
    pub fn frames(&self) -> FrameWalk<'_> {
        FrameWalk::new(self)
    }

    pub fn frame_count(&self) -> usize {
        self.frame_sizes().len()
    }

    /// Raw stack words of each frame, top first.
    pub fn frame_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::new();
        let mut hf = self.last_frame();

        while !hf.is_bottom(self) {
            // ref_sp of frames found this way is meaningless
            let sender = hf.sender_generic::<Fast>(self, 0);
            sizes.push(hf.sp() - sender.sp());
            hf = sender;
        }

        sizes
    }

    pub fn used_stack_words(&self) -> usize {
        self.frame_sizes().iter().sum()
    }

    /// Walks the mirror checking every step instead of trusting it.
    pub fn verify(&self) -> Result<WalkSummary, WalkError> {
        self.verify_with_depth(options().max_walk_depth)
    }

    /// [`verify`](Self::verify), giving up after `max_depth` frames.
    pub fn verify_with_depth(&self, max_depth: usize) -> Result<WalkSummary, WalkError> {
        let mut summary = WalkSummary::default();
        let top = self.last_frame();
        let mut hf = top;

        while !hf.is_bottom(self) {
            if summary.frames == max_depth {
                return Err(WalkError::TooDeep(summary.frames));
            }

            let (num_oops, sender_sp, sender_pc) = match hf.is_interpreted() {
                true => self.check_frame::<Interpreted>(&hf)?,
                false => self.check_frame::<Compiled>(&hf)?,
            };

            let is_entry = sender_pc == self.entry_pc();
            if is_entry != (sender_sp == 0) {
                return Err(WalkError::MissedBottom {
                    sp: sender_sp,
                    ref_sp: hf.ref_sp() - num_oops,
                });
            }
            if !is_entry {
                self.check_sender(&hf, sender_sp, sender_pc)?;
            }

            summary.frames += 1;
            summary.refs += num_oops;
            summary.stack_words += hf.sp() - sender_sp;
            if hf.is_interpreted() {
                summary.interpreted += 1;
            } else {
                summary.compiled += 1;
            }

            hf = hf.sender_generic::<Fast>(self, num_oops);
        }

        if summary.refs != top.ref_sp() {
            return Err(WalkError::RefAccountingMismatch {
                walked: summary.refs,
                recorded: top.ref_sp(),
            });
        }

        log::trace!(target: "cont-walk", "verified {:?}", summary);
        Ok(summary)
    }

    /// Checks the words a sender step of `hf` reads, returning its reference
    /// count, its sender's sp and its return pc.
    fn check_frame<K: FrameKind>(&self, hf: &HFrame) -> Result<(usize, usize, usize), WalkError> {
        let sp = hf.sp();
        if sp > self.stack_length() {
            return Err(WalkError::OutOfBounds {
                sp,
                length: self.stack_length(),
            });
        }

        let (num_oops, sender_sp) = if K::INTERPRETED {
            let fp = hf.fp();
            if fp < 2 || fp as usize + INTERPRETER_FRAME_HEADER_WORDS > sp {
                return Err(WalkError::BadFramePointer { sp, fp });
            }

            let end = hf.interpreter_frame_monitor_end(self);
            let begin = hf.interpreter_frame_monitor_begin(self);
            let locals = hf.interpreter_frame_locals_index(self);
            if end < begin || end > sp || (end - begin) % MONITOR_SIZE_IN_WORDS != 0 {
                return Err(WalkError::BadFramePointer { sp, fp });
            }
            if locals == 0 || locals > fp as usize {
                return Err(WalkError::BadFramePointer { sp, fp });
            }

            let method = match hf.try_interpreted_method(self) {
                Some(method) => method,
                None => {
                    return Err(WalkError::BadMethod {
                        sp,
                        method: hf.interpreter_frame_metadata_at(self, InterpreterFrameSlot::Method),
                    })
                }
            };
            let bcp = hf.interpreter_frame_bcp(self);
            if !method.contains_bcp(bcp) {
                return Err(WalkError::BadBcp { sp, bcp });
            }

            (hf.num_oops_of(method, self), locals - 1)
        } else {
            let frame_size = hf.compiled_blob().frame_size();
            match sp.checked_sub(frame_size) {
                Some(sender_sp) => (hf.num_oops(self), sender_sp),
                None => return Err(WalkError::NonMonotonic { sp, sender_sp: 0 }),
            }
        };

        if num_oops > hf.ref_sp() {
            return Err(WalkError::RefUnderflow {
                sp,
                ref_sp: hf.ref_sp(),
                num_oops,
            });
        }

        Ok((num_oops, sender_sp, hf.return_pc::<K>(self)))
    }

    /// Checks that the sender of `hf`, found at `sender_sp` with `sender_pc`,
    /// can be decoded: a known pc, and a link the sender's kind can use.
    fn check_sender(&self, hf: &HFrame, sender_sp: usize, sender_pc: usize) -> Result<(), WalkError> {
        let code = self.code_cache();
        if code.is_interpreter_pc(sender_pc) {
            let fp = hf.link_index(self) as isize + hf.link(self);
            if fp < 2 || fp as usize + INTERPRETER_FRAME_HEADER_WORDS > sender_sp {
                return Err(WalkError::BadFramePointer { sp: sender_sp, fp });
            }
            return Ok(());
        }

        match code.find_blob(sender_pc) {
            Some(cb) if cb.frame_size() > sender_sp => Err(WalkError::NonMonotonic {
                sp: sender_sp,
                sender_sp: 0,
            }),
            Some(_) => Ok(()),
            None => Err(WalkError::UnknownPc {
                sp: sender_sp,
                pc: sender_pc,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::{
        code::CodeCache,
        cont::{CompiledActivation, Slot},
        testing::*,
    };

    /// One frame of a generated mirror.
    #[derive(Clone, Debug)]
    enum Shape {
        Interpreted { method: usize, bci: u32, monitors: usize },
        Compiled { blob: usize, pc_offset: usize },
    }

    fn shape() -> impl Strategy<Value = Shape> {
        prop_oneof![
            (0usize..3, 0usize..3).prop_map(|(method, monitors)| {
                let bci = [0, 2, 0][method];
                let bci = if method == 0 && monitors % 2 == 1 { 4 } else { bci };
                Shape::Interpreted { method, bci, monitors }
            }),
            (0usize..2, 0usize..2).prop_map(|(blob, pick)| {
                let pc_offset = [[8, 24], [4, 12]][blob][pick];
                Shape::Compiled { blob, pc_offset }
            }),
        ]
    }

    fn build(fx: &Fixture, shapes: &[Shape]) -> (ContMirror, Vec<Oop>) {
        let mut mirror = ContMirror::with_capacity(fx.code.clone(), ENTRY_FP, 8, 2);
        let mut next = 1;
        let mut fp = 0x7fff_0000;

        for shape in shapes {
            match *shape {
                Shape::Interpreted { method, bci, monitors } => {
                    let mut act = fx.interpreted(method, bci, &mut next);
                    for _ in 0..monitors {
                        act.monitors.push(crate::cont::Monitor {
                            lock: 1,
                            obj: oop(next),
                        });
                        next += 1;
                    }
                    mirror.push_interpreted(act);
                }
                Shape::Compiled { blob, pc_offset } => {
                    fp -= 0x100;
                    mirror.push_compiled(fx.compiled(blob, pc_offset, fp, &mut next));
                }
            }
        }

        let oops = (1..next).map(oop).collect();
        (mirror, oops)
    }

    proptest! {
        #[test]
        fn test_walk_terminates_and_accounts_refs(shapes in prop::collection::vec(shape(), 0..24)) {
            let fx = Fixture::new();
            let (mirror, oops) = build(&fx, &shapes);

            let frames: Vec<_> = mirror.frames().collect();
            prop_assert_eq!(frames.len(), shapes.len());
            prop_assert_eq!(mirror.frame_count(), shapes.len());
            prop_assert_eq!(mirror.used_stack_words(), mirror.last_frame().sp());

            let refs: usize = frames.iter().map(|f| f.num_oops).sum();
            prop_assert_eq!(refs, mirror.last_frame().ref_sp());
            prop_assert_eq!(refs, mirror.total_refs());

            for (frame, shape) in frames.iter().zip(shapes.iter().rev()) {
                prop_assert_eq!(frame.frame.is_interpreted(), matches!(shape, Shape::Interpreted { .. }));
            }

            // each frame's references, oldest frame first, are the pushed ones in order
            let walked: Vec<Oop> = frames.iter().rev().flat_map(|f| f.oops(&mirror)).collect();
            prop_assert_eq!(walked, oops);

            let summary = mirror.verify().unwrap();
            prop_assert_eq!(summary.frames, shapes.len());
            prop_assert_eq!(summary.refs, refs);
            prop_assert_eq!(summary.interpreted + summary.compiled, summary.frames);
        }

        #[test]
        fn test_walk_survives_relocation(shapes in prop::collection::vec(shape(), 1..16), extra in 0usize..64) {
            let fx = Fixture::new();
            let (mut mirror, _) = build(&fx, &shapes);

            let snapshot = |mirror: &ContMirror| -> Vec<(usize, usize, isize, usize, usize, Vec<Oop>)> {
                mirror
                    .frames()
                    .map(|f| (f.frame.sp(), f.frame.ref_sp(), f.frame.fp(), f.frame.pc(), f.num_oops, f.oops(mirror)))
                    .collect()
            };

            let before = snapshot(&mirror);
            let generation = mirror.generation();
            let (stack, refs) = (mirror.stack_length() + extra, mirror.ref_stack_length() + extra);
            mirror.relocate(stack, refs);

            prop_assert_eq!(mirror.generation(), generation + 1);
            prop_assert_eq!(snapshot(&mirror), before);
        }
    }

    #[test]
    fn test_empty_mirror() {
        let mirror = ContMirror::with_capacity(Arc::new(CodeCache::new()), ENTRY_FP, 8, 2);
        assert_eq!(mirror.frames().count(), 0);
        assert_eq!(mirror.frame_count(), 0);
        assert_eq!(mirror.verify(), Ok(WalkSummary::default()));
    }

    #[test]
    fn test_summary() {
        let fx = Fixture::new();
        let mut mirror = ContMirror::with_capacity(fx.code.clone(), ENTRY_FP, 128, 16);
        let mut next = 1;
        mirror.push_compiled(fx.compiled(0, 8, 0x7000, &mut next));
        mirror.push_interpreted(fx.interpreted(1, 2, &mut next));
        mirror.push_interpreted(fx.interpreted(0, 0, &mut next));

        let summary = mirror.verify().unwrap();
        assert_eq!(
            summary,
            WalkSummary {
                frames: 3,
                interpreted: 2,
                compiled: 1,
                refs: 2 + 3 + 2,
                stack_words: 6 + 15 + 16,
            }
        );
    }

    #[test]
    fn test_verify_reports_ref_mismatch() {
        let fx = Fixture::new();
        let mut mirror = ContMirror::with_capacity(fx.code.clone(), ENTRY_FP, 64, 16);
        let hf = mirror.push_interpreted(fx.interpreted(0, 0, &mut 1));

        let skewed = HFrame::new(hf.sp(), hf.ref_sp() + 1, hf.fp(), hf.pc(), &mirror);
        mirror.set_last_frame(&skewed);
        assert_eq!(
            mirror.verify(),
            Err(WalkError::RefAccountingMismatch { walked: 2, recorded: 3 })
        );
    }

    #[test]
    fn test_verify_reports_ref_underflow() {
        let fx = Fixture::new();
        let mut mirror = ContMirror::with_capacity(fx.code.clone(), ENTRY_FP, 64, 16);
        let hf = mirror.push_interpreted(fx.interpreted(0, 0, &mut 1));

        let skewed = HFrame::new(hf.sp(), 1, hf.fp(), hf.pc(), &mirror);
        mirror.set_last_frame(&skewed);
        assert_eq!(
            mirror.verify(),
            Err(WalkError::RefUnderflow {
                sp: 16,
                ref_sp: 1,
                num_oops: 2
            })
        );
    }

    #[test]
    fn test_verify_reports_unknown_pc() {
        let fx = Fixture::new();
        let mut mirror = ContMirror::with_capacity(fx.code.clone(), ENTRY_FP, 64, 16);
        mirror.push_interpreted(fx.interpreted(2, 0, &mut 1));
        let hf = mirror.push_interpreted(fx.interpreted(2, 0, &mut 1));

        mirror.write_word(hf.return_pc_index::<Interpreted>(&mirror), 0x40);
        assert_eq!(mirror.verify(), Err(WalkError::UnknownPc { sp: 11, pc: 0x40 }));
    }

    #[test]
    fn test_verify_reports_corrupt_locals() {
        let fx = Fixture::new();
        let mut mirror = ContMirror::with_capacity(fx.code.clone(), ENTRY_FP, 64, 16);
        mirror.push_interpreted(fx.interpreted(2, 0, &mut 1));
        let hf = mirror.push_interpreted(fx.interpreted(2, 0, &mut 1));

        // locals claimed to start above the frame's own sp
        hf.patch_interpreter_frame_locals(&mirror, hf.sp() + 1);
        assert!(matches!(mirror.verify(), Err(WalkError::BadFramePointer { sp: 22, .. })));

        // sender sp would be 0 while the return pc is not the entry
        hf.patch_interpreter_frame_locals(&mirror, 1);
        assert_eq!(mirror.verify(), Err(WalkError::MissedBottom { sp: 0, ref_sp: 0 }));
    }

    /// Two `empty` frames: the bottom one at sp 11, the top one at sp 22.
    fn two_empty_frames(fx: &Fixture) -> (ContMirror, HFrame) {
        let mut mirror = ContMirror::with_capacity(fx.code.clone(), ENTRY_FP, 64, 16);
        mirror.push_interpreted(fx.interpreted(2, 0, &mut 1));
        let hf = mirror.push_interpreted(fx.interpreted(2, 0, &mut 1));
        (mirror, hf)
    }

    #[test]
    fn test_verify_reports_uninstalled_method() {
        let fx = Fixture::new();
        let (mirror, hf) = two_empty_frames(&fx);

        hf.patch_real_fp_offset(&mirror, InterpreterFrameSlot::Method.offset(), 999);
        assert_eq!(mirror.verify(), Err(WalkError::BadMethod { sp: 22, method: 999 }));
    }

    #[test]
    fn test_verify_reports_bcp_outside_method() {
        let fx = Fixture::new();
        let (mirror, hf) = two_empty_frames(&fx);

        hf.patch_real_fp_offset(&mirror, InterpreterFrameSlot::Bcp.offset(), 0x10);
        assert_eq!(mirror.verify(), Err(WalkError::BadBcp { sp: 22, bcp: 0x10 }));
    }

    #[test]
    fn test_verify_reports_corrupt_link() {
        let fx = Fixture::new();
        let (mirror, hf) = two_empty_frames(&fx);

        // the caller's fp would land above the caller's own sp
        hf.patch_link(&mirror, 40);
        assert_eq!(mirror.verify(), Err(WalkError::BadFramePointer { sp: 11, fp: 53 }));

        hf.patch_link_relative(&mirror, 2);
        assert!(mirror.verify().is_ok());
    }

    #[test]
    fn test_verify_reports_partial_monitor() {
        let fx = Fixture::new();
        let mut mirror = ContMirror::with_capacity(fx.code.clone(), ENTRY_FP, 64, 16);
        let hf = mirror.push_interpreted(fx.interpreted(0, 4, &mut 1));

        // a monitor block of one word, still below sp
        let begin = hf.interpreter_frame_monitor_begin(&mirror);
        hf.patch_interpreter_frame_monitor_block_top(&mirror, begin + 1);
        assert_eq!(mirror.verify(), Err(WalkError::BadFramePointer { sp: 19, fp: 7 }));
    }

    #[test]
    fn test_verify_reports_too_deep() {
        let fx = Fixture::new();
        let (mirror, _) = two_empty_frames(&fx);

        assert_eq!(mirror.verify_with_depth(1), Err(WalkError::TooDeep(1)));
        assert_eq!(mirror.verify_with_depth(2).map(|s| s.frames), Ok(2));
    }

    #[test]
    fn test_verify_reports_out_of_bounds() {
        let fx = Fixture::new();
        let mut mirror = ContMirror::with_capacity(fx.code.clone(), ENTRY_FP, 64, 16);
        let hf = mirror.push_interpreted(fx.interpreted(2, 0, &mut 1));

        let beyond = HFrame::new(hf.sp() + 100, hf.ref_sp(), hf.fp(), hf.pc(), &mirror);
        mirror.set_last_frame(&beyond);
        assert_eq!(mirror.verify(), Err(WalkError::OutOfBounds { sp: 111, length: 64 }));
    }

    #[test]
    fn test_verify_reports_compiled_frame_below_bottom() {
        let fx = Fixture::new();
        let mut mirror = ContMirror::with_capacity(fx.code.clone(), ENTRY_FP, 64, 16);

        // frame size 6 at sp 4
        let hf = HFrame::new(4, 0, 0x7000, fx.blobs[0].start() + 8, &mirror);
        mirror.set_last_frame(&hf);
        assert_eq!(mirror.verify(), Err(WalkError::NonMonotonic { sp: 4, sender_sp: 0 }));
    }

    #[test]
    fn test_verify_reports_compiled_sender_below_bottom() {
        let fx = Fixture::new();
        let mut mirror = ContMirror::with_capacity(fx.code.clone(), ENTRY_FP, 64, 16);
        mirror.push_compiled(CompiledActivation {
            pc: fx.code.deopt_entry(),
            fp: 0x7000,
            slots: Vec::new(),
        });
        let hf = mirror.push_interpreted(fx.interpreted(2, 0, &mut 1));

        // the caller at sp 2 claims a frame of 6 words
        mirror.write_word(hf.return_pc_index::<Interpreted>(&mirror), (fx.blobs[0].start() + 8) as isize);
        assert_eq!(mirror.verify(), Err(WalkError::NonMonotonic { sp: 2, sender_sp: 0 }));
    }

    #[test]
    fn test_independent_mirrors_on_threads() {
        let fx = Fixture::new();

        std::thread::scope(|s| {
            for t in 0..4 {
                let fx = &fx;
                s.spawn(move || {
                    let mut mirror = ContMirror::with_capacity(fx.code.clone(), ENTRY_FP, 16, 4);
                    let mut next = 1;
                    for i in 0..32 {
                        if (i + t) % 3 == 0 {
                            mirror.push_compiled(fx.compiled(1, 4, 0x7000 - i as isize * 64, &mut next));
                        } else {
                            mirror.push_interpreted(fx.interpreted(1, 2, &mut next));
                        }
                    }

                    let summary = mirror.verify().unwrap();
                    assert_eq!(summary.frames, 32);
                    assert_eq!(summary.refs, next - 1);

                    while let Some(walked) = mirror.pop_frame() {
                        assert_eq!(walked.oops(&mirror).len(), walked.num_oops);
                    }
                    assert!(mirror.is_empty());
                });
            }
        });
    }

    #[test]
    fn test_slot_values_preserved_by_walk() {
        let fx = Fixture::new();
        let mut mirror = ContMirror::with_capacity(fx.code.clone(), ENTRY_FP, 64, 16);
        let mut act = fx.interpreted(1, 2, &mut 1);
        act.expression_stack[0] = Slot::Word(-5);
        let hf = mirror.push_interpreted(act);

        let walked = mirror.frames().next().unwrap();
        assert_eq!(walked.frame, hf);
        assert_eq!(mirror.read_word(hf.interpreter_frame_expression_stack_at(&mirror, 0)), -5);
        assert_eq!(walked.oops(&mirror), vec![oop(1), oop(2), oop(3)]);
    }
}
