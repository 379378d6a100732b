//! Shared fixtures for unit tests.
use std::sync::Arc;

use crate::{
    code::{CodeBlob, CodeCache, Method, MethodId, OopMap},
    cont::{CompiledActivation, InterpretedActivation},
    oop::Oop,
};

pub use crate::cont::{ContMirror, Slot};

pub const ENTRY_FP: isize = 0x7fff_f000;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn oop(n: usize) -> Oop {
    Oop::from_raw(n << 4)
}

fn take(next: &mut usize) -> Oop {
    let o = oop(*next);
    *next += 1;
    o
}

/// A code cache with three methods and two compiled blobs.
///
/// * method 0 `leaf`: 5 locals, 3 stack slots; at bci 0 locals 1 and 3 are
///   live, at bci 4 local 0 and stack slots 0 and 2.
/// * method 1 `caller`: 2 locals, 2 stack slots; at bci 2 both locals and
///   stack slot 1 are live.
/// * method 2 `empty`: no locals, nothing live.
/// * blob 0: frame size 6, offsets 0 and 2 live at pc offset 8, nothing at 24.
/// * blob 1: frame size 4, offset 1 live at pc offset 4; compiled from method 1.
pub struct Fixture {
    pub code: Arc<CodeCache>,
    pub methods: Vec<MethodId>,
    pub blobs: Vec<&'static CodeBlob>,
}

impl Fixture {
    pub fn new() -> Self {
        let code = Arc::new(CodeCache::new());
        let interpreter = code.interpreter();

        let leaf = interpreter.install(
            Method::new("leaf", 5, 3, 8)
                .with_live_slots(0, &[1, 3], &[])
                .with_live_slots(4, &[0], &[0, 2]),
        );
        let caller = interpreter.install(Method::new("caller", 2, 2, 4).with_live_slots(2, &[0, 1], &[1]));
        let empty = interpreter.install(Method::new("empty", 0, 1, 2));

        let a = code.install(
            CodeBlob::compiled("compiled.a", 6, 32)
                .with_oop_map(8, OopMap::new(vec![0, 2]))
                .with_oop_map(24, OopMap::new(vec![])),
        );
        let b = code.install(
            CodeBlob::compiled("compiled.b", 4, 16)
                .with_oop_map(4, OopMap::new(vec![1]))
                .with_method(caller),
        );

        Fixture {
            code,
            methods: vec![leaf, caller, empty],
            blobs: vec![a, b],
        }
    }

    /// Activation of `method` at `bci`. Live slots get fresh references
    /// numbered from `next`; the expression stack is full except at bci 0,
    /// where it is empty.
    pub fn interpreted(&self, method: usize, bci: u32, next: &mut usize) -> InterpretedActivation {
        let id = self.methods[method];
        let m = self.code.interpreter().method(id);
        let live = m.live_slots_at(bci);

        let mut locals = Vec::new();
        for i in 0..m.max_locals() {
            if live.map_or(false, |l| l.locals.at(i)) {
                locals.push(Slot::Oop(take(next)));
            } else {
                locals.push(Slot::Word(1000 + i as isize));
            }
        }

        let depth = if bci == 0 { 0 } else { m.max_stack() };
        let mut expression_stack = Vec::new();
        for i in 0..depth {
            if live.map_or(false, |l| l.stack.at(i)) {
                expression_stack.push(Slot::Oop(take(next)));
            } else {
                expression_stack.push(Slot::Word(2000 + i as isize));
            }
        }

        InterpretedActivation {
            method: id,
            bci,
            locals,
            expression_stack,
            monitors: Vec::new(),
        }
    }

    /// Activation of blob `blob` suspended `pc_offset` bytes into its code.
    pub fn compiled(&self, blob: usize, pc_offset: usize, fp: isize, next: &mut usize) -> CompiledActivation {
        let cb = self.blobs[blob];
        let pc = cb.start() + pc_offset;
        let live = cb.oop_map_for(pc).map_or(&[][..], OopMap::slots);

        let mut slots = Vec::new();
        for offset in 0..cb.link_offset() {
            if live.contains(&offset) {
                slots.push(Slot::Oop(take(next)));
            } else {
                slots.push(Slot::Word(3000 + offset as isize));
            }
        }

        CompiledActivation { pc, fp, slots }
    }
}
