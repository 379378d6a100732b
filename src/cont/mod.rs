//! # Continuation mirrors
//!
//! A [`ContMirror`] holds the frames of a suspended continuation: a raw word
//! stack with the frames as they were laid out natively, and a reference
//! stack holding the object references those frames contained, so that the
//! collector never has to tell data words from references.
//!
//! Both stacks are indexed from their bottom (oldest) end. The bottom frame
//! sits at index 0 of both; each frame pushed on top of it has larger
//! indices. A mirror is owned by the one thread freezing or thawing it and is
//! deliberately not `Sync`.
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    code::CodeCache,
    hframe::{HFrame, LinkAddress},
    oop::Oop,
    options::options,
};

mod buffer;
pub mod push;

use buffer::MirrorBuffer;
pub use push::{CompiledActivation, InterpretedActivation, Monitor, Slot};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MirrorId(u64);

impl MirrorId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        MirrorId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

pub struct ContMirror {
    id: MirrorId,
    generation: u32,
    code: Arc<CodeCache>,
    stack: MirrorBuffer,
    ref_stack: MirrorBuffer,
    /// Top frame.
    sp: usize,
    ref_sp: usize,
    fp: isize,
    pc: usize,
    entry_fp: isize,
}

impl ContMirror {
    /// An empty mirror sized from [`options`]. `entry_fp` is the native frame
    /// pointer of the frame that entered the continuation.
    pub fn new(code: Arc<CodeCache>, entry_fp: isize) -> Self {
        let options = options();
        Self::with_capacity(code, entry_fp, options.stack_words, options.ref_words)
    }

    pub fn with_capacity(code: Arc<CodeCache>, entry_fp: isize, stack_words: usize, ref_words: usize) -> Self {
        let pc = code.continuation_entry_pc();
        ContMirror {
            id: MirrorId::next(),
            generation: 0,
            code,
            stack: MirrorBuffer::new(stack_words),
            ref_stack: MirrorBuffer::new(ref_words),
            sp: 0,
            ref_sp: 0,
            fp: entry_fp,
            pc,
            entry_fp,
        }
    }

    #[inline]
    pub fn id(&self) -> MirrorId {
        self.id
    }

    /// Bumped by every relocation.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    pub fn code_cache(&self) -> &CodeCache {
        &self.code
    }

    pub fn stack_length(&self) -> usize {
        self.stack.len()
    }

    pub fn ref_stack_length(&self) -> usize {
        self.ref_stack.len()
    }

    pub fn stack_base_address(&self) -> usize {
        self.stack.base_address()
    }

    pub fn reference_stack_base_address(&self) -> usize {
        self.ref_stack.base_address()
    }

    /// Current address of the raw stack word at `index`.
    pub fn stack_address(&self, index: usize) -> usize {
        self.stack.address(index)
    }

    pub fn stack_index(&self, address: usize) -> Option<usize> {
        self.stack.index_of(address)
    }

    #[inline]
    pub fn read_word(&self, index: usize) -> isize {
        self.stack.read(index)
    }

    #[inline]
    pub fn write_word(&self, index: usize, value: isize) {
        self.stack.write(index, value);
    }

    #[inline]
    pub fn read_ref(&self, index: usize) -> Oop {
        Oop::from_raw(self.ref_stack.read(index) as usize)
    }

    #[inline]
    pub fn write_ref(&self, index: usize, oop: Oop) {
        self.ref_stack.write(index, oop.raw() as isize);
    }

    /// Index named by `la`, which must have been derived since the last
    /// relocation.
    #[inline]
    pub fn resolve(&self, la: LinkAddress) -> usize {
        debug_assert_eq!(
            la.generation(),
            self.generation,
            "stale link address {} from generation {}",
            la.index(),
            la.generation()
        );
        la.index()
    }

    /// Moves both stacks to fresh storage of the given sizes. Every index is
    /// preserved; every [`LinkAddress`] derived before is invalidated.
    pub fn relocate(&mut self, stack_words: usize, ref_words: usize) {
        let stack = self.stack.relocated(stack_words);
        let ref_stack = self.ref_stack.relocated(ref_words);

        log::debug!(
            target: "cont-mirror",
            "relocating {:?}: stack {:#x} -> {:#x} ({} words), refs {:#x} -> {:#x} ({} slots)",
            self.id,
            self.stack.base_address(),
            stack.base_address(),
            stack_words,
            self.ref_stack.base_address(),
            ref_stack.base_address(),
            ref_words
        );

        self.stack = stack;
        self.ref_stack = ref_stack;
        self.generation = self.generation.wrapping_add(1);

        if options().verify {
            if let Err(e) = self.verify() {
                log::warn!(target: "cont-mirror", "{:?} is inconsistent after relocation: {}", self.id, e);
            }
        }
    }

    /// Grows the stacks, doubling at least, to hold `stack_words` words and
    /// `ref_words` references.
    pub fn ensure_capacity(&mut self, stack_words: usize, ref_words: usize) {
        if stack_words <= self.stack.len() && ref_words <= self.ref_stack.len() {
            return;
        }

        let grow = |needed: usize, len: usize| if needed <= len { len } else { needed.max(len * 2) };
        let stack = grow(stack_words, self.stack.len());
        let refs = grow(ref_words, self.ref_stack.len());
        self.relocate(stack, refs);
    }

    #[inline]
    pub fn entry_pc(&self) -> usize {
        self.code.continuation_entry_pc()
    }

    #[inline]
    pub fn entry_fp(&self) -> isize {
        self.entry_fp
    }

    /// The sentinel below the oldest frame: the entry stub the continuation
    /// returns to.
    pub fn bottom_frame(&self) -> HFrame {
        HFrame::with_link_address(
            0,
            0,
            self.entry_fp,
            self.entry_pc(),
            Some(self.code.continuation_entry()),
            false,
            None,
            self,
        )
    }

    #[inline]
    pub fn is_bottom(&self, hf: &HFrame) -> bool {
        hf.pc() == self.entry_pc()
    }

    pub fn is_empty(&self) -> bool {
        self.sp == 0
    }

    /// The top frame, or the bottom frame of an empty mirror.
    pub fn last_frame(&self) -> HFrame {
        if self.is_empty() {
            self.bottom_frame()
        } else {
            HFrame::new(self.sp, self.ref_sp, self.fp, self.pc, self)
        }
    }

    pub fn set_last_frame(&mut self, hf: &HFrame) {
        debug_assert_eq!(hf.mirror_id(), self.id);
        self.sp = hf.sp();
        self.ref_sp = hf.ref_sp();
        self.fp = hf.fp();
        self.pc = hf.pc();
    }

    /// References held by all frames.
    pub fn total_refs(&self) -> usize {
        self.ref_sp
    }
}

impl fmt::Debug for ContMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContMirror")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("sp", &self.sp)
            .field("ref_sp", &self.ref_sp)
            .field("fp", &format_args!("{:#x}", self.fp))
            .field("pc", &format_args!("{:#x}", self.pc))
            .field("stack_length", &self.stack.len())
            .field("ref_stack_length", &self.ref_stack.len())
            .finish()
    }
}
