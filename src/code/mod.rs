//! Code metadata the frame walker consults: the interpreter's code region,
//! compiled code blobs and the stubs continuations return through.
//!
//! Addresses handed out here are synthetic; nothing is ever executed. They
//! only need to be distinct and stable so that a `pc` found in a mirror can
//! be classified.
use parking_lot::RwLock;

use crate::utils::align_up;

pub mod blob;
pub mod interpreter;
pub mod method;

pub use blob::{CodeBlob, CodeBlobKind, OopMap};
pub use interpreter::Interpreter;
pub use method::{LiveSlots, Method, MethodId};

pub const CODE_CACHE_BASE: usize = 0x1000_0000;
pub const CODE_ALIGNMENT: usize = 32;

struct CodeHeap {
    /// Sorted by start address.
    blobs: Vec<&'static CodeBlob>,
    top: usize,
}

impl CodeHeap {
    fn install(&mut self, mut blob: CodeBlob) -> &'static CodeBlob {
        blob.set_start(self.top);
        self.top = align_up(blob.end(), CODE_ALIGNMENT);
        let blob: &'static CodeBlob = Box::leak(Box::new(blob));
        self.blobs.push(blob);
        blob
    }
}

pub struct CodeCache {
    interpreter: Interpreter,
    heap: RwLock<CodeHeap>,
    continuation_entry: &'static CodeBlob,
    deopt_blob: &'static CodeBlob,
}

impl CodeCache {
    /// Offset of the return address continuation frames return to inside the
    /// entry stub.
    pub const CONTINUATION_ENTRY_RETURN_OFFSET: usize = 0x10;

    pub fn new() -> Self {
        let interpreter = Interpreter::new(CODE_CACHE_BASE);
        let mut heap = CodeHeap {
            blobs: Vec::new(),
            top: align_up(interpreter.code_end(), CODE_ALIGNMENT),
        };

        let continuation_entry = heap.install(CodeBlob::new(
            "continuation entry",
            CodeBlobKind::ContinuationEntry,
            2,
            64,
        ));
        let deopt_blob = heap.install(CodeBlob::new(
            "deoptimization",
            CodeBlobKind::DeoptimizationStub,
            2,
            64,
        ));

        CodeCache {
            interpreter,
            heap: RwLock::new(heap),
            continuation_entry,
            deopt_blob,
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    #[inline]
    pub fn is_interpreter_pc(&self, pc: usize) -> bool {
        self.interpreter.contains(pc)
    }

    /// Registers `blob` at the next free address. Blobs are never freed;
    /// invalidated code is only marked not entrant.
    pub fn install(&self, blob: CodeBlob) -> &'static CodeBlob {
        let blob = self.heap.write().install(blob);
        log::trace!(target: "cont-mirror", "installed {:?}", blob);
        blob
    }

    pub fn find_blob(&self, pc: usize) -> Option<&'static CodeBlob> {
        let heap = self.heap.read();
        let at = heap.blobs.partition_point(|blob| blob.start() <= pc);

        if at == 0 {
            return None;
        }

        let blob = heap.blobs[at - 1];
        if blob.contains(pc) {
            Some(blob)
        } else {
            None
        }
    }

    pub fn continuation_entry(&self) -> &'static CodeBlob {
        self.continuation_entry
    }

    /// The pc the oldest frame of every mirror returns to.
    pub fn continuation_entry_pc(&self) -> usize {
        self.continuation_entry.start() + Self::CONTINUATION_ENTRY_RETURN_OFFSET
    }

    /// Entry substituted for the pc of frames whose code was invalidated.
    pub fn deopt_entry(&self) -> usize {
        self.deopt_blob.start()
    }
}

impl Default for CodeCache {
    fn default() -> Self {
        Self::new()
    }
}
