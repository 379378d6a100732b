use std::collections::BTreeMap;

use crate::utils::fast_bitvec::FastBitVector;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct MethodId(u32);

impl MethodId {
    pub const fn from_raw(raw: u32) -> Self {
        MethodId(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Slots holding live references at one bytecode position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveSlots {
    pub locals: FastBitVector,
    pub stack: FastBitVector,
}

/// An interpreted method as far as the frame walker is concerned: frame
/// sizing, a bytecode buffer to anchor bcp values, and the per-bci live
/// reference maps computed by the interpreter's liveness analysis.
pub struct Method {
    name: String,
    max_locals: usize,
    max_stack: usize,
    code: Box<[u8]>,
    live_slots: BTreeMap<u32, LiveSlots>,
}

impl Method {
    pub fn new(name: impl Into<String>, max_locals: usize, max_stack: usize, code_length: usize) -> Self {
        Method {
            name: name.into(),
            max_locals,
            max_stack,
            code: vec![0u8; code_length.max(1)].into_boxed_slice(),
            live_slots: BTreeMap::new(),
        }
    }

    /// Records which locals and expression stack slots hold references at `bci`.
    pub fn with_live_slots(mut self, bci: u32, locals: &[usize], stack: &[usize]) -> Self {
        debug_assert!((bci as usize) < self.code.len());
        let slots = LiveSlots {
            locals: FastBitVector::from_indices(self.max_locals, locals),
            stack: FastBitVector::from_indices(self.max_stack, stack),
        };
        self.live_slots.insert(bci, slots);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_locals(&self) -> usize {
        self.max_locals
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    pub fn code_base(&self) -> usize {
        self.code.as_ptr() as usize
    }

    pub fn contains_bcp(&self, bcp: usize) -> bool {
        bcp >= self.code_base() && bcp < self.code_base() + self.code.len()
    }

    pub fn bcp_from(&self, bci: u32) -> usize {
        debug_assert!((bci as usize) < self.code.len(), "bci {} out of {}", bci, self.name);
        self.code_base() + bci as usize
    }

    pub fn bci_from(&self, bcp: usize) -> u32 {
        debug_assert!(self.contains_bcp(bcp), "bcp {:#x} not in {}", bcp, self.name);
        (bcp - self.code_base()) as u32
    }

    /// Live slots at `bci`, `None` when no reference is live there.
    pub fn live_slots_at(&self, bci: u32) -> Option<&LiveSlots> {
        self.live_slots.get(&bci)
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("max_locals", &self.max_locals)
            .field("max_stack", &self.max_stack)
            .finish()
    }
}
