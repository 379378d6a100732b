use std::sync::atomic::{AtomicBool, Ordering};

use super::method::MethodId;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CodeBlobKind {
    Compiled,
    ContinuationEntry,
    DeoptimizationStub,
}

/// Frame slots holding references at one return address, as word offsets
/// from the frame's sp.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct OopMap {
    slots: Vec<usize>,
}

impl OopMap {
    pub fn new(mut slots: Vec<usize>) -> Self {
        slots.sort_unstable();
        slots.dedup();
        OopMap { slots }
    }

    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    pub fn num_oops(&self) -> usize {
        self.slots.len()
    }
}

/// Layout facts about a piece of compiled code.
///
/// ```text
/// | ...                  |   caller
/// +======================+ <- sp + frame_size = sender sp
/// | return address       |   frame_size - 1
/// +----------------------+
/// | saved rbp (link)     |   frame_size - 2
/// +----------------------+
/// | spill slots          |
/// | ...                  |
/// +======================+ <- sp
/// ```
pub struct CodeBlob {
    name: String,
    kind: CodeBlobKind,
    start: usize,
    code_size: usize,
    frame_size: usize,
    oop_maps: Vec<(u32, OopMap)>,
    method: Option<MethodId>,
    not_entrant: AtomicBool,
}

impl CodeBlob {
    pub fn compiled(name: impl Into<String>, frame_size: usize, code_size: usize) -> Self {
        Self::new(name, CodeBlobKind::Compiled, frame_size, code_size)
    }

    pub(crate) fn new(name: impl Into<String>, kind: CodeBlobKind, frame_size: usize, code_size: usize) -> Self {
        assert!(frame_size >= 2, "a frame holds at least a return address and a link");
        CodeBlob {
            name: name.into(),
            kind,
            start: 0,
            code_size: code_size.max(1),
            frame_size,
            oop_maps: Vec::new(),
            method: None,
            not_entrant: AtomicBool::new(false),
        }
    }

    /// Attaches the oop map describing the frame when suspended at
    /// `pc_offset` bytes into the blob.
    pub fn with_oop_map(mut self, pc_offset: u32, map: OopMap) -> Self {
        debug_assert!(map.slots().iter().all(|&slot| slot < self.frame_size - 2));
        match self.oop_maps.binary_search_by_key(&pc_offset, |(offset, _)| *offset) {
            Ok(at) => self.oop_maps[at].1 = map,
            Err(at) => self.oop_maps.insert(at, (pc_offset, map)),
        }
        self
    }

    pub fn with_method(mut self, method: MethodId) -> Self {
        self.method = Some(method);
        self
    }

    pub(super) fn set_start(&mut self, start: usize) {
        self.start = start;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CodeBlobKind {
        self.kind
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.start + self.code_size
    }

    pub fn code_size(&self) -> usize {
        self.code_size
    }

    #[inline]
    pub fn contains(&self, pc: usize) -> bool {
        pc >= self.start && pc < self.end()
    }

    /// Frame size in words, including the return address and saved rbp.
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Words from sp to the return address slot.
    #[inline]
    pub fn return_address_offset(&self) -> usize {
        self.frame_size - 1
    }

    /// Words from sp to the saved rbp slot.
    #[inline]
    pub fn link_offset(&self) -> usize {
        self.frame_size - 2
    }

    pub fn method(&self) -> Option<MethodId> {
        self.method
    }

    pub fn oop_map_for(&self, pc: usize) -> Option<&OopMap> {
        debug_assert!(self.contains(pc), "pc {:#x} not in {}", pc, self.name);
        let offset = (pc - self.start) as u32;
        self.oop_maps
            .binary_search_by_key(&offset, |(offset, _)| *offset)
            .ok()
            .map(|at| &self.oop_maps[at].1)
    }

    #[inline]
    pub fn num_oops_at(&self, pc: usize) -> usize {
        self.oop_map_for(pc).map_or(0, OopMap::num_oops)
    }

    /// Code that has been invalidated must not be resumed directly; frames
    /// suspended in it are thawed through the deoptimization entry.
    #[inline]
    pub fn is_not_entrant(&self) -> bool {
        self.not_entrant.load(Ordering::Acquire)
    }

    /// Returns `true` if this call invalidated the blob.
    pub fn make_not_entrant(&self) -> bool {
        let transitioned = !self.not_entrant.swap(true, Ordering::AcqRel);
        if transitioned {
            log::debug!(target: "cont-thaw", "{} made not entrant", self.name);
        }
        transitioned
    }
}

impl std::fmt::Debug for CodeBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CodeBlob({} {:?} [{:#x}, {:#x}) frame_size: {})",
            self.name,
            self.kind,
            self.start,
            self.end(),
            self.frame_size
        )
    }
}
