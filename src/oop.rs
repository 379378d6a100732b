use std::fmt;

/// An object reference as seen by the collector. The frame walker never
/// dereferences one; it only moves them between raw stack slots and the
/// reference stack.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Oop(usize);

impl Oop {
    pub const NULL: Oop = Oop(0);

    pub const fn from_raw(raw: usize) -> Self {
        Oop(raw)
    }

    pub const fn raw(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Oop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oop({:#x})", self.0)
    }
}
