//! x86 frame layout, in words relative to the frame pointer.
//!
//! Interpreted frame:
//!
//! ```text
//! | ...                            |   caller
//! +================================+ <- locals + 1 = sender sp
//! | local 0                        |
//! | ...                            |
//! | local N - 1                    |
//! +--------------------------------+
//! | return address                 |   fp + 1
//! +--------------------------------+
//! | saved rbp (link)               | <- fp
//! +--------------------------------+
//! | sender sp                      |   fp - 1
//! | last sp                        |   fp - 2
//! | method                         |   fp - 3
//! | holder                         |   fp - 4
//! | mdp                            |   fp - 5
//! | cache                          |   fp - 6
//! | locals                         |   fp - 7
//! | bcp                            |   fp - 8
//! | initial sp / monitor block top |   fp - 9
//! +--------------------------------+
//! | monitor 0 (lock, object)       |    |
//! | ...                            |    v lower address
//! | monitor M - 1                  |
//! +--------------------------------+ <- monitor block top
//! | expression stack 0             |
//! | ...                            |
//! \--------------------------------/ <- sp
//! ```
//!
//! Inside a mirror, words are addressed by index from the bottom (highest
//! address) end, so a positive word offset from fp is a smaller index.

pub const LINK_OFFSET: isize = 0;
pub const RETURN_ADDR_OFFSET: isize = 1;
pub const SENDER_SP_OFFSET: isize = 2;

/// Words between fp and the monitor block, exclusive of fp itself.
pub const INTERPRETER_FRAME_HEADER_WORDS: usize = 9;
/// Size of a monitor record: displaced header followed by the locked object.
pub const MONITOR_SIZE_IN_WORDS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(isize)]
pub enum InterpreterFrameSlot {
    SenderSp = -1,
    LastSp = -2,
    Method = -3,
    Holder = -4,
    Mdp = -5,
    Cache = -6,
    Locals = -7,
    Bcp = -8,
    InitialSp = -9,
}

impl InterpreterFrameSlot {
    pub const MONITOR_BLOCK_TOP: Self = Self::InitialSp;
    pub const MONITOR_BLOCK_BOTTOM: Self = Self::InitialSp;

    #[inline]
    pub const fn offset(self) -> isize {
        self as isize
    }
}

/// Mirror index of the word `offset` words above the word at `index`.
#[inline]
pub const fn index_at(index: usize, offset: isize) -> usize {
    (index as isize - offset) as usize
}
