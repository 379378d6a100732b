use std::cell::Cell;

use crate::utils::WORD_SIZE;

/// A word buffer addressed from its high end.
///
/// Index `i` names the word at `end - i * WORD_SIZE`; index 0 is the end
/// itself and holds no word. Growing copies the contents to the tail of the
/// new buffer so every index keeps naming the same word.
pub(crate) struct MirrorBuffer {
    words: Box<[Cell<isize>]>,
}

impl MirrorBuffer {
    pub(crate) fn new(len: usize) -> Self {
        MirrorBuffer {
            words: (0..len).map(|_| Cell::new(0)).collect(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.words.len()
    }

    #[inline]
    fn slot(&self, index: usize) -> &Cell<isize> {
        debug_assert!(
            index != 0 && index <= self.words.len(),
            "index {} outside buffer of {} words",
            index,
            self.words.len()
        );
        &self.words[self.words.len() - index]
    }

    #[inline]
    pub(crate) fn read(&self, index: usize) -> isize {
        self.slot(index).get()
    }

    #[inline]
    pub(crate) fn write(&self, index: usize, value: isize) {
        self.slot(index).set(value);
    }

    pub(crate) fn base_address(&self) -> usize {
        self.words.as_ptr() as usize
    }

    pub(crate) fn end_address(&self) -> usize {
        self.base_address() + self.words.len() * WORD_SIZE
    }

    #[inline]
    pub(crate) fn address(&self, index: usize) -> usize {
        self.end_address() - index * WORD_SIZE
    }

    /// Inverse of [`address`](Self::address), `None` for addresses outside
    /// the buffer or not word aligned.
    pub(crate) fn index_of(&self, address: usize) -> Option<usize> {
        let end = self.end_address();
        if address < self.base_address() || address > end || (end - address) % WORD_SIZE != 0 {
            return None;
        }
        Some((end - address) / WORD_SIZE)
    }

    /// A buffer of `len` words holding this one's contents at the same
    /// indices.
    pub(crate) fn relocated(&self, len: usize) -> Self {
        assert!(len >= self.len(), "cannot shrink a buffer of {} words to {}", self.len(), len);
        let new = Self::new(len);
        let shift = len - self.len();
        for (from, to) in self.words.iter().zip(new.words[shift..].iter()) {
            to.set(from.get());
        }
        new
    }
}
