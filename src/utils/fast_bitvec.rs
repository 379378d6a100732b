pub const fn fast_bit_vector_array_length(num_bits: usize) -> usize {
    (num_bits + 31) / 32
}

/// Word-packed bit vector used for live-slot masks.
#[derive(Clone, Default)]
pub struct FastBitVector {
    words: Vec<u32>,
    num_bits: usize,
}

impl FastBitVector {
    pub const fn new() -> Self {
        Self {
            words: Vec::new(),
            num_bits: 0,
        }
    }

    pub fn with_capacity(num_bits: usize) -> Self {
        let mut this = Self::new();
        this.resize(num_bits);
        this
    }

    pub fn from_indices(num_bits: usize, indices: &[usize]) -> Self {
        let mut this = Self::with_capacity(num_bits);
        for &index in indices {
            this.set(index, true);
        }
        this
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn len(&self) -> usize {
        self.num_bits
    }

    /// Resizes to `num_bits`. Bits past the new length are cleared so a later
    /// grow never resurrects them.
    pub fn resize(&mut self, num_bits: usize) {
        self.words.resize(fast_bit_vector_array_length(num_bits), 0);
        self.num_bits = num_bits;

        let tail = num_bits & 31;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u32 << tail) - 1;
            }
        }
    }

    pub fn at(&self, index: usize) -> bool {
        if index >= self.num_bits {
            false
        } else {
            (self.words[index >> 5] & (1 << (index & 31))) != 0
        }
    }

    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.num_bits, "bit {} out of {}", index, self.num_bits);
        let word = &mut self.words[index >> 5];
        let bit = 1 << (index & 31);

        if value {
            *word |= bit;
        } else {
            *word &= !bit;
        }
    }

    pub fn clear_all(&mut self) {
        for word in self.words.iter_mut() {
            *word = 0;
        }
    }

    pub fn bit_count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    pub fn for_each_set_bit(&self, mut f: impl FnMut(usize)) {
        for (i, &word) in self.words.iter().enumerate() {
            let mut word = word;
            let mut j = i * 32;

            while word != 0 {
                if word & 1 != 0 {
                    f(j);
                }

                word >>= 1;
                j += 1;
            }
        }
    }

    /// Copies the first `num_bits` bits of `other`, resizing to `num_bits`.
    pub fn copy_prefix(&mut self, other: &FastBitVector, num_bits: usize) {
        self.resize(num_bits);
        self.clear_all();
        other.for_each_set_bit(|i| {
            if i < num_bits {
                self.set(i, true);
            }
        });
    }
}

impl PartialEq for FastBitVector {
    fn eq(&self, other: &Self) -> bool {
        self.num_bits == other.num_bits && self.words == other.words
    }
}

impl Eq for FastBitVector {}

impl std::fmt::Debug for FastBitVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for i in 0..self.num_bits {
            write!(f, "{}", if self.at(i) { '1' } else { '0' })?;
        }
        write!(f, "]")
    }
}
