pub mod env;
pub mod fast_bitvec;

pub const WORD_SIZE: usize = std::mem::size_of::<isize>();

pub const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}
