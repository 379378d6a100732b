use once_cell::sync::Lazy;

use crate::utils::env::{read_bool_from_str, read_uint_from_str};

pub struct ContOptions {
    /// Run a checked walk after every push and relocation.
    pub verify: bool,
    /// Upper bound on frames visited by a checked walk.
    pub max_walk_depth: usize,
    /// Initial raw stack size of a mirror, in words.
    pub stack_words: usize,
    /// Initial reference stack size of a mirror, in slots.
    pub ref_words: usize,
}

impl ContOptions {
    pub const DEFAULT_MAX_WALK_DEPTH: usize = 64 * 1024;
    pub const DEFAULT_STACK_WORDS: usize = 1024;
    pub const DEFAULT_REF_WORDS: usize = 128;

    pub fn new() -> Self {
        ContOptions {
            verify: cfg!(debug_assertions),
            max_walk_depth: Self::DEFAULT_MAX_WALK_DEPTH,
            stack_words: Self::DEFAULT_STACK_WORDS,
            ref_words: Self::DEFAULT_REF_WORDS,
        }
    }

    pub fn set_verify(&mut self, verify: bool) {
        self.verify = verify;
    }

    pub fn set_max_walk_depth(&mut self, depth: usize) {
        self.max_walk_depth = depth;
    }

    pub fn set_stack_words(&mut self, words: usize) {
        self.stack_words = words;
    }

    pub fn set_ref_words(&mut self, words: usize) {
        self.ref_words = words;
    }

    pub fn parse() -> Result<Self, String> {
        parse(|var| std::env::var(var).ok())
    }
}

impl Default for ContOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Options read once from the process environment. Malformed values fall
/// back to the defaults.
pub static OPTIONS: Lazy<ContOptions> = Lazy::new(|| match ContOptions::parse() {
    Ok(options) => options,
    Err(e) => {
        log::warn!(target: "cont-mirror", "ignoring continuation options: {}", e);
        ContOptions::new()
    }
});

pub fn options() -> &'static ContOptions {
    &OPTIONS
}

pub fn parse(lookup: impl Fn(&str) -> Option<String>) -> Result<ContOptions, String> {
    let mut options = ContOptions::new();

    if let Some(value) = lookup("CONT_VERIFY") {
        match read_bool_from_str(&value) {
            Some(verify) => options.set_verify(verify),
            None => return Err(format!("CONT_VERIFY: expected a boolean, got '{}'", value)),
        }
    }

    if let Some(value) = lookup("CONT_MAX_WALK_DEPTH") {
        match read_uint_from_str(&value) {
            Some(depth) if depth > 0 => options.set_max_walk_depth(depth),
            _ => return Err(format!("CONT_MAX_WALK_DEPTH: invalid depth '{}'", value)),
        }
    }

    if let Some(value) = lookup("CONT_STACK_WORDS") {
        match read_uint_from_str(&value) {
            Some(words) => options.set_stack_words(words),
            None => return Err(format!("CONT_STACK_WORDS: invalid size '{}'", value)),
        }
    }

    if let Some(value) = lookup("CONT_REF_WORDS") {
        match read_uint_from_str(&value) {
            Some(words) => options.set_ref_words(words),
            None => return Err(format!("CONT_REF_WORDS: invalid size '{}'", value)),
        }
    }

    Ok(options)
}
