use std::ops::Range;

use parking_lot::RwLock;

use super::method::{Method, MethodId};

/// The interpreter's code region and method table.
pub struct Interpreter {
    code: Range<usize>,
    methods: RwLock<Vec<&'static Method>>,
}

impl Interpreter {
    pub const CODE_SIZE: usize = 64 * 1024;
    /// Offset of the return entry every suspended interpreted caller resumes at.
    pub const RETURN_ENTRY_OFFSET: usize = 0x100;

    pub(crate) fn new(start: usize) -> Self {
        Interpreter {
            code: start..start + Self::CODE_SIZE,
            methods: RwLock::new(Vec::new()),
        }
    }

    pub fn code_begin(&self) -> usize {
        self.code.start
    }

    pub fn code_end(&self) -> usize {
        self.code.end
    }

    #[inline]
    pub fn contains(&self, pc: usize) -> bool {
        self.code.contains(&pc)
    }

    pub fn return_entry(&self) -> usize {
        self.code.start + Self::RETURN_ENTRY_OFFSET
    }

    /// Registers `method`. Methods live as long as the process, like the
    /// code blobs that may reference them.
    pub fn install(&self, method: Method) -> MethodId {
        let method: &'static Method = Box::leak(Box::new(method));
        let mut methods = self.methods.write();
        let id = MethodId::from_raw(methods.len() as u32);
        methods.push(method);
        id
    }

    #[inline]
    pub fn method(&self, id: MethodId) -> &'static Method {
        self.methods.read()[id.raw() as usize]
    }

    /// Like [`method`](Self::method), `None` for ids never handed out.
    pub fn try_method(&self, id: MethodId) -> Option<&'static Method> {
        self.methods.read().get(id.raw() as usize).copied()
    }
}
