use std::cell::RefCell;
use std::rc::Rc;

use crate::code::{LoadOp, StoreOp};
use crate::interpreter::Trap;

pub const PAGE_SIZE: usize = 65536; // 64KB WASM pages

/// A memory that can be exported by one instance and imported by another.
/// Both sides hold an `Rc` to the same pages, borrowed per access.
pub type SharedMemory = Rc<RefCell<Memory>>;

/// A linear memory.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    bytes: Vec<u8>,
    /// Max memory size in pages, already clamped to the engine limit.
    max_pages: u32,
}

impl Memory {
    pub(crate) fn new(min_pages: u32, max_pages: u32) -> Self {
        Memory {
            bytes: vec![0; min_pages as usize * PAGE_SIZE],
            max_pages,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Upper bound on [`Memory::grow`], in pages.
    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Current size in pages.
    pub fn size(&self) -> u32 {
        (self.bytes.len() / PAGE_SIZE) as u32
    }

    /// Grow by `delta` pages, returning the previous size or -1.
    pub fn grow(&mut self, delta: u32) -> i32 {
        let old_pages = self.size();
        let Some(new_pages) = old_pages.checked_add(delta) else {
            return -1;
        };
        if new_pages > self.max_pages {
            return -1;
        }
        self.bytes.resize(new_pages as usize * PAGE_SIZE, 0);
        tracing::debug!(old_pages, new_pages, "memory grown");
        old_pages as i32
    }

    fn range(&self, base: u32, offset: u32, len: usize) -> Result<std::ops::Range<usize>, Trap> {
        let start = base as u64 + offset as u64;
        let end = start + len as u64;
        if end > self.bytes.len() as u64 {
            return Err(Trap::OutOfBoundsMemoryAccess);
        }
        Ok(start as usize..end as usize)
    }

    /// Bounds-checked slice of `len` bytes at `addr`.
    pub fn read(&self, addr: u32, len: usize) -> Result<&[u8], Trap> {
        let range = self.range(addr, 0, len)?;
        Ok(&self.bytes[range])
    }

    pub fn write(&mut self, addr: u32, bytes: &[u8]) -> Result<(), Trap> {
        let range = self.range(addr, 0, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }

    fn load_bytes<const N: usize>(&self, base: u32, offset: u32) -> Result<[u8; N], Trap> {
        let range = self.range(base, offset, N)?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.bytes[range]);
        Ok(buf)
    }

    /// Execute a load, producing a raw slot value.
    pub(crate) fn load(&self, op: LoadOp, base: u32, offset: u32) -> Result<u64, Trap> {
        Ok(match op {
            LoadOp::I32 | LoadOp::F32 => u32::from_le_bytes(self.load_bytes(base, offset)?) as u64,
            LoadOp::I64 | LoadOp::F64 => u64::from_le_bytes(self.load_bytes(base, offset)?),
            LoadOp::I32S8 => i8::from_le_bytes(self.load_bytes(base, offset)?) as i32 as u32 as u64,
            LoadOp::I32U8 => u8::from_le_bytes(self.load_bytes(base, offset)?) as u64,
            LoadOp::I32S16 => {
                i16::from_le_bytes(self.load_bytes(base, offset)?) as i32 as u32 as u64
            }
            LoadOp::I32U16 => u16::from_le_bytes(self.load_bytes(base, offset)?) as u64,
            LoadOp::I64S8 => i8::from_le_bytes(self.load_bytes(base, offset)?) as i64 as u64,
            LoadOp::I64U8 => u8::from_le_bytes(self.load_bytes(base, offset)?) as u64,
            LoadOp::I64S16 => i16::from_le_bytes(self.load_bytes(base, offset)?) as i64 as u64,
            LoadOp::I64U16 => u16::from_le_bytes(self.load_bytes(base, offset)?) as u64,
            LoadOp::I64S32 => i32::from_le_bytes(self.load_bytes(base, offset)?) as i64 as u64,
            LoadOp::I64U32 => u32::from_le_bytes(self.load_bytes(base, offset)?) as u64,
        })
    }

    /// Execute a store of a raw slot value.
    pub(crate) fn store(
        &mut self,
        op: StoreOp,
        base: u32,
        offset: u32,
        value: u64,
    ) -> Result<(), Trap> {
        let width = op.width() as usize;
        let range = self.range(base, offset, width)?;
        self.bytes[range].copy_from_slice(&value.to_le_bytes()[..width]);
        Ok(())
    }
}
