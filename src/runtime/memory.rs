//! Linear memory: page-based growth and bounds-checked little-endian
//! access. Memory endianness is fixed by the Wasm spec and independent of
//! the byte order compiled immediates use.

use crate::error::Trap;
use crate::model::MemoryType;

/// Bytes per Wasm page.
pub const PAGE_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct MemoryInstance {
    buf: Vec<u8>,
    min: u32,
    max: Option<u32>,
}

impl MemoryInstance {
    /// Allocate a memory of `min` pages. With `reserve_max`, capacity for
    /// the declared maximum is reserved up front so growth never moves the
    /// buffer (the off-heap placement strategy).
    pub fn new(ty: &MemoryType, reserve_max: bool) -> Self {
        let min = ty.limits.min;
        let max = ty.limits.max;
        let reserve = if reserve_max { max.unwrap_or(min) } else { min };
        let mut buf = Vec::with_capacity(reserve as usize * PAGE_SIZE);
        buf.resize(min as usize * PAGE_SIZE, 0);
        Self { buf, min, max }
    }

    /// Current size in pages. Always `buf.len() / PAGE_SIZE` exactly; the
    /// buffer length is kept a page multiple.
    pub fn size_pages(&self) -> u32 {
        (self.buf.len() / PAGE_SIZE) as u32
    }

    pub fn limits(&self) -> (u32, Option<u32>) {
        (self.min, self.max)
    }

    /// Grow by `delta` pages. Returns the previous page count, or `None`
    /// when the declared maximum or the address space would be exceeded.
    /// Either outcome is atomic: on failure nothing changes.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let prev = self.size_pages();
        let next = prev.checked_add(delta)?;
        if next > self.max.unwrap_or(65_536) || next > 65_536 {
            return None;
        }
        self.buf.resize(next as usize * PAGE_SIZE, 0);
        Some(prev)
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    #[inline]
    fn range(&self, addr: u32, len: usize) -> Result<usize, Trap> {
        let start = addr as usize;
        let end = start.checked_add(len).ok_or(Trap::MemoryOutOfBounds)?;
        if end > self.buf.len() {
            return Err(Trap::MemoryOutOfBounds);
        }
        Ok(start)
    }

    pub fn load(&self, addr: u32, len: usize) -> Result<u64, Trap> {
        let start = self.range(addr, len)?;
        let mut bytes = [0u8; 8];
        bytes[..len].copy_from_slice(&self.buf[start..start + len]);
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn store(&mut self, addr: u32, len: usize, value: u64) -> Result<(), Trap> {
        let start = self.range(addr, len)?;
        let bytes = value.to_le_bytes();
        self.buf[start..start + len].copy_from_slice(&bytes[..len]);
        Ok(())
    }

    /// Bulk read, used by the embedding surface.
    pub fn read(&self, addr: u32, len: usize) -> Result<&[u8], Trap> {
        let start = self.range(addr, len)?;
        Ok(&self.buf[start..start + len])
    }

    /// Bulk write, used by data segments and the embedding surface.
    pub fn write(&mut self, addr: u32, bytes: &[u8]) -> Result<(), Trap> {
        let start = self.range(addr, bytes.len())?;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}
