//! Function-reference table. Elements are store addresses of function
//! instances; `None` marks an uninitialized slot.

use crate::error::Trap;
use crate::model::TableType;

#[derive(Debug, Clone)]
pub struct TableInstance {
    elems: Vec<Option<usize>>,
    min: u32,
    max: Option<u32>,
}

impl TableInstance {
    pub fn new(ty: &TableType) -> Self {
        Self {
            elems: vec![None; ty.limits.min as usize],
            min: ty.limits.min,
            max: ty.limits.max,
        }
    }

    pub fn size(&self) -> u32 {
        self.elems.len() as u32
    }

    pub fn limits(&self) -> (u32, Option<u32>) {
        (self.min, self.max)
    }

    /// Read a slot; out-of-range indices trap, empty slots are `None`.
    pub fn get(&self, idx: u32) -> Result<Option<usize>, Trap> {
        self.elems
            .get(idx as usize)
            .copied()
            .ok_or(Trap::TableOutOfBounds)
    }

    pub fn set(&mut self, idx: u32, func_addr: Option<usize>) -> Result<(), Trap> {
        let slot = self
            .elems
            .get_mut(idx as usize)
            .ok_or(Trap::TableOutOfBounds)?;
        *slot = func_addr;
        Ok(())
    }

    /// Grow by `delta` elements. Returns the previous size, or `None` when
    /// the declared maximum would be exceeded.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let prev = self.size();
        let next = prev.checked_add(delta)?;
        if let Some(max) = self.max {
            if next > max {
                return None;
            }
        }
        self.elems.resize(next as usize, None);
        Some(prev)
    }
}
