//! Fixed-capacity scratch pool for multi-step compositing.
//!
//! A pool is created for one operation, hands out slots in order, and
//! releases every handle it still holds when it is disposed or dropped.
//! Running out of slots is an error: the pool never grows.

use super::error::{PipelineError, Result};
use super::handle::ImageHandle;
use tracing::trace;

/// Index of a reserved slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct ScratchPool {
    slots: Vec<Option<ImageHandle>>,
    capacity: usize,
}

impl ScratchPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots reserved so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Reserve the next unused slot.
    pub fn get_image(&mut self) -> Result<SlotId> {
        if self.slots.len() >= self.capacity {
            return Err(PipelineError::Capacity(format!(
                "scratch pool of {} slots is exhausted",
                self.capacity
            )));
        }
        self.slots.push(None);
        Ok(SlotId(self.slots.len() - 1))
    }

    /// Store `handle` in a reserved slot, releasing whatever it held before.
    pub fn fill(&mut self, slot: SlotId, handle: ImageHandle) -> Result<()> {
        let entry = self.slots.get_mut(slot.0).ok_or_else(|| unreserved(slot))?;
        *entry = Some(handle);
        Ok(())
    }

    /// Reserve a slot and store the handle produced by `make` in it.
    ///
    /// The slot is reserved first, so an exhausted pool fails before `make`
    /// runs.
    pub fn alloc(&mut self, make: impl FnOnce() -> Result<ImageHandle>) -> Result<SlotId> {
        let slot = self.get_image()?;
        self.fill(slot, make()?)?;
        Ok(slot)
    }

    pub fn get(&self, slot: SlotId) -> Result<&ImageHandle> {
        self.slots
            .get(slot.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| unreserved(slot))
    }

    /// Move a handle out of the pool so it outlives it.
    pub fn take(&mut self, slot: SlotId) -> Result<ImageHandle> {
        self.slots
            .get_mut(slot.0)
            .and_then(Option::take)
            .ok_or_else(|| unreserved(slot))
    }

    /// Release every handle still held.
    pub fn dispose(self) {
        let held = self.slots.iter().filter(|s| s.is_some()).count();
        trace!(reserved = self.slots.len(), held, "scratch pool disposed");
    }
}

fn unreserved(slot: SlotId) -> PipelineError {
    PipelineError::Capacity(format!("scratch slot {} holds no image", slot.0))
}
