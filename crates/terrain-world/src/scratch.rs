//! Reclaimable scratch buffer.
//!
//! The manager reads tiles back and loads files through one CPU-side tile
//! buffer. It is allocated on first use and can be dropped under memory
//! pressure; callers never rely on what a previous use left in it.

use terrain_kernel::TileBuffer;
use tracing::debug;

/// A cache slot holding at most one tile buffer.
#[derive(Debug, Default)]
pub struct ScratchSlot {
    buffer: Option<TileBuffer>,
    allocations: u64,
}

impl ScratchSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached buffer, allocating it on a miss.
    ///
    /// Contents are unspecified; overwrite the whole buffer before reading it.
    pub fn get(&mut self) -> &mut TileBuffer {
        if self.buffer.is_none() {
            self.allocations += 1;
            debug!("Allocating scratch tile buffer");
        }
        self.buffer.get_or_insert_with(TileBuffer::new)
    }

    /// Drops the cached buffer, if any.
    pub fn reclaim(&mut self) -> bool {
        let reclaimed = self.buffer.take().is_some();
        if reclaimed {
            debug!("Reclaimed scratch tile buffer");
        }
        reclaimed
    }

    /// Whether a buffer is currently cached.
    #[must_use]
    pub const fn is_allocated(&self) -> bool {
        self.buffer.is_some()
    }

    /// Number of times the buffer has been (re)allocated.
    #[must_use]
    pub const fn allocations(&self) -> u64 {
        self.allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_allocation() {
        let mut slot = ScratchSlot::new();
        assert!(!slot.is_allocated());

        slot.get();
        slot.get();
        assert!(slot.is_allocated());
        assert_eq!(slot.allocations(), 1);
    }

    #[test]
    fn test_reclaim_then_reallocate() {
        let mut slot = ScratchSlot::new();
        slot.get();
        assert!(slot.reclaim());
        assert!(!slot.reclaim());
        assert!(!slot.is_allocated());

        slot.get();
        assert_eq!(slot.allocations(), 2);
    }
}
