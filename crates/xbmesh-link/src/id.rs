use std::sync::atomic::{AtomicU8, Ordering};

/// Hands out request ids 1 through 255, wrapping back to 1.
///
/// Id 0 means "no response expected" and is never returned. Ids are only
/// unique among the last 255 allocations; keeping fewer than that many
/// requests outstanding is up to the caller.
#[derive(Debug)]
pub struct IdAllocator {
    last: AtomicU8,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            last: AtomicU8::new(0),
        }
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> u8 {
        let step = |id: u8| if id == u8::MAX { 1 } else { id + 1 };
        match self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| Some(step(id)))
        {
            Ok(previous) | Err(previous) => step(previous),
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
