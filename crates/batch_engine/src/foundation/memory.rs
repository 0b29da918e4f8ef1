//! Memory management utilities
//!
//! The shared GPU arenas (vertex, index and joint storage) are carved up by a
//! bump allocator. Every lease is aligned at allocation time, so callers never
//! do offset arithmetic by hand: vertex leases align to the vertex stride,
//! index leases to `size_of::<u32>()` and joint leases to the device's
//! uniform-buffer offset alignment.

/// Round `value` up to the next multiple of `align`.
///
/// An `align` of zero or one returns `value` unchanged.
pub const fn align_up(value: usize, align: usize) -> usize {
    if align <= 1 {
        return value;
    }
    let remainder = value % align;
    if remainder == 0 {
        value
    } else {
        value + (align - remainder)
    }
}

/// Errors produced by arena allocation
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    /// Not enough space left for the requested lease
    #[error("Arena exhausted: requested {requested} bytes, {available} available")]
    Exhausted {
        /// Bytes requested (after alignment padding)
        requested: usize,
        /// Bytes remaining in the arena
        available: usize,
    },
}

/// A byte range handed out by an [`ArenaAllocator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaLease {
    /// Byte offset of the lease from the start of the arena
    pub offset: usize,
    /// Size of the lease in bytes
    pub size: usize,
}

impl ArenaLease {
    /// One past the last byte of the lease
    pub const fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Bump allocator over a fixed-capacity arena
///
/// Leases are never freed individually; the whole arena is recycled with
/// [`ArenaAllocator::reset`].
#[derive(Debug, Clone)]
pub struct ArenaAllocator {
    capacity: usize,
    cursor: usize,
}

impl ArenaAllocator {
    /// Create an allocator over `capacity` bytes
    pub const fn new(capacity: usize) -> Self {
        Self { capacity, cursor: 0 }
    }

    /// Allocate `size` bytes starting at a multiple of `align`
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<ArenaLease, ArenaError> {
        let offset = align_up(self.cursor, align);
        let end = offset.checked_add(size).unwrap_or(usize::MAX);
        if end > self.capacity {
            return Err(ArenaError::Exhausted {
                requested: end - self.cursor.min(end),
                available: self.remaining(),
            });
        }

        self.cursor = end;
        log::trace!("Arena lease {}..{} (align {})", offset, end, align);
        Ok(ArenaLease { offset, size })
    }

    /// Release every lease at once
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Total capacity in bytes
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes consumed so far, including alignment padding
    pub const fn used(&self) -> usize {
        self.cursor
    }

    /// Bytes still available
    pub const fn remaining(&self) -> usize {
        self.capacity - self.cursor
    }
}
