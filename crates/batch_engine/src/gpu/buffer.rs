//! GPU buffers and their host mappings
//!
//! A [`Buffer`] owns immutable-size storage created once with
//! [`Buffer::init`]. Host access goes through a [`Mapping`], which comes in two
//! kinds:
//!
//! - **Transient**: returned by a non-persistent [`Buffer::map`]. Dropping it
//!   unmaps the buffer.
//! - **Persistent**: stays valid until [`Buffer::unmap`]. Dropping it does
//!   nothing, and [`Buffer::mapping`] hands out the same range again on later
//!   frames.
//!
//! Writes through a persistent mapping that is not coherent (or through any
//! mapping created with `FLUSH_EXPLICIT`) are tracked as pending until
//! [`Mapping::flush_range`] covers them. Coherent mappings need no flush.

use std::mem::size_of;
use std::ops::Range;

use bitflags::bitflags;
use bytemuck::Pod;

use super::{BufferId, GpuError, GpuResult};

bitflags! {
    /// Storage flags fixed when the buffer is initialized
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Host may map for reading
        const READ = 0x0001;
        /// Host may map for writing
        const WRITE = 0x0002;
        /// Buffer may stay mapped while the GPU uses it
        const PERSISTENT = 0x0040;
        /// Persistent mappings are coherent
        const COHERENT = 0x0080;
        /// Contents may be updated after creation
        const DYNAMIC = 0x0100;
    }
}

bitflags! {
    /// Access flags for a single map call
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapAccess: u32 {
        /// Map for reading
        const READ = 0x0001;
        /// Map for writing
        const WRITE = 0x0002;
        /// Previous contents of the range may be discarded
        const INVALIDATE_RANGE = 0x0004;
        /// Previous contents of the whole buffer may be discarded
        const INVALIDATE_BUFFER = 0x0008;
        /// Modified ranges must be flushed explicitly
        const FLUSH_EXPLICIT = 0x0010;
        /// No implicit synchronization with pending GPU work
        const UNSYNCHRONIZED = 0x0020;
        /// Mapping outlives the map call
        const PERSISTENT = 0x0040;
        /// Writes become visible to the GPU without a flush
        const COHERENT = 0x0080;
    }
}

impl MapAccess {
    /// Storage flags a buffer must have been created with to allow this access
    pub fn required_usage(self) -> BufferUsage {
        let mut usage = BufferUsage::empty();
        usage.set(BufferUsage::READ, self.contains(Self::READ));
        usage.set(BufferUsage::WRITE, self.contains(Self::WRITE));
        usage.set(BufferUsage::PERSISTENT, self.contains(Self::PERSISTENT));
        usage.set(BufferUsage::COHERENT, self.contains(Self::COHERENT));
        usage
    }

    /// Write-only, persistent and coherent: the access every per-frame
    /// streaming buffer in the pipeline uses
    pub const fn persistent_write() -> Self {
        Self::WRITE.union(Self::PERSISTENT).union(Self::COHERENT)
    }
}

impl BufferUsage {
    /// Storage flags matching [`MapAccess::persistent_write`]
    pub const fn persistent_write() -> Self {
        Self::DYNAMIC
            .union(Self::WRITE)
            .union(Self::PERSISTENT)
            .union(Self::COHERENT)
    }
}

/// What kind of mapping a [`Mapping`] represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    /// Unmapped when the mapping is dropped
    Transient,
    /// Stays mapped until the buffer is explicitly unmapped
    Persistent {
        /// Whether writes are visible to the GPU without a flush
        coherent: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MapState {
    Unmapped,
    Mapped {
        offset: usize,
        len: usize,
        access: MapAccess,
    },
}

/// GPU buffer with host-visible backing storage
#[derive(Debug)]
pub struct Buffer {
    id: BufferId,
    label: String,
    usage: BufferUsage,
    storage: Option<Vec<u8>>,
    map_state: MapState,
    pending: Option<Range<usize>>,
}

impl Buffer {
    /// Wrap a freshly created buffer name; storage is allocated by [`Buffer::init`]
    pub fn new(id: BufferId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            usage: BufferUsage::empty(),
            storage: None,
            map_state: MapState::Unmapped,
            pending: None,
        }
    }

    /// Allocate immutable-size storage, optionally filled from `data`
    ///
    /// Storage can only be allocated once.
    pub fn init(&mut self, size: usize, data: Option<&[u8]>, usage: BufferUsage) -> GpuResult<()> {
        if self.storage.is_some() {
            log::error!("Attempted to reinitialize buffer '{}'", self.label);
            return Err(GpuError::AlreadyInitialized(self.id));
        }

        let mut storage = vec![0u8; size];
        if let Some(data) = data {
            if data.len() > size {
                return Err(GpuError::OutOfRange {
                    offset: 0,
                    len: data.len(),
                    size,
                });
            }
            storage[..data.len()].copy_from_slice(data);
        }

        log::trace!("Buffer '{}' ({:?}) initialized with {} bytes", self.label, self.id, size);
        self.storage = Some(storage);
        self.usage = usage;
        Ok(())
    }

    /// Map `len` bytes starting at `offset`, or the rest of the buffer when `len` is `None`
    pub fn map(&mut self, access: MapAccess, offset: usize, len: Option<usize>) -> GpuResult<Mapping<'_>> {
        let size = self.size();
        if self.storage.is_none() {
            log::error!("Attempted to map uninitialized buffer '{}'", self.label);
            return Err(GpuError::Uninitialized(self.id));
        }
        if self.map_state != MapState::Unmapped {
            log::error!("Attempted to map buffer '{}' which is already mapped", self.label);
            return Err(GpuError::AlreadyMapped(self.id));
        }

        let len = len.unwrap_or_else(|| size.saturating_sub(offset));
        if offset + len > size {
            return Err(GpuError::OutOfRange { offset, len, size });
        }

        let missing = access.required_usage() - self.usage;
        if !missing.is_empty() {
            return Err(GpuError::InvalidUsage(format!(
                "buffer '{}' lacks storage flags {:?} for mapping",
                self.label, missing
            )));
        }

        self.map_state = MapState::Mapped { offset, len, access };
        Ok(self.mapping_for(offset, len, access))
    }

    /// Re-borrow the range of a persistent mapping
    pub fn mapping(&mut self) -> GpuResult<Mapping<'_>> {
        match self.map_state {
            MapState::Mapped { offset, len, access } if access.contains(MapAccess::PERSISTENT) => {
                Ok(self.mapping_for(offset, len, access))
            }
            _ => Err(GpuError::NotMapped(self.id)),
        }
    }

    /// End the current mapping
    pub fn unmap(&mut self) -> GpuResult<()> {
        let MapState::Mapped { access, .. } = self.map_state else {
            return Err(GpuError::NotMapped(self.id));
        };
        if access.contains(MapAccess::FLUSH_EXPLICIT) && self.pending.is_some() {
            log::warn!("Buffer '{}' unmapped with unflushed writes {:?}", self.label, self.pending);
        }
        self.map_state = MapState::Unmapped;
        self.pending = None;
        Ok(())
    }

    fn mapping_for(&mut self, offset: usize, len: usize, access: MapAccess) -> Mapping<'_> {
        let kind = if access.contains(MapAccess::PERSISTENT) {
            MappingKind::Persistent {
                coherent: access.contains(MapAccess::COHERENT),
            }
        } else {
            MappingKind::Transient
        };
        let explicit_flush = access.contains(MapAccess::FLUSH_EXPLICIT);
        let tracks_flush = match kind {
            MappingKind::Persistent { coherent } => !coherent,
            MappingKind::Transient => explicit_flush,
        };

        let Self {
            id,
            storage,
            map_state,
            pending,
            ..
        } = self;
        let bytes: &mut [u8] = match storage.as_mut() {
            Some(storage) => &mut storage[offset..offset + len],
            None => &mut [],
        };

        Mapping {
            buffer: *id,
            bytes,
            base: offset,
            kind,
            explicit_flush,
            tracks_flush,
            state: map_state,
            pending,
        }
    }

    /// Buffer name
    pub const fn id(&self) -> BufferId {
        self.id
    }

    /// Debug label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Storage flags
    pub const fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Size of the storage in bytes (zero before [`Buffer::init`])
    pub fn size(&self) -> usize {
        self.storage.as_ref().map_or(0, Vec::len)
    }

    /// Whether storage has been allocated
    pub const fn is_initialized(&self) -> bool {
        self.storage.is_some()
    }

    /// Whether the buffer is currently mapped
    pub fn is_mapped(&self) -> bool {
        self.map_state != MapState::Unmapped
    }

    /// Whether writes are waiting for an explicit flush
    pub const fn has_pending_writes(&self) -> bool {
        self.pending.is_some()
    }

    /// Contents as the GPU sees them
    pub fn contents(&self) -> &[u8] {
        self.storage.as_deref().unwrap_or(&[])
    }
}

/// Host view of a mapped buffer range
///
/// Offsets passed to the write/read methods are relative to the start of the
/// mapped range.
#[derive(Debug)]
pub struct Mapping<'a> {
    buffer: BufferId,
    bytes: &'a mut [u8],
    base: usize,
    kind: MappingKind,
    explicit_flush: bool,
    tracks_flush: bool,
    state: &'a mut MapState,
    pending: &'a mut Option<Range<usize>>,
}

impl<'a> Mapping<'a> {
    /// Buffer this mapping belongs to
    pub const fn buffer_id(&self) -> BufferId {
        self.buffer
    }

    /// Mapped size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the mapped range is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Mapping kind
    pub const fn kind(&self) -> MappingKind {
        self.kind
    }

    /// Whether the mapping survives being dropped
    pub const fn is_persistent(&self) -> bool {
        matches!(self.kind, MappingKind::Persistent { .. })
    }

    /// Whether writes are visible without a flush
    pub const fn is_coherent(&self) -> bool {
        matches!(self.kind, MappingKind::Persistent { coherent: true })
    }

    /// Copy `data` into the mapped range at `offset`
    pub fn write(&mut self, data: &[u8], offset: usize) -> GpuResult<()> {
        let end = offset.checked_add(data.len()).unwrap_or(usize::MAX);
        if end > self.bytes.len() {
            log::error!(
                "Attempted to write {} bytes at offset {} beyond mapped range of {:?} ({} bytes)",
                data.len(),
                offset,
                self.buffer,
                self.bytes.len()
            );
            return Err(GpuError::OutOfRange {
                offset,
                len: data.len(),
                size: self.bytes.len(),
            });
        }

        self.bytes[offset..end].copy_from_slice(data);
        if self.tracks_flush && !data.is_empty() {
            let written = self.base + offset..self.base + end;
            *self.pending = Some(match self.pending.take() {
                Some(existing) => existing.start.min(written.start)..existing.end.max(written.end),
                None => written,
            });
        }
        Ok(())
    }

    /// Write one plain-old-data value at `offset`
    pub fn write_pod<T: Pod>(&mut self, value: &T, offset: usize) -> GpuResult<()> {
        self.write(bytemuck::bytes_of(value), offset)
    }

    /// Write a contiguous slice of plain-old-data values at `offset`
    pub fn write_slice<T: Pod>(&mut self, values: &[T], offset: usize) -> GpuResult<()> {
        self.write(bytemuck::cast_slice(values), offset)
    }

    /// Borrow `len` mapped bytes at `offset`
    pub fn read(&self, offset: usize, len: usize) -> GpuResult<&[u8]> {
        let end = offset.checked_add(len).unwrap_or(usize::MAX);
        self.bytes.get(offset..end).ok_or(GpuError::OutOfRange {
            offset,
            len,
            size: self.bytes.len(),
        })
    }

    /// Read one plain-old-data value at `offset`
    pub fn read_pod<T: Pod>(&self, offset: usize) -> GpuResult<T> {
        self.read(offset, size_of::<T>()).map(bytemuck::pod_read_unaligned)
    }

    /// Make writes in `offset..offset + len` visible to the GPU
    pub fn flush_range(&mut self, offset: usize, len: usize) -> GpuResult<()> {
        if offset + len > self.bytes.len() {
            return Err(GpuError::OutOfRange {
                offset,
                len,
                size: self.bytes.len(),
            });
        }
        let flushed = self.base + offset..self.base + offset + len;
        if let Some(pending) = self.pending.as_ref() {
            if flushed.start <= pending.start && pending.end <= flushed.end {
                *self.pending = None;
            } else {
                log::debug!("Partial flush {:?} leaves {:?} pending", flushed, pending);
            }
        }
        Ok(())
    }

    /// Cursor writing from the start of the mapped range
    pub fn cursor(&mut self) -> MappingCursor<'_, 'a> {
        self.cursor_at(0)
    }

    /// Cursor writing from `offset`
    pub fn cursor_at(&mut self, offset: usize) -> MappingCursor<'_, 'a> {
        MappingCursor { mapping: self, offset }
    }
}

impl Drop for Mapping<'_> {
    fn drop(&mut self) {
        if self.kind == MappingKind::Transient {
            *self.state = MapState::Unmapped;
            if self.explicit_flush && self.pending.is_some() {
                log::warn!("{:?} unmapped with unflushed writes {:?}", self.buffer, self.pending);
            }
            *self.pending = None;
        }
    }
}

/// Running write position inside a [`Mapping`]
///
/// Every write advances the cursor by the number of bytes written.
#[derive(Debug)]
pub struct MappingCursor<'m, 'a> {
    mapping: &'m mut Mapping<'a>,
    offset: usize,
}

impl MappingCursor<'_, '_> {
    /// Current offset relative to the mapped range
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left before the end of the mapped range
    pub fn remaining(&self) -> usize {
        self.mapping.len().saturating_sub(self.offset)
    }

    /// Skip `bytes` without writing
    pub fn advance(&mut self, bytes: usize) {
        self.offset += bytes;
    }

    /// Write one value and advance past it
    pub fn write_pod<T: Pod>(&mut self, value: &T) -> GpuResult<()> {
        self.mapping.write_pod(value, self.offset)?;
        self.offset += size_of::<T>();
        Ok(())
    }

    /// Write a slice and advance past it
    pub fn write_slice<T: Pod>(&mut self, values: &[T]) -> GpuResult<()> {
        self.mapping.write_slice(values, self.offset)?;
        self.offset += std::mem::size_of_val(values);
        Ok(())
    }
}
