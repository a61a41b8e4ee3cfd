use crate::error::{Error, Result};
use crate::layout::{MessageSlot, SharedHeader};

/// Linear allocator handing out offsets inside the shared region.
///
/// Allocations start right after the header, are aligned to the natural
/// alignment of [`MessageSlot`] so rings can be addressed directly, and are
/// never returned: the layout freezes when the host starts.
#[derive(Debug)]
pub struct BumpAlloc {
    next_free: usize,
    avail: usize,
}

impl BumpAlloc {
    /// Cover a region of `region_size` bytes whose front holds the header.
    pub fn new(region_size: usize) -> Result<Self> {
        let header = SharedHeader::byte_size();
        if region_size < header {
            return Err(Error::InvalidSize);
        }
        Ok(Self {
            next_free: header,
            avail: region_size - header,
        })
    }

    /// Reserve `size` bytes, returning the absolute region offset.
    pub fn reserve(&mut self, size: usize) -> Result<usize> {
        let align = std::mem::align_of::<MessageSlot>();
        let aligned = (self.next_free + align - 1) & !(align - 1);
        let pad = aligned - self.next_free;

        if size.saturating_add(pad) > self.avail {
            return Err(Error::NoSharedMem);
        }

        self.next_free = aligned + size;
        self.avail -= size + pad;
        Ok(aligned)
    }

    /// Reserve a message ring of `num_messages` slots.
    pub fn reserve_ring(&mut self, num_messages: u32) -> Result<usize> {
        let bytes = std::mem::size_of::<MessageSlot>() * num_messages as usize;
        self.reserve(bytes)
    }

    /// Bytes handed out so far, header included.
    pub fn used(&self) -> usize {
        self.next_free
    }

    /// Bytes still available for reservation.
    pub fn available(&self) -> usize {
        self.avail
    }
}
