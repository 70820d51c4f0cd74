use crate::{gc_info::GcInfo, metadata::ObjectMetadata};
use modular_bitfield::prelude::*;
use std::{
    mem::size_of,
    sync::atomic::{AtomicPtr, Ordering},
};

// HeapObjectHeader contains meta data per object and is prepended to each
// object.
//
// +-----------------+------+------------------------------------------+
// | name            | bits |                                          |
// +-----------------+------+------------------------------------------+
// | gc info         |   64 | Pointer to the static GcInfo of the type.|
// +-----------------+------+------------------------------------------+
// | metadata        |   64 | ObjectMetadata or null. Materialized on  |
// |                 |      | first weak access, CAS-installed.        |
// +-----------------+------+------------------------------------------+
// | size            |   31 | In ALLOCATION_GRANULARITY units.         |
// | mark bit        |    1 |                                          |
// +-----------------+------+------------------------------------------+
//
// Notes:
// - The header is padded to ALLOCATION_GRANULARITY so the payload that follows
//   it is aligned to 16 bytes.
// - Size and mark bit are only written by the allocating thread (before the
//   object is published) and by the collector while the world is stopped.
#[repr(C, align(16))]
pub struct HeapObjectHeader {
    gc_info: &'static GcInfo,
    metadata: AtomicPtr<ObjectMetadata>,
    encoded: EncodedBits,
}

pub const ALLOCATION_GRANULARITY: usize = 16;
/// Largest allocation (header included) the size field can describe.
pub const MAX_ALLOCATION_SIZE: usize = ((1usize << 31) - 1) * ALLOCATION_GRANULARITY;

impl HeapObjectHeader {
    pub(crate) fn new(gc_info: &'static GcInfo, size: usize) -> Self {
        debug_assert!(size % ALLOCATION_GRANULARITY == 0);
        debug_assert!(size <= MAX_ALLOCATION_SIZE);
        Self {
            gc_info,
            metadata: AtomicPtr::new(core::ptr::null_mut()),
            encoded: EncodedBits::new().with_granules((size / ALLOCATION_GRANULARITY) as u32),
        }
    }
    #[inline(always)]
    pub fn payload(&self) -> *mut u8 {
        (self as *const Self as usize + size_of::<Self>()) as _
    }
    #[inline(always)]
    pub fn from_payload(payload: *const u8) -> *mut Self {
        (payload as usize - size_of::<Self>()) as _
    }
    #[inline(always)]
    pub fn gc_info(&self) -> &'static GcInfo {
        self.gc_info
    }
    pub fn type_name(&self) -> &'static str {
        (self.gc_info.type_name)()
    }
    /// Returns allocation size of an object including its header.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.encoded.granules() as usize * ALLOCATION_GRANULARITY
    }
    #[inline(always)]
    pub fn is_marked(&self) -> bool {
        self.encoded.marked()
    }
    /// Sets the mark bit. Returns `false` if the object was already marked.
    #[inline(always)]
    pub fn set_marked(&mut self) -> bool {
        if self.is_marked() {
            return false;
        }
        self.encoded.set_marked(true);
        true
    }
    #[inline(always)]
    pub fn clear_mark(&mut self) {
        self.encoded.set_marked(false);
    }
    /// Current metadata of this object, or null if it was never materialized.
    #[inline(always)]
    pub fn metadata(&self) -> *mut ObjectMetadata {
        self.metadata.load(Ordering::Acquire)
    }
    #[inline(always)]
    pub fn metadata_slot(&self) -> &AtomicPtr<ObjectMetadata> {
        &self.metadata
    }
}

#[bitfield(bits = 32)]
#[derive(Clone, Copy)]
pub struct EncodedBits {
    granules: B31,
    marked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc_info::GcInfoTrait;

    #[test]
    fn header_keeps_payload_aligned() {
        assert_eq!(size_of::<HeapObjectHeader>() % ALLOCATION_GRANULARITY, 0);
    }

    #[test]
    fn size_and_mark_share_one_word() {
        let mut header = HeapObjectHeader::new(<u64 as GcInfoTrait>::GC_INFO, 48);
        assert_eq!(header.size(), 48);
        assert!(!header.is_marked());
        assert!(header.set_marked());
        assert!(!header.set_marked());
        assert!(header.is_marked());
        assert_eq!(header.size(), 48);
        header.clear_mark();
        assert!(!header.is_marked());
        assert!(header.metadata().is_null());
        assert!(header.gc_info().is::<u64>());
    }

    #[test]
    fn payload_round_trips_to_header() {
        let header = HeapObjectHeader::new(<u8 as GcInfoTrait>::GC_INFO, 32);
        let payload = header.payload();
        assert_eq!(
            HeapObjectHeader::from_payload(payload) as *const HeapObjectHeader,
            &header as *const HeapObjectHeader
        );
    }
}
