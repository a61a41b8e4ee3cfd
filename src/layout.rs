// Shared wire format. Everything in this file is mapped into client
// processes as-is, so the layouts are frozen for wire version 1 and
// guarded by the conformance tests in tests/layout.rs.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Identifies the region as a shmbus session ("SHMQ").
pub const MAGIC: u32 = 0x5348_4D51;

/// Wire format version. Any change to the structs below requires a bump.
pub const VERSION: u32 = 1;

/// Maximum number of queues a host may register.
pub const MAX_QUEUES: usize = 8;

/// Subscribers are identified by a bit index `0..32` per queue.
pub const MAX_SUBSCRIBERS: usize = 32;

/// How long the head-of-queue message may stay unacknowledged before the
/// remaining pending subscribers are flagged bad.
pub const MAX_MESSAGE_AGE_MS: u64 = 150;

/// Grace period between a subscriber being flagged bad and its bit being
/// reclaimed for reuse.
pub const MAX_QUEUE_TIMEOUT_MS: u64 = 10_000;

/// Packed subscriber word: the low 32 bits are the *live* mask (subscribers
/// currently attached), the high 32 bits are the *bad* mask (subscribers the
/// host has given up waiting on). Both halves share one atomic word so a
/// single load yields a consistent `(live, bad)` pair without the queue lock.
///
/// Invariant: `bad` is always a subset of `live`. A bad subscriber stays
/// counted as live until it is reaped.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct SubscriberSet(pub u64);

impl SubscriberSet {
    pub const EMPTY: SubscriberSet = SubscriberSet(0);

    #[inline]
    pub fn live(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub fn bad(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Subscribers whose acknowledgement is still awaited on a fresh message.
    #[inline]
    pub fn pending(self) -> u32 {
        self.live() & !self.bad()
    }

    /// Attach the given subscribers to the live mask.
    #[inline]
    pub fn with_live(self, mask: u32) -> SubscriberSet {
        SubscriberSet(self.0 | u64::from(mask))
    }

    /// Flag the given subscribers as bad. Callers must only pass bits that
    /// are already live.
    #[inline]
    pub fn with_bad(self, mask: u32) -> SubscriberSet {
        SubscriberSet(self.0 | (u64::from(mask) << 32))
    }

    /// Remove the given subscribers from both halves, fully evicting them.
    #[inline]
    pub fn without(self, mask: u32) -> SubscriberSet {
        let m = !(u64::from(mask) | (u64::from(mask) << 32));
        SubscriberSet(self.0 & m)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// One message ring slot.
///
/// `pending_subs` carries the set of subscribers that must acknowledge the
/// message; its release store is the publication commit point, and clients
/// clear their own bit with an atomic AND when they have consumed the
/// payload. The remaining fields are plain words written by the host before
/// that store and never touched again until the slot is reused.
#[repr(C)]
pub struct MessageSlot {
    pub udata: u32,
    pub pending_subs: AtomicU32,
    pub size: u32,
    pub offset: u32,
}

/// Per-queue descriptor inside the shared header.
///
/// Layout (40 bytes, align 8):
///
/// ```text
/// 0   queue_id         u32
/// 4   num_messages     u32   ring length including the sentinel slot
/// 8   subs             u64   packed SubscriberSet, mutated only under lock
/// 16  position         u32   next slot the producer writes
/// 20  (pad)
/// 24  messages_offset  u64   absolute region offset of the message ring
/// 32  lock             u32   test-and-set word serialising subs updates
/// 36  (pad)
/// ```
#[repr(C)]
pub struct QueueDesc {
    pub queue_id: u32,
    pub num_messages: u32,
    pub subs: AtomicU64,
    pub position: AtomicU32,
    _pad0: u32,
    pub messages_offset: u64,
    pub lock: AtomicU32,
    _pad1: u32,
}

impl QueueDesc {
    /// Acquire the queue spinlock. Holders must release promptly; the only
    /// work ever done under this lock is a handful of word-sized updates.
    pub fn lock(&self) {
        let mut k = 0u32;
        while self.lock.swap(1, Ordering::Acquire) != 0 {
            if k < 64 {
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
            k = k.wrapping_add(1);
        }
    }

    pub fn unlock(&self) {
        self.lock.store(0, Ordering::Release);
    }

    /// Consistent snapshot of the subscriber word without taking the lock.
    #[inline]
    pub fn load_subs(&self) -> SubscriberSet {
        SubscriberSet(self.subs.load(Ordering::Acquire))
    }

    /// Address of ring slot `index` for this queue.
    ///
    /// # Safety
    /// `base` must point to the start of the mapped region this descriptor
    /// lives in, and `index` must be below `num_messages`.
    #[inline]
    pub unsafe fn slot(&self, base: *mut u8, index: u32) -> *mut MessageSlot {
        base.add(self.messages_offset as usize)
            .add(index as usize * std::mem::size_of::<MessageSlot>())
            .cast::<MessageSlot>()
    }
}

/// Session header at offset 0 of the region.
#[repr(C)]
pub struct SharedHeader {
    pub magic: u32,
    pub version: u32,
    /// Rerolled on every host init so clients detect restarts.
    pub session_id: AtomicU32,
    /// Incremented on every `process()` call; liveness signal for clients.
    pub heartbeat: AtomicU32,
    /// Capability bitfield, currently zero.
    pub caps: u32,
    pub num_queues: u32,
    pub queues: [QueueDesc; MAX_QUEUES],
}

impl SharedHeader {
    /// Bytes the header occupies at the front of the region.
    #[inline]
    pub const fn byte_size() -> usize {
        std::mem::size_of::<SharedHeader>()
    }

    /// True if the region carries a header this crate can speak to.
    pub fn validate(&self) -> bool {
        self.magic == MAGIC && self.version == VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_set_packing() {
        let s = SubscriberSet::EMPTY.with_live(0b1011);
        assert_eq!(s.live(), 0b1011);
        assert_eq!(s.bad(), 0);
        assert_eq!(s.pending(), 0b1011);

        let s = s.with_bad(0b0010);
        assert_eq!(s.live(), 0b1011);
        assert_eq!(s.bad(), 0b0010);
        assert_eq!(s.pending(), 0b1001);

        let s = s.without(0b0010);
        assert_eq!(s.live(), 0b1001);
        assert_eq!(s.bad(), 0);
    }

    #[test]
    fn queue_lock_roundtrip() {
        let desc: QueueDesc = unsafe { std::mem::zeroed() };
        desc.lock();
        assert_eq!(desc.lock.load(Ordering::Relaxed), 1);
        desc.unlock();
        assert_eq!(desc.lock.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn header_validation() {
        let mut hdr: SharedHeader = unsafe { std::mem::zeroed() };
        assert!(!hdr.validate());
        hdr.magic = MAGIC;
        hdr.version = VERSION;
        assert!(hdr.validate());
    }
}
