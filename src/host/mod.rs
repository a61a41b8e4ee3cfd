//! Host-side control plane: owns the region view, the session, and the
//! queue registry; publishes messages and runs the liveness pass.

mod payload;
mod queue;

pub use payload::Payload;
pub use queue::Queue;

use std::fmt;
use std::mem;
use std::ptr;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;

use crate::error::{Error, Result};
use crate::layout::{MessageSlot, QueueDesc, SharedHeader, MAGIC, MAX_QUEUES, VERSION};
use crate::sys::alloc::BumpAlloc;
use crate::sys::platform::{Platform, SystemPlatform};
use crate::sys::region::SharedRegion;

use queue::HostQueue;

/// The single publisher over a shared region.
///
/// A `Host` borrows the mapped buffer for its lifetime; dropping it releases
/// host-private memory only and leaves the region bytes intact, so a later
/// `init` over the same buffer rerolls the session and clients observe the
/// restart.
pub struct Host<'a> {
    region: SharedRegion<'a>,
    platform: Box<dyn Platform>,
    alloc: BumpAlloc,
    queues: Vec<HostQueue>,
    session_id: u32,
    started: bool,
}

/// Descriptor reference derived from the region base, so callers can hold it
/// alongside a mutable borrow of the host-private queue state.
///
/// # Safety
/// `base` must point at an initialized `SharedHeader` and `index` must be a
/// registered queue slot.
unsafe fn desc_at<'r>(base: *mut u8, index: usize) -> &'r QueueDesc {
    &(*base.cast::<SharedHeader>()).queues[index]
}

impl<'a> Host<'a> {
    /// Initialize a session over `region` with the default platform.
    pub fn init(region: SharedRegion<'a>) -> Result<Host<'a>> {
        Self::init_with_platform(region, Box::new(SystemPlatform))
    }

    /// Initialize a session with caller-provided clock and randomness.
    ///
    /// Writes the header in place: magic, wire version, zeroed capability
    /// bits, heartbeat and queue table, plus a fresh session identifier that
    /// is guaranteed to differ from whatever the region held before, so
    /// clients surviving a host restart observe the change.
    pub fn init_with_platform(
        region: SharedRegion<'a>,
        platform: Box<dyn Platform>,
    ) -> Result<Host<'a>> {
        if platform.now_ms() == 0 {
            return Err(Error::ClockFailure);
        }
        if region.len() < SharedHeader::byte_size() || region.len() > u32::MAX as usize {
            return Err(Error::InvalidSize);
        }
        if (region.as_ptr() as usize) % mem::align_of::<SharedHeader>() != 0 {
            return Err(Error::InvalidSize);
        }

        let alloc = BumpAlloc::new(region.len())?;
        let hdr = region.as_ptr().cast::<SharedHeader>();

        let previous = unsafe { (*hdr).session_id.load(Ordering::Relaxed) };
        let mut session_id = platform.rand_u32();
        while session_id == previous {
            session_id = session_id.wrapping_add(1);
        }

        unsafe {
            ptr::write(
                hdr,
                SharedHeader {
                    magic: MAGIC,
                    version: VERSION,
                    session_id: AtomicU32::new(session_id),
                    heartbeat: AtomicU32::new(0),
                    caps: 0,
                    num_queues: 0,
                    queues: mem::zeroed(),
                },
            );
        }

        debug!(
            "session {session_id:08x} initialized over {} byte region",
            region.len()
        );

        Ok(Host {
            region,
            platform,
            alloc,
            queues: Vec::new(),
            session_id,
            started: false,
        })
    }

    /// Register a queue of effective capacity `num_messages`.
    ///
    /// The ring gets one extra sentinel slot so `start == position`
    /// unambiguously means empty. Registration is only possible before the
    /// host starts publishing.
    pub fn add_queue(&mut self, queue_id: u32, num_messages: u32) -> Result<Queue> {
        if self.started {
            return Err(Error::HostStarted);
        }
        if self.queues.len() >= MAX_QUEUES {
            return Err(Error::NoQueues);
        }
        let ring_len = num_messages.checked_add(1).ok_or(Error::InvalidSize)?;
        let offset = self.alloc.reserve_ring(ring_len)?;

        let index = self.queues.len();
        let hdr = self.header_ptr();
        unsafe {
            // Clear the ring so clients never observe slots from a previous
            // session on this buffer.
            ptr::write_bytes(
                self.region.as_ptr().add(offset),
                0,
                ring_len as usize * mem::size_of::<MessageSlot>(),
            );
            let qd = ptr::addr_of_mut!((*hdr).queues[index]);
            (*qd).queue_id = queue_id;
            (*qd).num_messages = ring_len;
            (*qd).messages_offset = offset as u64;
            (*qd).subs.store(0, Ordering::Relaxed);
            (*qd).position.store(0, Ordering::Relaxed);
            (*qd).lock.store(0, Ordering::Relaxed);
            (*hdr).num_queues = (index + 1) as u32;
        }

        let now = self.platform.now_ms();
        self.queues.push(HostQueue::new(index, queue_id, ring_len, now));
        debug!("queue {queue_id} registered: {num_messages}+1 slots at offset {offset}");
        Ok(Queue { index })
    }

    /// Reserve `size` payload bytes out of the bump region.
    pub fn mem_alloc(&mut self, size: u32) -> Result<Payload> {
        if self.started {
            return Err(Error::HostStarted);
        }
        let offset = self.alloc.reserve(size as usize)?;
        let mem = unsafe { NonNull::new_unchecked(self.region.as_ptr().add(offset)) };
        Ok(Payload::new(offset as u32, size, mem))
    }

    /// Release a payload handle. The backing bytes stay reserved; the bump
    /// region is never recycled during the host's lifetime.
    pub fn mem_free(&mut self, payload: Payload) {
        drop(payload);
    }

    /// Publish a message on `queue`, referencing `payload` bytes.
    ///
    /// Returns `Ok` without writing when no non-bad subscriber is attached,
    /// and `QueueFull` when the ring holds `num_messages - 1` unacknowledged
    /// slots; the producer never overwrites an unacknowledged record.
    pub fn post(&mut self, queue: Queue, udata: u32, payload: &Payload) -> Result<()> {
        self.started = true;
        let now = self.platform.now_ms();
        let base = self.region.as_ptr();
        let desc = unsafe { desc_at(base, queue.index) };
        self.queues[queue.index].publish(base, desc, udata, payload, now)
    }

    /// One control pass: bump the heartbeat, then per queue retire the head
    /// once acknowledged, flag stragglers past the message deadline, and
    /// evict subscribers whose grace period expired.
    pub fn process(&mut self) -> Result<()> {
        self.started = true;
        unsafe {
            (*self.header_ptr()).heartbeat.fetch_add(1, Ordering::Release);
        }

        let now = self.platform.now_ms();
        let base = self.region.as_ptr();
        for q in self.queues.iter_mut() {
            let desc = unsafe { desc_at(base, q.index()) };
            q.run_gc(base, desc, now);
        }
        Ok(())
    }

    /// Session identifier clients use to detect restarts.
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Current heartbeat value as visible to clients.
    pub fn heartbeat(&self) -> u32 {
        unsafe { (*self.header_ptr()).heartbeat.load(Ordering::Acquire) }
    }

    /// Number of registered queues.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// True once the first `post` or `process` froze the layout.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Region bytes handed out so far, header included.
    pub fn mem_used(&self) -> usize {
        self.alloc.used()
    }

    /// Region bytes still available for pre-start reservations.
    pub fn mem_available(&self) -> usize {
        self.alloc.available()
    }

    #[inline]
    fn header_ptr(&self) -> *mut SharedHeader {
        self.region.as_ptr().cast::<SharedHeader>()
    }
}

impl fmt::Debug for Host<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("region", &format_args!("{:p}", self.region.as_ptr()))
            .field("session_id", &format_args!("{:08x}", self.session_id))
            .field("queues", &self.queues.len())
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}
