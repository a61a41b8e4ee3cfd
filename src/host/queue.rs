use std::sync::atomic::Ordering;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::host::payload::Payload;
use crate::layout::{
    QueueDesc, SubscriberSet, MAX_MESSAGE_AGE_MS, MAX_QUEUE_TIMEOUT_MS, MAX_SUBSCRIBERS,
};

/// Token identifying a registered queue. Obtained from `Host::add_queue` and
/// passed back to `Host::post`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Queue {
    pub(crate) index: usize,
}

/// Host-private bookkeeping for one queue. Clients never see this; the
/// shared counterpart is the `QueueDesc` at the same index in the header.
pub(crate) struct HostQueue {
    index: usize,
    queue_id: u32,
    /// Ring length including the sentinel slot.
    num_messages: u32,
    /// Producer cursor, mirrored into the shared descriptor after each post.
    position: u32,
    /// Oldest slot not yet acknowledged by all non-bad subscribers.
    start: u32,
    /// Outstanding messages between `start` and `position`.
    count: u32,
    /// Deadline for the head-of-queue message.
    msg_timeout: u64,
    /// Per-subscriber reap deadline, armed when a subscriber turns bad.
    sub_timeout: [u64; MAX_SUBSCRIBERS],
}

impl HostQueue {
    pub(crate) fn new(index: usize, queue_id: u32, num_messages: u32, now: u64) -> HostQueue {
        HostQueue {
            index,
            queue_id,
            num_messages,
            position: 0,
            start: 0,
            count: 0,
            msg_timeout: now + MAX_MESSAGE_AGE_MS,
            sub_timeout: [0; MAX_SUBSCRIBERS],
        }
    }

    #[inline]
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Publish one message. Runs without the queue lock: the subscriber word
    /// is snapshot in a single atomic load, and `process()` owns all other
    /// mutations of it. A subscriber attaching after the snapshot simply
    /// misses this message; one flagged bad after the snapshot still gets it,
    /// which is harmless since a bad subscriber's ack is never awaited.
    pub(crate) fn publish(
        &mut self,
        base: *mut u8,
        desc: &QueueDesc,
        udata: u32,
        payload: &Payload,
        now: u64,
    ) -> Result<()> {
        let pend = desc.load_subs().pending();
        if pend == 0 {
            // Delivering to no one is a no-op, not an error.
            return Ok(());
        }
        if self.count == self.num_messages - 1 {
            return Err(Error::QueueFull);
        }

        unsafe {
            let slot = desc.slot(base, self.position);
            (*slot).udata = udata;
            (*slot).size = payload.size();
            (*slot).offset = payload.offset();
            // Commit point: clients may consume the record once this lands.
            (*slot).pending_subs.store(pend, Ordering::Release);
        }

        if self.count == 0 {
            self.msg_timeout = now + MAX_MESSAGE_AGE_MS;
        }
        self.count += 1;
        self.position = (self.position + 1) % self.num_messages;
        desc.position.store(self.position, Ordering::Release);
        Ok(())
    }

    /// One GC pass: retire the head slot if every required ack arrived or was
    /// excused, flag stragglers past the message deadline, and reap bad
    /// subscribers past their grace period.
    pub(crate) fn run_gc(&mut self, base: *mut u8, desc: &QueueDesc, now: u64) {
        // Single-load snapshot; skip queues with nothing outstanding and
        // nobody flagged.
        let snapshot = desc.load_subs();
        if self.count == 0 && snapshot.bad() == 0 {
            return;
        }

        desc.lock();
        let mut subs = SubscriberSet(desc.subs.load(Ordering::Relaxed));

        if self.count > 0 {
            let slot = unsafe { desc.slot(base, self.start) };
            let pending = unsafe { (*slot).pending_subs.load(Ordering::Acquire) };
            // A pending bit whose subscriber was already evicted is a ghost;
            // only live, non-bad subscribers can hold the head back.
            let mut outstanding = pending & subs.live() & !subs.bad();

            if outstanding != 0 && now > self.msg_timeout {
                for b in 0..MAX_SUBSCRIBERS {
                    if outstanding & (1 << b) != 0 {
                        self.sub_timeout[b] = now + MAX_QUEUE_TIMEOUT_MS;
                    }
                }
                warn!(
                    "queue {}: head stuck, flagging subscribers {:#010x}",
                    self.queue_id, outstanding
                );
                subs = subs.with_bad(outstanding);
                // The message is declared delivered; stragglers are excused.
                unsafe { (*slot).pending_subs.store(0, Ordering::Release) };
                outstanding = 0;
            }

            if outstanding == 0 {
                self.start = (self.start + 1) % self.num_messages;
                self.count -= 1;
                if self.count > 0 {
                    // The next head inherits a fresh deadline.
                    self.msg_timeout = now + MAX_MESSAGE_AGE_MS;
                }
            }
        }

        let mut reap = 0u32;
        for b in 0..MAX_SUBSCRIBERS {
            if subs.bad() & (1 << b) != 0 && now > self.sub_timeout[b] {
                reap |= 1 << b;
            }
        }
        if reap != 0 {
            debug!("queue {}: reaping subscribers {:#010x}", self.queue_id, reap);
            subs = subs.without(reap);
        }

        debug_assert_eq!(subs.bad() & !subs.live(), 0);
        desc.subs.store(subs.raw(), Ordering::Release);
        desc.unlock();
    }
}
