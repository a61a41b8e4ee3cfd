// Host lifecycle: init validation, session reroll across restarts,
// heartbeat behavior, and bump accounting.

use shmbus::layout::SharedHeader;
use shmbus::{Error, Host, Platform, SharedRegion};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

// The header holds 8-byte atomics, so backing buffers must be aligned the
// way a real mapping would be.
fn make_aligned_backing(size: usize) -> (*mut u8, Layout) {
    let layout = Layout::from_size_align(size, 64).unwrap();
    let ptr = unsafe { alloc_zeroed(layout) };
    assert!(!ptr.is_null(), "failed to allocate aligned backing");
    (ptr, layout)
}

struct FakePlatform {
    now: Arc<AtomicU64>,
    next_rand: AtomicU32,
}

impl FakePlatform {
    fn boxed(start_ms: u64, first_rand: u32) -> (Box<FakePlatform>, Arc<AtomicU64>) {
        let now = Arc::new(AtomicU64::new(start_ms));
        let platform = Box::new(FakePlatform {
            now: Arc::clone(&now),
            next_rand: AtomicU32::new(first_rand),
        });
        (platform, now)
    }
}

impl Platform for FakePlatform {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    fn rand_u32(&self) -> u32 {
        self.next_rand.fetch_add(1, Ordering::Relaxed)
    }
}

#[test]
fn init_rejects_undersized_region() {
    let size = SharedHeader::byte_size() - 1;
    let (ptr, layout) = make_aligned_backing(size);
    let region = unsafe { SharedRegion::from_raw_parts(ptr, size) };

    let (platform, _) = FakePlatform::boxed(1000, 7);
    let err = Host::init_with_platform(region, platform).unwrap_err();
    assert_eq!(err, Error::InvalidSize);

    unsafe { dealloc(ptr, layout) };
}

#[test]
fn init_rejects_misaligned_region() {
    let (ptr, layout) = make_aligned_backing(8192);
    let region = unsafe { SharedRegion::from_raw_parts(ptr.wrapping_add(1), 4096) };

    let (platform, _) = FakePlatform::boxed(1000, 7);
    let err = Host::init_with_platform(region, platform).unwrap_err();
    assert_eq!(err, Error::InvalidSize);

    unsafe { dealloc(ptr, layout) };
}

#[test]
fn init_rejects_broken_clock() {
    let (ptr, layout) = make_aligned_backing(4096);
    let region = unsafe { SharedRegion::from_raw_parts(ptr, 4096) };

    let (platform, _) = FakePlatform::boxed(0, 7);
    let err = Host::init_with_platform(region, platform).unwrap_err();
    assert_eq!(err, Error::ClockFailure);

    unsafe { dealloc(ptr, layout) };
}

#[test]
fn init_writes_header_and_session() {
    let (ptr, layout) = make_aligned_backing(4096);
    let region = unsafe { SharedRegion::from_raw_parts(ptr, 4096) };

    let (platform, _) = FakePlatform::boxed(1000, 7);
    let host = Host::init_with_platform(region, platform).unwrap();

    let hdr = unsafe { &*(ptr as *const SharedHeader) };
    assert!(hdr.validate());
    assert_eq!(hdr.caps, 0);
    assert_eq!(hdr.num_queues, 0);
    assert_eq!(hdr.heartbeat.load(Ordering::Acquire), 0);
    assert_eq!(hdr.session_id.load(Ordering::Acquire), host.session_id());

    unsafe { dealloc(ptr, layout) };
}

#[test]
fn reinit_rerolls_session() {
    let (ptr, layout) = make_aligned_backing(4096);

    let (platform, _) = FakePlatform::boxed(1000, 7);
    let region = unsafe { SharedRegion::from_raw_parts(ptr, 4096) };
    let host = Host::init_with_platform(region, platform).unwrap();
    let first = host.session_id();
    drop(host);

    // The region is preserved across the restart; only host-private memory
    // went away.
    let (platform, _) = FakePlatform::boxed(1000, 7);
    let region = unsafe { SharedRegion::from_raw_parts(ptr, 4096) };
    let host = Host::init_with_platform(region, platform).unwrap();
    let second = host.session_id();

    assert_ne!(first, second);
    let hdr = unsafe { &*(ptr as *const SharedHeader) };
    assert_eq!(hdr.session_id.load(Ordering::Acquire), second);

    unsafe { dealloc(ptr, layout) };
}

#[test]
fn reinit_avoids_degenerate_random_collision() {
    struct ConstRand;
    impl Platform for ConstRand {
        fn now_ms(&self) -> u64 {
            1000
        }
        fn rand_u32(&self) -> u32 {
            7
        }
    }

    let (ptr, layout) = make_aligned_backing(4096);

    let region = unsafe { SharedRegion::from_raw_parts(ptr, 4096) };
    let first = Host::init_with_platform(region, Box::new(ConstRand))
        .unwrap()
        .session_id();
    assert_eq!(first, 7);

    let region = unsafe { SharedRegion::from_raw_parts(ptr, 4096) };
    let second = Host::init_with_platform(region, Box::new(ConstRand))
        .unwrap()
        .session_id();
    assert_ne!(second, first);

    unsafe { dealloc(ptr, layout) };
}

#[test]
fn heartbeat_increments_once_per_process() {
    let (ptr, layout) = make_aligned_backing(4096);
    let region = unsafe { SharedRegion::from_raw_parts(ptr, 4096) };

    let (platform, _) = FakePlatform::boxed(1000, 7);
    let mut host = Host::init_with_platform(region, platform).unwrap();

    assert_eq!(host.heartbeat(), 0);
    for _ in 0..1000 {
        host.process().unwrap();
    }
    assert_eq!(host.heartbeat(), 1000);

    let hdr = unsafe { &*(ptr as *const SharedHeader) };
    assert_eq!(hdr.heartbeat.load(Ordering::Acquire), 1000);

    unsafe { dealloc(ptr, layout) };
}

#[test]
fn bump_accounting_stays_balanced() {
    let size = 8192;
    let (ptr, layout) = make_aligned_backing(size);
    let region = unsafe { SharedRegion::from_raw_parts(ptr, size) };

    let (platform, _) = FakePlatform::boxed(1000, 7);
    let mut host = Host::init_with_platform(region, platform).unwrap();

    assert_eq!(host.mem_used(), SharedHeader::byte_size());
    host.add_queue(1, 4).unwrap();
    let payload = host.mem_alloc(100).unwrap();
    host.add_queue(2, 8).unwrap();

    assert_eq!(host.mem_used() + host.mem_available(), size);
    host.mem_free(payload);
    assert_eq!(host.mem_used() + host.mem_available(), size);

    unsafe { dealloc(ptr, layout) };
}
