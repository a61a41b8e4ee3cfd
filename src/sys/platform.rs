use std::time::Instant;

use lazy_static::lazy_static;

/// Capabilities the host consumes from its environment: a monotonic
/// millisecond clock and a random source for session identifiers.
///
/// `now_ms` returning 0 is reserved to mean the clock is unusable and makes
/// `init` fail with `ClockFailure`. Tests inject deterministic
/// implementations to drive the timeout machinery.
pub trait Platform {
    fn now_ms(&self) -> u64;
    fn rand_u32(&self) -> u32;
}

lazy_static! {
    static ref CLOCK_BASE: Instant = Instant::now();
}

/// Default platform: milliseconds since process start, `fastrand` for
/// session entropy.
#[derive(Default)]
pub struct SystemPlatform;

impl Platform for SystemPlatform {
    fn now_ms(&self) -> u64 {
        let ms = CLOCK_BASE.elapsed().as_millis() as u64;
        // 0 is reserved for a broken clock.
        if ms == 0 {
            1
        } else {
            ms
        }
    }

    fn rand_u32(&self) -> u32 {
        fastrand::u32(..)
    }
}
