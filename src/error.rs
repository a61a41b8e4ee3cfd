use std::fmt;

/// Status codes returned by the host-side operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The injected clock returned the reserved value 0 at init.
    ClockFailure,
    /// Region too small, too large for 32-bit offsets, or misaligned.
    InvalidSize,
    /// Host-private allocation failed.
    NoMem,
    /// The bump region cannot satisfy the requested reservation.
    NoSharedMem,
    /// Layout is frozen; queues and payloads only register before the
    /// first `post`/`process`.
    HostStarted,
    /// The queue registry is full.
    NoQueues,
    /// The ring has `num_messages - 1` unacknowledged slots; retry after
    /// yielding to `process()`.
    QueueFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClockFailure => write!(f, "monotonic clock is unusable"),
            Self::InvalidSize => write!(f, "region size or alignment is invalid"),
            Self::NoMem => write!(f, "host-private allocation failed"),
            Self::NoSharedMem => write!(f, "shared region exhausted"),
            Self::HostStarted => write!(f, "host already started; layout is frozen"),
            Self::NoQueues => write!(f, "queue registry is full"),
            Self::QueueFull => write!(f, "queue full"),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for all public host operations.
pub type Result<T> = std::result::Result<T, Error>;
