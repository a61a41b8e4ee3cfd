//! Host side of a shared-memory multi-queue message protocol.
//!
//! A single host process lays out a pre-mapped region (header, queue
//! descriptors, message rings, payload space), publishes messages with
//! per-subscriber acknowledgement tracking, and runs a periodic pass that
//! retires consumed slots and evicts subscribers that stop acknowledging.
//! Clients in other processes attach through the [`layout`] structures; the
//! only cross-process primitives are raw atomics in the region and one
//! test-and-set word per queue.

pub mod error;
pub mod ffi;
pub mod host;
pub mod layout;
pub mod sys;

pub use error::{Error, Result};
pub use host::{Host, Payload, Queue};
pub use sys::platform::{Platform, SystemPlatform};
pub use sys::region::SharedRegion;
