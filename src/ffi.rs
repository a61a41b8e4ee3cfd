//! C ABI over the host API. Handles are opaque boxed pointers; every call
//! returns a status code or a nullable pointer.

use std::ptr;

use crate::error::Error;
use crate::host::{Host, Payload, Queue};
use crate::sys::region::SharedRegion;

// Status codes shared with C callers.
pub const SHMBUS_OK: i32 = 0;
pub const SHMBUS_ERR_NULL_POINTER: i32 = -1;
pub const SHMBUS_ERR_CLOCK_FAILURE: i32 = -2;
pub const SHMBUS_ERR_INVALID_SIZE: i32 = -3;
pub const SHMBUS_ERR_NO_MEM: i32 = -4;
pub const SHMBUS_ERR_NO_SHARED_MEM: i32 = -5;
pub const SHMBUS_ERR_HOST_STARTED: i32 = -6;
pub const SHMBUS_ERR_NO_QUEUES: i32 = -7;
pub const SHMBUS_ERR_QUEUE_FULL: i32 = -8;
pub const SHMBUS_ERR_INVALID_ARG: i32 = -9;

fn status_code(err: Error) -> i32 {
    match err {
        Error::ClockFailure => SHMBUS_ERR_CLOCK_FAILURE,
        Error::InvalidSize => SHMBUS_ERR_INVALID_SIZE,
        Error::NoMem => SHMBUS_ERR_NO_MEM,
        Error::NoSharedMem => SHMBUS_ERR_NO_SHARED_MEM,
        Error::HostStarted => SHMBUS_ERR_HOST_STARTED,
        Error::NoQueues => SHMBUS_ERR_NO_QUEUES,
        Error::QueueFull => SHMBUS_ERR_QUEUE_FULL,
    }
}

/// Opaque host handle. The mapped buffer must stay valid until
/// `shmbus_host_free`.
pub struct HostHandle {
    inner: Host<'static>,
    queues: Vec<Queue>,
}

/// Opaque payload handle.
pub struct PayloadHandle {
    inner: Payload,
}

/// Initialize a host session over a caller-mapped buffer.
///
/// # Arguments
/// * `mem` - Base of the writable mapped region.
/// * `size` - Region size in bytes.
/// * `out_host` - Receives the handle on success, NULL on failure.
///
/// # Returns
/// * 0 on success, negative status code otherwise.
#[no_mangle]
pub extern "C" fn shmbus_host_init(
    mem: *mut u8,
    size: usize,
    out_host: *mut *mut HostHandle,
) -> i32 {
    if mem.is_null() || out_host.is_null() {
        return SHMBUS_ERR_NULL_POINTER;
    }
    unsafe { *out_host = ptr::null_mut() };

    let region = unsafe { SharedRegion::from_raw_parts(mem, size) };
    match Host::init(region) {
        Ok(host) => {
            let handle = Box::new(HostHandle {
                inner: host,
                queues: Vec::new(),
            });
            unsafe { *out_host = Box::into_raw(handle) };
            SHMBUS_OK
        }
        Err(e) => status_code(e),
    }
}

/// Free a host handle. Leaves the region bytes intact.
#[no_mangle]
pub extern "C" fn shmbus_host_free(host: *mut HostHandle) {
    if !host.is_null() {
        unsafe {
            let _ = Box::from_raw(host);
        }
    }
}

/// Register a queue before the host starts.
///
/// # Arguments
/// * `queue_id` - Application-chosen tag published to clients.
/// * `num_messages` - Effective ring capacity (one sentinel slot is added).
/// * `out_queue` - Receives the queue token to pass to `shmbus_host_post`.
#[no_mangle]
pub extern "C" fn shmbus_host_add_queue(
    host: *mut HostHandle,
    queue_id: u32,
    num_messages: u32,
    out_queue: *mut u32,
) -> i32 {
    if host.is_null() || out_queue.is_null() {
        return SHMBUS_ERR_NULL_POINTER;
    }
    let handle = unsafe { &mut *host };

    match handle.inner.add_queue(queue_id, num_messages) {
        Ok(queue) => {
            let token = handle.queues.len() as u32;
            handle.queues.push(queue);
            unsafe { *out_queue = token };
            SHMBUS_OK
        }
        Err(e) => status_code(e),
    }
}

/// Reserve payload bytes inside the region.
///
/// # Returns
/// * Pointer to a `PayloadHandle`, or NULL on failure.
#[no_mangle]
pub extern "C" fn shmbus_host_mem_alloc(host: *mut HostHandle, size: u32) -> *mut PayloadHandle {
    if host.is_null() {
        return ptr::null_mut();
    }
    let handle = unsafe { &mut *host };

    match handle.inner.mem_alloc(size) {
        Ok(payload) => Box::into_raw(Box::new(PayloadHandle { inner: payload })),
        Err(_) => ptr::null_mut(),
    }
}

/// Release a payload handle. The backing bytes stay reserved.
#[no_mangle]
pub extern "C" fn shmbus_host_mem_free(host: *mut HostHandle, payload: *mut PayloadHandle) {
    if host.is_null() || payload.is_null() {
        return;
    }
    let handle = unsafe { &mut *host };
    let boxed = unsafe { Box::from_raw(payload) };
    handle.inner.mem_free(boxed.inner);
}

/// Raw pointer to a payload's bytes inside the region.
#[no_mangle]
pub extern "C" fn shmbus_payload_ptr(payload: *const PayloadHandle) -> *mut u8 {
    if payload.is_null() {
        return ptr::null_mut();
    }
    unsafe { (*payload).inner.as_ptr() }
}

/// Publish a message.
///
/// # Returns
/// * 0 on success (including the no-subscriber no-op).
/// * `SHMBUS_ERR_QUEUE_FULL` when the ring is saturated; retry after
///   `shmbus_host_process`.
#[no_mangle]
pub extern "C" fn shmbus_host_post(
    host: *mut HostHandle,
    queue: u32,
    udata: u32,
    payload: *const PayloadHandle,
) -> i32 {
    if host.is_null() || payload.is_null() {
        return SHMBUS_ERR_NULL_POINTER;
    }
    let handle = unsafe { &mut *host };
    let payload = unsafe { &(*payload).inner };

    let token = match handle.queues.get(queue as usize) {
        Some(token) => *token,
        None => return SHMBUS_ERR_INVALID_ARG,
    };

    match handle.inner.post(token, udata, payload) {
        Ok(()) => SHMBUS_OK,
        Err(e) => status_code(e),
    }
}

/// Run one heartbeat / GC pass.
#[no_mangle]
pub extern "C" fn shmbus_host_process(host: *mut HostHandle) -> i32 {
    if host.is_null() {
        return SHMBUS_ERR_NULL_POINTER;
    }
    let handle = unsafe { &mut *host };
    match handle.inner.process() {
        Ok(()) => SHMBUS_OK,
        Err(e) => status_code(e),
    }
}

/// Session identifier of a live host.
#[no_mangle]
pub extern "C" fn shmbus_host_session_id(host: *const HostHandle) -> u32 {
    if host.is_null() {
        return 0;
    }
    unsafe { (*host).inner.session_id() }
}
