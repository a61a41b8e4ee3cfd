// Region access for the host. The buffer is mapped by an external party
// (hypervisor BAR, shm object); the host only borrows it. A Linux
// memfd-backed provider is included for demos and multi-process testing.

use std::marker::PhantomData;
use std::ptr::NonNull;

/// Non-owning view of the pre-mapped shared buffer.
///
/// The view borrows the mapping for `'a`; unmapping is the mapper's job.
/// Client processes write into the same bytes concurrently, so the host
/// never materialises a `&mut [u8]` over the region and goes through raw
/// pointers instead.
pub struct SharedRegion<'a> {
    ptr: NonNull<u8>,
    len: usize,
    _marker: PhantomData<&'a mut [u8]>,
}

impl<'a> SharedRegion<'a> {
    /// Borrow a region from an exclusively held byte buffer.
    pub fn from_slice(buf: &'a mut [u8]) -> SharedRegion<'a> {
        // A slice always has a non-null base pointer.
        let ptr = NonNull::new(buf.as_mut_ptr()).unwrap_or(NonNull::dangling());
        SharedRegion {
            ptr,
            len: buf.len(),
            _marker: PhantomData,
        }
    }

    /// Wrap an externally mapped buffer.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes for the
    /// lifetime of the returned view, and the mapping must be shared with
    /// clients only through the protocol's atomic fields.
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> SharedRegion<'a> {
        SharedRegion {
            ptr: NonNull::new_unchecked(ptr),
            len,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(target_os = "linux")]
pub use linux::MemfdRegion;

#[cfg(target_os = "linux")]
mod linux {
    use super::SharedRegion;
    use std::ffi::CString;
    use std::io;
    use std::os::unix::io::RawFd;
    use std::ptr::NonNull;

    /// Owning memfd-backed mapping, for processes that host a session over
    /// anonymous shared memory. The fd can be passed to clients over a unix
    /// socket or `/proc/self/fd/`.
    pub struct MemfdRegion {
        ptr: NonNull<u8>,
        size: usize,
        fd: RawFd,
    }

    unsafe impl Send for MemfdRegion {}

    impl MemfdRegion {
        pub fn create(size: usize, name: &str) -> io::Result<Self> {
            let c_name = CString::new(name)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "name contains NUL"))?;

            let fd = unsafe {
                libc::syscall(libc::SYS_memfd_create, c_name.as_ptr(), libc::MFD_CLOEXEC) as RawFd
            };
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }

            if unsafe { libc::ftruncate(fd, size as i64) } != 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(err);
            }

            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    fd,
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(err);
            }

            Ok(Self {
                ptr: NonNull::new(ptr.cast::<u8>())
                    .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?,
                size,
                fd,
            })
        }

        /// Borrow the mapping as a host region.
        pub fn region(&mut self) -> SharedRegion<'_> {
            unsafe { SharedRegion::from_raw_parts(self.ptr.as_ptr(), self.size) }
        }

        pub fn size(&self) -> usize {
            self.size
        }

        pub fn raw_fd(&self) -> RawFd {
            self.fd
        }
    }

    impl Drop for MemfdRegion {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.ptr.as_ptr().cast::<libc::c_void>(), self.size);
                libc::close(self.fd);
            }
        }
    }
}
