//! Native Buffers
//!
//! Fixed-size, zero-filled raw memory handed to native functions that write
//! into caller-provided storage (`read`, `fgets`, `snprintf`, ...).

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

use super::error::{BridgeError, Result};
use super::types::Pointer;

/// An owned block of raw memory.
///
/// The storage is allocated once and never resized. Native code writes through
/// the raw address while the buffer is mutably borrowed by a call, so no byte
/// view can outlive the call's start:
///
/// ```compile_fail
/// use native_bridge::ffi::{open_system_c_library, Arg, NativeBuffer};
///
/// let libc = open_system_c_library().unwrap();
/// let mut fds = NativeBuffer::new(8).unwrap();
/// let view = fds.as_bytes();
/// libc.function("pipe").unwrap().invoke(&[Arg::Buffer(&mut fds)]).unwrap();
/// assert_eq!(view[0], 0);
/// ```
pub struct NativeBuffer {
    /// Pointer to the storage
    ptr: NonNull<u8>,
    /// Size of the storage in bytes
    size: usize,
}

impl NativeBuffer {
    /// Allocate `size` zero-filled bytes
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(BridgeError::Allocation {
                size,
                reason: "buffer size must be positive".to_string(),
            });
        }

        let layout = Layout::array::<u8>(size).map_err(|e| BridgeError::Allocation {
            size,
            reason: e.to_string(),
        })?;

        // Safety: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| BridgeError::Allocation {
            size,
            reason: "allocator returned null".to_string(),
        })?;

        Ok(Self { ptr, size })
    }

    /// Size of the buffer in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Raw storage address
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Raw storage address as it is passed to native code
    pub fn pointer(&self) -> Pointer {
        Pointer::from(self.ptr.as_ptr())
    }

    pub fn as_bytes(&self) -> &[u8] {
        // Safety: ptr is valid for size initialized bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // Safety: as above, and &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }

    /// Copy `data` into the buffer at `offset`
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let range = self.checked_range(offset, data.len())?;
        self.as_bytes_mut()[range].copy_from_slice(data);
        Ok(())
    }

    /// Zero the whole buffer
    pub fn clear(&mut self) {
        self.as_bytes_mut().fill(0);
    }

    /// Decode `length` bytes starting at `start` as text.
    ///
    /// A missing or zero `length` means the buffer's full size, so a non-zero
    /// `start` without a length is out of range. Bytes that are not valid UTF-8
    /// are replaced rather than rejected.
    pub fn decode_text(&self, start: usize, length: Option<usize>) -> Result<String> {
        let length = match length {
            Some(len) if len > 0 => len,
            _ => self.size,
        };
        let range = self.checked_range(start, length)?;
        Ok(String::from_utf8_lossy(&self.as_bytes()[range]).into_owned())
    }

    /// Decode the whole buffer as text
    pub fn as_string(&self) -> Result<String> {
        self.decode_text(0, None)
    }

    fn checked_range(&self, start: usize, length: usize) -> Result<std::ops::Range<usize>> {
        match start.checked_add(length) {
            Some(end) if end <= self.size => Ok(start..end),
            _ => Err(BridgeError::Range {
                start,
                length,
                size: self.size,
            }),
        }
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        // Safety: the layout matches the one used in `new`, which already validated it.
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.size, 1);
            alloc::dealloc(self.ptr.as_ptr(), layout);
        }
    }
}

impl fmt::Debug for NativeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBuffer")
            .field("ptr", &self.pointer())
            .field("size", &self.size)
            .finish()
    }
}

// Safety: NativeBuffer exclusively owns its allocation
unsafe impl Send for NativeBuffer {}
