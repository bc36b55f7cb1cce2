//! Memory Map Provider.
//!
//! Requests and releases the fixed-size anonymous spans that back allocator
//! blocks, and gives the rest of the engine bounds-checked access to their
//! bytes. This is the only module of the crate allowed to use `unsafe`.

use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use thiserror::Error;

// ---------------------------------------------------------------------------
// Mapping parameters
// ---------------------------------------------------------------------------

/// Protection used for every block: pages can be read and written.
pub const BLOCK_PROT: i32 = libc::PROT_READ | libc::PROT_WRITE;

/// Mapping flags used for every block: private, not backed by any file.
pub const BLOCK_FLAGS: i32 = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

/// Failure reported by the OS mapping layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MapError {
    /// `mmap` rejects zero-length mappings; caught before the call.
    #[error("cannot map a zero-length span")]
    ZeroLength,
    /// `mmap` returned `MAP_FAILED`.
    #[error("mmap of {len} bytes failed (errno {errno})")]
    Map { len: usize, errno: i32 },
    /// `munmap` returned an error.
    #[error("munmap of {len} bytes at {addr:#x} failed (errno {errno})")]
    Unmap { addr: usize, len: usize, errno: i32 },
}

impl MapError {
    /// The OS errno carried by this failure.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::ZeroLength => libc::EINVAL,
            Self::Map { errno, .. } | Self::Unmap { errno, .. } => *errno,
        }
    }
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::ENOMEM)
}

// ---------------------------------------------------------------------------
// MappedSpan
// ---------------------------------------------------------------------------

/// An anonymous read-write mapping owned exclusively by its holder.
///
/// Dropping the span unmaps it. [`release_block`] does the same but reports
/// `munmap` failures.
#[derive(Debug)]
pub struct MappedSpan {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the span is the sole owner of its mapping and hands out borrows
// only through `&self`/`&mut self`, so moving it across threads is sound.
unsafe impl Send for MappedSpan {}

impl MappedSpan {
    /// Length of the mapping in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always false: zero-length spans are never created.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Address of the first byte of the mapping.
    #[must_use]
    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Returns true if `addr` falls inside the mapping.
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        let base = self.base_addr();
        addr >= base && addr - base < self.len
    }

    /// Pointer to the byte at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` lies past the end of the mapping.
    #[must_use]
    pub fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        assert!(offset <= self.len, "offset {offset} outside span of {}", self.len);
        // SAFETY: offset is within (or one past) the mapping, so the result is
        // in bounds of the same allocation and non-null.
        unsafe { self.base.add(offset) }
    }

    /// Borrows `len` bytes starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range is not inside the mapping.
    #[must_use]
    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        self.check_range(offset, len);
        // SAFETY: the range was bounds-checked against a live mapping that is
        // readable and zero-initialised by the kernel; the borrow is tied to
        // `&self`.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(offset), len) }
    }

    /// Mutably borrows `len` bytes starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range is not inside the mapping.
    #[must_use]
    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        self.check_range(offset, len);
        // SAFETY: bounds-checked as above; `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr().add(offset), len) }
    }

    /// Reads a native-endian word at `offset` (no alignment requirement).
    #[must_use]
    pub fn read_word(&self, offset: usize) -> usize {
        let mut raw = [0u8; size_of::<usize>()];
        raw.copy_from_slice(self.bytes(offset, size_of::<usize>()));
        usize::from_ne_bytes(raw)
    }

    /// Writes a native-endian word at `offset` (no alignment requirement).
    pub fn write_word(&mut self, offset: usize, value: usize) {
        self.bytes_mut(offset, size_of::<usize>())
            .copy_from_slice(&value.to_ne_bytes());
    }

    /// Reads a native-endian `u32` at `offset`.
    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.bytes(offset, 4));
        u32::from_ne_bytes(raw)
    }

    /// Writes a native-endian `u32` at `offset`.
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.bytes_mut(offset, 4).copy_from_slice(&value.to_ne_bytes());
    }

    /// Sets `len` bytes starting at `offset` to `byte`.
    pub fn fill(&mut self, offset: usize, len: usize, byte: u8) {
        self.bytes_mut(offset, len).fill(byte);
    }

    fn check_range(&self, offset: usize, len: usize) {
        let in_bounds = offset
            .checked_add(len)
            .is_some_and(|end| end <= self.len);
        assert!(
            in_bounds,
            "range {offset}+{len} outside span of {} bytes",
            self.len
        );
    }
}

impl Drop for MappedSpan {
    fn drop(&mut self) {
        // SAFETY: base/len describe the live mapping this span owns; it is
        // never touched again after drop.
        let _ = unsafe { unmap(self.base, self.len) };
    }
}

// ---------------------------------------------------------------------------
// request / release
// ---------------------------------------------------------------------------

/// Maps exactly `len` bytes of anonymous, private, read-write memory.
///
/// Failures are returned, never retried.
pub fn request_block(len: usize) -> Result<MappedSpan, MapError> {
    if len == 0 {
        return Err(MapError::ZeroLength);
    }
    // SAFETY: an anonymous private mapping with a null address hint does not
    // alias any existing memory.
    let raw = unsafe { libc::mmap(ptr::null_mut(), len, BLOCK_PROT, BLOCK_FLAGS, -1, 0) };
    if raw == libc::MAP_FAILED {
        return Err(MapError::Map {
            len,
            errno: last_errno(),
        });
    }
    let base = NonNull::new(raw.cast::<u8>()).ok_or(MapError::Map {
        len,
        errno: libc::ENOMEM,
    })?;
    Ok(MappedSpan { base, len })
}

/// Unmaps a span, reporting `munmap` failures.
pub fn release_block(span: MappedSpan) -> Result<(), MapError> {
    let span = ManuallyDrop::new(span);
    // SAFETY: the span is consumed here and its Drop is suppressed, so the
    // mapping is unmapped exactly once.
    unsafe { unmap(span.base, span.len) }
}

/// # Safety
///
/// `base`/`len` must describe a live mapping that nothing will access again.
unsafe fn unmap(base: NonNull<u8>, len: usize) -> Result<(), MapError> {
    // SAFETY: guaranteed by the caller.
    let rc = unsafe { libc::munmap(base.as_ptr().cast(), len) };
    if rc == 0 {
        Ok(())
    } else {
        Err(MapError::Unmap {
            addr: base.as_ptr() as usize,
            len,
            errno: last_errno(),
        })
    }
}
