//! Heap-backed allocator
//!
//! Provides the process-wide allocator that forwards to the platform's system
//! heap. It is what [`default_allocator`](super::default_allocator) hands out
//! until something else is installed.

use core::alloc::{GlobalAlloc, Layout};
use std::alloc::System;

use super::{AllocError, AllocResult, Allocator, MAX_ALIGNMENT, natural_alignment};

/// Bytes reserved in front of every block to remember its total size.
///
/// One full [`MAX_ALIGNMENT`] unit, so the address handed to the caller keeps
/// the alignment of the block underneath.
const HEADER_SIZE: usize = MAX_ALIGNMENT;

const _: () = assert!(HEADER_SIZE >= size_of::<usize>());

/// Allocator over the system heap
///
/// The protocol only hands a size to `allocate`, while the system heap wants
/// the layout back on release, so every block carries a small header with its
/// total size in front of the address returned to the caller.
///
/// # Zero-sized requests
///
/// `allocate(0)` returns null without touching the heap, and `deallocate`
/// accepts that null as a no-op.
///
/// # Thread Safety
///
/// Safe for concurrent `allocate`/`deallocate` from any number of threads; the
/// system heap does its own locking.
#[derive(Debug)]
pub struct NewDeleteAllocator {
    // Non-zero-sized so the singleton has an address of its own.
    _anchor: u8,
}

static SINGLETON: NewDeleteAllocator = NewDeleteAllocator { _anchor: 0 };

impl NewDeleteAllocator {
    /// The process-wide instance.
    ///
    /// There is no other way to obtain a `NewDeleteAllocator`, so identity
    /// comparison between handles to it is always meaningful.
    #[inline]
    pub fn singleton() -> &'static Self {
        &SINGLETON
    }

    fn block_layout(size: usize) -> AllocResult<Layout> {
        let total = size
            .checked_add(HEADER_SIZE)
            .ok_or_else(|| AllocError::size_overflow("adding block header"))?;
        Layout::from_size_align(total, MAX_ALIGNMENT)
            .map_err(|_| AllocError::allocation_too_large(size, isize::MAX as usize - HEADER_SIZE))
    }
}

// SAFETY: blocks come from `System` with `MAX_ALIGNMENT` alignment and the
// caller's address is offset by exactly `HEADER_SIZE`, a multiple of it; the
// header keeps the layout needed to give the block back.
unsafe impl Allocator for NewDeleteAllocator {
    fn allocate(&self, size: usize) -> AllocResult<*mut u8> {
        if size == 0 {
            return Ok(core::ptr::null_mut());
        }

        let layout = Self::block_layout(size)?;

        // SAFETY: `layout` has a non-zero size (at least `HEADER_SIZE`).
        let base = unsafe { System.alloc(layout) };
        if base.is_null() {
            return Err(AllocError::allocation_failed(size, natural_alignment(size)));
        }

        // SAFETY:
        // - `base` is valid for `layout.size()` bytes and aligned to
        //   `MAX_ALIGNMENT`, which covers a `usize` write
        // - `HEADER_SIZE < layout.size()`, so the offset stays in bounds
        unsafe {
            base.cast::<usize>().write(layout.size());
            Ok(base.add(HEADER_SIZE))
        }
    }

    unsafe fn deallocate(&self, address: *mut u8) {
        if address.is_null() {
            return;
        }

        // SAFETY:
        // - `address` came from `allocate` above (caller contract), so the
        //   header sits `HEADER_SIZE` bytes in front of it
        // - the stored total was produced by a valid `Layout` with
        //   `MAX_ALIGNMENT` alignment
        unsafe {
            let base = address.sub(HEADER_SIZE);
            let total = base.cast::<usize>().read();
            System.dealloc(base, Layout::from_size_align_unchecked(total, MAX_ALIGNMENT));
        }
    }
}
