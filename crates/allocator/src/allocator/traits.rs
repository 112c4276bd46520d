//! The polymorphic allocator protocol
//!
//! [`Allocator`] is a capability with exactly two required operations:
//! - `allocate(size)`: hand out at least `size` bytes, aligned for any object
//!   of that size
//! - `deallocate(address)`: give a block back to the instance that produced it
//!
//! Everything else in the crate (object lifetime utilities, placement
//! helpers, allocator-aware containers) talks to memory through
//! `&dyn Allocator` and never assumes a concrete implementation.
//!
//! A memory-resource layer with explicit size and alignment is provided on
//! top of the two core operations as default methods, so a minimal
//! implementation only supplies `allocate` and `deallocate`.
//!
//! # Safety
//!
//! `Allocator` is an `unsafe trait`. Implementors promise that:
//! - A non-null pointer returned from `allocate(size)` is valid for reads and
//!   writes of `size` bytes and aligned to at least
//!   [`natural_alignment(size)`](natural_alignment)
//! - The block stays valid until it is passed to `deallocate` on the same
//!   instance
//! - `deallocate(null)` does nothing
//!
//! Blanket impls for `&A`, `Box<A>` and `Arc<A>` forward every call, so they
//! inherit the contract of the underlying allocator unchanged.

use std::sync::Arc;

use crate::error::{AllocError, AllocResult};

/// Strictest alignment any [`Allocator`] has to honor.
///
/// Matches the fundamental alignment of the platform's heap: every scalar and
/// SIMD-free aggregate fits inside it.
pub const MAX_ALIGNMENT: usize = 16;

/// Alignment an allocator must provide for a block of `size` bytes.
///
/// This is the largest power of two that divides `size`, capped at
/// [`MAX_ALIGNMENT`]. An object of `size` bytes can never need more, since
/// Rust sizes are always a multiple of the type's alignment.
///
/// # Examples
///
/// ```
/// use nebula_allocator::allocator::natural_alignment;
///
/// assert_eq!(natural_alignment(1), 1);
/// assert_eq!(natural_alignment(6), 2);
/// assert_eq!(natural_alignment(24), 8);
/// assert_eq!(natural_alignment(4096), 16);
/// ```
#[inline]
pub const fn natural_alignment(size: usize) -> usize {
    if size == 0 {
        return MAX_ALIGNMENT;
    }
    let lowest_bit = size & size.wrapping_neg();
    if lowest_bit > MAX_ALIGNMENT {
        MAX_ALIGNMENT
    } else {
        lowest_bit
    }
}

/// Polymorphic allocator capability
///
/// Implementations own whatever backing store they manage (heap, arena,
/// instrumentation) and decide their own thread-safety; the trait adds none.
/// Identity matters: two allocators are the same only if they are the same
/// instance, unless an implementation overrides [`is_equal`](Self::is_equal).
///
/// # Zero-sized requests
///
/// `allocate(0)` is always permitted. Each implementation documents whether it
/// returns null or a sentinel, and every such call counts as an allocation
/// event for instrumentation. Whatever it returns may be passed back to
/// `deallocate`.
///
/// # Safety
///
/// See the [module documentation](self).
pub unsafe trait Allocator {
    /// Returns at least `size` bytes of uninitialized memory.
    ///
    /// # Errors
    ///
    /// Fails with [`AllocError::AllocationFailed`] (or an
    /// implementation-specific exhaustion variant) when the request cannot be
    /// satisfied. The same kind of request always fails the same way.
    fn allocate(&self, size: usize) -> AllocResult<*mut u8>;

    /// Returns a block to this allocator.
    ///
    /// Passing null is a no-op.
    ///
    /// # Safety
    ///
    /// - `address` is null or was returned by `allocate` on this same instance
    /// - `address` has not already been deallocated
    /// - Nothing reads or writes the block afterwards
    unsafe fn deallocate(&self, address: *mut u8);

    /// Memory-resource entry point: `bytes` bytes aligned to `align`.
    ///
    /// The request is rounded up to a multiple of `align` and forwarded to
    /// [`allocate`](Self::allocate), which yields the alignment through
    /// [`natural_alignment`].
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidAlignment`] if `align` is not a power of two or
    ///   exceeds [`MAX_ALIGNMENT`]
    /// - [`AllocError::SizeOverflow`] if rounding overflows
    /// - whatever `allocate` reports
    fn allocate_bytes(&self, bytes: usize, align: usize) -> AllocResult<*mut u8> {
        if !align.is_power_of_two() || align > MAX_ALIGNMENT {
            return Err(AllocError::invalid_alignment(align));
        }
        let rounded = bytes
            .checked_next_multiple_of(align)
            .ok_or_else(|| AllocError::size_overflow("rounding request to alignment"))?;
        self.allocate(rounded)
    }

    /// Memory-resource counterpart of [`allocate_bytes`](Self::allocate_bytes).
    ///
    /// # Safety
    ///
    /// Same as [`deallocate`](Self::deallocate); `bytes` and `align` are
    /// advisory and must describe the original request.
    unsafe fn deallocate_bytes(&self, address: *mut u8, bytes: usize, align: usize) {
        debug_assert!(align.is_power_of_two(), "alignment must be a power of two");
        let _ = bytes;
        // SAFETY: forwarded caller contract.
        unsafe { self.deallocate(address) }
    }

    /// Whether memory from `self` may be released through `other`.
    ///
    /// Defaults to instance identity, comparing
    /// [`instance_address`](Self::instance_address) on both sides.
    fn is_equal(&self, other: &dyn Allocator) -> bool {
        core::ptr::eq(self.instance_address(), other.instance_address())
    }

    /// Address of the allocator instance that does the work.
    ///
    /// Handles that forward to another allocator (`&A`, `Box<A>`, `Arc<A>`)
    /// report the address of the target, so a handle and its target compare
    /// equal whichever side the comparison starts from.
    #[inline]
    fn instance_address(&self) -> *const () {
        (self as *const Self).cast()
    }
}

/// Identity comparison of two allocator handles.
#[inline]
pub fn same_allocator(a: &dyn Allocator, b: &dyn Allocator) -> bool {
    a.is_equal(b)
}

// ============================================================================
// Blanket implementations
// ============================================================================

// SAFETY: every method forwards to `A`, which upholds the contract.
unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    fn allocate(&self, size: usize) -> AllocResult<*mut u8> {
        (**self).allocate(size)
    }

    #[inline]
    unsafe fn deallocate(&self, address: *mut u8) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).deallocate(address) }
    }

    #[inline]
    fn instance_address(&self) -> *const () {
        (**self).instance_address()
    }
}

// SAFETY: every method forwards to `A`, which upholds the contract.
unsafe impl<A: Allocator + ?Sized> Allocator for Box<A> {
    #[inline]
    fn allocate(&self, size: usize) -> AllocResult<*mut u8> {
        (**self).allocate(size)
    }

    #[inline]
    unsafe fn deallocate(&self, address: *mut u8) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).deallocate(address) }
    }

    #[inline]
    fn instance_address(&self) -> *const () {
        (**self).instance_address()
    }
}

// SAFETY: every method forwards to `A`, which upholds the contract.
unsafe impl<A: Allocator + ?Sized> Allocator for Arc<A> {
    #[inline]
    fn allocate(&self, size: usize) -> AllocResult<*mut u8> {
        (**self).allocate(size)
    }

    #[inline]
    unsafe fn deallocate(&self, address: *mut u8) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).deallocate(address) }
    }

    #[inline]
    fn instance_address(&self) -> *const () {
        (**self).instance_address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{NewDeleteAllocator, TestAllocator};
    use rstest::rstest;

    #[rstest]
    #[case(0, MAX_ALIGNMENT)]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 1)]
    #[case(12, 4)]
    #[case(16, 16)]
    #[case(48, 16)]
    #[case(usize::MAX, 1)]
    fn natural_alignment_cases(#[case] size: usize, #[case] expected: usize) {
        assert_eq!(natural_alignment(size), expected);
    }

    #[test]
    fn identity_is_by_instance() {
        let a = TestAllocator::new();
        let b = TestAllocator::new();
        assert!(same_allocator(&a, &a));
        assert!(!same_allocator(&a, &b));

        let by_ref = &a;
        assert!(by_ref.is_equal(&a));
        assert!(a.is_equal(by_ref));
    }

    #[test]
    fn boxed_allocator_forwards_identity() {
        let boxed: Box<dyn Allocator> = Box::new(TestAllocator::new());
        assert!(boxed.is_equal(&*boxed));
        assert!(!boxed.is_equal(NewDeleteAllocator::singleton()));
    }

    #[test]
    fn handle_and_target_compare_equal_both_ways() {
        let shared = Arc::new(TestAllocator::new());
        let target: &dyn Allocator = &*shared;
        let handle: &dyn Allocator = &shared;

        assert!(handle.is_equal(target));
        assert!(target.is_equal(handle));
        assert!(same_allocator(target, handle));

        let by_ref = &*shared;
        let nested: &dyn Allocator = &by_ref;
        assert!(same_allocator(target, nested));
        assert!(same_allocator(nested, handle));

        let boxed = Box::new(TestAllocator::new());
        let boxed_handle: &dyn Allocator = &boxed;
        assert!(same_allocator(&*boxed, boxed_handle));
        assert!(!same_allocator(boxed_handle, handle));
    }

    #[test]
    fn allocate_bytes_rounds_to_alignment() {
        let allocator = TestAllocator::new();
        let address = allocator.allocate_bytes(10, 8).unwrap();
        assert_eq!(allocator.last_allocated_size(), 16);
        assert_eq!(address as usize % 8, 0);
        unsafe { allocator.deallocate_bytes(address, 10, 8) };
        assert_eq!(allocator.num_blocks_in_use(), 0);
    }

    #[rstest]
    #[case(3)]
    #[case(32)]
    #[case(0)]
    fn allocate_bytes_rejects_bad_alignment(#[case] align: usize) {
        let allocator = TestAllocator::new();
        let error = allocator.allocate_bytes(8, align).unwrap_err();
        assert!(error.is_invalid_alignment());
        assert_eq!(allocator.num_allocations(), 0);
    }

    #[test]
    fn allocate_bytes_reports_overflow() {
        let allocator = TestAllocator::new();
        let error = allocator.allocate_bytes(usize::MAX, 16).unwrap_err();
        assert_eq!(error.code(), "MEM:ALLOC:OVERFLOW");
    }
}
