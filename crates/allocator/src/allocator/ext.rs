//! Object-level operations available on every allocator
//!
//! [`AllocatorExt`] is blanket-implemented for any `A: Allocator + ?Sized`,
//! `dyn Allocator` included, so the lifetime utilities read as methods on the
//! allocator that owns the object: `allocator.destroy_and_deallocate(p)`.

use core::ptr::NonNull;

use super::{AllocError, AllocResult, Allocator};
use crate::lifetime::{self, Destroy, ObjectPtr};
use crate::placement;

/// Extension methods for object construction and destruction
pub trait AllocatorExt: Allocator {
    /// Destroys the complete object behind `object` and deallocates its
    /// footprint on this allocator. Null is a no-op.
    ///
    /// # Safety
    ///
    /// See [`lifetime::destroy_and_deallocate`].
    unsafe fn destroy_and_deallocate<P>(&self, object: P)
    where
        P: ObjectPtr,
        P::Object: Destroy,
    {
        // SAFETY: forwarded caller contract.
        unsafe { lifetime::destroy_and_deallocate(self, object) }
    }

    /// Destroys `object`, assumed to be the complete object, and deallocates
    /// its address on this allocator. Null is a no-op.
    ///
    /// # Safety
    ///
    /// See [`lifetime::destroy_and_deallocate_raw`].
    unsafe fn destroy_and_deallocate_raw<P: ObjectPtr>(&self, object: P) {
        // SAFETY: forwarded caller contract.
        unsafe { lifetime::destroy_and_deallocate_raw(self, object) }
    }

    /// Moves `value` into a fresh footprint from this allocator.
    fn new_object<T>(&self, value: T) -> AllocResult<NonNull<T>> {
        placement::new_object_with(self, || value)
    }

    /// Constructs a `T` in a fresh footprint from this allocator.
    ///
    /// If `construct` panics the footprint is released before the panic
    /// continues.
    fn new_object_with<T, F>(&self, construct: F) -> AllocResult<NonNull<T>>
    where
        F: FnOnce() -> T,
    {
        placement::new_object_with(self, construct)
    }

    /// Fallible construction in a fresh footprint from this allocator.
    ///
    /// If `construct` fails the footprint is released and its error is
    /// returned unchanged.
    fn try_new_object_with<T, E, F>(&self, construct: F) -> Result<NonNull<T>, E>
    where
        E: From<AllocError>,
        F: FnOnce() -> Result<T, E>,
    {
        placement::try_new_object_with(self, construct)
    }
}

impl<A: Allocator + ?Sized> AllocatorExt for A {}
