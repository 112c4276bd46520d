//! Owning pointer to an allocator-owned object
//!
//! [`ManagedPtr`] pairs an object with the allocator that produced its
//! footprint and calls [`destroy_and_deallocate`] on drop. The borrow of the
//! allocator keeps the allocator alive for as long as the object.

use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

use crate::allocator::{AllocResult, Allocator, AllocatorExt};
use crate::lifetime::{Destroy, destroy_and_deallocate};

/// Owning handle to an object living in an allocator's footprint
///
/// May point at a part of a larger object (see [`cast_view`](Self::cast_view));
/// dropping it still destroys and deallocates the complete object.
///
/// ```
/// use nebula_allocator::allocator::TestAllocator;
/// use nebula_allocator::managed::ManagedPtr;
///
/// let allocator = TestAllocator::new();
/// {
///     let mut name = ManagedPtr::new_in(String::from("nebula"), &allocator)?;
///     name.push_str("-allocator");
///     assert_eq!(&*name, "nebula-allocator");
///     assert_eq!(allocator.num_blocks_in_use(), 1);
/// }
/// assert_eq!(allocator.num_blocks_in_use(), 0);
/// # Ok::<(), nebula_allocator::MemoryError>(())
/// ```
pub struct ManagedPtr<'a, T: ?Sized + Destroy> {
    object: NonNull<T>,
    allocator: &'a dyn Allocator,
    _owns: PhantomData<T>,
}

impl<'a, T: Destroy> ManagedPtr<'a, T> {
    /// Moves `value` into a footprint from `allocator`.
    pub fn new_in(value: T, allocator: &'a dyn Allocator) -> AllocResult<Self> {
        let object = allocator.new_object(value)?;
        Ok(Self {
            object,
            allocator,
            _owns: PhantomData,
        })
    }

    /// Replaces the object with `value`, placed in the same allocator.
    ///
    /// The new object is placed before the old one is destroyed; on
    /// allocation failure `value` is dropped and the handle still owns the
    /// old object.
    pub fn reset(&mut self, value: T) -> AllocResult<()> {
        let object = self.allocator.new_object(value)?;
        let old = core::mem::replace(&mut self.object, object);
        // SAFETY: the handle owned `old`, a live object from `self.allocator`.
        unsafe { destroy_and_deallocate(self.allocator, old) };
        Ok(())
    }
}

impl<'a, T: ?Sized + Destroy> ManagedPtr<'a, T> {
    /// Takes ownership of an object already placed in `allocator`'s memory.
    ///
    /// # Safety
    ///
    /// `object` must be live, owned by nobody else, and satisfy the
    /// preconditions of [`destroy_and_deallocate`] for `allocator`.
    pub unsafe fn from_raw(object: NonNull<T>, allocator: &'a dyn Allocator) -> Self {
        Self {
            object,
            allocator,
            _owns: PhantomData,
        }
    }

    /// Gives up ownership without destroying anything.
    pub fn into_raw(self) -> (NonNull<T>, &'a dyn Allocator) {
        let this = ManuallyDrop::new(self);
        (this.object, this.allocator)
    }

    /// Exchanges objects, and the allocators that own them, with `other`.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// The allocator that owns the footprint.
    pub fn allocator(&self) -> &'a dyn Allocator {
        self.allocator
    }

    pub fn as_ptr(&self) -> *const T {
        self.object.as_ptr()
    }

    /// Re-targets the handle at another view of the same object: a trait
    /// object, or a part whose `Destroy` impl recovers the complete object.
    ///
    /// # Safety
    ///
    /// `view` must return a pointer into the same complete object for which
    /// [`destroy_and_deallocate`] recovers that complete object.
    pub unsafe fn cast_view<U, F>(self, view: F) -> ManagedPtr<'a, U>
    where
        U: ?Sized + Destroy,
        F: FnOnce(NonNull<T>) -> NonNull<U>,
    {
        let (object, allocator) = self.into_raw();
        ManagedPtr {
            object: view(object),
            allocator,
            _owns: PhantomData,
        }
    }
}

impl<T: ?Sized + Destroy> Deref for ManagedPtr<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the object is live while the handle owns it.
        unsafe { self.object.as_ref() }
    }
}

impl<T: ?Sized + Destroy> DerefMut for ManagedPtr<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the handle owns the object exclusively.
        unsafe { self.object.as_mut() }
    }
}

impl<T: ?Sized + Destroy> Drop for ManagedPtr<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the handle owns a live object from `self.allocator`.
        unsafe { destroy_and_deallocate(self.allocator, self.object) };
    }
}

impl<T: ?Sized + Destroy + fmt::Debug> fmt::Debug for ManagedPtr<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ManagedPtr").field(&&**self).finish()
    }
}
