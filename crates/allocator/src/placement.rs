//! Placement construction helpers
//!
//! Constructing an object in allocator-supplied storage is a transaction:
//!
//! 1. acquire a footprint ([`new_at`])
//! 2. construct the object inside a [`FootprintGuard`]
//! 3. on success, [`release`](FootprintGuard::release) the guard and hand the
//!    object to the caller; on failure (panic or `Err`) the guard gives the
//!    footprint back ([`delete_at`]) and the failure reaches the caller
//!    unchanged
//!
//! There is no state between calls.

use core::ptr::NonNull;

use crate::allocator::{AllocError, AllocResult, Allocator, MAX_ALIGNMENT};

/// Acquires `size` bytes for placement construction.
///
/// Exactly `allocator.allocate(size)`.
#[inline]
pub fn new_at<A: Allocator + ?Sized>(allocator: &A, size: usize) -> AllocResult<*mut u8> {
    allocator.allocate(size)
}

/// Releases a footprint acquired with [`new_at`].
///
/// Exactly `allocator.deallocate(address)`.
///
/// # Safety
///
/// Same as [`Allocator::deallocate`].
#[inline]
pub unsafe fn delete_at<A: Allocator + ?Sized>(allocator: &A, address: *mut u8) {
    // SAFETY: forwarded caller contract.
    unsafe { allocator.deallocate(address) }
}

/// RAII guard over a freshly acquired footprint
///
/// Gives the footprint back to its allocator when dropped, including during
/// unwinding, unless [`release`](Self::release) transferred ownership first.
///
/// # Example
///
/// ```
/// use nebula_allocator::allocator::TestAllocator;
/// use nebula_allocator::placement::FootprintGuard;
///
/// let allocator = TestAllocator::new();
/// {
///     let guard = FootprintGuard::acquire(&allocator, 32)?;
///     assert!(!guard.address().is_null());
///     // Dropped without release: the block goes back.
/// }
/// assert_eq!(allocator.num_blocks_in_use(), 0);
/// # Ok::<(), nebula_allocator::MemoryError>(())
/// ```
#[must_use = "dropping the guard immediately releases the footprint"]
pub struct FootprintGuard<'a, A: Allocator + ?Sized> {
    allocator: &'a A,
    address: *mut u8,
    active: bool,
}

impl<'a, A: Allocator + ?Sized> FootprintGuard<'a, A> {
    /// Acquires `size` bytes from `allocator`.
    pub fn acquire(allocator: &'a A, size: usize) -> AllocResult<Self> {
        let address = new_at(allocator, size)?;
        Ok(Self {
            allocator,
            address,
            active: true,
        })
    }

    /// Start of the footprint.
    #[inline]
    pub fn address(&self) -> *mut u8 {
        self.address
    }

    /// Hands the footprint to the caller; the guard no longer releases it.
    #[inline]
    pub fn release(mut self) -> *mut u8 {
        self.active = false;
        self.address
    }
}

impl<A: Allocator + ?Sized> Drop for FootprintGuard<'_, A> {
    fn drop(&mut self) {
        if self.active {
            // SAFETY: the footprint came from `new_at` on this allocator and
            // ownership was never handed out.
            unsafe { delete_at(self.allocator, self.address) };
        }
    }
}

impl<A: Allocator + ?Sized> core::fmt::Debug for FootprintGuard<'_, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FootprintGuard")
            .field("address", &self.address)
            .field("active", &self.active)
            .finish()
    }
}

/// Bytes requested for an object of type `T`.
///
/// Never zero, so every object gets a distinct non-null block.
///
/// # Errors
///
/// [`AllocError::InvalidAlignment`] for types aligned beyond
/// [`MAX_ALIGNMENT`].
pub fn object_footprint<T>() -> AllocResult<usize> {
    let align = align_of::<T>();
    if align > MAX_ALIGNMENT {
        return Err(AllocError::invalid_alignment(align));
    }
    Ok(size_of::<T>().max(align))
}

/// Constructs a `T` from `construct` in a footprint from `allocator`.
///
/// The footprint is acquired before `construct` runs. If `construct` panics,
/// the footprint is released and the panic continues with its payload
/// untouched.
pub fn new_object_with<A, T, F>(allocator: &A, construct: F) -> AllocResult<NonNull<T>>
where
    A: Allocator + ?Sized,
    F: FnOnce() -> T,
{
    let guard = FootprintGuard::acquire(allocator, object_footprint::<T>()?)?;
    let address = object_address::<T, A>(&guard)?;

    let value = construct();

    // SAFETY: `address` is non-null, aligned for `T` (checked above) and
    // valid for `size_of::<T>()` bytes.
    unsafe { address.as_ptr().write(value) };
    guard.release();
    Ok(address)
}

/// Fallible counterpart of [`new_object_with`].
///
/// On `Err` the footprint is released and the error is returned as is.
pub fn try_new_object_with<A, T, E, F>(allocator: &A, construct: F) -> Result<NonNull<T>, E>
where
    A: Allocator + ?Sized,
    E: From<AllocError>,
    F: FnOnce() -> Result<T, E>,
{
    let guard = FootprintGuard::acquire(allocator, object_footprint::<T>()?)?;
    let address = object_address::<T, A>(&guard)?;

    let value = construct()?;

    // SAFETY: as in `new_object_with`.
    unsafe { address.as_ptr().write(value) };
    guard.release();
    Ok(address)
}

fn object_address<T, A>(guard: &FootprintGuard<'_, A>) -> AllocResult<NonNull<T>>
where
    A: Allocator + ?Sized,
{
    let address = NonNull::new(guard.address().cast::<T>()).ok_or_else(|| {
        AllocError::invalid_state("allocator returned null for an object footprint")
    })?;
    debug_assert!(
        address.as_ptr().is_aligned(),
        "allocator returned a misaligned footprint"
    );
    Ok(address)
}
