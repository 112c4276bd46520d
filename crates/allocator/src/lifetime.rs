//! Object lifetime utilities
//!
//! Destroying an allocator-owned object is one logical operation: run the
//! destructor of the *complete* object, then hand the *complete* object's
//! footprint back to the allocator. The pointer the caller holds may not be
//! the complete object:
//!
//! - a `*const dyn Trait` already points at the concrete value, and its vtable
//!   supplies the right drop glue
//! - a pointer to a part embedded in a larger object (a field at some offset)
//!   does not; the part itself records which object encloses it (a
//!   [`PartOf`] link filled in by the enclosing constructor) and reports it
//!   through [`Destroy::most_derived`]
//!
//! The link belongs to the object, not to its type: the same part type can
//! be allocated on its own, embedded in one container, or embedded in a part
//! of another container. Recovery follows the links outwards until an object
//! reports no enclosing object.
//!
//! [`destroy_and_deallocate`] performs that recovery; [`destroy_and_deallocate_raw`]
//! trusts the caller that the pointer already is the complete object.
//!
//! # Safety
//!
//! Both operations take raw pointers and are `unsafe`:
//! - the object must be live, and must not be used afterwards
//! - its footprint must have come from the allocator passed in
//! - the complete object must start exactly at the footprint address
//!
//! These are preconditions, never reported errors. Under a
//! [`TestAllocator`](crate::allocator::TestAllocator) a wrong address shows up
//! as a mismatched deallocation.

use core::ptr::{self, NonNull};

use crate::allocator::Allocator;

// ============================================================================
// Complete objects
// ============================================================================

/// The object directly enclosing a part: the part's byte offset inside it,
/// how to destroy it, and how to ask it for its own enclosing object.
///
/// Built with [`CompleteObject::enclosing`], usually through
/// [`part_of!`](crate::part_of).
#[derive(Clone, Copy)]
pub struct CompleteObject {
    offset: usize,
    drop_glue: unsafe fn(*mut u8),
    enclosing: unsafe fn(*const u8) -> Option<CompleteObject>,
}

impl CompleteObject {
    /// A `C` whose part lives `offset` bytes from its start.
    #[inline]
    pub const fn enclosing<C: Destroy>(offset: usize) -> Self {
        Self {
            offset,
            drop_glue: drop_erased::<C>,
            enclosing: most_derived_erased::<C>,
        }
    }

    /// Byte distance from the start of the enclosing object to the part.
    #[inline]
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

impl core::fmt::Debug for CompleteObject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompleteObject")
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

/// # Safety
///
/// `object` points to a live `C` that is not used afterwards.
unsafe fn drop_erased<C>(object: *mut u8) {
    // SAFETY: caller contract.
    unsafe { ptr::drop_in_place(object.cast::<C>()) }
}

/// # Safety
///
/// `object` points to a live `C`.
unsafe fn most_derived_erased<C: Destroy>(object: *const u8) -> Option<CompleteObject> {
    // SAFETY: caller contract.
    unsafe { &*object.cast::<C>() }.most_derived()
}

/// Link from a part to the object that encloses it
///
/// A field of a part type, standalone by default. The enclosing object's
/// constructor sets it with [`part_of!`](crate::part_of) once the part is in
/// place; the part's [`Destroy::most_derived`] returns
/// [`complete_object`](Self::complete_object).
///
/// Cloning yields a standalone link: a copy of a part is a new object that
/// nothing encloses yet.
///
/// ```
/// use nebula_allocator::lifetime::{CompleteObject, Destroy, PartOf};
/// use nebula_allocator::part_of;
///
/// struct Header {
///     id: u32,
///     link: PartOf,
/// }
///
/// unsafe impl Destroy for Header {
///     fn most_derived(&self) -> Option<CompleteObject> {
///         self.link.complete_object()
///     }
/// }
///
/// struct Message {
///     body: String,
///     header: Header,
/// }
///
/// nebula_allocator::impl_destroy!(Message);
///
/// impl Message {
///     fn new(id: u32, body: String) -> Self {
///         let mut message = Self {
///             body,
///             header: Header { id, link: PartOf::standalone() },
///         };
///         message.header.link = part_of!(Message, header);
///         message
///     }
/// }
///
/// let standalone = Header { id: 1, link: PartOf::standalone() };
/// assert!(standalone.most_derived().is_none());
/// assert!(Message::new(2, "hi".into()).header.most_derived().is_some());
/// ```
#[derive(Debug, Default)]
pub struct PartOf(Option<CompleteObject>);

impl PartOf {
    /// Not enclosed by anything.
    #[inline]
    pub const fn standalone() -> Self {
        Self(None)
    }

    /// Enclosed by a `C` at `offset` bytes from its start.
    #[inline]
    pub const fn enclosing<C: Destroy>(offset: usize) -> Self {
        Self(Some(CompleteObject::enclosing::<C>(offset)))
    }

    /// The enclosing object, if any.
    #[inline]
    pub const fn complete_object(&self) -> Option<CompleteObject> {
        self.0
    }

    #[inline]
    pub const fn is_standalone(&self) -> bool {
        self.0.is_none()
    }
}

impl Clone for PartOf {
    fn clone(&self) -> Self {
        Self::standalone()
    }
}

/// Objects that can be destroyed through [`destroy_and_deallocate`].
///
/// Types that are never embedded as parts of larger allocator-owned objects
/// implement it with no body (see [`impl_destroy!`](crate::impl_destroy)).
/// Part types carry a [`PartOf`] field and return it from
/// [`most_derived`](Self::most_derived).
///
/// Trait objects get `Destroy` for free when their trait has it as a
/// supertrait: `trait Shape: Destroy {}` makes `dyn Shape` destroyable, and
/// the override of the concrete type behind it is the one that runs.
///
/// # Safety
///
/// Whenever `most_derived` returns `Some(whole)` for a value, that value must
/// live at byte `whole.offset()` inside a live object of the type `whole` was
/// built for. A [`PartOf`] link set by the enclosing constructor keeps that
/// promise as long as the part is not moved out of its container.
pub unsafe trait Destroy {
    /// The object directly enclosing `self`, or `None` if `self` is complete.
    #[inline]
    fn most_derived(&self) -> Option<CompleteObject> {
        None
    }
}

/// [`PartOf`] link for a part embedded as `$field` of `$Container`.
#[macro_export]
macro_rules! part_of {
    ($Container:ty, $field:ident) => {
        $crate::lifetime::PartOf::enclosing::<$Container>(::core::mem::offset_of!(
            $Container, $field
        ))
    };
}

/// `Destroy` for types that are always complete objects.
///
/// ```
/// struct Frame {
///     bytes: Vec<u8>,
/// }
///
/// nebula_allocator::impl_destroy!(Frame);
/// ```
#[macro_export]
macro_rules! impl_destroy {
    ($($ty:ty),+ $(,)?) => {
        $(
            // SAFETY: never a part of another object.
            unsafe impl $crate::lifetime::Destroy for $ty {}
        )+
    };
}

impl_destroy!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    str,
    String,
);

// SAFETY: std containers are never parts of allocator-owned objects here.
unsafe impl<T> Destroy for [T] {}
// SAFETY: as above.
unsafe impl<T, const N: usize> Destroy for [T; N] {}
// SAFETY: as above.
unsafe impl<T> Destroy for Vec<T> {}
// SAFETY: as above.
unsafe impl<T: ?Sized> Destroy for Box<T> {}
// SAFETY: as above.
unsafe impl<T> Destroy for Option<T> {}

// ============================================================================
// Object pointers
// ============================================================================

mod private {
    pub trait Sealed {}

    impl<T: ?Sized> Sealed for *const T {}
    impl<T: ?Sized> Sealed for *mut T {}
    impl<T: ?Sized> Sealed for core::ptr::NonNull<T> {}
    impl<T: ?Sized> Sealed for Option<core::ptr::NonNull<T>> {}
    impl Sealed for super::NullPtr {}
}

/// Untyped null pointer literal.
///
/// Lets callers write `destroy_and_deallocate(allocator, NullPtr)` without
/// naming an object type. Always a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullPtr;

/// The object type behind [`NullPtr`]; it has no values.
#[derive(Debug)]
pub enum Null {}

// SAFETY: uninhabited, so `most_derived` can never be called.
unsafe impl Destroy for Null {}

/// Anything that can name an object to destroy, or nothing at all.
///
/// Sealed; implemented for `*const T`, `*mut T`, `NonNull<T>`,
/// `Option<NonNull<T>>` and [`NullPtr`]. Constness of the pointer does not
/// restrict destruction: allocator-owned objects may be destroyed through
/// `*const T`.
pub trait ObjectPtr: private::Sealed {
    type Object: ?Sized;

    /// The object, or `None` for a null pointer.
    fn into_object(self) -> Option<NonNull<Self::Object>>;
}

impl<T: ?Sized> ObjectPtr for *const T {
    type Object = T;

    #[inline]
    fn into_object(self) -> Option<NonNull<T>> {
        NonNull::new(self.cast_mut())
    }
}

impl<T: ?Sized> ObjectPtr for *mut T {
    type Object = T;

    #[inline]
    fn into_object(self) -> Option<NonNull<T>> {
        NonNull::new(self)
    }
}

impl<T: ?Sized> ObjectPtr for NonNull<T> {
    type Object = T;

    #[inline]
    fn into_object(self) -> Option<NonNull<T>> {
        Some(self)
    }
}

impl<T: ?Sized> ObjectPtr for Option<NonNull<T>> {
    type Object = T;

    #[inline]
    fn into_object(self) -> Option<NonNull<T>> {
        self
    }
}

impl ObjectPtr for NullPtr {
    type Object = Null;

    #[inline]
    fn into_object(self) -> Option<NonNull<Null>> {
        None
    }
}

// ============================================================================
// Destroy and deallocate
// ============================================================================

/// Destroys the complete object behind `object` and returns its footprint to
/// `allocator`.
///
/// 1. null: return without touching the allocator
/// 2. follow [`Destroy::most_derived`] outwards, through every enclosing
///    object, to the complete object
/// 3. run the complete object's destructor (every part's `Drop` runs once)
/// 4. `deallocate` the complete object's address
///
/// A panicking destructor propagates and the footprint is not deallocated.
///
/// # Safety
///
/// See the [module documentation](self).
pub unsafe fn destroy_and_deallocate<A, P>(allocator: &A, object: P)
where
    A: Allocator + ?Sized,
    P: ObjectPtr,
    P::Object: Destroy,
{
    let Some(object) = object.into_object() else {
        return;
    };

    // SAFETY: the object is live (caller contract).
    let Some(mut whole) = unsafe { object.as_ref() }.most_derived() else {
        // SAFETY: `object` is itself the complete object.
        unsafe { destroy_in_place(allocator, object.as_ptr()) };
        return;
    };

    // Stepping back from the part keeps the caller's provenance over the
    // whole footprint.
    let mut address = object.as_ptr().cast::<u8>().wrapping_sub(whole.offset);
    // SAFETY: `Destroy` guarantees a live enclosing object at `address`.
    while let Some(outer) = unsafe { (whole.enclosing)(address) } {
        address = address.wrapping_sub(outer.offset);
        whole = outer;
    }

    // SAFETY: `address` is the outermost object, which starts the footprint
    // (caller contract); it is not touched again.
    unsafe {
        (whole.drop_glue)(address);
        allocator.deallocate(address);
    }
}

/// Like [`destroy_and_deallocate`], but trusts that `object` already is the
/// complete object.
///
/// No `Destroy` bound and no address recovery: `object`'s own destructor runs
/// and `object`'s own address is deallocated.
///
/// # Safety
///
/// Everything [`destroy_and_deallocate`] requires, and additionally `object`
/// must point at the start of the complete object. Passing a pointer to an
/// embedded part is undefined behavior.
pub unsafe fn destroy_and_deallocate_raw<A, P>(allocator: &A, object: P)
where
    A: Allocator + ?Sized,
    P: ObjectPtr,
{
    let Some(object) = object.into_object() else {
        return;
    };

    // SAFETY: forwarded caller contract.
    unsafe { destroy_in_place(allocator, object.as_ptr()) }
}

/// # Safety
///
/// `object` is a live complete object placed at the start of a footprint
/// obtained from `allocator`.
#[inline]
unsafe fn destroy_in_place<A, T>(allocator: &A, object: *mut T)
where
    A: Allocator + ?Sized,
    T: ?Sized,
{
    let address = object.cast::<u8>();
    // SAFETY: caller contract; the object is not touched again.
    unsafe {
        ptr::drop_in_place(object);
        allocator.deallocate(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{AllocatorExt, TestAllocator, TestAllocatorConfig};
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counted(Rc<Cell<u32>>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    impl_destroy!(Counted);

    fn quiet() -> TestAllocator {
        TestAllocator::with_config(TestAllocatorConfig::quiet())
    }

    #[test]
    fn typed_null_is_a_no_op() {
        let allocator = quiet();
        unsafe {
            destroy_and_deallocate(&allocator, ptr::null::<Counted>());
            destroy_and_deallocate(&allocator, ptr::null_mut::<String>());
            destroy_and_deallocate(&allocator, None::<NonNull<u64>>);
            destroy_and_deallocate_raw(&allocator, ptr::null::<Counted>());
        }
        assert_eq!(allocator.num_deallocations(), 0);
        assert_eq!(allocator.num_allocations(), 0);
    }

    #[test]
    fn null_literal_is_a_no_op() {
        let allocator = quiet();
        unsafe {
            destroy_and_deallocate(&allocator, NullPtr);
            destroy_and_deallocate_raw(&allocator, NullPtr);
        }
        assert_eq!(allocator.num_deallocations(), 0);
    }

    #[test]
    fn destructor_runs_once() {
        let allocator = quiet();
        let drops = Rc::new(Cell::new(0));
        let object = allocator.new_object(Counted(drops.clone())).unwrap();

        unsafe { destroy_and_deallocate(&allocator, object.as_ptr().cast_const()) };

        assert_eq!(drops.get(), 1);
        assert_eq!(allocator.num_deallocations(), 1);
        assert_eq!(allocator.last_deallocated_address(), object.as_ptr().cast());
        assert_eq!(allocator.num_blocks_in_use(), 0);
    }

    #[test]
    fn raw_variant_on_complete_object() {
        let allocator = quiet();
        let object = allocator.new_object(String::from("raw")).unwrap();

        unsafe { destroy_and_deallocate_raw(&allocator, object) };

        assert_eq!(allocator.num_blocks_in_use(), 0);
        assert_eq!(allocator.num_mismatches(), 0);
    }

    #[test]
    fn complete_object_records_offset() {
        #[repr(C)]
        struct Pair {
            first: u64,
            second: u32,
        }

        impl_destroy!(Pair);

        let link = part_of!(Pair, second);
        let whole = link.complete_object().unwrap();
        assert_eq!(whole.offset(), 8);
        assert!(format!("{whole:?}").contains("offset: 8"));
        assert!(link.clone().is_standalone());
        assert!(PartOf::default().is_standalone());
    }
}
