//! Allocator-aware stack of plain values
//!
//! A growable LIFO container that sources its storage through a
//! `&dyn Allocator` and follows the allocator propagation rules shared by
//! every allocator-aware type:
//!
//! - constructors take `Option<&dyn Allocator>`; `None` means the default
//!   allocator in effect at construction time
//! - [`Clone`] uses the clone's own default, never the source's allocator
//! - [`assign_from`](Stack::assign_from) never changes the target's allocator
//! - a plain Rust move carries the allocator along;
//!   [`take_in`](Stack::take_in) moves into an explicitly supplied allocator
//!
//! Growth allocates the new buffer before touching the old one, so a failed
//! allocation leaves the stack unchanged.

use core::fmt;
use core::ptr::NonNull;

use crate::allocator::{
    AllocError, AllocResult, Allocator, MAX_ALIGNMENT, allocator_or_default, same_allocator,
};

const INITIAL_CAPACITY: usize = 1;
const GROW_FACTOR: usize = 2;

/// Growable stack of `Copy` values backed by a polymorphic allocator
pub struct Stack<'a, T: Copy> {
    data: NonNull<T>,
    capacity: usize,
    len: usize,
    allocator: &'a dyn Allocator,
}

impl<T: Copy> Stack<'static, T> {
    /// Empty stack on the current default allocator.
    pub fn new() -> Self {
        Stack::new_in(None)
    }
}

impl<T: Copy> Default for Stack<'static, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: Copy> Stack<'a, T> {
    /// Empty stack on `allocator`, or on the current default when `None`.
    ///
    /// Allocates nothing until the first push.
    pub fn new_in(allocator: Option<&'a dyn Allocator>) -> Self {
        const {
            assert!(
                align_of::<T>() <= MAX_ALIGNMENT,
                "element alignment exceeds what allocators guarantee"
            );
        }
        let capacity = if size_of::<T>() == 0 { usize::MAX } else { 0 };
        Self {
            data: NonNull::dangling(),
            capacity,
            len: 0,
            allocator: allocator_or_default(allocator),
        }
    }

    /// Copy of `self` on `allocator`, or on the current default when `None`.
    pub fn try_clone_in<'b>(
        &self,
        allocator: Option<&'b dyn Allocator>,
    ) -> AllocResult<Stack<'b, T>> {
        let mut copy = Stack::new_in(allocator);
        copy.reserve_exact(self.len)?;
        copy.extend_from(self.as_slice());
        Ok(copy)
    }

    /// The allocator this stack draws from.
    pub fn allocator(&self) -> &'a dyn Allocator {
        self.allocator
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Elements from bottom to top.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `data` is dangling only with `len == 0` (or zero-sized `T`),
        // otherwise it holds `len` initialized elements.
        unsafe { core::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    /// Elements from top to bottom.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.as_slice().iter().rev()
    }

    pub fn top(&self) -> Option<&T> {
        self.as_slice().last()
    }

    pub fn push(&mut self, value: T) -> AllocResult<()> {
        if self.len == self.capacity {
            let proposed = self
                .capacity
                .checked_mul(GROW_FACTOR)
                .ok_or_else(|| AllocError::size_overflow("growing stack capacity"))?
                .max(INITIAL_CAPACITY);
            self.reallocate(proposed)?;
        }

        // SAFETY: `len < capacity` after the growth above.
        unsafe { self.data.as_ptr().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: index `len` was initialized and is now outside the stack.
        Some(unsafe { self.data.as_ptr().add(self.len).read() })
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Makes `self` a copy of `other`, keeping `self`'s allocator.
    ///
    /// On allocation failure `self` is left as it was.
    pub fn assign_from(&mut self, other: &Stack<'_, T>) -> AllocResult<()> {
        self.reserve_exact(other.len)?;
        self.len = 0;
        self.extend_from(other.as_slice());
        Ok(())
    }

    /// Moves the contents into a stack on `allocator`.
    ///
    /// The buffer itself moves when `allocator` is the one already in use;
    /// otherwise the elements are copied and the old buffer released.
    pub fn take_in<'b>(self, allocator: &'b dyn Allocator) -> AllocResult<Stack<'b, T>>
    where
        'a: 'b,
    {
        if same_allocator(self.allocator, allocator) {
            return Ok(self);
        }
        self.try_clone_in(Some(allocator))
    }

    fn reserve_exact(&mut self, capacity: usize) -> AllocResult<()> {
        if capacity > self.capacity {
            self.reallocate(capacity)?;
        }
        Ok(())
    }

    /// Appends within the current capacity.
    fn extend_from(&mut self, values: &[T]) {
        debug_assert!(self.len + values.len() <= self.capacity);
        // SAFETY: capacity was reserved by the caller; `values` cannot alias
        // our buffer because `self` is borrowed mutably.
        unsafe {
            core::ptr::copy_nonoverlapping(
                values.as_ptr(),
                self.data.as_ptr().add(self.len),
                values.len(),
            );
        }
        self.len += values.len();
    }

    /// Moves the live elements into a fresh buffer of `capacity` elements.
    fn reallocate(&mut self, capacity: usize) -> AllocResult<()> {
        debug_assert!(self.len <= capacity);

        let bytes = capacity
            .checked_mul(size_of::<T>())
            .ok_or_else(|| AllocError::size_overflow("sizing stack buffer"))?;
        let fresh = self.allocator.allocate(bytes)?;
        let fresh = NonNull::new(fresh.cast::<T>())
            .ok_or_else(|| AllocError::invalid_state("allocator returned null for stack storage"))?;

        // Committed: nothing below can fail.

        let old = core::mem::replace(&mut self.data, fresh);
        // SAFETY: both buffers hold at least `len` elements and are distinct
        // blocks.
        unsafe {
            core::ptr::copy_nonoverlapping(old.as_ptr(), fresh.as_ptr(), self.len);
        }
        self.release(old);
        self.capacity = capacity;
        Ok(())
    }

    fn release(&self, buffer: NonNull<T>) {
        if self.capacity > 0 && size_of::<T>() > 0 {
            // SAFETY: a non-empty buffer of non-zero-sized elements came from
            // `self.allocator` in `reallocate`.
            unsafe { self.allocator.deallocate(buffer.as_ptr().cast()) };
        }
    }
}

impl<'a, T: Copy> Clone for Stack<'a, T> {
    /// Copies onto the default allocator in effect now, not onto `self`'s.
    ///
    /// # Panics
    ///
    /// Panics if the default allocator cannot supply the storage; use
    /// [`try_clone_in`](Stack::try_clone_in) to handle that case.
    fn clone(&self) -> Self {
        match self.try_clone_in(None) {
            Ok(copy) => copy,
            Err(error) => panic!("cloning stack: {error}"),
        }
    }
}

impl<T: Copy> Drop for Stack<'_, T> {
    fn drop(&mut self) {
        self.release(self.data);
    }
}

impl<T: Copy + PartialEq> PartialEq for Stack<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for Stack<'_, T> {
    /// Top first, like the iteration order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
