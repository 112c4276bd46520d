//! Process-wide default allocator
//!
//! Allocator-aware types take an explicit `Option<&dyn Allocator>`; only when
//! the caller passes `None` does the constructor consult this slot, once, at
//! construction time. Nothing deeper in the crate reads it.
//!
//! Until something is installed the slot resolves to
//! [`NewDeleteAllocator::singleton`]. Tests swap it through
//! [`DefaultAllocatorGuard`], which restores the previous value on drop and
//! serializes competing installers across threads.

use parking_lot::{RwLock, ReentrantMutex, ReentrantMutexGuard};

#[cfg(feature = "logging")]
use tracing::debug;

use super::{Allocator, NewDeleteAllocator};

/// Allocator that can live in the process-wide slot
pub type GlobalAllocatorRef = &'static (dyn Allocator + Sync);

static DEFAULT_ALLOCATOR: RwLock<Option<GlobalAllocatorRef>> = parking_lot::const_rwlock(None);

static INSTALLERS: ReentrantMutex<()> = parking_lot::const_reentrant_mutex(());

/// The allocator currently in effect for constructors given no allocator.
pub fn default_allocator() -> GlobalAllocatorRef {
    match *DEFAULT_ALLOCATOR.read() {
        Some(allocator) => allocator,
        None => NewDeleteAllocator::singleton(),
    }
}

/// Installs `allocator` as the process-wide default.
///
/// Returns the previously installed allocator, if any. Prefer
/// [`DefaultAllocatorGuard`] in tests so the slot is restored.
pub fn set_default_allocator(allocator: GlobalAllocatorRef) -> Option<GlobalAllocatorRef> {
    #[cfg(feature = "logging")]
    debug!(
        allocator = ?(allocator as *const (dyn Allocator + Sync)),
        "installing default allocator"
    );

    DEFAULT_ALLOCATOR.write().replace(allocator)
}

/// Clears the slot so it resolves to the heap allocator again.
pub fn reset_default_allocator() -> Option<GlobalAllocatorRef> {
    DEFAULT_ALLOCATOR.write().take()
}

/// `allocator`, or the current default when `None`.
///
/// This is the single point where an allocator-aware constructor resolves its
/// optional allocator argument.
#[inline]
pub fn allocator_or_default(allocator: Option<&dyn Allocator>) -> &dyn Allocator {
    match allocator {
        Some(allocator) => allocator,
        None => default_allocator(),
    }
}

/// Scoped installation of a default allocator
///
/// Installs an allocator on construction and puts the previous one back on
/// drop. Guards held by different threads exclude each other; a thread may
/// nest guards, in which case they must be dropped in reverse order.
///
/// ```
/// use nebula_allocator::allocator::{
///     Allocator, DefaultAllocatorGuard, TestAllocator, default_allocator, same_allocator,
/// };
///
/// let allocator: &'static TestAllocator = Box::leak(Box::new(TestAllocator::new()));
/// {
///     let _guard = DefaultAllocatorGuard::new(allocator);
///     assert!(same_allocator(default_allocator(), allocator));
/// }
/// assert!(!same_allocator(default_allocator(), allocator));
/// ```
#[must_use = "the previous default is restored when the guard is dropped"]
pub struct DefaultAllocatorGuard {
    previous: Option<GlobalAllocatorRef>,
    _serial: ReentrantMutexGuard<'static, ()>,
}

impl DefaultAllocatorGuard {
    pub fn new(allocator: GlobalAllocatorRef) -> Self {
        let serial = INSTALLERS.lock();
        let previous = set_default_allocator(allocator);
        Self {
            previous,
            _serial: serial,
        }
    }
}

impl Drop for DefaultAllocatorGuard {
    fn drop(&mut self) {
        *DEFAULT_ALLOCATOR.write() = self.previous;
    }
}

impl core::fmt::Debug for DefaultAllocatorGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DefaultAllocatorGuard")
            .field("restores_previous", &self.previous.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{TestAllocator, same_allocator};

    fn leaked() -> &'static TestAllocator {
        Box::leak(Box::new(TestAllocator::new()))
    }

    #[test]
    fn guard_installs_and_restores() {
        let first = leaked();
        let second = leaked();

        let _outer = DefaultAllocatorGuard::new(first);
        assert!(same_allocator(default_allocator(), first));
        {
            let _inner = DefaultAllocatorGuard::new(second);
            assert!(same_allocator(default_allocator(), second));
        }
        assert!(same_allocator(default_allocator(), first));
    }

    #[test]
    fn explicit_allocator_wins() {
        let installed = leaked();
        let explicit = TestAllocator::new();

        let _guard = DefaultAllocatorGuard::new(installed);
        assert!(same_allocator(
            allocator_or_default(Some(&explicit)),
            &explicit
        ));
        assert!(same_allocator(allocator_or_default(None), installed));
    }
}
