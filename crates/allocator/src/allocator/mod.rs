//! Allocator protocol and implementations
//!
//! - [`Allocator`]: the polymorphic capability everything else is written against
//! - [`AllocatorExt`]: object-level operations on top of any allocator
//! - [`NewDeleteAllocator`]: the heap, and the fallback default
//! - [`TestAllocator`]: counting, leak and misuse detection for tests
//! - [`default_allocator`] / [`DefaultAllocatorGuard`]: the process-wide default

pub mod config;
pub mod default;
pub mod ext;
pub mod new_delete;
pub mod stats;
pub mod testing;
pub mod traits;

pub use config::{MisusePolicy, TestAllocatorConfig};
pub use default::{
    DefaultAllocatorGuard, GlobalAllocatorRef, allocator_or_default, default_allocator,
    reset_default_allocator, set_default_allocator,
};
pub use ext::AllocatorExt;
pub use new_delete::NewDeleteAllocator;
pub use stats::{AllocatorStats, AtomicAllocatorStats, StatisticsProvider};
pub use testing::{BlockRecord, TestAllocator, TestAllocatorMonitor};
pub use traits::{Allocator, MAX_ALIGNMENT, natural_alignment, same_allocator};

pub use crate::error::{AllocError, AllocResult};
