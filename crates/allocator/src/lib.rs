//! # nebula-allocator
//!
//! A polymorphic memory allocation protocol and the object-lifetime utilities
//! built on top of it.
//!
//! This crate provides:
//! - The [`Allocator`](allocator::Allocator) protocol: raw, untyped
//!   `allocate(size)` / `deallocate(address)` behind a trait object
//! - [`NewDeleteAllocator`](allocator::NewDeleteAllocator), the process-wide
//!   default backed by the system heap
//! - [`TestAllocator`](allocator::TestAllocator), an instrumented allocator
//!   that counts blocks, detects mismatched deallocations and reports leaks
//! - Destroy-and-deallocate utilities that recover the complete object from a
//!   pointer to any of its parts
//! - Placement construction with automatic footprint release on failure
//! - Allocator-aware containers ([`Stack`](stack::Stack),
//!   [`ManagedPtr`](managed::ManagedPtr))
//!
//! ## Quick Start
//!
//! ```rust
//! use nebula_allocator::prelude::*;
//!
//! let allocator = TestAllocator::new();
//!
//! let object = allocator.new_object(String::from("hello"))?;
//! // SAFETY: `object` came from `allocator` and is deleted exactly once.
//! unsafe { allocator.destroy_and_deallocate(object) };
//!
//! assert_eq!(allocator.num_blocks_in_use(), 0);
//! # Ok::<(), nebula_allocator::MemoryError>(())
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured events through `tracing`

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rust_2018_idioms)]
// Raw memory is the whole point of this crate; every block carries a SAFETY note
#![allow(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
// Statistics are reported as f64 averages
#![allow(clippy::cast_precision_loss)]
// Allocators hand out byte addresses that are cast to the object type per-site
#![allow(clippy::cast_ptr_alignment)]

// Error types
pub mod error;

// Core modules
pub mod allocator;
pub mod lifetime;
pub mod placement;

// Allocator-aware types
pub mod managed;
pub mod stack;

pub use crate::error::{MemoryError, MemoryResult, Result};

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::error::{MemoryError, MemoryResult};

    pub use crate::allocator::{
        AllocError, AllocResult, Allocator, AllocatorExt, DefaultAllocatorGuard,
        NewDeleteAllocator, StatisticsProvider, TestAllocator, TestAllocatorConfig,
        default_allocator,
    };

    pub use crate::lifetime::{CompleteObject, Destroy, NullPtr, PartOf};
    pub use crate::managed::ManagedPtr;
    pub use crate::stack::Stack;
}
