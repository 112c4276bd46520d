//! Instrumented test allocator
//!
//! Provides an allocator that counts every call, remembers every outstanding
//! block and catches contract breaches, by wrapping another allocator
//! implementation.
//!
//! # Safety
//!
//! All memory comes from the upstream allocator; this wrapper only forwards:
//! - A block is forwarded to upstream `deallocate` only if it is found in the
//!   registry of outstanding blocks, so foreign and repeated deallocations
//!   never reach upstream
//! - Fill patterns are written strictly inside the recorded block size
//!
//! ## Invariants
//!
//! - Every `allocate` call is an allocation event, including `allocate(0)`
//!   (which returns null and never reaches upstream)
//! - Every `deallocate` call is a deallocation event, including null
//! - Blocks and bytes in use only move for real blocks
//! - Failed allocations don't affect memory counters (only failure count)

use core::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};
use std::borrow::Cow;

use dashmap::DashMap;

#[cfg(feature = "logging")]
use tracing::{debug, error, warn};

use super::{
    AllocError, AllocResult, Allocator, AllocatorStats, AtomicAllocatorStats, MisusePolicy,
    NewDeleteAllocator, StatisticsProvider, TestAllocatorConfig,
};
use crate::error::MemoryResult;

/// Bookkeeping for one outstanding block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecord {
    /// Requested size in bytes
    pub size: usize,
    /// Sequence number of the `allocate` call that produced the block
    pub index: u64,
}

/// A wrapper allocator that records every allocation event
///
/// Used to observe allocator traffic in tests: how many calls were made, which
/// address was released last, whether anything is still outstanding.
///
/// # Zero-sized requests
///
/// `allocate(0)` counts as an allocation event and returns null without
/// calling upstream. `deallocate(null)` counts as a deallocation event and
/// does nothing else.
///
/// # Thread Safety
///
/// Safe for concurrent use when the upstream allocator is; counters are
/// atomics and the block registry is a `DashMap`.
#[derive(Debug)]
pub struct TestAllocator<A = &'static NewDeleteAllocator> {
    upstream: A,
    config: TestAllocatorConfig,
    stats: AtomicAllocatorStats,
    blocks: DashMap<usize, BlockRecord>,
    next_index: AtomicU64,
    last_allocated_address: AtomicPtr<u8>,
    last_allocated_size: AtomicUsize,
    last_deallocated_address: AtomicPtr<u8>,
}

impl TestAllocator {
    /// Creates a test allocator over the heap with the default configuration
    pub fn new() -> Self {
        Self::with_config(TestAllocatorConfig::default())
    }

    /// Creates a test allocator over the heap
    pub fn with_config(config: TestAllocatorConfig) -> Self {
        Self::with_upstream(NewDeleteAllocator::singleton(), config)
    }

    /// Creates a named test allocator over the heap
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::with_config(TestAllocatorConfig::default().with_name(name))
    }
}

impl Default for TestAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Allocator> TestAllocator<A> {
    /// Creates a test allocator that sources its blocks from `upstream`
    pub fn with_upstream(upstream: A, config: TestAllocatorConfig) -> Self {
        Self {
            upstream,
            config,
            stats: AtomicAllocatorStats::new(),
            blocks: DashMap::new(),
            next_index: AtomicU64::new(0),
            last_allocated_address: AtomicPtr::new(core::ptr::null_mut()),
            last_allocated_size: AtomicUsize::new(0),
            last_deallocated_address: AtomicPtr::new(core::ptr::null_mut()),
        }
    }

    /// Gets a reference to the upstream allocator
    pub fn upstream(&self) -> &A {
        &self.upstream
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &TestAllocatorConfig {
        &self.config
    }

    /// Number of `allocate` calls that succeeded, zero-sized ones included
    pub fn num_allocations(&self) -> u64 {
        self.stats.allocation_count()
    }

    /// Number of `deallocate` calls, null and mismatched ones included
    pub fn num_deallocations(&self) -> u64 {
        self.stats.deallocation_count()
    }

    pub fn num_blocks_in_use(&self) -> usize {
        self.stats.blocks_in_use()
    }

    pub fn num_bytes_in_use(&self) -> usize {
        self.stats.bytes_in_use()
    }

    pub fn num_blocks_max(&self) -> usize {
        self.stats.snapshot().peak_blocks_in_use
    }

    pub fn num_bytes_max(&self) -> usize {
        self.stats.snapshot().peak_bytes_in_use
    }

    pub fn num_blocks_total(&self) -> u64 {
        self.stats.snapshot().total_blocks
    }

    pub fn num_bytes_total(&self) -> u64 {
        self.stats.snapshot().total_bytes_allocated
    }

    /// Number of deallocations of addresses that were not outstanding blocks
    pub fn num_mismatches(&self) -> u64 {
        self.stats.mismatches()
    }

    pub fn num_failures(&self) -> u64 {
        self.stats.snapshot().failed_allocations
    }

    /// Address returned by the most recent `allocate` call (null for size 0)
    pub fn last_allocated_address(&self) -> *mut u8 {
        self.last_allocated_address.load(Ordering::Relaxed)
    }

    /// Size passed to the most recent `allocate` call
    pub fn last_allocated_size(&self) -> usize {
        self.last_allocated_size.load(Ordering::Relaxed)
    }

    /// Address passed to the most recent `deallocate` call
    pub fn last_deallocated_address(&self) -> *mut u8 {
        self.last_deallocated_address.load(Ordering::Relaxed)
    }

    /// Whether `address` is an outstanding block of this allocator
    pub fn owns(&self, address: *const u8) -> bool {
        self.blocks.contains_key(&(address as usize))
    }

    /// Check if there are outstanding blocks
    pub fn has_leaks(&self) -> bool {
        self.num_blocks_in_use() > 0
    }

    /// Outstanding blocks, oldest first
    pub fn outstanding_blocks(&self) -> Vec<(*mut u8, BlockRecord)> {
        let mut blocks: Vec<_> = self
            .blocks
            .iter()
            .map(|entry| (*entry.key() as *mut u8, *entry.value()))
            .collect();
        blocks.sort_by_key(|(_, record)| record.index);
        blocks
    }

    /// Fails if any block is outstanding or any mismatch was recorded
    pub fn verify(&self) -> MemoryResult<()> {
        let stats = self.stats.snapshot();
        if stats.mismatches > 0 {
            return Err(AllocError::invalid_state(&format!(
                "'{}' saw {} mismatched deallocation(s)",
                self.config.name, stats.mismatches
            )));
        }
        if stats.blocks_in_use > 0 {
            return Err(AllocError::invalid_state(&format!(
                "'{}' has {} block(s) ({} bytes) in use",
                self.config.name, stats.blocks_in_use, stats.bytes_in_use
            )));
        }
        Ok(())
    }

    /// Claims the next allocation index, or `None` once the limit is spent.
    ///
    /// Check and claim are one atomic step, so concurrent callers never
    /// overshoot the limit.
    fn claim_index(&self) -> Option<u64> {
        self.next_index
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |index| {
                match self.config.allocation_limit {
                    Some(limit) if index >= limit => None,
                    _ => Some(index + 1),
                }
            })
            .ok()
    }

    fn report_mismatch(&self, address: *mut u8) {
        self.stats.record_mismatch();

        #[cfg(feature = "logging")]
        error!(
            allocator = %self.config.name,
            address = ?address,
            "deallocation of an address that is not an outstanding block"
        );

        if self.config.misuse == MisusePolicy::Panic {
            panic!(
                "test allocator '{}': deallocate({address:p}) does not match any outstanding block",
                self.config.name
            );
        }
    }
}

// SAFETY: TestAllocator forwards to the upstream allocator.
// - Blocks handed out are exactly the ones upstream returned
// - Only registered blocks are passed back to upstream, once
// - Fill patterns stay within the recorded size of a live block
unsafe impl<A: Allocator> Allocator for TestAllocator<A> {
    fn allocate(&self, size: usize) -> AllocResult<*mut u8> {
        let Some(index) = self.claim_index() else {
            self.stats.record_allocation_failure();
            return Err(AllocError::limit_exceeded(
                &self.config.name,
                self.config.allocation_limit.unwrap_or_default(),
            ));
        };

        let address = if size == 0 {
            self.stats.record_empty_allocation();
            core::ptr::null_mut()
        } else {
            let address = match self.upstream.allocate(size) {
                Ok(address) if !address.is_null() => address,
                Ok(_) => {
                    self.stats.record_allocation_failure();
                    return Err(AllocError::allocation_failed(
                        size,
                        super::natural_alignment(size),
                    ));
                }
                Err(error) => {
                    self.stats.record_allocation_failure();
                    return Err(error);
                }
            };

            if let Some(pattern) = self.config.alloc_pattern {
                // SAFETY: `address` is a fresh upstream block of `size` bytes.
                unsafe { core::ptr::write_bytes(address, pattern, size) };
            }

            self.blocks
                .insert(address as usize, BlockRecord { size, index });
            self.stats.record_allocation(size);
            address
        };

        self.last_allocated_address
            .store(address, Ordering::Relaxed);
        self.last_allocated_size.store(size, Ordering::Relaxed);

        #[cfg(feature = "logging")]
        if self.config.verbose {
            debug!(
                allocator = %self.config.name,
                index,
                size,
                address = ?address,
                "allocate"
            );
        }

        Ok(address)
    }

    unsafe fn deallocate(&self, address: *mut u8) {
        self.last_deallocated_address
            .store(address, Ordering::Relaxed);

        if address.is_null() {
            self.stats.record_empty_deallocation();

            #[cfg(feature = "logging")]
            if self.config.verbose {
                debug!(allocator = %self.config.name, "deallocate(null)");
            }
            return;
        }

        let Some((_, record)) = self.blocks.remove(&(address as usize)) else {
            self.report_mismatch(address);
            return;
        };

        #[cfg(feature = "logging")]
        if self.config.verbose {
            debug!(
                allocator = %self.config.name,
                index = record.index,
                size = record.size,
                address = ?address,
                "deallocate"
            );
        }

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: the block was live until removed from the registry above.
            unsafe { core::ptr::write_bytes(address, pattern, record.size) };
        }

        // SAFETY: `address` was registered, so upstream produced it and it has
        // not been released yet.
        unsafe { self.upstream.deallocate(address) };
        self.stats.record_deallocation(record.size);
    }
}

impl<A> StatisticsProvider for TestAllocator<A> {
    fn statistics(&self) -> AllocatorStats {
        self.stats.snapshot()
    }
}

impl<A> Drop for TestAllocator<A> {
    fn drop(&mut self) {
        if self.blocks.is_empty() {
            return;
        }

        #[cfg(feature = "logging")]
        if self.config.report_leaks_on_drop {
            warn!(
                allocator = %self.config.name,
                blocks = self.blocks.len(),
                bytes = self.stats.bytes_in_use(),
                "test allocator dropped with outstanding blocks"
            );
        }
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Snapshot of a [`TestAllocator`] that answers "did this change anything?"
///
/// ```
/// use nebula_allocator::allocator::{Allocator, TestAllocator, TestAllocatorMonitor};
///
/// let allocator = TestAllocator::new();
/// let monitor = TestAllocatorMonitor::new(&allocator);
///
/// let block = allocator.allocate(8)?;
/// assert!(monitor.is_in_use_up());
/// unsafe { allocator.deallocate(block) };
/// assert!(monitor.is_in_use_same());
/// assert!(monitor.is_total_up());
/// # Ok::<(), nebula_allocator::MemoryError>(())
/// ```
#[derive(Debug)]
pub struct TestAllocatorMonitor<'a, A = &'static NewDeleteAllocator> {
    allocator: &'a TestAllocator<A>,
    initial: AllocatorStats,
}

impl<'a, A: Allocator> TestAllocatorMonitor<'a, A> {
    pub fn new(allocator: &'a TestAllocator<A>) -> Self {
        Self {
            allocator,
            initial: allocator.statistics(),
        }
    }

    pub fn is_in_use_same(&self) -> bool {
        self.allocator.num_blocks_in_use() == self.initial.blocks_in_use
    }

    pub fn is_in_use_up(&self) -> bool {
        self.allocator.num_blocks_in_use() > self.initial.blocks_in_use
    }

    pub fn is_in_use_down(&self) -> bool {
        self.allocator.num_blocks_in_use() < self.initial.blocks_in_use
    }

    pub fn is_total_same(&self) -> bool {
        self.allocator.num_blocks_total() == self.initial.total_blocks
    }

    pub fn is_total_up(&self) -> bool {
        self.allocator.num_blocks_total() > self.initial.total_blocks
    }

    /// Re-baseline on the allocator's current state
    pub fn reset(&mut self) {
        self.initial = self.allocator.statistics();
    }
}
