//! Allocator statistics tracking
//!
//! Counters kept by instrumented allocators. Every `allocate` call counts as
//! an allocation event, zero-sized ones included, and every `deallocate` call
//! counts as a deallocation event, null included; blocks and bytes in use only
//! move for real blocks.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Snapshot of allocator statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Number of `allocate` calls that succeeded
    pub allocation_count: u64,
    /// Number of `deallocate` calls, including null
    pub deallocation_count: u64,
    /// Number of `allocate` calls that failed
    pub failed_allocations: u64,
    /// Number of `deallocate` calls with an address this allocator does not own
    pub mismatches: u64,
    /// Blocks currently outstanding
    pub blocks_in_use: usize,
    /// Highest value `blocks_in_use` ever reached
    pub peak_blocks_in_use: usize,
    /// Blocks ever handed out
    pub total_blocks: u64,
    /// Bytes currently outstanding
    pub bytes_in_use: usize,
    /// Highest value `bytes_in_use` ever reached
    pub peak_bytes_in_use: usize,
    /// Bytes ever handed out (cumulative)
    pub total_bytes_allocated: u64,
    /// Bytes ever returned (cumulative)
    pub total_bytes_deallocated: u64,
}

impl AllocatorStats {
    /// Creates a new empty stats object
    pub const fn new() -> Self {
        Self {
            allocation_count: 0,
            deallocation_count: 0,
            failed_allocations: 0,
            mismatches: 0,
            blocks_in_use: 0,
            peak_blocks_in_use: 0,
            total_blocks: 0,
            bytes_in_use: 0,
            peak_bytes_in_use: 0,
            total_bytes_allocated: 0,
            total_bytes_deallocated: 0,
        }
    }

    /// Calculate the average allocation size
    pub fn average_allocation_size(&self) -> Option<f64> {
        if self.allocation_count > 0 {
            Some(self.total_bytes_allocated as f64 / self.allocation_count as f64)
        } else {
            None
        }
    }

    /// Check if there are any outstanding blocks
    pub fn has_active_allocations(&self) -> bool {
        self.blocks_in_use > 0
    }

    /// Allocation events minus deallocation events
    pub fn allocation_balance(&self) -> i64 {
        self.allocation_count as i64 - self.deallocation_count as i64
    }
}

impl core::fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Allocator Statistics:")?;
        writeln!(f, "  Allocations: {}", self.allocation_count)?;
        writeln!(f, "  Deallocations: {}", self.deallocation_count)?;
        writeln!(f, "  Failed allocations: {}", self.failed_allocations)?;
        writeln!(f, "  Mismatched deallocations: {}", self.mismatches)?;
        writeln!(
            f,
            "  Blocks in use: {} (peak {}, total {})",
            self.blocks_in_use, self.peak_blocks_in_use, self.total_blocks
        )?;
        writeln!(
            f,
            "  Bytes in use: {} (peak {}, total {})",
            self.bytes_in_use, self.peak_bytes_in_use, self.total_bytes_allocated
        )?;

        if let Some(avg) = self.average_allocation_size() {
            writeln!(f, "  Average allocation size: {avg:.2} bytes")?;
        }

        Ok(())
    }
}

/// Thread-safe atomic version of allocator statistics
pub struct AtomicAllocatorStats {
    allocation_count: AtomicU64,
    deallocation_count: AtomicU64,
    failed_allocations: AtomicU64,
    mismatches: AtomicU64,
    blocks_in_use: AtomicUsize,
    peak_blocks_in_use: AtomicUsize,
    total_blocks: AtomicU64,
    bytes_in_use: AtomicUsize,
    peak_bytes_in_use: AtomicUsize,
    total_bytes_allocated: AtomicU64,
    total_bytes_deallocated: AtomicU64,
}

/// Raise `peak` to at least `value`.
fn update_peak(peak: &AtomicUsize, value: usize) {
    let mut current_peak = peak.load(Ordering::Relaxed);
    while value > current_peak {
        match peak.compare_exchange_weak(current_peak, value, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => break,
            Err(observed) => current_peak = observed,
        }
    }
}

impl AtomicAllocatorStats {
    /// Creates a new empty atomic stats object
    pub const fn new() -> Self {
        Self {
            allocation_count: AtomicU64::new(0),
            deallocation_count: AtomicU64::new(0),
            failed_allocations: AtomicU64::new(0),
            mismatches: AtomicU64::new(0),
            blocks_in_use: AtomicUsize::new(0),
            peak_blocks_in_use: AtomicUsize::new(0),
            total_blocks: AtomicU64::new(0),
            bytes_in_use: AtomicUsize::new(0),
            peak_bytes_in_use: AtomicUsize::new(0),
            total_bytes_allocated: AtomicU64::new(0),
            total_bytes_deallocated: AtomicU64::new(0),
        }
    }

    /// An allocation event that produced no block (`allocate(0)`)
    pub fn record_empty_allocation(&self) {
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
    }

    /// A successful allocation of a real block
    pub fn record_allocation(&self, size: usize) {
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        self.total_blocks.fetch_add(1, Ordering::Relaxed);
        self.total_bytes_allocated
            .fetch_add(size as u64, Ordering::Relaxed);

        let blocks = self.blocks_in_use.fetch_add(1, Ordering::Relaxed) + 1;
        update_peak(&self.peak_blocks_in_use, blocks);

        let bytes = self
            .bytes_in_use
            .fetch_add(size, Ordering::Relaxed)
            .saturating_add(size);
        update_peak(&self.peak_bytes_in_use, bytes);
    }

    /// A failed allocation
    pub fn record_allocation_failure(&self) {
        self.failed_allocations.fetch_add(1, Ordering::Relaxed);
    }

    /// A deallocation of a real block
    pub fn record_deallocation(&self, size: usize) {
        self.deallocation_count.fetch_add(1, Ordering::Relaxed);
        self.total_bytes_deallocated
            .fetch_add(size as u64, Ordering::Relaxed);
        self.blocks_in_use.fetch_sub(1, Ordering::Relaxed);
        self.bytes_in_use.fetch_sub(size, Ordering::Relaxed);
    }

    /// A deallocation event that released nothing (null address)
    pub fn record_empty_deallocation(&self) {
        self.deallocation_count.fetch_add(1, Ordering::Relaxed);
    }

    /// A deallocation of an address the allocator does not own
    pub fn record_mismatch(&self) {
        self.deallocation_count.fetch_add(1, Ordering::Relaxed);
        self.mismatches.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of the current statistics
    pub fn snapshot(&self) -> AllocatorStats {
        AllocatorStats {
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
            deallocation_count: self.deallocation_count.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
            mismatches: self.mismatches.load(Ordering::Relaxed),
            blocks_in_use: self.blocks_in_use.load(Ordering::Relaxed),
            peak_blocks_in_use: self.peak_blocks_in_use.load(Ordering::Relaxed),
            total_blocks: self.total_blocks.load(Ordering::Relaxed),
            bytes_in_use: self.bytes_in_use.load(Ordering::Relaxed),
            peak_bytes_in_use: self.peak_bytes_in_use.load(Ordering::Relaxed),
            total_bytes_allocated: self.total_bytes_allocated.load(Ordering::Relaxed),
            total_bytes_deallocated: self.total_bytes_deallocated.load(Ordering::Relaxed),
        }
    }

    pub fn allocation_count(&self) -> u64 {
        self.allocation_count.load(Ordering::Relaxed)
    }

    pub fn deallocation_count(&self) -> u64 {
        self.deallocation_count.load(Ordering::Relaxed)
    }

    pub fn blocks_in_use(&self) -> usize {
        self.blocks_in_use.load(Ordering::Relaxed)
    }

    pub fn bytes_in_use(&self) -> usize {
        self.bytes_in_use.load(Ordering::Relaxed)
    }

    pub fn mismatches(&self) -> u64 {
        self.mismatches.load(Ordering::Relaxed)
    }
}

impl Default for AtomicAllocatorStats {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for AtomicAllocatorStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("AtomicAllocatorStats")
            .field(&self.snapshot())
            .finish()
    }
}

/// Trait for allocators that support statistics collection
pub trait StatisticsProvider {
    /// Get current statistics
    fn statistics(&self) -> AllocatorStats;
}
