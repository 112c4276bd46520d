//! Test allocator configuration

use std::borrow::Cow;

/// What a [`TestAllocator`](super::TestAllocator) does when it sees a
/// deallocation of an address it does not own (foreign or double free).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MisusePolicy {
    /// Log the mismatch and panic
    #[default]
    Panic,
    /// Log and count the mismatch, then ignore the call
    Record,
}

/// Configuration for the instrumented test allocator
#[derive(Debug, Clone)]
pub struct TestAllocatorConfig {
    /// Name used in log records and error messages
    pub name: Cow<'static, str>,

    /// Trace every allocate/deallocate call
    pub verbose: bool,

    /// Number of `allocate` calls served before every further request fails
    /// with `LimitExceeded`
    pub allocation_limit: Option<u64>,

    /// Handling of foreign or repeated deallocations
    pub misuse: MisusePolicy,

    /// Warn about outstanding blocks when the allocator is dropped
    pub report_leaks_on_drop: bool,

    /// Fill pattern byte for newly allocated memory
    pub alloc_pattern: Option<u8>,
    /// Fill pattern byte for memory about to be released
    pub dealloc_pattern: Option<u8>,
}

impl Default for TestAllocatorConfig {
    fn default() -> Self {
        Self {
            name: Cow::Borrowed("test"),
            verbose: false,
            allocation_limit: None,
            misuse: MisusePolicy::Panic,
            report_leaks_on_drop: true,
            alloc_pattern: if cfg!(debug_assertions) {
                Some(0xA5)
            } else {
                None
            },
            dealloc_pattern: if cfg!(debug_assertions) {
                Some(0x5A)
            } else {
                None
            },
        }
    }
}

impl TestAllocatorConfig {
    /// Quiet configuration - no tracing, no scribbling, no leak report
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            verbose: false,
            report_leaks_on_drop: false,
            alloc_pattern: None,
            dealloc_pattern: None,
            ..Self::default()
        }
    }

    /// Verbose configuration - trace every call and scribble all memory
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            verbose: true,
            report_leaks_on_drop: true,
            alloc_pattern: Some(0xA5),
            dealloc_pattern: Some(0x5A),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_allocation_limit(mut self, limit: u64) -> Self {
        self.allocation_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_misuse_policy(mut self, misuse: MisusePolicy) -> Self {
        self.misuse = misuse;
        self
    }
}
