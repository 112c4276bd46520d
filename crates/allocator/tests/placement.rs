//! Placement construction under constructor failure
#![allow(unsafe_code)]

use std::panic::{self, AssertUnwindSafe};

use nebula_allocator::allocator::{
    AllocError, Allocator, AllocatorExt, TestAllocator, TestAllocatorConfig,
};
use nebula_allocator::placement::{FootprintGuard, delete_at, new_at, new_object_with};
use pretty_assertions::assert_eq;

fn quiet() -> TestAllocator {
    TestAllocator::with_config(TestAllocatorConfig::quiet())
}

#[derive(Debug, PartialEq)]
struct ConstructorPanic {
    code: u32,
}

#[derive(Debug)]
struct Widget {
    parts: Vec<u16>,
}

#[test]
fn panic_in_constructor_returns_the_footprint() {
    let allocator = quiet();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        new_object_with(&allocator, || -> Widget {
            panic::panic_any(ConstructorPanic { code: 77 })
        })
    }));

    let payload = outcome.unwrap_err();
    assert_eq!(
        payload.downcast_ref::<ConstructorPanic>(),
        Some(&ConstructorPanic { code: 77 })
    );
    assert_eq!(allocator.num_allocations(), 1);
    assert_eq!(allocator.num_deallocations(), 1);
    assert_eq!(
        allocator.last_deallocated_address(),
        allocator.last_allocated_address()
    );
    assert_eq!(allocator.num_blocks_in_use(), 0);
}

#[test]
fn error_from_constructor_is_returned_unchanged() {
    #[derive(Debug, PartialEq)]
    #[allow(dead_code)]
    enum WidgetError {
        Memory(AllocError),
        TooManyParts(usize),
    }

    impl From<AllocError> for WidgetError {
        fn from(error: AllocError) -> Self {
            Self::Memory(error)
        }
    }

    let allocator = quiet();
    let parts = vec![1_u16; 12];
    let result = allocator.try_new_object_with(|| {
        if parts.len() > 8 {
            Err(WidgetError::TooManyParts(parts.len()))
        } else {
            Ok(Widget {
                parts: parts.clone(),
            })
        }
    });

    assert_eq!(result.unwrap_err(), WidgetError::TooManyParts(12));
    assert_eq!(allocator.num_allocations(), 1);
    assert_eq!(allocator.num_deallocations(), 1);
    assert_eq!(allocator.num_blocks_in_use(), 0);
}

#[test]
fn allocation_failure_skips_the_constructor() {
    let allocator =
        TestAllocator::with_config(TestAllocatorConfig::quiet().with_allocation_limit(0));
    let mut constructed = false;

    let error = allocator
        .new_object_with(|| {
            constructed = true;
            Widget { parts: Vec::new() }
        })
        .unwrap_err();

    assert!(!constructed);
    assert!(error.is_retryable());
    assert_eq!(allocator.num_failures(), 1);
    assert_eq!(allocator.num_deallocations(), 0);
}

#[test]
fn successful_construction_transfers_ownership() {
    let allocator = quiet();
    let widget = allocator
        .new_object_with(|| Widget {
            parts: vec![3, 4],
        })
        .unwrap();

    assert_eq!(allocator.num_blocks_in_use(), 1);
    assert_eq!(unsafe { &widget.as_ref().parts }, &vec![3, 4]);

    unsafe { allocator.destroy_and_deallocate_raw(widget) };
    assert_eq!(allocator.num_blocks_in_use(), 0);
}

#[test]
fn guard_releases_on_unwind() {
    let allocator = quiet();

    let outcome: std::thread::Result<()> = panic::catch_unwind(AssertUnwindSafe(|| {
        let guard = FootprintGuard::acquire(&allocator, 40).unwrap();
        assert!(allocator.owns(guard.address()));
        panic::panic_any(ConstructorPanic { code: 1 });
    }));

    assert!(outcome.is_err());
    assert_eq!(allocator.num_blocks_in_use(), 0);
}

#[test]
fn new_at_is_allocate() {
    let allocator = quiet();
    let address = new_at(&allocator, 0).unwrap();
    assert!(address.is_null());
    assert_eq!(allocator.num_allocations(), 1);

    let address = new_at(&allocator as &dyn Allocator, 64).unwrap();
    assert_eq!(allocator.last_allocated_size(), 64);
    unsafe { delete_at(&allocator, address) };
    assert_eq!(allocator.num_blocks_in_use(), 0);
}
