//! Integration tests for the `scoped_array` package.
//!
//! These exercise the public API end to end: the untyped engine, the typed facade and
//! scope-bound arrays, observed through an instrumented resize primitive.

#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::rc::Rc;

use scoped_array::{
    AllocationFailureReason, Array, Error, GROWTH_INCREMENT, RawArray, Resize, Scope,
    ScopeAllocator, SystemResize, create_scoped_array_with, define_array_type,
};

#[derive(Debug, Default)]
struct Log {
    requests: Vec<usize>,
    releases: usize,
    live_blocks: usize,
}

/// Forwards to the system resize primitive and records every call.
#[derive(Clone, Debug, Default)]
struct InstrumentedResize {
    inner: SystemResize,
    log: Rc<RefCell<Log>>,
    refuse_above: Option<usize>,
}

impl InstrumentedResize {
    fn refusing_above(byte_size: usize) -> Self {
        Self {
            refuse_above: Some(byte_size),
            ..Self::default()
        }
    }

    fn requests(&self) -> Vec<usize> {
        self.log.borrow().requests.clone()
    }

    fn releases(&self) -> usize {
        self.log.borrow().releases
    }

    fn live_blocks(&self) -> usize {
        self.log.borrow().live_blocks
    }
}

unsafe impl Resize for InstrumentedResize {
    unsafe fn resize(
        &mut self,
        existing: Option<NonNull<u8>>,
        byte_size: usize,
    ) -> Option<NonNull<u8>> {
        let mut log = self.log.borrow_mut();
        log.requests.push(byte_size);

        if self.refuse_above.is_some_and(|limit| byte_size > limit) {
            return None;
        }

        let block = unsafe { self.inner.resize(existing, byte_size) }?;

        if existing.is_none() {
            log.live_blocks += 1;
        }

        Some(block)
    }

    unsafe fn release(&mut self, block: NonNull<u8>) {
        let mut log = self.log.borrow_mut();
        log.releases += 1;
        log.live_blocks -= 1;

        unsafe { self.inner.release(block) };
    }
}

fn push<R: Resize>(array: &mut RawArray<R>, value: u32) {
    let slot = unsafe { array.append(size_of::<u32>()) }.unwrap();
    unsafe { slot.cast::<u32>().write(value) };
}

fn read<R: Resize>(array: &RawArray<R>, index: usize) -> u32 {
    let slot = array.slot(index, size_of::<u32>()).unwrap();
    unsafe { slot.cast::<u32>().read() }
}

#[test]
fn four_values_sort_and_reset() {
    let resize = InstrumentedResize::default();
    let mut array = RawArray::with_resize(resize.clone());

    for value in [5, 3, 9, 1] {
        push(&mut array, value);
    }

    assert_eq!(array.len(), 4);
    assert_eq!(resize.requests(), vec![16 * 4]);

    unsafe {
        array.sort_by(size_of::<u32>(), |a, b| {
            a.cast::<u32>().read().cmp(&b.cast::<u32>().read())
        });
    }

    let sorted: Vec<_> = (0..4).map(|index| read(&array, index)).collect();
    assert_eq!(sorted, vec![1, 3, 5, 9]);

    array.reset();
    assert_eq!(array.len(), 0);

    let slot = unsafe { array.append(size_of::<u32>()) }.unwrap();
    assert_eq!(Some(slot), array.storage());
}

#[test]
fn seventeenth_append_grows_to_thirty_two() {
    let resize = InstrumentedResize::default();
    let mut array = RawArray::with_resize(resize.clone());

    for value in 0..16 {
        push(&mut array, value);
    }

    assert_eq!(resize.requests(), vec![16 * 4]);
    assert_eq!(array.capacity(), 16);

    push(&mut array, 16);
    assert_eq!(resize.requests(), vec![16 * 4, 32 * 4]);
    assert_eq!(array.capacity(), 32);

    for value in 17..49 {
        push(&mut array, value);
    }

    assert_eq!(
        resize.requests(),
        vec![16 * 4, 32 * 4, 48 * 4, 64 * 4]
    );

    for index in 0..49 {
        assert_eq!(read(&array, index), u32::try_from(index).unwrap());
    }
}

#[test]
fn scoped_array_released_exactly_once() {
    let resize = InstrumentedResize::default();

    {
        let scope = Scope::builder().name("request").build();
        let array = create_scoped_array_with(&scope, resize.clone()).unwrap();

        for value in [10, 20, 30] {
            push(array, value);
        }

        assert_eq!(array.len(), 3);
        assert_eq!(resize.live_blocks(), 1);
    }

    assert_eq!(resize.releases(), 1);
    assert_eq!(resize.live_blocks(), 0);
}

#[test]
fn failed_growth_is_reported_and_recoverable() {
    let resize = InstrumentedResize::refusing_above(16 * 4);
    let mut array = RawArray::with_resize(resize.clone());

    for value in 0..16 {
        push(&mut array, value);
    }

    let storage = array.storage();
    let error = unsafe { array.append(size_of::<u32>()) }.unwrap_err();

    assert_eq!(
        error,
        Error::AllocationFailure {
            element_size: 4,
            element_count: 16,
            reason: AllocationFailureReason::ResizeFailed { byte_size: 32 * 4 },
        }
    );
    assert_eq!(array.len(), 16);
    assert_eq!(array.storage(), storage);
    assert_eq!(read(&array, 15), 15);

    drop(array);
    assert_eq!(resize.live_blocks(), 0);
}

#[test]
fn overflowing_element_size_fails_without_resizing() {
    let resize = InstrumentedResize::default();
    let mut array = RawArray::with_resize(resize.clone());

    let error = unsafe { array.append(usize::MAX / 8) }.unwrap_err();

    assert_eq!(error.reason(), AllocationFailureReason::SizeOverflow);
    assert!(resize.requests().is_empty());
    assert!(array.is_empty());
    assert!(array.storage().is_none());
}

#[test]
fn nested_units_of_work_release_in_reverse_order() {
    let journal = Rc::new(RefCell::new(Vec::new()));
    let outer_resize = InstrumentedResize::default();
    let inner_resize = InstrumentedResize::default();

    let mut scope = Scope::new();

    let outer = create_scoped_array_with(&scope, outer_resize.clone()).unwrap();
    push(outer, 1);

    let checkpoint = scope.generation();

    let inner = create_scoped_array_with(&scope, inner_resize.clone()).unwrap();
    push(inner, 2);

    let observed = Rc::clone(&journal);
    let probe = inner_resize.clone();
    scope.defer(move || observed.borrow_mut().push(probe.releases()));

    scope.rollback_to(checkpoint);

    // The deferred action ran before the array registered ahead of it.
    assert_eq!(*journal.borrow(), vec![0]);
    assert_eq!(inner_resize.releases(), 1);
    assert_eq!(outer_resize.releases(), 0);

    drop(scope);
    assert_eq!(outer_resize.releases(), 1);
}

#[test]
fn unit_of_work_exiting_with_error_releases_everything() {
    let resize = InstrumentedResize::refusing_above(16 * 8);

    let result = Scope::new().run(|scope| {
        let array = Array::<u64, _>::with_resize(resize.clone());
        let array = scope.allocate_with_release(array, Array::reset)?;

        for value in 0..100 {
            array.append(value)?;
        }

        Ok::<(), Error>(())
    });

    assert_eq!(
        result.unwrap_err().reason(),
        AllocationFailureReason::ResizeFailed { byte_size: 32 * 8 }
    );
    assert_eq!(resize.releases(), 1);
    assert_eq!(resize.live_blocks(), 0);
}

#[test]
fn panicking_unit_of_work_releases_everything() {
    let resize = InstrumentedResize::default();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        Scope::new().run::<_, ()>(|scope| {
            let array = create_scoped_array_with(scope, resize.clone()).unwrap();
            push(array, 1);

            panic!("unit of work failed");
        })
    }));

    result.unwrap_err();
    assert_eq!(resize.releases(), 1);
}

#[test]
fn typed_arrays_in_a_scope() {
    define_array_type! {
        struct Names(String);
    }

    let scope = Scope::new();

    let numbers = Array::<i64>::new_in(&scope).unwrap();
    let names = Names::new_in(&scope).unwrap();
    let label = scope.copy_str("numbers").unwrap();

    for value in [3, -1, 2] {
        numbers.append(value).unwrap();
    }

    for name in ["carol", "alice", "bob"] {
        names.append(name.to_string()).unwrap();
    }

    numbers.sort();
    names.sort_by(Ord::cmp);

    assert_eq!(numbers.as_slice(), &[-1, 2, 3]);
    assert_eq!(names.as_slice(), &["alice", "bob", "carol"]);
    assert_eq!(label, "numbers");
}

#[test]
fn growth_increment_is_sixteen() {
    assert_eq!(GROWTH_INCREMENT.get(), 16);
}
