//! Property tests for array growth, sorting and slot addressing.

#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]

use std::cell::RefCell;
use std::ptr::NonNull;
use std::rc::Rc;

use proptest::prelude::*;
use scoped_array::{Array, RawArray, Resize, SystemResize};

/// Forwards to the system resize primitive and records the size of every request.
#[derive(Clone, Debug, Default)]
struct RecordingResize {
    inner: SystemResize,
    requests: Rc<RefCell<Vec<usize>>>,
}

impl RecordingResize {
    fn requests(&self) -> Vec<usize> {
        self.requests.borrow().clone()
    }
}

unsafe impl Resize for RecordingResize {
    unsafe fn resize(
        &mut self,
        existing: Option<NonNull<u8>>,
        byte_size: usize,
    ) -> Option<NonNull<u8>> {
        self.requests.borrow_mut().push(byte_size);
        unsafe { self.inner.resize(existing, byte_size) }
    }

    unsafe fn release(&mut self, block: NonNull<u8>) {
        unsafe { self.inner.release(block) };
    }
}

fn push<R: Resize>(array: &mut RawArray<R>, value: u64) -> NonNull<u8> {
    let slot = unsafe { array.append(size_of::<u64>()) }.unwrap();
    unsafe { slot.cast::<u64>().write(value) };
    slot
}

fn read<R: Resize>(array: &RawArray<R>, index: usize) -> u64 {
    let slot = array.slot(index, size_of::<u64>()).unwrap();
    unsafe { slot.cast::<u64>().read() }
}

proptest! {
    #[test]
    fn appended_values_read_back_through_current_storage(count in 0_usize..=1000) {
        let mut array = RawArray::new();

        for index in 0..count {
            let value = index as u64 * 7;
            let slot = push(&mut array, value);

            // Readable through the slot just returned, before any further append.
            prop_assert_eq!(unsafe { slot.cast::<u64>().read() }, value);
        }

        prop_assert_eq!(array.len(), count);

        for index in 0..count {
            prop_assert_eq!(read(&array, index), index as u64 * 7);
        }
    }

    #[test]
    fn one_resize_per_started_increment(count in 0_usize..=1000) {
        let resize = RecordingResize::default();
        let mut array = RawArray::with_resize(resize.clone());

        for index in 0..count {
            push(&mut array, index as u64);
        }

        let requests = resize.requests();
        prop_assert_eq!(requests.len(), count.div_ceil(16));

        for (step, byte_size) in requests.iter().enumerate() {
            prop_assert_eq!(*byte_size, (step + 1) * 16 * size_of::<u64>());
        }
    }

    #[test]
    fn sort_orders_every_element(values in proptest::collection::vec(any::<i32>(), 1..200)) {
        let mut array = Array::new();

        for value in &values {
            array.append(*value).unwrap();
        }

        array.sort();

        let mut expected = values.clone();
        expected.sort_unstable();

        prop_assert_eq!(array.as_slice(), expected.as_slice());
        prop_assert!(array.as_slice().is_sorted());
    }

    #[test]
    fn reset_then_append_matches_fresh_array(
        first_round in 0_usize..100,
        value in any::<u64>(),
    ) {
        let used_resize = RecordingResize::default();
        let mut used = RawArray::with_resize(used_resize.clone());

        for index in 0..first_round {
            push(&mut used, index as u64);
        }

        used.reset();
        used.reset();
        let requests_before = used_resize.requests().len();

        let fresh_resize = RecordingResize::default();
        let mut fresh = RawArray::with_resize(fresh_resize.clone());

        push(&mut used, value);
        push(&mut fresh, value);

        prop_assert_eq!(used.len(), fresh.len());
        prop_assert_eq!(used.capacity(), fresh.capacity());
        prop_assert_eq!(read(&used, 0), read(&fresh, 0));
        let used_requests = used_resize.requests();
        let fresh_requests = fresh_resize.requests();
        prop_assert_eq!(&used_requests[requests_before..], fresh_requests.as_slice());
    }

    #[test]
    fn slot_addresses_are_stable_between_growth_events(count in 1_usize..300) {
        let mut array = RawArray::new();
        let mut storage = None;

        for index in 0..count {
            let grows = index % 16 == 0;
            push(&mut array, index as u64);

            if grows {
                // Any address taken before this append may now be dangling.
                storage = array.storage();
            }

            // Between growth events the storage does not move, so every slot is still found
            // at its original offset from the block start.
            prop_assert_eq!(array.storage(), storage);

            let base = storage.unwrap().as_ptr().addr();
            let slot = array.slot(index, size_of::<u64>()).unwrap().as_ptr().addr();
            prop_assert_eq!(slot, base + index * size_of::<u64>());
        }
    }
}
