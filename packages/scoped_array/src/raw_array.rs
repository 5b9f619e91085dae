use std::cmp::Ordering;
use std::fmt;
use std::num::NonZero;
use std::ptr::{self, NonNull};

use new_zealand::nz;
use tracing::{debug, trace};

use crate::error::Result;
use crate::{AllocationFailureReason, Error, Resize, SystemResize, safe_add, safe_multiply};

/// Number of element slots an array gains each time it runs out of capacity.
///
/// Growth is linear, not geometric.
pub const GROWTH_INCREMENT: NonZero<usize> = nz!(16);

/// An append-only growable array that knows nothing about its elements except their size.
///
/// This is the engine behind the typed [`Array<T>`][crate::Array] facade. It stores elements
/// contiguously in a single block obtained from a [`Resize`] primitive and grows that block by
/// [`GROWTH_INCREMENT`] elements whenever the element count reaches a multiple of the increment
/// (including zero, so the first append always allocates).
///
/// Capacity is not stored. It is always the element count rounded up to the next multiple of
/// the growth increment.
///
/// # Slot invalidation
///
/// An append that grows the array may move its storage. Every slot pointer obtained earlier
/// (from [`append()`](Self::append), [`slot()`](Self::slot) or [`storage()`](Self::storage))
/// becomes dangling at that moment. Re-derive addresses from the array after each append.
///
/// # Examples
///
/// ```
/// use scoped_array::RawArray;
///
/// let mut array = RawArray::new();
///
/// for value in [5_u32, 3, 9, 1] {
///     // SAFETY: Every append on this array uses the size of u32.
///     let slot = unsafe { array.append(size_of::<u32>()) }.unwrap();
///
///     // SAFETY: The slot is valid for writes of one u32 and suitably aligned.
///     unsafe { slot.cast::<u32>().write(value) };
/// }
///
/// // SAFETY: All four slots were populated with u32 values.
/// unsafe {
///     array.sort_by(size_of::<u32>(), |a, b| a.cast::<u32>().read().cmp(&b.cast::<u32>().read()));
/// }
///
/// let first = array.slot(0, size_of::<u32>()).unwrap();
/// // SAFETY: Slot 0 is populated and no append happened since it was obtained.
/// assert_eq!(unsafe { first.cast::<u32>().read() }, 1);
/// ```
///
/// # Thread safety
///
/// The array is thread-mobile ([`Send`]) if its resize primitive is, but not thread-safe
/// ([`Sync`]). It assumes a single owner with exclusive access.
pub struct RawArray<R: Resize = SystemResize> {
    /// Block holding `element_count` elements, `None` until the first growth after creation
    /// or reset.
    storage: Option<NonNull<u8>>,

    element_count: usize,

    resize: R,
}

impl RawArray {
    /// Creates an empty array that obtains its storage from [`SystemResize`].
    ///
    /// No memory is allocated until the first append.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_resize(SystemResize::new())
    }
}

impl<R: Resize> RawArray<R> {
    /// Creates an empty array that obtains its storage from the given resize primitive.
    #[must_use]
    pub const fn with_resize(resize: R) -> Self {
        Self {
            storage: None,
            element_count: 0,
            resize,
        }
    }

    /// Number of elements appended since creation or the last reset.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.element_count
    }

    /// Whether the array holds no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.element_count == 0
    }

    /// Number of elements the current storage can hold without growing.
    #[must_use]
    pub fn capacity(&self) -> usize {
        if self.storage.is_none() {
            return 0;
        }

        self.element_count.next_multiple_of(GROWTH_INCREMENT.get())
    }

    /// The current storage block, if any growth has happened since creation or reset.
    ///
    /// The pointer is invalidated by the next append that grows the array.
    #[must_use]
    #[inline]
    pub fn storage(&self) -> Option<NonNull<u8>> {
        self.storage
    }

    /// Address of the element at `index`, or `None` if `index` is out of bounds.
    ///
    /// `element_size` must be the size used when appending for the address to be meaningful.
    /// The pointer is invalidated by the next append that grows the array.
    #[must_use]
    pub fn slot(&self, index: usize, element_size: usize) -> Option<NonNull<u8>> {
        if index >= self.element_count {
            return None;
        }

        let storage = self.storage?;
        let offset = safe_multiply(index, element_size)?;

        // wrapping_add() keeps this sound even if the caller passes a mismatched size.
        NonNull::new(storage.as_ptr().wrapping_add(offset))
    }

    /// Appends one uninitialized element slot and returns its address.
    ///
    /// If the element count is a multiple of [`GROWTH_INCREMENT`], the storage is first resized
    /// to hold `element_count + GROWTH_INCREMENT` elements. Both the new capacity and its size
    /// in bytes are overflow-checked before the resize primitive is called.
    ///
    /// The returned slot is `element_size` bytes long, aligned to
    /// [`MAX_ELEMENT_ALIGN`][crate::MAX_ELEMENT_ALIGN] plus a multiple of `element_size`, and
    /// uninitialized. The caller is expected to fully populate it.
    ///
    /// Growth may move the storage, invalidating every previously obtained slot address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if a size calculation overflows or the resize
    /// primitive fails. In that case the array is left exactly as it was before the call.
    ///
    /// # Safety
    ///
    /// Every append since the array was created or last reset must use the same
    /// `element_size`.
    pub unsafe fn append(&mut self, element_size: usize) -> Result<NonNull<u8>> {
        let storage = match self.storage {
            Some(storage) if self.element_count % GROWTH_INCREMENT != 0 => storage,
            _ => self.grow(element_size)?,
        };

        // Cannot overflow: the block was sized for at least element_count + 1 elements of this
        // size, and that product was overflow-checked when the block was requested.
        let offset = self.element_count.wrapping_mul(element_size);

        // SAFETY: The offset is within the block, as established above, given the caller's
        // guarantee that element_size has not changed since the block was sized.
        let slot = unsafe { storage.add(offset) };

        self.element_count = self.element_count.wrapping_add(1);

        Ok(slot)
    }

    /// Makes room for `GROWTH_INCREMENT` more elements and returns the new storage.
    /// Leaves `self` untouched on failure.
    #[cold]
    fn grow(&mut self, element_size: usize) -> Result<NonNull<u8>> {
        let element_count = self.element_count;

        let failure = |reason| Error::AllocationFailure {
            element_size,
            element_count,
            reason,
        };

        let new_capacity = safe_add(element_count, GROWTH_INCREMENT.get())
            .ok_or_else(|| failure(AllocationFailureReason::CapacityOverflow))?;

        let byte_size = safe_multiply(new_capacity, element_size)
            .ok_or_else(|| failure(AllocationFailureReason::SizeOverflow))?;

        // SAFETY: Our storage is either None or a live block from this same resize primitive.
        let Some(storage) = (unsafe { self.resize.resize(self.storage, byte_size) }) else {
            debug!(element_count, byte_size, "array growth failed");
            return Err(failure(AllocationFailureReason::ResizeFailed { byte_size }));
        };

        trace!(element_count, new_capacity, byte_size, "array storage grown");

        self.storage = Some(storage);
        Ok(storage)
    }

    /// Sorts all elements in place, using `compare` to order pairs of element slots.
    ///
    /// The sort is not stable and does not allocate. Sorting an empty array does nothing.
    ///
    /// # Safety
    ///
    /// Every element must have been fully initialized, `element_size` must be the size used
    /// when appending, and `compare` must only read `element_size` bytes from each slot.
    pub unsafe fn sort_by<F>(&mut self, element_size: usize, mut compare: F)
    where
        F: FnMut(NonNull<u8>, NonNull<u8>) -> Ordering,
    {
        let Some(storage) = self.storage else {
            return;
        };

        // Zero-sized elements are indistinguishable, so any order is sorted.
        if element_size == 0 {
            return;
        }

        let slots = ErasedSlots {
            base: storage,
            element_size,
        };

        // SAFETY: The array holds element_count initialized elements of element_size bytes,
        // as guaranteed by the caller, which is all ErasedSlots requires.
        unsafe {
            slots.heapsort(self.element_count, &mut compare);
        }
    }

    /// Releases the storage and returns the array to its empty state.
    ///
    /// Calling this on an empty array does nothing. The array can be reused afterwards and
    /// behaves exactly like a newly created one.
    pub fn reset(&mut self) {
        if let Some(storage) = self.storage.take() {
            // SAFETY: The block came from this resize primitive and has not been released;
            // we just took it out of the array so it cannot be released twice.
            unsafe {
                self.resize.release(storage);
            }
        }

        self.element_count = 0;
    }

    #[cfg(test)]
    pub(crate) fn from_raw_parts(
        storage: Option<NonNull<u8>>,
        element_count: usize,
        resize: R,
    ) -> Self {
        Self {
            storage,
            element_count,
            resize,
        }
    }
}

impl Default for RawArray {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resize> Drop for RawArray<R> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<R: Resize> fmt::Debug for RawArray<R> {
    #[cfg_attr(test, mutants::skip)] // Cosmetic, no API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawArray")
            .field("storage", &self.storage)
            .field("element_count", &self.element_count)
            .field("resize", &self.resize)
            .finish()
    }
}

// SAFETY: The array exclusively owns its storage block, so moving it to another thread moves
// the only access path to that block. The resize primitive moves with it, hence the bound.
unsafe impl<R: Resize + Send> Send for RawArray<R> {}

/// A view over `element_size`-byte slots starting at `base`, for sorting without types.
struct ErasedSlots {
    base: NonNull<u8>,
    element_size: usize,
}

#[expect(
    clippy::arithmetic_side_effects,
    clippy::integer_division,
    reason = "indexes are bounded by the element count, whose byte size was overflow-checked"
)]
#[expect(
    clippy::multiple_unsafe_ops_per_block,
    reason = "each unsafe block covers slots that share one bounds check"
)]
impl ErasedSlots {
    /// # Safety
    ///
    /// `index` must be within the sorted range.
    unsafe fn at(&self, index: usize) -> NonNull<u8> {
        // SAFETY: Forwarding the caller's guarantee that the slot is in bounds.
        unsafe { self.base.add(index * self.element_size) }
    }

    /// # Safety
    ///
    /// Both indexes must be within the sorted range.
    unsafe fn swap(&self, a: usize, b: usize) {
        if a == b {
            return;
        }

        // SAFETY: Distinct in-bounds slots never overlap. Forwarding the bounds guarantee.
        unsafe {
            ptr::swap_nonoverlapping(
                self.at(a).as_ptr(),
                self.at(b).as_ptr(),
                self.element_size,
            );
        }
    }

    /// In-place heapsort of the first `count` slots into ascending order.
    ///
    /// Every step is a complete swap, so a panicking comparator leaves all elements intact.
    ///
    /// # Safety
    ///
    /// The first `count` slots must hold initialized elements.
    unsafe fn heapsort<F>(&self, count: usize, compare: &mut F)
    where
        F: FnMut(NonNull<u8>, NonNull<u8>) -> Ordering,
    {
        if count < 2 {
            return;
        }

        // SAFETY: All indexes passed below are less than count.
        unsafe {
            for root in (0..count / 2).rev() {
                self.sift_down(root, count, compare);
            }

            for end in (1..count).rev() {
                self.swap(0, end);
                self.sift_down(0, end, compare);
            }
        }
    }

    /// Restores the max-heap property for the subtree at `root` within the first `end` slots.
    ///
    /// # Safety
    ///
    /// `end` must not exceed the number of initialized slots.
    unsafe fn sift_down<F>(&self, mut root: usize, end: usize, compare: &mut F)
    where
        F: FnMut(NonNull<u8>, NonNull<u8>) -> Ordering,
    {
        loop {
            let left = 2 * root + 1;
            if left >= end {
                return;
            }

            let right = left + 1;

            // SAFETY: root < left < end, and right is checked against end before use.
            unsafe {
                let mut child = left;
                if right < end && compare(self.at(left), self.at(right)) == Ordering::Less {
                    child = right;
                }

                if compare(self.at(root), self.at(child)) != Ordering::Less {
                    return;
                }

                self.swap(root, child);
                root = child;
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::arithmetic_side_effects,
    clippy::integer_division,
    clippy::cast_possible_truncation,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::testing::{OfflineResize, TrackingResize};

    assert_impl_all!(RawArray: Send, Default);
    assert_not_impl_any!(RawArray: Sync, Clone);

    const U32_SIZE: usize = size_of::<u32>();

    fn push<R: Resize>(array: &mut RawArray<R>, value: u32) {
        let slot = unsafe { array.append(U32_SIZE) }.unwrap();
        unsafe { slot.cast::<u32>().write(value) };
    }

    fn read<R: Resize>(array: &RawArray<R>, index: usize) -> u32 {
        let slot = array.slot(index, U32_SIZE).unwrap();
        unsafe { slot.cast::<u32>().read() }
    }

    fn contents<R: Resize>(array: &RawArray<R>) -> Vec<u32> {
        (0..array.len()).map(|index| read(array, index)).collect()
    }

    fn sort<R: Resize>(array: &mut RawArray<R>) {
        unsafe {
            array.sort_by(U32_SIZE, |a, b| {
                a.cast::<u32>().read().cmp(&b.cast::<u32>().read())
            });
        }
    }

    #[test]
    fn new_array_is_empty_and_unallocated() {
        let resize = TrackingResize::new();
        let array = RawArray::with_resize(resize.clone());

        assert_eq!(array.len(), 0);
        assert!(array.is_empty());
        assert_eq!(array.capacity(), 0);
        assert!(array.storage().is_none());
        assert!(resize.requests().is_empty());
    }

    #[test]
    fn growing_append_returns_slot_in_new_storage() {
        let mut array = RawArray::new();

        let first = unsafe { array.append(U32_SIZE) }.unwrap();
        assert_eq!(Some(first), array.storage());

        for value in 1..16 {
            push(&mut array, value);
        }

        let seventeenth = unsafe { array.append(U32_SIZE) }.unwrap();
        let storage = array.storage().unwrap();
        assert_eq!(seventeenth, unsafe { storage.add(16 * U32_SIZE) });
        assert_eq!(array.capacity(), 32);

        array.reset();

        let after_reset = unsafe { array.append(U32_SIZE) }.unwrap();
        assert_eq!(Some(after_reset), array.storage());
        assert_eq!(array.capacity(), 16);
    }

    #[test]
    fn scenario_append_sort_reset() {
        let resize = TrackingResize::new();
        let mut array = RawArray::with_resize(resize.clone());

        for value in [5, 3, 9, 1] {
            push(&mut array, value);
        }

        assert_eq!(array.len(), 4);
        assert_eq!(array.capacity(), 16);
        assert_eq!(resize.requests(), vec![16 * U32_SIZE]);

        sort(&mut array);
        assert_eq!(contents(&array), vec![1, 3, 5, 9]);

        array.reset();
        assert_eq!(array.len(), 0);
        assert_eq!(resize.releases(), 1);

        push(&mut array, 42);
        assert_eq!(array.slot(0, U32_SIZE), array.storage());
        assert_eq!(read(&array, 0), 42);
    }

    #[test]
    fn growth_happens_at_multiples_of_increment() {
        let resize = TrackingResize::new();
        let mut array = RawArray::with_resize(resize.clone());

        for value in 0..16 {
            push(&mut array, value);
        }

        assert_eq!(resize.requests().len(), 1);
        assert_eq!(array.capacity(), 16);

        push(&mut array, 16);
        assert_eq!(resize.requests(), vec![16 * U32_SIZE, 32 * U32_SIZE]);
        assert_eq!(array.capacity(), 32);
        assert_eq!(read(&array, 16), 16);

        for value in 17..49 {
            push(&mut array, value);
        }

        assert_eq!(
            resize.requests(),
            vec![16 * U32_SIZE, 32 * U32_SIZE, 48 * U32_SIZE, 64 * U32_SIZE]
        );
        assert_eq!(contents(&array), (0..49).collect::<Vec<_>>());
    }

    #[test]
    fn growth_request_matches_element_size() {
        for element_size in [1, 3, 8, 24, 1000] {
            let resize = TrackingResize::new();
            let mut array = RawArray::with_resize(resize.clone());

            for _ in 0..17 {
                let slot = unsafe { array.append(element_size) }.unwrap();
                unsafe { slot.as_ptr().write_bytes(0xAB, element_size) };
            }

            assert_eq!(
                resize.requests(),
                vec![16 * element_size, 32 * element_size],
                "element size {element_size}"
            );
        }
    }

    #[test]
    fn slots_are_contiguous() {
        let mut array = RawArray::new();

        let first = unsafe { array.append(U32_SIZE) }.unwrap();
        let second = unsafe { array.append(U32_SIZE) }.unwrap();

        assert_eq!(second.as_ptr().addr() - first.as_ptr().addr(), U32_SIZE);
    }

    #[test]
    fn failed_resize_leaves_array_untouched() {
        // The first request succeeds, the second (at 16 elements) fails.
        let resize = TrackingResize::failing_at(1);
        let mut array = RawArray::with_resize(resize.clone());

        for value in 0..16 {
            push(&mut array, value);
        }

        let storage_before = array.storage();

        let result = unsafe { array.append(U32_SIZE) };
        let error = result.unwrap_err();

        assert_eq!(
            error,
            Error::AllocationFailure {
                element_size: U32_SIZE,
                element_count: 16,
                reason: AllocationFailureReason::ResizeFailed {
                    byte_size: 32 * U32_SIZE
                },
            }
        );
        assert_eq!(array.len(), 16);
        assert_eq!(array.storage(), storage_before);
        assert_eq!(contents(&array), (0..16).collect::<Vec<_>>());

        // A later attempt may succeed and the earlier elements are still there.
        push(&mut array, 16);
        assert_eq!(contents(&array), (0..17).collect::<Vec<_>>());

        drop(array);
        assert_eq!(resize.releases(), 1);
        assert_eq!(resize.live_blocks(), 0);
    }

    #[test]
    fn first_append_failure_leaves_array_empty() {
        let resize = TrackingResize::failing_at(0);
        let mut array = RawArray::with_resize(resize.clone());

        let error = unsafe { array.append(U32_SIZE) }.unwrap_err();

        assert_eq!(
            error.reason(),
            AllocationFailureReason::ResizeFailed {
                byte_size: 16 * U32_SIZE
            }
        );
        assert!(array.is_empty());
        assert!(array.storage().is_none());

        drop(array);
        assert_eq!(resize.releases(), 0);
    }

    #[test]
    fn byte_size_overflow_on_first_append() {
        let resize = OfflineResize::new();
        let mut array = RawArray::with_resize(resize.clone());

        let element_size = usize::MAX / 8;
        let error = unsafe { array.append(element_size) }.unwrap_err();

        assert_eq!(error.reason(), AllocationFailureReason::SizeOverflow);
        assert!(array.is_empty());
        assert!(array.storage().is_none());
        assert!(resize.requests().is_empty());
    }

    #[test]
    fn byte_size_overflow_on_later_growth() {
        let resize = OfflineResize::new();
        let storage = Some(OfflineResize::fake_block());

        // 16 elements of this size fit in usize, 32 do not.
        let element_size = usize::MAX / 20;
        let mut array = RawArray::from_raw_parts(storage, 16, resize.clone());

        let error = unsafe { array.append(element_size) }.unwrap_err();

        assert_eq!(
            error,
            Error::AllocationFailure {
                element_size,
                element_count: 16,
                reason: AllocationFailureReason::SizeOverflow,
            }
        );
        assert_eq!(array.len(), 16);
        assert_eq!(array.storage(), storage);
        assert!(resize.requests().is_empty());
    }

    #[test]
    fn capacity_overflow_is_allocation_failure() {
        let resize = OfflineResize::new();
        let storage = Some(OfflineResize::fake_block());

        // A multiple of 16 whose successor capacity is not representable.
        let element_count = usize::MAX - 15;
        let mut array = RawArray::from_raw_parts(storage, element_count, resize.clone());

        let error = unsafe { array.append(0) }.unwrap_err();

        assert_eq!(error.reason(), AllocationFailureReason::CapacityOverflow);
        assert_eq!(array.len(), element_count);
        assert_eq!(array.storage(), storage);
        assert!(resize.requests().is_empty());

        drop(array);
        assert_eq!(resize.releases(), 1);
    }

    #[test]
    fn reset_is_idempotent() {
        let resize = TrackingResize::new();
        let mut array = RawArray::with_resize(resize.clone());

        array.reset();
        assert_eq!(resize.releases(), 0);

        push(&mut array, 1);
        array.reset();
        array.reset();

        assert!(array.is_empty());
        assert!(array.storage().is_none());
        assert_eq!(resize.releases(), 1);
    }

    #[test]
    fn reset_then_append_behaves_like_fresh_array() {
        let resize = TrackingResize::new();
        let mut array = RawArray::with_resize(resize.clone());

        for value in 0..20 {
            push(&mut array, value);
        }

        array.reset();
        push(&mut array, 7);

        assert_eq!(array.len(), 1);
        assert_eq!(array.capacity(), 16);
        assert_eq!(contents(&array), vec![7]);
        // Two requests for the first fill, one fresh 16-element request after reset.
        assert_eq!(
            resize.requests(),
            vec![16 * U32_SIZE, 32 * U32_SIZE, 16 * U32_SIZE]
        );
    }

    #[test]
    fn sort_includes_last_element() {
        let mut array = RawArray::new();

        // Sorting only the first two elements would leave this as [2, 3, 1].
        for value in [2, 3, 1] {
            push(&mut array, value);
        }

        sort(&mut array);
        assert_eq!(contents(&array), vec![1, 2, 3]);
    }

    #[test]
    fn sort_across_growth_boundary() {
        let mut array = RawArray::new();

        for value in (0..40).rev() {
            push(&mut array, value);
        }

        sort(&mut array);
        assert_eq!(contents(&array), (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn sort_empty_and_single_is_noop() {
        let mut array = RawArray::new();
        sort(&mut array);
        assert!(array.is_empty());

        push(&mut array, 5);
        sort(&mut array);
        assert_eq!(contents(&array), vec![5]);
    }

    #[test]
    fn sort_handles_duplicates() {
        let mut array = RawArray::new();

        for value in [3, 1, 3, 2, 1, 3, 2] {
            push(&mut array, value);
        }

        sort(&mut array);
        assert_eq!(contents(&array), vec![1, 1, 2, 2, 3, 3, 3]);
    }

    #[test]
    fn sort_multi_byte_records() {
        const RECORD: usize = 12;

        let mut array = RawArray::new();

        for key in [9_u8, 4, 7, 1] {
            let slot = unsafe { array.append(RECORD) }.unwrap();
            unsafe { slot.as_ptr().write_bytes(key, RECORD) };
        }

        unsafe {
            array.sort_by(RECORD, |a, b| a.read().cmp(&b.read()));
        }

        for (index, key) in [1_u8, 4, 7, 9].into_iter().enumerate() {
            let slot = array.slot(index, RECORD).unwrap();
            let bytes = unsafe { std::slice::from_raw_parts(slot.as_ptr(), RECORD) };
            assert!(bytes.iter().all(|byte| *byte == key), "record {index}");
        }
    }

    #[test]
    fn slot_out_of_bounds_is_none() {
        let mut array = RawArray::new();
        assert!(array.slot(0, U32_SIZE).is_none());

        push(&mut array, 1);
        assert!(array.slot(0, U32_SIZE).is_some());
        assert!(array.slot(1, U32_SIZE).is_none());
    }

    #[test]
    fn zero_sized_elements() {
        let resize = TrackingResize::new();
        let mut array = RawArray::with_resize(resize.clone());

        for _ in 0..17 {
            unsafe { array.append(0) }.unwrap();
        }

        assert_eq!(array.len(), 17);
        assert_eq!(resize.requests(), vec![0, 0]);

        unsafe { array.sort_by(0, |_, _| panic!("zero-sized elements need no comparison")) };
    }

    #[test]
    fn drop_releases_storage_once() {
        let resize = TrackingResize::new();

        {
            let mut array = RawArray::with_resize(resize.clone());
            for value in 0..33 {
                push(&mut array, value);
            }
        }

        assert_eq!(resize.requests().len(), 3);
        assert_eq!(resize.releases(), 1);
        assert_eq!(resize.live_blocks(), 0);
    }

    #[test]
    fn panicking_comparator_keeps_elements_intact() {
        let mut array = RawArray::new();

        for value in [4, 2, 8, 6, 1] {
            push(&mut array, value);
        }

        let mut comparisons = 0;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
            array.sort_by(U32_SIZE, |a, b| {
                comparisons += 1;
                assert!(comparisons < 3, "comparator gives up");
                a.cast::<u32>().read().cmp(&b.cast::<u32>().read())
            });
        }));

        result.unwrap_err();

        let mut values = contents(&array);
        values.sort_unstable();
        assert_eq!(values, vec![1, 2, 4, 6, 8]);
    }
}
