use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use crate::error::Result;
use crate::{MAX_ELEMENT_ALIGN, RawArray, Resize, SystemResize};

/// An append-only growable array of `T`, backed by a [`RawArray`].
///
/// This is a thin typed facade: it fixes the element size to `size_of::<T>()` and forwards to
/// the untyped engine, so growth follows exactly the same policy (16 more slots each time the
/// element count reaches a multiple of 16).
///
/// Unlike the engine, appends take the value to store and return a reference to it, so every
/// element is always initialized. The returned reference borrows the array, which rules out
/// holding on to an element across an append that might move the storage.
///
/// Element types must not need more alignment than [`MAX_ELEMENT_ALIGN`]; this is checked at
/// compile time.
///
/// # Examples
///
/// ```
/// use scoped_array::Array;
///
/// let mut array = Array::new();
///
/// for value in [5, 3, 9, 1] {
///     array.append(value)?;
/// }
///
/// array.sort();
/// assert_eq!(array.as_slice(), &[1, 3, 5, 9]);
///
/// array.reset();
/// assert!(array.is_empty());
/// # Ok::<(), scoped_array::Error>(())
/// ```
pub struct Array<T, R: Resize = SystemResize> {
    inner: RawArray<R>,

    _element: PhantomData<T>,
}

impl<T> Array<T> {
    /// Creates an empty array that obtains its storage from [`SystemResize`].
    #[must_use]
    pub const fn new() -> Self {
        Self::with_resize(SystemResize::new())
    }
}

impl<T, R: Resize> Array<T, R> {
    const ELEMENT_SIZE: usize = size_of::<T>();

    /// Creates an empty array that obtains its storage from the given resize primitive.
    #[must_use]
    pub const fn with_resize(resize: R) -> Self {
        const {
            assert!(
                align_of::<T>() <= MAX_ELEMENT_ALIGN,
                "element type needs more alignment than array storage guarantees"
            );
        }

        Self {
            inner: RawArray::with_resize(resize),
            _element: PhantomData,
        }
    }

    /// Number of elements in the array.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the array holds no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of elements the array can hold before its storage has to grow.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// The untyped engine underneath.
    #[must_use]
    #[inline]
    pub fn as_raw(&self) -> &RawArray<R> {
        &self.inner
    }

    /// Appends `value` and returns a reference to it in its slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`][crate::Error::AllocationFailure] if the array had to
    /// grow and could not. The array keeps its previous contents and `value` is dropped.
    pub fn append(&mut self, value: T) -> Result<&mut T> {
        // SAFETY: Every append on the inner array uses the size of T.
        let slot = unsafe { self.inner.append(Self::ELEMENT_SIZE) }?.cast::<T>();

        // SAFETY: The slot is valid for writes of one T. The storage is aligned to
        // MAX_ELEMENT_ALIGN, which is at least the alignment of T, and the slot offset is a
        // multiple of size_of::<T>(), which is itself a multiple of the alignment of T.
        unsafe {
            slot.write(value);
        }

        // SAFETY: Initialized just above. The borrow is tied to &mut self, so no other access to
        // the array, growth included, can happen while the reference is alive.
        Ok(unsafe { &mut *slot.as_ptr() })
    }

    /// Sorts all elements in place with the given comparison function.
    ///
    /// The sort is not stable.
    pub fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let compare_slots = |a: NonNull<u8>, b: NonNull<u8>| {
            // SAFETY: Every element is an initialized T. The sort does not touch the slots while
            // the comparator holds these references.
            let a = unsafe { a.cast::<T>().as_ref() };
            // SAFETY: As above.
            let b = unsafe { b.cast::<T>().as_ref() };

            compare(a, b)
        };

        // SAFETY: Every element is an initialized T appended with the size of T, and the
        // comparator only reads from the slots.
        unsafe {
            self.inner.sort_by(Self::ELEMENT_SIZE, compare_slots);
        }
    }

    /// Sorts all elements in place in ascending order.
    ///
    /// The sort is not stable.
    pub fn sort(&mut self)
    where
        T: Ord,
    {
        self.sort_by(T::cmp);
    }

    /// Drops all elements, releases the storage and returns the array to its empty state.
    ///
    /// Resetting an empty array does nothing.
    pub fn reset(&mut self) {
        let elements: *mut [T] = self.as_mut_slice();

        // Release the storage even if dropping an element panics.
        let inner = scopeguard::guard(&mut self.inner, |inner| inner.reset());

        // SAFETY: The slice covers exactly the initialized elements. The storage stays alive
        // until the guard above runs and nothing else touches the elements in the meantime.
        unsafe {
            ptr::drop_in_place(elements);
        }

        drop(inner);
    }

    /// The elements as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        match self.inner.storage() {
            // SAFETY: The storage holds len() initialized elements of T, suitably aligned.
            Some(storage) => unsafe {
                slice::from_raw_parts(storage.cast::<T>().as_ptr(), self.inner.len())
            },
            None => &[],
        }
    }

    /// The elements as a mutable slice.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self.inner.storage() {
            // SAFETY: The storage holds len() initialized elements of T, suitably aligned, and
            // we hold the only reference to the array.
            Some(storage) => unsafe {
                slice::from_raw_parts_mut(storage.cast::<T>().as_ptr(), self.inner.len())
            },
            None => &mut [],
        }
    }

    /// Iterates over the elements in order.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Iterates mutably over the elements in order.
    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.as_mut_slice().iter_mut()
    }
}

impl<T> Default for Array<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R: Resize> Drop for Array<T, R> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T, R: Resize> Deref for Array<T, R> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T, R: Resize> DerefMut for Array<T, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<'a, T, R: Resize> IntoIterator for &'a Array<T, R> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, R: Resize> IntoIterator for &'a mut Array<T, R> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T: fmt::Debug, R: Resize> fmt::Debug for Array<T, R> {
    #[cfg_attr(test, mutants::skip)] // Cosmetic, no API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::panic::{self, AssertUnwindSafe};
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::AllocationFailureReason;
    use crate::testing::TrackingResize;

    assert_impl_all!(Array<u32>: Send, Default);
    assert_impl_all!(Array<String>: Send);
    assert_not_impl_any!(Array<u32>: Sync, Clone);
    assert_not_impl_any!(Array<Rc<u32>>: Send);

    /// Counts how many times values of this type have been dropped.
    struct DropCounter {
        drops: Rc<Cell<usize>>,
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn append_returns_reference_to_slot() {
        let mut array = Array::new();

        let slot = array.append(10_u64).unwrap();
        *slot += 5;

        assert_eq!(array.as_slice(), &[15]);
    }

    #[test]
    fn typed_appends_grow_like_the_engine() {
        let resize = TrackingResize::new();
        let mut array = Array::<u64, _>::with_resize(resize.clone());

        for value in 0..33 {
            array.append(value).unwrap();
        }

        assert_eq!(array.len(), 33);
        assert_eq!(array.capacity(), 48);
        assert_eq!(resize.requests(), vec![16 * 8, 32 * 8, 48 * 8]);
        assert_eq!(array.iter().copied().collect::<Vec<_>>(), (0..33).collect::<Vec<_>>());
    }

    #[test]
    fn sort_and_sort_by() {
        let mut array = Array::new();

        for value in [5, 3, 9, 1] {
            array.append(value).unwrap();
        }

        array.sort();
        assert_eq!(array.as_slice(), &[1, 3, 5, 9]);

        array.sort_by(|a, b| b.cmp(a));
        assert_eq!(array.as_slice(), &[9, 5, 3, 1]);
    }

    #[test]
    fn sort_owning_elements() {
        let mut array = Array::new();

        for word in ["pear", "apple", "fig", "banana", "cherry"] {
            array.append(word.to_string()).unwrap();
        }

        array.sort();
        assert_eq!(array.as_slice(), &["apple", "banana", "cherry", "fig", "pear"]);
    }

    #[test]
    fn owning_elements_survive_growth() {
        let mut array = Array::new();

        for value in 0..100 {
            array.append(format!("value {value}")).unwrap();
        }

        for (index, value) in array.iter().enumerate() {
            assert_eq!(*value, format!("value {index}"));
        }
    }

    #[test]
    fn reset_drops_elements_and_releases_storage() {
        let resize = TrackingResize::new();
        let drops = Rc::new(Cell::new(0));
        let mut array = Array::with_resize(resize.clone());

        for _ in 0..20 {
            array
                .append(DropCounter {
                    drops: Rc::clone(&drops),
                })
                .unwrap();
        }

        array.reset();
        assert_eq!(drops.get(), 20);
        assert_eq!(resize.releases(), 1);
        assert!(array.is_empty());

        array.reset();
        assert_eq!(drops.get(), 20);
        assert_eq!(resize.releases(), 1);
    }

    #[test]
    fn drop_drops_elements() {
        let drops = Rc::new(Cell::new(0));

        {
            let mut array = Array::new();
            for _ in 0..3 {
                array
                    .append(DropCounter {
                        drops: Rc::clone(&drops),
                    })
                    .unwrap();
            }
        }

        assert_eq!(drops.get(), 3);
    }

    #[test]
    fn failed_append_keeps_contents_and_drops_value() {
        let resize = TrackingResize::failing_at(1);
        let drops = Rc::new(Cell::new(0));
        let mut array = Array::with_resize(resize.clone());

        for _ in 0..16 {
            array
                .append(DropCounter {
                    drops: Rc::clone(&drops),
                })
                .unwrap();
        }

        let error = array
            .append(DropCounter {
                drops: Rc::clone(&drops),
            })
            .err()
            .unwrap();

        assert_eq!(
            error.reason(),
            AllocationFailureReason::ResizeFailed {
                byte_size: 32 * size_of::<DropCounter>()
            }
        );
        assert_eq!(array.len(), 16);
        assert_eq!(drops.get(), 1);

        drop(array);
        assert_eq!(drops.get(), 17);
        assert_eq!(resize.live_blocks(), 0);
    }

    #[test]
    fn panicking_element_drop_still_releases_storage() {
        struct PanicOnDrop;

        impl Drop for PanicOnDrop {
            fn drop(&mut self) {
                panic!("element refuses to go quietly");
            }
        }

        let resize = TrackingResize::new();
        let mut array = Array::with_resize(resize.clone());
        array.append(PanicOnDrop).unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(|| array.reset()));
        result.unwrap_err();

        assert!(array.is_empty());
        assert_eq!(resize.releases(), 1);
    }

    #[test]
    fn zero_sized_elements() {
        let mut array = Array::new();

        for _ in 0..40 {
            array.append(()).unwrap();
        }

        array.sort();
        assert_eq!(array.len(), 40);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn aligned_elements() {
        #[derive(Clone, Copy, Debug, PartialEq)]
        #[repr(align(16))]
        struct Aligned(u8);

        let mut array = Array::new();
        for value in 0..20 {
            let slot = array.append(Aligned(value)).unwrap();
            assert_eq!(ptr::from_mut(slot).addr() % 16, 0);
        }

        assert_eq!(array[19], Aligned(19));
    }

    #[test]
    fn deref_and_iteration() {
        let mut array = Array::new();
        for value in 1..=4 {
            array.append(value).unwrap();
        }

        for value in &mut array {
            *value *= 10;
        }

        assert_eq!(array.iter().sum::<i32>(), 100);
        assert_eq!(array.first(), Some(&10));
        assert_eq!((&array).into_iter().count(), 4);
    }

    #[test]
    fn empty_array_views() {
        let mut array = Array::<u8>::new();

        assert!(array.as_slice().is_empty());
        assert!(array.as_mut_slice().is_empty());
        assert_eq!(format!("{array:?}"), "[]");
    }
}
