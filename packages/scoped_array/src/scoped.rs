use tracing::trace;

use crate::error::Result;
use crate::{Array, RawArray, Resize, ScopeAllocator, SystemResize};

/// Creates an empty array whose header lives in `scope` and whose storage is released when the
/// scope is torn down, or rolled back past this point.
///
/// The array is ready for appends. Its storage is released exactly once: the scope resets the
/// array and then discards the header. Arrays created earlier in the same scope outlive arrays
/// created later.
///
/// # Examples
///
/// ```
/// use scoped_array::{Scope, create_scoped_array};
///
/// let scope = Scope::new();
/// let array = create_scoped_array(&scope)?;
///
/// // SAFETY: Every append on this array uses the size of u64.
/// let slot = unsafe { array.append(size_of::<u64>()) }?;
///
/// // SAFETY: The slot is valid for writes of one u64 and suitably aligned.
/// unsafe { slot.cast::<u64>().write(7) };
///
/// assert_eq!(array.len(), 1);
///
/// // The storage is released here.
/// drop(scope);
/// # Ok::<(), scoped_array::Error>(())
/// ```
///
/// # Errors
///
/// Returns [`Error::AllocationFailure`][crate::Error::AllocationFailure] if the scope cannot
/// provide memory for the header.
pub fn create_scoped_array<S>(scope: &S) -> Result<&mut RawArray>
where
    S: ScopeAllocator,
{
    create_scoped_array_with(scope, SystemResize::new())
}

/// Creates an empty scope-bound array that obtains its storage from the given resize primitive.
///
/// See [`create_scoped_array()`].
///
/// # Errors
///
/// Returns [`Error::AllocationFailure`][crate::Error::AllocationFailure] if the scope cannot
/// provide memory for the header.
pub fn create_scoped_array_with<S, R>(scope: &S, resize: R) -> Result<&mut RawArray<R>>
where
    S: ScopeAllocator,
    R: Resize + 'static,
{
    let array = scope.allocate_with_release(RawArray::with_resize(resize), RawArray::reset)?;

    trace!("scope-bound array created");

    Ok(array)
}

impl<T: 'static> Array<T> {
    /// Creates an empty array owned by `scope`.
    ///
    /// The elements are dropped and the storage released when the scope is torn down, or rolled
    /// back past this point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`][crate::Error::AllocationFailure] if the scope cannot
    /// provide memory for the array.
    pub fn new_in<S>(scope: &S) -> Result<&mut Self>
    where
        S: ScopeAllocator,
    {
        scope.allocate_with_release(Self::new(), Self::reset)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::testing::TrackingResize;
    use crate::{AllocationFailureReason, Error, Scope};

    fn push<R: Resize>(array: &mut RawArray<R>, value: u32) {
        let slot = unsafe { array.append(size_of::<u32>()) }.unwrap();
        unsafe { slot.cast::<u32>().write(value) };
    }

    #[test]
    fn scoped_array_is_released_once_at_teardown() {
        let resize = TrackingResize::new();

        {
            let scope = Scope::new();
            let array = create_scoped_array_with(&scope, resize.clone()).unwrap();

            assert!(array.is_empty());

            for value in [1, 2, 3] {
                push(array, value);
            }

            assert_eq!(array.len(), 3);
            assert_eq!(resize.live_blocks(), 1);
            assert_eq!(resize.releases(), 0);
        }

        assert_eq!(resize.releases(), 1);
        assert_eq!(resize.live_blocks(), 0);
    }

    #[test]
    fn never_used_scoped_array_releases_nothing() {
        let resize = TrackingResize::new();

        {
            let scope = Scope::new();
            create_scoped_array_with(&scope, resize.clone()).unwrap();
        }

        assert!(resize.requests().is_empty());
        assert_eq!(resize.releases(), 0);
    }

    #[test]
    fn rollback_releases_later_arrays_only() {
        let early = TrackingResize::new();
        let late = TrackingResize::new();
        let mut scope = Scope::new();

        push(create_scoped_array_with(&scope, early.clone()).unwrap(), 1);
        let marker = scope.generation();
        push(create_scoped_array_with(&scope, late.clone()).unwrap(), 2);

        scope.rollback_to(marker);
        assert_eq!(late.releases(), 1);
        assert_eq!(early.releases(), 0);

        drop(scope);
        assert_eq!(early.releases(), 1);
        assert_eq!(late.releases(), 1);
    }

    #[test]
    fn earlier_arrays_outlive_later_ones() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let first = TrackingResize::new();
        let second = TrackingResize::new();

        {
            let scope = Scope::new();

            push(create_scoped_array_with(&scope, first.clone()).unwrap(), 1);

            let observed = Rc::clone(&order);
            let (first_probe, second_probe) = (first.clone(), second.clone());
            scope.defer(move || {
                observed
                    .borrow_mut()
                    .push((first_probe.releases(), second_probe.releases()));
            });

            push(create_scoped_array_with(&scope, second.clone()).unwrap(), 2);
        }

        // When the deferred probe ran, the later array was gone but the earlier one was not.
        assert_eq!(*order.borrow(), [(0, 1)]);
        assert_eq!(first.releases(), 1);
        assert_eq!(second.releases(), 1);
    }

    #[test]
    fn exhausted_scope_reports_allocation_failure() {
        let scope = Scope::builder().allocation_limit(1).build();

        create_scoped_array(&scope).unwrap();
        let error = create_scoped_array(&scope).unwrap_err();

        assert_eq!(error.reason(), AllocationFailureReason::ScopeExhausted);
        assert_eq!(scope.pending_releases(), 1);
    }

    #[test]
    fn failed_append_in_scope_keeps_earlier_elements() {
        let resize = TrackingResize::failing_at(1);

        {
            let scope = Scope::new();
            let array = create_scoped_array_with(&scope, resize.clone()).unwrap();

            for value in 0..16 {
                push(array, value);
            }

            let error = unsafe { array.append(size_of::<u32>()) }.unwrap_err();
            assert_eq!(
                error.reason(),
                AllocationFailureReason::ResizeFailed { byte_size: 128 }
            );
            assert_eq!(array.len(), 16);
        }

        assert_eq!(resize.releases(), 1);
        assert_eq!(resize.live_blocks(), 0);
    }

    #[test]
    fn typed_array_in_scope_drops_elements_at_teardown() {
        struct Counted(Rc<Cell<usize>>);

        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));

        Scope::new().run(|scope| {
            let array = Array::new_in(scope).unwrap();

            for _ in 0..20 {
                array.append(Counted(Rc::clone(&drops))).unwrap();
            }

            assert_eq!(drops.get(), 0);
        });

        assert_eq!(drops.get(), 20);
    }

    #[test]
    fn error_exit_from_unit_of_work_still_releases() {
        let resize = TrackingResize::new();

        let result: Result<()> = Scope::new().run(|scope| {
            let array = create_scoped_array_with(scope, resize.clone())?;
            push(array, 1);

            Err(Error::AllocationFailure {
                element_size: 4,
                element_count: 1,
                reason: AllocationFailureReason::ScopeExhausted,
            })
        });

        result.unwrap_err();
        assert_eq!(resize.releases(), 1);
    }
}
