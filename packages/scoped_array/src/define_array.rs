/// Declares distinct named array types, each fixed to one element type.
///
/// Every generated type wraps an [`Array`][crate::Array] of its element type and forwards to
/// it, so all of them share the same growth logic. Two generated types over the same element
/// type are still different types and cannot be mixed up.
///
/// The generated type offers `new()`, `new_in()` (scope-bound), `reset()`, `append()`,
/// `sort_by()`, `as_slice()`, `len()` and `is_empty()`, plus `Default` and `Debug`.
///
/// # Example
///
/// ```
/// use scoped_array::{Scope, define_array_type};
///
/// define_array_type! {
///     /// Temperatures reported by one sensor, in tenths of a degree.
///     pub struct Readings(i32);
///
///     struct Labels(String);
/// }
///
/// let scope = Scope::new();
/// let readings = Readings::new_in(&scope)?;
///
/// for value in [215, 198, 230] {
///     readings.append(value)?;
/// }
///
/// readings.sort_by(|a, b| b.cmp(a));
/// assert_eq!(readings.as_slice(), &[230, 215, 198]);
///
/// let mut labels = Labels::new();
/// labels.append("outdoor".to_string())?;
/// assert_eq!(labels.len(), 1);
/// # Ok::<(), scoped_array::Error>(())
/// ```
#[macro_export]
macro_rules! define_array_type {
    () => {};

    ($(#[$attr:meta])* $vis:vis struct $name:ident($element:ty); $($rest:tt)*) => (
        $crate::define_array_type!($(#[$attr])* $vis struct $name($element));
        $crate::define_array_type!($($rest)*);
    );

    ($(#[$attr:meta])* $vis:vis struct $name:ident($element:ty)) => {
        $(#[$attr])*
        $vis struct $name($crate::Array<$element>);

        #[allow(dead_code, reason = "callers rarely need every generated method")]
        impl $name {
            /// Creates an empty array.
            #[must_use]
            $vis const fn new() -> Self {
                Self($crate::Array::new())
            }

            /// Creates an empty array owned by `scope`, released when the scope is torn down.
            ///
            /// # Errors
            ///
            /// Returns an allocation failure if the scope cannot provide memory for the array.
            $vis fn new_in<S>(scope: &S) -> ::core::result::Result<&mut Self, $crate::Error>
            where
                S: $crate::ScopeAllocator,
            {
                $crate::ScopeAllocator::allocate_with_release(scope, Self::new(), Self::reset)
            }

            /// Drops all elements and releases the storage.
            $vis fn reset(&mut self) {
                self.0.reset();
            }

            /// Appends `value` and returns a reference to it in its slot.
            ///
            /// # Errors
            ///
            /// Returns an allocation failure if the array had to grow and could not. The array
            /// keeps its previous contents and `value` is dropped.
            $vis fn append(
                &mut self,
                value: $element,
            ) -> ::core::result::Result<&mut $element, $crate::Error> {
                self.0.append(value)
            }

            /// Sorts all elements in place with the given comparison function.
            $vis fn sort_by<F>(&mut self, compare: F)
            where
                F: FnMut(&$element, &$element) -> ::core::cmp::Ordering,
            {
                self.0.sort_by(compare);
            }

            /// The elements as a slice.
            #[must_use]
            $vis fn as_slice(&self) -> &[$element] {
                self.0.as_slice()
            }

            /// Number of elements in the array.
            #[must_use]
            $vis fn len(&self) -> usize {
                self.0.len()
            }

            /// Whether the array holds no elements.
            #[must_use]
            $vis fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl ::core::default::Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.debug_struct(::core::stringify!($name))
                    .field("len", &self.len())
                    .finish_non_exhaustive()
            }
        }
    };
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::any::TypeId;
    use std::cell::Cell;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use crate::Scope;

    define_array_type! {
        struct Readings(u32);
        struct Counters(u32);

        /// Elements with a destructor.
        pub(crate) struct Tracked(Rc<Cell<usize>>);
    }

    assert_impl_all!(Readings: Send, Default, std::fmt::Debug);
    assert_not_impl_any!(Readings: Sync, Clone);
    assert_not_impl_any!(Tracked: Send);

    #[test]
    fn same_element_type_yields_distinct_types() {
        assert_ne!(TypeId::of::<Readings>(), TypeId::of::<Counters>());
    }

    #[test]
    fn forwards_to_array() {
        let mut readings = Readings::new();
        assert!(readings.is_empty());

        for value in [5, 3, 9, 1] {
            *readings.append(value).unwrap() += 100;
        }

        readings.sort_by(Ord::cmp);
        assert_eq!(readings.as_slice(), &[101, 103, 105, 109]);
        assert_eq!(readings.len(), 4);

        readings.reset();
        assert!(readings.is_empty());

        readings.append(7).unwrap();
        assert_eq!(readings.as_slice(), &[7]);
    }

    #[test]
    fn grows_past_one_increment() {
        let mut counters = Counters::default();

        for value in 0..40 {
            counters.append(value).unwrap();
        }

        assert_eq!(counters.len(), 40);
        assert_eq!(counters.as_slice().last(), Some(&39));
    }

    #[test]
    fn scope_bound_instance_is_reset_at_teardown() {
        let marker = Rc::new(Cell::new(0));

        {
            let scope = Scope::new();
            let tracked = Tracked::new_in(&scope).unwrap();

            tracked.append(Rc::clone(&marker)).unwrap();
            tracked.append(Rc::clone(&marker)).unwrap();
            assert_eq!(Rc::strong_count(&marker), 3);
        }

        assert_eq!(Rc::strong_count(&marker), 1);
    }

    #[test]
    fn debug_shows_name_and_length() {
        let mut readings = Readings::new();
        readings.append(1).unwrap();

        assert_eq!(format!("{readings:?}"), "Readings { len: 1, .. }");
    }
}
