use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;

use tracing::{debug, trace};

use crate::error::Result;
use crate::{AllocationFailureReason, Error, ScopeBuilder};

/// Memory whose lifetime is bound to a scope, with optional release actions that the scope
/// runs automatically when it is torn down.
///
/// Values handed out by a scope stay valid for as long as the scope is borrowed. They are
/// released in strict LIFO order: anything registered earlier outlives anything registered
/// later, so a release action may safely refer to an earlier registration but never to a later
/// one.
#[allow(
    clippy::mut_from_ref,
    reason = "every call hands out a separate heap block, like an arena"
)]
pub trait ScopeAllocator {
    /// Moves `value` into memory owned by the scope. It is dropped when the scope is torn down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the scope cannot take on another value.
    fn allocate<T: 'static>(&self, value: T) -> Result<&mut T>;

    /// Moves `value` into memory owned by the scope and registers `release` to run on it when
    /// the scope is torn down (or rolled back past this point), right before it is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the scope cannot take on another value. In that
    /// case `release` is never called.
    fn allocate_with_release<T: 'static>(&self, value: T, release: fn(&mut T)) -> Result<&mut T>;

    /// Copies a string into memory owned by the scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the scope cannot take on another value.
    fn copy_str(&self, value: &str) -> Result<&mut str> {
        let copy = self.allocate(Box::<str>::from(value))?;
        Ok(&mut **copy)
    }

    /// Formats a string into memory owned by the scope.
    ///
    /// ```
    /// use scoped_array::{Scope, ScopeAllocator};
    ///
    /// let scope = Scope::new();
    /// let greeting = scope.format(format_args!("hello {}", 42))?;
    ///
    /// assert_eq!(greeting, "hello 42");
    /// # Ok::<(), scoped_array::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the scope cannot take on another value.
    fn format(&self, args: fmt::Arguments<'_>) -> Result<&mut str> {
        let formatted = self.allocate(fmt::format(args).into_boxed_str())?;
        Ok(&mut **formatted)
    }
}

/// Marks a point in a [`Scope`]'s release chain, for rolling back to it later.
///
/// Generations are only meaningful for the scope that issued them.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Generation(usize);

/// A unit-of-work lifetime that owns scope-bound values and a LIFO chain of release actions.
///
/// Every registration (a scope-bound value or a deferred action) is pushed onto the release
/// chain. When the scope is dropped, the chain runs from the most recent registration back to
/// the first, exactly once per entry. This also happens while unwinding from a panic, so a unit
/// of work that fails halfway does not leak what it registered.
///
/// Part of the chain can be run early with [`rollback_to()`](Self::rollback_to), which releases
/// everything registered after a [`Generation`] marker and leaves earlier registrations alone.
///
/// # Examples
///
/// ```
/// use scoped_array::{Array, Scope};
///
/// let total = Scope::new().run(|scope| {
///     let readings = Array::<u32>::new_in(scope)?;
///
///     for value in [5, 3, 9, 1] {
///         readings.append(value)?;
///     }
///
///     Ok::<_, scoped_array::Error>(readings.iter().sum::<u32>())
/// })?;
///
/// assert_eq!(total, 18);
/// # Ok::<(), scoped_array::Error>(())
/// ```
///
/// # Thread safety
///
/// A scope belongs to one unit of work on one thread. It is neither [`Send`] nor [`Sync`].
pub struct Scope {
    name: &'static str,

    chain: RefCell<Vec<Registration>>,

    // Scope-bound values currently on the chain. Rolling back past a value gives its slot back.
    live_allocations: Cell<usize>,

    allocation_limit: Option<usize>,
}

struct Registration {
    action: Box<dyn FnOnce()>,

    // Whether this entry owns a scope-bound value, as opposed to being a plain deferred action.
    is_allocation: bool,
}

impl Scope {
    /// Creates a scope with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring a new scope.
    ///
    /// ```
    /// use scoped_array::Scope;
    ///
    /// let scope = Scope::builder().name("request").chain_capacity(32).build();
    /// assert_eq!(scope.name(), "request");
    /// ```
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::new()
    }

    pub(crate) fn new_inner(
        name: &'static str,
        chain_capacity: usize,
        allocation_limit: Option<usize>,
    ) -> Self {
        Self {
            name,
            chain: RefCell::new(Vec::with_capacity(chain_capacity)),
            live_allocations: Cell::new(0),
            allocation_limit,
        }
    }

    /// The name used to identify this scope in log events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of registrations that have not been released yet.
    #[must_use]
    pub fn pending_releases(&self) -> usize {
        self.chain.borrow().len()
    }

    /// Registers an action to run when the scope is torn down or rolled back past this point.
    pub fn defer<F>(&self, action: F)
    where
        F: FnOnce() + 'static,
    {
        self.push(Registration {
            action: Box::new(action),
            is_allocation: false,
        });
    }

    /// Marks the current end of the release chain.
    #[must_use]
    pub fn generation(&self) -> Generation {
        Generation(self.chain.borrow().len())
    }

    /// Runs, in LIFO order, every release action registered after `generation` was taken.
    ///
    /// Registrations made before the marker are untouched. Rolling back to a generation that is
    /// not behind the current end of the chain does nothing.
    pub fn rollback_to(&mut self, generation: Generation) {
        let released = self.release_until(generation.0);

        debug!(
            scope = self.name,
            generation = generation.0,
            released,
            "scope rolled back"
        );
    }

    /// Runs `work` against this scope, then tears the scope down.
    ///
    /// `work` gets exclusive access, so it can take a [`generation()`](Self::generation) and
    /// later [`rollback_to()`](Self::rollback_to) it once the values allocated since then are
    /// no longer borrowed.
    ///
    /// Teardown happens however `work` exits: by returning, by returning an error or by
    /// panicking.
    pub fn run<F, R>(mut self, work: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        work(&mut self)
    }

    fn push(&self, registration: Registration) {
        let mut chain = self.chain.borrow_mut();
        chain.push(registration);

        trace!(scope = self.name, generation = chain.len(), "release registered");
    }

    // Releases registrations from the end of the chain until it is `length` entries long.
    // If a release action panics, the rest still run before the panic propagates further.
    fn release_until(&mut self, length: usize) -> usize {
        let mut released = 0_usize;

        while self.chain.get_mut().len() > length {
            let Some(registration) = self.chain.get_mut().pop() else {
                break;
            };

            if registration.is_allocation {
                let live = self.live_allocations.get_mut();
                *live = live.wrapping_sub(1);
            }

            let remaining = scopeguard::guard(&mut *self, |scope| {
                scope.release_until(length);
            });

            (registration.action)();

            scopeguard::ScopeGuard::into_inner(remaining);
            released = released.wrapping_add(1);
        }

        released
    }

    fn register_value<T: 'static>(
        &self,
        value: T,
        release: Option<fn(&mut T)>,
    ) -> Result<NonNull<T>> {
        let live = self.live_allocations.get();

        if self.allocation_limit.is_some_and(|limit| live >= limit) {
            debug!(scope = self.name, live, "scope allocation limit reached");

            return Err(Error::AllocationFailure {
                element_size: size_of::<T>(),
                element_count: 0,
                reason: AllocationFailureReason::ScopeExhausted,
            });
        }

        let value = NonNull::from(Box::leak(Box::new(value)));

        self.push(Registration {
            action: Box::new(move || {
                // SAFETY: The pointer came from Box::leak() above and this action is the only
                // thing that reclaims it. The chain runs each action once, and only with
                // exclusive access to the scope, by which time every reference handed out
                // through a shared borrow of the scope has ended.
                let mut value = unsafe { Box::from_raw(value.as_ptr()) };

                if let Some(release) = release {
                    release(&mut value);
                }
            }),
            is_allocation: true,
        });

        self.live_allocations.set(live.wrapping_add(1));

        Ok(value)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let released = self.release_until(0);

        debug!(scope = self.name, released, "scope torn down");
    }
}

#[allow(
    clippy::mut_from_ref,
    reason = "every call hands out a separate heap block, like an arena"
)]
impl ScopeAllocator for Scope {
    fn allocate<T: 'static>(&self, value: T) -> Result<&mut T> {
        let value = self.register_value(value, None)?;

        // SAFETY: The block is live until its release action runs, which requires exclusive
        // access to the scope and therefore cannot happen while this borrow of it is alive.
        // Nothing else references the block.
        Ok(unsafe { &mut *value.as_ptr() })
    }

    fn allocate_with_release<T: 'static>(&self, value: T, release: fn(&mut T)) -> Result<&mut T> {
        let value = self.register_value(value, Some(release))?;

        // SAFETY: As in allocate().
        Ok(unsafe { &mut *value.as_ptr() })
    }
}

impl fmt::Debug for Scope {
    #[cfg_attr(test, mutants::skip)] // Cosmetic, no API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("pending_releases", &self.pending_releases())
            .field("live_allocations", &self.live_allocations.get())
            .field("allocation_limit", &self.allocation_limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(Scope: Default, fmt::Debug);
    assert_not_impl_any!(Scope: Send, Sync);
    assert_impl_all!(Generation: Send, Sync, Copy, Ord);

    type Journal = Rc<RefCell<Vec<&'static str>>>;

    fn record(journal: &Journal, entry: &'static str) -> impl FnOnce() + 'static {
        let journal = Rc::clone(journal);
        move || journal.borrow_mut().push(entry)
    }

    #[test]
    fn teardown_is_lifo() {
        let journal = Journal::default();

        {
            let scope = Scope::new();
            scope.defer(record(&journal, "first"));
            scope.defer(record(&journal, "second"));
            scope.defer(record(&journal, "third"));

            assert!(journal.borrow().is_empty());
        }

        assert_eq!(*journal.borrow(), ["third", "second", "first"]);
    }

    #[test]
    fn rollback_releases_only_later_registrations() {
        let journal = Journal::default();
        let mut scope = Scope::new();

        scope.defer(record(&journal, "before"));
        let marker = scope.generation();
        scope.defer(record(&journal, "after 1"));
        scope.defer(record(&journal, "after 2"));

        scope.rollback_to(marker);
        assert_eq!(*journal.borrow(), ["after 2", "after 1"]);
        assert_eq!(scope.pending_releases(), 1);

        drop(scope);
        assert_eq!(*journal.borrow(), ["after 2", "after 1", "before"]);
    }

    #[test]
    fn rollback_to_current_or_future_generation_does_nothing() {
        let journal = Journal::default();
        let mut scope = Scope::new();

        scope.defer(record(&journal, "only"));
        let current = scope.generation();

        scope.rollback_to(current);
        scope.rollback_to(Generation(100));

        assert!(journal.borrow().is_empty());
        assert_eq!(scope.pending_releases(), 1);
    }

    #[test]
    fn generations_increase_with_registrations() {
        let scope = Scope::new();
        let empty = scope.generation();

        scope.defer(|| {});

        assert!(scope.generation() > empty);
    }

    #[test]
    fn allocated_values_are_dropped_at_teardown() {
        let marker = Rc::new(());

        {
            let scope = Scope::new();
            let held = scope.allocate(Rc::clone(&marker)).unwrap();
            assert_eq!(Rc::strong_count(held), 2);
        }

        assert_eq!(Rc::strong_count(&marker), 1);
    }

    #[test]
    fn release_runs_before_drop() {
        struct Noisy(Journal);

        impl Drop for Noisy {
            fn drop(&mut self) {
                self.0.borrow_mut().push("dropped");
            }
        }

        let journal = Journal::default();

        {
            let scope = Scope::new();
            scope
                .allocate_with_release(Noisy(Rc::clone(&journal)), |noisy| {
                    noisy.0.borrow_mut().push("released");
                })
                .unwrap();
        }

        assert_eq!(*journal.borrow(), ["released", "dropped"]);
    }

    #[test]
    fn allocations_and_deferred_actions_share_one_chain() {
        let journal = Journal::default();

        {
            let scope = Scope::new();
            scope.defer(record(&journal, "deferred early"));
            scope
                .allocate_with_release(Rc::clone(&journal), |journal| {
                    journal.borrow_mut().push("value");
                })
                .unwrap();
            scope.defer(record(&journal, "deferred late"));
        }

        assert_eq!(
            *journal.borrow(),
            ["deferred late", "value", "deferred early"]
        );
    }

    #[test]
    fn strings() {
        let scope = Scope::new();

        let copy = scope.copy_str("request-17").unwrap();
        copy.make_ascii_uppercase();

        let formatted = scope.format(format_args!("{}:{}", "id", 17)).unwrap();

        assert_eq!(copy, "REQUEST-17");
        assert_eq!(formatted, "id:17");
    }

    #[test]
    fn allocation_limit_is_enforced_and_refunded_by_rollback() {
        let mut scope = Scope::builder().allocation_limit(2).build();

        scope.allocate(1_u64).unwrap();
        let marker = scope.generation();
        scope.allocate(2_u64).unwrap();

        // Deferred actions do not count against the limit.
        scope.defer(|| {});

        let error = scope.allocate(3_u64).unwrap_err();
        assert_eq!(error.reason(), AllocationFailureReason::ScopeExhausted);
        assert_eq!(
            error,
            Error::AllocationFailure {
                element_size: 8,
                element_count: 0,
                reason: AllocationFailureReason::ScopeExhausted,
            }
        );

        scope.rollback_to(marker);
        scope.allocate(4_u64).unwrap();
    }

    #[test]
    fn failed_allocation_does_not_register_release() {
        let journal = Journal::default();
        let scope = Scope::builder().allocation_limit(0).build();

        let result = scope.allocate_with_release(Rc::clone(&journal), |journal| {
            journal.borrow_mut().push("released");
        });

        assert_eq!(
            result.unwrap_err().reason(),
            AllocationFailureReason::ScopeExhausted
        );
        assert_eq!(scope.pending_releases(), 0);

        drop(scope);
        assert!(journal.borrow().is_empty());
    }

    #[test]
    fn run_returns_result_and_tears_down() {
        let journal = Journal::default();

        let value = Scope::new().run(|scope| {
            scope.defer(record(&journal, "released"));
            assert!(journal.borrow().is_empty());
            42
        });

        assert_eq!(value, 42);
        assert_eq!(*journal.borrow(), ["released"]);
    }

    #[test]
    fn work_can_roll_back_its_own_scope() {
        let journal = Journal::default();

        Scope::new().run(|scope| {
            scope.defer(record(&journal, "kept"));
            let checkpoint = scope.generation();

            let speculative = scope.allocate(7_u32).unwrap();
            *speculative += 1;
            scope.defer(record(&journal, "speculative"));

            scope.rollback_to(checkpoint);
            assert_eq!(*journal.borrow(), ["speculative"]);
            assert_eq!(scope.pending_releases(), 1);
        });

        assert_eq!(*journal.borrow(), ["speculative", "kept"]);
    }

    #[test]
    fn panicking_work_still_tears_down() {
        let journal = Journal::default();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            Scope::new().run::<_, ()>(|scope| {
                scope.defer(record(&journal, "released"));
                panic!("unit of work failed");
            });
        }));

        result.unwrap_err();
        assert_eq!(*journal.borrow(), ["released"]);
    }

    #[test]
    fn panicking_release_action_does_not_skip_the_rest() {
        let journal = Journal::default();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let scope = Scope::new();
            scope.defer(record(&journal, "first"));
            scope.defer(|| panic!("release action failed"));
            scope.defer(record(&journal, "third"));
        }));

        result.unwrap_err();
        assert_eq!(*journal.borrow(), ["third", "first"]);
    }

    #[test]
    fn builder_settings_are_applied() {
        let scope = Scope::builder().name("batch").chain_capacity(8).build();

        assert_eq!(scope.name(), "batch");
        assert!(scope.chain.borrow().capacity() >= 8);
        assert_eq!(scope.allocation_limit, None);
    }
}
