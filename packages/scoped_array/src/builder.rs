use crate::Scope;

const DEFAULT_NAME: &str = "unnamed";

/// Builder for creating an instance of [`Scope`].
///
/// All settings are optional.
///
/// # Examples
///
/// ```
/// use scoped_array::Scope;
///
/// let scope = Scope::builder()
///     .name("import-batch")
///     .chain_capacity(64)
///     .allocation_limit(1024)
///     .build();
/// ```
#[derive(Debug)]
#[must_use]
pub struct ScopeBuilder {
    name: &'static str,
    chain_capacity: usize,
    allocation_limit: Option<usize>,
}

impl ScopeBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            name: DEFAULT_NAME,
            chain_capacity: 0,
            allocation_limit: None,
        }
    }

    /// Sets the name that identifies the scope in log events.
    #[inline]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Pre-sizes the release chain for this many registrations.
    ///
    /// The chain still grows beyond this if needed.
    #[inline]
    pub fn chain_capacity(mut self, capacity: usize) -> Self {
        self.chain_capacity = capacity;
        self
    }

    /// Caps how many scope-bound values the scope holds at the same time.
    ///
    /// Allocations beyond the cap fail with
    /// [`AllocationFailureReason::ScopeExhausted`][crate::AllocationFailureReason::ScopeExhausted].
    /// Values released by a rollback no longer count. Deferred actions never count.
    ///
    /// By default there is no cap.
    #[inline]
    pub fn allocation_limit(mut self, limit: usize) -> Self {
        self.allocation_limit = Some(limit);
        self
    }

    /// Builds the scope with the specified configuration.
    #[must_use]
    #[inline]
    pub fn build(self) -> Scope {
        Scope::new_inner(self.name, self.chain_capacity, self.allocation_limit)
    }
}
