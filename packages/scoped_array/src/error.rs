use std::fmt::{self, Display};

use thiserror::Error;

/// Errors that can occur when growing an array or allocating from a scope.
///
/// There is a single error class: the operation could not obtain memory safely right now.
/// Arithmetic overflow in size calculations is reported the same way as a failed allocation,
/// as both are recoverable by abandoning the current unit of work.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Memory for the array or scope-bound value could not be obtained.
    #[error(
        "allocation failure with {element_count} elements of {element_size} bytes: {reason}"
    )]
    AllocationFailure {
        /// Size in bytes of one element of the array that attempted to grow, or of the
        /// scope-bound value that could not be allocated.
        element_size: usize,

        /// Number of elements in the array when the attempt was made. The array still holds
        /// exactly this many elements afterwards. Zero for scope-bound values.
        element_count: usize,

        /// Why the allocation could not be satisfied.
        reason: AllocationFailureReason,
    },
}

impl Error {
    /// Returns why the allocation could not be satisfied.
    #[must_use]
    pub fn reason(&self) -> AllocationFailureReason {
        match self {
            Self::AllocationFailure { reason, .. } => *reason,
        }
    }
}

/// The specific cause of an [`Error::AllocationFailure`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum AllocationFailureReason {
    /// Adding the growth increment to the element count overflowed `usize`.
    CapacityOverflow,

    /// Multiplying the new capacity by the element size overflowed `usize`.
    SizeOverflow,

    /// The resize primitive could not provide a block of the requested size.
    ResizeFailed {
        /// The number of bytes requested from the resize primitive.
        byte_size: usize,
    },

    /// The scope allocator could not provide memory for a scope-bound value.
    ScopeExhausted,
}

impl Display for AllocationFailureReason {
    #[cfg_attr(test, mutants::skip)] // Cosmetic, no API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityOverflow => write!(f, "element capacity overflows usize"),
            Self::SizeOverflow => write!(f, "byte size overflows usize"),
            Self::ResizeFailed { byte_size } => write!(f, "could not resize to {byte_size} bytes"),
            Self::ScopeExhausted => write!(f, "scope could not allocate"),
        }
    }
}

/// A specialized `Result` type for array operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug, Copy, std::error::Error);
    assert_impl_all!(AllocationFailureReason: Send, Sync, Debug, Copy, Display);

    #[test]
    fn reason_is_exposed() {
        let error = Error::AllocationFailure {
            element_size: 4,
            element_count: 16,
            reason: AllocationFailureReason::SizeOverflow,
        };

        assert_eq!(error.reason(), AllocationFailureReason::SizeOverflow);
    }

    #[test]
    fn message_names_the_reason() {
        let error = Error::AllocationFailure {
            element_size: 8,
            element_count: 32,
            reason: AllocationFailureReason::ResizeFailed { byte_size: 384 },
        };

        let message = error.to_string();
        assert!(message.contains("32 elements of 8 bytes"), "{message}");
        assert!(message.contains("384 bytes"), "{message}");
    }
}
