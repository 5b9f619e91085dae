use std::ffi::c_void;
use std::fmt::Debug;
use std::ptr::{self, NonNull};

/// Alignment guaranteed for every block handed out by a [`Resize`] implementation.
///
/// This is the two-word guarantee that C allocators give for memory suitable for any
/// fundamental type. Typed arrays refuse element types that need more than this.
pub const MAX_ELEMENT_ALIGN: usize = size_of::<[usize; 2]>();

/// A general-purpose resize primitive that array storage is obtained from.
///
/// Array body storage is owned by the array itself, not tracked by any scope, so the array
/// talks to this primitive directly whenever it grows and when it releases its storage.
///
/// # Safety
///
/// Implementations must guarantee that every block returned from [`resize()`](Self::resize)
/// is at least `byte_size` bytes long, aligned to at least [`MAX_ELEMENT_ALIGN`], and that
/// its first `min(old_size, byte_size)` bytes match the contents of the block passed in.
/// A failed resize must leave the existing block untouched and still owned by the caller.
pub unsafe trait Resize: Debug {
    /// Resizes `existing` (or allocates a fresh block if `None`) to `byte_size` bytes.
    ///
    /// Returns `None` if the request could not be satisfied, in which case `existing` is
    /// unchanged. On success, `existing` must no longer be used; the returned block replaces it.
    ///
    /// # Safety
    ///
    /// `existing` must be `None` or a block previously returned by this same resize primitive
    /// that has not been released.
    unsafe fn resize(&mut self, existing: Option<NonNull<u8>>, byte_size: usize)
    -> Option<NonNull<u8>>;

    /// Releases a block previously returned by [`resize()`](Self::resize).
    ///
    /// # Safety
    ///
    /// `block` must have been returned by this same resize primitive and not yet released.
    unsafe fn release(&mut self, block: NonNull<u8>);
}

/// Resizes array storage using the C runtime's `realloc()` and `free()`.
///
/// This is the resize primitive used by arrays unless another one is supplied.
///
/// # Examples
///
/// ```
/// use scoped_array::{RawArray, SystemResize};
///
/// let array = RawArray::with_resize(SystemResize::new());
/// assert!(array.is_empty());
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct SystemResize;

impl SystemResize {
    /// Creates a new instance of the system resize primitive.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

// SAFETY: The C allocator returns blocks aligned for any fundamental type, which is at least
// MAX_ELEMENT_ALIGN on every target we support. realloc() preserves contents and leaves the
// original block alone if it fails.
unsafe impl Resize for SystemResize {
    unsafe fn resize(
        &mut self,
        existing: Option<NonNull<u8>>,
        byte_size: usize,
    ) -> Option<NonNull<u8>> {
        let existing = existing.map_or(ptr::null_mut(), |block| block.as_ptr().cast::<c_void>());

        // realloc(p, 0) may free p and return null, which would look like a failure while
        // having consumed the block. We never ask for zero bytes.
        let byte_size = byte_size.max(1);

        // SAFETY: The caller guarantees that `existing` is null or a live block from realloc().
        let block = unsafe { libc::realloc(existing, byte_size) };

        NonNull::new(block.cast::<u8>())
    }

    unsafe fn release(&mut self, block: NonNull<u8>) {
        // SAFETY: The caller guarantees that `block` is a live block from realloc().
        unsafe {
            libc::free(block.as_ptr().cast::<c_void>());
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    clippy::cast_possible_truncation,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(SystemResize: Send, Sync, Copy, Resize);

    #[test]
    fn max_element_align_is_two_words() {
        assert_eq!(MAX_ELEMENT_ALIGN, 2 * size_of::<usize>());
        assert!(MAX_ELEMENT_ALIGN.is_power_of_two());
    }

    #[test]
    fn fresh_block_is_aligned() {
        let mut resize = SystemResize::new();

        let block = unsafe { resize.resize(None, 64) }.unwrap();
        assert_eq!(block.as_ptr().addr() % MAX_ELEMENT_ALIGN, 0);

        unsafe { resize.release(block) };
    }

    #[test]
    fn growing_preserves_contents() {
        let mut resize = SystemResize::new();

        let block = unsafe { resize.resize(None, 16) }.unwrap();
        for i in 0..16 {
            unsafe { block.as_ptr().add(i).write(i as u8) };
        }

        let grown = unsafe { resize.resize(Some(block), 4096) }.unwrap();
        for i in 0..16 {
            assert_eq!(unsafe { grown.as_ptr().add(i).read() }, i as u8);
        }

        unsafe { resize.release(grown) };
    }

    #[test]
    fn zero_bytes_still_yields_a_block() {
        let mut resize = SystemResize::new();

        let block = unsafe { resize.resize(None, 0) }.unwrap();
        let block = unsafe { resize.resize(Some(block), 0) }.unwrap();

        unsafe { resize.release(block) };
    }
}
