#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Append-only growable arrays for short-lived units of work, with overflow-checked linear
//! growth and automatic release through the scope that owns them.
//!
//! The crate is built from a few small layers:
//!
//! - [`RawArray`] is the engine. It knows nothing about its elements except their size, grows
//!   its storage by exactly [`GROWTH_INCREMENT`] elements whenever the element count reaches a
//!   multiple of that increment, and leaves itself untouched if growth fails.
//! - [`Array<T>`] is a typed facade over the engine that fixes the element size to that of `T`.
//!   [`define_array_type!`] stamps out distinct named array types over it.
//! - [`safe_multiply()`] and [`safe_add()`] are the overflow-checked arithmetic every growth
//!   step goes through. Overflow is reported as an allocation failure, never a panic.
//! - [`Scope`] owns scope-bound values and runs their release actions in LIFO order when the
//!   unit of work ends, however it ends. [`create_scoped_array()`] and [`Array::new_in()`]
//!   create arrays whose storage is released that way.
//!
//! Storage is obtained from a [`Resize`] primitive, by default [`SystemResize`], which uses the
//! C runtime's `realloc()`.
//!
//! # Example
//!
//! ```
//! use scoped_array::{Array, Scope};
//!
//! Scope::new().run(|scope| {
//!     let values = Array::new_in(scope)?;
//!
//!     for value in [5_u32, 3, 9, 1] {
//!         values.append(value)?;
//!     }
//!
//!     values.sort();
//!     assert_eq!(values.as_slice(), &[1, 3, 5, 9]);
//!
//!     Ok::<(), scoped_array::Error>(())
//! })?;
//! # Ok::<(), scoped_array::Error>(())
//! ```
//!
//! # Slot invalidation
//!
//! Growth may move an array's storage. Any element address obtained before an append that
//! grows the array is dangling afterwards. The typed [`Array<T>`] enforces this through
//! borrowing; users of [`RawArray`] must re-derive addresses after every append.
//!
//! # Thread safety
//!
//! Arrays are thread-mobile ([`Send`]) if their resize primitive is, but never shared between
//! threads. A [`Scope`] stays on the thread that created it.

mod array;
mod builder;
mod checked;
mod define_array;
mod error;
mod raw_array;
mod resize;
mod scope;
mod scoped;
#[cfg(test)]
mod testing;

pub use array::*;
pub use builder::*;
pub use checked::*;
pub use error::{AllocationFailureReason, Error};
pub use raw_array::*;
pub use resize::*;
pub use scope::*;
pub use scoped::*;
