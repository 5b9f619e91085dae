//! Resize primitives that record what the array engine asks of them.

#![cfg_attr(coverage_nightly, coverage(off))]

use std::cell::RefCell;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use crate::{MAX_ELEMENT_ALIGN, Resize, SystemResize};

/// What a [`TrackingResize`] or [`OfflineResize`] has been asked to do so far.
#[derive(Debug, Default)]
pub(crate) struct ResizeLog {
    /// Byte sizes of every resize request, in order, including failed ones.
    pub(crate) requests: Vec<usize>,

    /// Number of blocks released.
    pub(crate) releases: usize,

    /// Blocks handed out and not yet released.
    pub(crate) live_blocks: usize,
}

/// Forwards to [`SystemResize`] while recording every request.
///
/// Clones share the same log, so a test can keep one clone and hand the other to an array.
#[derive(Clone, Debug, Default)]
pub(crate) struct TrackingResize {
    inner: SystemResize,
    log: Rc<RefCell<ResizeLog>>,

    /// If set, the request with this zero-based index fails (and all later ones succeed).
    fail_request: Option<usize>,
}

impl TrackingResize {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker whose `index`-th resize request (zero-based) fails.
    pub(crate) fn failing_at(index: usize) -> Self {
        Self {
            fail_request: Some(index),
            ..Self::default()
        }
    }

    pub(crate) fn requests(&self) -> Vec<usize> {
        self.log.borrow().requests.clone()
    }

    pub(crate) fn releases(&self) -> usize {
        self.log.borrow().releases
    }

    pub(crate) fn live_blocks(&self) -> usize {
        self.log.borrow().live_blocks
    }
}

// SAFETY: Forwards to SystemResize, which upholds the contract. Injected failures do not touch
// the existing block.
unsafe impl Resize for TrackingResize {
    unsafe fn resize(
        &mut self,
        existing: Option<NonNull<u8>>,
        byte_size: usize,
    ) -> Option<NonNull<u8>> {
        let mut log = self.log.borrow_mut();
        let index = log.requests.len();
        log.requests.push(byte_size);

        if self.fail_request == Some(index) {
            return None;
        }

        // SAFETY: Forwarding the caller's guarantees.
        let block = unsafe { self.inner.resize(existing, byte_size) }?;

        if existing.is_none() {
            log.live_blocks = log.live_blocks.wrapping_add(1);
        }

        Some(block)
    }

    unsafe fn release(&mut self, block: NonNull<u8>) {
        let mut log = self.log.borrow_mut();
        log.releases = log.releases.wrapping_add(1);
        log.live_blocks = log
            .live_blocks
            .checked_sub(1)
            .expect("released more blocks than were handed out");

        // SAFETY: Forwarding the caller's guarantees.
        unsafe {
            self.inner.release(block);
        }
    }
}

/// Records requests and hands out suitably aligned addresses without backing memory.
///
/// Only usable for tests that never touch the returned slots, e.g. to exercise size
/// calculations far beyond what a real machine could allocate.
#[derive(Clone, Debug, Default)]
pub(crate) struct OfflineResize {
    log: Rc<RefCell<ResizeLog>>,
}

impl OfflineResize {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// An address that looks like a block but must never be dereferenced.
    pub(crate) fn fake_block() -> NonNull<u8> {
        NonNull::new(ptr::without_provenance_mut::<u8>(MAX_ELEMENT_ALIGN))
            .expect("MAX_ELEMENT_ALIGN is non-zero")
    }

    pub(crate) fn requests(&self) -> Vec<usize> {
        self.log.borrow().requests.clone()
    }

    pub(crate) fn releases(&self) -> usize {
        self.log.borrow().releases
    }
}

// SAFETY: This violates the contract on purpose and is only used by tests that never read
// or write through the returned addresses.
unsafe impl Resize for OfflineResize {
    unsafe fn resize(
        &mut self,
        _existing: Option<NonNull<u8>>,
        byte_size: usize,
    ) -> Option<NonNull<u8>> {
        self.log.borrow_mut().requests.push(byte_size);
        Some(Self::fake_block())
    }

    unsafe fn release(&mut self, _block: NonNull<u8>) {
        let mut log = self.log.borrow_mut();
        log.releases = log.releases.wrapping_add(1);
    }
}
