//! Heap sources: where the allocator's contiguous byte region comes from.
//!
//! The allocator itself never talks to the operating system. It asks a
//! [`HeapSource`] for more bytes and relies on three contract points:
//! regions are 8-aligned, each new region starts exactly where the previous
//! one ended, and addresses grow monotonically. Two sources are provided:
//!
//! - [`SbrkHeap`] moves the program break with `sbrk(2)`, the classic
//!   malloc substrate.
//! - [`ReservedHeap`] carves a fixed up-front reservation into contiguous
//!   slices. Deterministic, self-contained, and safe to use from parallel
//!   tests; this is what the test suite and benches run on.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

use libc::{c_void, intptr_t, sbrk};

use crate::constants::ALIGNMENT;
use crate::error::AllocError;

/// An sbrk-style growable region of memory.
///
/// # Contract
///
/// - `extend` is called with `bytes > 0`, a multiple of 8.
/// - On success the returned address is 8-aligned and the new region is
///   contiguous with every region returned before it.
/// - On exhaustion `extend` returns `None`; the heap is unchanged.
pub trait HeapSource {
  fn extend(&mut self, bytes: usize) -> Option<NonNull<u8>>;
}

/// Grows the heap by moving the program break.
///
/// `sbrk` gives no alignment guarantee, so each call first probes the break
/// with `sbrk(0)` and folds the pad up to the next 8-byte boundary into the
/// request. After the first call the break stays aligned and the pad is 0.
///
/// The contiguity contract only holds while nothing else in the process
/// moves the break between calls. A process whose libc allocator also uses
/// `brk` can violate that; keep all growth inside one region, or use
/// [`ReservedHeap`].
pub struct SbrkHeap;

impl SbrkHeap {
  pub fn new() -> Self {
    Self
  }
}

impl Default for SbrkHeap {
  fn default() -> Self {
    Self::new()
  }
}

impl HeapSource for SbrkHeap {
  fn extend(&mut self, bytes: usize) -> Option<NonNull<u8>> {
    unsafe {
      let brk = sbrk(0) as usize;
      let pad = crate::align!(brk) - brk;

      let raw = sbrk((bytes + pad) as intptr_t);
      if raw == usize::MAX as *mut c_void {
        // sbrk returns (void*)-1 on failure
        return None;
      }

      NonNull::new((raw as *mut u8).add(pad))
    }
  }
}

/// A fixed reservation served out as contiguous slices.
///
/// The whole capacity is acquired once from the system allocator and
/// released on `Drop`. `extend` bumps a cursor through it and fails once
/// the capacity is spent, which makes out-of-memory behavior testable.
#[derive(Debug)]
pub struct ReservedHeap {
  base: NonNull<u8>,
  layout: Layout,
  used: usize,
}

impl ReservedHeap {
  /// Reserves `capacity` bytes.
  ///
  /// # Errors
  ///
  /// [`AllocError::LayoutError`] for a zero or unrepresentable capacity,
  /// [`AllocError::Oom`] if the reservation itself fails.
  pub fn new(capacity: usize) -> Result<Self, AllocError> {
    if capacity == 0 {
      return Err(AllocError::LayoutError);
    }

    let layout = Layout::from_size_align(capacity, ALIGNMENT)?;
    let ptr = unsafe { alloc(layout) };

    match NonNull::new(ptr) {
      Some(base) => Ok(Self { base, layout, used: 0 }),
      None => Err(AllocError::Oom),
    }
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.used
  }

  /// Total reservation size.
  pub fn capacity(&self) -> usize {
    self.layout.size()
  }
}

impl HeapSource for ReservedHeap {
  fn extend(&mut self, bytes: usize) -> Option<NonNull<u8>> {
    if bytes > self.layout.size() - self.used {
      return None;
    }

    let ptr = unsafe { self.base.as_ptr().add(self.used) };
    self.used += bytes;

    NonNull::new(ptr)
  }
}

impl Drop for ReservedHeap {
  fn drop(&mut self) {
    unsafe { dealloc(self.base.as_ptr(), self.layout) }
  }
}
