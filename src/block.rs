//! Block metadata: boundary tags and the free-list link overlay.
//!
//! Every block, allocated or free, is bracketed by two identical tags:
//!
//! ```text
//!        63        32  31          1    0
//!        ---------------------------------
//!       |  reserved   |  block_size | a/f |      (one 8-byte tag)
//!        ---------------------------------
//!
//!   block base
//!       │
//!       ▼
//!   ┌────────┬─────────────────────────────────┬────────┐
//!   │ header │             payload             │ footer │
//!   └────────┴─────────────────────────────────┴────────┘
//!   ▲        ▲                                          ▲
//!   │        └── payload pointer (base + 8)             │
//!   └── base                         base + size - 8 ───┘
//! ```
//!
//! `a/f` is 1 iff the block is allocated. The footer duplicates the header
//! so the physical predecessor of any block can be found in O(1) by reading
//! the tag at `base - 8`.
//!
//! When a block is free, the first two payload slots are reused as the
//! free-list links:
//!
//! ```text
//!   ┌────────┬────────┬────────┬─  ─  ─  ─  ─┬────────┐
//!   │ header │  next  │  prev  │   (unused)   │ footer │
//!   └────────┴────────┴────────┴─  ─  ─  ─  ─┴────────┘
//!   base     base+8   base+16
//! ```
//!
//! This is why the minimum block size is 32 bytes.

use std::ptr;

use crate::constants::{MAX_BLOCK_SIZE, TAG_SIZE};

/// Reads the size field of the tag at `at`.
///
/// # Safety
///
/// `at` must point to a valid, 8-aligned boundary tag inside the heap.
pub unsafe fn tag_size(at: *const u8) -> usize {
  let word = unsafe { (at as *const u64).read() } as u32;
  (word >> 1) as usize
}

/// Reads the allocated flag of the tag at `at`.
///
/// # Safety
///
/// `at` must point to a valid, 8-aligned boundary tag inside the heap.
pub unsafe fn tag_is_allocated(at: *const u8) -> bool {
  let word = unsafe { (at as *const u64).read() } as u32;
  (word & 1) == 1
}

/// Writes a tag (size + allocated flag) at `at`. The reserved high word is
/// zeroed.
///
/// # Safety
///
/// `at` must point to 8 writable, 8-aligned bytes inside the heap.
pub unsafe fn write_tag(at: *mut u8, size: usize, allocated: bool) {
  debug_assert!(size <= MAX_BLOCK_SIZE);
  let word = ((size as u32) << 1) | allocated as u32;
  unsafe { (at as *mut u64).write(word as u64) };
}

/// A block address. Copyable handle over the raw base pointer; all accessors
/// are unsafe because they read or write heap memory through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  base: *mut u8,
}

impl Block {
  /// Wraps a raw block base address.
  pub fn at(base: *mut u8) -> Self {
    Self { base }
  }

  /// The null block: the value of the prologue's `prev` and the epilogue's
  /// `next`, and the "no fit found" result of a free-list search.
  pub fn null() -> Self {
    Self { base: ptr::null_mut() }
  }

  pub fn is_null(&self) -> bool {
    self.base.is_null()
  }

  /// Raw base address of the block (its header).
  pub fn addr(&self) -> *mut u8 {
    self.base
  }

  /// Recovers the block from a payload pointer handed out by the allocator.
  ///
  /// # Safety
  ///
  /// `payload` must be a pointer previously returned for a live block.
  pub unsafe fn from_payload(payload: *mut u8) -> Self {
    Self { base: unsafe { payload.sub(TAG_SIZE) } }
  }

  /// The user-visible payload pointer for this block.
  ///
  /// # Safety
  ///
  /// The block must be valid.
  pub unsafe fn payload(&self) -> *mut u8 {
    unsafe { self.base.add(TAG_SIZE) }
  }

  /// # Safety
  ///
  /// The block's header must be initialized.
  pub unsafe fn size(&self) -> usize {
    unsafe { tag_size(self.base) }
  }

  /// # Safety
  ///
  /// The block's header must be initialized.
  pub unsafe fn is_allocated(&self) -> bool {
    unsafe { tag_is_allocated(self.base) }
  }

  /// Writes the block's header.
  ///
  /// # Safety
  ///
  /// The block base must point into writable heap memory.
  pub unsafe fn write_header(&self, size: usize, allocated: bool) {
    unsafe { write_tag(self.base, size, allocated) };
  }

  /// Writes the block's footer at `base + size - 8`, using the given size.
  ///
  /// The size is a parameter rather than read back from the header so the
  /// two tags can be rewritten in either order while resizing a block.
  ///
  /// # Safety
  ///
  /// `base + size` must stay within the heap.
  pub unsafe fn write_footer(&self, size: usize, allocated: bool) {
    unsafe { write_tag(self.base.add(size - TAG_SIZE), size, allocated) };
  }

  /// Address of this block's footer, per the size currently in its header.
  ///
  /// # Safety
  ///
  /// The block's header must be initialized.
  pub unsafe fn footer(&self) -> *mut u8 {
    unsafe { self.base.add(self.size() - TAG_SIZE) }
  }

  /// The physically next block: `base + size`.
  ///
  /// # Safety
  ///
  /// The block's header must be initialized and a successor must exist
  /// (every block except the epilogue has one).
  pub unsafe fn next_in_heap(&self) -> Block {
    Block::at(unsafe { self.base.add(self.size()) })
  }

  /// Address of the physical predecessor's footer: `base - 8`.
  ///
  /// # Safety
  ///
  /// The block must not be the prologue.
  pub unsafe fn prev_footer(&self) -> *mut u8 {
    unsafe { self.base.sub(TAG_SIZE) }
  }

  /// Offsets the base by `bytes`, yielding the block starting there.
  ///
  /// # Safety
  ///
  /// The resulting address must stay within the heap.
  pub unsafe fn offset(&self, bytes: usize) -> Block {
    Block::at(unsafe { self.base.add(bytes) })
  }

  // Free-list links, overlaid on the first two payload slots. Only
  // meaningful while the block is free (or is a sentinel).

  /// # Safety
  ///
  /// The block must be free or a sentinel.
  pub unsafe fn next_free(&self) -> Block {
    Block::at(unsafe { (self.base.add(TAG_SIZE) as *const *mut u8).read() })
  }

  /// # Safety
  ///
  /// The block must be free or a sentinel.
  pub unsafe fn prev_free(&self) -> Block {
    Block::at(unsafe { (self.base.add(2 * TAG_SIZE) as *const *mut u8).read() })
  }

  /// # Safety
  ///
  /// The block must be free or a sentinel.
  pub unsafe fn set_next_free(&self, next: Block) {
    unsafe { (self.base.add(TAG_SIZE) as *mut *mut u8).write(next.base) };
  }

  /// # Safety
  ///
  /// The block must be free or a sentinel.
  pub unsafe fn set_prev_free(&self, prev: Block) {
    unsafe { (self.base.add(2 * TAG_SIZE) as *mut *mut u8).write(prev.base) };
  }
}

/// Recovers a block from its footer address: `footer + 8 - size`.
///
/// # Safety
///
/// `footer` must point to a valid footer tag.
pub unsafe fn block_of_footer(footer: *mut u8) -> Block {
  unsafe { Block::at(footer.add(TAG_SIZE).sub(tag_size(footer))) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::constants::MIN_BLOCK_SIZE;

  /// 8-aligned scratch buffer standing in for a stretch of heap.
  fn scratch(words: usize) -> Vec<u64> {
    vec![0u64; words]
  }

  #[test]
  fn tag_roundtrip() {
    let mut buf = scratch(1);
    let at = buf.as_mut_ptr() as *mut u8;

    unsafe {
      write_tag(at, 48, true);
      assert_eq!(tag_size(at), 48);
      assert!(tag_is_allocated(at));

      write_tag(at, 65480, false);
      assert_eq!(tag_size(at), 65480);
      assert!(!tag_is_allocated(at));
    }
  }

  #[test]
  fn header_footer_bracket_the_block() {
    let mut buf = scratch(MIN_BLOCK_SIZE / 8);
    let base = buf.as_mut_ptr() as *mut u8;
    let block = Block::at(base);

    unsafe {
      block.write_header(MIN_BLOCK_SIZE, false);
      block.write_footer(MIN_BLOCK_SIZE, false);

      assert_eq!(block.size(), MIN_BLOCK_SIZE);
      assert!(!block.is_allocated());
      assert_eq!(block.footer(), base.add(MIN_BLOCK_SIZE - TAG_SIZE));
      assert_eq!(tag_size(block.footer()), MIN_BLOCK_SIZE);
      assert_eq!(block_of_footer(block.footer()), block);
    }
  }

  #[test]
  fn payload_is_one_tag_past_the_base() {
    let mut buf = scratch(4);
    let base = buf.as_mut_ptr() as *mut u8;
    let block = Block::at(base);

    unsafe {
      let payload = block.payload();
      assert_eq!(payload, base.add(TAG_SIZE));
      assert_eq!(Block::from_payload(payload), block);
      assert_eq!(payload as usize % 8, 0);
    }
  }

  #[test]
  fn physical_neighbors() {
    // Two adjacent 32-byte blocks in one buffer.
    let mut buf = scratch(2 * MIN_BLOCK_SIZE / 8);
    let base = buf.as_mut_ptr() as *mut u8;
    let low = Block::at(base);

    unsafe {
      low.write_header(MIN_BLOCK_SIZE, true);
      low.write_footer(MIN_BLOCK_SIZE, true);

      let high = low.next_in_heap();
      assert_eq!(high.addr(), base.add(MIN_BLOCK_SIZE));

      high.write_header(MIN_BLOCK_SIZE, false);
      high.write_footer(MIN_BLOCK_SIZE, false);

      // The predecessor of `high` is found through the footer at base - 8.
      let footer = high.prev_footer();
      assert_eq!(footer, low.footer());
      assert!(tag_is_allocated(footer));
      assert_eq!(block_of_footer(footer), low);
    }
  }

  #[test]
  fn link_overlay_reads_back() {
    let mut buf = scratch(3 * MIN_BLOCK_SIZE / 8);
    let base = buf.as_mut_ptr() as *mut u8;

    let a = Block::at(base);
    let b = unsafe { a.offset(MIN_BLOCK_SIZE) };
    let c = unsafe { b.offset(MIN_BLOCK_SIZE) };

    unsafe {
      b.set_next_free(c);
      b.set_prev_free(a);

      assert_eq!(b.next_free(), c);
      assert_eq!(b.prev_free(), a);

      b.set_next_free(Block::null());
      assert!(b.next_free().is_null());
    }
  }
}
