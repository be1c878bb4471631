//! Free-list splice primitives.
//!
//! The free list is doubly linked and threaded through the payload area of
//! free blocks, with the prologue as permanent head and the epilogue as
//! permanent tail. The operations here only restitch links; which end a
//! block is inserted at is the allocation policy's decision.

use crate::block::Block;

/// Splices `block` in right after `anchor`. Head insertion passes the
/// prologue as the anchor.
///
/// # Safety
///
/// `anchor` must be in the free list with a valid `next` link, and `block`
/// must be a free block large enough to host its links.
pub unsafe fn insert_after(anchor: Block, block: Block) {
  unsafe {
    let next = anchor.next_free();
    anchor.set_next_free(block);
    block.set_prev_free(anchor);
    block.set_next_free(next);
    next.set_prev_free(block);
  }
}

/// Splices `block` in right before `anchor`. Tail insertion passes the
/// epilogue as the anchor.
///
/// # Safety
///
/// `anchor` must be in the free list with a valid `prev` link, and `block`
/// must be a free block large enough to host its links.
pub unsafe fn insert_before(anchor: Block, block: Block) {
  unsafe {
    let prev = anchor.prev_free();
    anchor.set_prev_free(block);
    block.set_next_free(anchor);
    block.set_prev_free(prev);
    prev.set_next_free(block);
  }
}

/// Removes `block` from the free list.
///
/// # Safety
///
/// `block` must be in the free list and must not be a sentinel; both of its
/// links are valid for any such block.
pub unsafe fn unlink(block: Block) {
  unsafe {
    let prev = block.prev_free();
    let next = block.next_free();
    prev.set_next_free(next);
    next.set_prev_free(prev);
  }
}

/// Hands `old`'s position in the free list to `new`, inheriting both links.
///
/// # Safety
///
/// `old` must be in the free list and must not be a sentinel; `new` must be
/// a free block large enough to host its links.
pub unsafe fn replace(old: Block, new: Block) {
  unsafe {
    let prev = old.prev_free();
    let next = old.next_free();
    new.set_prev_free(prev);
    new.set_next_free(next);
    prev.set_next_free(new);
    next.set_prev_free(new);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::constants::MIN_BLOCK_SIZE;

  /// Carves `n` fake free blocks out of a scratch buffer and returns them
  /// threaded as head ↔ b1 ↔ ... ↔ tail, with blocks[0] acting as the head
  /// sentinel and blocks[n-1] as the tail sentinel.
  fn linked(buf: &mut Vec<u64>, n: usize) -> Vec<Block> {
    let base = buf.as_mut_ptr() as *mut u8;
    let blocks: Vec<Block> = (0..n)
      .map(|i| unsafe { Block::at(base).offset(i * MIN_BLOCK_SIZE) })
      .collect();

    unsafe {
      blocks[0].set_prev_free(Block::null());
      blocks[n - 1].set_next_free(Block::null());

      for w in blocks.windows(2) {
        w[0].set_next_free(w[1]);
        w[1].set_prev_free(w[0]);
      }
    }

    blocks
  }

  fn forward(head: Block) -> Vec<Block> {
    let mut out = Vec::new();
    let mut b = head;
    while !b.is_null() {
      out.push(b);
      b = unsafe { b.next_free() };
    }
    out
  }

  #[test]
  fn unlink_restitches_neighbors() {
    let mut buf = vec![0u64; 4 * MIN_BLOCK_SIZE / 8];
    let blocks = linked(&mut buf, 4);

    unsafe { unlink(blocks[1]) };

    assert_eq!(forward(blocks[0]), vec![blocks[0], blocks[2], blocks[3]]);
    assert_eq!(unsafe { blocks[2].prev_free() }, blocks[0]);
  }

  #[test]
  fn insert_after_head() {
    let mut buf = vec![0u64; 4 * MIN_BLOCK_SIZE / 8];
    let blocks = linked(&mut buf, 3);

    // A spare block past the linked ones.
    let spare = unsafe { blocks[2].offset(MIN_BLOCK_SIZE) };
    unsafe { insert_after(blocks[0], spare) };

    assert_eq!(forward(blocks[0]), vec![blocks[0], spare, blocks[1], blocks[2]]);
    assert_eq!(unsafe { spare.prev_free() }, blocks[0]);
  }

  #[test]
  fn insert_before_tail() {
    let mut buf = vec![0u64; 4 * MIN_BLOCK_SIZE / 8];
    let blocks = linked(&mut buf, 3);

    let spare = unsafe { blocks[2].offset(MIN_BLOCK_SIZE) };
    unsafe { insert_before(blocks[2], spare) };

    assert_eq!(forward(blocks[0]), vec![blocks[0], blocks[1], spare, blocks[2]]);
    assert_eq!(unsafe { blocks[2].prev_free() }, spare);
  }

  #[test]
  fn replace_inherits_both_links() {
    let mut buf = vec![0u64; 4 * MIN_BLOCK_SIZE / 8];
    let blocks = linked(&mut buf, 3);

    let spare = unsafe { blocks[2].offset(MIN_BLOCK_SIZE) };
    unsafe { replace(blocks[1], spare) };

    assert_eq!(forward(blocks[0]), vec![blocks[0], spare, blocks[2]]);
    assert_eq!(unsafe { spare.prev_free() }, blocks[0]);
    assert_eq!(unsafe { spare.next_free() }, blocks[2]);
  }
}
