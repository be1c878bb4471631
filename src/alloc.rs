//! # Free-List Allocator
//!
//! The allocation policy over the block format from [`crate::block`] and
//! the splice primitives from [`crate::list`].
//!
//! ## Heap shape
//!
//! The heap is one contiguous region bracketed by two permanently-allocated
//! sentinel blocks. The prologue doubles as the free-list head, the
//! epilogue as its tail:
//!
//! ```text
//!   heap base                                                  heap end
//!      │                                                          │
//!      ▼                                                          ▼
//!   ┌──────────┬──────────────────────────────────────┬──────────┐
//!   │ prologue │     user blocks (alloc'd + free)     │ epilogue │
//!   │ 32 bytes │                                      │ 24 bytes │
//!   │ size: 32 │                                      │ size: 0  │
//!   │ alloc'd  │                                      │ alloc'd  │
//!   └──────────┴──────────────────────────────────────┴──────────┘
//!
//!   Free list:   prologue ⇄ f1 ⇄ f2 ⇄ ... ⇄ fk ⇄ epilogue
//!                (threaded through the free blocks' payload slots)
//! ```
//!
//! The prologue carries a real footer of its own encoding, so coalescing
//! reads the physical predecessor's footer with no edge case: the block
//! right after the prologue always sees an allocated predecessor. The
//! epilogue's header has size 0, which terminates heap walks and can never
//! look like a mergeable neighbor.
//!
//! ## Size classes and directional placement
//!
//! A request whose payload is at most 100 bytes is *small*; anything bigger
//! is *large*. The class decides three things, consistently:
//!
//! - `find_fit` searches the free list head → tail for small requests and
//!   tail → head for large ones.
//! - `place` splits a block at its LOW end for small requests and at its
//!   HIGH end for large ones.
//! - `deallocate` reinserts small blocks at the head and large blocks at
//!   the tail.
//!
//! ```text
//!   Splitting a free block for a SMALL request:
//!
//!   ┌──────────────────────────────────────────────┐
//!   │                 free (size)                  │
//!   └──────────────────────────────────────────────┘
//!   ┌───────────────┬──────────────────────────────┐
//!   │ ALLOC (asize) │        free (size-asize)     │
//!   └───────────────┴──────────────────────────────┘
//!    ▲ returned       inherits the old list slot
//!
//!   Splitting a free block for a LARGE request:
//!
//!   ┌──────────────────────────────────────────────┐
//!   │                 free (size)                  │
//!   └──────────────────────────────────────────────┘
//!   ┌──────────────────────────────┬───────────────┐
//!   │       free (size-asize)      │ ALLOC (asize) │
//!   └──────────────────────────────┴───────────────┘
//!     keeps its list slot in place   ▲ returned
//! ```
//!
//! Over time small blocks accrete at the low end of the heap and large
//! blocks at the high end, which keeps the two populations from
//! interleaving and fragmenting each other.
//!
//! ## Growth
//!
//! When no free block fits, the heap grows through the [`HeapSource`]. The
//! old epilogue record is reinterpreted as the new free block's header (it
//! inherits the tail position in the free list in place) and a fresh
//! epilogue is written past the new region. Requests above `CHUNKSIZE`
//! grow the heap by exactly the adjusted size; smaller requests grow it by
//! `6 × CHUNKSIZE` to amortize trips to the heap source.

use std::ptr;

use crate::block::{self, Block};
use crate::constants::{
  ALIGNMENT, CHUNKSIZE, EPILOGUE_SIZE, GROWTH_FACTOR, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, OVERHEAD,
  PROLOGUE_SIZE, SMALL_PAYLOAD_MAX,
};
use crate::error::AllocError;
use crate::heap::HeapSource;
use crate::list;

/// Normalizes a payload request to an adjusted block size: overhead added,
/// rounded up to the alignment, clamped to the minimum block size. `None`
/// if the result cannot be encoded in a 31-bit size field.
fn adjust_size(size: usize) -> Option<usize> {
  let raw = size.checked_add(OVERHEAD)?;
  if raw > MAX_BLOCK_SIZE {
    return None;
  }

  let asize = crate::align!(raw);
  Some(asize.max(MIN_BLOCK_SIZE))
}

/// Whether an adjusted block size is a small request. The same definition
/// drives `find_fit`, `place`, and `deallocate`.
fn is_small(asize: usize) -> bool {
  asize - OVERHEAD <= SMALL_PAYLOAD_MAX
}

/// An explicit free-list allocator with boundary-tag coalescing over a
/// single contiguous, growing heap.
///
/// The allocator owns its [`HeapSource`] and the two sentinel anchors. It
/// is strictly single-threaded; holding raw pointers, it is neither `Send`
/// nor `Sync`.
///
/// # Example
///
/// ```rust
/// use tagalloc::{FreeListAllocator, ReservedHeap};
///
/// let heap = ReservedHeap::new(1 << 20).unwrap();
/// let mut allocator = FreeListAllocator::new(heap).unwrap();
///
/// unsafe {
///     let p = allocator.allocate(64);
///     assert!(!p.is_null());
///
///     p.write_bytes(0xAB, 64);
///     allocator.deallocate(p);
/// }
/// ```
pub struct FreeListAllocator<H: HeapSource> {
  /// Where the bytes come from.
  heap: H,

  /// The permanently-allocated block at the start of the heap; free-list
  /// head. Never moves.
  prologue: Block,

  /// The permanently-allocated size-0 block at the end of the heap;
  /// free-list tail. Relocated on every extension.
  epilogue: Block,

  /// Total bytes acquired from the heap source.
  heap_bytes: usize,
}

impl<H: HeapSource> FreeListAllocator<H> {
  /// Sets up the heap: acquires an initial `CHUNKSIZE` bytes and writes the
  /// prologue, one free block covering the interior, and the epilogue.
  ///
  /// ```text
  ///   ┌──────────┬───────────────────────────────────┬──────────┐
  ///   │ prologue │      free (CHUNKSIZE - 56)        │ epilogue │
  ///   └──────────┴───────────────────────────────────┴──────────┘
  /// ```
  ///
  /// # Errors
  ///
  /// [`AllocError::Oom`] if the heap source cannot provide the initial
  /// region.
  pub fn new(mut heap: H) -> Result<Self, AllocError> {
    let base = heap.extend(CHUNKSIZE).ok_or(AllocError::Oom)?.as_ptr();

    unsafe {
      debug_assert_eq!(base as usize % ALIGNMENT, 0);

      let prologue = Block::at(base);
      prologue.write_header(PROLOGUE_SIZE, true);
      prologue.write_footer(PROLOGUE_SIZE, true);

      let initial_size = CHUNKSIZE - PROLOGUE_SIZE - EPILOGUE_SIZE;
      let initial = prologue.next_in_heap();
      initial.write_header(initial_size, false);
      initial.write_footer(initial_size, false);

      let epilogue = initial.next_in_heap();
      epilogue.write_header(0, true);

      prologue.set_prev_free(Block::null());
      prologue.set_next_free(initial);
      initial.set_prev_free(prologue);
      initial.set_next_free(epilogue);
      epilogue.set_prev_free(initial);
      epilogue.set_next_free(Block::null());

      Ok(Self { heap, prologue, epilogue, heap_bytes: CHUNKSIZE })
    }
  }

  /// Allocates a block with at least `size` bytes of payload.
  ///
  /// The returned pointer is 8-aligned and points at the payload, one tag
  /// past the block header.
  ///
  /// # Returns
  ///
  /// Null if `size` is 0, if the adjusted size cannot be encoded, or if
  /// the heap source is exhausted.
  ///
  /// # Safety
  ///
  /// The allocator's heap must not have been corrupted through previously
  /// returned pointers (out-of-bounds writes, use after free).
  pub unsafe fn allocate(&mut self, size: usize) -> *mut u8 {
    if size == 0 {
      return ptr::null_mut();
    }

    let asize = match adjust_size(size) {
      Some(asize) => asize,
      None => return ptr::null_mut(),
    };

    unsafe {
      let mut block = self.find_fit(asize);

      if block.is_null() {
        // No fit. Grow by the larger of the request and the eager chunk.
        let extend_bytes = if asize > CHUNKSIZE {
          asize
        } else {
          GROWTH_FACTOR * CHUNKSIZE
        };

        block = self.extend(extend_bytes);
        if block.is_null() {
          return ptr::null_mut();
        }
      }

      self.place(block, asize).payload()
    }
  }

  /// Frees the block whose payload is `payload`.
  ///
  /// The block is marked free in both tags, reinserted at the head (small
  /// payload) or tail (large payload) of the free list, and coalesced with
  /// any free physical neighbor. The head/tail choice uses the block's size
  /// at free time, which can differ from the size originally requested.
  ///
  /// Null is a no-op.
  ///
  /// # Safety
  ///
  /// `payload` must have been returned by `allocate`/`reallocate` on this
  /// allocator and must not have been freed already.
  pub unsafe fn deallocate(&mut self, payload: *mut u8) {
    if payload.is_null() {
      return;
    }

    unsafe {
      let block = Block::from_payload(payload);
      let size = block.size();
      block.write_header(size, false);
      block.write_footer(size, false);

      if is_small(size) {
        list::insert_after(self.prologue, block);
      } else {
        list::insert_before(self.epilogue, block);
      }

      self.coalesce(block);
    }
  }

  /// Resizes the allocation at `payload` to at least `size` payload bytes.
  ///
  /// Naive policy: allocate, copy `min(old_block_size, size)` bytes, free
  /// the old block. No in-place growth or shrink is attempted.
  ///
  /// # Panics
  ///
  /// Panics if the new allocation fails, including `size == 0` (a zero
  /// request allocates nothing by contract).
  ///
  /// # Safety
  ///
  /// `payload` must have been returned by `allocate`/`reallocate` on this
  /// allocator and must not have been freed.
  pub unsafe fn reallocate(&mut self, payload: *mut u8, size: usize) -> *mut u8 {
    unsafe {
      let new = self.allocate(size);
      if new.is_null() {
        panic!("reallocate: allocation of {size} bytes failed");
      }

      let block = Block::from_payload(payload);
      let copy = block.size().min(size);
      ptr::copy_nonoverlapping(payload, new, copy);

      self.deallocate(payload);

      new
    }
  }

  /// First-fit search over the free list, directional by request class:
  /// small requests walk head → tail, large requests walk tail → head.
  /// Returns the null block when nothing fits.
  unsafe fn find_fit(&self, asize: usize) -> Block {
    unsafe {
      if is_small(asize) {
        let mut b = self.prologue.next_free();
        while b != self.epilogue {
          if !b.is_allocated() && b.size() >= asize {
            return b;
          }
          b = b.next_free();
        }
      } else {
        let mut b = self.epilogue.prev_free();
        while b != self.prologue {
          if !b.is_allocated() && b.size() >= asize {
            return b;
          }
          b = b.prev_free();
        }
      }

      Block::null()
    }
  }

  /// Carves an `asize` allocation out of `block` and returns the allocated
  /// block.
  ///
  /// - If the excess is below `MIN_BLOCK_SIZE`, the whole block is handed
  ///   out and removed from the free list.
  /// - Small request: the allocation sits at the LOW end; the high
  ///   remainder becomes a new free block inheriting `block`'s list slot.
  /// - Large request: the allocation sits at the HIGH end; the shrunken
  ///   low remainder keeps its tags rewritten and its list slot untouched.
  ///
  /// Preconditions: `block` is in the free list and `block.size() >= asize`.
  unsafe fn place(&mut self, block: Block, asize: usize) -> Block {
    unsafe {
      let size = block.size();
      let split = size - asize;

      if split < MIN_BLOCK_SIZE {
        // Splitting would leave a splinter; include it in the allocation.
        block.write_header(size, true);
        block.write_footer(size, true);
        list::unlink(block);
        block
      } else if is_small(asize) {
        block.write_header(asize, true);
        block.write_footer(asize, true);

        let remainder = block.next_in_heap();
        remainder.write_header(split, false);
        remainder.write_footer(split, false);
        list::replace(block, remainder);

        block
      } else {
        let allocated = block.offset(split);
        allocated.write_header(asize, true);
        allocated.write_footer(asize, true);

        block.write_header(split, false);
        block.write_footer(split, false);

        allocated
      }
    }
  }

  /// Boundary-tag coalescing. Merges `block` with its free physical
  /// neighbors, restitches the free list, and returns the surviving block.
  ///
  /// The prologue's footer and the epilogue's header are both allocated,
  /// so the edge blocks need no special casing.
  unsafe fn coalesce(&mut self, block: Block) -> Block {
    unsafe {
      let prev_footer = block.prev_footer();
      let next = block.next_in_heap();

      let prev_allocated = block::tag_is_allocated(prev_footer);
      let next_allocated = next.is_allocated();

      match (prev_allocated, next_allocated) {
        (true, true) => block,
        (true, false) => {
          // Absorb the successor; `block` keeps its list slot.
          list::unlink(next);

          let merged = block.size() + next.size();
          block.write_header(merged, false);
          block.write_footer(merged, false);

          block
        }
        (false, true) => {
          // Absorb into the predecessor, which keeps its own slot.
          list::unlink(block);

          let prev = block::block_of_footer(prev_footer);
          let merged = prev.size() + block.size();
          prev.write_header(merged, false);
          prev.write_footer(merged, false);

          prev
        }
        (false, false) => {
          list::unlink(block);
          list::unlink(next);

          let prev = block::block_of_footer(prev_footer);
          let merged = prev.size() + block.size() + next.size();
          prev.write_header(merged, false);
          prev.write_footer(merged, false);

          prev
        }
      }
    }
  }

  /// Grows the heap by `bytes` and returns the resulting free block,
  /// already coalesced with a free predecessor if there is one. Returns
  /// the null block if `bytes` is 0 or the heap source fails.
  unsafe fn extend(&mut self, bytes: usize) -> Block {
    if bytes == 0 {
      return Block::null();
    }

    let base = match self.heap.extend(bytes) {
      Some(base) => base.as_ptr(),
      None => return Block::null(),
    };
    self.heap_bytes += bytes;

    unsafe {
      // The fresh region starts right past the epilogue record, so the old
      // epilogue header becomes the new free block's header. Its prev link
      // is inherited in place: the previous tail element already points at
      // this address.
      debug_assert_eq!(base, self.epilogue.addr().add(EPILOGUE_SIZE));

      let block = self.epilogue;
      block.write_header(bytes, false);
      block.write_footer(bytes, false);

      let epilogue = block.next_in_heap();
      epilogue.write_header(0, true);

      block.set_next_free(epilogue);
      epilogue.set_prev_free(block);
      epilogue.set_next_free(Block::null());
      self.epilogue = epilogue;

      self.coalesce(block)
    }
  }

  /// Checks the heap for consistency and returns the number of problems
  /// found (0 means the heap is consistent). Each problem is also printed;
  /// with `verbose` every block is printed as it is visited.
  ///
  /// Verified: prologue size/flag and footer; header == footer for every
  /// block; payload alignment; no two adjacent free blocks; the block walk
  /// tiles the heap exactly from prologue to epilogue; epilogue size 0 and
  /// allocated; the free list is well formed in both directions and its
  /// membership is exactly the free blocks of the heap.
  pub fn check_heap(&self, verbose: bool) -> usize {
    let mut problems = 0;

    unsafe {
      if verbose {
        println!("Heap ({:p}):", self.prologue.addr());
      }

      if self.prologue.size() != PROLOGUE_SIZE || !self.prologue.is_allocated() {
        println!("Bad prologue header");
        problems += 1;
      }

      let prologue_footer = self.prologue.addr().add(PROLOGUE_SIZE - 8);
      if block::tag_size(prologue_footer) != PROLOGUE_SIZE
        || !block::tag_is_allocated(prologue_footer)
      {
        println!("Bad prologue footer");
        problems += 1;
      }

      let end = self.epilogue.addr() as usize;
      let mut heap_free_blocks = 0usize;
      let mut total_blocks = 0usize;
      let mut prev_was_free = false;
      let mut block = Block::at(self.prologue.addr().add(PROLOGUE_SIZE));

      while (block.addr() as usize) < end {
        let size = block.size();

        // A corrupt size would send this walk out of the heap; bail out.
        if size < MIN_BLOCK_SIZE
          || size % ALIGNMENT != 0
          || block.addr() as usize + size > end
        {
          println!("Error: bad block size {} at {:p}", size, block.addr());
          return problems + 1;
        }

        if verbose {
          self.print_block(block);
        }
        problems += check_block(block);

        if !block.is_allocated() {
          if prev_was_free {
            println!("Error: adjacent free blocks at {:p}", block.addr());
            problems += 1;
          }
          prev_was_free = true;
          heap_free_blocks += 1;
        } else {
          prev_was_free = false;
        }

        total_blocks += 1;
        block = block.next_in_heap();
      }

      if block.addr() as usize != end {
        println!("Error: heap walk overshot the epilogue");
        problems += 1;
      }

      if verbose {
        self.print_block(self.epilogue);
      }
      if self.epilogue.size() != 0 || !self.epilogue.is_allocated() {
        println!("Bad epilogue header");
        problems += 1;
      }

      // Forward free-list walk: flags, link symmetry, membership count.
      let mut list_blocks = 0usize;
      let mut b = self.prologue.next_free();
      while b != self.epilogue && list_blocks <= total_blocks {
        if b.is_allocated() {
          println!("Error: allocated block {:p} in the free list", b.addr());
          problems += 1;
        }
        if b.prev_free().next_free() != b || b.next_free().prev_free() != b {
          println!("Error: broken free-list links at {:p}", b.addr());
          problems += 1;
        }
        list_blocks += 1;
        b = b.next_free();
      }
      if b != self.epilogue {
        println!("Error: forward free-list walk does not reach the epilogue");
        problems += 1;
      }
      if list_blocks != heap_free_blocks {
        println!(
          "Error: {} free blocks in the heap, {} in the free list",
          heap_free_blocks, list_blocks
        );
        problems += 1;
      }

      // The backward walk must see the same population.
      let mut back = 0usize;
      let mut b = self.epilogue.prev_free();
      while b != self.prologue && back <= total_blocks {
        back += 1;
        b = b.prev_free();
      }
      if b != self.prologue || back != list_blocks {
        println!(
          "Error: backward free-list walk saw {} blocks, forward saw {}",
          back, list_blocks
        );
        problems += 1;
      }
    }

    problems
  }

  /// Total bytes acquired from the heap source so far.
  pub fn heap_size(&self) -> usize {
    self.heap_bytes
  }

  /// Number of blocks in the free list (sentinels excluded).
  pub fn free_block_count(&self) -> usize {
    let mut count = 0;

    unsafe {
      let mut b = self.prologue.next_free();
      while b != self.epilogue {
        count += 1;
        b = b.next_free();
      }
    }

    count
  }

  /// Sum of the block sizes in the free list.
  pub fn free_bytes(&self) -> usize {
    let mut bytes = 0;

    unsafe {
      let mut b = self.prologue.next_free();
      while b != self.epilogue {
        bytes += b.size();
        b = b.next_free();
      }
    }

    bytes
  }

  /// Prints one block: address, both tags, and the links if it is free.
  unsafe fn print_block(&self, block: Block) {
    unsafe {
      let size = block.size();
      if size == 0 {
        println!("{:p}: EOL", block.addr());
        return;
      }

      let footer = block.footer();
      let header_flag = if block.is_allocated() { 'a' } else { 'f' };
      let footer_flag = if block::tag_is_allocated(footer) { 'a' } else { 'f' };

      if block.is_allocated() {
        println!(
          "{:p}: header: [{}:{}] footer: [{}:{}]",
          block.addr(),
          size,
          header_flag,
          block::tag_size(footer),
          footer_flag,
        );
      } else {
        println!(
          "{:p}: header: [{}:{}] footer: [{}:{}] next: {:p} prev: {:p}",
          block.addr(),
          size,
          header_flag,
          block::tag_size(footer),
          footer_flag,
          block.next_free().addr(),
          block.prev_free().addr(),
        );
      }
    }
  }
}

/// Per-block checks: payload alignment and header/footer agreement.
unsafe fn check_block(block: Block) -> usize {
  let mut problems = 0;

  unsafe {
    if block.payload() as usize % ALIGNMENT != 0 {
      println!("Error: payload for block at {:p} is not aligned", block.addr());
      problems += 1;
    }

    let footer = block.footer();
    if block.size() != block::tag_size(footer)
      || block.is_allocated() != block::tag_is_allocated(footer)
    {
      println!("Error: header does not match footer at {:p}", block.addr());
      problems += 1;
    }
  }

  problems
}
