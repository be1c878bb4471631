//! # tagalloc - An Explicit Free-List Memory Allocator
//!
//! This crate implements a classic malloc-style allocator over a single
//! contiguous, monotonically-growing heap: **boundary tags** on every
//! block, an **explicit doubly-linked free list**, first-fit placement with
//! **size-segregated search direction**, and immediate coalescing.
//!
//! ## Overview
//!
//! ```text
//!   Heap layout:
//!
//!   ┌──────────┬────────┬────────┬────────┬────────┬─────┬──────────┐
//!   │ PROLOGUE │ alloc  │  free  │ alloc  │  free  │ ... │ EPILOGUE │
//!   │  (32:a)  │        │        │        │        │     │  (0:a)   │
//!   └──────────┴────────┴────────┴────────┴────────┴─────┴──────────┘
//!        │           ▲      │         ▲       │              ▲
//!        │           │      ▼         │       ▼              │
//!        └───────────┴── free list ───┴──────────────────────┘
//!             (doubly linked, threaded through free blocks)
//!
//!   Every block:
//!
//!   ┌────────┬──────────────────────────────────────────┬────────┐
//!   │ header │                 payload                  │ footer │
//!   │  8 B   │             block_size - 16              │  8 B   │
//!   └────────┴──────────────────────────────────────────┴────────┘
//!            ▲
//!            └── pointer returned to the user (8-aligned)
//! ```
//!
//! The footer duplicates the header, so freeing a block can inspect both
//! physical neighbors in O(1) and merge with whichever is free.
//!
//! Requests are split into two classes at a 100-byte payload threshold.
//! Small requests search the free list from the head and are placed at the
//! low end of the block they split; large requests search from the tail and
//! are placed at the high end. Small and large blocks therefore cluster at
//! opposite ends of the heap instead of interleaving, which keeps
//! fragmentation down.
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - align! macro (8-byte rounding)
//!   ├── constants  - sizes, thresholds, growth policy
//!   ├── block      - boundary tags and the free-list link overlay
//!   ├── list       - free-list splice primitives
//!   ├── heap       - HeapSource trait, SbrkHeap, ReservedHeap
//!   ├── error      - AllocError
//!   └── alloc      - FreeListAllocator: allocate / deallocate /
//!                    reallocate / check_heap
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{FreeListAllocator, ReservedHeap};
//!
//! fn main() {
//!     let heap = ReservedHeap::new(1 << 20).unwrap();
//!     let mut allocator = FreeListAllocator::new(heap).unwrap();
//!
//!     unsafe {
//!         let ptr = allocator.allocate(256);
//!         assert!(!ptr.is_null());
//!
//!         ptr.write_bytes(0x42, 256);
//!
//!         let bigger = allocator.reallocate(ptr, 4096);
//!         assert_eq!(bigger.read(), 0x42);
//!
//!         allocator.deallocate(bigger);
//!     }
//!
//!     assert_eq!(allocator.check_heap(false), 0);
//! }
//! ```
//!
//! To run against the real program break instead, construct the allocator
//! with [`SbrkHeap`]. That ties the allocator to `sbrk(2)` contiguity, so
//! nothing else in the process may move the break while the allocator is
//! growing.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: the allocator holds raw pointers into its
//!   heap and is neither `Send` nor `Sync`.
//! - **Memory is never returned to the OS**: freed blocks are recycled
//!   through the free list, the heap only grows.
//! - **Fixed 8-byte alignment**: no stricter alignment is available.
//! - **31-bit block sizes**: a single block tops out just under 2 GiB.
//!
//! ## Safety
//!
//! Allocation and deallocation hand out and consume raw pointers, so the
//! entry points are `unsafe`: the caller must not free a pointer twice, use
//! a freed pointer, or write outside a payload. The [`check_heap`]
//! consistency checker exists to catch the damage such misuse causes.
//!
//! [`check_heap`]: FreeListAllocator::check_heap
//! [`SbrkHeap`]: crate::heap::SbrkHeap

pub mod align;
pub mod constants;

mod alloc;
mod block;
mod error;
mod heap;
mod list;

pub use alloc::FreeListAllocator;
pub use error::AllocError;
pub use heap::{HeapSource, ReservedHeap, SbrkHeap};
