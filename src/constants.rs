//! Compile-time configuration of the allocator.
//!
//! All sizes are in bytes and all of them are multiples of [`ALIGNMENT`],
//! so every block boundary the allocator ever computes stays 8-aligned.

/// Alignment of every block base and every returned payload pointer.
pub const ALIGNMENT: usize = 8;

/// Size of a single boundary tag (header or footer).
pub const TAG_SIZE: usize = 8;

/// Per-block metadata overhead: one header plus one footer.
pub const OVERHEAD: usize = 2 * TAG_SIZE;

/// Space taken by the `next`/`prev` free-list links overlaid on the payload
/// of a free block.
pub const LINKS_SIZE: usize = 16;

/// Smallest block the allocator will ever create: header + footer + the two
/// link slots a free block must be able to host.
pub const MIN_BLOCK_SIZE: usize = OVERHEAD + LINKS_SIZE;

/// Size of the prologue sentinel: header + next + prev + a real footer.
pub const PROLOGUE_SIZE: usize = 32;

/// Bytes occupied by the epilogue sentinel record (header + next + prev).
/// Its header's size *field* is always 0.
pub const EPILOGUE_SIZE: usize = 24;

/// Initial heap acquisition and minimum growth unit.
pub const CHUNKSIZE: usize = 1 << 16;

/// Eager growth multiplier applied when a request at or below [`CHUNKSIZE`]
/// forces the heap to grow.
pub const GROWTH_FACTOR: usize = 6;

/// Largest payload considered a "small" request. Small requests search the
/// free list from the head and split at the low end of a block; large
/// requests search from the tail and split at the high end.
pub const SMALL_PAYLOAD_MAX: usize = 100;

/// Largest encodable block. The size field is 31 bits and block sizes are
/// multiples of [`ALIGNMENT`].
pub const MAX_BLOCK_SIZE: usize = (1 << 31) - ALIGNMENT;
