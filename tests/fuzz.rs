// Randomized interleaving of allocate / deallocate / reallocate.
//
// The fuzzer keeps an in-memory shadow copy of every live payload and
// continuously asserts that the allocator never lets two live blocks
// overlap or lose a byte. The heap is checked for consistency after every
// phase.
use rand::prelude::*;
use std::collections::HashMap;

use tagalloc::constants::CHUNKSIZE;
use tagalloc::{FreeListAllocator, ReservedHeap};

const ROUNDS: usize = 4;
const OPS_PER_ROUND: usize = 2_000;
const CHECK_EVERY: usize = 250;
const MAX_LIVE: usize = 1_200;

struct Fuzzer {
  allocator: FreeListAllocator<ReservedHeap>,
  live: HashMap<usize, Vec<u8>>,
  rng: StdRng,
}

impl Fuzzer {
  fn new(seed: u64) -> Self {
    let heap = ReservedHeap::new(256 * CHUNKSIZE).unwrap();

    Self {
      allocator: FreeListAllocator::new(heap).unwrap(),
      live: HashMap::new(),
      rng: StdRng::seed_from_u64(seed),
    }
  }

  fn random_size(&mut self) -> usize {
    let size = self.rng.gen_range(1..=2_000);

    if size == 2_000 {
      // occasional oversize request
      17 * 1024
    } else {
      size
    }
  }

  fn random_live_ptr(&mut self) -> Option<*mut u8> {
    if self.live.is_empty() {
      return None;
    }

    let index = self.rng.gen_range(0..self.live.len());
    self.live.keys().nth(index).map(|&addr| addr as *mut u8)
  }

  fn fill(&mut self, ptr: *mut u8, size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    self.rng.fill(&mut data[..]);

    unsafe {
      std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, size);
    }

    data
  }

  fn alloc(&mut self) {
    let size = self.random_size();
    let ptr = unsafe { self.allocator.allocate(size) };

    if ptr.is_null() {
      // Heap source exhausted; make room and carry on.
      self.free_half();
      return;
    }

    assert_eq!(ptr as usize % 8, 0);

    let data = self.fill(ptr, size);
    let evicted = self.live.insert(ptr as usize, data);
    assert!(evicted.is_none(), "allocator returned a live pointer twice");
  }

  fn free(&mut self) {
    let Some(ptr) = self.random_live_ptr() else { return };

    self.verify_one(ptr);
    self.live.remove(&(ptr as usize));

    unsafe { self.allocator.deallocate(ptr) };
  }

  fn realloc(&mut self) {
    let Some(ptr) = self.random_live_ptr() else { return };
    let new_size = self.random_size();

    let old = self.live.remove(&(ptr as usize)).unwrap();
    let new_ptr = unsafe { self.allocator.reallocate(ptr, new_size) };

    // The common prefix must have survived the move.
    let prefix = old.len().min(new_size);
    unsafe {
      for (i, &byte) in old[..prefix].iter().enumerate() {
        assert_eq!(new_ptr.add(i).read(), byte, "realloc lost byte {i}");
      }
    }

    let data = self.fill(new_ptr, new_size);
    let evicted = self.live.insert(new_ptr as usize, data);
    assert!(evicted.is_none(), "realloc returned a live pointer");
  }

  fn free_half(&mut self) {
    let victims: Vec<usize> = self
      .live
      .keys()
      .copied()
      .take(self.live.len() / 2 + 1)
      .collect();

    for addr in victims {
      self.verify_one(addr as *mut u8);
      self.live.remove(&addr);
      unsafe { self.allocator.deallocate(addr as *mut u8) };
    }
  }

  fn verify_one(&self, ptr: *mut u8) {
    let data = &self.live[&(ptr as usize)];

    unsafe {
      for (i, &byte) in data.iter().enumerate() {
        assert_eq!(ptr.add(i).read(), byte);
      }
    }
  }

  fn verify_all(&self) {
    for &addr in self.live.keys() {
      self.verify_one(addr as *mut u8);
    }

    assert_eq!(self.allocator.check_heap(false), 0);
  }
}

#[test]
fn fuzz() {
  let mut fuzzer = Fuzzer::new(0x7461_67616c6c6f63);

  for round in 0..ROUNDS {
    for op in 0..OPS_PER_ROUND {
      match fuzzer.rng.gen_range(0..10) {
        0..=5 if fuzzer.live.len() < MAX_LIVE => fuzzer.alloc(),
        0..=5 => fuzzer.free(),
        6..=8 => fuzzer.free(),
        _ => fuzzer.realloc(),
      }

      if op % CHECK_EVERY == 0 {
        fuzzer.verify_all();
      }
    }

    fuzzer.verify_all();

    println!(
      "round {}: {} live blocks, heap {} KiB",
      round,
      fuzzer.live.len(),
      fuzzer.allocator.heap_size() / 1024
    );
  }

  // Drain everything; the interior must knit itself back together.
  let remaining: Vec<usize> = fuzzer.live.keys().copied().collect();
  for addr in remaining {
    fuzzer.live.remove(&addr);
    unsafe { fuzzer.allocator.deallocate(addr as *mut u8) };
  }

  assert_eq!(fuzzer.allocator.check_heap(false), 0);
  assert_eq!(fuzzer.allocator.free_block_count(), 1);
}
