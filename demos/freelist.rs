use libc::sbrk;
use tagalloc::{FreeListAllocator, SbrkHeap};

/// Prints the current program break using `sbrk(0)`.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  unsafe {
    print_program_break("start");

    // The allocator claims one 64 KiB chunk from the break up front. All
    // the allocations below are served out of it; the break does not move
    // again for the rest of the demo.
    let mut allocator = FreeListAllocator::new(SbrkHeap::new())
      .expect("failed to acquire the initial heap region");

    print_program_break("after init");
    println!("\n[1] Fresh heap: prologue, one free block, epilogue");
    allocator.check_heap(true);

    // --------------------------------------------------------------------
    // 2) Two small allocations. Small requests (payload <= 100 bytes) are
    //    carved from the LOW end of the heap.
    // --------------------------------------------------------------------
    let a = allocator.allocate(40);
    let b = allocator.allocate(64);
    println!("\n[2] Small allocations: a = {a:p}, b = {b:p}");

    a.write_bytes(0xAA, 40);
    b.write_bytes(0xBB, 64);

    // --------------------------------------------------------------------
    // 3) A large allocation. Large requests are carved from the HIGH end,
    //    so it lands far above the two small blocks.
    // --------------------------------------------------------------------
    let big = allocator.allocate(2048);
    println!("\n[3] Large allocation: big = {big:p}");
    println!(
      "    distance from the small end: {} bytes",
      big as usize - a as usize
    );
    allocator.check_heap(true);

    // --------------------------------------------------------------------
    // 4) Free the first small block and watch it come back: the free list
    //    serves it to the next small request of the same size.
    // --------------------------------------------------------------------
    allocator.deallocate(a);
    let a2 = allocator.allocate(40);
    println!("\n[4] Freed a, allocated 40 bytes again: a2 = {a2:p}");
    println!(
      "    reused the same block? {}",
      if a2 == a { "yes" } else { "no" }
    );

    // --------------------------------------------------------------------
    // 5) Grow the large block. The contents move, the bytes survive.
    // --------------------------------------------------------------------
    big.write_bytes(0xCC, 2048);
    let bigger = allocator.reallocate(big, 8192);
    println!("\n[5] Reallocated 2048 -> 8192: bigger = {bigger:p}");
    println!(
      "    first and last original bytes: {:#04X}, {:#04X}",
      bigger.read(),
      bigger.add(2047).read()
    );

    // --------------------------------------------------------------------
    // 6) Free everything. Coalescing knits the interior back into a single
    //    free block: the heap ends exactly where it started.
    // --------------------------------------------------------------------
    allocator.deallocate(a2);
    allocator.deallocate(b);
    allocator.deallocate(bigger);

    println!("\n[6] After freeing everything:");
    allocator.check_heap(true);
    println!(
      "\nfree blocks: {}, free bytes: {}, problems: {}",
      allocator.free_block_count(),
      allocator.free_bytes(),
      allocator.check_heap(false)
    );

    print_program_break("end");
  }
}
