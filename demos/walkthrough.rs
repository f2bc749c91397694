use std::env;

use log::info;
use tagheap::{Heap, MmapRegion, Region, SbrkRegion};

/// Logs the region bounds and what the heap currently looks like.
fn print_heap<R: Region>(
  label: &str,
  heap: &Heap<R>,
) {
  let stats = heap.stats();

  info!(
    "[{}] region = {:?}..={:?}, {} blocks ({} free, {} free bytes, largest {})",
    label,
    heap.region().low(),
    heap.region().high(),
    stats.blocks,
    stats.free_blocks,
    stats.free_bytes,
    stats.largest_free,
  );
}

fn run<R: Region>(mut heap: Heap<R>) {
  print_heap("init", &heap);

  unsafe {
    // --------------------------------------------------------------------
    // 1) Allocate space for a u32. The smallest block is 16 bytes: two tag
    //    words plus 8 bytes of payload.
    // --------------------------------------------------------------------
    let first = heap.allocate(size_of::<u32>());
    (first as *mut u32).write(0xDEADBEEF);
    info!("[1] u32 at {:?}, usable = {}", first, heap.usable_size(first));

    // --------------------------------------------------------------------
    // 2) An odd-sized request is rounded up to the 8 byte alignment unit.
    // --------------------------------------------------------------------
    let second = heap.allocate(12);
    second.write_bytes(0xAB, 12);
    info!("[2] [u8; 12] at {:?}, usable = {}", second, heap.usable_size(second));

    // --------------------------------------------------------------------
    // 3) Free the first block. Its neighbours are allocated (prologue and
    //    second), so it stays a block on its own.
    // --------------------------------------------------------------------
    heap.deallocate(first);
    print_heap("3", &heap);

    // --------------------------------------------------------------------
    // 4) Next-fit resumes after `second`, so a small request is carved from
    //    the big trailing free block, not from the hole left by `first`.
    // --------------------------------------------------------------------
    let third = heap.allocate(2);
    info!(
      "[4] [u8; 2] at {:?}, reused first block? {}",
      third,
      third == first
    );

    // --------------------------------------------------------------------
    // 5) A 64 KiB request does not fit anywhere, so the region grows.
    // --------------------------------------------------------------------
    let big = heap.allocate(64 * 1024);
    print_heap("5", &heap);

    // --------------------------------------------------------------------
    // 6) Grow `second` by moving it. Its bytes travel along.
    // --------------------------------------------------------------------
    let second = heap.resize(second, 512);
    info!("[6] second moved to {:?}, byte 11 = {:#X}", second, second.add(11).read());

    // --------------------------------------------------------------------
    // 7) Free everything. Coalescing leaves a single free block behind.
    // --------------------------------------------------------------------
    heap.deallocate(second);
    heap.deallocate(third);
    heap.deallocate(big);
    print_heap("7", &heap);
  }

  heap.check();
  info!("[8] heap is consistent");
}

fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let use_sbrk = env::args().any(|arg| arg == "--sbrk");

  let result = if use_sbrk {
    // SAFETY: best effort. The demo allocates little through the global
    // allocator, and a foreign break move only makes an extension fail.
    unsafe { SbrkRegion::new() }
      .map_err(Into::into)
      .and_then(Heap::init)
      .map(run)
  } else {
    MmapRegion::new(1 << 20)
      .map_err(Into::into)
      .and_then(Heap::init)
      .map(run)
  };

  if let Err(error) = result {
    eprintln!("heap initialization failed: {error}");
    std::process::exit(1);
  }
}
