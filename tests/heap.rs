use std::collections::HashSet;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tagheap::{
  AllocError, Heap, HeapConfig, MmapRegion, Region, SearchMode,
  constants::{ALIGNMENT, CHUNK_SIZE, SENTINEL_OVERHEAD},
};

fn init_logger() {
  let _ = env_logger::builder().is_test(true).try_init();
}

fn heap_with(
  capacity: usize,
  search: SearchMode,
) -> Heap<MmapRegion> {
  init_logger();

  let config = HeapConfig {
    search,
    ..HeapConfig::default()
  };

  Heap::with_config(MmapRegion::new(capacity).unwrap(), config).unwrap()
}

fn heap() -> Heap<MmapRegion> {
  heap_with(1 << 20, SearchMode::NextFit)
}

fn assert_conserved(heap: &Heap<MmapRegion>) {
  let stats = heap.stats();

  assert_eq!(stats.heap_size, heap.region().size());
  assert_eq!(stats.free_bytes + stats.allocated_bytes, stats.heap_size - SENTINEL_OVERHEAD);
}

#[test]
fn two_allocations_do_not_overlap() {
  let mut heap = heap();

  let p1 = heap.allocate(100);
  let p2 = heap.allocate(200);

  assert!(!p1.is_null());
  assert!(!p2.is_null());
  assert_ne!(p1, p2);
  assert_eq!(p1 as usize % ALIGNMENT, 0);
  assert_eq!(p2 as usize % ALIGNMENT, 0);

  let (lo, lo_size, hi) = if p1 < p2 { (p1, 100, p2) } else { (p2, 200, p1) };
  assert!(lo as usize + lo_size <= hi as usize);

  heap.check();
}

#[test]
fn freed_block_is_reused_without_growth() {
  let mut heap = heap();

  let p = heap.allocate(100);
  let size = heap.region().size();

  unsafe { heap.deallocate(p) };

  let q = heap.allocate(100);

  assert_eq!(q, p);
  assert_eq!(heap.region().size(), size);
  heap.check();
}

#[test]
fn adjacent_frees_merge_into_one_block() {
  let mut heap = heap();

  let p1 = heap.allocate(48);
  let p2 = heap.allocate(80);

  assert_eq!(p2 as usize, p1 as usize + unsafe { heap.usable_size(p1) } + 8);

  unsafe {
    heap.deallocate(p1);
    heap.deallocate(p2);
  }

  heap.check();

  let stats = heap.stats();
  assert_eq!(stats.blocks, 1);
  assert_eq!(stats.free_blocks, 1);
  assert_eq!(stats.largest_free, CHUNK_SIZE);

  // The merged block starts where p1 did.
  assert_eq!(heap.allocate(48), p1);
}

#[test]
fn resize_to_zero_frees() {
  let mut resized = heap();
  let mut freed = heap();

  let a = resized.allocate(64);
  let _ = resized.allocate(64);
  let b = freed.allocate(64);
  let _ = freed.allocate(64);

  unsafe {
    assert!(resized.resize(a, 0).is_null());
    freed.deallocate(b);
  }

  resized.check();
  freed.check();
  assert_eq!(resized.stats(), freed.stats());
  assert_eq!(resized.stats().free_blocks, 2);
}

#[test]
fn resize_null_allocates() {
  let mut heap = heap();

  let p = unsafe { heap.resize(std::ptr::null_mut(), 32) };

  assert!(!p.is_null());
  assert!(unsafe { heap.usable_size(p) } >= 32);
  heap.check();
}

#[test]
fn resize_preserves_prefix() {
  let mut heap = heap();

  unsafe {
    let p = heap.allocate(100);
    for i in 0..100 {
      p.add(i).write(i as u8 ^ 0xA5);
    }

    let q = heap.resize(p, 1000);
    assert!(!q.is_null());

    for i in 0..100 {
      assert_eq!(q.add(i).read(), i as u8 ^ 0xA5);
    }
  }

  heap.check();
}

#[test]
fn churn_does_not_grow_the_heap() {
  for size in [1, 100, 3000, 10_000] {
    let mut heap = heap();

    let p = heap.allocate(size);
    unsafe { heap.deallocate(p) };
    let grown = heap.region().size();

    for _ in 0..1000 {
      let p = heap.allocate(size);
      assert!(!p.is_null());
      unsafe { heap.deallocate(p) };
    }

    assert_eq!(heap.region().size(), grown);
    heap.check();
  }
}

#[test]
fn out_of_memory_is_null() {
  let mut heap = heap_with(1 << 16, SearchMode::NextFit);
  let mut live = Vec::new();

  loop {
    let p = heap.allocate(1000);
    if p.is_null() {
      break;
    }
    live.push(p);
  }

  assert!(!live.is_empty());
  assert!(matches!(heap.try_allocate(1000), Err(AllocError::Region(_))));
  heap.check();

  for p in live {
    unsafe { heap.deallocate(p) };
  }

  heap.check();
  assert_eq!(heap.stats().free_blocks, 1);
  assert!(!heap.allocate(1000).is_null());
}

struct Live {
  ptr: *mut u8,
  size: usize,
  byte: u8,
}

fn random_workload(search: SearchMode) {
  let mut heap = heap_with(64 << 20, search);
  let mut rng = StdRng::seed_from_u64(0x7A6_4EA9);
  let mut live: Vec<Live> = Vec::new();

  let verify = |entry: &Live| unsafe {
    for i in 0..entry.size {
      assert_eq!(entry.ptr.add(i).read(), entry.byte);
    }
  };

  for step in 0..3000 {
    let roll = rng.gen_range(0..10);

    if roll < 5 || live.is_empty() {
      let size = rng.gen_range(1..=2048);
      let ptr = heap.allocate(size);
      assert!(!ptr.is_null());
      assert_eq!(ptr as usize % ALIGNMENT, 0);

      let byte = step as u8;
      unsafe { ptr.write_bytes(byte, size) };
      live.push(Live { ptr, size, byte });
    } else if roll < 8 {
      let entry = live.swap_remove(rng.gen_range(0..live.len()));
      verify(&entry);
      unsafe { heap.deallocate(entry.ptr) };
    } else {
      let index = rng.gen_range(0..live.len());
      let new_size = rng.gen_range(1..=4096);
      let entry = &mut live[index];

      let ptr = unsafe { heap.resize(entry.ptr, new_size) };
      assert!(!ptr.is_null());

      let kept = entry.size.min(new_size);
      for i in 0..kept {
        assert_eq!(unsafe { ptr.add(i).read() }, entry.byte);
      }

      unsafe { ptr.write_bytes(entry.byte, new_size) };
      entry.ptr = ptr;
      entry.size = new_size;
    }

    heap.check();

    if step % 100 == 0 {
      assert_conserved(&heap);
    }
  }

  let mut ranges: Vec<(usize, usize)> = live.iter().map(|e| (e.ptr as usize, e.size)).collect();
  ranges.sort();
  for pair in ranges.windows(2) {
    assert!(pair[0].0 + pair[0].1 <= pair[1].0, "overlapping allocations");
  }

  let distinct: HashSet<usize> = ranges.iter().map(|&(ptr, _)| ptr).collect();
  assert_eq!(distinct.len(), live.len());

  for entry in live.drain(..) {
    verify(&entry);
    unsafe { heap.deallocate(entry.ptr) };
  }

  heap.check();
  assert_conserved(&heap);
  assert_eq!(heap.stats().free_blocks, 1);
  assert_eq!(heap.stats().allocated_bytes, 0);
}

#[test]
fn random_workload_next_fit() {
  random_workload(SearchMode::NextFit);
}

#[test]
fn random_workload_first_fit() {
  random_workload(SearchMode::FirstFit);
}

#[test]
fn random_workload_best_fit() {
  random_workload(SearchMode::BestFit);
}
