use std::ptr::{self, NonNull};

use log::{debug, trace};

use crate::{
  block::{Block, Tag},
  config::{HeapConfig, SearchMode},
  constants::{
    ALIGNMENT, DSIZE, MAX_BLOCK_SIZE, MAX_HEAP_SIZE, MIN_BLOCK_SIZE, OVERHEAD, PROLOGUE_SIZE,
    SENTINEL_OVERHEAD, WSIZE,
  },
  error::{AllocError, RegionError},
  region::Region,
};

/// Snapshot of the heap, taken by walking every block.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Bytes currently obtained from the region.
  pub heap_size: usize,
  /// Real blocks, sentinels excluded.
  pub blocks: usize,
  pub free_blocks: usize,
  /// Sum of free block sizes, tags included.
  pub free_bytes: usize,
  /// Sum of allocated block sizes, tags included.
  pub allocated_bytes: usize,
  pub largest_free: usize,
}

/// A boundary-tag allocator over a single grow-only [`Region`].
///
/// The heap starts with a padding word and an allocated prologue, ends with a
/// zero-sized allocated epilogue, and every block in between carries identical
/// header and footer tags. Free blocks are found by walking that implicit
/// address-ordered list.
pub struct Heap<R: Region> {
  pub(crate) region: R,
  pub(crate) config: HeapConfig,
  /// Prologue block, the anchor of every heap walk.
  pub(crate) heap_listp: Block,
  /// Next-fit cursor.
  pub(crate) rover: Block,
  /// Free blocks, counted as they are created and destroyed.
  pub(crate) free_blocks: usize,
}

impl<R: Region> Heap<R> {
  /// Builds a heap over `region` with the default [`HeapConfig`].
  pub fn init(region: R) -> Result<Self, AllocError> {
    Self::with_config(region, HeapConfig::default())
  }

  /// Lays out the sentinels and grows the heap by one chunk to create the
  /// first free block.
  ///
  /// ```text
  ///   low
  ///    ┌─────────┬───────────┬───────────┬───────────┐
  ///    │ padding │ 8 | alloc │ 8 | alloc │ 0 | alloc │
  ///    └─────────┴───────────┴───────────┴───────────┘
  ///               prologue hdr  prologue ftr  epilogue hdr
  /// ```
  ///
  /// Any failure drops `region` along with the half-built heap.
  pub fn with_config(
    mut region: R,
    config: HeapConfig,
  ) -> Result<Self, AllocError> {
    let start = region.extend(SENTINEL_OVERHEAD)?;

    if start as usize % ALIGNMENT != 0 {
      return Err(RegionError::Misaligned { addr: start as usize }.into());
    }

    // SAFETY: the region just handed out these four words.
    unsafe {
      Tag::pack(0, false).write(start);
      Tag::pack(PROLOGUE_SIZE, true).write(start.add(WSIZE));
      Tag::pack(PROLOGUE_SIZE, true).write(start.add(2 * WSIZE));
      Tag::pack(0, true).write(start.add(3 * WSIZE));
    }

    let prologue = Block::from_payload(start.wrapping_add(DSIZE));

    let mut heap = Self {
      region,
      config,
      heap_listp: prologue,
      rover: prologue,
      free_blocks: 0,
    };

    heap.extend(config.chunk_size)?;

    debug!(
      "heap initialized at {:?}, {} bytes, {:?}",
      heap.region.low(),
      heap.region.size(),
      heap.config.search
    );

    Ok(heap)
  }

  pub fn region(&self) -> &R {
    &self.region
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  /// Allocates at least `size` bytes, returning null for `size == 0` or when
  /// the region cannot grow any further.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    match self.try_allocate(size) {
      Ok(ptr) => ptr.as_ptr(),
      Err(AllocError::ZeroSize) => ptr::null_mut(),
      Err(error) => {
        debug!("allocate({size}) failed: {error}");
        ptr::null_mut()
      }
    }
  }

  /// Like [`Heap::allocate`], but says why it failed. No block is modified on
  /// any error path.
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let asize = adjusted_size(size)?;

    // SAFETY: the heap exclusively owns the region, and every block reached
    // from the prologue is well formed between public calls.
    let block = match unsafe { self.find_fit(asize) } {
      Some(block) => block,
      None => self.extend(asize.max(self.config.chunk_size))?,
    };

    unsafe { self.place(block, asize) };

    trace!(
      "allocated {size} bytes ({asize} byte block) at {:?}, heap size = {}",
      block.payload(),
      self.region.size()
    );

    // SAFETY: block pointers lie inside the region, which is never at null.
    Ok(unsafe { NonNull::new_unchecked(block.payload()) })
  }

  /// Returns a block to the heap, merging it with free neighbours.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this heap's
  /// `allocate`/`resize` that has not been freed since.
  pub unsafe fn deallocate(
    &mut self,
    ptr: *mut u8,
  ) {
    if ptr.is_null() {
      return;
    }

    let block = Block::from_payload(ptr);

    unsafe {
      debug_assert!(block.is_allocated(), "double free of {ptr:?}");

      let size = block.size();
      block.set(size, false);
      self.free_blocks += 1;

      trace!("freed {size} byte block at {ptr:?}");

      self.coalesce(block);
    }
  }

  /// Moves the contents of `ptr` into a fresh block of `new_size` bytes.
  ///
  /// A null `ptr` behaves like `allocate(new_size)`, a zero `new_size` like
  /// `deallocate(ptr)` (and returns null). On failure null is returned and the
  /// original block is left allocated and unchanged.
  ///
  /// # Safety
  ///
  /// Same contract as [`Heap::deallocate`].
  pub unsafe fn resize(
    &mut self,
    ptr: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    if new_size == 0 {
      unsafe { self.deallocate(ptr) };
      return ptr::null_mut();
    }

    let Some(old) = NonNull::new(ptr) else {
      return self.allocate(new_size);
    };

    match unsafe { self.try_resize(old, new_size) } {
      Ok(new) => new.as_ptr(),
      Err(error) => {
        debug!("resize({ptr:?}, {new_size}) failed: {error}");
        ptr::null_mut()
      }
    }
  }

  /// Allocate, copy, free. Never grows a block in place. A zero `new_size`
  /// is rejected with [`AllocError::ZeroSize`] and frees nothing.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live allocation of this heap.
  pub unsafe fn try_resize(
    &mut self,
    ptr: NonNull<u8>,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let new = self.try_allocate(new_size)?;

    unsafe {
      let count = new_size.min(self.usable_size(ptr.as_ptr()));
      ptr::copy_nonoverlapping(ptr.as_ptr(), new.as_ptr(), count);
      self.deallocate(ptr.as_ptr());
    }

    Ok(new)
  }

  /// Payload bytes available behind `ptr`, at least what was requested.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live allocation of this heap.
  pub unsafe fn usable_size(
    &self,
    ptr: *mut u8,
  ) -> usize {
    unsafe { Block::from_payload(ptr).size() - OVERHEAD }
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      heap_size: self.region.size(),
      ..HeapStats::default()
    };

    for block in self.blocks() {
      // SAFETY: `blocks` only yields blocks of this heap.
      let tag = unsafe { block.tag() };

      stats.blocks += 1;

      if tag.is_allocated() {
        stats.allocated_bytes += tag.size();
      } else {
        stats.free_blocks += 1;
        stats.free_bytes += tag.size();
        stats.largest_free = stats.largest_free.max(tag.size());
      }
    }

    stats
  }

  /// Real blocks in address order, from the one after the prologue up to (not
  /// including) the epilogue.
  pub(crate) fn blocks(&self) -> Blocks<'_, R> {
    Blocks {
      // SAFETY: the prologue is always followed by a block or the epilogue.
      next: unsafe { self.heap_listp.next() },
      _heap: self,
    }
  }

  /// Grows the region by `bytes` (rounded up to an even number of words) and
  /// turns the new span into a free block, merged with a trailing free block
  /// if there is one.
  ///
  /// The heap stays within [`MAX_HEAP_SIZE`], which bounds every block that
  /// coalescing can produce.
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<Block, AllocError> {
    let size = bytes
      .checked_add(DSIZE - 1)
      .map(|size| (size & !(DSIZE - 1)).max(MIN_BLOCK_SIZE))
      .filter(|&size| size <= MAX_BLOCK_SIZE)
      .ok_or(AllocError::TooLarge(bytes))?;

    if size > MAX_HEAP_SIZE - self.region.size() {
      return Err(AllocError::HeapFull { requested: size });
    }

    let bp = self.region.extend(size)?;

    debug!("extended heap by {size} bytes at {bp:?}");

    // The new span starts where the old epilogue's payload was, so the old
    // epilogue header becomes the new block's header.
    let block = Block::from_payload(bp);

    unsafe {
      block.set(size, false);
      Tag::pack(0, true).write(block.next().header());
      self.free_blocks += 1;

      Ok(self.coalesce(block))
    }
  }

  /// Marks `asize` bytes of the free `block` allocated, splitting off the rest
  /// as a new free block when it is big enough to stand on its own.
  unsafe fn place(
    &mut self,
    block: Block,
    asize: usize,
  ) {
    unsafe {
      let csize = block.size();

      if csize - asize >= MIN_BLOCK_SIZE {
        block.set(asize, true);
        block.next().set(csize - asize, false);
      } else {
        block.set(csize, true);
        self.free_blocks -= 1;
      }
    }
  }

  unsafe fn find_fit(
    &mut self,
    asize: usize,
  ) -> Option<Block> {
    unsafe {
      match self.config.search {
        SearchMode::NextFit => self.next_fit(asize),
        SearchMode::FirstFit => self.first_fit(asize),
        SearchMode::BestFit => self.best_fit(asize),
      }
    }
  }

  /// Scans from the cursor to the epilogue, then from the first block up to
  /// where the scan began. The cursor is left on the block that fits.
  unsafe fn next_fit(
    &mut self,
    asize: usize,
  ) -> Option<Block> {
    unsafe {
      let start = self.rover;

      while self.rover.size() > 0 {
        if fits(self.rover, asize) {
          return Some(self.rover);
        }
        self.rover = self.rover.next();
      }

      let mut block = self.heap_listp;

      while block < start {
        if fits(block, asize) {
          self.rover = block;
          return Some(block);
        }
        block = block.next();
      }

      trace!("no fit for {asize} bytes");

      None
    }
  }

  unsafe fn first_fit(
    &self,
    asize: usize,
  ) -> Option<Block> {
    self.blocks().find(|&block| unsafe { fits(block, asize) })
  }

  unsafe fn best_fit(
    &self,
    asize: usize,
  ) -> Option<Block> {
    let mut best: Option<(Block, usize)> = None;

    for block in self.blocks() {
      if !unsafe { fits(block, asize) } {
        continue;
      }

      let size = unsafe { block.size() };

      if size == asize {
        return Some(block);
      }

      match best {
        Some((_, best_size)) if best_size <= size => {}
        _ => best = Some((block, size)),
      }
    }

    best.map(|(block, _)| block)
  }

  /// Boundary-tag coalescing of a block that was just marked free. Returns the
  /// surviving block, which is the predecessor whenever that was free.
  unsafe fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    unsafe {
      let prev_alloc = block.prev_tag().is_allocated();
      let next = block.next();
      let next_alloc = next.is_allocated();
      let mut size = block.size();

      let merged = match (prev_alloc, next_alloc) {
        (true, true) => return block,
        (true, false) => {
          size += next.size();
          block.set(size, false);
          self.free_blocks -= 1;
          block
        }
        (false, true) => {
          let prev = block.prev();
          size += prev.size();
          prev.set(size, false);
          self.free_blocks -= 1;
          prev
        }
        (false, false) => {
          let prev = block.prev();
          size += prev.size() + next.size();
          prev.set(size, false);
          self.free_blocks -= 2;
          prev
        }
      };

      trace!("coalesced into {size} byte block at {:?}", merged.payload());

      // The cursor must not be left pointing into the middle of the merged
      // block.
      if self.rover > merged && self.rover < merged.next() {
        self.rover = merged;
      }

      merged
    }
  }
}

/// Iterator over the real blocks of a heap.
pub(crate) struct Blocks<'a, R: Region> {
  next: Block,
  _heap: &'a Heap<R>,
}

impl<R: Region> Iterator for Blocks<'_, R> {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    // SAFETY: the borrow of the heap keeps every block in place.
    unsafe {
      if self.next.size() == 0 {
        return None;
      }

      let block = self.next;
      self.next = block.next();

      Some(block)
    }
  }
}

/// Block size for a request: payload plus tags, rounded up to the alignment
/// unit, never below the minimum block.
fn adjusted_size(size: usize) -> Result<usize, AllocError> {
  if size <= DSIZE {
    return Ok(MIN_BLOCK_SIZE);
  }

  size
    .checked_add(OVERHEAD + ALIGNMENT - 1)
    .map(|size| size & !(ALIGNMENT - 1))
    .filter(|&size| size <= MAX_BLOCK_SIZE)
    .ok_or(AllocError::TooLarge(size))
}

unsafe fn fits(
  block: Block,
  asize: usize,
) -> bool {
  let tag = unsafe { block.tag() };
  !tag.is_allocated() && asize <= tag.size()
}
