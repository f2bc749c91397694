use std::{error, fmt};

use log::error;

use crate::{
  block::{Block, Tag},
  constants::{ALIGNMENT, MIN_BLOCK_SIZE, PROLOGUE_SIZE, WSIZE},
  heap::Heap,
  region::Region,
};

/// A broken heap invariant, with the payload address of the block where it was
/// found.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Violation {
  /// Prologue is not an allocated 8 byte block right after the padding word.
  BadPrologue { addr: usize },
  /// The walk ended on something other than an allocated zero-sized block in
  /// the last word of the region.
  BadEpilogue { addr: usize },
  /// A header or footer lies outside the region.
  OutOfBounds { addr: usize },
  /// Payload or size not a multiple of the alignment unit.
  Misaligned { addr: usize },
  /// Size below the minimum block size.
  Undersized { addr: usize },
  /// Header and footer disagree.
  TagMismatch { addr: usize },
  /// Two address-adjacent blocks are both free.
  AdjacentFree { addr: usize },
  /// The search cursor does not name a block.
  StrayCursor { addr: usize },
  /// The walk found a different number of free blocks than the heap tracked.
  FreeCountMismatch { counted: usize, tracked: usize },
}

impl fmt::Display for Violation {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Violation::BadPrologue { addr } => write!(f, "bad prologue at {addr:#x}"),
      Violation::BadEpilogue { addr } => write!(f, "bad epilogue at {addr:#x}"),
      Violation::OutOfBounds { addr } => write!(f, "block {addr:#x} is outside the region"),
      Violation::Misaligned { addr } => write!(f, "block {addr:#x} is misaligned"),
      Violation::Undersized { addr } => {
        write!(f, "block {addr:#x} is smaller than {MIN_BLOCK_SIZE} bytes")
      }
      Violation::TagMismatch { addr } => write!(f, "header and footer of block {addr:#x} differ"),
      Violation::AdjacentFree { addr } => write!(f, "free block {addr:#x} follows a free block"),
      Violation::StrayCursor { addr } => write!(f, "search cursor {addr:#x} is not a block"),
      Violation::FreeCountMismatch { counted, tracked } => {
        write!(f, "found {counted} free blocks, expected {tracked}")
      }
    }
  }
}

impl error::Error for Violation {}

impl<R: Region> Heap<R> {
  /// Walks the whole heap and reports the first broken invariant.
  ///
  /// Every header is bounds-checked before it is read, so a corrupted size
  /// stops the walk instead of sending it outside the region.
  pub fn try_check(&self) -> Result<(), Violation> {
    let low = self.region.low() as usize;
    let high = self.region.high() as usize;

    let in_bounds = |block: Block, size: usize| {
      let header = block.header() as usize;
      header >= low && header.saturating_add(size.max(WSIZE)) - 1 <= high
    };

    let prologue = self.heap_listp;

    // SAFETY: every read below is preceded by a bounds check against the
    // region, which stays mapped for the lifetime of the heap.
    unsafe {
      let expected = Tag::pack(PROLOGUE_SIZE, true);

      if prologue.header() as usize != low + WSIZE
        || !in_bounds(prologue, PROLOGUE_SIZE)
        || prologue.tag() != expected
        || prologue.footer_tag() != expected
      {
        return Err(Violation::BadPrologue { addr: prologue.addr() });
      }

      let mut rover_seen = self.rover == prologue;
      let mut prev_free = false;
      let mut free_blocks = 0;
      let mut block = prologue.next();

      loop {
        if !in_bounds(block, WSIZE) {
          return Err(Violation::OutOfBounds { addr: block.addr() });
        }

        rover_seen |= block == self.rover;

        let tag = block.tag();
        let size = tag.size();

        if size == 0 {
          break;
        }

        if block.addr() % ALIGNMENT != 0 || tag.bits() as usize & (ALIGNMENT - 1) & !1 != 0 {
          return Err(Violation::Misaligned { addr: block.addr() });
        }

        if size < MIN_BLOCK_SIZE {
          return Err(Violation::Undersized { addr: block.addr() });
        }

        if !in_bounds(block, size) {
          return Err(Violation::OutOfBounds { addr: block.addr() });
        }

        if block.footer_tag() != tag {
          return Err(Violation::TagMismatch { addr: block.addr() });
        }

        if !tag.is_allocated() {
          if prev_free {
            return Err(Violation::AdjacentFree { addr: block.addr() });
          }
          free_blocks += 1;
        }

        prev_free = !tag.is_allocated();
        block = block.next();
      }

      if !block.is_allocated() || block.header() as usize != high + 1 - WSIZE {
        return Err(Violation::BadEpilogue { addr: block.addr() });
      }

      if !rover_seen {
        return Err(Violation::StrayCursor { addr: self.rover.addr() });
      }

      if free_blocks != self.free_blocks {
        return Err(Violation::FreeCountMismatch {
          counted: free_blocks,
          tracked: self.free_blocks,
        });
      }
    }

    Ok(())
  }

  /// Like [`Heap::try_check`], but panics on a violation. The panic is only
  /// process-fatal when the embedding binary builds with `panic = "abort"`.
  ///
  /// # Panics
  ///
  /// On the first broken invariant.
  pub fn check(&self) {
    if let Err(violation) = self.try_check() {
      error!("heap check failed: {violation}");
      panic!("heap check failed: {violation}");
    }
  }
}
