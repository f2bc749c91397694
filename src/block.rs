use std::ptr;

use crate::constants::{ALIGNMENT, DSIZE, MAX_BLOCK_SIZE, WSIZE};

/// A boundary tag: block size with the allocated bit packed into its low bits.
///
/// Sizes are always multiples of [`ALIGNMENT`], so the low three bits are free
/// for flags. Only bit 0 is used.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Tag(u32);

impl Tag {
  const ALLOC_BIT: u32 = 0x1;
  const SIZE_MASK: u32 = !((ALIGNMENT as u32) - 1);

  pub fn pack(
    size: usize,
    allocated: bool,
  ) -> Self {
    debug_assert!(size % ALIGNMENT == 0, "unaligned block size {size}");
    assert!(size <= MAX_BLOCK_SIZE, "block size {size} does not fit in a tag");
    Self(size as u32 | allocated as u32)
  }

  pub fn size(self) -> usize {
    (self.0 & Self::SIZE_MASK) as usize
  }

  pub fn is_allocated(self) -> bool {
    self.0 & Self::ALLOC_BIT != 0
  }

  pub fn bits(self) -> u32 {
    self.0
  }

  /// # Safety
  ///
  /// `addr` must be valid for a 4-byte aligned read.
  pub unsafe fn read(addr: *const u8) -> Self {
    Self(unsafe { ptr::read(addr as *const u32) })
  }

  /// # Safety
  ///
  /// `addr` must be valid for a 4-byte aligned write.
  pub unsafe fn write(
    self,
    addr: *mut u8,
  ) {
    unsafe { ptr::write(addr as *mut u32, self.0) }
  }
}

/// Handle to a block, addressed by its payload pointer ("block pointer").
///
/// ```text
///        header               payload                    footer
///   ┌─────────────┬──────────────────────────────┬─────────────┐
///   │ size | a    │                              │ size | a    │
///   └─────────────┴──────────────────────────────┴─────────────┘
///   ▲             ▲                                            ▲
///   header()      bp                              next().header()
/// ```
///
/// A `Block` is only a computed address. It owns nothing and every accessor
/// reads the tags from heap memory, so all of them are `unsafe`: the caller
/// promises the handle still names the start of a block inside a live heap.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Block {
  bp: *mut u8,
}

impl Block {
  pub fn from_payload(bp: *mut u8) -> Self {
    Self { bp }
  }

  pub fn payload(self) -> *mut u8 {
    self.bp
  }

  pub fn addr(self) -> usize {
    self.bp as usize
  }

  /// Address of the header word, one word before the payload.
  pub fn header(self) -> *mut u8 {
    self.bp.wrapping_sub(WSIZE)
  }

  /// # Safety
  ///
  /// The header word must be readable.
  pub unsafe fn tag(self) -> Tag {
    unsafe { Tag::read(self.header()) }
  }

  /// # Safety
  ///
  /// The header word must be readable.
  pub unsafe fn size(self) -> usize {
    unsafe { self.tag().size() }
  }

  /// # Safety
  ///
  /// The header word must be readable.
  pub unsafe fn is_allocated(self) -> bool {
    unsafe { self.tag().is_allocated() }
  }

  /// Address of the footer word: header + size - 1 word, i.e. payload +
  /// size - 2 words.
  ///
  /// # Safety
  ///
  /// The header word must be readable.
  pub unsafe fn footer(self) -> *mut u8 {
    unsafe { self.bp.add(self.size()).wrapping_sub(DSIZE) }
  }

  /// # Safety
  ///
  /// The footer word must be readable.
  pub unsafe fn footer_tag(self) -> Tag {
    unsafe { Tag::read(self.footer()) }
  }

  /// Rewrites header and footer. The footer position is derived from the new
  /// size, so the header is written first.
  ///
  /// # Safety
  ///
  /// `[header, header + size)` must lie inside the heap.
  pub unsafe fn set(
    self,
    size: usize,
    allocated: bool,
  ) {
    let tag = Tag::pack(size, allocated);
    unsafe {
      tag.write(self.header());
      tag.write(self.footer());
    }
  }

  /// The block that starts right after this one. For the epilogue (size 0)
  /// this is the epilogue itself.
  ///
  /// # Safety
  ///
  /// The header word must be readable.
  pub unsafe fn next(self) -> Block {
    unsafe { Block::from_payload(self.bp.add(self.size())) }
  }

  /// Footer of the block that ends right before this one, i.e. the word
  /// before our header.
  ///
  /// # Safety
  ///
  /// The word before the header must be readable.
  pub unsafe fn prev_tag(self) -> Tag {
    unsafe { Tag::read(self.bp.wrapping_sub(DSIZE)) }
  }

  /// The block that ends right before this one, found through its footer.
  ///
  /// # Safety
  ///
  /// The word before the header must be the footer of a block.
  pub unsafe fn prev(self) -> Block {
    unsafe { Block::from_payload(self.bp.wrapping_sub(self.prev_tag().size())) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_tag_pack() {
    let tag = Tag::pack(4096, true);

    assert_eq!(tag.size(), 4096);
    assert!(tag.is_allocated());
    assert_eq!(tag.bits(), 4097);

    let tag = Tag::pack(24, false);

    assert_eq!(tag.size(), 24);
    assert!(!tag.is_allocated());
  }

  #[test]
  fn test_epilogue_tag() {
    let tag = Tag::pack(0, true);

    assert_eq!(tag.size(), 0);
    assert!(tag.is_allocated());
  }

  #[test]
  #[should_panic(expected = "does not fit in a tag")]
  fn test_tag_rejects_oversized_block() {
    Tag::pack(MAX_BLOCK_SIZE + ALIGNMENT, false);
  }

  #[test]
  fn test_block_navigation() {
    // Two blocks laid out by hand: [pad | 16 free | 24 alloc | epilogue]
    let mut words = [0u64; 8];
    let base = words.as_mut_ptr() as *mut u8;

    unsafe {
      let first = Block::from_payload(base.add(8));
      first.set(16, false);

      let second = first.next();
      assert_eq!(second.addr(), first.addr() + 16);
      second.set(24, true);

      let epilogue = second.next();
      Tag::pack(0, true).write(epilogue.header());

      assert_eq!(first.size(), 16);
      assert!(!first.is_allocated());
      assert_eq!(first.tag(), first.footer_tag());
      assert_eq!(first.footer(), base.add(8 + 16 - 8));

      assert_eq!(second.prev(), first);
      assert_eq!(epilogue.prev(), second);
      assert!(second.is_allocated());
      assert_eq!(second.footer_tag(), Tag::pack(24, true));

      assert_eq!(epilogue.size(), 0);
      assert_eq!(epilogue.next(), epilogue);
    }
  }
}
