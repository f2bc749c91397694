use std::ptr;

use libc::{
  MAP_ANONYMOUS, MAP_FAILED, MAP_NORESERVE, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, intptr_t,
  mmap, munmap, sbrk,
};
use log::debug;

use crate::{align, align_to, error::RegionError};

/// A grow-only, contiguous source of raw memory.
///
/// # Safety
///
/// Implementors promise that every span returned by [`Region::extend`] is
/// readable and writable, starts exactly at the previous end of the region and
/// stays valid for as long as the region lives. Nothing else may write to the
/// region's memory.
pub unsafe trait Region {
  /// Grows the region by exactly `incr` bytes and returns the start of the new
  /// span (the old end of the region).
  fn extend(
    &mut self,
    incr: usize,
  ) -> Result<*mut u8, RegionError>;

  /// First byte of the region.
  fn low(&self) -> *mut u8;

  /// Number of bytes currently in the region.
  fn size(&self) -> usize;

  /// Last byte of the region (inclusive). One before `low()` while empty.
  fn high(&self) -> *mut u8 {
    self.low().wrapping_add(self.size()).wrapping_sub(1)
  }
}

/// A fixed-capacity reservation obtained with `mmap(2)`, handed out by moving a
/// private break forward.
///
/// ```text
///   low                        brk                           low + capacity
///    ┌──────────────────────────┬──────────────────────────────────┐
///    │      live region         │     reserved, not yet handed out │
///    └──────────────────────────┴──────────────────────────────────┘
/// ```
///
/// Pages are mapped with `MAP_NORESERVE`, so a large capacity only costs
/// address space until it is touched.
pub struct MmapRegion {
  base: *mut u8,
  capacity: usize,
  brk: usize,
}

impl MmapRegion {
  /// Reserves at least `capacity` bytes (rounded up to whole pages, at least
  /// one page).
  pub fn new(capacity: usize) -> Result<Self, RegionError> {
    let capacity = align_to!(capacity.max(1), page_size::get());

    // SAFETY: anonymous private mapping, no existing memory is touched.
    let base = unsafe {
      mmap(
        ptr::null_mut(),
        capacity,
        PROT_READ | PROT_WRITE,
        MAP_NORESERVE | MAP_ANONYMOUS | MAP_PRIVATE,
        -1,
        0,
      )
    };

    if base == MAP_FAILED {
      return Err(RegionError::Exhausted { requested: capacity });
    }

    debug!("mapped region of {capacity} bytes at {base:?}");

    Ok(Self {
      base: base as *mut u8,
      capacity,
      brk: 0,
    })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }
}

unsafe impl Region for MmapRegion {
  fn extend(
    &mut self,
    incr: usize,
  ) -> Result<*mut u8, RegionError> {
    if incr > self.capacity - self.brk {
      return Err(RegionError::Exhausted { requested: incr });
    }

    let old_brk = self.base.wrapping_add(self.brk);
    self.brk += incr;

    Ok(old_brk)
  }

  fn low(&self) -> *mut u8 {
    self.base
  }

  fn size(&self) -> usize {
    self.brk
  }
}

impl Drop for MmapRegion {
  fn drop(&mut self) {
    // SAFETY: `base` and `capacity` are exactly what `mmap` returned and
    // accepted, and the mapping is never unmapped anywhere else.
    unsafe {
      munmap(self.base as *mut c_void, self.capacity);
    }
  }
}

/// The process heap, grown with `sbrk(2)`.
pub struct SbrkRegion {
  low: *mut u8,
  size: usize,
}

impl SbrkRegion {
  /// Takes the current program break as the start of the region, first
  /// bumping it to the alignment unit.
  ///
  /// # Safety
  ///
  /// Nothing else in the process may move the program break while this region
  /// is growing. Any foreign `sbrk`/`brk` call makes the next extension fail
  /// with [`RegionError::Discontiguous`] at best.
  pub unsafe fn new() -> Result<Self, RegionError> {
    let brk = unsafe { sbrk(0) } as usize;
    let pad = align!(brk) - brk;

    if pad > 0 && unsafe { sbrk(pad as intptr_t) } == usize::MAX as *mut c_void {
      return Err(RegionError::Exhausted { requested: pad });
    }

    debug!("sbrk region starts at {:#x}", brk + pad);

    Ok(Self {
      low: (brk + pad) as *mut u8,
      size: 0,
    })
  }
}

unsafe impl Region for SbrkRegion {
  fn extend(
    &mut self,
    incr: usize,
  ) -> Result<*mut u8, RegionError> {
    if incr > isize::MAX as usize {
      return Err(RegionError::Exhausted { requested: incr });
    }

    let address = unsafe { sbrk(incr as intptr_t) };

    if address == usize::MAX as *mut c_void {
      return Err(RegionError::Exhausted { requested: incr });
    }

    let address = address as *mut u8;

    if address != self.low.wrapping_add(self.size) {
      return Err(RegionError::Discontiguous);
    }

    self.size += incr;

    Ok(address)
  }

  fn low(&self) -> *mut u8 {
    self.low
  }

  fn size(&self) -> usize {
    self.size
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_mmap_region_extend() {
    let mut region = MmapRegion::new(100).unwrap();

    assert_eq!(region.capacity(), page_size::get());
    assert_eq!(region.size(), 0);
    assert_eq!(region.high(), region.low().wrapping_sub(1));

    let first = region.extend(16).unwrap();
    assert_eq!(first, region.low());

    let second = region.extend(32).unwrap();
    assert_eq!(second, unsafe { region.low().add(16) });
    assert_eq!(region.size(), 48);
    assert_eq!(region.high(), unsafe { region.low().add(47) });

    unsafe {
      ptr::write_bytes(first, 0xAB, 48);
      assert_eq!(*second.add(31), 0xAB);
    }
  }

  #[test]
  fn test_mmap_region_exhausted() {
    let mut region = MmapRegion::new(page_size::get()).unwrap();
    let capacity = region.capacity();

    region.extend(capacity - 8).unwrap();

    assert_eq!(region.extend(16), Err(RegionError::Exhausted { requested: 16 }));
    assert_eq!(region.size(), capacity - 8);

    region.extend(8).unwrap();
    assert_eq!(region.size(), capacity);
  }

  #[test]
  fn test_mmap_region_is_aligned() {
    let region = MmapRegion::new(1 << 20).unwrap();

    assert_eq!(region.low() as usize % page_size::get(), 0);
  }
}
