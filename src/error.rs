use std::{error, fmt};

use crate::constants::MAX_HEAP_SIZE;

/// Failure reported by a [`Region`](crate::region::Region) provider.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegionError {
  /// The backing capacity cannot supply `requested` more bytes.
  Exhausted { requested: usize },
  /// Something other than this region moved the break, so the new span does
  /// not continue the old one.
  Discontiguous,
  /// The region does not start on the alignment unit.
  Misaligned { addr: usize },
}

impl fmt::Display for RegionError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      RegionError::Exhausted { requested } => {
        write!(f, "region exhausted while extending by {requested} bytes")
      }
      RegionError::Discontiguous => f.write_str("region extension is not contiguous"),
      RegionError::Misaligned { addr } => write!(f, "region base {addr:#x} is misaligned"),
    }
  }
}

impl error::Error for RegionError {}

/// Why an allocation (or heap initialization) failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
  /// A zero-byte request. Not a failure of the heap, callers see null.
  ZeroSize,
  /// The adjusted block size does not fit in a boundary tag.
  TooLarge(usize),
  /// Growing by `requested` bytes would take the heap past
  /// [`MAX_HEAP_SIZE`](crate::constants::MAX_HEAP_SIZE).
  HeapFull { requested: usize },
  /// The region provider could not grow the heap.
  Region(RegionError),
}

impl From<RegionError> for AllocError {
  fn from(error: RegionError) -> AllocError {
    AllocError::Region(error)
  }
}

impl fmt::Display for AllocError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      AllocError::ZeroSize => f.write_str("zero-sized allocation"),
      AllocError::TooLarge(size) => write!(f, "request of {size} bytes is too large"),
      AllocError::HeapFull { requested } => {
        write!(f, "heap cannot grow by {requested} bytes past {MAX_HEAP_SIZE} bytes")
      }
      AllocError::Region(error) => write!(f, "out of memory: {error}"),
    }
  }
}

impl error::Error for AllocError {
  fn source(&self) -> Option<&(dyn error::Error + 'static)> {
    match self {
      AllocError::Region(error) => Some(error),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_region_error_converts() {
    let err: AllocError = RegionError::Exhausted { requested: 4096 }.into();

    assert_eq!(err, AllocError::Region(RegionError::Exhausted { requested: 4096 }));
    assert_eq!(
      err.to_string(),
      "out of memory: region exhausted while extending by 4096 bytes"
    );
    assert!(error::Error::source(&err).is_some());
    assert!(error::Error::source(&AllocError::ZeroSize).is_none());
  }

  #[test]
  fn test_heap_full_display() {
    let err = AllocError::HeapFull { requested: 4096 };

    assert!(err.to_string().starts_with("heap cannot grow by 4096 bytes"));
    assert!(error::Error::source(&err).is_none());
  }
}
