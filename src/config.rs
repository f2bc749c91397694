use crate::constants::CHUNK_SIZE;

/// How the allocator picks a free block for a request.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SearchMode {
  /// Resume scanning where the previous search stopped, wrapping around to
  /// the first block once.
  #[default]
  NextFit,
  /// Always scan from the first block and take the first block that fits.
  FirstFit,
  /// Scan every block and take the smallest one that fits.
  BestFit,
}

/// Tunables for a [`Heap`](crate::Heap).
#[derive(Copy, Clone, Debug)]
pub struct HeapConfig {
  /// Minimum number of bytes requested from the region whenever no free
  /// block fits. Rounded up to an even number of words.
  pub chunk_size: usize,
  /// Free-block search policy.
  pub search: SearchMode,
}

pub const HEAP_CONFIG_DEFAULT_CHUNK_SIZE: usize = CHUNK_SIZE;
pub const HEAP_CONFIG_DEFAULT_SEARCH: SearchMode = SearchMode::NextFit;

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      chunk_size: HEAP_CONFIG_DEFAULT_CHUNK_SIZE,
      search: HEAP_CONFIG_DEFAULT_SEARCH,
    }
  }
}
