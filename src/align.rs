/// Rounds `value` up to the allocator's alignment unit (8 bytes).
///
/// # Examples
///
/// ```rust
/// use tagheap::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(0), 0);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::constants::ALIGNMENT)
  };
}

/// Rounds `value` up to the next multiple of `to`, which must be a power of
/// two.
///
/// # Examples
///
/// ```rust
/// use tagheap::align_to;
///
/// assert_eq!(align_to!(5, 4), 8);
/// assert_eq!(align_to!(4096, 4096), 4096);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $to:expr) => {
    ($value + $to - 1) & !($to - 1)
  };
}
