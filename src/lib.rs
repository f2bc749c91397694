//! # tagheap - A Boundary-Tag Heap Allocator
//!
//! This crate provides a general-purpose dynamic memory allocator built on the
//! classic **boundary-tag** technique. All memory comes from a single region
//! that only ever grows (for example the program break, grown with `sbrk`).
//!
//! ## Overview
//!
//! The heap is one contiguous run of blocks. Every block, free or allocated,
//! starts with a header word and ends with a footer word, both holding the
//! block size with the allocated bit packed into its low bits:
//!
//! ```text
//!   Heap Layout:
//!
//!   low                                                                  high
//!   ┌─────┬─────────┬──────────────────┬──────────────┬──────────┬─────────┐
//!   │ pad │ prolog  │  block (alloc)   │ block (free) │  block   │ epilog  │
//!   │     │ 8 | 1   │ hdr ...... ftr   │ hdr .... ftr │   ...    │ 0 | 1   │
//!   └─────┴─────────┴──────────────────┴──────────────┴──────────┴─────────┘
//!          ▲                            ▲
//!          │                            └── next-fit cursor (rover)
//!          └── heap_listp
//! ```
//!
//! The footer lets a block find its predecessor without any back pointer: the
//! word right before a header is the previous block's footer. The always
//! allocated prologue and epilogue mean neighbour lookups never leave the heap.
//!
//! ## Crate Structure
//!
//! ```text
//!   tagheap
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Boundary tags and block navigation
//!   ├── check      - Heap consistency checker
//!   ├── config     - HeapConfig and SearchMode
//!   ├── constants  - Word size, alignment unit, minimum block, chunk size
//!   ├── error      - AllocError and RegionError
//!   ├── heap       - Heap: init, allocate, deallocate, resize
//!   └── region     - Region trait, MmapRegion and SbrkRegion
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagheap::{Heap, MmapRegion};
//!
//! let region = MmapRegion::new(1 << 20).unwrap();
//! let mut heap = Heap::init(region).unwrap();
//!
//! let ptr = heap.allocate(100);
//! assert!(!ptr.is_null());
//! assert_eq!(ptr as usize % 8, 0);
//!
//! unsafe {
//!     ptr.write_bytes(0x2A, 100);
//!     heap.deallocate(ptr);
//! }
//!
//! heap.check();
//! ```
//!
//! ## How It Works
//!
//! - **Allocation** rounds the request plus tag overhead up to 8 bytes (at
//!   least 16), looks for a free block that fits and splits off the remainder
//!   when it can stand as a block of its own. With nothing suitable, the heap
//!   grows by at least one 4 KiB chunk.
//! - **Search** is next-fit by default: it resumes where the previous search
//!   stopped and wraps around once. First-fit and best-fit are available
//!   through [`HeapConfig`].
//! - **Deallocation** clears the allocated bit and eagerly merges the block
//!   with free neighbours, so no two free blocks are ever adjacent.
//! - **Resize** allocates, copies and frees. It never grows in place.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: callers must serialize access themselves
//! - **Grow-only**: memory is never handed back to the region
//! - **Trusting**: pointers passed to `deallocate`/`resize` must be live
//! - **Unix-only**: Requires `libc` for `mmap` and `sbrk` (POSIX systems)

pub mod align;
pub mod block;
mod check;
pub mod config;
pub mod constants;
pub mod error;
mod heap;
pub mod region;

pub use check::Violation;
pub use config::{HeapConfig, SearchMode};
pub use error::{AllocError, RegionError};
pub use heap::{Heap, HeapStats};
pub use region::{MmapRegion, Region, SbrkRegion};
