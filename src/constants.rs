// Sizes are in bytes unless a name says otherwise.

/// Size of a boundary tag (header or footer word).
pub const WSIZE: usize = 4;
/// Double word, also the alignment unit of every block and payload.
pub const DSIZE: usize = 8;
pub const ALIGNMENT: usize = DSIZE;

/// Header + footer.
pub const OVERHEAD: usize = 2 * WSIZE;
/// Smallest block the allocator ever creates: tags plus room for two
/// free-list words.
pub const MIN_BLOCK_SIZE: usize = 2 * DSIZE;

/// Prologue is a zero-payload block made of a header and a footer.
pub const PROLOGUE_SIZE: usize = DSIZE;
/// Padding word + prologue + epilogue header, bytes of the region that never
/// belong to a real block.
pub const SENTINEL_OVERHEAD: usize = 4 * WSIZE;

/// Default amount the heap grows by when no free block fits.
pub const CHUNK_SIZE: usize = 1 << 12;

/// Largest block size a 32-bit tag can carry.
pub const MAX_BLOCK_SIZE: usize = (u32::MAX as usize) & !(ALIGNMENT - 1);
/// The heap never grows past this, so even a block spanning every byte
/// between the sentinels still fits in a tag.
pub const MAX_HEAP_SIZE: usize = MAX_BLOCK_SIZE;
