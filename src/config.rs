//! Compile-time tunables for geometry limits and table widths.
//!
//! Collected in one place rather than scattered through the storage engine
//! and VFS.

use static_assertions::const_assert;

/// Upper bound on a device's reported `sector_size`. Buffers in the storage
/// engine are sized to this constant so the engine never allocates.
pub const MAX_SECTOR_SIZE: usize = 4096;
/// Upper bound on a device's reported `write_size` (one program operation).
pub const MAX_WRITE_SIZE: usize = 256;

/// Number of sectors reserved for the inode table, after the superblock
/// sector and before the data-block pool (see §6.2 of the specification).
pub const INODE_SECTORS: u32 = 15;
/// Length of the superblock's cached per-inode-sector checksum array:
/// one entry per inode sector, plus one.
pub const SUPERBLOCK_CHECKSUMS_LEN: usize = INODE_SECTORS as usize + 1;

/// Number of attempts the checksum/retry protocol makes before giving up
/// and propagating (or silently using) the corrupt value.
pub const RETRY_COUNT: usize = 5;
/// Backoff delay, in abstract time units, before each retry attempt.
pub const BACKOFF_LADDER: [u32; RETRY_COUNT] = [0, 10, 100, 1000, 5000];

/// Maximum length, in bytes, of a single path component (directory entry
/// name), including the mandatory NUL terminator.
pub const NAME_FIELD_LEN: usize = 28;
/// Maximum usable length of a path component, excluding the terminator.
pub const NAME_MAX: usize = NAME_FIELD_LEN - 1;
/// Maximum number of `/`-separated tokens in a resolved path.
pub const PATH_MAX_TOK: usize = 16;
/// Maximum length, in bytes, of a path after cwd-prepending.
pub const PATH_MAX: usize = 256;

/// Bit width of the mount-table allocator. Bounds the number of concurrently
/// active mounts.
pub const MOUNT_MAX: usize = 32;
/// Bit width of the file-descriptor table allocator. Bounds the number of
/// concurrently open file descriptors.
pub const FD_MAX: usize = 32;

/// Size, in bytes, of one on-device directory entry record.
pub const DIR_ENTRY_SIZE: usize = 32;
/// Maximum number of entries a directory may hold. Bounds the in-memory
/// scratch buffer directory operations read a directory's contents into.
pub const MAX_DIR_ENTRIES: usize = 64;

const_assert!(MAX_SECTOR_SIZE <= 4096);
const_assert!(MAX_WRITE_SIZE <= 256);
const_assert!(NAME_FIELD_LEN == 28);
