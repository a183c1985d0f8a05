//! The on-device superblock: one per filesystem, at device offset 0.

use bytemuck::{Pod, Zeroable};

use crate::checksum::{checksum32, validate_embedded};
use crate::config::SUPERBLOCK_CHECKSUMS_LEN;

/// The superblock layout, `repr(C)` so it casts directly to/from the raw
/// sector bytes via `bytemuck`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Superblock {
    /// Embedded checksum over every field below.
    pub checksum: u32,
    pub inode_count: u32,
    pub inode_size: u32,
    pub inode_start: u32,
    /// Device offset of the first free inode, or 0 if none.
    pub free_inodes: u32,
    pub block_start: u32,
    /// Device offset of the first free data block, or 0 if none.
    pub free_blocks: u32,
    /// Cached whole-sector checksum of each inode sector.
    pub inode_checksums: [u32; SUPERBLOCK_CHECKSUMS_LEN],
}

impl Superblock {
    pub const SIZE: usize = core::mem::size_of::<Superblock>();

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::bytes_of_mut(self)
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        *bytemuck::from_bytes(&buf[..Self::SIZE])
    }

    /// Recomputes and stores the embedded checksum over every field but
    /// itself.
    pub fn seal(&mut self) {
        self.checksum = checksum32(&self.as_bytes()[4..]);
    }

    /// Checks the embedded checksum against freshly-read bytes.
    pub fn validate(buf: &[u8]) -> bool {
        validate_embedded(&buf[..Self::SIZE])
    }
}
