//! On-device data block layout: a small meta header prefixing the payload
//! within one sector.

use bytemuck::{Pod, Zeroable};

use crate::checksum::{checksum32, validate_embedded};

/// The meta header prefixing every data block's payload.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct BlockMeta {
    /// Embedded checksum over `next`, `datasize`, and the payload.
    pub checksum: u32,
    /// Device offset of the next block in this inode's chain, or 0 if
    /// this is the last block (when occupied), or the next free block
    /// (when on the free list).
    pub next: u32,
    /// Number of payload bytes actually in use by the occupying file.
    pub datasize: u32,
}

impl BlockMeta {
    pub const SIZE: usize = core::mem::size_of::<BlockMeta>();

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        *bytemuck::from_bytes(&buf[..Self::SIZE])
    }
}

/// Payload capacity of a data block given the device's sector size.
pub const fn payload_len(sector_size: u32) -> usize {
    sector_size as usize - BlockMeta::SIZE
}

/// Recomputes and stores the embedded checksum over `meta.next`,
/// `meta.datasize`, and `payload` into the first `BlockMeta::SIZE +
/// payload.len()` bytes of `sector_buf`. The checksum never covers the
/// unused tail of the sector beyond `payload`, so stray corruption out
/// there cannot fail validation.
pub fn seal_block(sector_buf: &mut [u8], meta: &BlockMeta, payload: &[u8]) {
    let n = BlockMeta::SIZE + payload.len();
    sector_buf[4..BlockMeta::SIZE].copy_from_slice(&meta.as_bytes()[4..]);
    sector_buf[BlockMeta::SIZE..n].copy_from_slice(payload);
    let c = checksum32(&sector_buf[4..n]);
    sector_buf[0..4].copy_from_slice(&c.to_le_bytes());
}

/// Validates the embedded checksum over a data block's meta + payload.
/// The checked range is `BlockMeta::SIZE + datasize`, read out of the
/// meta header itself rather than trusted from the caller, so corruption
/// past the block's actual payload never trips validation.
pub fn validate_block(sector_buf: &[u8], sector_size: usize) -> bool {
    if sector_buf.len() < BlockMeta::SIZE {
        return false;
    }
    let meta = BlockMeta::from_bytes(sector_buf);
    let n = BlockMeta::SIZE + meta.datasize as usize;
    if n < BlockMeta::SIZE || n > sector_size || n > sector_buf.len() {
        return false;
    }
    validate_embedded(&sector_buf[..n])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_meta_is_12_bytes() {
        assert_eq!(BlockMeta::SIZE, 12);
    }

    #[test]
    fn seal_then_validate_round_trips() {
        let meta = BlockMeta {
            checksum: 0,
            next: 0,
            datasize: 3,
        };
        let payload = [1u8, 2, 3];
        let mut sector = [0u8; 64];
        seal_block(&mut sector, &meta, &payload);
        assert!(validate_block(&sector, sector.len()));
        sector[BlockMeta::SIZE] ^= 1;
        assert!(!validate_block(&sector, sector.len()));
    }

    #[test]
    fn corruption_past_datasize_does_not_fail_validation() {
        let meta = BlockMeta {
            checksum: 0,
            next: 0,
            datasize: 3,
        };
        let payload = [1u8, 2, 3];
        let mut sector = [0u8; 64];
        seal_block(&mut sector, &meta, &payload);
        sector[BlockMeta::SIZE + payload.len() + 5] ^= 1;
        assert!(validate_block(&sector, sector.len()));
    }
}
