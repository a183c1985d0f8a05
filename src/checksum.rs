//! Embedded-checksum computation and the bounded retry protocol wrapped
//! around every sector read and write.

use crate::backoff::Backoff;
use crate::config::{BACKOFF_LADDER, RETRY_COUNT};
use crate::device::BlockDevice;

/// Computes the bitwise XOR of all 32-bit words of `bytes`. A trailing
/// partial word (fewer than 4 bytes) is folded in zero-padded, which does
/// not change the result since XOR with zero is the identity.
pub fn checksum32(bytes: &[u8]) -> u32 {
    let mut acc = 0u32;
    let mut chunks = bytes.chunks_exact(4);
    for chunk in &mut chunks {
        acc ^= u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    let rem = chunks.remainder();
    if !rem.is_empty() {
        let mut last = [0u8; 4];
        last[..rem.len()].copy_from_slice(rem);
        acc ^= u32::from_le_bytes(last);
    }
    acc
}

/// Reads `buf` from `addr` up to `RETRY_COUNT` times, backing off per
/// [`BACKOFF_LADDER`] between attempts, until `validate` accepts the
/// contents. Returns whether validation ultimately succeeded; on failure
/// `buf` holds the last (still invalid) attempt.
pub fn read_with_retry<D, B>(
    dev: &mut D,
    backoff: &mut B,
    addr: u64,
    buf: &mut [u8],
    mut validate: impl FnMut(&[u8]) -> bool,
) -> bool
where
    D: BlockDevice + ?Sized,
    B: Backoff,
{
    for (attempt, delay) in BACKOFF_LADDER.iter().enumerate().take(RETRY_COUNT) {
        dev.read(addr, buf);
        if validate(buf) {
            if attempt > 0 {
                log::debug!(
                    "{}: read at {:#x} validated after {} retries",
                    dev.name(),
                    addr,
                    attempt
                );
            }
            return true;
        }
        log::warn!(
            "{}: checksum mismatch reading {:#x}, attempt {}/{}",
            dev.name(),
            addr,
            attempt + 1,
            RETRY_COUNT
        );
        backoff.wait(*delay);
    }
    log::error!(
        "{}: read at {:#x} failed validation after {} attempts",
        dev.name(),
        addr,
        RETRY_COUNT
    );
    false
}

/// Erases the sector containing `addr` and reprograms it with `buf`. The
/// erase+write pairing `write_sector` alone does not provide, for callers
/// that cannot guarantee the sector is already erased.
pub fn rewrite_sector<D: BlockDevice + ?Sized>(dev: &mut D, addr: u64, buf: &[u8]) {
    dev.erase_sector(addr);
    dev.write_sector(addr, buf);
}

/// Writes `buf` to `addr` (erase + program), then re-reads it back and
/// checks `verify_ok`, retrying the whole erase/program/verify cycle up
/// to `RETRY_COUNT` times. `scratch` must be at least `buf.len()` bytes.
pub fn write_with_retry<D, B>(
    dev: &mut D,
    backoff: &mut B,
    addr: u64,
    buf: &[u8],
    mut verify_ok: impl FnMut(&[u8]) -> bool,
    scratch: &mut [u8],
) -> bool
where
    D: BlockDevice + ?Sized,
    B: Backoff,
{
    let n = buf.len();
    for (attempt, delay) in BACKOFF_LADDER.iter().enumerate().take(RETRY_COUNT) {
        rewrite_sector(dev, addr, buf);
        dev.read(addr, &mut scratch[..n]);
        if verify_ok(&scratch[..n]) {
            if attempt > 0 {
                log::debug!(
                    "{}: write at {:#x} verified after {} retries",
                    dev.name(),
                    addr,
                    attempt
                );
            }
            return true;
        }
        log::warn!(
            "{}: write-verify mismatch at {:#x}, attempt {}/{}",
            dev.name(),
            addr,
            attempt + 1,
            RETRY_COUNT
        );
        backoff.wait(*delay);
    }
    log::error!(
        "{}: write at {:#x} failed to verify after {} attempts",
        dev.name(),
        addr,
        RETRY_COUNT
    );
    false
}

/// Validates an embedded checksum: the first 4 bytes of `buf` are the
/// checksum over the remainder.
pub fn validate_embedded(buf: &[u8]) -> bool {
    if buf.len() < 4 {
        return false;
    }
    let stored = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    checksum32(&buf[4..]) == stored
}

/// Fills in `buf[0..4]` with the embedded checksum of `buf[4..]`.
pub fn seal_embedded(buf: &mut [u8]) {
    let c = checksum32(&buf[4..]);
    buf[0..4].copy_from_slice(&c.to_le_bytes());
}

/// Whole-sector checksum, used for the inode-sector cache kept in the
/// superblock (covers the checksum field too, unlike the embedded form).
pub fn whole_sector_checksum(buf: &[u8]) -> u32 {
    checksum32(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_xor_of_words() {
        let bytes = [1u8, 0, 0, 0, 2, 0, 0, 0, 4, 0, 0, 0];
        assert_eq!(checksum32(&bytes), 1 ^ 2 ^ 4);
    }

    #[test]
    fn checksum_pads_trailing_partial_word_with_zero() {
        let bytes = [0xFFu8, 0, 0, 0, 0x01];
        assert_eq!(checksum32(&bytes), 0xFF ^ 0x01);
    }

    #[test]
    fn embedded_seal_then_validate_round_trips() {
        let mut buf = [0u8; 16];
        buf[4..].copy_from_slice(&[9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 0, 0]);
        seal_embedded(&mut buf);
        assert!(validate_embedded(&buf));
        buf[8] ^= 1;
        assert!(!validate_embedded(&buf));
    }
}
