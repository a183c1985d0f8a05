//! Directory entry format and the search/add/delete operations the VFS
//! drives through `inode_get`/`inode_set`.
//!
//! A directory's content is simply a byte stream holding these records
//! back to back, terminated by a sentinel record. Callers read that
//! stream into a bounded scratch buffer (see `config::MAX_DIR_ENTRIES`),
//! mutate it with the functions below, and write it back with
//! `inode_set`/`inode_write`.

use crate::config::{DIR_ENTRY_SIZE, NAME_FIELD_LEN};
use crate::errno::{SfsError, SfsResult};

/// Marks the end of a directory's entries.
pub const SENTINEL: u32 = 0xFFFF_FFFF;

fn entry_at(buf: &[u8], i: usize) -> (u32, &[u8]) {
    let off = i * DIR_ENTRY_SIZE;
    let addr = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
    let name = &buf[off + 4..off + DIR_ENTRY_SIZE];
    (addr, name)
}

fn write_entry(buf: &mut [u8], i: usize, addr: u32, name: &[u8]) {
    let off = i * DIR_ENTRY_SIZE;
    buf[off..off + 4].copy_from_slice(&addr.to_le_bytes());
    let name_field = &mut buf[off + 4..off + DIR_ENTRY_SIZE];
    name_field.fill(0);
    name_field[..name.len()].copy_from_slice(name);
}

fn raw_name(name_field: &[u8]) -> &[u8] {
    let end = name_field
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(name_field.len());
    &name_field[..end]
}

/// Number of entries (including the sentinel) that fit in `buf`.
fn capacity(buf: &[u8]) -> usize {
    buf.len() / DIR_ENTRY_SIZE
}

/// Finds the index of the sentinel entry, i.e. the current number of
/// live entries. `buf` must have been initialized by [`init_empty`] or
/// read back from a directory inode.
fn live_count(buf: &[u8]) -> usize {
    let cap = capacity(buf);
    for i in 0..cap {
        let (addr, _) = entry_at(buf, i);
        if addr == SENTINEL {
            return i;
        }
    }
    cap
}

/// Initializes `buf` as an empty directory: a sentinel in slot 0.
pub fn init_empty(buf: &mut [u8]) {
    buf.fill(0);
    write_entry(buf, 0, SENTINEL, &[]);
}

/// Looks up `name` in the directory content held in `buf`. Returns the
/// inode address if found.
pub fn search(buf: &[u8], name: &[u8]) -> Option<u32> {
    let count = live_count(buf);
    for i in 0..count {
        let (addr, name_field) = entry_at(buf, i);
        if raw_name(name_field) == name {
            return Some(addr);
        }
    }
    None
}

/// Appends a `(inode_addr, name)` entry after the last live entry,
/// advancing the sentinel. Fails with `NameTooLong`-equivalent
/// (`PathTooLong`) if the name does not fit the name field, or
/// `OutOfMemory` if the directory has no room for another entry.
pub fn add(buf: &mut [u8], inode_addr: u32, name: &[u8]) -> SfsResult<()> {
    if name.len() >= NAME_FIELD_LEN {
        return Err(SfsError::PathTooLong);
    }
    if search(buf, name).is_some() {
        return Err(SfsError::AlreadyExists);
    }
    let count = live_count(buf);
    if count + 1 >= capacity(buf) {
        return Err(SfsError::OutOfMemory);
    }
    write_entry(buf, count, inode_addr, name);
    write_entry(buf, count + 1, SENTINEL, &[]);
    Ok(())
}

/// Removes the entry named `name`, moving the last live entry into its
/// slot (order of remaining entries is not preserved past the first
/// deletion) and pulling the sentinel back by one.
pub fn delete(buf: &mut [u8], name: &[u8]) -> SfsResult<()> {
    let count = live_count(buf);
    let mut target = None;
    for i in 0..count {
        let (_, name_field) = entry_at(buf, i);
        if raw_name(name_field) == name {
            target = Some(i);
            break;
        }
    }
    let target = target.ok_or(SfsError::NameNotFound)?;
    let last = count - 1;
    if target != last {
        let mut record = [0u8; DIR_ENTRY_SIZE];
        let last_off = last * DIR_ENTRY_SIZE;
        record.copy_from_slice(&buf[last_off..last_off + DIR_ENTRY_SIZE]);
        let target_off = target * DIR_ENTRY_SIZE;
        buf[target_off..target_off + DIR_ENTRY_SIZE].copy_from_slice(&record);
    }
    write_entry(buf, last, SENTINEL, &[]);
    Ok(())
}

/// True if the directory holds no entries (only the sentinel).
pub fn is_empty(buf: &[u8]) -> bool {
    live_count(buf) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_buf() -> [u8; DIR_ENTRY_SIZE * 8] {
        let mut buf = [0u8; DIR_ENTRY_SIZE * 8];
        init_empty(&mut buf);
        buf
    }

    #[test]
    fn empty_directory_has_no_entries() {
        let buf = new_buf();
        assert!(is_empty(&buf));
        assert_eq!(search(&buf, b"missing"), None);
    }

    #[test]
    fn add_then_search_finds_entry() {
        let mut buf = new_buf();
        add(&mut buf, 42, b"foo").unwrap();
        assert_eq!(search(&buf, b"foo"), Some(42));
        assert!(!is_empty(&buf));
    }

    #[test]
    fn add_duplicate_name_fails() {
        let mut buf = new_buf();
        add(&mut buf, 1, b"x").unwrap();
        assert_eq!(add(&mut buf, 2, b"x"), Err(SfsError::AlreadyExists));
    }

    #[test]
    fn delete_swaps_last_entry_into_hole() {
        let mut buf = new_buf();
        add(&mut buf, 1, b"a").unwrap();
        add(&mut buf, 2, b"b").unwrap();
        add(&mut buf, 3, b"c").unwrap();
        delete(&mut buf, b"a").unwrap();
        assert_eq!(search(&buf, b"a"), None);
        assert_eq!(search(&buf, b"b"), Some(2));
        assert_eq!(search(&buf, b"c"), Some(3));
        assert_eq!(live_count(&buf), 2);
    }

    #[test]
    fn delete_missing_name_fails() {
        let mut buf = new_buf();
        assert_eq!(delete(&mut buf, b"nope"), Err(SfsError::NameNotFound));
    }

    #[test]
    fn add_respects_buffer_capacity() {
        let mut buf = [0u8; DIR_ENTRY_SIZE * 2];
        init_empty(&mut buf);
        add(&mut buf, 1, b"only").unwrap();
        assert_eq!(add(&mut buf, 2, b"second"), Err(SfsError::OutOfMemory));
    }
}
