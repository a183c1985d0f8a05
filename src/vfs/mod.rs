//! The VFS: mount table, cross-mount path resolution, file descriptors,
//! and the user-visible operations built on top of one or more SFS
//! mounts.

pub mod path;

use bitvec::prelude::*;

use crate::backoff::Backoff;
use crate::config::{DIR_ENTRY_SIZE, FD_MAX, MAX_DIR_ENTRIES, MOUNT_MAX};
use crate::device::BlockDevice;
use crate::errno::{SfsError, SfsResult};
use crate::sfs::dir;
use crate::sfs::inode::InodeType;
use crate::sfs::{Addr, Sfs, Stat};

use path::{splitpath, PathTokens, Token};

type DirBitmap = BitArray<[u32; 1], Lsb0>;

/// A directory's content, buffered in memory for search/add/delete.
type DirBuf = [u8; DIR_ENTRY_SIZE * MAX_DIR_ENTRIES];

fn alloc_bit(bitmap: &mut DirBitmap, width: usize) -> Option<usize> {
    for i in 0..width {
        if !bitmap[i] {
            bitmap.set(i, true);
            return Some(i);
        }
    }
    None
}

fn free_bit(bitmap: &mut DirBitmap, i: usize) {
    bitmap.set(i, false);
}

/// One entry of the mount table.
struct Mount<D, B> {
    fs: Sfs<D, B>,
    tokens: PathTokens,
}

/// One open file descriptor.
#[derive(Clone, Copy)]
struct OpenFile {
    mount_id: usize,
    inode: Addr,
    offset: u64,
    #[allow(dead_code)]
    flags: OpenFlags,
}

bitflags::bitflags! {
    /// Flags passed to [`Vfs::open`], the subset of POSIX `open(2)`
    /// flags this VFS understands.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: i32 {
        const RDONLY = 0;
        const WRONLY = 1;
        const RDWR   = 2;
        const CREAT  = 0x40;
    }
}

/// One entry as reported by [`Vfs::lsdir`].
#[derive(Debug, Clone, Copy)]
pub struct DirEntryInfo {
    pub inode: Addr,
    pub name: Token,
}

/// One entry as reported by [`Vfs::mountlist`].
#[derive(Debug, Clone, Copy)]
pub struct MountInfo {
    pub id: usize,
    pub mountpoint: PathTokens,
}

/// The VFS. Generic over one concrete block device and backoff type:
/// every mount shares the same device/backoff types (see DESIGN.md for
/// why this crate does not attempt to type-erase heterogeneous mounts
/// without an allocator).
pub struct Vfs<D, B> {
    mounts: [Option<Mount<D, B>>; MOUNT_MAX],
    mount_bitmap: DirBitmap,
    fds: [Option<OpenFile>; FD_MAX],
    fd_bitmap: DirBitmap,
    cwd: PathTokens,
}

impl<D: BlockDevice, B: Backoff> Vfs<D, B> {
    pub fn new() -> Self {
        Self {
            mounts: core::array::from_fn(|_| None),
            mount_bitmap: DirBitmap::new([0u32; 1]),
            fds: [None; FD_MAX],
            fd_bitmap: DirBitmap::new([0u32; 1]),
            cwd: PathTokens::new(),
        }
    }

    /// Registers an already-mounted [`Sfs`] instance at `at`.
    pub fn mount(&mut self, fs: Sfs<D, B>, at: &[u8]) -> SfsResult<usize> {
        let tokens = splitpath(at, &self.cwd)?;
        let id = alloc_bit(&mut self.mount_bitmap, MOUNT_MAX).ok_or(SfsError::MountsFull)?;
        log::info!("mounting {} at {:?}", fs.device_name(), at);
        self.mounts[id] = Some(Mount { fs, tokens });
        Ok(id)
    }

    /// Formats `device` with a fresh SFS and mounts it at `at`.
    pub fn format(&mut self, device: D, backoff: B, at: &[u8]) -> SfsResult<usize> {
        let fs = Sfs::format_with(device, backoff)?;
        self.mount(fs, at)
    }

    /// Unmounts the filesystem with the given mount id, dropping it.
    pub fn umount(&mut self, id: usize) -> SfsResult<()> {
        if id >= MOUNT_MAX || self.mounts[id].is_none() {
            return Err(SfsError::MountNotFound);
        }
        self.mounts[id] = None;
        free_bit(&mut self.mount_bitmap, id);
        Ok(())
    }

    /// Lists currently active mounts.
    pub fn mountlist(&self) -> impl Iterator<Item = MountInfo> + '_ {
        self.mounts.iter().enumerate().filter_map(|(id, slot)| {
            slot.as_ref().map(|m| MountInfo {
                id,
                mountpoint: m.tokens,
            })
        })
    }

    /// Resolves `tokens` (an absolute, already-split path) to the owning
    /// mount and the inode address within it, following mount-point
    /// crossings as encountered.
    fn resolve(&mut self, tokens: &PathTokens) -> SfsResult<(usize, Addr)> {
        let root_mounted = self
            .mounts
            .iter()
            .any(|slot| slot.as_ref().map_or(false, |m| m.tokens.is_empty()));
        if !root_mounted {
            return Err(SfsError::NoRoot);
        }

        let mut best: Option<(usize, usize)> = None;
        for (id, slot) in self.mounts.iter().enumerate() {
            if let Some(m) = slot {
                if path::is_prefix(&m.tokens, tokens) {
                    let len = m.tokens.len();
                    if best.map_or(true, |(_, blen)| len > blen) {
                        best = Some((id, len));
                    }
                }
            }
        }
        let (mut cur_mount, mut i) = best.ok_or(SfsError::MountNotFound)?;
        let mut cur_inode = self.mounts[cur_mount].as_ref().unwrap().fs.root_inode();

        while i < tokens.len() {
            let name = tokens.get(i).expect("i < tokens.len()");
            let stat = self.mounts[cur_mount]
                .as_mut()
                .unwrap()
                .fs
                .inode_stat(cur_inode)?;
            if stat.ty != InodeType::Dir {
                return Err(SfsError::NotADir);
            }
            let mut buf: DirBuf = [0u8; DIR_ENTRY_SIZE * MAX_DIR_ENTRIES];
            let n = self.mounts[cur_mount]
                .as_mut()
                .unwrap()
                .fs
                .inode_get(cur_inode, &mut buf)? as usize;
            let found = dir::search(&buf[..n], name.as_slice()).ok_or(SfsError::NameNotFound)?;
            cur_inode = found;
            i += 1;

            if let Some(mid) = self.mounts.iter().enumerate().find_map(|(mid, slot)| {
                slot.as_ref().and_then(|m| {
                    let prefix_len = m.tokens.len();
                    if prefix_len == i && path::is_prefix(&m.tokens, tokens) {
                        Some(mid)
                    } else {
                        None
                    }
                })
            }) {
                cur_mount = mid;
                cur_inode = self.mounts[cur_mount].as_ref().unwrap().fs.root_inode();
            }
        }
        Ok((cur_mount, cur_inode))
    }

    fn resolve_parent(&mut self, tokens: &PathTokens) -> SfsResult<(usize, Addr, Token)> {
        let name = *tokens.get(tokens.len().wrapping_sub(1)).ok_or(SfsError::WrongPath)?;
        let mut parent_tokens = *tokens;
        parent_tokens.pop();
        let (mount_id, parent_inode) = self.resolve(&parent_tokens)?;
        Ok((mount_id, parent_inode, name))
    }

    fn read_dir_buf(&mut self, mount_id: usize, inode: Addr) -> SfsResult<(DirBuf, usize)> {
        let mut buf: DirBuf = [0u8; DIR_ENTRY_SIZE * MAX_DIR_ENTRIES];
        let fs = &mut self.mounts[mount_id].as_mut().unwrap().fs;
        let stat = fs.inode_stat(inode)?;
        if stat.ty != InodeType::Dir {
            return Err(SfsError::NotADir);
        }
        let n = fs.inode_get(inode, &mut buf)? as usize;
        Ok((buf, n))
    }

    /// Changes the current working directory. `..` at the VFS root
    /// leaves the cwd unchanged rather than failing (resolved Open
    /// Question): a path that fails to resolve purely because it tried
    /// to ascend past an empty token vector is treated as a no-op here,
    /// while every other error still propagates.
    pub fn cd(&mut self, path: &[u8]) -> SfsResult<()> {
        let tokens = match splitpath(path, &self.cwd) {
            Ok(t) => t,
            Err(SfsError::WrongPath) => return Ok(()),
            Err(e) => return Err(e),
        };
        let (mount_id, inode) = self.resolve(&tokens)?;
        let stat = self.mounts[mount_id].as_mut().unwrap().fs.inode_stat(inode)?;
        if stat.ty != InodeType::Dir {
            return Err(SfsError::NotADir);
        }
        self.cwd = tokens;
        Ok(())
    }

    pub fn mkdir(&mut self, path: &[u8]) -> SfsResult<Addr> {
        let tokens = splitpath(path, &self.cwd)?;
        let (mount_id, parent_inode, name) = self.resolve_parent(&tokens)?;
        let (mut buf, n) = self.read_dir_buf(mount_id, parent_inode)?;
        if dir::search(&buf[..n], name.as_slice()).is_some() {
            return Err(SfsError::AlreadyExists);
        }
        if n + DIR_ENTRY_SIZE > buf.len() {
            return Err(SfsError::OutOfMemory);
        }
        let fs = &mut self.mounts[mount_id].as_mut().unwrap().fs;
        let new_inode = fs.inode_create(InodeType::Dir)?;
        let mut empty = [0u8; DIR_ENTRY_SIZE];
        dir::init_empty(&mut empty);
        fs.inode_set(new_inode, &empty)?;

        dir::add(&mut buf[..n + DIR_ENTRY_SIZE], new_inode, name.as_slice())?;
        fs.inode_set(parent_inode, &buf[..n + DIR_ENTRY_SIZE])?;
        Ok(new_inode)
    }

    /// Removes a name from its parent directory. Fails with
    /// `DirNotEmpty` if it names a non-empty directory.
    pub fn unlink(&mut self, path: &[u8]) -> SfsResult<()> {
        let tokens = splitpath(path, &self.cwd)?;
        let is_mount_point = self
            .mounts
            .iter()
            .any(|slot| slot.as_ref().map_or(false, |m| m.tokens == tokens));
        if is_mount_point {
            return Err(SfsError::IsMountPoint);
        }
        let (mount_id, parent_inode, name) = self.resolve_parent(&tokens)?;
        let (mut buf, n) = self.read_dir_buf(mount_id, parent_inode)?;
        let target = dir::search(&buf[..n], name.as_slice()).ok_or(SfsError::NameNotFound)?;

        let fs = &mut self.mounts[mount_id].as_mut().unwrap().fs;
        let stat = fs.inode_stat(target)?;
        if stat.ty == InodeType::Dir {
            let mut dbuf: DirBuf = [0u8; DIR_ENTRY_SIZE * MAX_DIR_ENTRIES];
            let dn = fs.inode_get(target, &mut dbuf)? as usize;
            if !dir::is_empty(&dbuf[..dn]) {
                return Err(SfsError::DirNotEmpty);
            }
        }
        fs.inode_delete(target)?;
        dir::delete(&mut buf[..n], name.as_slice())?;
        fs.inode_set(parent_inode, &buf[..n])?;
        Ok(())
    }

    /// Lists the entries of the directory at `path`.
    pub fn lsdir(&mut self, path: &[u8]) -> SfsResult<ArrayVecInfo> {
        let tokens = splitpath(path, &self.cwd)?;
        let (mount_id, inode) = self.resolve(&tokens)?;
        let (buf, n) = self.read_dir_buf(mount_id, inode)?;
        let mut out = ArrayVecInfo::new();
        let count = n / DIR_ENTRY_SIZE;
        for i in 0..count {
            let off = i * DIR_ENTRY_SIZE;
            let addr = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            if addr == dir::SENTINEL {
                break;
            }
            let name_field = &buf[off + 4..off + DIR_ENTRY_SIZE];
            let end = name_field.iter().position(|&b| b == 0).unwrap_or(name_field.len());
            let name = Token::from_slice(&name_field[..end], SfsError::PathTooLong)?;
            out.push(DirEntryInfo { inode: addr, name }, SfsError::OutOfMemory)?;
        }
        Ok(out)
    }

    pub fn open(&mut self, path: &[u8], flags: OpenFlags) -> SfsResult<i32> {
        let tokens = splitpath(path, &self.cwd)?;
        let resolved = self.resolve(&tokens);
        let (mount_id, inode) = match resolved {
            Ok(r) => r,
            Err(SfsError::NameNotFound) if flags.contains(OpenFlags::CREAT) => {
                let (mount_id, parent_inode, name) = self.resolve_parent(&tokens)?;
                let (mut buf, n) = self.read_dir_buf(mount_id, parent_inode)?;
                if n + DIR_ENTRY_SIZE > buf.len() {
                    return Err(SfsError::OutOfMemory);
                }
                let fs = &mut self.mounts[mount_id].as_mut().unwrap().fs;
                let new_inode = fs.inode_create(InodeType::File)?;
                dir::add(&mut buf[..n + DIR_ENTRY_SIZE], new_inode, name.as_slice())?;
                fs.inode_set(parent_inode, &buf[..n + DIR_ENTRY_SIZE])?;
                (mount_id, new_inode)
            }
            Err(e) => return Err(e),
        };
        let stat = self.mounts[mount_id].as_mut().unwrap().fs.inode_stat(inode)?;
        if stat.ty == InodeType::Dir {
            return Err(SfsError::IsADir);
        }
        let fd = alloc_bit(&mut self.fd_bitmap, FD_MAX).ok_or(SfsError::RunOutOfFd)?;
        self.fds[fd] = Some(OpenFile {
            mount_id,
            inode,
            offset: 0,
            flags,
        });
        Ok(fd as i32)
    }

    pub fn close(&mut self, fd: i32) -> SfsResult<()> {
        let fd = Self::fd_index(fd)?;
        if self.fds[fd].is_none() {
            return Err(SfsError::FdNotSet);
        }
        self.fds[fd] = None;
        free_bit(&mut self.fd_bitmap, fd);
        Ok(())
    }

    pub fn read(&mut self, fd: i32, out: &mut [u8]) -> SfsResult<u32> {
        let fd = Self::fd_index(fd)?;
        let of = self.fds[fd].ok_or(SfsError::FdNotSet)?;
        let n = self.mounts[of.mount_id]
            .as_mut()
            .unwrap()
            .fs
            .inode_read(of.inode, of.offset as u32, out)?;
        self.fds[fd].as_mut().unwrap().offset += n as u64;
        Ok(n)
    }

    pub fn write(&mut self, fd: i32, data: &[u8]) -> SfsResult<u32> {
        let fd = Self::fd_index(fd)?;
        let of = self.fds[fd].ok_or(SfsError::FdNotSet)?;
        let n = self.mounts[of.mount_id]
            .as_mut()
            .unwrap()
            .fs
            .inode_write(of.inode, of.offset as u32, data)?;
        self.fds[fd].as_mut().unwrap().offset += n as u64;
        Ok(n)
    }

    pub fn lseek(&mut self, fd: i32, offset: i64, whence: Whence) -> SfsResult<u64> {
        let fd = Self::fd_index(fd)?;
        let of = self.fds[fd].ok_or(SfsError::FdNotSet)?;
        let base = match whence {
            Whence::Set => 0i64,
            Whence::Cur => of.offset as i64,
            Whence::End => {
                self.mounts[of.mount_id].as_mut().unwrap().fs.inode_stat(of.inode)?.size as i64
            }
        };
        let new_offset = base.checked_add(offset).ok_or(SfsError::WrongSize)?;
        if new_offset < 0 {
            return Err(SfsError::WrongSize);
        }
        self.fds[fd].as_mut().unwrap().offset = new_offset as u64;
        Ok(new_offset as u64)
    }

    /// Device-specific control operations. Not implemented by SFS: every
    /// call fails with `NotImplemented`, the same way the reference
    /// corpus's ioctl dispatch reports an unrecognized request.
    pub fn ioctl(&mut self, fd: i32, _request: u32, _arg: u32) -> SfsResult<u32> {
        Self::fd_index(fd)?;
        Err(SfsError::NotImplemented)
    }

    /// Stat of the inode an open descriptor refers to.
    pub fn fstat(&mut self, fd: i32) -> SfsResult<Stat> {
        let fd = Self::fd_index(fd)?;
        let of = self.fds[fd].ok_or(SfsError::FdNotSet)?;
        self.mounts[of.mount_id].as_mut().unwrap().fs.inode_stat(of.inode)
    }

    fn fd_index(fd: i32) -> SfsResult<usize> {
        if fd < 0 || fd as usize >= FD_MAX {
            return Err(SfsError::FdNotSet);
        }
        Ok(fd as usize)
    }
}

impl<D: BlockDevice, B: Backoff> Default for Vfs<D, B> {
    fn default() -> Self {
        Self::new()
    }
}

/// `lseek` origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// Bounded list of directory entries returned by [`Vfs::lsdir`].
pub type ArrayVecInfo = crate::collections::ArrayVec<DirEntryInfo, MAX_DIR_ENTRIES>;

impl Default for DirEntryInfo {
    fn default() -> Self {
        DirEntryInfo {
            inode: 0,
            name: Token::default(),
        }
    }
}
