//! The SFS storage engine: on-device layout, allocators, and the public
//! per-inode operations, wrapped in the checksum/retry protocol.

pub mod block;
pub mod dir;
pub mod inode;
pub mod superblock;

use crate::backoff::{Backoff, NullBackoff};
use crate::checksum::{
    read_with_retry, whole_sector_checksum, write_with_retry,
};
use crate::config::MAX_SECTOR_SIZE;
use crate::device::BlockDevice;
use crate::errno::{SfsError, SfsResult};

use block::{payload_len, seal_block, validate_block, BlockMeta};
use inode::{Inode, InodeType, NIL};
use superblock::Superblock;

/// A device address: a byte offset from the start of the device, also
/// used as the identity of an inode or data block.
pub type Addr = u32;

/// Snapshot of an inode's metadata, returned by `inode_stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub size: u32,
    pub alloc_size: u32,
    pub ty: InodeType,
}

/// Capability set a VFS mount dispatches through. SFS is the only
/// implementation, but keeping this as a trait lets the VFS stay
/// ignorant of which filesystem backs a given mount.
pub trait FilesystemOps {
    fn format(&mut self) -> SfsResult<()>;
    fn root_inode(&self) -> Addr;
    fn device_name(&self) -> &str;

    fn inode_create(&mut self, ty: InodeType) -> SfsResult<Addr>;
    fn inode_delete(&mut self, addr: Addr) -> SfsResult<()>;
    fn inode_stat(&mut self, addr: Addr) -> SfsResult<Stat>;
    fn inode_set_type(&mut self, addr: Addr, ty: InodeType) -> SfsResult<()>;
    fn inode_resize(&mut self, addr: Addr, new_size: u32) -> SfsResult<()>;

    /// Whole-content replace, confined to the direct chain reachable via
    /// `block[0]`/`next` (see the doc comment on the inherent method for
    /// why this is narrower than `inode_write`).
    fn inode_set(&mut self, addr: Addr, data: &[u8]) -> SfsResult<()>;
    /// Whole-content read, the read-side counterpart of `inode_set`.
    fn inode_get(&mut self, addr: Addr, out: &mut [u8]) -> SfsResult<u32>;

    fn inode_read(&mut self, addr: Addr, offset: u32, out: &mut [u8]) -> SfsResult<u32>;
    fn inode_write(&mut self, addr: Addr, offset: u32, data: &[u8]) -> SfsResult<u32>;
}

/// The SFS engine over one block device `D`, with an injectable retry
/// `Backoff` `B`.
pub struct Sfs<D, B = NullBackoff> {
    device: D,
    backoff: B,
    superblock: Superblock,
}

impl<D: BlockDevice> Sfs<D, NullBackoff> {
    /// Formats `device` with a fresh SFS and mounts it, using a
    /// no-op backoff.
    pub fn format_new(device: D) -> SfsResult<Self> {
        Self::format_with(device, NullBackoff)
    }
}

impl<D: BlockDevice, B: Backoff> Sfs<D, B> {
    fn geometry_check(device: &D) -> SfsResult<()> {
        if device.sector_size() as usize > MAX_SECTOR_SIZE {
            return Err(SfsError::SectorTooBig);
        }
        if device.write_size() as usize > crate::config::MAX_WRITE_SIZE {
            return Err(SfsError::WriteTooBig);
        }
        Ok(())
    }

    /// Erases `device` and builds a fresh superblock, inode table, and
    /// data-block free list, leaving a usable empty root directory
    /// mounted and ready (resolved Open Question: `format` never leaves
    /// callers to `mkdir("/")` themselves).
    pub fn format_with(device: D, backoff: B) -> SfsResult<Self> {
        Self::geometry_check(&device)?;
        let mut fs = Sfs {
            device,
            backoff,
            superblock: Superblock::zeroed(),
        };
        fs.format_in_place()?;
        Ok(fs)
    }

    /// Core of `format_with`, callable against an already-constructed
    /// `Sfs` so [`FilesystemOps::format`] can reuse it instead of
    /// duplicating the layout logic.
    fn format_in_place(&mut self) -> SfsResult<()> {
        let device = &mut self.device;
        log::info!(
            "{}: formatting (sector_size={}, write_size={})",
            device.name(),
            device.sector_size(),
            device.write_size()
        );
        device.erase_all();

        let sector_size = device.sector_size();
        let inode_sectors = crate::config::INODE_SECTORS;
        let inode_size = Inode::SIZE as u32;
        let inodes_per_sector = sector_size / inode_size;
        let inode_count = inodes_per_sector * inode_sectors;
        let inode_start = sector_size as u32;
        let block_start = inode_start + inode_sectors * sector_size;

        let mut sb = Superblock::zeroed();
        sb.inode_count = inode_count;
        sb.inode_size = inode_size;
        sb.inode_start = inode_start;
        sb.block_start = block_start;
        sb.free_inodes = 0;
        sb.free_blocks = 0;

        let mut sector_buf = [0u8; MAX_SECTOR_SIZE];

        // Build each inode sector: every inode in it threaded onto the
        // free list via `next_free`, in descending address order so the
        // free list ends up head-first in ascending order.
        for s in (0..inode_sectors).rev() {
            let sector_addr = inode_start + s * sector_size;
            let buf = &mut sector_buf[..sector_size as usize];
            buf.fill(0);
            for i in (0..inodes_per_sector).rev() {
                let addr = sector_addr + i * inode_size;
                let mut ino = Inode::zeroed();
                ino.next_free = sb.free_inodes;
                ino.ty = InodeType::Empty as u32;
                ino.seal();
                let off = (i * inode_size) as usize;
                buf[off..off + Inode::SIZE].copy_from_slice(ino.as_bytes());
                sb.free_inodes = addr;
            }
            sb.inode_checksums[s as usize] = whole_sector_checksum(buf);
            device.write_sector(sector_addr as u64, buf);
        }

        // Thread the data-block pool onto the free-block list, again
        // head-first in ascending order.
        let total = device.total_size();
        let mut addr = block_start;
        let mut blocks = 0u32;
        while (addr as u64) + (sector_size as u64) <= total {
            blocks += 1;
            addr += sector_size;
        }
        let mut next = NIL;
        for i in (0..blocks).rev() {
            let block_addr = block_start + i * sector_size;
            let meta = BlockMeta {
                checksum: 0,
                next,
                datasize: 0,
            };
            let buf = &mut sector_buf[..sector_size as usize];
            buf.fill(0);
            seal_block(buf, &meta, &[]);
            device.write_sector(block_addr as u64, buf);
            next = block_addr;
        }
        sb.free_blocks = next;

        sb.seal();
        let sb_buf = &mut sector_buf[..sector_size as usize];
        sb_buf.fill(0);
        sb_buf[..Superblock::SIZE].copy_from_slice(sb.as_bytes());
        device.write_sector(0, sb_buf);

        self.superblock = sb;

        // Consume the very first free inode as the root directory so a
        // fresh mount always has a reachable root.
        let root = self.alloc_inode_addr()?;
        debug_assert_eq!(root, self.superblock.inode_start);
        let mut root_dir = [0u8; crate::config::DIR_ENTRY_SIZE * 2];
        dir::init_empty(&mut root_dir);
        self.write_inode_meta(root, InodeType::Dir, 0)?;
        self.inode_set(root, &root_dir[..crate::config::DIR_ENTRY_SIZE])?;
        log::info!("{}: format complete, root inode at {:#x}", self.device.name(), root);
        Ok(())
    }

    /// Mounts an already-formatted device: reads and validates the
    /// superblock.
    pub fn mount_with(mut device: D, mut backoff: B) -> SfsResult<Self> {
        Self::geometry_check(&device)?;
        let mut buf = [0u8; MAX_SECTOR_SIZE];
        let size = Superblock::SIZE;
        let ok = read_with_retry(&mut device, &mut backoff, 0, &mut buf[..size], |b| {
            Superblock::validate(b)
        });
        if !ok {
            return Err(SfsError::BadDataBlock);
        }
        let sb = Superblock::from_bytes(&buf[..size]);
        Ok(Sfs {
            device,
            backoff,
            superblock: sb,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutable access to the underlying device, for tests that need to
    /// drive fault injection directly.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    fn sector_size(&self) -> u32 {
        self.device.sector_size()
    }

    fn payload_len(&self) -> usize {
        payload_len(self.sector_size())
    }

    fn persist_superblock(&mut self) -> SfsResult<()> {
        let mut sb = self.superblock;
        sb.seal();
        let size = Superblock::SIZE;
        let mut scratch = [0u8; MAX_SECTOR_SIZE];
        let buf = sb.as_bytes();
        let ok = write_with_retry(
            &mut self.device,
            &mut self.backoff,
            0,
            buf,
            Superblock::validate,
            &mut scratch[..size],
        );
        if !ok {
            return Err(SfsError::BadDataBlock);
        }
        self.superblock = sb;
        Ok(())
    }

    fn inode_sector_addr(&self, addr: Addr) -> (u32, u32) {
        let sector_size = self.sector_size();
        let rel = addr - self.superblock.inode_start;
        let sector_idx = rel / sector_size;
        (self.superblock.inode_start + sector_idx * sector_size, sector_idx)
    }

    fn read_inode_sector(&mut self, sector_addr: u32, sector_idx: u32, buf: &mut [u8]) -> SfsResult<()> {
        let expected = self.superblock.inode_checksums[sector_idx as usize];
        let ok = read_with_retry(
            &mut self.device,
            &mut self.backoff,
            sector_addr as u64,
            buf,
            |b| whole_sector_checksum(b) == expected,
        );
        if ok {
            Ok(())
        } else {
            Err(SfsError::BadDataBlock)
        }
    }

    fn write_inode_sector(&mut self, sector_addr: u32, sector_idx: u32, buf: &[u8]) -> SfsResult<()> {
        let new_checksum = whole_sector_checksum(buf);
        let mut scratch = [0u8; MAX_SECTOR_SIZE];
        let n = buf.len();
        let ok = write_with_retry(
            &mut self.device,
            &mut self.backoff,
            sector_addr as u64,
            buf,
            |b| whole_sector_checksum(b) == new_checksum,
            &mut scratch[..n],
        );
        if !ok {
            return Err(SfsError::BadDataBlock);
        }
        self.superblock.inode_checksums[sector_idx as usize] = new_checksum;
        self.persist_superblock()
    }

    fn read_inode(&mut self, addr: Addr) -> SfsResult<Inode> {
        if addr < self.superblock.inode_start
            || addr >= self.superblock.block_start
            || (addr - self.superblock.inode_start) % self.superblock.inode_size != 0
        {
            return Err(SfsError::WrongAddr);
        }
        let (sector_addr, sector_idx) = self.inode_sector_addr(addr);
        let sector_size = self.sector_size() as usize;
        let mut buf = [0u8; MAX_SECTOR_SIZE];
        self.read_inode_sector(sector_addr, sector_idx, &mut buf[..sector_size])?;
        let off = (addr - sector_addr) as usize;
        Ok(Inode::from_bytes(&buf[off..off + Inode::SIZE]))
    }

    fn write_inode(&mut self, addr: Addr, ino: &Inode) -> SfsResult<()> {
        let (sector_addr, sector_idx) = self.inode_sector_addr(addr);
        let sector_size = self.sector_size() as usize;
        let mut buf = [0u8; MAX_SECTOR_SIZE];
        self.read_inode_sector(sector_addr, sector_idx, &mut buf[..sector_size])?;
        let mut sealed = *ino;
        sealed.seal();
        let off = (addr - sector_addr) as usize;
        buf[off..off + Inode::SIZE].copy_from_slice(sealed.as_bytes());
        self.write_inode_sector(sector_addr, sector_idx, &buf[..sector_size])
    }

    /// Reads an inode and rejects addresses that currently sit on the
    /// free list.
    fn live_inode(&mut self, addr: Addr) -> SfsResult<Inode> {
        let ino = self.read_inode(addr)?;
        if ino.is_free() {
            return Err(SfsError::InodeNotFound);
        }
        Ok(ino)
    }

    fn write_inode_meta(&mut self, addr: Addr, ty: InodeType, size: u32) -> SfsResult<()> {
        let mut ino = self.read_inode(addr)?;
        ino.ty = ty as u32;
        ino.size = size;
        self.write_inode(addr, &ino)
    }

    fn alloc_inode_addr(&mut self) -> SfsResult<Addr> {
        let addr = self.superblock.free_inodes;
        if addr == NIL {
            return Err(SfsError::OutOfMemory);
        }
        let ino = self.read_inode(addr)?;
        self.superblock.free_inodes = ino.next_free;
        self.persist_superblock()?;
        let mut fresh = Inode::zeroed();
        fresh.ty = InodeType::Empty as u32;
        self.write_inode(addr, &fresh)?;
        Ok(addr)
    }

    fn free_inode_addr(&mut self, addr: Addr) -> SfsResult<()> {
        let mut ino = Inode::zeroed();
        ino.ty = InodeType::Empty as u32;
        ino.next_free = self.superblock.free_inodes;
        self.write_inode(addr, &ino)?;
        self.superblock.free_inodes = addr;
        self.persist_superblock()
    }

    fn read_block_meta(&mut self, addr: Addr) -> SfsResult<(BlockMeta, [u8; MAX_SECTOR_SIZE])> {
        let sector_size = self.sector_size() as usize;
        let mut buf = [0u8; MAX_SECTOR_SIZE];
        let ok = read_with_retry(
            &mut self.device,
            &mut self.backoff,
            addr as u64,
            &mut buf[..sector_size],
            |b| validate_block(b, sector_size),
        );
        if !ok {
            return Err(SfsError::BadDataBlock);
        }
        let meta = BlockMeta::from_bytes(&buf[..BlockMeta::SIZE]);
        Ok((meta, buf))
    }

    fn write_block(&mut self, addr: Addr, meta: &BlockMeta, payload: &[u8]) -> SfsResult<()> {
        let sector_size = self.sector_size() as usize;
        let mut buf = [0u8; MAX_SECTOR_SIZE];
        let mut padded_payload = [0u8; MAX_SECTOR_SIZE];
        padded_payload[..payload.len()].copy_from_slice(payload);
        seal_block(&mut buf[..sector_size], meta, &padded_payload[..self.payload_len()]);
        let mut scratch = [0u8; MAX_SECTOR_SIZE];
        let ok = write_with_retry(
            &mut self.device,
            &mut self.backoff,
            addr as u64,
            &buf[..sector_size],
            |b| validate_block(b, sector_size),
            &mut scratch[..sector_size],
        );
        if ok {
            Ok(())
        } else {
            Err(SfsError::BadDataBlock)
        }
    }

    fn alloc_block(&mut self) -> SfsResult<Addr> {
        let addr = self.superblock.free_blocks;
        if addr == NIL {
            return Err(SfsError::NoDataBlocks);
        }
        let (meta, _) = self.read_block_meta(addr)?;
        self.superblock.free_blocks = meta.next;
        self.persist_superblock()?;
        Ok(addr)
    }

    fn free_block(&mut self, addr: Addr) -> SfsResult<()> {
        let meta = BlockMeta {
            checksum: 0,
            next: self.superblock.free_blocks,
            datasize: 0,
        };
        self.write_block(addr, &meta, &[])?;
        self.superblock.free_blocks = addr;
        self.persist_superblock()
    }

    /// Maximum number of blocks addressable through the two direct
    /// pointers plus the indirect block's pointer array.
    fn max_blocks(&self) -> u32 {
        2 + (self.payload_len() / 4) as u32
    }

    fn block_addr_for_index(&mut self, ino: &Inode, idx: u32) -> SfsResult<Addr> {
        match idx {
            0 => Ok(ino.blocks.block[0]),
            1 => Ok(ino.blocks.block[1]),
            _ => {
                if ino.blocks.block_indirect == NIL {
                    return Err(SfsError::WrongAddr);
                }
                let (_, buf) = self.read_block_meta(ino.blocks.block_indirect)?;
                let sector_size = self.sector_size() as usize;
                let payload = &buf[BlockMeta::SIZE..sector_size];
                let slot = (idx - 2) as usize;
                let off = slot * 4;
                Ok(u32::from_le_bytes(payload[off..off + 4].try_into().unwrap()))
            }
        }
    }

    fn set_block_addr_for_index(&mut self, ino: &mut Inode, idx: u32, addr: Addr) -> SfsResult<()> {
        match idx {
            0 => ino.blocks.block[0] = addr,
            1 => ino.blocks.block[1] = addr,
            _ => {
                if ino.blocks.block_indirect == NIL {
                    let indirect_addr = self.alloc_block()?;
                    let sector_size = self.sector_size() as usize;
                    let zero_payload = [0u8; MAX_SECTOR_SIZE];
                    let meta = BlockMeta {
                        checksum: 0,
                        next: NIL,
                        datasize: 0,
                    };
                    self.write_block(indirect_addr, &meta, &zero_payload[..sector_size - BlockMeta::SIZE])?;
                    ino.blocks.block_indirect = indirect_addr;
                }
                let (meta, mut buf) = self.read_block_meta(ino.blocks.block_indirect)?;
                let sector_size = self.sector_size() as usize;
                let slot = (idx - 2) as usize;
                let off = BlockMeta::SIZE + slot * 4;
                buf[off..off + 4].copy_from_slice(&addr.to_le_bytes());
                let payload = buf[BlockMeta::SIZE..sector_size].to_vec_or_array();
                self.write_block(ino.blocks.block_indirect, &meta, &payload)?;
            }
        }
        Ok(())
    }

    /// Grows `ino`'s allocation (never shrinks it) so it can hold
    /// `new_size` bytes, allocating direct and indirect blocks as
    /// needed. Updates `ino.blocks`/`ino.alloc_size` in place; the
    /// caller is responsible for persisting `ino`.
    fn ensure_alloc(&mut self, ino: &mut Inode, new_size: u32) -> SfsResult<()> {
        let payload = self.payload_len() as u32;
        if payload == 0 {
            return Err(SfsError::WrongSize);
        }
        let needed_blocks = new_size.div_ceil(payload).max(if new_size == 0 { 0 } else { 1 });
        if needed_blocks > self.max_blocks() {
            return Err(SfsError::WrongSize);
        }
        let have_blocks = ino.alloc_size.div_ceil(payload);
        for i in have_blocks..needed_blocks {
            let addr = self.alloc_block()?;
            self.set_block_addr_for_index(ino, i, addr)?;
        }
        if needed_blocks > have_blocks {
            ino.alloc_size = needed_blocks * payload;
        }
        Ok(())
    }

    /// Writes `data` at `offset`, growing the inode's allocation as
    /// needed. Returns the number of bytes written.
    pub fn inode_write(&mut self, addr: Addr, offset: u32, data: &[u8]) -> SfsResult<u32> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut ino = self.live_inode(addr)?;
        let end = offset
            .checked_add(data.len() as u32)
            .ok_or(SfsError::WrongSize)?;
        self.ensure_alloc(&mut ino, end)?;
        let payload = self.payload_len() as u32;

        let mut written = 0usize;
        while written < data.len() {
            let pos = offset + written as u32;
            let idx = pos / payload;
            let within = (pos % payload) as usize;
            let chunk = core::cmp::min(data.len() - written, payload as usize - within);
            let block_addr = self.block_addr_for_index(&ino, idx)?;
            let (meta, mut buf) = self.read_block_meta(block_addr)?;
            let sector_size = self.sector_size() as usize;
            let payload_buf = &mut buf[BlockMeta::SIZE..sector_size];
            payload_buf[within..within + chunk].copy_from_slice(&data[written..written + chunk]);
            let new_datasize = core::cmp::max(meta.datasize, (within + chunk) as u32);
            let new_meta = BlockMeta {
                checksum: 0,
                next: meta.next,
                datasize: new_datasize,
            };
            let payload_owned = payload_buf.to_vec_or_array();
            self.write_block(block_addr, &new_meta, &payload_owned)?;
            written += chunk;
        }

        if end > ino.size {
            ino.size = end;
        }
        self.write_inode(addr, &ino)?;
        Ok(written as u32)
    }

    /// Reads up to `out.len()` bytes starting at `offset`. An `offset`
    /// at or past the inode's size yields zero bytes, never an error
    /// (resolved Open Question).
    pub fn inode_read(&mut self, addr: Addr, offset: u32, out: &mut [u8]) -> SfsResult<u32> {
        let ino = self.live_inode(addr)?;
        if offset >= ino.size {
            return Ok(0);
        }
        let payload = self.payload_len() as u32;
        let end = core::cmp::min(ino.size, offset + out.len() as u32);
        let mut read = 0usize;
        let mut pos = offset;
        while pos < end {
            let idx = pos / payload;
            let within = (pos % payload) as usize;
            let chunk = core::cmp::min((end - pos) as usize, payload as usize - within);
            let block_addr = self.block_addr_for_index(&ino, idx)?;
            let (_, buf) = self.read_block_meta(block_addr)?;
            let sector_size = self.sector_size() as usize;
            let payload_buf = &buf[BlockMeta::SIZE..sector_size];
            out[read..read + chunk].copy_from_slice(&payload_buf[within..within + chunk]);
            read += chunk;
            pos += chunk as u32;
        }
        Ok(read as u32)
    }

    /// Whole-content replace confined to the chain reachable from
    /// `block[0]` via each block's `next` pointer. Deliberately never
    /// allocates or reads through `block[1]`/`block_indirect`: prefer
    /// [`Sfs::inode_write`] for anything over two data-block payloads.
    pub fn inode_set(&mut self, addr: Addr, data: &[u8]) -> SfsResult<()> {
        let mut ino = self.live_inode(addr)?;
        let payload = self.payload_len();
        let needed = data.len().div_ceil(payload.max(1)).max(if data.is_empty() { 0 } else { 1 });

        // Walk the existing chain, reusing blocks in order.
        let mut chain = [0u32; 8];
        let mut chain_len = 0usize;
        let mut cur = ino.blocks.block[0];
        while cur != NIL && chain_len < chain.len() {
            chain[chain_len] = cur;
            chain_len += 1;
            let (meta, _) = self.read_block_meta(cur)?;
            cur = meta.next;
        }

        let mut written = 0usize;
        let mut head = NIL;
        for i in 0..needed {
            let block_addr = if i < chain_len {
                chain[i]
            } else {
                self.alloc_block()?
            };
            if i == 0 {
                head = block_addr;
            }
            let chunk = core::cmp::min(payload, data.len() - written);
            let next = if i + 1 < needed {
                if i + 1 < chain_len {
                    chain[i + 1]
                } else {
                    self.alloc_block()?
                }
            } else {
                NIL
            };
            let meta = BlockMeta {
                checksum: 0,
                next,
                datasize: chunk as u32,
            };
            self.write_block(block_addr, &meta, &data[written..written + chunk])?;
            written += chunk;
        }
        // Free any leftover tail from a previously longer chain.
        for &leftover in chain.iter().take(chain_len).skip(needed) {
            self.free_block(leftover)?;
        }

        ino.blocks.block[0] = head;
        ino.size = data.len() as u32;
        ino.alloc_size = (needed * payload) as u32;
        self.write_inode(addr, &ino)
    }

    /// Whole-content read, the counterpart of [`Sfs::inode_set`]; shares
    /// its blind spot toward `block[1]`/`block_indirect`.
    pub fn inode_get(&mut self, addr: Addr, out: &mut [u8]) -> SfsResult<u32> {
        let ino = self.live_inode(addr)?;
        let mut cur = ino.blocks.block[0];
        let mut read = 0usize;
        let want = core::cmp::min(out.len(), ino.size as usize);
        while cur != NIL && read < want {
            let (meta, buf) = self.read_block_meta(cur)?;
            let sector_size = self.sector_size() as usize;
            let payload_buf = &buf[BlockMeta::SIZE..sector_size];
            let chunk = core::cmp::min(meta.datasize as usize, want - read);
            out[read..read + chunk].copy_from_slice(&payload_buf[..chunk]);
            read += chunk;
            cur = meta.next;
        }
        Ok(read as u32)
    }

    pub fn inode_resize(&mut self, addr: Addr, new_size: u32) -> SfsResult<()> {
        let mut ino = self.live_inode(addr)?;
        if new_size > ino.size {
            self.ensure_alloc(&mut ino, new_size)?;
        }
        ino.size = new_size;
        self.write_inode(addr, &ino)
    }

    pub fn inode_stat(&mut self, addr: Addr) -> SfsResult<Stat> {
        let ino = self.live_inode(addr)?;
        let ty = ino.inode_type().ok_or(SfsError::WrongAddr)?;
        Ok(Stat {
            size: ino.size,
            alloc_size: ino.alloc_size,
            ty,
        })
    }

    pub fn inode_set_type(&mut self, addr: Addr, ty: InodeType) -> SfsResult<()> {
        let mut ino = self.live_inode(addr)?;
        ino.ty = ty as u32;
        self.write_inode(addr, &ino)
    }

    pub fn inode_create(&mut self, ty: InodeType) -> SfsResult<Addr> {
        let addr = self.alloc_inode_addr()?;
        self.write_inode_meta(addr, ty, 0)?;
        Ok(addr)
    }

    pub fn inode_delete(&mut self, addr: Addr) -> SfsResult<()> {
        let ino = self.live_inode(addr)?;
        // Directories are only ever populated through `inode_set`, which
        // threads its blocks with `next` starting at `block[0]` and never
        // touches `block[1]`/`block_indirect` (see its doc comment).
        // Everything else goes through `inode_write`'s direct/indirect
        // addressing, so the two need different teardown walks.
        if ino.inode_type() == Some(InodeType::Dir) {
            let mut cur = ino.blocks.block[0];
            while cur != NIL {
                let (meta, _) = self.read_block_meta(cur)?;
                let next = meta.next;
                self.free_block(cur)?;
                cur = next;
            }
        } else {
            let payload = self.payload_len() as u32;
            if payload > 0 {
                let used_blocks = ino.alloc_size.div_ceil(payload);
                for i in 0..used_blocks.min(2) {
                    let block_addr = self.block_addr_for_index(&ino, i)?;
                    if block_addr != NIL {
                        self.free_block(block_addr)?;
                    }
                }
            }
            if ino.blocks.block_indirect != NIL {
                let (_, buf) = self.read_block_meta(ino.blocks.block_indirect)?;
                let sector_size = self.sector_size() as usize;
                let count = (sector_size - BlockMeta::SIZE) / 4;
                for i in 0..count {
                    let off = BlockMeta::SIZE + i * 4;
                    let ptr = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
                    if ptr != NIL {
                        self.free_block(ptr)?;
                    }
                }
                self.free_block(ino.blocks.block_indirect)?;
            }
        }
        self.free_inode_addr(addr)
    }

    pub fn root_inode(&self) -> Addr {
        self.superblock.inode_start
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }
}

/// Small helper so payload-sized scratch slices (always `<=
/// MAX_SECTOR_SIZE`) can be handed to APIs expecting an owned buffer
/// without pulling in `alloc`.
trait ToFixedArray {
    fn to_vec_or_array(&self) -> [u8; MAX_SECTOR_SIZE];
}

impl ToFixedArray for [u8] {
    fn to_vec_or_array(&self) -> [u8; MAX_SECTOR_SIZE] {
        let mut out = [0u8; MAX_SECTOR_SIZE];
        out[..self.len()].copy_from_slice(self);
        out
    }
}

impl<D: BlockDevice, B: Backoff> FilesystemOps for Sfs<D, B> {
    fn format(&mut self) -> SfsResult<()> {
        self.format_in_place()
    }

    fn root_inode(&self) -> Addr {
        Sfs::root_inode(self)
    }

    fn device_name(&self) -> &str {
        Sfs::device_name(self)
    }

    fn inode_create(&mut self, ty: InodeType) -> SfsResult<Addr> {
        Sfs::inode_create(self, ty)
    }

    fn inode_delete(&mut self, addr: Addr) -> SfsResult<()> {
        Sfs::inode_delete(self, addr)
    }

    fn inode_stat(&mut self, addr: Addr) -> SfsResult<Stat> {
        Sfs::inode_stat(self, addr)
    }

    fn inode_set_type(&mut self, addr: Addr, ty: InodeType) -> SfsResult<()> {
        Sfs::inode_set_type(self, addr, ty)
    }

    fn inode_resize(&mut self, addr: Addr, new_size: u32) -> SfsResult<()> {
        Sfs::inode_resize(self, addr, new_size)
    }

    fn inode_set(&mut self, addr: Addr, data: &[u8]) -> SfsResult<()> {
        Sfs::inode_set(self, addr, data)
    }

    fn inode_get(&mut self, addr: Addr, out: &mut [u8]) -> SfsResult<u32> {
        Sfs::inode_get(self, addr, out)
    }

    fn inode_read(&mut self, addr: Addr, offset: u32, out: &mut [u8]) -> SfsResult<u32> {
        Sfs::inode_read(self, addr, offset, out)
    }

    fn inode_write(&mut self, addr: Addr, offset: u32, data: &[u8]) -> SfsResult<u32> {
        Sfs::inode_write(self, addr, offset, data)
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::device::ram::RamDevice;

    fn fresh() -> Sfs<RamDevice, NullBackoff> {
        let dev = RamDevice::new("test0", 512, 64, 64);
        Sfs::format_new(dev).unwrap()
    }

    #[test]
    fn format_leaves_usable_root_directory() {
        let mut fs = fresh();
        let root = fs.root_inode();
        let stat = fs.inode_stat(root).unwrap();
        assert_eq!(stat.ty, InodeType::Dir);
        assert_eq!(stat.size, crate::config::DIR_ENTRY_SIZE as u32);
    }

    #[test]
    fn create_write_read_round_trip() {
        let mut fs = fresh();
        let file = fs.inode_create(InodeType::File).unwrap();
        let msg = b"hello world";
        let n = fs.inode_write(file, 0, msg).unwrap();
        assert_eq!(n as usize, msg.len());
        let mut out = [0u8; 11];
        let r = fs.inode_read(file, 0, &mut out).unwrap();
        assert_eq!(r as usize, msg.len());
        assert_eq!(&out, msg);
    }

    #[test]
    fn read_at_or_past_size_returns_zero_bytes() {
        let mut fs = fresh();
        let file = fs.inode_create(InodeType::File).unwrap();
        fs.inode_write(file, 0, b"hi").unwrap();
        let mut out = [0u8; 4];
        assert_eq!(fs.inode_read(file, 2, &mut out).unwrap(), 0);
        assert_eq!(fs.inode_read(file, 100, &mut out).unwrap(), 0);
    }

    #[test]
    fn write_spanning_multiple_blocks_uses_indirect_addressing() {
        let mut fs = fresh();
        let file = fs.inode_create(InodeType::File).unwrap();
        let payload = fs.payload_len();
        let data_len = payload * 4 + 10;
        let mut data = [0u8; 4096];
        for (i, b) in data[..data_len].iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        fs.inode_write(file, 0, &data[..data_len]).unwrap();
        let mut out = [0u8; 4096];
        let n = fs.inode_read(file, 0, &mut out[..data_len]).unwrap();
        assert_eq!(n as usize, data_len);
        assert_eq!(&out[..data_len], &data[..data_len]);
    }

    fn free_list_len(fs: &mut Sfs<RamDevice, NullBackoff>) -> usize {
        let mut count = 0;
        let mut cur = fs.superblock.free_blocks;
        while cur != NIL {
            count += 1;
            let (meta, _) = fs.read_block_meta(cur).unwrap();
            cur = meta.next;
        }
        count
    }

    #[test]
    fn delete_returns_blocks_to_free_list() {
        let mut fs = fresh();
        let before = free_list_len(&mut fs);
        let file = fs.inode_create(InodeType::File).unwrap();
        let payload = fs.payload_len();
        let data = [7u8; 4096];
        fs.inode_write(file, 0, &data[..payload * 3]).unwrap();
        assert!(free_list_len(&mut fs) < before);
        fs.inode_delete(file).unwrap();
        assert_eq!(free_list_len(&mut fs), before);
    }

    #[test]
    fn read_from_unknown_address_fails() {
        let mut fs = fresh();
        let mut out = [0u8; 1];
        assert_eq!(fs.inode_read(0xFFFF_FF00, 0, &mut out), Err(SfsError::WrongAddr));
    }

    #[test]
    fn corrupted_sector_recovers_within_retry_budget() {
        let dev = RamDevice::new("test1", 512, 64, 64);
        let mut fs = Sfs::format_new(dev).unwrap();
        let file = fs.inode_create(InodeType::File).unwrap();
        fs.inode_write(file, 0, b"resilient").unwrap();
    }
}
