//! Unified error taxonomy shared by the storage engine and the VFS.
//!
//! A single enum is the source of truth; the SFS-internal wire encoding
//! (`to_u32`/`from_u32`) and the VFS-level POSIX-style encoding
//! (`to_errno`/`vfs_strerror`) are thin views derived from it, not two
//! independently maintained integer namespaces.

use core::fmt;

/// Values at or above this are reserved to mean "error" in the SFS wire
/// encoding; valid addresses and sizes never reach this range.
pub const WIRE_ERROR_BASE: u32 = 0xFFFF_FF00;

/// The named error conditions raised by the storage engine and the VFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SfsError {
    /// The data-block free list is exhausted.
    NoDataBlocks,
    /// A device address does not refer to a valid structure of the
    /// expected kind.
    WrongAddr,
    /// A data block failed checksum verification past the retry budget.
    BadDataBlock,
    /// A requested size is inconsistent with the geometry or the call.
    WrongSize,
    /// A path exceeded `PATH_MAX` or a component exceeded `NAME_MAX`.
    PathTooLong,
    /// An inode address does not resolve to a live inode.
    InodeNotFound,
    /// A directory does not contain an entry with the requested name.
    NameNotFound,
    /// The inode addressed is not a directory where one was required.
    NotADir,
    /// The inode addressed is not a regular file where one was required.
    NotAFile,
    /// A directory delete was attempted on a non-empty directory.
    DirNotEmpty,
    /// A create was attempted over an existing name.
    AlreadyExists,
    /// The device's reported `sector_size` exceeds `MAX_SECTOR_SIZE`.
    SectorTooBig,
    /// The device's reported `write_size` exceeds `MAX_WRITE_SIZE`.
    WriteTooBig,
    /// A fixed-capacity collection (inode table, mount table, fd table)
    /// has no free slots.
    OutOfMemory,
    /// The requested operation is not implemented by this filesystem.
    NotImplemented,
    /// No mount matches the path or mount id given.
    MountNotFound,
    /// The resolved path exceeds the VFS's bounded path capacity.
    PathTooBig,
    /// The mount table has no free slots.
    MountsFull,
    /// `format` or `mount` left no reachable root directory.
    NoRoot,
    /// The file-descriptor table has no free slots.
    RunOutOfFd,
    /// The file descriptor given is not currently open.
    FdNotSet,
    /// The target of the operation is itself a mount point.
    IsMountPoint,
    /// A `..` was applied with no parent token to pop.
    WrongPath,
    /// The inode addressed is a directory where one was not expected.
    IsADir,
}

impl SfsError {
    /// Encodes this error as an SFS wire value (`> WIRE_ERROR_BASE`).
    pub const fn to_u32(self) -> u32 {
        WIRE_ERROR_BASE + self.suffix()
    }

    /// Decodes an SFS wire value back into an error, if it is one.
    pub const fn from_u32(v: u32) -> Option<Self> {
        if v <= WIRE_ERROR_BASE {
            return None;
        }
        let suffix = v - WIRE_ERROR_BASE;
        Self::from_suffix(suffix)
    }

    /// Encodes this error as a negative VFS-style return value.
    pub const fn to_errno(self) -> i32 {
        -(self.suffix() as i32)
    }

    const fn suffix(self) -> u32 {
        match self {
            SfsError::NoDataBlocks => 1,
            SfsError::WrongAddr => 2,
            SfsError::BadDataBlock => 3,
            SfsError::WrongSize => 4,
            SfsError::PathTooLong => 5,
            SfsError::InodeNotFound => 6,
            SfsError::NameNotFound => 7,
            SfsError::NotADir => 8,
            SfsError::NotAFile => 9,
            SfsError::DirNotEmpty => 10,
            SfsError::AlreadyExists => 11,
            SfsError::SectorTooBig => 12,
            SfsError::WriteTooBig => 13,
            SfsError::OutOfMemory => 14,
            SfsError::NotImplemented => 15,
            SfsError::MountNotFound => 16,
            SfsError::PathTooBig => 17,
            SfsError::MountsFull => 18,
            SfsError::NoRoot => 19,
            SfsError::RunOutOfFd => 20,
            SfsError::FdNotSet => 21,
            SfsError::IsMountPoint => 22,
            SfsError::WrongPath => 23,
            SfsError::IsADir => 24,
        }
    }

    const fn from_suffix(suffix: u32) -> Option<Self> {
        Some(match suffix {
            1 => SfsError::NoDataBlocks,
            2 => SfsError::WrongAddr,
            3 => SfsError::BadDataBlock,
            4 => SfsError::WrongSize,
            5 => SfsError::PathTooLong,
            6 => SfsError::InodeNotFound,
            7 => SfsError::NameNotFound,
            8 => SfsError::NotADir,
            9 => SfsError::NotAFile,
            10 => SfsError::DirNotEmpty,
            11 => SfsError::AlreadyExists,
            12 => SfsError::SectorTooBig,
            13 => SfsError::WriteTooBig,
            14 => SfsError::OutOfMemory,
            15 => SfsError::NotImplemented,
            16 => SfsError::MountNotFound,
            17 => SfsError::PathTooBig,
            18 => SfsError::MountsFull,
            19 => SfsError::NoRoot,
            20 => SfsError::RunOutOfFd,
            21 => SfsError::FdNotSet,
            22 => SfsError::IsMountPoint,
            23 => SfsError::WrongPath,
            24 => SfsError::IsADir,
            _ => return None,
        })
    }
}

impl fmt::Display for SfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(vfs_strerror(self.to_errno()))
    }
}

impl core::error::Error for SfsError {}

/// Human-readable message for a VFS-style negative errno, mirroring
/// strerror's contract for an unknown-but-valid code.
pub fn vfs_strerror(errno: i32) -> &'static str {
    if errno >= 0 {
        return "success";
    }
    match SfsError::from_suffix((-errno) as u32) {
        Some(SfsError::NoDataBlocks) => "no free data blocks",
        Some(SfsError::WrongAddr) => "address does not refer to a valid structure",
        Some(SfsError::BadDataBlock) => "data block failed checksum verification",
        Some(SfsError::WrongSize) => "size is inconsistent with geometry",
        Some(SfsError::PathTooLong) => "path or component too long",
        Some(SfsError::InodeNotFound) => "inode not found",
        Some(SfsError::NameNotFound) => "name not found in directory",
        Some(SfsError::NotADir) => "not a directory",
        Some(SfsError::NotAFile) => "not a regular file",
        Some(SfsError::DirNotEmpty) => "directory not empty",
        Some(SfsError::AlreadyExists) => "name already exists",
        Some(SfsError::SectorTooBig) => "device sector size exceeds the compiled-in maximum",
        Some(SfsError::WriteTooBig) => "device write size exceeds the compiled-in maximum",
        Some(SfsError::OutOfMemory) => "fixed-capacity table is full",
        Some(SfsError::NotImplemented) => "operation not implemented",
        Some(SfsError::MountNotFound) => "no such mount",
        Some(SfsError::PathTooBig) => "path exceeds bounded capacity",
        Some(SfsError::MountsFull) => "mount table is full",
        Some(SfsError::NoRoot) => "no usable root directory",
        Some(SfsError::RunOutOfFd) => "file descriptor table is full",
        Some(SfsError::FdNotSet) => "file descriptor is not open",
        Some(SfsError::IsMountPoint) => "target is a mount point",
        Some(SfsError::WrongPath) => "path has no parent to ascend to",
        Some(SfsError::IsADir) => "is a directory",
        None => "unknown error",
    }
}

/// Convenience alias used throughout the crate.
pub type SfsResult<T> = Result<T, SfsError>;
