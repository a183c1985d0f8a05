//! End-to-end exercises of the public `Vfs`/`Sfs` API, run only against
//! `RamDevice` test doubles. Drives whole-system behavior from outside
//! rather than unit testing internals.

use sfs::backoff::NullBackoff;
use sfs::config::{FD_MAX, INODE_SECTORS, MAX_DIR_ENTRIES};
use sfs::device::ram::RamDevice;
use sfs::sfs::Sfs;
use sfs::vfs::{OpenFlags, Vfs, Whence};
use sfs::SfsError;

fn small_device(name: &'static str) -> RamDevice {
    RamDevice::new(name, 512, 64, 96)
}

#[test]
fn format_then_create_write_read_small_file() {
    let fs = Sfs::format_new(small_device("root")).unwrap();
    let mut vfs: Vfs<RamDevice, NullBackoff> = Vfs::new();
    vfs.mount(fs, b"/").unwrap();

    let fd = vfs.open(b"/greeting.txt", OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
    let written = vfs.write(fd, b"hello, sfs").unwrap();
    assert_eq!(written as usize, b"hello, sfs".len());
    vfs.lseek(fd, 0, Whence::Set).unwrap();
    let mut out = [0u8; 10];
    let read = vfs.read(fd, &mut out).unwrap();
    assert_eq!(read as usize, out.len());
    assert_eq!(&out, b"hello, sfs");
    vfs.close(fd).unwrap();
}

#[test]
fn write_spanning_several_sectors_round_trips_through_indirect_blocks() {
    let fs = Sfs::format_new(small_device("big")).unwrap();
    let mut vfs: Vfs<RamDevice, NullBackoff> = Vfs::new();
    vfs.mount(fs, b"/").unwrap();

    let fd = vfs.open(b"/blob", OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
    let mut data = [0u8; 2000];
    for (i, b) in data.iter_mut().enumerate() {
        *b = (i % 200) as u8;
    }
    let written = vfs.write(fd, &data).unwrap();
    assert_eq!(written as usize, data.len());

    vfs.lseek(fd, 0, Whence::Set).unwrap();
    let mut out = [0u8; 2000];
    let mut total = 0usize;
    while total < out.len() {
        let n = vfs.read(fd, &mut out[total..]).unwrap() as usize;
        assert!(n > 0, "read made no progress before reaching end of file");
        total += n;
    }
    assert_eq!(&out[..], &data[..]);
    vfs.close(fd).unwrap();
}

#[test]
fn directory_tree_supports_mkdir_lsdir_and_unlink() {
    let fs = Sfs::format_new(small_device("tree")).unwrap();
    let mut vfs: Vfs<RamDevice, NullBackoff> = Vfs::new();
    vfs.mount(fs, b"/").unwrap();

    vfs.mkdir(b"/etc").unwrap();
    vfs.mkdir(b"/etc/conf.d").unwrap();
    let fd = vfs.open(b"/etc/hosts", OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
    vfs.write(fd, b"127.0.0.1 localhost").unwrap();
    vfs.close(fd).unwrap();

    let entries = vfs.lsdir(b"/etc").unwrap();
    let names: std::vec::Vec<std::vec::Vec<u8>> =
        entries.iter().map(|e| e.name.as_slice().to_vec()).collect();
    assert!(names.contains(&b"conf.d".to_vec()));
    assert!(names.contains(&b"hosts".to_vec()));

    assert_eq!(vfs.unlink(b"/etc"), Err(SfsError::DirNotEmpty));

    vfs.unlink(b"/etc/hosts").unwrap();
    vfs.unlink(b"/etc/conf.d").unwrap();
    vfs.unlink(b"/etc").unwrap();
    assert_eq!(vfs.open(b"/etc", OpenFlags::RDONLY), Err(SfsError::NameNotFound));
}

#[test]
fn cd_dotdot_past_root_is_a_no_op() {
    let fs = Sfs::format_new(small_device("cwd")).unwrap();
    let mut vfs: Vfs<RamDevice, NullBackoff> = Vfs::new();
    vfs.mount(fs, b"/").unwrap();

    vfs.mkdir(b"/home").unwrap();
    vfs.cd(b"/home").unwrap();
    vfs.cd(b"..").unwrap();
    vfs.cd(b"..").unwrap();
    let fd = vfs.open(b"home/.keep", OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
    vfs.close(fd).unwrap();
}

#[test]
fn second_mount_shadows_the_directory_it_is_mounted_on() {
    let root_fs = Sfs::format_new(small_device("root")).unwrap();
    let mut vfs: Vfs<RamDevice, NullBackoff> = Vfs::new();
    vfs.mount(root_fs, b"/").unwrap();
    vfs.mkdir(b"/data").unwrap();

    let root_fd = vfs.open(b"/data/on-root.txt", OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
    vfs.write(root_fd, b"root fs").unwrap();
    vfs.close(root_fd).unwrap();

    let data_fs = Sfs::format_new(small_device("data")).unwrap();
    vfs.mount(data_fs, b"/data").unwrap();

    // The file created before the mount is no longer reachable: `/data`
    // now resolves into the freshly mounted, empty filesystem.
    assert_eq!(
        vfs.open(b"/data/on-root.txt", OpenFlags::RDONLY),
        Err(SfsError::NameNotFound)
    );

    let mounted_fd = vfs.open(b"/data/on-mount.txt", OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
    vfs.write(mounted_fd, b"mounted fs").unwrap();
    vfs.lseek(mounted_fd, 0, Whence::Set).unwrap();
    let mut out = [0u8; 10];
    vfs.read(mounted_fd, &mut out).unwrap();
    assert_eq!(&out, b"mounted fs");
    vfs.close(mounted_fd).unwrap();
}

#[test]
fn stuck_fault_fails_the_retry_budget_and_clears_once_healed() {
    // Exercised directly against `Sfs`/`RamDevice` rather than through
    // the VFS: the fault needs to target a specific on-device address.
    let dev = RamDevice::new("flaky-direct", 512, 64, 32);
    let mut fs = Sfs::format_new(dev).unwrap();
    let file = fs.inode_create(sfs::sfs::inode::InodeType::File).unwrap();
    fs.inode_write(file, 0, b"resilient content").unwrap();

    // A bit stuck flipped inside the checksummed range (meta + 18 bytes
    // of datasize) survives every retry attempt, since each one re-reads
    // the same corrupted byte. The first data block sits right after the
    // superblock and inode sectors, at `sector_size * (1 + INODE_SECTORS)`.
    let data_start = 512u64 * (1 + INODE_SECTORS as u64);
    fs.device_mut().inject_stuck_fault(data_start + 20);
    let mut out = [0u8; 18];
    let result = fs.inode_read(file, 0, &mut out);
    assert_eq!(result, Err(SfsError::BadDataBlock));

    // Healing clears the fault; the same read now succeeds.
    fs.device_mut().heal();
    let n = fs.inode_read(file, 0, &mut out).unwrap();
    assert_eq!(n as usize, out.len());
    assert_eq!(&out, b"resilient content");

    // A fault strictly past the meta+datasize range (here, well into the
    // sector's unused tail) must never fail checksum validation.
    fs.device_mut().inject_stuck_fault(data_start + 100);
    let n = fs.inode_read(file, 0, &mut out).unwrap();
    assert_eq!(n as usize, out.len());
    assert_eq!(&out, b"resilient content");
    fs.device_mut().heal();
}

#[test]
fn file_descriptor_table_is_bounded() {
    let fs = Sfs::format_new(RamDevice::new("fds", 512, 64, 4 + FD_MAX as u32 * 2)).unwrap();
    let mut vfs: Vfs<RamDevice, NullBackoff> = Vfs::new();
    vfs.mount(fs, b"/").unwrap();

    let mut fds = std::vec::Vec::new();
    for i in 0..FD_MAX {
        let name = std::format!("/f{i}");
        let fd = vfs.open(name.as_bytes(), OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
        fds.push(fd);
    }
    let one_too_many = vfs.open(b"/overflow", OpenFlags::RDWR | OpenFlags::CREAT);
    assert_eq!(one_too_many, Err(SfsError::RunOutOfFd));

    vfs.close(fds[0]).unwrap();
    vfs.open(b"/overflow", OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
}

#[test]
fn directory_entry_table_is_bounded() {
    let fs = Sfs::format_new(RamDevice::new(
        "dirfull",
        512,
        64,
        4 + MAX_DIR_ENTRIES as u32 * 2,
    ))
    .unwrap();
    let mut vfs: Vfs<RamDevice, NullBackoff> = Vfs::new();
    vfs.mount(fs, b"/").unwrap();

    for i in 0..MAX_DIR_ENTRIES - 1 {
        let name = std::format!("/e{i}");
        let fd = vfs.open(name.as_bytes(), OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
        vfs.close(fd).unwrap();
    }
    let overflow = vfs.open(b"/one-too-many", OpenFlags::RDWR | OpenFlags::CREAT);
    assert_eq!(overflow, Err(SfsError::OutOfMemory));
}

#[test]
fn delete_and_recreate_reuses_freed_inode_and_block_slots() {
    let fs = Sfs::format_new(small_device("reuse")).unwrap();
    let mut vfs: Vfs<RamDevice, NullBackoff> = Vfs::new();
    vfs.mount(fs, b"/").unwrap();

    for round in 0..4 {
        let fd = vfs.open(b"/churn.txt", OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
        let payload = std::format!("round {round}");
        vfs.write(fd, payload.as_bytes()).unwrap();
        vfs.close(fd).unwrap();
        vfs.unlink(b"/churn.txt").unwrap();
    }
    assert_eq!(vfs.open(b"/churn.txt", OpenFlags::RDONLY), Err(SfsError::NameNotFound));
}
